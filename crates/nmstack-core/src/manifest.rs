//! サービス定義と Compose マニフェスト
//!
//! サービス定義は書き出した時点で確定し、再生成すると前の定義ファイルを上書きする。
//! 出力のキー順はすべて固定（BTreeMap）なので、同じ入力からは同じバイト列が得られる。

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 全サービス共通の再起動ポリシー
const RESTART_POLICY: &str = "unless-stopped";

/// プロトコル種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// ポートマッピング
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    pub fn tcp(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: Protocol::Udp,
        }
    }

    fn to_compose(&self) -> String {
        match self.protocol {
            Protocol::Tcp => format!("{}:{}", self.host, self.container),
            Protocol::Udp => format!("{}:{}/udp", self.host, self.container),
        }
    }
}

/// ボリュームマウント（ホスト側は絶対パス）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl VolumeMount {
    fn to_compose(&self) -> String {
        let mode = if self.read_only { ":ro" } else { "" };
        format!("{}:{}{}", self.host.display(), self.container, mode)
    }
}

/// コンテナ1つ分のサービス定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// サービス名（コンテナ名としても使う）
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeMount>,
    pub environment: BTreeMap<String, String>,
    /// Compose ファイルからの相対パス
    pub env_files: Vec<String>,
    /// `host` などを指定するとプロジェクトのネットワークには参加しない
    pub network_mode: Option<String>,
    pub cap_add: Vec<String>,
    pub depends_on: Vec<String>,
    pub working_dir: Option<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: None,
            ports: Vec::new(),
            volumes: Vec::new(),
            environment: BTreeMap::new(),
            env_files: Vec::new(),
            network_mode: None,
            cap_add: Vec::new(),
            depends_on: Vec::new(),
            working_dir: None,
        }
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    pub fn volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push(VolumeMount {
            host: host.into(),
            container: container.into(),
            read_only: false,
        });
        self
    }

    pub fn volume_ro(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push(VolumeMount {
            host: host.into(),
            container: container.into(),
            read_only: true,
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn env_file(mut self, path: impl Into<String>) -> Self {
        self.env_files.push(path.into());
        self
    }

    pub fn host_network(mut self) -> Self {
        self.network_mode = Some("host".to_string());
        self
    }

    pub fn cap_add(mut self, capability: impl Into<String>) -> Self {
        self.cap_add.push(capability.into());
        self
    }

    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(service.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Compose ファイル上のサービス表現
#[derive(Debug, Serialize)]
struct ComposeService {
    container_name: String,
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<Vec<String>>,
    restart: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env_file: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    network_mode: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cap_add: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<String>,
}

impl From<&ServiceDefinition> for ComposeService {
    fn from(def: &ServiceDefinition) -> Self {
        Self {
            container_name: def.name.clone(),
            image: def.image.clone(),
            command: def.command.clone(),
            restart: RESTART_POLICY,
            env_file: def.env_files.clone(),
            environment: def.environment.clone(),
            ports: def.ports.iter().map(PortMapping::to_compose).collect(),
            volumes: def.volumes.iter().map(VolumeMount::to_compose).collect(),
            network_mode: def.network_mode.clone(),
            cap_add: def.cap_add.clone(),
            depends_on: def.depends_on.clone(),
            working_dir: def.working_dir.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ComposeNetwork {
    name: String,
    external: bool,
}

#[derive(Debug, Serialize)]
struct ComposeFile {
    name: String,
    services: BTreeMap<String, ComposeService>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    networks: BTreeMap<String, ComposeNetwork>,
}

/// 1フェーズ分の Compose マニフェスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeManifest {
    /// Compose プロジェクト名
    pub project: String,
    /// 参加する外部ネットワーク（フェーズ0で作成済み）
    pub network: Option<String>,
    pub services: Vec<ServiceDefinition>,
}

impl ComposeManifest {
    pub fn new(project: impl Into<String>, network: Option<&str>) -> Self {
        Self {
            project: project.into(),
            network: network.map(String::from),
            services: Vec::new(),
        }
    }

    pub fn service(mut self, def: ServiceDefinition) -> Self {
        self.services.push(def);
        self
    }

    /// 使用するイメージ（重複なし、出現順）
    pub fn images(&self) -> Vec<&str> {
        let mut images: Vec<&str> = Vec::new();
        for service in &self.services {
            if !images.contains(&service.image.as_str()) {
                images.push(&service.image);
            }
        }
        images
    }

    /// コンテナ名の一覧
    pub fn container_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// 指定したイメージが無くても起動できるサービス
    ///
    /// イメージが無いサービスと、それに（間接的にでも）依存するサービスを除く。
    pub fn startable_services(&self, missing_images: &[&str]) -> Vec<&str> {
        let mut excluded: Vec<&str> = self
            .services
            .iter()
            .filter(|s| missing_images.contains(&s.image.as_str()))
            .map(|s| s.name.as_str())
            .collect();

        loop {
            let before = excluded.len();
            for service in &self.services {
                if !excluded.contains(&service.name.as_str())
                    && service.depends_on.iter().any(|d| excluded.contains(&d.as_str()))
                {
                    excluded.push(service.name.as_str());
                }
            }
            if excluded.len() == before {
                break;
            }
        }

        self.container_names()
            .into_iter()
            .filter(|name| !excluded.contains(name))
            .collect()
    }

    /// YAML に変換
    pub fn to_yaml(&self) -> Result<String> {
        let mut networks = BTreeMap::new();
        let joins_network = self.services.iter().any(|s| s.network_mode.is_none());
        if let Some(network) = &self.network
            && joins_network
        {
            networks.insert(
                "default".to_string(),
                ComposeNetwork {
                    name: network.clone(),
                    external: true,
                },
            );
        }

        let file = ComposeFile {
            name: self.project.clone(),
            services: self
                .services
                .iter()
                .map(|s| (s.name.clone(), ComposeService::from(s)))
                .collect(),
            networks,
        };

        Ok(serde_yaml::to_string(&file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> ComposeManifest {
        ComposeManifest::new("nmstack-oxidized", Some("nmstack")).service(
            ServiceDefinition::new("oxidized", "oxidized/oxidized:latest")
                .port(PortMapping::tcp(8888, 8888))
                .volume("/opt/nmstack/oxidized/config", "/home/oxidized/.config/oxidized")
                .env("CONFIG_RELOAD_INTERVAL", "600"),
        )
    }

    #[test]
    fn test_manifest_yaml_shape() {
        let yaml = sample_manifest().to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["name"].as_str(), Some("nmstack-oxidized"));
        let service = &value["services"]["oxidized"];
        assert_eq!(service["container_name"].as_str(), Some("oxidized"));
        assert_eq!(service["restart"].as_str(), Some("unless-stopped"));
        assert_eq!(service["ports"][0].as_str(), Some("8888:8888"));
        assert_eq!(
            service["volumes"][0].as_str(),
            Some("/opt/nmstack/oxidized/config:/home/oxidized/.config/oxidized")
        );
        assert_eq!(
            service["environment"]["CONFIG_RELOAD_INTERVAL"].as_str(),
            Some("600")
        );
        assert_eq!(value["networks"]["default"]["name"].as_str(), Some("nmstack"));
        assert_eq!(value["networks"]["default"]["external"].as_bool(), Some(true));
    }

    #[test]
    fn test_host_network_only_manifest_has_no_networks() {
        let manifest = ComposeManifest::new("nmstack-passive", Some("nmstack")).service(
            ServiceDefinition::new("zeek", "zeek/zeek:latest")
                .host_network()
                .cap_add("NET_RAW"),
        );
        let yaml = manifest.to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert!(value.get("networks").is_none());
        assert_eq!(
            value["services"]["zeek"]["network_mode"].as_str(),
            Some("host")
        );
    }

    #[test]
    fn test_udp_and_readonly_formatting() {
        let manifest = ComposeManifest::new("p", None).service(
            ServiceDefinition::new("snmp", "img")
                .port(PortMapping::udp(162, 162))
                .volume_ro("/etc/x", "/x"),
        );
        let yaml = manifest.to_yaml().unwrap();
        assert!(yaml.contains("162:162/udp"));
        assert!(yaml.contains("/etc/x:/x:ro"));
    }

    #[test]
    fn test_yaml_is_byte_identical_across_runs() {
        let a = sample_manifest().to_yaml().unwrap();
        let b = sample_manifest().to_yaml().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_images_are_deduplicated() {
        let manifest = ComposeManifest::new("p", None)
            .service(ServiceDefinition::new("netbox", "netboxcommunity/netbox:v4.1"))
            .service(ServiceDefinition::new("netbox-worker", "netboxcommunity/netbox:v4.1"))
            .service(ServiceDefinition::new("redis", "redis:7-alpine"));

        assert_eq!(
            manifest.images(),
            vec!["netboxcommunity/netbox:v4.1", "redis:7-alpine"]
        );
        assert_eq!(
            manifest.container_names(),
            vec!["netbox", "netbox-worker", "redis"]
        );
    }

    #[test]
    fn test_startable_services_skip_missing_images_and_dependents() {
        let manifest = ComposeManifest::new("nmstack-netbox", Some("nmstack"))
            .service(ServiceDefinition::new("netbox-redis", "redis:7-alpine"))
            .service(ServiceDefinition::new("netbox", "netbox:v4").depends_on("netbox-redis"))
            .service(ServiceDefinition::new("netbox-worker", "netbox:v4").depends_on("netbox"))
            .service(ServiceDefinition::new("ntopng", "ntop/ntopng:stable"));

        assert_eq!(manifest.startable_services(&[]).len(), 4);
        assert_eq!(manifest.startable_services(&["redis:7-alpine"]), vec!["ntopng"]);
        assert_eq!(
            manifest.startable_services(&["ntop/ntopng:stable"]),
            vec!["netbox-redis", "netbox", "netbox-worker"]
        );
    }
}
