//! コンテナランタイムのインストール
//!
//! `docker` が既にあれば何もしない。無ければ /etc/os-release からパッケージマネージャを
//! 判定し、公式リポジトリを追加して docker-ce と compose プラグインを入れる。

use crate::error::{ContainerError, Result};
use crate::runner::CommandRunner;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const OS_RELEASE: &str = "/etc/os-release";
const DOCKER_DOWNLOAD: &str = "https://download.docker.com/linux";
const APT_KEYRING: &str = "/etc/apt/keyrings/docker.asc";
const APT_SOURCE: &str = "/etc/apt/sources.list.d/docker.list";

const DOCKER_PACKAGES: &[&str] = &[
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-buildx-plugin",
    "docker-compose-plugin",
];

/// /etc/os-release の内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    fields: HashMap<String, String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let fields = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                (key.trim().to_string(), value.to_string())
            })
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn id(&self) -> &str {
        self.get("ID").unwrap_or("linux")
    }

    /// ID と ID_LIKE を合わせたディストリビューション系統
    pub fn lineage(&self) -> Vec<&str> {
        std::iter::once(self.id())
            .chain(self.get("ID_LIKE").unwrap_or("").split_whitespace())
            .collect()
    }

    pub fn pretty_name(&self) -> &str {
        self.get("PRETTY_NAME").unwrap_or_else(|| self.id())
    }

    /// パッケージマネージャの系統を判定
    pub fn family(&self) -> Option<PackageFamily> {
        let lineage = self.lineage();
        if lineage.iter().any(|id| matches!(*id, "debian" | "ubuntu")) {
            Some(PackageFamily::Apt)
        } else if lineage
            .iter()
            .any(|id| matches!(*id, "rhel" | "fedora" | "centos"))
        {
            Some(PackageFamily::Dnf)
        } else {
            None
        }
    }

    /// Docker リポジトリのディストリビューション名
    fn docker_distro(&self) -> &'static str {
        let lineage = self.lineage();
        match self.id() {
            "debian" => "debian",
            "ubuntu" => "ubuntu",
            "fedora" => "fedora",
            "rhel" => "rhel",
            _ if lineage.contains(&"ubuntu") => "ubuntu",
            _ if lineage.contains(&"debian") => "debian",
            _ if lineage.contains(&"fedora") && !lineage.contains(&"rhel") => "fedora",
            _ => "centos",
        }
    }

    fn codename(&self) -> Option<&str> {
        self.get("UBUNTU_CODENAME")
            .filter(|_| self.docker_distro() == "ubuntu")
            .or_else(|| self.get("VERSION_CODENAME"))
            .filter(|c| !c.is_empty())
    }
}

/// パッケージマネージャの系統
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFamily {
    Apt,
    Dnf,
}

impl PackageFamily {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
        }
    }
}

/// インストール結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// 既にインストール済み（何も実行していない）
    AlreadyInstalled { version: String },
    /// 今回インストールした
    Installed { version: String, family: PackageFamily },
}

/// ランタイムインストーラ
pub struct RuntimeInstaller<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    os_release: PathBuf,
}

impl<'a, R: CommandRunner + ?Sized> RuntimeInstaller<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            os_release: PathBuf::from(OS_RELEASE),
        }
    }

    pub fn with_os_release(mut self, path: impl Into<PathBuf>) -> Self {
        self.os_release = path.into();
        self
    }

    /// `docker --version` の出力（無ければ None）
    pub async fn detect(&self) -> Result<Option<String>> {
        let output = self.runner.run("docker", &["--version"]).await?;
        Ok(output.success.then(|| output.stdout.trim().to_string()))
    }

    /// ランタイムが無ければインストール
    #[instrument(skip(self))]
    pub async fn ensure_installed(&self) -> Result<InstallOutcome> {
        if let Some(version) = self.detect().await? {
            info!(%version, "Container runtime already installed");
            return Ok(InstallOutcome::AlreadyInstalled { version });
        }

        let os = OsRelease::parse(&self.runner.read_file(&self.os_release).await?);
        let family = os.family().ok_or_else(|| {
            ContainerError::UnsupportedPackageManager(os.pretty_name().to_string())
        })?;

        if !self.runner.run(family.program(), &["--version"]).await?.success {
            return Err(ContainerError::UnsupportedPackageManager(format!(
                "{} ({} が見つかりません)",
                os.pretty_name(),
                family.program()
            )));
        }

        info!(os = os.pretty_name(), ?family, "Installing container runtime");
        match family {
            PackageFamily::Apt => self.install_apt(&os).await?,
            PackageFamily::Dnf => self.install_dnf(&os).await?,
        }
        self.runner
            .run_checked("systemctl", &["enable", "--now", "docker"])
            .await?;

        let version = self
            .detect()
            .await?
            .ok_or(ContainerError::RuntimeUnavailable)?;
        Ok(InstallOutcome::Installed { version, family })
    }

    async fn install_apt(&self, os: &OsRelease) -> Result<()> {
        let distro = os.docker_distro();
        let codename = os.codename().ok_or_else(|| {
            ContainerError::UnsupportedPackageManager(format!(
                "{} (VERSION_CODENAME がありません)",
                os.pretty_name()
            ))
        })?;
        let runner = self.runner;

        runner.run_checked("apt-get", &["update"]).await?;
        runner
            .run_checked("apt-get", &["install", "-y", "ca-certificates", "curl"])
            .await?;
        runner
            .run_checked("install", &["-m", "0755", "-d", "/etc/apt/keyrings"])
            .await?;
        let key_url = format!("{}/{}/gpg", DOCKER_DOWNLOAD, distro);
        runner
            .run_checked("curl", &["-fsSL", &key_url, "-o", APT_KEYRING])
            .await?;
        runner.run_checked("chmod", &["a+r", APT_KEYRING]).await?;

        let arch = runner
            .run_checked("dpkg", &["--print-architecture"])
            .await?;
        let source = format!(
            "deb [arch={} signed-by={}] {}/{} {} stable\n",
            arch.trim(),
            APT_KEYRING,
            DOCKER_DOWNLOAD,
            distro,
            codename
        );
        runner.write_file(Path::new(APT_SOURCE), &source).await?;

        runner.run_checked("apt-get", &["update"]).await?;
        let mut args = vec!["install", "-y"];
        args.extend_from_slice(DOCKER_PACKAGES);
        runner.run_checked("apt-get", &args).await?;
        Ok(())
    }

    async fn install_dnf(&self, os: &OsRelease) -> Result<()> {
        let repo = format!("{}/{}/docker-ce.repo", DOCKER_DOWNLOAD, os.docker_distro());
        let runner = self.runner;

        runner
            .run_checked("dnf", &["-y", "install", "dnf-plugins-core"])
            .await?;
        // dnf5 は addrepo サブコマンド、dnf4 は --add-repo
        let added = runner
            .run("dnf", &["config-manager", "addrepo", &format!("--from-repofile={}", repo)])
            .await?;
        if !added.success {
            runner
                .run_checked("dnf", &["config-manager", "--add-repo", &repo])
                .await?;
        }
        let mut args = vec!["-y", "install"];
        args.extend_from_slice(DOCKER_PACKAGES);
        runner.run_checked("dnf", &args).await?;
        Ok(())
    }
}
