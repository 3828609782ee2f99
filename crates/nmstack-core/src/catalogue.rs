//! フェーズカタログ
//!
//! フェーズ0〜8を番号順に並べた一覧を設定から組み立てる。
//! ランナーはこの一覧を先頭から順に処理するだけで、フェーズごとの分岐は持たない。

use crate::config::{InventoryDatabase, SHARED_DB_CONTAINER, StackConfig};
use crate::manifest::{ComposeManifest, PortMapping, ServiceDefinition};
use crate::phase::{ComposeUnit, PhasePlan, PlannedFile, Probe, ReadinessCheck};
use crate::poller::RetryPolicy;
use crate::template::Variables;
use std::path::PathBuf;

/// サービスごとのサブディレクトリ
pub const SERVICE_DIRS: &[&str] = &[
    "netbox",
    "librenms",
    "oxidized",
    "passive",
    "compute",
    "ingestion",
    "completeness",
];

/// 使用するコンテナイメージ
pub mod images {
    pub const NETBOX: &str = "netboxcommunity/netbox:v4.1";
    pub const POSTGRES: &str = "postgres:16-alpine";
    pub const MARIADB: &str = "mariadb:10.11";
    pub const REDIS: &str = "redis:7-alpine";
    pub const LIBRENMS: &str = "librenms/librenms:latest";
    pub const MSMTPD: &str = "crazymax/msmtpd:latest";
    pub const OXIDIZED: &str = "oxidized/oxidized:latest";
    pub const NTOPNG: &str = "ntop/ntopng:stable";
    pub const ZEEK: &str = "zeek/zeek:latest";
}

mod templates {
    pub const STACK_ENV: &str = include_str!("../templates/stack.env.tera");
    pub const NETBOX_ENV: &str = include_str!("../templates/netbox.env.tera");
    pub const POSTGRES_ENV: &str = include_str!("../templates/postgres.env.tera");
    pub const MARIADB_ENV: &str = include_str!("../templates/mariadb.env.tera");
    pub const SHARED_INITDB: &str = include_str!("../templates/shared-initdb.sql.tera");
    pub const REDIS_ENV: &str = include_str!("../templates/redis.env.tera");
    pub const LIBRENMS_ENV: &str = include_str!("../templates/librenms.env.tera");
    pub const MSMTPD_ENV: &str = include_str!("../templates/msmtpd.env.tera");
    pub const OXIDIZED_CONFIG: &str = include_str!("../templates/oxidized.config.tera");
    pub const ROUTER_DB: &str = include_str!("../templates/router.db.tera");
    pub const NETBOX_SYNC: &str = include_str!("../templates/netbox_sync.sh.tera");
    pub const LIBRENMS_EXPORT: &str = include_str!("../templates/librenms_export.sh.tera");
    pub const COMPUTE_METRICS: &str = include_str!("../templates/compute_metrics.sh.tera");
    pub const CHECK_COMPLETENESS: &str = include_str!("../templates/check_completeness.sh.tera");
}

const MARIADB_PING: &str =
    "mariadb-admin ping -h 127.0.0.1 -uroot -p\"$MARIADB_ROOT_PASSWORD\" --silent";
const REDIS_AUTH_PING: &str = "redis-cli -a \"$REDIS_PASSWORD\" --no-auth-warning ping";

/// 設定からフェーズ一覧を組み立てる
pub fn build_plan(config: &StackConfig) -> Vec<PhasePlan> {
    let mut phases = vec![
        preflight(config),
        inventory_database(config),
        inventory(config),
        monitoring(config),
        config_backup(config),
        passive(config),
        ingestion(),
        compute(),
    ];
    let last = completeness(config, &phases);
    phases.push(last);
    phases
}

/// フェーズ0: ディレクトリ構成と共通ネットワーク
fn preflight(config: &StackConfig) -> PhasePlan {
    let mut phase = PhasePlan::new(0, "preflight", "事前準備", "");
    phase.data_dirs = SERVICE_DIRS.iter().map(PathBuf::from).collect();
    phase
        .files
        .push(PlannedFile::template("stack.env", templates::STACK_ENV));
    phase.networks.push(config.network.clone());
    phase
}

/// フェーズ1: インベントリ用データベースとキャッシュ
fn inventory_database(config: &StackConfig) -> PhasePlan {
    let base = &config.base_dir;
    let db = config.inventory_database;
    let mut phase = PhasePlan::new(1, "inventory-database", "NetBox データベース", "netbox");
    let mut manifest = ComposeManifest::new("nmstack-netbox-db", Some(&config.network));

    match db {
        InventoryDatabase::Postgres => {
            phase.data_dirs.push("netbox/postgres".into());
            phase
                .files
                .push(PlannedFile::template("netbox/postgres.env", templates::POSTGRES_ENV));
            manifest = manifest.service(
                ServiceDefinition::new(db.container_name(), images::POSTGRES)
                    .env_file("postgres.env")
                    .volume(base.join("netbox/postgres"), "/var/lib/postgresql/data"),
            );
            phase.checks.push(ReadinessCheck::new(
                "PostgreSQL 接続受付",
                Probe::exec(
                    db.container_name(),
                    ["pg_isready", "-q", "-U", "netbox", "-d", "netbox"],
                ),
                RetryPolicy::STANDARD,
            ));
        }
        InventoryDatabase::Mariadb => {
            phase.data_dirs.push("netbox/mariadb".into());
            phase
                .files
                .push(mariadb_env("netbox/mariadb.env", "netbox"));
            manifest = manifest.service(
                mariadb_service(db.container_name(), "mariadb.env")
                    .volume(base.join("netbox/mariadb"), "/var/lib/mysql"),
            );
            phase.checks.push(mariadb_check(db.container_name()));
        }
        InventoryDatabase::Shared => {
            phase.data_dirs.push("netbox/shared-mariadb".into());
            phase.data_dirs.push("netbox/initdb".into());
            phase
                .files
                .push(mariadb_env("netbox/shared-mariadb.env", ""));
            phase.files.push(PlannedFile::template(
                "netbox/initdb/01-databases.sql",
                templates::SHARED_INITDB,
            ));
            manifest = manifest.service(
                mariadb_service(SHARED_DB_CONTAINER, "shared-mariadb.env")
                    .volume(base.join("netbox/shared-mariadb"), "/var/lib/mysql")
                    .volume_ro(base.join("netbox/initdb"), "/docker-entrypoint-initdb.d"),
            );
            phase.checks.push(mariadb_check(SHARED_DB_CONTAINER));
        }
    }

    for (name, cache) in [("netbox-redis", false), ("netbox-redis-cache", true)] {
        let env_file = format!("{}.env", name);
        let data_dir = format!("netbox/{}", name);
        let server = if cache {
            "redis-server --requirepass \"$$REDIS_PASSWORD\""
        } else {
            "redis-server --appendonly yes --requirepass \"$$REDIS_PASSWORD\""
        };

        phase.data_dirs.push(PathBuf::from(&data_dir));
        phase.files.push(PlannedFile::template_with(
            format!("netbox/{}", env_file),
            templates::REDIS_ENV,
            Variables::from([("cache".to_string(), cache.into())]),
        ));
        manifest = manifest.service(
            ServiceDefinition::new(name, images::REDIS)
                .command(["sh", "-c", server])
                .env_file(env_file)
                .volume(base.join(&data_dir), "/data"),
        );
        phase.checks.push(ReadinessCheck::new(
            format!("{} ping", name),
            Probe::exec(name, ["sh", "-c", REDIS_AUTH_PING]).expecting("PONG"),
            RetryPolicy::STANDARD,
        ));
    }

    phase.compose = Some(ComposeUnit {
        file: "netbox/docker-compose.db.yml".into(),
        manifest,
    });
    phase
}

/// フェーズ2: NetBox 本体
fn inventory(config: &StackConfig) -> PhasePlan {
    let base = &config.base_dir;
    let mut phase = PhasePlan::new(2, "inventory", "NetBox", "netbox");
    phase.data_dirs = ["netbox/media", "netbox/reports", "netbox/scripts"]
        .iter()
        .map(PathBuf::from)
        .collect();
    phase
        .files
        .push(PlannedFile::template("netbox/netbox.env", templates::NETBOX_ENV));

    let netbox = |name: &str| {
        ServiceDefinition::new(name, images::NETBOX)
            .env_file("netbox.env")
            .volume(base.join("netbox/media"), "/opt/netbox/netbox/media")
            .volume(base.join("netbox/reports"), "/opt/netbox/netbox/reports")
            .volume(base.join("netbox/scripts"), "/opt/netbox/netbox/scripts")
    };

    let manifest = ComposeManifest::new("nmstack-netbox", Some(&config.network))
        .service(netbox("netbox").port(PortMapping::tcp(config.ports.netbox, 8080)))
        .service(
            netbox("netbox-worker")
                .command([
                    "/opt/netbox/venv/bin/python",
                    "/opt/netbox/netbox/manage.py",
                    "rqworker",
                ])
                .depends_on("netbox"),
        )
        .service(
            netbox("netbox-housekeeping")
                .command(["/opt/netbox/housekeeping.sh"])
                .depends_on("netbox"),
        );

    phase.compose = Some(ComposeUnit {
        file: "netbox/docker-compose.yml".into(),
        manifest,
    });
    phase.checks.push(ReadinessCheck::new(
        "NetBox Web",
        Probe::Http {
            url: format!("http://127.0.0.1:{}/login/", config.ports.netbox),
        },
        RetryPolicy::VERY_SLOW,
    ));
    phase
}

/// フェーズ3: LibreNMS
fn monitoring(config: &StackConfig) -> PhasePlan {
    let base = &config.base_dir;
    let shared_db = config.inventory_database == InventoryDatabase::Shared;
    let mut phase = PhasePlan::new(3, "monitoring", "LibreNMS", "librenms");
    let mut manifest = ComposeManifest::new("nmstack-librenms", Some(&config.network));

    phase.data_dirs.push("librenms/data".into());
    phase
        .files
        .push(PlannedFile::template("librenms/librenms.env", templates::LIBRENMS_ENV));

    if !shared_db {
        phase.data_dirs.push("librenms/db".into());
        phase.files.push(mariadb_env("librenms/db.env", "librenms"));
        manifest = manifest.service(
            mariadb_service("librenms-db", "db.env")
                .volume(base.join("librenms/db"), "/var/lib/mysql"),
        );
    }

    manifest = manifest.service(ServiceDefinition::new("librenms-redis", images::REDIS));

    if config.smtp.enabled() {
        phase
            .files
            .push(PlannedFile::template("librenms/msmtpd.env", templates::MSMTPD_ENV));
        manifest = manifest.service(
            ServiceDefinition::new("librenms-msmtpd", images::MSMTPD).env_file("msmtpd.env"),
        );
    }

    let librenms = |name: &str| {
        let mut def = ServiceDefinition::new(name, images::LIBRENMS)
            .env_file("librenms.env")
            .volume(base.join("librenms/data"), "/data")
            .cap_add("NET_ADMIN")
            .cap_add("NET_RAW");
        if !shared_db {
            def = def.depends_on("librenms-db");
        }
        def.depends_on("librenms-redis")
    };

    manifest = manifest
        .service(librenms("librenms").port(PortMapping::tcp(config.ports.librenms, 8000)))
        .service(
            librenms("librenms-dispatcher")
                .env("DISPATCHER_NODE_ID", "dispatcher1")
                .env("SIDECAR_DISPATCHER", "1")
                .depends_on("librenms"),
        )
        .service(
            librenms("librenms-snmptrapd")
                .env("SIDECAR_SNMPTRAPD", "1")
                .port(PortMapping::udp(162, 162))
                .depends_on("librenms"),
        );

    phase.compose = Some(ComposeUnit {
        file: "librenms/docker-compose.yml".into(),
        manifest,
    });

    phase.checks.push(mariadb_check(config.librenms_db_host()));
    phase.checks.push(ReadinessCheck::new(
        "librenms-redis ping",
        Probe::exec("librenms-redis", ["redis-cli", "ping"]).expecting("PONG"),
        RetryPolicy::STANDARD,
    ));
    phase.checks.push(ReadinessCheck::new(
        "LibreNMS Web",
        Probe::Http {
            url: format!("http://127.0.0.1:{}/login", config.ports.librenms),
        },
        RetryPolicy::SLOW,
    ));
    phase
}

/// フェーズ4: Oxidized（機器設定バックアップ）
fn config_backup(config: &StackConfig) -> PhasePlan {
    let mut phase = PhasePlan::new(4, "config-backup", "Oxidized", "oxidized");
    phase.data_dirs.push("oxidized/config".into());
    phase
        .files
        .push(PlannedFile::template("oxidized/config/config", templates::OXIDIZED_CONFIG));
    phase
        .files
        .push(PlannedFile::template("oxidized/config/router.db", templates::ROUTER_DB));

    let manifest = ComposeManifest::new("nmstack-oxidized", Some(&config.network)).service(
        ServiceDefinition::new("oxidized", images::OXIDIZED)
            .port(PortMapping::tcp(config.ports.oxidized, 8888))
            .volume(
                config.base_dir.join("oxidized/config"),
                "/home/oxidized/.config/oxidized",
            )
            .env("CONFIG_RELOAD_INTERVAL", "600"),
    );

    phase.compose = Some(ComposeUnit {
        file: "oxidized/docker-compose.yml".into(),
        manifest,
    });
    phase.checks.push(ReadinessCheck::new(
        "Oxidized REST API",
        Probe::Tcp {
            host: "127.0.0.1".into(),
            port: config.ports.oxidized,
        },
        RetryPolicy::STANDARD,
    ));
    phase
}

/// フェーズ5: パッシブトラフィック監視（失敗しても続行）
fn passive(config: &StackConfig) -> PhasePlan {
    let base = &config.base_dir;
    let iface = config.monitor_interface.as_str();
    let mut phase = PhasePlan::new(5, "passive", "パッシブ監視", "passive").best_effort();
    phase.data_dirs = ["passive/ntopng", "passive/zeek/logs"]
        .iter()
        .map(PathBuf::from)
        .collect();

    let capture = |name: &str, image: &str| {
        ServiceDefinition::new(name, image)
            .host_network()
            .cap_add("NET_ADMIN")
            .cap_add("NET_RAW")
    };

    let manifest = ComposeManifest::new("nmstack-passive", Some(&config.network))
        .service(
            capture("ntopng", images::NTOPNG)
                .command([
                    "-i".to_string(),
                    iface.to_string(),
                    "-w".to_string(),
                    config.ports.ntopng.to_string(),
                    "--community".to_string(),
                ])
                .volume(base.join("passive/ntopng"), "/var/lib/ntopng"),
        )
        .service(
            capture("zeek", images::ZEEK)
                .command(["zeek", "-i", iface, "local"])
                .working_dir("/logs")
                .volume(base.join("passive/zeek/logs"), "/logs"),
        );

    phase.compose = Some(ComposeUnit {
        file: "passive/docker-compose.yml".into(),
        manifest,
    });
    phase.checks.push(ReadinessCheck::new(
        "ntopng Web",
        Probe::Http {
            url: format!("http://127.0.0.1:{}/", config.ports.ntopng),
        },
        RetryPolicy::STANDARD,
    ));
    phase
}

/// フェーズ6: 取り込みスクリプト（プレースホルダ）
fn ingestion() -> PhasePlan {
    let mut phase = PhasePlan::new(6, "ingestion", "取り込みスクリプト", "ingestion").best_effort();
    phase.data_dirs.push("ingestion/data".into());
    phase
        .files
        .push(PlannedFile::script("ingestion/netbox_sync.sh", templates::NETBOX_SYNC));
    phase.files.push(PlannedFile::script(
        "ingestion/librenms_export.sh",
        templates::LIBRENMS_EXPORT,
    ));
    phase
}

/// フェーズ7: 集計スクリプト（プレースホルダ）
fn compute() -> PhasePlan {
    let mut phase = PhasePlan::new(7, "compute", "集計スクリプト", "compute").best_effort();
    phase.data_dirs.push("compute/output".into());
    phase.files.push(PlannedFile::script(
        "compute/compute_metrics.sh",
        templates::COMPUTE_METRICS,
    ));
    phase
}

/// フェーズ8: 完全性チェックスクリプト
fn completeness(config: &StackConfig, earlier: &[PhasePlan]) -> PhasePlan {
    let expected_files: Vec<String> = earlier
        .iter()
        .flat_map(|p| p.output_paths(&config.base_dir))
        .map(|p| p.display().to_string())
        .collect();
    let expected_containers: Vec<String> = earlier
        .iter()
        .filter_map(|p| p.compose.as_ref())
        .flat_map(|unit| unit.manifest.container_names())
        .map(String::from)
        .collect();

    let mut phase =
        PhasePlan::new(8, "completeness", "完全性チェック", "completeness").best_effort();
    phase.files.push(
        PlannedFile::template_with(
            "completeness/check_completeness.sh",
            templates::CHECK_COMPLETENESS,
            Variables::from([
                ("expected_files".to_string(), expected_files.into()),
                ("expected_containers".to_string(), expected_containers.into()),
            ]),
        )
        .executable(),
    );
    phase
}

fn mariadb_env(path: &str, scope: &str) -> PlannedFile {
    PlannedFile::template_with(
        path,
        templates::MARIADB_ENV,
        Variables::from([("db_scope".to_string(), scope.into())]),
    )
}

fn mariadb_service(name: &str, env_file: &str) -> ServiceDefinition {
    ServiceDefinition::new(name, images::MARIADB)
        .command([
            "mariadbd",
            "--innodb-file-per-table=1",
            "--lower-case-table-names=0",
            "--character-set-server=utf8mb4",
            "--collation-server=utf8mb4_unicode_ci",
        ])
        .env_file(env_file)
}

fn mariadb_check(container: &str) -> ReadinessCheck {
    ReadinessCheck::new(
        format!("{} 接続受付", container),
        Probe::exec(container, ["sh", "-c", MARIADB_PING]),
        RetryPolicy::STANDARD,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{Criticality, FileSource};
    use crate::secrets::Secrets;
    use crate::template::TemplateProcessor;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::Path;

    fn config_in(dir: &Path) -> StackConfig {
        StackConfig {
            base_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn processor(config: &StackConfig) -> TemplateProcessor {
        TemplateProcessor::for_stack(config, &Secrets::generate_with(&mut StdRng::seed_from_u64(3)))
    }

    #[test]
    fn test_phases_are_ordered_zero_to_eight() {
        let plan = build_plan(&StackConfig::default());
        let indices: Vec<u8> = plan.iter().map(|p| p.index).collect();
        assert_eq!(indices, (0..=8).collect::<Vec<_>>());

        let names: Vec<&str> = plan.iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec![
                "preflight",
                "inventory-database",
                "inventory",
                "monitoring",
                "config-backup",
                "passive",
                "ingestion",
                "compute",
                "completeness",
            ]
        );
    }

    #[test]
    fn test_core_phases_are_fatal_and_passive_is_best_effort() {
        let plan = build_plan(&StackConfig::default());
        for phase in &plan[..5] {
            assert_eq!(phase.criticality, Criticality::Fatal, "{}", phase.name);
        }
        for phase in &plan[5..] {
            assert_eq!(phase.criticality, Criticality::BestEffort, "{}", phase.name);
        }
    }

    #[test]
    fn test_preflight_creates_every_service_dir_and_network() {
        let plan = build_plan(&StackConfig::default());
        let preflight = &plan[0];
        for dir in SERVICE_DIRS {
            assert!(preflight.data_dirs.contains(&PathBuf::from(dir)));
        }
        assert_eq!(preflight.networks, vec!["nmstack".to_string()]);
        assert!(preflight.compose.is_none());
    }

    #[test]
    fn test_postgres_variant() {
        let plan = build_plan(&StackConfig::default());
        let db = &plan[1];
        let manifest = &db.compose.as_ref().unwrap().manifest;

        assert_eq!(
            manifest.container_names(),
            vec!["netbox-postgres", "netbox-redis", "netbox-redis-cache"]
        );
        assert!(db.images().contains(&images::POSTGRES));
        assert!(matches!(
            &db.checks[0].probe,
            Probe::Exec { container, command, .. }
                if container == "netbox-postgres" && command[0] == "pg_isready"
        ));
        // LibreNMS は自前の DB を持つ
        let librenms = &plan[3].compose.as_ref().unwrap().manifest;
        assert!(librenms.container_names().contains(&"librenms-db"));
    }

    #[test]
    fn test_mariadb_variant() {
        let config = StackConfig {
            inventory_database: InventoryDatabase::Mariadb,
            ..Default::default()
        };
        let plan = build_plan(&config);
        let manifest = &plan[1].compose.as_ref().unwrap().manifest;
        assert_eq!(manifest.container_names()[0], "netbox-mariadb");
        assert!(plan[1].images().contains(&images::MARIADB));
    }

    #[test]
    fn test_shared_variant_moves_database_to_inventory_phase() {
        let config = StackConfig {
            inventory_database: InventoryDatabase::Shared,
            ..Default::default()
        };
        let plan = build_plan(&config);

        let db = &plan[1].compose.as_ref().unwrap().manifest;
        assert_eq!(db.container_names()[0], SHARED_DB_CONTAINER);
        assert!(
            plan[1]
                .files
                .iter()
                .any(|f| f.path == Path::new("netbox/initdb/01-databases.sql"))
        );

        let librenms = &plan[3].compose.as_ref().unwrap().manifest;
        assert!(!librenms.container_names().contains(&"librenms-db"));
        assert!(matches!(
            &plan[3].checks[0].probe,
            Probe::Exec { container, .. } if container == SHARED_DB_CONTAINER
        ));
    }

    #[test]
    fn test_smtp_relay_only_when_configured() {
        let plan = build_plan(&StackConfig::default());
        let librenms = &plan[3].compose.as_ref().unwrap().manifest;
        assert!(!librenms.container_names().contains(&"librenms-msmtpd"));

        let mut config = StackConfig::default();
        config.smtp.host = "smtp.example.com".into();
        config.smtp.from = "noc@example.com".into();
        let plan = build_plan(&config);
        let librenms = &plan[3].compose.as_ref().unwrap().manifest;
        assert!(librenms.container_names().contains(&"librenms-msmtpd"));
    }

    #[test]
    fn test_ports_follow_config() {
        let mut config = StackConfig::default();
        config.ports.netbox = 18000;
        config.ports.oxidized = 18888;
        let plan = build_plan(&config);

        assert!(matches!(
            &plan[2].checks[0].probe,
            Probe::Http { url } if url == "http://127.0.0.1:18000/login/"
        ));
        assert!(matches!(
            &plan[4].checks[0].probe,
            Probe::Tcp { port: 18888, .. }
        ));
        let yaml = plan[2].compose.as_ref().unwrap().manifest.to_yaml().unwrap();
        assert!(yaml.contains("18000:8080"));
    }

    #[test]
    fn test_passive_uses_monitor_interface() {
        let config = StackConfig {
            monitor_interface: "ens192".into(),
            ..Default::default()
        };
        let plan = build_plan(&config);
        let yaml = plan[5].compose.as_ref().unwrap().manifest.to_yaml().unwrap();
        assert!(yaml.contains("ens192"));
        assert!(yaml.contains("network_mode: host"));
    }

    #[test]
    fn test_completeness_lists_earlier_outputs() {
        let config = StackConfig::default();
        let plan = build_plan(&config);
        let FileSource::Template { vars, .. } = &plan[8].files[0].source else {
            panic!("completeness script must be a template");
        };

        let files = vars["expected_files"].as_array().unwrap();
        assert!(files.contains(&serde_json::json!("/opt/nmstack/netbox/netbox.env")));
        assert!(files.contains(&serde_json::json!("/opt/nmstack/librenms/docker-compose.yml")));
        let containers = vars["expected_containers"].as_array().unwrap();
        assert!(containers.contains(&serde_json::json!("oxidized")));
        assert!(containers.contains(&serde_json::json!("zeek")));
    }

    #[test]
    fn test_every_phase_renders() {
        for variant in [
            InventoryDatabase::Postgres,
            InventoryDatabase::Mariadb,
            InventoryDatabase::Shared,
        ] {
            let temp = tempfile::tempdir().unwrap();
            let mut config = config_in(temp.path());
            config.inventory_database = variant;
            config.smtp.host = "smtp.example.com".into();
            config.smtp.from = "noc@example.com".into();
            let processor = processor(&config);

            for phase in build_plan(&config) {
                let written = phase.render(temp.path(), &processor).unwrap();
                for path in written {
                    assert!(path.exists(), "{}", path.display());
                }
            }

            for dir in SERVICE_DIRS {
                assert!(temp.path().join(dir).is_dir());
            }
        }
    }

    #[test]
    fn test_rendered_env_files_contain_secrets() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_in(temp.path());
        let secrets = Secrets::generate_with(&mut StdRng::seed_from_u64(9));
        let processor = TemplateProcessor::for_stack(&config, &secrets);

        for phase in build_plan(&config) {
            phase.render(temp.path(), &processor).unwrap();
        }

        let netbox_env = std::fs::read_to_string(temp.path().join("netbox/netbox.env")).unwrap();
        assert!(netbox_env.contains(&format!("DB_PASSWORD={}", secrets.netbox_db_password)));
        assert!(netbox_env.contains(&format!("SECRET_KEY={}", secrets.netbox_secret_key)));
        assert!(netbox_env.contains("DB_HOST=netbox-postgres"));
        assert!(!netbox_env.contains("EMAIL_SERVER"));

        let postgres_env =
            std::fs::read_to_string(temp.path().join("netbox/postgres.env")).unwrap();
        assert!(postgres_env.contains(&secrets.netbox_db_password));

        let db_env = std::fs::read_to_string(temp.path().join("librenms/db.env")).unwrap();
        assert!(db_env.contains(&format!("MARIADB_PASSWORD={}", secrets.librenms_db_password)));

        let redis_cache =
            std::fs::read_to_string(temp.path().join("netbox/netbox-redis-cache.env")).unwrap();
        assert_eq!(
            redis_cache.trim(),
            format!("REDIS_PASSWORD={}", secrets.netbox_redis_cache_password)
        );

        let check = std::fs::read_to_string(
            temp.path().join("completeness/check_completeness.sh"),
        )
        .unwrap();
        assert!(check.contains("{{.State.Running}}"));
        assert!(check.contains("netbox-postgres"));
    }

    #[test]
    fn test_full_render_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_in(temp.path());
        let processor = processor(&config);
        let plan = build_plan(&config);

        let snapshot = |plan: &[PhasePlan]| -> Vec<(PathBuf, Vec<u8>)> {
            plan.iter()
                .flat_map(|p| p.render(temp.path(), &processor).unwrap())
                .map(|path| {
                    let bytes = std::fs::read(&path).unwrap();
                    (path, bytes)
                })
                .collect()
        };

        let first = snapshot(&plan);
        let second = snapshot(&build_plan(&config));
        assert_eq!(first, second);
    }
}
