//! スタック設定
//!
//! 起動時に一度だけ組み立て、検証後は変更せずに各フェーズへ参照で渡す。
//! 値の出所（デフォルト < 設定ファイル < フラグ/環境変数 < 対話入力）の
//! マージは呼び出し側の責務。

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// デフォルトのベースディレクトリ
pub const DEFAULT_BASE_DIR: &str = "/opt/nmstack";

/// スタック全体の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// 全サービスのファイルを配置するベースディレクトリ
    pub base_dir: PathBuf,
    /// コンテナに渡すタイムゾーン (例: Asia/Tokyo)
    pub timezone: String,
    /// 全サービスが参加する Docker ネットワーク名
    pub network: String,
    /// パッシブ監視でキャプチャするネットワークインターフェース
    pub monitor_interface: String,
    /// インベントリ（NetBox）用データベースの構成
    pub inventory_database: InventoryDatabase,
    pub ports: PortConfig,
    pub smtp: SmtpConfig,
    pub netbox: NetboxConfig,
    pub oxidized: OxidizedConfig,
    /// LibreNMS のデフォルト SNMP コミュニティ
    pub snmp_community: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            timezone: "UTC".to_string(),
            network: "nmstack".to_string(),
            monitor_interface: "eth0".to_string(),
            inventory_database: InventoryDatabase::default(),
            ports: PortConfig::default(),
            smtp: SmtpConfig::default(),
            netbox: NetboxConfig::default(),
            oxidized: OxidizedConfig::default(),
            snmp_community: "public".to_string(),
        }
    }
}

impl StackConfig {
    /// 設定値を検証
    pub fn validate(&self) -> Result<()> {
        if !self.base_dir.is_absolute() {
            return Err(CoreError::InvalidConfig(format!(
                "base_dir は絶対パスで指定してください: {}",
                self.base_dir.display()
            )));
        }

        require_token("timezone", &self.timezone)?;
        require_token("network", &self.network)?;
        require_token("monitor_interface", &self.monitor_interface)?;
        require_token("snmp_community", &self.snmp_community)?;
        require_token("netbox.admin_user", &self.netbox.admin_user)?;

        if !self.netbox.admin_email.contains('@') {
            return Err(CoreError::InvalidConfig(format!(
                "netbox.admin_email が不正です: {}",
                self.netbox.admin_email
            )));
        }

        self.ports.validate()?;
        self.smtp.validate()?;

        Ok(())
    }

    /// LibreNMS が接続するデータベースのホスト名
    pub fn librenms_db_host(&self) -> &'static str {
        match self.inventory_database {
            InventoryDatabase::Shared => SHARED_DB_CONTAINER,
            _ => "librenms-db",
        }
    }
}

fn require_token(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidConfig(format!("{} が空です", field)));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidConfig(format!(
            "{} に空白を含めることはできません: '{}'",
            field, value
        )));
    }
    Ok(())
}

/// 共有 MariaDB のコンテナ名
pub const SHARED_DB_CONTAINER: &str = "nmstack-mariadb";

/// インベントリ用データベースの構成バリエーション
///
/// 過去のデプロイでは PostgreSQL / MariaDB / 監視側 DB の共用が混在していたため、
/// どれか一つを正とせず設定で選ぶ。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryDatabase {
    /// NetBox 専用の PostgreSQL
    #[default]
    Postgres,
    /// NetBox 専用の MariaDB
    Mariadb,
    /// LibreNMS と共用する MariaDB（インベントリフェーズで起動）
    Shared,
}

impl InventoryDatabase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mariadb => "mariadb",
            Self::Shared => "shared",
        }
    }

    /// データベースコンテナ名
    pub fn container_name(&self) -> &'static str {
        match self {
            Self::Postgres => "netbox-postgres",
            Self::Mariadb => "netbox-mariadb",
            Self::Shared => SHARED_DB_CONTAINER,
        }
    }

    /// データベースの待受ポート
    pub fn port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mariadb | Self::Shared => 3306,
        }
    }
}

impl fmt::Display for InventoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryDatabase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mariadb" | "mysql" => Ok(Self::Mariadb),
            "shared" | "librenms" => Ok(Self::Shared),
            other => Err(CoreError::InvalidConfig(format!(
                "不明なデータベース構成: '{}' (postgres, mariadb, shared のいずれか)",
                other
            ))),
        }
    }
}

/// ホストに公開するポート
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortConfig {
    pub netbox: u16,
    pub librenms: u16,
    pub oxidized: u16,
    pub ntopng: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            netbox: 8000,
            librenms: 8001,
            oxidized: 8888,
            ntopng: 3000,
        }
    }
}

impl PortConfig {
    fn entries(&self) -> [(&'static str, u16); 4] {
        [
            ("ports.netbox", self.netbox),
            ("ports.librenms", self.librenms),
            ("ports.oxidized", self.oxidized),
            ("ports.ntopng", self.ntopng),
        ]
    }

    fn validate(&self) -> Result<()> {
        let entries = self.entries();
        for (i, (field, port)) in entries.iter().enumerate() {
            if *port == 0 {
                return Err(CoreError::InvalidConfig(format!("{} に 0 は指定できません", field)));
            }
            if entries[..i].iter().any(|(_, other)| other == port) {
                return Err(CoreError::DuplicateValue {
                    field: field.to_string(),
                    value: port.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// LibreNMS の通知メール送信設定
///
/// `host` が空の場合はメールリレー（msmtpd）を起動しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            starttls: true,
        }
    }
}

impl SmtpConfig {
    pub fn enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }

    fn validate(&self) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        if self.port == 0 {
            return Err(CoreError::InvalidConfig("smtp.port に 0 は指定できません".into()));
        }
        if !self.from.contains('@') {
            return Err(CoreError::InvalidConfig(format!(
                "smtp.from にはメールアドレスを指定してください: '{}'",
                self.from
            )));
        }
        if !self.username.is_empty() && self.password.is_empty() {
            return Err(CoreError::InvalidConfig(
                "smtp.username を指定した場合は smtp.password も必要です".into(),
            ));
        }
        Ok(())
    }
}

/// NetBox 管理者アカウント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetboxConfig {
    pub admin_user: String,
    pub admin_email: String,
}

impl Default for NetboxConfig {
    fn default() -> Self {
        Self {
            admin_user: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
        }
    }
}

/// Oxidized が機器にログインする際の認証情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OxidizedConfig {
    pub username: String,
    /// 未指定の場合は生成したパスワードを使用
    pub password: Option<String>,
}

impl Default for OxidizedConfig {
    fn default() -> Self {
        Self {
            username: "oxidized".to_string(),
            password: None,
        }
    }
}
