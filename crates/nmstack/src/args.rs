//! 共通オプションと設定の組み立て
//!
//! 優先順位: デフォルト < 設定ファイル < フラグ/環境変数 < 対話入力

use crate::prompt::Prompter;
use clap::Args;
use nmstack_core::{InventoryDatabase, StackConfig};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone, Default)]
pub struct StackArgs {
    /// 設定ファイル (YAML)
    #[arg(long, env = "NMSTACK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// 全サービスのファイルを配置するベースディレクトリ
    #[arg(long, env = "NMSTACK_BASE_DIR", global = true)]
    pub base_dir: Option<PathBuf>,

    /// コンテナのタイムゾーン (例: Asia/Tokyo)
    #[arg(long, env = "NMSTACK_TIMEZONE", global = true)]
    pub timezone: Option<String>,

    /// パッシブ監視でキャプチャするインターフェース
    #[arg(long, env = "NMSTACK_INTERFACE", global = true)]
    pub interface: Option<String>,

    /// NetBox のデータベース構成 (postgres / mariadb / shared)
    #[arg(long, env = "NMSTACK_DB_VARIANT", global = true)]
    pub db_variant: Option<InventoryDatabase>,

    #[arg(long, env = "NMSTACK_NETBOX_PORT", global = true)]
    pub netbox_port: Option<u16>,

    #[arg(long, env = "NMSTACK_LIBRENMS_PORT", global = true)]
    pub librenms_port: Option<u16>,

    #[arg(long, env = "NMSTACK_OXIDIZED_PORT", global = true)]
    pub oxidized_port: Option<u16>,

    #[arg(long, env = "NMSTACK_NTOPNG_PORT", global = true)]
    pub ntopng_port: Option<u16>,

    /// 通知メールの SMTP サーバー（未指定ならメールリレーを起動しない）
    #[arg(long, env = "NMSTACK_SMTP_HOST", global = true)]
    pub smtp_host: Option<String>,

    #[arg(long, env = "NMSTACK_SMTP_PORT", global = true)]
    pub smtp_port: Option<u16>,

    #[arg(long, env = "NMSTACK_SMTP_USER", global = true)]
    pub smtp_user: Option<String>,

    #[arg(long, env = "NMSTACK_SMTP_PASSWORD", global = true, hide_env_values = true)]
    pub smtp_password: Option<String>,

    #[arg(long, env = "NMSTACK_SMTP_FROM", global = true)]
    pub smtp_from: Option<String>,

    /// 対話入力を行わない（端末でない場合は常に非対話）
    #[arg(long, env = "NMSTACK_NON_INTERACTIVE", global = true)]
    pub non_interactive: bool,
}

impl StackArgs {
    /// 指定されたフラグで設定を上書き
    pub fn apply(&self, config: &mut StackConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut config.base_dir, &self.base_dir);
        set(&mut config.timezone, &self.timezone);
        set(&mut config.monitor_interface, &self.interface);
        set(&mut config.inventory_database, &self.db_variant);
        set(&mut config.ports.netbox, &self.netbox_port);
        set(&mut config.ports.librenms, &self.librenms_port);
        set(&mut config.ports.oxidized, &self.oxidized_port);
        set(&mut config.ports.ntopng, &self.ntopng_port);
        set(&mut config.smtp.host, &self.smtp_host);
        set(&mut config.smtp.port, &self.smtp_port);
        set(&mut config.smtp.username, &self.smtp_user);
        set(&mut config.smtp.password, &self.smtp_password);
        set(&mut config.smtp.from, &self.smtp_from);
    }

    /// 対話入力を行うか
    pub fn interactive(&self) -> bool {
        !self.non_interactive && std::io::stdin().is_terminal()
    }

    /// 設定ファイル・フラグ・対話入力から設定を組み立てて検証
    pub fn resolve(&self, allow_prompt: bool) -> anyhow::Result<StackConfig> {
        let mut config = match nmstack_config::load_config::<StackConfig>(self.config.as_deref())? {
            Some((path, config)) => {
                info!(path = %path.display(), "Loaded config file");
                config
            }
            None => StackConfig::default(),
        };

        self.apply(&mut config);

        if allow_prompt && self.interactive() {
            Prompter::stdio().fill(&mut config)?;
        }

        config.validate()?;
        Ok(config)
    }
}
