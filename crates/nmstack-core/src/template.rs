//! テンプレート展開機能
//!
//! Teraを使用して設定ファイル・環境変数ファイル・スクリプトを描画します。
//! 出力の構文検証は行わない（誤りはコンテナランタイムが読み込んだ時点で表面化する）。

use crate::config::StackConfig;
use crate::error::{CoreError, Result};
use crate::secrets::Secrets;
use std::collections::BTreeMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// 変数コンテキスト
pub type Variables = BTreeMap<String, serde_json::Value>;

/// テンプレートプロセッサ
#[derive(Debug, Clone)]
pub struct TemplateProcessor {
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサを作成
    pub fn new() -> Self {
        Self {
            context: Context::new(),
        }
    }

    /// スタック設定とシークレットから全テンプレート共通の変数を組み立てる
    pub fn for_stack(config: &StackConfig, secrets: &Secrets) -> Self {
        let mut processor = Self::new();
        let db = config.inventory_database;

        processor.add_variables(Variables::from([
            ("base_dir".into(), config.base_dir.display().to_string().into()),
            ("timezone".into(), config.timezone.clone().into()),
            ("network".into(), config.network.clone().into()),
            ("interface".into(), config.monitor_interface.clone().into()),
            ("snmp_community".into(), config.snmp_community.clone().into()),
            ("netbox_port".into(), config.ports.netbox.into()),
            ("librenms_port".into(), config.ports.librenms.into()),
            ("oxidized_port".into(), config.ports.oxidized.into()),
            ("ntopng_port".into(), config.ports.ntopng.into()),
            ("smtp_enabled".into(), config.smtp.enabled().into()),
            ("smtp_host".into(), config.smtp.host.clone().into()),
            ("smtp_port".into(), config.smtp.port.into()),
            ("smtp_user".into(), config.smtp.username.clone().into()),
            ("smtp_password".into(), config.smtp.password.clone().into()),
            ("smtp_from".into(), config.smtp.from.clone().into()),
            ("smtp_starttls".into(), config.smtp.starttls.into()),
            ("netbox_db_variant".into(), db.as_str().into()),
            ("netbox_db_host".into(), db.container_name().into()),
            ("netbox_db_port".into(), db.port().into()),
            ("netbox_db_password".into(), secrets.netbox_db_password.clone().into()),
            ("netbox_redis_password".into(), secrets.netbox_redis_password.clone().into()),
            (
                "netbox_redis_cache_password".into(),
                secrets.netbox_redis_cache_password.clone().into(),
            ),
            ("netbox_secret_key".into(), secrets.netbox_secret_key.clone().into()),
            ("netbox_admin_user".into(), config.netbox.admin_user.clone().into()),
            ("netbox_admin_email".into(), config.netbox.admin_email.clone().into()),
            ("netbox_admin_password".into(), secrets.netbox_admin_password.clone().into()),
            ("netbox_api_token".into(), secrets.netbox_api_token.clone().into()),
            ("librenms_db_host".into(), config.librenms_db_host().into()),
            ("librenms_db_password".into(), secrets.librenms_db_password.clone().into()),
            ("db_root_password".into(), secrets.db_root_password.clone().into()),
            ("oxidized_username".into(), config.oxidized.username.clone().into()),
            (
                "oxidized_password".into(),
                config
                    .oxidized
                    .password
                    .clone()
                    .unwrap_or_else(|| secrets.device_password.clone())
                    .into(),
            ),
        ]));

        processor
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 複数の変数を追加
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&self, template: &str) -> Result<String> {
        Tera::one_off(template, &self.context, false)
            .map_err(|e| CoreError::TemplateRenderError(extract_tera_error_detail(&e)))
    }

    /// 追加の変数を与えて展開（ファイル固有の値用）
    ///
    /// `target` はエラーメッセージにのみ使用する。
    pub fn render_with(&self, target: &Path, template: &str, extra: &Variables) -> Result<String> {
        let mut context = self.context.clone();
        for (key, value) in extra {
            context.insert(key.as_str(), value);
        }

        debug!(target = %target.display(), extra_vars = extra.len(), "Rendering template");

        Tera::one_off(template, &context, false).map_err(|e| CoreError::TemplateError {
            file: target.to_path_buf(),
            message: extract_tera_error_detail(&e),
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Teraエラーから詳細情報を抽出
///
/// Teraのエラーメッセージを解析して、未定義変数などの具体的な情報を取得します。
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    // "Variable `xxx` not found in context"
    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!("未定義の変数: `{}`", var_name);
    }

    if full_error.contains("Filter") && full_error.contains("not found") {
        return format!("未定義のフィルター\n詳細: {full_error}");
    }

    full_error
}
