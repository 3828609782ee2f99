//! Compose CLI の検出と呼び出し

use crate::error::{ContainerError, Result};
use crate::runner::CommandRunner;
use std::fmt;
use std::path::Path;

/// 利用可能な Compose コマンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    /// `docker compose`（プラグイン）
    Plugin,
    /// `docker-compose`（スタンドアロン）
    Standalone,
}

impl ComposeCommand {
    /// プラグインを優先して検出。どちらも無ければエラー
    pub async fn detect<R: CommandRunner + ?Sized>(runner: &R) -> Result<Self> {
        if runner.run("docker", &["compose", "version"]).await?.success {
            return Ok(Self::Plugin);
        }
        if runner.run("docker-compose", &["version"]).await?.success {
            return Ok(Self::Standalone);
        }
        Err(ContainerError::ComposeUnavailable)
    }

    pub fn program(&self) -> &'static str {
        match self {
            Self::Plugin => "docker",
            Self::Standalone => "docker-compose",
        }
    }

    /// `up -d` の引数（`services` が空ならマニフェストの全サービス）
    pub fn up_args(&self, project: &str, file: &Path, services: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(7 + services.len());
        if matches!(self, Self::Plugin) {
            args.push("compose".to_string());
        }
        args.extend([
            "-p".to_string(),
            project.to_string(),
            "-f".to_string(),
            file.display().to_string(),
            "up".to_string(),
            "-d".to_string(),
        ]);
        args.extend(services.iter().map(|s| s.to_string()));
        args
    }

    /// サービスを起動（既に起動していれば Compose 側で差分のみ反映）
    pub async fn up<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        project: &str,
        file: &Path,
        services: &[&str],
    ) -> Result<()> {
        let args = self.up_args(project, file, services);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = runner.run(self.program(), &args).await?;
        if !output.success {
            return Err(ContainerError::ComposeFailed {
                project: project.to_string(),
                stderr: output.stderr,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin => write!(f, "docker compose"),
            Self::Standalone => write!(f, "docker-compose"),
        }
    }
}
