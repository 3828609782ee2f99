//! ホストコマンドの実行
//!
//! パッケージマネージャや docker CLI の呼び出しはすべてこのトレイトを通す。

use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// コマンドの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// ホスト上でのコマンド実行とファイル操作
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// コマンドを実行（プログラムが存在しない場合は失敗として返す）
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    async fn read_file(&self, path: &Path) -> Result<String>;

    /// コマンドを実行し、失敗したらエラーにする
    async fn run_checked(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.run(program, args).await?;
        if !output.success {
            return Err(ContainerError::CommandFailed {
                command: format_command(program, args),
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }
}

pub(crate) fn format_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 実際にプロセスを起動するランナー
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!("Running: {}", format_command(program, args));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => Ok(CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CommandOutput::failed(
                format!("{}: command not found", program),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }
}
