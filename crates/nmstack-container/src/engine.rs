//! コンテナエンジン
//!
//! フェーズランナーが必要とする操作（ネットワーク、イメージ、Compose 起動、プローブ）を
//! トレイトにまとめ、Docker 実装を提供します。

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::compose::ComposeCommand;
use crate::error::{ContainerError, Result};
use crate::image;
use crate::probe;
use crate::runner::{CommandRunner, SystemRunner};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures_util::stream::StreamExt;
use nmstack_core::Probe;
use std::path::Path;
use tracing::{debug, info};

/// ネットワーク作成の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Created,
    AlreadyExists,
}

/// フェーズランナーから見たコンテナエンジン
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// ブリッジネットワークを作成（既存なら何もしない）
    async fn ensure_network(&self, name: &str) -> Result<NetworkStatus>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// マニフェストのサービスを起動（`services` が空なら全サービス）
    async fn compose_up(&self, project: &str, manifest: &Path, services: &[&str]) -> Result<()>;

    /// プローブを1回実行。`Ok(false)` とエラーはどちらも「未準備」
    async fn probe(&self, probe: &Probe) -> Result<bool>;
}

/// Docker Engine API と docker compose CLI を使う実装
pub struct DockerEngine<R: CommandRunner = SystemRunner> {
    docker: Docker,
    compose: ComposeCommand,
    runner: R,
    http: reqwest::Client,
}

impl DockerEngine<SystemRunner> {
    /// ローカルの Docker に接続し、Compose の有無を確認
    pub async fn connect() -> Result<Self> {
        Self::connect_with(SystemRunner).await
    }
}

impl<R: CommandRunner> DockerEngine<R> {
    pub async fn connect_with(runner: R) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;

        let compose = ComposeCommand::detect(&runner).await?;
        info!(%compose, "Docker engine connected");

        let http = probe::http_client().map_err(|e| ContainerError::ProbeFailed(e.to_string()))?;

        Ok(Self {
            docker,
            compose,
            runner,
            http,
        })
    }

    pub fn compose(&self) -> ComposeCommand {
        self.compose
    }

    /// コンテナ内でコマンドを実行し、終了コードと標準出力で判定
    async fn exec_probe(
        &self,
        container: &str,
        command: &[String],
        expect: Option<&str>,
    ) -> Result<bool> {
        let exec_config = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let message = self.docker.create_exec(container, exec_config).await?;

        let mut stdout = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&message.id, None).await?
        {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        let stderr = String::from_utf8_lossy(&message);
                        debug!(container, stderr = %stderr.trim(), "exec stderr");
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&message.id).await?;
        Ok(exec_succeeded(inspect.exit_code, &stdout, expect))
    }
}

/// 1回のプローブを `PROBE_TIMEOUT` で打ち切る（時間切れは「未準備」）
async fn with_attempt_timeout<F>(check: F) -> Result<bool>
where
    F: Future<Output = Result<bool>>,
{
    match tokio::time::timeout(probe::PROBE_TIMEOUT, check).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout = ?probe::PROBE_TIMEOUT, "Probe timed out");
            Ok(false)
        }
    }
}

fn exec_succeeded(exit_code: Option<i64>, stdout: &str, expect: Option<&str>) -> bool {
    exit_code == Some(0) && expect.is_none_or(|text| stdout.contains(text))
}

#[async_trait]
impl<R: CommandRunner> ContainerEngine for DockerEngine<R> {
    async fn ensure_network(&self, name: &str) -> Result<NetworkStatus> {
        let network_config = bollard::models::NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            ..Default::default()
        };

        match self.docker.create_network(network_config).await {
            Ok(_) => Ok(NetworkStatus::Created),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(NetworkStatus::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        image::pull_image(&self.docker, image).await
    }

    async fn compose_up(&self, project: &str, manifest: &Path, services: &[&str]) -> Result<()> {
        self.compose.up(&self.runner, project, manifest, services).await
    }

    async fn probe(&self, target: &Probe) -> Result<bool> {
        match target {
            Probe::Exec {
                container,
                command,
                expect,
            } => {
                with_attempt_timeout(self.exec_probe(container, command, expect.as_deref())).await
            }
            Probe::Tcp { host, port } => Ok(probe::tcp_open(host, *port).await?),
            Probe::Http { url } => probe::http_ready(&self.http, url)
                .await
                .map_err(|e| ContainerError::ProbeFailed(e.to_string())),
        }
    }
}
