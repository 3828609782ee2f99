//! フェーズ定義
//!
//! フェーズは番号順に実行される1ステップ。書き出すファイル、起動するサービス、
//! 準備完了チェック、失敗時の扱い（致命的／ベストエフォート）を持つ。

use crate::error::{CoreError, Result};
use crate::manifest::ComposeManifest;
use crate::poller::RetryPolicy;
use crate::template::{TemplateProcessor, Variables};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// フェーズ失敗時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// 失敗したら以降のフェーズをすべて中止
    Fatal,
    /// 失敗は警告として記録し、次のフェーズへ進む
    BestEffort,
}

impl Criticality {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::BestEffort => "best-effort",
        }
    }
}

/// 準備完了を確認する方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// コンテナ内でコマンドを実行（終了コード0、`expect` 指定時は標準出力に含まれること）
    Exec {
        container: String,
        command: Vec<String>,
        expect: Option<String>,
    },
    /// TCP ポートへの接続
    Tcp { host: String, port: u16 },
    /// HTTP エンドポイント（ステータス 500 未満で準備完了）
    Http { url: String },
}

impl Probe {
    pub fn exec<I, S>(container: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exec {
            container: container.into(),
            command: command.into_iter().map(Into::into).collect(),
            expect: None,
        }
    }

    /// 標準出力に含まれるべき文字列を指定
    pub fn expecting(self, text: impl Into<String>) -> Self {
        match self {
            Self::Exec {
                container, command, ..
            } => Self::Exec {
                container,
                command,
                expect: Some(text.into()),
            },
            other => other,
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec {
                container, command, ..
            } => write!(f, "exec {} `{}`", container, command.join(" ")),
            Self::Tcp { host, port } => write!(f, "tcp {}:{}", host, port),
            Self::Http { url } => write!(f, "http {}", url),
        }
    }
}

/// 準備完了チェック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheck {
    /// 表示用の説明（例: "PostgreSQL 接続受付"）
    pub description: String,
    pub probe: Probe,
    pub policy: RetryPolicy,
}

impl ReadinessCheck {
    pub fn new(description: impl Into<String>, probe: Probe, policy: RetryPolicy) -> Self {
        Self {
            description: description.into(),
            probe,
            policy,
        }
    }
}

/// 書き出すファイルの中身
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// 共通変数 + 追加変数で展開するテンプレート
    Template {
        template: &'static str,
        vars: Variables,
    },
    /// そのまま書き出す文字列
    Literal(String),
}

/// 書き出すファイル
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    /// ベースディレクトリからの相対パス
    pub path: PathBuf,
    pub source: FileSource,
    /// 実行権限を付与するか（スクリプト用）
    pub executable: bool,
}

impl PlannedFile {
    pub fn template(path: impl Into<PathBuf>, template: &'static str) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Template {
                template,
                vars: Variables::new(),
            },
            executable: false,
        }
    }

    pub fn template_with(
        path: impl Into<PathBuf>,
        template: &'static str,
        vars: Variables,
    ) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Template { template, vars },
            executable: false,
        }
    }

    pub fn script(path: impl Into<PathBuf>, template: &'static str) -> Self {
        Self {
            executable: true,
            ..Self::template(path, template)
        }
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }
}

/// Compose で起動するサービス群
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeUnit {
    /// ベースディレクトリからの相対パス
    pub file: PathBuf,
    pub manifest: ComposeManifest,
}

/// 1フェーズ分の計画
#[derive(Debug, Clone, PartialEq)]
pub struct PhasePlan {
    pub index: u8,
    pub name: &'static str,
    /// 表示用タイトル
    pub title: &'static str,
    /// ベースディレクトリからの相対パス（空ならベースディレクトリ自体）
    pub dir: PathBuf,
    pub criticality: Criticality,
    /// ボリュームのマウントポイントなど、事前に作るディレクトリ（相対パス）
    pub data_dirs: Vec<PathBuf>,
    pub files: Vec<PlannedFile>,
    /// 作成を保証するネットワーク
    pub networks: Vec<String>,
    pub compose: Option<ComposeUnit>,
    pub checks: Vec<ReadinessCheck>,
}

impl PhasePlan {
    pub fn new(index: u8, name: &'static str, title: &'static str, dir: &str) -> Self {
        Self {
            index,
            name,
            title,
            dir: PathBuf::from(dir),
            criticality: Criticality::Fatal,
            data_dirs: Vec::new(),
            files: Vec::new(),
            networks: Vec::new(),
            compose: None,
            checks: Vec::new(),
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.criticality = Criticality::BestEffort;
        self
    }

    /// 使用するイメージ
    pub fn images(&self) -> Vec<&str> {
        self.compose
            .as_ref()
            .map(|unit| unit.manifest.images())
            .unwrap_or_default()
    }

    /// フェーズが書き出すファイルの絶対パス（マニフェストを含む）
    pub fn output_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.iter().map(|f| base_dir.join(&f.path)).collect();
        if let Some(unit) = &self.compose {
            paths.push(base_dir.join(&unit.file));
        }
        paths
    }

    /// ディレクトリを作成し、ファイルとマニフェストを書き出す
    ///
    /// 既存ファイルは差分確認もバックアップもせずに上書きする。
    #[tracing::instrument(skip(self, processor), fields(phase = self.name))]
    pub fn render(&self, base_dir: &Path, processor: &TemplateProcessor) -> Result<Vec<PathBuf>> {
        let phase_dir = base_dir.join(&self.dir);
        create_dir(&phase_dir)?;
        for dir in &self.data_dirs {
            create_dir(&base_dir.join(dir))?;
        }

        let mut written = Vec::with_capacity(self.files.len() + 1);

        for file in &self.files {
            let target = base_dir.join(&file.path);
            let content = match &file.source {
                FileSource::Template { template, vars } => {
                    processor.render_with(&file.path, template, vars)?
                }
                FileSource::Literal(text) => text.clone(),
            };
            write_file(&target, &content, file.executable)?;
            written.push(target);
        }

        if let Some(unit) = &self.compose {
            let target = base_dir.join(&unit.file);
            write_file(&target, &unit.manifest.to_yaml()?, false)?;
            written.push(target);
        }

        debug!(files = written.len(), "Phase files written");
        Ok(written)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| CoreError::io(path, e))
}

/// ファイルを書き出す（親ディレクトリは自動作成）
pub fn write_file(path: &Path, content: &str, executable: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    std::fs::write(path, content).map_err(|e| CoreError::io(path, e))?;

    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| CoreError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    Ok(())
}
