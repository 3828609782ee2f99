use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerデーモンが起動しているか確認してください: systemctl status docker\n  • nmstack install-runtime でランタイムをインストールできます"
    )]
    DockerConnectionFailed(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error(
        "イメージ '{image}' のダウンロードに失敗しました: {message}\n\nヒント:\n  • イメージ名とタグを確認してください\n  • ネットワーク接続とレジストリの認証情報 (~/.docker/config.json) を確認してください"
    )]
    ImagePullFailed { image: String, message: String },

    #[error(
        "docker compose が見つかりません\n\nヒント:\n  • docker-compose-plugin をインストールしてください\n  • またはスタンドアロンの docker-compose を PATH に配置してください"
    )]
    ComposeUnavailable,

    #[error("コンテナの起動に失敗しました (project: {project})\n{stderr}")]
    ComposeFailed { project: String, stderr: String },

    #[error("コマンドの実行に失敗しました: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error(
        "未対応のパッケージマネージャです: {0}\n\nヒント:\n  • 対応しているのは apt (Debian/Ubuntu) と dnf (Fedora/RHEL系) です\n  • Docker を手動でインストールしてから再実行してください"
    )]
    UnsupportedPackageManager(String),

    #[error(
        "インストール後もコンテナランタイムが利用できません\n\nヒント:\n  • docker --version が動作するか確認してください\n  • journalctl -u docker でデーモンのログを確認してください"
    )]
    RuntimeUnavailable,

    #[error("到達確認に失敗しました: {0}")]
    ProbeFailed(String),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError { .. } => {
                // ステータスコードに応じた処理は呼び出し側で行う
                ContainerError::DockerApiError(err.to_string())
            }
            _ => {
                // 接続エラーの可能性をチェック
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
