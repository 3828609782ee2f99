//! ホスト側からの到達確認（TCP / HTTP）

use std::time::Duration;
use tokio::net::TcpStream;

/// 1回の到達確認のタイムアウト
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// TCP ポートに接続できるか
pub async fn tcp_open(host: &str, port: u16) -> std::io::Result<bool> {
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(true),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(false),
    }
}

/// HTTP エンドポイントが応答するか（500 未満なら準備完了）
///
/// リダイレクトやログイン画面の 4xx も「アプリケーションが起動している」とみなす。
pub async fn http_ready(client: &reqwest::Client, url: &str) -> reqwest::Result<bool> {
    let response = client.get(url).timeout(PROBE_TIMEOUT).send().await?;
    let status = response.status();
    tracing::debug!(url, status = status.as_u16(), "HTTP probe");
    Ok(!status.is_server_error())
}

/// プローブ用の HTTP クライアント（リダイレクトは追わない）
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
}
