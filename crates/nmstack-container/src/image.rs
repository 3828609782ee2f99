//! イメージの取得

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::error::{ContainerError, Result};
use bollard::Docker;
use bollard::image::CreateImageOptions;
use bollard::models::CreateImageInfo;
use colored::Colorize;
use futures_util::stream::StreamExt;
use std::io::Write;
use std::path::Path;

/// Docker config.json からレジストリの認証情報を取得
pub fn get_docker_credentials(registry: &str) -> Option<bollard::auth::DockerCredentials> {
    let config_path = dirs::home_dir()?.join(".docker/config.json");
    credentials_from_file(&config_path, registry)
}

fn credentials_from_file(
    config_path: &Path,
    registry: &str,
) -> Option<bollard::auth::DockerCredentials> {
    let config_content = std::fs::read_to_string(config_path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&config_content).ok()?;

    let auths = config.get("auths")?.as_object()?;
    let auth_b64 = auths.get(registry)?.get("auth")?.as_str()?;

    // Base64 デコード (username:password 形式)
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()?;
    let auth_str = String::from_utf8(decoded).ok()?;
    let (username, password) = auth_str.split_once(':')?;

    Some(bollard::auth::DockerCredentials {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    })
}

/// イメージ名からレジストリを抽出
///
/// 最初の `/` の前に `.` か `:` を含む場合のみレジストリとみなす（例: ghcr.io, localhost:5000）
pub fn extract_registry(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    (first.contains('.') || first.contains(':')).then_some(first)
}

/// イメージ名とタグを分離
/// 例: "redis:7-alpine" -> ("redis", "7-alpine")
///     "localhost:5000/app" -> ("localhost:5000/app", "latest")
pub fn parse_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

/// 最新イメージを取得（既にあっても毎回確認する）
pub async fn pull_image(docker: &Docker, image: &str) -> Result<()> {
    let (image_name, tag) = parse_image_tag(image);

    println!("  ↓ イメージをプル中: {}", image.cyan());

    let credentials = extract_registry(image).and_then(get_docker_credentials);

    let options = CreateImageOptions {
        from_image: image_name,
        tag,
        ..Default::default()
    };

    let mut stream = docker.create_image(Some(options), None, credentials);

    while let Some(info) = stream.next().await {
        match info {
            Ok(CreateImageInfo {
                status: Some(status),
                progress: Some(progress),
                ..
            }) => {
                // 進捗を表示（同じ行に上書き）
                print!("\r  ↓ {}: {}", status, progress);
                std::io::stdout().flush()?;
            }
            Ok(CreateImageInfo {
                status: Some(status),
                ..
            }) => {
                print!("\r  ↓ {}                    ", status);
                std::io::stdout().flush()?;
            }
            Err(e) => {
                println!();
                return Err(ContainerError::ImagePullFailed {
                    image: image.to_string(),
                    message: e.to_string(),
                });
            }
            _ => {}
        }
    }

    println!();
    println!("  ✓ プル完了: {}", image);

    Ok(())
}
