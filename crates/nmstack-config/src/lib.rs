pub mod error;

pub use error::*;

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_ENV: &str = "NMSTACK_CONFIG";

const CONFIG_FILE: &str = "nmstack.yaml";

/// nmstack のグローバル設定ディレクトリ (~/.config/nmstack)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("nmstack"))
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索（見つからなければ `Ok(None)`、設定ファイルは任意）:
/// 1. 環境変数 NMSTACK_CONFIG (直接パス指定、存在しなければエラー)
/// 2. カレントディレクトリ: nmstack.yaml
/// 3. ./.nmstack/nmstack.yaml
/// 4. ~/.config/nmstack/nmstack.yaml (グローバル設定)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリ
    let path = current_dir.join(CONFIG_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    // 3. ./.nmstack/ ディレクトリ
    let path = current_dir.join(".nmstack").join(CONFIG_FILE);
    if path.exists() {
        return Ok(Some(path));
    }

    // 4. グローバル設定ファイル
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join(CONFIG_FILE);
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// YAML ファイルを読み込む
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// 設定ファイルを読み込む
///
/// `explicit` が指定されていればそれを、無ければ [`find_config_file`] の結果を使う。
/// 設定ファイルが無い場合は `Ok(None)`。
pub fn load_config<T: DeserializeOwned>(explicit: Option<&Path>) -> Result<Option<(PathBuf, T)>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match find_config_file()? {
            Some(path) => path,
            None => return Ok(None),
        },
    };
    let value = read_yaml(&path)?;
    Ok(Some((path, value)))
}
