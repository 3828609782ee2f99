//! 実行ごとに生成するシークレット
//!
//! 生成した値は描画するファイルにのみ書き込まれ、単独では永続化しない。

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;

const PASSWORD_LEN: usize = 32;
const SECRET_KEY_LEN: usize = 64;
const API_TOKEN_LEN: usize = 40;

/// 1回の実行で使うシークレット一式
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub netbox_db_password: String,
    pub netbox_redis_password: String,
    pub netbox_redis_cache_password: String,
    /// Django の SECRET_KEY（50文字以上が必要）
    pub netbox_secret_key: String,
    pub netbox_admin_password: String,
    pub netbox_api_token: String,
    pub librenms_db_password: String,
    pub db_root_password: String,
    /// Oxidized の機器ログインパスワード（設定で未指定の場合のみ使用）
    pub device_password: String,
}

impl Secrets {
    /// OS の乱数源からシークレットを生成
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// 任意の乱数生成器からシークレットを生成
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            netbox_db_password: alphanumeric(rng, PASSWORD_LEN),
            netbox_redis_password: alphanumeric(rng, PASSWORD_LEN),
            netbox_redis_cache_password: alphanumeric(rng, PASSWORD_LEN),
            netbox_secret_key: alphanumeric(rng, SECRET_KEY_LEN),
            netbox_admin_password: alphanumeric(rng, 24),
            netbox_api_token: hex_token(rng, API_TOKEN_LEN),
            librenms_db_password: alphanumeric(rng, PASSWORD_LEN),
            db_root_password: alphanumeric(rng, PASSWORD_LEN),
            device_password: alphanumeric(rng, 24),
        }
    }
}

// ログに値が漏れないようにする
impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

fn alphanumeric<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

fn hex_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..len)
        .map(|_| char::from(HEX[rng.gen_range(0..HEX.len())]))
        .collect()
}
