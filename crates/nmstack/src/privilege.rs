//! 実行権限の確認
//!
//! パッケージのインストールとベースディレクトリへの書き込みに root が必要。
//! 自分自身を sudo で再実行することはせず、不足していれば即座に終了する。

use nix::unistd::{Uid, geteuid};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error(
        "root 権限が必要です (実効 UID: {uid})\n\nヒント:\n  • sudo nmstack {command} で実行してください\n  • ファイルの書き出しだけなら nmstack render は一般ユーザーで実行できます"
    )]
    NotRoot { uid: u32, command: &'static str },
}

/// 実効 UID が root であることを確認
pub fn require_root(command: &'static str) -> Result<(), PrivilegeError> {
    check(geteuid(), command)
}

fn check(uid: Uid, command: &'static str) -> Result<(), PrivilegeError> {
    if uid.is_root() {
        Ok(())
    } else {
        Err(PrivilegeError::NotRoot {
            uid: uid.as_raw(),
            command,
        })
    }
}
