#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// 設定ファイルの探索がホスト環境に影響されないコマンド
fn nmstack(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("nmstack").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env_remove("NMSTACK_CONFIG")
        .env_remove("NMSTACK_BASE_DIR")
        .env_remove("NMSTACK_DB_VARIANT");
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let temp = tempfile::tempdir().unwrap();
    nmstack(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ネットワーク監視スタック"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("install-runtime"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("--db-variant"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let temp = tempfile::tempdir().unwrap();
    nmstack(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "nmstack {}",
            env!("CARGO_PKG_VERSION")
        )));
}

/// render は root 権限なしでファイルを書き出す
#[test]
fn test_render_writes_all_phases() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("stack");

    nmstack(temp.path())
        .args(["render", "--non-interactive", "--base-dir"])
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::contains("Phase 8"));

    for path in [
        "stack.env",
        "netbox/docker-compose.yml",
        "librenms/docker-compose.yml",
        "oxidized/docker-compose.yml",
        "passive/docker-compose.yml",
        "ingestion/netbox_sync.sh",
        "compute/compute_metrics.sh",
        "completeness/check_completeness.sh",
    ] {
        assert!(base.join(path).is_file(), "{} が書き出されていません", path);
    }

    let compose = std::fs::read_to_string(base.join("netbox/docker-compose.yml")).unwrap();
    assert!(compose.contains("netboxcommunity/netbox"));
}

/// 環境変数からも設定を受け取る
#[test]
fn test_render_reads_env_vars() {
    let temp = tempfile::tempdir().unwrap();
    let base = temp.path().join("stack");

    nmstack(temp.path())
        .arg("render")
        .env("NMSTACK_NON_INTERACTIVE", "true")
        .env("NMSTACK_BASE_DIR", &base)
        .env("NMSTACK_LIBRENMS_PORT", "9001")
        .assert()
        .success();

    let compose = std::fs::read_to_string(base.join("librenms/docker-compose.yml")).unwrap();
    assert!(compose.contains("9001"));
}

/// plan はフェーズを番号順に表示する
#[test]
fn test_plan_lists_phases() {
    let temp = tempfile::tempdir().unwrap();
    nmstack(temp.path())
        .args(["plan", "--db-variant", "shared"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Phase 0"))
        .stdout(predicate::str::contains("Phase 8"))
        .stdout(predicate::str::contains("best-effort"))
        .stdout(predicate::str::contains("mariadb"));
}

/// 不明なデータベース構成はエラー
#[test]
fn test_invalid_db_variant_fails() {
    let temp = tempfile::tempdir().unwrap();
    nmstack(temp.path())
        .args(["plan", "--db-variant", "oracle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("oracle"));
}

/// 相対パスのベースディレクトリは設定エラーで終了コード1
#[test]
fn test_relative_base_dir_fails() {
    let temp = tempfile::tempdir().unwrap();
    nmstack(temp.path())
        .args(["render", "--non-interactive", "--base-dir", "relative/stack"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("base_dir"));
}

/// 明示した設定ファイルが無い場合はエラー
#[test]
fn test_missing_config_file_fails() {
    let temp = tempfile::tempdir().unwrap();
    nmstack(temp.path())
        .args(["plan", "--config"])
        .arg(temp.path().join("missing.yaml"))
        .assert()
        .failure();
}
