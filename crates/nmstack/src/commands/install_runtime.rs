use crate::privilege::require_root;
use colored::Colorize;
use nmstack_container::{InstallOutcome, RuntimeInstaller, SystemRunner};

pub async fn handle() -> anyhow::Result<()> {
    require_root("install-runtime")?;
    ensure_runtime().await
}

/// コンテナランタイムを確認し、無ければインストール
pub async fn ensure_runtime() -> anyhow::Result<()> {
    println!("{}", "コンテナランタイムを確認中...".blue());

    let runner = SystemRunner;
    match RuntimeInstaller::new(&runner).ensure_installed().await? {
        InstallOutcome::AlreadyInstalled { version } => {
            println!("  {} インストール済み: {}", "✓".green(), version.dimmed());
        }
        InstallOutcome::Installed { version, family } => {
            println!(
                "  {} インストールしました ({}): {}",
                "✓".green().bold(),
                family.program(),
                version.cyan()
            );
        }
    }
    Ok(())
}
