use crate::args::StackArgs;
use crate::commands::install_runtime::ensure_runtime;
use crate::privilege::require_root;
use crate::runner::PhaseRunner;
use colored::Colorize;
use nmstack_container::DockerEngine;
use nmstack_core::{Secrets, TemplateProcessor, build_plan, cancel_pair};
use tracing::{info, warn};

pub async fn handle(args: &StackArgs) -> anyhow::Result<()> {
    require_root("up")?;
    let config = args.resolve(true)?;

    ensure_runtime().await?;
    let engine = DockerEngine::connect().await?;
    println!("  {} Compose: {}", "✓".green(), engine.compose().to_string().dimmed());

    let secrets = Secrets::generate();
    let processor = TemplateProcessor::for_stack(&config, &secrets);
    let phases = build_plan(&config);
    info!(base_dir = %config.base_dir.display(), phases = phases.len(), "Starting provisioning");

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            println!("{}", "中断を要求しました。現在の処理を停止します...".yellow());
            handle.cancel();
        }
        // 2回目の Ctrl-C で即座に終了
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let mut runner = PhaseRunner::new(&engine, &config, &processor, signal);
    let result = runner.run(&phases).await;
    runner.into_report().print_summary(&config, &host_name());

    result?;
    Ok(())
}

/// サマリーに表示するホスト名
fn host_name() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "Failed to read hostname");
            "localhost".to_string()
        }
    }
}

