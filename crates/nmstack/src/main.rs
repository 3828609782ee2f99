mod args;
mod commands;
mod logger;
mod privilege;
mod prompt;
mod runner;

use args::StackArgs;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nmstack")]
#[command(
    about = "ネットワーク監視スタック (NetBox / LibreNMS / Oxidized / ntopng / Zeek) を1台のホストに構築",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    stack: StackArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// 全フェーズを実行してスタックを構築（デフォルト）
    Up,
    /// 全フェーズのファイルだけを書き出す（root 権限不要）
    Render,
    /// コンテナランタイムだけをインストール
    InstallRuntime,
    /// フェーズの一覧を表示
    Plan,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Up) {
        Commands::Up => commands::up::handle(&cli.stack).await,
        Commands::Render => commands::render::handle(&cli.stack).await,
        Commands::InstallRuntime => commands::install_runtime::handle().await,
        Commands::Plan => commands::plan::handle(&cli.stack).await,
        Commands::Version => {
            println!("nmstack {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
