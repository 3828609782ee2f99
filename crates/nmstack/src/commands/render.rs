use crate::args::StackArgs;
use colored::Colorize;
use nmstack_core::{Secrets, TemplateProcessor, build_plan};

/// 全フェーズのファイルを書き出す（コンテナには触れない）
pub async fn handle(args: &StackArgs) -> anyhow::Result<()> {
    let config = args.resolve(true)?;
    let secrets = Secrets::generate();
    let processor = TemplateProcessor::for_stack(&config, &secrets);

    println!(
        "{} {}",
        "ファイルを書き出し中:".blue(),
        config.base_dir.display().to_string().cyan()
    );

    let mut total = 0;
    for phase in build_plan(&config) {
        let written = phase.render(&config.base_dir, &processor)?;
        println!("  {} Phase {}: {}", "✓".green(), phase.index, phase.title.bold());
        for path in &written {
            println!("    {}", path.display().to_string().dimmed());
        }
        total += written.len();
    }

    println!();
    println!("{}", format!("✓ {}個のファイルを書き出しました", total).green().bold());
    println!(
        "{}",
        "シークレットは実行ごとに再生成されます（既存の env ファイルは上書きされました）".dimmed()
    );
    Ok(())
}
