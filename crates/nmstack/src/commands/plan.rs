use crate::args::StackArgs;
use colored::Colorize;
use nmstack_core::{Criticality, build_plan};

/// フェーズの一覧を表示
pub async fn handle(args: &StackArgs) -> anyhow::Result<()> {
    let config = args.resolve(false)?;

    println!(
        "{} (ベースディレクトリ: {})",
        "プロビジョニング計画".bold(),
        config.base_dir.display().to_string().cyan()
    );

    for phase in build_plan(&config) {
        let criticality = match phase.criticality {
            Criticality::Fatal => phase.criticality.label().red(),
            Criticality::BestEffort => phase.criticality.label().yellow(),
        };
        println!();
        println!(
            "Phase {}: {} [{}] {}",
            phase.index,
            phase.title.bold(),
            criticality,
            phase.name.dimmed()
        );

        for network in &phase.networks {
            println!("  network: {}", network.cyan());
        }
        if let Some(unit) = &phase.compose {
            println!("  compose: {}", config.base_dir.join(&unit.file).display());
        }
        for image in phase.images() {
            println!("  image:   {}", image);
        }
        for check in &phase.checks {
            println!(
                "  check:   {} ({}, {})",
                check.description,
                check.probe.to_string().dimmed(),
                check.policy
            );
        }
    }
    Ok(())
}
