//! フェーズ進捗の出力
//!
//! 各フェーズの開始・完了・所要時間をタイムスタンプ付きで出力し、
//! 最後にサマリーを表示する。

use chrono::Local;
use colored::Colorize;
use nmstack_core::{PhasePlan, StackConfig};
use std::time::{Duration, Instant};

/// フェーズの実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    /// 成功
    Completed { duration: Duration },
    /// ベストエフォートのフェーズが失敗（続行した）
    Degraded { error: String, duration: Duration },
    /// 致命的なフェーズが失敗（中止した）
    Failed { error: String, duration: Duration },
}

impl PhaseResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::Completed { duration }
            | Self::Degraded { duration, .. }
            | Self::Failed { duration, .. } => *duration,
        }
    }
}

/// 1フェーズ分の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    pub index: u8,
    pub name: &'static str,
    pub title: &'static str,
    pub result: PhaseResult,
}

/// フェーズログ出力器
pub struct PhaseLogger {
    start_time: Instant,
    records: Vec<PhaseRecord>,
    current: Option<(u8, &'static str, &'static str, Instant)>,
}

impl PhaseLogger {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            records: Vec::new(),
            current: None,
        }
    }

    /// フェーズ開始をログ出力
    pub fn start_phase(&mut self, phase: &PhasePlan) {
        println!();
        println!(
            "[{}] {} Phase {}: {} {}",
            timestamp().dimmed(),
            "▶".cyan(),
            phase.index,
            phase.title.bold(),
            format!("({})", phase.criticality.label()).dimmed()
        );
        self.current = Some((phase.index, phase.name, phase.title, Instant::now()));
    }

    /// 詳細メッセージをログ出力
    pub fn log_detail(&self, message: &str) {
        println!("[{}]   → {}", timestamp().dimmed(), message.cyan());
    }

    /// 警告をログ出力（フェーズは続行）
    pub fn log_warning(&self, message: &str) {
        println!("[{}]   {} {}", timestamp().dimmed(), "⚠".yellow(), message.yellow());
    }

    /// 準備完了チェックの成功をログ出力
    pub fn log_ready(&self, description: &str, attempts: u32) {
        let retries = if attempts > 1 {
            format!(" ({} attempts)", attempts).dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            "[{}]   {} {}{}",
            timestamp().dimmed(),
            "✓".green(),
            description,
            retries
        );
    }

    /// フェーズ成功をログ出力
    pub fn phase_completed(&mut self) {
        if let Some((index, name, title, start)) = self.current.take() {
            let duration = start.elapsed();
            println!(
                "[{}] {} Phase {}: {} 完了 ({})",
                timestamp().dimmed(),
                "✓".green().bold(),
                index,
                title,
                format_duration(duration).dimmed()
            );
            self.push(index, name, title, PhaseResult::Completed { duration });
        }
    }

    /// ベストエフォートのフェーズ失敗をログ出力
    pub fn phase_degraded(&mut self, error: &str) {
        if let Some((index, name, title, start)) = self.current.take() {
            let duration = start.elapsed();
            println!(
                "[{}] {} Phase {}: {} (続行します): {}",
                timestamp().dimmed(),
                "⚠".yellow().bold(),
                index,
                title,
                error.yellow()
            );
            self.push(
                index,
                name,
                title,
                PhaseResult::Degraded {
                    error: error.to_string(),
                    duration,
                },
            );
        }
    }

    /// 致命的なフェーズ失敗をログ出力
    pub fn phase_failed(&mut self, error: &str) {
        if let Some((index, name, title, start)) = self.current.take() {
            let duration = start.elapsed();
            println!(
                "[{}] {} Phase {}: {}: {}",
                timestamp().dimmed(),
                "✗".red().bold(),
                index,
                title,
                error.red()
            );
            self.push(
                index,
                name,
                title,
                PhaseResult::Failed {
                    error: error.to_string(),
                    duration,
                },
            );
        }
    }

    fn push(&mut self, index: u8, name: &'static str, title: &'static str, result: PhaseResult) {
        self.records.push(PhaseRecord {
            index,
            name,
            title,
            result,
        });
    }

    /// 記録をレポートにまとめる
    pub fn into_report(self) -> RunReport {
        RunReport {
            total: self.start_time.elapsed(),
            records: self.records,
        }
    }
}

impl Default for PhaseLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// 実行結果のまとめ
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total: Duration,
    pub records: Vec<PhaseRecord>,
}

impl RunReport {
    /// 失敗したがスキップされたベストエフォートのフェーズ
    pub fn degraded(&self) -> Vec<&PhaseRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.result, PhaseResult::Degraded { .. }))
            .collect()
    }

    /// 中止の原因になったフェーズ
    pub fn failed(&self) -> Option<&PhaseRecord> {
        self.records
            .iter()
            .find(|r| matches!(r.result, PhaseResult::Failed { .. }))
    }

    pub fn all_success(&self) -> bool {
        self.records.iter().all(|r| r.result.is_success())
    }

    /// サマリーを出力
    pub fn print_summary(&self, config: &StackConfig, host: &str) {
        let slowest = self.records.iter().max_by_key(|r| r.result.duration());

        println!();
        println!("{}", "═".repeat(44));
        match self.failed() {
            Some(record) => println!(
                "nmstack: {} (Phase {}: {})",
                "中止".red().bold(),
                record.index,
                record.title
            ),
            None => println!("nmstack: {}", "完了".green().bold()),
        }
        println!("{}", "─".repeat(44));
        println!("Total time:    {}", format_duration(self.total).green());
        if let Some(record) = slowest {
            println!(
                "Slowest phase: {} ({})",
                record.title,
                format_duration(record.result.duration())
            );
        }

        let degraded = self.degraded();
        if degraded.is_empty() {
            println!("Degraded:      {}", "0".green());
        } else {
            println!("Degraded:      {}", degraded.len().to_string().yellow());
            for record in degraded {
                if let PhaseResult::Degraded { error, .. } = &record.result {
                    println!("  • Phase {} {}: {}", record.index, record.title, error.dimmed());
                }
            }
        }

        if self.failed().is_none() {
            println!("{}", "─".repeat(44));
            for (name, url) in service_urls(config, host) {
                println!("{:<14} {}", name, url.cyan());
            }
            println!(
                "NetBox admin:  {} (パスワード: {})",
                config.netbox.admin_user,
                config.base_dir.join("netbox/netbox.env").display()
            );
            println!("{}", "─".repeat(44));
            println!("Scripts:");
            for script in scripts(config) {
                println!("  {}", script.dimmed());
            }
        }
        println!("{}", "═".repeat(44));
    }
}

/// 公開されるサービスの URL
pub fn service_urls(config: &StackConfig, host: &str) -> Vec<(&'static str, String)> {
    let ports = &config.ports;
    vec![
        ("NetBox:", format!("http://{}:{}/", host, ports.netbox)),
        ("LibreNMS:", format!("http://{}:{}/", host, ports.librenms)),
        ("Oxidized:", format!("http://{}:{}/", host, ports.oxidized)),
        ("ntopng:", format!("http://{}:{}/", host, ports.ntopng)),
    ]
}

fn scripts(config: &StackConfig) -> Vec<String> {
    [
        "ingestion/netbox_sync.sh",
        "ingestion/librenms_export.sh",
        "compute/compute_metrics.sh",
        "completeness/check_completeness.sh",
    ]
    .iter()
    .map(|path| config.base_dir.join(path).display().to_string())
    .collect()
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Duration を読みやすい形式にフォーマット
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let minutes = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", minutes, secs)
    } else if total_secs >= 1 {
        format!("{}.{}s", total_secs, millis / 100)
    } else {
        format!("{}ms", millis)
    }
}
