//! フェーズランナー
//!
//! フェーズを番号順に1つずつ実行する。致命的なフェーズが失敗したら即座に中止し、
//! 以降のフェーズはファイルの書き出しも行わない。ロールバックはしない。

use crate::logger::{PhaseLogger, RunReport};
use nmstack_container::{ContainerEngine, NetworkStatus};
use nmstack_core::{
    CancelSignal, PhasePlan, PollError, Probe, StackConfig, TemplateProcessor, poll_until_ready,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Phase {index} ({name}) が失敗したため中止しました: {reason}")]
    Aborted {
        index: u8,
        name: &'static str,
        reason: String,
    },

    #[error("中断されました (Phase {index}: {name})")]
    Cancelled { index: u8, name: &'static str },
}

/// フェーズ内の失敗
#[derive(Debug)]
enum PhaseFailure {
    Step(String),
    Cancelled,
}

pub struct PhaseRunner<'a, E: ContainerEngine + ?Sized> {
    engine: &'a E,
    config: &'a StackConfig,
    processor: &'a TemplateProcessor,
    cancel: CancelSignal,
    logger: PhaseLogger,
}

impl<'a, E: ContainerEngine + ?Sized> PhaseRunner<'a, E> {
    pub fn new(
        engine: &'a E,
        config: &'a StackConfig,
        processor: &'a TemplateProcessor,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            engine,
            config,
            processor,
            cancel,
            logger: PhaseLogger::new(),
        }
    }

    /// 全フェーズを順に実行
    pub async fn run(&mut self, phases: &[PhasePlan]) -> Result<(), RunError> {
        for phase in phases {
            if self.cancel.is_cancelled() {
                return Err(RunError::Cancelled {
                    index: phase.index,
                    name: phase.name,
                });
            }

            self.logger.start_phase(phase);
            match self.run_phase(phase).await {
                Ok(()) => self.logger.phase_completed(),
                Err(PhaseFailure::Cancelled) => {
                    self.logger.phase_failed("中断されました");
                    return Err(RunError::Cancelled {
                        index: phase.index,
                        name: phase.name,
                    });
                }
                Err(PhaseFailure::Step(reason)) if phase.criticality.is_fatal() => {
                    self.logger.phase_failed(&reason);
                    return Err(RunError::Aborted {
                        index: phase.index,
                        name: phase.name,
                        reason,
                    });
                }
                Err(PhaseFailure::Step(reason)) => {
                    warn!(phase = phase.name, %reason, "Best-effort phase failed");
                    self.logger.phase_degraded(&reason);
                }
            }
        }
        Ok(())
    }

    pub fn into_report(self) -> RunReport {
        self.logger.into_report()
    }

    #[tracing::instrument(skip_all, fields(phase = phase.name))]
    async fn run_phase(&mut self, phase: &PhasePlan) -> Result<(), PhaseFailure> {
        let base_dir = &self.config.base_dir;

        // 1. ディレクトリとファイル
        let written = phase
            .render(base_dir, self.processor)
            .map_err(|e| PhaseFailure::Step(e.to_string()))?;
        self.logger
            .log_detail(&format!("{} 個のファイルを書き出しました", written.len()));

        // 2. ネットワーク
        for network in &phase.networks {
            let status = until_cancelled(&self.cancel, self.engine.ensure_network(network))
                .await?
                .map_err(|e| PhaseFailure::Step(format!("ネットワーク {}: {}", network, e)))?;
            match status {
                NetworkStatus::Created => self
                    .logger
                    .log_detail(&format!("ネットワーク作成: {}", network)),
                NetworkStatus::AlreadyExists => self
                    .logger
                    .log_detail(&format!("ネットワークは既に存在します: {}", network)),
            }
        }

        let Some(unit) = &phase.compose else {
            return Ok(());
        };

        // 3. イメージ（ベストエフォートでは取得できたものだけで続行）
        let mut missing: Vec<&str> = Vec::new();
        for image in unit.manifest.images() {
            match until_cancelled(&self.cancel, self.engine.pull_image(image)).await? {
                Ok(()) => {}
                Err(e) if phase.criticality.is_fatal() => {
                    return Err(PhaseFailure::Step(e.to_string()));
                }
                Err(e) => {
                    warn!(phase = phase.name, image, error = %e, "Image pull failed");
                    self.logger.log_warning(&e.to_string());
                    missing.push(image);
                }
            }
        }

        // 4. 起動
        let services = unit.manifest.startable_services(&missing);
        if services.is_empty() {
            return Err(PhaseFailure::Step(format!(
                "起動できるサービスがありません (イメージ取得失敗: {})",
                missing.join(", ")
            )));
        }
        let selected: &[&str] = if missing.is_empty() { &[] } else { &services };

        let manifest_path = base_dir.join(&unit.file);
        self.logger.log_detail(&format!("起動中: {}", services.join(", ")));
        let start = self
            .engine
            .compose_up(&unit.manifest.project, &manifest_path, selected);
        until_cancelled(&self.cancel, start)
            .await?
            .map_err(|e| PhaseFailure::Step(e.to_string()))?;

        // 5. 準備完了チェック
        let declared = unit.manifest.container_names();
        for check in &phase.checks {
            // 起動しなかったサービスのチェックは行わない
            if let Probe::Exec { container, .. } = &check.probe
                && declared.contains(&container.as_str())
                && !services.contains(&container.as_str())
            {
                let reason = format!("{}: {} は起動していません", check.description, container);
                self.logger.log_warning(&reason);
                continue;
            }

            self.logger
                .log_detail(&format!("待機中: {} ({})", check.description, check.policy));

            let engine = self.engine;
            let probe = &check.probe;
            let polled =
                poll_until_ready(&check.policy, &self.cancel, move |_| engine.probe(probe)).await;
            match polled {
                Ok(attempts) => {
                    info!(check = %check.description, attempts, "Ready");
                    self.logger.log_ready(&check.description, attempts);
                }
                Err(PollError::Cancelled { .. }) => return Err(PhaseFailure::Cancelled),
                Err(e @ PollError::Exhausted { .. }) => {
                    return Err(PhaseFailure::Step(format!("{}: {}", check.description, e)));
                }
            }
        }

        if !missing.is_empty() {
            return Err(PhaseFailure::Step(format!(
                "イメージを取得できませんでした: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }
}

/// 中断要求と競わせてステップを実行
async fn until_cancelled<T>(
    cancel: &CancelSignal,
    step: impl Future<Output = T>,
) -> Result<T, PhaseFailure> {
    if cancel.is_cancelled() {
        return Err(PhaseFailure::Cancelled);
    }
    tokio::select! {
        output = step => Ok(output),
        _ = cancel.cancelled() => Err(PhaseFailure::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::PhaseResult;
    use async_trait::async_trait;
    use nmstack_container::{ContainerError, Result as ContainerResult};
    use nmstack_core::{Probe, RetryPolicy, Secrets, build_plan, cancel_pair};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    type ProbeFn = Box<dyn Fn(&Probe) -> bool + Send + Sync>;

    /// 呼び出しを記録するエンジン
    struct MockEngine {
        events: Mutex<Vec<String>>,
        on_probe: ProbeFn,
        failing_images: Vec<&'static str>,
        pull_delay: Duration,
    }

    impl MockEngine {
        fn new(on_probe: impl Fn(&Probe) -> bool + Send + Sync + 'static) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                on_probe: Box::new(on_probe),
                failing_images: Vec::new(),
                pull_delay: Duration::ZERO,
            }
        }

        fn ready() -> Self {
            Self::new(|_| true)
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }
    }

    #[async_trait]
    impl ContainerEngine for MockEngine {
        async fn ensure_network(&self, name: &str) -> ContainerResult<NetworkStatus> {
            self.events.lock().unwrap().push(format!("network {}", name));
            Ok(NetworkStatus::Created)
        }

        async fn pull_image(&self, image: &str) -> ContainerResult<()> {
            self.events.lock().unwrap().push(format!("pull {}", image));
            tokio::time::sleep(self.pull_delay).await;
            if self.failing_images.iter().any(|i| *i == image) {
                return Err(ContainerError::ImagePullFailed {
                    image: image.to_string(),
                    message: "manifest unknown".to_string(),
                });
            }
            Ok(())
        }

        async fn compose_up(
            &self,
            project: &str,
            manifest: &Path,
            services: &[&str],
        ) -> ContainerResult<()> {
            assert!(manifest.exists(), "manifest must be written before start");
            let event = if services.is_empty() {
                format!("up {}", project)
            } else {
                format!("up {} {}", project, services.join(" "))
            };
            self.events.lock().unwrap().push(event);
            Ok(())
        }

        async fn probe(&self, target: &Probe) -> ContainerResult<bool> {
            self.events.lock().unwrap().push(format!("probe {}", target));
            Ok((self.on_probe)(target))
        }
    }

    fn setup(dir: &Path) -> (StackConfig, TemplateProcessor) {
        let config = StackConfig {
            base_dir: dir.to_path_buf(),
            ..Default::default()
        };
        let processor = TemplateProcessor::for_stack(&config, &Secrets::generate());
        (config, processor)
    }

    fn is_container(probe: &Probe, name: &str) -> bool {
        matches!(probe, Probe::Exec { container, .. } if container == name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_phases_attempted_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);
        let engine = MockEngine::ready();

        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        runner.run(&plan).await.unwrap();
        let report = runner.into_report();

        let indices: Vec<u8> = report.records.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..=8).collect::<Vec<_>>());
        assert!(report.all_success());

        let ups: Vec<String> = engine
            .events()
            .into_iter()
            .filter(|e| e.starts_with("up "))
            .collect();
        assert_eq!(
            ups,
            vec![
                "up nmstack-netbox-db",
                "up nmstack-netbox",
                "up nmstack-librenms",
                "up nmstack-oxidized",
                "up nmstack-passive",
            ]
        );
        assert_eq!(engine.events()[0], "network nmstack");
        assert!(temp.path().join("completeness/check_completeness.sh").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_files_exist_before_readiness_check() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);

        let base = temp.path().to_path_buf();
        let engine = MockEngine::new(move |probe| {
            if let Probe::Tcp { port: 8888, .. } = probe {
                assert!(base.join("oxidized/config/config").exists());
                assert!(base.join("oxidized/config/router.db").exists());
                assert!(base.join("oxidized/docker-compose.yml").exists());
            }
            if is_container(probe, "netbox-postgres") {
                assert!(base.join("netbox/postgres.env").exists());
                // 次のフェーズはまだ書き出されていない
                assert!(!base.join("netbox/netbox.env").exists());
            }
            true
        });

        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        runner.run(&plan).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_check_exhaustion_aborts_run() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let mut plan = build_plan(&config);
        plan[1].checks[0].policy = RetryPolicy::new(5, Duration::from_secs(2));

        let engine = MockEngine::new(|probe| !is_container(probe, "netbox-postgres"));

        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        let err = runner.run(&plan).await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Aborted {
                index: 1,
                name: "inventory-database",
                ..
            }
        ));
        assert_eq!(engine.count("probe exec netbox-postgres"), 5);
        // Phase 2 は書き出しも起動もされない
        assert!(!temp.path().join("netbox/netbox.env").exists());
        assert!(!temp.path().join("netbox/docker-compose.yml").exists());
        assert!(!engine.events().contains(&"up nmstack-netbox".to_string()));
        assert_eq!(engine.count("up nmstack-netbox-db"), 1);

        let report = runner.into_report();
        assert_eq!(report.failed().unwrap().index, 1);
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_failure_continues() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let mut plan = build_plan(&config);
        plan[5].checks[0].policy = RetryPolicy::new(3, Duration::from_secs(2));

        let engine = MockEngine::new(|probe| {
            !matches!(probe, Probe::Http { url } if url.ends_with(":3000/"))
        });

        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        runner.run(&plan).await.unwrap();
        let report = runner.into_report();

        let degraded = report.degraded();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].index, 5);
        assert_eq!(report.records.len(), 9);
        assert!(report.failed().is_none());
        assert!(temp.path().join("compute/compute_metrics.sh").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_pull_failure_in_best_effort_phase_starts_remaining_services() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);

        let mut engine = MockEngine::ready();
        engine.failing_images = vec![nmstack_core::images::ZEEK];
        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        runner.run(&plan).await.unwrap();

        // zeek を除いて起動し、ntopng のチェックも実行する
        let events = engine.events();
        assert!(events.contains(&"up nmstack-passive ntopng".to_string()));
        assert_eq!(engine.count("probe http http://127.0.0.1:3000/"), 1);

        let report = runner.into_report();
        let degraded = report.degraded();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].name, "passive");
        match &degraded[0].result {
            PhaseResult::Degraded { error, .. } => assert!(error.contains("zeek")),
            other => panic!("Expected Degraded, got {:?}", other),
        }
        assert_eq!(report.records.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_images_missing_in_best_effort_phase_skips_start() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);

        let mut engine = MockEngine::ready();
        engine.failing_images = vec![nmstack_core::images::ZEEK, nmstack_core::images::NTOPNG];
        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        runner.run(&plan).await.unwrap();

        assert_eq!(engine.count("up nmstack-passive"), 0);
        let report = runner.into_report();
        assert_eq!(report.degraded()[0].name, "passive");
        assert_eq!(report.records.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_pull_failure_in_fatal_phase_aborts() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);

        let mut engine = MockEngine::ready();
        engine.failing_images = vec![nmstack_core::images::OXIDIZED];
        let mut runner = PhaseRunner::new(&engine, &config, &processor, CancelSignal::never());
        let err = runner.run(&plan).await.unwrap_err();

        assert!(matches!(err, RunError::Aborted { index: 4, .. }));
        assert!(!temp.path().join("passive/docker-compose.yml").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_poll_stops_run() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);
        let (handle, signal) = cancel_pair();

        let engine = MockEngine::new(|probe| !is_container(probe, "netbox-redis"));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            handle.cancel();
        });

        let mut runner = PhaseRunner::new(&engine, &config, &processor, signal);
        let err = runner.run(&plan).await.unwrap_err();

        assert_eq!(
            err,
            RunError::Cancelled {
                index: 1,
                name: "inventory-database"
            }
        );
        assert!(engine.count("probe exec netbox-redis ") < 30);
        let report = runner.into_report();
        assert!(matches!(
            report.records.last().unwrap().result,
            PhaseResult::Failed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_image_pull_skips_start() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);
        let (handle, signal) = cancel_pair();

        let mut engine = MockEngine::ready();
        engine.pull_delay = Duration::from_secs(30);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            handle.cancel();
        });

        let start = tokio::time::Instant::now();
        let mut runner = PhaseRunner::new(&engine, &config, &processor, signal);
        let err = runner.run(&plan).await.unwrap_err();

        assert!(matches!(err, RunError::Cancelled { index: 1, .. }));
        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(engine.count("pull "), 1);
        assert_eq!(engine.count("up "), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_renders_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let (config, processor) = setup(temp.path());
        let plan = build_plan(&config);
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let engine = MockEngine::ready();
        let mut runner = PhaseRunner::new(&engine, &config, &processor, signal);
        let err = runner.run(&plan).await.unwrap_err();

        assert!(matches!(err, RunError::Cancelled { index: 0, .. }));
        assert!(engine.events().is_empty());
        assert!(!temp.path().join("stack.env").exists());
    }
}
