//! 準備完了ポーリング
//!
//! 固定間隔・回数上限付きのリトライ。指数バックオフもジッタもなし。
//! DB の接続受付、キャッシュの ping、Web エンドポイントの到達確認すべてで共通に使う。

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// リトライ設定（回数上限と試行間の待機時間）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// 30回 × 2秒
    pub const STANDARD: Self = Self::new(30, Duration::from_secs(2));
    /// 60回 × 2秒
    pub const SLOW: Self = Self::new(60, Duration::from_secs(2));
    /// 90回 × 2秒（初回マイグレーションを伴う Web アプリ用）
    pub const VERY_SLOW: Self = Self::new(90, Duration::from_secs(2));

    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// 全試行が失敗した場合の最大待機時間
    pub fn budget(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} × {}s", self.max_attempts, self.delay.as_secs_f32())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("{attempts}回試行しましたが準備完了になりませんでした")]
    Exhausted { attempts: u32 },

    #[error("中断されました（{attempts}回試行済み）")]
    Cancelled { attempts: u32 },
}

/// 中断要求を送る側
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// 中断要求を受け取る側
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// 中断されることのないシグナル
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// 中断されるまで待つ（送信側が中断せずに破棄された場合は永久に待つ）
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// 中断用のハンドルとシグナルを作成
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// チェックが成功するまで繰り返す
///
/// チェックは最大 `max_attempts` 回呼ばれ、k回目の呼び出しは最初の呼び出しから
/// 少なくとも (k-1) × `delay` 後になる。最後の試行の後には待機しない。
/// チェックがエラーを返した場合は「まだ準備できていない」として扱う。
/// 中断要求は待機中だけでなく、チェックの実行中にも受け付ける。
///
/// # Returns
/// * `Ok(attempts)` - 成功した試行の番号（1始まり）
/// * `Err(PollError)` - 上限到達または中断
pub async fn poll_until_ready<F, Fut, E>(
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    mut check: F,
) -> Result<u32, PollError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: fmt::Display,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled {
                attempts: attempt - 1,
            });
        }

        let outcome = tokio::select! {
            outcome = check(attempt) => outcome,
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled {
                    attempts: attempt - 1,
                });
            }
        };

        match outcome {
            Ok(true) => return Ok(attempt),
            Ok(false) => {
                debug!(attempt, max = policy.max_attempts, "Not ready yet");
            }
            Err(e) => {
                debug!(attempt, max = policy.max_attempts, error = %e, "Readiness probe failed");
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {}
                _ = cancel.cancelled() => {
                    return Err(PollError::Cancelled { attempts: attempt });
                }
            }
        }
    }

    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
    })
}
