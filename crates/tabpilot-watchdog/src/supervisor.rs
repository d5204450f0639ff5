//! The watchdog supervisor: deadline, heartbeat, retry with backoff.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classify::{classify, ClassifyFailure, FailureClass};
use crate::config::WatchdogConfig;
use crate::error::WatchdogError;

/// Notifications emitted around a supervised action.
#[derive(Debug, Clone)]
pub enum WatchdogNotice {
    Started {
        name: String,
        attempt: u32,
    },
    Heartbeat {
        name: String,
        attempt: u32,
        elapsed_ms: u64,
    },
    Succeeded {
        name: String,
        attempt: u32,
    },
    Failed {
        name: String,
        attempt: u32,
        class: FailureClass,
        message: String,
    },
}

/// Sink for watchdog notifications.
pub trait WatchdogObserver: Send + Sync {
    fn notify(&self, notice: WatchdogNotice);
}

/// Default observer that forwards notices to tracing.
pub struct LogObserver;

impl WatchdogObserver for LogObserver {
    fn notify(&self, notice: WatchdogNotice) {
        match notice {
            WatchdogNotice::Started { name, attempt } => {
                debug!("watchdog: '{}' attempt {} started", name, attempt);
            }
            WatchdogNotice::Heartbeat {
                name,
                attempt,
                elapsed_ms,
            } => {
                debug!(
                    "watchdog: '{}' attempt {} alive ({}ms)",
                    name, attempt, elapsed_ms
                );
            }
            WatchdogNotice::Succeeded { name, attempt } => {
                debug!("watchdog: '{}' succeeded on attempt {}", name, attempt);
            }
            WatchdogNotice::Failed {
                name,
                attempt,
                class,
                message,
            } => {
                warn!(
                    "watchdog: '{}' attempt {} failed [{:?}]: {}",
                    name, attempt, class, message
                );
            }
        }
    }
}

/// Per-run overrides of the configured deadline and retry budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
}

/// Error callback invoked between retryable attempts.
pub type OnError<'a> = &'a mut (dyn FnMut(FailureClass, &str) + Send);

/// Generic timeout/retry/backoff supervisor wrapping a single action.
pub struct Watchdog {
    config: WatchdogConfig,
    observer: Arc<dyn WatchdogObserver>,
}

impl Watchdog {
    /// Create a watchdog with the default (tracing) observer.
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the notification sink.
    pub fn with_observer(mut self, observer: Arc<dyn WatchdogObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run `action` under supervision.
    ///
    /// Up to `retries + 1` attempts are made. Each attempt runs under a
    /// deadline with heartbeats ticking alongside; a deadline expiry marks
    /// the attempt failed with [`FailureClass::Timeout`] but does not abort
    /// the in-flight future beyond dropping it at the await point. Retryable
    /// failures back off `base * 2^(attempt - 1)` before the next attempt.
    pub async fn run<T, E, F, Fut>(
        &self,
        name: &str,
        mut action: F,
        opts: RunOptions,
        mut on_error: Option<OnError<'_>>,
    ) -> Result<T, WatchdogError>
    where
        E: Display + ClassifyFailure,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let timeout = Duration::from_millis(opts.timeout_ms.unwrap_or(self.config.timeout_ms));
        let max_attempts = opts.retries.unwrap_or(self.config.retries) + 1;

        let mut attempt = 1;
        loop {
            self.observer.notify(WatchdogNotice::Started {
                name: name.to_string(),
                attempt,
            });

            let heartbeat = self.spawn_heartbeat(name, attempt);
            let outcome = tokio::time::timeout(timeout, action()).await;
            heartbeat.abort();

            let (class, message) = match outcome {
                Ok(Ok(value)) => {
                    self.observer.notify(WatchdogNotice::Succeeded {
                        name: name.to_string(),
                        attempt,
                    });
                    return Ok(value);
                }
                Ok(Err(e)) => (classify(&e), e.to_string()),
                Err(_) => (
                    FailureClass::Timeout,
                    format!("watchdog deadline of {}ms exceeded", timeout.as_millis()),
                ),
            };

            self.observer.notify(WatchdogNotice::Failed {
                name: name.to_string(),
                attempt,
                class,
                message: message.clone(),
            });

            if !class.is_retryable() || attempt >= max_attempts {
                return Err(WatchdogError::Exhausted {
                    name: name.to_string(),
                    attempts: attempt,
                    class,
                    message,
                });
            }

            if let Some(cb) = on_error.as_deref_mut() {
                cb(class, &message);
            }

            let delay = self.config.backoff_base_ms * 2u64.pow(attempt - 1);
            debug!("watchdog: '{}' retrying in {}ms", name, delay);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            attempt += 1;
        }
    }

    fn spawn_heartbeat(&self, name: &str, attempt: u32) -> tokio::task::JoinHandle<()> {
        let observer = self.observer.clone();
        let name = name.to_string();
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let started = Instant::now();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                observer.notify(WatchdogNotice::Heartbeat {
                    name: name.clone(),
                    attempt,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        })
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
