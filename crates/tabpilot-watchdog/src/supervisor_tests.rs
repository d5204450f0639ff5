use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;

#[derive(Debug)]
struct TestError(String);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ClassifyFailure for TestError {}

struct Recorder {
    notices: Mutex<Vec<WatchdogNotice>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            notices: Mutex::new(Vec::new()),
        })
    }

    fn count<F: Fn(&WatchdogNotice) -> bool>(&self, f: F) -> usize {
        self.notices.lock().unwrap().iter().filter(|n| f(n)).count()
    }
}

impl WatchdogObserver for Recorder {
    fn notify(&self, notice: WatchdogNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

fn fast_config() -> WatchdogConfig {
    WatchdogConfig {
        timeout_ms: 1_000,
        retries: 2,
        heartbeat_interval_ms: 50,
        backoff_base_ms: 10,
    }
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_action_attempted_retries_plus_one() {
    let watchdog = Watchdog::new(fast_config());
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let err = watchdog
        .run::<(), _, _, _>(
            "doomed",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("element not found".into()))
                }
            },
            RunOptions::default(),
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.class(), FailureClass::Retryable);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_per_attempt() {
    let watchdog = Watchdog::new(fast_config());
    let start = tokio::time::Instant::now();

    let _ = watchdog
        .run::<(), _, _, _>(
            "doomed",
            || async { Err(TestError("not visible".into())) },
            RunOptions::default(),
            None,
        )
        .await;

    // Two retry delays: 10ms * 2^0 + 10ms * 2^1 = 30ms.
    assert_eq!(start.elapsed(), Duration::from_millis(30));
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_on_nth_attempt() {
    let watchdog = Watchdog::new(fast_config());
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let result = watchdog
        .run(
            "flaky",
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                        Err(TestError("navigation pending".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
            RunOptions::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(result, 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_fails_immediately() {
    let watchdog = Watchdog::new(fast_config());
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let err = watchdog
        .run::<(), _, _, _>(
            "broken",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("invalid arguments".into()))
                }
            },
            RunOptions::default(),
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(err.class(), FailureClass::NonRetryable);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_expiry_is_timeout_class() {
    let watchdog = Watchdog::new(WatchdogConfig {
        timeout_ms: 20,
        retries: 0,
        backoff_base_ms: 1,
        ..fast_config()
    });

    let err = watchdog
        .run::<(), TestError, _, _>(
            "slow",
            || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            RunOptions::default(),
            None,
        )
        .await
        .unwrap_err();

    // Deadline expiry is always Timeout, regardless of any message text.
    assert_eq!(err.class(), FailureClass::Timeout);
    assert!(err.class().is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_run_options_override_config() {
    let watchdog = Watchdog::new(fast_config());
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let _ = watchdog
        .run::<(), _, _, _>(
            "doomed",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("load failed".into()))
                }
            },
            RunOptions {
                retries: Some(4),
                timeout_ms: None,
            },
            None,
        )
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_on_error_invoked_between_attempts() {
    let watchdog = Watchdog::new(fast_config());
    let seen: Arc<Mutex<Vec<FailureClass>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let mut on_error = move |class: FailureClass, _msg: &str| {
        sink.lock().unwrap().push(class);
    };

    let _ = watchdog
        .run::<(), _, _, _>(
            "doomed",
            || async { Err(TestError("stale snapshot".into())) },
            RunOptions::default(),
            Some(&mut on_error),
        )
        .await;

    // Called after attempts 1 and 2, not after the terminal attempt 3.
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .all(|c| *c == FailureClass::StaleContext));
}

#[tokio::test(start_paused = true)]
async fn test_observer_sees_lifecycle() {
    let recorder = Recorder::new();
    let watchdog = Watchdog::new(fast_config()).with_observer(recorder.clone());

    watchdog
        .run::<_, TestError, _, _>(
            "ok",
            || async { Ok(()) },
            RunOptions::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        recorder.count(|n| matches!(n, WatchdogNotice::Started { .. })),
        1
    );
    assert_eq!(
        recorder.count(|n| matches!(n, WatchdogNotice::Succeeded { .. })),
        1
    );
    assert_eq!(
        recorder.count(|n| matches!(n, WatchdogNotice::Failed { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_emitted_during_long_attempt() {
    let recorder = Recorder::new();
    let watchdog = Watchdog::new(WatchdogConfig {
        timeout_ms: 1_000,
        retries: 0,
        heartbeat_interval_ms: 50,
        backoff_base_ms: 1,
    })
    .with_observer(recorder.clone());

    watchdog
        .run::<_, TestError, _, _>(
            "slowish",
            || async {
                tokio::time::sleep(Duration::from_millis(220)).await;
                Ok(())
            },
            RunOptions::default(),
            None,
        )
        .await
        .unwrap();

    let beats = recorder.count(|n| matches!(n, WatchdogNotice::Heartbeat { .. }));
    assert!(beats >= 3, "expected >= 3 heartbeats, saw {}", beats);
}
