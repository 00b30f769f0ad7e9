use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use tokio::time::Instant;

use super::*;

/// Plays back a script of outcomes, one per call. `None` hangs past any deadline.
struct Scripted {
    script: Mutex<VecDeque<Option<Result<String, OracleError>>>>,
    calls: AtomicU32,
}

impl Scripted {
    fn new(script: Vec<Option<Result<String, OracleError>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LayoutOracle for Scripted {
    async fn send_layout(&self, _prompt: &str, _png: &[u8]) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(outcome)) => outcome,
            Some(None) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("late".to_string())
            }
            None => Err(OracleError::Fatal("script exhausted".to_string())),
        }
    }
}

fn quota() -> Option<Result<String, OracleError>> {
    Some(Err(OracleError::QuotaExceeded("429".to_string())))
}

#[test]
fn backoff_doubles() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff_for(1), Duration::from_secs(2));
    assert_eq!(policy.backoff_for(2), Duration::from_secs(4));
    assert_eq!(policy.backoff_for(3), Duration::from_secs(8));
}

#[test]
fn zero_attempts_is_invalid() {
    let policy = RetryPolicy {
        max_attempts: 0,
        ..RetryPolicy::default()
    };
    assert!(policy.validate().is_err());
    assert!(RetryPolicy::default().validate().is_ok());
}

#[tokio::test(start_paused = true)]
async fn quota_twice_then_success_returns_third_reply() {
    let oracle = Scripted::new(vec![quota(), quota(), Some(Ok("third".to_string()))]);
    let start = Instant::now();
    let reply = send_with_retry(&oracle, "p", b"png", &RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(reply.text, "third");
    assert_eq!(reply.attempts, 3);
    assert_eq!(oracle.calls(), 3);
    // 2s + 4s of backoff; the scripted replies themselves are instant.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(7), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn fatal_is_not_retried() {
    let oracle = Scripted::new(vec![
        Some(Err(OracleError::Fatal("401".to_string()))),
        Some(Ok("unreachable".to_string())),
    ]);
    let err = send_with_retry(&oracle, "p", b"png", &RetryPolicy::default())
        .await
        .unwrap_err();
    assert_eq!(err, OracleError::Fatal("401".to_string()));
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried() {
    let policy = RetryPolicy {
        request_timeout: Duration::from_secs(10),
        ..RetryPolicy::default()
    };
    let oracle = Scripted::new(vec![None, Some(Ok("ok".to_string()))]);
    let start = Instant::now();
    let reply = send_with_retry(&oracle, "p", b"png", &policy).await.unwrap();
    assert_eq!(reply.text, "ok");
    assert_eq!(reply.attempts, 2);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(12), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(13), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_returns_last_error() {
    let policy = RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    };
    let oracle = Scripted::new(vec![
        quota(),
        Some(Err(OracleError::TransientNetwork("503".to_string()))),
        Some(Ok("never".to_string())),
    ]);
    let err = send_with_retry(&oracle, "p", b"png", &policy).await.unwrap_err();
    assert_eq!(err, OracleError::TransientNetwork("503".to_string()));
    assert_eq!(oracle.calls(), 2);
}
