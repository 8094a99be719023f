//! Retry policy with exponential backoff and cancellable waits.
//!
//! Only transient failures are retried; see [`TRANSIENT_SIGNATURES`]. Waits go
//! through a [`Sleeper`] so a [`CancelToken`] (or a test double) can cut them
//! short.

use crate::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cause fragments that mark a failure as transient.
pub const TRANSIENT_SIGNATURES: [&str; 5] = [
    "503",
    "service unavailable",
    "overloaded",
    "timeout",
    "timed out",
];

/// Whether an error is worth another attempt.
#[must_use]
pub fn is_transient_error(err: &Error) -> bool {
    match err {
        Error::OperationFailed { cause, .. } => {
            let lower = cause.to_lowercase();
            TRANSIENT_SIGNATURES
                .iter()
                .any(|signature| lower.contains(signature))
        },
        _ => false,
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait before the first retry; doubles for every further retry.
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1_000,
        }
    }
}

impl RetryConfig {
    /// Loads retry configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads retry configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::RetrySettings) -> Self {
        let mut settings = Self::default();
        if let Some(max_attempts) = config.max_attempts {
            settings.max_attempts = max_attempts.max(1);
        }
        if let Some(base_backoff_ms) = config.base_backoff_ms {
            settings.base_backoff_ms = base_backoff_ms;
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("JNEXT_RETRY_MAX_ATTEMPTS")
            && let Ok(parsed) = v.trim().parse::<u32>()
        {
            self.max_attempts = parsed.max(1);
        }
        if let Ok(v) = std::env::var("JNEXT_RETRY_BASE_BACKOFF_MS")
            && let Ok(parsed) = v.trim().parse::<u64>()
        {
            self.base_backoff_ms = parsed;
        }
        self
    }

    /// Wait after the failed attempt with zero-based index `retry`.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
    deadline: Option<Instant>,
}

/// Cooperative cancellation for one request.
///
/// Cancelling (or passing the deadline) wakes any wait in progress.
/// Clones share state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// A token with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// A token that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: Mutex::new(false),
                signal: Condvar::new(),
                deadline,
            }),
        }
    }

    /// Cancels the token and wakes waiters.
    pub fn cancel(&self) {
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.state.signal.notify_all();
    }

    /// Whether the token was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let cancelled = *self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cancelled || self.deadline_passed(Instant::now())
    }

    fn deadline_passed(&self, now: Instant) -> bool {
        self.state.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Blocks for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn wait(&self, duration: Duration) -> bool {
        let wake_at = Instant::now() + duration;
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            let now = Instant::now();
            if *cancelled || self.deadline_passed(now) {
                return false;
            }
            if now >= wake_at {
                return true;
            }
            let until = self
                .state
                .deadline
                .map_or(wake_at, |deadline| deadline.min(wake_at));
            let (guard, _) = self
                .state
                .signal
                .wait_timeout(cancelled, until.saturating_duration_since(now))
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits between attempts.
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`; returns `false` if the wait was cancelled.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Blocks the calling thread on the cancel token.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenSleeper;

impl Sleeper for TokenSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        cancel.wait(duration)
    }
}

enum FailureAction {
    Retry,
    Fail(Error),
}

/// Runs backend calls under the retry policy.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy that sleeps on the cancel token.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokenSleeper),
        }
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> RetryConfig {
        self.config
    }

    /// Calls `call` until it succeeds, fails terminally, runs out of attempts,
    /// or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the last error from `call`, or an `OperationFailed` if the token
    /// was cancelled before the first attempt.
    pub fn execute<T>(
        &self,
        backend: &str,
        operation: &'static str,
        cancel: &CancelToken,
        mut call: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let span = tracing::info_span!(
            "backend.request",
            backend = %backend,
            operation = operation,
            attempts = tracing::field::Empty,
            status = tracing::field::Empty,
            error = tracing::field::Empty
        );
        let _enter = span.enter();

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                span.record("status", "cancelled");
                return Err(Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: "request cancelled".to_string(),
                });
            }

            attempts += 1;
            span.record("attempts", attempts);
            let attempt_start = Instant::now();
            let result = call();
            let elapsed = attempt_start.elapsed();

            let err = match result {
                Ok(value) => {
                    record_request_metrics(backend, elapsed, "success");
                    span.record("status", "success");
                    return Ok(value);
                },
                Err(err) => err,
            };

            match self.handle_failure(backend, err, elapsed, attempts, max_attempts, cancel) {
                FailureAction::Retry => {},
                FailureAction::Fail(err) => return Err(err),
            }
        }
    }

    fn handle_failure(
        &self,
        backend: &str,
        err: Error,
        elapsed: Duration,
        attempts: u32,
        max_attempts: u32,
        cancel: &CancelToken,
    ) -> FailureAction {
        let transient = is_transient_error(&err);
        let retryable = transient && attempts < max_attempts;

        let status = if transient { "transient" } else { "error" };
        record_request_metrics(backend, elapsed, status);
        let span = tracing::Span::current();
        span.record("status", status);
        span.record("error", tracing::field::display(&err));

        if !retryable {
            return FailureAction::Fail(err);
        }

        let delay = self.config.backoff(attempts - 1);
        tracing::warn!(
            backend = %backend,
            attempt = attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retrying transient backend failure"
        );
        metrics::counter!("backend_retries_total", "backend" => backend.to_string()).increment(1);

        if self.sleeper.sleep(delay, cancel) {
            FailureAction::Retry
        } else {
            span.record("status", "cancelled");
            FailureAction::Fail(err)
        }
    }
}

fn record_request_metrics(backend: &str, elapsed: Duration, status: &'static str) {
    metrics::counter!(
        "backend_requests_total",
        "backend" => backend.to_string(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "backend_request_duration_ms",
        "backend" => backend.to_string(),
        "status" => status
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration, _cancel: &CancelToken) -> bool {
            self.waits.lock().unwrap().push(duration);
            true
        }
    }

    struct CancellingSleeper;

    impl Sleeper for CancellingSleeper {
        fn sleep(&self, _duration: Duration, cancel: &CancelToken) -> bool {
            cancel.cancel();
            false
        }
    }

    fn failing(cause: &str) -> Error {
        Error::OperationFailed {
            operation: "gemini_request".to_string(),
            cause: cause.to_string(),
        }
    }

    fn policy_with(sleeper: Arc<RecordingSleeper>) -> RetryPolicy {
        RetryPolicy::new(RetryConfig::default()).with_sleeper(sleeper)
    }

    #[test]
    fn test_transient_signatures() {
        assert!(is_transient_error(&failing(
            "API returned status: 503 Service Unavailable - "
        )));
        assert!(is_transient_error(&failing("model is overloaded")));
        assert!(is_transient_error(&failing("timeout error: operation timed out")));
        assert!(!is_transient_error(&failing("API returned status: 400 Bad Request")));
        assert!(!is_transient_error(&Error::NotFound("timeout".to_string())));
    }

    #[test]
    fn test_transient_failures_retry_with_doubling_waits() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<()> =
            policy_with(Arc::clone(&sleeper)).execute("gemini", "chat", &CancelToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(failing("API returned status: 503 Service Unavailable"))
            });

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_terminal_error_takes_one_attempt() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<()> =
            policy_with(Arc::clone(&sleeper)).execute("gpt", "chat", &CancelToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(failing("API returned status: 401 Unauthorized"))
            });

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result =
            policy_with(Arc::clone(&sleeper)).execute("claude", "chat", &CancelToken::new(), || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(failing("overloaded"))
                } else {
                    Ok("answer")
                }
            });

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_cancelled_wait_stops_retrying() {
        let policy = RetryPolicy::default().with_sleeper(Arc::new(CancellingSleeper));
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy.execute("gemini", "chat", &CancelToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(failing("timed out"))
        });

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_token_makes_no_attempt() {
        let token = CancelToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default().execute("gemini", "chat", &token, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = RetryConfig {
            max_attempts: 5,
            base_backoff_ms: 250,
        };
        assert_eq!(config.backoff(0), Duration::from_millis(250));
        assert_eq!(config.backoff(1), Duration::from_millis(500));
        assert_eq!(config.backoff(3), Duration::from_millis(2_000));
        assert_eq!(config.backoff(80), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_token_wait_completes_without_cancel() {
        let token = CancelToken::new();
        assert!(token.wait(Duration::from_millis(5)));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let started = Instant::now();
        let handle = std::thread::spawn(move || waiter.wait(Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_cuts_wait_short() {
        let token = CancelToken::with_timeout(Duration::from_millis(20));
        let started = Instant::now();
        assert!(!token.wait(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }
}
