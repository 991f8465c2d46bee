use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

const INITIAL_DELAY_MS: u64 = 25;
const MAX_RETRIES: u32 = 20;
const MAX_DELAY_MS: u64 = 500;

/// Error returned when waiting for a condition times out.
#[derive(Debug)]
pub struct WaitError {
    what: String,
    attempts: u32,
    waited: Duration,
    last_seen: Option<String>,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timed out after {} attempts over {:?} waiting for {}. Last seen: {}",
            self.attempts,
            self.waited,
            self.what,
            self.last_seen.as_deref().unwrap_or("<nothing>")
        )
    }
}

impl std::error::Error for WaitError {}

/// Poll `sample` until `predicate` accepts its value.
///
/// Uses exponential backoff starting at 25ms, capped at 500ms per sleep.
pub fn wait_for<T, P, F>(what: &str, sample: P, predicate: F, timeout: Duration) -> Result<T, WaitError>
where
    T: fmt::Debug,
    P: Fn() -> T,
    F: Fn(&T) -> bool,
{
    let start = Instant::now();
    let mut delay = Duration::from_millis(INITIAL_DELAY_MS);
    let mut attempts = 0;
    let mut last_seen;

    loop {
        attempts += 1;
        let value = sample();
        if predicate(&value) {
            return Ok(value);
        }
        last_seen = Some(format!("{:?}", value));

        if attempts >= MAX_RETRIES || start.elapsed() >= timeout {
            break;
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        thread::sleep(delay.min(remaining));
        delay = delay
            .checked_mul(2)
            .unwrap_or_else(|| Duration::from_millis(MAX_DELAY_MS))
            .min(Duration::from_millis(MAX_DELAY_MS));
    }

    Err(WaitError {
        what: what.to_string(),
        attempts,
        waited: start.elapsed(),
        last_seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_returns_ready_value() {
        let value = wait_for("answer", || 42, |v| *v == 42, Duration::from_secs(1))
            .expect("should be ready immediately");
        assert_eq!(value, 42);
    }

    #[test]
    fn wait_for_times_out_with_context() {
        let err = wait_for("labels", || vec!["a"], |v| v.len() == 2, Duration::from_millis(1))
            .expect_err("should time out");
        let message = err.to_string();
        assert!(message.contains("labels"), "error should name the condition");
        assert!(message.contains("[\"a\"]"), "error should show the last value");
    }
}
