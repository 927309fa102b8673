//! Retry with backoff for transient engine failures.

use crate::engine::{EngineError, EngineResult};
use std::time::Duration;

/// Runs `op`, retrying transient failures up to `attempts` times with a
/// fixed sleep in between. Config and fatal errors pass through untouched;
/// exhausting the budget escalates the last transient error to fatal.
pub fn with_retry<T>(
    attempts: u32,
    backoff: Duration,
    mut op: impl FnMut() -> EngineResult<T>,
) -> EngineResult<T> {
    let mut last = String::new();
    for attempt in 1..=attempts.max(1) {
        match op() {
            Ok(value) => return Ok(value),
            Err(EngineError::Transient(message)) => {
                log::warn!("transient engine failure (attempt {attempt}): {message}");
                last = message;
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(EngineError::Fatal(format!(
        "gave up after {} attempts: {last}",
        attempts.max(1)
    )))
}
