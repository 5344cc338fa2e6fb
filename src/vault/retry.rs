//! Bounded retries for transient file-system errors.
//!
//! Only errors that can succeed on a second attempt are retried; a missing
//! file or a permission problem fails immediately.  There is no overall
//! deadline here: callers that need one wrap the vault operation in
//! `tokio::time::timeout`, and dropping the future stops the retry loop.

use std::future::Future;
use std::io::{self, ErrorKind};
use std::time::Duration;

use tracing::warn;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Attempt `k` (1-based) is followed by a `k * backoff` pause.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> io::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts && is_transient(&err) => {
                    warn!(
                        operation = what,
                        attempt,
                        error = %err,
                        "transient I/O error, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Whether an I/O error is worth retrying.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}
