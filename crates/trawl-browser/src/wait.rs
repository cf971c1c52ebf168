use crate::{BrowserError, BrowserTab, DomQuery};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The query returned `true`; `polls` counts probes including the last.
    Ready { polls: u32 },
    TimedOut { polls: u32 },
    Cancelled,
}

/// Poll `query` every `interval` until it returns `true` or `timeout` elapses.
///
/// The query always runs at least once, so a zero timeout is a single probe.
pub async fn wait_for(
    tab: &dyn BrowserTab,
    query: &DomQuery,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<WaitOutcome, BrowserError> {
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }
        polls += 1;
        if tab.query(query).await?.as_bool() == Some(true) {
            return Ok(WaitOutcome::Ready { polls });
        }
        if Instant::now() >= deadline {
            return Ok(WaitOutcome::TimedOut { polls });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            _ = tokio::time::sleep(interval.min(remaining)) => {}
        }
    }
}
