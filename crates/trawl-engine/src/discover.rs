//! Scroll collector: enumerate task identifiers from the lazy-loaded listing.

use crate::error::DiscoveryError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trawl_browser::{wait_for, BrowserTab, DomQuery, WaitOutcome};
use trawl_core::{now_rfc3339, DiscoveryReport, DiscoverySet, Identifier, StopReason, TrawlConfig};

/// Identifiers linked from the current document, in document order.
async fn visible_ids(tab: &dyn BrowserTab, links: &DomQuery) -> Vec<Identifier> {
    match tab.query(links).await {
        Ok(value) => value
            .as_array()
            .map(|hrefs| {
                hrefs
                    .iter()
                    .filter_map(|h| h.as_str())
                    .filter_map(Identifier::parse)
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            warn!("reading task links failed: {e}");
            Vec::new()
        }
    }
}

/// Load the listing page and scroll it until no new identifiers appear for
/// `stable_passes` consecutive passes, or `max_passes` passes have run.
///
/// Fails only when the listing itself never shows up. Errors after that
/// count as empty passes, so the run still ends with what was found.
pub async fn discover(
    tab: &dyn BrowserTab,
    config: &TrawlConfig,
    cancel: &CancellationToken,
) -> Result<DiscoveryReport, DiscoveryError> {
    let settings = &config.discovery;
    let listing_url = config.site.listing_url();
    let unavailable = |detail: String| DiscoveryError::Unavailable {
        url: listing_url.clone(),
        detail,
    };

    info!(url = %listing_url, "loading listing page");
    tab.navigate(&listing_url)
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    let ready = DomQuery::exists(&config.markers.listing);
    let outcome = wait_for(
        tab,
        &ready,
        settings.load_timeout(),
        settings.poll_interval(),
        cancel,
    )
    .await
    .map_err(|e| unavailable(e.to_string()))?;

    let mut set = DiscoverySet::new();
    let links = DomQuery::Hrefs {
        selector: config.markers.task_link.clone(),
    };

    let stop_reason = match outcome {
        WaitOutcome::Cancelled => StopReason::Cancelled,
        WaitOutcome::TimedOut { .. } => {
            return Err(unavailable(format!(
                "no listing markers within {}ms",
                settings.load_timeout_ms
            )));
        }
        WaitOutcome::Ready { .. } => {
            // rows rendered before the first scroll
            set.extend(visible_ids(tab, &links).await);
            scroll_until_stable(tab, &links, &mut set, config, cancel).await
        }
    };

    info!(
        found = set.len(),
        passes = set.passes(),
        ?stop_reason,
        "discovery finished"
    );
    Ok(DiscoveryReport {
        listing_url,
        extracted_at: now_rfc3339(),
        passes: set.passes(),
        stop_reason,
        ids: set.into_ordered(),
    })
}

async fn scroll_until_stable(
    tab: &dyn BrowserTab,
    links: &DomQuery,
    set: &mut DiscoverySet,
    config: &TrawlConfig,
    cancel: &CancellationToken,
) -> StopReason {
    let settings = &config.discovery;
    loop {
        if set.stable_passes() >= settings.stable_passes {
            return StopReason::Settled;
        }
        if set.passes() >= settings.max_passes {
            warn!(
                max_passes = settings.max_passes,
                found = set.len(),
                "pass limit reached while the listing was still growing"
            );
            return StopReason::PassLimit;
        }

        if let Err(e) = tab.scroll_to_bottom().await {
            warn!("scroll failed: {e}");
        }
        tokio::select! {
            _ = cancel.cancelled() => return StopReason::Cancelled,
            _ = tokio::time::sleep(settings.settle()) => {}
        }

        let added = set.merge_pass(visible_ids(tab, links).await);
        debug!(
            pass = set.passes(),
            added,
            total = set.len(),
            stable = set.stable_passes(),
            "scroll pass"
        );
    }
}
