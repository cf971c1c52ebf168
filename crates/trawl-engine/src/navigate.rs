//! Navigator: gets one tab onto a fully rendered task detail page.
//!
//! The Codex UI routes on the client. A navigation can update the address bar
//! while the previous view (usually the task listing) stays on screen, so a
//! load is only trusted once a detail-only marker is present on the target
//! URL. Landing on the listing instead is detected explicitly and recovered
//! with a hard load rather than another in-app navigation.

use crate::error::NavigateError;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trawl_browser::{BrowserTab, DomQuery};
use trawl_core::config::{NavigationSection, TrawlConfig};
use trawl_core::Identifier;
use trawl_store::{write_atomic, OutputPaths};

// ── Phases ──

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavPhase {
    Requested,
    Awaiting,
    Ready,
    Stale,
    Failed,
}

/// Coarse view of a [`NavPhase`] for reporting.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavOutcome {
    Pending,
    Ready,
    Stale,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Listing markers showed and detail markers did not.
    WrongPage,
    /// Neither marker settled before the ready timeout.
    TimedOut,
    /// The browser rejected the navigation or a probe.
    Transport,
}

/// What the last readiness probe saw.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Nothing,
    Listing,
    Detail,
}

const VALID_TRANSITIONS: &[(NavPhase, &[NavPhase])] = &[
    (NavPhase::Requested, &[NavPhase::Awaiting, NavPhase::Stale]),
    (NavPhase::Awaiting, &[NavPhase::Ready, NavPhase::Stale]),
    (NavPhase::Stale, &[NavPhase::Requested, NavPhase::Failed]),
    // Ready and Failed are terminal
];

fn is_valid_transition(from: NavPhase, to: NavPhase) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

// ── Per-identifier state ──

/// Scratch state for reaching one identifier. Never reused across identifiers.
#[derive(Debug, Clone, Serialize)]
pub struct NavigationState {
    pub target: Identifier,
    /// Canonical detail URL for `target`.
    pub url: String,
    pub current_url: Option<String>,
    /// 1-based; incremented on every recovery.
    pub attempts: u32,
    pub last_signal: Signal,
    pub phase: NavPhase,
    pub stale_reason: Option<StaleReason>,
    pub last_error: Option<String>,
}

impl NavigationState {
    pub fn new(target: Identifier, base_url: &str) -> Self {
        let url = target.detail_url(base_url);
        Self {
            target,
            url,
            current_url: None,
            attempts: 1,
            last_signal: Signal::Nothing,
            phase: NavPhase::Requested,
            stale_reason: None,
            last_error: None,
        }
    }

    pub fn outcome(&self) -> NavOutcome {
        match self.phase {
            NavPhase::Requested | NavPhase::Awaiting => NavOutcome::Pending,
            NavPhase::Ready => NavOutcome::Ready,
            NavPhase::Stale => NavOutcome::Stale,
            NavPhase::Failed => NavOutcome::Failed,
        }
    }

    /// Move from `from` to `to`. Returns Ok(false) on CAS miss (phase != from).
    pub fn transition(&mut self, from: NavPhase, to: NavPhase) -> Result<bool, NavigateError> {
        if self.phase != from {
            return Ok(false);
        }
        if !is_valid_transition(from, to) {
            return Err(NavigateError::InvalidTransition { from, to });
        }
        self.phase = to;
        Ok(true)
    }

    /// Human-readable reason for a failed navigation.
    pub fn failure_detail(&self) -> String {
        match self.stale_reason {
            Some(StaleReason::WrongPage) => "stuck on listing page".to_string(),
            Some(StaleReason::TimedOut) => "timed out waiting for detail page".to_string(),
            Some(StaleReason::Transport) => format!(
                "browser error: {}",
                self.last_error.as_deref().unwrap_or("unknown")
            ),
            None => "not ready".to_string(),
        }
    }
}

// ── Navigator ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Load {
    /// Plain navigation to the target.
    Navigate,
    /// Reload the current document, already on the target URL.
    Reload,
    /// Blank the tab, then load the target, so nothing of the previous view survives.
    Hard,
}

pub struct Navigator {
    settings: NavigationSection,
    base_url: String,
    detail_ready: DomQuery,
    listing: DomQuery,
    screenshots: Option<OutputPaths>,
}

impl Navigator {
    pub fn new(config: &TrawlConfig) -> Self {
        Self {
            settings: config.navigation.clone(),
            base_url: config.site.base_url.clone(),
            detail_ready: DomQuery::exists(&config.markers.detail_ready),
            listing: DomQuery::exists(&config.markers.listing),
            screenshots: None,
        }
    }

    /// Write diagnostic screenshots under `paths` when the config enables them.
    pub fn with_screenshots(mut self, paths: OutputPaths) -> Self {
        if self.settings.screenshots {
            self.screenshots = Some(paths);
        }
        self
    }

    /// Drive `tab` to `target`'s detail page.
    ///
    /// Always returns a terminal state (`Ready` or `Failed`) unless cancelled.
    pub async fn reach(
        &self,
        tab: &dyn BrowserTab,
        target: &Identifier,
        cancel: &CancellationToken,
    ) -> Result<NavigationState, NavigateError> {
        let mut state = NavigationState::new(target.clone(), &self.base_url);
        let mut load = self.first_load(tab, target).await;

        loop {
            if cancel.is_cancelled() {
                return Err(NavigateError::Cancelled);
            }
            debug!(task_id = %target, attempt = state.attempts, ?load, "requesting detail page");

            match self.issue(tab, &state.url, load).await {
                Err(e) => {
                    state.last_error = Some(e.to_string());
                    self.enter_stale(tab, &mut state, NavPhase::Requested, StaleReason::Transport)
                        .await?;
                }
                Ok(()) => {
                    state.transition(NavPhase::Requested, NavPhase::Awaiting)?;
                    match self.await_ready(tab, &mut state, cancel).await? {
                        None => {
                            state.transition(NavPhase::Awaiting, NavPhase::Ready)?;
                            debug!(task_id = %target, attempts = state.attempts, "detail page ready");
                            return Ok(state);
                        }
                        Some(reason) => {
                            self.enter_stale(tab, &mut state, NavPhase::Awaiting, reason)
                                .await?;
                        }
                    }
                }
            }

            if state.attempts >= self.settings.max_attempts {
                state.transition(NavPhase::Stale, NavPhase::Failed)?;
                warn!(
                    task_id = %target,
                    attempts = state.attempts,
                    "giving up: {}",
                    state.failure_detail()
                );
                self.screenshot(tab, &state, "failed").await;
                return Ok(state);
            }

            load = match state.stale_reason {
                Some(StaleReason::TimedOut)
                    if state
                        .current_url
                        .as_deref()
                        .is_some_and(|u| target.matches_url(u)) =>
                {
                    Load::Reload
                }
                _ => Load::Hard,
            };
            state.attempts += 1;
            state.transition(NavPhase::Stale, NavPhase::Requested)?;
        }
    }

    /// A previous task's detail view would satisfy the readiness probe, so
    /// leaving one starts from a blank document.
    async fn first_load(&self, tab: &dyn BrowserTab, target: &Identifier) -> Load {
        match tab.current_url().await {
            Ok(url) => match Identifier::parse(&url) {
                Some(shown) if shown != *target => Load::Hard,
                _ => Load::Navigate,
            },
            Err(_) => Load::Hard,
        }
    }

    async fn issue(
        &self,
        tab: &dyn BrowserTab,
        url: &str,
        load: Load,
    ) -> Result<(), trawl_browser::BrowserError> {
        match load {
            Load::Navigate => tab.navigate(url).await,
            Load::Reload => tab.reload().await,
            Load::Hard => {
                tab.navigate("about:blank").await?;
                tab.navigate(url).await
            }
        }
    }

    /// Poll until the detail marker shows on the target URL.
    /// Returns the stale reason when the attempt has to be abandoned.
    async fn await_ready(
        &self,
        tab: &dyn BrowserTab,
        state: &mut NavigationState,
        cancel: &CancellationToken,
    ) -> Result<Option<StaleReason>, NavigateError> {
        let deadline = Instant::now() + self.settings.ready_timeout();
        let grace = self.settings.wrong_page_grace();
        let interval = self.settings.poll_interval();
        let mut listing_since: Option<Instant> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(NavigateError::Cancelled);
            }

            // A probe can fail while the page swaps documents; only a probe
            // still failing at the deadline abandons the attempt as Transport.
            let probe_failed = match self.probe(tab).await {
                Err(e) => {
                    debug!(task_id = %state.target, "readiness probe failed: {e}");
                    state.last_error = Some(e.to_string());
                    true
                }
                Ok((detail, listing, url)) => {
                    let on_target = state.target.matches_url(&url);
                    state.current_url = Some(url);

                    let now = Instant::now();
                    if detail && on_target {
                        state.last_signal = Signal::Detail;
                        return Ok(None);
                    }
                    if listing && !detail {
                        state.last_signal = Signal::Listing;
                        let since = *listing_since.get_or_insert(now);
                        if now.duration_since(since) >= grace {
                            return Ok(Some(StaleReason::WrongPage));
                        }
                    } else {
                        state.last_signal = Signal::Nothing;
                        listing_since = None;
                    }
                    false
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(Some(if probe_failed {
                    StaleReason::Transport
                } else {
                    StaleReason::TimedOut
                }));
            }

            let remaining = deadline.saturating_duration_since(now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(NavigateError::Cancelled),
                _ = tokio::time::sleep(interval.min(remaining).max(Duration::from_millis(1))) => {}
            }
        }
    }

    async fn probe(
        &self,
        tab: &dyn BrowserTab,
    ) -> Result<(bool, bool, String), trawl_browser::BrowserError> {
        let detail = tab.query(&self.detail_ready).await?.as_bool() == Some(true);
        let listing = tab.query(&self.listing).await?.as_bool() == Some(true);
        let url = tab.current_url().await?;
        Ok((detail, listing, url))
    }

    async fn enter_stale(
        &self,
        tab: &dyn BrowserTab,
        state: &mut NavigationState,
        from: NavPhase,
        reason: StaleReason,
    ) -> Result<(), NavigateError> {
        state.stale_reason = Some(reason);
        state.transition(from, NavPhase::Stale)?;
        info!(
            task_id = %state.target,
            attempt = state.attempts,
            ?reason,
            current_url = state.current_url.as_deref().unwrap_or(""),
            "navigation stale"
        );
        self.screenshot(tab, state, "stale").await;
        Ok(())
    }

    /// Best-effort diagnostic capture; never affects navigation.
    async fn screenshot(&self, tab: &dyn BrowserTab, state: &NavigationState, label: &str) {
        let Some(paths) = &self.screenshots else {
            return;
        };
        let path = paths.screenshot(&state.target, state.attempts, label);
        match tab.capture_screenshot().await {
            Ok(png) => {
                if let Err(e) = write_atomic(&path, &png) {
                    warn!(path = %path.display(), "screenshot not saved: {e:#}");
                }
            }
            Err(e) => debug!(task_id = %state.target, "screenshot failed: {e}"),
        }
    }
}
