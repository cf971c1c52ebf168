use thiserror::Error;
use trawl_core::TaskRecord;

/// The listing page never became usable; nothing can be collected.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("listing page unavailable at {url}: {detail}")]
    Unavailable { url: String, detail: String },
}

/// The detail page was ready but lacked the required prompt.
///
/// Carries whatever fields were found so the caller can persist them.
#[derive(Debug, Error)]
#[error("extraction incomplete for {}: missing {missing}", .partial.task_id)]
pub struct ExtractionIncomplete {
    pub missing: &'static str,
    pub partial: Box<TaskRecord>,
}

#[derive(Debug, Error)]
pub enum NavigateError {
    /// Operator interrupt observed while waiting on the browser.
    #[error("navigation cancelled")]
    Cancelled,
    #[error("invalid navigation transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::navigate::NavPhase,
        to: crate::navigate::NavPhase,
    },
}
