pub mod config;
pub mod discovery;
pub mod id;
pub mod record;
pub mod summary;

pub use config::{load_config, ConfigError, TrawlConfig};
pub use discovery::{DiscoveryReport, DiscoverySet, StopReason};
pub use id::Identifier;
pub use record::{ChangeStats, FileChange, LogCapture, Metadata, SummarySections, TaskRecord};
pub use summary::{FailureEntry, FailureReason, Outcome, RunSummary, SummaryLedger};

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    now.format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting should not fail")
}
