pub mod capture;
pub mod discover;
pub mod error;
pub mod event_log;
pub mod extract;
pub mod navigate;
pub mod pipeline;

pub use capture::{capture_detail, DetailSnapshot};
pub use discover::discover;
pub use error::{DiscoveryError, ExtractionIncomplete, NavigateError};
pub use event_log::{Event, EventLogger, RunnerStatus};
pub use extract::extract;
pub use navigate::{NavOutcome, NavPhase, NavigationState, Navigator, StaleReason};
pub use pipeline::{deal, run_pipeline, run_pipeline_sharded, Collector};
