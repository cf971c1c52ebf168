use crate::id::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Terminal result of processing one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Navigated, extracted and persisted a complete record.
    Collected { attempts: u32 },
    /// A complete record from an earlier run already exists; nothing was done.
    Resumed,
    /// The navigator gave up after its attempt budget.
    NavigationFailed { attempts: u32, detail: String },
    /// The page was ready but the prompt was missing; partial data was kept.
    ExtractionIncomplete { missing: String },
    /// The record could not be written.
    PersistenceFailed { detail: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Collected { .. } | Outcome::Resumed)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Outcome::Collected { .. } | Outcome::Resumed => None,
            Outcome::NavigationFailed { .. } => Some(FailureReason::NavigationFailed),
            Outcome::ExtractionIncomplete { .. } => Some(FailureReason::ExtractionIncomplete),
            Outcome::PersistenceFailed { .. } => Some(FailureReason::PersistenceFailed),
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Outcome::Collected { .. } | Outcome::Resumed => None,
            Outcome::NavigationFailed { attempts, detail } => {
                Some(format!("{detail} (after {attempts} attempts)"))
            }
            Outcome::ExtractionIncomplete { missing } => Some(format!("missing {missing}")),
            Outcome::PersistenceFailed { detail } => Some(detail.clone()),
        }
    }
}

/// Reason tag persisted for every identifier that did not succeed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NavigationFailed,
    ExtractionIncomplete,
    PersistenceFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NavigationFailed => "navigation_failed",
            FailureReason::ExtractionIncomplete => "extraction_incomplete",
            FailureReason::PersistenceFailed => "persistence_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureEntry {
    pub task_id: Identifier,
    pub reason: FailureReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate written at the end of (and throughout) a collection run.
///
/// `succeeded + failed + incomplete + pending.len()` always equals the number
/// of input identifiers; `failed` counts navigation and persistence failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    /// Subset of `succeeded` satisfied by records from an earlier run.
    #[serde(default)]
    pub resumed: usize,
    pub failed: usize,
    pub incomplete: usize,
    pub failures: Vec<FailureEntry>,
    /// Identifiers not processed, e.g. after cancellation.
    #[serde(default)]
    pub pending: Vec<Identifier>,
    #[serde(default)]
    pub cancelled: bool,
}

impl RunSummary {
    pub fn failed_ids(&self) -> Vec<&Identifier> {
        self.failures.iter().map(|f| &f.task_id).collect()
    }

    /// True when every input identifier succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.pending.is_empty()
    }
}

/// Builds a [`RunSummary`] from per-identifier outcomes.
///
/// Outcomes are keyed by identifier: recording the same identifier twice
/// replaces the earlier outcome, and the order outcomes arrive in does not
/// affect the snapshot. Counts are always derived from the input list.
#[derive(Debug, Clone)]
pub struct SummaryLedger {
    run_id: String,
    started_at: String,
    input: Vec<Identifier>,
    outcomes: HashMap<Identifier, Outcome>,
    cancelled: bool,
}

impl SummaryLedger {
    pub fn new(input: Vec<Identifier>) -> Self {
        Self {
            run_id: format!("run_{}", ulid::Ulid::new()),
            started_at: crate::now_rfc3339(),
            input,
            outcomes: HashMap::new(),
            cancelled: false,
        }
    }

    /// Record an outcome. Identifiers outside the input list are ignored.
    pub fn record(&mut self, id: &Identifier, outcome: Outcome) -> bool {
        if !self.input.contains(id) {
            return false;
        }
        self.outcomes.insert(id.clone(), outcome);
        true
    }

    /// Fold another ledger's outcomes into this one.
    pub fn merge(&mut self, other: &SummaryLedger) {
        for (id, outcome) in &other.outcomes {
            self.record(id, outcome.clone());
        }
        self.cancelled |= other.cancelled;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Snapshot in input order. `finished` stamps `finished_at`.
    pub fn snapshot(&self, finished: bool) -> RunSummary {
        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: finished.then(crate::now_rfc3339),
            total: self.input.len(),
            attempted: 0,
            succeeded: 0,
            resumed: 0,
            failed: 0,
            incomplete: 0,
            failures: Vec::new(),
            pending: Vec::new(),
            cancelled: self.cancelled,
        };

        for id in &self.input {
            let Some(outcome) = self.outcomes.get(id) else {
                summary.pending.push(id.clone());
                continue;
            };
            summary.attempted += 1;
            match outcome.failure_reason() {
                None => {
                    summary.succeeded += 1;
                    if *outcome == Outcome::Resumed {
                        summary.resumed += 1;
                    }
                }
                Some(reason) => {
                    if reason == FailureReason::ExtractionIncomplete {
                        summary.incomplete += 1;
                    } else {
                        summary.failed += 1;
                    }
                    summary.failures.push(FailureEntry {
                        task_id: id.clone(),
                        reason,
                        detail: outcome.detail(),
                    });
                }
            }
        }
        summary
    }
}
