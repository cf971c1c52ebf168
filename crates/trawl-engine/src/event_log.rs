//! Structured event logging for trawl runs.
//!
//! Writes append-only JSONL to `<output>/events.jsonl` and keeps
//! `<output>/runner-status.json` current for external tools to poll.

use serde::Serialize;
use std::path::PathBuf;
use trawl_core::{now_rfc3339, FailureReason, Identifier, RunSummary, StopReason};
use trawl_store::{append_line, write_atomic, OutputPaths};

// ── Event types ──

/// A run event. Serialized as tagged JSON (`"type": "run_start"`, etc.).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DiscoveryFinished {
        listing_url: String,
        found: usize,
        passes: u32,
        stop_reason: StopReason,
    },
    RunStart {
        run_id: String,
        total: usize,
        already_collected: usize,
        tabs: usize,
    },
    TaskStart {
        task_id: Identifier,
    },
    TaskCollected {
        task_id: Identifier,
        attempts: u32,
    },
    TaskResumed {
        task_id: Identifier,
    },
    TaskFailed {
        task_id: Identifier,
        reason: FailureReason,
        detail: Option<String>,
    },
    RunFinished {
        succeeded: usize,
        failed: usize,
        incomplete: usize,
    },
    RunCancelled {
        processed: usize,
        pending: usize,
    },
}

/// Wrapper that adds sequence number and timestamp to each event.
#[derive(Debug, Serialize)]
pub struct FullEvent {
    pub seq: u32,
    pub ts: String,
    #[serde(flatten)]
    pub event: Event,
}

// ── EventLogger ──

/// Append-only JSONL event writer.
pub struct EventLogger {
    jsonl_path: PathBuf,
    status_path: PathBuf,
    seq: u32,
}

impl EventLogger {
    pub fn new(paths: &OutputPaths) -> Self {
        Self {
            jsonl_path: paths.events_jsonl.clone(),
            status_path: paths.runner_status_json.clone(),
            seq: 0,
        }
    }

    /// Record an event. Best-effort: write failures are logged and ignored.
    pub fn record(&mut self, event: Event) {
        let full = FullEvent {
            seq: self.seq,
            ts: now_rfc3339(),
            event,
        };
        self.seq += 1;

        if let Ok(line) = serde_json::to_string(&full) {
            if let Err(e) = append_line(&self.jsonl_path, &line) {
                tracing::debug!("event not written: {e}");
            }
        }
    }

    /// Rewrite the runner status file from `summary`.
    pub fn write_status(&self, summary: &RunSummary, current: Option<&Identifier>) {
        let status = RunnerStatus::derive(summary, current);
        if let Ok(data) = serde_json::to_string_pretty(&status) {
            if let Err(e) = write_atomic(&self.status_path, data.as_bytes()) {
                tracing::debug!("runner status not written: {e:#}");
            }
        }
    }
}

// ── RunnerStatus ──

/// Lightweight status file for external tools to poll.
#[derive(Debug, Serialize)]
pub struct RunnerStatus {
    pub run_id: String,
    pub status: &'static str,
    pub current_task: Option<String>,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
    pub updated_at: String,
}

impl RunnerStatus {
    fn derive(summary: &RunSummary, current: Option<&Identifier>) -> Self {
        let status = match (summary.finished_at.is_some(), summary.cancelled) {
            (_, true) => "cancelled",
            (true, false) => "finished",
            (false, false) => "running",
        };
        Self {
            run_id: summary.run_id.clone(),
            status,
            current_task: current.map(|id| id.to_string()),
            total: summary.total,
            processed: summary.attempted,
            succeeded: summary.succeeded,
            failed: summary.failed_ids().iter().map(|id| id.to_string()).collect(),
            updated_at: now_rfc3339(),
        }
    }
}
