use crate::paths::OutputPaths;
use crate::{logs_page, write_atomic};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use trawl_core::{Identifier, RunSummary, TaskRecord};

/// Where the collection pipeline persists its durable outputs.
///
/// Implemented by [`FsStore`]; tests substitute failing or in-memory sinks.
pub trait RecordSink: Send + Sync {
    /// Identifiers that already have a complete record.
    fn completed_ids(&self) -> Result<HashSet<Identifier>>;

    /// Persist one record, complete or partial.
    fn save_record(&self, record: &TaskRecord) -> Result<()>;

    /// Persist the run summary. Called after every identifier.
    fn save_summary(&self, summary: &RunSummary) -> Result<()>;
}

/// One JSON file per task under the output directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    paths: OutputPaths,
}

impl FsStore {
    pub fn new(paths: OutputPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Load a previously saved record. Returns None if the file doesn't exist.
    pub fn load_record(&self, id: &Identifier) -> Result<Option<TaskRecord>> {
        let path = self.paths.record_json(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading record: {}", path.display()))?;
        let record: TaskRecord = serde_json::from_str(&content)
            .with_context(|| format!("parsing record: {}", path.display()))?;
        Ok(Some(record))
    }

    /// Load the latest run summary, if any.
    pub fn load_summary(&self) -> Result<Option<RunSummary>> {
        let path = &self.paths.summary_json;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading summary: {}", path.display()))?;
        let summary = serde_json::from_str(&content)
            .with_context(|| format!("parsing summary: {}", path.display()))?;
        Ok(Some(summary))
    }

    fn partial_path(&self, id: &Identifier) -> PathBuf {
        self.paths.root.join(format!("{id}.partial.json"))
    }
}

impl RecordSink for FsStore {
    fn completed_ids(&self) -> Result<HashSet<Identifier>> {
        let mut done = HashSet::new();
        if !self.paths.root.is_dir() {
            return Ok(done);
        }
        let entries = std::fs::read_dir(&self.paths.root)
            .with_context(|| format!("listing {}", self.paths.root.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = Identifier::try_from(stem.to_string()) else {
                continue;
            };
            match self.load_record(&id) {
                Ok(Some(record)) if record.is_complete() => {
                    done.insert(id);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(task_id = %id, "ignoring unreadable record: {e:#}"),
            }
        }
        Ok(done)
    }

    fn save_record(&self, record: &TaskRecord) -> Result<()> {
        let id = &record.task_id;
        let mut path = self.paths.record_json(id);

        // A partial re-extraction must not clobber an earlier complete record.
        if !record.is_complete() {
            if let Ok(Some(existing)) = self.load_record(id) {
                if existing.is_complete() {
                    tracing::warn!(task_id = %id, "keeping complete record; partial saved alongside");
                    path = self.partial_path(id);
                }
            }
        }

        let data = serde_json::to_string_pretty(record)?;
        write_atomic(&path, data.as_bytes())
            .with_context(|| format!("saving record: {}", path.display()))?;

        // The record is durable at this point; the logs page is a convenience copy.
        if let Some(html) = record.logs.as_ref().and_then(|l| l.html.as_deref()) {
            let page = logs_page::render(record, html);
            let logs_path = self.paths.logs_html(id);
            if let Err(e) = write_atomic(&logs_path, page.as_bytes()) {
                tracing::warn!(task_id = %id, path = %logs_path.display(), "logs page not saved: {e:#}");
            }
        }
        Ok(())
    }

    fn save_summary(&self, summary: &RunSummary) -> Result<()> {
        let path = &self.paths.summary_json;
        let data = serde_json::to_string_pretty(summary)?;
        write_atomic(path, data.as_bytes())
            .with_context(|| format!("saving summary: {}", path.display()))?;
        Ok(())
    }
}
