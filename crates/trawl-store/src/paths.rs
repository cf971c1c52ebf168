use std::path::PathBuf;
use trawl_core::Identifier;

/// Well-known files under the output directory.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub root: PathBuf,
    pub summary_json: PathBuf,
    pub events_jsonl: PathBuf,
    pub runner_status_json: PathBuf,
    pub urls_txt: PathBuf,
    pub urls_json: PathBuf,
    pub screenshots_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl OutputPaths {
    /// Derive all paths from the output root. Pure computation, no I/O.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            summary_json: root.join("summary.json"),
            events_jsonl: root.join("events.jsonl"),
            runner_status_json: root.join("runner-status.json"),
            urls_txt: root.join("task_urls.txt"),
            urls_json: root.join("task_urls.json"),
            screenshots_dir: root.join("screenshots"),
            lock_file: root.join(".trawl.lock"),
            root,
        }
    }

    pub fn record_json(&self, id: &Identifier) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    pub fn logs_html(&self, id: &Identifier) -> PathBuf {
        self.root.join(format!("{id}_logs.html"))
    }

    /// `screenshots/<id>-attempt<N>-<label>.png`
    pub fn screenshot(&self, id: &Identifier, attempt: u32, label: &str) -> PathBuf {
        self.screenshots_dir
            .join(format!("{id}-attempt{attempt}-{label}.png"))
    }

    pub fn ensure_layout(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
