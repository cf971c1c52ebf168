use crate::id::Identifier;
use serde::{Deserialize, Serialize};

/// Structured content extracted from one task detail page.
///
/// Every field except `task_id`, `url` and `scraped_at` may be absent; absence
/// means the page did not show it, never that a value was guessed. A record
/// without a prompt is a partial record kept from an incomplete extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: Identifier,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub logs: Option<LogCapture>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub files_changed: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummarySections>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pr_links: Vec<String>,
    pub scraped_at: String,
}

impl TaskRecord {
    /// Empty record for `task_id`; fields are filled by the extractor.
    pub fn new(task_id: Identifier, url: impl Into<String>, scraped_at: impl Into<String>) -> Self {
        Self {
            task_id,
            url: url.into(),
            title: None,
            prompt: None,
            logs: None,
            metadata: Metadata::default(),
            files_changed: Vec::new(),
            summary: None,
            pr_links: Vec::new(),
            scraped_at: scraped_at.into(),
        }
    }

    /// A record counts as collected once its required prompt is present.
    pub fn is_complete(&self) -> bool {
        self.prompt.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// Log output shown under the detail page's logs tab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogCapture {
    pub text: String,
    /// Selector that located the log container.
    pub source: String,
    /// Raw markup, exported to a standalone HTML file rather than the JSON record.
    #[serde(skip)]
    pub html: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Line counts shown as `+N` / `-M`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeStats {
    pub additions: u32,
    pub deletions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u32>,
}

/// Headed sections of the agent's final message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SummarySections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing: Option<String>,
}

impl SummarySections {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.notes.is_none() && self.testing.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Identifier {
        Identifier::parse("task_e_AAA").unwrap()
    }

    #[test]
    fn completeness_requires_prompt_text() {
        let mut rec = TaskRecord::new(id(), "https://x/codex/tasks/task_e_AAA", "t");
        assert!(!rec.is_complete());
        rec.prompt = Some("   ".into());
        assert!(!rec.is_complete());
        rec.prompt = Some("Fix bug".into());
        assert!(rec.is_complete());
    }

    #[test]
    fn absent_logs_serialize_as_null_not_missing_record() {
        let mut rec = TaskRecord::new(id(), "u", "t");
        rec.prompt = Some("Fix bug".into());
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["prompt"], "Fix bug");
        assert!(json["logs"].is_null());
        assert!(json.get("title").is_none());
    }

    #[test]
    fn log_html_stays_out_of_json() {
        let mut rec = TaskRecord::new(id(), "u", "t");
        rec.logs = Some(LogCapture {
            text: "cargo test".into(),
            source: "pre".into(),
            html: Some("<pre>cargo test</pre>".into()),
        });
        let text = serde_json::to_string(&rec).unwrap();
        assert!(!text.contains("<pre>"));
        let back: TaskRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.logs.unwrap().text, "cargo test");
    }
}
