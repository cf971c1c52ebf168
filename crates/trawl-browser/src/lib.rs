pub mod cdp;
pub mod scripted;
pub mod wait;

pub use cdp::{CdpSession, CdpTab};
pub use scripted::{Landing, ScriptedTab, Visit};
pub use wait::{wait_for, WaitOutcome};

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("cannot connect to browser at {url}: {detail}")]
    Connect { url: String, detail: String },
    #[error("navigation to {url} failed: {detail}")]
    Navigation { url: String, detail: String },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("browser transport error: {0}")]
    Transport(String),
}

/// Read-only probes the engine runs against the current document.
///
/// Each query renders to a self-contained script for a real browser; fakes
/// may interpret the query directly instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomQuery {
    /// `true` when any selector matches at least one element.
    Exists { selectors: Vec<String> },
    /// Absolute `href` of every element matching `selector`, in document order.
    Hrefs { selector: String },
    /// Click the first `selector` element whose trimmed text equals one of
    /// `labels` (case-insensitive). `true` when something was clicked.
    ClickByText { selector: String, labels: Vec<String> },
}

impl DomQuery {
    pub fn exists(selectors: &[String]) -> Self {
        DomQuery::Exists {
            selectors: selectors.to_vec(),
        }
    }

    pub fn to_script(&self) -> String {
        match self {
            DomQuery::Exists { selectors } => format!(
                "(() => {{ const sels = {}; return sels.some(s => {{ \
                 try {{ return document.querySelector(s) !== null; }} catch (e) {{ return false; }} }}); }})()",
                js_literal(selectors)
            ),
            DomQuery::Hrefs { selector } => format!(
                "(() => Array.from(document.querySelectorAll({})).map(a => a.href).filter(Boolean))()",
                js_literal(selector)
            ),
            DomQuery::ClickByText { selector, labels } => format!(
                "(() => {{ const labels = {}.map(l => l.toLowerCase()); \
                 for (const el of document.querySelectorAll({})) {{ \
                   const t = (el.textContent || '').trim().toLowerCase(); \
                   if (labels.includes(t)) {{ el.click(); return true; }} }} \
                 return false; }})()",
                js_literal(labels),
                js_literal(selector)
            ),
        }
    }
}

fn js_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// One controllable browser tab.
///
/// Implemented by [`CdpTab`] (a live Chrome over the DevTools protocol) and
/// [`ScriptedTab`] (tests). Callers own the only reference to a tab while
/// they use it; tabs are never shared between workers.
#[async_trait::async_trait]
pub trait BrowserTab: Send + Sync {
    /// Load `url` in this tab. Returns once the browser reports the load.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn reload(&self) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Scroll the window (and the listing's last row) into view so a
    /// virtualized list renders its next rows.
    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    /// PNG bytes of the visible viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Serialized outer HTML of the current document.
    async fn content(&self) -> Result<String, BrowserError>;

    async fn query(&self, query: &DomQuery) -> Result<Value, BrowserError> {
        self.evaluate(&query.to_script()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_embed_escaped_literals() {
        let q = DomQuery::Hrefs {
            selector: r#"a[href*="/codex/tasks/"]"#.into(),
        };
        let script = q.to_script();
        assert!(script.contains(r#"querySelectorAll("a[href*=\"/codex/tasks/\"]")"#));

        let click = DomQuery::ClickByText {
            selector: "button".into(),
            labels: vec!["Logs".into(), "Output".into()],
        };
        assert!(click.to_script().contains(r#"["Logs","Output"]"#));
    }
}
