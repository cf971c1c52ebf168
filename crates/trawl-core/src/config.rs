//! Run configuration.
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working configuration for the Codex task archive. Selectors and
//! timings live here rather than in the engine because the target UI changes
//! under us; they are data, not code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrawlConfig {
    pub browser: BrowserSection,
    pub site: SiteSection,
    pub discovery: DiscoverySection,
    pub navigation: NavigationSection,
    pub markers: Markers,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Remote-debugging endpoint of an already running, logged-in Chrome.
    pub cdp_url: String,
    /// Number of tabs used for collection.
    pub tabs: usize,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            cdp_url: "http://localhost:9222".into(),
            tabs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub base_url: String,
    pub listing_path: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: "https://chatgpt.com".into(),
            listing_path: "/codex?tab=archived".into(),
        }
    }
}

impl SiteSection {
    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.listing_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub load_timeout_ms: u64,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    /// Consecutive passes without new identifiers before discovery stops.
    pub stable_passes: u32,
    pub max_passes: u32,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            load_timeout_ms: 15_000,
            settle_ms: 1_000,
            poll_interval_ms: 250,
            stable_passes: 3,
            max_passes: 200,
        }
    }
}

impl DiscoverySection {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSection {
    pub ready_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// How long listing markers may stay on screen after a detail navigation
    /// before the attempt is declared stale. Client routing can briefly keep
    /// the previous view mounted.
    pub wrong_page_grace_ms: u64,
    pub screenshots: bool,
}

impl Default for NavigationSection {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 10_000,
            poll_interval_ms: 250,
            max_attempts: 3,
            wrong_page_grace_ms: 1_500,
            screenshots: true,
        }
    }
}

impl NavigationSection {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wrong_page_grace(&self) -> Duration {
        Duration::from_millis(self.wrong_page_grace_ms)
    }
}

/// CSS selectors that identify page regions. Lists are tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    /// Present only once a detail page has rendered its prompt.
    pub detail_ready: Vec<String>,
    /// Present on the listing page; seeing these after a detail navigation
    /// means the router left us on the front page.
    pub listing: Vec<String>,
    /// Anchors that link to task detail pages.
    pub task_link: String,
    pub prompt: Vec<String>,
    pub logs_tab_labels: Vec<String>,
    pub logs_container: Vec<String>,
    pub logs_settle_ms: u64,
    pub date: Vec<String>,
    pub repository: Vec<String>,
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
    pub file_entry: Vec<String>,
    pub status: Vec<String>,
    pub section_heading: Vec<String>,
}

impl Default for Markers {
    fn default() -> Self {
        let prompt_region = "div.px-4.text-sm.break-words.whitespace-pre-wrap".to_string();
        Self {
            detail_ready: vec![prompt_region.clone()],
            listing: vec![r#"a[href*="/codex/tasks/task_e_"]"#.into()],
            task_link: r#"a[href*="/codex/tasks/task_e_"]"#.into(),
            prompt: vec![
                prompt_region,
                r#"div[class*="whitespace-pre-wrap"][class*="break-words"]"#.into(),
            ],
            logs_tab_labels: vec!["Logs".into(), "Log".into(), "Output".into(), "Console".into()],
            logs_container: vec![
                r#"div[class*="react-scroll-to-bottom"]"#.into(),
                r#"[role="log"]"#.into(),
                "pre".into(),
                "code".into(),
            ],
            logs_settle_ms: 1_500,
            date: vec![
                "time".into(),
                r#"span[class*="text-token-text-secondary"]"#.into(),
                r#"div[class*="text-token-text-secondary"]"#.into(),
            ],
            repository: vec!["span".into()],
            additions: vec![r#"span[class*="text-green"]"#.into()],
            deletions: vec![r#"span[class*="text-red"]"#.into()],
            file_entry: vec!["button".into()],
            status: vec![r#"[class*="badge"]"#.into(), "a".into(), "span".into()],
            section_heading: vec!["strong".into(), "h2".into(), "h3".into()],
        }
    }
}

impl Markers {
    pub fn logs_settle(&self) -> Duration {
        Duration::from_millis(self.logs_settle_ms)
    }

    fn all_selectors(&self) -> impl Iterator<Item = &String> {
        self.detail_ready
            .iter()
            .chain(&self.listing)
            .chain(std::iter::once(&self.task_link))
            .chain(&self.prompt)
            .chain(&self.logs_container)
            .chain(&self.date)
            .chain(&self.repository)
            .chain(&self.additions)
            .chain(&self.deletions)
            .chain(&self.file_entry)
            .chain(&self.status)
            .chain(&self.section_heading)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("codex_tasks"),
        }
    }
}

/// Load config from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<TrawlConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(TrawlConfig::default());
    };
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate a YAML config document.
pub fn parse_config(yaml: &str) -> Result<TrawlConfig, ConfigError> {
    let config: TrawlConfig = if yaml.trim().is_empty() {
        TrawlConfig::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    config.validate()?;
    Ok(config)
}

impl TrawlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.browser.tabs == 0 {
            return invalid("browser.tabs must be at least 1".into());
        }
        if !self.site.base_url.starts_with("http://") && !self.site.base_url.starts_with("https://")
        {
            return invalid(format!(
                "site.base_url must be an http(s) URL, got \"{}\"",
                self.site.base_url
            ));
        }
        if self.discovery.stable_passes == 0 {
            return invalid("discovery.stable_passes must be at least 1".into());
        }
        if self.discovery.max_passes == 0 {
            return invalid("discovery.max_passes must be at least 1".into());
        }
        if self.navigation.max_attempts == 0 {
            return invalid("navigation.max_attempts must be at least 1".into());
        }
        if self.navigation.poll_interval_ms == 0
            || self.navigation.poll_interval_ms > self.navigation.ready_timeout_ms
        {
            return invalid(format!(
                "navigation.poll_interval_ms ({}) must be between 1 and ready_timeout_ms ({})",
                self.navigation.poll_interval_ms, self.navigation.ready_timeout_ms
            ));
        }
        if self.discovery.poll_interval_ms == 0
            || self.discovery.poll_interval_ms > self.discovery.load_timeout_ms
        {
            return invalid(format!(
                "discovery.poll_interval_ms ({}) must be between 1 and load_timeout_ms ({})",
                self.discovery.poll_interval_ms, self.discovery.load_timeout_ms
            ));
        }
        if self.markers.detail_ready.is_empty() || self.markers.listing.is_empty() {
            return invalid("markers.detail_ready and markers.listing must not be empty".into());
        }
        if self.markers.prompt.is_empty() {
            return invalid("markers.prompt must not be empty".into());
        }
        for sel in self.markers.all_selectors() {
            if scraper::Selector::parse(sel).is_err() {
                return invalid(format!("unparseable selector: {sel}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.navigation.max_attempts, 3);
        assert_eq!(cfg.navigation.ready_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.navigation.poll_interval(), Duration::from_millis(250));
        assert_eq!(cfg.discovery.stable_passes, 3);
        assert_eq!(cfg.site.listing_url(), "https://chatgpt.com/codex?tab=archived");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            "navigation:\n  max_attempts: 5\nsite:\n  base_url: https://example.test/\n",
        )
        .unwrap();
        assert_eq!(cfg.navigation.max_attempts, 5);
        assert_eq!(cfg.navigation.ready_timeout_ms, 10_000);
        assert_eq!(cfg.site.listing_url(), "https://example.test/codex?tab=archived");
        assert_eq!(cfg.browser.cdp_url, "http://localhost:9222");
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = parse_config("navigation:\n  max_attempts: 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn rejects_poll_longer_than_timeout() {
        let err =
            parse_config("navigation:\n  ready_timeout_ms: 100\n  poll_interval_ms: 500\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_selector() {
        let err = parse_config("markers:\n  prompt: [\"div[[\"]\n").unwrap_err();
        assert!(err.to_string().contains("unparseable selector"));
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(matches!(
            parse_config("navigation: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_without_path_is_default() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.output.dir, PathBuf::from("codex_tasks"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trawl.yaml");
        std::fs::write(&path, "output:\n  dir: out\nbrowser:\n  tabs: 2\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.output.dir, PathBuf::from("out"));
        assert_eq!(cfg.browser.tabs, 2);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Some(Path::new("/nonexistent/trawl.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/trawl.yaml"));
    }
}
