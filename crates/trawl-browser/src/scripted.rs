//! In-memory tab driven by HTML fixtures, for tests and dry runs.

use crate::{BrowserError, BrowserTab, DomQuery};
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

const BLANK: &str = "<html><head></head><body></body></html>";

/// What one page load produces.
#[derive(Debug, Clone)]
pub struct Landing {
    url: Option<String>,
    html: String,
}

impl Landing {
    /// The requested URL loads and shows `html`.
    pub fn at(html: impl Into<String>) -> Self {
        Self {
            url: None,
            html: html.into(),
        }
    }

    /// The load ends on `url` instead of the requested one.
    pub fn redirected(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            html: html.into(),
        }
    }
}

/// Side effects the tab observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    Navigate(String),
    Reload(String),
    Scroll,
    Click(String),
}

#[derive(Debug, Default)]
struct Fixture {
    loads: Vec<Landing>,
    served: usize,
    frames: Vec<String>,
    logs_view: Option<String>,
    navigate_errors: u32,
}

#[derive(Debug)]
struct State {
    fixtures: HashMap<String, Fixture>,
    requested: String,
    url: String,
    html: String,
    frame: usize,
    visits: Vec<Visit>,
    screenshots: u32,
    query_errors: u32,
}

/// Fake [`BrowserTab`] that serves registered HTML per URL.
///
/// Each load of a URL serves the next registered [`Landing`]; the last one
/// repeats forever. Listing pages advance one frame per scroll. Unknown
/// URLs load an empty document.
#[derive(Debug)]
pub struct ScriptedTab {
    state: Mutex<State>,
}

impl Default for ScriptedTab {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTab {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                fixtures: HashMap::new(),
                requested: "about:blank".to_string(),
                url: "about:blank".to_string(),
                html: BLANK.to_string(),
                frame: 0,
                visits: Vec::new(),
                screenshots: 0,
                query_errors: 0,
            }),
        }
    }

    /// Serve `html` on every load of `url`.
    pub fn page(self, url: &str, html: impl Into<String>) -> Self {
        self.page_loads(url, vec![Landing::at(html)])
    }

    /// Serve `loads` on successive loads of `url`.
    pub fn page_loads(self, url: &str, loads: Vec<Landing>) -> Self {
        self.with_fixture(url, |f| f.loads = loads)
    }

    /// A virtualized listing: `frames[0]` on load, then one frame per scroll.
    pub fn listing(self, url: &str, frames: Vec<String>) -> Self {
        self.with_fixture(url, |f| {
            f.loads = frames.first().cloned().map(Landing::at).into_iter().collect();
            f.frames = frames;
        })
    }

    /// Document shown after a successful click on `url`'s logs tab.
    pub fn logs_view(self, url: &str, html: impl Into<String>) -> Self {
        let html = html.into();
        self.with_fixture(url, |f| f.logs_view = Some(html))
    }

    /// The next `times` navigations to `url` fail with a transport error.
    pub fn failing_navigation(self, url: &str, times: u32) -> Self {
        self.with_fixture(url, |f| f.navigate_errors = times)
    }

    /// The next `times` DOM queries fail, as they do while a document is
    /// being replaced.
    pub fn failing_queries(self, times: u32) -> Self {
        self.lock().query_errors = times;
        self
    }

    pub fn visits(&self) -> Vec<Visit> {
        self.lock().visits.clone()
    }

    /// Loads (navigations plus reloads) of `url`.
    pub fn loads_of(&self, url: &str) -> usize {
        self.lock()
            .visits
            .iter()
            .filter(|v| matches!(v, Visit::Navigate(u) | Visit::Reload(u) if u == url))
            .count()
    }

    pub fn screenshots_taken(&self) -> u32 {
        self.lock().screenshots
    }

    fn with_fixture(self, url: &str, f: impl FnOnce(&mut Fixture)) -> Self {
        {
            let mut state = self.lock();
            f(state.fixtures.entry(url.to_string()).or_default());
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl State {
    fn load(&mut self, url: &str) {
        self.requested = url.to_string();
        self.frame = 0;
        match self.fixtures.get_mut(url) {
            Some(fixture) if !fixture.loads.is_empty() => {
                let idx = fixture.served.min(fixture.loads.len() - 1);
                fixture.served += 1;
                let landing = &fixture.loads[idx];
                self.url = landing.url.clone().unwrap_or_else(|| url.to_string());
                self.html = landing.html.clone();
            }
            _ => {
                self.url = url.to_string();
                self.html = BLANK.to_string();
            }
        }
    }

    fn run_query(&mut self, query: &DomQuery) -> Value {
        let doc = Html::parse_document(&self.html);
        match query {
            DomQuery::Exists { selectors } => Value::Bool(selectors.iter().any(|s| {
                Selector::parse(s).is_ok_and(|sel| doc.select(&sel).next().is_some())
            })),
            DomQuery::Hrefs { selector } => {
                let Ok(sel) = Selector::parse(selector) else {
                    return Value::Array(Vec::new());
                };
                Value::Array(
                    doc.select(&sel)
                        .filter_map(|el| el.value().attr("href"))
                        .map(|h| Value::String(h.to_string()))
                        .collect(),
                )
            }
            DomQuery::ClickByText { selector, labels } => {
                let Ok(sel) = Selector::parse(selector) else {
                    return Value::Bool(false);
                };
                let hit = doc.select(&sel).find_map(|el| {
                    let text = el.text().collect::<String>();
                    let text = text.trim();
                    labels
                        .iter()
                        .find(|l| l.eq_ignore_ascii_case(text))
                        .cloned()
                });
                let Some(label) = hit else {
                    return Value::Bool(false);
                };
                self.visits.push(Visit::Click(label));
                if let Some(view) = self
                    .fixtures
                    .get(&self.requested)
                    .and_then(|f| f.logs_view.clone())
                {
                    self.html = view;
                }
                Value::Bool(true)
            }
        }
    }
}

#[async_trait::async_trait]
impl BrowserTab for ScriptedTab {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.visits.push(Visit::Navigate(url.to_string()));
        if let Some(fixture) = state.fixtures.get_mut(url) {
            if fixture.navigate_errors > 0 {
                fixture.navigate_errors -= 1;
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    detail: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
        }
        state.load(url);
        Ok(())
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let url = state.requested.clone();
        state.visits.push(Visit::Reload(url.clone()));
        state.load(&url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.lock().url.clone())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value, BrowserError> {
        Ok(Value::Null)
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.visits.push(Visit::Scroll);
        let requested = state.requested.clone();
        let next = state.frame + 1;
        let frame = state
            .fixtures
            .get(&requested)
            .filter(|f| !f.frames.is_empty())
            .map(|f| {
                let idx = next.min(f.frames.len() - 1);
                (idx, f.frames[idx].clone())
            });
        if let Some((idx, html)) = frame {
            state.frame = idx;
            state.html = html;
        }
        Ok(())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.lock().screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.lock().html.clone())
    }

    async fn query(&self, query: &DomQuery) -> Result<Value, BrowserError> {
        let mut state = self.lock();
        if state.query_errors > 0 {
            state.query_errors -= 1;
            return Err(BrowserError::Script(
                "Execution context was destroyed".to_string(),
            ));
        }
        Ok(state.run_query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "https://site.test/list";

    #[tokio::test]
    async fn successive_loads_then_last_repeats() {
        let tab = ScriptedTab::new().page_loads(
            "https://site.test/a",
            vec![
                Landing::redirected(LIST, "<p>list</p>"),
                Landing::at("<p>detail</p>"),
            ],
        );
        tab.navigate("https://site.test/a").await.unwrap();
        assert_eq!(tab.current_url().await.unwrap(), LIST);
        tab.reload().await.unwrap();
        assert_eq!(tab.content().await.unwrap(), "<p>detail</p>");
        tab.navigate("https://site.test/a").await.unwrap();
        assert_eq!(tab.content().await.unwrap(), "<p>detail</p>");
        assert_eq!(tab.loads_of("https://site.test/a"), 3);
    }

    #[tokio::test]
    async fn scroll_advances_listing_frames() {
        let tab = ScriptedTab::new().listing(
            LIST,
            vec![
                r#"<a href="/x/1">1</a>"#.to_string(),
                r#"<a href="/x/2">2</a>"#.to_string(),
            ],
        );
        tab.navigate(LIST).await.unwrap();
        let hrefs = DomQuery::Hrefs {
            selector: "a".into(),
        };
        assert_eq!(tab.query(&hrefs).await.unwrap(), serde_json::json!(["/x/1"]));
        tab.scroll_to_bottom().await.unwrap();
        tab.scroll_to_bottom().await.unwrap();
        assert_eq!(tab.query(&hrefs).await.unwrap(), serde_json::json!(["/x/2"]));
    }

    #[tokio::test]
    async fn click_switches_to_logs_view() {
        let url = "https://site.test/t";
        let tab = ScriptedTab::new()
            .page(url, "<button> Logs </button>")
            .logs_view(url, "<pre>ok</pre>");
        tab.navigate(url).await.unwrap();
        let click = DomQuery::ClickByText {
            selector: "button".into(),
            labels: vec!["logs".into()],
        };
        assert_eq!(tab.query(&click).await.unwrap(), Value::Bool(true));
        assert_eq!(tab.content().await.unwrap(), "<pre>ok</pre>");
        assert_eq!(tab.visits().last(), Some(&Visit::Click("logs".into())));
    }

    #[tokio::test]
    async fn injected_navigation_errors_are_consumed() {
        let url = "https://site.test/t";
        let tab = ScriptedTab::new().page(url, "<p/>").failing_navigation(url, 1);
        assert!(tab.navigate(url).await.is_err());
        assert!(tab.navigate(url).await.is_ok());
    }

    #[tokio::test]
    async fn injected_query_errors_are_consumed() {
        let tab = ScriptedTab::new().failing_queries(2);
        let probe = DomQuery::exists(&["body".to_string()]);
        assert!(tab.query(&probe).await.is_err());
        assert!(tab.query(&probe).await.is_err());
        assert_eq!(tab.query(&probe).await.unwrap(), Value::Bool(true));
    }
}
