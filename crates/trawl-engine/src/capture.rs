use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use trawl_browser::{BrowserError, BrowserTab, DomQuery};
use trawl_core::config::Markers;
use trawl_core::Identifier;

/// Tabs that switch the detail view to agent output.
const TAB_SELECTOR: &str = r#"button, [role="tab"]"#;

/// Markup of a ready detail page, captured before extraction.
#[derive(Debug, Clone)]
pub struct DetailSnapshot {
    pub task_id: Identifier,
    pub url: String,
    pub main_html: String,
    /// Document after switching to the logs tab; `None` when the page has none.
    pub logs_html: Option<String>,
}

/// Snapshot the main view, then the logs view if a logs tab can be activated.
pub async fn capture_detail(
    tab: &dyn BrowserTab,
    task_id: &Identifier,
    markers: &Markers,
    cancel: &CancellationToken,
) -> Result<DetailSnapshot, BrowserError> {
    let url = tab.current_url().await?;
    let main_html = tab.content().await?;

    let click = DomQuery::ClickByText {
        selector: TAB_SELECTOR.to_string(),
        labels: markers.logs_tab_labels.clone(),
    };
    let clicked = tab.query(&click).await?.as_bool() == Some(true);

    let logs_html = if clicked && settle(markers.logs_settle(), cancel).await {
        Some(tab.content().await?)
    } else {
        debug!(task_id = %task_id, clicked, "no logs view captured");
        None
    };

    Ok(DetailSnapshot {
        task_id: task_id.clone(),
        url,
        main_html,
        logs_html,
    })
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn settle(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{detail_page, BASE};
    use trawl_browser::ScriptedTab;

    #[tokio::test(start_paused = true)]
    async fn captures_logs_after_clicking_tab() {
        let id = Identifier::parse("task_e_AAA").unwrap();
        let url = id.detail_url(BASE);
        let main = detail_page("Fix bug").replace("</body>", "<button>Logs</button></body>");
        let tab = ScriptedTab::new()
            .page(&url, main.clone())
            .logs_view(&url, "<pre>lots of output</pre>");
        tab.navigate(&url).await.unwrap();

        let snap = capture_detail(&tab, &id, &Markers::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snap.main_html, main);
        assert_eq!(snap.logs_html.as_deref(), Some("<pre>lots of output</pre>"));
        assert_eq!(snap.url, url);
    }

    #[tokio::test]
    async fn page_without_logs_tab_has_no_logs_view() {
        let id = Identifier::parse("task_e_AAA").unwrap();
        let url = id.detail_url(BASE);
        let tab = ScriptedTab::new().page(&url, detail_page("Fix bug"));
        tab.navigate(&url).await.unwrap();

        let snap = capture_detail(&tab, &id, &Markers::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(snap.logs_html.is_none());
    }
}
