//! Live Chrome over the DevTools protocol.

use crate::{BrowserError, BrowserTab};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, ReloadParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const SCROLL_SCRIPT: &str = r#"(() => {
  window.scrollTo(0, document.body.scrollHeight);
  const rows = document.querySelectorAll('a[href*="/codex/tasks/"]');
  if (rows.length) { rows[rows.length - 1].scrollIntoView({ block: 'end' }); }
  return true;
})()"#;

/// Connection to an already running browser (started with
/// `--remote-debugging-port`). The browser itself is never closed.
pub struct CdpSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl CdpSession {
    /// Connect to `cdp_url`, either `http://host:port` or a `ws://` debugger URL.
    pub async fn connect(cdp_url: &str) -> Result<Self, BrowserError> {
        let (browser, mut handler) =
            Browser::connect(cdp_url)
                .await
                .map_err(|e| BrowserError::Connect {
                    url: cdp_url.to_string(),
                    detail: e.to_string(),
                })?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("cdp handler: {e}");
                }
            }
        });
        info!(cdp_url, "connected to browser");
        Ok(Self { browser, handler })
    }

    /// The first open page, so an existing logged-in tab is reused.
    /// Opens a blank page when the browser has none.
    pub async fn primary_tab(&self) -> Result<CdpTab, BrowserError> {
        let pages = self.browser.pages().await.map_err(transport)?;
        match pages.into_iter().next() {
            Some(page) => Ok(CdpTab { page }),
            None => self.open_tab().await,
        }
    }

    /// A fresh blank tab in the same browser context.
    pub async fn open_tab(&self) -> Result<CdpTab, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(transport)?;
        Ok(CdpTab { page })
    }

    /// `count` tabs: the primary tab plus `count - 1` new ones.
    pub async fn tabs(&self, count: usize) -> Result<Vec<CdpTab>, BrowserError> {
        let mut tabs = Vec::with_capacity(count.max(1));
        tabs.push(self.primary_tab().await?);
        while tabs.len() < count {
            tabs.push(self.open_tab().await?);
        }
        Ok(tabs)
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

pub struct CdpTab {
    page: Page,
}

fn transport(e: chromiumoxide::error::CdpError) -> BrowserError {
    BrowserError::Transport(e.to_string())
}

#[async_trait::async_trait]
impl BrowserTab for CdpTab {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                detail: e.to_string(),
            })?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        self.page
            .execute(ReloadParams::default())
            .await
            .map_err(transport)?;
        self.page.wait_for_navigation().await.map_err(transport)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.page.url().await.map_err(transport)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.evaluate(SCROLL_SCRIPT).await?;
        Ok(())
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.map_err(transport)
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(transport)
    }
}
