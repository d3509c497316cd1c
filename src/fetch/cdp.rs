use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use super::{FetchBackend, FetchError, FetchedPage};
use crate::cli::config::FetchSettings;

/// Browser backend driven over the Chrome DevTools Protocol (engine B). The
/// launched browser process lives for the whole job; each fetch opens a
/// fresh page and closes it afterwards so pages cannot leak CDP handles.
pub struct CdpBackend {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    nav_timeout: Duration,
    settle_delay: Duration,
}

impl CdpBackend {
    pub async fn launch(settings: &FetchSettings) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder().arg(format!(
            "--user-agent={}",
            settings.user_agent
        ));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| FetchError::Session(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Session(format!("failed to launch Chrome: {}", e)))?;

        // The CDP event loop must be polled for the connection to make
        // progress; it ends when the browser goes away
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        debug!("Chrome launched via CDP");

        Ok(Self {
            browser: Some(browser),
            handler_task: Some(handler_task),
            nav_timeout: Duration::from_secs(settings.nav_timeout_secs),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
        })
    }

    async fn render(&self, page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
        let nav_secs = self.nav_timeout.as_secs();

        timeout(self.nav_timeout, page.goto(url))
            .await
            .map_err(|_| FetchError::NavigationTimeout(nav_secs))?
            .map_err(|e| FetchError::Network(format!("navigation to {} failed: {}", url, e)))?;

        // Wait for the load lifecycle; network-idle detection is part of it.
        // A failure here still leaves a usable document, so only log it.
        match timeout(self.nav_timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("wait_for_navigation failed for {}: {}", url, e),
            Err(_) => return Err(FetchError::NavigationTimeout(nav_secs)),
        }

        sleep(self.settle_delay).await;

        let body = page
            .content()
            .await
            .map_err(|e| FetchError::Session(format!("failed to read page content: {}", e)))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(FetchedPage {
            final_url,
            status: 200,
            content_type: "text/html".to_string(),
            body,
        })
    }
}

#[async_trait]
impl FetchBackend for CdpBackend {
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| FetchError::Session("browser already closed".to_string()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Session(format!("failed to open page: {}", e)))?;

        let result = self.render(&page, url).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close page for {}: {}", url, e);
        }

        result
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                error!("Error closing Chrome: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Chrome exited uncleanly: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}

impl Drop for CdpBackend {
    fn drop(&mut self) {
        // close() is the normal teardown path; this only stops the event
        // loop if the backend is dropped early
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
    }
}
