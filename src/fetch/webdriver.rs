use async_trait::async_trait;
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use tokio::time::sleep;
use tracing::{debug, error};

use super::{FetchBackend, FetchError, FetchedPage};
use crate::cli::config::FetchSettings;

/// Browser backend driven over the WebDriver protocol (engine A). One
/// session is created per job and reused for every page; the session is the
/// shared OS-level browser process, so fetches are strictly serialized.
pub struct WebDriverBackend {
    driver: Option<WebDriver>,
    nav_timeout: Duration,
    settle_delay: Duration,
}

impl WebDriverBackend {
    /// Connects to the WebDriver endpoint and opens the session. Failure
    /// here is a job-setup error, not a page error.
    pub async fn connect(settings: &FetchSettings) -> Result<Self, FetchError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_arg(&format!("--user-agent={}", settings.user_agent))
            .map_err(session_err)?;
        caps.add_chrome_arg("--disable-dev-shm-usage")
            .map_err(session_err)?;
        if settings.headless {
            caps.set_headless().map_err(session_err)?;
        }

        let driver = WebDriver::new(&settings.webdriver_url, caps)
            .await
            .map_err(|e| {
                FetchError::Session(format!(
                    "failed to connect to WebDriver at {}: {}",
                    settings.webdriver_url, e
                ))
            })?;

        driver
            .set_page_load_timeout(Duration::from_secs(settings.nav_timeout_secs))
            .await
            .map_err(session_err)?;

        debug!("WebDriver session established at {}", settings.webdriver_url);

        Ok(Self {
            driver: Some(driver),
            nav_timeout: Duration::from_secs(settings.nav_timeout_secs),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
        })
    }

    fn driver(&self) -> Result<&WebDriver, FetchError> {
        self.driver
            .as_ref()
            .ok_or_else(|| FetchError::Session("browser session already closed".to_string()))
    }

    /// Polls `document.readyState` until the DOM is loaded or the navigation
    /// deadline passes.
    async fn wait_for_ready(&self) -> Result<(), FetchError> {
        let driver = self.driver()?;
        let deadline = tokio::time::Instant::now() + self.nav_timeout;

        loop {
            let ret = driver
                .execute("return document.readyState", Vec::new())
                .await
                .map_err(|e| self.classify(e))?;

            if ret.json().as_str() == Some("complete") {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FetchError::NavigationTimeout(self.nav_timeout.as_secs()));
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    fn classify(&self, e: WebDriverError) -> FetchError {
        let msg = e.to_string();
        if msg.to_lowercase().contains("timeout") {
            FetchError::NavigationTimeout(self.nav_timeout.as_secs())
        } else {
            FetchError::Session(msg)
        }
    }
}

fn session_err(e: WebDriverError) -> FetchError {
    FetchError::Session(e.to_string())
}

#[async_trait]
impl FetchBackend for WebDriverBackend {
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError> {
        let driver = self.driver()?;

        debug!("Navigating to: {}", url);
        driver.goto(url).await.map_err(|e| self.classify(e))?;

        self.wait_for_ready().await?;

        // Give script-driven rendering a moment to fill the document
        sleep(self.settle_delay).await;

        let driver = self.driver()?;
        let body = driver.source().await.map_err(|e| self.classify(e))?;
        let final_url = driver.current_url().await.map_err(|e| self.classify(e))?;

        Ok(FetchedPage {
            final_url: final_url.to_string(),
            status: 200,
            content_type: "text/html".to_string(),
            body,
        })
    }

    async fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.quit().await {
                error!("Error closing browser session: {}", e);
            }
            debug!("Browser session closed");
        }
    }
}

impl Drop for WebDriverBackend {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            // Quit has to happen on the runtime; close() is the normal path,
            // this only covers early exits
            tokio::spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}
