pub mod cdp;
pub mod http;
pub mod webdriver;

use async_trait::async_trait;
use thiserror::Error;

use crate::cli::config::FetchSettings;
use crate::crawler::retry::Transient;
use crate::crawler::task::BackendKind;

/// A page as returned by any backend, normalized so the extractor does not
/// care how it was retrieved.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects (browser backends report the address bar URL)
    pub final_url: String,
    /// HTTP status where known; browser backends report 200 for a rendered page
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("navigation timed out after {0}s")]
    NavigationTimeout(u64),

    #[error("browser session error: {0}")]
    Session(String),
}

impl Transient for FetchError {
    /// Retry-eligible failures: connectivity, navigation timeouts and server
    /// errors. Client errors and session faults fail the page immediately.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::NavigationTimeout(_) => true,
            FetchError::HttpStatus(status) => (500..600).contains(status),
            FetchError::Session(_) => false,
        }
    }
}

/// A page-retrieval strategy. Backends own their session for the duration of
/// one job: created at job start, reused across pages, torn down when the job
/// reaches a terminal state. `&mut self` keeps fetches serialized per
/// instance.
#[async_trait]
pub trait FetchBackend: Send {
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Best-effort session teardown. Never escalates; backends log and
    /// swallow partial failures.
    async fn close(&mut self);
}

/// Creates the backend a task asked for. Session creation failure here is a
/// job-setup error and aborts the whole job, unlike per-page fetch errors.
pub async fn create_backend(
    kind: BackendKind,
    settings: &FetchSettings,
) -> Result<Box<dyn FetchBackend>, FetchError> {
    match kind {
        BackendKind::Http => {
            let backend = http::HttpBackend::new(settings)?;
            Ok(Box::new(backend))
        }
        BackendKind::Webdriver => {
            let backend = webdriver::WebDriverBackend::connect(settings).await?;
            Ok(Box::new(backend))
        }
        BackendKind::Chrome => {
            let backend = cdp::CdpBackend::launch(settings).await?;
            Ok(Box::new(backend))
        }
    }
}
