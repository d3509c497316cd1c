use async_trait::async_trait;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{FetchBackend, FetchError, FetchedPage};
use crate::cli::config::FetchSettings;

/// Plain HTTP backend. Stateless between pages apart from the connection
/// pool; no session to tear down.
pub struct HttpBackend {
    client: Client,
    meta_charset: Regex,
}

impl HttpBackend {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .connect_timeout(Duration::from_secs(settings.http_timeout_secs.min(10)))
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Session(format!("failed to build HTTP client: {}", e)))?;

        let meta_charset = Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-]+)"#)
            .map_err(|e| FetchError::Session(format!("invalid charset pattern: {}", e)))?;

        Ok(Self { client, meta_charset })
    }

    /// Decoding order: response-declared charset, then a `<meta charset>`
    /// sniffed from the head of the body, then UTF-8 (lossy).
    fn decode_body(&self, bytes: &[u8], content_type: &str) -> String {
        let declared = charset_from_header(content_type);
        let sniffed = declared.is_none().then(|| self.charset_from_meta(bytes)).flatten();

        if let Some(label) = declared.or(sniffed) {
            if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
                let (text, _, had_errors) = encoding.decode(bytes);
                if had_errors {
                    debug!("Replacement characters while decoding as {}", label);
                }
                return text.into_owned();
            }
            debug!("Unknown charset label '{}', falling back to UTF-8", label);
        }

        String::from_utf8_lossy(bytes).into_owned()
    }

    fn charset_from_meta(&self, bytes: &[u8]) -> Option<String> {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
        self.meta_charset
            .captures(&head)
            .map(|caps| caps[1].to_string())
    }
}

fn charset_from_header(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .map(|cs| cs.trim_matches('"').to_string())
        .next()
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network("request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Network(format!("connection failed: {}", e))
    } else {
        FetchError::Network(e.to_string())
    }
}

#[async_trait]
impl FetchBackend for HttpBackend {
    async fn fetch(&mut self, url: &str) -> Result<FetchedPage, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = response.bytes().await.map_err(classify)?;
        let body = self.decode_body(&bytes, &content_type);

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    async fn close(&mut self) {}
}
