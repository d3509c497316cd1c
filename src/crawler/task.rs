use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which page-retrieval strategy a job uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Plain HTTP GET via reqwest
    Http,
    /// WebDriver-controlled browser (thirtyfour)
    Webdriver,
    /// CDP-controlled Chrome (chromiumoxide)
    Chrome,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Http => write!(f, "http"),
            BackendKind::Webdriver => write!(f, "webdriver"),
            BackendKind::Chrome => write!(f, "chrome"),
        }
    }
}

/// Named set of field-extraction rules tailored to a site family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    Generic,
    Shopping,
    Social,
    RealEstate,
}

/// Which fields the extractor should emit. The original system drove these
/// from UI checkboxes; here they are fixed for the lifetime of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FieldFlags {
    pub links: bool,
    pub images: bool,
    /// Body text on the page item; off by default since it dominates
    /// checkpoint and export size
    pub text: bool,
    pub title: bool,
    pub price: bool,
    pub date: bool,
    pub description: bool,
}

impl Default for FieldFlags {
    fn default() -> Self {
        Self {
            links: true,
            images: true,
            text: false,
            title: true,
            price: true,
            date: true,
            description: true,
        }
    }
}

/// Immutable definition of a crawling job. Created when the job is launched
/// and owned by exactly one [`CrawlJob`](super::job::CrawlJob); never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// URL of the first page; subsequent pages derive from it via the
    /// pagination policy
    pub base_url: String,

    /// Retrieval strategy for every page of this job
    pub backend: BackendKind,

    /// Number of pages to crawl (cursor runs 1..=max_pages)
    pub max_pages: u32,

    /// Delay between pages in milliseconds
    pub delay_ms: u64,

    /// Extraction profile for this site
    pub profile: ProfileKind,

    /// Which item fields to extract
    pub fields: FieldFlags,

    /// When the job was launched
    pub created_at: DateTime<Utc>,
}

impl CrawlTask {
    pub fn new(base_url: impl Into<String>, backend: BackendKind, max_pages: u32) -> Self {
        Self {
            base_url: base_url.into(),
            backend,
            max_pages: max_pages.max(1),
            delay_ms: 1000,
            profile: ProfileKind::Generic,
            fields: FieldFlags::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_profile(mut self, profile: ProfileKind) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_fields(mut self, fields: FieldFlags) -> Self {
        self.fields = fields;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pages_floor() {
        let task = CrawlTask::new("https://example.com", BackendKind::Http, 0);
        assert_eq!(task.max_pages, 1);
    }

    #[test]
    fn test_task_roundtrips_through_serde() {
        let task = CrawlTask::new("https://example.com", BackendKind::Webdriver, 5)
            .with_profile(ProfileKind::Shopping)
            .with_delay_ms(250);
        let json = serde_json::to_string(&task).unwrap();
        let back: CrawlTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_url, task.base_url);
        assert_eq!(back.backend, BackendKind::Webdriver);
        assert_eq!(back.profile, ProfileKind::Shopping);
        assert_eq!(back.delay_ms, 250);
    }
}
