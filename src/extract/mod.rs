pub mod generic;
pub mod profiles;
pub mod text;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

use crate::crawler::task::{FieldFlags, ProfileKind};
use crate::fetch::FetchedPage;

/// One extracted record. The original system kept these as loose dicts keyed
/// by "type"; the tagged enum gives each kind its own fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Page(PageItem),
    Link(LinkItem),
    Image(ImageItem),
    Product(ProductItem),
}

/// Page-level metadata, emitted once per fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageItem {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    /// Visible body text, capped; only present when the task asks for it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub page: u32,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkItem {
    /// Cleaned anchor text, may be empty for image-only links
    pub title: String,
    /// Absolute URL, resolved against the page URL
    pub url: String,
    pub page: u32,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    /// Alt text
    pub title: String,
    pub url: String,
    pub page: u32,
    pub extracted_at: DateTime<Utc>,
}

/// One product block matched by a site profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductItem {
    pub title: String,
    pub url: String,
    /// Currency-agnostic integer price, None when the price text was absent
    /// or unparsable
    pub price: Option<i64>,
    pub description: Option<String>,
    /// Posting or listing date as shown on the page, uninterpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub page: u32,
    pub extracted_at: DateTime<Utc>,
}

impl Item {
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Page(_) => "page",
            Item::Link(_) => "link",
            Item::Image(_) => "image",
            Item::Product(_) => "product",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Item::Page(i) => &i.title,
            Item::Link(i) => &i.title,
            Item::Image(i) => &i.title,
            Item::Product(i) => &i.title,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Item::Page(i) => &i.url,
            Item::Link(i) => &i.url,
            Item::Image(i) => &i.url,
            Item::Product(i) => &i.url,
        }
    }

    pub fn price(&self) -> Option<i64> {
        match self {
            Item::Product(i) => i.price,
            _ => None,
        }
    }

    pub fn date(&self) -> Option<&str> {
        match self {
            Item::Product(i) => i.date.as_deref(),
            _ => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Item::Page(i) => i.description.as_deref(),
            Item::Product(i) => i.description.as_deref(),
            _ => None,
        }
    }

    pub fn source_page(&self) -> u32 {
        match self {
            Item::Page(i) => i.page,
            Item::Link(i) => i.page,
            Item::Image(i) => i.page,
            Item::Product(i) => i.page,
        }
    }

    pub fn extracted_at(&self) -> DateTime<Utc> {
        match self {
            Item::Page(i) => i.extracted_at,
            Item::Link(i) => i.extracted_at,
            Item::Image(i) => i.extracted_at,
            Item::Product(i) => i.extracted_at,
        }
    }
}

/// Extracts items from a fetched page according to the task's profile and
/// field flags. Never fails: selector misses and malformed fields degrade to
/// fewer or sparser items, not errors.
pub fn extract(
    page: &FetchedPage,
    page_index: u32,
    profile: ProfileKind,
    fields: &FieldFlags,
) -> Vec<Item> {
    match profiles::selectors_for(profile) {
        Some(site) => profiles::extract_products(page, page_index, site, fields),
        None => generic::extract_generic(page, page_index, fields),
    }
}

/// Resolves a possibly-relative href against the page URL. Shared by every
/// profile so link and image URLs come out the same way.
pub(crate) fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_relative_and_keeps_absolute_hrefs() {
        let base = Url::parse("https://x.test/list/page").ok();
        assert_eq!(
            resolve(base.as_ref(), "/item/1"),
            Some("https://x.test/item/1".to_string())
        );
        assert_eq!(
            resolve(base.as_ref(), "https://other.test/abs"),
            Some("https://other.test/abs".to_string())
        );
        // relative href without a base has nothing to resolve against
        assert_eq!(resolve(None, "/item/1"), None);
    }
}
