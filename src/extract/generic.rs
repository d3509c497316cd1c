use chrono::Utc;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::text::{clean_text, truncate_chars};
use super::{resolve, ImageItem, Item, LinkItem, PageItem};
use crate::crawler::task::FieldFlags;
use crate::fetch::FetchedPage;

/// Display caps carried over from the original: at most 50 links and 30
/// images per page; the overflow count is logged rather than extracted.
const MAX_LINKS: usize = 50;
const MAX_IMAGES: usize = 30;
const MAX_TEXT_CHARS: usize = 100;
const MAX_BODY_CHARS: usize = 5000;

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!("Invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

/// Visible body text, approximated by the content-bearing elements so script
/// and style payloads stay out, capped to keep checkpoints bounded.
fn body_text(doc: &Html) -> String {
    let text = match selector("p, h1, h2, h3, h4, li, td, blockquote") {
        Some(sel) => doc
            .select(&sel)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" "),
        None => String::new(),
    };
    truncate_chars(&clean_text(&text), MAX_BODY_CHARS)
}

/// Generic profile: one page item with normalized metadata, plus capped link
/// and image items when the task's flags ask for them.
pub fn extract_generic(page: &FetchedPage, page_index: u32, fields: &FieldFlags) -> Vec<Item> {
    let doc = Html::parse_document(&page.body);
    let base = Url::parse(&page.final_url).ok();
    let now = Utc::now();
    let mut items = Vec::new();

    let title = selector("title")
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "(no title)".to_string());

    let description = fields
        .description
        .then(|| {
            selector(r#"meta[name="description"]"#)
                .and_then(|sel| doc.select(&sel).next())
                .and_then(|el| el.value().attr("content"))
                .map(clean_text)
                .filter(|d| !d.is_empty())
        })
        .flatten();

    let text = fields.text.then(|| body_text(&doc)).filter(|t| !t.is_empty());

    items.push(Item::Page(PageItem {
        title,
        url: page.final_url.clone(),
        description,
        text,
        page: page_index,
        extracted_at: now,
    }));

    if fields.links {
        if let Some(sel) = selector("a[href]") {
            let anchors: Vec<_> = doc.select(&sel).collect();
            for anchor in anchors.iter().take(MAX_LINKS) {
                let href = match anchor.value().attr("href") {
                    Some(h) => h,
                    None => continue,
                };
                let url = match resolve(base.as_ref(), href) {
                    Some(u) => u,
                    None => continue,
                };
                let text = truncate_chars(
                    &clean_text(&anchor.text().collect::<String>()),
                    MAX_TEXT_CHARS,
                );
                items.push(Item::Link(LinkItem {
                    title: text,
                    url,
                    page: page_index,
                    extracted_at: now,
                }));
            }
            if anchors.len() > MAX_LINKS {
                debug!(
                    "Page {}: {} more links beyond the cap of {}",
                    page_index,
                    anchors.len() - MAX_LINKS,
                    MAX_LINKS
                );
            }
        }
    }

    if fields.images {
        if let Some(sel) = selector("img[src]") {
            let images: Vec<_> = doc.select(&sel).collect();
            for img in images.iter().take(MAX_IMAGES) {
                let src = match img.value().attr("src") {
                    Some(s) => s,
                    None => continue,
                };
                let url = match resolve(base.as_ref(), src) {
                    Some(u) => u,
                    None => continue,
                };
                let alt = truncate_chars(
                    &clean_text(img.value().attr("alt").unwrap_or_default()),
                    MAX_TEXT_CHARS,
                );
                items.push(Item::Image(ImageItem {
                    title: alt,
                    url,
                    page: page_index,
                    extracted_at: now,
                }));
            }
            if images.len() > MAX_IMAGES {
                debug!(
                    "Page {}: {} more images beyond the cap of {}",
                    page_index,
                    images.len() - MAX_IMAGES,
                    MAX_IMAGES
                );
            }
        }
    }

    items
}
