use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

use super::text::{clean_text, truncate_chars};
use super::{resolve, Item, PageItem, ProductItem};
use crate::crawler::task::{FieldFlags, ProfileKind};
use crate::fetch::FetchedPage;

const MAX_TEXT_CHARS: usize = 100;

/// Ordered selector lists for one site family. For each field the first
/// selector that matches inside a product block wins; misses degrade the
/// block (or skip it), never the page.
pub struct SiteProfile {
    pub name: &'static str,
    pub blocks: &'static [&'static str],
    pub title: &'static [&'static str],
    pub price: &'static [&'static str],
    pub link: &'static [&'static str],
    pub image: &'static [&'static str],
    pub date: &'static [&'static str],
    pub description: &'static [&'static str],
}

static SHOPPING: SiteProfile = SiteProfile {
    name: "shopping",
    blocks: &[".product_item", ".goods_item", "li.prod", ".item"],
    title: &[".product_title", ".item_title", "strong.name", ".title", "a"],
    price: &[".price_num", ".sale_price", "em.num", "span.price", ".price"],
    link: &["a.product_link", "a"],
    image: &["img.product_img", "img"],
    date: &[],
    description: &[".product_desc", ".item_desc"],
};

static SOCIAL: SiteProfile = SiteProfile {
    name: "social",
    blocks: &[".post", ".feed_item", "article"],
    title: &[".post_title", ".subject", "h3", "a.title"],
    price: &[],
    link: &["a.post_link", "a"],
    image: &["img"],
    date: &["time", ".date", ".timestamp"],
    description: &[".post_body", ".content", "p"],
};

static REAL_ESTATE: SiteProfile = SiteProfile {
    name: "real_estate",
    blocks: &[".listing", ".estate_item", ".article_item"],
    title: &[".listing_title", ".item_title", ".subject"],
    price: &[".price", ".amount", "em.price"],
    link: &["a"],
    image: &["img"],
    date: &["time", ".date", ".posted_at"],
    description: &[".listing_desc", ".spec"],
};

pub fn selectors_for(kind: ProfileKind) -> Option<&'static SiteProfile> {
    match kind {
        ProfileKind::Generic => None,
        ProfileKind::Shopping => Some(&SHOPPING),
        ProfileKind::Social => Some(&SOCIAL),
        ProfileKind::RealEstate => Some(&REAL_ESTATE),
    }
}

/// Extracts an integer price from free-form price text: thousands separators
/// stripped, digit runs collected, the largest run wins. Sale pages often
/// carry both a struck-through list price and the actual one, and labels
/// like "2+1" confuse a first-match rule.
pub fn parse_price(text: &str) -> Option<i64> {
    let digits = Regex::new(r"\d+").ok()?;
    let stripped = text.replace(',', "");
    digits
        .find_iter(&stripped)
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .max()
}

fn first_match<'a>(block: &ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    for css in selectors {
        if let Ok(sel) = Selector::parse(css) {
            if let Some(el) = block.select(&sel).next() {
                return Some(el);
            }
        }
    }
    None
}

fn first_text(block: &ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    first_match(block, selectors)
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Site-profile extraction: one page item, then one product item per block
/// the profile's selectors can make sense of. Blocks with neither a title
/// nor a link are skipped; everything else degrades field by field.
pub fn extract_products(
    page: &FetchedPage,
    page_index: u32,
    profile: &SiteProfile,
    fields: &FieldFlags,
) -> Vec<Item> {
    let doc = Html::parse_document(&page.body);
    let base = Url::parse(&page.final_url).ok();
    let now = Utc::now();
    let mut items = Vec::new();

    let page_title = Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "(no title)".to_string());

    items.push(Item::Page(PageItem {
        title: page_title,
        url: page.final_url.clone(),
        description: None,
        text: None,
        page: page_index,
        extracted_at: now,
    }));

    // First block selector that matches anything wins for the whole page
    let blocks: Vec<ElementRef<'_>> = profile
        .blocks
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .map(|sel| doc.select(&sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    if blocks.is_empty() {
        debug!(
            "Page {}: no {} blocks matched, page item only",
            page_index, profile.name
        );
        return items;
    }

    let mut skipped = 0usize;
    for block in &blocks {
        let title = first_text(block, profile.title);
        let link = first_match(block, profile.link)
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve(base.as_ref(), href));

        if title.is_none() && link.is_none() {
            skipped += 1;
            continue;
        }

        let price = fields
            .price
            .then(|| first_text(block, profile.price).and_then(|t| parse_price(&t)))
            .flatten();

        let date = fields
            .date
            .then(|| first_text(block, profile.date))
            .flatten();

        let description = fields
            .description
            .then(|| first_text(block, profile.description))
            .flatten()
            .map(|d| truncate_chars(&d, MAX_TEXT_CHARS));

        let mut tags = BTreeSet::new();
        tags.insert(profile.name.to_string());

        items.push(Item::Product(ProductItem {
            title: truncate_chars(&title.unwrap_or_else(|| "(no title)".to_string()), MAX_TEXT_CHARS),
            url: link.unwrap_or_else(|| page.final_url.clone()),
            price,
            description,
            date,
            tags,
            page: page_index,
            extracted_at: now,
        }));
    }

    if skipped > 0 {
        debug!(
            "Page {}: skipped {} {} blocks without title or link",
            page_index, skipped, profile.name
        );
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_price_strips_separators() {
        assert_eq!(parse_price("19,800원"), Some(19800));
        assert_eq!(parse_price("₩1,234,567"), Some(1234567));
    }

    #[test]
    fn test_parse_price_takes_largest_run() {
        // struck-through list price next to the sale price
        assert_eq!(parse_price("정가 35,000원 판매가 19,800원"), Some(35000));
        assert_eq!(parse_price("2+1 EVENT 4500"), Some(4500));
    }

    #[test]
    fn test_parse_price_without_digits() {
        assert_eq!(parse_price("품절"), None);
        assert_eq!(parse_price(""), None);
    }

    fn shopping_page(body: &str) -> FetchedPage {
        FetchedPage {
            final_url: "https://shop.test/list".to_string(),
            status: 200,
            content_type: "text/html".to_string(),
            body: body.to_string(),
        }
    }

    const SHOP_SAMPLE: &str = r#"
        <html><head><title>Shop</title></head><body>
            <div class="product_item">
                <strong class="name">Keyboard</strong>
                <span class="price">89,000원</span>
                <a href="/item/1">view</a>
            </div>
            <div class="product_item">
                <strong class="name">Mouse</strong>
                <span class="price">sold out</span>
                <a href="/item/2">view</a>
            </div>
            <div class="product_item">
                <span class="badge">ad</span>
            </div>
        </body></html>
    "#;

    #[test]
    fn test_shopping_profile_extracts_products() {
        let items = extract_products(
            &shopping_page(SHOP_SAMPLE),
            1,
            &SHOPPING,
            &FieldFlags::default(),
        );

        // one page item + two products; the ad block has no title or link
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].kind(), "page");

        let products: Vec<_> = items.iter().filter(|i| i.kind() == "product").collect();
        assert_eq!(products[0].title(), "Keyboard");
        assert_eq!(products[0].price(), Some(89000));
        assert_eq!(products[0].url(), "https://shop.test/item/1");

        // unparsable price degrades to None, block still extracted
        assert_eq!(products[1].title(), "Mouse");
        assert_eq!(products[1].price(), None);
    }

    #[test]
    fn test_price_flag_disables_price_extraction() {
        let flags = FieldFlags {
            price: false,
            ..FieldFlags::default()
        };
        let items = extract_products(&shopping_page(SHOP_SAMPLE), 1, &SHOPPING, &flags);
        let products: Vec<_> = items.iter().filter(|i| i.kind() == "product").collect();
        assert!(products.iter().all(|p| p.price().is_none()));
    }

    #[test]
    fn test_profile_without_blocks_yields_page_item_only() {
        let items = extract_products(
            &shopping_page("<html><body><p>nothing here</p></body></html>"),
            1,
            &SHOPPING,
            &FieldFlags::default(),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind(), "page");
    }

    #[test]
    fn test_social_profile_has_no_price() {
        let body = r#"
            <html><body>
                <article><h3>Post title</h3><a href="/p/9">link</a></article>
            </body></html>
        "#;
        let items = extract_products(&shopping_page(body), 1, &SOCIAL, &FieldFlags::default());
        let product = items.iter().find(|i| i.kind() == "product").unwrap();
        assert_eq!(product.title(), "Post title");
        assert_eq!(product.price(), None);
    }

    #[test]
    fn test_social_profile_picks_up_the_posting_date() {
        let body = r#"
            <html><body>
                <article>
                    <h3>Post title</h3>
                    <time>2024-03-01</time>
                    <a href="/p/9">link</a>
                </article>
            </body></html>
        "#;
        let items = extract_products(&shopping_page(body), 1, &SOCIAL, &FieldFlags::default());
        match items.iter().find(|i| i.kind() == "product").unwrap() {
            Item::Product(p) => assert_eq!(p.date.as_deref(), Some("2024-03-01")),
            _ => unreachable!(),
        }

        let flags = FieldFlags {
            date: false,
            ..FieldFlags::default()
        };
        let items = extract_products(&shopping_page(body), 1, &SOCIAL, &flags);
        match items.iter().find(|i| i.kind() == "product").unwrap() {
            Item::Product(p) => assert!(p.date.is_none()),
            _ => unreachable!(),
        }
    }
}
