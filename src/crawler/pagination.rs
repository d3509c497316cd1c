/// Derives the URL for a given 1-based page index from the job's base URL.
///
/// Page 1 is the base URL unchanged; later pages append a `page=N` query
/// parameter. Sites with different pagination schemes need a different base
/// URL per page from a higher-level policy.
pub fn next_page_url(base_url: &str, page: u32) -> String {
    if page <= 1 {
        return base_url.to_string();
    }
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", base_url, separator, page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_is_base_url() {
        assert_eq!(next_page_url("https://example.com", 1), "https://example.com");
    }

    #[test]
    fn test_later_pages_append_query_parameter() {
        assert_eq!(
            next_page_url("https://example.com", 2),
            "https://example.com?page=2"
        );
        assert_eq!(
            next_page_url("https://example.com/list", 7),
            "https://example.com/list?page=7"
        );
    }

    #[test]
    fn test_existing_query_uses_ampersand() {
        assert_eq!(
            next_page_url("https://example.com?search=test", 2),
            "https://example.com?search=test&page=2"
        );
    }
}
