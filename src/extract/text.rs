use unicode_normalization::UnicodeNormalization;

/// Normalizes a string field extracted from a document before it is stored
/// on an item: NFC normalization, control/format characters stripped,
/// whitespace runs collapsed to single spaces.
pub fn clean_text(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter(|c| !is_stripped(*c))
        .collect();

    let normalized: String = filtered.nfc().collect();

    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Control characters (Cc) and the common zero-width/bidi format characters
/// that show up in scraped titles. Whitespace-ish controls are kept so the
/// collapse step can treat them as separators.
fn is_stripped(c: char) -> bool {
    if c.is_control() {
        return !matches!(c, '\t' | '\n' | '\r');
    }
    matches!(c, '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}' | '\u{FEFF}')
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(clean_text("hello    world\n\n  again"), "hello world again");
    }

    #[test]
    fn test_strips_control_characters() {
        let cleaned = clean_text("ti\u{0000}tle\u{0007} with \u{200B}junk");
        assert!(!cleaned.chars().any(|c| c.is_control()));
        assert_eq!(cleaned, "title with junk");
    }

    #[test]
    fn test_no_double_spaces_after_cleaning() {
        let cleaned = clean_text("a \u{0008} b\t\t c");
        assert!(!cleaned.contains("  "));
        assert_eq!(cleaned, "a b c");
    }

    #[test]
    fn test_nfc_normalization() {
        // Decomposed e + combining acute becomes the precomposed form
        assert_eq!(clean_text("cafe\u{0301}"), "caf\u{00E9}");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("한국어 텍스트", 3), "한국어");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
