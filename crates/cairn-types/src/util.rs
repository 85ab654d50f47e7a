//! String helpers that respect UTF-8 boundaries.

/// Truncate `&str` to at most `max_bytes`, never splitting a UTF-8 codepoint.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shorten `s` for logs and hook payloads, appending `...` when cut.
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        s.to_string()
    } else {
        format!("{}...", truncate_str(s, max_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_untouched() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_for_display("hello", 5), "hello");
    }

    #[test]
    fn ascii_is_cut_exactly() {
        assert_eq!(truncate_str("hello world", 5), "hello");
        assert_eq!(truncate_for_display("hello world", 5), "hello...");
    }

    #[test]
    fn multibyte_chars_are_not_split() {
        // Each emoji is 4 bytes
        let s = "\u{1F600}\u{1F601}";
        assert_eq!(truncate_str(s, 5), "\u{1F600}");
        assert_eq!(truncate_str(s, 3), "");
        assert_eq!(truncate_str("caf\u{00e9}", 4), "caf");
    }
}
