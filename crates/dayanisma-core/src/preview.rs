const ELLIPSIS: &str = "...";

/// Cut `text` to at most `max_chars` characters, appending an ellipsis when
/// anything was dropped. Counts chars, not bytes, so Turkish letters and
/// emoji are never split.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Badge label for an unread count: nothing at zero, `"{cap}+"` above the cap.
pub fn unread_badge(count: usize, cap: usize) -> Option<String> {
    match count {
        0 => None,
        n if n > cap => Some(format!("{cap}+")),
        n => Some(n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(truncate_preview("Merhaba", 50), "Merhaba");
        assert_eq!(truncate_preview(&"a".repeat(50), 50), "a".repeat(50));
    }

    #[test]
    fn long_text_gets_ellipsis() {
        let text = "ğ".repeat(51);
        let preview = truncate_preview(&text, 50);
        assert_eq!(preview.chars().count(), 53);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn badge_caps() {
        assert_eq!(unread_badge(0, 99), None);
        assert_eq!(unread_badge(7, 99).as_deref(), Some("7"));
        assert_eq!(unread_badge(99, 99).as_deref(), Some("99"));
        assert_eq!(unread_badge(100, 99).as_deref(), Some("99+"));
    }
}
