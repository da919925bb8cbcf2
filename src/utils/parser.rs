//! Text helpers for collection names, ids and HTML output.

use std::sync::LazyLock;

use regex::Regex;

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid uuid pattern")
});

/// Placeholder for collections without a name.
pub const UNNAMED: &str = "Без названия";

/// Longest button label before truncation.
const MAX_LABEL_CHARS: usize = 25;
const TRUNCATED_LABEL_CHARS: usize = 22;

/// Abbreviate long names: the first three words become initials.
///
/// `"TSUM Collection Panel 10.12.2025"` -> `"TCP 10.12.2025"`.
pub fn shorten_collection_name(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.is_empty() {
        return UNNAMED.to_string();
    }
    if words.len() <= 3 {
        return name.to_string();
    }

    let initials: String = words[..3]
        .iter()
        .filter_map(|w| w.chars().next())
        .flat_map(char::to_uppercase)
        .collect();

    format!("{} {}", initials, words[3..].join(" "))
}

/// Shortened name cut to fit an inline button.
pub fn button_label(name: &str) -> String {
    let short = shorten_collection_name(name);
    if short.chars().count() > MAX_LABEL_CHARS {
        let cut: String = short.chars().take(TRUNCATED_LABEL_CHARS).collect();
        format!("{cut}...")
    } else {
        short
    }
}

/// First UUID anywhere in the text.
pub fn extract_uuid(text: &str) -> Option<&str> {
    UUID.find(text).map(|m| m.as_str())
}

/// Whether the whole (trimmed) text is a UUID.
pub fn is_uuid(text: &str) -> bool {
    let text = text.trim();
    extract_uuid(text).is_some_and(|id| id.len() == text.len())
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorten_collection_name() {
        assert_eq!(shorten_collection_name("TSUM Collection Panel 10.12.2025"), "TCP 10.12.2025");
        assert_eq!(shorten_collection_name("Spring Drop"), "Spring Drop");
        assert_eq!(shorten_collection_name("   "), UNNAMED);
        assert_eq!(shorten_collection_name("весенний пак для цум 2"), "ВПД цум 2");
    }

    #[test]
    fn test_button_label_truncates() {
        let label = button_label("TSUM Collection Panel with a very long trailing description");
        assert_eq!(label.chars().count(), 25);
        assert!(label.ends_with("..."));
        assert_eq!(button_label("Short"), "Short");
    }

    #[test]
    fn test_uuid_helpers() {
        let id = "f01b63d4-90e6-49e7-a17a-1c6575a18450";
        assert!(is_uuid(id));
        assert!(is_uuid(&format!(" {} ", id.to_uppercase())));
        assert!(!is_uuid(&format!("id {id}")));
        assert_eq!(extract_uuid(&format!("/status {id} please")), Some(id));
        assert_eq!(extract_uuid("no id"), None);
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape(r#"<b>"A" & 'B'</b>"#), "&lt;b&gt;&quot;A&quot; &amp; &#x27;B&#x27;&lt;/b&gt;");
    }
}
