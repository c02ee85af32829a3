use std::sync::LazyLock;

use regex::Regex;

static COMMENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment token regex"));

static SPLIT_DIGIT_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\s*,\s*(\d{3})\b").expect("split digit group regex"));

/// Drops `<!-- ... -->` tokens that survive as literal text when a page is
/// double-escaped or rendered server-side with hydration markers.
pub fn strip_markup_artifacts(text: &str) -> String {
    COMMENT_TOKEN.replace_all(text, " ").into_owned()
}

/// Collapse runs of whitespace (including nbsp) into a single space and trim.
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "1 ,204" -> "1,204". Inline markup inside a number leaves a separator
/// around its thousands comma once text nodes are joined.
pub fn rejoin_digit_groups(text: &str) -> String {
    let mut text = text.to_string();
    loop {
        let rejoined = SPLIT_DIGIT_GROUP
            .replace_all(&text, "${1},${2}")
            .into_owned();
        if rejoined == text {
            return text;
        }
        text = rejoined;
    }
}

/// "6,722" -> 6722. Commas are only accepted as thousands separators.
pub fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.contains(',') {
        let mut groups = raw.split(',');
        let head = groups.next()?;
        if head.is_empty() || head.len() > 3 {
            return None;
        }
        if !groups.clone().all(|g| g.len() == 3) {
            return None;
        }
    }
    raw.replace(',', "").parse().ok()
}

/// A percentage in [0, 100]; anything else is treated as not published.
pub fn parse_percentage(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().trim_end_matches('%').trim().parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comment_tokens() {
        assert_eq!(
            normalize_ws(&strip_markup_artifacts("Today: <!-- -->509<!-- --> (0.04%)")),
            "Today: 509 (0.04%)"
        );
    }

    #[test]
    fn rejoins_split_thousands() {
        assert_eq!(rejoin_digit_groups("Today: 1 ,204 (0.04%)"), "Today: 1,204 (0.04%)");
        assert_eq!(rejoin_digit_groups("1 , 234 , 567"), "1,234,567");
        assert_eq!(rejoin_digit_groups("6,722"), "6,722");
        assert_eq!(rejoin_digit_groups("May 2024, 12 days"), "May 2024, 12 days");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_ws("  a\n\t b\u{a0} c  "), "a b c");
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count("6,722"), Some(6722));
        assert_eq!(parse_count("1,234,567"), Some(1_234_567));
        assert_eq!(parse_count("0"), Some(0));
        assert_eq!(parse_count("509"), Some(509));
        assert_eq!(parse_count("67,22"), None);
        assert_eq!(parse_count(",722"), None);
        assert_eq!(parse_count(""), None);
    }

    #[test]
    fn percentages() {
        assert_eq!(parse_percentage("43.98"), Some(43.98));
        assert_eq!(parse_percentage("0.04%"), Some(0.04));
        assert_eq!(parse_percentage("100"), Some(100.0));
        assert_eq!(parse_percentage("140.2"), None);
        assert_eq!(parse_percentage("."), None);
    }
}
