use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]").unwrap());

/// Derive a URL-safe slug from an event's display name.
///
/// Lowercases, turns each whitespace run into a single `-`, then drops every
/// character outside `[a-z0-9-]`. The passes run in that order, so hyphens
/// left behind by stripped characters are kept: `"John & Jane Wedding"`
/// becomes `"john--jane-wedding"`. The result may be empty.
pub fn generate_slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    DISALLOWED.replace_all(&hyphenated, "").into_owned()
}

/// Normalise a slug taken from a URL before lookup
pub fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_slug_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn test_keeps_double_hyphen() {
        assert_eq!(generate_slug("John & Jane Wedding"), "john--jane-wedding");
        assert_eq!(generate_slug("A & B!!"), "a--b");
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(generate_slug("Summer \t  Party\n2024"), "summer-party-2024");
        assert_eq!(generate_slug("  padded  "), "-padded-");
    }

    #[test]
    fn test_all_symbols_yield_empty() {
        assert_eq!(generate_slug("!!!"), "");
        assert_eq!(generate_slug(""), "");
    }

    #[test]
    fn test_non_ascii_is_stripped() {
        assert_eq!(generate_slug("Café Élan"), "caf-lan");
    }

    #[test]
    fn test_output_charset_and_idempotence() {
        let inputs = [
            "John & Jane Wedding",
            "Ünïcödé   Names",
            "already-a-slug",
            "MiXeD_case__under_scores",
            "tabs\tand\nnewlines",
            "emoji 🎉 party",
            "",
        ];
        for input in inputs {
            let slug = generate_slug(input);
            assert!(is_slug_safe(&slug), "{input:?} -> {slug:?}");
            assert_eq!(generate_slug(&slug), slug);
        }
    }

    #[test]
    fn test_normalize_slug() {
        assert_eq!(normalize_slug("  A-B "), "a-b");
    }
}
