/// Text helpers shared by the parser and the normalizer

/// HTML to plain text
pub mod html {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static RE_SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->")
            .expect("static regex")
    });
    static RE_BLOCK_BREAK: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/tr)\b[^>]*>").expect("static regex")
    });
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

    /// Strips script/style elements and tags, decodes entities and collapses
    /// whitespace. No length cap is applied here.
    pub fn clean_html(input: &str) -> String {
        if input.trim().is_empty() {
            return String::new();
        }

        let out = RE_SCRIPT_STYLE.replace_all(input, " ");
        let out = RE_BLOCK_BREAK.replace_all(&out, " ");
        let out = RE_TAGS.replace_all(&out, "");
        let out = html_escape::decode_html_entities(&out).replace('\u{a0}', " ");
        RE_WS.replace_all(&out, " ").trim().to_string()
    }
}

/// Length handling on char boundaries
pub mod text {
    /// First `max_chars` characters of `text`.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => text[..idx].to_string(),
            None => text.to_string(),
        }
    }

    /// Title case for category labels: first letter of each alphabetic run upper-cased,
    /// the rest lower-cased. `non-money` becomes `Non-Money`.
    pub fn title_case(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut at_word_start = true;
        for c in text.chars() {
            if c.is_alphabetic() {
                if at_word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                at_word_start = false;
            } else {
                out.push(c);
                at_word_start = true;
            }
        }
        out
    }
}

/// URL utilities for feed sources
pub mod url {
    use url::Url;

    /// Host name used to key per-host connection limits.
    pub fn host_key(url_str: &str) -> String {
        Url::parse(url_str)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_default()
    }

    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => (url.scheme() == "http" || url.scheme() == "https") && url.host().is_some(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_html_drops_scripts_and_collapses_whitespace() {
        let raw = "<p>Stocks&nbsp;rally</p><script>var x = 1;</script>\n\n<style>p{}</style><b>after   CPI</b> &amp; jobs";
        assert_eq!(html::clean_html(raw), "Stocks rally after CPI & jobs");
    }

    #[test]
    fn clean_html_of_plain_text_is_identity_modulo_whitespace() {
        assert_eq!(html::clean_html("  plain   text  "), "plain text");
        assert_eq!(html::clean_html(""), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(text::truncate_chars("héllo", 2), "hé");
        assert_eq!(text::truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn title_case_matches_category_labels() {
        assert_eq!(text::title_case("markets"), "Markets");
        assert_eq!(text::title_case("non-money"), "Non-Money");
    }

    #[test]
    fn url_helpers() {
        assert_eq!(url::host_key("https://Feeds.Example.com/rss"), "feeds.example.com");
        assert!(url::is_valid_feed_url("http://example.com/feed"));
        assert!(!url::is_valid_feed_url("ftp://example.com/feed"));
        assert!(!url::is_valid_feed_url("not a url"));
    }
}
