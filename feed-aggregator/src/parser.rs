use crate::types::{AggregatorError, DateField, ParsedEntry, ParsedFeed, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use feed_rs::parser;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Element-content pattern for one tag name. The `regex` crate has no
/// backreferences, so every tag gets its own open/close pair.
fn element(name: &str) -> Regex {
    let name = regex::escape(name);
    Regex::new(&format!(r"(?is)<{name}\b[^>]*>(.*?)</{name}\s*>")).expect("static element regex")
}

static ITEM_BLOCK: Lazy<Regex> = Lazy::new(|| element("item"));
static ENTRY_BLOCK: Lazy<Regex> = Lazy::new(|| element("entry"));
static TITLE: Lazy<Regex> = Lazy::new(|| element("title"));
static LINK: Lazy<Regex> = Lazy::new(|| element("link"));
static LINK_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("static link regex")
});
static SUMMARY: Lazy<Vec<Regex>> =
    Lazy::new(|| vec![element("description"), element("summary")]);
static CONTENT: Lazy<Vec<Regex>> = Lazy::new(|| vec![element("content:encoded"), element("content")]);
static PUBLISHED: Lazy<Vec<Regex>> =
    Lazy::new(|| vec![element("pubDate"), element("published"), element("dc:date"), element("issued")]);
static UPDATED: Lazy<Vec<Regex>> = Lazy::new(|| vec![element("updated"), element("modified")]);
static CREATED: Lazy<Vec<Regex>> = Lazy::new(|| vec![element("created")]);
static CDATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("static cdata regex"));

/// Adapter from raw feed bytes to [`ParsedFeed`]. Well-formed documents go
/// through `feed-rs`; anything it rejects is scanned leniently for entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        match parser::parse(content.as_bytes()) {
            Ok(feed) if !feed.entries.is_empty() || !looks_like_it_has_entries(content) => {
                let title = feed.title.map(|t| t.content);
                let entries = feed.entries.into_iter().map(Self::convert_entry).collect();
                Ok(ParsedFeed {
                    title,
                    entries,
                    warnings: Vec::new(),
                })
            }
            Ok(_) => self.salvage(content, "parser returned no entries".to_string()),
            Err(e) => self.salvage(content, e.to_string()),
        }
    }

    fn convert_entry(entry: feed_rs::model::Entry) -> ParsedEntry {
        // Atom feeds carry several links; the alternate one is the article.
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone());

        ParsedEntry {
            title: entry.title.map(|t| t.content),
            link,
            summary: entry.summary.map(|s| s.content),
            content: entry.content.and_then(|c| c.body),
            published: entry.published.into(),
            updated: entry.updated.into(),
            created: DateField::Missing,
        }
    }

    /// Lenient scan for `<item>`/`<entry>` blocks in a document the strict
    /// parser could not handle.
    pub fn salvage(&self, content: &str, reason: String) -> Result<ParsedFeed> {
        let blocks: Vec<&str> = {
            let items: Vec<&str> = capture_all(&ITEM_BLOCK, content);
            if items.is_empty() {
                capture_all(&ENTRY_BLOCK, content)
            } else {
                items
            }
        };

        let entries: Vec<ParsedEntry> = blocks.into_iter().map(salvage_entry).collect();
        if entries.is_empty() {
            return Err(AggregatorError::Parse(format!("no entries could be extracted: {reason}")));
        }

        warn!("Malformed feed, recovered {} entries: {}", entries.len(), reason);
        Ok(ParsedFeed {
            title: first_text(std::slice::from_ref(&*TITLE), content),
            entries,
            warnings: vec![reason],
        })
    }
}

fn looks_like_it_has_entries(content: &str) -> bool {
    ITEM_BLOCK.is_match(content) || ENTRY_BLOCK.is_match(content)
}

fn capture_all<'a>(pattern: &Regex, content: &'a str) -> Vec<&'a str> {
    pattern
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

fn salvage_entry(block: &str) -> ParsedEntry {
    let link = first_text(std::slice::from_ref(&*LINK), block).or_else(|| {
        LINK_HREF
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| html_escape::decode_html_entities(m.as_str()).trim().to_string())
    });

    ParsedEntry {
        title: first_text(std::slice::from_ref(&*TITLE), block),
        link,
        summary: first_text(&SUMMARY, block),
        content: first_text(&CONTENT, block),
        published: first_date(&PUBLISHED, block),
        updated: first_date(&UPDATED, block),
        created: first_date(&CREATED, block),
    }
}

/// Text of the first matching, non-empty element. CDATA is unwrapped and
/// entities decoded, markup inside is left for the normalizer to clean.
fn first_text(patterns: &[Regex], block: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        let raw = pattern.captures(block)?.get(1)?.as_str();
        let unwrapped = CDATA.replace_all(raw, "$1");
        let text = html_escape::decode_html_entities(&unwrapped).trim().to_string();
        (!text.is_empty()).then_some(text)
    })
}

fn first_date(patterns: &[Regex], block: &str) -> DateField {
    match first_text(patterns, block) {
        Some(raw) => parse_date(&raw),
        None => DateField::Missing,
    }
}

/// RFC 2822 (RSS), RFC 3339 (Atom) and a couple of common near-misses.
pub fn parse_date(raw: &str) -> DateField {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return DateField::Parsed(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return DateField::Parsed(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return DateField::Parsed(naive.and_utc());
        }
    }
    DateField::Unparseable(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Wire</title>
<item><title>Fed Raises Rates</title><link>https://example.com/fed</link>
<description>&lt;p&gt;Policy move&lt;/p&gt;</description>
<pubDate>Mon, 03 Jun 2024 14:00:00 GMT</pubDate></item>
<item><title>Second</title><link>https://example.com/second</link></item>
</channel></rss>"#;

    #[test]
    fn parses_well_formed_rss() {
        let feed = FeedParser::new().parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Wire"));
        assert_eq!(feed.entries.len(), 2);
        assert!(feed.warnings.is_empty());

        let first = &feed.entries[0];
        assert_eq!(first.title.as_deref(), Some("Fed Raises Rates"));
        assert_eq!(first.link.as_deref(), Some("https://example.com/fed"));
        assert_eq!(
            first.published,
            DateField::Parsed(Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap())
        );
        assert_eq!(feed.entries[1].published, DateField::Missing);
    }

    #[test]
    fn salvages_entries_with_warning() {
        let broken = r#"<rss><channel>
<item><title><![CDATA[Markets & more]]></title><link>https://example.com/a?x=1&amp;y=2</link>
<pubDate>not a date</pubDate><dc:date>2024-06-03T10:00:00Z</dc:date></item>
<item><title>B</title><link>https://example.com/b</link><oops></item>"#;

        let feed = FeedParser::new().salvage(broken, "mismatched tag".into()).unwrap();
        assert_eq!(feed.warnings, vec!["mismatched tag"]);
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.title.as_deref(), Some("Markets & more"));
        assert_eq!(first.link.as_deref(), Some("https://example.com/a?x=1&y=2"));
        // pubDate wins over dc:date because it is listed first.
        assert_eq!(first.published, DateField::Unparseable("not a date".into()));
    }

    #[test]
    fn salvages_atom_entry_href() {
        let broken = r#"<feed><entry><title>A</title><link rel="alternate" href="https://example.com/a"/>
<updated>2024-06-03T10:00:00+02:00</updated></entry>"#;

        let feed = FeedParser::new().salvage(broken, "eof".into()).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.link.as_deref(), Some("https://example.com/a"));
        assert_eq!(
            entry.updated,
            DateField::Parsed(Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = FeedParser::new().parse_feed("<html><body>Not found</body></html>").unwrap_err();
        assert!(matches!(err, AggregatorError::Parse(_)));
    }

    #[test]
    fn date_formats() {
        assert!(matches!(parse_date("Tue, 4 Jun 2024 09:30:00 +0100"), DateField::Parsed(_)));
        assert!(matches!(parse_date("2024-06-04T09:30:00.5Z"), DateField::Parsed(_)));
        assert!(matches!(parse_date("2024-06-04 09:30:00"), DateField::Parsed(_)));
        assert!(matches!(parse_date("yesterday"), DateField::Unparseable(_)));
    }
}
