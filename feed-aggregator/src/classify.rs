//! Keyword heuristics for tags and priority.

use crate::rss_utils::text::title_case;
use crate::types::Priority;
use once_cell::sync::Lazy;
use regex::Regex;

struct TagRule {
    label: &'static str,
    pattern: Regex,
}

fn word_rule(label: &'static str, words: &[&str]) -> TagRule {
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    TagRule {
        label,
        pattern: Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("static tag regex"),
    }
}

static TAG_RULES: Lazy<Vec<TagRule>> = Lazy::new(|| {
    vec![
        word_rule("Earnings", &["earnings", "results", "profit", "revenue", "quarter"]),
        word_rule("M&A", &["merger", "acquisition", "deal", "takeover", "buyout"]),
        word_rule("IPO", &["ipo", "listing", "public offering"]),
        word_rule("Crypto", &["bitcoin", "crypto", "ethereum", "blockchain"]),
        word_rule("AI", &["artificial intelligence", "ai", "machine learning"]),
        word_rule("ESG", &["esg", "sustainable", "climate", "green"]),
        word_rule("Debt", &["bond", "debt", "yield", "treasury"]),
        word_rule("Currency", &["dollar", "euro", "yen", "rupee", "forex", "fx"]),
        word_rule("Commodities", &["oil", "gold", "silver", "commodity"]),
        word_rule("Tech", &["tech", "software", "silicon valley", "startup"]),
    ]
});

/// Priority keywords only anchor at the start of a word so that plurals and
/// inflections ("rates", "inflationary") still match but "corporate" does not.
fn prefix_rule(words: &[&str]) -> Regex {
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})")).expect("static priority regex")
}

static BREAKING: Lazy<Regex> =
    Lazy::new(|| prefix_rule(&["breaking", "alert", "flash", "urgent", "crisis"]));
static HIGH: Lazy<Regex> =
    Lazy::new(|| prefix_rule(&["fed", "ecb", "rbi", "rate", "policy", "gdp", "inflation"]));
static LOW: Lazy<Regex> = Lazy::new(|| prefix_rule(&["opinion", "analysis", "outlook"]));

/// Category tag first, then rule labels in rule order, duplicates collapsed,
/// capped at `max_tags`.
pub fn extract_tags(title: &str, content: &str, category: &str, max_tags: usize) -> Vec<String> {
    let text = format!("{title} {content}");
    let mut tags = vec![title_case(category)];

    for rule in TAG_RULES.iter() {
        if tags.len() >= max_tags {
            break;
        }
        if rule.pattern.is_match(&text) && !tags.iter().any(|t| t == rule.label) {
            tags.push(rule.label.to_string());
        }
    }

    tags.truncate(max_tags);
    tags
}

pub fn determine_priority(title: &str, content: &str) -> Priority {
    let text = format!("{title} {content}");

    if BREAKING.is_match(&text) {
        Priority::Breaking
    } else if HIGH.is_match(&text) {
        Priority::High
    } else if LOW.is_match(&text) {
        Priority::Low
    } else {
        Priority::Normal
    }
}
