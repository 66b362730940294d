use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One upstream feed as listed in the source registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub url: String,
    pub category: String,
    /// Lower is more important. Sources without one sort after priority 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl SourceDescriptor {
    pub const DEFAULT_PRIORITY: u8 = 3;

    pub fn effective_priority(&self) -> u8 {
        self.priority.unwrap_or(Self::DEFAULT_PRIORITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Breaking,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Breaking => "breaking",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// A normalized item as written to the daily JSON files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub source_id: String,
    pub source_name: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub category: String,
    pub tags: Vec<String>,
    pub priority: Priority,
    pub content_hash: String,
}

impl FeedItem {
    /// `YYYY-MM-DD` of the publish date, used as the daily file key.
    pub fn date_key(&self) -> String {
        self.published_at.format("%Y-%m-%d").to_string()
    }
}

/// A date field as found on a feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateField {
    #[default]
    Missing,
    Parsed(DateTime<Utc>),
    Unparseable(String),
}

impl DateField {
    pub fn is_present(&self) -> bool {
        !matches!(self, DateField::Missing)
    }
}

impl From<Option<DateTime<Utc>>> for DateField {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(dt) => DateField::Parsed(dt),
            None => DateField::Missing,
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
    /// Structural problems the parser worked around.
    pub warnings: Vec<String>,
}

/// Fixed-shape entry produced by the parsing adapter. The normalizer only
/// ever sees this, never raw parser output.
#[derive(Debug, Clone, Default)]
pub struct ParsedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published: DateField,
    pub updated: DateField,
    pub created: DateField,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn feed_item_serializes_with_camel_case_keys() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let item = FeedItem {
            id: "fed-news-0123456789abcdef".to_string(),
            source_id: "fed-news".to_string(),
            source_name: "Federal Reserve".to_string(),
            title: "Fed Raises Rates".to_string(),
            url: "https://example.com/a".to_string(),
            summary: "Summary".to_string(),
            full_content: None,
            published_at: at,
            fetched_at: at,
            category: "policy".to_string(),
            tags: vec!["Policy".to_string()],
            priority: Priority::High,
            content_hash: "0123456789abcdef".to_string(),
        };

        let value = serde_json::to_value(&item).unwrap();
        for key in [
            "id", "sourceId", "sourceName", "title", "url", "summary", "publishedAt",
            "fetchedAt", "category", "tags", "priority", "contentHash",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert!(value.get("fullContent").is_none());
        assert_eq!(value["priority"], "high");
        assert_eq!(item.date_key(), "2024-03-05");
    }

    #[test]
    fn accepts_explicit_utc_offsets() {
        let raw = r#"{
            "id": "x-1", "sourceId": "x", "sourceName": "X", "title": "t", "url": "u",
            "summary": "s", "fullContent": "f",
            "publishedAt": "2024-03-05T12:00:00+00:00", "fetchedAt": "2024-03-05T12:00:01.5+00:00",
            "category": "markets", "tags": [], "priority": "normal", "contentHash": "abc"
        }"#;
        let item: FeedItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.published_at, Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());
        assert_eq!(item.full_content.as_deref(), Some("f"));
    }

    #[test]
    fn missing_priority_sorts_last() {
        let source = SourceDescriptor {
            id: "a".into(),
            name: "A".into(),
            url: "https://a.example/feed".into(),
            category: "markets".into(),
            priority: None,
        };
        assert_eq!(source.effective_priority(), 3);
    }
}
