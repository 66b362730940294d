use crate::classify::{determine_priority, extract_tags};
use crate::config::NormalizeConfig;
use crate::rss_utils::{html::clean_html, text::truncate_chars};
use crate::state::SharedState;
use crate::types::{DateField, FeedItem, ParsedEntry, SourceDescriptor};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Length of the hex content hash kept on every item.
pub const CONTENT_HASH_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Published before the configured age cutoff.
    Stale { published_at: DateTime<Utc> },
    /// Hash already claimed in this run or a previous one.
    Duplicate { content_hash: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Stale { published_at } => write!(f, "stale, published {published_at}"),
            SkipReason::Duplicate { content_hash } => write!(f, "duplicate {content_hash}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome {
    Accepted(FeedItem),
    Skipped(SkipReason),
    Failed(String),
}

/// Stable dedup key: SHA-256 over the lower-cased trimmed title, the raw URL
/// and the lower-cased trimmed first `summary_prefix` characters of the
/// summary, truncated to [`CONTENT_HASH_LEN`] hex characters.
pub fn content_hash(title: &str, url: &str, summary: &str, summary_prefix: usize) -> String {
    let title = title.to_lowercase();
    let summary = truncate_chars(summary, summary_prefix).to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(url.as_bytes());
    hasher.update(summary.trim().as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(CONTENT_HASH_LEN);
    digest
}

pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// Turns one parsed entry into a [`FeedItem`]. On acceptance the content
    /// hash has been claimed in `state`; the claim is synchronous, so two
    /// concurrent fetches can never both accept the same content.
    pub fn normalize(
        &self,
        entry: &ParsedEntry,
        source: &SourceDescriptor,
        state: &SharedState,
        now: DateTime<Utc>,
    ) -> NormalizeOutcome {
        let title = entry.title.as_deref().map(clean_html).unwrap_or_default();
        let url = entry.link.as_deref().map(str::trim).unwrap_or_default().to_string();
        if title.is_empty() {
            return NormalizeOutcome::Failed("entry has no title".to_string());
        }
        if url.is_empty() {
            return NormalizeOutcome::Failed(format!("entry '{title}' has no link"));
        }

        let published_at = self.resolve_date(entry, now);
        let cutoff = Duration::try_days(self.config.max_age_days)
            .and_then(|age| now.checked_sub_signed(age));
        if cutoff.is_some_and(|cutoff| published_at < cutoff) {
            return NormalizeOutcome::Skipped(SkipReason::Stale { published_at });
        }

        let (summary, full_content) = self.extract_text(entry);
        let hash = content_hash(&title, &url, &summary, self.config.hash_summary_prefix_chars);
        if !state.claim_hash(&hash) {
            return NormalizeOutcome::Skipped(SkipReason::Duplicate { content_hash: hash });
        }

        let analysed = full_content.as_deref().unwrap_or(&summary);
        let tags = extract_tags(&title, analysed, &source.category, self.config.max_tags);
        let priority = determine_priority(&title, analysed);

        NormalizeOutcome::Accepted(FeedItem {
            id: format!("{}-{}", source.id, hash),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            title,
            url,
            summary,
            full_content,
            published_at,
            fetched_at: now,
            category: source.category.clone(),
            tags,
            priority,
            content_hash: hash,
        })
    }

    /// First parseable of published, updated, created. With no readable date
    /// the entry is dated "now", whether the fields were absent or garbled.
    /// Dates more than a day ahead are pulled back to an hour ago.
    fn resolve_date(&self, entry: &ParsedEntry, now: DateTime<Utc>) -> DateTime<Utc> {
        let fields = [&entry.published, &entry.updated, &entry.created];

        let resolved = fields.iter().find_map(|field| match field {
            DateField::Parsed(at) => Some(*at),
            _ => None,
        });

        let at = resolved.unwrap_or_else(|| {
            if let Some(DateField::Unparseable(raw)) =
                fields.iter().find(|field| matches!(field, DateField::Unparseable(_)))
            {
                debug!("Unreadable date '{}', using fetch time", raw);
            }
            now
        });

        if at > now + Duration::days(1) {
            now - Duration::hours(1)
        } else {
            at
        }
    }

    /// Returns `(summary, full_content)`. Body content is preferred for the
    /// full text; the summary falls back to a prefix of it.
    fn extract_text(&self, entry: &ParsedEntry) -> (String, Option<String>) {
        let raw_summary = entry.summary.as_deref().unwrap_or_default();
        let raw_content = entry.content.as_deref().unwrap_or(raw_summary);

        let mut summary = truncate_chars(&clean_html(raw_summary), self.config.summary_max_chars);
        let full = clean_html(raw_content);

        if summary.is_empty() && !full.is_empty() {
            summary = truncate_chars(&full, self.config.summary_fallback_chars);
        }

        let full_content = if full.is_empty() {
            (!summary.is_empty()).then(|| summary.clone())
        } else {
            Some(truncate_chars(&full, self.config.full_content_max_chars))
        };

        (summary, full_content)
    }
}
