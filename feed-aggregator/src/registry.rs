use crate::rss_utils::url::is_valid_feed_url;
use crate::types::{AggregatorError, Result, SourceDescriptor};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Either a bare array of sources or `{"sources": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    List(Vec<SourceDescriptor>),
    Wrapped { sources: Vec<SourceDescriptor> },
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AggregatorError::Config(format!("cannot read source registry {}: {}", path.display(), e))
        })?;
        let registry = Self::from_json(&raw)?;
        info!("Loaded {} sources from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let sources = match serde_json::from_str::<RegistryFile>(raw)? {
            RegistryFile::List(sources) | RegistryFile::Wrapped { sources } => sources,
        };
        Ok(Self::from_sources(sources))
    }

    /// Drops invalid entries and orders by priority, lowest first. Sources
    /// with equal priority keep their listed order.
    pub fn from_sources(sources: Vec<SourceDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut valid: Vec<SourceDescriptor> = sources
            .into_iter()
            .filter(|source| {
                if source.id.trim().is_empty() {
                    warn!("Skipping source '{}' with empty id", source.name);
                    return false;
                }
                if !is_valid_feed_url(&source.url) {
                    warn!(source = %source.id, "Skipping source with invalid URL {}", source.url);
                    return false;
                }
                if !seen.insert(source.id.clone()) {
                    warn!(source = %source.id, "Skipping duplicate source id");
                    return false;
                }
                true
            })
            .collect();

        valid.sort_by_key(SourceDescriptor::effective_priority);
        Self { sources: valid }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_priority_stably() {
        let registry = SourceRegistry::from_json(
            r#"[
                {"id": "c", "name": "C", "url": "https://c.example/rss", "category": "markets"},
                {"id": "a", "name": "A", "url": "https://a.example/rss", "category": "markets", "priority": 2},
                {"id": "b", "name": "B", "url": "https://b.example/rss", "category": "macro", "priority": 1},
                {"id": "d", "name": "D", "url": "https://d.example/rss", "category": "macro", "priority": 2}
            ]"#,
        )
        .unwrap();

        let ids: Vec<_> = registry.sources().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn drops_invalid_and_duplicate_sources() {
        let registry = SourceRegistry::from_json(
            r#"{"sources": [
                {"id": "a", "name": "A", "url": "https://a.example/rss", "category": "markets"},
                {"id": "a", "name": "A again", "url": "https://a2.example/rss", "category": "markets"},
                {"id": "ftp", "name": "FTP", "url": "ftp://files.example/rss", "category": "markets"},
                {"id": " ", "name": "Blank", "url": "https://blank.example/rss", "category": "markets"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sources()[0].name, "A");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = SourceRegistry::load(Path::new("/nonexistent/sources.json")).unwrap_err();
        assert!(matches!(err, AggregatorError::Config(_)));
    }

    #[test]
    fn shipped_registry_loads() {
        let registry =
            SourceRegistry::from_json(include_str!("../../config/sources.json")).unwrap();
        assert!(registry.len() > 50);
        assert!(registry.sources().iter().all(|s| s.priority.is_some()));
        assert_eq!(registry.sources()[0].effective_priority(), 1);
    }
}
