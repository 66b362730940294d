use crate::config::StoreConfig;
use crate::types::{FeedItem, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Writes pretty-printed JSON through a sibling temp file and a rename, so
/// readers never observe a half-written file.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out.json".to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let body = serde_json::to_vec_pretty(value)?;
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(&body)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp_path);
    })?;
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub items_added: usize,
    pub dates_written: Vec<String>,
    pub dates_unchanged: Vec<String>,
    pub dates_failed: Vec<String>,
}

/// One JSON array of items per UTC publish date.
pub struct DailyStore {
    output_dir: PathBuf,
    max_items_per_day: usize,
}

impl DailyStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            max_items_per_day: config.max_items_per_day,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, date: &str) -> PathBuf {
        self.output_dir.join(format!("{date}.json"))
    }

    /// Existing items for `date`. Unreadable or corrupt files count as empty.
    pub fn load_day(&self, date: &str) -> Vec<FeedItem> {
        let path = self.path_for(date);
        if !path.exists() {
            return Vec::new();
        }

        let loaded: Result<Vec<FeedItem>> = std::fs::read_to_string(&path)
            .map_err(Into::into)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into));

        match loaded {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to load existing items for {}: {}", date, e);
                Vec::new()
            }
        }
    }

    /// Merges `items` into their daily files. Failures are isolated per date.
    pub fn persist(&self, items: &[FeedItem]) -> PersistReport {
        let mut by_date: BTreeMap<String, Vec<&FeedItem>> = BTreeMap::new();
        for item in items {
            by_date.entry(item.date_key()).or_default().push(item);
        }

        let mut report = PersistReport::default();
        for (date, day_items) in by_date {
            match self.merge_day(&date, &day_items) {
                Ok(0) => report.dates_unchanged.push(date),
                Ok(added) => {
                    report.items_added += added;
                    report.dates_written.push(date);
                }
                Err(e) => {
                    error!("Failed to save items for {}: {}", date, e);
                    report.dates_failed.push(date);
                }
            }
        }
        report
    }

    fn merge_day(&self, date: &str, incoming: &[&FeedItem]) -> Result<usize> {
        let mut merged = self.load_day(date);
        let mut known: HashSet<String> = merged.iter().map(|i| i.content_hash.clone()).collect();

        let mut added: HashSet<&str> = HashSet::new();
        for item in incoming {
            if known.insert(item.content_hash.clone()) {
                added.insert(&item.content_hash);
                merged.push((*item).clone());
            }
        }

        if added.is_empty() {
            debug!("No new items for {}", date);
            return Ok(0);
        }

        merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        if merged.len() > self.max_items_per_day {
            warn!(
                "Daily file {} over limit, dropping {} oldest items",
                date,
                merged.len() - self.max_items_per_day
            );
            merged.truncate(self.max_items_per_day);
        }

        // Only items that survive the cap count as added.
        let kept = merged.iter().filter(|i| added.contains(i.content_hash.as_str())).count();
        if kept == 0 {
            debug!("New items for {} all fell outside the daily cap", date);
            return Ok(0);
        }

        let path = self.path_for(date);
        write_json_atomic(&path, &merged)?;
        info!("Saved {} new items to {} (total: {})", kept, path.display(), merged.len());
        Ok(kept)
    }
}
