use super::entry::{CacheEntry, SCHEMA_VERSION};
use super::key::TaskId;
use crate::completion::Options;
use crate::config::CacheSettings;
use crate::error::Result;
use crate::message::Message;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tasks that never use the cache
pub const BUILTIN_EXCLUDED_TASKS: &[&str] = &["image_generation", "image_edit"];

/// Directory summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entry files found
    pub entries: u64,
    /// Total size of entry files
    pub bytes: u64,
    /// Entries past their TTL
    pub expired: u64,
    /// Files that do not decode as a current entry
    pub invalid: u64,
}

/// Sharded on-disk cache: `<dir>/<first two hex>/<task_id>.json`
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    enabled: bool,
    read: bool,
    write: bool,
    ttl_secs: u64,
    purge_expired: bool,
    exclude_tasks: HashSet<String>,
    exclude_prefixes: Vec<String>,
}

enum Lookup {
    Hit(CacheEntry),
    Expired,
    Invalid,
}

impl ContentCache {
    /// Create a cache from settings
    #[must_use]
    pub fn new(settings: &CacheSettings) -> Self {
        let mut exclude_tasks: HashSet<String> = BUILTIN_EXCLUDED_TASKS
            .iter()
            .map(|task| (*task).to_string())
            .collect();
        exclude_tasks.extend(settings.exclude_tasks.iter().cloned());

        Self {
            dir: settings.resolved_dir(),
            enabled: settings.enabled,
            read: settings.read,
            write: settings.write,
            ttl_secs: settings.ttl_secs,
            purge_expired: settings.purge_expired,
            exclude_tasks,
            exclude_prefixes: settings.exclude_prefixes.clone(),
        }
    }

    /// A cache that never reads or writes
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(&CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        })
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `task` bypasses the cache entirely
    #[must_use]
    pub fn is_excluded(&self, task: &str) -> bool {
        self.exclude_tasks.contains(task)
            || self
                .exclude_prefixes
                .iter()
                .any(|prefix| task.starts_with(prefix.as_str()))
    }

    /// Whether a read for `task` may hit the disk
    #[must_use]
    pub fn can_read(&self, task: &str) -> bool {
        self.enabled && self.read && !self.is_excluded(task)
    }

    /// Whether a write for `task` may hit the disk
    #[must_use]
    pub fn can_write(&self, task: &str) -> bool {
        self.enabled && self.write && !self.is_excluded(task)
    }

    /// File holding the entry for `task_id`
    #[must_use]
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.dir
            .join(task_id.shard())
            .join(format!("{}.json", task_id.as_str()))
    }

    /// Read the entry for a call, if a valid unexpired one exists
    #[must_use]
    pub fn read(&self, task: &str, messages: &[Message], options: &Options) -> Option<CacheEntry> {
        if !self.can_read(task) {
            return None;
        }
        let task_id = TaskId::compute(task, messages, options).ok()?;
        self.lookup(task, &task_id)
    }

    /// Read the entry for a precomputed key
    ///
    /// Undecodable, mismatched, empty and expired entries are misses.
    #[must_use]
    pub fn lookup(&self, task: &str, task_id: &TaskId) -> Option<CacheEntry> {
        if !self.can_read(task) {
            return None;
        }

        let path = self.path_for(task_id);
        if !path.exists() {
            return None;
        }

        match self.inspect(&path, Some(task_id)) {
            Lookup::Hit(entry) if entry.content.is_empty() => {
                debug!(task_id = %task_id, "Cached entry has empty content");
                None
            }
            Lookup::Hit(entry) => Some(entry),
            Lookup::Expired => {
                debug!(task_id = %task_id, "Cached entry expired");
                if self.purge_expired {
                    remove_quietly(&path);
                }
                None
            }
            Lookup::Invalid => {
                warn!(path = %path.display(), "Ignoring invalid cache entry");
                None
            }
        }
    }

    /// Store a successful result for a call
    ///
    /// Returns the written path, or `None` when the write was skipped or
    /// failed. Failures are logged and never surface to the caller.
    pub fn write(
        &self,
        task: &str,
        messages: &[Message],
        options: &Options,
        entry: CacheEntry,
    ) -> Option<PathBuf> {
        let task_id = TaskId::compute(task, messages, options).ok()?;
        self.store(CacheEntry { task_id, ..entry })
    }

    /// Store an entry under its own key
    pub fn store(&self, entry: CacheEntry) -> Option<PathBuf> {
        if !self.can_write(&entry.task) {
            return None;
        }

        match self.write_atomic(&entry) {
            Ok(path) => {
                debug!(task_id = %entry.task_id, path = %path.display(), "Cached response");
                Some(path)
            }
            Err(e) => {
                warn!(task_id = %entry.task_id, error = %e, "Failed to write cache entry");
                None
            }
        }
    }

    fn write_atomic(&self, entry: &CacheEntry) -> Result<PathBuf> {
        let path = self.path_for(&entry.task_id);
        let shard_dir = self.dir.join(entry.task_id.shard());
        fs::create_dir_all(&shard_dir)?;

        let content = serde_json::to_vec_pretty(entry)?;

        // Same directory as the target so the rename stays on one filesystem
        let temp_path = shard_dir.join(format!(
            ".{}.{}.tmp",
            entry.task_id.as_str(),
            uuid::Uuid::new_v4().simple()
        ));
        if let Err(e) = fs::write(&temp_path, &content) {
            remove_quietly(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path) {
            remove_quietly(&temp_path);
            return Err(e.into());
        }

        Ok(path)
    }

    fn inspect(&self, path: &Path, expected: Option<&TaskId>) -> Lookup {
        let Ok(bytes) = fs::read(path) else {
            return Lookup::Invalid;
        };
        let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
            return Lookup::Invalid;
        };

        let stem = path.file_stem().and_then(|s| s.to_str());
        let key_matches = match expected {
            Some(task_id) => entry.task_id == *task_id,
            None => stem == Some(entry.task_id.as_str()),
        };
        if entry.schema_version != SCHEMA_VERSION || !key_matches {
            return Lookup::Invalid;
        }

        if entry.is_expired(self.ttl_secs, Utc::now()) {
            Lookup::Expired
        } else {
            Lookup::Hit(entry)
        }
    }

    /// Entry files in every shard
    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.dir.is_dir() {
            return Ok(files);
        }

        for shard in fs::read_dir(&self.dir)? {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for file in fs::read_dir(&shard)? {
                let file = file?.path();
                if file.extension().is_some_and(|ext| ext == "json") {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    /// Count entries and bytes on disk
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for path in self.entry_files()? {
            stats.entries += 1;
            stats.bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match self.inspect(&path, None) {
                Lookup::Hit(_) => {}
                Lookup::Expired => stats.expired += 1,
                Lookup::Invalid => stats.invalid += 1,
            }
        }
        Ok(stats)
    }

    /// Delete expired and invalid entries, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            if matches!(self.inspect(&path, None), Lookup::Hit(_)) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache entry"),
            }
        }
        debug!(removed, dir = %self.dir.display(), "Purged cache");
        Ok(removed)
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Failed to remove file");
    }
}
