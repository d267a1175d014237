//! Directory-backed activity index, newest first.

pub mod query;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::activity::Activity;
use crate::config::Config;
use crate::error::DatabaseError;
use crate::fields;
use crate::record::Record;
use crate::types::track::FileFormat;
use crate::units::{self, ValueKind};

pub use query::{CompareOp, DateRange, Query, Term};

/// Completion only looks at activities this many days older than the
/// newest one, at most.
pub const COMPLETION_WINDOW_DAYS: i64 = 100;

pub struct Entry {
    date: NaiveDateTime,
    record: Record,
}

impl Entry {
    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

pub struct Database {
    config: Config,
    entries: Vec<Entry>,
}

fn declared_date(record: &Record, config: &Config) -> Option<NaiveDateTime> {
    record
        .field("Date")
        .and_then(|text| config.units.parse_date(text))
}

/// Dotfiles, editor backups and GPS logs stored next to the records.
fn is_ignored(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with('~')
        || name.to_lowercase().ends_with(".bak")
        || FileFormat::from_filename(name).is_some()
}

impl Database {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    pub fn open(config: Config) -> Result<Self, DatabaseError> {
        let mut db = Self::new(config);
        db.reload()?;
        Ok(db)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rebuild the index from every record file under the activity directory.
    pub fn reload(&mut self) -> Result<(), DatabaseError> {
        self.entries.clear();
        let root = self.config.activity_dir.clone();

        let mut files = Vec::new();
        collect_files(&root, &mut files, true)?;

        let scanned = files.len();
        let mut skipped = 0;
        for path in files {
            let record = match Record::open(&path) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable record");
                    skipped += 1;
                    continue;
                }
            };
            let Some(date) = declared_date(&record, &self.config) else {
                tracing::warn!(path = %path.display(), "Skipping record without a Date");
                skipped += 1;
                continue;
            };
            self.entries.push(Entry { date, record });
        }

        self.sort();
        tracing::info!(
            "Loaded {} activities from {} ({} files scanned, {} skipped)",
            self.entries.len(),
            root.display(),
            scanned,
            skipped
        );
        Ok(())
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.date.cmp(&a.date));
    }

    fn search(&self, date: NaiveDateTime) -> Result<usize, usize> {
        self.entries.binary_search_by(|entry| date.cmp(&entry.date))
    }

    fn insert(&mut self, entry: Entry) -> usize {
        match self.search(entry.date) {
            Ok(index) => {
                self.entries[index] = entry;
                index
            }
            Err(index) => {
                self.entries.insert(index, entry);
                index
            }
        }
    }

    /// Read one record file into the index, replacing any entry with the
    /// same date. Returns its index.
    pub fn add_activity(&mut self, path: impl AsRef<Path>) -> Result<usize, DatabaseError> {
        let path = path.as_ref();
        let record = Record::open(path)?;
        let date = declared_date(&record, &self.config)
            .ok_or_else(|| DatabaseError::MissingDate(path.to_path_buf()))?;
        Ok(self.insert(Entry { date, record }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = Activity<'_, &Record>> {
        self.entries
            .iter()
            .map(|entry| Activity::new(&entry.record, &self.config))
    }

    pub fn activity(&self, index: usize) -> Option<Activity<'_, &Record>> {
        self.entries
            .get(index)
            .map(|entry| Activity::new(&entry.record, &self.config))
    }

    pub fn activity_mut(&mut self, index: usize) -> Option<Activity<'_, &mut Record>> {
        let config = &self.config;
        self.entries
            .get_mut(index)
            .map(|entry| Activity::new(&mut entry.record, config))
    }

    pub fn find(&self, date: NaiveDateTime) -> Option<usize> {
        self.search(date).ok()
    }

    /// Start a new record dated `date` in `<dir>/<YYYY>/` and index it.
    pub fn create_activity(&mut self, date: NaiveDateTime) -> Result<usize, DatabaseError> {
        let dir = self.config.activity_dir.join(format!("{:04}", date.year()));
        let path = dir.join(date.format("%Y-%m-%d-%H%M%S").to_string());
        if self.find(date).is_some() || path.exists() {
            return Err(DatabaseError::AlreadyExists(path));
        }
        std::fs::create_dir_all(&dir).map_err(|source| DatabaseError::Create {
            path: dir.clone(),
            source,
        })?;

        let mut record = Record::new();
        record.set_field("Date", units::format_date(&date));
        record.write(&path)?;
        tracing::info!("Created activity {}", path.display());
        Ok(self.insert(Entry { date, record }))
    }

    /// Drop the activity dated `date` from the index and delete its file.
    /// Returns whether there was one.
    pub fn remove_activity(&mut self, date: NaiveDateTime) -> Result<bool, DatabaseError> {
        let Some(index) = self.find(date) else {
            return Ok(false);
        };
        if let Some(path) = self.entries[index].record.path() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(DatabaseError::Remove {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
        self.entries.remove(index);
        Ok(true)
    }

    /// Write every changed record and re-sort, since a Date may have been
    /// edited. Returns how many records were written, or the first write
    /// error after trying every record. The index is re-sorted either way.
    pub fn synchronize(&mut self) -> Result<usize, DatabaseError> {
        let mut written = 0;
        let mut first_error = None;
        for entry in &mut self.entries {
            match entry.record.synchronize() {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to synchronize activity");
                    first_error.get_or_insert(err);
                }
            }
            if let Some(date) = declared_date(&entry.record, &self.config) {
                entry.date = date;
            }
        }
        self.sort();
        if written > 0 {
            tracing::info!("Synchronized {} activities", written);
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(written),
        }
    }

    /// Matching activities in index order, after dropping the first
    /// `query.skip` matches.
    pub fn execute_query(&self, query: &Query) -> Vec<Activity<'_, &Record>> {
        let mut results = Vec::new();
        let mut skipped = 0;
        for entry in &self.entries {
            if query.max_count.is_some_and(|max| results.len() >= max) {
                break;
            }
            if !query.admits(entry.date) {
                continue;
            }
            let activity = Activity::new(&entry.record, &self.config);
            if let Some(term) = &query.term {
                if !term.evaluate(&activity) {
                    continue;
                }
            }
            if skipped < query.skip {
                skipped += 1;
                continue;
            }
            results.push(activity);
        }
        results
    }

    fn recent_entries(&self) -> impl Iterator<Item = &Entry> {
        let cutoff = self
            .entries
            .first()
            .map(|newest| newest.date - Duration::days(COMPLETION_WINDOW_DAYS));
        self.entries
            .iter()
            .take_while(move |entry| cutoff.map_or(false, |cutoff| entry.date >= cutoff))
    }

    /// Field names used by recent activities that start with `prefix`.
    pub fn complete_field_name(&self, prefix: &str) -> Vec<String> {
        let names = self
            .recent_entries()
            .flat_map(|entry| entry.record.fields().map(|(name, _)| name));
        distinct_sorted(names, prefix)
    }

    /// Values of `field` used recently that start with `prefix`. Keyword
    /// fields complete token by token.
    pub fn complete_field_value(&self, field: &str, prefix: &str) -> Vec<String> {
        let keyword_list = fields::lookup(field).is_some_and(|spec| spec.kind == ValueKind::Keywords);
        let mut candidates = Vec::new();
        for entry in self.recent_entries() {
            let Some(text) = entry.record.field(field) else {
                continue;
            };
            if keyword_list {
                candidates.extend(text.split_whitespace().map(str::to_string));
            } else {
                let text = text.trim();
                if !text.is_empty() {
                    candidates.push(text.to_string());
                }
            }
        }
        distinct_sorted(candidates.iter().map(String::as_str), prefix)
    }
}

/// Case-insensitive prefix matches, first spelling kept, sorted ignoring case.
fn distinct_sorted<'a>(candidates: impl Iterator<Item = &'a str>, prefix: &str) -> Vec<String> {
    let prefix = prefix.to_lowercase();
    let mut seen = HashSet::new();
    let mut out: Vec<String> = candidates
        .filter(|candidate| candidate.to_lowercase().starts_with(&prefix))
        .filter(|candidate| seen.insert(candidate.to_lowercase()))
        .map(str::to_string)
        .collect();
    out.sort_by_key(|candidate| candidate.to_lowercase());
    out
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>, root: bool) -> Result<(), DatabaseError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) if root => {
            return Err(DatabaseError::Scan {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "Skipping unreadable directory");
            return Ok(());
        }
    };

    for entry in entries {
        let entry = entry.map_err(|source| DatabaseError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ignored(&name) {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, files, false)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
