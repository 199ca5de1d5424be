//! # Progress Store
//!
//! A JSON file mapping record id to the result computed for it. Every insert
//! is flushed before returning, so an interrupted run loses at most the
//! record that was in flight.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::window::{DateWindow, parse_timestamp};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to access progress file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("progress file {path} is not a valid JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize progress: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl ProgressStore {
    /// Load the store at `path`. A missing file yields an empty store; an
    /// unreadable or unparseable one is an error and is left untouched.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, ProgressError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| ProgressError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no progress file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(source) => return Err(ProgressError::Io { path, source }),
        };
        debug!(
            "loaded {} entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(id, value)| (id.as_str(), value))
    }

    /// Record a result and persist the whole store.
    pub fn insert<S: Into<String>>(&mut self, id: S, value: Value) -> Result<(), ProgressError> {
        self.entries.insert(id.into(), value);
        self.flush()
    }

    /// Entries whose date at `date_pointer` falls in `window`, oldest first.
    ///
    /// Entries without a parseable date are logged and left out.
    pub fn entries_in(&self, window: &DateWindow, date_pointer: &str) -> Vec<(&str, &Value)> {
        let mut dated: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(id, value)| {
                let raw = value.pointer(date_pointer).and_then(Value::as_str);
                match raw.and_then(parse_timestamp) {
                    Some(timestamp) => Some((timestamp, id.as_str(), value)),
                    None => {
                        warn!(
                            "progress entry {} has no parseable date at '{}', skipping",
                            id, date_pointer
                        );
                        None
                    }
                }
            })
            .filter(|(timestamp, _, _)| window.contains(*timestamp))
            .collect();
        dated.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        dated
            .into_iter()
            .map(|(_, id, value)| (id, value))
            .collect()
    }

    /// Write to a sibling temp file and rename it over the store, so a crash
    /// mid-write never leaves a truncated file behind.
    fn flush(&self) -> Result<(), ProgressError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ProgressError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|source| ProgressError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| ProgressError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
