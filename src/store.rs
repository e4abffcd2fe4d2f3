//! Durable event log storage
//!
//! The event log is the only state that survives a restart. It is persisted as
//! a single record under one namespaced key of a [`KeyValueStore`]:
//!
//! ```text
//! aac-insight.events -> { "version": 1, "events": [ {timestamp, type, data}, ... ] }
//! ```

use crate::analytics::types::InteractionEvent;
use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current on-disk format version
pub const EVENT_LOG_VERSION: u32 = 1;

/// Durable key-value primitive supplied by the host
pub trait KeyValueStore {
    /// Read the value stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AnalyticsError>;

    /// Replace the value under `key`. On failure the prior value must be retained.
    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), AnalyticsError>;
}

/// In-memory store, for tests and hosts without durable storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AnalyticsError> {
        Ok(self.values.get(key).cloned())
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), AnalyticsError> {
        self.values.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// One file per key inside a directory.
///
/// Saves write a sibling temp file and rename it over the target, so a failed
/// write leaves the previous value in place.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, AnalyticsError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn save(&mut self, key: &str, bytes: &[u8]) -> Result<(), AnalyticsError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        let result = write_synced(&tmp, bytes)
            .map_err(|e| AnalyticsError::Storage(format!("failed to write {}: {e}", tmp.display())))
            .and_then(|()| {
                fs::rename(&tmp, &path).map_err(|e| {
                    AnalyticsError::Storage(format!("failed to replace {}: {e}", path.display()))
                })
            });

        if result.is_err() {
            // Best effort; the temp file may never have been created
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

/// Write `bytes` to `path` and flush them to disk
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Persisted form written by this version
#[derive(Serialize)]
struct PersistedLogRef<'a> {
    version: u32,
    events: &'a [InteractionEvent],
}

/// Accepted on read: the versioned record, or a bare array of events
#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedLog {
    Versioned {
        #[allow(dead_code)]
        version: u32,
        events: Vec<InteractionEvent>,
    },
    Bare(Vec<InteractionEvent>),
}

/// Raised once when the persisted log could not be read at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub key: String,
    pub message: String,
}

/// Decode a persisted event log
pub fn decode_events(bytes: &[u8]) -> Result<Vec<InteractionEvent>, AnalyticsError> {
    let persisted: PersistedLog = serde_json::from_slice(bytes)?;
    Ok(match persisted {
        PersistedLog::Versioned { events, .. } => events,
        PersistedLog::Bare(events) => events,
    })
}

/// Encode an event log in the current format
pub fn encode_events(events: &[InteractionEvent]) -> Result<Vec<u8>, AnalyticsError> {
    Ok(serde_json::to_vec(&PersistedLogRef {
        version: EVENT_LOG_VERSION,
        events,
    })?)
}

/// Append-only interaction log backed by a [`KeyValueStore`]
#[derive(Debug)]
pub struct EventLog<S: KeyValueStore> {
    store: S,
    key: String,
    events: Vec<InteractionEvent>,
    persist_failures: u64,
}

impl<S: KeyValueStore> EventLog<S> {
    /// Open the log stored under `key`.
    ///
    /// A missing record yields an empty log. An unreadable or corrupted record
    /// also yields an empty log, together with a [`LoadWarning`].
    pub fn open(store: S, key: impl Into<String>) -> (Self, Option<LoadWarning>) {
        let key = key.into();
        let (events, warning) = match store.load(&key).and_then(|bytes| match bytes {
            Some(bytes) => decode_events(&bytes),
            None => Ok(Vec::new()),
        }) {
            Ok(events) => (events, None),
            Err(e) => {
                log::warn!("Discarding unreadable event log under {key}: {e}");
                let warning = LoadWarning {
                    key: key.clone(),
                    message: e.to_string(),
                };
                (Vec::new(), Some(warning))
            }
        };

        log::debug!("Loaded {} events from {key}", events.len());

        (
            Self {
                store,
                key,
                events,
                persist_failures: 0,
            },
            warning,
        )
    }

    /// Append an event and persist the log before returning.
    ///
    /// The event is kept in memory even when persisting fails.
    pub fn append(&mut self, event: InteractionEvent) -> Result<(), AnalyticsError> {
        self.events.push(event);
        self.persist()
    }

    /// Append several events with a single write
    pub fn extend(
        &mut self,
        events: impl IntoIterator<Item = InteractionEvent>,
    ) -> Result<(), AnalyticsError> {
        self.events.extend(events);
        self.persist()
    }

    /// Ordered snapshot of every event
    pub fn all(&self) -> &[InteractionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&InteractionEvent> {
        self.events.last()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of appends whose durable write failed
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn persist(&mut self) -> Result<(), AnalyticsError> {
        let result = encode_events(&self.events).and_then(|bytes| self.store.save(&self.key, &bytes));
        if result.is_err() {
            self.persist_failures += 1;
        }
        result
    }
}
