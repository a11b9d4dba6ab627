//! Commute and trip persistence.
//!
//! [`MemoryStore`] keeps everything in process; [`JsonFileStore`] mirrors the
//! same maps to two JSON documents in a data directory, rewriting the
//! affected document on every mutation.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::traits::CommuteStore;
use crate::types::{Commute, HistoryEntry};

const COMMUTES_FILE: &str = "commutes.json";
const HISTORY_FILE: &str = "history.json";

/// Reads a JSON document, returning `None` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(value))
}

/// Writes a JSON document through a temporary sibling file and a rename, so
/// readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[derive(Debug, Default)]
struct Tables {
    commutes: HashMap<String, Commute>,
    entries: HashMap<String, HistoryEntry>,
}

impl Tables {
    fn commutes_sorted(&self) -> Vec<Commute> {
        let mut commutes: Vec<Commute> = self.commutes.values().cloned().collect();
        commutes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        commutes
    }

    fn entries_sorted(&self) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    fn entries_of(&self, commute_id: &str) -> Vec<HistoryEntry> {
        self.entries
            .values()
            .filter(|entry| entry.commute_id == commute_id)
            .cloned()
            .collect()
    }

    fn take_entries_of(&mut self, commute_id: &str) -> Vec<HistoryEntry> {
        let ids: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.commute_id == commute_id)
            .map(|entry| entry.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.entries.remove(id))
            .collect()
    }
}

/// In-process store. Contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommuteStore for MemoryStore {
    fn load_commute(&self, id: &str) -> Result<Option<Commute>, StoreError> {
        Ok(self.tables.lock().commutes.get(id).cloned())
    }

    fn save_commute(&self, commute: &Commute) -> Result<(), StoreError> {
        self.tables
            .lock()
            .commutes
            .insert(commute.id.clone(), commute.clone());
        Ok(())
    }

    fn list_commutes(&self) -> Result<Vec<Commute>, StoreError> {
        Ok(self.tables.lock().commutes_sorted())
    }

    fn delete_commute(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().commutes.remove(id).is_some())
    }

    fn load_entry(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self.tables.lock().entries.get(id).cloned())
    }

    fn save_entry(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.tables
            .lock()
            .entries
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    fn list_entries(&self, commute_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.tables.lock().entries_of(commute_id))
    }

    fn delete_entries(&self, commute_id: &str) -> Result<usize, StoreError> {
        Ok(self.tables.lock().take_entries_of(commute_id).len())
    }
}

/// Store backed by `commutes.json` and `history.json` in one directory.
///
/// The whole data set is held in memory and the lock is kept across the
/// file write, so concurrent writers never interleave.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    tables: Mutex<Tables>,
}

impl JsonFileStore {
    /// Opens (or starts) a store in `dir`. Missing files mean empty tables.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let commutes: Vec<Commute> = read_json(&dir.join(COMMUTES_FILE))?.unwrap_or_default();
        let entries: Vec<HistoryEntry> = read_json(&dir.join(HISTORY_FILE))?.unwrap_or_default();
        tracing::info!(
            dir = %dir.display(),
            commutes = commutes.len(),
            trips = entries.len(),
            "opened commute store"
        );

        let tables = Tables {
            commutes: commutes.into_iter().map(|c| (c.id.clone(), c)).collect(),
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        };
        Ok(Self {
            dir,
            tables: Mutex::new(tables),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn flush_commutes(&self, tables: &Tables) -> Result<(), StoreError> {
        write_json_atomic(&self.dir.join(COMMUTES_FILE), &tables.commutes_sorted())
    }

    fn flush_entries(&self, tables: &Tables) -> Result<(), StoreError> {
        write_json_atomic(&self.dir.join(HISTORY_FILE), &tables.entries_sorted())
    }
}

impl CommuteStore for JsonFileStore {
    fn load_commute(&self, id: &str) -> Result<Option<Commute>, StoreError> {
        Ok(self.tables.lock().commutes.get(id).cloned())
    }

    fn save_commute(&self, commute: &Commute) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let previous = tables.commutes.insert(commute.id.clone(), commute.clone());
        if let Err(err) = self.flush_commutes(&tables) {
            match previous {
                Some(previous) => tables.commutes.insert(commute.id.clone(), previous),
                None => tables.commutes.remove(&commute.id),
            };
            return Err(err);
        }
        Ok(())
    }

    fn list_commutes(&self) -> Result<Vec<Commute>, StoreError> {
        Ok(self.tables.lock().commutes_sorted())
    }

    fn delete_commute(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        let Some(removed) = tables.commutes.remove(id) else {
            return Ok(false);
        };
        if let Err(err) = self.flush_commutes(&tables) {
            tables.commutes.insert(id.to_string(), removed);
            return Err(err);
        }
        Ok(true)
    }

    fn load_entry(&self, id: &str) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self.tables.lock().entries.get(id).cloned())
    }

    fn save_entry(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let previous = tables.entries.insert(entry.id.clone(), entry.clone());
        if let Err(err) = self.flush_entries(&tables) {
            match previous {
                Some(previous) => tables.entries.insert(entry.id.clone(), previous),
                None => tables.entries.remove(&entry.id),
            };
            return Err(err);
        }
        Ok(())
    }

    fn list_entries(&self, commute_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.tables.lock().entries_of(commute_id))
    }

    fn delete_entries(&self, commute_id: &str) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock();
        let removed = tables.take_entries_of(commute_id);
        if !removed.is_empty() {
            if let Err(err) = self.flush_entries(&tables) {
                for entry in removed {
                    tables.entries.insert(entry.id.clone(), entry);
                }
                return Err(err);
            }
        }
        Ok(removed.len())
    }
}
