//! File-backed stores.
//!
//! Each dataset is one pretty-printed JSON file. Writers hold a per-store mutex
//! for the whole read-modify-write cycle and persist through a temp file in the
//! same directory followed by a rename, so readers never observe a torn file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::storage_traits::*;

/// Directory (relative to a project root) holding all persisted datasets.
pub const STATE_DIR: &str = ".appforge";
pub const HISTORY_FILE: &str = "history.json";
pub const INTEGRATIONS_FILE: &str = "integrations.json";

/// Read a dataset, degrading to the default value when the file is absent or malformed.
fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> StoreResult<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(StoreError::Io(e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed store file, treating as empty");
            Ok(T::default())
        }
    }
}

/// Atomic write: temp file in the target directory, then rename over the target.
fn persist<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidRecord(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    debug!(path = %path.display(), bytes = body.len(), "Persisted store file");
    Ok(())
}

fn lock<'a>(mutex: &'a Mutex<()>, name: &'static str) -> StoreResult<MutexGuard<'a, ()>> {
    mutex.lock().map_err(|_| StoreError::LockPoisoned(name))
}

// ---------------------------------------------------------------------------
// FileHistoryLog
// ---------------------------------------------------------------------------

/// History log persisted as a JSON array of `{role, content, created_at}`.
#[derive(Debug)]
pub struct FileHistoryLog {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileHistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreResult<Vec<HistoryEntry>> {
        load_or_default(&self.path)
    }
}

impl HistoryLog for FileHistoryLog {
    fn append(&self, role: Role, content: &str) -> StoreResult<HistoryEntry> {
        let _held = lock(&self.guard, "history")?;
        let mut entries = self.read()?;
        let entry = HistoryEntry {
            role,
            content: content.to_string(),
            created_at: next_timestamp(entries.last(), Utc::now()),
        };
        entries.push(entry.clone());
        persist(&self.path, &entries)?;
        Ok(entry)
    }

    fn list(&self) -> StoreResult<Vec<HistoryEntry>> {
        let _held = lock(&self.guard, "history")?;
        self.read()
    }

    fn recent(&self, n: usize) -> StoreResult<Vec<HistoryEntry>> {
        let _held = lock(&self.guard, "history")?;
        Ok(tail(&self.read()?, n))
    }

    fn clear(&self) -> StoreResult<()> {
        let _held = lock(&self.guard, "history")?;
        persist(&self.path, &Vec::<HistoryEntry>::new())
    }
}

// ---------------------------------------------------------------------------
// FileIntegrationStore
// ---------------------------------------------------------------------------

/// Integration configuration persisted as `provider -> app -> fields`.
#[derive(Debug)]
pub struct FileIntegrationStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileIntegrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreResult<IntegrationTable> {
        load_or_default(&self.path)
    }
}

impl IntegrationStore for FileIntegrationStore {
    fn get(&self, provider_id: &str, app_name: &str) -> StoreResult<Option<IntegrationConfig>> {
        let _held = lock(&self.guard, "integrations")?;
        Ok(self.read()?.get(provider_id, app_name))
    }

    fn put(&self, config: &IntegrationConfig) -> StoreResult<()> {
        let _held = lock(&self.guard, "integrations")?;
        let mut table = self.read()?;
        table.put(config)?;
        persist(&self.path, &table)
    }

    fn remove(&self, provider_id: &str, app_name: &str) -> StoreResult<bool> {
        let _held = lock(&self.guard, "integrations")?;
        let mut table = self.read()?;
        let removed = table.remove(provider_id, app_name);
        if removed {
            persist(&self.path, &table)?;
        }
        Ok(removed)
    }

    fn list_for_app(&self, app_name: &str) -> StoreResult<Vec<IntegrationConfig>> {
        let _held = lock(&self.guard, "integrations")?;
        Ok(self.read()?.list_for_app(app_name))
    }

    fn list_all(&self) -> StoreResult<Vec<IntegrationConfig>> {
        let _held = lock(&self.guard, "integrations")?;
        Ok(self.read()?.list_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_history() -> (tempfile::TempDir, FileHistoryLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::new(dir.path().join(STATE_DIR).join(HISTORY_FILE));
        (dir, log)
    }

    #[test]
    fn history_file_is_created_lazily() {
        let (_dir, log) = make_history();
        assert!(log.list().unwrap().is_empty());
        assert!(!log.path().exists());

        log.append(Role::User, "build a notes app").unwrap();
        assert!(log.path().exists());
    }

    #[test]
    fn history_file_is_indented_json() {
        let (_dir, log) = make_history();
        log.append(Role::User, "hello").unwrap();
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.contains("\n  {"));
        assert!(text.contains("\"role\": \"user\""));
    }

    #[test]
    fn malformed_history_reads_as_empty() {
        let (_dir, log) = make_history();
        std::fs::create_dir_all(log.path().parent().unwrap()).unwrap();
        std::fs::write(log.path(), b"[{\"role\": \"user\", trunc").unwrap();

        assert!(log.list().unwrap().is_empty());
        // A subsequent append replaces the corrupt file with a valid one.
        log.append(Role::Assistant, "recovered").unwrap();
        assert_eq!(log.list().unwrap().len(), 1);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, log) = make_history();
        log.append(Role::User, "a").unwrap();
        log.append(Role::User, "b").unwrap();
        let entries: Vec<_> = std::fs::read_dir(log.path().parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn malformed_integrations_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(INTEGRATIONS_FILE);
        std::fs::write(&path, b"not json").unwrap();
        let store = FileIntegrationStore::new(&path);
        assert!(store.list_all().unwrap().is_empty());
        assert!(store.get("supabase", "Notes").unwrap().is_none());
    }

    #[test]
    fn remove_missing_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIntegrationStore::new(dir.path().join(INTEGRATIONS_FILE));
        assert!(!store.remove("supabase", "Notes").unwrap());
        assert!(!store.path().exists());
    }
}
