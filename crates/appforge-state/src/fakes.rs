//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryHistoryLog` and `MemoryIntegrationStore` that satisfy the
//! trait contracts without touching the filesystem.

use std::sync::Mutex;

use chrono::Utc;

use crate::error::StoreError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryHistoryLog
// ---------------------------------------------------------------------------

/// In-memory history log backed by a `Vec<HistoryEntry>`.
#[derive(Debug, Default)]
pub struct MemoryHistoryLog {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryLog for MemoryHistoryLog {
    fn append(&self, role: Role, content: &str) -> StoreResult<HistoryEntry> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned("history"))?;
        let entry = HistoryEntry {
            role,
            content: content.to_string(),
            created_at: next_timestamp(entries.last(), Utc::now()),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    fn list(&self) -> StoreResult<Vec<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned("history"))?;
        Ok(entries.clone())
    }

    fn recent(&self, n: usize) -> StoreResult<Vec<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned("history"))?;
        Ok(tail(&entries, n))
    }

    fn clear(&self) -> StoreResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned("history"))?;
        entries.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryIntegrationStore
// ---------------------------------------------------------------------------

/// In-memory integration store using the same table layout as the file store.
#[derive(Debug, Default)]
pub struct MemoryIntegrationStore {
    table: Mutex<IntegrationTable>,
}

impl MemoryIntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> StoreResult<std::sync::MutexGuard<'_, IntegrationTable>> {
        self.table
            .lock()
            .map_err(|_| StoreError::LockPoisoned("integrations"))
    }
}

impl IntegrationStore for MemoryIntegrationStore {
    fn get(&self, provider_id: &str, app_name: &str) -> StoreResult<Option<IntegrationConfig>> {
        Ok(self.table()?.get(provider_id, app_name))
    }

    fn put(&self, config: &IntegrationConfig) -> StoreResult<()> {
        self.table()?.put(config)
    }

    fn remove(&self, provider_id: &str, app_name: &str) -> StoreResult<bool> {
        Ok(self.table()?.remove(provider_id, app_name))
    }

    fn list_for_app(&self, app_name: &str) -> StoreResult<Vec<IntegrationConfig>> {
        Ok(self.table()?.list_for_app(app_name))
    }

    fn list_all(&self) -> StoreResult<Vec<IntegrationConfig>> {
        Ok(self.table()?.list_all())
    }
}
