//! Project-scoped store handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::fakes::{MemoryHistoryLog, MemoryIntegrationStore};
use crate::fs::{FileHistoryLog, FileIntegrationStore, HISTORY_FILE, INTEGRATIONS_FILE, STATE_DIR};
use crate::storage_traits::{HistoryLog, IntegrationStore};

/// Both persisted datasets for one project, opened once and passed explicitly.
///
/// The two datasets have independent locks, so history appends never wait on
/// integration writes and vice versa.
#[derive(Clone)]
pub struct ProjectStore {
    root: Option<PathBuf>,
    history: Arc<dyn HistoryLog>,
    integrations: Arc<dyn IntegrationStore>,
}

impl ProjectStore {
    /// Open (lazily creating) `<project_dir>/.appforge/`.
    pub fn open(project_dir: impl AsRef<Path>) -> Self {
        let root = project_dir.as_ref().join(STATE_DIR);
        info!(path = %root.display(), "Opening project store");
        Self {
            history: Arc::new(FileHistoryLog::new(root.join(HISTORY_FILE))),
            integrations: Arc::new(FileIntegrationStore::new(root.join(INTEGRATIONS_FILE))),
            root: Some(root),
        }
    }

    /// Store backed entirely by in-memory fakes.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            history: Arc::new(MemoryHistoryLog::new()),
            integrations: Arc::new(MemoryIntegrationStore::new()),
        }
    }

    /// Assemble a store from arbitrary implementations.
    pub fn from_parts(history: Arc<dyn HistoryLog>, integrations: Arc<dyn IntegrationStore>) -> Self {
        Self {
            root: None,
            history,
            integrations,
        }
    }

    /// State directory, if file-backed.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn history(&self) -> &Arc<dyn HistoryLog> {
        &self.history
    }

    pub fn integrations(&self) -> &Arc<dyn IntegrationStore> {
        &self.integrations
    }
}

impl std::fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectStore").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_traits::Role;

    #[test]
    fn open_places_files_under_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::open(dir.path());
        store.history().append(Role::User, "hi").unwrap();

        assert_eq!(store.root(), Some(dir.path().join(STATE_DIR).as_path()));
        assert!(dir.path().join(STATE_DIR).join(HISTORY_FILE).exists());
        assert!(!dir.path().join(STATE_DIR).join(INTEGRATIONS_FILE).exists());
    }

    #[test]
    fn in_memory_has_no_root() {
        let store = ProjectStore::in_memory();
        assert!(store.root().is_none());
        assert!(store.history().list().unwrap().is_empty());
    }
}
