//! AppForge-State: file-backed persistence for AppForge
//!
//! This crate owns the two pieces of advisory state the generator keeps per
//! project: the conversation history log and the integration configuration map.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: crash-safe writes, single writer per dataset, and graceful degradation
//! when a file on disk is malformed.
//!
//! ## Key Components
//!
//! - `ProjectStore`: opens both datasets under `<project>/.appforge/`
//! - `HistoryLog` / `FileHistoryLog`: append-only `{role, content, created_at}` records
//! - `IntegrationStore` / `FileIntegrationStore`: `provider -> app -> fields` map

mod error;
pub mod fakes;
pub mod fs;
mod handle;
pub mod storage_traits;

pub use error::StoreError;
pub use fs::{FileHistoryLog, FileIntegrationStore};
pub use handle::ProjectStore;
pub use storage_traits::{
    HistoryEntry, HistoryLog, IntegrationConfig, IntegrationStore, Role, StoreResult,
};

