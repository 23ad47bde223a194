//! Storage trait definitions for AppForge
//!
//! These traits define the two persisted datasets:
//! - `HistoryLog`: append-only conversation/event history
//! - `IntegrationStore`: per-provider, per-application integration configuration
//!
//! Both are synchronous and backend-agnostic. File-backed implementations live
//! in the `fs` module; in-memory fakes are provided via the `fakes` module.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// HistoryLog: append-only history
// ---------------------------------------------------------------------------

/// Author of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single persisted history record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only history log.
///
/// Guarantees:
/// - `list()` returns entries in insertion order.
/// - `created_at` is monotonically non-decreasing across that order.
/// - Entries are never edited or deleted individually; only `clear()` removes them.
pub trait HistoryLog: Send + Sync {
    /// Append an entry stamped with the current time and return it.
    fn append(&self, role: Role, content: &str) -> StoreResult<HistoryEntry>;

    /// All entries, oldest first.
    fn list(&self) -> StoreResult<Vec<HistoryEntry>>;

    /// The last `n` entries, oldest first.
    fn recent(&self, n: usize) -> StoreResult<Vec<HistoryEntry>>;

    /// Remove every entry.
    fn clear(&self) -> StoreResult<()>;
}

/// Timestamp for the next entry: never earlier than the previous one.
pub(crate) fn next_timestamp(last: Option<&HistoryEntry>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(prev) if prev.created_at > now => prev.created_at,
        _ => now,
    }
}

pub(crate) fn tail(entries: &[HistoryEntry], n: usize) -> Vec<HistoryEntry> {
    let start = entries.len().saturating_sub(n);
    entries[start..].to_vec()
}

// ---------------------------------------------------------------------------
// IntegrationStore: per-app provider configuration
// ---------------------------------------------------------------------------

/// Configuration linking one application to one provider.
///
/// `anon_key` and `pat` are secrets and are redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub provider_id: String,
    pub app_name: String,
    pub project_url: String,
    pub anon_key: String,
    pub pat: Option<String>,
    pub project_ref: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("provider_id", &self.provider_id)
            .field("app_name", &self.app_name)
            .field("project_url", &self.project_url)
            .field("anon_key", &"<redacted>")
            .field("pat", &self.pat.as_ref().map(|_| "<redacted>"))
            .field("project_ref", &self.project_ref)
            .field("validated_at", &self.validated_at)
            .finish()
    }
}

/// Per-app field set as laid out on disk (provider and app are the map keys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IntegrationFields {
    project_url: String,
    anon_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validated_at: Option<DateTime<Utc>>,
}

/// provider id -> app name -> fields. Sorted maps keep the serialized form stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct IntegrationTable(BTreeMap<String, BTreeMap<String, IntegrationFields>>);

impl IntegrationTable {
    pub(crate) fn get(&self, provider_id: &str, app_name: &str) -> Option<IntegrationConfig> {
        self.0
            .get(provider_id)
            .and_then(|apps| apps.get(app_name))
            .map(|fields| to_config(provider_id, app_name, fields))
    }

    pub(crate) fn put(&mut self, config: &IntegrationConfig) -> StoreResult<()> {
        if config.provider_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord("provider id must not be empty".into()));
        }
        if config.app_name.trim().is_empty() {
            return Err(StoreError::InvalidRecord("app name must not be empty".into()));
        }
        let fields = IntegrationFields {
            project_url: config.project_url.clone(),
            anon_key: config.anon_key.clone(),
            pat: config.pat.clone(),
            project_ref: config.project_ref.clone(),
            validated_at: config.validated_at,
        };
        self.0
            .entry(config.provider_id.clone())
            .or_default()
            .insert(config.app_name.clone(), fields);
        Ok(())
    }

    pub(crate) fn remove(&mut self, provider_id: &str, app_name: &str) -> bool {
        let Some(apps) = self.0.get_mut(provider_id) else {
            return false;
        };
        let removed = apps.remove(app_name).is_some();
        if apps.is_empty() {
            self.0.remove(provider_id);
        }
        removed
    }

    pub(crate) fn list_for_app(&self, app_name: &str) -> Vec<IntegrationConfig> {
        self.0
            .iter()
            .filter_map(|(provider_id, apps)| {
                apps.get(app_name)
                    .map(|fields| to_config(provider_id, app_name, fields))
            })
            .collect()
    }

    pub(crate) fn list_all(&self) -> Vec<IntegrationConfig> {
        self.0
            .iter()
            .flat_map(|(provider_id, apps)| {
                apps.iter()
                    .map(move |(app_name, fields)| to_config(provider_id, app_name, fields))
            })
            .collect()
    }
}

fn to_config(provider_id: &str, app_name: &str, fields: &IntegrationFields) -> IntegrationConfig {
    IntegrationConfig {
        provider_id: provider_id.to_string(),
        app_name: app_name.to_string(),
        project_url: fields.project_url.clone(),
        anon_key: fields.anon_key.clone(),
        pat: fields.pat.clone(),
        project_ref: fields.project_ref.clone(),
        validated_at: fields.validated_at,
    }
}

/// Integration configuration store.
///
/// Semantics:
/// - Keyed by `(provider_id, app_name)`; `put` inserts or replaces.
/// - Writing the same config twice leaves the store in the same state as writing it once.
/// - Whether `provider_id` names a registered provider is checked by the caller.
pub trait IntegrationStore: Send + Sync {
    /// Fetch the config for a provider/app pair.
    fn get(&self, provider_id: &str, app_name: &str) -> StoreResult<Option<IntegrationConfig>>;

    /// Insert or replace the config for `(config.provider_id, config.app_name)`.
    fn put(&self, config: &IntegrationConfig) -> StoreResult<()>;

    /// Delete a config. Returns whether anything was removed.
    fn remove(&self, provider_id: &str, app_name: &str) -> StoreResult<bool>;

    /// All configs for one application, ordered by provider id.
    fn list_for_app(&self, app_name: &str) -> StoreResult<Vec<IntegrationConfig>>;

    /// Every stored config, ordered by provider id then app name.
    fn list_all(&self) -> StoreResult<Vec<IntegrationConfig>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(provider: &str, app: &str) -> IntegrationConfig {
        IntegrationConfig {
            provider_id: provider.to_string(),
            app_name: app.to_string(),
            project_url: "https://abc.supabase.co".to_string(),
            anon_key: "anon-secret".to_string(),
            pat: Some("sbp_secret".to_string()),
            project_ref: Some("abc".to_string()),
            validated_at: None,
        }
    }

    #[test]
    fn test_next_timestamp_clamps_to_previous() {
        let now = Utc::now();
        let prev = HistoryEntry {
            role: Role::User,
            content: "a".into(),
            created_at: now + Duration::seconds(5),
        };
        assert_eq!(next_timestamp(Some(&prev), now), prev.created_at);
        assert_eq!(next_timestamp(None, now), now);
    }

    #[test]
    fn test_tail_bounds() {
        let entries: Vec<HistoryEntry> = ["a", "b", "c"]
            .iter()
            .map(|c| HistoryEntry {
                role: Role::User,
                content: c.to_string(),
                created_at: Utc::now(),
            })
            .collect();
        assert_eq!(tail(&entries, 2).len(), 2);
        assert_eq!(tail(&entries, 2)[0].content, "b");
        assert_eq!(tail(&entries, 10).len(), 3);
        assert!(tail(&entries, 0).is_empty());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", config("supabase", "Notes"));
        assert!(!rendered.contains("anon-secret"));
        assert!(!rendered.contains("sbp_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_table_rejects_empty_keys() {
        let mut table = IntegrationTable::default();
        assert!(table.put(&config("", "Notes")).is_err());
        assert!(table.put(&config("supabase", " ")).is_err());
    }

    #[test]
    fn test_table_remove_prunes_empty_provider() {
        let mut table = IntegrationTable::default();
        table.put(&config("supabase", "Notes")).unwrap();
        assert!(table.remove("supabase", "Notes"));
        assert!(!table.remove("supabase", "Notes"));
        assert_eq!(table, IntegrationTable::default());
    }

    #[test]
    fn test_table_list_for_app_spans_providers() {
        let mut table = IntegrationTable::default();
        table.put(&config("supabase", "Notes")).unwrap();
        table.put(&config("revenuecat", "Notes")).unwrap();
        table.put(&config("supabase", "Other")).unwrap();

        let configs = table.list_for_app("Notes");
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].provider_id, "revenuecat");
        assert_eq!(table.list_all().len(), 3);
    }

    #[test]
    fn test_role_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::System.to_string(), "system");
    }
}
