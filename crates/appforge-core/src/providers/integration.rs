//! Integration lifecycle: set up, re-validate, show and remove per-app configs.

use std::collections::BTreeMap;

use appforge_state::{IntegrationConfig, ProjectStore};
use chrono::Utc;
use tracing::{info, warn};

use super::{ProviderRegistry, SetupCapability};
use crate::domain::{ForgeError, Result};

/// Raw, user-supplied setup fields keyed by field name.
///
/// Values may be secrets, so `Debug` prints field names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IntegrationInput {
    fields: BTreeMap<String, String>,
}

impl IntegrationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Trimmed value, treating blank as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Like [`get`](Self::get) but reports a missing field as an error.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| ForgeError::InvalidIntegration(format!("missing field: {name}")))
    }
}

impl std::fmt::Debug for IntegrationInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationInput")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Writes integration configs on behalf of registered providers.
pub struct IntegrationService<'a> {
    registry: &'a ProviderRegistry,
    store: &'a ProjectStore,
}

impl<'a> IntegrationService<'a> {
    pub fn new(registry: &'a ProviderRegistry, store: &'a ProjectStore) -> Self {
        Self { registry, store }
    }

    fn setup_for(&self, provider_id: &str) -> Result<&'a dyn SetupCapability> {
        let provider = self.registry.lookup(provider_id)?;
        provider
            .as_setup()
            .ok_or_else(|| ForgeError::CapabilityUnsupported {
                provider: provider_id.to_string(),
                capability: "setup",
            })
    }

    /// Validate `input` and store the resulting config, stamped as validated.
    pub fn setup(
        &self,
        provider_id: &str,
        app_name: &str,
        input: &IntegrationInput,
    ) -> Result<IntegrationConfig> {
        let setup = self.setup_for(provider_id)?;
        let app_name = app_name.trim();
        if app_name.is_empty() {
            return Err(ForgeError::InvalidIntegration("app name must not be empty".into()));
        }
        for field in setup.required_fields() {
            input.require(field)?;
        }

        let mut config = setup.validate(app_name, input)?;
        if config.provider_id != provider_id || config.app_name != app_name {
            return Err(ForgeError::ContractViolation(format!(
                "{provider_id} returned a config for {}/{}",
                config.provider_id, config.app_name
            )));
        }
        config.validated_at = Some(Utc::now());
        self.store.integrations().put(&config)?;

        info!(provider = %provider_id, app = %app_name, "Integration saved");
        Ok(config)
    }

    /// Re-check a stored config. A failed check clears `validated_at`.
    pub fn revalidate(&self, provider_id: &str, app_name: &str) -> Result<IntegrationConfig> {
        let setup = self.setup_for(provider_id)?;
        let mut config = self
            .store
            .integrations()
            .get(provider_id, app_name)?
            .ok_or_else(|| {
                ForgeError::InvalidIntegration(format!(
                    "no {provider_id} integration configured for {app_name}"
                ))
            })?;

        match setup.check(&config) {
            Ok(()) => {
                config.validated_at = Some(Utc::now());
                self.store.integrations().put(&config)?;
                info!(provider = %provider_id, app = %app_name, "Integration revalidated");
                Ok(config)
            }
            Err(e) => {
                warn!(provider = %provider_id, app = %app_name, error = %e, "Integration failed revalidation");
                config.validated_at = None;
                self.store.integrations().put(&config)?;
                Err(e)
            }
        }
    }

    pub fn show(&self, provider_id: &str, app_name: &str) -> Result<Option<IntegrationConfig>> {
        self.registry.lookup(provider_id)?;
        Ok(self.store.integrations().get(provider_id, app_name)?)
    }

    /// Every config for `app_name`, or every stored config.
    pub fn list(&self, app_name: Option<&str>) -> Result<Vec<IntegrationConfig>> {
        let integrations = self.store.integrations();
        Ok(match app_name {
            Some(app) => integrations.list_for_app(app)?,
            None => integrations.list_all()?,
        })
    }

    /// Remove a config. Stale entries of unregistered providers may be removed too.
    pub fn remove(&self, provider_id: &str, app_name: &str) -> Result<bool> {
        let removed = self.store.integrations().remove(provider_id, app_name)?;
        if removed {
            info!(provider = %provider_id, app = %app_name, "Integration removed");
        }
        Ok(removed)
    }
}
