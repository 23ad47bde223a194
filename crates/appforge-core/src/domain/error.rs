//! Domain-level error taxonomy for AppForge.

use appforge_state::StoreError;

/// AppForge domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("provider {provider} does not offer {capability}")]
    CapabilityUnsupported {
        provider: String,
        capability: &'static str,
    },

    #[error("invalid integration config: {0}")]
    InvalidIntegration(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    /// Configuration errors are fatal at startup and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ForgeError::DuplicateProvider(_) | ForgeError::ProviderNotFound(_)
        )
    }
}

/// Result type for AppForge domain operations.
pub type Result<T> = std::result::Result<T, ForgeError>;
