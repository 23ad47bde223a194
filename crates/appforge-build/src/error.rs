//! Errors raised by process-backed collaborators.

use appforge_core::ForgeError;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("command {0} is empty")]
    EmptyCommand(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} timed out after {secs} seconds")]
    Timeout { name: String, secs: u64 },

    #[error("{name} exited with code {code}: {stderr}")]
    Exit {
        name: String,
        code: i32,
        stderr: String,
    },

    #[error("unreadable reply from {name}: {reason}")]
    Protocol { name: String, reason: String },

    #[error("unknown toolchain: {0} (expected swift, xcodebuild or cargo)")]
    UnknownToolchain(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<BuildError> for ForgeError {
    fn from(err: BuildError) -> Self {
        ForgeError::Collaborator(err.to_string())
    }
}
