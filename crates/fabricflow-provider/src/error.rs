//! Provider error types

use fabricflow_client::FabricError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Changing {attribute} requires replacement: {reason}")]
    RequiresReplacement { attribute: String, reason: String },

    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProviderError {
    pub(crate) fn replacement(attribute: &str, reason: impl Into<String>) -> Self {
        ProviderError::RequiresReplacement {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Fabric(e) if e.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
