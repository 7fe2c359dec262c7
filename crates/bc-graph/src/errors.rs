use bc_auth::BcAuthError;
use thiserror::Error;

/// Social graph error types
#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Auth(#[from] BcAuthError),

    #[error("Resolve canceled")]
    Canceled,

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Resolver task ended without reporting a result")]
    ProducerLost,
}

impl GraphError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub(crate) fn decode(context: &str, source: serde_json::Error) -> Self {
        Self::Decode(format!("{context}: {source}"))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
