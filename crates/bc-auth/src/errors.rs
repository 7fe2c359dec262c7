use chrono::{DateTime, Utc};
use thiserror::Error;

/// Session and transport error types
#[derive(Error, Debug)]
pub enum BcAuthError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server accepted the secret, but it is the account's master password.
    /// This library only accepts app passwords.
    #[error("unauthorized: master credentials used")]
    MasterCredentials,

    #[error("session expired: refresh token was valid until {expired_at}")]
    SessionExpired { expired_at: DateTime<Utc> },

    #[error("not logged in")]
    NotLoggedIn,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("XRPC error {status} {error}: {message}")]
    Xrpc {
        status: reqwest::StatusCode,
        error: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response body exceeded the {limit} byte limit")]
    BodyTooLarge { limit: u64 },

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Token decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BcAuthError {
    /// True for credential rejections, including the master credential veto.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::MasterCredentials)
    }

    pub fn is_master_credentials(&self) -> bool {
        matches!(self, Self::MasterCredentials)
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// True for anything raised by the network layer rather than by session policy.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Http { .. }
                | Self::Xrpc { .. }
                | Self::Transport(_)
                | Self::BodyTooLarge { .. }
                | Self::Serde(_)
                | Self::UrlParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BcAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_credentials_is_also_unauthorized() {
        let err = BcAuthError::MasterCredentials;
        assert!(err.is_unauthorized());
        assert!(err.is_master_credentials());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_plain_rejection_is_not_master() {
        let err = BcAuthError::Unauthorized("Invalid identifier or password".to_string());
        assert!(err.is_unauthorized());
        assert!(!err.is_master_credentials());
    }

    #[test]
    fn test_session_expired_mentions_deadline() {
        let expired_at = DateTime::from_timestamp(0, 0).unwrap();
        let err = BcAuthError::SessionExpired { expired_at };
        assert!(err.is_session_expired());
        assert!(err.to_string().contains("1970-01-01"));
    }
}
