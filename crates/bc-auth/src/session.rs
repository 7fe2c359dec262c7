use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::config::RefreshPolicy;

/// Live session credentials held by the client
///
/// The access and refresh expiries are tracked independently; the server does
/// not promise the access token dies first.
#[derive(Clone)]
pub struct Credentials {
    pub access_jwt: Zeroizing<String>,
    pub refresh_jwt: Zeroizing<String>,
    pub access_expiry: DateTime<Utc>,
    pub refresh_expiry: DateTime<Utc>,
    pub did: String,
    pub handle: String,
}

impl Credentials {
    /// Derive the refresh urgency at `now`
    pub fn state_at(&self, now: DateTime<Utc>, policy: &RefreshPolicy) -> SessionState {
        let remaining = self.access_expiry - now;
        if remaining > to_chrono(policy.async_threshold()) {
            return SessionState::Fresh;
        }
        if self.refresh_expiry <= now {
            return SessionState::RefreshDead;
        }
        if remaining > to_chrono(policy.sync_threshold()) {
            SessionState::NearExpiry
        } else {
            SessionState::Stale
        }
    }

    pub fn state(&self, policy: &RefreshPolicy) -> SessionState {
        self.state_at(Utc::now(), policy)
    }

    /// Auth material for an ordinary call
    pub fn auth_info(&self) -> AuthInfo {
        AuthInfo {
            access_jwt: self.access_jwt.clone(),
            refresh_jwt: self.refresh_jwt.clone(),
            handle: self.handle.clone(),
            did: self.did.clone(),
        }
    }

    /// Auth material for com.atproto.server.refreshSession, which expects the
    /// refresh token in the bearer slot
    pub fn refresh_auth_info(&self) -> AuthInfo {
        AuthInfo {
            access_jwt: self.refresh_jwt.clone(),
            ..self.auth_info()
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .finish_non_exhaustive()
    }
}

/// Refresh urgency derived from the current time and the credential expiries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Access token valid beyond the async threshold
    Fresh,
    /// Refresh in the background, callers proceed
    NearExpiry,
    /// Callers block until a refresh lands
    Stale,
    /// The refresh token itself expired; only a new login helps
    RefreshDead,
}

/// Snapshot of the bearer material handed to a transport call
///
/// A snapshot never sees later refreshes.
#[derive(Clone)]
pub struct AuthInfo {
    pub access_jwt: Zeroizing<String>,
    pub refresh_jwt: Zeroizing<String>,
    pub handle: String,
    pub did: String,
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("handle", &self.handle)
            .field("did", &self.did)
            .finish_non_exhaustive()
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
