//! Collaborators the engine consults but does not own: the credential
//! source and the connectivity signal.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Supplies the bearer credential for outgoing requests.
///
/// The engine asks for the token immediately before every submission, so a
/// sign-in that happens mid-drain is picked up by the next intent.
pub trait AuthProvider: Send + Sync {
    /// Returns the current token, or `None` when signed out.
    fn current_token(&self) -> Option<String>;
}

/// Answers whether the device currently believes it is online.
pub trait ConnectivityOracle: Send + Sync {
    /// Returns the current connectivity belief.
    fn is_online(&self) -> bool;
}

/// A token fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Creates a provider that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Creates a provider that is permanently signed out.
    pub fn none() -> Self {
        Self(None)
    }
}

impl AuthProvider for StaticToken {
    fn current_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A token that can be replaced or cleared while the engine runs.
#[derive(Debug, Default)]
pub struct SharedToken {
    token: RwLock<Option<String>>,
}

impl SharedToken {
    /// Creates a provider holding `token`.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replaces the token, e.g. after sign-in or refresh.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Clears the token on sign-out.
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl AuthProvider for SharedToken {
    fn current_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Connectivity flag flipped by the host platform (or by tests).
#[derive(Debug)]
pub struct ManualConnectivity {
    online: AtomicBool,
}

impl ManualConnectivity {
    /// Creates an oracle with the given initial belief.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Updates the belief.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityOracle for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_token_reflects_updates() {
        let auth = SharedToken::new(None);
        assert_eq!(auth.current_token(), None);

        auth.set("abc");
        assert_eq!(auth.current_token().as_deref(), Some("abc"));

        auth.clear();
        assert_eq!(auth.current_token(), None);
    }

    #[test]
    fn static_token() {
        assert_eq!(StaticToken::new("t").current_token().as_deref(), Some("t"));
        assert_eq!(StaticToken::none().current_token(), None);
    }

    #[test]
    fn manual_connectivity_toggles() {
        let oracle = ManualConnectivity::default();
        assert!(oracle.is_online());
        oracle.set_online(false);
        assert!(!oracle.is_online());
    }
}
