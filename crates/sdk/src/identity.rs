//! Identity provider boundary.
//!
//! The gate never manages sessions itself. It reads the current identity
//! through an injected [`IdentityFacade`] and reacts to identity-changed events
//! that the host forwards from its provider (see [`SessionIdentity`]).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use optin_types::Identity;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::error::{Result, SdkError};

/// Read-only view of the identity provider's current session.
#[async_trait]
pub trait IdentityFacade: Send + Sync + 'static {
    /// Returns the signed-in user's attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::NotAuthenticated`] when no session exists. Any
    /// other error is treated as a transient provider failure.
    async fn current_identity(&self) -> Result<Identity>;
}

/// Reads the current identity, mapping "not authenticated" to `Ok(None)`.
///
/// Only a missing session counts as signed out. Any other provider failure,
/// and a read that exceeds `timeout`, is returned as an error so callers can
/// leave the flow untouched.
///
/// # Errors
///
/// Returns the provider's error, or [`SdkError::Timeout`] when the read does
/// not finish within `timeout`.
pub async fn read_identity(
    facade: &dyn IdentityFacade,
    timeout: Duration,
) -> Result<Option<Identity>> {
    match tokio::time::timeout(timeout, facade.current_identity()).await {
        Ok(Ok(identity)) => Ok(Some(identity)),
        Ok(Err(SdkError::NotAuthenticated)) => Ok(None),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            Err(SdkError::Timeout { duration_ms })
        },
    }
}

/// In-memory session adapter.
///
/// Hosts forward their provider's sign-in/sign-out events into this handle;
/// it answers [`IdentityFacade`] reads and publishes every change on a watch
/// channel that [`GateSession::follow`](crate::GateSession::follow) consumes.
/// Clones share the same session.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    current: Arc<RwLock<Option<Identity>>>,
    changes: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdentity {
    /// Creates a signed-out session.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self { current: Arc::new(RwLock::new(None)), changes: Arc::new(changes) }
    }

    /// Creates a session already signed in as `identity`.
    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        let session = Self::new();
        session.sign_in(identity);
        session
    }

    /// Records a sign-in (or a refreshed attribute set for the same user).
    pub fn sign_in(&self, identity: Identity) {
        *self.current.write() = Some(identity.clone());
        self.changes.send_replace(Some(identity));
    }

    /// Records a sign-out.
    pub fn sign_out(&self) {
        *self.current.write() = None;
        self.changes.send_replace(None);
    }

    /// Returns the current identity without going through the facade.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.current.read().clone()
    }

    /// Subscribes to identity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl IdentityFacade for SessionIdentity {
    async fn current_identity(&self) -> Result<Identity> {
        self.current.read().clone().ok_or(SdkError::NotAuthenticated)
    }
}
