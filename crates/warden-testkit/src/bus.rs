//! In-process transport
//!
//! A [`SecureSession`] that routes calls straight into an
//! [`AuthorityStore`] in the same process. The caller's credentials pass
//! through as-is, which lets tests impersonate any peer; authentication
//! still fails the same way it would on a real transport when no
//! application is hosted at the target address.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use warden_core::protocol::{CallResult, NotificationKind, PeerCredentials, Request};
use warden_core::{PeerAddress, Result};
use warden_proxy::SecureSession;
use warden_store::{ApplicationRecord, AuthorityStore, HostConfig};

/// Loopback session backed by a local authority store.
#[derive(Clone)]
pub struct InProcessBus {
    store: Arc<AuthorityStore>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self {
            store: Arc::new(AuthorityStore::new(HostConfig::default())),
        }
    }

    /// Wrap an existing store.
    pub fn with_store(store: Arc<AuthorityStore>) -> Self {
        Self { store }
    }

    /// The backing store, for direct inspection.
    pub fn store(&self) -> &Arc<AuthorityStore> {
        &self.store
    }

    /// Host an application record under the given address.
    pub async fn host(&self, address: PeerAddress, record: ApplicationRecord) {
        self.store.host(address, record).await;
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureSession for InProcessBus {
    async fn call(
        &self,
        target: &PeerAddress,
        caller: &PeerCredentials,
        request: Request,
    ) -> CallResult {
        self.store.dispatch(target, caller, request).await
    }

    async fn notifications(
        &self,
        target: &PeerAddress,
    ) -> Result<broadcast::Receiver<NotificationKind>> {
        self.store.subscribe(target).await
    }
}
