//! Transport seam for the security proxy
//!
//! The proxy is generic over how requests reach the application: any
//! authenticated, confidential session that can carry one request and
//! return one reply. Session establishment and key agreement live behind
//! this trait; the proxy only assumes the peer on the other end was
//! authenticated as `credentials` claims.

use async_trait::async_trait;
use tokio::sync::broadcast;
use warden_core::protocol::{CallResult, NotificationKind, PeerCredentials, Request};
use warden_core::{PeerAddress, Result};

/// An authenticated secure session to remote applications.
///
/// `call` delivers one request to the application at `target` on behalf of
/// the caller the transport authenticated. A target without an
/// established session fails with an authentication error, never a
/// transport-specific one.
#[async_trait]
pub trait SecureSession: Send + Sync {
    /// Deliver a request and wait for the application's reply.
    async fn call(
        &self,
        target: &PeerAddress,
        caller: &PeerCredentials,
        request: Request,
    ) -> CallResult;

    /// Open the stream of state-change signals emitted by the application.
    async fn notifications(
        &self,
        target: &PeerAddress,
    ) -> Result<broadcast::Receiver<NotificationKind>>;
}
