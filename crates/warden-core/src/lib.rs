//! Warden core types
//!
//! Shared foundation for the Warden claiming and permission-management
//! protocol: the security error taxonomy, application state and group
//! identifiers, Ed25519 key material with PEM framing, and the wire-level
//! request/reply/notification enums exchanged over a secure session.
//!
//! Higher layers build on this crate:
//! - `warden-credentials` - manifests, policies, certificates
//! - `warden-store` - the per-application authority state store
//! - `warden-proxy` - the client-facing security proxy

#![forbid(unsafe_code)]

pub mod errors;
pub mod keys;
pub mod pem;
pub mod protocol;
pub mod types;

pub use errors::{Result, SecurityError};
pub use keys::{KeyPair, PrivateKey, PublicKey, Thumbprint};
pub use protocol::{NotificationKind, PeerCredentials, Reply, Request};
pub use types::{
    ApplicationState, ClaimCapabilities, GroupId, PeerAddress, TrustAnchor, GROUP_ID_LEN,
};
