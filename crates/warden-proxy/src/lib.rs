//! Warden security proxy
//!
//! The client half of the claiming protocol: a per-application proxy that
//! issues requests over an authenticated session, a transport trait the
//! proxy is generic over, and a listener for the application's
//! asynchronous state-change signals. Manifest signing is an offline
//! authority-side operation and is re-exported from the credentials
//! crate for convenience.

#![forbid(unsafe_code)]

pub mod notifications;
pub mod proxy;
pub mod transport;

pub use notifications::NotificationListener;
pub use proxy::{CallOptions, SecurityProxy};
pub use transport::SecureSession;
pub use warden_credentials::sign_manifest;
