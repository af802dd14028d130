//! Warden authority state store
//!
//! The remote half of the claiming protocol: per-application security
//! records (state, trust anchors, identity, memberships, policy), the
//! exclusive management-session guard, and dispatch of incoming protocol
//! requests with admin-authorization gating. State-change notifications
//! are emitted on a per-application broadcast channel, decoupled from the
//! synchronous call that triggered them.
//!
//! All mutations of one application's record happen under the store's
//! write lock, which is what makes the management flag, the policy serial
//! comparison, and the membership-duplicate check atomic with respect to
//! concurrent callers.

#![forbid(unsafe_code)]

pub mod application;
pub mod events;
pub mod session;
pub mod store;

pub use application::ApplicationRecord;
pub use events::Notifier;
pub use session::ManagementGuard;
pub use store::{AuthorityStore, HostConfig};
