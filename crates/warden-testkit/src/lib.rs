//! Warden testing infrastructure
//!
//! Shared fixtures for integration tests: an in-process bus that stands in
//! for a real secure transport, and factories for keys, certificates, and
//! the XML documents the protocol carries. Everything here is test-only
//! plumbing; unwraps are fine.

#![forbid(unsafe_code)]
#![allow(clippy::unwrap_used)]

pub mod bus;
pub mod factories;

pub use bus::InProcessBus;
pub use factories::{
    generate_keypair, host_claimable, issue_identity, issue_membership, policy_with_serial,
    Authority, ALLOW_ALL_TEMPLATE,
};

/// Install a subscriber that honors `RUST_LOG`, once per process. Call at
/// the top of a test to see tracing output.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
