//! Warden credential codec
//!
//! Parsing, validation, emission, and signing of the credential artifacts
//! the claiming protocol consumes: permission rule trees, manifest
//! templates, signed manifests, authorization policies, and certificates.
//!
//! Document schemas are fixed. Element names, nesting, and the action
//! annotation are preserved exactly so existing signed artifacts keep
//! verifying; any deviation surfaces as
//! [`SecurityError::MalformedDocument`](warden_core::SecurityError).

#![forbid(unsafe_code)]

pub mod certificate;
pub mod manifest;
pub mod policy;
pub mod rules;

pub use certificate::{Certificate, CertificateKind, TbsCertificate};
pub use manifest::{sign_manifest, ManifestTemplate, SignedManifest};
pub use policy::{Acl, Peer, Policy};
pub use rules::{Action, InterfaceRule, Member, MemberKind, NodeRule, RuleSet};
