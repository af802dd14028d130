//! Wire protocol for the claiming and permission-management surface
//!
//! One request per state-machine transition or query, carried as a
//! serializable enum over whatever secure session the transport layer
//! provides. Certificates, keys, manifests, and policies travel as PEM/XML
//! text exactly as callers supplied them; the authority parses and
//! validates on receipt so every caller observes the same error taxonomy.

use crate::errors::SecurityError;
use crate::types::{ApplicationState, ClaimCapabilities};
use serde::{Deserialize, Serialize};

/// Identity material the transport layer authenticated the caller with.
///
/// The public key names the peer; membership certificates are presented to
/// satisfy admin-group checks on management operations. Both stay in PEM
/// form until the authority needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCredentials {
    /// PEM public key of the authenticated caller.
    pub public_key: String,
    /// PEM membership certificates presented over the channel.
    pub memberships: Vec<String>,
}

impl PeerCredentials {
    /// Credentials for a peer with no group memberships.
    pub fn new(public_key: String) -> Self {
        Self {
            public_key,
            memberships: Vec::new(),
        }
    }
}

/// A protocol operation addressed to a managed application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Bind an unclaimed application to a security authority.
    Claim {
        /// PEM public key of the certificate authority issuing the identity.
        certificate_authority: String,
        /// Leaf-to-root identity certificate chain, concatenated PEM.
        identity_certificate_chain: String,
        /// Raw group identifier bytes; length is validated by the authority.
        group_id: Vec<u8>,
        /// PEM public key of the security group's authority.
        group_authority: String,
        /// Signed manifest XML documents accompanying the identity.
        signed_manifests: Vec<String>,
    },
    /// Install a membership certificate (PEM).
    InstallMembership {
        /// The certificate proving group membership.
        certificate: String,
    },
    /// Open the exclusive management bracket.
    StartManagement,
    /// Close the management bracket.
    EndManagement,
    /// Replace the installed policy with a newer one.
    UpdatePolicy {
        /// Policy XML document.
        policy: String,
    },
    /// Discard the installed policy, reverting to the default.
    ResetPolicy,
    /// Replace the identity certificate chain and signed manifests.
    UpdateIdentity {
        /// Leaf-to-root identity certificate chain, concatenated PEM.
        identity_certificate_chain: String,
        /// Signed manifest XML documents.
        signed_manifests: Vec<String>,
    },
    /// Factory reset: clear all security state, back to claimable.
    Reset,
    /// Query the application lifecycle state.
    GetApplicationState,
    /// Query the supported claim mechanisms.
    GetClaimCapabilities,
    /// Query the auxiliary claim-capability flags.
    GetClaimCapabilitiesAdditionalInfo,
    /// Query the manifest template, verbatim as configured.
    GetManifestTemplate,
    /// Query the application's elliptic-curve public key (PEM).
    GetEccPublicKey,
    /// Query the default policy derived from the trust anchors.
    GetDefaultPolicy,
    /// Query the effective policy (installed, or default if none).
    GetPolicy,
}

impl Request {
    /// Short operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Claim { .. } => "Claim",
            Request::InstallMembership { .. } => "InstallMembership",
            Request::StartManagement => "StartManagement",
            Request::EndManagement => "EndManagement",
            Request::UpdatePolicy { .. } => "UpdatePolicy",
            Request::ResetPolicy => "ResetPolicy",
            Request::UpdateIdentity { .. } => "UpdateIdentity",
            Request::Reset => "Reset",
            Request::GetApplicationState => "GetApplicationState",
            Request::GetClaimCapabilities => "GetClaimCapabilities",
            Request::GetClaimCapabilitiesAdditionalInfo => "GetClaimCapabilitiesAdditionalInfo",
            Request::GetManifestTemplate => "GetManifestTemplate",
            Request::GetEccPublicKey => "GetEccPublicKey",
            Request::GetDefaultPolicy => "GetDefaultPolicy",
            Request::GetPolicy => "GetPolicy",
        }
    }
}

/// Successful response to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Operation applied; nothing to return.
    Ok,
    /// Application lifecycle state.
    State(ApplicationState),
    /// Claim capability flags.
    Capabilities(ClaimCapabilities),
    /// Auxiliary claim-capability flags.
    CapabilitiesInfo(u16),
    /// Manifest template XML, verbatim.
    ManifestTemplate(String),
    /// Application public key, PEM.
    EccPublicKey(String),
    /// Policy XML document.
    Policy(String),
}

/// Outcome of a remote call: a reply or one of the taxonomy kinds.
pub type CallResult = std::result::Result<Reply, SecurityError>;

/// Asynchronous state-change signals emitted by a managed application.
///
/// Delivery is best-effort and out-of-band: the call that triggered a
/// signal may return before any listener observes it, and ordering relative
/// to the call's return is not guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A policy was installed, replaced, or reverted to the default.
    PolicyChanged,
    /// The application was factory reset to claimable.
    FactoryReset,
    /// A management bracket was opened.
    ManagementStarted,
    /// A management bracket was closed.
    ManagementEnded,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::PolicyChanged => write!(f, "policy-changed"),
            NotificationKind::FactoryReset => write!(f, "factory-reset"),
            NotificationKind::ManagementStarted => write!(f, "management-started"),
            NotificationKind::ManagementEnded => write!(f, "management-ended"),
        }
    }
}
