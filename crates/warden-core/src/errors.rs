//! Security error taxonomy for the claiming protocol
//!
//! Every protocol operation returns exactly one of these kinds on failure.
//! Errors are returned synchronously to the caller of the triggering
//! operation and are never retried automatically; none is fatal to the
//! process. The enum serializes so a remote authority can return the same
//! kind the caller observes locally.

use serde::{Deserialize, Serialize};

/// Error kinds surfaced by claiming and permission-management operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SecurityError {
    /// Null or malformed required cryptographic material, or a key supplied
    /// in the structurally wrong role (e.g. a public key where a private
    /// key is expected).
    #[error("Invalid data: {message}")]
    InvalidData {
        /// What was malformed
        message: String,
    },

    /// Group identifier buffer is not exactly 16 bytes.
    #[error("Invalid group identifier: {message}")]
    InvalidGroupIdentifier {
        /// The observed length problem
        message: String,
    },

    /// Manifest or policy XML fails schema validation.
    #[error("Malformed document: {message}")]
    MalformedDocument {
        /// What failed to validate
        message: String,
    },

    /// Identity certificate thumbprint does not match the subject bound in
    /// the accompanying signed manifests.
    #[error("Unknown certificate: {message}")]
    UnknownCertificate {
        /// The binding mismatch
        message: String,
    },

    /// Membership certificate with the same issuer and serial is already
    /// installed.
    #[error("Duplicate certificate: {message}")]
    DuplicateCertificate {
        /// Which certificate collided
        message: String,
    },

    /// Target unreachable, session invalid, or secure channel not
    /// established. Takes priority over payload validation.
    #[error("Authentication failure: {message}")]
    AuthenticationFailure {
        /// Why the channel could not be used
        message: String,
    },

    /// Authenticated caller lacks the admin-group membership required for a
    /// management or configuration operation.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Which authorization was missing
        message: String,
    },

    /// StartManagement called while a management bracket is already open.
    #[error("Management already started")]
    ManagementAlreadyStarted,

    /// EndManagement called with no open management bracket.
    #[error("Management not started")]
    ManagementNotStarted,

    /// Submitted policy serial number does not exceed the installed one.
    #[error("Policy not newer: {message}")]
    PolicyNotNewer {
        /// The rejected serial relation
        message: String,
    },
}

impl SecurityError {
    /// Malformed or wrongly-typed cryptographic material.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Group identifier of the wrong length.
    pub fn invalid_group_identifier(message: impl Into<String>) -> Self {
        Self::InvalidGroupIdentifier {
            message: message.into(),
        }
    }

    /// Document failed schema validation.
    pub fn malformed_document(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Certificate/manifest thumbprint binding mismatch.
    pub fn unknown_certificate(message: impl Into<String>) -> Self {
        Self::UnknownCertificate {
            message: message.into(),
        }
    }

    /// Membership certificate already installed.
    pub fn duplicate_certificate(message: impl Into<String>) -> Self {
        Self::DuplicateCertificate {
            message: message.into(),
        }
    }

    /// Secure channel could not be established or used.
    pub fn authentication_failure(message: impl Into<String>) -> Self {
        Self::AuthenticationFailure {
            message: message.into(),
        }
    }

    /// Caller lacks admin-group membership.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Stale policy serial number.
    pub fn policy_not_newer(message: impl Into<String>) -> Self {
        Self::PolicyNotNewer {
            message: message.into(),
        }
    }
}

/// Standard result type for Warden operations.
pub type Result<T> = std::result::Result<T, SecurityError>;
