//! Certificates and chain verification
//!
//! The protocol consumes certificates as opaque signed blobs: an identity
//! certificate chain presented at claim time, and membership certificates
//! proving group membership. A certificate binds a subject public key to an
//! issuer's signature over the to-be-signed body; membership certificates
//! additionally name the group they attest.
//!
//! Certificates are minted elsewhere (the testkit, for tests); this module
//! only parses, encodes, and verifies them.

use serde::{Deserialize, Serialize};
use warden_core::{pem, GroupId, PublicKey, Result, SecurityError, Thumbprint};

/// What a certificate attests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateKind {
    /// Binds an application identity to a public key.
    Identity,
    /// Proves membership in a security group.
    Membership,
}

/// The signed body of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TbsCertificate {
    /// What this certificate attests.
    pub kind: CertificateKind,
    /// Issuer-scoped serial number. Together with the issuer key this
    /// identifies the certificate for duplicate detection.
    pub serial: u64,
    /// Public key of the subject.
    pub subject: PublicKey,
    /// Public key of the issuer whose signature covers this body.
    pub issuer: PublicKey,
    /// Attested group, present on membership certificates.
    pub group: Option<GroupId>,
}

impl TbsCertificate {
    /// Deterministic byte encoding signed by the issuer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|err| {
            SecurityError::invalid_data(format!("certificate body encoding failed: {err}"))
        })
    }
}

/// A certificate: signed body plus the issuer's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// The signed body.
    pub tbs: TbsCertificate,
    /// Issuer's Ed25519 signature over [`TbsCertificate::to_bytes`].
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Assemble a certificate from a body and a signature produced over
    /// [`TbsCertificate::to_bytes`].
    pub fn new(tbs: TbsCertificate, signature: Vec<u8>) -> Self {
        Self { tbs, signature }
    }

    /// Parse a single `WARDEN CERTIFICATE` PEM block.
    pub fn from_pem(text: &str) -> Result<Self> {
        let blocks = pem::decode_all(pem::CERTIFICATE_LABEL, text)?;
        if blocks.len() != 1 {
            return Err(SecurityError::invalid_data(format!(
                "expected a single certificate, found {}",
                blocks.len()
            )));
        }
        Self::from_block(&blocks[0])
    }

    /// Parse a leaf-to-root chain of concatenated PEM blocks.
    pub fn chain_from_pem(text: &str) -> Result<Vec<Self>> {
        pem::decode_all(pem::CERTIFICATE_LABEL, text)?
            .iter()
            .map(|block| Self::from_block(block))
            .collect()
    }

    fn from_block(block: &[u8]) -> Result<Self> {
        bincode::deserialize(block)
            .map_err(|err| SecurityError::invalid_data(format!("malformed certificate: {err}")))
    }

    /// Encode as a `WARDEN CERTIFICATE` PEM block.
    pub fn to_pem(&self) -> Result<String> {
        let bytes = bincode::serialize(self).map_err(|err| {
            SecurityError::invalid_data(format!("certificate encoding failed: {err}"))
        })?;
        Ok(pem::encode(pem::CERTIFICATE_LABEL, &bytes))
    }

    /// Verify the issuer's signature over the body.
    pub fn verify_signature(&self) -> Result<()> {
        let body = self.tbs.to_bytes()?;
        self.tbs
            .issuer
            .verify(&body, &self.signature)
            .map_err(|_| SecurityError::invalid_data("certificate signature does not verify"))
    }

    /// Thumbprint of the subject public key, the value bound into signed
    /// manifests.
    pub fn thumbprint(&self) -> Thumbprint {
        self.tbs.subject.thumbprint()
    }

    /// Duplicate-detection key: (issuer key bytes, serial).
    pub fn duplicate_key(&self) -> ([u8; 32], u64) {
        (*self.tbs.issuer.as_bytes(), self.tbs.serial)
    }
}

/// Verify a leaf-to-root chain: every signature must verify under its
/// embedded issuer key, and each certificate's issuer must be the subject
/// of the next one. A single certificate is a valid chain; it need not be
/// self-signed, since a chain may terminate at an external authority.
pub fn verify_chain(chain: &[Certificate]) -> Result<()> {
    if chain.is_empty() {
        return Err(SecurityError::invalid_data(
            "identity certificate chain is empty",
        ));
    }
    for cert in chain {
        cert.verify_signature()?;
    }
    for pair in chain.windows(2) {
        if pair[0].tbs.issuer != pair[1].tbs.subject {
            return Err(SecurityError::invalid_data(
                "certificate chain linkage broken: issuer does not match next subject",
            ));
        }
    }
    Ok(())
}
