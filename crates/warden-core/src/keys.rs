//! Ed25519 key material with PEM framing
//!
//! The protocol identifies an application by its elliptic-curve public key
//! and signs manifests and certificates with the matching private key. Keys
//! cross API boundaries as PEM text; the wrappers here parse, validate, and
//! redact them.

use crate::errors::{Result, SecurityError};
use crate::pem;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a public key, binding a signed manifest to the subject
/// of an identity certificate.
pub type Thumbprint = [u8; 32];

/// An application's elliptic-curve public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a `WARDEN PUBLIC KEY` PEM block.
    pub fn from_pem(text: &str) -> Result<Self> {
        let bytes = pem::decode(pem::PUBLIC_KEY_LABEL, text)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SecurityError::invalid_data("public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&arr)
            .map_err(|err| SecurityError::invalid_data(format!("invalid public key: {err}")))?;
        Ok(Self(key))
    }

    /// Encode as a `WARDEN PUBLIC KEY` PEM block.
    pub fn to_pem(&self) -> String {
        pem::encode(pem::PUBLIC_KEY_LABEL, self.0.as_bytes())
    }

    /// Raw 32-byte key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// SHA-256 thumbprint of the raw key bytes.
    pub fn thumbprint(&self) -> Thumbprint {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hasher.finalize().into()
    }

    /// Verify an Ed25519 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| SecurityError::invalid_data("signature must be 64 bytes"))?;
        let signature = Signature::from_bytes(&sig_bytes);
        self.0
            .verify(message, &signature)
            .map_err(|err| SecurityError::invalid_data(format!("signature mismatch: {err}")))
    }
}

/// An Ed25519 private key. Never logged; zeroized on drop by the underlying
/// implementation.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Parse a `WARDEN PRIVATE KEY` PEM block.
    ///
    /// A public key block fed here fails the label check, which is how the
    /// wrong-key-role case surfaces as [`SecurityError::InvalidData`].
    pub fn from_pem(text: &str) -> Result<Self> {
        let bytes = pem::decode(pem::PRIVATE_KEY_LABEL, text)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SecurityError::invalid_data("private key must be 32 bytes"))?;
        Ok(Self(SigningKey::from_bytes(&arr)))
    }

    /// Encode as a `WARDEN PRIVATE KEY` PEM block.
    pub fn to_pem(&self) -> String {
        pem::encode(pem::PRIVATE_KEY_LABEL, self.0.as_bytes())
    }

    /// Sign `message` with Ed25519.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.0.sign(message).to_bytes().to_vec()
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").field(&"[REDACTED]").finish()
    }
}

/// A private/public key pair as retrieved from the local key store.
#[derive(Debug, Clone)]
pub struct KeyPair {
    private: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh key pair.
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        Self {
            private: PrivateKey(SigningKey::generate(rng)),
        }
    }

    /// Wrap an existing private key.
    pub fn from_private(private: PrivateKey) -> Self {
        Self { private }
    }

    /// The private half.
    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// The public half.
    pub fn public_key(&self) -> PublicKey {
        self.private.public_key()
    }
}
