//! Application state, group identifiers, and claim capabilities

use crate::errors::{Result, SecurityError};
use crate::keys::PublicKey;
use serde::{Deserialize, Serialize};

/// Length of a security-group identifier in bytes.
pub const GROUP_ID_LEN: usize = 16;

/// Lifecycle state of a managed application.
///
/// An application starts `Claimable`, becomes `Claimed` through a
/// successful claim, and returns to `Claimable` only through a factory
/// reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationState {
    /// Unclaimed; the only state in which a claim may succeed.
    Claimable,
    /// Bound to a security authority with at least one trust anchor.
    Claimed,
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationState::Claimable => write!(f, "claimable"),
            ApplicationState::Claimed => write!(f, "claimed"),
        }
    }
}

/// A 16-byte security-group identifier.
///
/// The length is enforced strictly; the content is accepted verbatim even
/// when it denotes no real group. That permissiveness is part of the
/// protocol contract, not an oversight to tighten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId([u8; GROUP_ID_LEN]);

impl GroupId {
    /// Wrap a byte buffer, rejecting any length other than 16.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; GROUP_ID_LEN] = bytes.try_into().map_err(|_| {
            SecurityError::invalid_group_identifier(format!(
                "expected {} bytes, got {}",
                GROUP_ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Parse the 32-hex-digit form used in policy documents.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text).map_err(|err| {
            SecurityError::invalid_group_identifier(format!("invalid hex: {err}"))
        })?;
        Self::new(&bytes)
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; GROUP_ID_LEN] {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A (group, group authority) pair established at claim time.
///
/// Trust anchors define which membership certificates are honored by the
/// default policy, and the first anchor's group acts as the admin group for
/// management operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    /// Security group the anchor covers.
    pub group: GroupId,
    /// Public key of the group's certificate authority.
    pub authority: PublicKey,
}

/// Bit flags describing the claiming mechanisms an application supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCapabilities(u16);

impl ClaimCapabilities {
    /// Anonymous key exchange.
    pub const ECDHE_NULL: Self = Self(0x0001);
    /// Pre-shared key exchange.
    pub const ECDHE_PSK: Self = Self(0x0002);
    /// Certificate-authenticated key exchange.
    pub const ECDHE_ECDSA: Self = Self(0x0004);
    /// Password-authenticated key exchange.
    pub const ECDHE_SPEKE: Self = Self(0x0008);

    /// The fixed default capability set.
    pub const DEFAULT: Self =
        Self(Self::ECDHE_NULL.0 | Self::ECDHE_ECDSA.0 | Self::ECDHE_SPEKE.0);

    /// Raw flag bits.
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Whether every flag in `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ClaimCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for ClaimCapabilities {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Name under which a remote application is addressed on the bus.
///
/// Binding a proxy to an address never fails, even for a name that resolves
/// to nothing; the failure surfaces on first use of the secure session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Wrap an address string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn group_id_requires_exactly_sixteen_bytes() {
        assert!(GroupId::new(&[0u8; 16]).is_ok());
        assert_matches!(
            GroupId::new(&[0u8; 15]),
            Err(SecurityError::InvalidGroupIdentifier { .. })
        );
        assert_matches!(
            GroupId::new(&[0u8; 17]),
            Err(SecurityError::InvalidGroupIdentifier { .. })
        );
    }

    #[test]
    fn group_id_content_is_unconstrained() {
        // All-zero and arbitrary identifiers are both accepted verbatim.
        assert!(GroupId::new(&[0u8; 16]).is_ok());
        assert!(GroupId::new(&[0xFFu8; 16]).is_ok());
    }

    #[test]
    fn group_id_hex_round_trip() {
        let id = GroupId::new(&[0xAB; 16]).unwrap();
        assert_eq!(GroupId::from_hex(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn default_capabilities_include_certificate_exchange() {
        let caps = ClaimCapabilities::default();
        assert!(caps.contains(ClaimCapabilities::ECDHE_NULL));
        assert!(caps.contains(ClaimCapabilities::ECDHE_ECDSA));
        assert!(!caps.contains(ClaimCapabilities::ECDHE_PSK));
        assert_eq!(caps.bits(), 0x000D);
    }
}
