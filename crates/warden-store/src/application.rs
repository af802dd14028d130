//! Per-application security record
//!
//! Everything the protocol persists for one managed application: lifecycle
//! state, claim capabilities, the immutable manifest template, trust
//! anchors, the identity certificate chain with its signed manifests, the
//! membership set, and the optional installed policy. The management
//! bracket rides along but is ephemeral.
//!
//! Methods here implement the state-machine transitions and their
//! validation; callers are responsible for authentication and admin
//! gating, and for invoking these under the store lock.

use crate::session::ManagementGuard;
use std::collections::HashMap;
use tracing::{debug, info};
use warden_core::{
    ApplicationState, ClaimCapabilities, GroupId, PublicKey, Result, SecurityError, TrustAnchor,
};
use warden_credentials::certificate::verify_chain;
use warden_credentials::{Certificate, CertificateKind, ManifestTemplate, Policy, SignedManifest};

/// Key identifying a membership certificate for duplicate detection.
type MembershipKey = ([u8; 32], u64);

/// The persisted record of one managed application.
#[derive(Debug, Clone)]
pub struct ApplicationRecord {
    public_key: PublicKey,
    claim_capabilities: ClaimCapabilities,
    claim_capabilities_additional_info: u16,
    /// Stored verbatim; returned byte-for-byte by the template query.
    manifest_template: String,
    state: ApplicationState,
    trust_anchors: Vec<TrustAnchor>,
    identity_chain: Vec<Certificate>,
    manifests: Vec<SignedManifest>,
    memberships: HashMap<MembershipKey, Certificate>,
    policy: Option<Policy>,
    pub(crate) management: ManagementGuard,
}

impl ApplicationRecord {
    /// Create a claimable record for an application with the given key and
    /// manifest template. The template is schema-validated once here and
    /// immutable afterwards.
    pub fn new(public_key: PublicKey, manifest_template_xml: impl Into<String>) -> Result<Self> {
        let manifest_template = manifest_template_xml.into();
        ManifestTemplate::parse(&manifest_template)?;
        Ok(Self {
            public_key,
            claim_capabilities: ClaimCapabilities::default(),
            claim_capabilities_additional_info: 0,
            manifest_template,
            state: ApplicationState::Claimable,
            trust_anchors: Vec::new(),
            identity_chain: Vec::new(),
            manifests: Vec::new(),
            memberships: HashMap::new(),
            policy: None,
            management: ManagementGuard::new(),
        })
    }

    /// Lifecycle state.
    pub fn state(&self) -> ApplicationState {
        self.state
    }

    /// Supported claim mechanisms.
    pub fn claim_capabilities(&self) -> ClaimCapabilities {
        self.claim_capabilities
    }

    /// Auxiliary claim-capability flags.
    pub fn claim_capabilities_additional_info(&self) -> u16 {
        self.claim_capabilities_additional_info
    }

    /// The manifest template, verbatim as configured.
    pub fn manifest_template(&self) -> &str {
        &self.manifest_template
    }

    /// The application's public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Trust anchors established at claim time.
    pub fn trust_anchors(&self) -> &[TrustAnchor] {
        &self.trust_anchors
    }

    /// Number of installed membership certificates.
    pub fn membership_count(&self) -> usize {
        self.memberships.len()
    }

    /// The default policy derived solely from the trust anchors.
    pub fn default_policy(&self) -> Policy {
        Policy::default_for(&self.trust_anchors)
    }

    /// The policy in force: the installed one, or the default when none is
    /// installed.
    pub fn effective_policy(&self) -> Policy {
        self.policy
            .clone()
            .unwrap_or_else(|| self.default_policy())
    }

    /// Bind this application to a security authority.
    ///
    /// Validation order: claimable state, group identifier length, key and
    /// certificate well-formedness, then manifest/certificate binding.
    /// On success the trust anchor, identity, and manifests are recorded,
    /// the default policy takes effect, and the state becomes claimed.
    pub fn claim(
        &mut self,
        certificate_authority_pem: &str,
        identity_chain_pem: &str,
        group_id_bytes: &[u8],
        group_authority_pem: &str,
        signed_manifests: &[String],
    ) -> Result<()> {
        if self.state == ApplicationState::Claimed {
            return Err(SecurityError::permission_denied(
                "application is already claimed",
            ));
        }
        let group = GroupId::new(group_id_bytes)?;
        let certificate_authority = PublicKey::from_pem(certificate_authority_pem)?;
        let group_authority = PublicKey::from_pem(group_authority_pem)?;
        let (chain, manifests) =
            validate_identity(identity_chain_pem, signed_manifests, Some(&certificate_authority))?;

        self.trust_anchors = vec![TrustAnchor {
            group,
            authority: group_authority,
        }];
        self.identity_chain = chain;
        self.manifests = manifests;
        // Installing the default policy derived from the new anchor counts
        // as a policy change.
        self.policy = None;
        self.state = ApplicationState::Claimed;
        info!(group = %group, "application claimed");
        Ok(())
    }

    /// Install a membership certificate. Duplicates are keyed by
    /// (issuer, serial) and rejected; installation is not idempotent.
    pub fn install_membership(&mut self, certificate_pem: &str) -> Result<()> {
        if self.state != ApplicationState::Claimed {
            return Err(SecurityError::permission_denied(
                "application is not claimed",
            ));
        }
        let certificate = Certificate::from_pem(certificate_pem)?;
        if certificate.tbs.kind != CertificateKind::Membership {
            return Err(SecurityError::invalid_data(
                "expected a membership certificate",
            ));
        }
        certificate.verify_signature()?;
        let key = certificate.duplicate_key();
        if self.memberships.contains_key(&key) {
            return Err(SecurityError::duplicate_certificate(format!(
                "membership with serial {} from this issuer is already installed",
                certificate.tbs.serial
            )));
        }
        debug!(serial = certificate.tbs.serial, "membership installed");
        self.memberships.insert(key, certificate);
        Ok(())
    }

    /// Replace the installed policy; the new serial number must strictly
    /// exceed the one in force.
    pub fn update_policy(&mut self, policy_xml: &str) -> Result<()> {
        let incoming = Policy::parse(policy_xml)?;
        let current = self.policy.as_ref().map_or(0, |p| p.serial_number);
        if incoming.serial_number <= current {
            return Err(SecurityError::policy_not_newer(format!(
                "serial {} does not exceed installed serial {current}",
                incoming.serial_number
            )));
        }
        info!(
            old_serial = current,
            new_serial = incoming.serial_number,
            "policy updated"
        );
        self.policy = Some(incoming);
        Ok(())
    }

    /// Discard the installed policy, reverting to the default. State stays
    /// claimed.
    pub fn reset_policy(&mut self) {
        info!("policy reset to default");
        self.policy = None;
    }

    /// Replace the identity certificate chain and signed manifests.
    /// Identity and policy are independent axes: this never touches the
    /// policy.
    pub fn update_identity(
        &mut self,
        identity_chain_pem: &str,
        signed_manifests: &[String],
    ) -> Result<()> {
        let (chain, manifests) = validate_identity(identity_chain_pem, signed_manifests, None)?;
        self.identity_chain = chain;
        self.manifests = manifests;
        debug!("identity certificate chain replaced");
        Ok(())
    }

    /// Factory reset: discard policy, trust anchors, identity, and
    /// memberships, close any open management bracket, and return to
    /// claimable.
    pub fn reset(&mut self) {
        info!("factory reset to claimable");
        self.policy = None;
        self.trust_anchors.clear();
        self.identity_chain.clear();
        self.manifests.clear();
        self.memberships.clear();
        self.management.clear();
        self.state = ApplicationState::Claimable;
    }
}

/// Parse and validate an identity chain with its signed manifests.
///
/// The leaf certificate's thumbprint must match the subject bound into at
/// least one signed manifest; when `authority` is given, matching
/// manifests must also carry its signature.
fn validate_identity(
    identity_chain_pem: &str,
    signed_manifests: &[String],
    authority: Option<&PublicKey>,
) -> Result<(Vec<Certificate>, Vec<SignedManifest>)> {
    let chain = Certificate::chain_from_pem(identity_chain_pem)?;
    verify_chain(&chain)?;
    if signed_manifests.is_empty() {
        return Err(SecurityError::invalid_data(
            "at least one signed manifest is required",
        ));
    }

    let manifests = signed_manifests
        .iter()
        .map(|xml| SignedManifest::parse(xml))
        .collect::<Result<Vec<_>>>()?;

    // Chain is non-empty after verify_chain.
    let leaf = &chain[0];
    let leaf_thumbprint = leaf.thumbprint();
    let mut bound = false;
    for manifest in &manifests {
        if manifest.thumbprint == leaf_thumbprint {
            if let Some(authority) = authority {
                manifest.verify(leaf, authority)?;
            }
            bound = true;
        }
    }
    if !bound {
        return Err(SecurityError::unknown_certificate(
            "identity certificate thumbprint does not match any signed manifest",
        ));
    }

    Ok((chain, manifests))
}
