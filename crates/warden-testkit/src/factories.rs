//! Key, certificate, and document factories

use crate::bus::InProcessBus;
use warden_core::protocol::PeerCredentials;
use warden_core::{GroupId, KeyPair, PeerAddress, PublicKey};
use warden_credentials::{sign_manifest, Certificate, CertificateKind, TbsCertificate};
use warden_store::ApplicationRecord;

/// A manifest template granting every action on one wildcard method.
pub const ALLOW_ALL_TEMPLATE: &str = concat!(
    "<manifest>",
    "<node>",
    "<interface>",
    "<method>",
    "<annotation name=\"org.alljoyn.Bus.Action\" value=\"Modify\"/>",
    "</method>",
    "</interface>",
    "</node>",
    "</manifest>"
);

/// A minimal valid policy document with the given serial number.
pub fn policy_with_serial(serial: u32) -> String {
    format!(
        concat!(
            "<policy>",
            "<policyVersion>1</policyVersion>",
            "<serialNumber>{}</serialNumber>",
            "<acls>",
            "<acl>",
            "<peers><peer><type>ALL</type></peer></peers>",
            "<rules>",
            "<node>",
            "<interface>",
            "<method>",
            "<annotation name=\"org.alljoyn.Bus.Action\" value=\"Modify\"/>",
            "</method>",
            "</interface>",
            "</node>",
            "</rules>",
            "</acl>",
            "</acls>",
            "</policy>"
        ),
        serial
    )
}

/// A fresh Ed25519 keypair.
pub fn generate_keypair() -> KeyPair {
    KeyPair::generate(&mut rand::thread_rng())
}

/// Issue an identity certificate for `subject`, signed by `issuer`.
pub fn issue_identity(subject: PublicKey, issuer: &KeyPair, serial: u64) -> Certificate {
    issue(CertificateKind::Identity, serial, subject, issuer, None)
}

/// Issue a membership certificate for `subject` in `group`, signed by
/// `issuer`.
pub fn issue_membership(
    subject: PublicKey,
    issuer: &KeyPair,
    group: GroupId,
    serial: u64,
) -> Certificate {
    issue(CertificateKind::Membership, serial, subject, issuer, Some(group))
}

fn issue(
    kind: CertificateKind,
    serial: u64,
    subject: PublicKey,
    issuer: &KeyPair,
    group: Option<GroupId>,
) -> Certificate {
    let tbs = TbsCertificate {
        kind,
        serial,
        subject,
        issuer: issuer.public_key(),
        group,
    };
    let signature = issuer.private_key().sign(&tbs.to_bytes().unwrap());
    Certificate::new(tbs, signature)
}

/// Host a claimable application with the allow-all template and return its
/// keypair.
pub async fn host_claimable(bus: &InProcessBus, address: &PeerAddress) -> KeyPair {
    let app = generate_keypair();
    let record = ApplicationRecord::new(app.public_key(), ALLOW_ALL_TEMPLATE).unwrap();
    bus.host(address.clone(), record).await;
    app
}

/// A security authority: certificate authority, security group, and the
/// group's issuing key.
pub struct Authority {
    pub ca: KeyPair,
    pub group_authority: KeyPair,
    pub group: GroupId,
}

impl Authority {
    /// Generate a fresh authority with an arbitrary fixed group id.
    pub fn generate() -> Self {
        Self {
            ca: generate_keypair(),
            group_authority: generate_keypair(),
            group: GroupId::new(&[0u8; 16]).unwrap(),
        }
    }

    /// Mint an identity chain (single certificate) and matching signed
    /// manifest for `subject`, signed under the certificate authority.
    pub fn identity_for(&self, subject: PublicKey) -> (String, Vec<String>) {
        let identity = issue_identity(subject, &self.ca, 1);
        let chain_pem = identity.to_pem().unwrap();
        let manifest =
            sign_manifest(ALLOW_ALL_TEMPLATE, &chain_pem, &self.ca.private_key().to_pem())
                .unwrap();
        (chain_pem, vec![manifest])
    }

    /// Credentials for an admin: a member of this authority's security
    /// group, as established at claim time.
    pub fn admin_credentials(&self, admin: &KeyPair) -> PeerCredentials {
        let membership =
            issue_membership(admin.public_key(), &self.group_authority, self.group, 1);
        PeerCredentials {
            public_key: admin.public_key().to_pem(),
            memberships: vec![membership.to_pem().unwrap()],
        }
    }

    /// The arguments a claim call needs, in call order: CA key PEM, chain
    /// PEM, group id bytes, group authority key PEM, signed manifests.
    pub fn claim_args(&self, subject: PublicKey) -> (String, String, Vec<u8>, String, Vec<String>) {
        let (chain, manifests) = self.identity_for(subject);
        (
            self.ca.public_key().to_pem(),
            chain,
            self.group.as_bytes().to_vec(),
            self.group_authority.public_key().to_pem(),
            manifests,
        )
    }
}
