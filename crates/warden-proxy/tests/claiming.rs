//! Claiming lifecycle over the in-process transport.

use assert_matches::assert_matches;
use std::sync::Arc;
use warden_core::protocol::PeerCredentials;
use warden_core::{ApplicationState, ClaimCapabilities, PeerAddress, SecurityError};
use warden_proxy::{sign_manifest, SecurityProxy};
use warden_testkit::{
    generate_keypair, host_claimable, Authority, InProcessBus, ALLOW_ALL_TEMPLATE,
};

fn proxy_for(bus: &InProcessBus, target: &PeerAddress, credentials: PeerCredentials) -> SecurityProxy {
    SecurityProxy::new(Arc::new(bus.clone()), target.clone(), credentials)
}

fn anonymous() -> PeerCredentials {
    PeerCredentials::new(generate_keypair().public_key().to_pem())
}

#[tokio::test]
async fn claim_binds_application_to_authority() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let app = host_claimable(&bus, &target).await;
    let authority = Authority::generate();
    let proxy = proxy_for(&bus, &target, anonymous());

    assert_eq!(
        proxy.get_application_state().await.unwrap(),
        ApplicationState::Claimable
    );

    let (ca, chain, group_id, group_authority, manifests) =
        authority.claim_args(app.public_key());
    proxy
        .claim(&ca, &chain, &group_id, &group_authority, &manifests)
        .await
        .unwrap();

    assert_eq!(
        proxy.get_application_state().await.unwrap(),
        ApplicationState::Claimed
    );

    // A second claim must go through factory reset first.
    let denied = proxy
        .claim(&ca, &chain, &group_id, &group_authority, &manifests)
        .await;
    assert_matches!(denied, Err(SecurityError::PermissionDenied { .. }));
}

#[tokio::test]
async fn claim_validates_group_identifier_length() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let app = host_claimable(&bus, &target).await;
    let authority = Authority::generate();
    let proxy = proxy_for(&bus, &target, anonymous());

    let (ca, chain, _, group_authority, manifests) = authority.claim_args(app.public_key());
    for bad in [&[0u8; 15][..], &[0u8; 17][..], &[][..]] {
        let result = proxy
            .claim(&ca, &chain, bad, &group_authority, &manifests)
            .await;
        assert_matches!(result, Err(SecurityError::InvalidGroupIdentifier { .. }));
    }

    // Content is unconstrained; all-zero bytes of the right length pass.
    proxy
        .claim(&ca, &chain, &[0u8; 16], &group_authority, &manifests)
        .await
        .unwrap();
}

#[tokio::test]
async fn claim_rejects_unreadable_authority_keys() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let app = host_claimable(&bus, &target).await;
    let authority = Authority::generate();
    let proxy = proxy_for(&bus, &target, anonymous());

    let (ca, chain, group_id, group_authority, manifests) =
        authority.claim_args(app.public_key());

    // A private key PEM where a public key belongs is invalid data, not a
    // parse crash.
    let private_pem = authority.ca.private_key().to_pem();
    let result = proxy
        .claim(&private_pem, &chain, &group_id, &group_authority, &manifests)
        .await;
    assert_matches!(result, Err(SecurityError::InvalidData { .. }));

    let result = proxy
        .claim(&ca, &chain, &group_id, "not a key", &manifests)
        .await;
    assert_matches!(result, Err(SecurityError::InvalidData { .. }));
}

#[tokio::test]
async fn claim_requires_manifest_bound_to_identity() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let app = host_claimable(&bus, &target).await;
    let authority = Authority::generate();
    let proxy = proxy_for(&bus, &target, anonymous());

    let (ca, chain, group_id, group_authority, _) = authority.claim_args(app.public_key());

    // Manifest signed for a different subject's certificate.
    let stranger = generate_keypair();
    let (_, foreign_manifests) = authority.identity_for(stranger.public_key());
    let result = proxy
        .claim(&ca, &chain, &group_id, &group_authority, &foreign_manifests)
        .await;
    assert_matches!(result, Err(SecurityError::UnknownCertificate { .. }));

    // No manifests at all.
    let result = proxy
        .claim(&ca, &chain, &group_id, &group_authority, &[])
        .await;
    assert_matches!(result, Err(SecurityError::InvalidData { .. }));

    // Schema-invalid manifest document.
    let result = proxy
        .claim(
            &ca,
            &chain,
            &group_id,
            &group_authority,
            &["<manifest><bogus/></manifest>".to_owned()],
        )
        .await;
    assert_matches!(result, Err(SecurityError::MalformedDocument { .. }));
}

#[tokio::test]
async fn queries_are_available_before_claiming() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let app = host_claimable(&bus, &target).await;
    let proxy = proxy_for(&bus, &target, anonymous());

    assert_eq!(
        proxy.get_manifest_template().await.unwrap(),
        ALLOW_ALL_TEMPLATE
    );
    assert_eq!(
        proxy.get_ecc_public_key().await.unwrap(),
        app.public_key().to_pem()
    );
    assert_eq!(
        proxy.get_claim_capabilities().await.unwrap(),
        ClaimCapabilities::default()
    );
    assert_eq!(
        proxy.get_claim_capabilities_additional_info().await.unwrap(),
        0
    );
}

#[tokio::test]
async fn signing_rejects_mismatched_key_material() {
    let authority = Authority::generate();
    let subject = generate_keypair();
    let identity_pem = {
        let (chain, _) = authority.identity_for(subject.public_key());
        chain
    };

    // A public key PEM handed to the signer where a private key belongs.
    let result = sign_manifest(
        ALLOW_ALL_TEMPLATE,
        &identity_pem,
        &authority.ca.public_key().to_pem(),
    );
    assert_matches!(result, Err(SecurityError::InvalidData { .. }));
}
