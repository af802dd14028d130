//! Management operations: the exclusive bracket, policy updates,
//! memberships, identity rotation, and factory reset.

use assert_matches::assert_matches;
use std::sync::Arc;
use warden_core::protocol::PeerCredentials;
use warden_core::{ApplicationState, KeyPair, PeerAddress, SecurityError};
use warden_proxy::SecurityProxy;
use warden_testkit::{
    generate_keypair, host_claimable, issue_membership, policy_with_serial, Authority,
    InProcessBus,
};

struct Deployment {
    bus: InProcessBus,
    target: PeerAddress,
    authority: Authority,
    admin_key: KeyPair,
}

/// A claimed application plus an admin keypair belonging to its security
/// group.
async fn claimed_deployment() -> Deployment {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let app = host_claimable(&bus, &target).await;
    let authority = Authority::generate();

    let claimer = SecurityProxy::new(
        Arc::new(bus.clone()),
        target.clone(),
        PeerCredentials::new(authority.ca.public_key().to_pem()),
    );
    let (ca, chain, group_id, group_authority, manifests) =
        authority.claim_args(app.public_key());
    claimer
        .claim(&ca, &chain, &group_id, &group_authority, &manifests)
        .await
        .unwrap();

    Deployment {
        bus,
        target,
        authority,
        admin_key: generate_keypair(),
    }
}

impl Deployment {
    fn admin(&self) -> SecurityProxy {
        SecurityProxy::new(
            Arc::new(self.bus.clone()),
            self.target.clone(),
            self.authority.admin_credentials(&self.admin_key),
        )
    }

    fn bystander(&self) -> SecurityProxy {
        SecurityProxy::new(
            Arc::new(self.bus.clone()),
            self.target.clone(),
            PeerCredentials::new(generate_keypair().public_key().to_pem()),
        )
    }
}

#[tokio::test]
async fn management_bracket_is_exclusive() {
    let deployment = claimed_deployment().await;
    let admin = deployment.admin();

    assert_matches!(
        admin.end_management().await,
        Err(SecurityError::ManagementNotStarted)
    );

    admin.start_management().await.unwrap();
    assert_matches!(
        admin.start_management().await,
        Err(SecurityError::ManagementAlreadyStarted)
    );

    admin.end_management().await.unwrap();
    // A closed bracket can always be reopened.
    admin.start_management().await.unwrap();
}

#[tokio::test]
async fn management_requires_admin_membership() {
    let deployment = claimed_deployment().await;
    let bystander = deployment.bystander();

    assert_matches!(
        bystander.start_management().await,
        Err(SecurityError::PermissionDenied { .. })
    );
    assert_matches!(
        bystander
            .update_policy(&policy_with_serial(1))
            .await,
        Err(SecurityError::PermissionDenied { .. })
    );
    assert_matches!(
        bystander.reset().await,
        Err(SecurityError::PermissionDenied { .. })
    );
    assert_matches!(
        bystander.get_policy().await,
        Err(SecurityError::PermissionDenied { .. })
    );

    // A membership in some other group does not qualify.
    let outsider_key = generate_keypair();
    let foreign = Authority::generate();
    let outsider = SecurityProxy::new(
        Arc::new(deployment.bus.clone()),
        deployment.target.clone(),
        foreign.admin_credentials(&outsider_key),
    );
    assert_matches!(
        outsider.start_management().await,
        Err(SecurityError::PermissionDenied { .. })
    );
}

#[tokio::test]
async fn policy_updates_follow_serial_ordering() {
    let deployment = claimed_deployment().await;
    let admin = deployment.admin();

    admin.update_policy(&policy_with_serial(100)).await.unwrap();
    assert_matches!(
        admin.update_policy(&policy_with_serial(100)).await,
        Err(SecurityError::PolicyNotNewer { .. })
    );
    assert_matches!(
        admin.update_policy(&policy_with_serial(50)).await,
        Err(SecurityError::PolicyNotNewer { .. })
    );
    admin.update_policy(&policy_with_serial(200)).await.unwrap();

    let installed = admin.get_policy().await.unwrap();
    assert!(installed.contains("<serialNumber>200</serialNumber>"));

    // Reverting to the default clears the serial floor.
    admin.reset_policy().await.unwrap();
    let effective = admin.get_policy().await.unwrap();
    assert!(effective.contains("<serialNumber>0</serialNumber>"));
    admin.update_policy(&policy_with_serial(1)).await.unwrap();
}

#[tokio::test]
async fn default_policy_reflects_trust_anchor() {
    let deployment = claimed_deployment().await;
    let bystander = deployment.bystander();

    let default = bystander.get_default_policy().await.unwrap();
    assert!(default.contains("<serialNumber>0</serialNumber>"));
    assert!(default.contains("WITH_MEMBERSHIP"));
    assert!(default.contains(&deployment.authority.group.to_string()));
}

#[tokio::test]
async fn membership_installation_rejects_duplicates() {
    let deployment = claimed_deployment().await;
    let admin = deployment.admin();

    let holder = generate_keypair();
    let certificate = issue_membership(
        holder.public_key(),
        &deployment.authority.group_authority,
        deployment.authority.group,
        42,
    );
    let pem = certificate.to_pem().unwrap();

    admin.install_membership(&pem).await.unwrap();
    assert_matches!(
        admin.install_membership(&pem).await,
        Err(SecurityError::DuplicateCertificate { .. })
    );

    // Same issuer, different serial is a distinct certificate.
    let other = issue_membership(
        holder.public_key(),
        &deployment.authority.group_authority,
        deployment.authority.group,
        43,
    );
    admin
        .install_membership(&other.to_pem().unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn membership_installation_requires_claimed_state() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    host_claimable(&bus, &target).await;
    let authority = Authority::generate();

    let proxy = SecurityProxy::new(
        Arc::new(bus.clone()),
        target.clone(),
        PeerCredentials::new(generate_keypair().public_key().to_pem()),
    );
    let holder = generate_keypair();
    let certificate =
        issue_membership(holder.public_key(), &authority.group_authority, authority.group, 1);
    assert_matches!(
        proxy.install_membership(&certificate.to_pem().unwrap()).await,
        Err(SecurityError::PermissionDenied { .. })
    );
}

#[tokio::test]
async fn identity_rotation_leaves_policy_untouched() {
    let deployment = claimed_deployment().await;
    let admin = deployment.admin();

    admin.update_policy(&policy_with_serial(7)).await.unwrap();

    let fresh = generate_keypair();
    let (chain, manifests) = deployment.authority.identity_for(fresh.public_key());
    admin.update_identity(&chain, &manifests).await.unwrap();

    let policy = admin.get_policy().await.unwrap();
    assert!(policy.contains("<serialNumber>7</serialNumber>"));
}

#[tokio::test]
async fn factory_reset_returns_to_claimable() {
    let deployment = claimed_deployment().await;
    let admin = deployment.admin();

    admin.update_policy(&policy_with_serial(9)).await.unwrap();
    admin.start_management().await.unwrap();
    admin.reset().await.unwrap();

    assert_eq!(
        admin.get_application_state().await.unwrap(),
        ApplicationState::Claimable
    );
    // Management is no longer reachable: the trust anchor is gone.
    assert_matches!(
        admin.start_management().await,
        Err(SecurityError::PermissionDenied { .. })
    );
}

#[tokio::test]
async fn unknown_target_fails_on_first_use_only() {
    let bus = InProcessBus::new();
    // Binding to a nonexistent target succeeds.
    let proxy = SecurityProxy::new(
        Arc::new(bus),
        PeerAddress::new("nobody"),
        PeerCredentials::new(generate_keypair().public_key().to_pem()),
    );
    assert_matches!(
        proxy.get_application_state().await,
        Err(SecurityError::AuthenticationFailure { .. })
    );
}
