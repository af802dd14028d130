//! State-change signal delivery.

use std::sync::Arc;
use std::time::Duration;
use warden_core::protocol::PeerCredentials;
use warden_core::{NotificationKind, PeerAddress};
use warden_proxy::{CallOptions, SecurityProxy};
use warden_testkit::{
    generate_keypair, host_claimable, policy_with_serial, Authority, InProcessBus,
};

const WAIT: Duration = Duration::from_millis(2000);

async fn claimed_admin_proxy(bus: &InProcessBus, target: &PeerAddress) -> SecurityProxy {
    let app = host_claimable(bus, target).await;
    let authority = Authority::generate();

    let admin_key = generate_keypair();
    let proxy = SecurityProxy::new(
        Arc::new(bus.clone()),
        target.clone(),
        authority.admin_credentials(&admin_key),
    );
    let (ca, chain, group_id, group_authority, manifests) =
        authority.claim_args(app.public_key());
    proxy
        .claim(&ca, &chain, &group_id, &group_authority, &manifests)
        .await
        .unwrap();
    proxy
}

#[tokio::test]
async fn policy_and_management_transitions_emit_signals() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let proxy = claimed_admin_proxy(&bus, &target).await;
    let mut listener = proxy.listen().await.unwrap();

    proxy.update_policy(&policy_with_serial(1)).await.unwrap();
    assert!(listener.wait_for(NotificationKind::PolicyChanged, WAIT).await);

    proxy.start_management().await.unwrap();
    assert!(
        listener
            .wait_for(NotificationKind::ManagementStarted, WAIT)
            .await
    );

    proxy.end_management().await.unwrap();
    assert!(
        listener
            .wait_for(NotificationKind::ManagementEnded, WAIT)
            .await
    );

    proxy.reset_policy().await.unwrap();
    assert!(listener.wait_for(NotificationKind::PolicyChanged, WAIT).await);

    proxy.reset().await.unwrap();
    assert!(listener.wait_for(NotificationKind::FactoryReset, WAIT).await);
}

#[tokio::test]
async fn identity_rotation_is_silent() {
    let bus = InProcessBus::new();
    let target = PeerAddress::new("app-1");
    let proxy = claimed_admin_proxy(&bus, &target).await;
    let mut listener = proxy.listen().await.unwrap();

    let authority = Authority::generate();
    let fresh = generate_keypair();
    let (chain, manifests) = authority.identity_for(fresh.public_key());
    proxy.update_identity(&chain, &manifests).await.unwrap();

    // No signal kind corresponds to an identity update.
    let mut observed_any = false;
    for kind in [
        NotificationKind::PolicyChanged,
        NotificationKind::FactoryReset,
        NotificationKind::ManagementStarted,
        NotificationKind::ManagementEnded,
    ] {
        observed_any |= listener.wait_for(kind, Duration::from_millis(50)).await;
    }
    assert!(!observed_any);
}

#[tokio::test]
async fn stalled_transport_surfaces_as_authentication_failure() {
    use async_trait::async_trait;
    use tokio::sync::broadcast;
    use warden_core::protocol::{CallResult, Request};
    use warden_core::{Result, SecurityError};
    use warden_proxy::SecureSession;

    struct BlackHole;

    #[async_trait]
    impl SecureSession for BlackHole {
        async fn call(
            &self,
            _target: &PeerAddress,
            _caller: &PeerCredentials,
            _request: Request,
        ) -> CallResult {
            std::future::pending().await
        }

        async fn notifications(
            &self,
            _target: &PeerAddress,
        ) -> Result<broadcast::Receiver<NotificationKind>> {
            std::future::pending().await
        }
    }

    let proxy = SecurityProxy::new(
        Arc::new(BlackHole),
        PeerAddress::new("app-1"),
        PeerCredentials::new(generate_keypair().public_key().to_pem()),
    )
    .with_options(CallOptions {
        timeout: Duration::from_millis(20),
    });

    let result = proxy.get_application_state().await;
    assert!(matches!(
        result,
        Err(SecurityError::AuthenticationFailure { .. })
    ));
}
