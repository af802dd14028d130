//! Authority-side request dispatch
//!
//! The store hosts every application record this process answers for and
//! funnels all protocol requests through one dispatch point. Dispatch
//! resolves the target, enforces the admin gate for management operations,
//! applies the transition under the store lock, and emits the matching
//! notification after the transition commits.

use crate::application::ApplicationRecord;
use crate::events::Notifier;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use warden_core::protocol::{CallResult, NotificationKind, PeerCredentials, Reply, Request};
use warden_core::{PeerAddress, PublicKey, Result, SecurityError};
use warden_credentials::{Certificate, CertificateKind};

/// Tuning for hosted applications.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Broadcast buffer depth for each application's notification channel.
    pub notification_buffer: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            notification_buffer: 32,
        }
    }
}

struct Hosted {
    record: ApplicationRecord,
    notifier: Notifier,
}

/// All application records this authority process answers for, keyed by
/// peer address. Every mutation happens under the write lock, which is
/// what makes the management bracket and the policy serial check race-free
/// across concurrent callers.
pub struct AuthorityStore {
    config: HostConfig,
    apps: RwLock<HashMap<PeerAddress, Hosted>>,
}

impl AuthorityStore {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            apps: RwLock::new(HashMap::new()),
        }
    }

    /// Begin hosting an application record under the given address.
    /// Replaces any record previously hosted there.
    pub async fn host(&self, address: PeerAddress, record: ApplicationRecord) {
        let notifier = Notifier::new(self.config.notification_buffer);
        debug!(address = %address, "hosting application");
        self.apps
            .write()
            .await
            .insert(address, Hosted { record, notifier });
    }

    /// Whether an application is hosted at the address.
    pub async fn contains(&self, address: &PeerAddress) -> bool {
        self.apps.read().await.contains_key(address)
    }

    /// Clone the record hosted at the address, for inspection outside the
    /// protocol surface.
    pub async fn snapshot(&self, address: &PeerAddress) -> Result<ApplicationRecord> {
        let apps = self.apps.read().await;
        let hosted = apps.get(address).ok_or_else(|| unknown_target(address))?;
        Ok(hosted.record.clone())
    }

    /// Subscribe to the notification stream of a hosted application.
    pub async fn subscribe(
        &self,
        address: &PeerAddress,
    ) -> Result<broadcast::Receiver<NotificationKind>> {
        let apps = self.apps.read().await;
        let hosted = apps
            .get(address)
            .ok_or_else(|| unknown_target(address))?;
        Ok(hosted.notifier.subscribe())
    }

    /// Apply one protocol request to the application hosted at `target` on
    /// behalf of the authenticated caller.
    pub async fn dispatch(
        &self,
        target: &PeerAddress,
        caller: &PeerCredentials,
        request: Request,
    ) -> CallResult {
        debug!(target = %target, op = request.name(), "dispatch");
        let result = self.apply(target, caller, request).await;
        if let Err(err) = &result {
            warn!(target = %target, %err, "request refused");
        }
        result
    }

    async fn apply(
        &self,
        target: &PeerAddress,
        caller: &PeerCredentials,
        request: Request,
    ) -> CallResult {
        if is_query(&request) {
            let apps = self.apps.read().await;
            let hosted = apps.get(target).ok_or_else(|| unknown_target(target))?;
            return query(&hosted.record, caller, &request);
        }

        let mut apps = self.apps.write().await;
        let hosted = apps.get_mut(target).ok_or_else(|| unknown_target(target))?;
        let record = &mut hosted.record;

        let notification = match request {
            Request::Claim {
                certificate_authority,
                identity_certificate_chain,
                group_id,
                group_authority,
                signed_manifests,
            } => {
                record.claim(
                    &certificate_authority,
                    &identity_certificate_chain,
                    &group_id,
                    &group_authority,
                    &signed_manifests,
                )?;
                Some(NotificationKind::PolicyChanged)
            }
            Request::InstallMembership { certificate } => {
                record.install_membership(&certificate)?;
                None
            }
            Request::StartManagement => {
                require_admin(record, caller)?;
                record.management.start()?;
                Some(NotificationKind::ManagementStarted)
            }
            Request::EndManagement => {
                require_admin(record, caller)?;
                record.management.end()?;
                Some(NotificationKind::ManagementEnded)
            }
            Request::UpdatePolicy { policy } => {
                require_admin(record, caller)?;
                record.update_policy(&policy)?;
                Some(NotificationKind::PolicyChanged)
            }
            Request::ResetPolicy => {
                require_admin(record, caller)?;
                record.reset_policy();
                Some(NotificationKind::PolicyChanged)
            }
            Request::UpdateIdentity {
                identity_certificate_chain,
                signed_manifests,
            } => {
                require_admin(record, caller)?;
                record.update_identity(&identity_certificate_chain, &signed_manifests)?;
                None
            }
            Request::Reset => {
                require_admin(record, caller)?;
                record.reset();
                Some(NotificationKind::FactoryReset)
            }
            _ => unreachable!("query handled above"),
        };

        if let Some(kind) = notification {
            hosted.notifier.emit(kind);
        }
        Ok(Reply::Ok)
    }
}

fn is_query(request: &Request) -> bool {
    matches!(
        request,
        Request::GetApplicationState
            | Request::GetClaimCapabilities
            | Request::GetClaimCapabilitiesAdditionalInfo
            | Request::GetManifestTemplate
            | Request::GetEccPublicKey
            | Request::GetDefaultPolicy
            | Request::GetPolicy
    )
}

fn query(record: &ApplicationRecord, caller: &PeerCredentials, request: &Request) -> CallResult {
    match request {
        Request::GetApplicationState => Ok(Reply::State(record.state())),
        Request::GetClaimCapabilities => Ok(Reply::Capabilities(record.claim_capabilities())),
        Request::GetClaimCapabilitiesAdditionalInfo => {
            Ok(Reply::CapabilitiesInfo(record.claim_capabilities_additional_info()))
        }
        Request::GetManifestTemplate => {
            Ok(Reply::ManifestTemplate(record.manifest_template().to_owned()))
        }
        Request::GetEccPublicKey => Ok(Reply::EccPublicKey(record.public_key().to_pem())),
        Request::GetDefaultPolicy => Ok(Reply::Policy(record.default_policy().to_xml()?)),
        Request::GetPolicy => {
            require_admin(record, caller)?;
            Ok(Reply::Policy(record.effective_policy().to_xml()?))
        }
        _ => unreachable!("not a query"),
    }
}

fn unknown_target(address: &PeerAddress) -> SecurityError {
    SecurityError::authentication_failure(format!(
        "no secure session with application `{address}`"
    ))
}

/// Admin gate for management operations.
///
/// The caller qualifies when it presents a membership certificate that is
/// issued by a trust-anchor authority for that anchor's group, names the
/// caller's own public key as subject, and carries a valid signature.
/// Anything else is a plain denial; the gate never reveals which check
/// failed.
fn require_admin(record: &ApplicationRecord, caller: &PeerCredentials) -> Result<()> {
    let caller_key = PublicKey::from_pem(&caller.public_key)
        .map_err(|_| SecurityError::authentication_failure("caller public key is unreadable"))?;

    for pem in &caller.memberships {
        let Ok(certificate) = Certificate::from_pem(pem) else {
            continue;
        };
        if certificate.tbs.kind != CertificateKind::Membership
            || certificate.tbs.subject != caller_key
            || certificate.verify_signature().is_err()
        {
            continue;
        }
        let admitted = record.trust_anchors().iter().any(|anchor| {
            certificate.tbs.group == Some(anchor.group)
                && certificate.tbs.issuer == anchor.authority
        });
        if admitted {
            return Ok(());
        }
    }
    Err(SecurityError::permission_denied(
        "caller is not a member of an administrative group",
    ))
}
