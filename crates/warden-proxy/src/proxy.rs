//! Per-application security proxy
//!
//! A proxy binds a target address, the caller's credentials, and a secure
//! session into one handle with a method per protocol operation. Binding
//! is local bookkeeping and never fails; whether the target is reachable
//! only surfaces when an operation is invoked. Every call is bounded by a
//! timeout, and an expired timeout is indistinguishable from any other
//! failure to use the channel.

use crate::notifications::NotificationListener;
use crate::transport::SecureSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warden_core::protocol::{PeerCredentials, Reply, Request};
use warden_core::{ApplicationState, ClaimCapabilities, PeerAddress, Result, SecurityError};

/// Per-call tuning.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// How long to wait for a reply before giving up on the channel.
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2000),
        }
    }
}

/// Client-side handle to the security surface of one remote application.
#[derive(Clone)]
pub struct SecurityProxy {
    session: Arc<dyn SecureSession>,
    target: PeerAddress,
    credentials: PeerCredentials,
    options: CallOptions,
}

impl SecurityProxy {
    /// Bind a proxy to the application at `target`.
    pub fn new(
        session: Arc<dyn SecureSession>,
        target: PeerAddress,
        credentials: PeerCredentials,
    ) -> Self {
        Self {
            session,
            target,
            credentials,
            options: CallOptions::default(),
        }
    }

    /// Replace the default call options.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// The address this proxy is bound to.
    pub fn target(&self) -> &PeerAddress {
        &self.target
    }

    async fn call(&self, request: Request) -> Result<Reply> {
        debug!(target = %self.target, op = request.name(), "proxy call");
        tokio::time::timeout(
            self.options.timeout,
            self.session.call(&self.target, &self.credentials, request),
        )
        .await
        .map_err(|_| SecurityError::authentication_failure("call timed out"))?
    }

    async fn call_ok(&self, request: Request) -> Result<()> {
        match self.call(request).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Bind the application to a security authority.
    ///
    /// The group identifier travels as raw bytes; the application, not
    /// this proxy, decides whether its length is acceptable.
    pub async fn claim(
        &self,
        certificate_authority_pem: &str,
        identity_certificate_chain_pem: &str,
        group_id: &[u8],
        group_authority_pem: &str,
        signed_manifests: &[String],
    ) -> Result<()> {
        self.call_ok(Request::Claim {
            certificate_authority: certificate_authority_pem.to_owned(),
            identity_certificate_chain: identity_certificate_chain_pem.to_owned(),
            group_id: group_id.to_vec(),
            group_authority: group_authority_pem.to_owned(),
            signed_manifests: signed_manifests.to_vec(),
        })
        .await
    }

    /// Install a membership certificate (PEM).
    pub async fn install_membership(&self, certificate_pem: &str) -> Result<()> {
        self.call_ok(Request::InstallMembership {
            certificate: certificate_pem.to_owned(),
        })
        .await
    }

    /// Open the exclusive management bracket.
    pub async fn start_management(&self) -> Result<()> {
        self.call_ok(Request::StartManagement).await
    }

    /// Close the management bracket.
    pub async fn end_management(&self) -> Result<()> {
        self.call_ok(Request::EndManagement).await
    }

    /// Install a policy with a strictly newer serial number.
    pub async fn update_policy(&self, policy_xml: &str) -> Result<()> {
        self.call_ok(Request::UpdatePolicy {
            policy: policy_xml.to_owned(),
        })
        .await
    }

    /// Discard the installed policy, reverting to the default.
    pub async fn reset_policy(&self) -> Result<()> {
        self.call_ok(Request::ResetPolicy).await
    }

    /// Replace the identity certificate chain and its signed manifests.
    pub async fn update_identity(
        &self,
        identity_certificate_chain_pem: &str,
        signed_manifests: &[String],
    ) -> Result<()> {
        self.call_ok(Request::UpdateIdentity {
            identity_certificate_chain: identity_certificate_chain_pem.to_owned(),
            signed_manifests: signed_manifests.to_vec(),
        })
        .await
    }

    /// Factory reset the application to claimable.
    pub async fn reset(&self) -> Result<()> {
        self.call_ok(Request::Reset).await
    }

    /// Query the application lifecycle state.
    pub async fn get_application_state(&self) -> Result<ApplicationState> {
        match self.call(Request::GetApplicationState).await? {
            Reply::State(state) => Ok(state),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Query the supported claim mechanisms.
    pub async fn get_claim_capabilities(&self) -> Result<ClaimCapabilities> {
        match self.call(Request::GetClaimCapabilities).await? {
            Reply::Capabilities(caps) => Ok(caps),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Query the auxiliary claim-capability flags.
    pub async fn get_claim_capabilities_additional_info(&self) -> Result<u16> {
        match self.call(Request::GetClaimCapabilitiesAdditionalInfo).await? {
            Reply::CapabilitiesInfo(info) => Ok(info),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Query the manifest template, verbatim as the application holds it.
    pub async fn get_manifest_template(&self) -> Result<String> {
        match self.call(Request::GetManifestTemplate).await? {
            Reply::ManifestTemplate(xml) => Ok(xml),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Query the application's elliptic-curve public key (PEM).
    pub async fn get_ecc_public_key(&self) -> Result<String> {
        match self.call(Request::GetEccPublicKey).await? {
            Reply::EccPublicKey(pem) => Ok(pem),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Query the default policy derived from the trust anchors.
    pub async fn get_default_policy(&self) -> Result<String> {
        match self.call(Request::GetDefaultPolicy).await? {
            Reply::Policy(xml) => Ok(xml),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Query the effective policy. Requires admin-group membership.
    pub async fn get_policy(&self) -> Result<String> {
        match self.call(Request::GetPolicy).await? {
            Reply::Policy(xml) => Ok(xml),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Open a listener for the application's state-change signals.
    pub async fn listen(&self) -> Result<NotificationListener> {
        let receiver = self.session.notifications(&self.target).await?;
        Ok(NotificationListener::new(receiver))
    }
}

fn unexpected_reply(reply: &Reply) -> SecurityError {
    SecurityError::invalid_data(format!("unexpected reply variant: {reply:?}"))
}
