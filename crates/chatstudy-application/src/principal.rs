//! Active principal management.

use crate::conversation::ConversationSynchronizer;
use crate::identity::IdentityResolver;
use crate::scope::ScopeCache;
use chatstudy_core::clock::Clock;
use chatstudy_core::identity::DeviceIdentity;
use chatstudy_core::principal::{Principal, decode_bearer_token};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Turns an optional bearer token into a principal.
///
/// The token payload is decoded locally without checking the signature.
/// A token that cannot be decoded or has expired yields the anonymous
/// participant instead of an error.
pub struct PrincipalResolver {
    clock: Arc<dyn Clock>,
}

impl PrincipalResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn resolve(&self, token: Option<&str>, device: &DeviceIdentity) -> Principal {
        let anonymous = || Principal::anonymous(device.value());
        let Some(token) = token else {
            return anonymous();
        };

        match decode_bearer_token(token) {
            Ok(claims) if claims.is_expired_at(self.clock.now()) => {
                tracing::info!(
                    "[PrincipalResolver] Token for {} expired, continuing anonymously",
                    claims.subject
                );
                anonymous()
            }
            Ok(claims) => claims.into_principal(),
            Err(e) => {
                tracing::warn!("[PrincipalResolver] Unusable token: {}", e);
                anonymous()
            }
        }
    }
}

/// Holds the active principal and performs the cache handover when it
/// changes.
///
/// Switching principal flushes and releases the previous principal's
/// conversation view, drops its in-memory cache entries and restores the
/// new principal's view from the local cache. Exactly one principal is
/// active at a time.
pub struct PrincipalContext {
    identity: Arc<IdentityResolver>,
    resolver: PrincipalResolver,
    scope: Arc<ScopeCache>,
    conversations: Arc<ConversationSynchronizer>,
    active: Mutex<Option<Principal>>,
}

impl PrincipalContext {
    pub fn new(
        identity: Arc<IdentityResolver>,
        resolver: PrincipalResolver,
        scope: Arc<ScopeCache>,
        conversations: Arc<ConversationSynchronizer>,
    ) -> Self {
        Self {
            identity,
            resolver,
            scope,
            conversations,
            active: Mutex::new(None),
        }
    }

    /// The active principal. Defaults to the anonymous participant.
    pub async fn active(&self) -> Principal {
        let mut active = self.active.lock().await;
        if let Some(principal) = active.as_ref() {
            return principal.clone();
        }

        let device = self.identity.resolve().await;
        let principal = self.resolver.resolve(None, &device);
        self.conversations.restore(principal.id()).await;
        tracing::info!("[PrincipalContext] Active principal: {}", principal);
        *active = Some(principal.clone());
        principal
    }

    /// Activates the principal carried by `token`. Falls back to the
    /// anonymous participant if the token is unusable.
    pub async fn activate_token(&self, token: &str) -> Principal {
        let device = self.identity.resolve().await;
        let principal = self.resolver.resolve(Some(token), &device);
        self.switch_to(principal).await
    }

    /// Returns to the anonymous participant and deletes everything cached
    /// for the principal that logged out.
    pub async fn logout(&self) -> Principal {
        let previous = self.active.lock().await.clone();
        let device = self.identity.resolve().await;
        let principal = self.switch_to(Principal::anonymous(device.value())).await;

        if let Some(previous) = previous.filter(|p| !p.is_anonymous()) {
            self.scope.clear(previous.id());
            tracing::info!("[PrincipalContext] Logged out {}", previous);
        }
        principal
    }

    /// Releases the active principal, wipes the scope cache and mints the
    /// device identity again. Only used on explicit user request.
    pub async fn reset_identity(&self) -> Principal {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.release(&previous).await;
        }

        self.scope.clear_all();
        let device = self.identity.reset().await;
        let principal = Principal::anonymous(device.value());
        tracing::info!("[PrincipalContext] Identity reset, active principal: {}", principal);
        *active = Some(principal.clone());
        principal
    }

    async fn switch_to(&self, next: Principal) -> Principal {
        let mut active = self.active.lock().await;
        if active.as_ref() == Some(&next) {
            return next;
        }

        if let Some(previous) = active.take() {
            self.release(&previous).await;
        }
        let restored = self.conversations.restore(next.id()).await;
        tracing::info!(
            "[PrincipalContext] Active principal: {} ({} cached conversations)",
            next,
            restored
        );
        *active = Some(next.clone());
        next
    }

    async fn release(&self, principal: &Principal) {
        let report = self.conversations.release_principal(principal.id()).await;
        if !report.failed.is_empty() {
            tracing::warn!(
                "[PrincipalContext] {} conversations of {} left unsaved",
                report.failed.len(),
                principal
            );
        }
        self.scope.release(principal.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SyncFixture, blank_environment, scenario_environment, t0};
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chatstudy_core::conversation::Sender;
    use chatstudy_core::identity::{EnvironmentProbe, FingerprintDeriver};
    use chatstudy_core::principal::ActorRole;
    use chatstudy_core::scope::EntityKind;
    use chatstudy_infrastructure::{InMemoryDurableStore, InMemoryKeyValueStore};
    use chrono::Duration;

    fn token(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(payload.as_bytes())
        )
    }

    fn context(fx: &SyncFixture, probe: impl EnvironmentProbe + 'static) -> PrincipalContext {
        let identity = Arc::new(IdentityResolver::new(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(InMemoryDurableStore::new()),
            Arc::new(probe),
            FingerprintDeriver::default(),
            Arc::new(fx.clock.clone()),
        ));
        PrincipalContext::new(
            identity,
            PrincipalResolver::new(Arc::new(fx.clock.clone())),
            fx.scope.clone(),
            fx.sync.clone(),
        )
    }

    #[test]
    fn test_resolver_reads_subject_and_role() {
        let resolver = PrincipalResolver::new(Arc::new(crate::test_support::manual_clock()));
        let device = DeviceIdentity::fingerprinted("abc");

        let principal = resolver.resolve(
            Some(&token(r#"{"sub":"r-42","role":"admin"}"#)),
            &device,
        );
        assert_eq!(principal, Principal::authenticated("r-42", ActorRole::Admin));
        assert_eq!(resolver.resolve(None, &device), Principal::anonymous("fp_abc"));
    }

    #[test]
    fn test_expired_or_garbled_token_falls_back_to_anonymous() {
        let resolver = PrincipalResolver::new(Arc::new(crate::test_support::manual_clock()));
        let device = DeviceIdentity::fingerprinted("abc");
        let expired = format!(
            r#"{{"sub":"r-42","exp":{}}}"#,
            (t0() - Duration::minutes(1)).timestamp()
        );

        assert!(resolver.resolve(Some(&token(&expired)), &device).is_anonymous());
        assert!(resolver.resolve(Some("not-a-token"), &device).is_anonymous());
    }

    #[tokio::test]
    async fn test_default_principal_is_anonymous_participant() {
        let fx = SyncFixture::new();
        let ctx = context(&fx, scenario_environment());

        let principal = ctx.active().await;
        assert!(principal.is_anonymous());
        assert!(principal.id().starts_with("fp_"));
        assert_eq!(ctx.active().await, principal);
    }

    #[tokio::test]
    async fn test_login_isolates_participant_state() {
        let fx = SyncFixture::new();
        let ctx = context(&fx, scenario_environment());
        let participant = ctx.active().await;
        fx.scope
            .write(participant.id(), EntityKind::Settings, &"participant-settings");

        let researcher = ctx
            .activate_token(&token(r#"{"sub":"researcher-1"}"#))
            .await;
        assert_eq!(researcher.id(), "researcher-1");
        assert_eq!(
            fx.scope.read::<String>(researcher.id(), EntityKind::Settings),
            None
        );
    }

    #[tokio::test]
    async fn test_switch_flushes_and_restores_conversations() {
        let fx = SyncFixture::new();
        let ctx = context(&fx, scenario_environment());
        let participant = ctx.active().await;

        let conversation = fx
            .sync
            .create_conversation(participant.id(), "chat", "m", None)
            .await;
        fx.sync
            .append_message(participant.id(), &conversation.id, Sender::Participant, "hi")
            .await
            .unwrap();

        ctx.activate_token(&token(r#"{"sub":"researcher-1"}"#)).await;
        assert!(fx.gateway.stored(participant.id(), &conversation.id).is_some());
        assert!(fx.sync.conversations(participant.id()).await.is_empty());

        let back = ctx.logout().await;
        assert_eq!(back, participant);
        assert_eq!(fx.sync.conversations(participant.id()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_logout_clears_researcher_cache() {
        let fx = SyncFixture::new();
        let ctx = context(&fx, scenario_environment());
        let researcher = ctx
            .activate_token(&token(r#"{"sub":"researcher-1"}"#))
            .await;
        fx.scope.write(researcher.id(), EntityKind::Tasks, &vec!["t1"]);

        ctx.logout().await;

        assert_eq!(
            fx.scope.read::<Vec<String>>("researcher-1", EntityKind::Tasks),
            None
        );
    }

    #[tokio::test]
    async fn test_reset_identity_wipes_scope_and_remints() {
        let fx = SyncFixture::new();
        let ctx = context(&fx, blank_environment());
        let before = ctx.active().await;
        fx.scope.write(before.id(), EntityKind::Settings, &"x");

        let after = ctx.reset_identity().await;

        assert_ne!(before.id(), after.id());
        assert!(after.id().starts_with("rand_"));
        assert_eq!(fx.scope.read::<String>(before.id(), EntityKind::Settings), None);
        assert_eq!(ctx.active().await, after);
    }
}
