//! Service wiring for one client installation.

use crate::conversation::{ConversationSynchronizer, FlushReport};
use crate::identity::IdentityResolver;
use crate::principal::{PrincipalContext, PrincipalResolver};
use crate::scope::ScopeCache;
use anyhow::{Context, Result};
use chatstudy_core::clock::{Clock, SystemClock};
use chatstudy_core::config::StudyConfig;
use chatstudy_core::conversation::ConversationGateway;
use chatstudy_core::identity::{DurableStore, EnvironmentProbe, FingerprintDeriver};
use chatstudy_core::principal::Principal;
use chatstudy_infrastructure::logging;
use chatstudy_infrastructure::{
    ConfigStorage, FileKeyValueStore, HttpConversationGateway, InMemoryConversationGateway,
    InMemoryDurableStore, SqliteVault, StudyPaths,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// All client services, built from the files under a [`StudyPaths`] root.
///
/// Without a configured `remote.base_url` the client runs offline against
/// an in-memory conversation store.
pub struct StudyClient {
    config: StudyConfig,
    identity: Arc<IdentityResolver>,
    scope: Arc<ScopeCache>,
    conversations: Arc<ConversationSynchronizer>,
    principals: PrincipalContext,
    http: Option<Arc<HttpConversationGateway>>,
}

impl StudyClient {
    /// Loads configuration, installs logging and wires the services.
    ///
    /// Only an unreadable configuration is fatal. A vault that cannot be
    /// opened degrades identity durability to tier-1.
    pub fn open(paths: &StudyPaths, probe: Arc<dyn EnvironmentProbe>) -> Result<Self> {
        std::fs::create_dir_all(paths.base_dir())
            .with_context(|| format!("Failed to create {}", paths.base_dir().display()))?;
        let config = ConfigStorage::new(paths.config_file())
            .load()
            .context("Failed to load configuration")?;
        logging::init_tracing(&config.logging);

        Ok(Self::assemble(paths, probe, config, Arc::new(SystemClock)))
    }

    fn assemble(
        paths: &StudyPaths,
        probe: Arc<dyn EnvironmentProbe>,
        config: StudyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fast = Arc::new(FileKeyValueStore::new(paths.identity_file()));
        let durable: Arc<dyn DurableStore> = match SqliteVault::open(paths.vault_file()) {
            Ok(vault) => Arc::new(vault),
            Err(e) => {
                tracing::warn!(
                    "[StudyClient] Vault unavailable, identity kept in tier-1 only: {}",
                    e
                );
                Arc::new(InMemoryDurableStore::new())
            }
        };
        let identity = Arc::new(IdentityResolver::new(
            fast,
            durable,
            probe,
            FingerprintDeriver::new(&config.identity),
            clock.clone(),
        ));

        let scope = Arc::new(ScopeCache::new(Arc::new(FileKeyValueStore::new(
            paths.scope_file(),
        ))));

        let http = HttpConversationGateway::from_settings(&config.remote).map(Arc::new);
        let gateway: Arc<dyn ConversationGateway> = match &http {
            Some(http) => http.clone() as Arc<dyn ConversationGateway>,
            None => {
                tracing::info!("[StudyClient] No remote configured, running offline");
                Arc::new(InMemoryConversationGateway::new())
            }
        };

        let conversations = Arc::new(ConversationSynchronizer::new(
            gateway,
            scope.clone(),
            clock.clone(),
            &config.sync,
        ));
        let principals = PrincipalContext::new(
            identity.clone(),
            PrincipalResolver::new(clock),
            scope.clone(),
            conversations.clone(),
        );

        Self {
            config,
            identity,
            scope,
            conversations,
            principals,
            http,
        }
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<IdentityResolver> {
        &self.identity
    }

    pub fn scope(&self) -> &Arc<ScopeCache> {
        &self.scope
    }

    pub fn conversations(&self) -> &Arc<ConversationSynchronizer> {
        &self.conversations
    }

    pub fn principals(&self) -> &PrincipalContext {
        &self.principals
    }

    /// Activates the principal in `token` and attaches the token to remote
    /// calls if it was accepted.
    pub async fn sign_in(&self, token: &str) -> Principal {
        let principal = self.principals.activate_token(token).await;
        match principal.role() {
            Some(role) => tracing::info!("[StudyClient] Signed in as {:?}", role),
            None => tracing::info!("[StudyClient] Token rejected, continuing anonymously"),
        }
        if let Some(http) = &self.http {
            http.set_bearer_token((!principal.is_anonymous()).then(|| token.to_string()));
        }
        principal
    }

    pub async fn sign_out(&self) -> Principal {
        if let Some(http) = &self.http {
            http.set_bearer_token(None);
        }
        self.principals.logout().await
    }

    /// Starts the background debounce driver at the configured tick.
    pub fn start_sync_driver(&self) -> JoinHandle<()> {
        self.conversations
            .spawn_debounce_driver(self.config.sync.driver_tick())
    }

    /// Saves everything the active principal has not saved yet.
    pub async fn shutdown(&self) -> FlushReport {
        let active = self.principals.active().await;
        self.conversations.flush_all(active.id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scenario_environment;
    use chatstudy_core::conversation::Sender;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_identity_and_conversations_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StudyPaths::with_base(temp_dir.path().join("chatstudy"));

        let (principal, conversation_id) = {
            let client = StudyClient::open(&paths, Arc::new(scenario_environment())).unwrap();
            let principal = client.principals().active().await;
            let conversation = client
                .conversations()
                .create_conversation(principal.id(), "chat", "m", None)
                .await;
            client
                .conversations()
                .append_message(principal.id(), &conversation.id, Sender::Participant, "hi")
                .await
                .unwrap();
            assert_eq!(client.shutdown().await.saved, vec![conversation.id.clone()]);
            (principal, conversation.id)
        };

        let client = StudyClient::open(&paths, Arc::new(scenario_environment())).unwrap();
        let again = client.principals().active().await;
        assert_eq!(again, principal);
        let restored = client.conversations().conversations(again.id()).await;
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id, conversation_id);
        assert!(paths.vault_file().exists());
    }

    #[test]
    fn test_malformed_config_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StudyPaths::with_base(temp_dir.path());
        std::fs::write(paths.config_file(), "[remote\nbase_url =").unwrap();

        assert!(StudyClient::open(&paths, Arc::new(scenario_environment())).is_err());
    }

    #[test]
    fn test_offline_without_remote() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StudyPaths::with_base(temp_dir.path());

        let client = StudyClient::open(&paths, Arc::new(scenario_environment())).unwrap();
        assert!(client.http.is_none());
        assert_eq!(client.config().sync.debounce_ms, 1000);
    }
}
