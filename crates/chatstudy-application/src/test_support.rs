//! Shared fixtures for the service tests.

use async_trait::async_trait;
use chatstudy_core::clock::ManualClock;
use chatstudy_core::config::SyncSettings;
use chatstudy_core::conversation::{Conversation, ConversationGateway};
use chatstudy_core::error::Result;
use chatstudy_core::identity::{DeviceCharacteristics, StaticEnvironment};
use chatstudy_infrastructure::InMemoryConversationGateway;
use chatstudy_infrastructure::InMemoryKeyValueStore;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use crate::conversation::ConversationSynchronizer;
use crate::scope::ScopeCache;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(t0())
}

/// `{width:1920, height:1080, tz:"UTC", lang:"en-US", platform:"X", cores:8}`
pub fn scenario_environment() -> StaticEnvironment {
    StaticEnvironment(DeviceCharacteristics {
        screen_width: Some(1920),
        screen_height: Some(1080),
        timezone: Some("UTC".to_string()),
        languages: Some(vec!["en-US".to_string()]),
        platform: Some("X".to_string()),
        cpu_cores: Some(8),
        ..Default::default()
    })
}

/// An environment where nothing can be read.
pub fn blank_environment() -> StaticEnvironment {
    StaticEnvironment(DeviceCharacteristics::default())
}

pub struct SyncFixture {
    pub clock: ManualClock,
    pub gateway: Arc<InMemoryConversationGateway>,
    pub store: Arc<InMemoryKeyValueStore>,
    pub scope: Arc<ScopeCache>,
    pub sync: Arc<ConversationSynchronizer>,
}

impl SyncFixture {
    pub fn new() -> Self {
        let gateway = Arc::new(InMemoryConversationGateway::new());
        Self::with_gateway(gateway.clone(), gateway)
    }

    /// Builds the synchronizer against `remote`, keeping `gateway` around
    /// for call inspection.
    pub fn with_gateway(
        gateway: Arc<InMemoryConversationGateway>,
        remote: Arc<dyn ConversationGateway>,
    ) -> Self {
        let clock = manual_clock();
        let store = Arc::new(InMemoryKeyValueStore::new());
        let scope = Arc::new(ScopeCache::new(store.clone()));
        let sync = Arc::new(ConversationSynchronizer::new(
            remote,
            scope.clone(),
            Arc::new(clock.clone()),
            &SyncSettings::default(),
        ));
        Self {
            clock,
            gateway,
            store,
            scope,
            sync,
        }
    }

    /// A second synchronizer sharing this fixture's local store and remote,
    /// as after an application restart.
    pub fn restarted(&self) -> Arc<ConversationSynchronizer> {
        let scope = Arc::new(ScopeCache::new(self.store.clone()));
        Arc::new(ConversationSynchronizer::new(
            self.gateway.clone(),
            scope,
            Arc::new(self.clock.clone()),
            &SyncSettings::default(),
        ))
    }
}

/// Gateway whose `save` blocks until a permit is released, for holding a
/// save in flight.
pub struct GatedGateway {
    pub inner: Arc<InMemoryConversationGateway>,
    pub gate: Semaphore,
    pub saves_started: AtomicUsize,
}

impl GatedGateway {
    pub fn new(inner: Arc<InMemoryConversationGateway>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            saves_started: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.saves_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationGateway for GatedGateway {
    async fn fetch_all(&self, principal_id: &str) -> Result<Vec<Conversation>> {
        self.inner.fetch_all(principal_id).await
    }

    async fn fetch_one(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        self.inner.fetch_one(principal_id, conversation_id).await
    }

    async fn save(&self, principal_id: &str, conversation: &Conversation) -> Result<()> {
        self.saves_started.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.inner.save(principal_id, conversation).await
    }

    async fn delete(&self, principal_id: &str, conversation_id: &str) -> Result<()> {
        self.inner.delete(principal_id, conversation_id).await
    }
}

/// Gateway whose `fetch_all` reads the remote list, then blocks until a
/// permit is released before returning it, for a fetch that is held open.
pub struct HeldFetchGateway {
    pub inner: Arc<InMemoryConversationGateway>,
    pub release: Semaphore,
    pub fetches_started: AtomicUsize,
}

impl HeldFetchGateway {
    pub fn new(inner: Arc<InMemoryConversationGateway>) -> Self {
        Self {
            inner,
            release: Semaphore::new(0),
            fetches_started: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.fetches_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationGateway for HeldFetchGateway {
    async fn fetch_all(&self, principal_id: &str) -> Result<Vec<Conversation>> {
        let listed = self.inner.fetch_all(principal_id).await?;
        self.fetches_started.fetch_add(1, Ordering::SeqCst);
        let permit = self.release.acquire().await.unwrap();
        permit.forget();
        Ok(listed)
    }

    async fn fetch_one(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        self.inner.fetch_one(principal_id, conversation_id).await
    }

    async fn save(&self, principal_id: &str, conversation: &Conversation) -> Result<()> {
        self.inner.save(principal_id, conversation).await
    }

    async fn delete(&self, principal_id: &str, conversation_id: &str) -> Result<()> {
        self.inner.delete(principal_id, conversation_id).await
    }
}
