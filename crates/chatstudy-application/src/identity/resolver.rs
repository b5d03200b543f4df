use chatstudy_core::clock::Clock;
use chatstudy_core::identity::{
    DerivationMethod, DeviceIdentity, DurableStore, EnvironmentProbe, Fingerprint,
    FingerprintDeriver, IDENTITY_KEY, IdentityRecord, KeyValueStore,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Resolves the anonymous device identity of this installation.
///
/// Resolution walks a fixed precedence chain and stops at the first hit:
///
/// 1. Tier-1 (fast key-value store). Tier-2 is repaired from it if needed.
/// 2. Tier-2 (durable store). Tier-1 is re-populated from it.
/// 3. Fingerprint of the environment, minted as `fp_<hash>`.
/// 4. Random value, minted as `rand_<uuid>`.
///
/// A freshly minted value is written to both tiers. Tier failures are
/// logged and never returned to the caller; the resolved value stays in
/// memory for the lifetime of the resolver either way.
///
/// # Concurrency
///
/// The first resolution runs under an async mutex, so concurrent callers
/// during startup wait for it and receive the same value instead of each
/// minting their own.
pub struct IdentityResolver {
    fast: Arc<dyn KeyValueStore>,
    durable: Arc<dyn DurableStore>,
    probe: Arc<dyn EnvironmentProbe>,
    deriver: FingerprintDeriver,
    clock: Arc<dyn Clock>,
    resolved: Mutex<Option<DeviceIdentity>>,
}

impl IdentityResolver {
    pub fn new(
        fast: Arc<dyn KeyValueStore>,
        durable: Arc<dyn DurableStore>,
        probe: Arc<dyn EnvironmentProbe>,
        deriver: FingerprintDeriver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fast,
            durable,
            probe,
            deriver,
            clock,
            resolved: Mutex::new(None),
        }
    }

    /// Returns the device identity, creating one if none exists.
    pub async fn resolve(&self) -> DeviceIdentity {
        let mut resolved = self.resolved.lock().await;
        if let Some(identity) = resolved.as_ref() {
            return identity.clone();
        }

        let identity = self.resolve_from_tiers().await;
        *resolved = Some(identity.clone());
        identity
    }

    /// Forgets the identity in both tiers and resolves again.
    ///
    /// Only ever called on an explicit user request. With an unchanged
    /// environment the fingerprint, and therefore the identity, comes back
    /// the same; only a random identity is actually replaced.
    pub async fn reset(&self) -> DeviceIdentity {
        let mut resolved = self.resolved.lock().await;
        *resolved = None;

        if let Err(e) = self.fast.remove(IDENTITY_KEY) {
            tracing::warn!("[IdentityResolver] Failed to clear tier-1: {}", e);
        }
        if let Err(e) = self.durable.delete(IDENTITY_KEY).await {
            tracing::warn!("[IdentityResolver] Failed to clear tier-2: {}", e);
        }

        let identity = self.resolve_from_tiers().await;
        tracing::info!("[IdentityResolver] Identity reset, now {}", identity.value());
        *resolved = Some(identity.clone());
        identity
    }

    async fn resolve_from_tiers(&self) -> DeviceIdentity {
        if let Some(record) = self.read_fast() {
            self.repair_durable(&record).await;
            tracing::debug!("[IdentityResolver] Using stored identity {}", record.value);
            return DeviceIdentity::new(record.value, DerivationMethod::Stored);
        }

        if let Some(record) = self.read_durable().await {
            self.write_fast(&record);
            tracing::info!(
                "[IdentityResolver] Recovered identity {} from tier-2",
                record.value
            );
            return DeviceIdentity::new(record.value, DerivationMethod::Recovered);
        }

        let identity = match self.deriver.derive(self.probe.as_ref()) {
            Fingerprint::Hash(hash) => DeviceIdentity::fingerprinted(&hash),
            Fingerprint::Unavailable => {
                tracing::warn!(
                    "[IdentityResolver] No device characteristics readable, minting random identity"
                );
                DeviceIdentity::random()
            }
        };
        tracing::info!(
            "[IdentityResolver] Minted identity {} ({:?})",
            identity.value(),
            identity.method()
        );

        let record = IdentityRecord {
            value: identity.value().to_string(),
            minted_by: identity.method(),
            minted_at: self.clock.now(),
        };
        self.write_fast(&record);
        self.write_durable(&record).await;
        identity
    }

    fn read_fast(&self) -> Option<IdentityRecord> {
        let raw = match self.fast.get(IDENTITY_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("[IdentityResolver] Tier-1 unreadable: {}", e);
                return None;
            }
        };
        let record = IdentityRecord::parse(&raw);
        if record.is_none() {
            tracing::warn!("[IdentityResolver] Ignoring malformed tier-1 record");
        }
        record
    }

    async fn read_durable(&self) -> Option<IdentityRecord> {
        let raw = match self.durable.get(IDENTITY_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("[IdentityResolver] Tier-2 unreadable: {}", e);
                return None;
            }
        };
        let record = IdentityRecord::parse(&raw);
        if record.is_none() {
            tracing::warn!("[IdentityResolver] Ignoring malformed tier-2 record");
        }
        record
    }

    /// Writes `record` into tier-2 unless it already holds the same value.
    async fn repair_durable(&self, record: &IdentityRecord) {
        match self.read_durable().await {
            Some(existing) if existing.value == record.value => {}
            _ => {
                tracing::debug!("[IdentityResolver] Repairing tier-2");
                self.write_durable(record).await;
            }
        }
    }

    fn write_fast(&self, record: &IdentityRecord) {
        let result = record
            .to_json()
            .map_err(chatstudy_core::StudyError::from)
            .and_then(|json| self.fast.set(IDENTITY_KEY, &json));
        if let Err(e) = result {
            tracing::warn!("[IdentityResolver] Failed to write tier-1: {}", e);
        }
    }

    async fn write_durable(&self, record: &IdentityRecord) {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("[IdentityResolver] Failed to encode identity: {}", e);
                return;
            }
        };
        if let Err(e) = self.durable.put(IDENTITY_KEY, &json).await {
            tracing::warn!("[IdentityResolver] Failed to write tier-2: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blank_environment, manual_clock, scenario_environment};
    use chatstudy_core::identity::StaticEnvironment;
    use chatstudy_infrastructure::{InMemoryDurableStore, InMemoryKeyValueStore};

    struct Tiers {
        fast: Arc<InMemoryKeyValueStore>,
        durable: Arc<InMemoryDurableStore>,
    }

    impl Tiers {
        fn new() -> Self {
            Self {
                fast: Arc::new(InMemoryKeyValueStore::new()),
                durable: Arc::new(InMemoryDurableStore::new()),
            }
        }

        /// A resolver as a new process (or page load) would build it.
        fn session(&self, env: StaticEnvironment) -> IdentityResolver {
            IdentityResolver::new(
                self.fast.clone(),
                self.durable.clone(),
                Arc::new(env),
                FingerprintDeriver::default(),
                Arc::new(manual_clock()),
            )
        }
    }

    fn stored_value(raw: Option<String>) -> Option<String> {
        raw.and_then(|raw| IdentityRecord::parse(&raw)).map(|r| r.value)
    }

    #[tokio::test]
    async fn test_resolve_is_stable() {
        let tiers = Tiers::new();
        let resolver = tiers.session(scenario_environment());

        let first = resolver.resolve().await;
        let second = resolver.resolve().await;
        assert_eq!(first, second);
        assert_eq!(first.method(), DerivationMethod::Fingerprinted);

        let later = tiers.session(scenario_environment()).resolve().await;
        assert_eq!(later.value(), first.value());
        assert_eq!(later.method(), DerivationMethod::Stored);
    }

    #[tokio::test]
    async fn test_scenario_environment_yields_fingerprint_identity() {
        let tiers = Tiers::new();
        let resolver = tiers.session(scenario_environment());

        let identity = resolver.resolve().await;
        assert!(identity.value().starts_with("fp_"));
        assert_eq!(identity.value().len(), "fp_".len() + 32);
        assert_eq!(resolver.resolve().await.value(), identity.value());
    }

    #[tokio::test]
    async fn test_tier2_recovers_after_tier1_clear() {
        let tiers = Tiers::new();
        let original = tiers.session(blank_environment()).resolve().await;
        assert_eq!(original.method(), DerivationMethod::Random);

        tiers.fast.clear();

        let recovered = tiers.session(blank_environment()).resolve().await;
        assert_eq!(recovered.value(), original.value());
        assert_eq!(recovered.method(), DerivationMethod::Recovered);
        assert_eq!(
            stored_value(tiers.fast.get(IDENTITY_KEY).unwrap()).as_deref(),
            Some(original.value())
        );
    }

    #[tokio::test]
    async fn test_tier1_repairs_lost_tier2() {
        let tiers = Tiers::new();
        let original = tiers.session(blank_environment()).resolve().await;

        tiers.durable.clear();

        let again = tiers.session(blank_environment()).resolve().await;
        assert_eq!(again.value(), original.value());
        assert_eq!(again.method(), DerivationMethod::Stored);
        assert_eq!(
            stored_value(tiers.durable.peek(IDENTITY_KEY)).as_deref(),
            Some(original.value())
        );
    }

    #[tokio::test]
    async fn test_total_tier_loss_rederives_same_fingerprint() {
        let first = Tiers::new().session(scenario_environment()).resolve().await;
        let second = Tiers::new().session(scenario_environment()).resolve().await;

        assert_eq!(first.value(), second.value());
        assert_eq!(second.method(), DerivationMethod::Fingerprinted);
    }

    #[tokio::test]
    async fn test_malformed_tier1_reads_as_absent() {
        let tiers = Tiers::new();
        let original = tiers.session(blank_environment()).resolve().await;
        tiers.fast.set(IDENTITY_KEY, "{not json").unwrap();

        let again = tiers.session(blank_environment()).resolve().await;
        assert_eq!(again.value(), original.value());
        assert_eq!(again.method(), DerivationMethod::Recovered);
    }

    #[tokio::test]
    async fn test_unavailable_tiers_still_resolve_in_memory() {
        let tiers = Tiers::new();
        tiers.fast.set_available(false);
        tiers.durable.set_available(false);
        let resolver = tiers.session(blank_environment());

        let first = resolver.resolve().await;
        let second = resolver.resolve().await;
        assert_eq!(first, second);
        assert!(first.value().starts_with("rand_"));
    }

    #[tokio::test]
    async fn test_tier2_write_failure_keeps_tier1() {
        let tiers = Tiers::new();
        tiers.durable.set_available(false);

        let identity = tiers.session(scenario_environment()).resolve().await;
        assert_eq!(
            stored_value(tiers.fast.get(IDENTITY_KEY).unwrap()).as_deref(),
            Some(identity.value())
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_resolution_converges() {
        let tiers = Tiers::new();
        let resolver = Arc::new(tiers.session(blank_environment()));

        let results = futures::future::join_all((0..8).map(|_| {
            let resolver = resolver.clone();
            async move { resolver.resolve().await }
        }))
        .await;

        let first = results[0].value().to_string();
        assert!(results.iter().all(|identity| identity.value() == first));
        assert_eq!(
            stored_value(tiers.durable.peek(IDENTITY_KEY)).as_deref(),
            Some(first.as_str())
        );
    }

    #[tokio::test]
    async fn test_reset_replaces_random_identity() {
        let tiers = Tiers::new();
        let resolver = tiers.session(blank_environment());
        let before = resolver.resolve().await;

        let after = resolver.reset().await;
        assert_ne!(before.value(), after.value());
        assert_eq!(resolver.resolve().await, after);
        assert_eq!(
            stored_value(tiers.durable.peek(IDENTITY_KEY)).as_deref(),
            Some(after.value())
        );
    }

    #[tokio::test]
    async fn test_reset_with_same_environment_keeps_fingerprint() {
        let tiers = Tiers::new();
        let resolver = tiers.session(scenario_environment());
        let before = resolver.resolve().await;

        let after = resolver.reset().await;
        assert_eq!(before.value(), after.value());
        assert_eq!(after.method(), DerivationMethod::Fingerprinted);
    }
}
