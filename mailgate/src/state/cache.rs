// mailgate/src/state/cache.rs
//
// Artifact cache: one immutable snapshot of everything a request needs
// (config, model tiers, character models) behind an `Arc`, swapped whole.
//
// Readers clone the `Arc` under a short read lock and then work lock-free on
// a consistent snapshot. A refresh builds a complete replacement off to the
// side and swaps it in one write; any artifact that fails to load keeps its
// previous value (or stays absent, letting the next model tier answer).
// The cache is an explicit value handed to the engine, never a global.
//
// At most one reload runs at a time. Request-path callers that find the
// snapshot stale while another reload is in flight keep serving the current
// `Arc`. The TTL starts at the constructor value and then follows
// `artifactTtlSecs` from every accepted config.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::collab::{ConfigStore, ModelStore};
use crate::config::ScoringConfig;
use crate::error::ArtifactError;
use crate::model::{EnsembleModel, ModelSet};
use crate::sequence::{CharSequenceModel, OodDetector};

#[derive(Debug, Clone)]
pub struct ArtifactSnapshot {
    pub config:     Arc<ScoringConfig>,
    pub models:     ModelSet,
    pub ood:        Option<OodDetector>,
    pub generation: u64,
    pub loaded_at:  Instant,
}

impl ArtifactSnapshot {
    pub fn new(config: ScoringConfig, models: ModelSet, ood: Option<OodDetector>) -> Self {
        Self {
            config: Arc::new(config),
            models,
            ood,
            generation: 0,
            loaded_at: Instant::now(),
        }
    }

    /// Default config, no models. Scores everything as `model_unavailable`.
    pub fn empty() -> Self {
        Self::new(ScoringConfig::default(), ModelSet::default(), None)
    }
}

/// What a refresh managed to load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub generation:    u64,
    pub config_loaded: bool,
    pub forest_loaded: bool,
    pub tree_loaded:   bool,
    pub ood_loaded:    bool,
}

pub struct ArtifactCache {
    current:    RwLock<Arc<ArtifactSnapshot>>,
    ttl_ms:     AtomicU64,
    generation: AtomicU64,
    reloading:  Mutex<()>,
}

impl ArtifactCache {
    pub fn new(initial: ArtifactSnapshot, ttl: Duration) -> Self {
        Self {
            current:    RwLock::new(Arc::new(initial)),
            ttl_ms:     AtomicU64::new(duration_ms(ttl)),
            generation: AtomicU64::new(0),
            reloading:  Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<ArtifactSnapshot> {
        self.current.read().clone()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    pub fn is_stale(&self) -> bool {
        self.current.read().loaded_at.elapsed() >= self.ttl()
    }

    /// Swap in an externally built snapshot.
    pub fn replace(&self, mut snapshot: ArtifactSnapshot) {
        snapshot.generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.current.write() = Arc::new(snapshot);
    }

    /// Current snapshot, refreshing first if the TTL has elapsed and no other
    /// caller is already doing so.
    pub fn get_or_refresh(&self, models: &dyn ModelStore, config: &dyn ConfigStore) -> Arc<ArtifactSnapshot> {
        if self.is_stale() {
            if let Some(_guard) = self.reloading.try_lock() {
                // A reload may have finished between the check and the lock.
                if self.is_stale() {
                    self.reload(models, config);
                }
            }
        }
        self.snapshot()
    }

    /// Unconditional reload; waits for any reload already in flight.
    pub fn refresh(&self, models: &dyn ModelStore, config: &dyn ConfigStore) -> RefreshReport {
        let _guard = self.reloading.lock();
        self.reload(models, config)
    }

    fn reload(&self, models: &dyn ModelStore, config: &dyn ConfigStore) -> RefreshReport {
        let prior = self.snapshot();
        let mut report = RefreshReport::default();

        let cfg = match config.load() {
            Ok(c) => {
                report.config_loaded = true;
                self.ttl_ms.store(c.artifact_ttl_secs.saturating_mul(1000), Ordering::Relaxed);
                Arc::new(c)
            }
            Err(e) => {
                warn!("config rejected, keeping generation {}: {}", prior.generation, e);
                prior.config.clone()
            }
        };

        let forest = load_tier(models, &cfg.artifacts.forest, prior.models.forest.as_ref());
        let tree = load_tier(models, &cfg.artifacts.tree, prior.models.tree.as_ref());
        report.forest_loaded = forest.1;
        report.tree_loaded = tree.1;

        let ood = match load_ood(models, &cfg) {
            Ok(det) => {
                report.ood_loaded = true;
                Some(det)
            }
            Err(e) => {
                warn!("character models unavailable: {}", e);
                prior.ood.clone()
            }
        };

        let next = ArtifactSnapshot {
            config: cfg,
            models: ModelSet { forest: forest.0, tree: tree.0 },
            ood,
            generation: 0,
            loaded_at: Instant::now(),
        };
        self.replace(next);
        report.generation = self.current.read().generation;

        info!(
            generation = report.generation,
            config = report.config_loaded,
            forest = report.forest_loaded,
            tree = report.tree_loaded,
            ood = report.ood_loaded,
            "artifacts refreshed"
        );
        report
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn load_tier(
    store: &dyn ModelStore,
    name:  &str,
    prior: Option<&EnsembleModel>,
) -> (Option<EnsembleModel>, bool) {
    match store.fetch(name).and_then(|bytes| EnsembleModel::load(&bytes)) {
        Ok(m) => (Some(m), true),
        Err(e) => {
            if prior.is_some() {
                warn!(artifact = name, "reload failed, keeping previous: {}", e);
            } else {
                warn!(artifact = name, "unavailable: {}", e);
            }
            (prior.cloned(), false)
        }
    }
}

fn load_ood(store: &dyn ModelStore, cfg: &ScoringConfig) -> Result<OodDetector, ArtifactError> {
    let legit = CharSequenceModel::from_json(&store.fetch(&cfg.artifacts.legit_model)?)?;
    let fraud = CharSequenceModel::from_json(&store.fetch(&cfg.artifacts.fraud_model)?)?;
    for m in [&legit, &fraud] {
        if m.order() != cfg.ngram_order {
            return Err(ArtifactError::InvalidOrder(m.order()));
        }
    }
    Ok(OodDetector::new(Arc::new(legit), Arc::new(fraud)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MemoryModelStore, StaticConfigStore};

    const TREE: &str = r#"{"meta":{"version":"1"},"tree":{"type":"leaf","value":0.3}}"#;
    const TREE_V2: &str = r#"{"meta":{"version":"2"},"tree":{"type":"leaf","value":0.4}}"#;

    fn char_model(samples: &[&str]) -> String {
        CharSequenceModel::trained(2, samples.iter().copied()).unwrap().to_json()
    }

    fn store() -> MemoryModelStore {
        let s = MemoryModelStore::new();
        s.insert("tree.json", TREE);
        s.insert("legit_model.json", char_model(&["johnsmith", "maryjones"]));
        s.insert("fraud_model.json", char_model(&["xk9q2", "zq8w1"]));
        s
    }

    #[test]
    fn refresh_loads_available_tiers() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(60));
        let r = cache.refresh(&store(), &StaticConfigStore(ScoringConfig::default()));
        assert!(r.config_loaded && r.tree_loaded && r.ood_loaded);
        assert!(!r.forest_loaded);
        let snap = cache.snapshot();
        assert!(snap.models.forest.is_none());
        assert_eq!(snap.models.tree.as_ref().map(|t| t.version()), Some("1"));
        assert!(snap.ood.is_some());
        assert_eq!(snap.generation, 1);
    }

    #[test]
    fn corrupt_artifact_keeps_previous() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(60));
        let models = store();
        let cfg = StaticConfigStore(ScoringConfig::default());
        cache.refresh(&models, &cfg);

        models.insert("tree.json", "{ not json");
        let r = cache.refresh(&models, &cfg);
        assert!(!r.tree_loaded);
        assert_eq!(cache.snapshot().models.tree.as_ref().map(|t| t.version()), Some("1"));

        models.insert("tree.json", TREE_V2);
        cache.refresh(&models, &cfg);
        assert_eq!(cache.snapshot().models.tree.as_ref().map(|t| t.version()), Some("2"));
    }

    #[test]
    fn invalid_config_keeps_previous() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(60));
        let mut bad = ScoringConfig::default();
        bad.thresholds.warn = 0.9;
        bad.thresholds.block = 0.1;
        let r = cache.refresh(&store(), &StaticConfigStore(bad));
        assert!(!r.config_loaded);
        assert_eq!(*cache.snapshot().config, ScoringConfig::default());
    }

    #[test]
    fn order_mismatch_disables_ood() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(60));
        let cfg = ScoringConfig { ngram_order: 3, ..Default::default() };
        let r = cache.refresh(&store(), &StaticConfigStore(cfg));
        assert!(!r.ood_loaded);
        assert!(cache.snapshot().ood.is_none());
    }

    #[test]
    fn readers_keep_their_snapshot_across_swaps() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(60));
        let before = cache.snapshot();
        cache.refresh(&store(), &StaticConfigStore(ScoringConfig::default()));
        assert!(before.models.is_empty());
        assert!(!cache.snapshot().models.is_empty());
    }

    #[test]
    fn ttl_drives_refresh() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::ZERO);
        assert!(cache.is_stale());
        let snap = cache.get_or_refresh(&store(), &StaticConfigStore(ScoringConfig::default()));
        assert!(snap.models.tree.is_some());

        let fresh = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(3600));
        assert!(!fresh.is_stale());
    }

    #[test]
    fn accepted_config_sets_the_ttl() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_secs(60));
        let cfg = ScoringConfig { artifact_ttl_secs: 5, ..Default::default() };
        cache.refresh(&store(), &StaticConfigStore(cfg));
        assert_eq!(cache.ttl(), Duration::from_secs(5));

        let cfg = ScoringConfig { artifact_ttl_secs: 0, ..Default::default() };
        cache.refresh(&store(), &StaticConfigStore(cfg));
        assert_eq!(cache.ttl(), Duration::ZERO);
        assert!(cache.is_stale());

        let mut bad = ScoringConfig { artifact_ttl_secs: 900, ..Default::default() };
        bad.thresholds.warn = 0.9;
        bad.thresholds.block = 0.1;
        cache.refresh(&store(), &StaticConfigStore(bad));
        assert_eq!(cache.ttl(), Duration::ZERO);
    }

    struct SlowStore {
        inner:   MemoryModelStore,
        fetches: AtomicU64,
    }

    impl ModelStore for SlowStore {
        fn fetch(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            self.inner.fetch(name)
        }
    }

    #[test]
    fn concurrent_callers_share_one_reload() {
        let cache = ArtifactCache::new(ArtifactSnapshot::empty(), Duration::from_millis(100));
        let models = SlowStore { inner: store(), fetches: AtomicU64::new(0) };
        let cfg = StaticConfigStore(ScoringConfig { artifact_ttl_secs: 3600, ..Default::default() });
        std::thread::sleep(Duration::from_millis(150));
        assert!(cache.is_stale());

        let gate = std::sync::Barrier::new(8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    gate.wait();
                    cache.get_or_refresh(&models, &cfg);
                });
            }
        });
        // forest, tree, legit and fraud: one pass over the store.
        assert_eq!(models.fetches.load(Ordering::SeqCst), 4);
        assert_eq!(cache.snapshot().generation, 1);
        assert!(!cache.is_stale());
    }
}
