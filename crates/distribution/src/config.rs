//! Distribution policy: scoring weights and the utilization ceiling.
//!
//! The policy is the only persisted state of the engine. It lives in the settings
//! store under [`SETTINGS_KEY`] and is cached by [`DistributionConfigStore`], an
//! explicit object injected into the engine (no module-level state).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborator::{DEFAULT_LOOKUP_TIMEOUT, SettingsStore, bounded};
use crate::error::{CollaboratorError, DistributionError};

/// Settings key holding the serialized [`DistributionConfig`].
pub const SETTINGS_KEY: &str = "ai_distribution_config";

pub const DEFAULT_MAX_UTILIZATION: f64 = 0.9;

/// Bounds applied to `max_utilization` on every write.
pub const MAX_UTILIZATION_RANGE: (f64, f64) = (0.1, 1.0);

/// Weights used for scoring after defaults have been filled in.
///
/// Weights are not normalized: a total score may leave [0, 1]
/// when the configured weights do not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveWeights {
    pub skill: f64,
    pub workload: f64,
    pub history: f64,
    pub availability: f64,
}

impl EffectiveWeights {
    pub const DEFAULT: EffectiveWeights = EffectiveWeights {
        skill: 0.40,
        workload: 0.25,
        history: 0.20,
        availability: 0.15,
    };

    pub fn sum(&self) -> f64 {
        self.skill + self.workload + self.history + self.availability
    }
}

impl Default for EffectiveWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configured weights; any of them may be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<f64>,
}

impl WeightSettings {
    fn fields_mut(&mut self) -> [(&'static str, &mut Option<f64>); 4] {
        [
            ("skill", &mut self.skill),
            ("workload", &mut self.workload),
            ("history", &mut self.history),
            ("availability", &mut self.availability),
        ]
    }

    /// Key-wise merge: weights present in `patch` replace ours, the rest stay.
    fn merge(&mut self, patch: &WeightSettings) {
        let mut patch = *patch;
        for ((_, ours), (_, theirs)) in self.fields_mut().into_iter().zip(patch.fields_mut()) {
            if let Some(value) = theirs.take() {
                *ours = Some(value);
            }
        }
    }

    fn validate(&self) -> Result<(), DistributionError> {
        let mut copy = *self;
        for (name, value) in copy.fields_mut() {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(DistributionError::InvalidConfig(format!(
                    "weight `{name}` must be a finite number"
                )));
            }
        }
        Ok(())
    }

    fn clamp(&mut self) {
        for (_, value) in self.fields_mut() {
            if let Some(v) = value {
                *v = v.clamp(0.0, 1.0);
            }
        }
    }
}

/// Persisted distribution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub weights: WeightSettings,
    #[serde(default = "default_max_utilization", alias = "maxUtilization")]
    pub max_utilization: f64,
}

fn default_max_utilization() -> f64 {
    DEFAULT_MAX_UTILIZATION
}

impl Default for DistributionConfig {
    fn default() -> Self {
        let d = EffectiveWeights::DEFAULT;
        Self {
            weights: WeightSettings {
                skill: Some(d.skill),
                workload: Some(d.workload),
                history: Some(d.history),
                availability: Some(d.availability),
            },
            max_utilization: DEFAULT_MAX_UTILIZATION,
        }
    }
}

impl DistributionConfig {
    /// Merge configured weights over the hardcoded defaults.
    pub fn effective_weights(&self) -> EffectiveWeights {
        let d = EffectiveWeights::DEFAULT;
        EffectiveWeights {
            skill: self.weights.skill.unwrap_or(d.skill),
            workload: self.weights.workload.unwrap_or(d.workload),
            history: self.weights.history.unwrap_or(d.history),
            availability: self.weights.availability.unwrap_or(d.availability),
        }
    }

    fn clamped(mut self) -> Self {
        self.weights.clamp();
        self.max_utilization = clamp_max_utilization(self.max_utilization);
        self
    }
}

fn clamp_max_utilization(value: f64) -> f64 {
    let (lo, hi) = MAX_UTILIZATION_RANGE;
    if value.is_nan() {
        return DEFAULT_MAX_UTILIZATION;
    }
    value.clamp(lo, hi)
}

/// Partial update of the policy (administrative surface).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub weights: WeightSettings,
    #[serde(default, alias = "maxUtilization")]
    pub max_utilization: Option<f64>,
}

impl ConfigPatch {
    pub fn weights(weights: WeightSettings) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn max_utilization(value: f64) -> Self {
        Self {
            max_utilization: Some(value),
            ..Self::default()
        }
    }
}

/// Cached access to the persisted policy.
///
/// - `get_config()` reads through the cache; the first read loads from the settings
///   store (initializing defaults if nothing is stored).
/// - A failed load falls back to the last config known to be good and is not cached,
///   so the next read retries.
/// - Concurrent readers may briefly observe the previous config after a write.
pub struct DistributionConfigStore {
    settings: Arc<dyn SettingsStore>,
    timeout: Duration,
    cache: RwLock<Option<Arc<DistributionConfig>>>,
    last_good: RwLock<Arc<DistributionConfig>>,
}

impl core::fmt::Debug for DistributionConfigStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DistributionConfigStore")
            .field("timeout", &self.timeout)
            .field("cached", &self.cached().is_some())
            .finish()
    }
}

impl DistributionConfigStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            cache: RwLock::new(None),
            last_good: RwLock::new(Arc::new(DistributionConfig::default())),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current policy (cached after the first successful load).
    pub async fn get_config(&self) -> Arc<DistributionConfig> {
        if let Some(config) = self.cached() {
            return config;
        }

        match self.load().await {
            Ok(config) => {
                let config = Arc::new(config);
                self.replace(config.clone());
                config
            }
            Err(err) => {
                let fallback = self.last_good();
                warn!(error = %err, "distribution config load failed; using last known config");
                fallback
            }
        }
    }

    /// Effective weights of the current policy.
    pub async fn effective_weights(&self) -> EffectiveWeights {
        self.get_config().await.effective_weights()
    }

    /// Merge `patch` into the stored policy, clamp, persist, then swap the cache.
    ///
    /// The merge base is read from the settings store, never from the cache or the
    /// last-good fallback. If that read fails nothing is written.
    pub async fn set_config(&self, patch: ConfigPatch) -> Result<Arc<DistributionConfig>, DistributionError> {
        patch.weights.validate()?;

        let mut next = self.load().await?;
        next.weights.merge(&patch.weights);
        if let Some(max) = patch.max_utilization {
            if max.is_nan() {
                return Err(DistributionError::InvalidConfig(
                    "max_utilization must be a number".to_string(),
                ));
            }
            next.max_utilization = max;
        }
        let next = next.clamped();

        let value = serde_json::to_value(&next)
            .map_err(|e| DistributionError::InvalidConfig(e.to_string()))?;
        bounded("settings", self.timeout, self.settings.set(SETTINGS_KEY, value)).await?;

        let next = Arc::new(next);
        self.replace(next.clone());
        info!(
            max_utilization = next.max_utilization,
            weights = ?next.effective_weights(),
            "distribution config updated"
        );
        Ok(next)
    }

    /// Drop the cached policy; the next read reloads from the settings store.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *cache = None;
    }

    pub fn clear_cache(&self) {
        self.invalidate();
    }

    /// Reload from the settings store now.
    pub async fn refresh(&self) -> Arc<DistributionConfig> {
        self.invalidate();
        self.get_config().await
    }

    async fn load(&self) -> Result<DistributionConfig, CollaboratorError> {
        let stored = bounded("settings", self.timeout, self.settings.get(SETTINGS_KEY)).await?;

        match stored {
            Some(value) => {
                let config: DistributionConfig = serde_json::from_value(value)
                    .map_err(|e| CollaboratorError::malformed("settings", e.to_string()))?;
                debug!("distribution config loaded");
                Ok(config.clamped())
            }
            None => {
                let defaults = DistributionConfig::default();
                match serde_json::to_value(&defaults) {
                    Ok(value) => {
                        let persisted =
                            bounded("settings", self.timeout, self.settings.set(SETTINGS_KEY, value)).await;
                        if let Err(err) = persisted {
                            warn!(error = %err, "could not persist default distribution config");
                        }
                    }
                    Err(err) => warn!(error = %err, "could not serialize default distribution config"),
                }
                info!("distribution config initialized with defaults");
                Ok(defaults)
            }
        }
    }

    fn cached(&self) -> Option<Arc<DistributionConfig>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn last_good(&self) -> Arc<DistributionConfig> {
        self.last_good.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace(&self, config: Arc<DistributionConfig>) {
        *self.last_good.write().unwrap_or_else(|e| e.into_inner()) = config.clone();
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value as JsonValue, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySettings {
        values: Mutex<HashMap<String, JsonValue>>,
        reads: AtomicUsize,
        writes: AtomicUsize,
        failing: AtomicBool,
        failing_reads: AtomicBool,
    }

    impl MemorySettings {
        fn with(key: &str, value: JsonValue) -> Self {
            let s = Self::default();
            s.values.lock().unwrap().insert(key.to_string(), value);
            s
        }
    }

    #[async_trait]
    impl SettingsStore for MemorySettings {
        async fn get(&self, key: &str) -> Result<Option<JsonValue>, CollaboratorError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) || self.failing_reads.load(Ordering::SeqCst) {
                return Err(CollaboratorError::unavailable("settings", "down"));
            }
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: JsonValue) -> Result<(), CollaboratorError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CollaboratorError::unavailable("settings", "down"));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    #[tokio::test]
    async fn initializes_and_persists_defaults_when_nothing_is_stored() {
        let settings = Arc::new(MemorySettings::default());
        let store = DistributionConfigStore::new(settings.clone());

        let config = store.get_config().await;

        assert_eq!(*config, DistributionConfig::default());
        assert!(settings.values.lock().unwrap().contains_key(SETTINGS_KEY));
    }

    #[tokio::test]
    async fn caches_after_first_read_until_invalidated() {
        let settings = Arc::new(MemorySettings::default());
        let store = DistributionConfigStore::new(settings.clone());

        store.get_config().await;
        store.get_config().await;
        assert_eq!(settings.reads.load(Ordering::SeqCst), 1);

        store.clear_cache();
        store.get_config().await;
        assert_eq!(settings.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unset_weights_fall_back_to_defaults() {
        let settings = Arc::new(MemorySettings::with(
            SETTINGS_KEY,
            json!({ "weights": { "skill": 0.7 }, "max_utilization": 0.8 }),
        ));
        let store = DistributionConfigStore::new(settings);

        let weights = store.effective_weights().await;

        assert_eq!(weights.skill, 0.7);
        assert_eq!(weights.workload, 0.25);
        assert_eq!(weights.history, 0.20);
        assert_eq!(weights.availability, 0.15);
    }

    #[tokio::test]
    async fn set_config_merges_weights_key_wise() {
        let settings = Arc::new(MemorySettings::with(
            SETTINGS_KEY,
            json!({ "weights": { "skill": 0.1, "workload": 0.3, "history": 0.6, "availability": 0.0 } }),
        ));
        let store = DistributionConfigStore::new(settings);

        store
            .set_config(ConfigPatch::weights(WeightSettings {
                skill: Some(0.5),
                ..Default::default()
            }))
            .await
            .unwrap();
        let weights = store.get_config().await.effective_weights();

        assert_eq!(weights.skill, 0.5);
        assert_eq!(weights.workload, 0.3);
        assert_eq!(weights.history, 0.6);
        assert_eq!(weights.availability, 0.0);
    }

    #[tokio::test]
    async fn max_utilization_is_clamped_on_write() {
        let store = DistributionConfigStore::new(Arc::new(MemorySettings::default()));

        let high = store.set_config(ConfigPatch::max_utilization(1.5)).await.unwrap();
        assert_eq!(high.max_utilization, 1.0);

        let low = store.set_config(ConfigPatch::max_utilization(0.01)).await.unwrap();
        assert_eq!(low.max_utilization, 0.1);
        assert_eq!(store.get_config().await.max_utilization, 0.1);
    }

    #[tokio::test]
    async fn writes_survive_a_reload() {
        let settings = Arc::new(MemorySettings::default());
        let store = DistributionConfigStore::new(settings.clone());
        store.set_config(ConfigPatch::max_utilization(0.6)).await.unwrap();

        let reloaded = DistributionConfigStore::new(settings).get_config().await;
        assert_eq!(reloaded.max_utilization, 0.6);
    }

    #[tokio::test]
    async fn weights_are_not_normalized() {
        let store = DistributionConfigStore::new(Arc::new(MemorySettings::default()));
        let config = store
            .set_config(ConfigPatch::weights(WeightSettings {
                skill: Some(1.0),
                workload: Some(1.0),
                history: Some(1.0),
                availability: Some(1.0),
            }))
            .await
            .unwrap();

        assert_eq!(config.effective_weights().sum(), 4.0);
    }

    #[tokio::test]
    async fn rejects_non_finite_weights() {
        let store = DistributionConfigStore::new(Arc::new(MemorySettings::default()));
        let err = store
            .set_config(ConfigPatch::weights(WeightSettings {
                history: Some(f64::INFINITY),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, DistributionError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn failed_load_uses_last_good_config() {
        let settings = Arc::new(MemorySettings::default());
        let store = DistributionConfigStore::new(settings.clone());
        store.set_config(ConfigPatch::max_utilization(0.5)).await.unwrap();

        settings.failing.store(true, Ordering::SeqCst);
        let config = store.refresh().await;

        assert_eq!(config.max_utilization, 0.5);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_cache() {
        let settings = Arc::new(MemorySettings::default());
        let store = DistributionConfigStore::new(settings.clone());
        store.get_config().await;

        settings.failing.store(true, Ordering::SeqCst);
        let err = store.set_config(ConfigPatch::max_utilization(0.3)).await.unwrap_err();

        assert!(matches!(err, DistributionError::Collaborator(_)));
        assert_eq!(store.get_config().await.max_utilization, DEFAULT_MAX_UTILIZATION);
    }

    #[tokio::test]
    async fn unreadable_store_is_never_overwritten_by_a_patch() {
        let stored = json!({
            "weights": { "skill": 0.1, "workload": 0.3, "history": 0.6, "availability": 0.0 },
            "max_utilization": 0.5
        });
        let settings = Arc::new(MemorySettings::with(SETTINGS_KEY, stored.clone()));
        let store = DistributionConfigStore::new(settings.clone());

        settings.failing_reads.store(true, Ordering::SeqCst);
        let err = store
            .set_config(ConfigPatch::weights(WeightSettings {
                skill: Some(0.5),
                ..Default::default()
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, DistributionError::Collaborator(_)));
        assert_eq!(settings.writes.load(Ordering::SeqCst), 0);
        assert_eq!(settings.values.lock().unwrap()[SETTINGS_KEY], stored);

        settings.failing_reads.store(false, Ordering::SeqCst);
        let config = store.refresh().await;
        assert_eq!(config.max_utilization, 0.5);
        assert_eq!(config.effective_weights().history, 0.6);
    }
}
