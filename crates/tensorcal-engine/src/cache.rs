//! Read-through caching of calibration results.
//!
//! A run is a pure function of its inputs, so a finished result can be reused
//! whenever the same chains, cosmologies, schedule and configuration come
//! back. The cache lives outside the controller: callers own it and pass it
//! to a [`CachedController`] explicitly.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tensorcal_core::{Chain, Cosmology};
use tracing::debug;

use crate::config::CalibrationConfig;
use crate::controller::{ConvergenceController, MeasurementProgram};
use crate::error::Result;
use crate::result::{ConvergenceResult, RunStatus};
use crate::schedule::ResolutionSchedule;

/// SHA-256 digest of every input that influences a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputDigest([u8; 32]);

impl InputDigest {
    /// Digest a run's inputs.
    #[must_use]
    pub fn compute(
        a: MeasurementProgram<'_>,
        b: MeasurementProgram<'_>,
        schedule: &ResolutionSchedule,
        config: &CalibrationConfig,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"tensorcal/run/v1");

        hash_config(&mut hasher, config);
        hasher.update((schedule.len() as u64).to_le_bytes());
        hasher.update(schedule.precisions());
        for program in [a, b] {
            hash_chain(&mut hasher, program.chain);
            hash_cosmology(&mut hasher, program.cosmology);
        }

        Self(hasher.finalize().into())
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for InputDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_f64(hasher: &mut Sha256, x: f64) {
    hasher.update(x.to_bits().to_le_bytes());
}

fn hash_option(hasher: &mut Sha256, x: Option<f64>) {
    match x {
        Some(x) => {
            hasher.update([1]);
            hash_f64(hasher, x);
        }
        None => hasher.update([0]),
    }
}

fn hash_config(hasher: &mut Sha256, config: &CalibrationConfig) {
    hash_f64(hasher, config.threshold);
    hasher.update((config.min_chain_samples as u64).to_le_bytes());
    hasher.update([u8::from(config.early_exit)]);
    hash_f64(hasher, config.encoder.horizon_length_mpc);
    hash_f64(hasher, config.encoder.scale_oversampling);
    hash_f64(hasher, config.extractor.min_encoded_fraction);
    hash_f64(hasher, config.extractor.min_mean_occupancy);
    hash_f64(hasher, config.extractor.significance_sigmas);
    // Shard size changes merge order and therefore the last bits of results
    hasher.update((config.extractor.shard_size as u64).to_le_bytes());
    hash_f64(hasher, config.distance.spatial_weight);
}

fn hash_chain(hasher: &mut Sha256, chain: &Chain) {
    hash_str(hasher, chain.name());
    hasher.update((chain.schema().len() as u64).to_le_bytes());
    for parameter in chain.schema() {
        hash_str(hasher, parameter);
    }
    hasher.update((chain.len() as u64).to_le_bytes());
    for sample in chain.samples() {
        for &value in sample.values() {
            hash_f64(hasher, value);
        }
        match sample.spatial() {
            Some(tag) => {
                hasher.update([1]);
                hash_f64(hasher, tag.ra_deg);
                hash_f64(hasher, tag.dec_deg);
                hash_option(hasher, tag.distance_mpc);
                hash_option(hasher, tag.scale_factor);
            }
            None => hasher.update([0]),
        }
    }
}

fn hash_cosmology(hasher: &mut Sha256, cosmology: &Cosmology) {
    hash_f64(hasher, cosmology.h0());
    hash_f64(hasher, cosmology.omega_m());
    hash_f64(hasher, cosmology.omega_lambda());
}

/// Storage for finished results keyed by input digest.
pub trait ResultCache: Send + Sync {
    /// Look up a result.
    fn get(&self, key: &InputDigest) -> Option<ConvergenceResult>;

    /// Store a result.
    fn put(&self, key: InputDigest, result: ConvergenceResult);
}

#[derive(Debug, Default)]
struct CacheEntries {
    map: HashMap<InputDigest, ConvergenceResult>,
    order: VecDeque<InputDigest>,
}

/// Bounded in-process cache with first-in first-out eviction.
#[derive(Debug)]
pub struct InMemoryResultCache {
    entries: RwLock<CacheEntries>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryResultCache {
    /// Cache holding at most `capacity` results (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(CacheEntries::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Number of cached results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().map.is_empty()
    }

    /// Lookups that found a result.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drop every cached result.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.map.clear();
        entries.order.clear();
    }
}

impl Default for InMemoryResultCache {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ResultCache for InMemoryResultCache {
    fn get(&self, key: &InputDigest) -> Option<ConvergenceResult> {
        let found = self.entries.read().map.get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn put(&self, key: InputDigest, result: ConvergenceResult) {
        let mut entries = self.entries.write();
        if entries.map.insert(key, result).is_none() {
            entries.order.push_back(key);
        }
        while entries.map.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Controller wrapper that consults a cache before running.
#[derive(Debug)]
pub struct CachedController<C> {
    controller: ConvergenceController,
    cache: C,
}

impl<C: ResultCache> CachedController<C> {
    /// Wrap a controller.
    pub fn new(controller: ConvergenceController, cache: C) -> Self {
        Self { controller, cache }
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &ConvergenceController {
        &self.controller
    }

    /// The cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Return a cached result or run and cache it.
    ///
    /// Cancelled runs are never cached since they depend on timing.
    pub fn run(
        &self,
        chain_a: &Chain,
        chain_b: &Chain,
        cosmology_a: &Cosmology,
        cosmology_b: &Cosmology,
        schedule: &ResolutionSchedule,
    ) -> Result<ConvergenceResult> {
        let key = InputDigest::compute(
            MeasurementProgram::new(chain_a, cosmology_a),
            MeasurementProgram::new(chain_b, cosmology_b),
            schedule,
            self.controller.config(),
        );

        if let Some(hit) = self.cache.get(&key) {
            debug!(digest = %key, "Calibration cache hit");
            return Ok(hit);
        }

        let result = self
            .controller
            .run(chain_a, chain_b, cosmology_a, cosmology_b, schedule)?;
        if result.status != RunStatus::Cancelled {
            self.cache.put(key, result.clone());
        }
        Ok(result)
    }
}
