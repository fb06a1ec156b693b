//! Queue router - picks the destination list for a batch
//!
//! Unsharded deployments always use the base key. Sharded deployments pick
//! one of `<base>.pub.<0..N-1>` uniformly at random per batch. Routing never
//! looks at message content: splitting a broadcast by channel would break
//! single-batch delivery, and Scribe gives no cross-batch ordering to keep.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Selects a queue key per batch
pub struct QueueRouter {
    default_key: String,
    /// Prebuilt so selection does no formatting
    shard_keys: Vec<String>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl QueueRouter {
    /// Create a router with `shards` shard keys derived from `base_key`
    ///
    /// `shards == 0` means unsharded.
    pub fn new(base_key: impl Into<String>, shards: usize) -> Self {
        Self::with_rng(base_key, shards, StdRng::from_entropy())
    }

    /// Create a router drawing shard indices from `rng`
    pub fn with_rng<R>(base_key: impl Into<String>, shards: usize, rng: R) -> Self
    where
        R: RngCore + Send + 'static,
    {
        let default_key = base_key.into();
        let shard_keys = (0..shards).map(|i| shard_key(&default_key, i)).collect();
        Self {
            default_key,
            shard_keys,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Pick the queue for the next batch
    pub fn select(&self) -> &str {
        if self.shard_keys.is_empty() {
            return &self.default_key;
        }
        let shard = self.rng.lock().gen_range(0..self.shard_keys.len());
        &self.shard_keys[shard]
    }

    /// The unsharded key
    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// All shard keys, empty when unsharded
    pub fn shard_keys(&self) -> &[String] {
        &self.shard_keys
    }
}

/// Name of shard `index` of `base`
pub fn shard_key(base: &str, index: usize) -> String {
    format!("{base}.pub.{index}")
}
