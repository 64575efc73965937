//! Process-wide shared [`FrameCache`].
//!
//! Prefer passing a `FrameCache` explicitly; the registry exists for callers that need one cache
//! shared across independent components. It is fully resettable for test isolation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::frame_cache::{FrameCache, FrameCacheConfig};
use crate::foundation::error::{FramecastError, FramecastResult};

struct Registry {
    config: Option<FrameCacheConfig>,
    cache: Option<Arc<FrameCache>>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    config: None,
    cache: None,
});

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set the bounds used when the shared cache is next created.
///
/// Fails while a shared instance is live; call [`dispose`] first.
pub fn configure(max_frames: usize, max_memory_bytes: usize) -> FramecastResult<()> {
    let mut reg = registry();
    if reg.cache.is_some() {
        return Err(FramecastError::configuration(
            "shared frame cache is already in use; dispose it before reconfiguring",
        ));
    }
    reg.config = Some(FrameCacheConfig {
        max_frames,
        max_memory_bytes,
    });
    Ok(())
}

/// The shared cache, created on first access from the configured bounds (or
/// [`FrameCacheConfig::from_env`] when never configured).
pub fn shared() -> Arc<FrameCache> {
    let mut reg = registry();
    if let Some(cache) = &reg.cache {
        return cache.clone();
    }
    let cfg = reg.config.unwrap_or_else(FrameCacheConfig::from_env);
    tracing::debug!(
        max_frames = cfg.max_frames,
        max_memory_bytes = cfg.max_memory_bytes,
        "creating shared frame cache"
    );
    let cache = Arc::new(FrameCache::new(cfg));
    reg.cache = Some(cache.clone());
    cache
}

/// Discard the shared instance. The next [`shared`] call creates a fresh, empty cache.
///
/// Handles obtained earlier stay valid but are emptied and no longer shared.
pub fn dispose() {
    if let Some(cache) = registry().cache.take() {
        cache.clear_all();
    }
}

/// [`dispose`] and forget any configured bounds.
pub fn reset() {
    dispose();
    registry().config = None;
}

#[cfg(test)]
#[path = "../../tests/unit/cache/registry.rs"]
mod tests;
