//! Single-residency model cache.
//!
//! Only one model is loaded at a time to bound memory use. Requesting a
//! different identifier releases the resident model before the new one is
//! loaded. The slot is held behind a mutex for the whole load-and-generate
//! sequence, so loads never race and generation calls are serialized.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::error::{DaemonError, Result};

use super::capability::{ModelHandle, ModelLoader};
use super::registry::Resolution;

/// Holds at most one loaded model.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slot: Mutex<Option<Box<dyn ModelHandle>>>,
}

impl ModelCache {
    /// Creates an empty cache backed by `loader`.
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
        }
    }

    /// Loads the model for `resolution` unless it is already resident.
    pub fn ensure_loaded(&self, resolution: &Resolution) -> Result<()> {
        let mut slot = self.lock();
        self.load_into(&mut slot, resolution)
    }

    /// Runs `f` against the resident model for `resolution`, loading it first
    /// if needed. The cache stays locked while `f` runs.
    pub fn with_model<R>(
        &self,
        resolution: &Resolution,
        f: impl FnOnce(&mut dyn ModelHandle) -> R,
    ) -> Result<R> {
        let mut slot = self.lock();
        self.load_into(&mut slot, resolution)?;
        match slot.as_mut() {
            Some(handle) => Ok(f(handle.as_mut())),
            None => Err(DaemonError::model_load_failed(format!(
                "Model '{}' is not resident",
                resolution.model_id
            ))),
        }
    }

    /// Returns the identifier of the resident model.
    pub fn resident_model(&self) -> Option<String> {
        self.lock().as_ref().map(|h| h.model_id().to_string())
    }

    /// Releases the resident model, if any.
    pub fn unload(&self) {
        if let Some(handle) = self.lock().take() {
            info!(model = handle.model_id(), "Released model");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn ModelHandle>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_into(
        &self,
        slot: &mut Option<Box<dyn ModelHandle>>,
        resolution: &Resolution,
    ) -> Result<()> {
        if let Some(handle) = slot.as_ref() {
            if handle.model_id() == resolution.model_id {
                return Ok(());
            }
        }

        if !resolution.family.is_supported() {
            return Err(DaemonError::model_load_failed(format!(
                "{} models are not supported by any backend",
                resolution.family
            )));
        }

        // Drop the old model before loading so both are never resident.
        if let Some(old) = slot.take() {
            info!(model = old.model_id(), "Releasing model");
        }

        info!(model = %resolution.model_id, strategy = %resolution.strategy, "Loading model");
        let handle = self.loader.load(resolution)?;
        *slot = Some(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::capability::{ModelFailure, ProgressFn};
    use crate::models::registry::{InferenceStrategy, ModelRegistry};
    use crate::types::{GenerationConfig, Prompt, Waveform};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        loads: AtomicUsize,
        live: Arc<AtomicUsize>,
    }

    struct Handle {
        id: String,
        live: Arc<AtomicUsize>,
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ModelHandle for Handle {
        fn model_id(&self) -> &str {
            &self.id
        }
        fn sample_rate(&self) -> u32 {
            32000
        }
        fn channels(&self) -> usize {
            1
        }
        fn set_params(&mut self, _config: &GenerationConfig) {}
        fn generate(
            &mut self,
            _strategy: InferenceStrategy,
            prompts: &[Prompt],
            _progress: &mut ProgressFn<'_>,
        ) -> std::result::Result<Vec<Waveform>, ModelFailure> {
            Ok(prompts.iter().map(|_| Waveform::silence(1, 1, 32000)).collect())
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, resolution: &Resolution) -> Result<Box<dyn ModelHandle>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            // At most one handle alive at any time.
            assert_eq!(self.live.fetch_add(1, Ordering::SeqCst), 0);
            Ok(Box::new(Handle {
                id: resolution.model_id.clone(),
                live: self.live.clone(),
            }))
        }
    }

    fn setup() -> (Arc<CountingLoader>, ModelCache) {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        });
        let cache = ModelCache::new(loader.clone());
        (loader, cache)
    }

    fn resolve(id: &str) -> Resolution {
        ModelRegistry::new().resolve(id).unwrap()
    }

    #[test]
    fn same_model_loads_once() {
        let (loader, cache) = setup();
        let small = resolve("facebook/musicgen-small");

        cache.ensure_loaded(&small).unwrap();
        cache.ensure_loaded(&small).unwrap();
        cache.with_model(&small, |h| h.sample_rate()).unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resident_model().as_deref(), Some("facebook/musicgen-small"));
    }

    #[test]
    fn switching_releases_previous() {
        let (loader, cache) = setup();

        cache.ensure_loaded(&resolve("facebook/musicgen-small")).unwrap();
        cache.ensure_loaded(&resolve("facebook/audiogen-medium")).unwrap();

        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(loader.live.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resident_model().as_deref(), Some("facebook/audiogen-medium"));
    }

    #[test]
    fn unload_empties_cache() {
        let (loader, cache) = setup();
        cache.ensure_loaded(&resolve("facebook/musicgen-small")).unwrap();
        cache.unload();
        assert!(cache.resident_model().is_none());
        assert_eq!(loader.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupported_family_is_rejected() {
        let (loader, cache) = setup();
        let err = cache
            .ensure_loaded(&resolve("musiclang/musiclang-v2"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelLoadFailed);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_requests_are_serialized() {
        let (loader, cache) = setup();
        let cache = Arc::new(cache);
        let ids = ["facebook/musicgen-small", "facebook/musicgen-large"];

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                let resolution = resolve(ids[i % 2]);
                std::thread::spawn(move || {
                    cache.with_model(&resolution, |h| h.model_id().to_string()).unwrap()
                })
            })
            .collect();

        for (i, t) in threads.into_iter().enumerate() {
            assert_eq!(t.join().unwrap(), ids[i % 2]);
        }
        assert_eq!(loader.live.load(Ordering::SeqCst), 1);
    }
}
