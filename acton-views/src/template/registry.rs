//! Compiled template cache
//!
//! Keeps one compiled template per reference for the lifetime of the
//! registry. Concurrent requests for a reference that is not cached yet share
//! a single compile; a compile that fails leaves nothing behind, so the next
//! request compiles again.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::service::CompiledTemplate;
use crate::error::ViewResult;

type Slot = Arc<OnceCell<CompiledTemplate>>;

/// Template registry for caching compiled templates
///
/// With caching disabled every lookup compiles afresh and nothing is stored.
#[derive(Clone)]
pub struct TemplateRegistry {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    cache_enabled: bool,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

impl TemplateRegistry {
    /// Create a new template registry with caching enabled
    #[must_use]
    pub fn new() -> Self {
        Self::with_caching(true)
    }

    /// Create a new template registry with explicit cache control
    #[must_use]
    pub fn with_caching(cache_enabled: bool) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            cache_enabled,
        }
    }

    /// Get a cached template
    ///
    /// Returns `None` if caching is disabled or the template is not compiled.
    #[must_use]
    pub fn get(&self, reference: &str) -> Option<CompiledTemplate> {
        if !self.cache_enabled {
            return None;
        }

        self.slots.lock().get(reference).and_then(|slot| slot.get().cloned())
    }

    /// Return the cached template for `reference`, compiling it on a miss
    ///
    /// # Errors
    ///
    /// Returns whatever `compile` returns; the failure is not cached.
    pub async fn get_or_compile<F, Fut>(
        &self,
        reference: &str,
        compile: F,
    ) -> ViewResult<CompiledTemplate>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ViewResult<CompiledTemplate>>,
    {
        if !self.cache_enabled {
            return compile().await;
        }

        let slot = Arc::clone(self.slots.lock().entry(reference.to_owned()).or_default());

        if let Some(template) = slot.get() {
            tracing::debug!(reference, "template cache hit");
            return Ok(template.clone());
        }

        match slot.get_or_try_init(compile).await {
            Ok(template) => Ok(template.clone()),
            Err(err) => {
                self.discard(reference, &slot);
                Err(err)
            }
        }
    }

    /// Clear all cached templates
    ///
    /// Useful for development hot-reload or cache invalidation.
    pub fn clear(&self) {
        self.slots.lock().clear();
        tracing::debug!("template cache cleared");
    }

    /// Check if caching is enabled
    #[must_use]
    pub const fn is_caching_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Get the number of cached templates
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Remove a slot left empty by a failed compile
    ///
    /// Slots are only cloned under the lock, so a strong count above two (map
    /// and caller) means another request is still waiting to initialize it.
    fn discard(&self, reference: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        let is_abandoned = slots.get(reference).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
        if is_abandoned {
            slots.remove(reference);
        }
    }
}
