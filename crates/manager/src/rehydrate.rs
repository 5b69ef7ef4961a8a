use std::collections::BTreeSet;

use runtime::Clock;
use surface::RenderSurface;
use tracing::{debug, warn};

use crate::error::LayerError;
use crate::manager::LayerManager;

impl<S: RenderSurface, C: Clock> LayerManager<S, C> {
    /// Rebuilds the binding table from the surface, then recreates bindings
    /// for loaded categories that lost theirs, with their recorded
    /// visibility and zoom overrides. Feature data is not restored.
    ///
    /// Returns the number of bindings afterwards.
    pub(crate) fn rehydrate(&mut self) -> Result<usize, LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let previously_bound: BTreeSet<String> =
            self.bindings.iter().map(|b| b.category_id.clone()).collect();

        let found = self.bindings.rehydrate(&*surface);

        let mut recreated = 0;
        for category in self.registry.iter() {
            let id = category.id();
            if self.bindings.contains(id) {
                continue;
            }
            if !category.def.is_visible() && !previously_bound.contains(id) {
                continue;
            }
            match self.bindings.ensure(surface, category, &self.visibility) {
                Ok(_) => recreated += 1,
                Err(err) => warn!(category = %id, %err, "failed to recreate category layers"),
            }
        }

        let before = self.legacy.len();
        self.legacy.retain(|id| surface.has_source(id));
        self.labels.clear();

        debug!(
            found,
            recreated,
            pruned_legacy = before - self.legacy.len(),
            "restored bindings"
        );
        Ok(self.bindings.len())
    }
}
