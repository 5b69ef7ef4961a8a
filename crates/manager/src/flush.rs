use ingest::FeatureSet;
use runtime::Clock;
use surface::RenderSurface;
use tracing::{debug, warn};

use crate::manager::{LayerManager, ManagerEvent};

impl<S: RenderSurface, C: Clock> LayerManager<S, C> {
    /// Commits every staged category with one `set_source_data` each.
    ///
    /// The batch is emptied up front. A category whose binding or source is
    /// gone loses its staged features; they are not requeued. Returns the
    /// number of features written.
    pub(crate) fn flush(&mut self) -> usize {
        let staged = self.pending.take();
        if staged.is_empty() {
            return 0;
        }
        let Some(surface) = self.surface.as_mut() else {
            warn!(categories = staged.len(), "no surface at flush; dropping staged features");
            return 0;
        };

        let mut sources = Vec::new();
        let mut features = 0;
        for (category_id, set) in staged {
            let Some(binding) = self.bindings.get(&category_id) else {
                warn!(category = %category_id, dropped = set.len(), "no binding at flush; dropping staged features");
                continue;
            };
            let Some(existing) = surface.source_features(&binding.source_id) else {
                warn!(
                    category = %category_id,
                    source = %binding.source_id,
                    dropped = set.len(),
                    "bound source missing at flush; dropping staged features"
                );
                continue;
            };

            let count = set.len();
            let mut merged = FeatureSet::from_features(existing);
            merged.extend(set.into_features());
            if let Err(err) = surface.set_source_data(&binding.source_id, merged.into_features()) {
                warn!(category = %category_id, %err, "failed to replace source data");
                continue;
            }
            features += count;
            sources.push(binding.source_id.clone());
        }

        debug!(sources = sources.len(), features, "flushed pending batch");
        self.events.emit(ManagerEvent::BatchUpdated {
            sources: sources.clone(),
            features,
        });
        for source_id in &sources {
            self.labels.update_source_labels(&*surface, source_id);
        }
        features
    }
}
