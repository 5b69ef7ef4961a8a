use foundation::{GeometryBucket, legacy_layer_id};
use formats::{DEFAULT_CATEGORY_COLOR, Feature, StyleFragment};
use layers::symbology::{BucketStyle, bucket_overrides, family_of, layer_type_of};
use layers::filter::geometry_filter;
use runtime::Clock;
use surface::{LayerSpec, RenderSurface, SurfaceError};
use tracing::debug;

use crate::error::LayerError;
use crate::manager::LayerManager;

/// Legacy layers have no separate polygon outline.
const LEGACY_BUCKETS: [GeometryBucket; 3] = [GeometryBucket::Point, GeometryBucket::Line, GeometryBucket::Fill];

impl<S: RenderSurface, C: Clock> LayerManager<S, C> {
    /// Source `<id>` plus `<id>-point`, `<id>-line` and `<id>-fill`, created
    /// on first use.
    pub(crate) fn ensure_legacy_layer(&mut self, id: &str, style: Option<&StyleFragment>) -> Result<(), LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        if !surface.has_source(id) {
            surface.add_source(id, Vec::new())?;
        }

        let zoom = self.config.zoom.resolve(
            &[style.and_then(|s| s.min_zoom)],
            &[style.and_then(|s| s.max_zoom)],
        );
        for bucket in LEGACY_BUCKETS {
            let layer_id = legacy_layer_id(id, bucket);
            if surface.has_layer(&layer_id) {
                continue;
            }
            let overrides = style.and_then(|s| bucket_overrides(s, bucket));
            let composed = BucketStyle::compose(bucket, DEFAULT_CATEGORY_COLOR, 255, overrides);
            let mut spec = LayerSpec::new(&layer_id, layer_type_of(bucket), id);
            spec.filter = Some(geometry_filter(family_of(bucket)));
            spec.paint = composed.paint;
            spec.layout = composed.layout;
            spec.zoom = self.visibility.zoom_override(&layer_id).unwrap_or(zoom);
            spec.set_visible(self.visibility.is_layer_visible(id) && self.visibility.is_layer_visible(&layer_id));
            surface.add_layer(spec)?;
        }

        if self.legacy.insert(id.to_string()) {
            debug!(layer = id, "created legacy layer");
        }
        Ok(())
    }

    /// Immediate read-modify-write of a legacy source.
    pub(crate) fn legacy_upsert(
        &mut self,
        id: &str,
        features: Vec<Feature>,
        style: Option<&StyleFragment>,
    ) -> Result<(), LayerError> {
        self.ensure_legacy_layer(id, style)?;
        self.merge_into_source(id, features)
    }

    pub(crate) fn apply_create_layer(&mut self, id: &str, style: Option<&StyleFragment>) -> Result<(), LayerError> {
        if self.registry.contains(id) {
            return self.ensure_category(id).map(|_| ());
        }
        self.ensure_legacy_layer(id, style)
    }

    /// Category ids tear down their binding; other ids their legacy layers.
    /// Removing something that does not exist is a no-op.
    pub(crate) fn apply_remove_layer(&mut self, id: &str) -> Result<(), LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;

        if self.registry.contains(id) || self.bindings.contains(id) {
            let removed = self.bindings.remove(surface, id)?;
            let dropped = self.pending.clear_category(id);
            self.visibility.forget(id);
            if let Some(binding) = removed {
                self.labels.update_source_labels(&*surface, &binding.source_id);
            }
            debug!(category = id, dropped, "removed category layers");
            return Ok(());
        }

        let mut layer_ids: Vec<String> = GeometryBucket::ALL
            .into_iter()
            .map(|b| legacy_layer_id(id, b))
            .collect();
        layer_ids.push(id.to_string());
        for layer_id in &layer_ids {
            match surface.remove_layer(layer_id) {
                Ok(()) | Err(SurfaceError::MissingLayer(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        match surface.remove_source(id) {
            Ok(()) | Err(SurfaceError::MissingSource(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.legacy.remove(id);
        self.visibility.forget(id);
        self.labels.update_source_labels(&*surface, id);
        debug!(layer = id, "removed legacy layer");
        Ok(())
    }
}
