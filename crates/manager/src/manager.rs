use std::collections::{BTreeMap, BTreeSet};

use foundation::{Timestamp, category_source_id};
use formats::{CategoryManifest, Feature, ManifestError, Payload, StyleFragment, parse_layer_settings};
use ingest::{FeatureSet, PendingBatch, Resolution, resolve_feature, resolve_id};
use layers::filter::{add_filter_for_category, remove_filter_for_category};
use layers::{
    BindingTable, Category, CategoryRegistry, LabelOverlay, LayerBinding, NoLabels, SourceLabels,
    VisibilityState, toggle_targets,
};
use runtime::{Clock, DeferredQueue, Event, EventBus, FlushScheduler};
use serde_json::{Map, Value};
use surface::{RenderSurface, SurfaceError};
use tracing::{debug, warn};

use crate::command::Command;
use crate::config::ManagerConfig;
use crate::error::LayerError;

/// Outbound notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// A manifest was loaded and its visible categories bound.
    CategoriesUpdated { count: usize },
    /// Features were written to these sources, by a flush or a bulk load.
    BatchUpdated { sources: Vec<String>, features: usize },
}

/// Owns category, binding and batching state for one render surface.
///
/// Every inbound operation goes through [`LayerManager::submit`]: before a
/// surface is attached it is queued, afterwards it runs immediately.
/// Staged features are written when [`LayerManager::tick`] observes the
/// debounce deadline, or on [`LayerManager::force_flush`].
pub struct LayerManager<S, C> {
    pub(crate) config: ManagerConfig,
    pub(crate) clock: C,
    pub(crate) surface: Option<S>,
    pub(crate) registry: CategoryRegistry,
    pub(crate) bindings: BindingTable,
    pub(crate) visibility: VisibilityState,
    pub(crate) pending: PendingBatch,
    pub(crate) scheduler: FlushScheduler,
    pub(crate) deferred: DeferredQueue<Command>,
    pub(crate) legacy: BTreeSet<String>,
    pub(crate) events: EventBus<ManagerEvent>,
    pub(crate) labels: Box<dyn LabelOverlay>,
}

/// Immediate writes performed while routing one payload.
#[derive(Debug, Default)]
pub(crate) struct Routed {
    pub sources: Vec<String>,
    pub features: usize,
}

fn starts_visible(category: &Category, visibility: &VisibilityState) -> bool {
    category.def.is_visible() && !visibility.is_category_hidden(category.id())
}

fn parse_payload(payload: &Value) -> Result<Payload, LayerError> {
    let parsed = match payload {
        Value::String(text) => Payload::from_geojson_str(text),
        other => Payload::from_geojson_value(other),
    };
    parsed.map_err(|err| {
        warn!(%err, "rejected feature payload");
        LayerError::Payload(err)
    })
}

impl<S: RenderSurface, C: Clock> LayerManager<S, C> {
    pub fn new(config: ManagerConfig, clock: C) -> Self {
        let labels: Box<dyn LabelOverlay> = match &config.labels {
            Some(rules) => Box::new(SourceLabels::new(rules.clone())),
            None => Box::new(NoLabels),
        };
        let events = EventBus::with_capacity(config.event_capacity);
        Self {
            scheduler: FlushScheduler::new(config.debounce()),
            config,
            clock,
            surface: None,
            registry: CategoryRegistry::new(),
            bindings: BindingTable::new(),
            visibility: VisibilityState::new(),
            pending: PendingBatch::new(),
            deferred: DeferredQueue::new(),
            legacy: BTreeSet::new(),
            events,
            labels,
        }
    }

    pub fn with_label_overlay(mut self, overlay: impl LabelOverlay + 'static) -> Self {
        self.labels = Box::new(overlay);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // Lifecycle

    /// Attaches the surface and replays queued operations in submission
    /// order. Returns how many were replayed.
    pub fn init(&mut self, surface: S) -> usize {
        if self.surface.is_some() {
            warn!("surface already attached; resetting before re-init");
            self.reset();
        }
        self.surface = Some(surface);

        let queued = self.deferred.drain();
        let replayed = queued.len();
        for (id, command) in queued {
            let op = command.name();
            if let Err(err) = self.execute(command) {
                warn!(deferred = id.0, op, %err, "replayed operation failed");
            }
        }
        debug!(replayed, "render surface attached");
        replayed
    }

    /// Detaches the surface and forgets all state, including queued
    /// operations. Event subscribers are kept.
    pub fn reset(&mut self) -> Option<S> {
        self.registry = CategoryRegistry::new();
        self.bindings.clear();
        self.visibility.clear();
        self.pending.clear();
        self.scheduler.cancel();
        self.deferred.clear();
        self.legacy.clear();
        self.labels.clear();
        self.surface.take()
    }

    pub fn is_ready(&self) -> bool {
        self.surface.is_some()
    }

    /// Flushes if the debounce deadline has passed. Returns `true` if it did.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now();
        if !self.scheduler.poll(now) {
            return false;
        }
        self.flush();
        true
    }

    pub fn next_flush_deadline(&self) -> Option<Timestamp> {
        self.scheduler.deadline()
    }

    // Inbound operations

    /// Runs `command` now, or queues it until a surface is attached.
    pub fn submit(&mut self, command: Command) -> Result<(), LayerError> {
        if !self.is_ready() {
            let op = command.name();
            let id = self.deferred.push(command);
            debug!(deferred = id.0, op, queued = self.deferred.len(), "surface not ready; queued");
            return Ok(());
        }
        self.execute(command)
    }

    pub fn load_categories(&mut self, manifest: Value) -> Result<(), LayerError> {
        self.submit(Command::LoadCategories { manifest })
    }

    pub fn load_categories_json(&mut self, text: &str) -> Result<(), LayerError> {
        let manifest = serde_json::from_str(text).map_err(|e| ManifestError::Json(e.to_string()))?;
        self.load_categories(manifest)
    }

    /// `payload` is a GeoJSON value, or GeoJSON text still to be parsed.
    ///
    /// `style` only applies when the call creates a legacy layer; features
    /// routed to a category keep the manifest's styling.
    pub fn add_feature(
        &mut self,
        id: &str,
        object_id: &str,
        payload: impl Into<Value>,
        style: Option<StyleFragment>,
    ) -> Result<(), LayerError> {
        self.submit(Command::AddFeature {
            id: id.to_string(),
            object_id: object_id.to_string(),
            payload: payload.into(),
            style,
        })
    }

    pub fn load_feature_collection(&mut self, id: &str, collection: impl Into<Value>) -> Result<(), LayerError> {
        self.submit(Command::LoadFeatureCollection {
            id: id.to_string(),
            collection: collection.into(),
        })
    }

    pub fn batch_update_layers(&mut self, layers: Map<String, Value>) -> Result<(), LayerError> {
        self.submit(Command::BatchUpdateLayers { layers })
    }

    pub fn remove_object(&mut self, id: &str, object_id: &str) -> Result<(), LayerError> {
        self.submit(Command::RemoveObject {
            id: id.to_string(),
            object_id: object_id.to_string(),
        })
    }

    pub fn show_layer(&mut self, id: &str) -> Result<(), LayerError> {
        self.submit(Command::ShowLayer { id: id.to_string() })
    }

    pub fn hide_layer(&mut self, id: &str) -> Result<(), LayerError> {
        self.submit(Command::HideLayer { id: id.to_string() })
    }

    pub fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), LayerError> {
        self.submit(Command::SetLayerVisibility {
            id: id.to_string(),
            visible,
        })
    }

    pub fn set_layer_selectable(&mut self, id: &str, selectable: bool) -> Result<(), LayerError> {
        self.submit(Command::SetLayerSelectable {
            id: id.to_string(),
            selectable,
        })
    }

    pub fn update_layer_settings(&mut self, settings: impl Into<Value>) -> Result<(), LayerError> {
        self.submit(Command::UpdateLayerSettings {
            settings: settings.into(),
        })
    }

    pub fn create_layer(&mut self, id: &str, style: Option<StyleFragment>) -> Result<(), LayerError> {
        self.submit(Command::CreateLayer {
            id: id.to_string(),
            style,
        })
    }

    pub fn remove_layer(&mut self, id: &str) -> Result<(), LayerError> {
        self.submit(Command::RemoveLayer { id: id.to_string() })
    }

    pub fn clear_category(&mut self, id: &str) -> Result<(), LayerError> {
        self.submit(Command::ClearCategory { id: id.to_string() })
    }

    pub fn set_category_filter(&mut self, layer_id: &str, category_id: &str, visible: bool) -> Result<(), LayerError> {
        self.submit(Command::SetCategoryFilter {
            layer_id: layer_id.to_string(),
            category_id: category_id.to_string(),
            visible,
        })
    }

    pub fn force_flush(&mut self) -> Result<(), LayerError> {
        self.submit(Command::ForceFlush)
    }

    pub fn restore_bindings(&mut self) -> Result<(), LayerError> {
        self.submit(Command::RestoreBindings)
    }

    // Introspection

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn category_ids(&self) -> Vec<String> {
        self.registry.ids().map(str::to_string).collect()
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.registry.get(id)
    }

    pub fn binding(&self, category_id: &str) -> Option<&LayerBinding> {
        self.bindings.get(category_id)
    }

    pub fn legacy_layer_ids(&self) -> impl Iterator<Item = &str> {
        self.legacy.iter().map(String::as_str)
    }

    /// Features currently on the surface for a category or legacy layer.
    pub fn feature_count(&self, id: &str) -> usize {
        let source_id = match self.bindings.get(id) {
            Some(binding) => binding.source_id.clone(),
            None if self.registry.contains(id) => category_source_id(id),
            None => id.to_string(),
        };
        self.surface
            .as_ref()
            .and_then(|s| s.source_features(&source_id))
            .map_or(0, |f| f.len())
    }

    /// Staged features not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Operations waiting for a surface.
    pub fn queued_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        let layer_visible = |layer_id: &str| {
            self.surface
                .as_ref()
                .and_then(|s| s.layer(layer_id))
                .is_some_and(|l| l.is_visible())
        };
        if let Some(binding) = self.bindings.get(id) {
            return binding.layer_ids.iter().any(|l| layer_visible(l.as_str()));
        }
        if let Some(category) = self.registry.get(id) {
            return starts_visible(category, &self.visibility);
        }
        match &self.surface {
            Some(surface) => {
                let targets = toggle_targets(surface, id);
                if targets.is_empty() {
                    self.visibility.is_layer_visible(id)
                } else {
                    targets.iter().any(|l| layer_visible(l.as_str()))
                }
            }
            None => self.visibility.is_layer_visible(id),
        }
    }

    /// Explicit override, then the style fragment, then the category flag.
    pub fn is_selectable(&self, id: &str) -> bool {
        self.visibility
            .selectable(id)
            .or_else(|| self.registry.style(id).and_then(|s| s.selectable))
            .unwrap_or_else(|| self.registry.get(id).is_none_or(|c| c.def.is_selectable()))
    }

    pub fn events(&self) -> &[Event<ManagerEvent>] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<Event<ManagerEvent>> {
        self.events.drain()
    }

    /// Once a subscriber is attached, new events are delivered but no
    /// longer retained for [`LayerManager::events`].
    pub fn subscribe(&mut self, f: impl FnMut(&Event<ManagerEvent>) + 'static) {
        self.events.subscribe(f);
    }

    // Execution

    fn execute(&mut self, command: Command) -> Result<(), LayerError> {
        match command {
            Command::LoadCategories { manifest } => self.apply_load_categories(&manifest),
            Command::AddFeature {
                id,
                object_id,
                payload,
                style,
            } => self.apply_add_feature(&id, &object_id, &payload, style.as_ref()),
            Command::LoadFeatureCollection { id, collection } => {
                self.apply_load_feature_collection(&id, &collection)
            }
            Command::BatchUpdateLayers { layers } => self.apply_batch_update(&layers),
            Command::RemoveObject { id, object_id } => self.apply_remove_object(&id, &object_id),
            Command::ShowLayer { id } => self.apply_visibility(&id, true),
            Command::HideLayer { id } => self.apply_visibility(&id, false),
            Command::SetLayerVisibility { id, visible } => self.apply_visibility(&id, visible),
            Command::SetLayerSelectable { id, selectable } => {
                self.visibility.set_selectable(&id, selectable);
                Ok(())
            }
            Command::UpdateLayerSettings { settings } => self.apply_layer_settings(&settings),
            Command::CreateLayer { id, style } => self.apply_create_layer(&id, style.as_ref()),
            Command::RemoveLayer { id } => self.apply_remove_layer(&id),
            Command::ClearCategory { id } => self.apply_clear_category(&id),
            Command::SetCategoryFilter {
                layer_id,
                category_id,
                visible,
            } => self.apply_category_filter(&layer_id, &category_id, visible),
            Command::ForceFlush => {
                self.scheduler.flush_now();
                self.flush();
                Ok(())
            }
            Command::RestoreBindings => self.rehydrate().map(|_| ()),
        }
    }

    fn apply_load_categories(&mut self, manifest: &Value) -> Result<(), LayerError> {
        let manifest = CategoryManifest::from_json_value(manifest)
            .inspect_err(|err| warn!(%err, "category manifest rejected; keeping previous categories"))?;
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let count = self.registry.load(manifest, &self.config.zoom);

        for category in self.registry.iter() {
            if !category.def.is_visible() {
                continue;
            }
            if let Err(err) = self.bindings.ensure(surface, category, &self.visibility) {
                warn!(category = %category.id(), %err, "failed to create category layers");
            }
        }

        self.events.emit(ManagerEvent::CategoriesUpdated { count });
        Ok(())
    }

    fn apply_add_feature(
        &mut self,
        id: &str,
        object_id: &str,
        payload: &Value,
        style: Option<&StyleFragment>,
    ) -> Result<(), LayerError> {
        let features = parse_payload(payload)?.normalize(object_id);
        if features.is_empty() {
            debug!(id, "payload carried no features");
            return Ok(());
        }
        self.route(id, features, style, false).map(|_| ())
    }

    fn apply_load_feature_collection(&mut self, id: &str, collection: &Value) -> Result<(), LayerError> {
        let features = parse_payload(collection)?.normalize(id);
        if features.is_empty() {
            debug!(id, "collection carried no features");
            return Ok(());
        }
        let routed = self.route(id, features, None, true)?;
        if !routed.sources.is_empty() {
            self.events.emit(ManagerEvent::BatchUpdated {
                sources: routed.sources,
                features: routed.features,
            });
        }
        Ok(())
    }

    /// Each collection is loaded like `load_feature_collection`; one event
    /// covers them all. A bad collection is skipped, the rest still load.
    fn apply_batch_update(&mut self, layers: &Map<String, Value>) -> Result<(), LayerError> {
        let mut sources = Vec::new();
        let mut features = 0;
        for (id, collection) in layers {
            let parsed = match parse_payload(collection) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(layer = %id, %err, "skipping collection in batch update");
                    continue;
                }
            };
            match self.route(id, parsed.normalize(id), None, true) {
                Ok(routed) => {
                    sources.extend(routed.sources);
                    features += routed.features;
                }
                Err(err) => warn!(layer = %id, %err, "collection in batch update not applied"),
            }
        }
        if !sources.is_empty() {
            self.events.emit(ManagerEvent::BatchUpdated { sources, features });
        }
        Ok(())
    }

    /// Classifies features and sends each group down its path.
    ///
    /// With `bulk` set, a payload whose features all resolve to one category
    /// is merged into its source immediately instead of being staged.
    fn route(
        &mut self,
        id: &str,
        features: Vec<Feature>,
        style: Option<&StyleFragment>,
        bulk: bool,
    ) -> Result<Routed, LayerError> {
        let mut by_category: BTreeMap<String, Vec<Feature>> = BTreeMap::new();
        let mut legacy = Vec::new();
        let mut unresolved = 0;
        for mut feature in features {
            match resolve_feature(&feature, id, |c| self.registry.contains(c)) {
                Resolution::Category(category_id) => {
                    feature.set_category_id(&category_id);
                    by_category.entry(category_id).or_default().push(feature);
                }
                Resolution::Legacy(_) => legacy.push(feature),
                Resolution::Unresolved => unresolved += 1,
            }
        }
        if unresolved > 0 {
            warn!(id, dropped = unresolved, "dropping features with no category or layer");
            if by_category.is_empty() && legacy.is_empty() {
                return Err(LayerError::Unresolved);
            }
        }

        if style.is_some() && !by_category.is_empty() {
            debug!(id, categories = by_category.len(), "style ignored for category features; the manifest styles them");
        }

        let mut routed = Routed::default();
        if bulk && legacy.is_empty() && by_category.len() == 1 {
            if let Some((category_id, features)) = by_category.pop_first() {
                routed.features += self.write_category_now(&category_id, features)?;
                routed.sources.push(category_source_id(&category_id));
            }
        } else {
            let mut staged = 0;
            for (category_id, features) in by_category {
                if let Err(err) = self.ensure_category(&category_id) {
                    warn!(category = %category_id, %err, dropped = features.len(), "cannot stage features");
                    continue;
                }
                staged += features.len();
                for feature in features {
                    self.pending.stage(&category_id, feature);
                }
            }
            if staged > 0 {
                let deadline = self.scheduler.schedule(self.clock.now());
                debug!(id, staged, pending = self.pending.len(), deadline = deadline.as_millis(), "staged features");
            }
        }

        if !legacy.is_empty() {
            routed.features += legacy.len();
            self.legacy_upsert(id, legacy, style)?;
            routed.sources.push(id.to_string());
        }
        Ok(routed)
    }

    /// Creates the category's binding if it has none.
    pub(crate) fn ensure_category(&mut self, category_id: &str) -> Result<&LayerBinding, LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let category = self
            .registry
            .get(category_id)
            .ok_or_else(|| LayerError::UnknownCategory(category_id.to_string()))?;
        Ok(self.bindings.ensure(surface, category, &self.visibility)?)
    }

    fn write_category_now(&mut self, category_id: &str, features: Vec<Feature>) -> Result<usize, LayerError> {
        let source_id = self.ensure_category(category_id)?.source_id.clone();
        let keys: Vec<String> = features.iter().filter_map(Feature::object_id).collect();
        let count = features.len();
        self.merge_into_source(&source_id, features)?;
        let superseded = self.pending.discard_keys(category_id, keys.iter().map(String::as_str));
        debug!(category = category_id, count, superseded, "wrote collection immediately");
        Ok(count)
    }

    /// Upserts `features` into a source with one whole-data replacement.
    pub(crate) fn merge_into_source(&mut self, source_id: &str, features: Vec<Feature>) -> Result<(), LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let existing = surface
            .source_features(source_id)
            .ok_or_else(|| SurfaceError::MissingSource(source_id.to_string()))?;
        let mut merged = FeatureSet::from_features(existing);
        merged.extend(features);
        surface.set_source_data(source_id, merged.into_features())?;
        self.labels.update_source_labels(&*surface, source_id);
        Ok(())
    }

    /// Immediate removal; a staged write for the same object is dropped too.
    fn apply_remove_object(&mut self, id: &str, object_id: &str) -> Result<(), LayerError> {
        if object_id.is_empty() {
            return Err(LayerError::Unresolved);
        }
        let known = |c: &str| self.registry.contains(c) || self.bindings.contains(c);
        match resolve_id(id, known) {
            Resolution::Category(category_id) => {
                let dropped = self.pending.remove_object(&category_id, object_id);
                let Some(source_id) = self.bindings.get(&category_id).map(|b| b.source_id.clone()) else {
                    if dropped > 0 {
                        return Ok(());
                    }
                    return Err(LayerError::MissingBinding(category_id));
                };
                self.remove_from_source(&source_id, object_id)
            }
            Resolution::Legacy(layer_id) => self.remove_from_source(&layer_id, object_id),
            Resolution::Unresolved => Err(LayerError::Unresolved),
        }
    }

    fn remove_from_source(&mut self, source_id: &str, object_id: &str) -> Result<(), LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let existing = surface
            .source_features(source_id)
            .ok_or_else(|| SurfaceError::MissingSource(source_id.to_string()))?;
        let mut set = FeatureSet::from_features(existing);
        let removed = set.remove_object(object_id);
        if removed == 0 {
            debug!(source = source_id, object_id, "nothing to remove");
            return Ok(());
        }
        surface.set_source_data(source_id, set.into_features())?;
        self.labels.update_source_labels(&*surface, source_id);
        debug!(source = source_id, object_id, removed, "removed object");
        Ok(())
    }

    /// Categories toggle every bound layer and the hidden set; anything else
    /// is a raw layer id or a legacy composite.
    fn apply_visibility(&mut self, id: &str, visible: bool) -> Result<(), LayerError> {
        if self.registry.contains(id) || self.bindings.contains(id) {
            self.visibility.set_category_hidden(id, !visible);
            if visible && self.registry.contains(id) && !self.bindings.contains(id) {
                self.ensure_category(id)?;
            }
            let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
            if let Some(binding) = self.bindings.get(id) {
                let applied = self.visibility.apply(surface, &binding.layer_ids, visible);
                debug!(category = id, applied, visible, "category visibility");
            }
            return Ok(());
        }

        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let targets = toggle_targets(&*surface, id);
        if targets.is_empty() {
            // Remembered so a legacy layer created later starts in this state.
            self.visibility.apply(surface, &[id.to_string()], visible);
            return Err(LayerError::UnknownLayer(id.to_string()));
        }
        self.visibility.apply(surface, &targets, visible);
        Ok(())
    }

    fn apply_layer_settings(&mut self, settings: &Value) -> Result<(), LayerError> {
        let text = match settings {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let settings = parse_layer_settings(&text).inspect_err(|err| warn!(%err, "layer settings rejected"))?;

        for setting in settings {
            if let Some(visible) = setting.visible
                && let Err(err) = self.apply_visibility(&setting.id, visible)
            {
                warn!(layer = %setting.id, %err, "visibility setting not applied");
            }
            if let Some(selectable) = setting.selectable {
                self.visibility.set_selectable(&setting.id, selectable);
            }
            if (setting.min_zoom.is_some() || setting.max_zoom.is_some())
                && let Err(err) = self.apply_zoom_override(&setting.id, setting.min_zoom, setting.max_zoom)
            {
                warn!(layer = %setting.id, %err, "zoom setting not applied");
            }
        }
        Ok(())
    }

    /// Each end is replaced only by a sane value; otherwise the layer keeps
    /// its current end.
    fn apply_zoom_override(&mut self, id: &str, min: Option<f64>, max: Option<f64>) -> Result<(), LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let targets = match self.bindings.get(id) {
            Some(binding) => binding.layer_ids.clone(),
            None => toggle_targets(&*surface, id),
        };
        if targets.is_empty() {
            return Err(LayerError::UnknownLayer(id.to_string()));
        }
        for layer_id in &targets {
            let Some(layer) = surface.layer(layer_id) else {
                continue;
            };
            let zoom = self
                .config
                .zoom
                .resolve(&[min, Some(layer.zoom.min)], &[max, Some(layer.zoom.max)]);
            surface.set_layer_zoom_range(layer_id, zoom)?;
            self.visibility.set_zoom_override(layer_id, zoom);
        }
        Ok(())
    }

    fn apply_clear_category(&mut self, id: &str) -> Result<(), LayerError> {
        if !self.registry.contains(id) && !self.bindings.contains(id) {
            return Err(LayerError::UnknownCategory(id.to_string()));
        }
        let dropped = self.pending.clear_category(id);
        let Some(source_id) = self.bindings.get(id).map(|b| b.source_id.clone()) else {
            debug!(category = id, dropped, "cleared staged features of unbound category");
            return Ok(());
        };
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        surface.set_source_data(&source_id, Vec::new())?;
        self.labels.update_source_labels(&*surface, &source_id);
        debug!(category = id, dropped, "cleared category");
        Ok(())
    }

    /// Hides or reveals one category's features on a shared legacy layer.
    fn apply_category_filter(&mut self, layer_id: &str, category_id: &str, visible: bool) -> Result<(), LayerError> {
        let surface = self.surface.as_mut().ok_or(LayerError::NotReady)?;
        let targets = toggle_targets(&*surface, layer_id);
        if targets.is_empty() {
            return Err(LayerError::UnknownLayer(layer_id.to_string()));
        }
        for target in &targets {
            let current = surface.layer(target).and_then(|l| l.filter);
            let next = if visible {
                remove_filter_for_category(current.as_ref(), category_id)
            } else {
                Some(add_filter_for_category(current.as_ref(), category_id))
            };
            surface.set_layer_filter(target, next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{GeoPoint, Geometry};
    use pretty_assertions::assert_eq;
    use runtime::VirtualClock;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use surface::{MemorySurface, ZoomRange};

    type Manager = LayerManager<MemorySurface, VirtualClock>;

    fn manager(clock: &VirtualClock) -> Manager {
        LayerManager::new(ManagerConfig::default(), clock.clone())
    }

    fn ready(clock: &VirtualClock) -> Manager {
        let mut m = manager(clock);
        m.init(MemorySurface::new());
        m
    }

    fn point(x: f64, y: f64) -> Value {
        json!({"type": "Feature", "geometry": {"type": "Point", "coordinates": [x, y]}, "properties": {}})
    }

    fn features(m: &Manager, source_id: &str) -> Vec<Feature> {
        m.surface()
            .and_then(|s| s.source_features(source_id))
            .unwrap_or_default()
    }

    fn set_data_calls(m: &Manager, source_id: &str) -> u64 {
        m.surface().map_or(0, |s| s.set_data_calls(source_id))
    }

    fn layer_zoom(m: &Manager, layer_id: &str) -> Option<ZoomRange> {
        m.surface().and_then(|s| s.layer(layer_id)).map(|l| l.zoom)
    }

    fn layer_visible(m: &Manager, layer_id: &str) -> bool {
        m.surface()
            .and_then(|s| s.layer(layer_id))
            .is_some_and(|l| l.is_visible())
    }

    #[test]
    fn scenario_upsert_single_point() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1", "color": "#ff0000"}])).unwrap();

        m.add_feature("c1", "f1", point(1.0, 2.0), None).unwrap();
        m.force_flush().unwrap();
        let got = features(&m, "category-c1");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].object_id().as_deref(), Some("f1"));
        assert_eq!(got[0].category_id(), Some("c1"));

        m.add_feature("c1", "f1", point(5.0, 6.0), None).unwrap();
        m.force_flush().unwrap();
        let got = features(&m, "category-c1");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].geometry, Geometry::Point(GeoPoint::new(5.0, 6.0)));

        let rendered = m.surface().unwrap().rendered_features("category-c1-point", 10.0);
        assert_eq!(rendered.len(), 1);
    }

    #[test]
    fn latest_staged_write_wins() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.add_feature("c1", "f1", point(1.0, 1.0), None).unwrap();
        m.add_feature("c1", "f1", point(2.0, 2.0), None).unwrap();
        assert_eq!(m.pending_len(), 1);
        m.force_flush().unwrap();
        let got = features(&m, "category-c1");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].geometry, Geometry::Point(GeoPoint::new(2.0, 2.0)));
    }

    #[test]
    fn writes_within_window_coalesce_into_one_set_data() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}, {"id": "c2"}])).unwrap();

        for i in 0..10 {
            m.add_feature("c1", &format!("a{i}"), point(i as f64, 0.0), None).unwrap();
            clock.advance(Duration::from_millis(60));
        }
        m.add_feature("c2", "b", point(0.0, 0.0), None).unwrap();
        assert!(!m.tick());

        clock.advance(Duration::from_millis(99));
        assert!(!m.tick());
        clock.advance(Duration::from_millis(1));
        assert!(m.tick());
        assert!(!m.tick());

        assert_eq!(set_data_calls(&m, "category-c1"), 1);
        assert_eq!(set_data_calls(&m, "category-c2"), 1);
        assert_eq!(m.feature_count("c1"), 10);
        assert_eq!(m.next_flush_deadline(), None);

        let batches: Vec<_> = m
            .events()
            .iter()
            .filter(|e| matches!(e.payload, ManagerEvent::BatchUpdated { .. }))
            .collect();
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn insane_min_zoom_is_clamped_to_default() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1", "minZoom": 22}, {"id": "c2", "minZoom": 6, "maxZoom": 14}]))
            .unwrap();
        assert_eq!(layer_zoom(&m, "category-c1-point"), Some(ZoomRange::new(0.0, 24.0)));
        assert_eq!(layer_zoom(&m, "category-c2-fill"), Some(ZoomRange::new(6.0, 14.0)));
    }

    #[test]
    fn queued_operations_replay_in_order() {
        let clock = VirtualClock::new();
        let mut queued = manager(&clock);
        queued.create_layer("A", None).unwrap();
        queued.add_feature("A", "o1", point(1.0, 2.0), None).unwrap();
        assert!(!queued.is_ready());
        assert_eq!(queued.queued_len(), 2);
        assert_eq!(queued.init(MemorySurface::new()), 2);
        assert_eq!(queued.queued_len(), 0);

        let mut direct = ready(&clock);
        direct.create_layer("A", None).unwrap();
        direct.add_feature("A", "o1", point(1.0, 2.0), None).unwrap();

        assert_eq!(
            queued.surface().unwrap().to_value(),
            direct.surface().unwrap().to_value()
        );
        assert_eq!(queued.feature_count("A"), 1);
    }

    #[test]
    fn failed_replay_does_not_stop_the_queue() {
        let clock = VirtualClock::new();
        let mut m = manager(&clock);
        m.add_feature("A", "o1", "{not json", None).unwrap();
        m.add_feature("A", "o2", point(0.0, 0.0), None).unwrap();
        m.init(MemorySurface::new());
        assert_eq!(m.feature_count("A"), 1);
    }

    #[test]
    fn restore_bindings_after_surface_rebuild() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([
            {"id": "c1", "minZoom": 3},
            {"id": "c2", "geometryTypes": ["Point"]},
            {"id": "c3", "visible": false}
        ]))
        .unwrap();
        m.add_feature("c1", "f1", point(0.0, 0.0), None).unwrap();
        m.force_flush().unwrap();
        let before: Vec<_> = m.surface().unwrap().layers();

        m.surface_mut().unwrap().rebuild();
        m.restore_bindings().unwrap();

        let after = m.surface().unwrap().layers();
        assert_eq!(
            after.iter().map(|l| (&l.id, l.zoom)).collect::<Vec<_>>(),
            before.iter().map(|l| (&l.id, l.zoom)).collect::<Vec<_>>()
        );
        assert_eq!(m.binding("c2").map(|b| b.layer_ids.len()), Some(1));
        assert!(m.binding("c3").is_none());
        assert_eq!(m.feature_count("c1"), 0);

        m.add_feature("c1", "f1", point(0.0, 0.0), None).unwrap();
        m.force_flush().unwrap();
        assert_eq!(m.feature_count("c1"), 1);
    }

    #[test]
    fn non_ascii_color_loads_without_panicking() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1", "color": "#aééa"}])).unwrap();
        assert!(m.binding("c1").is_some());
    }

    #[test]
    fn restore_bindings_keeps_settings_zoom() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.update_layer_settings(json!({"c1": {"minZoom": 5, "maxZoom": 12}})).unwrap();
        assert_eq!(layer_zoom(&m, "category-c1-point"), Some(ZoomRange::new(5.0, 12.0)));

        m.surface_mut().unwrap().rebuild();
        m.restore_bindings().unwrap();
        for bucket in ["point", "line", "fill", "stroke"] {
            let layer_id = format!("category-c1-{bucket}");
            assert_eq!(layer_zoom(&m, &layer_id), Some(ZoomRange::new(5.0, 12.0)), "{layer_id}");
        }
    }

    #[test]
    fn restore_bindings_keeps_shown_hidden_category_visible() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "b", "visible": false}])).unwrap();
        m.show_layer("b").unwrap();
        assert!(layer_visible(&m, "category-b-point"));

        m.surface_mut().unwrap().rebuild();
        m.restore_bindings().unwrap();
        assert!(layer_visible(&m, "category-b-point"));
        assert!(m.is_visible("b"));

        m.hide_layer("b").unwrap();
        m.surface_mut().unwrap().rebuild();
        m.restore_bindings().unwrap();
        assert!(!layer_visible(&m, "category-b-fill"));
    }

    #[test]
    fn restore_bindings_rediscovers_existing_layers() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        let expected = m.binding("c1").cloned();
        m.restore_bindings().unwrap();
        assert_eq!(m.binding("c1").cloned(), expected);
        assert_eq!(m.surface().unwrap().layers().len(), 4);
    }

    #[test]
    fn load_binds_visible_categories_and_notifies_once() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories_json(r#"{"version": "3", "categories": [{"id": "a"}, {"id": "b", "visible": false}, {"name": "no id"}]}"#)
            .unwrap();
        assert_eq!(m.category_ids(), vec!["a", "b"]);
        assert!(m.binding("a").is_some());
        assert!(m.binding("b").is_none());
        assert_eq!(m.drain_events().len(), 1);

        assert!(m.load_categories_json("[not json").is_err());
        assert!(m.load_categories(json!("nope")).is_err());
        assert_eq!(m.category_ids(), vec!["a", "b"]);
        assert!(m.events().is_empty());
    }

    #[test]
    fn hidden_category_binds_lazily_with_hidden_layers() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "b", "visible": false}])).unwrap();
        m.add_feature("b", "x", point(0.0, 0.0), None).unwrap();
        assert!(m.binding("b").is_some());
        assert!(!layer_visible(&m, "category-b-point"));
        assert!(!m.is_visible("b"));
    }

    #[test]
    fn routes_compound_and_feature_level_categories() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}, {"id": "c2"}])).unwrap();

        m.add_feature("layer_c1_7", "a", point(0.0, 0.0), None).unwrap();
        let tagged = json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [0, 0]},
            "properties": {"categoryId": "c1"}
        });
        m.add_feature("c2", "b", tagged, None).unwrap();
        m.force_flush().unwrap();

        assert_eq!(m.feature_count("c1"), 2);
        assert_eq!(m.feature_count("c2"), 0);
    }

    #[test]
    fn call_style_only_shapes_legacy_layers() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1", "color": "#ff0000"}])).unwrap();
        let style: StyleFragment =
            serde_json::from_value(json!({"point": {"paint": {"circle-color": "#00ff00"}}})).unwrap();

        m.add_feature("c1", "a", point(0.0, 0.0), Some(style.clone())).unwrap();
        m.add_feature("roads", "r", point(0.0, 0.0), Some(style)).unwrap();
        m.force_flush().unwrap();

        let paint = |layer_id: &str| {
            m.surface()
                .and_then(|s| s.layer(layer_id))
                .and_then(|l| l.paint.get("circle-color").cloned())
        };
        assert_eq!(paint("category-c1-point"), Some(json!("#ff0000")));
        assert_eq!(paint("roads-point"), Some(json!("#00ff00")));
        assert_eq!(m.feature_count("c1"), 1);
    }

    #[test]
    fn legacy_path_writes_immediately() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        let polygon = json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]});
        m.add_feature("parcels", "p1", polygon.clone(), None).unwrap();
        assert_eq!(m.pending_len(), 0);
        assert_eq!(m.feature_count("parcels"), 1);
        assert!(layer_visible(&m, "parcels-fill"));
        assert!(m.surface().unwrap().has_layer("parcels-point"));
        assert!(!m.surface().unwrap().has_layer("parcels-stroke"));

        m.add_feature("parcels", "p2", polygon, None).unwrap();
        assert_eq!(m.feature_count("parcels"), 2);
        assert_eq!(set_data_calls(&m, "parcels"), 2);
        assert_eq!(m.legacy_layer_ids().collect::<Vec<_>>(), vec!["parcels"]);
    }

    #[test]
    fn geometry_collection_children_share_removal() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        let gc = json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [0, 0]},
                {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
            ]
        });
        m.add_feature("c1", "obj", gc, None).unwrap();
        m.force_flush().unwrap();
        let ids: Vec<_> = features(&m, "category-c1").iter().filter_map(Feature::object_id).collect();
        assert_eq!(ids, vec!["obj_0", "obj_1"]);

        m.remove_object("c1", "obj").unwrap();
        assert_eq!(m.feature_count("c1"), 0);
    }

    #[test]
    fn remove_object_cancels_staged_write() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.add_feature("c1", "f1", point(0.0, 0.0), None).unwrap();
        m.remove_object("c1", "f1").unwrap();
        m.force_flush().unwrap();
        assert_eq!(m.feature_count("c1"), 0);

        // A write staged after the removal still lands.
        m.remove_object("c1", "f2").unwrap();
        m.add_feature("c1", "f2", point(0.0, 0.0), None).unwrap();
        m.force_flush().unwrap();
        assert_eq!(m.feature_count("c1"), 1);
    }

    #[test]
    fn category_visibility_toggles_every_layer() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();

        m.hide_layer("c1").unwrap();
        assert!(!m.is_visible("c1"));
        for bucket in ["point", "line", "fill", "stroke"] {
            assert!(!layer_visible(&m, &format!("category-c1-{bucket}")));
        }
        m.show_layer("c1").unwrap();
        assert!(m.is_visible("c1"));
        assert!(layer_visible(&m, "category-c1-stroke"));
    }

    #[test]
    fn hidden_category_stays_hidden_across_rebuild() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.set_layer_visibility("c1", false).unwrap();
        m.surface_mut().unwrap().rebuild();
        m.restore_bindings().unwrap();
        assert!(m.binding("c1").is_some());
        assert!(!layer_visible(&m, "category-c1-point"));
    }

    #[test]
    fn raw_layer_visibility_targets_composites() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.create_layer("parcels", None).unwrap();
        m.hide_layer("parcels").unwrap();
        assert!(!layer_visible(&m, "parcels-line"));
        assert!(!m.is_visible("parcels"));
        assert_eq!(m.hide_layer("nothing"), Err(LayerError::UnknownLayer("nothing".into())));
    }

    #[test]
    fn settings_blob_applies_visibility_selectability_and_zoom() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.update_layer_settings(r#"{"c1": {"visible": false, "selectable": false, "minZoom": 5, "maxZoom": 12}}"#)
            .unwrap();
        assert!(!m.is_visible("c1"));
        assert!(!m.is_selectable("c1"));
        assert_eq!(layer_zoom(&m, "category-c1-line"), Some(ZoomRange::new(5.0, 12.0)));

        m.update_layer_settings(json!({"layers": [{"id": "c1", "minZoom": 30}]})).unwrap();
        assert_eq!(layer_zoom(&m, "category-c1-line"), Some(ZoomRange::new(5.0, 12.0)));

        assert!(m.update_layer_settings("[{").is_err());
    }

    #[test]
    fn selectable_falls_back_to_style_then_category() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([
            {"id": "a", "selectable": false},
            {"id": "b", "style": {"selectable": false}},
            {"id": "c"}
        ]))
        .unwrap();
        assert!(!m.is_selectable("a"));
        assert!(!m.is_selectable("b"));
        assert!(m.is_selectable("c"));
        m.set_layer_selectable("a", true).unwrap();
        assert!(m.is_selectable("a"));
    }

    #[test]
    fn single_category_collection_bypasses_batching() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}, {"id": "c2"}])).unwrap();
        m.drain_events();

        m.add_feature("c1", "a", point(0.0, 0.0), None).unwrap();
        let fc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [9, 9]}, "properties": {"objectid": "a"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 1]}, "properties": {}}
            ]
        });
        m.load_feature_collection("c1", fc).unwrap();
        assert_eq!(m.feature_count("c1"), 2);
        assert_eq!(m.pending_len(), 0);
        assert_eq!(
            m.drain_events().pop().map(|e| e.payload),
            Some(ManagerEvent::BatchUpdated {
                sources: vec!["category-c1".into()],
                features: 2
            })
        );

        // The older staged write must not overwrite the bulk write.
        m.force_flush().unwrap();
        let a = features(&m, "category-c1").into_iter().find(|f| f.object_id().as_deref() == Some("a"));
        assert_eq!(a.map(|f| f.geometry), Some(Geometry::Point(GeoPoint::new(9.0, 9.0))));
    }

    #[test]
    fn mixed_collection_is_staged() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}, {"id": "c2"}])).unwrap();
        let fc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]}, "properties": {"categoryId": "c1"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]}, "properties": {"categoryId": "c2"}}
            ]
        });
        m.load_feature_collection("mixed", fc).unwrap();
        assert_eq!(m.pending_len(), 2);
        m.force_flush().unwrap();
        assert_eq!((m.feature_count("c1"), m.feature_count("c2")), (1, 1));
    }

    #[test]
    fn batch_update_loads_each_collection_with_one_event() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.drain_events();

        let mut layers = Map::new();
        layers.insert("c1".into(), json!({"type": "FeatureCollection", "features": [point(0.0, 0.0)]}));
        layers.insert("roads".into(), json!({"type": "FeatureCollection", "features": [point(1.0, 1.0)]}));
        layers.insert("broken".into(), json!({"type": "Nope"}));
        m.batch_update_layers(layers).unwrap();

        assert_eq!(m.feature_count("c1"), 1);
        assert_eq!(m.feature_count("roads"), 1);
        let events = m.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].payload,
            ManagerEvent::BatchUpdated {
                sources: vec!["category-c1".into(), "roads".into()],
                features: 2
            }
        );
    }

    #[test]
    fn payload_parse_failure_changes_nothing() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        let err = m.add_feature("c1", "x", "{not json", None).unwrap_err();
        assert!(matches!(err, LayerError::Payload(_)));
        assert_eq!(m.pending_len(), 0);
        assert_eq!(m.next_flush_deadline(), None);
    }

    #[test]
    fn unresolved_feature_is_rejected() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        assert_eq!(m.add_feature("", "", point(0.0, 0.0), None), Err(LayerError::Unresolved));
    }

    #[test]
    fn flush_skips_category_whose_source_vanished() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.add_feature("c1", "f1", point(0.0, 0.0), None).unwrap();
        m.surface_mut().unwrap().rebuild();
        m.drain_events();

        m.force_flush().unwrap();
        assert_eq!(m.pending_len(), 0);
        assert_eq!(
            m.drain_events().pop().map(|e| e.payload),
            Some(ManagerEvent::BatchUpdated {
                sources: Vec::new(),
                features: 0
            })
        );
    }

    #[test]
    fn category_filter_hides_features_on_shared_layer() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        let fc = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]}, "properties": {"categoryId": "x"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 1]}, "properties": {"categoryId": "y"}}
            ]
        });
        m.load_feature_collection("shared", fc).unwrap();
        assert_eq!(m.surface().unwrap().rendered_features("shared-point", 5.0).len(), 2);

        m.set_category_filter("shared", "x", false).unwrap();
        let shown = m.surface().unwrap().rendered_features("shared-point", 5.0);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].category_id(), Some("y"));

        m.set_category_filter("shared", "x", true).unwrap();
        assert_eq!(m.surface().unwrap().rendered_features("shared-point", 5.0).len(), 2);
    }

    #[test]
    fn clear_and_remove_category() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.add_feature("c1", "a", point(0.0, 0.0), None).unwrap();
        m.force_flush().unwrap();
        m.add_feature("c1", "b", point(0.0, 0.0), None).unwrap();

        m.clear_category("c1").unwrap();
        assert_eq!(m.feature_count("c1"), 0);
        assert_eq!(m.pending_len(), 0);

        m.remove_layer("c1").unwrap();
        assert!(m.binding("c1").is_none());
        assert!(m.surface().unwrap().layers().is_empty());
        m.remove_layer("c1").unwrap();
        assert!(matches!(m.clear_category("zzz"), Err(LayerError::UnknownCategory(_))));
    }

    #[test]
    fn flushed_sources_reach_the_label_overlay() {
        struct Recorder(Rc<RefCell<Vec<String>>>);
        impl LabelOverlay for Recorder {
            fn update_source_labels(&mut self, _surface: &dyn RenderSurface, source_id: &str) {
                self.0.borrow_mut().push(source_id.to_string());
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let clock = VirtualClock::new();
        let mut m = manager(&clock).with_label_overlay(Recorder(seen.clone()));
        m.init(MemorySurface::new());
        m.load_categories(json!([{"id": "c1"}, {"id": "c2"}])).unwrap();
        m.add_feature("c2", "a", point(0.0, 0.0), None).unwrap();
        m.add_feature("c1", "b", point(0.0, 0.0), None).unwrap();
        m.force_flush().unwrap();
        assert_eq!(*seen.borrow(), vec!["category-c1", "category-c2"]);
    }

    #[test]
    fn event_log_stays_bounded_under_many_flushes() {
        let clock = VirtualClock::new();
        let config = ManagerConfig {
            event_capacity: 16,
            ..ManagerConfig::default()
        };
        let mut m: Manager = LayerManager::new(config, clock.clone());
        m.init(MemorySurface::new());
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        for i in 0..5000 {
            m.add_feature("c1", "f1", point(f64::from(i % 90), 0.0), None).unwrap();
            m.force_flush().unwrap();
        }
        assert_eq!(m.events().len(), 16);
        assert!(matches!(m.events()[15].payload, ManagerEvent::BatchUpdated { features: 1, .. }));
        assert_eq!(m.feature_count("c1"), 1);
    }

    #[test]
    fn subscribed_manager_retains_no_events() {
        let seen = Rc::new(RefCell::new(0));
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        let counter = seen.clone();
        m.subscribe(move |_| *counter.borrow_mut() += 1);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        for i in 0..100 {
            m.add_feature("c1", &format!("f{i}"), point(0.0, 0.0), None).unwrap();
            m.force_flush().unwrap();
        }
        assert_eq!(*seen.borrow(), 101);
        assert!(m.events().is_empty());
    }

    #[test]
    fn subscribers_see_events_as_they_fire() {
        let seen = Rc::new(RefCell::new(0));
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        let counter = seen.clone();
        m.subscribe(move |_| *counter.borrow_mut() += 1);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn reset_detaches_and_queues_again() {
        let clock = VirtualClock::new();
        let mut m = ready(&clock);
        m.load_categories(json!([{"id": "c1"}])).unwrap();
        m.add_feature("c1", "a", point(0.0, 0.0), None).unwrap();

        let old = m.reset();
        assert!(old.is_some_and(|s| s.has_source("category-c1")));
        assert!(!m.is_ready());
        assert!(m.category_ids().is_empty());
        assert_eq!(m.pending_len(), 0);
        assert_eq!(m.next_flush_deadline(), None);

        m.load_categories(json!([{"id": "c9"}])).unwrap();
        assert_eq!(m.queued_len(), 1);
        m.init(MemorySurface::new());
        assert!(m.binding("c9").is_some());
    }
}
