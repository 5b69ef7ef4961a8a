//! Script replay for `layerctl`.
//!
//! A script is a JSON array of steps. Each step is either a host command
//! (`{"op": "addFeature", ...}`, see [`manager::Command`]) or one of the
//! control steps below.

use std::time::Duration;

use manager::{Command, LayerManager, ManagerEvent};
use runtime::Clock;
use serde::Deserialize;
use serde_json::{Value, json};
use surface::MemorySurface;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Control {
    /// Attach a fresh surface; earlier commands were queued.
    Init,
    /// Sleep, then let the manager flush if its deadline passed.
    Wait { ms: u64 },
    /// Drop every source and layer, as a basemap swap would.
    Rebuild,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Control(Control),
    Command(Command),
}

pub fn parse_script(text: &str) -> Result<Vec<Step>, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid script: {e}"))
}

/// Without an explicit `init` step the surface is attached up front.
pub fn has_explicit_init(steps: &[Step]) -> bool {
    steps.iter().any(|s| matches!(s, Step::Control(Control::Init)))
}

/// Runs one step. Returns how long the caller should wait before ticking.
pub fn apply_step<C: Clock>(
    mgr: &mut LayerManager<MemorySurface, C>,
    index: usize,
    step: Step,
) -> Option<Duration> {
    match step {
        Step::Control(Control::Init) => {
            let replayed = mgr.init(MemorySurface::new());
            info!(index, replayed, "attached surface");
            None
        }
        Step::Control(Control::Wait { ms }) => Some(Duration::from_millis(ms)),
        Step::Control(Control::Rebuild) => {
            match mgr.surface_mut() {
                Some(surface) => surface.rebuild(),
                None => warn!(index, "rebuild before init ignored"),
            }
            None
        }
        Step::Command(command) => {
            let op = command.name();
            if let Err(err) = mgr.submit(command) {
                warn!(index, op, %err, "step failed");
            }
            None
        }
    }
}

/// Final state: categories, bindings, event counts and the surface itself.
pub fn snapshot<C: Clock>(mgr: &LayerManager<MemorySurface, C>) -> Value {
    let mut batches = 0;
    let mut manifests = 0;
    for event in mgr.events() {
        match event.payload {
            ManagerEvent::CategoriesUpdated { .. } => manifests += 1,
            ManagerEvent::BatchUpdated { .. } => batches += 1,
        }
    }
    let bindings: serde_json::Map<String, Value> = mgr
        .category_ids()
        .into_iter()
        .filter_map(|id| {
            let binding = mgr.binding(&id)?;
            Some((id, json!(binding.layer_ids)))
        })
        .collect();
    json!({
        "ready": mgr.is_ready(),
        "queued": mgr.queued_len(),
        "pending": mgr.pending_len(),
        "categories": mgr.category_ids(),
        "bindings": bindings,
        "events": {"categoriesUpdated": manifests, "batchUpdated": batches},
        "surface": mgr.surface().map(MemorySurface::to_value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use manager::ManagerConfig;
    use pretty_assertions::assert_eq;
    use runtime::VirtualClock;

    const SCRIPT: &str = r##"[
        {"op": "loadCategories", "manifest": [{"id": "c1", "color": "#ff0000"}]},
        {"op": "addFeature", "id": "c1", "objectId": "f1",
         "payload": {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}, "properties": {}}},
        {"op": "init"},
        {"op": "wait", "ms": 150},
        {"op": "hideLayer", "id": "c1"}
    ]"##;

    #[test]
    fn parses_control_and_command_steps() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 5);
        assert!(has_explicit_init(&steps));
        assert_eq!(steps[3], Step::Control(Control::Wait { ms: 150 }));
        assert!(matches!(steps[1], Step::Command(Command::AddFeature { .. })));
    }

    #[test]
    fn replays_script_against_memory_surface() {
        let clock = VirtualClock::new();
        let mut mgr = LayerManager::new(ManagerConfig::default(), clock.clone());
        for (index, step) in parse_script(SCRIPT).unwrap().into_iter().enumerate() {
            if let Some(wait) = apply_step(&mut mgr, index, step) {
                clock.advance(wait);
                mgr.tick();
            }
        }
        let snap = snapshot(&mgr);
        assert_eq!(snap["ready"], json!(true));
        assert_eq!(snap["pending"], json!(0));
        assert_eq!(snap["events"], json!({"categoriesUpdated": 1, "batchUpdated": 1}));
        assert_eq!(mgr.feature_count("c1"), 1);
        assert!(!mgr.is_visible("c1"));
    }

    #[test]
    fn bad_script_reports_error() {
        assert!(parse_script(r#"[{"op": "teleport"}]"#).is_err());
    }
}
