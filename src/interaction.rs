//! Hover interaction: the tooltip state machine and pointer hit-testing.

use crate::render::Scene;
use crate::types::StatRecord;
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

// Keeps the tooltip from sitting under the cursor.
pub const TOOLTIP_OFFSET_X: f64 = 10.0;
pub const TOOLTIP_OFFSET_Y: f64 = -25.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TooltipState {
    pub visible: bool,
    pub record: Option<StatRecord>,
    pub content: Option<String>,
    /// Mirrors the `data-education` attribute of the hovered region.
    pub education: Option<f64>,
    pub left: f64,
    pub top: f64,
}

pub fn tooltip_text(record: &StatRecord) -> String {
    format!("{}, {} - {}%", record.display_name, record.subregion_name, record.value)
}

/// Idle (hidden) until a pointer enters a region; hidden again on leave.
#[derive(Debug, Clone, Default)]
pub struct Tooltip {
    state: TooltipState,
}

impl Tooltip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TooltipState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    pub fn on_enter(&mut self, record: Option<&StatRecord>, x: f64, y: f64) {
        self.state.visible = true;
        self.state.education = record.map(|r| r.value);
        self.on_move(record, x, y);
    }

    pub fn on_move(&mut self, record: Option<&StatRecord>, x: f64, y: f64) {
        self.state.record = record.cloned();
        self.state.content = record.map(tooltip_text);
        self.state.left = x + TOOLTIP_OFFSET_X;
        self.state.top = y + TOOLTIP_OFFSET_Y;
    }

    pub fn on_leave(&mut self) {
        self.state = TooltipState::default();
    }
}

pub struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Spatial index over the projected region shapes of a scene.
pub struct HitIndex {
    tree: RTree<RegionEnvelope>,
}

impl HitIndex {
    pub fn build(scene: &Scene) -> Self {
        let items: Vec<RegionEnvelope> = scene
            .regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let rect = region.geometry.bounding_rect()?;
                Some(RegionEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        tracing::debug!(regions = items.len(), "built hit index");
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// Index into `scene.regions` of the region under `(x, y)`.
    pub fn hit(&self, scene: &Scene, x: f64, y: f64) -> Option<usize> {
        let point = Point::new(x, y);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .map(|candidate| candidate.index)
            .filter(|&i| {
                scene
                    .regions
                    .get(i)
                    .map(|region| region.geometry.contains(&point))
                    .unwrap_or(false)
            })
            .min()
    }
}

/// Turns raw pointer positions into enter/move/leave transitions.
pub struct HoverTracker<'a> {
    scene: &'a Scene,
    index: &'a HitIndex,
    tooltip: Tooltip,
    current: Option<usize>,
}

impl<'a> HoverTracker<'a> {
    pub fn new(scene: &'a Scene, index: &'a HitIndex) -> Self {
        Self {
            scene,
            index,
            tooltip: Tooltip::new(),
            current: None,
        }
    }

    pub fn tooltip(&self) -> &TooltipState {
        self.tooltip.state()
    }

    pub fn hovered(&self) -> Option<usize> {
        self.current
    }

    fn record(&self, i: usize) -> Option<&'a StatRecord> {
        self.scene.regions.get(i).and_then(|r| r.record.as_ref())
    }

    pub fn pointer_at(&mut self, x: f64, y: f64) -> &TooltipState {
        let hit = self.index.hit(self.scene, x, y);
        let record = hit.and_then(|h| self.record(h));
        match (self.current, hit) {
            (Some(c), Some(h)) if c == h => self.tooltip.on_move(record, x, y),
            (previous, Some(_)) => {
                if previous.is_some() {
                    self.tooltip.on_leave();
                }
                self.tooltip.on_enter(record, x, y);
            }
            (Some(_), None) => self.tooltip.on_leave(),
            (None, None) => {}
        }
        self.current = hit;
        self.tooltip.state()
    }

    pub fn pointer_left(&mut self) -> &TooltipState {
        if self.current.take().is_some() {
            self.tooltip.on_leave();
        }
        self.tooltip.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::render::build_scene;
    use crate::topology::Topology;

    fn autauga() -> StatRecord {
        StatRecord {
            region_id: 1001,
            display_name: "Autauga".to_string(),
            subregion_name: "AL".to_string(),
            value: 20.0,
        }
    }

    // Two unit-ish squares: 1001 covers x in [0,10], 1003 covers x in [10,20].
    fn scene() -> Scene {
        let topo = Topology::from_json(
            r#"{
                "type": "Topology",
                "arcs": [
                    [[10,0],[10,10]],
                    [[10,10],[0,10],[0,0],[10,0]],
                    [[10,0],[20,0],[20,10],[10,10]]
                ],
                "objects": {
                    "counties": {"type": "GeometryCollection", "geometries": [
                        {"type": "Polygon", "id": 1001, "arcs": [[0, 1]]},
                        {"type": "Polygon", "id": 1003, "arcs": [[2, -1]]}
                    ]},
                    "states": {"type": "GeometryCollection", "geometries": []}
                }
            }"#,
        )
        .unwrap();
        build_scene(&AppConfig::default(), Some(&topo), &[autauga()]).unwrap()
    }

    #[test]
    fn tooltip_lifecycle() {
        let mut tooltip = Tooltip::new();
        assert!(!tooltip.is_visible());

        let record = autauga();
        tooltip.on_enter(Some(&record), 100.0, 200.0);
        assert!(tooltip.is_visible());
        assert_eq!(tooltip.state().education, Some(20.0));
        assert_eq!(tooltip.state().content.as_deref(), Some("Autauga, AL - 20%"));

        tooltip.on_move(Some(&record), 120.0, 240.0);
        assert!(tooltip.is_visible());
        assert_eq!(tooltip.state().left, 130.0);
        assert_eq!(tooltip.state().top, 215.0);

        tooltip.on_leave();
        assert!(!tooltip.is_visible());
        assert_eq!(tooltip.state(), &TooltipState::default());
    }

    #[test]
    fn region_without_record_shows_empty_tooltip() {
        let mut tooltip = Tooltip::new();
        tooltip.on_enter(None, 1.0, 1.0);
        assert!(tooltip.is_visible());
        assert!(tooltip.state().content.is_none());
        assert!(tooltip.state().education.is_none());
    }

    #[test]
    fn hit_index_finds_containing_region() {
        let scene = scene();
        let index = HitIndex::build(&scene);
        assert_eq!(index.hit(&scene, 5.0, 5.0), Some(0));
        assert_eq!(index.hit(&scene, 15.0, 5.0), Some(1));
        assert_eq!(index.hit(&scene, 25.0, 5.0), None);
        assert_eq!(index.hit(&scene, 5.0, -1.0), None);
    }

    #[test]
    fn tracker_emits_enter_move_and_leave() {
        let scene = scene();
        let index = HitIndex::build(&scene);
        let mut tracker = HoverTracker::new(&scene, &index);
        assert!(!tracker.tooltip().visible);

        let state = tracker.pointer_at(5.0, 5.0).clone();
        assert!(state.visible);
        assert_eq!(state.content.as_deref(), Some("Autauga, AL - 20%"));
        assert_eq!((state.left, state.top), (15.0, -20.0));

        let state = tracker.pointer_at(6.0, 7.0).clone();
        assert!(state.visible);
        assert_eq!((state.left, state.top), (16.0, -18.0));

        // Crossing into the unmatched county keeps the tooltip up without content.
        let state = tracker.pointer_at(15.0, 5.0).clone();
        assert_eq!(tracker.hovered(), Some(1));
        assert!(state.visible);
        assert!(state.content.is_none());

        assert!(!tracker.pointer_at(50.0, 50.0).visible);

        tracker.pointer_at(5.0, 5.0);
        assert!(!tracker.pointer_left().visible);
        assert_eq!(tracker.hovered(), None);
    }
}
