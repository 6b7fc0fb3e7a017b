//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use gridscope_model::{EquipmentKind, VersionToken};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn centered(center: Point, width: f32, height: f32) -> Self {
        Self {
            x: center.x - width / 2.0,
            y: center.y - height / 2.0,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Side of the busbar a feeder is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Top,
    Bottom,
}

/// One drawn element, addressable in the SVG through `svg_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementMetadata {
    pub svg_id: String,
    pub equipment_id: String,
    pub kind: EquipmentKind,
    pub label: String,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Busbar the element hangs from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busbar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_voltage_level_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    pub svg_id: String,
    pub equipment_id: String,
    pub points: Vec<Point>,
}

/// Layout description sufficient for client-side overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramMetadata {
    pub voltage_level_id: String,
    pub network_version: VersionToken,
    pub nominal_kv: f64,
    pub width: f32,
    pub height: f32,
    pub elements: Vec<ElementMetadata>,
    pub wires: Vec<WireMetadata>,
}

impl DiagramMetadata {
    pub fn element(&self, equipment_id: &str) -> Option<&ElementMetadata> {
        self.elements
            .iter()
            .find(|element| element.equipment_id == equipment_id)
    }
}

/// Rendered single-line diagram of one voltage level. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramArtifact {
    pub voltage_level_id: String,
    pub network_version: VersionToken,
    pub svg: String,
    pub metadata: DiagramMetadata,
}
