//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Network area diagrams: voltage levels as nodes, branches as edges.
use std::collections::{HashMap, HashSet, VecDeque};
use std::f32::consts::TAU;

use gridscope_model::Network;
use serde::{Deserialize, Serialize};
use svg::node::element::{Circle, Group, Line, Style, Text};
use svg::Document;
use tracing::debug;

use crate::artifact::Point;
use crate::draw::voltage_color;
use crate::error::{DiagramError, Result};
use crate::layout::svg_id;

const NODE_RADIUS: f32 = 18.0;
const RING_PITCH: f32 = 60.0;
const MIN_RING: f32 = 120.0;
const MARGIN: f32 = 60.0;

const STYLE: &str = "\
.nad-edge{stroke-width:2}\
.nad-label{font-family:sans-serif;font-size:11px;text-anchor:middle}";

/// Which part of the network to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaRequest {
    /// Voltage level the neighbourhood is centred on; whole network when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<String>,
    /// Branch hops from `center`.
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_nominal_kv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_nominal_kv: Option<f64>,
}

fn default_depth() -> u32 {
    1
}

impl Default for AreaRequest {
    fn default() -> Self {
        Self {
            center: None,
            depth: default_depth(),
            low_nominal_kv: None,
            high_nominal_kv: None,
        }
    }
}

impl AreaRequest {
    fn admits(&self, nominal_kv: f64) -> bool {
        self.low_nominal_kv.map_or(true, |low| nominal_kv >= low)
            && self.high_nominal_kv.map_or(true, |high| nominal_kv <= high)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaNode {
    pub svg_id: String,
    pub voltage_level_id: String,
    pub substation_id: String,
    pub nominal_kv: f64,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaEdge {
    pub svg_id: String,
    pub branch_id: String,
    pub voltage_level_id1: String,
    pub voltage_level_id2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMetadata {
    pub displayed_voltage_levels: Vec<String>,
    pub filters: AreaRequest,
    pub nodes: Vec<AreaNode>,
    pub edges: Vec<AreaEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaDiagram {
    pub svg: String,
    pub metadata: AreaMetadata,
}

/// Voltage levels to display, in document order.
///
/// With a centre, the walk only continues through levels admitted by the
/// voltage bounds; the centre itself is always shown.
fn displayed_levels<'a>(network: &'a Network, request: &AreaRequest) -> Result<Vec<&'a str>> {
    let selected: HashSet<&str> = match &request.center {
        None => network
            .voltage_levels()
            .filter(|vl| request.admits(vl.nominal_kv))
            .map(|vl| vl.id.as_str())
            .collect(),
        Some(center) => {
            let start = network
                .voltage_level(center)
                .ok_or_else(|| DiagramError::NotFound(center.clone()))?;
            let mut seen = HashSet::from([start.id.as_str()]);
            let mut queue = VecDeque::from([(start.id.as_str(), 0u32)]);
            while let Some((id, hops)) = queue.pop_front() {
                if hops >= request.depth {
                    continue;
                }
                for branch in network.branches_at(id) {
                    let Some((_, far)) = branch.ends_at(id) else {
                        continue;
                    };
                    let far_id = far.voltage_level_id.as_str();
                    let admitted = network
                        .voltage_level(far_id)
                        .is_some_and(|vl| request.admits(vl.nominal_kv));
                    if admitted && seen.insert(far_id) {
                        queue.push_back((far_id, hops + 1));
                    }
                }
            }
            seen
        }
    };

    Ok(network
        .voltage_levels()
        .map(|vl| vl.id.as_str())
        .filter(|id| selected.contains(id))
        .collect())
}

/// Render the area diagram selected by `request`.
pub fn render_area(network: &Network, request: &AreaRequest) -> Result<AreaDiagram> {
    let displayed = displayed_levels(network, request)?;

    let count = displayed.len().max(1) as f32;
    let radius = if displayed.len() <= 1 {
        0.0
    } else {
        MIN_RING.max(count * RING_PITCH / TAU)
    };
    let side = 2.0 * (radius + NODE_RADIUS + MARGIN);
    let origin = Point::new(side / 2.0, side / 2.0);

    let mut nodes = Vec::with_capacity(displayed.len());
    let mut positions: HashMap<&str, Point> = HashMap::new();
    for (index, id) in displayed.iter().enumerate() {
        let Some(level) = network.voltage_level(id) else {
            continue;
        };
        // Clockwise from twelve o'clock.
        let angle = TAU * index as f32 / count;
        let position = Point::new(
            origin.x + radius * angle.sin(),
            origin.y - radius * angle.cos(),
        );
        positions.insert(id, position);
        nodes.push(AreaNode {
            svg_id: svg_id("vl", index, id),
            voltage_level_id: level.id.clone(),
            substation_id: level.substation_id.clone(),
            nominal_kv: level.nominal_kv,
            position,
        });
    }

    let mut edges = Vec::new();
    let mut doc = Document::new()
        .set("viewBox", format!("0 0 {side} {side}"))
        .set("width", side)
        .set("height", side)
        .add(Style::new(STYLE));

    for (index, branch) in network.branches().enumerate() {
        let (id1, id2) = (
            branch.terminal1.voltage_level_id.as_str(),
            branch.terminal2.voltage_level_id.as_str(),
        );
        let (Some(p1), Some(p2)) = (positions.get(id1), positions.get(id2)) else {
            continue;
        };
        if id1 == id2 {
            continue;
        }
        let edge_id = svg_id("branch", index, &branch.id);
        let kv = network
            .voltage_level(id1)
            .map_or(0.0, |vl| vl.nominal_kv);
        doc = doc.add(
            Line::new()
                .set("id", edge_id.as_str())
                .set("class", "nad-edge")
                .set("x1", p1.x)
                .set("y1", p1.y)
                .set("x2", p2.x)
                .set("y2", p2.y)
                .set("stroke", voltage_color(kv)),
        );
        edges.push(AreaEdge {
            svg_id: edge_id,
            branch_id: branch.id.clone(),
            voltage_level_id1: id1.to_owned(),
            voltage_level_id2: id2.to_owned(),
        });
    }

    for node in &nodes {
        let p = node.position;
        doc = doc.add(
            Group::new()
                .set("id", node.svg_id.as_str())
                .set("class", "nad-vl")
                .add(
                    Circle::new()
                        .set("cx", p.x)
                        .set("cy", p.y)
                        .set("r", NODE_RADIUS)
                        .set("fill", voltage_color(node.nominal_kv)),
                )
                .add(
                    Text::new(node.voltage_level_id.as_str())
                        .set("class", "nad-label")
                        .set("x", p.x)
                        .set("y", p.y + NODE_RADIUS + 14.0),
                ),
        );
    }

    debug!(
        center = ?request.center,
        depth = request.depth,
        nodes = nodes.len(),
        edges = edges.len(),
        "area diagram rendered"
    );

    Ok(AreaDiagram {
        svg: doc.to_string(),
        metadata: AreaMetadata {
            displayed_voltage_levels: displayed.iter().map(|id| (*id).to_owned()).collect(),
            filters: request.clone(),
            nodes,
            edges,
        },
    })
}
