//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Deterministic single-line layout.
//!
//! Busbars run left to right in document order. Every feeder (injection or
//! branch end) gets one cell on the busbar its terminal resolves to; in
//! node-breaker levels the terminal node is resolved by a breadth-first walk
//! through switches and internal connections, and the switches on that walk
//! are drawn inside the cell. A switch shared by several feeders is drawn in
//! the first of their cells only. Switches left over are drawn as couplers
//! between busbars.
use std::collections::{HashMap, HashSet, VecDeque};

use gridscope_model::{
    Connection, Equipment, EquipmentKind, Network, Switch, TopologyKind, VoltageLevel,
};

use crate::artifact::{BoundingBox, Direction, Point};
use crate::error::{DiagramError, Result};

pub(crate) const MARGIN: f32 = 40.0;
pub(crate) const CELL_WIDTH: f32 = 80.0;
pub(crate) const BUSBAR_Y: f32 = 240.0;
pub(crate) const BUSBAR_THICKNESS: f32 = 6.0;
pub(crate) const SYMBOL_SIZE: f32 = 30.0;
pub(crate) const SWITCH_SIZE: f32 = 16.0;
const BUSBAR_GAP: f32 = 20.0;
const FEEDER_LENGTH: f32 = 130.0;
const SWITCH_OFFSET: f32 = 30.0;
const SWITCH_PITCH: f32 = 28.0;
const COUPLER_RISE: f32 = 50.0;
const COUPLER_BRIDGE: f32 = 80.0;
const HEIGHT: f32 = 2.0 * BUSBAR_Y;
const MAX_CELLS: usize = 4096;

pub(crate) struct SldLayout<'a> {
    pub level: &'a VoltageLevel,
    pub width: f32,
    pub height: f32,
    pub busbars: Vec<PlacedBusbar<'a>>,
    pub feeders: Vec<PlacedFeeder<'a>>,
    pub couplers: Vec<PlacedCoupler<'a>>,
}

pub(crate) struct PlacedBusbar<'a> {
    pub svg_id: String,
    pub equipment_id: &'a str,
    pub kind: EquipmentKind,
    pub label: String,
    pub bbox: BoundingBox,
}

pub(crate) struct PlacedSwitch<'a> {
    pub svg_id: String,
    pub switch: &'a Switch,
    pub bbox: BoundingBox,
}

pub(crate) struct PlacedFeeder<'a> {
    pub svg_id: String,
    pub equipment_id: &'a str,
    pub kind: EquipmentKind,
    pub label: String,
    pub direction: Direction,
    pub busbar: Option<usize>,
    pub connected: bool,
    pub remote_voltage_level: Option<&'a str>,
    pub symbol: BoundingBox,
    pub switches: Vec<PlacedSwitch<'a>>,
    pub wire: Vec<Point>,
}

pub(crate) struct PlacedCoupler<'a> {
    pub switch: PlacedSwitch<'a>,
    pub from: Option<usize>,
    pub to: Option<usize>,
    pub wire: Vec<Point>,
}

/// Stable, XML-safe element id. The index keeps ids unique after sanitising.
pub(crate) fn svg_id(prefix: &str, index: usize, equipment_id: &str) -> String {
    let sanitized: String = equipment_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}-{index}-{sanitized}")
}

/// Maps terminal connections onto busbar indices.
struct Resolver<'a> {
    topology: TopologyKind,
    bus_index: HashMap<&'a str, usize>,
    node_busbar: HashMap<u32, usize>,
    /// node -> (neighbour node, switch index), switches first in document
    /// order, then internal connections (no switch).
    adjacency: HashMap<u32, Vec<(u32, Option<usize>)>>,
}

impl<'a> Resolver<'a> {
    fn new(level: &'a VoltageLevel, switches: &[&'a Switch]) -> Self {
        let mut bus_index = HashMap::new();
        let mut node_busbar = HashMap::new();
        for (index, equipment) in level
            .equipment
            .iter()
            .filter(|e| matches!(e, Equipment::Bus(_) | Equipment::BusbarSection(_)))
            .enumerate()
        {
            match equipment {
                Equipment::Bus(bus) => {
                    bus_index.insert(bus.id.as_str(), index);
                }
                Equipment::BusbarSection(section) => {
                    node_busbar.entry(section.node).or_insert(index);
                }
                _ => {}
            }
        }

        let mut adjacency: HashMap<u32, Vec<(u32, Option<usize>)>> = HashMap::new();
        for (index, switch) in switches.iter().enumerate() {
            if let (Connection::Node { node: a }, Connection::Node { node: b }) =
                (&switch.end1, &switch.end2)
            {
                adjacency.entry(*a).or_default().push((*b, Some(index)));
                adjacency.entry(*b).or_default().push((*a, Some(index)));
            }
        }
        for link in &level.internal_connections {
            adjacency.entry(link.node1).or_default().push((link.node2, None));
            adjacency.entry(link.node2).or_default().push((link.node1, None));
        }

        Self {
            topology: level.topology_kind,
            bus_index,
            node_busbar,
            adjacency,
        }
    }

    /// Busbar reached from `connection`, with the switches crossed from the
    /// busbar outwards. `excluded` is never traversed.
    fn resolve(&self, connection: &Connection, excluded: Option<usize>) -> Option<(usize, Vec<usize>)> {
        match (connection, self.topology) {
            (Connection::Bus { bus }, TopologyKind::BusBreaker) => {
                self.bus_index.get(bus.as_str()).map(|index| (*index, Vec::new()))
            }
            (Connection::Node { node }, TopologyKind::NodeBreaker) => self.walk(*node, excluded),
            _ => None,
        }
    }

    fn walk(&self, start: u32, excluded: Option<usize>) -> Option<(usize, Vec<usize>)> {
        let mut parents: HashMap<u32, Option<(u32, Option<usize>)>> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        parents.insert(start, None);

        while let Some(node) = queue.pop_front() {
            if let Some(busbar) = self.node_busbar.get(&node) {
                let mut path = Vec::new();
                let mut cursor = node;
                while let Some(Some((previous, switch))) = parents.get(&cursor) {
                    path.extend(*switch);
                    cursor = *previous;
                }
                return Some((*busbar, path));
            }
            for (next, switch) in self.adjacency.get(&node).into_iter().flatten() {
                if (switch.is_some() && *switch == excluded) || parents.contains_key(next) {
                    continue;
                }
                parents.insert(*next, Some((node, *switch)));
                queue.push_back(*next);
            }
        }
        None
    }
}

struct Feeder<'a> {
    equipment_id: &'a str,
    label: String,
    kind: EquipmentKind,
    connected: bool,
    remote_voltage_level: Option<&'a str>,
    resolved: Option<(usize, Vec<usize>)>,
}

enum Cell {
    Feeder(usize),
    Coupler(usize),
}

pub(crate) fn single_line<'a>(network: &'a Network, level: &'a VoltageLevel) -> Result<SldLayout<'a>> {
    let busbar_equipment: Vec<&Equipment> = level
        .equipment
        .iter()
        .filter(|e| matches!(e, Equipment::Bus(_) | Equipment::BusbarSection(_)))
        .collect();
    let switches: Vec<&Switch> = level
        .equipment
        .iter()
        .filter_map(|e| match e {
            Equipment::Switch(switch) => Some(switch),
            _ => None,
        })
        .collect();
    let resolver = Resolver::new(level, &switches);

    let mut feeders: Vec<Feeder<'a>> = Vec::new();
    for equipment in &level.equipment {
        let Some(injection) = equipment.injection() else {
            continue;
        };
        feeders.push(Feeder {
            equipment_id: &injection.id,
            label: injection.name.clone().unwrap_or_else(|| injection.id.clone()),
            kind: equipment.kind(),
            connected: injection.terminal.connected,
            remote_voltage_level: None,
            resolved: injection
                .terminal
                .connection
                .as_ref()
                .and_then(|c| resolver.resolve(c, None)),
        });
    }
    for branch in network.branches_at(&level.id) {
        // Both ends get a cell when the branch stays inside the level.
        let ends = [
            (&branch.terminal1, &branch.terminal2),
            (&branch.terminal2, &branch.terminal1),
        ];
        for (near, far) in ends {
            if near.voltage_level_id != level.id {
                continue;
            }
            feeders.push(Feeder {
                equipment_id: &branch.id,
                label: branch.name.clone().unwrap_or_else(|| branch.id.clone()),
                kind: branch.equipment_kind(),
                connected: near.connected,
                remote_voltage_level: Some(far.voltage_level_id.as_str()),
                resolved: near
                    .connection
                    .as_ref()
                    .and_then(|c| resolver.resolve(c, None)),
            });
        }
    }

    let used: HashSet<usize> = feeders
        .iter()
        .filter_map(|f| f.resolved.as_ref())
        .flat_map(|(_, path)| path.iter().copied())
        .collect();
    let couplers: Vec<(usize, Option<usize>, Option<usize>)> = switches
        .iter()
        .enumerate()
        .filter(|(index, _)| !used.contains(index))
        .map(|(index, switch)| {
            let from = resolver.resolve(&switch.end1, Some(index)).map(|(b, _)| b);
            let to = resolver.resolve(&switch.end2, Some(index)).map(|(b, _)| b);
            (index, from, to)
        })
        .collect();

    if feeders.len() + couplers.len() > MAX_CELLS {
        return Err(DiagramError::Layout(format!(
            "voltage level '{}' has {} cells, more than {MAX_CELLS}",
            level.id,
            feeders.len() + couplers.len()
        )));
    }

    // Cells per busbar; the extra trailing slot holds anything unattached.
    let mut cells: Vec<Vec<Cell>> = (0..=busbar_equipment.len()).map(|_| Vec::new()).collect();
    let detached = busbar_equipment.len();
    for (index, feeder) in feeders.iter().enumerate() {
        let slot = feeder.resolved.as_ref().map_or(detached, |(b, _)| *b);
        cells[slot].push(Cell::Feeder(index));
    }
    for (index, (_, from, to)) in couplers.iter().enumerate() {
        let slot = from.or(*to).unwrap_or(detached);
        cells[slot].push(Cell::Coupler(index));
    }

    let mut busbars = Vec::with_capacity(busbar_equipment.len());
    let mut cell_x: Vec<Vec<f32>> = Vec::with_capacity(cells.len());
    let mut cursor = MARGIN;
    for (slot, slot_cells) in cells.iter().enumerate() {
        if slot == detached && slot_cells.is_empty() {
            cell_x.push(Vec::new());
            continue;
        }
        let count = slot_cells.len().max(1);
        let span = count as f32 * CELL_WIDTH;
        if let Some(equipment) = busbar_equipment.get(slot) {
            busbars.push(PlacedBusbar {
                svg_id: svg_id("busbar", slot, equipment.id()),
                equipment_id: equipment.id(),
                kind: equipment.kind(),
                label: equipment.name().unwrap_or(equipment.id()).to_owned(),
                bbox: BoundingBox {
                    x: cursor + 5.0,
                    y: BUSBAR_Y - BUSBAR_THICKNESS / 2.0,
                    width: span - 10.0,
                    height: BUSBAR_THICKNESS,
                },
            });
        }
        cell_x.push(
            (0..slot_cells.len())
                .map(|k| cursor + (k as f32 + 0.5) * CELL_WIDTH)
                .collect(),
        );
        cursor += span + BUSBAR_GAP;
    }
    let width = (cursor - BUSBAR_GAP + MARGIN).max(2.0 * MARGIN + CELL_WIDTH);

    let mut placed_feeders: Vec<Option<PlacedFeeder<'a>>> = (0..feeders.len()).map(|_| None).collect();
    let mut placed_couplers: Vec<Option<PlacedCoupler<'a>>> =
        (0..couplers.len()).map(|_| None).collect();

    let mut drawn_switches: HashSet<usize> = HashSet::new();
    for (slot, slot_cells) in cells.iter().enumerate() {
        for (k, cell) in slot_cells.iter().enumerate() {
            let cx = cell_x[slot][k];
            match *cell {
                Cell::Feeder(index) => {
                    let feeder = &feeders[index];
                    placed_feeders[index] = Some(place_feeder(
                        index,
                        feeder,
                        cx,
                        slot != detached,
                        &switches,
                        &mut drawn_switches,
                    ));
                }
                Cell::Coupler(index) => {
                    let (switch_index, from, to) = couplers[index];
                    let switch = switches[switch_index];
                    let anchor_to = to
                        .filter(|to| Some(*to) != from)
                        .and_then(|to| busbars.get(to))
                        .map(|busbar| busbar.bbox.x + 8.0);
                    placed_couplers[index] = Some(place_coupler(
                        switch_index,
                        switch,
                        cx,
                        slot != detached,
                        anchor_to,
                        from,
                        to,
                    ));
                }
            }
        }
    }

    Ok(SldLayout {
        level,
        width,
        height: HEIGHT,
        busbars,
        feeders: placed_feeders.into_iter().flatten().collect(),
        couplers: placed_couplers.into_iter().flatten().collect(),
    })
}

fn direction_of(kind: EquipmentKind) -> Direction {
    match kind {
        EquipmentKind::Generator | EquipmentKind::Battery => Direction::Top,
        _ => Direction::Bottom,
    }
}

fn place_feeder<'a>(
    index: usize,
    feeder: &Feeder<'a>,
    cx: f32,
    attached: bool,
    switches: &[&'a Switch],
    drawn: &mut HashSet<usize>,
) -> PlacedFeeder<'a> {
    let direction = direction_of(feeder.kind);
    let sign = match direction {
        Direction::Top => -1.0,
        Direction::Bottom => 1.0,
    };
    let symbol_center = Point::new(cx, BUSBAR_Y + sign * FEEDER_LENGTH);
    let symbol = BoundingBox::centered(symbol_center, SYMBOL_SIZE, SYMBOL_SIZE);

    let path: &[usize] = match &feeder.resolved {
        Some((_, path)) => path,
        None => &[],
    };
    let pitch = if path.is_empty() {
        SWITCH_PITCH
    } else {
        SWITCH_PITCH.min((FEEDER_LENGTH - SWITCH_OFFSET - SYMBOL_SIZE) / path.len() as f32)
    };
    let placed_switches = path
        .iter()
        .enumerate()
        .filter(|(_, switch_index)| drawn.insert(**switch_index))
        .map(|(j, switch_index)| {
            let switch = switches[*switch_index];
            let center = Point::new(cx, BUSBAR_Y + sign * (SWITCH_OFFSET + j as f32 * pitch));
            PlacedSwitch {
                svg_id: svg_id("switch", *switch_index, &switch.id),
                switch,
                bbox: BoundingBox::centered(center, SWITCH_SIZE, SWITCH_SIZE),
            }
        })
        .collect();

    let start_y = if attached {
        BUSBAR_Y
    } else {
        BUSBAR_Y + sign * SWITCH_OFFSET / 2.0
    };
    let end_y = symbol_center.y - sign * SYMBOL_SIZE / 2.0;

    PlacedFeeder {
        svg_id: svg_id("feeder", index, feeder.equipment_id),
        equipment_id: feeder.equipment_id,
        kind: feeder.kind,
        label: feeder.label.clone(),
        direction,
        busbar: feeder.resolved.as_ref().map(|(b, _)| *b),
        connected: feeder.connected,
        remote_voltage_level: feeder.remote_voltage_level,
        symbol,
        switches: placed_switches,
        wire: vec![Point::new(cx, start_y), Point::new(cx, end_y)],
    }
}

fn place_coupler<'a>(
    switch_index: usize,
    switch: &'a Switch,
    cx: f32,
    attached: bool,
    anchor_to: Option<f32>,
    from: Option<usize>,
    to: Option<usize>,
) -> PlacedCoupler<'a> {
    let center = Point::new(cx, BUSBAR_Y - COUPLER_RISE);
    let base = if attached {
        BUSBAR_Y
    } else {
        BUSBAR_Y - SWITCH_OFFSET / 2.0
    };
    let mut wire = vec![Point::new(cx, base)];
    match anchor_to {
        Some(tx) => {
            let bridge = BUSBAR_Y - COUPLER_BRIDGE;
            wire.push(Point::new(cx, bridge));
            wire.push(Point::new(tx, bridge));
            wire.push(Point::new(tx, BUSBAR_Y));
        }
        None => wire.push(Point::new(cx, center.y - SWITCH_SIZE / 2.0)),
    }
    PlacedCoupler {
        switch: PlacedSwitch {
            svg_id: svg_id("switch", switch_index, &switch.id),
            switch,
            bbox: BoundingBox::centered(center, SWITCH_SIZE, SWITCH_SIZE),
        },
        from,
        to,
        wire,
    }
}
