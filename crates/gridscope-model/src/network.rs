//! ---
//! ems_section: "02-grid-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network model, identifiers, and document parsing."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::version::VersionToken;

/// How a voltage level describes its internal connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyKind {
    #[default]
    BusBreaker,
    NodeBreaker,
}

impl std::str::FromStr for TopologyKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BUS_BREAKER" => Ok(TopologyKind::BusBreaker),
            "NODE_BREAKER" => Ok(TopologyKind::NodeBreaker),
            other => Err(ModelError::malformed(format!(
                "unknown topologyKind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchKind {
    #[default]
    Breaker,
    Disconnector,
    LoadBreakSwitch,
}

impl std::str::FromStr for SwitchKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BREAKER" => Ok(SwitchKind::Breaker),
            "DISCONNECTOR" => Ok(SwitchKind::Disconnector),
            "LOAD_BREAK_SWITCH" => Ok(SwitchKind::LoadBreakSwitch),
            other => Err(ModelError::malformed(format!("unknown switch kind '{other}'"))),
        }
    }
}

/// Point of attachment inside a voltage level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "via")]
pub enum Connection {
    Bus { bus: String },
    Node { node: u32 },
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Bus { bus } => f.write_str(bus),
            Connection::Node { node } => write!(f, "node {node}"),
        }
    }
}

/// Connection of one equipment end to a voltage level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    pub voltage_level_id: String,
    /// `None` when the equipment end is not attached to any bus or node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,
    /// False when the end is only connectable (bus-breaker `connectableBus`).
    #[serde(default = "connected_default")]
    pub connected: bool,
}

fn connected_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusbarSection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub node: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Switch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: SwitchKind,
    pub open: bool,
    pub end1: Connection,
    pub end2: Connection,
}

/// Zero-impedance link between two nodes of a node-breaker level. Not an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalConnection {
    pub node1: u32,
    pub node2: u32,
}

/// Single-terminal equipment (generators, loads, compensators, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Injection {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub terminal: Terminal,
}

/// Equipment owned by a voltage level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Equipment {
    Bus(Bus),
    BusbarSection(BusbarSection),
    Switch(Switch),
    Generator(Injection),
    Load(Injection),
    ShuntCompensator(Injection),
    StaticVarCompensator(Injection),
    Battery(Injection),
    DanglingLine(Injection),
}

/// Discriminant of every drawable element, shared by equipment and branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EquipmentKind {
    Bus,
    BusbarSection,
    Switch,
    Generator,
    Load,
    ShuntCompensator,
    StaticVarCompensator,
    Battery,
    DanglingLine,
    Line,
    TwoWindingsTransformer,
}

impl EquipmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EquipmentKind::Bus => "bus",
            EquipmentKind::BusbarSection => "busbarSection",
            EquipmentKind::Switch => "switch",
            EquipmentKind::Generator => "generator",
            EquipmentKind::Load => "load",
            EquipmentKind::ShuntCompensator => "shuntCompensator",
            EquipmentKind::StaticVarCompensator => "staticVarCompensator",
            EquipmentKind::Battery => "battery",
            EquipmentKind::DanglingLine => "danglingLine",
            EquipmentKind::Line => "line",
            EquipmentKind::TwoWindingsTransformer => "twoWindingsTransformer",
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Equipment {
    pub fn id(&self) -> &str {
        match self {
            Equipment::Bus(bus) => &bus.id,
            Equipment::BusbarSection(section) => &section.id,
            Equipment::Switch(switch) => &switch.id,
            Equipment::Generator(inj)
            | Equipment::Load(inj)
            | Equipment::ShuntCompensator(inj)
            | Equipment::StaticVarCompensator(inj)
            | Equipment::Battery(inj)
            | Equipment::DanglingLine(inj) => &inj.id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Equipment::Bus(bus) => bus.name.as_deref(),
            Equipment::BusbarSection(section) => section.name.as_deref(),
            Equipment::Switch(switch) => switch.name.as_deref(),
            Equipment::Generator(inj)
            | Equipment::Load(inj)
            | Equipment::ShuntCompensator(inj)
            | Equipment::StaticVarCompensator(inj)
            | Equipment::Battery(inj)
            | Equipment::DanglingLine(inj) => inj.name.as_deref(),
        }
    }

    pub fn kind(&self) -> EquipmentKind {
        match self {
            Equipment::Bus(_) => EquipmentKind::Bus,
            Equipment::BusbarSection(_) => EquipmentKind::BusbarSection,
            Equipment::Switch(_) => EquipmentKind::Switch,
            Equipment::Generator(_) => EquipmentKind::Generator,
            Equipment::Load(_) => EquipmentKind::Load,
            Equipment::ShuntCompensator(_) => EquipmentKind::ShuntCompensator,
            Equipment::StaticVarCompensator(_) => EquipmentKind::StaticVarCompensator,
            Equipment::Battery(_) => EquipmentKind::Battery,
            Equipment::DanglingLine(_) => EquipmentKind::DanglingLine,
        }
    }

    /// The single terminal of an injection; `None` for buses, sections and switches.
    pub fn injection(&self) -> Option<&Injection> {
        match self {
            Equipment::Generator(inj)
            | Equipment::Load(inj)
            | Equipment::ShuntCompensator(inj)
            | Equipment::StaticVarCompensator(inj)
            | Equipment::Battery(inj)
            | Equipment::DanglingLine(inj) => Some(inj),
            Equipment::Bus(_) | Equipment::BusbarSection(_) | Equipment::Switch(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BranchKind {
    Line,
    TwoWindingsTransformer,
}

/// Two-terminal equipment; its ends may sit in different voltage levels or substations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: BranchKind,
    pub terminal1: Terminal,
    pub terminal2: Terminal,
}

impl Branch {
    pub fn equipment_kind(&self) -> EquipmentKind {
        match self.kind {
            BranchKind::Line => EquipmentKind::Line,
            BranchKind::TwoWindingsTransformer => EquipmentKind::TwoWindingsTransformer,
        }
    }

    /// Terminal located in `voltage_level_id` and the opposite one, in that order.
    pub fn ends_at(&self, voltage_level_id: &str) -> Option<(&Terminal, &Terminal)> {
        if self.terminal1.voltage_level_id == voltage_level_id {
            Some((&self.terminal1, &self.terminal2))
        } else if self.terminal2.voltage_level_id == voltage_level_id {
            Some((&self.terminal2, &self.terminal1))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoltageLevel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nominal voltage in kV.
    pub nominal_kv: f64,
    /// Back-reference to the containing substation.
    pub substation_id: String,
    #[serde(default)]
    pub topology_kind: TopologyKind,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_connections: Vec<InternalConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tso: Option<String>,
    #[serde(default)]
    pub voltage_levels: Vec<VoltageLevel>,
    #[serde(default)]
    pub transformers: Vec<Branch>,
}

/// Plain, unvalidated network content in document order.
///
/// This is the form produced by the parser and stored in snapshots; it becomes
/// a [`Network`] only through [`Network::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
    #[serde(default)]
    pub substations: Vec<Substation>,
    #[serde(default)]
    pub lines: Vec<Branch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Substation(usize),
    VoltageLevel(usize, usize),
    Equipment(usize, usize, usize),
    Transformer(usize, usize),
    Line(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchRef {
    Transformer(usize, usize),
    Line(usize),
}

/// Validated, immutable network with a version token and id index.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    version: VersionToken,
    #[serde(flatten)]
    document: NetworkDocument,
    #[serde(skip)]
    index: HashMap<String, Location>,
    #[serde(skip)]
    branches_by_level: HashMap<String, Vec<BranchRef>>,
}

impl Network {
    /// Validate a document and turn it into a network with a fresh version token.
    ///
    /// Ids are checked for uniqueness first, then every reference is resolved,
    /// both in document order; the first violation is returned.
    pub fn build(document: NetworkDocument) -> Result<Self> {
        let index = index_document(&document)?;
        check_references(&document, &index)?;

        let mut branches_by_level: HashMap<String, Vec<BranchRef>> = HashMap::new();
        let mut link = |branch: &Branch, reference: BranchRef| {
            let first = &branch.terminal1.voltage_level_id;
            let second = &branch.terminal2.voltage_level_id;
            branches_by_level
                .entry(first.clone())
                .or_default()
                .push(reference);
            if second != first {
                branches_by_level
                    .entry(second.clone())
                    .or_default()
                    .push(reference);
            }
        };
        for (s, substation) in document.substations.iter().enumerate() {
            for (t, transformer) in substation.transformers.iter().enumerate() {
                link(transformer, BranchRef::Transformer(s, t));
            }
        }
        for (l, line) in document.lines.iter().enumerate() {
            link(line, BranchRef::Line(l));
        }

        let version = VersionToken::next();
        debug!(
            network_id = %document.id,
            %version,
            substations = document.substations.len(),
            lines = document.lines.len(),
            elements = index.len(),
            "network built"
        );
        Ok(Self {
            version,
            document,
            index,
            branches_by_level,
        })
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn version(&self) -> VersionToken {
        self.version
    }

    /// Give the network a fresh token, greater than every token issued so far.
    pub fn restamp(&mut self) -> VersionToken {
        self.version = VersionToken::next();
        self.version
    }

    pub fn document(&self) -> &NetworkDocument {
        &self.document
    }

    pub fn substations(&self) -> &[Substation] {
        &self.document.substations
    }

    pub fn substation(&self, id: &str) -> Option<&Substation> {
        match self.index.get(id)? {
            Location::Substation(s) => self.document.substations.get(*s),
            _ => None,
        }
    }

    /// All voltage levels in document order.
    pub fn voltage_levels(&self) -> impl Iterator<Item = &VoltageLevel> {
        self.document
            .substations
            .iter()
            .flat_map(|substation| substation.voltage_levels.iter())
    }

    pub fn voltage_level(&self, id: &str) -> Option<&VoltageLevel> {
        match self.index.get(id)? {
            Location::VoltageLevel(s, v) => self.document.substations.get(*s)?.voltage_levels.get(*v),
            _ => None,
        }
    }

    pub fn equipment(&self, id: &str) -> Option<&Equipment> {
        match self.index.get(id)? {
            Location::Equipment(s, v, e) => self
                .document
                .substations
                .get(*s)?
                .voltage_levels
                .get(*v)?
                .equipment
                .get(*e),
            _ => None,
        }
    }

    pub fn branch(&self, id: &str) -> Option<&Branch> {
        match self.index.get(id)? {
            Location::Transformer(s, t) => self.document.substations.get(*s)?.transformers.get(*t),
            Location::Line(l) => self.document.lines.get(*l),
            _ => None,
        }
    }

    /// Transformers (substation order) followed by lines.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.document
            .substations
            .iter()
            .flat_map(|substation| substation.transformers.iter())
            .chain(self.document.lines.iter())
    }

    /// Branches with at least one terminal in `voltage_level_id`, in [`Network::branches`] order.
    pub fn branches_at<'a>(&'a self, voltage_level_id: &str) -> impl Iterator<Item = &'a Branch> {
        self.branches_by_level
            .get(voltage_level_id)
            .into_iter()
            .flatten()
            .filter_map(move |reference| match *reference {
                BranchRef::Transformer(s, t) => {
                    self.document.substations.get(s)?.transformers.get(t)
                }
                BranchRef::Line(l) => self.document.lines.get(l),
            })
    }

    /// True when any substation, voltage level, equipment or branch has this id.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Number of indexed elements.
    pub fn element_count(&self) -> usize {
        self.index.len()
    }
}

fn index_document(document: &NetworkDocument) -> Result<HashMap<String, Location>> {
    let mut index = HashMap::new();
    let mut insert = |id: &str, location: Location| -> Result<()> {
        if id.is_empty() {
            return Err(ModelError::malformed("element with empty id"));
        }
        if index.insert(id.to_owned(), location).is_some() {
            return Err(ModelError::DuplicateId(id.to_owned()));
        }
        Ok(())
    };

    for (s, substation) in document.substations.iter().enumerate() {
        insert(&substation.id, Location::Substation(s))?;
        for (v, level) in substation.voltage_levels.iter().enumerate() {
            insert(&level.id, Location::VoltageLevel(s, v))?;
            for (e, equipment) in level.equipment.iter().enumerate() {
                insert(equipment.id(), Location::Equipment(s, v, e))?;
            }
        }
        for (t, transformer) in substation.transformers.iter().enumerate() {
            insert(&transformer.id, Location::Transformer(s, t))?;
        }
    }
    for (l, line) in document.lines.iter().enumerate() {
        insert(&line.id, Location::Line(l))?;
    }
    Ok(index)
}

fn level_in<'a>(
    document: &'a NetworkDocument,
    index: &HashMap<String, Location>,
    id: &str,
) -> Option<&'a VoltageLevel> {
    match index.get(id)? {
        Location::VoltageLevel(s, v) => document.substations.get(*s)?.voltage_levels.get(*v),
        _ => None,
    }
}

fn check_references(document: &NetworkDocument, index: &HashMap<String, Location>) -> Result<()> {
    let level_of = |id: &str| level_in(document, index, id);

    for substation in &document.substations {
        for level in &substation.voltage_levels {
            if level.substation_id != substation.id {
                return Err(ModelError::dangling(&level.id, &level.substation_id));
            }
            for equipment in &level.equipment {
                match equipment {
                    Equipment::Bus(_) => {}
                    Equipment::BusbarSection(section) => {
                        check_connection(
                            &section.id,
                            level,
                            &Connection::Node { node: section.node },
                        )?;
                    }
                    Equipment::Switch(switch) => {
                        check_connection(&switch.id, level, &switch.end1)?;
                        check_connection(&switch.id, level, &switch.end2)?;
                    }
                    Equipment::Generator(inj)
                    | Equipment::Load(inj)
                    | Equipment::ShuntCompensator(inj)
                    | Equipment::StaticVarCompensator(inj)
                    | Equipment::Battery(inj)
                    | Equipment::DanglingLine(inj) => {
                        if inj.terminal.voltage_level_id != level.id {
                            return Err(ModelError::dangling(
                                &inj.id,
                                &inj.terminal.voltage_level_id,
                            ));
                        }
                        check_terminal(&inj.id, &inj.terminal, level_of)?;
                    }
                }
            }
        }
        for transformer in &substation.transformers {
            check_terminal(&transformer.id, &transformer.terminal1, level_of)?;
            check_terminal(&transformer.id, &transformer.terminal2, level_of)?;
        }
    }
    for line in &document.lines {
        check_terminal(&line.id, &line.terminal1, level_of)?;
        check_terminal(&line.id, &line.terminal2, level_of)?;
    }
    Ok(())
}

fn check_terminal<'a, F>(owner: &str, terminal: &Terminal, level_of: F) -> Result<()>
where
    F: Fn(&str) -> Option<&'a VoltageLevel>,
{
    let level = level_of(&terminal.voltage_level_id)
        .ok_or_else(|| ModelError::dangling(owner, &terminal.voltage_level_id))?;
    match &terminal.connection {
        Some(connection) => check_connection(owner, level, connection),
        None => Ok(()),
    }
}

/// A bus must belong to the very voltage level named by the terminal; nodes
/// exist only in node-breaker levels.
fn check_connection(owner: &str, level: &VoltageLevel, connection: &Connection) -> Result<()> {
    match (connection, level.topology_kind) {
        (Connection::Bus { bus }, TopologyKind::BusBreaker) => {
            let found = level
                .equipment
                .iter()
                .any(|equipment| matches!(equipment, Equipment::Bus(b) if &b.id == bus));
            if found {
                Ok(())
            } else {
                Err(ModelError::dangling(owner, bus))
            }
        }
        (Connection::Bus { bus }, TopologyKind::NodeBreaker) => {
            Err(ModelError::dangling(owner, bus))
        }
        (Connection::Node { .. }, TopologyKind::NodeBreaker) => Ok(()),
        (Connection::Node { node }, TopologyKind::BusBreaker) => Err(ModelError::dangling(
            owner,
            format!("{}/node {node}", level.id),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(id: &str) -> Equipment {
        Equipment::Bus(Bus {
            id: id.into(),
            name: None,
        })
    }

    fn terminal(level: &str, bus: &str) -> Terminal {
        Terminal {
            voltage_level_id: level.into(),
            connection: Some(Connection::Bus { bus: bus.into() }),
            connected: true,
        }
    }

    fn level(id: &str, substation: &str, kv: f64, equipment: Vec<Equipment>) -> VoltageLevel {
        VoltageLevel {
            id: id.into(),
            name: None,
            nominal_kv: kv,
            substation_id: substation.into(),
            topology_kind: TopologyKind::BusBreaker,
            equipment,
            internal_connections: Vec::new(),
        }
    }

    fn document() -> NetworkDocument {
        NetworkDocument {
            id: "net".into(),
            case_date: None,
            source_format: None,
            substations: vec![Substation {
                id: "S1".into(),
                name: None,
                country: Some("FR".into()),
                tso: None,
                voltage_levels: vec![
                    level("VL1", "S1", 400.0, vec![bus("B1")]),
                    level("VL2", "S1", 225.0, vec![bus("B2")]),
                ],
                transformers: vec![],
            }],
            lines: vec![Branch {
                id: "L1".into(),
                name: None,
                kind: BranchKind::Line,
                terminal1: terminal("VL1", "B1"),
                terminal2: terminal("VL2", "B2"),
            }],
        }
    }

    #[test]
    fn build_indexes_every_element() {
        let network = Network::build(document()).unwrap();
        assert_eq!(network.element_count(), 6);
        assert!(network.voltage_level("VL2").is_some());
        assert!(network.voltage_level("B1").is_none());
        assert_eq!(network.branch("L1").unwrap().kind, BranchKind::Line);
        assert_eq!(
            network.branches_at("VL2").map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec!["L1"]
        );
    }

    #[test]
    fn duplicate_ids_across_kinds_are_rejected() {
        let mut doc = document();
        doc.lines[0].id = "B2".into();
        assert_eq!(
            Network::build(doc).unwrap_err(),
            ModelError::DuplicateId("B2".into())
        );
    }

    #[test]
    fn bus_from_another_level_does_not_resolve() {
        let mut doc = document();
        doc.lines[0].terminal2 = terminal("VL2", "B1");
        assert_eq!(
            Network::build(doc).unwrap_err(),
            ModelError::ReferentialIntegrity {
                element: "L1".into(),
                reference: "B1".into()
            }
        );
    }

    #[test]
    fn serialized_network_carries_version_and_document() {
        let network = Network::build(document()).unwrap();
        let value = serde_json::to_value(&network).unwrap();
        assert_eq!(value["version"], network.version().get());
        assert_eq!(value["substations"][0]["voltageLevels"][1]["id"], "VL2");
        assert_eq!(value["lines"][0]["terminal1"]["connection"]["via"], "bus");
    }
}
