//! ---
//! ems_section: "02-grid-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network model, identifiers, and document parsing."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! XIIDM document parser.
//!
//! Elements are matched on their local names so any namespace prefix is
//! accepted. Elements the model does not know about are skipped together
//! with their whole subtree.
use std::time::Instant;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::network::{
    Branch, BranchKind, Bus, BusbarSection, Connection, Equipment, Injection, InternalConnection,
    Network,
    NetworkDocument, Substation, Switch, SwitchKind, Terminal, TopologyKind, VoltageLevel,
};

/// Parse an XIIDM document into a validated [`Network`].
///
/// Parsing touches no shared state other than the version counter, which is
/// only advanced when the document is accepted.
pub fn parse(bytes: &[u8]) -> Result<Network> {
    let started = Instant::now();
    let document = parse_document(bytes)?;
    let network = Network::build(document)?;
    debug!(
        network_id = %network.id(),
        version = %network.version(),
        elements = network.element_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "parsed network document"
    );
    Ok(network)
}

/// Decode an XIIDM document without validating references.
pub fn parse_document(bytes: &[u8]) -> Result<NetworkDocument> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| ModelError::malformed(format!("document is not valid UTF-8: {err}")))?;

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    let mut state = ParseState::default();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                if let Opened::Leaf = state.open(e)? {
                    let end = e.to_end().into_owned();
                    reader.read_to_end(end.name())?;
                }
            }
            Event::Empty(ref e) => {
                if let Opened::Container = state.open(e)? {
                    state.close()?;
                }
            }
            Event::End(_) => state.close()?,
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Network,
    Substation,
    VoltageLevel,
    Topology(TopologyKind),
}

enum Opened {
    Container,
    Leaf,
}

#[derive(Default)]
struct ParseState {
    frames: Vec<Frame>,
    document: Option<NetworkDocument>,
    substation: Option<Substation>,
    level: Option<VoltageLevel>,
    closed: bool,
}

impl ParseState {
    fn open(&mut self, e: &BytesStart) -> Result<Opened> {
        let name = e.local_name();
        let tag = std::str::from_utf8(name.as_ref())
            .map_err(|err| ModelError::malformed(format!("invalid element name: {err}")))?;

        let Some(frame) = self.frames.last().copied() else {
            return self.open_root(tag, e);
        };

        match (frame, tag) {
            (Frame::Network, "substation") => {
                self.substation = Some(Substation {
                    id: required(e, tag, "id")?,
                    name: attribute(e, "name")?,
                    country: attribute(e, "country")?,
                    tso: attribute(e, "tso")?,
                    voltage_levels: Vec::new(),
                    transformers: Vec::new(),
                });
                self.frames.push(Frame::Substation);
                Ok(Opened::Container)
            }
            (Frame::Network, "line") => {
                let line = branch(e, tag, BranchKind::Line)?;
                self.document_mut()?.lines.push(line);
                Ok(Opened::Leaf)
            }
            (Frame::Substation, "voltageLevel") => {
                let substation_id = self.substation_mut()?.id.clone();
                let topology_kind = match attribute(e, "topologyKind")? {
                    Some(kind) => kind.parse()?,
                    None => TopologyKind::default(),
                };
                self.level = Some(VoltageLevel {
                    id: required(e, tag, "id")?,
                    name: attribute(e, "name")?,
                    nominal_kv: nominal_voltage(e)?,
                    substation_id,
                    topology_kind,
                    equipment: Vec::new(),
                    internal_connections: Vec::new(),
                });
                self.frames.push(Frame::VoltageLevel);
                Ok(Opened::Container)
            }
            (Frame::Substation, "twoWindingsTransformer") => {
                let transformer = branch(e, tag, BranchKind::TwoWindingsTransformer)?;
                self.substation_mut()?.transformers.push(transformer);
                Ok(Opened::Leaf)
            }
            (Frame::VoltageLevel, "busBreakerTopology") => {
                self.frames.push(Frame::Topology(TopologyKind::BusBreaker));
                Ok(Opened::Container)
            }
            (Frame::VoltageLevel, "nodeBreakerTopology") => {
                self.frames.push(Frame::Topology(TopologyKind::NodeBreaker));
                Ok(Opened::Container)
            }
            (Frame::VoltageLevel, _) => {
                let level = self.level_mut()?;
                let wrap: fn(Injection) -> Equipment = match tag {
                    "generator" => Equipment::Generator,
                    "load" => Equipment::Load,
                    "shunt" => Equipment::ShuntCompensator,
                    "staticVarCompensator" => Equipment::StaticVarCompensator,
                    "battery" => Equipment::Battery,
                    "danglingLine" => Equipment::DanglingLine,
                    _ => return Ok(Opened::Leaf),
                };
                let injection = Injection {
                    id: required(e, tag, "id")?,
                    name: attribute(e, "name")?,
                    terminal: terminal(e, level.id.clone(), "")?,
                };
                level.equipment.push(wrap(injection));
                Ok(Opened::Leaf)
            }
            (Frame::Topology(TopologyKind::NodeBreaker), "internalConnection") => {
                let link = InternalConnection {
                    node1: required_node(e, tag, "node1")?,
                    node2: required_node(e, tag, "node2")?,
                };
                self.level_mut()?.internal_connections.push(link);
                Ok(Opened::Leaf)
            }
            (Frame::Topology(kind), _) => {
                let equipment = match (kind, tag) {
                    (TopologyKind::BusBreaker, "bus") => Equipment::Bus(Bus {
                        id: required(e, tag, "id")?,
                        name: attribute(e, "name")?,
                    }),
                    (TopologyKind::NodeBreaker, "busbarSection") => {
                        Equipment::BusbarSection(BusbarSection {
                            id: required(e, tag, "id")?,
                            name: attribute(e, "name")?,
                            node: required_node(e, tag, "node")?,
                        })
                    }
                    (_, "switch") => Equipment::Switch(switch(e, tag, kind)?),
                    _ => return Ok(Opened::Leaf),
                };
                self.level_mut()?.equipment.push(equipment);
                Ok(Opened::Leaf)
            }
            _ => Ok(Opened::Leaf),
        }
    }

    fn open_root(&mut self, tag: &str, e: &BytesStart) -> Result<Opened> {
        if self.closed {
            return Err(ModelError::malformed(format!(
                "unexpected element '{tag}' after the network root"
            )));
        }
        if tag != "network" {
            return Err(ModelError::malformed(format!(
                "expected 'network' root element, found '{tag}'"
            )));
        }
        self.document = Some(NetworkDocument {
            id: required(e, tag, "id")?,
            case_date: attribute(e, "caseDate")?,
            source_format: attribute(e, "sourceFormat")?,
            substations: Vec::new(),
            lines: Vec::new(),
        });
        self.frames.push(Frame::Network);
        Ok(Opened::Container)
    }

    fn close(&mut self) -> Result<()> {
        match self.frames.pop() {
            Some(Frame::Network) => self.closed = true,
            Some(Frame::Substation) => {
                let substation = self
                    .substation
                    .take()
                    .ok_or_else(|| ModelError::malformed("substation closed twice"))?;
                self.document_mut()?.substations.push(substation);
            }
            Some(Frame::VoltageLevel) => {
                let level = self
                    .level
                    .take()
                    .ok_or_else(|| ModelError::malformed("voltage level closed twice"))?;
                self.substation_mut()?.voltage_levels.push(level);
            }
            Some(Frame::Topology(_)) => {}
            None => return Err(ModelError::malformed("unbalanced closing element")),
        }
        Ok(())
    }

    fn finish(self) -> Result<NetworkDocument> {
        if !self.frames.is_empty() {
            return Err(ModelError::malformed("document ended inside an open element"));
        }
        self.document
            .ok_or_else(|| ModelError::malformed("missing 'network' root element"))
    }

    fn document_mut(&mut self) -> Result<&mut NetworkDocument> {
        self.document
            .as_mut()
            .ok_or_else(|| ModelError::malformed("element outside of the network root"))
    }

    fn substation_mut(&mut self) -> Result<&mut Substation> {
        self.substation
            .as_mut()
            .ok_or_else(|| ModelError::malformed("element outside of a substation"))
    }

    fn level_mut(&mut self) -> Result<&mut VoltageLevel> {
        self.level
            .as_mut()
            .ok_or_else(|| ModelError::malformed("element outside of a voltage level"))
    }
}

fn attribute(e: &BytesStart, key: &str) -> Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn required(e: &BytesStart, tag: &str, key: &str) -> Result<String> {
    attribute(e, key)?
        .ok_or_else(|| ModelError::malformed(format!("<{tag}> is missing attribute '{key}'")))
}

fn node(e: &BytesStart, tag: &str, key: &str) -> Result<Option<u32>> {
    attribute(e, key)?
        .map(|raw| {
            raw.trim().parse::<u32>().map_err(|_| {
                ModelError::malformed(format!("<{tag}> attribute '{key}' is not a node number: '{raw}'"))
            })
        })
        .transpose()
}

fn required_node(e: &BytesStart, tag: &str, key: &str) -> Result<u32> {
    node(e, tag, key)?
        .ok_or_else(|| ModelError::malformed(format!("<{tag}> is missing attribute '{key}'")))
}

fn nominal_voltage(e: &BytesStart) -> Result<f64> {
    let raw = required(e, "voltageLevel", "nominalV")?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(ModelError::malformed(format!(
            "<voltageLevel> has invalid nominalV '{raw}'"
        ))),
    }
}

/// Terminal of an injection (`suffix` empty) or of a branch end (`"1"` / `"2"`).
fn terminal(e: &BytesStart, voltage_level_id: String, suffix: &str) -> Result<Terminal> {
    let tag = "terminal";
    let (connection, connected) = if let Some(bus) = attribute(e, &format!("bus{suffix}"))? {
        (Some(Connection::Bus { bus }), true)
    } else if let Some(bus) = attribute(e, &format!("connectableBus{suffix}"))? {
        (Some(Connection::Bus { bus }), false)
    } else if let Some(node) = node(e, tag, &format!("node{suffix}"))? {
        (Some(Connection::Node { node }), true)
    } else {
        (None, false)
    };
    Ok(Terminal {
        voltage_level_id,
        connection,
        connected,
    })
}

fn branch(e: &BytesStart, tag: &str, kind: BranchKind) -> Result<Branch> {
    let level1 = required(e, tag, "voltageLevelId1")?;
    let level2 = required(e, tag, "voltageLevelId2")?;
    Ok(Branch {
        id: required(e, tag, "id")?,
        name: attribute(e, "name")?,
        kind,
        terminal1: terminal(e, level1, "1")?,
        terminal2: terminal(e, level2, "2")?,
    })
}

fn switch(e: &BytesStart, tag: &str, topology: TopologyKind) -> Result<Switch> {
    let kind: SwitchKind = required(e, tag, "kind")?.parse()?;
    let open = match attribute(e, "open")?.as_deref() {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            return Err(ModelError::malformed(format!(
                "<switch> attribute 'open' is not a boolean: '{other}'"
            )))
        }
    };
    let (end1, end2) = match topology {
        TopologyKind::BusBreaker => (
            Connection::Bus {
                bus: required(e, tag, "bus1")?,
            },
            Connection::Bus {
                bus: required(e, tag, "bus2")?,
            },
        ),
        TopologyKind::NodeBreaker => (
            Connection::Node {
                node: required_node(e, tag, "node1")?,
            },
            Connection::Node {
                node: required_node(e, tag, "node2")?,
            },
        ),
    };
    Ok(Switch {
        id: required(e, tag, "id")?,
        name: attribute(e, "name")?,
        kind,
        open,
        end1,
        end2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_BREAKER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<iidm:network xmlns:iidm="http://www.powsybl.org/schema/iidm/1_0" id="nb" caseDate="2024-01-01T00:00:00Z">
  <iidm:substation id="S">
    <iidm:voltageLevel id="VL" nominalV="63" topologyKind="NODE_BREAKER">
      <iidm:nodeBreakerTopology>
        <iidm:busbarSection id="BBS" node="0"/>
        <iidm:switch id="DISC" kind="DISCONNECTOR" open="false" node1="0" node2="1"/>
        <iidm:switch id="BRK" kind="BREAKER" open="true" node1="1" node2="2"/>
        <iidm:internalConnection node1="3" node2="0"/>
      </iidm:nodeBreakerTopology>
      <iidm:load id="LD" node="2" p0="10" q0="1">
        <iidm:property name="tag" value="x"/>
      </iidm:load>
    </iidm:voltageLevel>
  </iidm:substation>
</iidm:network>"#;

    #[test]
    fn node_breaker_levels_are_decoded() {
        let doc = parse_document(NODE_BREAKER.as_bytes()).unwrap();
        assert_eq!(doc.case_date.as_deref(), Some("2024-01-01T00:00:00Z"));
        let level = &doc.substations[0].voltage_levels[0];
        assert_eq!(level.topology_kind, TopologyKind::NodeBreaker);
        let ids: Vec<_> = level.equipment.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["BBS", "DISC", "BRK", "LD"]);
        assert_eq!(
            level.internal_connections,
            vec![InternalConnection { node1: 3, node2: 0 }]
        );
        match &level.equipment[2] {
            Equipment::Switch(sw) => {
                assert!(sw.open);
                assert_eq!(sw.kind, SwitchKind::Breaker);
                assert_eq!(sw.end2, Connection::Node { node: 2 });
            }
            other => panic!("unexpected equipment {other:?}"),
        }
    }

    #[test]
    fn connectable_bus_marks_terminal_disconnected() {
        let xml = r#"<network id="n"><substation id="S"><voltageLevel id="VL" nominalV="20">
            <busBreakerTopology><bus id="B"/></busBreakerTopology>
            <generator id="G" connectableBus="B"/>
        </voltageLevel></substation></network>"#;
        let network = parse(xml.as_bytes()).unwrap();
        let generator = network.equipment("G").and_then(Equipment::injection).unwrap();
        assert!(!generator.terminal.connected);
        assert_eq!(
            generator.terminal.connection,
            Some(Connection::Bus { bus: "B".into() })
        );
    }

    #[test]
    fn wrong_root_is_malformed() {
        let err = parse(b"<grid id=\"x\"/>").unwrap_err();
        assert_eq!(err.kind(), "MalformedDocument");
    }

    #[test]
    fn truncated_document_is_malformed() {
        let err = parse(b"<network id=\"x\"><substation id=\"S\">").unwrap_err();
        assert!(matches!(err, ModelError::MalformedDocument(_)));
    }

    #[test]
    fn bad_nominal_voltage_is_malformed() {
        let xml = r#"<network id="n"><substation id="S"><voltageLevel id="VL" nominalV="high"/></substation></network>"#;
        assert!(matches!(
            parse(xml.as_bytes()).unwrap_err(),
            ModelError::MalformedDocument(_)
        ));
    }

    #[test]
    fn node_reference_in_bus_breaker_level_is_dangling() {
        let xml = r#"<network id="n"><substation id="S"><voltageLevel id="VL" nominalV="20">
            <load id="LD" node="4"/>
        </voltageLevel></substation></network>"#;
        assert_eq!(parse(xml.as_bytes()).unwrap_err().kind(), "ReferentialIntegrity");
    }
}
