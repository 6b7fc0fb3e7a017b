//! ---
//! ems_section: "06-diagram-rendering"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Diagram layout, SVG rendering, and artifact caching."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use gridscope_model::{EquipmentKind, Network};
use tracing::debug;

use crate::artifact::{DiagramArtifact, DiagramMetadata, ElementMetadata, WireMetadata};
use crate::draw;
use crate::error::{DiagramError, Result};
use crate::layout::{self, PlacedSwitch, SldLayout};

/// Produces the single-line diagram of one voltage level.
///
/// Implementations must be pure: the same network and voltage level always
/// yield the same artifact, and the network is never modified.
pub trait DiagramRenderer: Send + Sync + 'static {
    fn render(&self, network: &Network, voltage_level_id: &str) -> Result<DiagramArtifact>;
}

/// SVG renderer backed by the deterministic busbar/cell layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleLineRenderer;

impl DiagramRenderer for SingleLineRenderer {
    fn render(&self, network: &Network, voltage_level_id: &str) -> Result<DiagramArtifact> {
        let level = network
            .voltage_level(voltage_level_id)
            .ok_or_else(|| DiagramError::NotFound(voltage_level_id.to_owned()))?;

        let layout = layout::single_line(network, level)?;
        let svg = draw::single_line(&layout).to_string();
        let metadata = metadata(&layout, network);
        debug!(
            voltage_level = %voltage_level_id,
            version = %network.version(),
            elements = metadata.elements.len(),
            bytes = svg.len(),
            "single-line diagram rendered"
        );

        Ok(DiagramArtifact {
            voltage_level_id: level.id.clone(),
            network_version: network.version(),
            svg,
            metadata,
        })
    }
}

fn switch_metadata(placed: &PlacedSwitch<'_>, busbar_id: Option<String>) -> ElementMetadata {
    ElementMetadata {
        svg_id: placed.svg_id.clone(),
        equipment_id: placed.switch.id.clone(),
        kind: EquipmentKind::Switch,
        label: placed
            .switch
            .name
            .clone()
            .unwrap_or_else(|| placed.switch.id.clone()),
        bbox: placed.bbox,
        direction: None,
        busbar_id,
        remote_voltage_level_id: None,
        open: Some(placed.switch.open),
        connected: None,
    }
}

fn metadata(layout: &SldLayout<'_>, network: &Network) -> DiagramMetadata {
    let busbar_id = |index: Option<usize>| {
        index
            .and_then(|i| layout.busbars.get(i))
            .map(|busbar| busbar.equipment_id.to_owned())
    };

    let mut elements = Vec::new();
    let mut wires = Vec::new();

    for busbar in &layout.busbars {
        elements.push(ElementMetadata {
            svg_id: busbar.svg_id.clone(),
            equipment_id: busbar.equipment_id.to_owned(),
            kind: busbar.kind,
            label: busbar.label.clone(),
            bbox: busbar.bbox,
            direction: None,
            busbar_id: None,
            remote_voltage_level_id: None,
            open: None,
            connected: None,
        });
    }

    for coupler in &layout.couplers {
        elements.push(switch_metadata(&coupler.switch, busbar_id(coupler.from)));
        wires.push(WireMetadata {
            svg_id: format!("{}-wire", coupler.switch.svg_id),
            equipment_id: coupler.switch.switch.id.clone(),
            points: coupler.wire.clone(),
        });
    }

    for feeder in &layout.feeders {
        for switch in &feeder.switches {
            elements.push(switch_metadata(switch, busbar_id(feeder.busbar)));
        }
        elements.push(ElementMetadata {
            svg_id: feeder.svg_id.clone(),
            equipment_id: feeder.equipment_id.to_owned(),
            kind: feeder.kind,
            label: feeder.label.clone(),
            bbox: feeder.symbol,
            direction: Some(feeder.direction),
            busbar_id: busbar_id(feeder.busbar),
            remote_voltage_level_id: feeder.remote_voltage_level.map(str::to_owned),
            open: None,
            connected: Some(feeder.connected),
        });
        wires.push(WireMetadata {
            svg_id: format!("{}-wire", feeder.svg_id),
            equipment_id: feeder.equipment_id.to_owned(),
            points: feeder.wire.clone(),
        });
    }

    DiagramMetadata {
        voltage_level_id: layout.level.id.clone(),
        network_version: network.version(),
        nominal_kv: layout.level.nominal_kv,
        width: layout.width,
        height: layout.height,
        elements,
        wires,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Direction;
    use gridscope_model::parse;

    const DOC: &str = r#"<network id="n"><substation id="S1">
        <voltageLevel id="VL1" nominalV="400">
            <busBreakerTopology>
                <bus id="B1"/><bus id="B2"/>
                <switch id="CPL" kind="BREAKER" open="true" bus1="B1" bus2="B2"/>
            </busBreakerTopology>
            <generator id="G1" name="Unit 1" bus="B1"/>
            <load id="LD1" connectableBus="B2"/>
        </voltageLevel>
        <voltageLevel id="VL2" nominalV="225"><busBreakerTopology><bus id="B3"/></busBreakerTopology></voltageLevel>
        <twoWindingsTransformer id="T1" voltageLevelId1="VL1" bus1="B2" voltageLevelId2="VL2" bus2="B3"/>
    </substation></network>"#;

    #[test]
    fn metadata_describes_every_drawn_element() {
        let network = parse(DOC.as_bytes()).unwrap();
        let artifact = SingleLineRenderer.render(&network, "VL1").unwrap();
        let ids: Vec<_> = artifact
            .metadata
            .elements
            .iter()
            .map(|e| e.equipment_id.as_str())
            .collect();
        assert_eq!(ids, vec!["B1", "B2", "CPL", "G1", "LD1", "T1"]);
        for element in &artifact.metadata.elements {
            assert!(
                artifact.svg.contains(&format!("id=\"{}\"", element.svg_id)),
                "missing {}",
                element.svg_id
            );
        }

        let generator = artifact.metadata.element("G1").unwrap();
        assert_eq!(generator.label, "Unit 1");
        assert_eq!(generator.direction, Some(Direction::Top));
        assert_eq!(generator.busbar_id.as_deref(), Some("B1"));

        let load = artifact.metadata.element("LD1").unwrap();
        assert_eq!(load.connected, Some(false));

        let transformer = artifact.metadata.element("T1").unwrap();
        assert_eq!(transformer.kind, EquipmentKind::TwoWindingsTransformer);
        assert_eq!(transformer.remote_voltage_level_id.as_deref(), Some("VL2"));

        assert_eq!(artifact.metadata.element("CPL").unwrap().open, Some(true));
        assert!(artifact.svg.contains("sld-open"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let network = parse(DOC.as_bytes()).unwrap();
        let first = SingleLineRenderer.render(&network, "VL1").unwrap();
        let second = SingleLineRenderer.render(&network, "VL1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_level_is_not_found() {
        let network = parse(DOC.as_bytes()).unwrap();
        assert_eq!(
            SingleLineRenderer.render(&network, "S1").unwrap_err(),
            DiagramError::NotFound("S1".into())
        );
    }

    #[test]
    fn shared_switch_has_one_svg_element_and_one_entry() {
        let xml = r#"<network id="nb"><substation id="S">
            <voltageLevel id="VL" nominalV="63" topologyKind="NODE_BREAKER">
                <nodeBreakerTopology>
                    <busbarSection id="BBS" node="0"/>
                    <switch id="D1" kind="DISCONNECTOR" open="false" node1="0" node2="1"/>
                </nodeBreakerTopology>
                <load id="L1" node="1"/>
                <load id="L2" node="1"/>
            </voltageLevel>
        </substation></network>"#;
        let network = parse(xml.as_bytes()).unwrap();
        let artifact = SingleLineRenderer.render(&network, "VL").unwrap();

        let switches: Vec<_> = artifact
            .metadata
            .elements
            .iter()
            .filter(|e| e.equipment_id == "D1")
            .collect();
        assert_eq!(switches.len(), 1);
        let id = format!("id=\"{}\"", switches[0].svg_id);
        assert_eq!(artifact.svg.matches(&id).count(), 1);

        let mut svg_ids: Vec<_> = artifact.metadata.elements.iter().map(|e| &e.svg_id).collect();
        let total = svg_ids.len();
        svg_ids.sort();
        svg_ids.dedup();
        assert_eq!(svg_ids.len(), total);
    }

    #[test]
    fn far_end_level_renders() {
        let network = parse(DOC.as_bytes()).unwrap();
        let artifact = SingleLineRenderer.render(&network, "VL2").unwrap();
        assert!(artifact.svg.starts_with("<svg"));
        assert_eq!(artifact.metadata.nominal_kv, 225.0);
    }
}
