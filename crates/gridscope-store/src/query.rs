//! ---
//! ems_section: "04-topology-store"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Active network slot, change fan-out, and query views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Read-only views over a network snapshot.
//!
//! Every listing follows document order.
use gridscope_model::{Equipment, EquipmentKind, Network, Substation, TopologyKind, VoltageLevel};
use serde::Serialize;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstationSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tso: Option<String>,
    pub voltage_level_ids: Vec<String>,
}

impl From<&Substation> for SubstationSummary {
    fn from(substation: &Substation) -> Self {
        Self {
            id: substation.id.clone(),
            name: substation.name.clone(),
            country: substation.country.clone(),
            tso: substation.tso.clone(),
            voltage_level_ids: substation
                .voltage_levels
                .iter()
                .map(|vl| vl.id.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoltageLevelSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub substation_id: String,
    pub nominal_kv: f64,
    pub topology_kind: TopologyKind,
    pub equipment_count: usize,
}

impl From<&VoltageLevel> for VoltageLevelSummary {
    fn from(level: &VoltageLevel) -> Self {
        Self {
            id: level.id.clone(),
            name: level.name.clone(),
            substation_id: level.substation_id.clone(),
            nominal_kv: level.nominal_kv,
            topology_kind: level.topology_kind,
            equipment_count: level.equipment.len(),
        }
    }
}

/// One piece of equipment attached to a voltage level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: EquipmentKind,
    /// Far end of a branch, when the branch leaves the voltage level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_voltage_level_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
}

pub fn list_substations(network: &Network) -> Vec<SubstationSummary> {
    network.substations().iter().map(SubstationSummary::from).collect()
}

pub fn list_voltage_levels(network: &Network) -> Vec<VoltageLevelSummary> {
    network.voltage_levels().map(VoltageLevelSummary::from).collect()
}

/// Voltage levels of one substation, `NotFound` when the substation is absent.
pub fn voltage_levels_of(network: &Network, substation_id: &str) -> Result<Vec<VoltageLevelSummary>> {
    let substation = network
        .substation(substation_id)
        .ok_or_else(|| StoreError::not_found("substation", substation_id))?;
    Ok(substation
        .voltage_levels
        .iter()
        .map(VoltageLevelSummary::from)
        .collect())
}

/// Equipment owned by a voltage level followed by the branches touching it.
pub fn equipment_of(network: &Network, voltage_level_id: &str) -> Result<Vec<EquipmentSummary>> {
    let level = network
        .voltage_level(voltage_level_id)
        .ok_or_else(|| StoreError::not_found("voltage level", voltage_level_id))?;

    let owned = level.equipment.iter().map(|equipment| EquipmentSummary {
        id: equipment.id().to_owned(),
        name: equipment.name().map(str::to_owned),
        kind: equipment.kind(),
        remote_voltage_level_id: None,
        open: match equipment {
            Equipment::Switch(switch) => Some(switch.open),
            _ => None,
        },
    });
    let branches = network.branches_at(voltage_level_id).map(|branch| {
        let remote = branch
            .ends_at(voltage_level_id)
            .map(|(_, far)| far.voltage_level_id.clone())
            .filter(|far| far != voltage_level_id);
        EquipmentSummary {
            id: branch.id.clone(),
            name: branch.name.clone(),
            kind: branch.equipment_kind(),
            remote_voltage_level_id: remote,
            open: None,
        }
    });
    Ok(owned.chain(branches).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscope_model::parse;

    const DOC: &str = r#"<network id="q">
        <substation id="S2"><voltageLevel id="Z" nominalV="63"><busBreakerTopology><bus id="BZ"/></busBreakerTopology></voltageLevel></substation>
        <substation id="S1">
            <voltageLevel id="VL1" nominalV="400"><busBreakerTopology><bus id="B1"/></busBreakerTopology></voltageLevel>
            <voltageLevel id="A" nominalV="225">
                <busBreakerTopology><bus id="B2"/><bus id="B3"/><switch id="SW" kind="BREAKER" open="true" bus1="B2" bus2="B3"/></busBreakerTopology>
                <load id="LD" bus="B3"/>
            </voltageLevel>
        </substation>
        <line id="L1" voltageLevelId1="VL1" bus1="B1" voltageLevelId2="A" bus2="B2"/>
    </network>"#;

    #[test]
    fn listings_keep_document_order() {
        let network = parse(DOC.as_bytes()).unwrap();
        let substations: Vec<_> = list_substations(&network).into_iter().map(|s| s.id).collect();
        assert_eq!(substations, vec!["S2", "S1"]);
        let levels: Vec<_> = list_voltage_levels(&network).into_iter().map(|v| v.id).collect();
        assert_eq!(levels, vec!["Z", "VL1", "A"]);
        let of_s1: Vec<_> = voltage_levels_of(&network, "S1")
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(of_s1, vec!["VL1", "A"]);
    }

    #[test]
    fn unknown_substation_is_not_found() {
        let network = parse(DOC.as_bytes()).unwrap();
        let err = voltage_levels_of(&network, "VL1").unwrap_err();
        assert_eq!(err.kind(), "NotFound");
        assert_eq!(err.to_string(), "substation 'VL1' not found");
    }

    #[test]
    fn equipment_lists_owned_items_then_branches() {
        let network = parse(DOC.as_bytes()).unwrap();
        let items = equipment_of(&network, "A").unwrap();
        let ids: Vec<_> = items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["B2", "B3", "SW", "LD", "L1"]);
        assert_eq!(items[2].open, Some(true));
        assert_eq!(items[4].remote_voltage_level_id.as_deref(), Some("VL1"));
        assert_eq!(items[4].kind, EquipmentKind::Line);
    }
}
