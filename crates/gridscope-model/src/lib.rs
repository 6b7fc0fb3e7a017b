//! ---
//! ems_section: "02-grid-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network model, identifiers, and document parsing."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Immutable network topology model and the XIIDM parser that produces it.

pub mod error;
pub mod network;
pub mod parser;
pub mod version;

pub use error::{ModelError, Result};
pub use network::{
    Branch, BranchKind, Bus, BusbarSection, Connection, Equipment, EquipmentKind, Injection,
    InternalConnection, Network, NetworkDocument, Substation, Switch, SwitchKind, Terminal,
    TopologyKind, VoltageLevel,
};
pub use parser::{parse, parse_document};
pub use version::VersionToken;
