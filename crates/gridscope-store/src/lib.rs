//! ---
//! ems_section: "04-topology-store"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Active network slot, change fan-out, and query views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! The active-network slot shared by every request, the change notifier it
//! publishes to, and the query views derived from a network snapshot.

pub mod error;
pub mod notifier;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use notifier::{ChangeCause, ChangeEvent, ChangeNotifier, Subscription};
pub use query::{
    equipment_of, list_substations, list_voltage_levels, voltage_levels_of,
    EquipmentSummary, SubstationSummary, VoltageLevelSummary,
};
pub use store::TopologyStore;
