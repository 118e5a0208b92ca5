pub use cgmath;
pub use graph::{GraphError, Node, NodeId, NodeType, RoadGraph};
pub use light::{Axis, ControllerAttributes, LightState, TrafficController};
pub use manager::{CoordinationParams, TrafficManager};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::{Vehicle, VehicleAttributes, VehicleKind};

mod debug;
mod graph;
mod light;
mod manager;
pub mod math;
mod simulation;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
    /// Unique ID of a [TrafficController].
    pub struct ControllerId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
type ControllerSet = SlotMap<ControllerId, TrafficController>;
