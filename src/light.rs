use crate::debug::debug_override;
use crate::math::{Point3d, Vector3d};
use crate::{ControllerId, NodeId};
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Steady-state green phase duration applied before a controller is configured, in s.
const DEFAULT_GREEN_TIME: f64 = 15.0; // s
/// Steady-state yellow phase duration applied before a controller is configured, in s.
const DEFAULT_YELLOW_TIME: f64 = 3.0; // s
/// Steady-state red phase duration applied before a controller is configured, in s.
const DEFAULT_RED_TIME: f64 = 15.0; // s

/// The phase of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LightState {
    Green,
    Yellow,
    Red,
}

/// The ground-plane travel axis a controller grants priority to
/// during an emergency override.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    X,
    Z,
}

impl Axis {
    /// Gets the dominant ground-plane axis of a heading,
    /// or `None` for a degenerate or non-finite heading.
    pub fn dominant(v: Vector3d) -> Option<Axis> {
        let (x, z) = (v.x.abs(), v.z.abs());
        if !(x + z > 0.0) {
            return None;
        }
        Some(if z > x { Axis::Z } else { Axis::X })
    }
}

/// The attributes of a [TrafficController].
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerAttributes {
    /// The position of the controller, used for emergency proximity checks.
    pub position: Point3d,
    /// The orientation of the controller around the vertical axis, in radians.
    pub rotation: f64,
    /// The travel axis granted a green light during an emergency override.
    pub axis: Axis,
    /// The duration of the initial red phase, in s.
    /// A value of zero or less leaves the controller starting on green.
    pub start_red: f64,
    /// The duration of the green phase, in s.
    pub green_time: f64,
    /// The duration of the yellow phase, in s.
    pub yellow_time: f64,
    /// The duration of the red phase, in s.
    pub red_time: f64,
}

impl Default for ControllerAttributes {
    fn default() -> Self {
        Self {
            position: Point3d::new(0.0, 0.0, 0.0),
            rotation: 0.0,
            axis: Axis::X,
            start_red: 0.0,
            green_time: DEFAULT_GREEN_TIME,
            yellow_time: DEFAULT_YELLOW_TIME,
            red_time: DEFAULT_RED_TIME,
        }
    }
}

/// A signal that imposes a shared light phase on a group of road nodes.
///
/// The phases cycle green, yellow, red on configurable durations.
/// An emergency override may force the phase, which freezes the timer
/// until the override lapses.
pub struct TrafficController {
    /// The ID of the controller.
    id: ControllerId,
    /// The IDs of the nodes governed by the controller.
    nodes: SmallVec<[NodeId; 4]>,
    /// The current light phase.
    state: LightState,
    /// The time since the current phase was entered, in s.
    timer: f64,
    /// The duration of the green phase, in s.
    green_time: f64,
    /// The duration of the yellow phase, in s.
    yellow_time: f64,
    /// The duration of the red phase, in s.
    red_time: f64,
    /// The duration of the initial red phase, used for offsetting
    /// controllers against each other. Cleared once that phase ends.
    first_red: Option<f64>,
    /// The position of the controller.
    position: Point3d,
    /// The orientation of the controller around the vertical axis, in radians.
    rotation: f64,
    /// The travel axis granted a green light during an emergency override.
    axis: Axis,
    /// Whether an emergency vehicle is currently forcing the phase.
    emergency_override: bool,
}

impl TrafficController {
    /// Creates a new traffic controller governing the given nodes.
    pub(crate) fn new(id: ControllerId, nodes: &[NodeId]) -> Self {
        Self {
            id,
            nodes: SmallVec::from_slice(nodes),
            state: LightState::Green,
            timer: 0.0,
            green_time: DEFAULT_GREEN_TIME,
            yellow_time: DEFAULT_YELLOW_TIME,
            red_time: DEFAULT_RED_TIME,
            first_red: None,
            position: Point3d::new(0.0, 0.0, 0.0),
            rotation: 0.0,
            axis: Axis::X,
            emergency_override: false,
        }
    }

    /// Applies the given attributes to the controller.
    pub(crate) fn configure(&mut self, attributes: &ControllerAttributes) {
        self.position = attributes.position;
        self.rotation = attributes.rotation;
        self.axis = attributes.axis;
        self.green_time = attributes.green_time;
        self.yellow_time = attributes.yellow_time;
        self.red_time = attributes.red_time;
        if attributes.start_red > 0.0 {
            self.state = LightState::Red;
            self.first_red = Some(attributes.start_red);
            self.timer = 0.0;
        }
    }

    /// Advances the phase timer, unless an emergency override holds the phase.
    pub(crate) fn step(&mut self, dt: f64) {
        if self.emergency_override {
            return;
        }
        self.timer += dt;
        if self.timer >= self.phase_time() {
            self.timer = 0.0;
            self.state = match self.state {
                LightState::Green => LightState::Yellow,
                LightState::Yellow => LightState::Red,
                LightState::Red => {
                    self.first_red = None;
                    LightState::Green
                }
            };
        }
    }

    /// Gets the duration of the current phase, in s.
    fn phase_time(&self) -> f64 {
        match self.state {
            LightState::Green => self.green_time,
            LightState::Yellow => self.yellow_time,
            LightState::Red => self.first_red.unwrap_or(self.red_time),
        }
    }

    /// Forces the light phase for an emergency vehicle,
    /// freezing the phase timer until the override is cleared.
    pub(crate) fn set_override(&mut self, state: LightState) {
        if self.state != state {
            debug!("controller {:?} forced to {:?} for an emergency vehicle", self.id, state);
            debug_override(self.id, state);
        }
        self.state = state;
        self.emergency_override = true;
    }

    /// Releases an emergency override.
    /// The phase cycle resumes from the forced state.
    pub(crate) fn clear_override(&mut self) {
        self.emergency_override = false;
    }

    /// Gets the ID of the controller.
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Gets the current light phase.
    pub fn state(&self) -> LightState {
        self.state
    }

    /// Gets the IDs of the nodes governed by the controller.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Returns `true` if the controller governs the given node.
    pub fn governs(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Gets the position of the controller.
    pub fn position(&self) -> Point3d {
        self.position
    }

    /// Gets the orientation of the controller around the vertical axis, in radians.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Gets the travel axis granted a green light during an emergency override.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Returns `true` if an emergency vehicle is currently forcing the phase.
    pub fn emergency_override(&self) -> bool {
        self.emergency_override
    }
}
