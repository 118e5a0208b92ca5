use crate::math::{flat_direction, flat_normalize, right_of, Point3d, Vector3d};
use crate::{Node, NodeId, NodeType, RoadGraph, VehicleId};
use cgmath::prelude::*;
use log::warn;
use rand::seq::SliceRandom;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The distance from its target node at which a vehicle counts as arrived, in m.
const ARRIVAL_RADIUS: f64 = 2.0; // m

/// The exponential rate at which a vehicle's heading turns toward its target, per s.
const TURN_RATE: f64 = 4.0; // 1/s

/// The classification of a vehicle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VehicleKind {
    Car,
    Bus,
    Truck,
    Taxi,
    Police,
    Motorcycle,
}

impl VehicleKind {
    /// Whether vehicles of this kind respond to emergencies
    /// with signal priority and right of way.
    pub fn is_emergency(&self) -> bool {
        matches!(self, VehicleKind::Police)
    }
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VehicleAttributes {
    /// The classification of the vehicle.
    pub kind: VehicleKind,
    /// The vehicle length in m.
    pub length: f64,
    /// The cruising speed the vehicle holds when unobstructed, in m/s.
    pub desired_speed: f64,
}

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// The classification of the vehicle.
    kind: VehicleKind,
    /// Half the vehicle's length in m.
    half_len: f64,
    /// The world space coordinates of the centre of the vehicle.
    pos: Point3d,
    /// A unit vector in world space aligned with the vehicle's heading.
    forward: Vector3d,
    /// The current speed in m/s.
    speed: f64,
    /// The cruising speed the vehicle holds when unobstructed, in m/s.
    desired_speed: f64,
    /// The lateral offset from the lane centreline, in m.
    /// Positive offsets are to the right of the heading.
    lateral_offset: f64,
    /// The ID of the node the vehicle is travelling toward.
    target: NodeId,
    /// Whether the vehicle has reached the end of its journey.
    finished: bool,
    /// The remaining duration of a force-move override, in s.
    force_move: f64,
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(
        id: VehicleId,
        attributes: &VehicleAttributes,
        pos: Point3d,
        forward: Vector3d,
        target: NodeId,
    ) -> Self {
        Self {
            id,
            kind: attributes.kind,
            half_len: 0.5 * attributes.length,
            pos,
            forward,
            speed: 0.0,
            desired_speed: attributes.desired_speed,
            lateral_offset: 0.0,
            target,
            finished: false,
            force_move: 0.0,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Gets the classification of the vehicle.
    pub fn kind(&self) -> VehicleKind {
        self.kind
    }

    /// Whether the vehicle responds to emergencies
    /// with signal priority and right of way.
    pub fn is_emergency(&self) -> bool {
        self.kind.is_emergency()
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    /// Half the vehicle's length in m.
    pub fn half_length(&self) -> f64 {
        self.half_len
    }

    /// The coordinates in world space of the centre of the vehicle,
    /// on the lane centreline.
    pub fn position(&self) -> Point3d {
        self.pos
    }

    /// The coordinates in world space of the centre of the vehicle,
    /// displaced by its lateral offset.
    pub fn offset_position(&self) -> Point3d {
        self.pos + self.lateral_offset * right_of(self.forward)
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn forward(&self) -> Vector3d {
        self.forward
    }

    /// The vehicle's speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The cruising speed the vehicle holds when unobstructed, in m/s.
    pub fn desired_speed(&self) -> f64 {
        self.desired_speed
    }

    /// The lateral offset from the lane centreline, in m.
    pub fn lateral_offset(&self) -> f64 {
        self.lateral_offset
    }

    /// The ID of the node the vehicle is travelling toward.
    pub fn target_node(&self) -> NodeId {
        self.target
    }

    /// Whether the vehicle has reached the end of its journey.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The remaining duration of a force-move override, in s.
    pub fn force_move_timer(&self) -> f64 {
        self.force_move
    }

    /// Sets the vehicle's speed, which is never negative.
    pub(crate) fn set_speed(&mut self, speed: f64) {
        self.speed = f64::max(speed, 0.0);
    }

    /// Sets the lateral offset from the lane centreline, in m.
    pub(crate) fn set_lateral_offset(&mut self, offset: f64) {
        self.lateral_offset = offset;
    }

    /// Multiplies the vehicle's desired speed by the given factor.
    pub(crate) fn scale_desired_speed(&mut self, factor: f64) {
        self.desired_speed *= factor;
    }

    /// Starts a force-move override lasting the given duration, in s.
    pub(crate) fn set_force_move(&mut self, seconds: f64) {
        self.force_move = seconds;
    }

    /// Counts down the force-move override.
    pub(crate) fn tick_force_move(&mut self, dt: f64) {
        if self.force_move > 0.0 {
            self.force_move -= dt;
        }
    }

    /// Integrates the vehicle's heading and position, and advances it
    /// through the road graph when it arrives at its target node.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, dt: f64, graph: &RoadGraph, rng: &mut impl Rng) {
        if self.finished {
            return;
        }

        let node = match graph.get(self.target) {
            Ok(node) => node,
            Err(err) => {
                warn!("vehicle {:?} cannot navigate: {}", self.id, err);
                self.finished = true;
                return;
            }
        };

        if self.pos.distance(node.position()) < ARRIVAL_RADIUS {
            self.arrive(node, graph, rng);
            return;
        }

        // Steer toward the target, then move along the heading.
        // The vertical coordinate is untouched.
        if let Some(dir) = flat_direction(self.pos, node.position()) {
            let amount = f64::min(TURN_RATE * dt, 1.0);
            if let Some(heading) = flat_normalize(self.forward + amount * (dir - self.forward)) {
                self.forward = heading;
            }
        }
        self.pos += self.speed * dt * self.forward;
    }

    /// Handles arrival at the target node: relocates through teleports,
    /// picks the next target, or finishes the vehicle at a dead end.
    fn arrive(&mut self, node: &Node, graph: &RoadGraph, rng: &mut impl Rng) {
        match node.kind() {
            NodeType::Teleport => match node.teleport_target().map(|id| graph.get(id)) {
                Some(Ok(target)) => {
                    self.pos = target.position();
                    self.retarget(target, rng);
                }
                Some(Err(err)) => {
                    warn!("vehicle {:?} lost its teleport target: {}", self.id, err);
                    self.finished = true;
                }
                None => self.finished = true,
            },
            _ => self.retarget(node, rng),
        }
    }

    /// Selects the vehicle's next target from a reached node's successors.
    fn retarget(&mut self, node: &Node, rng: &mut impl Rng) {
        let next = match node.kind() {
            NodeType::Decision => node.next_nodes().choose(rng).copied(),
            _ => node.next_nodes().first().copied(),
        };
        match next {
            Some(next) => self.target = next,
            None => self.finished = true,
        }
    }
}
