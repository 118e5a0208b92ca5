use crate::debug::debug_stop;
use crate::math::{flat_dot, lerp, right_of, Vector3d};
use crate::{
    Axis, ControllerAttributes, ControllerId, ControllerSet, LightState, NodeId, RoadGraph,
    TrafficController, Vehicle, VehicleId, VehicleSet,
};
use cgmath::MetricSpace;
use log::warn;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The gap to a lead vehicle below which a follower targets a full stop, in m.
const MIN_SAFE_GAP: f64 = 4.0; // m
/// Gaps below this are treated as already side by side and are not followed, in m.
const MAX_OVERLAP: f64 = -1.0; // m
/// The radius around a controller within which an emergency vehicle commandeers it, in m.
const EMERGENCY_RADIUS: f64 = 120.0; // m
/// The range behind an emergency vehicle within which traffic pulls aside, in m.
const YIELD_BEHIND_RANGE: f64 = 80.0; // m
/// The range ahead of an emergency vehicle within which it weaves around a blocker, in m.
const YIELD_AHEAD_RANGE: f64 = 40.0; // m
/// The lateral offset adopted when pulling over to the right, in m.
const YIELD_RIGHT_OFFSET: f64 = 3.5; // m
/// The lateral offset an emergency vehicle adopts to pass on the left, in m.
const YIELD_LEFT_OFFSET: f64 = -2.0; // m
/// The exponential rate at which lateral offsets approach their target, per s.
const YIELD_SMOOTHING: f64 = 3.0; // 1/s
/// The dot product above which two headings count as travelling the same way.
const SAME_DIRECTION_DOT: f64 = 0.7;
/// The lane half-width for checks on offset-adjusted positions, in m.
const LANE_WIDTH_VISUAL: f64 = 2.2; // m
/// The lane half-width for checks that ignore lateral offsets, in m.
const LANE_WIDTH_PHYSICAL: f64 = 2.5; // m
/// The longitudinal pad added to the crossing conflict zone, in m.
const CROSSING_PAD: f64 = 3.0; // m
/// The lateral separation below which crossing traffic forces a stop, in m.
const CROSSING_WIDTH: f64 = 2.5; // m
/// Additional scan range per unit of current speed.
const DETECTION_SPEED_FACTOR: f64 = 2.0;
/// Additional slowing distance per unit of current speed.
const SLOWING_SPEED_FACTOR: f64 = 1.5;
/// The acceleration applied when below the target speed, in m/s^2.
const ACCEL_RATE: f64 = 10.0; // m/s^2
/// The base braking applied when above the target speed, in m/s^2.
const BRAKE_RATE: f64 = 15.0; // m/s^2
/// Additional braking per unit of current speed.
const BRAKE_SPEED_FACTOR: f64 = 0.5;
/// The braking applied when closing under the safe gap at speed, in m/s^2.
const HARD_BRAKE_RATE: f64 = 50.0; // m/s^2
/// The extra gap under which the hard brake engages, in m.
const HARD_BRAKE_MARGIN: f64 = 2.0; // m

/// The distances and speeds governing the coordination rules.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinationParams {
    /// The distance from a red light's node at which vehicles hold, in m.
    pub start_slowing_dist: f64,
    /// The base radius of the proximity scan around each vehicle, in m.
    pub detection_range: f64,
    /// The speed applied to a vehicle under a force-move override, in m/s.
    pub force_move_speed: f64,
}

impl Default for CoordinationParams {
    fn default() -> Self {
        Self {
            start_slowing_dist: 20.0,
            detection_range: 50.0,
            force_move_speed: 18.0,
        }
    }
}

/// The closest same-direction vehicle ahead of another, found by the proximity scan.
struct Lead {
    /// The gap between the two vehicle bodies, in m.
    gap: f64,
    /// The ID of the lead vehicle.
    vehicle: VehicleId,
}

/// Coordinates all traffic controllers and resolves every vehicle's
/// speed and lateral offset, one frame at a time.
///
/// Vehicles are processed sequentially, so a decision made for one vehicle
/// is visible to the vehicles processed after it in the same frame.
#[derive(Default)]
pub struct TrafficManager {
    /// The distances and speeds governing the coordination rules.
    params: CoordinationParams,
    /// The traffic controllers.
    controllers: ControllerSet,
}

impl TrafficManager {
    /// Creates a new traffic manager.
    pub fn new(params: CoordinationParams) -> Self {
        Self {
            params,
            controllers: ControllerSet::default(),
        }
    }

    /// Adds a traffic controller governing the given nodes.
    pub fn add_controller(&mut self, nodes: &[NodeId]) -> ControllerId {
        self.controllers
            .insert_with_key(|id| TrafficController::new(id, nodes))
    }

    /// Applies the given attributes to a controller.
    pub fn configure_controller(&mut self, id: ControllerId, attributes: &ControllerAttributes) {
        if let Some(ctrl) = self.controllers.get_mut(id) {
            ctrl.configure(attributes);
        }
    }

    /// Gets the controller with the given ID.
    pub fn get_controller(&self, id: ControllerId) -> Option<&TrafficController> {
        self.controllers.get(id)
    }

    /// Iterates over all the controllers.
    pub fn iter_controllers(&self) -> impl Iterator<Item = (ControllerId, &TrafficController)> {
        self.controllers.iter()
    }

    /// Removes all controllers.
    pub fn clear(&mut self) {
        self.controllers.clear();
    }

    /// Advances every controller's light phase and applies the phases
    /// to the governed road nodes.
    ///
    /// Emergency overrides are recomputed from scratch each frame:
    /// while a non-finished emergency vehicle is within range of a controller,
    /// the controller shows green to traffic on its own axis and red to the rest.
    pub fn update_lights(&mut self, dt: f64, graph: &mut RoadGraph, vehicles: &VehicleSet) {
        let emergency = vehicles
            .values()
            .find(|vehicle| vehicle.is_emergency() && !vehicle.is_finished());

        for ctrl in self.controllers.values_mut() {
            ctrl.clear_override();
            if let Some(ev) = emergency {
                let in_range = ctrl.position().distance(ev.position()) < EMERGENCY_RADIUS;
                if in_range {
                    if let Some(axis) = Axis::dominant(ev.forward()) {
                        let state = if axis == ctrl.axis() {
                            LightState::Green
                        } else {
                            LightState::Red
                        };
                        ctrl.set_override(state);
                    }
                }
            }
            ctrl.step(dt);

            let state = ctrl.state();
            for &node_id in ctrl.node_ids() {
                match graph.get_mut(node_id) {
                    Ok(node) => node.set_light(Some(state)),
                    Err(err) => warn!("controller {:?} skipped a node: {}", ctrl.id(), err),
                }
            }
        }
    }

    /// Resolves the speed and lateral offset of every vehicle for this frame.
    ///
    /// This only decides how fast each vehicle wants to travel;
    /// positions are integrated separately.
    pub fn update_vehicles(&self, dt: f64, vehicles: &mut VehicleSet, graph: &RoadGraph) {
        let ids: Vec<VehicleId> = vehicles.keys().collect();
        let emergencies: Vec<VehicleId> = vehicles
            .iter()
            .filter(|(_, vehicle)| vehicle.is_emergency() && !vehicle.is_finished())
            .map(|(id, _)| id)
            .collect();

        for &id in &ids {
            if vehicles[id].is_finished() {
                continue;
            }

            // Lateral yielding is smoothed every frame, even under a force-move.
            let target_offset = self.yield_offset(&vehicles[id], vehicles, &emergencies);
            let amount = f64::min(YIELD_SMOOTHING * dt, 1.0);
            let offset = lerp(vehicles[id].lateral_offset(), target_offset, amount);
            vehicles[id].set_lateral_offset(offset);

            // A force-move overrides every stop rule until its timer lapses.
            vehicles[id].tick_force_move(dt);
            if vehicles[id].force_move_timer() > 0.0 {
                let speed = self.params.force_move_speed;
                vehicles[id].set_speed(speed);
                continue;
            }

            let held = self.holds_at_light(&vehicles[id], graph);
            if held {
                debug_stop(id, "red light");
            }
            let (crossing, lead) = self.scan_traffic(&vehicles[id], vehicles);
            if crossing {
                debug_stop(id, "crossing traffic");
            }

            let target = self.target_speed(&vehicles[id], held || crossing, lead.as_ref(), vehicles);
            let speed = self.next_speed(&vehicles[id], target, lead.as_ref(), dt);
            vehicles[id].set_speed(speed);
        }
    }

    /// Computes the lateral offset a vehicle should drift toward this frame.
    ///
    /// Ordinary traffic pulls over to the right when an emergency vehicle
    /// approaches from behind in the same physical lane. An emergency vehicle
    /// instead weaves to the left while a slower vehicle blocks its path.
    fn yield_offset(
        &self,
        current: &Vehicle,
        vehicles: &VehicleSet,
        emergencies: &[VehicleId],
    ) -> f64 {
        if current.is_emergency() {
            let blocked = vehicles.values().any(|other| {
                other.id != current.id
                    && !other.is_finished()
                    && same_direction(current.forward(), other.forward())
                    && current.position().distance(other.position()) < YIELD_AHEAD_RANGE
                    && in_lane_visual(current, other)
            });
            if blocked {
                return YIELD_LEFT_OFFSET;
            }
        } else {
            let yields = emergencies.iter().any(|&ev_id| {
                let ev = &vehicles[ev_id];
                same_direction(current.forward(), ev.forward())
                    && current.position().distance(ev.position()) < YIELD_BEHIND_RANGE
                    && flat_dot(current.position() - ev.position(), ev.forward()) > 0.0
                    && in_lane_physical(ev, current)
            });
            if yields {
                return YIELD_RIGHT_OFFSET;
            }
        }
        0.0
    }

    /// Determines whether a vehicle must hold for a red or yellow light.
    ///
    /// A vehicle holds when its target node is governed by a controller
    /// showing red or yellow, the node is ahead of it, and it is within
    /// the slowing distance. Emergency vehicles never hold for lights.
    fn holds_at_light(&self, current: &Vehicle, graph: &RoadGraph) -> bool {
        if current.is_emergency() {
            return false;
        }
        for ctrl in self.controllers.values() {
            if !ctrl.governs(current.target_node()) {
                continue;
            }
            if !matches!(ctrl.state(), LightState::Red | LightState::Yellow) {
                continue;
            }
            let node = match graph.get(current.target_node()) {
                Ok(node) => node,
                Err(err) => {
                    warn!("vehicle {:?} skipped a light check: {}", current.id, err);
                    continue;
                }
            };
            let to_node = node.position() - current.position();
            if current.position().distance(node.position()) < self.params.start_slowing_dist
                && flat_dot(to_node, current.forward()) > 0.0
            {
                return true;
            }
        }
        false
    }

    /// Scans nearby traffic for the closest same-direction lead vehicle
    /// and for crossing traffic that forces a stop.
    ///
    /// The scan radius grows with the vehicle's speed. Emergency vehicles
    /// ignore crossing traffic, since the lights already part it for them.
    fn scan_traffic(&self, current: &Vehicle, vehicles: &VehicleSet) -> (bool, Option<Lead>) {
        let mut stop = false;
        let mut lead: Option<Lead> = None;
        let detection = self.params.detection_range + current.speed() * DETECTION_SPEED_FACTOR;

        for other in vehicles.values() {
            if other.id == current.id || other.is_finished() {
                continue;
            }
            let dist = current.position().distance(other.position());
            if dist > detection {
                continue;
            }

            if same_direction(current.forward(), other.forward()) {
                if !in_lane_visual(current, other) {
                    continue;
                }
                let gap = dist - (current.half_length() + other.half_length());
                if gap > MAX_OVERLAP && lead.as_ref().map_or(true, |l| gap < l.gap) {
                    lead = Some(Lead {
                        gap,
                        vehicle: other.id,
                    });
                }
            } else if !current.is_emergency() {
                let to_other = other.position() - current.position();
                let ahead = flat_dot(to_other, current.forward());
                let side = flat_dot(to_other, right_of(current.forward()));
                if ahead > 0.0
                    && ahead < current.half_length() + other.half_length() + CROSSING_PAD
                    && side.abs() < CROSSING_WIDTH
                {
                    stop = true;
                }
            }
        }
        (stop, lead)
    }

    /// Resolves the speed a vehicle should be aiming for this frame.
    ///
    /// Any stop condition wins outright. Otherwise a follower blends the
    /// lead vehicle's speed into its own desired speed as the gap opens
    /// from the minimum safe gap out to the slowing distance.
    fn target_speed(
        &self,
        current: &Vehicle,
        stop: bool,
        lead: Option<&Lead>,
        vehicles: &VehicleSet,
    ) -> f64 {
        if stop {
            return 0.0;
        }
        let lead = match lead {
            Some(lead) => lead,
            None => return current.desired_speed(),
        };
        if lead.gap < MIN_SAFE_GAP {
            return 0.0;
        }
        let slowing = self.params.start_slowing_dist + current.speed() * SLOWING_SPEED_FACTOR;
        if lead.gap >= slowing {
            return current.desired_speed();
        }
        let factor = (lead.gap - MIN_SAFE_GAP) / (slowing - MIN_SAFE_GAP);
        lerp(vehicles[lead.vehicle].speed(), current.desired_speed(), factor)
    }

    /// Steps the vehicle's speed toward the target speed.
    ///
    /// Braking strength grows with speed, and a much harder brake engages
    /// when the follower is closing under the safe gap at speed.
    fn next_speed(&self, current: &Vehicle, target: f64, lead: Option<&Lead>, dt: f64) -> f64 {
        let speed = current.speed();
        if speed > target {
            let tailgating = lead.map_or(false, |l| l.gap < MIN_SAFE_GAP + HARD_BRAKE_MARGIN);
            let braking = if tailgating && speed > 1.0 {
                HARD_BRAKE_RATE
            } else {
                BRAKE_RATE + speed * BRAKE_SPEED_FACTOR
            };
            f64::max(speed - braking * dt, target)
        } else {
            f64::min(speed + ACCEL_RATE * dt, target)
        }
    }
}

/// Whether two headings point roughly the same way in the ground plane.
/// A degenerate heading matches no direction.
fn same_direction(a: Vector3d, b: Vector3d) -> bool {
    flat_dot(a, b) > SAME_DIRECTION_DOT
}

/// Whether `other` is ahead of `me` and within its lane width,
/// judged on positions displaced by the current lateral offsets.
fn in_lane_visual(me: &Vehicle, other: &Vehicle) -> bool {
    let to_other = other.offset_position() - me.offset_position();
    if flat_dot(to_other, me.forward()) < 0.0 {
        return false;
    }
    flat_dot(to_other, right_of(me.forward())).abs() < LANE_WIDTH_VISUAL
}

/// Whether `other` occupies the same physical lane as `me`.
/// Judged on centreline positions, so a vehicle mid-yield
/// still counts as occupying its lane.
fn in_lane_physical(me: &Vehicle, other: &Vehicle) -> bool {
    let to_other = other.position() - me.position();
    flat_dot(to_other, right_of(me.forward())).abs() < LANE_WIDTH_PHYSICAL
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::{Point3d, Vector3d};
    use crate::{VehicleAttributes, VehicleKind, VehicleSet};
    use assert_approx_eq::assert_approx_eq;

    fn insert_vehicle(
        vehicles: &mut VehicleSet,
        pos: Point3d,
        forward: Vector3d,
        kind: VehicleKind,
    ) -> VehicleId {
        let attributes = VehicleAttributes {
            kind,
            length: 4.0,
            desired_speed: 10.0,
        };
        vehicles.insert_with_key(|id| {
            Vehicle::new(id, &attributes, pos, forward, crate::NodeId(0))
        })
    }

    #[test]
    fn same_direction_requires_aligned_headings() {
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let south = Vector3d::new(0.0, 0.0, 1.0);
        let zero = Vector3d::new(0.0, 0.0, 0.0);
        assert!(same_direction(east, east));
        assert!(!same_direction(east, south));
        assert!(!same_direction(east, -east));
        assert!(!same_direction(zero, east));
    }

    #[test]
    fn physical_lane_membership_ignores_lateral_offsets() {
        let mut vehicles = VehicleSet::default();
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let a = insert_vehicle(&mut vehicles, Point3d::new(0.0, 0.0, 0.0), east, VehicleKind::Car);
        let b = insert_vehicle(&mut vehicles, Point3d::new(10.0, 0.0, 0.0), east, VehicleKind::Car);
        vehicles[b].set_lateral_offset(3.5);

        assert!(in_lane_physical(&vehicles[a], &vehicles[b]));
        assert!(!in_lane_visual(&vehicles[a], &vehicles[b]));
    }

    #[test]
    fn vehicles_behind_are_not_in_lane() {
        let mut vehicles = VehicleSet::default();
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let a = insert_vehicle(&mut vehicles, Point3d::new(0.0, 0.0, 0.0), east, VehicleKind::Car);
        let b = insert_vehicle(&mut vehicles, Point3d::new(-10.0, 0.0, 0.0), east, VehicleKind::Car);

        assert!(!in_lane_visual(&vehicles[a], &vehicles[b]));
        assert!(in_lane_visual(&vehicles[b], &vehicles[a]));
    }

    #[test]
    fn target_speed_stops_under_the_safe_gap() {
        let manager = TrafficManager::default();
        let mut vehicles = VehicleSet::default();
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let rear = insert_vehicle(&mut vehicles, Point3d::new(0.0, 0.0, 0.0), east, VehicleKind::Car);
        let front = insert_vehicle(&mut vehicles, Point3d::new(7.0, 0.0, 0.0), east, VehicleKind::Car);

        let lead = Lead { gap: 3.0, vehicle: front };
        let target = manager.target_speed(&vehicles[rear], false, Some(&lead), &vehicles);
        assert_eq!(target, 0.0);
    }

    #[test]
    fn target_speed_blends_toward_the_lead_speed() {
        let manager = TrafficManager::default();
        let mut vehicles = VehicleSet::default();
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let rear = insert_vehicle(&mut vehicles, Point3d::new(0.0, 0.0, 0.0), east, VehicleKind::Car);
        let front = insert_vehicle(&mut vehicles, Point3d::new(16.0, 0.0, 0.0), east, VehicleKind::Car);
        vehicles[front].set_speed(4.0);

        // With the rear vehicle stationary the slowing distance is 20,
        // so a gap of 12 blends half way between the speeds.
        let lead = Lead { gap: 12.0, vehicle: front };
        let target = manager.target_speed(&vehicles[rear], false, Some(&lead), &vehicles);
        assert_approx_eq!(target, 7.0);
    }

    #[test]
    fn stops_always_outrank_following() {
        let manager = TrafficManager::default();
        let mut vehicles = VehicleSet::default();
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let rear = insert_vehicle(&mut vehicles, Point3d::new(0.0, 0.0, 0.0), east, VehicleKind::Car);
        let front = insert_vehicle(&mut vehicles, Point3d::new(30.0, 0.0, 0.0), east, VehicleKind::Car);
        vehicles[front].set_speed(8.0);

        let lead = Lead { gap: 26.0, vehicle: front };
        let target = manager.target_speed(&vehicles[rear], true, Some(&lead), &vehicles);
        assert_eq!(target, 0.0);
    }

    #[test]
    fn hard_brake_engages_when_closing_under_the_safe_gap() {
        let manager = TrafficManager::default();
        let mut vehicles = VehicleSet::default();
        let east = Vector3d::new(1.0, 0.0, 0.0);
        let rear = insert_vehicle(&mut vehicles, Point3d::new(0.0, 0.0, 0.0), east, VehicleKind::Car);
        let front = insert_vehicle(&mut vehicles, Point3d::new(9.0, 0.0, 0.0), east, VehicleKind::Car);
        vehicles[rear].set_speed(10.0);

        let lead = Lead { gap: 5.0, vehicle: front };
        let speed = manager.next_speed(&vehicles[rear], 0.0, Some(&lead), 0.1);
        assert_approx_eq!(speed, 5.0);

        // Beyond the hard-brake margin, the ordinary braking rate applies.
        let lead = Lead { gap: 8.0, vehicle: front };
        let speed = manager.next_speed(&vehicles[rear], 0.0, Some(&lead), 0.1);
        assert_approx_eq!(speed, 8.0);
    }
}
