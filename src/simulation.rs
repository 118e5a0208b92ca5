#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::graph::{GraphError, RoadGraph};
use crate::light::{ControllerAttributes, TrafficController};
use crate::manager::{CoordinationParams, TrafficManager};
use crate::math::{flat_direction, Vector3d};
use crate::vehicle::{Vehicle, VehicleAttributes};
use crate::{ControllerId, NodeId, VehicleId, VehicleSet};
use rand_distr::Distribution;

/// A traffic simulation.
#[derive(Default)]
pub struct Simulation {
    /// The road network vehicles navigate.
    graph: RoadGraph,
    /// The traffic manager, which owns the controllers.
    manager: TrafficManager,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The current frame of simulation.
    frame: usize,
    /// The elapsed simulation time in s.
    time: f64,
    /// Debugging information from the previously simulated frame.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl Simulation {
    /// Creates a new simulation.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a new simulation with the given coordination parameters.
    pub fn with_params(params: CoordinationParams) -> Self {
        Self {
            manager: TrafficManager::new(params),
            ..Default::default()
        }
    }

    /// Gets a reference to the road network.
    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    /// Gets a mutable reference to the road network, for building it up
    /// or adjusting spawn availability times.
    pub fn graph_mut(&mut self) -> &mut RoadGraph {
        &mut self.graph
    }

    /// Adds a vehicle to the simulation at the given spawn node,
    /// facing the node's first successor.
    pub fn add_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        spawn: NodeId,
    ) -> Result<VehicleId, GraphError> {
        let node = self.graph.get(spawn)?;
        let target = node
            .next_nodes()
            .first()
            .copied()
            .ok_or(GraphError::DeadEnd(spawn))?;
        let pos = node.position();
        let target_pos = self.graph.get(target)?.position();
        let forward = flat_direction(pos, target_pos).unwrap_or(Vector3d::unit_x());
        let id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes, pos, forward, target));
        Ok(id)
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        self.vehicles.remove(id);
    }

    /// Removes every vehicle that has finished its journey.
    pub fn remove_finished(&mut self) {
        self.vehicles.retain(|_, vehicle| !vehicle.is_finished());
    }

    /// Starts a force-move override on a vehicle, which drives it at the
    /// configured force-move speed for the given duration, ignoring lights
    /// and surrounding traffic.
    pub fn set_vehicle_force_move(&mut self, id: VehicleId, seconds: f64) {
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            vehicle.set_force_move(seconds);
        }
    }

    /// Randomly scales the desired speed of each vehicle by a factor
    /// sampled from a normal distribution with a mean of 1 (no adjustment)
    /// and standard deviation of `stddev`.
    pub fn randomise_desired_speeds(&mut self, stddev: f64) {
        let mut rand = rand::thread_rng();
        let distr = rand_distr::Normal::new(1.0, stddev).expect("Invalid standard deviation");
        for (_, vehicle) in &mut self.vehicles {
            let factor = distr.sample(&mut rand).clamp(0.75, 1.25);
            vehicle.scale_desired_speed(factor);
        }
    }

    /// Adds a traffic controller governing the given nodes.
    pub fn add_controller(&mut self, nodes: &[NodeId]) -> ControllerId {
        self.manager.add_controller(nodes)
    }

    /// Applies the given attributes to a controller.
    pub fn configure_controller(&mut self, id: ControllerId, attributes: &ControllerAttributes) {
        self.manager.configure_controller(id, attributes);
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// For stable vehicle behaviour, do not use a time step greater than around 0.2.
    pub fn step(&mut self, dt: f64) {
        self.manager.update_lights(dt, &mut self.graph, &self.vehicles);
        self.manager.update_vehicles(dt, &mut self.vehicles, &self.graph);
        self.integrate(dt);
        self.frame += 1;
        self.time += dt;

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Gets the elapsed simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Gets the number of vehicles in the simulation.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Returns an iterator over all the traffic controllers in the simulation.
    pub fn iter_controllers(&self) -> impl Iterator<Item = (ControllerId, &TrafficController)> {
        self.manager.iter_controllers()
    }

    /// Gets a reference to the controller with the given ID.
    pub fn get_controller(&self, id: ControllerId) -> Option<&TrafficController> {
        self.manager.get_controller(id)
    }

    /// Removes every vehicle, node and controller, and resets the clock.
    pub fn clear(&mut self) {
        self.vehicles.clear();
        self.graph.clear();
        self.manager.clear();
        self.frame = 0;
        self.time = 0.0;
    }

    /// Gets the debugging information for the previously simulated frame as a JSON array.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Integrates the headings and positions of all vehicles.
    fn integrate(&mut self, dt: f64) {
        let mut rng = rand::thread_rng();
        for (_, vehicle) in &mut self.vehicles {
            vehicle.integrate(dt, &self.graph, &mut rng);
        }
    }
}
