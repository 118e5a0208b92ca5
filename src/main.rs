use itertools::Itertools;
use traffic_core::math::Point3d;
use traffic_core::{
    Axis, ControllerAttributes, NodeId, NodeType, RoadGraph, Simulation, VehicleAttributes,
    VehicleKind,
};

/// The simulation time step, in s.
const TIME_STEP: f64 = 0.05; // s

/// How long each entry node waits between spawns, in s.
const SPAWN_INTERVAL: f64 = 2.5; // s

fn main() {
    env_logger::init();

    let mut sim = Simulation::new();
    let east_entry = build_road(sim.graph_mut(), 0, Axis::X);
    let south_entry = build_road(sim.graph_mut(), 10, Axis::Z);

    // The two approaches alternate: each shows red for exactly as long
    // as the other takes to run its green and yellow phases.
    let east_signal = sim.add_controller(&[NodeId(2)]);
    sim.configure_controller(
        east_signal,
        &ControllerAttributes {
            position: Point3d::new(-25.0, 0.0, 0.0),
            axis: Axis::X,
            green_time: 15.0,
            yellow_time: 3.0,
            red_time: 18.0,
            ..Default::default()
        },
    );
    let south_signal = sim.add_controller(&[NodeId(12)]);
    sim.configure_controller(
        south_signal,
        &ControllerAttributes {
            position: Point3d::new(0.0, 0.0, -25.0),
            rotation: std::f64::consts::FRAC_PI_2,
            axis: Axis::Z,
            start_red: 18.0,
            green_time: 15.0,
            yellow_time: 3.0,
            red_time: 18.0,
        },
    );

    println!("Simulating a signalised crossroad...");
    let entries = [east_entry, south_entry];
    let mut police_due = 30.0;
    let mut next_report = 1.0;

    while sim.time() < 120.0 {
        spawn_traffic(&mut sim, &entries, &mut police_due);
        sim.step(TIME_STEP);
        sim.remove_finished();
        if sim.time() >= next_report {
            report(&sim);
            next_report += 1.0;
        }
    }
}

/// Lays a one-way road as a chain of nodes along the given axis,
/// looping back on itself through a teleport. Returns the entry node.
fn build_road(graph: &mut RoadGraph, first_id: u32, axis: Axis) -> NodeId {
    const STATIONS: [f64; 6] = [-120.0, -70.0, -25.0, 25.0, 70.0, 120.0];

    let ids = STATIONS
        .iter()
        .enumerate()
        .map(|(i, &along)| {
            let id = NodeId(first_id + i as u32);
            let pos = match axis {
                Axis::X => Point3d::new(along, 0.0, 0.0),
                Axis::Z => Point3d::new(0.0, 0.0, along),
            };
            let kind = match i {
                0 => NodeType::Start,
                5 => NodeType::Teleport,
                _ => NodeType::Arc,
            };
            graph.add_node(id, pos, kind);
            id
        })
        .collect::<Vec<_>>();

    for (&from, &to) in ids.iter().tuple_windows() {
        graph.connect(from, to).expect("chain nodes exist");
    }
    graph
        .set_teleport_target(ids[5], ids[0])
        .expect("the road loops back to its entry");
    ids[0]
}

/// Spawns vehicles at each entry node whenever its spawn gate allows,
/// dispatching a police car on a fixed cadence.
fn spawn_traffic(sim: &mut Simulation, entries: &[NodeId], police_due: &mut f64) {
    let now = sim.time();
    for &entry in entries {
        let gate_open = sim
            .graph()
            .get(entry)
            .map(|node| node.next_available() <= now)
            .unwrap_or(false);
        if !gate_open {
            continue;
        }

        let attributes = if now >= *police_due {
            *police_due = now + 45.0;
            VehicleAttributes {
                kind: VehicleKind::Police,
                length: 5.0,
                desired_speed: 14.0,
            }
        } else if sim.vehicle_count() % 4 == 3 {
            VehicleAttributes {
                kind: VehicleKind::Bus,
                length: 8.0,
                desired_speed: 7.0,
            }
        } else {
            VehicleAttributes {
                kind: VehicleKind::Car,
                length: 4.2,
                desired_speed: 9.0,
            }
        };

        if sim.add_vehicle(&attributes, entry).is_ok() {
            if let Ok(node) = sim.graph_mut().get_mut(entry) {
                node.set_next_available(now + SPAWN_INTERVAL);
            }
        }
    }
}

/// Prints a one line summary of the simulation state.
fn report(sim: &Simulation) {
    let lights = sim
        .iter_controllers()
        .map(|(_, ctrl)| format!("{:?}", ctrl.state()))
        .join("/");
    let emergencies = sim
        .iter_vehicles()
        .filter(|vehicle| vehicle.is_emergency())
        .count();
    println!(
        "t={:6.1}s  vehicles={:3}  emergencies={}  lights={}",
        sim.time(),
        sim.vehicle_count(),
        emergencies,
        lights
    );
}
