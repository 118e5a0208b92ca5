//! Tests of navigation through the road graph: node chains, dead ends,
//! teleports and decision nodes.

use traffic_core::math::Point3d;
use traffic_core::{NodeId, NodeType, Simulation, VehicleAttributes, VehicleKind};

fn car(desired_speed: f64) -> VehicleAttributes {
    VehicleAttributes {
        kind: VehicleKind::Car,
        length: 4.0,
        desired_speed,
    }
}

/// Test that a vehicle walks a chain of nodes, finishes at the dead end,
/// and freezes in place once finished.
#[test]
fn vehicles_follow_node_chains_to_the_dead_end() {
    let mut sim = Simulation::new();
    let graph = sim.graph_mut();
    graph.add_node(NodeId(1), Point3d::new(0.0, 0.0, 0.0), NodeType::Start);
    graph.add_node(NodeId(2), Point3d::new(30.0, 0.0, 0.0), NodeType::Arc);
    graph.add_node(NodeId(3), Point3d::new(60.0, 0.0, 0.0), NodeType::Arc);
    graph.add_node(NodeId(4), Point3d::new(90.0, 0.0, 0.0), NodeType::Arc);
    graph.connect(NodeId(1), NodeId(2)).unwrap();
    graph.connect(NodeId(2), NodeId(3)).unwrap();
    graph.connect(NodeId(3), NodeId(4)).unwrap();

    let veh = sim.add_vehicle(&car(10.0), NodeId(1)).unwrap();
    assert_eq!(sim.get_vehicle(veh).unwrap().target_node(), NodeId(2));

    let mut targets = Vec::new();
    for _ in 0..240 {
        sim.step(0.05);
        let target = sim.get_vehicle(veh).unwrap().target_node();
        if targets.last() != Some(&target) {
            targets.push(target);
        }
    }
    assert_eq!(targets, vec![NodeId(2), NodeId(3), NodeId(4)]);

    let vehicle = sim.get_vehicle(veh).unwrap();
    assert!(vehicle.is_finished());
    assert!(vehicle.position().x > 85.0);

    // A finished vehicle no longer moves.
    let frozen = vehicle.position();
    for _ in 0..20 {
        sim.step(0.05);
    }
    assert_eq!(sim.get_vehicle(veh).unwrap().position(), frozen);
}

/// Test that arriving at a teleport node relocates the vehicle to the
/// teleport target, from which it carries on driving.
#[test]
fn teleport_nodes_relocate_vehicles() {
    let mut sim = Simulation::new();
    let graph = sim.graph_mut();
    graph.add_node(NodeId(1), Point3d::new(0.0, 0.0, 0.0), NodeType::Start);
    graph.add_node(NodeId(2), Point3d::new(30.0, 0.0, 0.0), NodeType::Teleport);
    graph.add_node(NodeId(3), Point3d::new(200.0, 0.0, 0.0), NodeType::Arc);
    graph.add_node(NodeId(4), Point3d::new(260.0, 0.0, 0.0), NodeType::Arc);
    graph.connect(NodeId(1), NodeId(2)).unwrap();
    graph.connect(NodeId(3), NodeId(4)).unwrap();
    graph.set_teleport_target(NodeId(2), NodeId(3)).unwrap();

    let veh = sim.add_vehicle(&car(10.0), NodeId(1)).unwrap();

    let mut largest_jump: f64 = 0.0;
    let mut pos = sim.get_vehicle(veh).unwrap().position().x;
    for _ in 0..400 {
        sim.step(0.05);
        let next_pos = sim.get_vehicle(veh).unwrap().position().x;
        largest_jump = largest_jump.max(next_pos - pos);
        pos = next_pos;
    }

    // The road has a gap of 170 m that is never driven.
    assert!(largest_jump > 100.0, "largest jump was {}", largest_jump);
    let vehicle = sim.get_vehicle(veh).unwrap();
    assert_eq!(vehicle.target_node(), NodeId(4));
    assert!(vehicle.is_finished());
    assert!(vehicle.position().x > 250.0);
}

/// Test that decision nodes pick among their successors at random.
#[test]
fn decision_nodes_choose_among_successors() {
    let mut chose_left = false;
    let mut chose_right = false;

    for _ in 0..16 {
        let mut sim = Simulation::new();
        let graph = sim.graph_mut();
        graph.add_node(NodeId(1), Point3d::new(0.0, 0.0, 0.0), NodeType::Start);
        graph.add_node(NodeId(2), Point3d::new(20.0, 0.0, 0.0), NodeType::Decision);
        graph.add_node(NodeId(3), Point3d::new(60.0, 0.0, -30.0), NodeType::Arc);
        graph.add_node(NodeId(4), Point3d::new(60.0, 0.0, 30.0), NodeType::Arc);
        graph.connect(NodeId(1), NodeId(2)).unwrap();
        graph.connect(NodeId(2), NodeId(3)).unwrap();
        graph.connect(NodeId(2), NodeId(4)).unwrap();

        let veh = sim.add_vehicle(&car(10.0), NodeId(1)).unwrap();
        for _ in 0..100 {
            sim.step(0.05);
        }
        match sim.get_vehicle(veh).unwrap().target_node() {
            NodeId(3) => chose_left = true,
            NodeId(4) => chose_right = true,
            other => panic!("unexpected target {}", other),
        }
    }

    assert!(chose_left && chose_right, "every branch chose the same way");
}
