use crate::math::Point3d;
use crate::LightState;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Caller-assigned identifier of a [Node].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a node plays in the road network.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeType {
    /// An entry point where vehicles may be spawned.
    Start,
    /// Relocates arriving vehicles to a configured target node.
    Teleport,
    /// A fork where arriving vehicles pick a successor at random.
    Decision,
    /// An ordinary waypoint along a road.
    Arc,
}

/// An error arising from a road graph operation.
#[derive(Error, Clone, Copy, PartialEq, Eq, Debug)]
pub enum GraphError {
    /// A referenced node does not exist in the graph.
    #[error("no node with id {0}")]
    NodeNotFound(NodeId),
    /// A teleport target was assigned to a non-teleport node.
    #[error("node {0} is not a teleport node")]
    NotTeleport(NodeId),
    /// A node has no outgoing connections to travel along.
    #[error("node {0} has no outgoing connections")]
    DeadEnd(NodeId),
}

/// A point in the road network that vehicles travel between.
#[derive(Clone, Debug)]
pub struct Node {
    /// The caller-assigned ID of the node.
    id: NodeId,
    /// The position of the node.
    pos: Point3d,
    /// The role of the node.
    kind: NodeType,
    /// The IDs of the nodes reachable from this one.
    next: SmallVec<[NodeId; 4]>,
    /// The node vehicles are relocated to, for teleport nodes.
    teleport_target: Option<NodeId>,
    /// The light state imposed by a governing controller, if any.
    light: Option<LightState>,
    /// The earliest time another vehicle may be spawned here, in s.
    next_available: f64,
}

impl Node {
    /// Gets the ID of the node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Gets the position of the node.
    pub fn position(&self) -> Point3d {
        self.pos
    }

    /// Gets the role of the node.
    pub fn kind(&self) -> NodeType {
        self.kind
    }

    /// Gets the IDs of the nodes reachable from this one.
    pub fn next_nodes(&self) -> &[NodeId] {
        &self.next
    }

    /// Gets the node vehicles are relocated to, for teleport nodes.
    pub fn teleport_target(&self) -> Option<NodeId> {
        self.teleport_target
    }

    /// Gets the light state imposed on the node, if it is governed by a controller.
    pub fn light(&self) -> Option<LightState> {
        self.light
    }

    /// Sets the light state imposed on the node.
    pub(crate) fn set_light(&mut self, light: Option<LightState>) {
        self.light = light;
    }

    /// Gets the earliest time another vehicle may be spawned at the node, in s.
    pub fn next_available(&self) -> f64 {
        self.next_available
    }

    /// Sets the earliest time another vehicle may be spawned at the node, in s.
    pub fn set_next_available(&mut self, time: f64) {
        self.next_available = time;
    }
}

/// The network of nodes that vehicles navigate.
///
/// Nodes are kept in insertion order and looked up by their caller-assigned IDs,
/// which callers must keep unique.
#[derive(Clone, Debug, Default)]
pub struct RoadGraph {
    nodes: Vec<Node>,
}

impl RoadGraph {
    /// Creates an empty road graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the graph.
    pub fn add_node(&mut self, id: NodeId, pos: Point3d, kind: NodeType) {
        self.nodes.push(Node {
            id,
            pos,
            kind,
            next: SmallVec::new(),
            teleport_target: None,
            light: None,
            next_available: 0.0,
        });
    }

    /// Adds a directed connection from one node to another.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if !self.contains(to) {
            return Err(GraphError::NodeNotFound(to));
        }
        self.get_mut(from)?.next.push(to);
        Ok(())
    }

    /// Sets the node that vehicles arriving at a teleport node are relocated to.
    pub fn set_teleport_target(&mut self, node: NodeId, target: NodeId) -> Result<(), GraphError> {
        if !self.contains(target) {
            return Err(GraphError::NodeNotFound(target));
        }
        let node = self.get_mut(node)?;
        if node.kind != NodeType::Teleport {
            return Err(GraphError::NotTeleport(node.id));
        }
        node.teleport_target = Some(target);
        Ok(())
    }

    /// Gets a reference to the node with the given ID.
    pub fn get(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// Gets a mutable reference to the node with the given ID.
    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .iter_mut()
            .find(|node| node.id == id)
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// Returns `true` if a node with the given ID exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    /// Gets all the nodes in the graph, in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Removes all nodes from the graph.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
