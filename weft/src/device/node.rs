// Weft: Placement and Routing for Coarse-Grained Reconfigurable Arrays
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! The polymorphic routing node

use super::types::{NodeId, SwitchIo, SwitchSide, UNREACHABLE_COST};
use std::fmt;

/// Default intrinsic delay of a node.
pub(crate) const DEFAULT_DELAY: u32 = 1;

/// What a [`Node`] is. The three kinds differ only in attached data, so they
/// are a tagged variant rather than a trait hierarchy.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum NodeKind {
    /// A tile-boundary crossbar node, identified by its side and direction
    /// (together with the tile coordinate and the track index).
    SwitchBox {
        /// which side of the tile the node sits on
        side: SwitchSide,
        /// whether the node receives or drives signals
        io: SwitchIo,
    },
    /// A tile input or output pin, identified by its name. Whether a port is
    /// an input or an output is determined by its edges: a port must never
    /// have both incoming and outgoing edges.
    Port,
    /// A pipeline register folded into a switch box.
    Register,
}

impl NodeKind {
    /// Returns true if and only if the node is a switch box.
    pub fn is_switch_box(&self) -> bool {
        matches!(self, NodeKind::SwitchBox { .. })
    }

    /// Returns true if and only if the node is a port.
    pub fn is_port(&self) -> bool {
        matches!(self, NodeKind::Port)
    }

    /// Returns true if and only if the node is a register.
    pub fn is_register(&self) -> bool {
        matches!(self, NodeKind::Register)
    }
}

/// A node of the routing graph. Owned by the arena of the
/// [`RoutingGraph`](super::RoutingGraph); every external reference is a
/// [`NodeId`].
#[derive(Debug, Clone)]
pub struct Node {
    /// the type tag with the kind-specific data
    pub kind: NodeKind,
    /// port or register name; empty for switch boxes
    pub name: String,
    /// tile x coordinate
    pub x: u32,
    /// tile y coordinate
    pub y: u32,
    /// bit width of the wire
    pub width: u32,
    /// track index; 0 for ports
    pub track: u32,
    /// intrinsic delay, used by the slack computation
    pub delay: u32,
    // out-neighbours with the per-edge wire cost
    pub(crate) edges: Vec<(NodeId, u32)>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, name: String, x: u32, y: u32, width: u32, track: u32) -> Self {
        Self { kind, name, x, y, width, track, delay: DEFAULT_DELAY, edges: Vec::new() }
    }

    /// Iterates over the out-neighbours in insertion order.
    pub fn neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.iter().map(|(id, _)| *id)
    }

    /// Number of out-neighbours.
    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    /// The cost of the edge towards `to`, or [`UNREACHABLE_COST`] when `to`
    /// is not a neighbour.
    pub fn edge_cost(&self, to: NodeId) -> u32 {
        self.edges
            .iter()
            .find(|(id, _)| *id == to)
            .map(|(_, cost)| *cost)
            .unwrap_or(UNREACHABLE_COST)
    }

    // insert or update the edge towards `to`
    pub(crate) fn add_edge(&mut self, to: NodeId, cost: u32) {
        for edge in self.edges.iter_mut() {
            if edge.0 == to {
                edge.1 = cost;
                return;
            }
        }
        self.edges.push((to, cost));
    }
}

impl fmt::Display for Node {
    /// Formats the node as its on-disk descriptor, e.g.
    /// `SB (0, 1, 1, 2, 1, 1)` or `PORT in (0, 0, 1)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::SwitchBox { side, io } => write!(
                f,
                "SB ({}, {}, {}, {}, {}, {})",
                self.track,
                self.x,
                self.y,
                side.value(),
                io.value(),
                self.width
            ),
            NodeKind::Port => {
                write!(f, "PORT {} ({}, {}, {})", self.name, self.x, self.y, self.width)
            }
            NodeKind::Register => write!(
                f,
                "REG {} ({}, {}, {}, {})",
                self.name, self.track, self.x, self.y, self.width
            ),
        }
    }
}

/// A node identity used when constructing the graph. The graph looks the
/// node up in the tile at `(x, y)` and, for ports and registers, creates it
/// on first use. Switch boxes are materialised by the tile's switch template
/// and must already exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSpec {
    /// A switch box node `(x, y, track, side, io)` of the given width
    SwitchBox {
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// track index
        track: u32,
        /// tile side
        side: SwitchSide,
        /// direction
        io: SwitchIo,
        /// bit width
        width: u32,
    },
    /// A port node `(x, y, name)` of the given width
    Port {
        /// port name
        name: String,
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// bit width
        width: u32,
    },
    /// A register node `(x, y, name)` on the given track
    Register {
        /// register name
        name: String,
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// track index
        track: u32,
        /// bit width
        width: u32,
    },
}

impl NodeSpec {
    /// The tile coordinate the node belongs to.
    pub fn coord(&self) -> (u32, u32) {
        match self {
            NodeSpec::SwitchBox { x, y, .. } => (*x, *y),
            NodeSpec::Port { x, y, .. } => (*x, *y),
            NodeSpec::Register { x, y, .. } => (*x, *y),
        }
    }

    /// The bit width of the node.
    pub fn width(&self) -> u32 {
        match self {
            NodeSpec::SwitchBox { width, .. } => *width,
            NodeSpec::Port { width, .. } => *width,
            NodeSpec::Register { width, .. } => *width,
        }
    }
}
