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

//! The routing graph: a node arena plus a coordinate-indexed grid of tiles

use super::node::{Node, NodeKind, NodeSpec};
use super::switch::Switch;
use super::tile::Tile;
use super::types::{DeviceError, NodeId, SwitchIo, SwitchSide, UNREACHABLE_COST};

use std::collections::BTreeMap;

/// The device routing graph. All nodes are owned by the arena inside this
/// struct; tiles, routers and route tables refer to them by [`NodeId`]. The
/// grid is a map from `(x, y)` to [`Tile`], iterated in coordinate order so
/// that every traversal of the graph is deterministic.
///
/// The topology is built once (by hand or by the
/// [loader](crate::io::load_routing_graph)) and stays immutable while
/// routing.
#[derive(Debug, Clone, Default)]
pub struct RoutingGraph {
    nodes: Vec<Node>,
    grid: BTreeMap<(u32, u32), Tile>,
    switches: BTreeMap<u32, Switch>,
}

impl RoutingGraph {
    /// Creates an empty graph without any tiles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `width x height` grid where every tile instantiates the
    /// given switch template.
    pub fn with_grid(width: u32, height: u32, switch: &Switch) -> Result<Self, DeviceError> {
        let mut graph = Self::new();
        for x in 0..width {
            for y in 0..height {
                graph.add_tile(x, y, 1, switch)?;
            }
        }
        Ok(graph)
    }

    /// Adds a tile at `(x, y)` and instantiates the switch template into it:
    /// one boundary node per (side, direction, track), connected internally
    /// according to the template's wires.
    pub fn add_tile(
        &mut self,
        x: u32,
        y: u32,
        height: u32,
        switch: &Switch,
    ) -> Result<(), DeviceError> {
        self.switches.entry(switch.id).or_insert_with(|| switch.clone());

        let mut tile = Tile::new(x, y, height, switch.id, switch.num_track);
        for &side in SwitchSide::sides().iter() {
            for &io in SwitchIo::ios().iter() {
                for track in 0..switch.num_track {
                    let id = self.alloc_node(Node::new(
                        NodeKind::SwitchBox { side, io },
                        String::new(),
                        x,
                        y,
                        switch.width,
                        track,
                    ));
                    debug_assert_eq!(tile.sbs.len(), tile.sb_index(track, side, io));
                    tile.sbs.push(id);
                }
            }
        }

        // internal wiring: incoming boundary nodes feed outgoing ones
        for wire in switch.internal_wires() {
            let from = tile.sb(wire.track_from, wire.side_from, SwitchIo::In).ok_or(
                DeviceError::SwitchBoxNotFound {
                    x,
                    y,
                    track: wire.track_from,
                    side: wire.side_from,
                    io: SwitchIo::In,
                },
            )?;
            let to = tile.sb(wire.track_to, wire.side_to, SwitchIo::Out).ok_or(
                DeviceError::SwitchBoxNotFound {
                    x,
                    y,
                    track: wire.track_to,
                    side: wire.side_to,
                    io: SwitchIo::Out,
                },
            )?;
            let cost = self.nodes[to.index()].delay;
            self.nodes[from.index()].add_edge(to, cost);
        }

        self.grid.insert((x, y), tile);
        Ok(())
    }

    fn alloc_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    // look up the node described by the spec, creating ports and registers
    // on first use. Switch boxes must have been materialised by their tile.
    fn search_create_node(&mut self, spec: &NodeSpec) -> Result<NodeId, DeviceError> {
        let (x, y) = spec.coord();
        if !self.grid.contains_key(&(x, y)) {
            return Err(DeviceError::TileNotFound(x, y));
        }
        match spec {
            NodeSpec::SwitchBox { track, side, io, .. } => {
                let tile = &self.grid[&(x, y)];
                tile.sb(*track, *side, *io).ok_or(DeviceError::SwitchBoxNotFound {
                    x,
                    y,
                    track: *track,
                    side: *side,
                    io: *io,
                })
            }
            NodeSpec::Port { name, width, .. } => {
                if let Some(id) = self.grid[&(x, y)].ports.get(name) {
                    return Ok(*id);
                }
                let id = self.alloc_node(Node::new(
                    NodeKind::Port,
                    name.clone(),
                    x,
                    y,
                    *width,
                    0,
                ));
                self.grid.get_mut(&(x, y)).unwrap().ports.insert(name.clone(), id);
                Ok(id)
            }
            NodeSpec::Register { name, track, width, .. } => {
                if let Some(id) = self.grid[&(x, y)].registers.get(name) {
                    return Ok(*id);
                }
                let id = self.alloc_node(Node::new(
                    NodeKind::Register,
                    name.clone(),
                    x,
                    y,
                    *width,
                    *track,
                ));
                self.grid.get_mut(&(x, y)).unwrap().registers.insert(name.clone(), id);
                Ok(id)
            }
        }
    }

    /// Registers `to` as an out-neighbour of `from` with the default wire
    /// cost (the delay of `to`). Ports and registers are created on first
    /// use; an unknown tile or switch box is fatal, and so is a bit-width
    /// mismatch between the endpoints.
    pub fn add_edge(&mut self, from: &NodeSpec, to: &NodeSpec) -> Result<(), DeviceError> {
        let delay = None;
        self.add_edge_with_delay(from, to, delay)
    }

    /// Same as [`add_edge`](Self::add_edge), with an explicit wire delay.
    pub fn add_edge_with_delay(
        &mut self,
        from: &NodeSpec,
        to: &NodeSpec,
        wire_delay: Option<u32>,
    ) -> Result<(), DeviceError> {
        if from.width() != to.width() {
            return Err(DeviceError::WidthMismatch(from.width(), to.width()));
        }
        let from_id = self.search_create_node(from)?;
        let to_id = self.search_create_node(to)?;
        let cost = wire_delay.unwrap_or(self.nodes[to_id.index()].delay);
        self.nodes[from_id.index()].add_edge(to_id, cost);
        Ok(())
    }

    /// Resolves the port `(x, y, name)`. Missing entries are fatal.
    pub fn get_port(&self, x: u32, y: u32, name: &str) -> Result<NodeId, DeviceError> {
        let tile = self.grid.get(&(x, y)).ok_or(DeviceError::TileNotFound(x, y))?;
        tile.port(name).ok_or_else(|| DeviceError::PortNotFound { x, y, name: name.to_string() })
    }

    /// Resolves the switch box `(x, y, track, side, io)`. Missing entries
    /// are fatal.
    pub fn get_sb(
        &self,
        x: u32,
        y: u32,
        track: u32,
        side: SwitchSide,
        io: SwitchIo,
    ) -> Result<NodeId, DeviceError> {
        let tile = self.grid.get(&(x, y)).ok_or(DeviceError::TileNotFound(x, y))?;
        tile.sb(track, side, io)
            .ok_or(DeviceError::SwitchBoxNotFound { x, y, track, side, io })
    }

    /// Resolves the register `(x, y, name)`. Missing entries are fatal.
    pub fn get_register(&self, x: u32, y: u32, name: &str) -> Result<NodeId, DeviceError> {
        let tile = self.grid.get(&(x, y)).ok_or(DeviceError::TileNotFound(x, y))?;
        tile.register(name)
            .ok_or_else(|| DeviceError::RegisterNotFound { x, y, name: name.to_string() })
    }

    /// The node behind an id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Number of nodes in the arena. Ids are always below this value, which
    /// makes it the natural size for id-indexed side tables.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The cost of the edge `from -> to`, or [`UNREACHABLE_COST`] if absent.
    pub fn edge_cost(&self, from: NodeId, to: NodeId) -> u32 {
        self.nodes.get(from.index()).map(|n| n.edge_cost(to)).unwrap_or(UNREACHABLE_COST)
    }

    /// The tile at `(x, y)`, if it exists.
    pub fn tile(&self, x: u32, y: u32) -> Option<&Tile> {
        self.grid.get(&(x, y))
    }

    /// Iterates over the tiles in deterministic `(x, y)` order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.grid.values()
    }

    /// The coordinates of all tiles, in deterministic `(x, y)` order.
    pub fn tile_coords(&self) -> Vec<(u32, u32)> {
        self.grid.keys().copied().collect()
    }

    /// Iterates over the registered switch templates in id order.
    pub fn switches(&self) -> impl Iterator<Item = &Switch> {
        self.switches.values()
    }

    /// The switch template with the given id.
    pub fn switch(&self, id: u32) -> Result<&Switch, DeviceError> {
        self.switches.get(&id).ok_or(DeviceError::SwitchNotFound(id))
    }

    /// Wires every pair of adjacent tiles together: for each track, the
    /// outgoing boundary node of one tile drives the incoming node on the
    /// opposite side of its neighbour.
    pub fn connect_tiles(&mut self) -> Result<(), DeviceError> {
        let coords = self.tile_coords();
        for &(x, y) in coords.iter() {
            for &side in &[SwitchSide::Right, SwitchSide::Bottom] {
                let (nx, ny) = match side.neighbor(x, y) {
                    Some(c) => c,
                    None => continue,
                };
                if !self.grid.contains_key(&(nx, ny)) {
                    continue;
                }
                let num_track = self.grid[&(x, y)].num_tracks();
                for track in 0..num_track {
                    let here_out = self.get_sb(x, y, track, side, SwitchIo::Out)?;
                    let there_in = self.get_sb(nx, ny, track, side.opposite(), SwitchIo::In)?;
                    let there_out = self.get_sb(nx, ny, track, side.opposite(), SwitchIo::Out)?;
                    let here_in = self.get_sb(x, y, track, side, SwitchIo::In)?;
                    let cost_in = self.nodes[there_in.index()].delay;
                    self.nodes[here_out.index()].add_edge(there_in, cost_in);
                    let cost_back = self.nodes[here_in.index()].delay;
                    self.nodes[there_out.index()].add_edge(here_in, cost_back);
                }
            }
        }
        Ok(())
    }

    /// Creates (or finds) the port `name` in tile `(x, y)` and connects it
    /// to the switch box `(track, side, io)`, so that the port drives the
    /// routing fabric.
    pub fn connect_port_to_sb(
        &mut self,
        name: &str,
        x: u32,
        y: u32,
        track: u32,
        side: SwitchSide,
        io: SwitchIo,
    ) -> Result<(), DeviceError> {
        let width = self.switch_width(x, y)?;
        let port = NodeSpec::Port { name: name.to_string(), x, y, width };
        let sb = NodeSpec::SwitchBox { x, y, track, side, io, width };
        self.add_edge(&port, &sb)
    }

    /// Creates (or finds) the port `name` in tile `(x, y)` and connects the
    /// switch box `(track, side, io)` to it, so that the routing fabric
    /// drives the port.
    pub fn connect_sb_to_port(
        &mut self,
        name: &str,
        x: u32,
        y: u32,
        track: u32,
        side: SwitchSide,
        io: SwitchIo,
    ) -> Result<(), DeviceError> {
        let width = self.switch_width(x, y)?;
        let port = NodeSpec::Port { name: name.to_string(), x, y, width };
        let sb = NodeSpec::SwitchBox { x, y, track, side, io, width };
        self.add_edge(&sb, &port)
    }

    /// Creates the pipeline register `name` in tile `(x, y)` in parallel to
    /// the cross-tile wire leaving through `side` on the given track: the
    /// outgoing boundary node feeds the register, and the register's single
    /// out-neighbour is the incoming node of the adjacent tile.
    pub fn add_register(
        &mut self,
        name: &str,
        x: u32,
        y: u32,
        track: u32,
        side: SwitchSide,
    ) -> Result<(), DeviceError> {
        let (nx, ny) = side.neighbor(x, y).ok_or(DeviceError::TileNotFound(x, y))?;
        let width = self.switch_width(x, y)?;
        let reg = NodeSpec::Register { name: name.to_string(), x, y, track, width };
        let sb_out = NodeSpec::SwitchBox { x, y, track, side, io: SwitchIo::Out, width };
        let sb_in = NodeSpec::SwitchBox {
            x: nx,
            y: ny,
            track,
            side: side.opposite(),
            io: SwitchIo::In,
            width,
        };
        self.add_edge(&sb_out, &reg)?;
        self.add_edge(&reg, &sb_in)
    }

    fn switch_width(&self, x: u32, y: u32) -> Result<u32, DeviceError> {
        let tile = self.grid.get(&(x, y)).ok_or(DeviceError::TileNotFound(x, y))?;
        Ok(self.switch(tile.switch_id)?.width)
    }

    /// Checks that no port has both incoming and outgoing edges. A violation
    /// is a programming error in the device description.
    pub fn check_port_polarity(&self) -> Result<(), DeviceError> {
        let mut has_incoming = vec![false; self.nodes.len()];
        for node in self.nodes.iter() {
            for (to, _) in node.edges.iter() {
                has_incoming[to.index()] = true;
            }
        }
        for tile in self.tiles() {
            for (name, id) in tile.ports() {
                if has_incoming[id.index()] && self.node(id).degree() > 0 {
                    return Err(DeviceError::PortPolarity {
                        x: tile.x,
                        y: tile.y,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Manhattan distance between two coordinates.
pub(crate) fn manhattan_distance_coord(a: (u32, u32), b: (u32, u32)) -> u32 {
    let dx = if a.0 > b.0 { a.0 - b.0 } else { b.0 - a.0 };
    let dy = if a.1 > b.1 { a.1 - b.1 } else { b.1 - a.1 };
    dx + dy
}
