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

//! A tile of the device grid

use super::types::{NodeId, SwitchIo, SwitchSide};
use std::collections::BTreeMap;
use std::fmt;

/// One tile of the grid. It owns the boundary switch-box nodes instantiated
/// from its [`Switch`](super::Switch) template (grouped by side and
/// direction), a name-keyed port map and a name-keyed register map.
///
/// Node names have to be unique within a tile, otherwise they cannot be
/// located through the grid.
#[derive(Debug, Clone)]
pub struct Tile {
    /// x coordinate
    pub x: u32,
    /// y coordinate
    pub y: u32,
    /// height of the tile in grid rows (memory tiles span several)
    pub height: u32,
    /// id of the switch template this tile instantiates
    pub switch_id: u32,
    pub(crate) num_track: u32,
    // flattened [side][io][track] -> node id
    pub(crate) sbs: Vec<NodeId>,
    pub(crate) ports: BTreeMap<String, NodeId>,
    pub(crate) registers: BTreeMap<String, NodeId>,
}

impl Tile {
    pub(crate) fn new(x: u32, y: u32, height: u32, switch_id: u32, num_track: u32) -> Self {
        Self {
            x,
            y,
            height,
            switch_id,
            num_track,
            sbs: Vec::new(),
            ports: BTreeMap::new(),
            registers: BTreeMap::new(),
        }
    }

    /// Number of parallel tracks per side.
    pub fn num_tracks(&self) -> u32 {
        self.num_track
    }

    pub(crate) fn sb_index(&self, track: u32, side: SwitchSide, io: SwitchIo) -> usize {
        ((side.value() * 2 + io.value()) * self.num_track + track) as usize
    }

    /// The switch-box node at `(track, side, io)`, if the track exists.
    pub fn sb(&self, track: u32, side: SwitchSide, io: SwitchIo) -> Option<NodeId> {
        if track >= self.num_track {
            return None;
        }
        self.sbs.get(self.sb_index(track, side, io)).copied()
    }

    /// All switch-box nodes on the given side, in (io, track) order.
    pub fn sbs_by_side(&self, side: SwitchSide) -> impl Iterator<Item = NodeId> + '_ {
        let start = self.sb_index(0, side, SwitchIo::In);
        let end = start + 2 * self.num_track as usize;
        self.sbs[start..end].iter().copied()
    }

    /// The port with the given name, if present.
    pub fn port(&self, name: &str) -> Option<NodeId> {
        self.ports.get(name).copied()
    }

    /// Iterates over (name, node) of all ports, in name order.
    pub fn ports(&self) -> impl Iterator<Item = (&String, NodeId)> {
        self.ports.iter().map(|(name, id)| (name, *id))
    }

    /// The register with the given name, if present.
    pub fn register(&self, name: &str) -> Option<NodeId> {
        self.registers.get(name).copied()
    }

    /// Iterates over (name, node) of all registers, in name order.
    pub fn registers(&self) -> impl Iterator<Item = (&String, NodeId)> {
        self.registers.iter().map(|(name, id)| (name, *id))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TILE ({}, {}, {}, {})", self.x, self.y, self.height, self.switch_id)
    }
}
