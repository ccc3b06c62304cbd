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

//! # Netlist Model
//!
//! Nets are ordered pin lists: the pin at index 0 is the *source*, all other
//! pins are sinks. A pin names a placed block and one of its ports; it also
//! carries the tile coordinate the block was placed on and, once known, the
//! resolved node in the device graph. Register sinks stay unresolved until
//! the global router chooses their location during negotiation.

use crate::device::NodeId;

/// A single pin of a [`Net`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    /// x coordinate of the tile the block is placed on
    pub x: u32,
    /// y coordinate of the tile the block is placed on
    pub y: u32,
    /// the block id, e.g. `p0` or `r12`
    pub name: String,
    /// the port name on that block, e.g. `out` or `reg`
    pub port: String,
    /// the resolved node in the routing graph; `None` until a register sink
    /// has been assigned a concrete location
    pub node: Option<NodeId>,
    /// index of this pin within its net
    pub id: u32,
}

impl Pin {
    /// Creates an unresolved pin.
    pub fn new(x: u32, y: u32, name: &str, port: &str) -> Self {
        Self { x, y, name: name.to_string(), port: port.to_string(), node: None, id: 0 }
    }
}

/// A net: an ordered list of pins, the first being the source.
#[derive(Debug, Clone, Default)]
pub struct Net {
    /// net id, the index into the router's netlist
    pub id: usize,
    /// net name from the packed netlist file
    pub name: String,
    /// fixed nets are never ripped up
    pub fixed: bool,
    pins: Vec<Pin>,
}

impl Net {
    /// Creates an empty net with the given id and name.
    pub fn new(id: usize, name: &str) -> Self {
        Self { id, name: name.to_string(), fixed: false, pins: Vec::new() }
    }

    /// Appends a pin; its `id` is set to its index.
    pub fn add_pin(&mut self, mut pin: Pin) {
        pin.id = self.pins.len() as u32;
        self.pins.push(pin);
    }

    /// Number of pins, the source included.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Returns true if the net has no pins yet.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// The pin at the given index; index 0 is the source.
    pub fn pin(&self, index: usize) -> &Pin {
        &self.pins[index]
    }

    /// Mutable access to the pin at the given index.
    pub fn pin_mut(&mut self, index: usize) -> &mut Pin {
        &mut self.pins[index]
    }

    /// The source pin.
    pub fn source(&self) -> &Pin {
        &self.pins[0]
    }

    /// Iterates over all pins in order.
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter()
    }

    /// Total fan-out of the net (number of sinks).
    pub fn fan_out(&self) -> usize {
        self.pins.len().saturating_sub(1)
    }
}
