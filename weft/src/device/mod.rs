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

//! # Device Model
//!
//! The device is a 2-D grid of [`Tile`]s. Every tile carries one switch box
//! (instantiated from a reusable [`Switch`] template), a set of named ports
//! and a set of named pipeline registers. All nodes live in a single arena
//! owned by the [`RoutingGraph`] and are referred to by a stable 32-bit
//! [`NodeId`]; tiles, route tables and search structures only ever hold ids.
//!
//! Side numbering of a switch box:
//!
//! ```text
//!       3
//!     -----
//!   2 |   | 0
//!     |   |
//!     -----
//!       1
//! ```
//!
//! A switch-box node is uniquely identified by `(x, y, track, side, io)`.
//! When a cross-tile edge connects two switch boxes, the two endpoints face
//! each other through opposite sides (`(side + 2) % 4`).

pub(crate) mod graph;
pub(crate) mod node;
pub(crate) mod switch;
pub(crate) mod tile;
pub(crate) mod types;

pub use graph::RoutingGraph;
pub use node::{Node, NodeKind, NodeSpec};
pub use switch::{
    get_disjoint_sb_wires, get_imran_sb_wires, get_wilton_sb_wires, Switch, SwitchWire,
};
pub use tile::Tile;
pub use types::{DeviceError, NodeId, SwitchIo, SwitchSide, UNREACHABLE_COST};
