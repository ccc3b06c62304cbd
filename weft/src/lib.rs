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

#![deny(missing_docs)]

//! # Weft: Placement and Routing for Coarse-Grained Reconfigurable Arrays
//!
//! This is a library for mapping packed netlists onto a tiled CGRA fabric. It
//! assigns every logical block a tile (*placement*) and every net a concrete
//! sequence of switch-box and port nodes in the device graph (*routing*). The
//! produced placement and routing are consumed by downstream bitstream
//! generation.
//!
//! ## Structure
//!
//! This library is structured in the following way:
//!
//! - **[`Device`](device)**: The device model. A typed node arena owned by the
//!   [`RoutingGraph`](device::RoutingGraph), with switch-box side/direction
//!   semantics, reusable [`Switch`](device::Switch) templates, and a 2-D grid
//!   of [`Tile`](device::Tile)s. The graph is both the routing search space
//!   and the persistence format.
//!
//! - **[`Netlist`](netlist)**: Nets as ordered (source, sinks…) pin lists.
//!   Pins carry a block id, a tile coordinate, a port name, and the resolved
//!   graph node once known.
//!
//! - **[`Router`](router)**: A reusable A* core parameterised by cost and
//!   heuristic functions, the [`Router`](router::Router) base owning the
//!   per-node congestion and history state, and the congestion-negotiating
//!   [`GlobalRouter`](router::GlobalRouter) which iterates in the PathFinder
//!   fashion until no routing resource is shared by more than one net.
//!
//! - **[`Place`](place)**: The three-phase placer. A modularity-maximising
//!   [partitioner](place::partition) splits the netlist into clusters, the
//!   [`GlobalPlacer`](place::GlobalPlacer) assigns each cluster a rectangle
//!   on the reduced board using conjugate-gradient minimisation followed by
//!   simulated annealing, and one [`DetailedPlacer`](place::DetailedPlacer)
//!   per cluster anneals the individual blocks, driven in parallel by
//!   [`multi_place`](place::multi_place).
//!
//! - **[`Io`](io)**: Readers and writers for the on-disk text formats: the
//!   packed netlist, the placement file, the layout file, the routing-graph
//!   file and the routing result file.
//!
//! All random number generators are explicit and seeded (default seed 0), so
//! a run is a deterministic function of its inputs and the chosen seed.
//!
//! ## Usage
//!
//! ```
//! use weft::device::{RoutingGraph, Switch, SwitchIo, SwitchSide};
//! use weft::router::GlobalRouter;
//! use weft::Error;
//!
//! fn main() -> Result<(), Error> {
//!     // a 2x2 board with two routing tracks and a disjoint switch box
//!     let switch = Switch::disjoint(0, 1, 2);
//!     let mut graph = RoutingGraph::with_grid(2, 2, &switch)?;
//!     for (x, y) in graph.tile_coords() {
//!         for track in 0..2 {
//!             for side in SwitchSide::sides() {
//!                 graph.connect_port_to_sb("out", x, y, track, side, SwitchIo::Out)?;
//!             }
//!             for io in SwitchIo::ios() {
//!                 graph.connect_sb_to_port("in", x, y, track, SwitchSide::Left, io)?;
//!                 graph.connect_sb_to_port("in", x, y, track, SwitchSide::Right, io)?;
//!             }
//!         }
//!     }
//!     graph.connect_tiles()?;
//!
//!     let mut router = GlobalRouter::new(20, graph);
//!     router.add_placement(0, 0, "p0");
//!     router.add_placement(1, 1, "p3");
//!     router.add_net("n1", &[("p0", "out"), ("p3", "in")])?;
//!     router.route()?;
//!
//!     let result = router.realize()?;
//!     assert_eq!(result.len(), 1);
//!     Ok(())
//! }
//! ```

// test modules
mod test;

mod error;

pub mod device;
pub mod io;
pub mod netlist;
pub mod place;
pub mod router;

pub use error::Error;
