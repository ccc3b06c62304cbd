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

//! # Router
//!
//! The routing stack has three layers:
//!
//! - [`astar`]: a reusable weighted shortest-path search from a start node to
//!   a *predicate-defined* goal, parameterised by cost and heuristic
//!   functions. With a zero cost and a zero heuristic it degenerates to
//!   Dijkstra.
//! - [`Router`]: the base. It owns the device graph, the netlist, the
//!   placement and the per-node congestion state (predecessor sets, history
//!   counters, net-id sets), together with the routines for ripping up,
//!   committing and realising routes.
//! - [`GlobalRouter`]: the congestion-negotiating loop in the PathFinder
//!   fashion. Every iteration rips up all nets, routes them in a fixed
//!   order under a cost that blends wire delay with presence and history
//!   penalties, and stops as soon as no node is shared by more than one
//!   net. Register sinks are assigned a concrete switch box *during*
//!   routing, and register-chained nets are rewritten when a pipeline
//!   register is consumed.

pub(crate) mod astar;
pub(crate) mod base;
pub(crate) mod global;
pub(crate) mod types;

pub use base::Router;
pub use global::GlobalRouter;
pub use types::RouteError;
