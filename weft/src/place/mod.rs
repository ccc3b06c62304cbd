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

//! # Placement
//!
//! The placer runs in three phases:
//!
//! 1. **[Partitioning](partition)**: the packed netlist is turned into a
//!    block-adjacency digraph and split into disjoint clusters by a
//!    deterministic, modularity-maximising community detection. A
//!    post-partition [`ClusterGraph`](partition::ClusterGraph) can merge
//!    clusters to honour a size cap and break inter-cluster cycles.
//! 2. **[Global placement](GlobalPlacer)**: every cluster becomes a
//!    rectangle on the *reduced* board (non-CLB columns hidden). A
//!    continuous objective (star-model HPWL + overlap potential + legality
//!    splines + aspect force) is minimised by non-linear conjugate
//!    gradients, then refined by simulated annealing over discrete box
//!    moves, and finally legalised into concrete cells per cluster.
//! 3. **[Detailed placement](DetailedPlacer)**: within each cluster an
//!    adaptive simulated annealing swaps instances of the same block type
//!    to minimise exact bounding-box HPWL, optionally folding registers
//!    onto switch boxes. [`multi_place`] drives one detailed placer per
//!    cluster in parallel.
//!
//! All phases draw their randomness from explicit, seeded generators, so a
//! placement is reproducible given the same inputs and seed.

pub(crate) mod anneal;
pub(crate) mod detailed;
pub(crate) mod global;
pub(crate) mod layout;
pub(crate) mod multi;
pub mod partition;
pub(crate) mod spline;
pub(crate) mod types;
pub(crate) mod util;

pub use anneal::SimAnneal;
pub use detailed::DetailedPlacer;
pub use global::{ClusterBox, GlobalPlacer};
pub use layout::{Layer, Layout};
pub use multi::{detailed_placement, multi_place};
pub use partition::partition_netlist;
pub use types::PlaceError;
pub use util::{
    check_placement, compute_centroids, convert_clusters, filter_clusters, get_cluster_fixed_pos,
    place_io_blocks, reduce_cluster_graph,
};
