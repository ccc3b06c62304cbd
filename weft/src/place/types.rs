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

//! Placement error types

use thiserror::Error;

/// Placement Errors
#[derive(Error, Debug, PartialEq)]
pub enum PlaceError {
    /// A layer with the same block type was added twice
    #[error("layer {0} already exists")]
    DuplicateLayer(char),
    /// The layout has no layer for the given block type
    #[error("layer {0} not found")]
    UnknownLayer(char),
    /// Two layers of a layout have different sizes
    #[error("layer size doesn't match")]
    LayerSizeMismatch,
    /// The reduced board has ragged rows, i.e. the hidden columns are not
    /// the same in every row
    #[error("error in processing board layout")]
    RaggedReducedLayout,
    /// There are fewer cells of a block type than blocks to place on them
    #[error("not enough block pos for {blk_type}: got {available}, need {needed}")]
    NotEnoughSpace {
        /// block type
        blk_type: char,
        /// available cells
        available: usize,
        /// cells needed
        needed: usize,
    },
    /// De-overlapping could not find enough exterior CLB cells
    #[error("cannot find enough space de-overlapping")]
    DeOverlapFailed,
    /// A cluster claimed no cells at all during de-overlapping
    #[error("box completely empty during de-overlapping")]
    EmptyClusterBox,
    /// Special-block demand exceeds the board's supply
    #[error("not enough space for blk type {0}")]
    SpecialBlockOverflow(char),
    /// No legal position was found for a block
    #[error("cannot find pos for {0}")]
    NoPosition(String),
    /// A net references a block that is neither in the cluster nor fixed
    #[error("unknown block {0}")]
    UnknownBlock(String),
    /// A block of the design was never placed
    #[error("unable to find blk {0}")]
    MissingBlock(String),
    /// A position was used more than once, or a block sits on an illegal
    /// cell
    #[error("over use position {0} {1}")]
    OverusedPosition(i32, i32),
    /// Merging could not bring every cluster under the size cap
    #[error("unable to partition the graph that fits the max size {0}")]
    ClusterTooLarge(usize),
    /// The cluster graph contains a cycle where none is allowed
    #[error("cluster graph contains a loop")]
    ClusterLoop,
    /// A state the placer must never reach; a programming error
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
}
