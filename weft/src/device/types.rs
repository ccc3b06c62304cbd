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

//! Type definitions shared by the device model

use thiserror::Error;

/// Stable index of a node in the [`RoutingGraph`](super::RoutingGraph) arena.
/// Ids are assigned in creation order and are never reused; they stay valid
/// for the lifetime of the graph.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the id as a `usize`, for indexing side tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Edge cost returned for a neighbour that does not exist.
pub const UNREACHABLE_COST: u32 = 0x00FF_FFFF;

/// The four sides of a switch box.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum SwitchSide {
    /// x + 1 direction
    Right = 0,
    /// y + 1 direction
    Bottom = 1,
    /// x - 1 direction
    Left = 2,
    /// y - 1 direction
    Top = 3,
}

impl SwitchSide {
    /// All four sides, in their numeric order.
    pub fn sides() -> [SwitchSide; 4] {
        [SwitchSide::Right, SwitchSide::Bottom, SwitchSide::Left, SwitchSide::Top]
    }

    /// The side facing this one across a tile boundary: `(side + 2) % 4`.
    pub fn opposite(self) -> SwitchSide {
        match self {
            SwitchSide::Right => SwitchSide::Left,
            SwitchSide::Bottom => SwitchSide::Top,
            SwitchSide::Left => SwitchSide::Right,
            SwitchSide::Top => SwitchSide::Bottom,
        }
    }

    /// The numeric value used in the on-disk formats.
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Parses the numeric value used in the on-disk formats.
    pub fn from_value(value: u32) -> Result<SwitchSide, DeviceError> {
        match value {
            0 => Ok(SwitchSide::Right),
            1 => Ok(SwitchSide::Bottom),
            2 => Ok(SwitchSide::Left),
            3 => Ok(SwitchSide::Top),
            v => Err(DeviceError::InvalidSide(v)),
        }
    }

    /// The coordinate of the tile adjacent to `(x, y)` through this side, or
    /// `None` when it would leave the first quadrant.
    pub fn neighbor(self, x: u32, y: u32) -> Option<(u32, u32)> {
        match self {
            SwitchSide::Right => Some((x + 1, y)),
            SwitchSide::Bottom => Some((x, y + 1)),
            SwitchSide::Left => x.checked_sub(1).map(|x| (x, y)),
            SwitchSide::Top => y.checked_sub(1).map(|y| (x, y)),
        }
    }
}

/// Direction of a switch-box node relative to its tile.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum SwitchIo {
    /// The node receives signals entering the tile.
    In = 0,
    /// The node drives signals leaving the tile.
    Out = 1,
}

impl SwitchIo {
    /// Both directions, in their numeric order.
    pub fn ios() -> [SwitchIo; 2] {
        [SwitchIo::In, SwitchIo::Out]
    }

    /// The numeric value used in the on-disk formats.
    pub fn value(self) -> u32 {
        self as u32
    }

    /// Parses the numeric value used in the on-disk formats.
    pub fn from_value(value: u32) -> Result<SwitchIo, DeviceError> {
        match value {
            0 => Ok(SwitchIo::In),
            1 => Ok(SwitchIo::Out),
            v => Err(DeviceError::InvalidIo(v)),
        }
    }
}

/// Device Errors
///
/// All of these indicate a malformed device description. They are fatal to
/// the caller; the router never retries on them.
#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
    /// The tile at the given coordinate does not exist
    #[error("unable to find tile at ({0}, {1})")]
    TileNotFound(u32, u32),
    /// The tile has no port with the given name
    #[error("unable to find port {name} at ({x}, {y})")]
    PortNotFound {
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// port name
        name: String,
    },
    /// The tile has no register with the given name
    #[error("unable to find register {name} at ({x}, {y})")]
    RegisterNotFound {
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// register name
        name: String,
    },
    /// The tile has no switch box node with the given identity
    #[error("tile ({x}, {y}) does not have a switchbox (track {track}, side {side:?}, {io:?})")]
    SwitchBoxNotFound {
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// track index
        track: u32,
        /// switch box side
        side: SwitchSide,
        /// switch box direction
        io: SwitchIo,
    },
    /// The two endpoints of an edge have different bit widths
    #[error("edge width mismatch: {0} does not equal to {1}")]
    WidthMismatch(u32, u32),
    /// No switch template with the given id has been registered
    #[error("unable to find switch with id {0}")]
    SwitchNotFound(u32),
    /// A port with both incoming and outgoing edges. Ports model either a
    /// tile input or a tile output, never both.
    #[error("port {name} at ({x}, {y}) has both incoming and outgoing edges")]
    PortPolarity {
        /// tile x coordinate
        x: u32,
        /// tile y coordinate
        y: u32,
        /// port name
        name: String,
    },
    /// A side value outside 0..4
    #[error("invalid switch box side {0}")]
    InvalidSide(u32),
    /// An io value outside 0..2
    #[error("invalid switch box io {0}")]
    InvalidIo(u32),
}
