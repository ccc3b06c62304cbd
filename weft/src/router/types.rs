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

//! Router error types

use crate::device::DeviceError;
use thiserror::Error;

/// Routing Errors
#[derive(Error, Debug, PartialEq)]
pub enum RouteError {
    /// Error propagated from the device model
    #[error("Device Error: {0}")]
    DeviceError(#[from] DeviceError),
    /// A net references a block that was never placed
    #[error("unable to find placement for {0}")]
    MissingPlacement(String),
    /// The A* search exhausted its open set without reaching the goal
    #[error("unable to route from {0}")]
    UnableToRoute(String),
    /// The iteration budget was used up with congestion still present
    #[error("unable to route: overflow remains after {0} iterations")]
    Congested(u32),
    /// No free register could be found in the tile mandated by the placer
    #[error("unable to find free register node in the tile specified by the placer")]
    NoFreeRegister,
    /// A state that the router must never reach; a programming error
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
}
