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

//! Module containing all error types

use crate::device::DeviceError;
use crate::io::IoError;
use crate::place::PlaceError;
use crate::router::RouteError;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Error propagated from the device model. Indicates a malformed device
    /// description, never a routable failure.
    #[error("Device Error: {0}")]
    DeviceError(#[from] DeviceError),
    /// Error propagated from the router
    #[error("Routing Error: {0}")]
    RouteError(#[from] RouteError),
    /// Error propagated from the placer
    #[error("Placement Error: {0}")]
    PlaceError(#[from] PlaceError),
    /// Error while reading or writing one of the on-disk formats
    #[error("IO Error: {0}")]
    IoError(#[from] IoError),
}
