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

//! Reusable switch-box templates and the canonical wire generators

use super::types::SwitchSide;
use std::collections::BTreeSet;

/// One internal wire of a switch box template: it connects the *incoming*
/// node on `(track_from, side_from)` to the *outgoing* node on
/// `(track_to, side_to)`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct SwitchWire {
    /// source track index
    pub track_from: u32,
    /// source side
    pub side_from: SwitchSide,
    /// destination track index
    pub track_to: u32,
    /// destination side
    pub side_to: SwitchSide,
}

impl SwitchWire {
    /// Creates a wire from its four components.
    pub fn new(track_from: u32, side_from: SwitchSide, track_to: u32, side_to: SwitchSide) -> Self {
        Self { track_from, side_from, track_to, side_to }
    }
}

/// A switch box *template*: for a given bit width, id and track count it
/// carries the set of internal wires connecting its boundary nodes. A switch
/// may be instantiated into many tiles; at dump time templates are
/// deduplicated by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    /// template id, referenced by the tiles using this switch
    pub id: u32,
    /// bit width of every node of the switch
    pub width: u32,
    /// number of parallel tracks per side
    pub num_track: u32,
    wires: BTreeSet<SwitchWire>,
}

impl Switch {
    /// Number of sides of a switch box.
    pub const SIDES: u32 = 4;
    /// Number of directions (in/out) per side.
    pub const IOS: u32 = 2;

    /// Creates a template from an explicit wire set.
    pub fn new(id: u32, width: u32, num_track: u32, wires: BTreeSet<SwitchWire>) -> Self {
        Self { id, width, num_track, wires }
    }

    /// Creates a template with the [disjoint](get_disjoint_sb_wires) topology.
    pub fn disjoint(id: u32, width: u32, num_track: u32) -> Self {
        Self::new(id, width, num_track, get_disjoint_sb_wires(num_track))
    }

    /// Creates a template with the [Wilton](get_wilton_sb_wires) topology.
    pub fn wilton(id: u32, width: u32, num_track: u32) -> Self {
        Self::new(id, width, num_track, get_wilton_sb_wires(num_track))
    }

    /// Creates a template with the [Imran](get_imran_sb_wires) topology.
    pub fn imran(id: u32, width: u32, num_track: u32) -> Self {
        Self::new(id, width, num_track, get_imran_sb_wires(num_track))
    }

    /// The internal wires, in deterministic order.
    pub fn internal_wires(&self) -> impl Iterator<Item = &SwitchWire> {
        self.wires.iter()
    }

    /// Number of internal wires.
    pub fn num_wires(&self) -> usize {
        self.wires.len()
    }
}

/// The disjoint (planar) switch box: every track connects straight through,
/// i.e. track `t` on each side reaches track `t` on the three other sides.
/// This yields `4 * 3 * num_track` directed wires.
pub fn get_disjoint_sb_wires(num_track: u32) -> BTreeSet<SwitchWire> {
    let mut wires = BTreeSet::new();
    for track in 0..num_track {
        for &side_from in SwitchSide::sides().iter() {
            for &side_to in SwitchSide::sides().iter() {
                if side_from == side_to {
                    continue;
                }
                wires.insert(SwitchWire::new(track, side_from, track, side_to));
            }
        }
    }
    wires
}

/// The Wilton switch box. Straight connections keep their track; the four
/// turns permute tracks with the published mappings
/// (left-top `(W - t) % W`, top-right `(t + 1) % W`,
/// right-bottom `(2W - 2 - t) % W`, bottom-left `(t + 1) % W`),
/// so that long connections spread over all tracks of the fabric.
pub fn get_wilton_sb_wires(num_track: u32) -> BTreeSet<SwitchWire> {
    use SwitchSide::*;
    let w = num_track;
    let mut wires = BTreeSet::new();
    for t in 0..w {
        // straight through
        wires.insert(SwitchWire::new(t, Left, t, Right));
        wires.insert(SwitchWire::new(t, Right, t, Left));
        wires.insert(SwitchWire::new(t, Bottom, t, Top));
        wires.insert(SwitchWire::new(t, Top, t, Bottom));
        // left <-> top
        wires.insert(SwitchWire::new(t, Left, (w - t) % w, Top));
        wires.insert(SwitchWire::new((w - t) % w, Top, t, Left));
        // top <-> right
        wires.insert(SwitchWire::new(t, Top, (t + 1) % w, Right));
        wires.insert(SwitchWire::new((t + 1) % w, Right, t, Top));
        // right <-> bottom
        wires.insert(SwitchWire::new(t, Right, (2 * w - 2 - t) % w, Bottom));
        wires.insert(SwitchWire::new((2 * w - 2 - t) % w, Bottom, t, Right));
        // bottom <-> left
        wires.insert(SwitchWire::new(t, Bottom, (t + 1) % w, Left));
        wires.insert(SwitchWire::new((t + 1) % w, Left, t, Bottom));
    }
    wires
}

/// The Imran (universal) switch box: straight connections keep their track,
/// the turns use `(W - 1 - t)` on the left-top and bottom-right diagonals and
/// `(t + 1) % W` on the other two.
pub fn get_imran_sb_wires(num_track: u32) -> BTreeSet<SwitchWire> {
    use SwitchSide::*;
    let w = num_track;
    let mut wires = BTreeSet::new();
    for t in 0..w {
        // straight through
        wires.insert(SwitchWire::new(t, Left, t, Right));
        wires.insert(SwitchWire::new(t, Right, t, Left));
        wires.insert(SwitchWire::new(t, Bottom, t, Top));
        wires.insert(SwitchWire::new(t, Top, t, Bottom));
        // left <-> top
        wires.insert(SwitchWire::new(t, Left, w - 1 - t, Top));
        wires.insert(SwitchWire::new(w - 1 - t, Top, t, Left));
        // left <-> bottom
        wires.insert(SwitchWire::new(t, Left, (t + 1) % w, Bottom));
        wires.insert(SwitchWire::new((t + 1) % w, Bottom, t, Left));
        // top <-> right
        wires.insert(SwitchWire::new(t, Top, (t + 1) % w, Right));
        wires.insert(SwitchWire::new((t + 1) % w, Right, t, Top));
        // bottom <-> right
        wires.insert(SwitchWire::new(t, Bottom, w - 1 - t, Right));
        wires.insert(SwitchWire::new(w - 1 - t, Right, t, Bottom));
    }
    wires
}
