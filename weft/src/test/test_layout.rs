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

use crate::place::{Layer, Layout, PlaceError};

// a 6x6 board: an IO ring, a memory column at x = 3, PE everywhere else
pub(crate) fn small_board() -> Layout {
    let mut layout = Layout::new();
    let (width, height) = (6, 6);

    let mut io = Layer::new('i', width, height);
    let mut pe = Layer::new('p', width, height);
    let mut mem = Layer::new('m', width, height);
    for y in 0..height {
        for x in 0..width {
            let on_ring = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            if on_ring {
                io.mark_available(x, y);
            } else if x == 3 {
                mem.mark_available(x, y);
            } else {
                pe.mark_available(x, y);
            }
        }
    }
    layout.add_layer_with_priority(pe, 25, 25).unwrap();
    layout.add_layer_with_priority(mem, 22, 22).unwrap();
    layout.add_layer_with_priority(io, 15, 15).unwrap();
    layout
}

#[test]
fn priorities_pick_the_owner() {
    let layout = small_board();
    assert_eq!(layout.get_blk_type(0, 0), 'i');
    assert_eq!(layout.get_blk_type(1, 1), 'p');
    assert_eq!(layout.get_blk_type(3, 2), 'm');
    assert_eq!(layout.get_clb_type(), 'p');
    assert_eq!(layout.get_margin(), 1);
}

#[test]
fn blk_types_share_the_major() {
    let mut layout = small_board();
    // a 1-bit PE layer on top of the PE fabric, same major priority
    let mut pe1 = Layer::new('q', 6, 6);
    pe1.mark_available(1, 1);
    layout.add_layer_with_priority(pe1, 25, 20).unwrap();

    let types = layout.get_blk_types(1, 1);
    assert_eq!(types, vec!['p', 'q']);
    // the minor priority still picks the primary type
    assert_eq!(layout.get_blk_type(1, 1), 'p');
}

#[test]
fn available_pos_matches_masks() {
    let layout = small_board();
    let pos = layout.produce_available_pos();
    // 4x4 core minus the memory column
    assert_eq!(pos[&'p'].len(), 12);
    assert_eq!(pos[&'m'].len(), 4);
    assert_eq!(pos[&'i'].len(), 20);
    for &(x, y) in pos[&'m'].iter() {
        assert_eq!(x, 3);
        assert!(y >= 1 && y <= 4);
    }
    assert!(layout.is_legal("m0", 3, 2));
    assert!(!layout.is_legal("m0", 2, 2));
}

#[test]
fn duplicate_and_mismatched_layers() {
    let mut layout = small_board();
    assert_eq!(
        layout.add_layer(Layer::new('p', 6, 6)),
        Err(PlaceError::DuplicateLayer('p'))
    );
    assert_eq!(
        layout.add_layer(Layer::new('z', 4, 4)),
        Err(PlaceError::LayerSizeMismatch)
    );
}

#[test]
fn layout_repr_draws_the_board() {
    let layout = small_board();
    let repr = layout.layout_repr();
    let rows: Vec<&str> = repr.lines().collect();
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0], "iiiiii");
    assert_eq!(rows[2], "ippmpi");
}
