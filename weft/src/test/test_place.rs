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

use super::test_layout::small_board;
use crate::place::spline::Spline;
use crate::place::{
    check_placement, place_io_blocks, DetailedPlacer, GlobalPlacer, Layer, Layout, SimAnneal,
};
use assert_approx_eq::assert_approx_eq;
use maplit::btreemap;
use std::collections::{BTreeMap, BTreeSet};

fn blocks(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// the positions of the inner 4x4 PE core of [`small_board`]
fn pe_cells() -> Vec<(i32, i32)> {
    let mut cells = Vec::new();
    for y in 1..5 {
        for x in 1..5 {
            if x != 3 {
                cells.push((x, y));
            }
        }
    }
    cells
}

#[test]
fn detailed_placer_places_every_block_once() {
    // a single cluster of 9 blocks on the small board is annealed flat
    let cluster = blocks(&["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8"]);
    let netlist = btreemap! {
        "n0".to_string() => blocks(&["p0", "p1", "p2"]),
        "n1".to_string() => blocks(&["p3", "p4"]),
        "n2".to_string() => blocks(&["p5", "p6", "p7", "p8"]),
        "n3".to_string() => blocks(&["p0", "p8"]),
    };
    let available_pos = btreemap! { 'p' => pe_cells() };
    let fixed_pos = BTreeMap::new();

    let mut placer =
        DetailedPlacer::new(&cluster, &netlist, &available_pos, &fixed_pos, false).unwrap();
    placer.anneal();
    let result = placer.realize();

    assert_eq!(result.len(), 9);
    let cells: BTreeSet<(i32, i32)> = pe_cells().into_iter().collect();
    let mut used = BTreeSet::new();
    for (_, pos) in result.iter() {
        assert!(cells.contains(pos));
        assert!(used.insert(*pos), "two blocks share {:?}", pos);
    }
}

#[test]
fn detailed_placer_is_deterministic() {
    let run = || {
        let cluster = blocks(&["p0", "p1", "p2", "p3", "p4"]);
        let netlist = btreemap! {
            "n0".to_string() => blocks(&["p0", "p1"]),
            "n1".to_string() => blocks(&["p2", "p3", "p4"]),
        };
        let available_pos = btreemap! { 'p' => pe_cells() };
        let mut placer =
            DetailedPlacer::new(&cluster, &netlist, &available_pos, &BTreeMap::new(), false)
                .unwrap();
        placer.set_seed(0);
        placer.anneal();
        placer.realize()
    };
    assert_eq!(run(), run());
}

#[test]
fn detailed_placer_refine_only_improves() {
    let cluster = blocks(&["p0", "p1", "p2", "p3", "p4", "p5"]);
    let netlist = btreemap! {
        "n0".to_string() => blocks(&["p0", "p5"]),
        "n1".to_string() => blocks(&["p1", "p4"]),
        "n2".to_string() => blocks(&["p2", "p3"]),
    };
    let available_pos = btreemap! { 'p' => pe_cells() };
    let mut placer =
        DetailedPlacer::new(&cluster, &netlist, &available_pos, &BTreeMap::new(), false).unwrap();
    let before = placer.hpwl();
    placer.refine(100, 0.001);
    assert!(placer.hpwl() <= before);
}

#[test]
fn detailed_placer_rejects_overfull_cluster() {
    let cluster = blocks(&["p0", "p1", "p2"]);
    let netlist = btreemap! { "n0".to_string() => blocks(&["p0", "p1", "p2"]) };
    let available_pos = btreemap! { 'p' => vec![(1, 1), (2, 1)] };
    assert!(DetailedPlacer::new(&cluster, &netlist, &available_pos, &BTreeMap::new(), false)
        .is_err());
}

#[test]
fn register_folding_keeps_registers_off_their_sinks() {
    // registers share the PE cells; a driving register must not share a
    // tile with any of its sinks
    let cluster = blocks(&["p0", "p1", "r0"]);
    let netlist = btreemap! {
        "n0".to_string() => blocks(&["p0", "r0"]),
        "n1".to_string() => blocks(&["r0", "p1"]),
    };
    let available_pos = btreemap! { 'p' => pe_cells(), 'r' => pe_cells() };
    let mut placer =
        DetailedPlacer::new(&cluster, &netlist, &available_pos, &BTreeMap::new(), true).unwrap();
    placer.anneal();
    let result = placer.realize();

    assert_ne!(result["r0"], result["p0"]);
    assert_ne!(result["r0"], result["p1"]);
}

// a 12x12 board for the analytical placer: IO ring, memory columns at
// x = 4 and x = 8, PE everywhere else
fn big_board() -> Layout {
    let mut layout = Layout::new();
    let (width, height) = (12, 12);
    let mut io = Layer::new('i', width, height);
    let mut pe = Layer::new('p', width, height);
    let mut mem = Layer::new('m', width, height);
    for y in 0..height {
        for x in 0..width {
            let on_ring = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            if on_ring {
                io.mark_available(x, y);
            } else if x == 4 || x == 8 {
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

fn two_cluster_input() -> (
    BTreeMap<String, BTreeSet<String>>,
    BTreeMap<String, Vec<String>>,
) {
    let cluster_a: BTreeSet<String> =
        blocks(&["p0", "p1", "p2", "p3", "p4", "p5", "m0"]).into_iter().collect();
    let cluster_b: BTreeSet<String> =
        blocks(&["p6", "p7", "p8", "p9", "p10", "m1"]).into_iter().collect();
    let clusters = btreemap! {
        "x0".to_string() => cluster_a,
        "x1".to_string() => cluster_b,
    };
    let netlist = btreemap! {
        "n0".to_string() => blocks(&["p0", "p1", "p2"]),
        "n1".to_string() => blocks(&["p3", "p4", "p5"]),
        "n2".to_string() => blocks(&["p0", "m0"]),
        "n3".to_string() => blocks(&["p6", "p7", "p8"]),
        "n4".to_string() => blocks(&["p9", "p10", "m1"]),
        "n5".to_string() => blocks(&["p0", "p6"]),
        "n6".to_string() => blocks(&["p5", "p9"]),
    };
    (clusters, netlist)
}

#[test]
fn global_placer_realizes_disjoint_cells() {
    let layout = big_board();
    let (clusters, netlist) = two_cluster_input();
    let mut gp = GlobalPlacer::new(clusters.clone(), netlist, BTreeMap::new(), &layout).unwrap();
    gp.set_seed(0);
    gp.solve();
    gp.anneal();
    let result = gp.realize().unwrap();

    assert_eq!(result.len(), 2);
    let mut all_pe_cells: BTreeSet<(i32, i32)> = BTreeSet::new();
    for (cluster_id, cells) in result.iter() {
        let pe = &cells[&'p'];
        // every cluster owns at least as many PE cells as it has PE blocks
        let num_pe =
            clusters[cluster_id].iter().filter(|b| b.starts_with('p')).count();
        assert!(pe.len() >= num_pe);
        for &(x, y) in pe.iter() {
            assert_eq!(layout.get_blk_type(x as u32, y as u32), 'p');
            assert!(all_pe_cells.insert((x, y)), "cell ({}, {}) claimed twice", x, y);
        }
        // a memory cell was reserved close by
        let mem = &cells[&'m'];
        assert!(!mem.is_empty());
        for &(x, y) in mem.iter() {
            assert_eq!(layout.get_blk_type(x as u32, y as u32), 'm');
        }
    }
}

#[test]
fn global_placer_is_deterministic() {
    let run = || {
        let layout = big_board();
        let (clusters, netlist) = two_cluster_input();
        let mut gp = GlobalPlacer::new(clusters, netlist, BTreeMap::new(), &layout).unwrap();
        gp.set_seed(0);
        gp.solve();
        gp.anneal();
        gp.realize().unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn io_blocks_go_onto_the_ring() {
    let layout = small_board();
    let netlist = btreemap! {
        "n0".to_string() => blocks(&["i0", "p0"]),
        "n1".to_string() => blocks(&["p0", "i1"]),
    };
    // there is no dedicated 'I' layer here, so expect a failure first
    assert!(place_io_blocks(&netlist, &layout, &BTreeMap::new()).is_err());

    let mut layout = layout;
    let mut io16 = Layer::new('I', 6, 6);
    io16.mark_available(0, 0);
    io16.mark_available(5, 0);
    layout.add_layer_with_priority(io16, 15, 14).unwrap();

    let fixed = place_io_blocks(&netlist, &layout, &BTreeMap::new()).unwrap();
    assert_eq!(fixed.len(), 2);
    assert_eq!(fixed["i0"], (0, 0));
    assert_eq!(fixed["i1"], (5, 0));
}

#[test]
fn spline_matches_its_samples() {
    // the legality spline has to reproduce the sampled costs exactly and
    // expose a finite derivative everywhere
    let xs = vec![0.0, 1.0, 2.0, 3.0, 4.0];
    let ys = vec![4.0, 2.0, 1.0, 0.0, 0.0];
    let spline = Spline::new(xs.clone(), ys.clone());
    for (x, y) in xs.iter().zip(ys.iter()) {
        assert_approx_eq!(spline.at(*x), *y, 1e-9);
    }
    // between the samples it stays smooth and decreasing at the front
    assert!(spline.at(0.5) < 4.0);
    assert!(spline.deriv(0.5) < 0.0);
    // outside the range it continues linearly
    let slope = spline.deriv(-1.0);
    assert_approx_eq!(spline.at(-1.0), spline.at(0.0) - slope, 1e-9);
}

#[test]
fn check_placement_catches_mistakes() {
    let layout = small_board();
    let raw_netlist = btreemap! {
        "n0".to_string() => vec![("p0".to_string(), "out".to_string()),
                                 ("p1".to_string(), "in".to_string())],
    };
    // a valid placement passes
    let good = btreemap! {
        "p0".to_string() => (1, 1),
        "p1".to_string() => (2, 1),
    };
    assert!(check_placement(&raw_netlist, &good, &layout).is_ok());

    // a missing block fails
    let missing = btreemap! { "p0".to_string() => (1, 1) };
    assert!(check_placement(&raw_netlist, &missing, &layout).is_err());

    // a doubly used position fails
    let doubled = btreemap! {
        "p0".to_string() => (1, 1),
        "p1".to_string() => (1, 1),
    };
    assert!(check_placement(&raw_netlist, &doubled, &layout).is_err());

    // an illegal position (the memory column) fails
    let illegal = btreemap! {
        "p0".to_string() => (3, 1),
        "p1".to_string() => (2, 1),
    };
    assert!(check_placement(&raw_netlist, &illegal, &layout).is_err());
}
