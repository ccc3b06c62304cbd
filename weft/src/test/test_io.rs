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
use crate::device::{RoutingGraph, Switch, SwitchIo, SwitchSide};
use crate::io::{
    dump_layout, dump_routing_graph, dump_routing_result, get_tokens, load_layout, load_netlist,
    load_placement, load_routing_graph, save_placement, setup_router_input,
};
use crate::router::GlobalRouter;

use maplit::btreemap;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

fn temp_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("weft_io_tests");
    fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[test]
fn tokenizer_strips_the_delimiters() {
    let tokens = get_tokens("e0: (p0, out),\t(p1, in)");
    assert_eq!(tokens, vec!["e0", "p0", "out", "p1", "in"]);
}

#[test]
fn netlist_roundtrip() {
    let path = temp_file("netlist.packed");
    fs::write(
        &path,
        "# a packed netlist\n\
         Netlists:\n\
         e0: (p0, out), (p1, in)\n\
         e1: (p1, out), (r2, reg), (p0, in)\n\
         \n\
         Netlist Bus:\n\
         e0: 1\n\
         e1: 16\n",
    )
    .unwrap();

    let (netlist, bus) = load_netlist(&path).unwrap();
    assert_eq!(netlist.len(), 2);
    assert_eq!(
        netlist["e1"],
        vec![
            ("p1".to_string(), "out".to_string()),
            ("r2".to_string(), "reg".to_string()),
            ("p0".to_string(), "in".to_string())
        ]
    );
    assert_eq!(bus[&"e0".to_string()], 1);
    assert_eq!(bus[&"e1".to_string()], 16);
}

#[test]
fn netlist_sections_must_agree() {
    let path = temp_file("netlist_bad.packed");
    fs::write(&path, "Netlists:\ne0: (p0, out), (p1, in)\n\nNetlist Bus:\n").unwrap();
    assert!(load_netlist(&path).is_err());
}

#[test]
fn missing_file_is_fatal() {
    assert!(load_netlist(&temp_file("does_not_exist.packed")).is_err());
    assert!(load_placement(&temp_file("does_not_exist.place")).is_err());
    assert!(load_layout(&temp_file("does_not_exist.layout")).is_err());
    assert!(load_routing_graph(&temp_file("does_not_exist.graph")).is_err());
}

#[test]
fn placement_roundtrip() {
    let path = temp_file("result.place");
    let placement = btreemap! {
        "p0".to_string() => (1, 2),
        "r1".to_string() => (3, 4),
    };
    save_placement(&placement, &BTreeMap::new(), &path).unwrap();
    let loaded = load_placement(&path).unwrap();
    assert_eq!(loaded, placement);
}

#[test]
fn layout_roundtrip_is_stable() {
    let layout = small_board();
    let path_a = temp_file("board_a.layout");
    let path_b = temp_file("board_b.layout");

    dump_layout(&layout, &path_a).unwrap();
    let loaded = load_layout(&path_a).unwrap();
    dump_layout(&loaded, &path_b).unwrap();

    let a = fs::read_to_string(&path_a).unwrap();
    let b = fs::read_to_string(&path_b).unwrap();
    assert_eq!(a, b);
    assert_eq!(loaded.get_clb_type(), layout.get_clb_type());
    assert_eq!(loaded.get_priority_major('p'), 25);
}

// a small fabric whose edges all survive the dump: ports hang off the
// outgoing switch boxes only
fn dumpable_board() -> RoutingGraph {
    let switch = Switch::disjoint(0, 1, 2);
    let mut graph = RoutingGraph::with_grid(2, 2, &switch).unwrap();
    for (x, y) in graph.tile_coords() {
        for track in 0..2 {
            for &side in SwitchSide::sides().iter() {
                graph.connect_port_to_sb("out", x, y, track, side, SwitchIo::Out).unwrap();
            }
            graph
                .connect_sb_to_port("in", x, y, track, SwitchSide::Left, SwitchIo::Out)
                .unwrap();
            graph
                .connect_sb_to_port("in", x, y, track, SwitchSide::Right, SwitchIo::Out)
                .unwrap();
        }
    }
    graph.connect_tiles().unwrap();
    graph.add_register("reg_a", 0, 0, 0, SwitchSide::Right).unwrap();
    graph
}

#[test]
fn routing_graph_roundtrip_is_byte_identical() {
    let graph = dumpable_board();
    let path_a = temp_file("fabric_a.graph");
    let path_b = temp_file("fabric_b.graph");

    dump_routing_graph(&graph, &path_a).unwrap();
    let loaded = load_routing_graph(&path_a).unwrap();
    dump_routing_graph(&loaded, &path_b).unwrap();

    let a = fs::read_to_string(&path_a).unwrap();
    let b = fs::read_to_string(&path_b).unwrap();
    assert_eq!(a, b);

    // the reloaded device carries the same structure
    assert_eq!(loaded.num_nodes(), graph.num_nodes());
    assert!(loaded.get_register(0, 0, "reg_a").is_ok());
    assert_eq!(loaded.switch(0).unwrap().num_wires(), graph.switch(0).unwrap().num_wires());
}

#[test]
fn routed_result_lists_every_net() {
    let graph = dumpable_board();
    let packed = temp_file("routed.packed");
    let place = temp_file("routed.place");
    let result = temp_file("routed.route");
    fs::write(
        &packed,
        "Netlists:\n\
         e0: (p0, out), (p3, in)\n\
         e1: (p1, out), (p0, in)\n\
         \n\
         Netlist Bus:\n\
         e0: 1\n\
         e1: 1\n",
    )
    .unwrap();
    fs::write(
        &place,
        "Block Name\tX\tY\t#Block ID\n\
         ---------------------------\n\
         p0\t0\t0\t#p0\n\
         p1\t0\t1\t#p1\n\
         p3\t1\t1\t#p3\n",
    )
    .unwrap();

    let mut router = GlobalRouter::new(20, graph);
    setup_router_input(&mut router, &packed, &place, 1).unwrap();
    router.route().unwrap();
    dump_routing_result(router.router(), &result).unwrap();

    let text = fs::read_to_string(&result).unwrap();
    assert!(text.contains("Net ID: e0 Segment Size: 1"));
    assert!(text.contains("Net ID: e1 Segment Size: 1"));
    assert!(text.contains("Segment: 0 Size:"));
    // the node descriptors use the on-disk grammar
    assert!(text.contains("PORT in ("));
}
