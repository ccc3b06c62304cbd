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

use crate::device::{
    get_disjoint_sb_wires, get_imran_sb_wires, get_wilton_sb_wires, DeviceError, NodeKind,
    NodeSpec, RoutingGraph, Switch, SwitchIo, SwitchSide, UNREACHABLE_COST,
};
use std::collections::BTreeSet;

fn spec_sb(x: u32, y: u32, track: u32, side: SwitchSide, io: SwitchIo) -> NodeSpec {
    NodeSpec::SwitchBox { x, y, track, side, io, width: 1 }
}

#[test]
fn disjoint_wires() {
    // every outgoing track connects to the same-index track on the three
    // other sides: 3 * 4 * 3 wires
    let wires = get_disjoint_sb_wires(3);
    assert_eq!(wires.len(), 36);
    for wire in wires.iter() {
        assert_eq!(wire.track_from, wire.track_to);
        assert_ne!(wire.side_from, wire.side_to);
    }
}

#[test]
fn wilton_wires() {
    let num_track = 4;
    let wires = get_wilton_sb_wires(num_track);
    assert_eq!(wires.len(), 12 * num_track as usize);
    // the straight connections keep their track index
    for t in 0..num_track {
        assert!(wires.iter().any(|w| w.track_from == t
            && w.side_from == SwitchSide::Left
            && w.track_to == t
            && w.side_to == SwitchSide::Right));
        assert!(wires.iter().any(|w| w.track_from == t
            && w.side_from == SwitchSide::Bottom
            && w.track_to == t
            && w.side_to == SwitchSide::Top));
    }
    // the left-top turn permutes with (W - t) % W
    for t in 0..num_track {
        assert!(wires.iter().any(|w| w.track_from == t
            && w.side_from == SwitchSide::Left
            && w.side_to == SwitchSide::Top
            && w.track_to == (num_track - t) % num_track));
    }
}

#[test]
fn imran_wires() {
    let num_track = 3;
    let wires = get_imran_sb_wires(num_track);
    assert_eq!(wires.len(), 12 * num_track as usize);
    // left-top turns reverse the track order
    for t in 0..num_track {
        assert!(wires.iter().any(|w| w.track_from == t
            && w.side_from == SwitchSide::Left
            && w.side_to == SwitchSide::Top
            && w.track_to == num_track - 1 - t));
    }
    // every wire is paired with its reverse
    for w in wires.iter() {
        assert!(wires.iter().any(|v| v.track_from == w.track_to
            && v.side_from == w.side_to
            && v.track_to == w.track_from
            && v.side_to == w.side_from));
    }
}

#[test]
fn switch_instantiation() {
    let switch = Switch::disjoint(0, 1, 2);
    let graph = RoutingGraph::with_grid(1, 1, &switch).unwrap();
    let tile = graph.tile(0, 0).unwrap();
    assert_eq!(tile.num_tracks(), 2);
    // 4 sides x 2 ios x 2 tracks boundary nodes
    assert_eq!(graph.num_nodes(), 16);

    // the internal wires connect incoming to outgoing nodes
    let left_in = graph.get_sb(0, 0, 0, SwitchSide::Left, SwitchIo::In).unwrap();
    let right_out = graph.get_sb(0, 0, 0, SwitchSide::Right, SwitchIo::Out).unwrap();
    assert!(graph.node(left_in).neighbors().any(|n| n == right_out));
    // but never within the same side
    let left_out = graph.get_sb(0, 0, 0, SwitchSide::Left, SwitchIo::Out).unwrap();
    assert!(graph.node(left_in).neighbors().all(|n| n != left_out));
}

#[test]
fn graph_symmetry() {
    // a cross-tile edge exposes opposite sides on its two endpoints
    let switch = Switch::disjoint(0, 1, 2);
    let mut graph = RoutingGraph::with_grid(2, 2, &switch).unwrap();
    graph.connect_tiles().unwrap();

    for tile in graph.tiles() {
        for &side in SwitchSide::sides().iter() {
            for sb in tile.sbs_by_side(side) {
                let node = graph.node(sb);
                for neighbor in node.neighbors() {
                    let other = graph.node(neighbor);
                    if (other.x, other.y) == (node.x, node.y) {
                        continue;
                    }
                    let this_side = match node.kind {
                        NodeKind::SwitchBox { side, .. } => side,
                        _ => unreachable!(),
                    };
                    match other.kind {
                        NodeKind::SwitchBox { side, .. } => {
                            assert_eq!(side, this_side.opposite())
                        }
                        _ => panic!("cross-tile edge to a non switch box"),
                    }
                }
            }
        }
    }
}

#[test]
fn port_polarity() {
    let switch = Switch::disjoint(0, 1, 1);
    let mut graph = RoutingGraph::with_grid(1, 1, &switch).unwrap();
    graph
        .connect_port_to_sb("out", 0, 0, 0, SwitchSide::Right, SwitchIo::Out)
        .unwrap();
    graph
        .connect_sb_to_port("in", 0, 0, 0, SwitchSide::Left, SwitchIo::Out)
        .unwrap();
    assert!(graph.check_port_polarity().is_ok());

    // feeding the out port breaks the invariant
    graph
        .connect_sb_to_port("out", 0, 0, 0, SwitchSide::Left, SwitchIo::Out)
        .unwrap();
    assert_eq!(
        graph.check_port_polarity(),
        Err(DeviceError::PortPolarity { x: 0, y: 0, name: "out".to_string() })
    );
}

#[test]
fn edge_failures() {
    let switch = Switch::disjoint(0, 1, 1);
    let mut graph = RoutingGraph::with_grid(1, 1, &switch).unwrap();

    // unknown tile
    let far = spec_sb(4, 4, 0, SwitchSide::Left, SwitchIo::In);
    let near = spec_sb(0, 0, 0, SwitchSide::Right, SwitchIo::Out);
    assert_eq!(graph.add_edge(&near, &far), Err(DeviceError::TileNotFound(4, 4)));

    // width mismatch
    let wide = NodeSpec::Port { name: "data".to_string(), x: 0, y: 0, width: 16 };
    assert_eq!(graph.add_edge(&wide, &near), Err(DeviceError::WidthMismatch(16, 1)));

    // track out of range
    let missing = spec_sb(0, 0, 7, SwitchSide::Left, SwitchIo::In);
    assert!(matches!(
        graph.add_edge(&near, &missing),
        Err(DeviceError::SwitchBoxNotFound { track: 7, .. })
    ));

    // unknown port and register lookups are fatal as well
    assert!(graph.get_port(0, 0, "nope").is_err());
    assert!(graph.get_register(0, 0, "nope").is_err());
}

#[test]
fn edge_cost_default_and_sentinel() {
    let switch = Switch::disjoint(0, 1, 1);
    let mut graph = RoutingGraph::with_grid(1, 1, &switch).unwrap();
    graph
        .connect_port_to_sb("out", 0, 0, 0, SwitchSide::Right, SwitchIo::Out)
        .unwrap();
    let port = graph.get_port(0, 0, "out").unwrap();
    let sb = graph.get_sb(0, 0, 0, SwitchSide::Right, SwitchIo::Out).unwrap();
    // the default cost is the neighbour's delay
    assert_eq!(graph.edge_cost(port, sb), graph.node(sb).delay);
    // a missing edge yields the sentinel
    assert_eq!(graph.edge_cost(sb, port), UNREACHABLE_COST);
}

#[test]
fn tile_iteration_is_sorted() {
    let switch = Switch::disjoint(0, 1, 1);
    let mut graph = RoutingGraph::new();
    for &(x, y) in &[(1, 1), (0, 1), (1, 0), (0, 0)] {
        graph.add_tile(x, y, 1, &switch).unwrap();
    }
    let coords: Vec<(u32, u32)> = graph.tile_coords();
    let sorted: BTreeSet<(u32, u32)> = coords.iter().copied().collect();
    assert_eq!(coords, sorted.into_iter().collect::<Vec<_>>());
}

#[test]
fn register_parallels_cross_wire() {
    let switch = Switch::disjoint(0, 1, 1);
    let mut graph = RoutingGraph::with_grid(2, 1, &switch).unwrap();
    graph.connect_tiles().unwrap();
    graph.add_register("reg_a", 0, 0, 0, SwitchSide::Right).unwrap();

    let reg = graph.get_register(0, 0, "reg_a").unwrap();
    let sb_out = graph.get_sb(0, 0, 0, SwitchSide::Right, SwitchIo::Out).unwrap();
    let sb_in = graph.get_sb(1, 0, 0, SwitchSide::Left, SwitchIo::In).unwrap();

    // the outgoing node feeds the register, which drives the neighbour's
    // incoming node
    assert!(graph.node(sb_out).neighbors().any(|n| n == reg));
    assert_eq!(graph.node(reg).neighbors().collect::<Vec<_>>(), vec![sb_in]);
}
