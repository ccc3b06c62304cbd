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

use crate::device::{RoutingGraph, Switch, SwitchIo, SwitchSide};
use crate::router::{GlobalRouter, RouteError};

// a square board in the style of the hardware generator output: every tile
// has an `out` port feeding all outgoing switch boxes and an `in` port fed
// from the left and right sides
fn build_board(size: u32, num_track: u32) -> RoutingGraph {
    let switch = Switch::disjoint(0, 1, num_track);
    let mut graph = RoutingGraph::with_grid(size, size, &switch).unwrap();
    for (x, y) in graph.tile_coords() {
        for track in 0..num_track {
            for &side in SwitchSide::sides().iter() {
                graph.connect_port_to_sb("out", x, y, track, side, SwitchIo::Out).unwrap();
            }
            for &io in SwitchIo::ios().iter() {
                graph.connect_sb_to_port("in", x, y, track, SwitchSide::Left, io).unwrap();
                graph.connect_sb_to_port("in", x, y, track, SwitchSide::Right, io).unwrap();
            }
        }
    }
    graph.connect_tiles().unwrap();
    graph
}

fn corner_placement(router: &mut GlobalRouter) {
    router.add_placement(0, 0, "p0");
    router.add_placement(0, 1, "p1");
    router.add_placement(1, 0, "p2");
    router.add_placement(1, 1, "p3");
}

#[test]
fn tiny_board_no_congestion() {
    let graph = build_board(2, 2);
    let mut router = GlobalRouter::new(20, graph);
    corner_placement(&mut router);
    router.add_net("n1", &[("p0", "out"), ("p3", "in")]).unwrap();
    router.add_net("n2", &[("p1", "out"), ("p0", "in")]).unwrap();
    router.add_net("n3", &[("p3", "out"), ("p2", "in")]).unwrap();

    router.route().unwrap();
    assert!(!router.overflow());

    let result = router.realize().unwrap();
    assert_eq!(result.len(), 3);
    for segments in result.values() {
        assert_eq!(segments.len(), 1);
    }
}

#[test]
fn route_validity_and_endpoints() {
    let graph = build_board(2, 2);
    let mut router = GlobalRouter::new(20, graph);
    corner_placement(&mut router);
    router.add_net("n1", &[("p0", "out"), ("p3", "in")]).unwrap();
    router.add_net("n2", &[("p1", "out"), ("p0", "in")]).unwrap();
    router.route().unwrap();

    let graph = router.router().graph();
    let result = router.realize().unwrap();
    for (name, segments) in result.iter() {
        for segment in segments.iter() {
            // every step follows an edge of the graph
            for pair in segment.windows(2) {
                assert!(
                    graph.node(pair[0]).neighbors().any(|n| n == pair[1]),
                    "{}: route takes a non-existing edge",
                    name
                );
            }
            // and the last node is the sink port
            let last = graph.node(*segment.last().unwrap());
            assert!(last.kind.is_port());
            assert_eq!(last.name, "in");
        }
    }
}

#[test]
fn presence_consistency_and_overflow_flag() {
    let graph = build_board(2, 2);
    let mut router = GlobalRouter::new(20, graph);
    corner_placement(&mut router);
    router.add_net("n1", &[("p0", "out"), ("p3", "in")]).unwrap();
    router.add_net("n2", &[("p1", "out"), ("p0", "in")]).unwrap();
    router.route().unwrap();

    let base = router.router();
    // rebuild the predecessor sets from the committed routes and compare
    let mut any_congested = false;
    let mut expected: std::collections::BTreeMap<_, std::collections::BTreeSet<_>> =
        std::collections::BTreeMap::new();
    for routes in base.current_routes.values() {
        for segment in routes.values() {
            for pair in segment.windows(2) {
                expected.entry(pair[1]).or_default().insert(pair[0]);
            }
        }
    }
    for (node, preds) in expected.iter() {
        assert_eq!(base.connections(*node), preds);
        if preds.len() > 1 {
            any_congested = true;
        }
    }
    assert_eq!(base.overflow(), any_congested);
}

#[test]
fn forced_contention_is_unroutable() {
    // one track, three nets that all have to cross from the left column to
    // the right one; two crossing wires can never carry them
    let switch = Switch::disjoint(0, 1, 1);
    let mut graph = RoutingGraph::with_grid(2, 2, &switch).unwrap();
    for (x, y) in graph.tile_coords() {
        for &side in SwitchSide::sides().iter() {
            graph.connect_port_to_sb("out", x, y, 0, side, SwitchIo::Out).unwrap();
            graph.connect_port_to_sb("out2", x, y, 0, side, SwitchIo::Out).unwrap();
        }
        for &io in SwitchIo::ios().iter() {
            for &side in &[SwitchSide::Left, SwitchSide::Right] {
                graph.connect_sb_to_port("in", x, y, 0, side, io).unwrap();
                graph.connect_sb_to_port("in2", x, y, 0, side, io).unwrap();
            }
        }
    }
    graph.connect_tiles().unwrap();

    let mut router = GlobalRouter::new(5, graph);
    corner_placement(&mut router);
    router.add_net("n1", &[("p0", "out"), ("p3", "in")]).unwrap();
    router.add_net("n2", &[("p1", "out"), ("p2", "in")]).unwrap();
    router.add_net("n3", &[("p0", "out2"), ("p3", "in2")]).unwrap();

    assert_eq!(router.route(), Err(RouteError::Congested(5)));
    assert!(router.overflow());
}

#[test]
fn register_chain() {
    let mut graph = build_board(2, 2);
    // pipeline registers on both tracks of the wire from the register tile
    // towards the sink
    graph.add_register("reg_a", 1, 0, 0, SwitchSide::Bottom).unwrap();
    graph.add_register("reg_b", 1, 0, 1, SwitchSide::Bottom).unwrap();

    let mut router = GlobalRouter::new(20, graph);
    router.add_placement(0, 0, "p0");
    router.add_placement(1, 0, "r0");
    router.add_placement(1, 1, "p1");
    router.add_net("n1", &[("p0", "out"), ("r0", "reg")]).unwrap();
    router.add_net("n2", &[("r0", "out"), ("p1", "in")]).unwrap();

    router.route().unwrap();

    let base = router.router();
    let graph = base.graph();
    let n1 = &base.netlist()[0];
    let n2 = &base.netlist()[1];

    // the chain shares one concrete register node
    let sink_node = n1.pin(1).node.unwrap();
    let src_node = n2.source().node.unwrap();
    assert_eq!(sink_node, src_node);
    assert!(graph.node(sink_node).kind.is_register());
    assert_eq!((graph.node(sink_node).x, graph.node(sink_node).y), (1, 0));

    // the fix-up extended the driver segment past the register
    let result = router.realize().unwrap();
    let n1_segment = &result["n1"][0];
    assert_eq!(*n1_segment.last().unwrap(), sink_node);
    // and the downstream net starts there
    let n2_segment = &result["n2"][0];
    assert_eq!(n2_segment[0], src_node);
    // ending at the sink port
    let last = graph.node(*n2_segment.last().unwrap());
    assert!(last.kind.is_port());
}

#[test]
fn clear_connections_is_idempotent() {
    let graph = build_board(2, 2);
    let mut router = GlobalRouter::new(20, graph);
    corner_placement(&mut router);
    router.add_net("n1", &[("p0", "out"), ("p3", "in")]).unwrap();
    router.route().unwrap();

    let mut base = router.router().clone();
    let history_before: Vec<u32> =
        (0..base.graph().num_nodes()).map(|i| base.get_history_cost(crate::device::NodeId(i as u32))).collect();

    base.clear_connections();
    let snapshot = base.clone();
    base.clear_connections();

    for i in 0..base.graph().num_nodes() {
        let id = crate::device::NodeId(i as u32);
        assert!(base.connections(id).is_empty());
        assert_eq!(base.connections(id), snapshot.connections(id));
        // history survives the rip-up
        assert_eq!(base.get_history_cost(id), history_before[i]);
    }
    assert!(base.current_routes.is_empty());
}

#[test]
fn routing_is_deterministic() {
    let run = || {
        let graph = build_board(3, 2);
        let mut router = GlobalRouter::new(20, graph);
        router.add_placement(0, 0, "p0");
        router.add_placement(2, 0, "p1");
        router.add_placement(0, 2, "p2");
        router.add_placement(2, 2, "p3");
        router.add_net("n1", &[("p0", "out"), ("p3", "in")]).unwrap();
        router.add_net("n2", &[("p1", "out"), ("p2", "in")]).unwrap();
        router.add_net("n3", &[("p2", "out"), ("p0", "in")]).unwrap();
        router.route().unwrap();
        router.realize().unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn astar_admissible_on_unit_grid() {
    // with the Manhattan heuristic the returned path is as short as the
    // plain Dijkstra one
    let graph = build_board(3, 1);
    let router = GlobalRouter::new(1, graph);
    let base = router.router();
    let graph = base.graph();

    let start = graph.get_port(0, 0, "out").unwrap();
    let end = graph.get_port(2, 2, "in").unwrap();

    let astar_path = base.route_a_star(start, end).unwrap();
    let dijkstra_path = base
        .route_a_star_until(start, |n| n == end, |_, _| 0.0, |_| 0.0)
        .unwrap();

    let cost = |path: &[crate::device::NodeId]| -> u32 {
        path.windows(2).map(|pair| graph.edge_cost(pair[0], pair[1])).sum()
    };
    assert_eq!(cost(&astar_path), cost(&dijkstra_path));
    assert_eq!(astar_path.first(), Some(&start));
    assert_eq!(astar_path.last(), Some(&end));
}

#[test]
fn route_to_tile_stops_at_coordinate() {
    let graph = build_board(3, 1);
    let router = GlobalRouter::new(1, graph);
    let base = router.router();
    let graph = base.graph();

    let start = graph.get_port(0, 0, "out").unwrap();
    let path = base.route_a_star_to_tile(start, (2, 1), |_, _| 0.0).unwrap();
    let last = graph.node(*path.last().unwrap());
    assert_eq!((last.x, last.y), (2, 1));
    // everything before the goal lies outside the target tile
    for &node in &path[..path.len() - 1] {
        let n = graph.node(node);
        assert_ne!((n.x, n.y), (2, 1));
    }
}

#[test]
fn missing_placement_is_fatal() {
    let graph = build_board(2, 1);
    let mut router = GlobalRouter::new(1, graph);
    router.add_placement(0, 0, "p0");
    assert_eq!(
        router.add_net("n1", &[("p0", "out"), ("p9", "in")]),
        Err(RouteError::MissingPlacement("p9".to_string()))
    );
}

#[test]
fn net_ordering_prefers_chains_and_fanout() {
    let mut graph = build_board(2, 2);
    graph.add_register("reg_a", 1, 0, 0, SwitchSide::Bottom).unwrap();
    graph.add_register("reg_b", 1, 0, 1, SwitchSide::Bottom).unwrap();

    let mut router = GlobalRouter::new(20, graph);
    router.add_placement(0, 0, "p0");
    router.add_placement(1, 0, "r0");
    router.add_placement(1, 1, "p1");
    router.add_placement(0, 1, "p2");
    // a high-fanout net without registers
    router.add_net("n0", &[("p2", "out"), ("p0", "in"), ("p1", "in")]).unwrap();
    // the register chain
    router.add_net("n1", &[("p0", "out"), ("r0", "reg")]).unwrap();
    router.add_net("n2", &[("r0", "out"), ("p1", "in")]).unwrap();

    let mut base = router.router().clone();
    base.group_reg_nets();
    let order = base.reorder_reg_nets();
    // the chained nets come first, driver before downstream
    assert_eq!(order, vec![1, 2, 0]);
}

#[test]
fn register_chain_with_small_budget() {
    let mut graph = build_board(2, 2);
    graph.add_register("reg_a", 1, 0, 0, SwitchSide::Bottom).unwrap();
    graph.add_register("reg_b", 1, 0, 1, SwitchSide::Bottom).unwrap();

    let mut router = GlobalRouter::new(3, graph);
    router.add_placement(0, 0, "p0");
    router.add_placement(1, 0, "r0");
    router.add_placement(1, 1, "p1");
    router.add_net("n1", &[("p0", "out"), ("r0", "reg")]).unwrap();
    router.add_net("n2", &[("r0", "out"), ("p1", "in")]).unwrap();
    assert!(router.route().is_ok());
}
