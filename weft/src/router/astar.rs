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

//! # A* search core
//!
//! A weighted shortest-path search over the routing graph from a start node
//! to the first node satisfying a goal predicate. The relaxation is
//!
//! ```text
//! tentative = g[u] + edge_cost(u, v) + cost(u, v)
//! ```
//!
//! where `cost` is the caller-supplied extra cost (the global router plugs
//! the congestion-negotiated cost in here) and the heuristic must be an
//! under-estimate of the remaining cost to *any* goal node. Ties in `f` are
//! broken by insertion order, so the search is deterministic.
//!
//! The search holds only its own open set, score tables and back-pointers;
//! it neither reads nor writes any congestion state.

use crate::device::{NodeId, RoutingGraph};
use crate::router::types::RouteError;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

// an open-set entry; the ordering is inverted so that the std max-heap pops
// the entry with the lowest f score, and the insertion sequence number makes
// ties deterministic
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    seq: u64,
    node: NodeId,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // scores are always finite, so the partial order is total here
        other
            .f
            .partial_cmp(&self.f)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Runs the search and returns the node sequence from `start` to the first
/// node satisfying `end_f`, both endpoints included, or fails with
/// [`RouteError::UnableToRoute`] once the open set runs dry.
pub(crate) fn route_a_star<E, C, H>(
    graph: &RoutingGraph,
    start: NodeId,
    mut end_f: E,
    mut cost_f: C,
    mut h_f: H,
) -> Result<Vec<NodeId>, RouteError>
where
    E: FnMut(NodeId) -> bool,
    C: FnMut(NodeId, NodeId) -> f64,
    H: FnMut(NodeId) -> f64,
{
    let num_nodes = graph.num_nodes();
    let mut visited = vec![false; num_nodes];
    let mut in_open = vec![false; num_nodes];
    let mut g_score = vec![f64::INFINITY; num_nodes];
    let mut trace: Vec<Option<NodeId>> = vec![None; num_nodes];

    let mut working_set = BinaryHeap::new();
    let mut seq: u64 = 0;

    g_score[start.index()] = 0.0;
    in_open[start.index()] = true;
    working_set.push(OpenEntry { f: h_f(start), seq, node: start });

    let mut goal = None;
    while let Some(OpenEntry { node: head, .. }) = working_set.pop() {
        if visited[head.index()] {
            continue;
        }
        if end_f(head) {
            goal = Some(head);
            break;
        }
        visited[head.index()] = true;
        in_open[head.index()] = false;

        for node in graph.node(head).neighbors() {
            if visited[node.index()] {
                continue;
            }

            let tentative = g_score[head.index()]
                + graph.edge_cost(head, node) as f64
                + cost_f(head, node);
            if in_open[node.index()] && tentative >= g_score[node.index()] {
                continue;
            }
            g_score[node.index()] = tentative;
            trace[node.index()] = Some(head);
            seq += 1;
            // a stale duplicate may stay behind in the heap; the visited
            // check skips it when it surfaces
            working_set.push(OpenEntry { f: tentative + h_f(node), seq, node });
            in_open[node.index()] = true;
        }
    }

    let goal = match goal {
        Some(node) => node,
        None => return Err(RouteError::UnableToRoute(graph.node(start).to_string())),
    };

    // back trace the route
    let mut routed_path = vec![goal];
    let mut head = goal;
    while head != start {
        head = trace[head.index()].expect("trace must lead back to the start node");
        routed_path.push(head);
    }
    routed_path.reverse();
    Ok(routed_path)
}
