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

//! # Router Base
//!
//! The [`Router`] owns the immutable device graph together with all mutable
//! routing state: the netlist, the placement, the current route table and
//! the per-node congestion bookkeeping (predecessor sets, history counters,
//! net-id sets). It also carries the A* entry points used by the global
//! router.
//!
//! Every routed segment contributes to two per-node quantities: *presence*
//! (the current predecessor-set cardinality) and *history* (a monotonically
//! accumulated usage count). [`clear_connections`](Router::clear_connections)
//! resets the former at the start of every negotiation iteration; the
//! history survives across iterations.

use crate::device::{graph, NodeId, RoutingGraph};
use crate::netlist::{Net, Pin};
use crate::router::astar;
use crate::router::types::RouteError;

use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

/// The port name marking register sinks in the packed netlist.
pub(crate) const REG_PORT: &str = "reg";
/// The block-name prefix of register blocks.
pub(crate) const REG_PREFIX: char = 'r';

/// The router base: device graph, netlist, placement and congestion state.
#[derive(Debug, Clone)]
pub struct Router {
    pub(crate) graph: RoutingGraph,
    pub(crate) netlist: Vec<Net>,
    pub(crate) placement: BTreeMap<String, (u32, u32)>,
    // chain driver net id -> the squashed chain in routing order
    pub(crate) reg_net_order: BTreeMap<usize, Vec<usize>>,
    // register block name -> the net this register drives
    pub(crate) reg_net_src: BTreeMap<String, usize>,
    // net id -> sink node -> routed segment
    pub(crate) current_routes: BTreeMap<usize, BTreeMap<NodeId, Vec<NodeId>>>,
    // per-node predecessor sets; a node is congested when it has more than
    // one predecessor
    node_connections: Vec<BTreeSet<NodeId>>,
    // per-node usage counters accumulated across iterations
    node_history: Vec<u32>,
    // per-node set of nets currently using the node
    node_net_ids: Vec<BTreeSet<usize>>,
    pub(crate) overflowed: bool,
}

impl Router {
    /// Creates a router over the given device graph. The graph topology must
    /// be complete: `add_net` resolves pins against it.
    pub fn new(graph: RoutingGraph) -> Self {
        let num_nodes = graph.num_nodes();
        Self {
            graph,
            netlist: Vec::new(),
            placement: BTreeMap::new(),
            reg_net_order: BTreeMap::new(),
            reg_net_src: BTreeMap::new(),
            current_routes: BTreeMap::new(),
            node_connections: vec![BTreeSet::new(); num_nodes],
            node_history: vec![0; num_nodes],
            node_net_ids: vec![BTreeSet::new(); num_nodes],
            overflowed: false,
        }
    }

    /// Records that `blk_id` has been placed on tile `(x, y)`.
    pub fn add_placement(&mut self, x: u32, y: u32, blk_id: &str) {
        self.placement.insert(blk_id.to_string(), (x, y));
    }

    /// Adds a net. Every entry is a `(block id, port name)` pair; the first
    /// is the source. Block ids starting with `'r'` are *register sinks*:
    /// their pins keep the placed coordinate but stay unresolved until the
    /// global router assigns them a switch box. All other pins resolve
    /// immediately to the matching port node of the placed tile.
    pub fn add_net(&mut self, name: &str, net: &[(&str, &str)]) -> Result<(), RouteError> {
        let net_id = self.netlist.len();
        let mut n = Net::new(net_id, name);
        for &(blk_id, port) in net.iter() {
            let &(x, y) = self
                .placement
                .get(blk_id)
                .ok_or_else(|| RouteError::MissingPlacement(blk_id.to_string()))?;
            let mut pin = Pin::new(x, y, blk_id, port);
            // register locations are chosen during the routing negotiation
            if !blk_id.starts_with(REG_PREFIX) {
                pin.node = Some(self.graph.get_port(x, y, port)?);
            }
            n.add_pin(pin);
        }
        self.netlist.push(n);
        Ok(())
    }

    /// Whether any node is currently used by more than one net.
    pub fn overflow(&self) -> bool {
        self.overflowed
    }

    /// The netlist in net-id order.
    pub fn netlist(&self) -> &[Net] {
        &self.netlist
    }

    /// The device graph.
    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    // ------------------------------------------------------------------
    // A* entry points
    // ------------------------------------------------------------------

    /// Shortest path from `start` to `end` with the plain wire cost and a
    /// Manhattan heuristic.
    pub fn route_a_star(&self, start: NodeId, end: NodeId) -> Result<Vec<NodeId>, RouteError> {
        self.route_a_star_with_cost(start, end, |_, _| 0.0)
    }

    /// Shortest path from `start` to `end` under an extra cost function.
    pub fn route_a_star_with_cost<C>(
        &self,
        start: NodeId,
        end: NodeId,
        cost_f: C,
    ) -> Result<Vec<NodeId>, RouteError>
    where
        C: FnMut(NodeId, NodeId) -> f64,
    {
        let h_f = self.manhattan_to_node(end);
        self.route_a_star_until(start, move |node| node == end, cost_f, h_f)
    }

    /// Shortest path from `start` to `end` under an extra cost function and
    /// an explicit heuristic.
    pub fn route_a_star_with<C, H>(
        &self,
        start: NodeId,
        end: NodeId,
        cost_f: C,
        h_f: H,
    ) -> Result<Vec<NodeId>, RouteError>
    where
        C: FnMut(NodeId, NodeId) -> f64,
        H: FnMut(NodeId) -> f64,
    {
        self.route_a_star_until(start, move |node| node == end, cost_f, h_f)
    }

    /// Shortest path from `start` to any node at coordinate `end`, with a
    /// Manhattan heuristic towards that coordinate.
    pub fn route_a_star_to_tile<C>(
        &self,
        start: NodeId,
        end: (u32, u32),
        cost_f: C,
    ) -> Result<Vec<NodeId>, RouteError>
    where
        C: FnMut(NodeId, NodeId) -> f64,
    {
        let h_f = self.manhattan_to_coord(end);
        self.route_a_star_to_tile_with(start, end, cost_f, h_f)
    }

    /// Shortest path from `start` to any node at coordinate `end` under an
    /// explicit heuristic.
    pub fn route_a_star_to_tile_with<C, H>(
        &self,
        start: NodeId,
        end: (u32, u32),
        cost_f: C,
        h_f: H,
    ) -> Result<Vec<NodeId>, RouteError>
    where
        C: FnMut(NodeId, NodeId) -> f64,
        H: FnMut(NodeId) -> f64,
    {
        let graph = &self.graph;
        let end_f = move |node: NodeId| {
            let n = graph.node(node);
            n.x == end.0 && n.y == end.1
        };
        self.route_a_star_until(start, end_f, cost_f, h_f)
    }

    /// The actual routing engine shared by Dijkstra and A*: searches from
    /// `start` to the first node satisfying `end_f`.
    pub fn route_a_star_until<E, C, H>(
        &self,
        start: NodeId,
        end_f: E,
        cost_f: C,
        h_f: H,
    ) -> Result<Vec<NodeId>, RouteError>
    where
        E: FnMut(NodeId) -> bool,
        C: FnMut(NodeId, NodeId) -> f64,
        H: FnMut(NodeId) -> f64,
    {
        astar::route_a_star(&self.graph, start, end_f, cost_f, h_f)
    }

    /// A Manhattan-distance heuristic towards a node.
    pub fn manhattan_to_node(&self, end: NodeId) -> impl Fn(NodeId) -> f64 + '_ {
        let target = (self.graph.node(end).x, self.graph.node(end).y);
        self.manhattan_to_coord(target)
    }

    /// A Manhattan-distance heuristic towards a coordinate.
    pub fn manhattan_to_coord(&self, end: (u32, u32)) -> impl Fn(NodeId) -> f64 + '_ {
        let graph = &self.graph;
        move |node: NodeId| {
            let n = graph.node(node);
            graph::manhattan_distance_coord((n.x, n.y), end) as f64
        }
    }

    // ------------------------------------------------------------------
    // congestion state
    // ------------------------------------------------------------------

    /// Commits a routed segment: every consecutive pair `(u, v)` adds `u` to
    /// the predecessor set of `v` (raising the overflow flag when a set
    /// grows beyond one), and the net id is recorded on every node.
    pub(crate) fn assign_net_segment(&mut self, segment: &[NodeId], net_id: usize) {
        for pair in segment.windows(2) {
            self.assign_connection(pair[1], pair[0]);
        }
        for &node in segment.iter() {
            self.node_net_ids[node.index()].insert(net_id);
        }
    }

    pub(crate) fn assign_connection(&mut self, node: NodeId, pre_node: NodeId) {
        let conn = &mut self.node_connections[node.index()];
        conn.insert(pre_node);
        if !self.overflowed && conn.len() > 1 {
            self.overflowed = true;
        }
    }

    /// Increments the history counter of every node that appears in any
    /// committed route, once per node.
    pub(crate) fn assign_history(&mut self) {
        let mut seen = vec![false; self.graph.num_nodes()];
        for routes in self.current_routes.values() {
            for segment in routes.values() {
                for &node in segment.iter() {
                    if !seen[node.index()] {
                        seen[node.index()] = true;
                        self.node_history[node.index()] += 1;
                    }
                }
            }
        }
    }

    /// Removes a net's segments from the predecessor and net-id sets and
    /// drops it from the route table.
    pub(crate) fn rip_up_net(&mut self, net_id: usize) {
        let route = match self.current_routes.remove(&net_id) {
            Some(route) => route,
            None => return,
        };
        for segment in route.values() {
            for pair in segment.windows(2) {
                self.node_connections[pair[1].index()].remove(&pair[0]);
            }
            for node in segment.iter() {
                self.node_net_ids[node.index()].remove(&net_id);
            }
        }
    }

    /// Zeroes the predecessor sets and the per-node net-id sets of every
    /// tracked node and drops all current routes. History counters are left
    /// intact, so calling this twice in sequence yields the same state.
    pub fn clear_connections(&mut self) {
        for net_id in 0..self.netlist.len() {
            self.rip_up_net(net_id);
        }
    }

    pub(crate) fn get_history_cost(&self, node: NodeId) -> u32 {
        self.node_history[node.index()]
    }

    /// The PathFinder presence term for expanding into `node` from
    /// `pre_node` (the A* parent): the predecessor-set size, minus one when
    /// `pre_node` already is a member.
    pub(crate) fn get_presence_cost(&self, node: NodeId, pre_node: NodeId) -> f64 {
        let conn = &self.node_connections[node.index()];
        if conn.contains(&pre_node) {
            (conn.len() - 1) as f64
        } else {
            conn.len() as f64
        }
    }

    pub(crate) fn connections(&self, node: NodeId) -> &BTreeSet<NodeId> {
        &self.node_connections[node.index()]
    }

    // ------------------------------------------------------------------
    // register net grouping
    // ------------------------------------------------------------------

    /// Groups register-chained nets. A net whose sink has port `reg` and a
    /// block id starting with `'r'` *drives* the net whose source carries
    /// that block id; squashing the links yields one ordered chain per
    /// ultimate driver. Needed because register locations are assigned on
    /// the fly while routing.
    pub(crate) fn group_reg_nets(&mut self) {
        let mut driven_by: BTreeMap<String, usize> = BTreeMap::new();
        // first pass to determine where the reg nets originate
        for net in self.netlist.iter() {
            for i in 1..net.len() {
                let pin = net.pin(i);
                if pin.port == REG_PORT && pin.name.starts_with(REG_PREFIX) {
                    // we assume it's already packed
                    driven_by.insert(pin.name.clone(), net.id);
                }
            }
        }

        // second pass to map each register block to the net it sources
        for net in self.netlist.iter() {
            if driven_by.contains_key(&net.source().name) {
                self.reg_net_src.insert(net.source().name.clone(), net.id);
            }
        }

        for (name, src_id) in driven_by.iter() {
            let mut name = name.clone();
            let mut src_id = *src_id;
            while let Some(&next) = driven_by.get(&name) {
                src_id = next;
                name = self.netlist[next].source().name.clone();
            }
            let squashed = self.squash_net(src_id);
            self.reg_net_order.insert(src_id, squashed);
        }
    }

    // depth-first chain squashing starting at the chain's ultimate driver
    fn squash_net(&self, src_id: usize) -> Vec<usize> {
        let mut result = vec![src_id];
        let net = &self.netlist[src_id];
        for index in 1..net.len() {
            let pin = net.pin(index);
            if pin.name.starts_with(REG_PREFIX) {
                let next_id = self.reg_net_src[&pin.name];
                result.extend(self.squash_net(next_id));
            }
        }
        result
    }

    /// Computes the net routing order: register chains first (ordered by
    /// total chain fan-out, descending and stable), then all remaining nets
    /// by fan-out (descending, stable).
    pub(crate) fn reorder_reg_nets(&self) -> Vec<usize> {
        let mut result: Vec<usize> = Vec::new();

        let reg_nets = self.reg_net_order.keys().copied().sorted_by_key(|id| {
            let fan_out: usize =
                self.reg_net_order[id].iter().map(|&n| self.netlist[n].fan_out()).sum();
            std::cmp::Reverse(fan_out)
        });
        for src_id in reg_nets {
            result.extend(self.reg_net_order[&src_id].iter().copied());
        }

        let chained: BTreeSet<usize> = result.iter().copied().collect();
        let normal_nets = (0..self.netlist.len())
            .filter(|id| !chained.contains(id))
            .sorted_by_key(|&id| std::cmp::Reverse(self.netlist[id].fan_out()));
        result.extend(normal_nets);

        result
    }

    // ------------------------------------------------------------------
    // realisation
    // ------------------------------------------------------------------

    /// Returns, for each net name, the routed segments in pin order. Fails
    /// when a net has not been (completely) routed.
    pub fn realize(&self) -> Result<BTreeMap<String, Vec<Vec<NodeId>>>, RouteError> {
        let mut result = BTreeMap::new();
        for net in self.netlist.iter() {
            let route = self
                .current_routes
                .get(&net.id)
                .ok_or(RouteError::InvariantViolation("net has not been routed"))?;
            let mut segments = Vec::with_capacity(net.fan_out());
            for seg_index in 1..net.len() {
                let sink = net
                    .pin(seg_index)
                    .node
                    .ok_or(RouteError::InvariantViolation("sink pin was never resolved"))?;
                let segment = route
                    .get(&sink)
                    .ok_or(RouteError::InvariantViolation("sink has no routed segment"))?;
                segments.push(segment.clone());
            }
            result.insert(net.name.clone(), segments);
        }
        Ok(result)
    }
}
