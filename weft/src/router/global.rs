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

//! # Global Router
//!
//! The congestion-negotiating iteration loop, in the PathFinder fashion but
//! adapted to the CGRA architecture. Every iteration recomputes the slack
//! ratios, rips up all nets, and re-routes them in a fixed order under the
//! negotiated cost
//!
//! ```text
//! cost(u, v) = a_n * d(u, v) + (1 - a_n) * (d(u, v) + h(v)) * p(v, u)
//! ```
//!
//! where `d` is the wire delay, `h` the accumulated history penalty, `p` the
//! current presence (predecessor-set) penalty and `a_n` the slack-derived
//! blend between delay-driven and congestion-driven routing. The loop
//! terminates as soon as no node is shared by more than one net, or fails
//! once the iteration budget is exhausted.
//!
//! Register sinks are special: the placer only mandates their *tile*, so the
//! search targets any free switch box at that coordinate, and the chosen
//! node is patched both into the sink pin and into the source of the net the
//! register drives. When that downstream net is routed, the chain is
//! repaired by splicing an unused pipeline register out of the freshly
//! routed segment.

use crate::device::{graph, NodeId, RoutingGraph};
use crate::router::base::{Router, REG_PREFIX};
use crate::router::types::RouteError;

use log::*;
use std::collections::BTreeMap;
use std::time::Instant;

// routing strategy per (net, sink), picked from the slack ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoutingStrategy {
    DelayDriven,
    CongestionDriven,
}

/// The global router. Owns a [`Router`] base and drives it through up to
/// `num_iteration` negotiation iterations.
#[derive(Debug, Clone)]
pub struct GlobalRouter {
    router: Router,
    num_iteration: u32,
    // (net id, original pin index) -> slack in [0, 1]
    slack_ratio: BTreeMap<(usize, usize), f64>,
    // downstream net id -> (driver net id, the driver's current sink node)
    reg_net_table: BTreeMap<usize, (usize, NodeId)>,
    /// multiplier applied to the slack when computing `a_n`
    pub slack_factor: f64,
    /// multiplier applied to the history counter in the cost function
    pub hn_factor: f64,
    /// slacks above this ratio route delay-driven, all others
    /// congestion-driven
    pub route_strategy_ratio: f64,
}

impl GlobalRouter {
    /// Creates a global router over the given device graph with an outer
    /// iteration budget.
    pub fn new(num_iteration: u32, graph: RoutingGraph) -> Self {
        Self {
            router: Router::new(graph),
            num_iteration,
            slack_ratio: BTreeMap::new(),
            reg_net_table: BTreeMap::new(),
            slack_factor: 1.0,
            hn_factor: 1.0,
            route_strategy_ratio: 0.7,
        }
    }

    /// Records that `blk_id` has been placed on tile `(x, y)`.
    pub fn add_placement(&mut self, x: u32, y: u32, blk_id: &str) {
        self.router.add_placement(x, y, blk_id);
    }

    /// Adds a net; see [`Router::add_net`].
    pub fn add_net(&mut self, name: &str, net: &[(&str, &str)]) -> Result<(), RouteError> {
        self.router.add_net(name, net)
    }

    /// Whether any node is currently used by more than one net.
    pub fn overflow(&self) -> bool {
        self.router.overflow()
    }

    /// The router base.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns, for each net name, the routed segments in pin order.
    pub fn realize(&self) -> Result<BTreeMap<String, Vec<Vec<NodeId>>>, RouteError> {
        self.router.realize()
    }

    /// Routes the whole netlist.
    ///
    /// 1. Nets with register sinks are grouped into chains and routed first,
    ///    so that register locations are pinned before anything else fights
    ///    for the fabric. The relative order of the two groups is fixed once
    ///    before the loop.
    /// 2. Each iteration computes the slack ratios from the previous
    ///    iteration's delays, rips up every net, routes them all, and
    ///    accumulates the history counters.
    /// 3. The loop returns as soon as no node overflows; exhausting the
    ///    budget with congestion still present is an error.
    pub fn route(&mut self) -> Result<(), RouteError> {
        self.router.group_reg_nets();
        let reordered_netlist = self.router.reorder_reg_nets();

        for it in 0..self.num_iteration {
            let time_start = Instant::now();

            self.compute_slack_ratio(it)?;
            self.router.overflowed = false;

            // rip up all the nets and free the routing resources
            self.router.clear_connections();

            for &net_id in reordered_netlist.iter() {
                self.route_net(net_id, it)?;
            }

            self.router.assign_history();

            info!(
                "Routing iteration: {:3} duration: {} ms",
                it,
                time_start.elapsed().as_millis()
            );

            if !self.router.overflow() {
                return Ok(());
            }
        }
        if self.router.overflow() {
            Err(RouteError::Congested(self.num_iteration))
        } else {
            Ok(())
        }
    }

    /// Computes the slack ratio for every (net, sink) pair. Unlike the
    /// original PathFinder this works per pin pair rather than per routable
    /// node pair, which keeps the table small; the delays are normalised so
    /// that the slack is always in `[0, 1]`.
    fn compute_slack_ratio(&mut self, current_iter: u32) -> Result<(), RouteError> {
        if current_iter == 0 {
            // delay-driven first, thus 1 for every routing pair
            for net in self.router.netlist().iter() {
                for seg_index in 1..net.len() {
                    self.slack_ratio.insert((net.id, seg_index), 1.0);
                }
            }
            return Ok(());
        }

        let mut max_delay = f64::MIN;
        let mut min_delay = f64::MAX;
        for net in self.router.netlist().iter() {
            net.source()
                .node
                .ok_or(RouteError::InvariantViolation("no source node while computing slack"))?;
            let segments = self
                .router
                .current_routes
                .get(&net.id)
                .ok_or(RouteError::InvariantViolation("net unrouted while computing slack"))?;
            for seg_index in 1..net.len() {
                let sink = net
                    .pin(seg_index)
                    .node
                    .ok_or(RouteError::InvariantViolation("no sink node while computing slack"))?;
                let route = segments
                    .get(&sink)
                    .ok_or(RouteError::InvariantViolation("sink unrouted while computing slack"))?;
                let delay: u32 = route.iter().map(|&n| self.router.graph().node(n).delay).sum();
                let delay = delay as f64;
                self.slack_ratio.insert((net.id, seg_index), delay);
                if delay > max_delay {
                    max_delay = delay;
                }
                if delay < min_delay {
                    min_delay = delay;
                }
            }
        }

        // normalise to [0, 1]
        let range = max_delay - min_delay;
        if range != 0.0 {
            for slack in self.slack_ratio.values_mut() {
                *slack = (*slack - min_delay) / range;
            }
        } else {
            // every sink has the same delay
            for slack in self.slack_ratio.values_mut() {
                *slack = 1.0;
            }
        }
        Ok(())
    }

    // sink indices ordered by Manhattan distance to the source (ascending,
    // stable); the source must remain in front and is stripped from the
    // returned list
    fn reorder_pins(&self, net_id: usize) -> Result<Vec<usize>, RouteError> {
        let net = &self.router.netlist()[net_id];
        let src_pos = (net.source().x, net.source().y);
        let mut result: Vec<usize> = (0..net.len()).collect();
        result.sort_by_key(|&i| {
            let pin = net.pin(i);
            graph::manhattan_distance_coord((pin.x, pin.y), src_pos)
        });
        if result[0] != 0 {
            return Err(RouteError::InvariantViolation("after sorting src node is not the first node"));
        }
        result.remove(0);
        Ok(result)
    }

    fn route_net(&mut self, net_id: usize, it: u32) -> Result<(), RouteError> {
        let pin_order = self.reorder_pins(net_id)?;
        let mut current_path: Vec<NodeId> = Vec::new();

        for (position, &seg_index) in pin_order.iter().enumerate() {
            let src = self.router.netlist()[net_id]
                .source()
                .node
                .ok_or(RouteError::InvariantViolation("unable to find src when routing net"))?;
            let sink = self.router.netlist()[net_id].pin(seg_index).clone();
            let sink_coord = (sink.x, sink.y);

            let slack = self.slack_ratio[&(net_id, seg_index)];
            let strategy = if slack > self.route_strategy_ratio {
                RoutingStrategy::DelayDriven
            } else {
                RoutingStrategy::CongestionDriven
            };

            // under congestion, prior sinks of the same net may donate a
            // closer, still uncongested switch box as the restart point
            let mut src_node = src;
            if strategy == RoutingStrategy::CongestionDriven && !current_path.is_empty() {
                src_node = self.choose_restart_node(src, &current_path, sink_coord);
            }

            let an = slack * self.slack_factor;
            if sink.name.starts_with(REG_PREFIX) {
                if it != 0 && sink.node.is_none() {
                    return Err(RouteError::InvariantViolation(
                        "iteration 0 failed to assign registers",
                    ));
                }
                self.route_to_register_tile(net_id, seg_index, src_node, sink_coord, an)?;
            } else {
                self.route_to_port(net_id, seg_index, src_node, an)?;
            }

            // repair the chain once the first sink of a register-driven net
            // has been routed
            if self.router.netlist()[net_id].source().name.starts_with(REG_PREFIX) {
                if position == 0 {
                    self.fix_register_net(net_id, seg_index)?;
                } else {
                    let src_kind = self.router.graph().node(src).kind;
                    if !src_kind.is_switch_box() && !src_kind.is_register() {
                        return Err(RouteError::InvariantViolation("failed to fix register net"));
                    }
                }
            }

            // commit whatever ended up in the route table for this sink
            let key = self.router.netlist()[net_id]
                .pin(seg_index)
                .node
                .ok_or(RouteError::InvariantViolation("sink still unresolved after routing"))?;
            let committed = self
                .router
                .current_routes
                .get(&net_id)
                .and_then(|r| r.get(&key))
                .ok_or(RouteError::InvariantViolation("sink has no committed segment"))?
                .clone();
            current_path.extend(committed.iter().copied());
            self.router.assign_net_segment(&committed, net_id);
        }
        Ok(())
    }

    // spec: a restart candidate must be a switch box with at most one
    // predecessor, with at least one out-neighbouring switch box that is
    // free (or only fed by the candidate's own predecessor in the path);
    // among candidates, the one closest to the sink wins
    fn choose_restart_node(
        &self,
        src: NodeId,
        current_path: &[NodeId],
        sink_coord: (u32, u32),
    ) -> NodeId {
        let g = self.router.graph();
        let mut best = src;
        let mut min_dist =
            graph::manhattan_distance_coord((g.node(src).x, g.node(src).y), sink_coord);
        for p in 1..current_path.len() {
            let node = current_path[p];
            let pre_node = current_path[p - 1];
            let n = g.node(node);
            // it has to be a switch box
            if !n.kind.is_switch_box() {
                continue;
            }
            // it can't be overflowed already
            if self.router.connections(node).len() > 1 {
                continue;
            }
            // and one of its switch-box neighbours has to be free
            let mut empty = false;
            for nb in n.neighbors() {
                let conn_n = self.router.connections(nb);
                if g.node(nb).kind.is_switch_box()
                    && (conn_n.is_empty()
                        || (conn_n.len() == 1 && conn_n.contains(&pre_node)))
                {
                    empty = true;
                    break;
                }
            }
            if !empty {
                continue;
            }
            let dist = graph::manhattan_distance_coord((n.x, n.y), sink_coord);
            if dist < min_dist {
                min_dist = dist;
                best = node;
            }
        }
        best
    }

    // route towards a normal port sink and store the segment
    fn route_to_port(
        &mut self,
        net_id: usize,
        seg_index: usize,
        src_node: NodeId,
        an: f64,
    ) -> Result<(), RouteError> {
        let sink_node = self.router.netlist()[net_id]
            .pin(seg_index)
            .node
            .ok_or(RouteError::InvariantViolation("unable to find node for sink block"))?;
        let segment = {
            let router = &self.router;
            let cost_f = self.create_cost_function(an);
            router.route_a_star_with_cost(src_node, sink_node, cost_f)?
        };
        if *segment.last().unwrap() != sink_node {
            return Err(RouteError::InvariantViolation("route does not end at the sink port"));
        }
        self.router.current_routes.entry(net_id).or_default().insert(sink_node, segment);
        Ok(())
    }

    // route towards the *tile* of a register sink: any free switch box at
    // that coordinate terminates the search, and its location is patched
    // into both the sink pin and the downstream net's source
    fn route_to_register_tile(
        &mut self,
        net_id: usize,
        seg_index: usize,
        src_node: NodeId,
        end: (u32, u32),
        an: f64,
    ) -> Result<(), RouteError> {
        let segment = {
            let router = &self.router;
            let g = router.graph();
            let end_f = move |node: NodeId| {
                let n = g.node(node);
                if !n.kind.is_switch_box() || n.x != end.0 || n.y != end.1 {
                    return false;
                }
                if !router.connections(node).is_empty() {
                    return false;
                }
                // one of its switch-box connections has to be free
                n.neighbors().any(|nb| {
                    g.node(nb).kind.is_switch_box() && router.connections(nb).is_empty()
                })
            };
            let cost_f = self.create_cost_function(an);
            let h_f = router.manhattan_to_coord(end);
            router.route_a_star_until(src_node, end_f, cost_f, h_f)?
        };

        let switch_node = *segment.last().unwrap();
        let n = self.router.graph().node(switch_node);
        if !n.kind.is_switch_box() {
            return Err(RouteError::InvariantViolation("cannot connect to the register tile"));
        }
        if n.x != end.0 || n.y != end.1 {
            return Err(RouteError::InvariantViolation(
                "error in assigning a switch box for the register",
            ));
        }

        // assign the location across the chain
        let sink_name = self.router.netlist()[net_id].pin(seg_index).name.clone();
        self.router.netlist[net_id].pin_mut(seg_index).node = Some(switch_node);
        let reg_net_id = *self
            .router
            .reg_net_src
            .get(&sink_name)
            .ok_or(RouteError::InvariantViolation("register sink drives no net"))?;
        self.router.netlist[reg_net_id].pin_mut(0).node = Some(switch_node);

        self.router.current_routes.entry(net_id).or_default().insert(switch_node, segment);

        // remember the driver so the chain can be repaired quickly later
        self.reg_net_table.insert(reg_net_id, (net_id, switch_node));
        Ok(())
    }

    // the PathFinder negotiated cost
    fn create_cost_function(&self, an: f64) -> impl Fn(NodeId, NodeId) -> f64 + '_ {
        let router = &self.router;
        let hn_factor = self.hn_factor;
        move |node1: NodeId, node2: NodeId| {
            let pn = router.get_presence_cost(node2, node1);
            let dn = router.graph().edge_cost(node1, node2) as f64;
            let hn = router.get_history_cost(node2) as f64 * hn_factor;
            an * dn + (1.0 - an) * (dn + hn) * pn
        }
    }

    /// Repairs a register chain after the first sink of a register-driven
    /// net has been routed: an unused pipeline register adjacent to the
    /// fresh segment is spliced in as the net's new source, and the driver
    /// net's committed route is extended up to (and including) that
    /// register. All predecessor annotations along the extension are
    /// updated.
    fn fix_register_net(&mut self, net_id: usize, seg_index: usize) -> Result<(), RouteError> {
        let sink_key = self.router.netlist()[net_id]
            .pin(seg_index)
            .node
            .ok_or(RouteError::InvariantViolation("register net sink is unresolved"))?;
        let segment = self
            .router
            .current_routes
            .get(&net_id)
            .and_then(|r| r.get(&sink_key))
            .ok_or(RouteError::InvariantViolation("register net has no routed segment"))?
            .clone();

        let g = self.router.graph();
        if !g.node(segment[0]).kind.is_switch_box() {
            return Err(RouteError::InvariantViolation(
                "the beginning of a register fix has to be a switch box",
            ));
        }

        // find a free pipeline register hanging off the segment
        let mut found = None;
        'outer: for &node in segment.iter() {
            for next in g.node(node).neighbors() {
                if g.node(next).kind.is_register() && self.router.connections(next).is_empty() {
                    found = Some((node, next));
                    break 'outer;
                }
            }
        }
        let (pre_node, reg_node) = found.ok_or(RouteError::NoFreeRegister)?;

        // it has to be a pipeline register, so its single out-neighbour lies
        // on the path
        let next_node = g
            .node(reg_node)
            .neighbors()
            .next()
            .ok_or(RouteError::InvariantViolation("register has no out-neighbour"))?;
        if !g.node(next_node).kind.is_switch_box() {
            return Err(RouteError::InvariantViolation("the register has to be in the switch box"));
        }
        let index = segment
            .iter()
            .position(|&n| n == next_node)
            .ok_or(RouteError::InvariantViolation(
                "unable to find the connected register in the given path",
            ))?;

        // splice: the register becomes the new source of this net's route
        let mut new_segment = vec![reg_node];
        new_segment.extend(segment[index..].iter().copied());
        self.router
            .current_routes
            .get_mut(&net_id)
            .unwrap()
            .insert(sink_key, new_segment);
        self.router.netlist[net_id].pin_mut(0).node = Some(reg_node);

        // extend the driver net's route to include the register
        let &(driver_id, driver_key) = self
            .reg_net_table
            .get(&net_id)
            .ok_or(RouteError::InvariantViolation("no driver recorded for register net"))?;
        let mut driver_segment = self
            .router
            .current_routes
            .get(&driver_id)
            .and_then(|r| r.get(&driver_key))
            .ok_or(RouteError::InvariantViolation("register driver net is unrouted"))?
            .clone();
        if *driver_segment.last().unwrap() != segment[0] {
            return Err(RouteError::InvariantViolation(
                "register driver net does not end at the chain source",
            ));
        }
        let fix_index = driver_segment.len();
        for node_index in 1..segment.len() {
            if segment[node_index - 1] == pre_node {
                break;
            }
            driver_segment.push(segment[node_index]);
        }
        driver_segment.push(reg_node);
        for i in fix_index..driver_segment.len() {
            self.router.assign_connection(driver_segment[i], driver_segment[i - 1]);
        }

        // re-key the driver's segment to the register and point its sink pin
        // at the concrete location
        let driver_routes = self.router.current_routes.get_mut(&driver_id).unwrap();
        driver_routes.remove(&driver_key);
        driver_routes.insert(reg_node, driver_segment);
        let driver_net = &mut self.router.netlist[driver_id];
        for i in 1..driver_net.len() {
            if driver_net.pin(i).node == Some(driver_key) {
                driver_net.pin_mut(i).node = Some(reg_node);
                break;
            }
        }
        self.reg_net_table.insert(net_id, (driver_id, reg_node));
        Ok(())
    }
}
