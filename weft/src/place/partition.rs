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

//! # Netlist Partitioner
//!
//! The packed netlist is interpreted as a directed block-adjacency
//! multigraph (every net contributes one edge from its source block to each
//! sink block) and partitioned by a modularity-maximising community
//! detection: a fixed number of local-moving refinement passes over a
//! seeded, shuffled node order. With the same netlist and seed the
//! partition is byte-for-byte reproducible.
//!
//! A post-partition [`ClusterGraph`] can merge clusters to honour a maximum
//! cluster size, break inter-cluster cycles, and move individual blocks
//! between clusters as long as each move reduces the edge weight crossing
//! cluster boundaries.

use super::types::PlaceError;
use log::*;
use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Number of refinement passes used by [`partition_netlist`].
pub const DEFAULT_NUM_ITER: u32 = 15;

/// Partitions a netlist (net id -> ordered block list, the first block
/// being the source) into disjoint block clusters, using
/// [`DEFAULT_NUM_ITER`] refinement passes and seed 0.
pub fn partition_netlist(
    netlists: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<usize, BTreeSet<String>> {
    partition_netlist_seeded(netlists, DEFAULT_NUM_ITER, 0)
}

/// Partitions a netlist with an explicit pass count and seed.
pub fn partition_netlist_seeded(
    netlists: &BTreeMap<String, Vec<String>>,
    num_iter: u32,
    seed: u64,
) -> BTreeMap<usize, BTreeSet<String>> {
    let (graph, id_to_block) = construct_block_graph(netlists);
    let membership = modularity_communities(&graph, num_iter, seed);

    let mut result: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    // relabel communities in order of their smallest member, so that the
    // cluster ids do not depend on the internal community numbering
    let mut community_to_id: BTreeMap<usize, usize> = BTreeMap::new();
    for (node, blk) in id_to_block.iter() {
        let community = membership[node.index()];
        let next_id = community_to_id.len();
        let id = *community_to_id.entry(community).or_insert(next_id);
        result.entry(id).or_default().insert(blk.clone());
    }
    debug!("partitioned {} blocks into {} clusters", id_to_block.len(), result.len());
    result
}

// build the weighted block digraph; nodes are created in sorted block-name
// order so that node indices are deterministic
fn construct_block_graph(
    netlists: &BTreeMap<String, Vec<String>>,
) -> (DiGraph<String, u32>, BTreeMap<NodeIndex, String>) {
    let mut blk_to_id: BTreeMap<String, NodeIndex> = BTreeMap::new();
    let mut graph: DiGraph<String, u32> = DiGraph::new();

    let block_names: BTreeSet<&String> = netlists.values().flatten().collect();
    for blk in block_names {
        let id = graph.add_node(blk.clone());
        blk_to_id.insert(blk.clone(), id);
    }

    let mut weights: BTreeMap<(NodeIndex, NodeIndex), u32> = BTreeMap::new();
    for net in netlists.values() {
        let src = blk_to_id[&net[0]];
        for sink in net.iter().skip(1) {
            let dst = blk_to_id[sink];
            if src != dst {
                *weights.entry((src, dst)).or_insert(0) += 1;
            }
        }
    }
    for ((src, dst), weight) in weights {
        graph.add_edge(src, dst, weight);
    }

    let id_to_block = blk_to_id.into_iter().map(|(blk, id)| (id, blk)).collect();
    (graph, id_to_block)
}

// modularity-maximising local moving over the undirected view of the graph:
// every pass visits all nodes in a freshly shuffled order and moves each
// node into the neighbouring community with the best modularity gain
fn modularity_communities(graph: &DiGraph<String, u32>, num_iter: u32, seed: u64) -> Vec<usize> {
    let n = graph.node_count();
    let mut community: Vec<usize> = (0..n).collect();
    if n == 0 {
        return community;
    }

    // undirected weighted adjacency
    let mut adjacency: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    for edge in graph.edge_indices() {
        let (a, b) = graph.edge_endpoints(edge).unwrap();
        let w = graph[edge] as f64;
        *adjacency[a.index()].entry(b.index()).or_insert(0.0) += w;
        *adjacency[b.index()].entry(a.index()).or_insert(0.0) += w;
    }
    let degree: Vec<f64> = adjacency.iter().map(|nb| nb.values().sum()).collect();
    let two_m: f64 = degree.iter().sum();
    if two_m == 0.0 {
        return community;
    }
    let mut community_degree = degree.clone();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();

    for _ in 0..num_iter {
        order.shuffle(&mut rng);
        let mut moved = false;
        for &node in order.iter() {
            let current = community[node];
            // weight towards every neighbouring community
            let mut weight_to: BTreeMap<usize, f64> = BTreeMap::new();
            for (&nb, &w) in adjacency[node].iter() {
                *weight_to.entry(community[nb]).or_insert(0.0) += w;
            }

            // take the node out of its community for the gain comparison
            community_degree[current] -= degree[node];
            let base = weight_to.get(&current).copied().unwrap_or(0.0);
            let gain = |target: usize, weight: f64| {
                weight - community_degree[target] * degree[node] / two_m
            };

            let mut best_community = current;
            let mut best_gain = gain(current, base);
            for (&target, &weight) in weight_to.iter() {
                if target == current {
                    continue;
                }
                let g = gain(target, weight);
                if g > best_gain {
                    best_gain = g;
                    best_community = target;
                }
            }

            community_degree[best_community] += degree[node];
            if best_community != current {
                community[node] = best_community;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
    community
}

/// The cluster-level graph used after partitioning: one node per cluster,
/// one weighted edge per (source cluster, sink cluster) pair of the
/// netlist. The netlist here maps net ids to ordered block lists.
#[derive(Debug, Clone)]
pub struct ClusterGraph {
    clusters: BTreeMap<usize, BTreeSet<String>>,
    netlist: BTreeMap<String, Vec<String>>,
    graph: DiGraph<usize, u32>,
    node_index: BTreeMap<usize, NodeIndex>,
}

impl ClusterGraph {
    /// Creates the cluster graph for a partition of the given netlist.
    pub fn new(
        clusters: BTreeMap<usize, BTreeSet<String>>,
        netlist: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut g = Self {
            clusters,
            netlist,
            graph: DiGraph::new(),
            node_index: BTreeMap::new(),
        };
        g.update();
        g
    }

    /// The current clusters.
    pub fn clusters(&self) -> &BTreeMap<usize, BTreeSet<String>> {
        &self.clusters
    }

    // rebuild the petgraph representation from the clusters
    fn update(&mut self) {
        self.graph = DiGraph::new();
        self.node_index.clear();

        let mut block_cluster: BTreeMap<&String, usize> = BTreeMap::new();
        for (&id, cluster) in self.clusters.iter() {
            self.node_index.insert(id, self.graph.add_node(id));
            for blk in cluster.iter() {
                block_cluster.insert(blk, id);
            }
        }

        let mut weights: BTreeMap<(usize, usize), u32> = BTreeMap::new();
        for net in self.netlist.values() {
            let src = match block_cluster.get(&net[0]) {
                Some(&c) => c,
                None => continue,
            };
            for sink in net.iter().skip(1) {
                let dst = match block_cluster.get(sink) {
                    Some(&c) => c,
                    None => continue,
                };
                if src != dst {
                    *weights.entry((src, dst)).or_insert(0) += 1;
                }
            }
        }
        for ((src, dst), weight) in weights {
            self.graph.add_edge(self.node_index[&src], self.node_index[&dst], weight);
        }
    }

    /// The total edge weight crossing cluster boundaries.
    pub fn total_weight(&self) -> u32 {
        self.graph.edge_indices().map(|e| self.graph[e]).sum()
    }

    /// Whether the cluster graph contains a cycle.
    pub fn has_loop(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// The cluster ids in a topological order of the cluster graph; fails
    /// when a cycle is present.
    pub fn topological_sort(&self) -> Result<Vec<usize>, PlaceError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|_| PlaceError::ClusterLoop)
    }

    /// Merges `target` into `base`.
    pub fn merge_into(&mut self, base: usize, target: usize) {
        if let Some(blocks) = self.clusters.remove(&target) {
            self.clusters.get_mut(&base).unwrap().extend(blocks);
        }
        self.update();
    }

    /// Merges the clusters along every inter-cluster cycle until the graph
    /// is acyclic, then renumbers the clusters.
    pub fn merge_loops(&mut self) {
        while self.has_loop() {
            // every strongly connected component with more than one node is
            // a set of clusters that must become one
            let sccs = tarjan_scc(&self.graph);
            for scc in sccs {
                if scc.len() < 2 {
                    continue;
                }
                let mut ids: Vec<usize> = scc.iter().map(|&n| self.graph[n]).collect();
                ids.sort_unstable();
                let base = ids[0];
                for &target in ids[1..].iter() {
                    if let Some(blocks) = self.clusters.remove(&target) {
                        self.clusters.get_mut(&base).unwrap().extend(blocks);
                    }
                }
            }
            self.update();
        }
        self.fix_cluster_id();
    }

    /// Greedily merges connected clusters, heaviest edge first, as long as
    /// the merge neither introduces a cycle nor increases the total
    /// crossing weight, and the merged cluster stays within `max_size`.
    pub fn merge(&mut self, max_size: usize) -> Result<(), PlaceError> {
        loop {
            let old_cluster_size = self.clusters.len();
            for cluster in self.clusters.values() {
                if cluster.len() > max_size {
                    return Err(PlaceError::ClusterTooLarge(max_size));
                }
            }

            // candidate edges from heavy to light
            let mut edges: Vec<(u32, usize, usize)> = self
                .graph
                .edge_indices()
                .map(|e| {
                    let (a, b) = self.graph.edge_endpoints(e).unwrap();
                    (self.graph[e], self.graph[a], self.graph[b])
                })
                .collect();
            edges.sort_by_key(|&(w, from, to)| (std::cmp::Reverse(w), from, to));

            let total_weight_before = self.total_weight();
            for (_, from, to) in edges {
                if self.clusters[&from].len() + self.clusters[&to].len() > max_size {
                    continue;
                }
                // trial-merge on a copy, keep it only when it stays acyclic
                // and does not increase the crossing weight
                let mut trial = self.clone();
                trial.merge_into(from, to);
                if !trial.has_loop() && trial.total_weight() <= total_weight_before {
                    self.clusters = trial.clusters;
                    self.update();
                    break;
                }
            }
            if old_cluster_size == self.clusters.len() {
                break;
            }
        }
        self.fix_cluster_id();
        Ok(())
    }

    /// Moves individual blocks between clusters as long as each move
    /// reduces the total crossing weight and the receiving cluster stays
    /// below `max_partition_size` (0 meaning unbounded).
    pub fn optimize(&mut self, max_partition_size: usize) {
        let max_size = if max_partition_size == 0 { usize::MAX } else { max_partition_size };
        loop {
            let old_clusters = self.clusters.clone();

            let total_weights = self.total_weight();
            // blocks whose nets cross into some other cluster more than once
            let mut candidates: Vec<(String, BTreeMap<usize, u32>)> = Vec::new();
            for net in self.netlist.values() {
                let src_blk = &net[0];
                let src_id = match self.cluster_of(src_blk) {
                    Some(id) => id,
                    None => continue,
                };
                let mut targets: BTreeMap<usize, u32> = BTreeMap::new();
                for sink in net.iter().skip(1) {
                    if let Some(sink_id) = self.cluster_of(sink) {
                        if sink_id != src_id {
                            *targets.entry(sink_id).or_insert(0) += 1;
                        }
                    }
                }
                if targets.values().any(|&count| count > 1) {
                    candidates.push((src_blk.clone(), targets));
                }
            }
            candidates.sort_by_key(|(blk, targets)| {
                (std::cmp::Reverse(targets.values().sum::<u32>()), blk.clone())
            });

            for (blk, targets) in candidates {
                // move towards the cluster pulling at the block hardest
                let mut target = None;
                let mut max_count = 0;
                for (&id, &count) in targets.iter() {
                    if count > max_count {
                        max_count = count;
                        target = Some(id);
                    }
                }
                let target = match target {
                    Some(t) => t,
                    None => continue,
                };
                let mut trial = self.clusters.clone();
                for cluster in trial.values_mut() {
                    cluster.remove(&blk);
                }
                let target_cluster = trial.get_mut(&target).unwrap();
                target_cluster.insert(blk.clone());
                let target_size = target_cluster.len();
                let trial_graph = ClusterGraph::new(trial.clone(), self.netlist.clone());
                if trial_graph.total_weight() < total_weights && target_size < max_size {
                    self.clusters = trial;
                    self.update();
                }
            }

            if self.clusters == old_clusters {
                break;
            }
        }
    }

    fn cluster_of(&self, blk: &str) -> Option<usize> {
        self.clusters
            .iter()
            .find(|(_, cluster)| cluster.contains(blk))
            .map(|(&id, _)| id)
    }

    // renumber the clusters to 0..n in key order
    fn fix_cluster_id(&mut self) {
        let old = std::mem::take(&mut self.clusters);
        for (new_id, (_, cluster)) in old.into_iter().enumerate() {
            self.clusters.insert(new_id, cluster);
        }
        self.update();
    }
}
