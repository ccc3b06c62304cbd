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

use crate::place::partition::{partition_netlist, partition_netlist_seeded, ClusterGraph};
use maplit::btreemap;
use std::collections::{BTreeMap, BTreeSet};

fn net(blocks: &[&str]) -> Vec<String> {
    blocks.iter().map(|b| b.to_string()).collect()
}

// two tightly knit groups of blocks with a single link between them
fn two_communities() -> BTreeMap<String, Vec<String>> {
    btreemap! {
        "n0".to_string() => net(&["p0", "p1", "p2"]),
        "n1".to_string() => net(&["p1", "p2"]),
        "n2".to_string() => net(&["p2", "p0"]),
        "n3".to_string() => net(&["p3", "p4", "p5"]),
        "n4".to_string() => net(&["p4", "p5"]),
        "n5".to_string() => net(&["p5", "p3"]),
        "n6".to_string() => net(&["p0", "p3"]),
    }
}

#[test]
fn partition_is_deterministic() {
    let netlist = two_communities();
    let a = partition_netlist(&netlist);
    let b = partition_netlist(&netlist);
    assert_eq!(a, b);

    // and covers every block exactly once
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for cluster in a.values() {
        for blk in cluster.iter() {
            assert!(seen.insert(blk.clone()));
        }
    }
    assert_eq!(seen.len(), 6);
}

#[test]
fn partition_separates_communities() {
    let netlist = two_communities();
    let clusters = partition_netlist_seeded(&netlist, 15, 0);
    // p0..p2 and p3..p5 are denser inside than across
    let find = |blk: &str| {
        clusters
            .iter()
            .find(|(_, c)| c.contains(blk))
            .map(|(&id, _)| id)
            .unwrap()
    };
    assert_eq!(find("p0"), find("p1"));
    assert_eq!(find("p0"), find("p2"));
    assert_eq!(find("p3"), find("p4"));
    assert_eq!(find("p3"), find("p5"));
    assert_ne!(find("p0"), find("p3"));
}

fn chain_clusters() -> (BTreeMap<usize, BTreeSet<String>>, BTreeMap<String, Vec<String>>) {
    let clusters = btreemap! {
        0 => net(&["a0", "a1"]).into_iter().collect::<BTreeSet<_>>(),
        1 => net(&["b0", "b1"]).into_iter().collect(),
        2 => net(&["c0", "c1"]).into_iter().collect(),
    };
    let netlist = btreemap! {
        "n0".to_string() => net(&["a0", "b0"]),
        "n1".to_string() => net(&["b1", "c0"]),
        "n2".to_string() => net(&["a1", "c1"]),
    };
    (clusters, netlist)
}

#[test]
fn cluster_graph_toposort() {
    let (clusters, netlist) = chain_clusters();
    let graph = ClusterGraph::new(clusters, netlist);
    assert!(!graph.has_loop());
    assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
    assert_eq!(graph.total_weight(), 3);
}

#[test]
fn cluster_graph_merges_loops() {
    let (clusters, mut netlist) = chain_clusters();
    // a back edge c -> a closes the cycle
    netlist.insert("n3".to_string(), net(&["c0", "a0"]));
    let mut graph = ClusterGraph::new(clusters, netlist);
    assert!(graph.has_loop());

    graph.merge_loops();
    assert!(!graph.has_loop());
    // the whole cycle collapsed into one cluster
    assert_eq!(graph.clusters().len(), 1);
    assert_eq!(graph.clusters()[&0].len(), 6);
}

#[test]
fn cluster_graph_merge_respects_max_size() {
    let (clusters, netlist) = chain_clusters();
    let mut graph = ClusterGraph::new(clusters, netlist);
    graph.merge(4).unwrap();
    for cluster in graph.clusters().values() {
        assert!(cluster.len() <= 4);
    }
    // merging may not introduce a loop
    assert!(!graph.has_loop());
}

#[test]
fn cluster_graph_optimize_reduces_crossings() {
    // a block placed in the wrong cluster: both of its sinks live across
    let clusters = btreemap! {
        0 => net(&["a0", "a1", "stray"]).into_iter().collect::<BTreeSet<_>>(),
        1 => net(&["b0", "b1"]).into_iter().collect(),
    };
    let netlist = btreemap! {
        "n0".to_string() => net(&["stray", "b0", "b1"]),
        "n1".to_string() => net(&["a0", "a1"]),
    };
    let mut graph = ClusterGraph::new(clusters, netlist);
    let before = graph.total_weight();
    graph.optimize(0);
    assert!(graph.total_weight() < before);
    assert!(graph.clusters()[&1].contains("stray"));
}
