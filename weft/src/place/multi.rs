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

//! # Multi-Place Driver
//!
//! Dispatches one [`DetailedPlacer`] per cluster onto a pool of worker
//! threads (one worker per cluster, bounded by the hardware concurrency),
//! anneals them independently, and unions the results. This is the only
//! parallel stage of the placer; the workers share no mutable state.

use super::detailed::DetailedPlacer;
use super::layout::Layout;
use super::types::PlaceError;
use super::util::{
    compute_centroids, get_cluster_fixed_pos, reduce_cluster_graph,
};
use crate::place::anneal::SimAnneal;

use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::thread;

// everything one worker needs, owned
struct PlaceTask {
    cluster: Vec<String>,
    netlist: BTreeMap<String, Vec<String>>,
    available_pos: BTreeMap<char, Vec<(i32, i32)>>,
    fixed_pos: BTreeMap<String, (i32, i32)>,
}

/// Anneals every cluster independently and in parallel, and returns the
/// union of the block positions. Dummy instances and the synthetic cluster
/// centre blocks (names starting with `'x'`) are filtered out.
pub fn multi_place(
    clusters: &BTreeMap<String, BTreeSet<String>>,
    cells: &BTreeMap<String, BTreeMap<char, BTreeSet<(i32, i32)>>>,
    netlists: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
    fixed_blocks: &BTreeMap<String, BTreeMap<String, (i32, i32)>>,
    fold_reg: bool,
    seed: u64,
) -> Result<BTreeMap<String, (i32, i32)>, PlaceError> {
    let num_clusters = clusters.len();
    let num_cpus = num_cpus::get().max(1).min(num_clusters.max(1));
    info!("placing {} clusters on {} threads", num_clusters, num_cpus);

    let mut tasks: Vec<PlaceTask> = Vec::with_capacity(num_clusters);
    for (cluster_id, cluster_set) in clusters.iter() {
        let available_pos_set = cells
            .get(cluster_id)
            .ok_or(PlaceError::InvariantViolation("cluster without assigned cells"))?;
        let available_pos = available_pos_set
            .iter()
            .map(|(&blk_type, pos)| (blk_type, pos.iter().copied().collect()))
            .collect();
        let netlist = netlists
            .get(cluster_id)
            .ok_or(PlaceError::InvariantViolation("cluster without netlist"))?
            .clone();
        let fixed_pos = fixed_blocks
            .get(cluster_id)
            .ok_or(PlaceError::InvariantViolation("cluster without fixed positions"))?
            .clone();
        tasks.push(PlaceTask {
            cluster: cluster_set.iter().cloned().collect(),
            netlist,
            available_pos,
            fixed_pos,
        });
    }

    let mut result = BTreeMap::new();
    // run the tasks in waves of one thread per cluster
    for wave in tasks.chunks(num_cpus) {
        let handles: Vec<_> = wave
            .iter()
            .map(|task| {
                let cluster = task.cluster.clone();
                let netlist = task.netlist.clone();
                let available_pos = task.available_pos.clone();
                let fixed_pos = task.fixed_pos.clone();
                thread::spawn(move || -> Result<BTreeMap<String, (i32, i32)>, PlaceError> {
                    let mut placer = DetailedPlacer::new(
                        &cluster,
                        &netlist,
                        &available_pos,
                        &fixed_pos,
                        fold_reg,
                    )?;
                    placer.set_seed(seed);
                    placer.anneal();
                    Ok(placer.realize())
                })
            })
            .collect();

        for handle in handles {
            let task_result = handle
                .join()
                .map_err(|_| PlaceError::InvariantViolation("detailed placer panicked"))??;
            for (name, pos) in task_result {
                // drop the synthetic cluster centres
                if !name.starts_with('x') {
                    result.insert(name, pos);
                }
            }
        }
    }
    Ok(result)
}

/// The cluster-parallel detailed placement stage: substitutes every foreign
/// cluster by its centroid, reduces the netlist per cluster, and runs
/// [`multi_place`] with register folding enabled.
pub fn detailed_placement(
    clusters: &BTreeMap<String, BTreeSet<String>>,
    netlist: &BTreeMap<String, Vec<String>>,
    fixed_pos: &BTreeMap<String, (i32, i32)>,
    gp_result: &BTreeMap<String, BTreeMap<char, BTreeSet<(i32, i32)>>>,
    layout: &Layout,
) -> Result<BTreeMap<String, (i32, i32)>, PlaceError> {
    let centroids = compute_centroids(gp_result, layout.get_clb_type());
    // the clusters around a cluster collapse into fixed centre blocks
    let cluster_fixed_pos = get_cluster_fixed_pos(fixed_pos, &centroids);

    let mut multi_netlists = BTreeMap::new();
    let mut multi_fixed_pos = BTreeMap::new();
    for cluster_id in clusters.keys() {
        let cluster_netlist =
            reduce_cluster_graph(netlist, clusters, &cluster_fixed_pos, cluster_id);
        multi_netlists.insert(cluster_id.clone(), cluster_netlist);
        multi_fixed_pos.insert(cluster_id.clone(), cluster_fixed_pos.clone());
    }

    multi_place(clusters, gp_result, &multi_netlists, &multi_fixed_pos, true, 0)
}
