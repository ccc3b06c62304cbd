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

//! Shared placement helpers: wire-length evaluation, register-net grouping
//! on name-keyed netlists, cluster bookkeeping and the placement verifier.

use super::layout::Layout;
use super::types::PlaceError;
use std::collections::{BTreeMap, BTreeSet};

/// A placed block (or a dummy filling an empty cell) inside the detailed
/// placer. Dummies carry the single-character name of their block type.
#[derive(Debug, Clone, Default)]
pub(crate) struct Instance {
    pub name: String,
    pub pos: (i32, i32),
    pub id: usize,
    pub nets: Vec<usize>,
}

impl Instance {
    pub(crate) fn new(name: &str, pos: (i32, i32), id: usize) -> Self {
        Self { name: name.to_string(), pos, id, nets: Vec::new() }
    }

    pub(crate) fn blk_type(&self) -> char {
        self.name.chars().next().unwrap_or(' ')
    }
}

/// A net as the detailed placer sees it: instance ids only.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlacerNet {
    pub net_id: String,
    pub instances: Vec<usize>,
}

/// Exact half-perimeter wire length of the given nets.
pub(crate) fn get_hpwl(netlist: &[PlacerNet], instances: &[Instance]) -> f64 {
    let mut hpwl = 0.0;
    for net in netlist.iter() {
        let mut xmin = i32::MAX;
        let mut xmax = i32::MIN;
        let mut ymin = i32::MAX;
        let mut ymax = i32::MIN;
        for &blk_id in net.instances.iter() {
            let pos = instances[blk_id].pos;
            xmin = xmin.min(pos.0);
            xmax = xmax.max(pos.0);
            ymin = ymin.min(pos.1);
            ymax = ymax.max(pos.1);
        }
        hpwl += ((xmax - xmin) + (ymax - ymin)) as f64;
    }
    hpwl
}

/// Overlap of the rectangles `(p1, p2)` and `(p3, p4)` along x and y; both
/// components are positive exactly when the rectangles intersect.
pub(crate) fn compute_overlap(
    p1: (i32, i32),
    p2: (i32, i32),
    p3: (i32, i32),
    p4: (i32, i32),
) -> (i32, i32) {
    let dx = p2.0.min(p4.0) - p1.0.max(p3.0);
    let dy = p2.1.min(p4.1) - p1.1.max(p3.1);
    (dx, dy)
}

fn squash_net(
    nets: &BTreeMap<String, Vec<String>>,
    src_id: &str,
    reg_srcs: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut result = vec![src_id.to_string()];
    if let Some(net) = nets.get(src_id) {
        for b_id in net.iter().skip(1) {
            if b_id.starts_with('r') {
                if let Some(next_id) = reg_srcs.get(b_id) {
                    result.extend(squash_net(nets, next_id, reg_srcs));
                }
            }
        }
    }
    result
}

/// Groups register-chained nets of a name-keyed netlist: the result maps
/// the net of each chain's ultimate (non-register) driver to the ordered
/// register nets hanging off it.
pub(crate) fn group_reg_nets(
    netlist: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Vec<String>>, PlaceError> {
    let mut linked_nets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut reg_srcs: BTreeMap<String, String> = BTreeMap::new();
    let mut reg_srcs_nets: BTreeSet<String> = BTreeSet::new();
    let mut resolved_net: BTreeSet<String> = BTreeSet::new();

    for (net_id, net) in netlist.iter() {
        if net[0].starts_with('r') {
            reg_srcs.insert(net[0].clone(), net_id.clone());
            reg_srcs_nets.insert(net_id.clone());
        }
    }

    for (reg_id, r_net_id) in reg_srcs.iter() {
        if resolved_net.contains(r_net_id) {
            continue;
        }
        // search for the ultimate source of the chain
        for (net_id, net) in netlist.iter() {
            if reg_srcs_nets.contains(net_id) {
                continue;
            }
            if net.iter().any(|blk_id| blk_id == reg_id) {
                // found it; squash to obtain the whole chain
                let merged_nets = squash_net(netlist, r_net_id, &reg_srcs);
                resolved_net.extend(merged_nets.iter().cloned());
                linked_nets.entry(net_id.clone()).or_default().extend(merged_nets);
            }
        }
    }

    if resolved_net.len() != reg_srcs_nets.len() {
        return Err(PlaceError::InvariantViolation("register chain could not be resolved"));
    }
    Ok(linked_nets)
}

/// Renames the raw clusters to `x0, x1, ...` and strips fixed blocks out of
/// them. Empty clusters disappear.
pub fn convert_clusters(
    clusters: &BTreeMap<usize, BTreeSet<String>>,
    fixed_pos: &BTreeMap<String, (i32, i32)>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut result = BTreeMap::new();
    for (&id, cluster) in clusters.iter() {
        let blocks: BTreeSet<String> =
            cluster.iter().filter(|blk| !fixed_pos.contains_key(*blk)).cloned().collect();
        if !blocks.is_empty() {
            result.insert(format!("x{}", id), blocks);
        }
    }
    result
}

/// Strips fixed blocks out of the raw clusters, keeping the integer ids.
pub fn filter_clusters(
    clusters: &BTreeMap<usize, BTreeSet<String>>,
    fixed_pos: &BTreeMap<String, (i32, i32)>,
) -> BTreeMap<usize, BTreeSet<String>> {
    let mut result = BTreeMap::new();
    for (&id, cluster) in clusters.iter() {
        let blocks: BTreeSet<String> =
            cluster.iter().filter(|blk| !fixed_pos.contains_key(*blk)).cloned().collect();
        if !blocks.is_empty() {
            result.insert(id, blocks);
        }
    }
    result
}

/// The centre of gravity of each cluster's claimed CLB cells, rounded to
/// the nearest cell.
pub fn compute_centroids(
    gp_result: &BTreeMap<String, BTreeMap<char, BTreeSet<(i32, i32)>>>,
    clb_type: char,
) -> BTreeMap<String, (i32, i32)> {
    let mut result = BTreeMap::new();
    for (cluster_id, cells) in gp_result.iter() {
        let clb_cells = match cells.get(&clb_type) {
            Some(cells) if !cells.is_empty() => cells,
            _ => continue,
        };
        let x_sum: i64 = clb_cells.iter().map(|&(x, _)| x as i64).sum();
        let y_sum: i64 = clb_cells.iter().map(|&(_, y)| y as i64).sum();
        let n = clb_cells.len() as f64;
        let cx = (x_sum as f64 / n).round() as i32;
        let cy = (y_sum as f64 / n).round() as i32;
        result.insert(cluster_id.clone(), (cx, cy));
    }
    result
}

/// Projects the global netlist onto one cluster: local blocks stay, blocks
/// of other clusters collapse into that cluster's synthetic centre block
/// (named like the cluster itself), fixed blocks stay under their own name.
/// Nets that do not touch the cluster are dropped.
pub fn reduce_cluster_graph(
    netlist: &BTreeMap<String, Vec<String>>,
    clusters: &BTreeMap<String, BTreeSet<String>>,
    fixed_blocks: &BTreeMap<String, (i32, i32)>,
    cluster_id: &str,
) -> BTreeMap<String, Vec<String>> {
    let local = &clusters[cluster_id];
    let mut result = BTreeMap::new();
    for (net_id, net) in netlist.iter() {
        let mut mapped: Vec<String> = Vec::with_capacity(net.len());
        let mut has_local = false;
        for blk in net.iter() {
            let name = if local.contains(blk) {
                has_local = true;
                blk.clone()
            } else if fixed_blocks.contains_key(blk) {
                blk.clone()
            } else {
                match clusters.iter().find(|(_, blocks)| blocks.contains(blk)) {
                    Some((id, _)) => id.clone(),
                    None => continue,
                }
            };
            if !mapped.contains(&name) {
                mapped.push(name);
            }
        }
        if has_local && mapped.len() > 1 {
            result.insert(net_id.clone(), mapped);
        }
    }
    result
}

/// Joins the user-fixed blocks with the cluster centroids into the fixed
/// positions a per-cluster detailed placer sees.
pub fn get_cluster_fixed_pos(
    fixed_blocks: &BTreeMap<String, (i32, i32)>,
    centroids: &BTreeMap<String, (i32, i32)>,
) -> BTreeMap<String, (i32, i32)> {
    let mut result = fixed_blocks.clone();
    for (id, &pos) in centroids.iter() {
        result.insert(id.clone(), pos);
    }
    result
}

/// Places the IO blocks (`i`/`I` prefixes) of a netlist onto the board's IO
/// layer, in numeric block order with the 1-bit `i` blocks first. Blocks
/// already present in `existing` keep their position.
pub fn place_io_blocks(
    netlist: &BTreeMap<String, Vec<String>>,
    layout: &Layout,
    existing: &BTreeMap<String, (i32, i32)>,
) -> Result<BTreeMap<String, (i32, i32)>, PlaceError> {
    let mut result = existing.clone();

    let mut working_set: BTreeSet<&String> = BTreeSet::new();
    for net in netlist.values() {
        for blk in net.iter() {
            if (blk.starts_with('i') || blk.starts_with('I')) && !result.contains_key(blk) {
                working_set.insert(blk);
            }
        }
    }

    // numeric order within each kind, 1-bit `i` blocks first
    let mut blocks: Vec<&String> = working_set.into_iter().collect();
    blocks.sort_by_key(|blk| blk[1..].parse::<u32>().unwrap_or(0));
    blocks.sort_by_key(|blk| !blk.starts_with('i'));

    let io_layer = layout.get_layer('I')?;
    let available_pos = io_layer.produce_available_pos();
    if available_pos.len() < blocks.len() {
        return Err(PlaceError::NotEnoughSpace {
            blk_type: 'I',
            available: available_pos.len(),
            needed: blocks.len(),
        });
    }
    for (blk_id, &pos) in blocks.into_iter().zip(available_pos.iter()) {
        result.insert(blk_id.clone(), pos);
    }
    Ok(result)
}

/// Verifies a finished placement: every block of the netlist must be
/// placed, and no legal position may be used more than once. IO blocks are
/// exempt from the position check.
pub fn check_placement(
    raw_netlist: &BTreeMap<String, Vec<(String, String)>>,
    placement: &BTreeMap<String, (i32, i32)>,
    layout: &Layout,
) -> Result<(), PlaceError> {
    // first make sure we have every block placed
    for net in raw_netlist.values() {
        for (blk, _) in net.iter() {
            if !placement.contains_key(blk) {
                return Err(PlaceError::MissingBlock(blk.clone()));
            }
        }
    }
    // then make sure the positions are legal and unique
    let mut pos_set: BTreeMap<char, BTreeSet<(i32, i32)>> = layout
        .produce_available_pos()
        .into_iter()
        .map(|(blk_type, pos_list)| (blk_type, pos_list.into_iter().collect()))
        .collect();
    for (blk_id, &pos) in placement.iter() {
        let blk_type = blk_id.chars().next().unwrap_or(' ');
        if blk_type == 'i' || blk_type == 'I' {
            continue;
        }
        let blk_pos = match pos_set.get_mut(&blk_type) {
            Some(set) => set,
            None => return Err(PlaceError::UnknownLayer(blk_type)),
        };
        if !blk_pos.remove(&pos) {
            return Err(PlaceError::OverusedPosition(pos.0, pos.1));
        }
    }
    Ok(())
}
