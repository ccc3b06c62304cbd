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

//! # Detailed Placer
//!
//! Places the individual blocks of one cluster onto the cells the cluster
//! owns. Every empty cell is filled with a *dummy* instance (named by its
//! single-character block type), so that a move is always a swap of two
//! same-type instances. The energy is the exact bounding-box wire length,
//! updated incrementally by restricting the recomputation to the nets
//! touched by the move.
//!
//! The adaptive annealing schedule calibrates its starting temperature by
//! sampling random moves, and shrinks the swap window (`d_limit`) as the
//! acceptance ratio drops, in the VPR fashion.
//!
//! With *register folding* enabled, registers are placed on their own cell
//! range and a legalisation pass keeps every driving register off the tiles
//! of its downstream sinks.

use super::anneal::{downhill_refine, SimAnneal};
use super::types::PlaceError;
use super::util::{get_hpwl, group_reg_nets, Instance, PlacerNet};

use log::*;
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// The block-type character of registers.
pub(crate) const REG_BLK_TYPE: char = 'r';

// one half of a pending swap
#[derive(Debug, Clone, Copy)]
struct DetailedMove {
    blk_id: usize,
    new_pos: (i32, i32),
}

/// The intra-cluster annealer.
#[derive(Debug, Clone)]
pub struct DetailedPlacer {
    instances: Vec<Instance>,
    netlist: Vec<PlacerNet>,
    // the movable (non-fixed) instances
    instance_ids: Vec<usize>,
    moves: Vec<DetailedMove>,
    // per block type, the inclusive index range of its instances (dummies
    // included)
    instance_type_index: BTreeMap<char, (usize, usize)>,
    fold_reg: bool,
    // instance -> instances that must not share its tile
    reg_no_pos: BTreeMap<usize, BTreeSet<usize>>,
    // (block type, position) -> instance
    loc_instances: BTreeMap<char, BTreeMap<(i32, i32), usize>>,
    rng: StdRng,

    curr_energy: f64,
    d_limit: f64,
    max_dim: i32,
    num_blocks: usize,
    num_swap: usize,
    tmax: f64,
    tmin: f64,
}

impl DetailedPlacer {
    /// Creates a placer for `cluster_blocks` over the cluster's available
    /// cells, assigning an arbitrary (but deterministic) initial position
    /// per block.
    pub fn new(
        cluster_blocks: &[String],
        netlist: &BTreeMap<String, Vec<String>>,
        available_pos: &BTreeMap<char, Vec<(i32, i32)>>,
        fixed_pos: &BTreeMap<String, (i32, i32)>,
        fold_reg: bool,
    ) -> Result<Self, PlaceError> {
        let mut placer = Self::empty(cluster_blocks, fold_reg);
        let mut pool = available_pos.clone();

        let mut blk_id_dict: BTreeMap<String, usize> = BTreeMap::new();
        placer.create_fixed_pos(fixed_pos, &mut blk_id_dict);
        placer.init_place_regular(cluster_blocks, &mut blk_id_dict, &mut pool)?;
        placer.init_place_reg(cluster_blocks, &mut pool, &mut blk_id_dict);
        placer.compute_reg_no_pos(cluster_blocks, netlist, &blk_id_dict)?;
        placer.legalize_reg()?;
        placer.process_netlist(netlist, &blk_id_dict)?;

        placer.finish_setup(available_pos);
        Ok(placer)
    }

    /// Creates a placer that starts from an existing placement (used for
    /// the board-wide refinement pass).
    pub fn with_placement(
        init_placement: &BTreeMap<String, (i32, i32)>,
        netlist: &BTreeMap<String, Vec<String>>,
        available_pos: &BTreeMap<char, Vec<(i32, i32)>>,
        fixed_pos: &BTreeMap<String, (i32, i32)>,
        fold_reg: bool,
    ) -> Result<Self, PlaceError> {
        let cluster_blocks: Vec<String> = init_placement
            .keys()
            .filter(|blk| !fixed_pos.contains_key(*blk))
            .cloned()
            .collect();
        let mut placer = Self::empty(&cluster_blocks, fold_reg);

        let mut blk_id_dict: BTreeMap<String, usize> = BTreeMap::new();
        placer.create_fixed_pos(fixed_pos, &mut blk_id_dict);
        placer.copy_init_placement(
            init_placement,
            available_pos,
            &cluster_blocks,
            &mut blk_id_dict,
        )?;
        placer.compute_reg_no_pos(&cluster_blocks, netlist, &blk_id_dict)?;
        placer.process_netlist(netlist, &blk_id_dict)?;

        placer.finish_setup(available_pos);
        Ok(placer)
    }

    fn empty(cluster_blocks: &[String], fold_reg: bool) -> Self {
        // folding only matters when the cluster actually has registers
        let fold_reg =
            fold_reg && cluster_blocks.iter().any(|blk| blk.starts_with(REG_BLK_TYPE));
        Self {
            instances: Vec::new(),
            netlist: Vec::new(),
            instance_ids: Vec::new(),
            moves: Vec::new(),
            instance_type_index: BTreeMap::new(),
            fold_reg,
            reg_no_pos: BTreeMap::new(),
            loc_instances: BTreeMap::new(),
            rng: StdRng::seed_from_u64(0),
            curr_energy: 0.0,
            d_limit: 0.0,
            max_dim: 0,
            num_blocks: 0,
            num_swap: 0,
            tmax: 0.0,
            tmin: 0.0,
        }
    }

    fn finish_setup(&mut self, available_pos: &BTreeMap<char, Vec<(i32, i32)>>) {
        self.curr_energy = get_hpwl(&self.netlist, &self.instances);
        // index to loc
        for instance in self.instances.iter() {
            self.loc_instances
                .entry(instance.blk_type())
                .or_insert_with(BTreeMap::new)
                .insert(instance.pos, instance.id);
        }
        // the swap window starts at the whole board
        let mut xmax = 0;
        let mut ymax = 0;
        for positions in available_pos.values() {
            for &(x, y) in positions.iter() {
                xmax = xmax.max(x);
                ymax = ymax.max(y);
            }
        }
        self.max_dim = xmax.max(ymax);
        self.d_limit = self.max_dim as f64;
        self.num_blocks = self.instance_ids.len();
    }

    /// Re-seeds the internal random number generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// The wire length of the current state.
    pub fn hpwl(&self) -> f64 {
        self.curr_energy
    }

    fn create_fixed_pos(
        &mut self,
        fixed_pos: &BTreeMap<String, (i32, i32)>,
        blk_id_dict: &mut BTreeMap<String, usize>,
    ) {
        for (name, &pos) in fixed_pos.iter() {
            let instance = Instance::new(name, pos, self.instances.len());
            blk_id_dict.insert(name.clone(), instance.id);
            self.instances.push(instance);
        }
    }

    // group the blocks by type and compute how many cells stay empty
    fn compute_blk_pos(
        cluster_blocks: &[String],
        available_pos: &BTreeMap<char, Vec<(i32, i32)>>,
    ) -> Result<(BTreeMap<char, Vec<String>>, BTreeMap<char, usize>), PlaceError> {
        let mut blk_counts: BTreeMap<char, Vec<String>> = BTreeMap::new();
        for blk_name in cluster_blocks.iter() {
            let blk_type = blk_name.chars().next().unwrap_or(' ');
            blk_counts.entry(blk_type).or_default().push(blk_name.clone());
        }

        let mut empty_spaces: BTreeMap<char, usize> = BTreeMap::new();
        for (&blk_type, blocks) in blk_counts.iter() {
            let available = available_pos.get(&blk_type).map(|p| p.len()).unwrap_or(0);
            if available < blocks.len() {
                return Err(PlaceError::NotEnoughSpace {
                    blk_type,
                    available,
                    needed: blocks.len(),
                });
            }
            empty_spaces.insert(blk_type, available - blocks.len());
        }
        Ok((blk_counts, empty_spaces))
    }

    fn init_place_regular(
        &mut self,
        cluster_blocks: &[String],
        blk_id_dict: &mut BTreeMap<String, usize>,
        available_pos: &mut BTreeMap<char, Vec<(i32, i32)>>,
    ) -> Result<(), PlaceError> {
        let (blk_counts, empty_spaces) = Self::compute_blk_pos(cluster_blocks, available_pos)?;

        for (&blk_type, blocks) in blk_counts.iter() {
            // registers are placed separately when folding
            if self.fold_reg && blk_type == REG_BLK_TYPE {
                continue;
            }
            let start_index = self.instances.len();
            let positions = available_pos.get_mut(&blk_type).unwrap();
            for blk_name in blocks.iter() {
                let pos = positions.pop().unwrap();
                let instance = Instance::new(blk_name, pos, self.instances.len());
                blk_id_dict.insert(blk_name.clone(), instance.id);
                self.instance_ids.push(instance.id);
                self.instances.push(instance);
            }
            // fill the leftover cells with dummies
            for _ in 0..empty_spaces[&blk_type] {
                let pos = positions.pop().unwrap();
                let instance =
                    Instance::new(&blk_type.to_string(), pos, self.instances.len());
                self.instances.push(instance);
            }
            let end_index = self.instances.len() - 1;
            self.instance_type_index.insert(blk_type, (start_index, end_index));
        }
        Ok(())
    }

    fn init_place_reg(
        &mut self,
        cluster_blocks: &[String],
        available_pos: &mut BTreeMap<char, Vec<(i32, i32)>>,
        blk_id_dict: &mut BTreeMap<String, usize>,
    ) {
        if !self.fold_reg {
            return;
        }
        let start_index = self.instances.len();
        let positions = available_pos.get(&REG_BLK_TYPE).cloned().unwrap_or_default();

        let mut reg_count = 0;
        for instance_name in cluster_blocks.iter() {
            if !instance_name.starts_with(REG_BLK_TYPE) {
                continue;
            }
            let pos = positions[reg_count];
            reg_count += 1;
            let instance = Instance::new(instance_name, pos, self.instances.len());
            self.instance_ids.push(instance.id);
            blk_id_dict.insert(instance_name.clone(), instance.id);
            self.instances.push(instance);
        }
        // dummy registers on the remaining cells
        for &pos in positions[reg_count..].iter() {
            let instance = Instance::new("r", pos, self.instances.len());
            self.instances.push(instance);
        }
        let end_index = self.instances.len() - 1;
        self.instance_type_index.insert(REG_BLK_TYPE, (start_index, end_index));
    }

    fn copy_init_placement(
        &mut self,
        init_placement: &BTreeMap<String, (i32, i32)>,
        available_pos: &BTreeMap<char, Vec<(i32, i32)>>,
        cluster_blocks: &[String],
        blk_id_dict: &mut BTreeMap<String, usize>,
    ) -> Result<(), PlaceError> {
        let (blk_counts, empty_spaces) = Self::compute_blk_pos(cluster_blocks, available_pos)?;

        for (&blk_type, blocks) in blk_counts.iter() {
            let start_index = self.instances.len();
            let mut working_set: BTreeSet<(i32, i32)> =
                available_pos.get(&blk_type).map(|p| p.iter().copied().collect()).unwrap_or_default();
            for blk_name in blocks.iter() {
                let pos = init_placement[blk_name];
                if !working_set.remove(&pos) {
                    return Err(PlaceError::OverusedPosition(pos.0, pos.1));
                }
                let instance = Instance::new(blk_name, pos, self.instances.len());
                blk_id_dict.insert(blk_name.clone(), instance.id);
                self.instance_ids.push(instance.id);
                self.instances.push(instance);
            }
            for _ in 0..empty_spaces[&blk_type] {
                let pos = *working_set.iter().next().unwrap();
                working_set.remove(&pos);
                let instance =
                    Instance::new(&blk_type.to_string(), pos, self.instances.len());
                self.instances.push(instance);
            }
            if !working_set.is_empty() {
                return Err(PlaceError::InvariantViolation("working set not empty"));
            }
            let end_index = self.instances.len() - 1;
            self.instance_type_index.insert(blk_type, (start_index, end_index));
        }
        Ok(())
    }

    // derive, per register (and per block driven by registers), the set of
    // instances it must never share a tile with
    fn compute_reg_no_pos(
        &mut self,
        cluster_blocks: &[String],
        nets: &BTreeMap<String, Vec<String>>,
        blk_id_dict: &BTreeMap<String, usize>,
    ) -> Result<(), PlaceError> {
        if !self.fold_reg {
            return Ok(());
        }
        let local: BTreeSet<&String> = cluster_blocks.iter().collect();
        let linked_net = group_reg_nets(nets)?;
        for (net_id, linked) in linked_net.iter() {
            let mut net: Vec<String> = nets.get(net_id).cloned().unwrap_or_default();
            for reg_net_id in linked.iter() {
                if let Some(reg_net) = nets.get(reg_net_id) {
                    net.extend(reg_net.iter().cloned());
                }
            }

            for blk in net.iter() {
                if !local.contains(blk) {
                    continue;
                }
                let blk_id = *blk_id_dict
                    .get(blk)
                    .ok_or_else(|| PlaceError::UnknownBlock(blk.clone()))?;
                let entry = self.reg_no_pos.entry(blk_id).or_default();
                if blk.starts_with(REG_BLK_TYPE) {
                    // a register must keep clear of the blocks it connects
                    for bb in net.iter() {
                        if !bb.starts_with(REG_BLK_TYPE) {
                            if let Some(&id) = blk_id_dict.get(bb) {
                                entry.insert(id);
                            }
                        }
                    }
                } else {
                    // and vice versa
                    for bb in net.iter() {
                        if bb.starts_with(REG_BLK_TYPE) {
                            if let Some(&id) = blk_id_dict.get(bb) {
                                entry.insert(id);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // move every driving register onto a cell that none of its sinks uses
    fn legalize_reg(&mut self) -> Result<(), PlaceError> {
        if !self.fold_reg {
            return Ok(());
        }
        let mut available_pos: BTreeSet<(i32, i32)> = BTreeSet::new();
        let mut working_set: Vec<usize> = Vec::new();
        for instance in self.instances.iter() {
            if instance.blk_type() == REG_BLK_TYPE {
                available_pos.insert(instance.pos);
                working_set.push(instance.id);
            }
        }

        let mut finished: BTreeSet<usize> = BTreeSet::new();
        for &id in working_set.iter() {
            let forbidden = match self.reg_no_pos.get(&id) {
                Some(set) => set.clone(),
                None => continue,
            };
            let mut found = None;
            for &pos in available_pos.iter() {
                if forbidden.iter().all(|&blk_id| self.instances[blk_id].pos != pos) {
                    found = Some(pos);
                    break;
                }
            }
            match found {
                Some(pos) => {
                    self.instances[id].pos = pos;
                    finished.insert(id);
                    available_pos.remove(&pos);
                }
                None => return Err(PlaceError::NoPosition(self.instances[id].name.clone())),
            }
        }

        // the rest take whatever is left
        for &id in working_set.iter() {
            if finished.contains(&id) {
                continue;
            }
            let pos = *available_pos
                .iter()
                .next()
                .ok_or(PlaceError::InvariantViolation("ran out of register cells"))?;
            self.instances[id].pos = pos;
            available_pos.remove(&pos);
        }
        Ok(())
    }

    fn process_netlist(
        &mut self,
        netlist: &BTreeMap<String, Vec<String>>,
        blk_id_dict: &BTreeMap<String, usize>,
    ) -> Result<(), PlaceError> {
        for (net_id, blocks) in netlist.iter() {
            let net_index = self.netlist.len();
            let mut net = PlacerNet { net_id: net_id.clone(), instances: Vec::new() };
            for blk in blocks.iter() {
                let blk_id = *blk_id_dict
                    .get(blk)
                    .ok_or_else(|| PlaceError::UnknownBlock(blk.clone()))?;
                net.instances.push(blk_id);
                self.instances[blk_id].nets.push(net_index);
            }
            self.netlist.push(net);
        }
        Ok(())
    }

    // whether the instance may legally move to the given tile
    fn is_reg_net(&self, instance: usize, next_pos: (i32, i32)) -> bool {
        if let Some(forbidden) = self.reg_no_pos.get(&instance) {
            for &id in forbidden.iter() {
                if self.instances[id].pos == next_pos {
                    return false;
                }
            }
        }
        true
    }

    // derive tmax by sampling random moves, and the swap budget per
    // temperature from the block count
    fn sa_setup(&mut self) {
        if self.num_swap != 0 {
            return;
        }
        let num_blocks = self.num_blocks.max(1);
        let mut diff_e = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            self.moves.clear();
            self.propose();
            diff_e.push(self.energy());
        }
        let mean: f64 = diff_e.iter().sum::<f64>() / num_blocks as f64;
        let diff_sum: f64 = diff_e.iter().map(|e| (e - mean) * (e - mean)).sum();
        self.tmax = (diff_sum / (num_blocks + 1) as f64).sqrt() * 20.0;
        self.num_swap = (10.0 * (num_blocks as f64).powf(1.33)) as usize;
        self.tmin = 0.005 * self.curr_energy / self.netlist.len().max(1) as f64;

        // very rare, but seen on tiny clusters
        if self.tmax <= self.tmin {
            warn!("Unable to determine tmax. Use default temperature");
            self.tmax = 3000.0;
        }
    }

    /// Runs the downhill refinement with a narrowed swap window.
    pub fn refine(&mut self, num_iter: usize, threshold: f64) {
        self.d_limit = (self.max_dim as f64).sqrt() * 2.0;
        downhill_refine(self, num_iter, threshold);
    }

    /// The final positions of the real blocks (dummies are dropped).
    pub fn realize(&self) -> BTreeMap<String, (i32, i32)> {
        let mut result = BTreeMap::new();
        for instance in self.instances.iter() {
            if instance.name.len() > 1 {
                result.insert(instance.name.clone(), instance.pos);
            }
        }
        result
    }
}

impl SimAnneal for DetailedPlacer {
    /// Proposes swapping a random movable instance with another instance of
    /// the same block type: sampled uniformly over the type's whole range
    /// while the swap window covers the board, otherwise looked up around
    /// the instance within an L-infinity box of radius `d_limit / 2`.
    fn propose(&mut self) {
        self.moves.clear();
        if self.instance_ids.is_empty() {
            return;
        }
        let pick = self.rng.gen_range(0, self.instance_ids.len());
        let curr_ins = self.instances[self.instance_ids[pick]].clone();
        let blk_type = curr_ins.blk_type();

        let next_ins = if self.d_limit >= self.max_dim as f64 {
            let &(start_index, end_index) = match self.instance_type_index.get(&blk_type) {
                Some(range) => range,
                None => return,
            };
            let index = self.rng.gen_range(start_index, end_index + 1);
            self.instances[index].clone()
        } else {
            let r = ((self.d_limit / 2.0) as i32).max(1);
            let x_start = (curr_ins.pos.0 - r).max(0).min(self.max_dim);
            let x_end = (curr_ins.pos.0 + r).max(0).min(self.max_dim);
            let y_start = (curr_ins.pos.1 - r).max(0).min(self.max_dim);
            let y_end = (curr_ins.pos.1 + r).max(0).min(self.max_dim);
            let next_x = self.rng.gen_range(x_start, x_end + 1);
            let next_y = self.rng.gen_range(y_start, y_end + 1);
            let id = match self
                .loc_instances
                .get(&blk_type)
                .and_then(|locs| locs.get(&(next_x, next_y)))
            {
                Some(&id) => id,
                None => return,
            };
            self.instances[id].clone()
        };

        if curr_ins.name == next_ins.name {
            return;
        }

        if self.fold_reg
            && (!self.is_reg_net(curr_ins.id, next_ins.pos)
                || !self.is_reg_net(next_ins.id, curr_ins.pos))
        {
            return;
        }

        self.moves.push(DetailedMove { blk_id: curr_ins.id, new_pos: next_ins.pos });
        self.moves.push(DetailedMove { blk_id: next_ins.id, new_pos: curr_ins.pos });
    }

    /// The energy of the pending swap, obtained incrementally from the nets
    /// the two instances touch.
    fn energy(&mut self) -> f64 {
        if self.moves.is_empty() {
            return self.curr_energy;
        }
        let mut changed_net: BTreeSet<usize> = BTreeSet::new();
        let mut original: BTreeMap<usize, (i32, i32)> = BTreeMap::new();
        for mv in self.moves.iter() {
            original.insert(mv.blk_id, self.instances[mv.blk_id].pos);
            changed_net.extend(self.instances[mv.blk_id].nets.iter().copied());
        }
        let nets: Vec<PlacerNet> =
            changed_net.iter().map(|&net_id| self.netlist[net_id].clone()).collect();
        let old_hpwl = get_hpwl(&nets, &self.instances);

        for mv in self.moves.iter() {
            self.instances[mv.blk_id].pos = mv.new_pos;
        }
        let new_hpwl = get_hpwl(&nets, &self.instances);

        // revert
        for (&blk_id, &pos) in original.iter() {
            self.instances[blk_id].pos = pos;
        }

        self.curr_energy + (new_hpwl - old_hpwl)
    }

    fn commit(&mut self) {
        let moves = std::mem::take(&mut self.moves);
        for mv in moves.iter() {
            let blk_type = self.instances[mv.blk_id].blk_type();
            self.loc_instances
                .get_mut(&blk_type)
                .expect("swap within an unindexed block type")
                .insert(mv.new_pos, mv.blk_id);
            self.instances[mv.blk_id].pos = mv.new_pos;
        }
        self.moves = moves;
    }

    fn init_energy(&mut self) -> f64 {
        get_hpwl(&self.netlist, &self.instances)
    }

    fn curr_energy(&self) -> f64 {
        self.curr_energy
    }

    fn set_curr_energy(&mut self, energy: f64) {
        self.curr_energy = energy;
    }

    fn rand_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    fn steps(&self) -> usize {
        self.num_swap
    }

    fn tmax(&self) -> f64 {
        self.tmax
    }

    fn tmin(&self) -> f64 {
        self.tmin
    }

    /// The adaptive schedule: the temperature multiplier follows the
    /// piecewise rule (halve at `tmax`, then 0.9 down to `0.1 tmax`, 0.95
    /// down to `0.0001 tmax`, 0.8 until `tmin`), and the swap window
    /// shrinks with the acceptance ratio.
    fn anneal(&mut self) {
        self.sa_setup();
        let mut temp = self.tmax;
        while temp >= self.tmin {
            let mut accept = 0usize;
            for _ in 0..self.num_swap {
                self.propose();
                let new_energy = self.energy();
                let de = new_energy - self.curr_energy;
                if de == 0.0 {
                    continue;
                }
                if de > 0.0 && (-de / temp).exp() < self.rng.gen::<f64>() {
                    continue;
                }
                self.commit();
                self.curr_energy = new_energy;
                accept += 1;
            }

            if temp == self.tmax {
                temp /= 2.0;
            } else if temp >= self.tmax * 0.1 {
                temp *= 0.9;
            } else if temp >= self.tmax * 0.0001 {
                temp *= 0.95;
            } else {
                temp *= 0.8;
            }

            let r_accept = accept as f64 / self.num_swap.max(1) as f64;
            self.d_limit =
                (self.d_limit * (1.0 - 0.44 + r_accept)).max(1.0).min(self.max_dim as f64);
            trace!("T: {} wirelength: {} r_accept: {}", temp, self.curr_energy, r_accept);
        }
    }
}
