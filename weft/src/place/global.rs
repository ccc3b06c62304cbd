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

//! # Global Placer
//!
//! Places every cluster as a rectangle on the *reduced* board (the board
//! with all non-CLB columns hidden). The continuous objective
//!
//! ```text
//! F = hpwl_param * HPWL + potential_param * OVERLAP
//!   + legal_param * LEGAL + aspect_param * ASPECT
//! ```
//!
//! blends the star-model wire length, a pairwise overlap potential, a
//! smooth special-block legality penalty (cubic splines over the hidden
//! column positions) and a Gaussian force pulling boxes towards the middle
//! of the board's longer dimension. It is minimised by Polak-Ribiere
//! conjugate gradients with a heuristic step size, then refined by
//! simulated annealing over discrete box moves, and finally *realised* into
//! concrete CLB and special-block cells per cluster.

use super::anneal::{exponential_anneal, SimAnneal};
use super::layout::{Layout, EMPTY_BLK};
use super::spline::Spline;
use super::types::PlaceError;
use super::util::compute_overlap;

use log::*;
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

// block types that never participate in global placement
const IO_BLK: [char; 2] = ['i', 'I'];

/// A cluster as a rectangle on the reduced board. The centroid `(cx, cy)`
/// is the continuous optimisation variable; `(xmin, ymin, xmax, ymax)` are
/// kept integral between iterations by the legalisation passes.
#[derive(Debug, Clone, Default)]
pub struct ClusterBox {
    /// left edge
    pub xmin: f64,
    /// right edge
    pub xmax: f64,
    /// top edge
    pub ymin: f64,
    /// bottom edge
    pub ymax: f64,
    /// centroid x
    pub cx: f64,
    /// centroid y
    pub cy: f64,
    /// the cluster id this box stands for
    pub id: String,
    /// index of the box in the placer
    pub index: usize,
    /// number of primary-CLB blocks inside the cluster
    pub clb_size: usize,
    /// current width
    pub width: i32,
    /// current height
    pub height: i32,
    /// fixed boxes never move
    pub fixed: bool,
    /// indices of the collapsed nets this box participates in
    pub nets: BTreeSet<usize>,
}

// a pending annealing move on one or two boxes
#[derive(Debug, Clone, Default)]
struct ClusterMove {
    box1: Option<ClusterBox>,
    box2: Option<ClusterBox>,
}

/// The cluster-level analytical + annealing placer.
#[derive(Debug, Clone)]
pub struct GlobalPlacer {
    clb_type: char,
    clusters: BTreeMap<String, BTreeSet<String>>,
    // the raw name-keyed nets, consumed while collapsing
    raw_netlists: Vec<Vec<String>>,
    // collapsed netlist: every net is a set of box indices
    netlists: Vec<Vec<usize>>,
    fixed_pos: BTreeMap<String, (i32, i32)>,
    board_layout: Layout,
    reduced_layout: Vec<Vec<char>>,
    boxes: Vec<ClusterBox>,
    legal_spline: Vec<BTreeMap<char, Spline>>,
    column_mapping: BTreeMap<u32, u32>,
    box_special_blocks: BTreeMap<String, BTreeMap<char, usize>>,
    intra_count: BTreeMap<String, u32>,
    rng: StdRng,
    clb_types: BTreeSet<char>,

    reduced_width: u32,
    reduced_height: u32,
    aspect_ratio: f64,
    hidden_columns: BTreeMap<char, Vec<f64>>,
    gaussian_table: Vec<f64>,
    gaussian_sigma_2: f64,

    // CG parameters
    hpwl_param: f64,
    potential_param: f64,
    legal_param: f64,
    aspect_param: f64,

    // annealing parameters
    anneal_param: f64,
    /// external multiplier on the annealing overlap weight, typically
    /// derived from the board fill ratio
    pub anneal_param_factor: f64,
    current_move: ClusterMove,

    clb_margin: u32,

    curr_energy: f64,
    steps: usize,
    tmax: f64,
    tmin: f64,
}

impl GlobalPlacer {
    /// Creates the placer from the clusters, the netlist (net id -> block
    /// list), the fixed block positions and the board layout.
    pub fn new(
        clusters: BTreeMap<String, BTreeSet<String>>,
        netlists: BTreeMap<String, Vec<String>>,
        fixed_pos: BTreeMap<String, (i32, i32)>,
        board_layout: &Layout,
    ) -> Result<Self, PlaceError> {
        let mut placer = Self {
            clb_type: board_layout.get_clb_type(),
            clusters,
            raw_netlists: netlists.values().cloned().collect(),
            netlists: Vec::new(),
            fixed_pos,
            board_layout: board_layout.clone(),
            reduced_layout: Vec::new(),
            boxes: Vec::new(),
            legal_spline: Vec::new(),
            column_mapping: BTreeMap::new(),
            box_special_blocks: BTreeMap::new(),
            intra_count: BTreeMap::new(),
            rng: StdRng::seed_from_u64(0),
            clb_types: BTreeSet::new(),
            reduced_width: 0,
            reduced_height: 0,
            aspect_ratio: 0.0,
            hidden_columns: BTreeMap::new(),
            gaussian_table: Vec::new(),
            gaussian_sigma_2: 1.0,
            hpwl_param: 0.05,
            potential_param: 0.05,
            legal_param: 0.05,
            aspect_param: 1.0,
            anneal_param: 1.0,
            anneal_param_factor: 1.0,
            current_move: ClusterMove::default(),
            clb_margin: 1,
            curr_energy: 0.0,
            steps: 0,
            tmax: 6.0,
            tmin: 3.0,
        };

        placer.get_clb_types();
        placer.setup_reduced_layout()?;
        placer.create_fixed_boxes();
        placer.create_boxes();
        placer.collapse_netlist()?;
        placer.init_place();

        placer.steps = ((placer.clusters.len() * placer.netlists.len()) as f64)
            .powf(1.8)
            .round() as usize;
        Ok(placer)
    }

    /// Re-seeds the internal random number generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    // every block type sharing the primary type's major priority counts as
    // a CLB for sizing purposes
    fn get_clb_types(&mut self) {
        let priority_major = self.board_layout.get_priority_major(self.clb_type);
        for blk_type in self.board_layout.get_layer_types() {
            if self.board_layout.get_priority_major(blk_type) == priority_major {
                self.clb_types.insert(blk_type);
            }
        }
    }

    // hide every column owned by a non-CLB, non-empty type; keep a mapping
    // from reduced to original columns and remember the centres of the
    // hidden ones per block type
    fn setup_reduced_layout(&mut self) -> Result<(), PlaceError> {
        let (layout_width, layout_height) = self.board_layout.get_size();
        let margin = self.clb_margin;

        for y in margin..layout_height - margin {
            let mut row = Vec::new();
            let mut new_x = 0u32;
            for x in margin..layout_width - margin {
                let blk_type = self.board_layout.get_blk_type(x, y);
                if !self.clb_types.contains(&blk_type) && blk_type != EMPTY_BLK {
                    let columns = self.hidden_columns.entry(blk_type).or_default();
                    let centre = new_x as f64 + 0.5;
                    if !columns.contains(&centre) {
                        columns.push(centre);
                    }
                } else {
                    row.push(blk_type);
                    match self.column_mapping.get(&new_x) {
                        None => {
                            self.column_mapping.insert(new_x, x);
                        }
                        Some(&mapped) if mapped != x => {
                            return Err(PlaceError::RaggedReducedLayout);
                        }
                        _ => {}
                    }
                    new_x += 1;
                }
            }
            self.reduced_layout.push(row);
        }

        // sanity check
        let expected = self.reduced_layout[self.reduced_layout.len() / 2].len();
        if self.reduced_layout.iter().any(|row| row.len() != expected) {
            return Err(PlaceError::RaggedReducedLayout);
        }

        self.reduced_height = self.reduced_layout.len() as u32;
        self.reduced_width = expected as u32;
        self.aspect_ratio = self.reduced_height as f64 / self.reduced_width as f64;
        self.aspect_param = (self.reduced_width * self.reduced_height)
            .min(10 * self.reduced_width.max(self.reduced_height))
            as f64;

        self.compute_gaussian_table();
        Ok(())
    }

    fn compute_gaussian_table(&mut self) {
        let axis = self.reduced_width.max(self.reduced_height);
        let mid = axis as f64 / 2.0;
        self.gaussian_sigma_2 = (self.aspect_ratio * 2.0).powi(4);

        for i in 0..axis {
            let x = i as f64 - mid;
            self.gaussian_table.push((-x * x / self.gaussian_sigma_2).exp());
        }
        let denominator: f64 = self.gaussian_table.iter().sum();
        for v in self.gaussian_table.iter_mut() {
            *v /= denominator;
        }
    }

    fn create_fixed_boxes(&mut self) {
        for (id, &(x, y)) in self.fixed_pos.iter() {
            let mut b = ClusterBox::default();
            b.xmin = x as f64;
            b.xmax = x as f64;
            b.ymin = y as f64;
            b.ymax = y as f64;
            b.cx = x as f64;
            b.cy = y as f64;
            b.id = id.clone();
            b.index = self.boxes.len();
            b.width = 1;
            b.height = 1;
            b.fixed = true;
            self.boxes.push(b);
        }
    }

    fn create_boxes(&mut self) {
        self.legal_spline = vec![BTreeMap::new(); self.boxes.len() + self.clusters.len()];
        for (cluster_id, blocks) in self.clusters.iter() {
            let box_index = self.boxes.len();
            // the primary type usually dominates; a cluster's CLB footprint
            // is the largest of its CLB-priority type counts
            let mut clb_sizes: BTreeMap<char, usize> =
                self.clb_types.iter().map(|&t| (t, 0)).collect();
            let mut special_blocks: BTreeMap<char, usize> = BTreeMap::new();
            for blk_name in blocks.iter() {
                let blk_type = blk_name.chars().next().unwrap_or(EMPTY_BLK);
                if self.clb_types.contains(&blk_type) {
                    *clb_sizes.get_mut(&blk_type).unwrap() += 1;
                } else {
                    *special_blocks.entry(blk_type).or_insert(0) += 1;
                }
            }
            let clb_size = clb_sizes.values().copied().max().unwrap_or(0);
            self.box_special_blocks.insert(cluster_id.clone(), special_blocks.clone());

            let width = (clb_size as f64 / self.aspect_ratio).sqrt().ceil().max(1.0) as i32;
            let height = (clb_size as f64 / width as f64).ceil().max(1.0) as i32;

            let mut b = ClusterBox::default();
            b.id = cluster_id.clone();
            b.index = box_index;
            b.clb_size = clb_size;
            b.width = width;
            b.height = height;
            self.boxes.push(b);

            // smooth legality cost per special block type: how many of that
            // type the cluster still lacks if its left edge lands at x
            let mut splines = BTreeMap::new();
            for (&blk_type, &count) in special_blocks.iter() {
                let columns = self.hidden_columns.get(&blk_type).cloned().unwrap_or_default();
                let mut cost = Vec::new();
                let mut x_data = Vec::new();
                for x in 0..self.reduced_width.saturating_sub(width as u32) {
                    let mut blk_need = count as f64;
                    for xx in x..x + width as u32 {
                        for &col in columns.iter() {
                            if col - 1.0 < xx as f64 && col + 1.0 > xx as f64 {
                                blk_need -= height as f64;
                            }
                        }
                    }
                    cost.push(blk_need.max(0.0));
                    x_data.push(x as f64);
                }
                if x_data.len() >= 2 {
                    splines.insert(blk_type, Spline::new(x_data, cost));
                } else {
                    warn!("box {} too wide for a legality spline of type {}", cluster_id, blk_type);
                }
            }
            self.legal_spline[box_index] = splines;
        }
    }

    // rewrite the raw netlist in terms of box indices; nets entirely inside
    // one cluster only bump that cluster's intra count
    fn collapse_netlist(&mut self) -> Result<(), PlaceError> {
        let mut blk_index: BTreeMap<String, String> = BTreeMap::new();
        for (cluster_id, blocks) in self.clusters.iter() {
            self.intra_count.insert(cluster_id.clone(), 0);
            for blk in blocks.iter() {
                blk_index.insert(blk.clone(), cluster_id.clone());
            }
        }
        for id in self.fixed_pos.keys() {
            blk_index.insert(id.clone(), id.clone());
        }

        let mut id_to_index: BTreeMap<String, usize> = BTreeMap::new();
        for b in self.boxes.iter() {
            id_to_index.insert(b.id.clone(), b.index);
        }

        // this uses the raw netlist captured at construction; the names
        // were translated into owning boxes first
        let raw: Vec<Vec<String>> = std::mem::take(&mut self.raw_netlists);
        for net in raw.iter() {
            let mut mapped = Vec::with_capacity(net.len());
            for blk in net.iter() {
                let owner = blk_index
                    .get(blk)
                    .ok_or(PlaceError::InvariantViolation("block not found in blk_index"))?;
                mapped.push(owner.clone());
            }
            // nets that never leave their cluster are intra connections
            if mapped.iter().all(|id| *id == mapped[0]) {
                *self.intra_count.entry(mapped[0].clone()).or_insert(0) += 1;
                continue;
            }
            let mut indices = BTreeSet::new();
            for id in mapped.iter() {
                let index = id_to_index
                    .get(id)
                    .ok_or(PlaceError::InvariantViolation("unable to find box for cluster"))?;
                indices.insert(*index);
            }
            if indices.len() == 1 {
                return Err(PlaceError::InvariantViolation("error in condensing netlist"));
            }
            let net_index = self.netlists.len();
            for &index in indices.iter() {
                self.boxes[index].nets.insert(net_index);
            }
            self.netlists.push(indices.into_iter().collect());
        }
        Ok(())
    }

    fn init_place(&mut self) {
        let center_x = (self.reduced_width as f64 - 1.0) / 2.0;
        let center_y = (self.reduced_height as f64 - 1.0) / 2.0;
        for b in self.boxes.iter_mut() {
            if b.fixed {
                continue;
            }
            b.cx = center_x + self.rng.gen_range(-1.0, 1.0);
            b.cy = center_y + self.rng.gen_range(-1.0, 1.0);
            b.xmin = b.cx - b.width as f64 / 2.0;
            b.xmax = b.cx + b.width as f64 / 2.0;
            b.ymin = b.cy - b.height as f64 / 2.0;
            b.ymax = b.cy + b.height as f64 / 2.0;
        }
    }

    // ------------------------------------------------------------------
    // the continuous objective and its gradient
    // ------------------------------------------------------------------

    fn eval_f(&self) -> f64 {
        // first part is the star-model wire length
        let mut hpwl = 0.0;
        for net in self.netlists.iter() {
            let n = net.len() as f64;
            let x_sum: f64 = net.iter().map(|&i| self.boxes[i].cx).sum();
            let y_sum: f64 = net.iter().map(|&i| self.boxes[i].cy).sum();
            for &i in net.iter() {
                let x = self.boxes[i].cx;
                let y = self.boxes[i].cy;
                hpwl += (x - x_sum / n) * (x - x_sum / n);
                hpwl += (y - y_sum / n) * (y - y_sum / n);
            }
        }

        // second part is the spreading potential
        let mut overlap = 0.0;
        for box1 in self.boxes.iter().filter(|b| !b.fixed) {
            for box2 in self.boxes.iter() {
                if box2.fixed || box1.index == box2.index {
                    continue;
                }
                let d_2 = (box2.cx - box1.cx) * (box2.cx - box1.cx)
                    + (box2.cy - box1.cy) * (box2.cy - box1.cy);
                let sum = (box1.width + box2.width + box1.height + box2.height) as f64;
                let ref_d_2 = sum * sum / 4.0;
                if d_2 < ref_d_2 {
                    overlap += (d_2 - ref_d_2) * (d_2 - ref_d_2);
                }
            }
        }

        // third part is the legalisation penalty
        let mut legal = 0.0;
        for b in self.boxes.iter().filter(|b| !b.fixed) {
            for spline in self.legal_spline[b.index].values() {
                legal += spline.at(b.xmin);
            }
        }

        // last part is the aspect-ratio spreading force
        let mut aspect = 0.0;
        for b in self.boxes.iter().filter(|b| !b.fixed) {
            let x = if self.reduced_height > self.reduced_width { b.cy } else { b.cx };
            let x = (x as usize).min(self.gaussian_table.len() - 1);
            aspect += self.gaussian_table[x];
        }

        hpwl * self.hpwl_param
            + overlap * self.potential_param
            + legal * self.legal_param
            + aspect * self.aspect_param
    }

    fn eval_grad_f(&mut self, current_step: u32) -> Vec<(f64, f64)> {
        let size = self.boxes.len();
        let mut hpwl = vec![(0.0, 0.0); size];
        let mut overlap = vec![(0.0, 0.0); size];
        let mut legal = vec![(0.0, 0.0); size];
        let mut aspect = vec![(0.0, 0.0); size];

        for net in self.netlists.iter() {
            let n = net.len() as f64;
            let x_sum: f64 = net.iter().map(|&i| self.boxes[i].cx).sum();
            let y_sum: f64 = net.iter().map(|&i| self.boxes[i].cy).sum();
            for &i in net.iter() {
                let x = self.boxes[i].cx;
                let y = self.boxes[i].cy;
                hpwl[i].0 -= 2.0 / (n * n)
                    * ((n * n - 2.0 * n + 2.0) * x - 2.0 * (n - 1.0) * (x_sum - x));
                hpwl[i].1 -= 2.0 / (n * n)
                    * ((n * n - 2.0 * n + 2.0) * y - 2.0 * (n - 1.0) * (y_sum - y));
            }
        }

        for i in 0..size {
            if self.boxes[i].fixed {
                continue;
            }
            let mut x1 = self.boxes[i].cx;
            let mut y1 = self.boxes[i].cy;
            for j in 0..size {
                if self.boxes[j].fixed || i == j {
                    continue;
                }
                let x2 = self.boxes[j].cx;
                let y2 = self.boxes[j].cy;
                let d_2 = (x2 - x1) * (x2 - x1) + (y2 - y1) * (y2 - y1);
                let sum = (self.boxes[i].width
                    + self.boxes[j].width
                    + self.boxes[i].height
                    + self.boxes[j].height) as f64;
                let ref_d_2 = sum * sum / 4.0;
                if d_2 >= ref_d_2 {
                    continue;
                } else if d_2 == 0.0 {
                    // give overlapping twins a little nudge apart
                    x1 = x2 + self.rng.gen_range(-1.0, 1.0);
                    y1 = y2 + self.rng.gen_range(-1.0, 1.0);
                }
                let value = (2.0 * (d_2 - ref_d_2)).abs();
                let norm = d_2.sqrt().max(f64::MIN_POSITIVE);
                overlap[i].0 -= (x1 - x2) / norm * value;
                overlap[i].1 -= (y1 - y2) / norm * value;
            }
        }

        for b in self.boxes.iter().filter(|b| !b.fixed) {
            for spline in self.legal_spline[b.index].values() {
                legal[b.index].0 -= spline.deriv(b.xmin);
            }
        }

        for b in self.boxes.iter().filter(|b| !b.fixed) {
            let (x, mid) = if self.reduced_height > self.reduced_width {
                (b.cy, self.reduced_height as f64 / 2.0)
            } else {
                (b.cx, self.reduced_width as f64 / 2.0)
            };
            let index = (x as usize).min(self.gaussian_table.len() - 1);
            let xx = x - mid;
            let value = self.gaussian_table[index] * (-2.0 * xx / self.gaussian_sigma_2);
            if self.reduced_height > self.reduced_width {
                aspect[b.index].1 -= value;
            } else {
                aspect[b.index].0 -= value;
            }
        }

        let overlap_weight = self.potential_param * (current_step as f64).max(0.5);
        (0..size)
            .map(|i| {
                (
                    hpwl[i].0 * self.hpwl_param
                        + overlap[i].0 * overlap_weight
                        + legal[i].0 * self.legal_param
                        + aspect[i].0 * self.aspect_param,
                    hpwl[i].1 * self.hpwl_param
                        + overlap[i].1 * overlap_weight
                        + legal[i].1 * self.legal_param
                        + aspect[i].1 * self.aspect_param,
                )
            })
            .collect()
    }

    // Polak-Ribiere conjugate direction factor
    fn find_beta(grad_f: &[(f64, f64)], last_grad_f: &[(f64, f64)]) -> f64 {
        let mut l2norm = 0.0;
        for g in last_grad_f.iter() {
            l2norm += g.0 * g.0 + g.1 * g.1;
        }
        if l2norm == 0.0 {
            return 0.0;
        }
        let mut product = 0.0;
        for (g, lg) in grad_f.iter().zip(last_grad_f.iter()) {
            product += g.0 * (g.0 - lg.0);
            product += g.1 * (g.1 - lg.1);
        }
        product / l2norm
    }

    // heuristic step size: the inverse RMS gradient
    fn line_search(grad_f: &[(f64, f64)]) -> f64 {
        let mut total_grad = 0.0;
        for g in grad_f.iter() {
            total_grad += g.0 * g.0 + g.1 * g.1;
        }
        let avg_grad = (total_grad / grad_f.len() as f64).sqrt();
        if avg_grad == 0.0 {
            0.0
        } else {
            1.0 / avg_grad
        }
    }

    // truncate every gradient to the average squared norm
    fn adjust_force(grad_f: &mut [(f64, f64)]) {
        let mut norm_2 = 0.0;
        for g in grad_f.iter() {
            norm_2 += g.0 * g.0 + g.1 * g.1;
        }
        let average = norm_2 / grad_f.len() as f64;
        for g in grad_f.iter_mut() {
            let norm = g.0 * g.0 + g.1 * g.1;
            if norm > average {
                g.0 = g.0 * average / norm;
                g.1 = g.1 * average / norm;
            }
        }
    }

    /// Runs the conjugate-gradient global placement: up to 50 outer
    /// iterations of CG descent with interleaved integral legalisation,
    /// keeping the best state seen, and finally derives the annealing
    /// parameters from the resulting wire length.
    pub fn solve(&mut self) {
        let max_iter = 50;
        let precision = 0.99999;
        let mut states: Vec<(f64, Vec<ClusterBox>)> = Vec::new();
        let mut old_obj_value = 0.0;

        for iter in 0..max_iter {
            let obj_value = self.eval_f();
            info!("HPWL: {}", obj_value);
            states.push((obj_value, self.boxes.clone()));

            if iter > 0 && obj_value >= precision * old_obj_value {
                break;
            }

            let mut inner_iter = 0u32;
            let mut last_grad_f: Vec<(f64, f64)> = Vec::new();
            let mut best_hpwl = f64::MAX;
            loop {
                if inner_iter == 0 {
                    old_obj_value = f64::MAX;
                }
                let obj_value = self.eval_f();
                if obj_value >= precision * old_obj_value {
                    break;
                }

                let mut grad_f = self.eval_grad_f(iter);
                Self::adjust_force(&mut grad_f);

                let direction: Vec<(f64, f64)> = if inner_iter == 0 {
                    grad_f.iter().map(|g| (-g.0, -g.1)).collect()
                } else {
                    let beta = Self::find_beta(&grad_f, &last_grad_f);
                    grad_f
                        .iter()
                        .zip(last_grad_f.iter())
                        .map(|(g, lg)| (-g.0 + beta * lg.0, -g.1 + beta * lg.1))
                        .collect()
                };

                let step_size = Self::line_search(&grad_f);

                let reduced_width = self.reduced_width as f64;
                let reduced_height = self.reduced_height as f64;
                let margin = self.clb_margin as f64;
                for i in 0..self.boxes.len() {
                    if self.boxes[i].fixed {
                        continue;
                    }
                    let b = &mut self.boxes[i];
                    b.cx += direction[i].0 * step_size;
                    b.cy += direction[i].1 * step_size;

                    // bound the box with a look-ahead legalisation
                    let mut xmin = b.cx - b.width as f64 / 2.0;
                    let mut ymin = b.cy - b.height as f64 / 2.0;
                    xmin = xmin.max(0.0);
                    xmin = xmin.min(reduced_width - b.width as f64);
                    ymin = ymin.max(margin);
                    ymin = ymin.min(reduced_height - b.height as f64 - margin);
                    b.cx = xmin + b.width as f64 / 2.0;
                    b.cy = ymin + b.height as f64 / 2.0;
                    b.xmin = xmin;
                    b.ymin = ymin;
                    b.xmax = xmin + b.width as f64;
                    b.ymax = ymin + b.height as f64;
                }

                // track the discrete wire length once in a while
                if inner_iter % 4 == 0 {
                    let hpwl = self.compute_hpwl();
                    if hpwl > best_hpwl {
                        break;
                    }
                    best_hpwl = hpwl;
                }

                last_grad_f = grad_f;
                old_obj_value = obj_value;
                inner_iter += 1;
            }

            if iter % 2 == 1 {
                self.legalize_box();
            }
        }

        // adopt the best state seen
        states.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((hpwl, boxes)) = states.first() {
            info!("Using HPWL: {}", hpwl);
            self.boxes = boxes.clone();
        }
        self.legalize_box();

        self.anneal_param = ((self.netlists.len() as f64 / self.clusters.len().max(1) as f64)
            * 1.4)
            .powi(2)
            * self.hpwl_param
            * self.anneal_param_factor;
        info!("Use anneal param: {}", self.anneal_param);

        self.curr_energy = self.compute_anneal_energy();
        self.tmin = if self.netlists.is_empty() {
            3.0
        } else {
            0.005 * self.curr_energy / self.netlists.len() as f64
        };
        self.tmax = self.tmin * 2.0;
    }

    /// The discrete bounding-box wire length of the current boxes.
    pub fn compute_hpwl(&self) -> f64 {
        let mut hpwl = 0.0;
        for net in self.netlists.iter() {
            let mut xmin = f64::MAX;
            let mut xmax = 0.0f64;
            let mut ymin = f64::MAX;
            let mut ymax = 0.0f64;
            for &box_index in net.iter() {
                let b = &self.boxes[box_index];
                xmax = xmax.max(b.cx);
                xmin = xmin.min(b.cx);
                ymax = ymax.max(b.cy);
                ymin = ymin.min(b.cy);
            }
            hpwl += xmax - xmin + ymax - ymin;
        }
        hpwl
    }

    fn legalize_box(&mut self) {
        for i in 0..self.boxes.len() {
            let b = self.boxes[i].clone();
            self.boxes[i] = self.bounded(b);
        }
    }

    // round the box onto the board, respecting the CLB margin in y
    fn bounded(&self, mut b: ClusterBox) -> ClusterBox {
        if b.fixed {
            return b;
        }
        let reduced_width = self.reduced_width as f64;
        let reduced_height = self.reduced_height as f64;
        let margin = self.clb_margin as f64;
        b.xmin = b.xmin.round().min(reduced_width - b.width as f64).max(0.0);
        b.ymin = b.ymin.round().min(reduced_height - b.height as f64 - margin).max(margin);
        b.xmax = b.xmin + b.width as f64;
        b.ymax = b.ymin + b.height as f64;
        b.cx = b.xmin + b.width as f64 / 2.0;
        b.cy = b.ymin + b.height as f64 / 2.0;
        b
    }

    // ------------------------------------------------------------------
    // simulated annealing over the legalised boxes
    // ------------------------------------------------------------------

    // the annealing energy: discrete wire length (plus an intra-cluster
    // approximation) with hard penalties on overlapping cells and missing
    // special blocks
    fn compute_anneal_energy(&self) -> f64 {
        let mut hpwl = self.compute_hpwl();
        for b in self.boxes.iter() {
            let w = (b.width + b.height) as f64 / 4.0;
            hpwl += w * self.intra_count.get(&b.id).copied().unwrap_or(0) as f64;
        }

        let mut overlap = 0.0;
        for box1 in self.boxes.iter().filter(|b| !b.fixed) {
            for box2 in self.boxes.iter() {
                if box2.fixed || box1.index == box2.index {
                    continue;
                }
                let (dx, dy) = compute_overlap(
                    (box1.xmin as i32, box1.ymin as i32),
                    (box1.xmax as i32, box1.ymax as i32),
                    (box2.xmin as i32, box2.ymin as i32),
                    (box2.xmax as i32, box2.ymax as i32),
                );
                if dx > 0 && dy > 0 {
                    overlap += (dx * dy) as f64;
                }
            }
        }

        let mut special = 0.0;
        for b in self.boxes.iter() {
            let special_blocks = match self.box_special_blocks.get(&b.id) {
                Some(blocks) => blocks,
                None => continue,
            };
            for (&blk_type, &count) in special_blocks.iter() {
                let mut needed = count as f64;
                if let Some(columns) = self.hidden_columns.get(&blk_type) {
                    for &xx in columns.iter() {
                        if xx < b.xmax && xx >= b.xmin {
                            needed -= b.height as f64;
                        }
                    }
                }
                if needed > 0.0 {
                    special += needed;
                }
            }
        }

        // the main job of the annealer is to remove overlap
        hpwl * self.hpwl_param + overlap * self.anneal_param + special * 10.0
    }

    /// Runs the box annealing on top of the CG solution. In the rare case
    /// where annealing ends worse than it started (very small netlists) the
    /// pre-annealing state is restored.
    pub fn anneal(&mut self) {
        let old_boxes = self.boxes.clone();
        let old_energy = self.curr_energy;
        info!("Before annealing energy: {}", old_energy);
        exponential_anneal(self);
        info!(
            "After annealing energy: {} improvement: {}",
            self.curr_energy,
            (old_energy - self.curr_energy) / old_energy
        );
        if self.curr_energy > old_energy {
            warn!("Annealing failed. Reverting to the old stage");
            self.boxes = old_boxes;
            self.curr_energy = old_energy;
        }
    }

    // ------------------------------------------------------------------
    // cell realisation
    // ------------------------------------------------------------------

    /// Turns the annealed boxes into concrete cells per cluster:
    ///
    /// 1. Every cluster claims the CLB cells of its rectangle that no other
    ///    rectangle covers; contested cells stay open.
    /// 2. In order of decreasing overlap ratio, clusters grow outward from
    ///    their centroid (in Manhattan-distance order) until they own
    ///    `clb_size` cells.
    /// 3. Special-block cells are assigned to the closest cluster needing
    ///    the type, with two spare cells per type.
    pub fn realize(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<char, BTreeSet<(i32, i32)>>>, PlaceError> {
        let mut result: BTreeMap<String, BTreeMap<char, BTreeSet<(i32, i32)>>> = BTreeMap::new();

        // integral rectangles of the movable boxes
        let mut rects: BTreeMap<usize, ((i32, i32), (i32, i32))> = BTreeMap::new();
        for b in self.boxes.iter().filter(|b| !b.fixed) {
            rects.insert(
                b.index,
                ((b.xmin as i32, b.ymin as i32), (b.xmax as i32, b.ymax as i32)),
            );
            result.insert(b.id.clone(), BTreeMap::new());
        }

        // cells of the board still open for assignment
        let (width, height) = self.board_layout.get_size();
        let mut bboard = vec![vec![false; width as usize]; height as usize];
        for y in 0..height {
            for x in 0..width {
                let blk_type = self.board_layout.get_blk_type(x, y);
                if blk_type != EMPTY_BLK && !IO_BLK.contains(&blk_type) {
                    bboard[y as usize][x as usize] = true;
                }
            }
        }

        // claim all uncontested cells and measure the overlap ratios
        let mut overlap_stats: BTreeMap<usize, f64> = BTreeMap::new();
        for (&box_index, &(pmin, pmax)) in rects.iter() {
            let mut box_pos: BTreeSet<(i32, i32)> = BTreeSet::new();
            for y in pmin.1..pmax.1 {
                for x in pmin.0..pmax.0 {
                    box_pos.insert((x, y));
                }
            }
            let mut overlapped: BTreeSet<(i32, i32)> = BTreeSet::new();
            for (&other, &(qmin, qmax)) in rects.iter() {
                if other == box_index {
                    continue;
                }
                let (dx, dy) = compute_overlap(pmin, pmax, qmin, qmax);
                if dx <= 0 || dy <= 0 {
                    continue;
                }
                for y in qmin.1..qmax.1 {
                    for x in qmin.0..qmax.0 {
                        if box_pos.contains(&(x, y)) {
                            overlapped.insert((x, y));
                        }
                    }
                }
            }
            overlap_stats.insert(
                box_index,
                overlapped.len() as f64 / self.boxes[box_index].clb_size.max(1) as f64,
            );

            let mut clb_cells: BTreeSet<(i32, i32)> = BTreeSet::new();
            for pos in box_pos.iter() {
                if overlapped.contains(pos) {
                    continue;
                }
                // remap the reduced column back onto the board
                let new_x = *self
                    .column_mapping
                    .get(&(pos.0 as u32))
                    .ok_or(PlaceError::InvariantViolation("box outside the reduced board"))?
                    as i32;
                let new_y = pos.1;
                let blk_type =
                    self.board_layout.get_blk_type(new_x as u32, new_y as u32);
                if blk_type != self.clb_type {
                    return Err(PlaceError::InvariantViolation("error in assigning clb cells"));
                }
                clb_cells.insert((new_x, new_y));
                bboard[new_y as usize][new_x as usize] = false;
            }
            let id = &self.boxes[box_index].id;
            for &clb_type in self.clb_types.iter() {
                result.get_mut(id).unwrap().insert(clb_type, clb_cells.clone());
            }
        }

        // hand out the contested cells, worst overlap first
        let mut cluster_ids: Vec<usize> = overlap_stats.keys().copied().collect();
        cluster_ids.sort_by(|a, b| {
            overlap_stats[b]
                .partial_cmp(&overlap_stats[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });

        for &index in cluster_ids.iter() {
            let id = self.boxes[index].id.clone();
            let mut assigned = result[&id][&self.clb_type].clone();
            let mut needed = self.boxes[index].clb_size as i64 - assigned.len() as i64;

            let c_x =
                assigned.iter().map(|&(x, _)| x as f64).sum::<f64>() / assigned.len() as f64;
            let c_y =
                assigned.iter().map(|&(_, y)| y as f64).sum::<f64>() / assigned.len() as f64;
            if needed > 0 {
                if assigned.is_empty() {
                    return Err(PlaceError::EmptyClusterBox);
                }
                for effort in 0..height as i32 / 2 {
                    if needed <= 0 {
                        break;
                    }
                    let mut cells = self.find_exterior_set(&bboard, &assigned, effort + 1);
                    cells.sort_by(|&(x1, y1), &(x2, y2)| {
                        let d1 = (c_x - x1 as f64).abs() + (c_y - y1 as f64).abs();
                        let d2 = (c_x - x2 as f64).abs() + (c_y - y2 as f64).abs();
                        d1.partial_cmp(&d2).unwrap_or(std::cmp::Ordering::Equal)
                    });
                    for (x, y) in cells {
                        assigned.insert((x, y));
                        bboard[y as usize][x as usize] = false;
                        needed -= 1;
                        if needed <= 0 {
                            break;
                        }
                    }
                }
                if needed > 0 {
                    return Err(PlaceError::DeOverlapFailed);
                }
                for &clb_type in self.clb_types.iter() {
                    result.get_mut(&id).unwrap().insert(clb_type, assigned.clone());
                }
            }

            // assign the special blocks closest to the cluster's centre,
            // keeping two spare cells per type
            let special_blocks =
                self.box_special_blocks.get(&id).cloned().unwrap_or_default();
            for (blk_type, count) in special_blocks {
                let mut cells: Vec<(i32, i32)> = Vec::new();
                for y in 0..height {
                    for x in 0..width {
                        if bboard[y as usize][x as usize]
                            && self.board_layout.get_blk_type(x, y) == blk_type
                        {
                            cells.push((x as i32, y as i32));
                        }
                    }
                }
                if cells.len() < count {
                    return Err(PlaceError::SpecialBlockOverflow(blk_type));
                }
                cells.sort_by(|&(x1, y1), &(x2, y2)| {
                    let d1 = (c_x - x1 as f64).powi(2) + (c_y - y1 as f64).powi(2);
                    let d2 = (c_x - x2 as f64).powi(2) + (c_y - y2 as f64).powi(2);
                    d1.partial_cmp(&d2).unwrap_or(std::cmp::Ordering::Equal)
                });
                let take = (count + 2).min(cells.len());
                let mut claimed = BTreeSet::new();
                for &(x, y) in cells[..take].iter() {
                    claimed.insert((x, y));
                    bboard[y as usize][x as usize] = false;
                }
                result.get_mut(&id).unwrap().insert(blk_type, claimed);
            }
        }

        Ok(result)
    }

    // the empty CLB cells within `max_dist` of the assigned set's bounding
    // box
    fn find_exterior_set(
        &self,
        bboard: &[Vec<bool>],
        assigned: &BTreeSet<(i32, i32)>,
        max_dist: i32,
    ) -> Vec<(i32, i32)> {
        let xmin = assigned.iter().map(|&(x, _)| x).min().unwrap_or(0);
        let xmax = assigned.iter().map(|&(x, _)| x).max().unwrap_or(0);
        let ymin = assigned.iter().map(|&(_, y)| y).min().unwrap_or(0);
        let ymax = assigned.iter().map(|&(_, y)| y).max().unwrap_or(0);

        let mut empty_cells = Vec::new();
        for y in ymin - max_dist..ymax + max_dist + 1 {
            for x in xmin - max_dist..xmax + max_dist + 1 {
                if x < 0 || y < 0 || x >= bboard[0].len() as i32 || y >= bboard.len() as i32 {
                    continue;
                }
                if bboard[y as usize][x as usize]
                    && self.board_layout.get_blk_type(x as u32, y as u32) == self.clb_type
                {
                    empty_cells.push((x, y));
                }
            }
        }
        empty_cells
    }

    // apply the pending move, returning the displaced boxes for rollback
    fn apply_move(&mut self) -> (Option<ClusterBox>, Option<ClusterBox>) {
        let pending = self.current_move.clone();
        let backup1 = pending.box1.map(|b| {
            let idx = b.index;
            let backup = self.boxes[idx].clone();
            self.boxes[idx] = b;
            backup
        });
        let backup2 = pending.box2.map(|b| {
            let idx = b.index;
            let backup = self.boxes[idx].clone();
            self.boxes[idx] = b;
            backup
        });
        (backup1, backup2)
    }
}

impl SimAnneal for GlobalPlacer {
    /// Proposes one of five moves on a random non-fixed box: translate by
    /// one cell, rotate (swap width and height), reshape by up to two
    /// columns, teleport anywhere legal, or swap centroids with another
    /// box.
    fn propose(&mut self) {
        self.current_move = ClusterMove::default();
        if self.fixed_pos.len() >= self.boxes.len() {
            return;
        }
        let box_index = self.rng.gen_range(self.fixed_pos.len(), self.boxes.len());
        let action: f64 = self.rng.gen();

        if action <= 0.3 {
            // translate
            let dx = self.rng.gen_range(-1i32, 2) as f64;
            let dy = self.rng.gen_range(-1i32, 2) as f64;
            let mut b = self.boxes[box_index].clone();
            b.xmin += dx;
            b.ymin += dy;
            b.xmax += dx;
            b.ymax += dy;
            b.cx += dx;
            b.cy += dy;
            self.current_move.box1 = Some(b);
        } else if action <= 0.5 {
            // rotate around the centroid
            let mut b = self.boxes[box_index].clone();
            b.xmin = (b.cx - b.height as f64 / 2.0).floor();
            b.ymin = (b.cy - b.width as f64 / 2.0).floor();
            b.xmax = b.xmin + b.height as f64;
            b.ymax = b.ymin + b.width as f64;
            b.cx = (b.xmin + b.xmax) / 2.0;
            b.cy = (b.ymin + b.ymax) / 2.0;
            std::mem::swap(&mut b.width, &mut b.height);
            self.current_move.box1 = Some(b);
        } else if action <= 0.8 {
            // change the shape a little bit
            let mut b = self.boxes[box_index].clone();
            let dx = self.rng.gen_range(-2i32, 3);
            let new_width = (b.width + dx).max(1).min(self.reduced_width as i32 - 1);
            b.xmin = (b.cx - new_width as f64 / 2.0).floor();
            b.xmax = b.xmin + new_width as f64;
            b.width = new_width;
            b.height = (b.clb_size as f64 / new_width as f64).ceil() as i32;
            // a later rotation must still fit the board
            if b.height >= self.reduced_width as i32 - 1 {
                return;
            }
            b.ymax = b.ymin + b.height as f64;
            b.cx = (b.xmin + b.xmax) / 2.0;
            b.cy = (b.ymin + b.ymax) / 2.0;
            self.current_move.box1 = Some(b);
        } else if action <= 0.9 {
            // teleport somewhere in the region
            let mut b = self.boxes[box_index].clone();
            let x_range = self.reduced_width.saturating_sub(b.width as u32);
            let y_range = self.reduced_height.saturating_sub(b.height as u32);
            let new_x = self.rng.gen_range(0, x_range + 1) as f64;
            let new_y = self.rng.gen_range(0, y_range + 1) as f64;
            b.xmin = new_x;
            b.ymin = new_y;
            b.xmax = new_x + b.width as f64;
            b.ymax = new_y + b.height as f64;
            b.cx = (b.xmin + b.xmax) / 2.0;
            b.cy = (b.ymin + b.ymax) / 2.0;
            self.current_move.box1 = Some(b);
        } else {
            // swap the centroids of two boxes
            let box_index2 = self.rng.gen_range(self.fixed_pos.len(), self.boxes.len());
            if box_index2 == box_index {
                return;
            }
            let mut box1 = self.boxes[box_index].clone();
            let mut box2 = self.boxes[box_index2].clone();
            std::mem::swap(&mut box1.cx, &mut box2.cx);
            std::mem::swap(&mut box1.cy, &mut box2.cy);
            for b in [&mut box1, &mut box2].iter_mut() {
                b.xmin = (b.cx - b.width as f64 / 2.0).floor();
                b.ymin = (b.cy - b.height as f64 / 2.0).floor();
                b.xmax = b.xmin + b.width as f64;
                b.ymax = b.ymin + b.height as f64;
                b.cx = (b.xmin + b.xmax) / 2.0;
                b.cy = (b.ymin + b.ymax) / 2.0;
            }
            self.current_move.box1 = Some(box1);
            self.current_move.box2 = Some(box2);
        }

        if let Some(b) = self.current_move.box1.take() {
            self.current_move.box1 = Some(self.bounded(b));
        }
        if let Some(b) = self.current_move.box2.take() {
            self.current_move.box2 = Some(self.bounded(b));
        }
    }

    fn energy(&mut self) -> f64 {
        if self.current_move.box1.is_none() {
            return self.curr_energy;
        }
        let (backup1, backup2) = self.apply_move();
        let new_energy = self.compute_anneal_energy();
        // revert
        if let Some(b) = backup1 {
            let index = b.index;
            self.boxes[index] = b;
        }
        if let Some(b) = backup2 {
            let index = b.index;
            self.boxes[index] = b;
        }
        new_energy
    }

    fn commit(&mut self) {
        if self.current_move.box1.is_none() {
            return;
        }
        self.apply_move();
        self.current_move = ClusterMove::default();
    }

    fn init_energy(&mut self) -> f64 {
        self.compute_anneal_energy()
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
        self.steps
    }

    fn tmax(&self) -> f64 {
        self.tmax
    }

    fn tmin(&self) -> f64 {
        self.tmin
    }
}
