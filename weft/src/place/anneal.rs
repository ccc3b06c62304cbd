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

//! # Simulated Annealing Scaffold
//!
//! The shared move/energy/commit contract of the placers, plus the two
//! generic loops: an exponentially cooled annealing schedule and a pure
//! downhill refinement. Implementors override [`SimAnneal::anneal`] when
//! they need their own schedule (the detailed placer uses an adaptive one).

use log::*;

/// The simulated-annealing contract. A proposed move stays pending until it
/// is either committed or implicitly discarded by the next proposal.
pub trait SimAnneal {
    /// Proposes a random move. The move must not be applied yet; `energy`
    /// evaluates it and `commit` applies it.
    fn propose(&mut self);

    /// The energy the system would have if the pending move were applied.
    fn energy(&mut self) -> f64;

    /// Applies the pending move.
    fn commit(&mut self);

    /// Computes the energy of the current state from scratch.
    fn init_energy(&mut self) -> f64;

    /// The energy of the current state.
    fn curr_energy(&self) -> f64;

    /// Updates the recorded energy of the current state.
    fn set_curr_energy(&mut self, energy: f64);

    /// A uniform sample in `[0, 1)` from the implementor's seeded RNG.
    fn rand_f64(&mut self) -> f64;

    /// Number of annealing steps.
    fn steps(&self) -> usize;

    /// Starting temperature.
    fn tmax(&self) -> f64;

    /// Final temperature.
    fn tmin(&self) -> f64;

    /// Runs the annealing loop. The default is the exponential schedule of
    /// [`exponential_anneal`].
    fn anneal(&mut self) {
        exponential_anneal(self);
    }

    /// Runs downhill-only refinement rounds of `num_iter` moves each until
    /// the relative improvement of a round drops to `threshold`.
    fn refine(&mut self, num_iter: usize, threshold: f64) {
        downhill_refine(self, num_iter, threshold);
    }
}

/// The classic annealing loop: the temperature decays exponentially from
/// `tmax` to `tmin` over `steps` proposals, and an uphill move of `de` is
/// accepted with probability `exp(-de / t)`.
pub fn exponential_anneal<T: SimAnneal + ?Sized>(sa: &mut T) {
    let tmax = sa.tmax();
    let tmin = sa.tmin();
    let steps = sa.steps();
    let t_factor = -(tmax / tmin).ln();
    for current_step in 0..steps {
        let t = tmax * (t_factor * current_step as f64 / steps as f64).exp();
        sa.propose();
        let new_energy = sa.energy();
        let de = new_energy - sa.curr_energy();
        if de > 0.0 && (-de / t).exp() < sa.rand_f64() {
            continue;
        }
        sa.commit();
        sa.set_curr_energy(new_energy);
    }
}

/// Downhill-only refinement: accept if and only if the move improves the
/// energy; repeat rounds until the relative improvement of a full round is
/// at or below `threshold`.
pub fn downhill_refine<T: SimAnneal + ?Sized>(sa: &mut T, num_iter: usize, threshold: f64) {
    loop {
        let old_energy = sa.curr_energy();
        for _ in 0..num_iter {
            sa.propose();
            let new_energy = sa.energy();
            let de = new_energy - sa.curr_energy();
            if de < 0.0 {
                sa.commit();
                sa.set_curr_energy(new_energy);
            }
        }
        let improvement = (old_energy - sa.curr_energy()) / old_energy;
        trace!("refinement round improved energy by {}", improvement);
        if improvement <= threshold {
            break;
        }
    }
}
