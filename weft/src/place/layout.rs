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

//! # Layout Model
//!
//! A board is a set of *layers*, one per block-type character. Each layer is
//! a boolean availability mask of identical size. Layers carry a major and a
//! minor priority: the major priority decides which type *owns* a cell when
//! several layers mark it available, the minor priority breaks ties among
//! types that share a major priority (e.g. 1-bit PE blocks laying on top of
//! the 16-bit PE layer).

use super::types::PlaceError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// The block type of a cell no layer claims.
pub const EMPTY_BLK: char = ' ';

/// A boolean availability mask for one block type.
#[derive(Debug, Clone)]
pub struct Layer {
    /// the block type this layer describes
    pub blk_type: char,
    // indexed [y][x]
    layout: Vec<Vec<bool>>,
}

impl Layer {
    /// Creates an all-unavailable layer of the given size.
    pub fn new(blk_type: char, width: u32, height: u32) -> Self {
        Self { blk_type, layout: vec![vec![false; width as usize]; height as usize] }
    }

    /// Marks `(x, y)` as available.
    pub fn mark_available(&mut self, x: u32, y: u32) {
        self.layout[y as usize][x as usize] = true;
    }

    /// Marks `(x, y)` as unavailable.
    pub fn mark_unavailable(&mut self, x: u32, y: u32) {
        self.layout[y as usize][x as usize] = false;
    }

    /// Whether `(x, y)` is available.
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.layout[y as usize][x as usize]
    }

    /// The `(width, height)` of the mask.
    pub fn get_size(&self) -> (u32, u32) {
        (self.layout[0].len() as u32, self.layout.len() as u32)
    }

    /// All available positions, row by row.
    pub fn produce_available_pos(&self) -> Vec<(i32, i32)> {
        let mut result = Vec::new();
        for (y, row) in self.layout.iter().enumerate() {
            for (x, &available) in row.iter().enumerate() {
                if available {
                    result.push((x as i32, y as i32));
                }
            }
        }
        result
    }
}

/// A multi-layer board layout.
///
/// Only a single cell can be placed per layer and position; capacities are
/// not supported.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    layers: BTreeMap<char, Layer>,
    priority_major: BTreeMap<char, u32>,
    priority_minor: BTreeMap<char, u32>,
    width: u32,
    height: u32,
}

impl Layout {
    /// The priority assigned to layers added without an explicit one.
    pub const DEFAULT_PRIORITY: u32 = 20;

    /// Creates an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a layout from a character matrix: every distinct character
    /// becomes a layer available exactly on its cells, with the default
    /// priorities.
    pub fn from_chars(cells: &[Vec<char>]) -> Result<Self, PlaceError> {
        let height = cells.len() as u32;
        let width = cells[0].len() as u32;
        let mut layout = Self::new();
        // first pass to create the empty layers
        let types: BTreeSet<char> = cells.iter().flatten().copied().collect();
        for blk_type in types {
            layout.add_layer(Layer::new(blk_type, width, height))?;
        }
        // second pass to fill them in
        for (y, row) in cells.iter().enumerate() {
            for (x, &blk_type) in row.iter().enumerate() {
                layout.layers.get_mut(&blk_type).unwrap().mark_available(x as u32, y as u32);
            }
        }
        Ok(layout)
    }

    /// Adds a layer with the default priorities.
    pub fn add_layer(&mut self, layer: Layer) -> Result<(), PlaceError> {
        self.add_layer_with_priority(layer, Self::DEFAULT_PRIORITY, Self::DEFAULT_PRIORITY)
    }

    /// Adds a layer with explicit major/minor priorities. All layers of a
    /// layout must share the same size.
    pub fn add_layer_with_priority(
        &mut self,
        layer: Layer,
        priority_major: u32,
        priority_minor: u32,
    ) -> Result<(), PlaceError> {
        let blk_type = layer.blk_type;
        if self.layers.contains_key(&blk_type) {
            return Err(PlaceError::DuplicateLayer(blk_type));
        }
        let (width, height) = layer.get_size();
        if self.width == 0 {
            self.width = width;
            self.height = height;
        } else if self.width != width || self.height != height {
            return Err(PlaceError::LayerSizeMismatch);
        }
        self.layers.insert(blk_type, layer);
        self.priority_major.insert(blk_type, priority_major);
        self.priority_minor.insert(blk_type, priority_minor);
        Ok(())
    }

    /// Whether the block (identified by its type prefix) may sit on `(x, y)`.
    pub fn is_legal(&self, blk_id: &str, x: u32, y: u32) -> bool {
        let blk_type = blk_id.chars().next().unwrap_or(EMPTY_BLK);
        self.layers.get(&blk_type).map(|l| l.get(x, y)).unwrap_or(false)
    }

    /// The layer for a block type.
    pub fn get_layer(&self, blk_type: char) -> Result<&Layer, PlaceError> {
        self.layers.get(&blk_type).ok_or(PlaceError::UnknownLayer(blk_type))
    }

    /// The primary block type at `(x, y)`: the available layer with the
    /// highest (major, minor) priority, or [`EMPTY_BLK`].
    pub fn get_blk_type(&self, x: u32, y: u32) -> char {
        let mut blk = EMPTY_BLK;
        let mut priority_major = 0;
        let mut priority_minor = 0;
        for (&blk_type, layer) in self.layers.iter() {
            if layer.get(x, y)
                && self.priority_major[&blk_type] >= priority_major
                && self.priority_minor[&blk_type] >= priority_minor
            {
                blk = blk_type;
                priority_major = self.priority_major[&blk_type];
                priority_minor = self.priority_minor[&blk_type];
            }
        }
        blk
    }

    /// All block types sharing the highest major priority at `(x, y)`.
    pub fn get_blk_types(&self, x: u32, y: u32) -> Vec<char> {
        let mut priority_major = 0;
        for (&blk_type, layer) in self.layers.iter() {
            if layer.get(x, y) && self.priority_major[&blk_type] > priority_major {
                priority_major = self.priority_major[&blk_type];
            }
        }
        let mut results = Vec::new();
        for (&blk_type, layer) in self.layers.iter() {
            if layer.get(x, y) && self.priority_major[&blk_type] == priority_major {
                results.push(blk_type);
            }
        }
        results
    }

    /// The board `(width, height)`.
    pub fn get_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The major priority of a block type.
    pub fn get_priority_major(&self, blk_type: char) -> u32 {
        self.priority_major.get(&blk_type).copied().unwrap_or(0)
    }

    /// The minor priority of a block type.
    pub fn get_priority_minor(&self, blk_type: char) -> u32 {
        self.priority_minor.get(&blk_type).copied().unwrap_or(0)
    }

    /// The set of block types with a layer.
    pub fn get_layer_types(&self) -> BTreeSet<char> {
        self.layers.keys().copied().collect()
    }

    /// The principal logic block type: the one owning cells with the
    /// highest (major, minor) priority anywhere on the board.
    pub fn get_clb_type(&self) -> char {
        let mut major = 0;
        let mut minor = 0;
        let mut blk = EMPTY_BLK;
        for x in 0..self.width {
            for y in 0..self.height {
                let blk_type = self.get_blk_type(x, y);
                let blk_major = self.get_priority_major(blk_type);
                let blk_minor = self.get_priority_minor(blk_type);
                if blk_major >= major && blk_minor >= minor {
                    blk = blk_type;
                    major = blk_major;
                    minor = blk_minor;
                }
            }
        }
        blk
    }

    /// The width of the IO ring around the CLB fabric, assuming the board is
    /// symmetrical.
    pub fn get_margin(&self) -> u32 {
        let clb_type = self.get_clb_type();
        let size = self.width.min(self.height);
        for margin in 0..size {
            if self.get_blk_type(margin, margin) == clb_type {
                return margin;
            }
        }
        size
    }

    /// For every block type owning cells, the list of its positions in
    /// column-major order.
    pub fn produce_available_pos(&self) -> BTreeMap<char, Vec<(i32, i32)>> {
        let mut result: BTreeMap<char, Vec<(i32, i32)>> = BTreeMap::new();
        for x in 0..self.width {
            for y in 0..self.height {
                for blk in self.get_blk_types(x, y) {
                    result.entry(blk).or_default().push((x as i32, y as i32));
                }
            }
        }
        result
    }

    /// A character map of the board, one row per line.
    pub fn layout_repr(&self) -> String {
        let mut result = String::new();
        for y in 0..self.height {
            for x in 0..self.width {
                result.push(self.get_blk_type(x, y));
            }
            let _ = writeln!(result);
        }
        result
    }
}
