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

//! The command-line front end: `place` maps a packed netlist onto a board
//! layout, `route` maps a placed netlist onto a routing graph.

use weft::io;
use weft::place::{
    self, check_placement, detailed_placement, partition_netlist, place_io_blocks,
    DetailedPlacer, GlobalPlacer,
};
use weft::router::GlobalRouter;

use clap::{Parser, Subcommand};
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::path::PathBuf;
use std::process::exit;

// boards this small are placed flat, without the analytical phase
const DIM_THRESHOLD: u32 = 6;
// designs this small are not worth partitioning
const PARTITION_THRESHOLD: usize = 10;
// above this fixed ratio the design is a partial reconfiguration; anneal it
// flat
const PARTIAL_RECONFIGURE_RATIO: f64 = 0.5;

#[derive(Parser)]
#[clap(name = "weft", about = "Placement and routing for CGRAs")]
struct CommandLineArguments {
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand)]
enum MainCommand {
    /// Place a packed netlist onto a board layout
    Place {
        /// the board layout file
        layout: PathBuf,
        /// the packed netlist file
        packed: PathBuf,
        /// where to write the placement
        result: PathBuf,
        /// seed for every random number generator
        #[clap(long, default_value_t = 0)]
        seed: u64,
        /// reuse the result file as a fixed pre-placement
        #[clap(short, long)]
        fixed: bool,
    },
    /// Route a placed netlist over a routing graph
    Route {
        /// the routing graph file
        graph: PathBuf,
        /// the packed netlist file
        packed: PathBuf,
        /// the placement file
        placement: PathBuf,
        /// where to write the routing result
        result: PathBuf,
        /// the bus width to route
        #[clap(long, default_value_t = 1)]
        width: u32,
        /// the outer negotiation budget
        #[clap(long, default_value_t = 40)]
        max_iter: u32,
    },
}

fn main() {
    pretty_env_logger::init();
    let args = CommandLineArguments::parse();
    let result = match args.cmd {
        MainCommand::Place { layout, packed, result, seed, fixed } => {
            place_main(&layout, &packed, &result, seed, fixed)
        }
        MainCommand::Route { graph, packed, placement, result, width, max_iter } => {
            route_main(&graph, &packed, &placement, &result, width, max_iter)
        }
    };
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        exit(1);
    }
}

fn route_main(
    graph_file: &PathBuf,
    packed_file: &PathBuf,
    placement_file: &PathBuf,
    result_file: &PathBuf,
    width: u32,
    max_iter: u32,
) -> Result<(), Box<dyn Error>> {
    let graph = io::load_routing_graph(graph_file)?;
    let mut router = GlobalRouter::new(max_iter, graph);
    io::setup_router_input(&mut router, packed_file, placement_file, width)?;

    router.route()?;

    io::dump_routing_result(router.router(), result_file)?;
    Ok(())
}

// strip the ports off the packed netlist
fn convert_netlist(
    netlist: &BTreeMap<String, Vec<(String, String)>>,
) -> BTreeMap<String, Vec<String>> {
    netlist
        .iter()
        .map(|(net_id, net)| {
            (net_id.clone(), net.iter().map(|(blk, _)| blk.clone()).collect())
        })
        .collect()
}

fn disable_global_placement() -> bool {
    std::env::var_os("DISABLE_GP").is_some() || std::env::var_os("SKIP_GP").is_some()
}

// nothing to do once the fixed placement covers every block
fn early_termination(
    prefix: &BTreeMap<String, (i32, i32)>,
    raw_clusters: &BTreeMap<usize, BTreeSet<String>>,
) -> bool {
    let mut count = 0;
    let mut prefix_size = 0;
    for cluster in raw_clusters.values() {
        count += cluster.len();
        prefix_size += cluster.iter().filter(|blk| prefix.contains_key(*blk)).count();
    }
    count <= prefix_size
}

fn place_main(
    layout_file: &PathBuf,
    packed_file: &PathBuf,
    result_file: &PathBuf,
    seed: u64,
    use_prefix: bool,
) -> Result<(), Box<dyn Error>> {
    let layout = io::load_layout(layout_file)?;
    let (raw_netlist, _) = io::load_netlist(packed_file)?;
    let id_to_name = io::load_id_to_name(packed_file)?;

    let netlist = convert_netlist(&raw_netlist);

    // only partition designs worth partitioning
    let blks: BTreeSet<&String> = netlist.values().flatten().collect();
    let raw_clusters = if blks.len() > PARTITION_THRESHOLD {
        partition_netlist(&netlist)
    } else {
        let mut clusters = BTreeMap::new();
        clusters.insert(0, blks.iter().map(|b| b.to_string()).collect());
        clusters
    };

    // pin the IO blocks (and any pre-placement) first
    let prefix =
        if use_prefix { io::load_placement(result_file)? } else { BTreeMap::new() };
    let fixed_pos = place_io_blocks(&netlist, &layout, &prefix)?;

    if early_termination(&fixed_pos, &raw_clusters) {
        warn!("Nothing to be done");
        return Ok(());
    }

    let total_blk_count: usize = raw_clusters.values().map(|c| c.len()).sum();
    let fixed_ratio = fixed_pos.len() as f64 / total_blk_count as f64;

    let mut clusters = place::convert_clusters(&raw_clusters, &fixed_pos);

    // with a single cluster, a tiny board, or a mostly-fixed design the
    // analytical phase buys nothing; anneal flat instead
    let (width, height) = layout.get_size();
    let gp_result = if clusters.len() == 1
        || (width <= DIM_THRESHOLD && height <= DIM_THRESHOLD)
        || fixed_ratio >= PARTIAL_RECONFIGURE_RATIO
        || disable_global_placement()
    {
        let mut new_cluster: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for cluster in clusters.values() {
            new_cluster.entry("x0".to_string()).or_default().extend(cluster.iter().cloned());
        }
        clusters = new_cluster;

        let mut cells: BTreeMap<char, BTreeSet<(i32, i32)>> = BTreeMap::new();
        for (blk_type, pos) in layout.produce_available_pos() {
            cells.insert(blk_type, pos.into_iter().collect());
        }
        let mut gp_result = BTreeMap::new();
        gp_result.insert("x0".to_string(), cells);
        gp_result
    } else {
        let mut gp =
            GlobalPlacer::new(clusters.clone(), netlist.clone(), fixed_pos.clone(), &layout)?;
        gp.set_seed(seed);

        // weigh the annealing overlap penalty by how full the board is
        let clb_type = layout.get_clb_type();
        let num_blks_layout =
            layout.get_layer(clb_type)?.produce_available_pos().len() as f64;
        let num_blks = clusters
            .values()
            .flatten()
            .filter(|blk| blk.starts_with(clb_type))
            .count() as f64;
        let fill_ratio = (num_blks / num_blks_layout).min(0.99);
        let base_factor = if fill_ratio > 0.8 { 1.2 } else { 1.0 };
        gp.anneal_param_factor = base_factor / (1.0 - fill_ratio);
        info!("Use anneal_param_factor {}", gp.anneal_param_factor);

        gp.solve();
        gp.anneal();
        gp.realize()?
    };

    let dp_result = detailed_placement(&clusters, &netlist, &fixed_pos, &gp_result, &layout)?;

    // a final flat refinement over the whole board
    let mut global_refine = DetailedPlacer::with_placement(
        &dp_result,
        &netlist,
        &layout.produce_available_pos(),
        &fixed_pos,
        true,
    )?;
    global_refine.set_seed(seed);
    let num_iter = (100.0 * (dp_result.len() as f64).powf(1.33)) as usize;
    global_refine.refine(num_iter, 0.001);
    let mut result = global_refine.realize();

    // the fixed blocks are part of the design too
    for (blk, &pos) in fixed_pos.iter() {
        result.insert(blk.clone(), pos);
    }

    check_placement(&raw_netlist, &result, &layout)?;

    io::save_placement(&result, &id_to_name, result_file)?;
    Ok(())
}
