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

//! # Text Formats
//!
//! Readers and writers for the five on-disk formats: the packed netlist,
//! the placement file, the layout file, the routing-graph file and the
//! routing result file. The formats are stable wire formats; the writers
//! order everything deterministically so that equal inputs produce
//! byte-identical files.

use crate::device::{
    DeviceError, Node, NodeId, NodeKind, NodeSpec, RoutingGraph, Switch, SwitchIo, SwitchSide,
    SwitchWire,
};
use crate::place::{Layer, Layout, PlaceError};
use crate::router::{RouteError, Router};

use itertools::Itertools;
use log::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

const BEGIN: &str = "BEGIN";
const END: &str = "END";
const DELIMITER: &[char] = &[':', ' ', '\t', ',', '(', ')'];

/// Errors while reading or writing the on-disk formats
#[derive(Error, Debug)]
pub enum IoError {
    /// The input file does not exist
    #[error("{0} does not exist")]
    FileNotFound(String),
    /// A line could not be parsed
    #[error("unable to process line {0}")]
    ParseError(String),
    /// A section marker or node token was expected
    #[error("expect {expected}, got {got}")]
    UnexpectedToken {
        /// what the parser was looking for
        expected: String,
        /// what the line actually held
        got: String,
    },
    /// The two sections of the packed netlist disagree
    #[error("netlist size doesn't match with netlist bus")]
    NetlistBusMismatch,
    /// A layout layer has rows of differing lengths
    #[error("not a rectangular layout")]
    RaggedLayout,
    /// A realized net does not start at its source
    #[error("unexpected state: src has to be the beginning of the net segments")]
    MissingSource,
    /// Error propagated from the operating system
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// Error propagated from the device model
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    /// Error propagated from the router
    #[error("Routing Error: {0}")]
    Route(#[from] RouteError),
    /// Error propagated from the layout model
    #[error("Placement Error: {0}")]
    Place(#[from] PlaceError),
}

/// Splits a line on the delimiter set `": \t,()"`, dropping empty tokens.
pub fn get_tokens(line: &str) -> Vec<String> {
    line.split(|c| DELIMITER.contains(&c))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn open_reader(filename: &Path) -> Result<BufReader<File>, IoError> {
    if !filename.exists() {
        return Err(IoError::FileNotFound(filename.display().to_string()));
    }
    Ok(BufReader::new(File::open(filename)?))
}

fn parse_u32(token: &str, line: &str) -> Result<u32, IoError> {
    token.parse::<u32>().map_err(|_| IoError::ParseError(line.to_string()))
}

// ---------------------------------------------------------------------
// packed netlist
// ---------------------------------------------------------------------

/// Loads a packed netlist: the `Netlists:` section (net id -> pin list)
/// and the `Netlist Bus:` section (net id -> bus width). Both sections are
/// blank-line terminated and must cover the same net ids; `#` starts a
/// comment.
#[allow(clippy::type_complexity)]
pub fn load_netlist(
    filename: &Path,
) -> Result<(BTreeMap<String, Vec<(String, String)>>, BTreeMap<String, u32>), IoError> {
    let reader = open_reader(filename)?;

    let mut in_netlist = false;
    let mut in_bus = false;
    let mut netlist = BTreeMap::new();
    let mut track_mode = BTreeMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if in_netlist {
            if line.is_empty() {
                in_netlist = false;
                continue;
            }
            let tokens = get_tokens(line);
            if tokens.len() % 2 != 1 {
                return Err(IoError::ParseError(line.to_string()));
            }
            let net_id = tokens[0].clone();
            let net: Vec<(String, String)> = tokens[1..]
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
            netlist.insert(net_id, net);
            continue;
        }
        if in_bus {
            if line.is_empty() {
                in_bus = false;
                continue;
            }
            let tokens = get_tokens(line);
            if tokens.len() != 2 {
                return Err(IoError::ParseError(line.to_string()));
            }
            let width = parse_u32(&tokens[1], line)?;
            track_mode.insert(tokens[0].clone(), width);
            continue;
        }

        // state control
        if line == "Netlists:" {
            in_netlist = true;
        } else if line == "Netlist Bus:" {
            in_bus = true;
        }
    }

    if netlist.len() != track_mode.len() {
        return Err(IoError::NetlistBusMismatch);
    }
    Ok((netlist, track_mode))
}

/// Loads the optional `ID to Name:` section of a packed netlist. Absent
/// sections yield an empty map; [`save_placement`] then falls back to the
/// block id itself.
pub fn load_id_to_name(filename: &Path) -> Result<BTreeMap<String, String>, IoError> {
    let reader = open_reader(filename)?;
    let mut result = BTreeMap::new();
    let mut in_section = false;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if in_section {
            if line.is_empty() {
                break;
            }
            let tokens = get_tokens(line);
            if tokens.len() != 2 {
                return Err(IoError::ParseError(line.to_string()));
            }
            result.insert(tokens[0].clone(), tokens[1].clone());
        } else if line == "ID to Name:" {
            in_section = true;
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------
// placement
// ---------------------------------------------------------------------

/// Loads a placement file: two header lines, then one
/// `<name> <x> <y> #<blk_id>` row per block.
pub fn load_placement(filename: &Path) -> Result<BTreeMap<String, (i32, i32)>, IoError> {
    let reader = open_reader(filename)?;
    let mut placement = BTreeMap::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line_num < 2 {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = get_tokens(line);
        if tokens.len() != 4 {
            return Err(IoError::ParseError(line.to_string()));
        }
        let x = parse_u32(&tokens[1], line)? as i32;
        let y = parse_u32(&tokens[2], line)? as i32;
        let blk_id = tokens[3].trim_start_matches('#').to_string();
        placement.insert(blk_id, (x, y));
    }
    Ok(placement)
}

/// Saves a placement, one sorted `<name> <x> <y> #<blk_id>` row per block.
pub fn save_placement(
    placement: &BTreeMap<String, (i32, i32)>,
    id_to_name: &BTreeMap<String, String>,
    filename: &Path,
) -> Result<(), IoError> {
    let mut out = BufWriter::new(File::create(filename)?);
    writeln!(out, "Block Name\t\t\tX\tY\t\t#Block ID")?;
    writeln!(out, "---------------------------")?;
    for (blk_id, &(x, y)) in placement.iter() {
        let name = id_to_name.get(blk_id).unwrap_or(blk_id);
        writeln!(out, "{}\t\t{}\t{}\t\t#{}", name, x, y, blk_id)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// layout
// ---------------------------------------------------------------------

/// Loads a board layout: per layer a `LAYOUT <char> <major> <minor>`
/// header followed by a `BEGIN`/`END` block of `0`/`1` rows.
pub fn load_layout(filename: &Path) -> Result<Layout, IoError> {
    let reader = open_reader(filename)?;
    let mut layout = Layout::new();

    let mut lines = reader.lines();
    while let Some(line) = lines.next() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = get_tokens(line);
        if tokens.len() != 4 || tokens[0] != "LAYOUT" {
            return Err(IoError::UnexpectedToken {
                expected: "LAYOUT header".to_string(),
                got: line.to_string(),
            });
        }
        let blk_type = tokens[1].chars().next().unwrap();
        let major = parse_u32(&tokens[2], line)?;
        let minor = parse_u32(&tokens[3], line)?;

        match lines.next() {
            Some(line) if line.as_ref().map(|l| l.trim() == BEGIN).unwrap_or(false) => {}
            other => {
                let got = other.transpose()?.unwrap_or_default();
                return Err(IoError::UnexpectedToken { expected: BEGIN.to_string(), got });
            }
        }

        let mut rows: Vec<Vec<bool>> = Vec::new();
        for line in &mut lines {
            let line = line?;
            let line = line.trim();
            if line == END {
                break;
            }
            let mut row = Vec::with_capacity(line.len());
            for c in line.chars() {
                match c {
                    '1' => row.push(true),
                    '0' => row.push(false),
                    _ => return Err(IoError::ParseError(line.to_string())),
                }
            }
            if let Some(first) = rows.first() {
                if first.len() != row.len() {
                    return Err(IoError::RaggedLayout);
                }
            }
            rows.push(row);
        }

        let height = rows.len() as u32;
        let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
        let mut layer = Layer::new(blk_type, width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, &available) in row.iter().enumerate() {
                if available {
                    layer.mark_available(x as u32, y as u32);
                }
            }
        }
        layout.add_layer_with_priority(layer, major, minor)?;
    }
    Ok(layout)
}

/// Dumps a board layout, one `LAYOUT` section per layer in block-type
/// order.
pub fn dump_layout(layout: &Layout, filename: &Path) -> Result<(), IoError> {
    let mut out = BufWriter::new(File::create(filename)?);
    let (width, height) = layout.get_size();
    for blk_type in layout.get_layer_types() {
        let layer = layout.get_layer(blk_type)?;
        let major = layout.get_priority_major(blk_type);
        let minor = layout.get_priority_minor(blk_type);
        writeln!(out, "LAYOUT {} {} {}", blk_type, major, minor)?;
        writeln!(out, "{}", BEGIN)?;
        for y in 0..height {
            for x in 0..width {
                write!(out, "{}", if layer.get(x, y) { '1' } else { '0' })?;
            }
            writeln!(out)?;
        }
        writeln!(out, "{}", END)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// routing graph
// ---------------------------------------------------------------------

fn create_sb_from_tokens(tokens: &[String], line: &str) -> Result<NodeSpec, IoError> {
    if tokens.len() < 7 {
        return Err(IoError::ParseError(line.to_string()));
    }
    // track, x, y, side, io, width
    let values: Vec<u32> = tokens[1..7]
        .iter()
        .map(|t| parse_u32(t, line))
        .collect::<Result<_, _>>()?;
    Ok(NodeSpec::SwitchBox {
        x: values[1],
        y: values[2],
        track: values[0],
        side: SwitchSide::from_value(values[3])?,
        io: SwitchIo::from_value(values[4])?,
        width: values[5],
    })
}

fn create_port_from_tokens(tokens: &[String], line: &str) -> Result<NodeSpec, IoError> {
    if tokens.len() < 5 {
        return Err(IoError::ParseError(line.to_string()));
    }
    // x, y, width
    let values: Vec<u32> = tokens[2..5]
        .iter()
        .map(|t| parse_u32(t, line))
        .collect::<Result<_, _>>()?;
    Ok(NodeSpec::Port { name: tokens[1].clone(), x: values[0], y: values[1], width: values[2] })
}

fn create_reg_from_tokens(tokens: &[String], line: &str) -> Result<NodeSpec, IoError> {
    if tokens.len() < 6 {
        return Err(IoError::ParseError(line.to_string()));
    }
    // track, x, y, width
    let values: Vec<u32> = tokens[2..6]
        .iter()
        .map(|t| parse_u32(t, line))
        .collect::<Result<_, _>>()?;
    Ok(NodeSpec::Register {
        name: tokens[1].clone(),
        track: values[0],
        x: values[1],
        y: values[2],
        width: values[3],
    })
}

fn node_spec_from_tokens(tokens: &[String], line: &str) -> Result<Option<NodeSpec>, IoError> {
    match tokens.first().map(|t| t.as_str()) {
        Some("SB") => create_sb_from_tokens(tokens, line).map(Some),
        Some("PORT") => create_port_from_tokens(tokens, line).map(Some),
        Some("REG") => create_reg_from_tokens(tokens, line).map(Some),
        _ => Ok(None),
    }
}

// read the BEGIN/END block following a node header and connect every
// descriptor inside as an out-neighbour of `from`
fn connect_nodes<I>(from: &NodeSpec, lines: &mut I, graph: &mut RoutingGraph) -> Result<(), IoError>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    // the next non-empty line has to be BEGIN
    let mut begin_seen = false;
    for line in lines.by_ref() {
        let line = line?;
        let line = line.trim().to_string();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !begin_seen {
            if line != BEGIN {
                return Err(IoError::UnexpectedToken { expected: BEGIN.to_string(), got: line });
            }
            begin_seen = true;
            continue;
        }
        if line == END {
            return Ok(());
        }
        let tokens = get_tokens(&line);
        match node_spec_from_tokens(&tokens, &line)? {
            Some(to) => graph.add_edge(from, &to)?,
            None => {
                return Err(IoError::UnexpectedToken {
                    expected: "node descriptor".to_string(),
                    got: line,
                })
            }
        }
    }
    Err(IoError::UnexpectedToken { expected: END.to_string(), got: String::new() })
}

/// Loads a routing-graph file. The first pass creates the switch templates
/// and the tiles; the second pass replays every node's adjacency block.
pub fn load_routing_graph(filename: &Path) -> Result<RoutingGraph, IoError> {
    let reader = open_reader(filename)?;
    let all_lines: Vec<String> =
        reader.lines().collect::<Result<_, _>>().map_err(IoError::Io)?;

    let mut graph = RoutingGraph::new();
    let mut switch_map: BTreeMap<u32, Switch> = BTreeMap::new();

    // first pass: switches and tiles
    let mut iter = all_lines.iter();
    while let Some(raw) = iter.next() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = get_tokens(line);
        match tokens.first().map(|t| t.as_str()) {
            Some("SWITCH") => {
                if tokens.len() != 4 {
                    return Err(IoError::ParseError(line.to_string()));
                }
                let width = parse_u32(&tokens[1], line)?;
                let id = parse_u32(&tokens[2], line)?;
                let num_track = parse_u32(&tokens[3], line)?;

                match iter.next() {
                    Some(l) if l.trim() == BEGIN => {}
                    other => {
                        return Err(IoError::UnexpectedToken {
                            expected: BEGIN.to_string(),
                            got: other.cloned().unwrap_or_default(),
                        })
                    }
                }
                let mut wires = BTreeSet::new();
                for raw in iter.by_ref() {
                    let line = raw.trim();
                    if line == END {
                        break;
                    }
                    let tokens = get_tokens(line);
                    if tokens.len() != 4 {
                        return Err(IoError::ParseError(line.to_string()));
                    }
                    wires.insert(SwitchWire::new(
                        parse_u32(&tokens[0], line)?,
                        SwitchSide::from_value(parse_u32(&tokens[1], line)?)?,
                        parse_u32(&tokens[2], line)?,
                        SwitchSide::from_value(parse_u32(&tokens[3], line)?)?,
                    ));
                }
                switch_map.insert(id, Switch::new(id, width, num_track, wires));
            }
            Some("TILE") => {
                if tokens.len() != 5 {
                    return Err(IoError::ParseError(line.to_string()));
                }
                let x = parse_u32(&tokens[1], line)?;
                let y = parse_u32(&tokens[2], line)?;
                let height = parse_u32(&tokens[3], line)?;
                let switch_id = parse_u32(&tokens[4], line)?;
                let switch = switch_map
                    .get(&switch_id)
                    .ok_or(DeviceError::SwitchNotFound(switch_id))?;
                graph.add_tile(x, y, height, switch)?;
            }
            _ => {}
        }
    }

    // second pass: node adjacency
    let mut iter = all_lines.iter().map(|l| std::io::Result::Ok(l.clone()));
    while let Some(raw) = iter.next() {
        let raw: String = raw?;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens = get_tokens(line);
        if let Some(from) = node_spec_from_tokens(&tokens, line)? {
            connect_nodes(&from, &mut iter, &mut graph)?;
        }
    }

    debug!("loaded routing graph with {} nodes", graph.num_nodes());
    Ok(graph)
}

// the deterministic neighbour order of the dump: descending by position,
// track, direction and side (or name)
fn conn_sort_key(node: &Node) -> (u32, u32, u32, u32, u32, String) {
    let (side, io) = match node.kind {
        NodeKind::SwitchBox { side, io } => (side.value(), io.value()),
        _ => (0, 0),
    };
    (node.y, node.x, node.track, io, side, node.name.clone())
}

fn print_conn(
    out: &mut impl Write,
    pad: &str,
    graph: &RoutingGraph,
    node: NodeId,
) -> Result<(), IoError> {
    let nodes = graph
        .node(node)
        .neighbors()
        .sorted_by(|&a, &b| conn_sort_key(graph.node(b)).cmp(&conn_sort_key(graph.node(a))));
    for n in nodes {
        writeln!(out, "{}{}{}", pad, pad, graph.node(n))?;
    }
    Ok(())
}

fn print_node_block(
    out: &mut impl Write,
    pad: &str,
    graph: &RoutingGraph,
    node: NodeId,
) -> Result<(), IoError> {
    writeln!(out, "{}{}", pad, graph.node(node))?;
    writeln!(out, "{}{}", pad, BEGIN)?;
    print_conn(out, pad, graph, node)?;
    writeln!(out, "{}{}", pad, END)?;
    Ok(())
}

/// Dumps a routing graph: the deduplicated switch templates first, then
/// every tile with the adjacency of its outgoing switch boxes, connected
/// ports and registers. Incoming switch-box edges are not written; they are
/// reconstructed from the switch templates on load.
pub fn dump_routing_graph(graph: &RoutingGraph, filename: &Path) -> Result<(), IoError> {
    let mut out = BufWriter::new(File::create(filename)?);
    const PAD: &str = "  ";

    for switch in graph.switches() {
        writeln!(out, "SWITCH {} {} {}", switch.width, switch.id, switch.num_track)?;
        writeln!(out, "{}", BEGIN)?;
        for wire in switch.internal_wires() {
            writeln!(
                out,
                "{}{} {} {} {}",
                PAD,
                wire.track_from,
                wire.side_from.value(),
                wire.track_to,
                wire.side_to.value()
            )?;
        }
        writeln!(out, "{}", END)?;
    }

    for tile in graph.tiles() {
        writeln!(out, "{}", tile)?;
        for &side in SwitchSide::sides().iter() {
            for sb in tile.sbs_by_side(side) {
                // incoming nodes are connected internally through the
                // switch template, so only outgoing ones are dumped
                let node = graph.node(sb);
                let is_out = matches!(node.kind, NodeKind::SwitchBox { io: SwitchIo::Out, .. });
                if !is_out || node.degree() == 0 {
                    continue;
                }
                print_node_block(&mut out, PAD, graph, sb)?;
            }
        }
        for (_, port) in tile.ports() {
            // ports without edges are referenced by other tiles only; skip
            // them to compress the output
            if graph.node(port).degree() == 0 {
                continue;
            }
            print_node_block(&mut out, PAD, graph, port)?;
        }
        for (_, reg) in tile.registers() {
            print_node_block(&mut out, PAD, graph, reg)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// routing result
// ---------------------------------------------------------------------

/// Dumps the realized routing result: per net a `Net ID:` header, then one
/// `Segment:` block per sink in pin order, followed by a blank line.
pub fn dump_routing_result(router: &Router, filename: &Path) -> Result<(), IoError> {
    let mut out = BufWriter::new(File::create(filename)?);
    let routes = router.realize()?;
    let graph = router.graph();

    for net in router.netlist().iter() {
        let segments = &routes[&net.name];
        writeln!(out, "Net ID: {} Segment Size: {}", net.name, segments.len())?;
        let src = net.source().node;
        let mut has_src = false;
        for (seg_index, segment) in segments.iter().enumerate() {
            writeln!(out, "Segment: {} Size: {}", seg_index, segment.len())?;
            for (node_index, &node) in segment.iter().enumerate() {
                if node_index == 0 && Some(node) == src {
                    has_src = true;
                }
                writeln!(out, "{}", graph.node(node))?;
            }
        }
        if !has_src {
            return Err(IoError::MissingSource);
        }
        writeln!(out)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// glue
// ---------------------------------------------------------------------

/// Feeds a loaded placement and all nets of the given bus width into a
/// router.
pub fn setup_router_input(
    router: &mut crate::router::GlobalRouter,
    packed_filename: &Path,
    placement_filename: &Path,
    width: u32,
) -> Result<(), IoError> {
    let (netlist, track_mode) = load_netlist(packed_filename)?;
    info!("netlist: {}", netlist.len());
    let placement = load_placement(placement_filename)?;
    for (blk_id, &(x, y)) in placement.iter() {
        router.add_placement(x as u32, y as u32, blk_id);
    }

    for (net_id, net) in netlist.iter() {
        // only route the nets of the requested bus width
        if track_mode.get(net_id) == Some(&width) {
            let pins: Vec<(&str, &str)> =
                net.iter().map(|(blk, port)| (blk.as_str(), port.as_str())).collect();
            router.add_net(net_id, &pins)?;
        }
    }
    Ok(())
}
