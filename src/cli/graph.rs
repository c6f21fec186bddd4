//! tb graph command implementation.
//!
//! Loads the board from the store, replays it into an in-memory index,
//! runs one layout pass, prints renderer-facing nodes and edges, and
//! (unless suppressed) writes the computed positions back to the store.

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::board_dir;
use crate::config::Config;
use crate::error::Result;
use crate::index::TaskIndex;
use crate::layout::{FlowEdge, FlowNode, GraphLayout};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::store::Store;
use crate::task::Task;

pub struct GraphOptions {
    pub node_height: f64,
    pub no_save: bool,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize)]
struct GraphData {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
}

pub fn run(opts: GraphOptions) -> Result<()> {
    let dir = board_dir(opts.dir)?;
    let config = Config::load_from_dir(&dir);
    let store = Store::new(config.data_dir(&dir), config.hours.debounce_minutes);

    let rows = store.list_tasks()?;
    let index = TaskIndex::new();
    for row in &rows {
        index.add_task(Task::from(row));
    }

    let layout = GraphLayout::new(&index, config.layout.clone());
    for row in &rows {
        layout.set_node_height(row.id, opts.node_height);
    }
    layout.flush();

    let data = GraphData {
        nodes: layout.flow_nodes(),
        edges: layout.flow_edges(),
    };

    if !opts.no_save {
        let positions: Vec<(i64, f64, f64)> = data
            .nodes
            .iter()
            .map(|node| (node.data.id, node.position.x, node.position.y))
            .collect();
        store.save_positions(&positions)?;
    }

    let mut human = HumanOutput::new("Graph layout");
    human.push_summary("nodes", data.nodes.len().to_string());
    human.push_summary("edges", data.edges.len().to_string());
    for node in &data.nodes {
        let title = if node.data.title.is_empty() {
            "(untitled)"
        } else {
            &node.data.title
        };
        human.push_detail(format!(
            "#{} {title} at ({:.0}, {:.0})",
            node.data.id, node.position.x, node.position.y
        ));
    }

    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "graph",
        &data,
        Some(&human),
    )
}
