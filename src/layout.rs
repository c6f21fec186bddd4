//! Graph-layout engine.
//!
//! Maintains a directed graph whose nodes are exactly the currently-visible
//! tasks (parent→child arcs restricted to visible endpoints) and assigns
//! each one an `(x, y)` position with a layered left-to-right layout:
//! ranks by longest path from the roots, upper-left alignment, fixed
//! minimum node separation, no ordering heuristic (speed over layout
//! quality, since the board re-lays-out constantly).
//!
//! Layout is O(V+E) over the whole visible set, so it must not run once per
//! field mutation: every notification from the index only *requests* a pass
//! via a dirty flag, and [`GraphLayout::flush`] runs at most one pass per
//! frame against the latest state. A flurry of mutations before the flush
//! collapses into exactly one consistent pass.
//!
//! Positions are computed center-anchored and stored top-left anchored
//! (`x - width/2`, `y - height/2`), matching what diagram renderers expect.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::debug;

use crate::config::LayoutConfig;
use crate::event::Subscription;
use crate::index::{TaskIndex, TaskRef};
use crate::task::{Pos, TaskId};

/// Layout-facing wrapper around one visible task: the measured pixel box
/// the renderer reported for it. Owned exclusively by the engine; created
/// when a task becomes visible, destroyed when it becomes invisible or is
/// deleted.
pub struct GraphTask {
    pub task: TaskRef,
    pub width: f64,
    pub height: f64,
}

/// Node descriptor consumed by a diagram renderer.
#[derive(Debug, Clone, Serialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub position: Pos,
    pub data: FlowNodeData,
}

/// Renderable snapshot of the task behind a node.
#[derive(Debug, Clone, Serialize)]
pub struct FlowNodeData {
    pub id: TaskId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    pub done: bool,
    pub is_parent: bool,
    pub hr_completed_total: f64,
    pub hr_remaining_total: f64,
}

/// Edge descriptor consumed by a diagram renderer.
#[derive(Debug, Clone, Serialize)]
pub struct FlowEdge {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub source: String,
    pub target: String,
}

struct LayoutState {
    index: TaskIndex,
    config: LayoutConfig,
    graph_tasks: RefCell<HashMap<TaskId, GraphTask>>,
    /// Externally-measured node heights; survive visibility flips so a
    /// re-shown task keeps its box.
    heights: RefCell<HashMap<TaskId, f64>>,
    dirty: Cell<bool>,
    _subs: RefCell<Vec<Subscription>>,
}

/// The layout engine. A passive observer of the index: wholly driven by its
/// add/delete/change channels plus externally-reported node sizes.
#[derive(Clone)]
pub struct GraphLayout {
    state: Rc<LayoutState>,
}

impl GraphLayout {
    pub fn new(index: &TaskIndex, config: LayoutConfig) -> Self {
        let state = Rc::new(LayoutState {
            index: index.clone(),
            config,
            graph_tasks: RefCell::new(HashMap::new()),
            heights: RefCell::new(HashMap::new()),
            dirty: Cell::new(true),
            _subs: RefCell::new(Vec::new()),
        });

        let mut subs = Vec::new();

        let weak: Weak<LayoutState> = Rc::downgrade(&state);
        subs.push(index.on_add(move |_, _| {
            if let Some(state) = weak.upgrade() {
                state.dirty.set(true);
            }
        }));

        let weak = Rc::downgrade(&state);
        subs.push(index.on_change(move |_| {
            if let Some(state) = weak.upgrade() {
                state.dirty.set(true);
            }
        }));

        let weak = Rc::downgrade(&state);
        subs.push(index.on_delete(move |id, _| {
            if let Some(state) = weak.upgrade() {
                state.graph_tasks.borrow_mut().remove(&id);
                state.heights.borrow_mut().remove(&id);
                state.dirty.set(true);
            }
        }));

        *state._subs.borrow_mut() = subs;

        Self { state }
    }

    /// Report a measured node height (from the rendering collaborator).
    pub fn set_node_height(&self, id: TaskId, height: f64) {
        let previous = self.state.heights.borrow_mut().insert(id, height);
        if previous == Some(height) {
            return;
        }
        if let Some(graph_task) = self.state.graph_tasks.borrow_mut().get_mut(&id) {
            graph_task.height = height;
        }
        self.state.dirty.set(true);
    }

    /// Schedule a re-layout. Requests coalesce: many calls before the next
    /// [`flush`](Self::flush) produce a single pass.
    pub fn request_layout(&self) {
        self.state.dirty.set(true);
    }

    pub fn needs_layout(&self) -> bool {
        self.state.dirty.get()
    }

    /// Run the pending layout pass, if any. Returns whether a pass ran.
    ///
    /// Reads the *latest* index state, not a snapshot from request time. One
    /// visible-set snapshot is taken here and used for graph membership,
    /// edge construction, and position read-back alike, so the pass can
    /// never read a node it did not lay out.
    pub fn flush(&self) -> bool {
        if !self.state.dirty.get() {
            return false;
        }

        let state = &self.state;
        let index = &state.index;
        let visible_ids = index.visible_task_ids();
        let visible_set: HashSet<TaskId> = visible_ids.iter().copied().collect();

        // Reconcile graph-task membership against the snapshot.
        {
            let mut graph_tasks = state.graph_tasks.borrow_mut();
            graph_tasks.retain(|id, _| visible_set.contains(id));
            let heights = state.heights.borrow();
            for &id in &visible_ids {
                if graph_tasks.contains_key(&id) {
                    continue;
                }
                if let Some(task) = index.get(id) {
                    graph_tasks.insert(
                        id,
                        GraphTask {
                            task,
                            width: state.config.node_width,
                            height: heights.get(&id).copied().unwrap_or(0.0),
                        },
                    );
                }
            }
        }

        // Build layout inputs from the same snapshot.
        let graph_tasks = state.graph_tasks.borrow();
        let mut nodes = Vec::with_capacity(visible_ids.len());
        let mut edges = Vec::new();
        for &id in &visible_ids {
            let Some(graph_task) = graph_tasks.get(&id) else {
                continue;
            };
            nodes.push(LayoutNode {
                id,
                width: graph_task.width,
                height: graph_task.height,
            });

            if let Some(parent_id) = graph_task.task.borrow().parent_id {
                if visible_set.contains(&parent_id) {
                    edges.push((parent_id, id));
                }
            }
        }

        let positions =
            layered_positions(&nodes, &edges, state.config.node_sep, state.config.rank_sep);

        for node in &nodes {
            if let Some(&(cx, cy)) = positions.get(&node.id) {
                index.set_pos(
                    node.id,
                    Pos::new(cx - node.width / 2.0, cy - node.height / 2.0),
                );
            }
        }

        state.dirty.set(false);
        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            "layout pass complete"
        );
        true
    }

    /// Renderer-facing node list over the current visible set.
    pub fn flow_nodes(&self) -> Vec<FlowNode> {
        let index = &self.state.index;
        let graph_tasks = self.state.graph_tasks.borrow();
        let mut ids: Vec<TaskId> = graph_tasks.keys().copied().collect();
        ids.sort_unstable();

        ids.iter()
            .map(|&id| {
                let task = graph_tasks[&id].task.borrow();
                FlowNode {
                    id: id.to_string(),
                    kind: "task",
                    position: task.pos,
                    data: FlowNodeData {
                        id,
                        title: task.title.clone(),
                        priority: task.priority,
                        done: index.done(id),
                        is_parent: index.is_parent(id),
                        hr_completed_total: index.hr_completed_total(id),
                        hr_remaining_total: index.hr_remaining_total(id),
                    },
                }
            })
            .collect()
    }

    /// Renderer-facing edge list: parent→child arcs with both endpoints in
    /// the current visible set.
    pub fn flow_edges(&self) -> Vec<FlowEdge> {
        let graph_tasks = self.state.graph_tasks.borrow();
        let mut ids: Vec<TaskId> = graph_tasks.keys().copied().collect();
        ids.sort_unstable();

        ids.iter()
            .filter_map(|&id| {
                let parent_id = graph_tasks[&id].task.borrow().parent_id?;
                if !graph_tasks.contains_key(&parent_id) {
                    return None;
                }
                Some(FlowEdge {
                    id: format!("e{}-{}", parent_id, id),
                    kind: "ancestry",
                    source: parent_id.to_string(),
                    target: id.to_string(),
                })
            })
            .collect()
    }

    /// Number of nodes currently in the layout graph.
    pub fn node_count(&self) -> usize {
        self.state.graph_tasks.borrow().len()
    }
}

struct LayoutNode {
    id: TaskId,
    width: f64,
    height: f64,
}

/// Assign center-anchored positions to a layered left-to-right graph.
///
/// Ranks are the longest path from a root (an edge into a node pushes it at
/// least one rank right of its parent); a cyclic edge is skipped rather
/// than followed. Within a rank, nodes keep a stable order: first by the
/// order of their first-laid-out parent, then by id. No ordering heuristic
/// beyond that is applied.
fn layered_positions(
    nodes: &[LayoutNode],
    edges: &[(TaskId, TaskId)],
    node_sep: f64,
    rank_sep: f64,
) -> HashMap<TaskId, (f64, f64)> {
    if nodes.is_empty() {
        return HashMap::new();
    }

    let node_ids: HashSet<TaskId> = nodes.iter().map(|n| n.id).collect();
    let mut parents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for &(source, target) in edges {
        if node_ids.contains(&source) && node_ids.contains(&target) {
            parents.entry(target).or_default().push(source);
        }
    }
    for parent_list in parents.values_mut() {
        parent_list.sort_unstable();
    }

    fn rank_of(
        id: TaskId,
        parents: &HashMap<TaskId, Vec<TaskId>>,
        memo: &mut HashMap<TaskId, usize>,
        on_stack: &mut HashSet<TaskId>,
    ) -> usize {
        if let Some(&rank) = memo.get(&id) {
            return rank;
        }
        if !on_stack.insert(id) {
            return 0;
        }

        let rank = parents
            .get(&id)
            .map(|parent_ids| {
                parent_ids
                    .iter()
                    .map(|&p| rank_of(p, parents, memo, on_stack) + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        on_stack.remove(&id);
        memo.insert(id, rank);
        rank
    }

    let mut ranks: HashMap<TaskId, usize> = HashMap::new();
    let mut on_stack = HashSet::new();
    for node in nodes {
        rank_of(node.id, &parents, &mut ranks, &mut on_stack);
    }

    let max_rank = ranks.values().copied().max().unwrap_or(0);
    let mut by_rank: Vec<Vec<&LayoutNode>> = vec![Vec::new(); max_rank + 1];
    for node in nodes {
        by_rank[ranks[&node.id]].push(node);
    }

    // Stable within-rank order: follow the first-ordered parent, break ties
    // by id. Rank 0 is plain id order (`nodes` arrives id-sorted).
    let mut order: HashMap<TaskId, usize> = HashMap::new();
    for rank_nodes in by_rank.iter_mut() {
        rank_nodes.sort_by_key(|node| {
            let parent_order = parents
                .get(&node.id)
                .into_iter()
                .flatten()
                .filter_map(|p| order.get(p).copied())
                .min()
                .unwrap_or(usize::MAX);
            (parent_order, node.id)
        });
        for (position, node) in rank_nodes.iter().enumerate() {
            order.insert(node.id, position);
        }
    }

    // Upper-left aligned coordinates: every rank starts at y = 0; ranks are
    // placed left to right, each as wide as its widest node.
    let mut positions = HashMap::with_capacity(nodes.len());
    let mut x_cursor = 0.0;
    for rank_nodes in &by_rank {
        let rank_width = rank_nodes
            .iter()
            .map(|n| n.width)
            .fold(0.0f64, f64::max);

        let mut y_cursor = 0.0;
        for node in rank_nodes {
            positions.insert(
                node.id,
                (x_cursor + rank_width / 2.0, y_cursor + node.height / 2.0),
            );
            y_cursor += node.height + node_sep;
        }

        x_cursor += rank_width + rank_sep;
    }

    positions
}
