//! Task entity and wire records.
//!
//! A task is one node in the work hierarchy: scalar fields owned by the task
//! itself plus a cached layout position. Everything derived from the
//! hierarchy (visibility, rolled-up hour totals, ancestor chains) lives on
//! [`crate::index::TaskIndex`], which owns the parent/child adjacency the
//! derivations fold over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable task identifier, assigned by the store.
pub type TaskId = i64;

/// A 2D layout position (top-left anchored).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub x: f64,
    pub y: f64,
}

impl Pos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Wire-facing task record, as returned by the store's list query.
///
/// `hr_completed`/`hr_remaining` come from the task's most recent hour
/// snapshot; `hr_estimated` is completed + remaining of the earliest one
/// (the original estimate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTask {
    pub id: TaskId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub clear: bool,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub hide_children: bool,
    #[serde(default)]
    pub always_expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
    #[serde(default)]
    pub hr_completed: f64,
    #[serde(default)]
    pub hr_remaining: f64,
    #[serde(default)]
    pub hr_estimated: f64,
}

/// One task in the board's in-memory index.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub priority: Option<i32>,
    pub parent_id: Option<TaskId>,
    /// Suppress visibility of all descendants (not of the task itself).
    pub hide_children: bool,
    /// UI hint only; carried but not consumed by the core.
    pub always_expanded: bool,
    /// Soft-hidden without being trashed.
    pub clear: bool,
    /// Soft-deleted.
    pub trashed: bool,
    /// Own (non-recursive) hours, from the latest snapshot.
    pub hr_completed: f64,
    pub hr_remaining: f64,
    /// Own original estimate, from the earliest snapshot.
    pub hr_estimated_orig: f64,
    /// Layout output, cached here for rendering. Not a layout input.
    pub pos: Pos,
}

impl From<&ApiTask> for Task {
    fn from(base: &ApiTask) -> Self {
        Self {
            id: base.id,
            title: base.title.clone(),
            priority: base.priority,
            parent_id: base.parent_id,
            hide_children: base.hide_children,
            always_expanded: base.always_expanded,
            clear: base.clear,
            trashed: base.trashed,
            hr_completed: base.hr_completed,
            hr_remaining: base.hr_remaining,
            hr_estimated_orig: base.hr_estimated,
            pos: Pos::new(base.pos_x, base.pos_y),
        }
    }
}

impl Task {
    /// Minimal task for a known id, defaulted everywhere else.
    pub fn with_id(id: TaskId) -> Self {
        Self {
            id,
            title: String::new(),
            priority: None,
            parent_id: None,
            hide_children: false,
            always_expanded: false,
            clear: false,
            trashed: false,
            hr_completed: 0.0,
            hr_remaining: 0.0,
            hr_estimated_orig: 0.0,
            pos: Pos::default(),
        }
    }

    pub fn with_parent(mut self, parent_id: Option<TaskId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_hours(mut self, completed: f64, remaining: f64) -> Self {
        self.hr_completed = completed;
        self.hr_remaining = remaining;
        self
    }
}

/// Partial update applied to a task's own scalar fields.
///
/// `parent_id` is doubly-optional: `None` leaves the parent alone,
/// `Some(None)` detaches the task to a root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub priority: Option<Option<i32>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub parent_id: Option<Option<TaskId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_children: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_y: Option<f64>,
}

/// Serde helper distinguishing "field absent" from "field explicitly null".
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Ok(Some(Option::deserialize(deserializer)?))
    }
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.desc.is_none()
            && self.priority.is_none()
            && self.parent_id.is_none()
            && self.hide_children.is_none()
            && self.always_expanded.is_none()
            && self.clear.is_none()
            && self.trashed.is_none()
            && self.pos_x.is_none()
            && self.pos_y.is_none()
    }
}
