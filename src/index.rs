//! The task index: authoritative collection of live tasks plus the
//! parent→children adjacency structure.
//!
//! The index is the single source of truth. Downstream consumers (layout
//! engine, bucketing) are passive observers driven by the index's add,
//! delete, and change channels; nothing polls.
//!
//! Derived values (`visible`, recursive hour totals, `done`, ancestor
//! chains) are pure on-demand recomputations over the current adjacency,
//! never imperatively cached, so they can't go stale across insertions,
//! deletions, or reparenting. Each recursive read carries a visited-set
//! guard: a transiently cyclic parent chain truncates instead of looping.
//!
//! Missing references are conditions, not errors: an orphaned parent id
//! reads as "visible root", a broken ancestor chain truncates silently, an
//! unknown parent id gets an empty child-set entry.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{EventSource, Subscription};
use crate::event_map::EventMap;
use crate::task::{Pos, Task, TaskId, TaskPatch};

/// Shared handle to one live task.
pub type TaskRef = Rc<RefCell<Task>>;

struct Inner {
    tasks: EventMap<TaskId, TaskRef>,
    parents_to_child_ids: RefCell<HashMap<TaskId, HashSet<TaskId>>>,
    change_event: EventSource<TaskId>,
    /// Per-task listener scopes established by `task_effect`; dropped (and
    /// thereby revoked) when the task is deleted.
    scopes: RefCell<HashMap<TaskId, Vec<Subscription>>>,
}

impl Inner {
    fn link_to_parent(&self, child_id: TaskId, parent_id: Option<TaskId>) {
        let Some(parent_id) = parent_id else { return };

        // An unknown parent id still gets a child-set entry; no task needs
        // to back it.
        self.parents_to_child_ids
            .borrow_mut()
            .entry(parent_id)
            .or_default()
            .insert(child_id);
    }

    fn unlink_from_parent(&self, child_id: TaskId, parent_id: Option<TaskId>) {
        let Some(parent_id) = parent_id else { return };

        if let Some(child_ids) = self.parents_to_child_ids.borrow_mut().get_mut(&parent_id) {
            child_ids.remove(&child_id);
        }
    }
}

/// The authoritative task collection. Cheap to clone (shared handle).
#[derive(Clone)]
pub struct TaskIndex {
    inner: Rc<Inner>,
}

impl Default for TaskIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskIndex {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                tasks: EventMap::new(),
                parents_to_child_ids: RefCell::new(HashMap::new()),
                change_event: EventSource::new(),
                scopes: RefCell::new(HashMap::new()),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Insert a task, link it under its parent, and emit an add
    /// notification.
    pub fn add_task(&self, task: impl Into<Task>) -> TaskRef {
        let mut task = task.into();

        // Immediate self-parenting is forbidden by construction.
        if task.parent_id == Some(task.id) {
            debug!(id = task.id, "dropping self-referential parent id");
            task.parent_id = None;
        }

        let id = task.id;
        let parent_id = task.parent_id;
        let task = Rc::new(RefCell::new(task));

        self.inner.tasks.set(id, Rc::clone(&task));
        self.inner.link_to_parent(id, parent_id);

        debug!(id, ?parent_id, "task added");
        task
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRef> {
        self.inner.tasks.get(&id)
    }

    pub fn has(&self, id: TaskId) -> bool {
        self.inner.tasks.has(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }

    /// Snapshot of all live tasks.
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.inner.tasks.values()
    }

    /// Snapshot of all live task ids, sorted for deterministic iteration.
    pub fn task_ids(&self) -> Vec<TaskId> {
        let mut ids = self.inner.tasks.keys();
        ids.sort_unstable();
        ids
    }

    /// Remove a task: unlink from its parent, drop it from the collection,
    /// drop its own child-set entry, emit a delete notification.
    ///
    /// Children keep their (now stale) `parent_id` and read defensively as
    /// visible roots. Deleting an absent id is a no-op.
    pub fn delete_task(&self, id: TaskId) {
        let Some(task) = self.inner.tasks.get(&id) else {
            return;
        };

        let parent_id = task.borrow().parent_id;
        self.inner.unlink_from_parent(id, parent_id);
        self.inner.tasks.delete(&id);
        self.inner.parents_to_child_ids.borrow_mut().remove(&id);

        // Revoke any per-task listener scopes.
        self.inner.scopes.borrow_mut().remove(&id);

        debug!(id, "task deleted");
    }

    // =========================================================================
    // Notification channels
    // =========================================================================

    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on_add(&self, mut handler: impl FnMut(TaskId, &TaskRef) + 'static) -> Subscription {
        self.inner.tasks.on_add(move |id, task| handler(*id, task))
    }

    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on_delete(&self, mut handler: impl FnMut(TaskId, &TaskRef) + 'static) -> Subscription {
        self.inner.tasks.on_delete(move |id, task| handler(*id, task))
    }

    /// Emitted after any field mutation routed through the index (patches,
    /// reparenting, re-keying, own-hours updates). Layout position writes do
    /// not emit: `pos` is layout output, not a layout input.
    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on_change(&self, mut handler: impl FnMut(TaskId) + 'static) -> Subscription {
        self.inner.change_event.on(move |id| handler(*id))
    }

    /// Invoke `handler` once per currently-indexed task (snapshot at call
    /// time), then again for every subsequently added task.
    ///
    /// Subscriptions returned by an invocation form that task's scope: they
    /// are held by the index and dropped when that task is deleted, so a
    /// handler that establishes listeners per task cleans up per task.
    pub fn task_effect(
        &self,
        handler: impl FnMut(&TaskRef) -> Vec<Subscription> + 'static,
    ) -> Subscription {
        let handler = Rc::new(RefCell::new(handler));

        for task in self.inner.tasks.values() {
            let subs = (handler.borrow_mut())(&task);
            let id = task.borrow().id;
            self.inner
                .scopes
                .borrow_mut()
                .entry(id)
                .or_default()
                .extend(subs);
        }

        let inner: Weak<Inner> = Rc::downgrade(&self.inner);
        self.inner.tasks.on_add(move |id, task| {
            let Some(inner) = inner.upgrade() else { return };
            let subs = (handler.borrow_mut())(task);
            inner.scopes.borrow_mut().entry(*id).or_default().extend(subs);
        })
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Reparent a task: unlink from the old parent's child set, mutate,
    /// link into the new one. No intermediate state is observable; a single
    /// change notification fires after both steps.
    pub fn set_parent(&self, id: TaskId, new_parent: Option<TaskId>) {
        if new_parent == Some(id) {
            debug!(id, "ignoring self-referential reparent");
            return;
        }

        let Some(task) = self.inner.tasks.get(&id) else {
            return;
        };

        let old_parent = task.borrow().parent_id;
        if old_parent == new_parent {
            return;
        }

        self.inner.unlink_from_parent(id, old_parent);
        task.borrow_mut().parent_id = new_parent;
        self.inner.link_to_parent(id, new_parent);

        self.inner.change_event.emit(&id);
    }

    /// Re-key a task whose identity changed. The collection and the
    /// adjacency structure are updated so the task is never filed under a
    /// stale id; listeners do not observe a remove/add pair.
    pub fn set_task_id(&self, old_id: TaskId, new_id: TaskId) {
        if old_id == new_id {
            return;
        }
        let Some(task) = self.inner.tasks.get(&old_id) else {
            return;
        };

        let parent_id = task.borrow().parent_id;
        self.inner.unlink_from_parent(old_id, parent_id);
        self.inner.tasks.rekey(&old_id, new_id);
        task.borrow_mut().id = new_id;
        self.inner.link_to_parent(new_id, parent_id);

        // The task's own child-set entry and scope move with it.
        let children = self.inner.parents_to_child_ids.borrow_mut().remove(&old_id);
        if let Some(children) = children {
            self.inner
                .parents_to_child_ids
                .borrow_mut()
                .insert(new_id, children);
        }
        let scope = self.inner.scopes.borrow_mut().remove(&old_id);
        if let Some(scope) = scope {
            self.inner.scopes.borrow_mut().insert(new_id, scope);
        }

        self.inner.change_event.emit(&new_id);
    }

    /// Apply a partial update to a task's own fields, maintaining adjacency
    /// if the parent changes. Emits one change notification.
    pub fn apply(&self, id: TaskId, patch: &TaskPatch) -> Result<()> {
        let task = self.inner.tasks.get(&id).ok_or(Error::TaskNotFound(id))?;

        {
            let mut t = task.borrow_mut();
            if let Some(title) = &patch.title {
                t.title = title.clone();
            }
            if let Some(priority) = patch.priority {
                t.priority = priority;
            }
            if let Some(hide_children) = patch.hide_children {
                t.hide_children = hide_children;
            }
            if let Some(always_expanded) = patch.always_expanded {
                t.always_expanded = always_expanded;
            }
            if let Some(clear) = patch.clear {
                t.clear = clear;
            }
            if let Some(trashed) = patch.trashed {
                t.trashed = trashed;
            }
            if let Some(x) = patch.pos_x {
                t.pos.x = x;
            }
            if let Some(y) = patch.pos_y {
                t.pos.y = y;
            }
        }

        if let Some(new_parent) = patch.parent_id {
            if new_parent != Some(id) {
                let old_parent = task.borrow().parent_id;
                if old_parent != new_parent {
                    self.inner.unlink_from_parent(id, old_parent);
                    task.borrow_mut().parent_id = new_parent;
                    self.inner.link_to_parent(id, new_parent);
                }
            }
        }

        self.inner.change_event.emit(&id);
        Ok(())
    }

    /// Update a task's own (non-recursive) hour fields.
    pub fn set_own_hours(&self, id: TaskId, completed: f64, remaining: f64) -> Result<()> {
        let task = self.inner.tasks.get(&id).ok_or(Error::TaskNotFound(id))?;
        {
            let mut t = task.borrow_mut();
            t.hr_completed = completed;
            t.hr_remaining = remaining;
        }
        self.inner.change_event.emit(&id);
        Ok(())
    }

    /// Cache a layout position on a task. Does not emit: positions are
    /// layout output and must not reschedule a layout pass.
    pub fn set_pos(&self, id: TaskId, pos: Pos) {
        if let Some(task) = self.inner.tasks.get(&id) {
            task.borrow_mut().pos = pos;
        }
    }

    // =========================================================================
    // Derived reads
    // =========================================================================

    /// Whether the task should appear in derived views.
    ///
    /// False if `clear` or `trashed`; true for roots and for orphans (parent
    /// id unknown); false when the parent hides its children; otherwise the
    /// parent's own visibility, so invisibility propagates down the subtree.
    pub fn visible(&self, id: TaskId) -> bool {
        let mut visited = HashSet::new();
        let mut current = id;

        loop {
            if !visited.insert(current) {
                // Cyclic parent chain: nothing on it can settle visible.
                return false;
            }

            let Some(task) = self.inner.tasks.get(&current) else {
                // The task itself must exist; missing ancestors default open.
                return current != id;
            };
            let task = task.borrow();

            if task.clear || task.trashed {
                return false;
            }

            let Some(parent_id) = task.parent_id else {
                return true;
            };

            let Some(parent) = self.inner.tasks.get(&parent_id) else {
                return true;
            };
            if parent.borrow().hide_children {
                return false;
            }

            current = parent_id;
        }
    }

    /// Child ids of a task, sorted for deterministic iteration.
    pub fn children(&self, id: TaskId) -> Vec<TaskId> {
        let mut child_ids: Vec<TaskId> = self
            .inner
            .parents_to_child_ids
            .borrow()
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        child_ids.sort_unstable();
        child_ids
    }

    /// Whether the adjacency structure has at least one child for this task.
    pub fn is_parent(&self, id: TaskId) -> bool {
        self.inner
            .parents_to_child_ids
            .borrow()
            .get(&id)
            .is_some_and(|set| !set.is_empty())
    }

    fn fold_hours(&self, id: TaskId, field: fn(&Task) -> f64, visited: &mut HashSet<TaskId>) -> f64 {
        if !visited.insert(id) {
            return 0.0;
        }

        let Some(task) = self.inner.tasks.get(&id) else {
            return 0.0;
        };
        let own = field(&task.borrow());

        let child_ids = self.children(id);
        own + child_ids
            .into_iter()
            .map(|child_id| self.fold_hours(child_id, field, visited))
            .sum::<f64>()
    }

    /// Own `hr_completed` plus the recursive sum over the subtree.
    pub fn hr_completed_total(&self, id: TaskId) -> f64 {
        self.fold_hours(id, |t| t.hr_completed, &mut HashSet::new())
    }

    /// Own `hr_remaining` plus the recursive sum over the subtree.
    pub fn hr_remaining_total(&self, id: TaskId) -> f64 {
        self.fold_hours(id, |t| t.hr_remaining, &mut HashSet::new())
    }

    /// Own original estimate plus the recursive sum over the subtree.
    pub fn hr_estimate_total_original(&self, id: TaskId) -> f64 {
        self.fold_hours(id, |t| t.hr_estimated_orig, &mut HashSet::new())
    }

    /// Work has happened and none remains, over the whole subtree.
    pub fn done(&self, id: TaskId) -> bool {
        self.hr_completed_total(id) > 0.0 && self.hr_remaining_total(id) == 0.0
    }

    /// Ancestor chain ordered root-first. Truncates silently at a broken
    /// link; bounded even against a transiently cyclic chain.
    pub fn ancestor_tasks(&self, id: TaskId) -> Vec<TaskRef> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);

        let mut current = self
            .inner
            .tasks
            .get(&id)
            .and_then(|task| task.borrow().parent_id);

        while let Some(ancestor_id) = current {
            if !visited.insert(ancestor_id) {
                break;
            }
            let Some(ancestor) = self.inner.tasks.get(&ancestor_id) else {
                break;
            };
            current = ancestor.borrow().parent_id;
            ancestors.push(ancestor);
        }

        ancestors.reverse();
        ancestors
    }

    /// Ids of all currently-visible tasks, sorted.
    pub fn visible_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .inner
            .tasks
            .keys()
            .into_iter()
            .filter(|id| self.visible(*id))
            .collect();
        ids.sort_unstable();
        ids
    }
}
