//! Bucketing/filtering utility.
//!
//! A generic derived partition over the index: each task occupies at most
//! one of several disjoint buckets, decided by a predicate (is the task
//! relevant at all?) and a classifier (which bucket?). Membership is
//! re-evaluated on deletion and whenever a task's classification inputs can
//! have moved: its own change, a change anywhere in its subtree (aggregates
//! fold up), or a change on an ancestor (visibility flows down). Downstream
//! views subscribe to the transition channel instead of re-deriving
//! membership themselves.
//!
//! Transition semantics: an ineligible task (invisible or failing the
//! predicate) is removed from its bucket and a `(task, old, None)` event
//! fires; while eligible, an event fires only when the classified bucket
//! actually changes; deletion fires a removal. Reclassification into the
//! same bucket is a no-op.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::event::{EventSource, Subscription};
use crate::index::TaskIndex;
use crate::task::TaskId;

/// A bucket transition: `(task, previous bucket, new bucket)`.
pub type BucketChange<B> = (TaskId, Option<B>, Option<B>);

type Filter = Box<dyn Fn(&TaskIndex, TaskId) -> bool>;
type Classify<B> = Box<dyn Fn(&TaskIndex, TaskId) -> Option<B>>;

struct SorterState<B> {
    index: TaskIndex,
    filter: Filter,
    classify: Classify<B>,
    occupied: RefCell<HashMap<TaskId, B>>,
    members: RefCell<HashMap<B, HashSet<TaskId>>>,
    change_event: EventSource<BucketChange<B>>,
    _subs: RefCell<Vec<Subscription>>,
}

impl<B> SorterState<B>
where
    B: Clone + Eq + Hash + 'static,
{
    fn remove_from_bucket(&self, id: TaskId) -> Option<B> {
        let old = self.occupied.borrow_mut().remove(&id);
        if let Some(bucket) = &old {
            if let Some(ids) = self.members.borrow_mut().get_mut(bucket) {
                ids.remove(&id);
            }
        }
        old
    }

    /// Re-evaluate everything a mutation of `id` can reclassify: the task
    /// itself, its subtree (visibility flows down through ancestors), and
    /// its ancestor chain (hour aggregates fold up from descendants).
    fn evaluate_affected(&self, id: TaskId) {
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            self.evaluate(current);
            stack.extend(self.index.children(current));
        }

        for ancestor in self.index.ancestor_tasks(id) {
            let ancestor_id = ancestor.borrow().id;
            if visited.insert(ancestor_id) {
                self.evaluate(ancestor_id);
            }
        }
    }

    fn evaluate(&self, id: TaskId) {
        let eligible = self.index.has(id)
            && self.index.visible(id)
            && (self.filter)(&self.index, id);

        if !eligible {
            let old = self.remove_from_bucket(id);
            self.change_event.emit(&(id, old, None));
            return;
        }

        let new = (self.classify)(&self.index, id);
        let old = self.occupied.borrow().get(&id).cloned();
        if old == new {
            return;
        }

        self.remove_from_bucket(id);
        match &new {
            Some(bucket) => {
                self.occupied.borrow_mut().insert(id, bucket.clone());
                self.members
                    .borrow_mut()
                    .entry(bucket.clone())
                    .or_default()
                    .insert(id);
            }
            None => {}
        }

        self.change_event.emit(&(id, old, new));
    }
}

/// Derived-partition view over a [`TaskIndex`]. Cheap to clone.
#[derive(Clone)]
pub struct TaskSorter<B> {
    state: Rc<SorterState<B>>,
}

impl<B> TaskSorter<B>
where
    B: Clone + Eq + Hash + 'static,
{
    pub fn new(
        index: &TaskIndex,
        filter: impl Fn(&TaskIndex, TaskId) -> bool + 'static,
        classify: impl Fn(&TaskIndex, TaskId) -> Option<B> + 'static,
    ) -> Self {
        let state = Rc::new(SorterState {
            index: index.clone(),
            filter: Box::new(filter),
            classify: Box::new(classify),
            occupied: RefCell::new(HashMap::new()),
            members: RefCell::new(HashMap::new()),
            change_event: EventSource::new(),
            _subs: RefCell::new(Vec::new()),
        });

        let mut subs = Vec::new();

        // Evaluate every current and future task once on arrival.
        let weak: Weak<SorterState<B>> = Rc::downgrade(&state);
        subs.push(index.task_effect(move |task| {
            if let Some(state) = weak.upgrade() {
                state.evaluate(task.borrow().id);
            }
            Vec::new()
        }));

        // A change to one task can reclassify others: trashing a parent
        // hides its whole subtree, and a child's hours fold into every
        // ancestor's aggregates. Re-evaluate the affected neighborhood, not
        // just the mutated task.
        let weak = Rc::downgrade(&state);
        subs.push(index.on_change(move |id| {
            if let Some(state) = weak.upgrade() {
                state.evaluate_affected(id);
            }
        }));

        let weak = Rc::downgrade(&state);
        subs.push(index.on_delete(move |id, _| {
            if let Some(state) = weak.upgrade() {
                let old = state.remove_from_bucket(id);
                state.change_event.emit(&(id, old, None));
            }
        }));

        *state._subs.borrow_mut() = subs;

        Self { state }
    }

    /// Subscribe to bucket transitions.
    #[must_use = "dropping the subscription immediately revokes the handler"]
    pub fn on_bucket_change(
        &self,
        mut handler: impl FnMut(TaskId, Option<&B>, Option<&B>) + 'static,
    ) -> Subscription {
        self.state
            .change_event
            .on(move |(id, old, new)| handler(*id, old.as_ref(), new.as_ref()))
    }

    /// Bucket currently occupied by a task, if any.
    pub fn bucket_of(&self, id: TaskId) -> Option<B> {
        self.state.occupied.borrow().get(&id).cloned()
    }

    /// Members of a bucket, sorted.
    pub fn members(&self, bucket: &B) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .state
            .members
            .borrow()
            .get(bucket)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}
