//! Persistent store for task records, hour snapshots, and time allocations.
//!
//! The store is the board's durable collaborator: the in-memory index is
//! only updated after a store operation confirms success. State lives in a
//! data directory:
//!
//! ```text
//! .taskboard/
//!   store.lock          # cross-process write lock
//!   tasks.json          # task rows + id counter (atomic snapshot writes)
//!   hours.jsonl         # hour snapshots, one JSON row per line
//!   allocations.jsonl   # time allocations, one JSON row per line
//! ```
//!
//! The list query performs the read-side aggregation: per task, current
//! hours from the most recent snapshot, the original estimate from the
//! earliest one, and exclusion of every task whose ancestor chain (walked
//! through the same non-trashed result set) is broken or contains a trashed
//! task.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::{ApiTask, TaskId, TaskPatch};

/// Default name of the data directory
pub const DATA_DIR: &str = ".taskboard";

const TASKS_FILE: &str = "tasks.json";
const HOURS_FILE: &str = "hours.jsonl";
const ALLOCATIONS_FILE: &str = "allocations.jsonl";
const LOCK_FILE: &str = "store.lock";

const STORE_SCHEMA_VERSION: &str = "taskboard.store.v1";

/// One stored task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
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
}

/// One recorded hour snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub task_id: TaskId,
    pub hr_completed: f64,
    pub hr_remaining: f64,
}

/// One time allocation row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub task_id: TaskId,
    pub target_n_hours_spent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TasksFile {
    schema_version: String,
    next_task_id: TaskId,
    tasks: Vec<TaskRow>,
}

impl Default for TasksFile {
    fn default() -> Self {
        Self {
            schema_version: STORE_SCHEMA_VERSION.to_string(),
            next_task_id: 1,
            tasks: Vec::new(),
        }
    }
}

/// File-backed task store.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    /// Hour snapshots newer than this window are replaced, not accumulated.
    debounce: Duration,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, debounce_minutes: i64) -> Self {
        Self {
            dir: dir.into(),
            debounce: Duration::minutes(debounce_minutes),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tasks_path(&self) -> PathBuf {
        self.dir.join(TASKS_FILE)
    }

    fn hours_path(&self) -> PathBuf {
        self.dir.join(HOURS_FILE)
    }

    fn allocations_path(&self) -> PathBuf {
        self.dir.join(ALLOCATIONS_FILE)
    }

    fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(self.dir.join(LOCK_FILE), DEFAULT_LOCK_TIMEOUT_MS)
    }

    // =========================================================================
    // File primitives
    // =========================================================================

    fn load_tasks_file(&self) -> Result<TasksFile> {
        let path = self.tasks_path();
        if !path.exists() {
            return Ok(TasksFile::default());
        }

        let contents = fs::read_to_string(&path)?;
        let file: TasksFile = serde_json::from_str(&contents)?;
        if file.schema_version != STORE_SCHEMA_VERSION {
            return Err(Error::OperationFailed(format!(
                "unsupported store schema: {}",
                file.schema_version
            )));
        }
        Ok(file)
    }

    fn save_tasks_file(&self, file: &TasksFile) -> Result<()> {
        let serialized = serde_json::to_string_pretty(file)?;
        lock::write_atomic_str(self.tasks_path(), &serialized)
    }

    fn load_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(&line)?);
        }
        Ok(rows)
    }

    fn append_jsonl<T: Serialize>(&self, path: &Path, row: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let serialized = serde_json::to_vec(row)?;
        file.write_all(&serialized)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    fn rewrite_jsonl<T: Serialize>(&self, path: &Path, rows: &[T]) -> Result<()> {
        let mut contents = Vec::new();
        for row in rows {
            contents.extend(serde_json::to_vec(row)?);
            contents.push(b'\n');
        }
        lock::write_atomic(path, &contents)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// List all non-trashed tasks with aggregated hour fields, excluding
    /// tasks whose ancestor chain contains a trashed (or missing) ancestor.
    pub fn list_tasks(&self) -> Result<Vec<ApiTask>> {
        let _lock = self.lock()?;
        let file = self.load_tasks_file()?;
        let hours: Vec<HourRow> = self.load_jsonl(&self.hours_path())?;

        let mut latest: HashMap<TaskId, &HourRow> = HashMap::new();
        let mut earliest: HashMap<TaskId, &HourRow> = HashMap::new();
        for row in &hours {
            latest
                .entry(row.task_id)
                .and_modify(|current| {
                    if (row.created_at, row.id) > (current.created_at, current.id) {
                        *current = row;
                    }
                })
                .or_insert(row);
            earliest
                .entry(row.task_id)
                .and_modify(|current| {
                    if (row.created_at, row.id) < (current.created_at, current.id) {
                        *current = row;
                    }
                })
                .or_insert(row);
        }

        let live: HashMap<TaskId, &TaskRow> = file
            .tasks
            .iter()
            .filter(|row| !row.trashed)
            .map(|row| (row.id, row))
            .collect();

        // Memoized over shared ancestor chains; a cyclic chain counts as
        // trashed rather than looping.
        let mut memo: HashMap<TaskId, bool> = HashMap::new();
        fn has_trashed_ancestor(
            id: TaskId,
            live: &HashMap<TaskId, &TaskRow>,
            memo: &mut HashMap<TaskId, bool>,
        ) -> bool {
            if let Some(&result) = memo.get(&id) {
                return result;
            }
            // Mark on-stack: revisiting before resolution means a cycle.
            memo.insert(id, true);

            let result = match live.get(&id).and_then(|row| row.parent_id) {
                None => false,
                Some(parent_id) => {
                    if !live.contains_key(&parent_id) {
                        true
                    } else {
                        has_trashed_ancestor(parent_id, live, memo)
                    }
                }
            };

            memo.insert(id, result);
            result
        }

        let mut tasks: Vec<ApiTask> = live
            .values()
            .filter(|row| !has_trashed_ancestor(row.id, &live, &mut memo))
            .map(|&row| {
                join_hours(
                    row,
                    latest.get(&row.id).copied(),
                    earliest.get(&row.id).copied(),
                )
            })
            .collect();
        tasks.sort_by_key(|task| task.id);

        Ok(tasks)
    }

    /// Create a task with store-assigned id and a zeroed initial hour
    /// snapshot.
    pub fn create_task(&self, parent_id: Option<TaskId>) -> Result<ApiTask> {
        let _lock = self.lock()?;
        let mut file = self.load_tasks_file()?;

        let id = file.next_task_id;
        file.next_task_id += 1;

        let row = TaskRow {
            id,
            created_at: Utc::now(),
            title: String::new(),
            desc: None,
            priority: None,
            parent_id: parent_id.filter(|&p| p != id),
            clear: false,
            trashed: false,
            hide_children: false,
            always_expanded: false,
            target_start: None,
            target_end: None,
            hard_end: None,
            pos_x: 0.0,
            pos_y: 0.0,
        };
        file.tasks.push(row.clone());
        self.save_tasks_file(&file)?;

        let hour_row = HourRow {
            id: self.next_hour_id()?,
            created_at: Utc::now(),
            task_id: id,
            hr_completed: 0.0,
            hr_remaining: 0.0,
        };
        self.append_jsonl(&self.hours_path(), &hour_row)?;

        debug!(id, ?parent_id, "task created");
        Ok(join_hours(&row, Some(&hour_row), Some(&hour_row)))
    }

    /// Apply a partial update to a stored task.
    ///
    /// Rejects a `parent_id` change that would create a cycle back to the
    /// task (detected by walking the proposed new parent chain) and leaves
    /// the stored hierarchy unchanged in that case.
    pub fn edit_task(&self, id: TaskId, patch: &TaskPatch) -> Result<ApiTask> {
        let _lock = self.lock()?;
        let mut file = self.load_tasks_file()?;

        if let Some(Some(new_parent)) = patch.parent_id {
            ensure_acyclic(id, new_parent, &file.tasks)?;
        }

        let row = file
            .tasks
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(Error::TaskNotFound(id))?;

        if let Some(title) = &patch.title {
            row.title = title.clone();
        }
        if let Some(desc) = &patch.desc {
            row.desc = Some(desc.clone());
        }
        if let Some(priority) = patch.priority {
            row.priority = priority;
        }
        if let Some(parent_id) = patch.parent_id {
            row.parent_id = parent_id;
        }
        if let Some(hide_children) = patch.hide_children {
            row.hide_children = hide_children;
        }
        if let Some(always_expanded) = patch.always_expanded {
            row.always_expanded = always_expanded;
        }
        if let Some(clear) = patch.clear {
            row.clear = clear;
        }
        if let Some(trashed) = patch.trashed {
            row.trashed = trashed;
        }
        if let Some(x) = patch.pos_x {
            row.pos_x = x;
        }
        if let Some(y) = patch.pos_y {
            row.pos_y = y;
        }

        let row = row.clone();
        self.save_tasks_file(&file)?;

        let hours: Vec<HourRow> = self.load_jsonl(&self.hours_path())?;
        let (latest, earliest) = hours_for(&hours, id);
        Ok(join_hours(&row, latest, earliest))
    }

    /// Soft-delete tasks by setting `trashed`.
    pub fn trash_tasks(&self, ids: &[TaskId]) -> Result<()> {
        let _lock = self.lock()?;
        let mut file = self.load_tasks_file()?;

        for row in file.tasks.iter_mut() {
            if ids.contains(&row.id) {
                row.trashed = true;
            }
        }
        self.save_tasks_file(&file)
    }

    /// Hard-delete tasks and their hour/allocation rows.
    pub fn delete_tasks(&self, ids: &[TaskId]) -> Result<()> {
        let _lock = self.lock()?;
        let mut file = self.load_tasks_file()?;

        file.tasks.retain(|row| !ids.contains(&row.id));
        self.save_tasks_file(&file)?;
        self.prune_related(|task_id| ids.contains(&task_id))
    }

    /// Hard-delete every trashed task. Returns how many were removed.
    pub fn delete_trashed(&self) -> Result<usize> {
        let _lock = self.lock()?;
        let mut file = self.load_tasks_file()?;

        let trashed: Vec<TaskId> = file
            .tasks
            .iter()
            .filter(|row| row.trashed)
            .map(|row| row.id)
            .collect();
        file.tasks.retain(|row| !row.trashed);
        self.save_tasks_file(&file)?;
        self.prune_related(|task_id| trashed.contains(&task_id))?;

        Ok(trashed.len())
    }

    /// Record an hour snapshot, first dropping any snapshot for the same
    /// task newer than the coalescing window, so rapid updates collapse
    /// into one row per window. Returns the task's full history, oldest
    /// first.
    pub fn update_hours(
        &self,
        id: TaskId,
        hr_completed: f64,
        hr_remaining: f64,
    ) -> Result<Vec<HourRow>> {
        let _lock = self.lock()?;
        let file = self.load_tasks_file()?;
        if !file.tasks.iter().any(|row| row.id == id) {
            return Err(Error::TaskNotFound(id));
        }

        let mut hours: Vec<HourRow> = self.load_jsonl(&self.hours_path())?;
        let cutoff = Utc::now() - self.debounce;
        hours.retain(|row| row.task_id != id || row.created_at <= cutoff);

        let next_id = hours.iter().map(|row| row.id).max().unwrap_or(0) + 1;
        hours.push(HourRow {
            id: next_id,
            created_at: Utc::now(),
            task_id: id,
            hr_completed,
            hr_remaining,
        });
        self.rewrite_jsonl(&self.hours_path(), &hours)?;

        let mut history: Vec<HourRow> = hours.into_iter().filter(|row| row.task_id == id).collect();
        history.sort_by_key(|row| (row.created_at, row.id));
        Ok(history)
    }

    /// Persist computed layout positions in one pass. Unknown ids are
    /// skipped.
    pub fn save_positions(&self, positions: &[(TaskId, f64, f64)]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }

        let _lock = self.lock()?;
        let mut file = self.load_tasks_file()?;

        let by_id: HashMap<TaskId, (f64, f64)> = positions
            .iter()
            .map(|&(id, x, y)| (id, (x, y)))
            .collect();
        for row in file.tasks.iter_mut() {
            if let Some(&(x, y)) = by_id.get(&row.id) {
                row.pos_x = x;
                row.pos_y = y;
            }
        }
        self.save_tasks_file(&file)
    }

    /// Record a time allocation against a task.
    pub fn create_time_allocation(
        &self,
        task_id: TaskId,
        target_n_hours_spent: f64,
        target_start: Option<DateTime<Utc>>,
        target_end: Option<DateTime<Utc>>,
    ) -> Result<AllocationRow> {
        let _lock = self.lock()?;
        let file = self.load_tasks_file()?;
        if !file.tasks.iter().any(|row| row.id == task_id) {
            return Err(Error::TaskNotFound(task_id));
        }

        let allocations: Vec<AllocationRow> = self.load_jsonl(&self.allocations_path())?;
        let row = AllocationRow {
            id: allocations.iter().map(|row| row.id).max().unwrap_or(0) + 1,
            created_at: Utc::now(),
            task_id,
            target_n_hours_spent,
            target_start,
            target_end,
        };
        self.append_jsonl(&self.allocations_path(), &row)?;
        Ok(row)
    }

    fn next_hour_id(&self) -> Result<i64> {
        let hours: Vec<HourRow> = self.load_jsonl(&self.hours_path())?;
        Ok(hours.iter().map(|row| row.id).max().unwrap_or(0) + 1)
    }

    fn prune_related(&self, gone: impl Fn(TaskId) -> bool) -> Result<()> {
        let hours: Vec<HourRow> = self.load_jsonl(&self.hours_path())?;
        let kept: Vec<HourRow> = hours.into_iter().filter(|row| !gone(row.task_id)).collect();
        self.rewrite_jsonl(&self.hours_path(), &kept)?;

        let allocations: Vec<AllocationRow> = self.load_jsonl(&self.allocations_path())?;
        let kept: Vec<AllocationRow> = allocations
            .into_iter()
            .filter(|row| !gone(row.task_id))
            .collect();
        self.rewrite_jsonl(&self.allocations_path(), &kept)
    }
}

/// Reject a reparent whose proposed parent chain walks back to `id`.
fn ensure_acyclic(id: TaskId, new_parent: TaskId, rows: &[TaskRow]) -> Result<()> {
    let parents: HashMap<TaskId, Option<TaskId>> =
        rows.iter().map(|row| (row.id, row.parent_id)).collect();

    let mut current = Some(new_parent);
    let mut steps = 0usize;
    while let Some(ancestor) = current {
        if ancestor == id {
            return Err(Error::CycleDetected {
                id,
                parent_id: new_parent,
            });
        }
        // A pre-existing cycle above the new parent is someone else's
        // corruption; bounded walk, then accept.
        steps += 1;
        if steps > rows.len() {
            break;
        }
        current = parents.get(&ancestor).copied().flatten();
    }
    Ok(())
}

fn hours_for(hours: &[HourRow], id: TaskId) -> (Option<&HourRow>, Option<&HourRow>) {
    let mut latest: Option<&HourRow> = None;
    let mut earliest: Option<&HourRow> = None;
    for row in hours.iter().filter(|row| row.task_id == id) {
        if latest.is_none_or(|current| (row.created_at, row.id) > (current.created_at, current.id)) {
            latest = Some(row);
        }
        if earliest
            .is_none_or(|current| (row.created_at, row.id) < (current.created_at, current.id))
        {
            earliest = Some(row);
        }
    }
    (latest, earliest)
}

fn join_hours(row: &TaskRow, latest: Option<&HourRow>, earliest: Option<&HourRow>) -> ApiTask {
    ApiTask {
        id: row.id,
        created_at: row.created_at,
        title: row.title.clone(),
        desc: row.desc.clone(),
        priority: row.priority,
        parent_id: row.parent_id,
        clear: row.clear,
        trashed: row.trashed,
        hide_children: row.hide_children,
        always_expanded: row.always_expanded,
        target_start: row.target_start,
        target_end: row.target_end,
        hard_end: row.hard_end,
        pos_x: row.pos_x,
        pos_y: row.pos_y,
        hr_completed: latest.map(|h| h.hr_completed).unwrap_or(0.0),
        hr_remaining: latest.map(|h| h.hr_remaining).unwrap_or(0.0),
        hr_estimated: earliest
            .map(|h| h.hr_completed + h.hr_remaining)
            .unwrap_or(0.0),
    }
}
