//! tb task command implementations.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::cli::board_dir;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::store::Store;
use crate::task::TaskPatch;

pub struct NewOptions {
    pub parent: Option<i64>,
    pub title: Option<String>,
    pub priority: Option<i32>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct ListOptions {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct EditOptions {
    pub id: i64,
    pub title: Option<String>,
    pub desc: Option<String>,
    pub priority: Option<i32>,
    pub no_priority: bool,
    pub parent: Option<i64>,
    pub detach: bool,
    pub hide_children: Option<bool>,
    pub always_expanded: Option<bool>,
    pub clear: Option<bool>,
    pub trashed: Option<bool>,
    pub pos_x: Option<f64>,
    pub pos_y: Option<f64>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct TrashOptions {
    pub ids: Vec<i64>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct DeleteOptions {
    pub ids: Vec<i64>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct DeleteTrashedOptions {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct HoursOptions {
    pub id: i64,
    pub completed: f64,
    pub remaining: f64,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

pub struct AllocateOptions {
    pub id: i64,
    pub hours: f64,
    pub start: Option<String>,
    pub end: Option<String>,
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

fn open_store(dir: Option<PathBuf>) -> Result<Store> {
    let dir = board_dir(dir)?;
    let config = Config::load_from_dir(&dir);
    Ok(Store::new(
        config.data_dir(&dir),
        config.hours.debounce_minutes,
    ))
}

pub fn run_new(opts: NewOptions) -> Result<()> {
    let store = open_store(opts.dir)?;
    let mut task = store.create_task(opts.parent)?;

    // A title or priority given at creation is a follow-up edit; the
    // store's create is deliberately minimal.
    let patch = TaskPatch {
        title: opts.title,
        priority: opts.priority.map(Some),
        ..Default::default()
    };
    if !patch.is_empty() {
        task = store.edit_task(task.id, &patch)?;
    }

    let mut human = HumanOutput::new(format!("Created task {}", task.id));
    if let Some(parent_id) = task.parent_id {
        human.push_summary("parent", parent_id.to_string());
    }
    if !task.title.is_empty() {
        human.push_summary("title", task.title.clone());
    }

    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task new",
        &task,
        Some(&human),
    )
}

pub fn run_list(opts: ListOptions) -> Result<()> {
    let store = open_store(opts.dir)?;
    let tasks = store.list_tasks()?;

    let mut human = HumanOutput::new(format!("{} task(s)", tasks.len()));
    for task in &tasks {
        let title = if task.title.is_empty() {
            "(untitled)"
        } else {
            &task.title
        };
        let parent = task
            .parent_id
            .map(|p| format!(" (parent {p})"))
            .unwrap_or_default();
        human.push_detail(format!(
            "#{} {title}{parent} [{:.1}h done, {:.1}h left]",
            task.id, task.hr_completed, task.hr_remaining
        ));
    }

    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task list",
        &tasks,
        Some(&human),
    )
}

pub fn run_edit(opts: EditOptions) -> Result<()> {
    let store = open_store(opts.dir)?;

    let priority = if opts.no_priority {
        Some(None)
    } else {
        opts.priority.map(Some)
    };
    let parent_id = if opts.detach {
        Some(None)
    } else {
        opts.parent.map(Some)
    };

    let patch = TaskPatch {
        title: opts.title,
        desc: opts.desc,
        priority,
        parent_id,
        hide_children: opts.hide_children,
        always_expanded: opts.always_expanded,
        clear: opts.clear,
        trashed: opts.trashed,
        pos_x: opts.pos_x,
        pos_y: opts.pos_y,
    };
    if patch.is_empty() {
        return Err(Error::InvalidArgument(
            "nothing to change; pass at least one field flag".to_string(),
        ));
    }

    let task = store.edit_task(opts.id, &patch)?;

    let mut human = HumanOutput::new(format!("Updated task {}", task.id));
    match task.parent_id {
        Some(parent_id) => human.push_summary("parent", parent_id.to_string()),
        None => human.push_summary("parent", "none".to_string()),
    }

    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task edit",
        &task,
        Some(&human),
    )
}

pub fn run_trash(opts: TrashOptions) -> Result<()> {
    let store = open_store(opts.dir)?;
    store.trash_tasks(&opts.ids)?;

    let human = HumanOutput::new(format!("Trashed {} task(s)", opts.ids.len()));
    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task trash",
        &opts.ids,
        Some(&human),
    )
}

pub fn run_delete(opts: DeleteOptions) -> Result<()> {
    let store = open_store(opts.dir)?;
    store.delete_tasks(&opts.ids)?;

    let human = HumanOutput::new(format!("Deleted {} task(s)", opts.ids.len()));
    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task delete",
        &opts.ids,
        Some(&human),
    )
}

pub fn run_delete_trashed(opts: DeleteTrashedOptions) -> Result<()> {
    let store = open_store(opts.dir)?;
    let removed = store.delete_trashed()?;

    #[derive(serde::Serialize)]
    struct Data {
        removed: usize,
    }

    let human = HumanOutput::new(format!("Deleted {removed} trashed task(s)"));
    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task delete-trashed",
        &Data { removed },
        Some(&human),
    )
}

pub fn run_hours(opts: HoursOptions) -> Result<()> {
    let store = open_store(opts.dir)?;
    let history = store.update_hours(opts.id, opts.completed, opts.remaining)?;

    let mut human = HumanOutput::new(format!("Recorded hours for task {}", opts.id));
    human.push_summary("completed", format!("{:.1}", opts.completed));
    human.push_summary("remaining", format!("{:.1}", opts.remaining));
    human.push_summary("snapshots", history.len().to_string());

    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task hours",
        &history,
        Some(&human),
    )
}

pub fn run_allocate(opts: AllocateOptions) -> Result<()> {
    let store = open_store(opts.dir)?;

    let start = opts.start.as_deref().map(parse_timestamp).transpose()?;
    let end = opts.end.as_deref().map(parse_timestamp).transpose()?;

    let allocation = store.create_time_allocation(opts.id, opts.hours, start, end)?;

    let mut human = HumanOutput::new(format!("Allocated {:.1}h to task {}", opts.hours, opts.id));
    human.push_summary("allocation", allocation.id.to_string());

    emit_success(
        OutputOptions {
            json: opts.json,
            quiet: opts.quiet,
        },
        "task allocate",
        &allocation,
        Some(&human),
    )
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| Error::InvalidArgument(format!("invalid timestamp {raw:?}: {err}")))
}
