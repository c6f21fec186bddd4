//! Command-line interface for tb
//!
//! This module defines the CLI structure using clap derive macros.
//! Each subcommand is defined in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

mod graph;
mod task;

/// tb - hierarchical task board
///
/// A CLI for a reactive task hierarchy: tasks with parent/child links,
/// rolled-up hour tracking, and an auto-laid-out dependency graph.
#[derive(Parser, Debug)]
#[command(name = "tb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Board directory (defaults to current directory)
    #[arg(long, global = true, env = "TB_DIR")]
    pub dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Lay out the visible task graph and print renderer nodes/edges
    Graph {
        /// Uniform node height to lay out with (the UI measures real ones)
        #[arg(long, default_value = "100")]
        node_height: f64,

        /// Don't persist the computed positions back to the store
        #[arg(long)]
        no_save: bool,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    New {
        /// Parent task id
        #[arg(long)]
        parent: Option<i64>,

        /// Task title
        #[arg(long)]
        title: Option<String>,

        /// Priority (lower is more urgent)
        #[arg(long)]
        priority: Option<i32>,
    },

    /// List tasks (excludes trashed tasks and their descendants)
    List,

    /// Edit a task's fields
    Edit {
        /// Task id
        id: i64,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(long)]
        desc: Option<String>,

        /// New priority
        #[arg(long, conflicts_with = "no_priority")]
        priority: Option<i32>,

        /// Remove the priority
        #[arg(long)]
        no_priority: bool,

        /// New parent task id
        #[arg(long, conflicts_with = "detach")]
        parent: Option<i64>,

        /// Detach from the current parent (become a root)
        #[arg(long)]
        detach: bool,

        /// Hide all descendants from derived views
        #[arg(long)]
        hide_children: Option<bool>,

        /// Always expand this task in the UI
        #[arg(long)]
        always_expanded: Option<bool>,

        /// Soft-hide without trashing
        #[arg(long)]
        clear: Option<bool>,

        /// Trash or restore
        #[arg(long)]
        trashed: Option<bool>,

        /// Stored layout x position
        #[arg(long)]
        pos_x: Option<f64>,

        /// Stored layout y position
        #[arg(long)]
        pos_y: Option<f64>,
    },

    /// Move tasks to the trash
    Trash {
        /// Task ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Permanently delete tasks
    Delete {
        /// Task ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Permanently delete every trashed task
    DeleteTrashed,

    /// Record an hour snapshot for a task
    Hours {
        /// Task id
        id: i64,

        /// Hours completed so far
        #[arg(long)]
        completed: f64,

        /// Hours remaining
        #[arg(long)]
        remaining: f64,
    },

    /// Record a time allocation for a task
    Allocate {
        /// Task id
        id: i64,

        /// Hours to allocate
        #[arg(long)]
        hours: f64,

        /// Allocation window start (RFC 3339)
        #[arg(long)]
        start: Option<String>,

        /// Allocation window end (RFC 3339)
        #[arg(long)]
        end: Option<String>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Task(cmd) => match cmd {
                TaskCommands::New {
                    parent,
                    title,
                    priority,
                } => task::run_new(task::NewOptions {
                    parent,
                    title,
                    priority,
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
                TaskCommands::List => task::run_list(task::ListOptions {
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
                TaskCommands::Edit {
                    id,
                    title,
                    desc,
                    priority,
                    no_priority,
                    parent,
                    detach,
                    hide_children,
                    always_expanded,
                    clear,
                    trashed,
                    pos_x,
                    pos_y,
                } => task::run_edit(task::EditOptions {
                    id,
                    title,
                    desc,
                    priority,
                    no_priority,
                    parent,
                    detach,
                    hide_children,
                    always_expanded,
                    clear,
                    trashed,
                    pos_x,
                    pos_y,
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
                TaskCommands::Trash { ids } => task::run_trash(task::TrashOptions {
                    ids,
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
                TaskCommands::Delete { ids } => task::run_delete(task::DeleteOptions {
                    ids,
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
                TaskCommands::DeleteTrashed => {
                    task::run_delete_trashed(task::DeleteTrashedOptions {
                        dir: self.dir,
                        json: self.json,
                        quiet: self.quiet,
                    })
                }
                TaskCommands::Hours {
                    id,
                    completed,
                    remaining,
                } => task::run_hours(task::HoursOptions {
                    id,
                    completed,
                    remaining,
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
                TaskCommands::Allocate {
                    id,
                    hours,
                    start,
                    end,
                } => task::run_allocate(task::AllocateOptions {
                    id,
                    hours,
                    start,
                    end,
                    dir: self.dir,
                    json: self.json,
                    quiet: self.quiet,
                }),
            },
            Commands::Graph {
                node_height,
                no_save,
            } => graph::run(graph::GraphOptions {
                node_height,
                no_save,
                dir: self.dir,
                json: self.json,
                quiet: self.quiet,
            }),
        }
    }
}

/// Resolve the board directory for a command.
pub(crate) fn board_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => Ok(std::env::current_dir()?),
    }
}
