//! taskboard - Hierarchical Task Board Library
//!
//! This library provides the core functionality for the tb CLI tool: a
//! reactive task hierarchy with derived views and an auto-laid-out graph.
//!
//! # Core Concepts
//!
//! - **Task Index**: The authoritative task collection plus parent/child
//!   adjacency, with add/delete/change notification channels
//! - **Derived Reads**: Visibility and recursive hour roll-ups, recomputed
//!   on demand so they never go stale
//! - **Graph Layout**: A layered left-to-right layout over the visible
//!   tasks, re-run at most once per flush however many mutations arrive
//! - **Sorter**: A derived partition of tasks into disjoint buckets with
//!   transition notifications
//! - **Store**: File-backed persistence with hour-snapshot history and
//!   cycle-rejecting reparent edits
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.taskboard.toml`
//! - `error`: Error types and result aliases
//! - `event`: Subscription-based notification primitive
//! - `event_map`: Keyed collection with add/delete channels
//! - `index`: Task collection, adjacency, and derived reads
//! - `layout`: Layered graph layout over the visible set
//! - `sorter`: Bucketed partition over the index
//! - `store`: File-backed task/hour/allocation persistence
//! - `lock`: File locking and atomic operations for concurrency safety

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod event_map;
pub mod index;
pub mod layout;
pub mod lock;
pub mod output;
pub mod sorter;
pub mod store;
pub mod task;

pub use error::{Error, Result};
