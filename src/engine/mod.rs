// src/engine/mod.rs

//! Orchestration engine for watchrun.
//!
//! This module ties together:
//! - the path filter and indexer (what is in scope)
//! - the task-tree interpreter (what runs)
//! - the generation token (what gets cancelled)
//!
//! into the per-activity event loop in [`scheduler`], which reacts to:
//! - filesystem events (restart, re-index or ignore)
//! - watcher errors (reported, non-fatal)
//! - the termination signal (after-phase, then exit)

pub mod debounce;
pub mod scheduler;

pub use debounce::Debounce;
pub use scheduler::{ActivityScheduler, Clock};
