// src/watch/mod.rs

//! File watching and path selection.
//!
//! This module is responsible for:
//! - Deciding which paths belong to an activity (`filter`).
//! - Expanding wildcard watch/ignore entries (`glob`).
//! - Walking watch roots and registering what is in scope (`indexer`).
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//!
//! It does **not** know about task trees; the engine decides what an event
//! means for the pipeline.

pub mod filter;
pub mod glob;
pub mod indexer;
pub mod watcher;

pub use filter::{EntryKind, ExpansionCache, PathFilter, Validation};
pub use indexer::{Index, Indexer};
pub use watcher::{FileWatcher, FsEvent, FsOp, NotifyWatcher, WatchStreams};
