// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`cancel`] holds the generation token used to broadcast cancellation
//!   to everything running under one pipeline run.
//! - [`backend`] provides the `CommandExecutor` trait, so tests can swap in
//!   an executor that doesn't spawn real processes.
//! - [`process`] is the production executor built on `tokio::process`.
//! - [`tree`] interprets nested sequence/parallel task trees.

pub mod backend;
pub mod cancel;
pub mod process;
pub mod tree;

pub use backend::CommandExecutor;
pub use cancel::{CancelToken, Generation};
pub use process::ProcessExecutor;
pub use tree::TaskRunner;
