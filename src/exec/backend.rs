// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The task-tree interpreter talks to a `CommandExecutor` instead of spawning
//! processes itself. Production code uses [`ProcessExecutor`]; tests can
//! provide their own implementation that, for example, records which
//! commands ran and waits for cancellation instead of spawning anything.
//!
//! [`ProcessExecutor`]: super::process::ProcessExecutor

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::exec::cancel::CancelToken;
use crate::types::Command;

/// Trait abstracting how a single command leaf is executed.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion, or until `token` is retired.
    ///
    /// Implementations must not return while a process they started may
    /// still be running.
    fn exec<'a>(
        &'a self,
        command: &'a Command,
        token: &'a CancelToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
