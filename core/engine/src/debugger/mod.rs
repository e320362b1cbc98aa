//! Tern's script debugger.
//!
//! The engine runs scripts on one dedicated thread and can only be inspected
//! or suspended from the hooks it calls on that thread. Clients on other threads
//! drive it through a [`DebuggerHandle`], which turns every request into a
//! message on an unbounded channel. The engine-side [`Debugger`] drains that
//! channel whenever a hook fires and, while paused, parks the engine thread
//! until a message resumes it.
//!
//! # Overview
//!
//! - [`Debugger`]: the engine-thread controller. Implements [`DebugHooks`] and
//!   owns the state machine, the [`BreakpointStore`] and the [`ScriptInfo`] table.
//! - [`DebuggerHandle`]: the thread-safe control surface (run, pause, step,
//!   attach, evaluate, set breakpoints).
//! - [`DebugHost`]: what an engine must provide to be debugged. [`crate::Context`]
//!   is the built-in implementation.
//! - [`EngineThread`]: spawns a host on its own thread and runs a script under
//!   the debugger.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use tern_engine::{
//!     Context, Position,
//!     debugger::{BreakpointOptions, DebugEvent, DebuggerOptions, EngineThread},
//! };
//!
//! let (events, event_rx) = mpsc::channel();
//! let engine = EngineThread::spawn(
//!     DebuggerOptions::default()
//!         .with_wait_for_client(true)
//!         .with_wait_for_ui(true),
//!     events,
//!     "main.tern".into(),
//!     "let a = 1;\nlet b = a + 1;\n".to_owned(),
//!     Context::default,
//! )?;
//!
//! let handle = engine.handle().clone();
//! handle.attach(false)?;
//! handle
//!     .set_breakpoint("main.tern".into(), Position::new(2, 1), BreakpointOptions::default())
//!     .wait()?;
//! handle.notify_ui_ready();
//!
//! if let Ok(DebugEvent::Paused { location, .. }) = event_rx.recv() {
//!     println!("paused at {location}");
//! }
//! handle.run();
//! engine.join()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod breakpoint;
pub mod channel;
pub mod controller;
#[cfg(feature = "dap")]
pub mod dap;
pub mod event;
pub mod host;
pub mod position;
pub mod runner;
pub mod state;

mod cancel;

pub use breakpoint::{Breakpoint, BreakpointOptions, BreakpointStore, HitCondition, LogMessage};
pub use cancel::CancellationToken;
pub use channel::Pending;
pub use controller::{Debugger, DebuggerHandle, Mailbox};
pub use event::DebugEvent;
pub use host::{DebugFrame, DebugHooks, DebugHost, HitContext, ScriptUnit, StepMode};
pub use position::ScriptInfo;
pub use runner::EngineThread;
pub use state::{DebuggerOptions, DebuggerState, PauseReason};

use crate::TernError;
use thiserror::Error;

/// Result type for debugger operations.
pub type DebugResult<T> = Result<T, DebugError>;

/// Errors reported by the debugger API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DebugError {
    /// The call violates the debugger's usage contract, such as attaching twice
    /// or naming a source that was never loaded.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The session was terminated.
    #[error("debug session cancelled")]
    Cancelled,

    /// The script raised an error while evaluating on behalf of the debugger.
    #[error(transparent)]
    Script(TernError),

    /// The engine thread is gone and the request will never complete.
    #[error("engine thread disconnected")]
    Disconnected,

    /// A blocking call was made from the engine thread, which would deadlock.
    #[error("blocking debugger call made on the engine thread")]
    WrongThread,
}

impl DebugError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}

impl From<TernError> for DebugError {
    fn from(err: TernError) -> Self {
        match err {
            TernError::Cancelled => Self::Cancelled,
            other => Self::Script(other),
        }
    }
}

impl From<DebugError> for TernError {
    fn from(err: DebugError) -> Self {
        match err {
            DebugError::Cancelled => Self::Cancelled,
            DebugError::Script(err) => err,
            other => Self::Host(other.to_string()),
        }
    }
}
