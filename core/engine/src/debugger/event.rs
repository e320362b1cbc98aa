//! Notifications emitted by the debugger.

use super::PauseReason;
use crate::{Location, TernError, Value};
use std::sync::mpsc;

/// A notification from the engine thread to whoever drives the session.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    /// Execution stopped and the engine thread is parked.
    Paused {
        /// Why execution stopped.
        reason: PauseReason,
        /// Where execution stopped.
        location: Location,
    },
    /// Execution resumed after a pause.
    Resumed,
    /// A logpoint was hit.
    Log {
        /// The rendered log message.
        message: String,
        /// The logpoint's location.
        location: Location,
    },
    /// The script printed a line.
    Output(String),
    /// The run was cancelled.
    Cancelled,
    /// The script completed with a value.
    Done(Value),
    /// The script failed with an uncaught error.
    Error(TernError),
}

/// Where the engine thread sends [`DebugEvent`]s.
pub type EventSender = mpsc::Sender<DebugEvent>;
