//! Debugger state machine types and session options.

use std::fmt;

/// The controller's position in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebuggerState {
    /// Parked until a client attaches.
    WaitingForClient,
    /// The entry script is parsed; parked until the client finishes configuring.
    WaitingForUI,
    /// About to run the first statement.
    Entering,
    /// Running freely; only breakpoints and `debugger;` stop execution.
    Running,
    /// A pause was requested and will be honored at the next statement.
    Pausing,
    /// Stopping at every statement the current step granularity allows.
    Stepping,
    /// Cancellation requested.
    Terminating,
    /// The run is over.
    Terminated,
}

impl DebuggerState {
    /// Returns `true` once termination has been requested or completed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminating | Self::Terminated)
    }
}

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseReason {
    /// Stopped before the first statement.
    Entry,
    /// Stopped because a client asked for it.
    Pause,
    /// Stopped after a step request.
    Step,
    /// Stopped on a breakpoint.
    BreakPoint,
    /// Stopped on a `debugger;` statement.
    DebuggerStatement,
}

impl PauseReason {
    /// The Debug Adapter Protocol name of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Pause => "pause",
            Self::Step => "step",
            Self::BreakPoint => "breakpoint",
            Self::DebuggerStatement => "debugger statement",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for one debug session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebuggerOptions {
    /// Block before running anything until a client attaches.
    pub wait_for_client: bool,
    /// Block after the entry script is parsed until the client reports it is ready.
    pub wait_for_ui: bool,
    /// Stop before the first statement.
    pub pause_on_entry: bool,
}

impl DebuggerOptions {
    /// Sets [`DebuggerOptions::wait_for_client`].
    #[must_use]
    pub const fn with_wait_for_client(mut self, value: bool) -> Self {
        self.wait_for_client = value;
        self
    }

    /// Sets [`DebuggerOptions::wait_for_ui`].
    #[must_use]
    pub const fn with_wait_for_ui(mut self, value: bool) -> Self {
        self.wait_for_ui = value;
        self
    }

    /// Sets [`DebuggerOptions::pause_on_entry`].
    #[must_use]
    pub const fn with_pause_on_entry(mut self, value: bool) -> Self {
        self.pause_on_entry = value;
        self
    }
}
