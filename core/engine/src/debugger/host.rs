//! The contract between an engine and the debugger.
//!
//! An engine that wants to be debugged implements [`DebugHost`] and calls the
//! subscribed [`DebugHooks`] from its own thread:
//!
//! - `before_evaluate` once per parsed unit, before any of it runs,
//! - `on_step` at a statement boundary while a step is in progress,
//! - `on_break` at a breakpoint or `debugger;` statement when not stepping,
//! - `on_skip` at every other statement boundary.
//!
//! Each statement hook returns the [`StepMode`] the engine should use from
//! then on. `on_break` returns `None` when it did not stop execution, and the
//! engine then carries on with the step it already had. While a hook runs, the engine lends itself out as a [`DebugFrame`]
//! so the debugger can query the location and evaluate expressions.

use crate::{Location, Position, SourceId, TernResult, Value};
use std::rc::Rc;

/// Requested execution granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StepMode {
    /// Run until something else stops execution.
    #[default]
    None,
    /// Stop at the next statement, entering calls.
    Into,
    /// Stop at the next statement in the current frame or a caller.
    Over,
    /// Stop at the next statement in a caller.
    Out,
}

/// A parsed compilation unit.
pub trait ScriptUnit {
    /// The unit's source id.
    fn source_id(&self) -> &SourceId;

    /// Every statement boundary in the unit, in any order and possibly with
    /// duplicates.
    fn breakable_positions(&self) -> Vec<Position>;
}

/// The engine as seen from inside a hook.
pub trait DebugFrame {
    /// The location of the statement about to run.
    fn location(&self) -> Location;

    /// Number of active calls; `0` at top level.
    fn call_depth(&self) -> usize;

    /// Evaluates `expression` in the current scope without firing hooks.
    fn evaluate(&mut self, expression: &str) -> TernResult<Value>;
}

/// What the engine knows about the statement boundary it stopped at.
///
/// Built fresh for every hook call and consumed by it.
#[derive(Debug, PartialEq, Eq)]
pub struct HitContext {
    /// The statement's location.
    pub location: Location,
    /// A breakpoint whose condition holds sits at this location.
    pub breakpoint: bool,
    /// The statement is `debugger;`.
    pub debugger_statement: bool,
}

impl HitContext {
    /// Creates a hit context.
    #[must_use]
    pub const fn new(location: Location, breakpoint: bool, debugger_statement: bool) -> Self {
        Self {
            location,
            breakpoint,
            debugger_statement,
        }
    }
}

/// Callbacks an engine invokes on its own thread.
pub trait DebugHooks {
    /// A unit was parsed and is about to run.
    fn before_evaluate(&self, unit: Rc<dyn ScriptUnit>) -> TernResult<()>;

    /// Returns `true` if a breakpoint sits at the frame's location and its
    /// condition, if any, holds.
    fn matches_breakpoint(&self, frame: &mut dyn DebugFrame) -> TernResult<bool>;

    /// A breakpoint or `debugger;` statement was reached while not stepping.
    ///
    /// Returns `None` if execution was not stopped, for example at a logpoint
    /// inside a call being stepped over.
    fn on_break(&self, frame: &mut dyn DebugFrame, hit: HitContext)
    -> TernResult<Option<StepMode>>;

    /// A statement boundary was reached while stepping.
    fn on_step(&self, frame: &mut dyn DebugFrame, hit: HitContext) -> TernResult<StepMode>;

    /// A statement boundary was reached while running freely.
    fn on_skip(&self, frame: &mut dyn DebugFrame, hit: HitContext) -> TernResult<StepMode>;
}

/// An engine that can run scripts under a debugger.
pub trait DebugHost {
    /// Installs `hooks`, replacing any previous subscriber.
    fn subscribe(&mut self, hooks: Rc<dyn DebugHooks>);

    /// Removes the current subscriber.
    fn unsubscribe(&mut self);

    /// Parses and runs `source`, starting in `initial_step` mode.
    fn run(&mut self, source_id: SourceId, source: &str, initial_step: StepMode)
    -> TernResult<Value>;
}
