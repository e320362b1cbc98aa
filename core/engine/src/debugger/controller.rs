//! The debugger controller.
//!
//! [`Debugger`] lives on the engine thread and is driven from the hooks the
//! engine calls. [`DebuggerHandle`] is its thread-safe counterpart: every
//! method enqueues a message and returns immediately.

use super::breakpoint::HitOutcome;
use super::channel::{EngineScope, Message, Pending, Pump};
use super::event::EventSender;
use super::{
    Breakpoint, BreakpointOptions, BreakpointStore, CancellationToken, DebugError, DebugEvent,
    DebugFrame, DebugHooks, DebugHost, DebugResult, DebuggerOptions, DebuggerState, HitContext,
    PauseReason, ScriptInfo, ScriptUnit, StepMode,
};
use crate::{Location, Position, SourceId, TernError, TernResult, Value};
use portable_atomic::{AtomicBool, Ordering};
use rustc_hash::FxHashMap;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use std::sync::{Arc, OnceLock, mpsc};
use std::thread::{self, ThreadId};

/// State shared between the handles and the engine thread.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    attached: AtomicBool,
    cancel: CancellationToken,
    engine_thread: OnceLock<ThreadId>,
}

impl Shared {
    pub(crate) fn is_engine_thread(&self) -> bool {
        self.engine_thread.get() == Some(&thread::current().id())
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

/// The receiving end of a [`DebuggerHandle`], waiting to be moved onto the
/// engine thread and turned into a [`Debugger`].
#[derive(Debug)]
pub struct Mailbox {
    receiver: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
}

/// Thread-safe control surface of a [`Debugger`].
///
/// Cheap to clone. Nothing here blocks; requests that produce a value return a
/// [`Pending`] that completes once the engine thread has handled them.
#[derive(Debug, Clone)]
pub struct DebuggerHandle {
    sender: mpsc::Sender<Message>,
    shared: Arc<Shared>,
}

impl DebuggerHandle {
    /// Creates a handle and the mailbox for the debugger it will control.
    #[must_use]
    pub fn new() -> (Self, Mailbox) {
        let (sender, receiver) = mpsc::channel();
        let shared = Arc::new(Shared::default());
        (
            Self {
                sender,
                shared: shared.clone(),
            },
            Mailbox { receiver, shared },
        )
    }

    /// Returns `true` while a client is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.shared.is_attached()
    }

    pub(crate) fn pending<T>(&self, receiver: futures_channel::oneshot::Receiver<DebugResult<T>>) -> Pending<T> {
        Pending::new(receiver, self.shared.clone())
    }

    /// The session's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    fn post(&self, message: Message) {
        if self.sender.send(message).is_err() {
            log::debug!("debugger message dropped: engine thread is gone");
        }
    }

    fn wake(&self) {
        self.post(Message::Continue);
    }

    fn action<F>(&self, run: F) -> Pending<()>
    where
        F: FnOnce(&mut EngineScope<'_>) -> DebugResult<()> + Send + 'static,
    {
        let (completion, receiver) = futures_channel::oneshot::channel();
        self.post(Message::Action {
            run: Box::new(run),
            completion,
        });
        self.pending(receiver)
    }

    fn function<T, F>(&self, run: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut EngineScope<'_>) -> DebugResult<T> + Send + 'static,
    {
        let (completion, receiver) = futures_channel::oneshot::channel();
        self.post(Message::Function(Box::new(move |scope| {
            drop(completion.send(run(scope)));
        })));
        self.pending(receiver)
    }

    /// Resumes execution until the next breakpoint.
    pub fn run(&self) -> Pending<()> {
        self.resume_with(StepMode::None)
    }

    /// Resumes and stops at the next statement, entering calls.
    pub fn step_into(&self) -> Pending<()> {
        self.resume_with(StepMode::Into)
    }

    /// Resumes and stops at the next statement of the current function or a caller.
    pub fn step_over(&self) -> Pending<()> {
        self.resume_with(StepMode::Over)
    }

    /// Resumes and stops at the next statement of a caller.
    pub fn step_out(&self) -> Pending<()> {
        self.resume_with(StepMode::Out)
    }

    fn resume_with(&self, mode: StepMode) -> Pending<()> {
        let pending = self.action(move |scope| {
            scope.debugger.resume_with(mode);
            Ok(())
        });
        self.wake();
        pending
    }

    /// Asks the engine to stop at the next statement.
    ///
    /// The request is honored by the next hook the engine fires; nothing
    /// blocks waiting for it.
    pub fn pause(&self) -> Pending<()> {
        self.action(|scope| {
            scope.debugger.request_pause();
            Ok(())
        })
    }

    /// Cancels the run. A parked engine thread is released at once.
    pub fn terminate(&self) {
        log::info!("terminating debug session");
        self.shared.cancel.cancel();
        drop(self.action(|scope| {
            scope.debugger.set_state(DebuggerState::Terminating);
            Ok(())
        }));
        self.wake();
    }

    /// Attaches a client, optionally asking for a pause at the next statement.
    ///
    /// # Errors
    ///
    /// Fails with [`DebugError::InvalidOperation`] if a client is already attached.
    pub fn attach(&self, pause: bool) -> DebugResult<Pending<()>> {
        if self
            .shared
            .attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DebugError::invalid("a client is already attached"));
        }
        log::info!("client attached");
        let pending = self.action(move |scope| {
            if pause {
                scope.debugger.request_pause();
            }
            Ok(())
        });
        self.wake();
        Ok(pending)
    }

    /// Detaches the client. Does nothing if none is attached.
    pub fn detach(&self) {
        if self
            .shared
            .attached
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::info!("client detached");
        }
    }

    /// Detaches and lets the script run to completion.
    pub fn disconnect(&self) -> Pending<()> {
        self.detach();
        self.run()
    }

    /// Reports that the client has finished its initial configuration.
    pub fn notify_ui_ready(&self) -> Pending<()> {
        let pending = self.action(|scope| {
            scope.debugger.ui_ready.set(true);
            Ok(())
        });
        self.wake();
        pending
    }

    /// Evaluates `expression` in the scope of the statement the engine is stopped at.
    pub fn evaluate(&self, expression: impl Into<String>) -> Pending<Value> {
        let expression = expression.into();
        self.function(move |scope| Ok(scope.frame("evaluate")?.evaluate(&expression)?))
    }

    /// Sets a breakpoint at the first breakable position at or after
    /// `position` and returns where it landed.
    pub fn set_breakpoint(
        &self,
        source_id: SourceId,
        position: Position,
        options: BreakpointOptions,
    ) -> Pending<Position> {
        self.function(move |scope| scope.debugger.set_breakpoint(&source_id, position, options))
    }

    /// Removes the breakpoints of one source, or of every source.
    pub fn clear_breakpoints(&self, source_id: Option<SourceId>) -> Pending<()> {
        self.action(move |scope| {
            let mut breakpoints = scope.debugger.breakpoints.borrow_mut();
            match &source_id {
                Some(source_id) => breakpoints.clear_source(source_id),
                None => breakpoints.clear(),
            }
            Ok(())
        })
    }

    /// Breakable positions of a loaded source between `start` and `end` inclusive.
    pub fn breakable_positions(
        &self,
        source_id: SourceId,
        start: Position,
        end: Position,
    ) -> Pending<Vec<Position>> {
        self.function(move |scope| {
            let script = scope.debugger.script(&source_id)?;
            Ok(script.find_positions_in_range(start, end).collect())
        })
    }

    /// Where the engine is stopped, if it is inside a statement hook.
    pub fn current_location(&self) -> Pending<Option<Location>> {
        self.function(|scope| Ok(scope.frame.as_ref().map(|frame| frame.location())))
    }

    /// The controller's current state.
    pub fn state(&self) -> Pending<DebuggerState> {
        self.function(|scope| Ok(scope.debugger.state()))
    }
}

/// The engine-thread side of the debugger.
///
/// Built on the engine thread from a [`Mailbox`] and subscribed to a
/// [`DebugHost`] for the duration of one run.
#[derive(Debug)]
pub struct Debugger {
    shared: Arc<Shared>,
    pump: Pump,
    options: DebuggerOptions,
    events: EventSender,
    state: Cell<DebuggerState>,
    /// Step mode requested by the client and not yet handed to the engine.
    step_mode: Cell<StepMode>,
    resume: Cell<bool>,
    parked: Cell<bool>,
    ui_ready: Cell<bool>,
    entered: Cell<bool>,
    breakpoints: RefCell<BreakpointStore>,
    scripts: RefCell<FxHashMap<SourceId, Rc<ScriptInfo>>>,
}

impl Debugger {
    /// Creates the debugger on the calling thread, which becomes its engine thread.
    #[must_use]
    pub fn new(mailbox: Mailbox, options: DebuggerOptions, events: EventSender) -> Rc<Self> {
        let Mailbox { receiver, shared } = mailbox;
        if shared.engine_thread.set(thread::current().id()).is_err() {
            log::warn!("debugger mailbox was already bound to an engine thread");
        }
        Rc::new(Self {
            pump: Pump::new(receiver, shared.cancel.clone()),
            shared,
            options,
            events,
            state: Cell::new(DebuggerState::Entering),
            step_mode: Cell::new(StepMode::None),
            resume: Cell::new(false),
            parked: Cell::new(false),
            ui_ready: Cell::new(false),
            entered: Cell::new(false),
            breakpoints: RefCell::default(),
            scripts: RefCell::default(),
        })
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> DebuggerState {
        self.state.get()
    }

    /// The session options.
    #[must_use]
    pub const fn options(&self) -> DebuggerOptions {
        self.options
    }

    /// The active breakpoints.
    pub fn breakpoints(&self) -> Ref<'_, BreakpointStore> {
        self.breakpoints.borrow()
    }

    /// The loaded unit with the given id.
    ///
    /// # Errors
    ///
    /// Fails with [`DebugError::InvalidOperation`] if no such unit was loaded.
    pub fn script(&self, source_id: &SourceId) -> DebugResult<Rc<ScriptInfo>> {
        self.scripts
            .borrow()
            .get(source_id)
            .cloned()
            .ok_or_else(|| DebugError::invalid(format!("unknown source `{source_id}`")))
    }

    /// Runs `source` on `host` under the debugger and reports the outcome as
    /// a lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Cancelled`] when terminated, or
    /// [`DebugError::Script`] for an uncaught script error.
    pub fn execute(
        self: &Rc<Self>,
        host: &mut dyn DebugHost,
        source_id: SourceId,
        source: &str,
    ) -> DebugResult<Value> {
        self.assert_engine_thread();
        if self.options.wait_for_client {
            if let Err(err) = self.wait_for_client() {
                return self.finish(Err(err.into()));
            }
        }
        if self.state.get() != DebuggerState::Pausing {
            self.set_state(DebuggerState::Entering);
        }

        log::info!("running {source_id}");
        host.subscribe(self.clone());
        let result = host.run(source_id, source, StepMode::Into);
        host.unsubscribe();
        self.finish(result)
    }

    fn finish(&self, result: TernResult<Value>) -> DebugResult<Value> {
        self.set_state(DebuggerState::Terminated);
        match result {
            Ok(value) => {
                log::info!("script completed with {value}");
                self.emit(DebugEvent::Done(value.clone()));
                Ok(value)
            }
            Err(TernError::Cancelled) => {
                log::info!("script cancelled");
                self.force_detach();
                self.emit(DebugEvent::Cancelled);
                Err(DebugError::Cancelled)
            }
            Err(err) => {
                log::error!("uncaught script error: {err}");
                self.force_detach();
                self.emit(DebugEvent::Error(err.clone()));
                Err(DebugError::Script(err))
            }
        }
    }

    fn force_detach(&self) {
        self.shared.attached.store(false, Ordering::Release);
    }

    fn assert_engine_thread(&self) {
        debug_assert!(
            self.shared.is_engine_thread(),
            "debugger used off its engine thread"
        );
    }

    pub(crate) fn set_state(&self, state: DebuggerState) {
        let previous = self.state.replace(state);
        if previous != state {
            log::debug!("debugger state {previous:?} -> {state:?}");
        }
    }

    pub(crate) fn request_pause(&self) {
        if self.state.get().is_terminal() || self.parked.get() {
            return;
        }
        self.step_mode.set(StepMode::Into);
        self.set_state(DebuggerState::Pausing);
    }

    pub(crate) fn resume_with(&self, mode: StepMode) {
        if self.state.get().is_terminal() {
            return;
        }
        self.step_mode.set(mode);
        self.set_state(if mode == StepMode::None {
            DebuggerState::Running
        } else {
            DebuggerState::Stepping
        });
        self.resume.set(true);
    }

    fn set_breakpoint(
        &self,
        source_id: &SourceId,
        position: Position,
        options: BreakpointOptions,
    ) -> DebugResult<Position> {
        let script = self.script(source_id)?;
        let position = script.find_nearest_breakpoint_position(position)?;
        let breakpoint = Breakpoint::new(
            Location::new(script.source_id().clone(), position),
            options,
        )?;
        log::debug!("set {breakpoint}");
        self.breakpoints.borrow_mut().set(breakpoint);
        Ok(position)
    }

    fn emit(&self, event: DebugEvent) {
        if self.events.send(event).is_err() {
            log::trace!("debug event dropped: no listener");
        }
    }

    fn check_cancelled(&self) -> TernResult<()> {
        if self.shared.cancel.is_cancelled() {
            if !self.state.get().is_terminal() {
                self.set_state(DebuggerState::Terminating);
            }
            return Err(TernError::Cancelled);
        }
        Ok(())
    }

    /// Common prologue of every hook. Returns whether a client is attached.
    fn enter_hook<'a>(&'a self, frame: Option<&'a mut dyn DebugFrame>) -> TernResult<bool> {
        self.assert_engine_thread();
        self.check_cancelled()?;
        self.pump.drain(&mut EngineScope {
            debugger: self,
            frame,
        });
        self.check_cancelled()?;
        Ok(self.shared.is_attached())
    }

    fn park_until(
        &self,
        mut frame: Option<&mut dyn DebugFrame>,
        done: impl Fn(&Self) -> bool,
    ) -> DebugResult<()> {
        while !done(self) {
            self.pump.wait(&mut EngineScope {
                debugger: self,
                frame: match &mut frame {
                    Some(frame) => Some(&mut **frame),
                    None => None,
                },
            })?;
        }
        Ok(())
    }

    fn wait_for_client(&self) -> DebugResult<()> {
        if self.shared.is_attached() {
            return Ok(());
        }
        log::info!("waiting for a client to attach");
        self.set_state(DebuggerState::WaitingForClient);
        // A resume without an attach (`disconnect`, `run`) also lets the script go.
        self.park_until(None, |this| this.shared.is_attached() || this.resume.get())?;
        if self.state.get() == DebuggerState::WaitingForClient {
            self.set_state(DebuggerState::Entering);
        }
        Ok(())
    }

    fn wait_for_ui(&self) -> DebugResult<()> {
        if self.ui_ready.get() {
            return Ok(());
        }
        log::info!("waiting for the client to finish configuration");
        self.set_state(DebuggerState::WaitingForUI);
        self.park_until(None, |this| {
            this.ui_ready.get() || this.resume.get() || !this.shared.is_attached()
        })?;
        if self.state.get() == DebuggerState::WaitingForUI {
            self.set_state(DebuggerState::Entering);
        }
        Ok(())
    }

    /// Parks the engine thread until the client resumes it and returns the
    /// step mode to continue with.
    fn pause(
        &self,
        frame: &mut dyn DebugFrame,
        reason: PauseReason,
        location: Location,
    ) -> TernResult<StepMode> {
        log::debug!("paused at {location} ({reason})");
        self.set_state(DebuggerState::Stepping);
        self.resume.set(false);
        self.parked.set(true);
        self.emit(DebugEvent::Paused { reason, location });

        let parked = self.park_until(Some(frame), |this| this.resume.get());
        self.parked.set(false);
        parked?;

        self.emit(DebugEvent::Resumed);
        let mode = self.step_mode.replace(StepMode::None);
        if !self.state.get().is_terminal() {
            self.set_state(if mode == StepMode::None {
                DebuggerState::Running
            } else {
                DebuggerState::Stepping
            });
        }
        Ok(mode)
    }

    /// Counts a hit of the breakpoint at `location` and returns whether it
    /// should stop execution. Logpoints emit their message here.
    fn post_process(&self, frame: &mut dyn DebugFrame, location: &Location) -> TernResult<bool> {
        let outcome = match self.breakpoints.borrow_mut().get_mut(location) {
            Some(breakpoint) => breakpoint.register_hit(),
            None => return Ok(false),
        };
        match outcome {
            HitOutcome::Pause => Ok(true),
            HitOutcome::Suppress => Ok(false),
            HitOutcome::Log(message) => {
                let message = message.render(frame)?;
                self.emit(DebugEvent::Log {
                    message,
                    location: location.clone(),
                });
                Ok(false)
            }
        }
    }

    fn hit_outcome(&self, frame: &mut dyn DebugFrame, hit: &HitContext) -> TernResult<Option<PauseReason>> {
        let due = hit.breakpoint && self.post_process(frame, &hit.location)?;
        Ok(if hit.debugger_statement {
            Some(PauseReason::DebuggerStatement)
        } else if due {
            Some(PauseReason::BreakPoint)
        } else {
            None
        })
    }
}

impl DebugHooks for Debugger {
    fn before_evaluate(&self, unit: Rc<dyn ScriptUnit>) -> TernResult<()> {
        let script = Rc::new(ScriptInfo::new(unit));
        log::debug!("loaded {}", script.source_id());
        self.scripts
            .borrow_mut()
            .insert(script.source_id().clone(), script);

        let first = !self.entered.replace(true);
        if self.enter_hook(None)? && first && self.options.wait_for_ui {
            self.wait_for_ui()?;
        }
        Ok(())
    }

    fn matches_breakpoint(&self, frame: &mut dyn DebugFrame) -> TernResult<bool> {
        if !self.enter_hook(Some(&mut *frame))? {
            return Ok(false);
        }
        let location = frame.location();
        let condition = match self.breakpoints.borrow().get(&location) {
            Some(breakpoint) => breakpoint.condition().map(str::to_owned),
            None => return Ok(false),
        };
        match condition {
            Some(condition) => Ok(frame.evaluate(&condition)?.to_boolean()),
            None => Ok(true),
        }
    }

    fn on_break(
        &self,
        frame: &mut dyn DebugFrame,
        hit: HitContext,
    ) -> TernResult<Option<StepMode>> {
        if !self.enter_hook(Some(&mut *frame))? {
            return Ok(None);
        }
        let reason = match self.hit_outcome(frame, &hit)? {
            Some(reason) => reason,
            None if self.state.get() == DebuggerState::Pausing => PauseReason::Pause,
            // Not stopping here: a step requested while running starts now,
            // otherwise the engine keeps the step it is in the middle of.
            None => {
                return Ok(match self.step_mode.get() {
                    StepMode::None => None,
                    requested => Some(requested),
                });
            }
        };
        self.pause(frame, reason, hit.location).map(Some)
    }

    fn on_step(&self, frame: &mut dyn DebugFrame, hit: HitContext) -> TernResult<StepMode> {
        if !self.enter_hook(Some(&mut *frame))? {
            return Ok(StepMode::None);
        }
        let reason = self.hit_outcome(frame, &hit)?;
        match self.state.get() {
            DebuggerState::Entering if self.options.pause_on_entry => {
                self.pause(frame, PauseReason::Entry, hit.location)
            }
            DebuggerState::Pausing => self.pause(frame, PauseReason::Pause, hit.location),
            DebuggerState::Stepping => {
                self.pause(frame, reason.unwrap_or(PauseReason::Step), hit.location)
            }
            DebuggerState::Entering | DebuggerState::Running => match reason {
                Some(reason) => self.pause(frame, reason, hit.location),
                None => {
                    self.set_state(DebuggerState::Running);
                    Ok(StepMode::None)
                }
            },
            _ => Ok(StepMode::None),
        }
    }

    fn on_skip(&self, frame: &mut dyn DebugFrame, _hit: HitContext) -> TernResult<StepMode> {
        if !self.enter_hook(Some(&mut *frame))? {
            return Ok(StepMode::None);
        }
        Ok(self.step_mode.get())
    }
}
