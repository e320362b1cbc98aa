//! Debug session management
//!
//! Maps DAP requests onto a script running on an [`EngineThread`]. Every
//! request that needs an answer from the engine blocks on a [`Pending`]
//! until the engine thread next drains its mailbox.
//!
//! [`Pending`]: crate::debugger::Pending

use super::messages::{
    AttachRequestArguments, Breakpoint, BreakpointLocation, BreakpointLocationsArguments,
    BreakpointLocationsResponseBody, Capabilities, ContinueResponseBody, DisconnectArguments,
    EvaluateArguments, EvaluateResponseBody, InitializeRequestArguments, LaunchRequestArguments,
    SetBreakpointsArguments, SetBreakpointsResponseBody, Source, SourceBreakpoint, StackFrame,
    StackTraceArguments, StackTraceResponseBody, Thread, ThreadsResponseBody,
};
use crate::debugger::event::EventSender;
use crate::debugger::{
    BreakpointOptions, DebugError, DebugEvent, DebugResult, DebuggerHandle, DebuggerOptions,
    EngineThread,
};
use crate::{Context, Location, Position, SourceId};
use std::fs;
use std::path::Path;

/// The only thread a script ever runs on.
pub const THREAD_ID: i64 = 1;

/// Debug session state
#[derive(Debug)]
pub struct DebugSession {
    events: EventSender,
    engine: Option<EngineThread>,
    /// `setBreakpoints` requests received before a program was launched.
    deferred_breakpoints: Vec<SetBreakpointsArguments>,
    /// Whether the engine was started with `noDebug`.
    no_debug: bool,
    next_breakpoint_id: i64,
}

impl DebugSession {
    /// Creates a session that reports engine events to `events`.
    #[must_use]
    pub const fn new(events: EventSender) -> Self {
        Self {
            events,
            engine: None,
            deferred_breakpoints: Vec::new(),
            no_debug: false,
            next_breakpoint_id: 1,
        }
    }

    /// Handle initialize request
    pub fn handle_initialize(&mut self, args: &InitializeRequestArguments) -> Capabilities {
        log::info!(
            "initializing session for {}",
            args.client_name
                .as_deref()
                .or(args.client_id.as_deref())
                .unwrap_or("unknown client")
        );
        Capabilities {
            supports_configuration_done_request: true,
            supports_conditional_breakpoints: true,
            supports_hit_conditional_breakpoints: true,
            supports_evaluate_for_hovers: true,
            supports_terminate_debuggee: true,
            supports_log_points: true,
            supports_terminate_request: true,
            supports_breakpoint_locations_request: true,
        }
    }

    /// Handle launch request
    ///
    /// The script is parsed and then held until `configurationDone`, so that
    /// breakpoints sent in between apply from the first statement.
    pub fn handle_launch(&mut self, args: LaunchRequestArguments) -> DebugResult<()> {
        let program = required_program(args.program.as_deref())?;
        let no_debug = args.no_debug.unwrap_or(false);
        let options = if no_debug {
            DebuggerOptions::default()
        } else {
            DebuggerOptions::default()
                .with_wait_for_client(true)
                .with_wait_for_ui(true)
                .with_pause_on_entry(args.stop_on_entry.unwrap_or(false))
        };

        self.spawn(program, options)?;
        self.no_debug = no_debug;
        if !no_debug {
            drop(self.handle()?.attach(false)?);
        }
        self.apply_deferred_breakpoints();
        Ok(())
    }

    /// Handle attach request
    pub fn handle_attach(&mut self, args: AttachRequestArguments) -> DebugResult<()> {
        let program = required_program(args.program.as_deref())?;
        self.spawn(program, DebuggerOptions::default().with_wait_for_client(true))?;
        drop(self.handle()?.attach(args.stop_on_entry.unwrap_or(false))?);
        self.apply_deferred_breakpoints();
        Ok(())
    }

    /// Handle configurationDone request
    pub fn handle_configuration_done(&mut self) -> DebugResult<()> {
        drop(self.handle()?.notify_ui_ready());
        Ok(())
    }

    /// Handle setBreakpoints request
    ///
    /// Replaces every breakpoint of the source. Breakpoints that cannot be set
    /// are reported unverified with the reason.
    pub fn handle_set_breakpoints(
        &mut self,
        args: SetBreakpointsArguments,
    ) -> DebugResult<SetBreakpointsResponseBody> {
        let source_breakpoints = requested_breakpoints(&args);

        if self.engine.is_none() {
            log::debug!("deferring breakpoints until a program is launched");
            let breakpoints = source_breakpoints
                .iter()
                .map(|bp| Breakpoint {
                    id: Some(self.next_id()),
                    verified: false,
                    message: Some("waiting for the program to start".into()),
                    source: Some(args.source.clone()),
                    line: Some(bp.line),
                    column: bp.column,
                })
                .collect();
            self.deferred_breakpoints.push(args);
            return Ok(SetBreakpointsResponseBody { breakpoints });
        }

        let source_id = source_id(&args.source)?;
        let handle = self.handle()?.clone();
        handle.clear_breakpoints(Some(source_id.clone())).wait()?;

        let breakpoints = source_breakpoints
            .into_iter()
            .map(|bp| {
                let requested = Position::new(to_u32(bp.line), bp.column.map_or(1, to_u32));
                let options = BreakpointOptions {
                    condition: bp.condition,
                    hit_condition: bp.hit_condition,
                    log_message: bp.log_message,
                };
                let id = Some(self.next_id());
                match handle
                    .set_breakpoint(source_id.clone(), requested, options)
                    .wait()
                {
                    Ok(position) => Breakpoint {
                        id,
                        verified: true,
                        message: None,
                        source: Some(args.source.clone()),
                        line: Some(i64::from(position.line)),
                        column: Some(i64::from(position.column)),
                    },
                    Err(err) => {
                        log::debug!("breakpoint at {source_id}:{requested} rejected: {err}");
                        Breakpoint {
                            id,
                            verified: false,
                            message: Some(err.to_string()),
                            source: Some(args.source.clone()),
                            line: Some(bp.line),
                            column: bp.column,
                        }
                    }
                }
            })
            .collect();

        Ok(SetBreakpointsResponseBody { breakpoints })
    }

    /// Handle breakpointLocations request
    pub fn handle_breakpoint_locations(
        &mut self,
        args: &BreakpointLocationsArguments,
    ) -> DebugResult<BreakpointLocationsResponseBody> {
        let source_id = source_id(&args.source)?;
        let start = Position::new(to_u32(args.line), args.column.map_or(1, to_u32));
        let end = Position::new(
            args.end_line.map_or(start.line, to_u32),
            args.end_column.map_or(u32::MAX, to_u32),
        );

        let breakpoints = self
            .handle()?
            .breakable_positions(source_id, start, end)
            .wait()?
            .into_iter()
            .map(|position| BreakpointLocation {
                line: i64::from(position.line),
                column: i64::from(position.column),
            })
            .collect();

        Ok(BreakpointLocationsResponseBody { breakpoints })
    }

    /// Handle continue request
    pub fn handle_continue(&mut self) -> DebugResult<ContinueResponseBody> {
        drop(self.handle()?.run());
        Ok(ContinueResponseBody {
            all_threads_continued: true,
        })
    }

    /// Handle next (step over) request
    pub fn handle_next(&mut self) -> DebugResult<()> {
        drop(self.handle()?.step_over());
        Ok(())
    }

    /// Handle stepIn request
    pub fn handle_step_in(&mut self) -> DebugResult<()> {
        drop(self.handle()?.step_into());
        Ok(())
    }

    /// Handle stepOut request
    pub fn handle_step_out(&mut self) -> DebugResult<()> {
        drop(self.handle()?.step_out());
        Ok(())
    }

    /// Handle pause request
    pub fn handle_pause(&mut self) -> DebugResult<()> {
        drop(self.handle()?.pause());
        Ok(())
    }

    /// Handle evaluate request
    pub fn handle_evaluate(&mut self, args: &EvaluateArguments) -> DebugResult<EvaluateResponseBody> {
        let value = self.handle()?.evaluate(args.expression.as_str()).wait()?;
        Ok(EvaluateResponseBody {
            result: value.to_string(),
            type_: Some(value.type_of().to_owned()),
            variables_reference: 0,
        })
    }

    /// Handle threads request
    #[must_use]
    pub fn handle_threads(&self) -> ThreadsResponseBody {
        ThreadsResponseBody {
            threads: vec![Thread {
                id: THREAD_ID,
                name: "main".into(),
            }],
        }
    }

    /// Handle stackTrace request
    ///
    /// Reports the single frame the engine is stopped in, or no frames while it
    /// is running outside a statement.
    pub fn handle_stack_trace(
        &mut self,
        _args: &StackTraceArguments,
    ) -> DebugResult<StackTraceResponseBody> {
        let stack_frames: Vec<_> = self
            .handle()?
            .current_location()
            .wait()?
            .map(|location| stack_frame(&location))
            .into_iter()
            .collect();

        Ok(StackTraceResponseBody {
            total_frames: i64::try_from(stack_frames.len()).ok(),
            stack_frames,
        })
    }

    /// Handle terminate request
    pub fn handle_terminate(&mut self) -> DebugResult<()> {
        self.handle()?.terminate();
        Ok(())
    }

    /// Handle disconnect request
    ///
    /// A launched program is terminated unless the client asks otherwise; an
    /// attached one keeps running without the debugger.
    pub fn handle_disconnect(&mut self, args: &DisconnectArguments) -> DebugResult<()> {
        let Some(engine) = &self.engine else {
            return Ok(());
        };
        if args.terminate_debuggee.unwrap_or(!self.no_debug) {
            engine.handle().terminate();
        } else {
            drop(engine.handle().disconnect());
        }
        Ok(())
    }

    fn spawn(&mut self, program: &str, options: DebuggerOptions) -> DebugResult<()> {
        if self.engine.is_some() {
            return Err(DebugError::invalid("a program is already running"));
        }
        let source = fs::read_to_string(program)
            .map_err(|e| DebugError::invalid(format!("cannot read `{program}`: {e}")))?;

        let output = self.events.clone();
        let engine = EngineThread::spawn(
            options,
            self.events.clone(),
            SourceId::from(program),
            source,
            move || {
                let mut context = Context::default();
                context.set_output(move |line| {
                    drop(output.send(DebugEvent::Output(line.to_owned())));
                });
                context
            },
        )
        .map_err(|e| DebugError::invalid(format!("cannot start the engine thread: {e}")))?;

        log::info!("started `{program}`");
        self.engine = Some(engine);
        Ok(())
    }

    fn apply_deferred_breakpoints(&mut self) {
        for args in std::mem::take(&mut self.deferred_breakpoints) {
            if let Err(err) = self.handle_set_breakpoints(args) {
                log::warn!("failed to apply deferred breakpoints: {err}");
            }
        }
    }

    fn handle(&self) -> DebugResult<&DebuggerHandle> {
        self.engine
            .as_ref()
            .map(EngineThread::handle)
            .ok_or_else(|| DebugError::invalid("no program is running"))
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_breakpoint_id;
        self.next_breakpoint_id += 1;
        id
    }
}

fn required_program(program: Option<&str>) -> DebugResult<&str> {
    program
        .filter(|program| !program.is_empty())
        .ok_or_else(|| DebugError::invalid("missing `program` argument"))
}

fn source_id(source: &Source) -> DebugResult<SourceId> {
    source
        .id()
        .map(SourceId::from)
        .ok_or_else(|| DebugError::invalid("source has neither a path nor a name"))
}

/// The legacy `lines` form is used only when `breakpoints` is absent.
fn requested_breakpoints(args: &SetBreakpointsArguments) -> Vec<SourceBreakpoint> {
    match (&args.breakpoints, &args.lines) {
        (Some(breakpoints), _) => breakpoints.clone(),
        (None, Some(lines)) => lines
            .iter()
            .map(|&line| SourceBreakpoint {
                line,
                ..SourceBreakpoint::default()
            })
            .collect(),
        (None, None) => Vec::new(),
    }
}

fn stack_frame(location: &Location) -> StackFrame {
    let path = location.source_id.as_str();
    let name = Path::new(path)
        .file_name()
        .map_or_else(|| path.to_owned(), |name| name.to_string_lossy().into_owned());
    StackFrame {
        id: 0,
        name: "global".into(),
        source: Some(Source {
            name: Some(name),
            path: Some(path.to_owned()),
        }),
        line: i64::from(location.position.line),
        column: i64::from(location.position.column),
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
