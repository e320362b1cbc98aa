//! End-to-end tests of the debugger: a script on an engine thread, driven
//! from the test thread through a `DebuggerHandle`.
#![allow(clippy::unwrap_used)]

use indoc::indoc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tern_engine::debugger::{
    BreakpointOptions, DebugError, DebugEvent, DebuggerHandle, DebuggerOptions, DebuggerState,
    EngineThread, PauseReason,
};
use tern_engine::{Context, Location, Position, TernError, Value};

const TIMEOUT: Duration = Duration::from_secs(10);
const MAIN: &str = "main.tern";

struct Session {
    engine: EngineThread,
    handle: DebuggerHandle,
    events: Receiver<DebugEvent>,
}

impl Session {
    /// Starts `source` held before its first statement until `configure`
    /// returns.
    fn launch(source: &str, configure: impl FnOnce(&DebuggerHandle)) -> Self {
        let (sender, events) = mpsc::channel();
        let engine = EngineThread::spawn(
            DebuggerOptions::default()
                .with_wait_for_client(true)
                .with_wait_for_ui(true),
            sender,
            MAIN.into(),
            source.to_owned(),
            Context::default,
        )
        .unwrap();
        let handle = engine.handle().clone();
        handle.attach(false).unwrap();
        configure(&handle);
        handle.notify_ui_ready();
        Self {
            engine,
            handle,
            events,
        }
    }

    fn next(&self) -> DebugEvent {
        self.events.recv_timeout(TIMEOUT).expect("no debug event")
    }

    fn expect_pause(&self) -> (PauseReason, Location) {
        loop {
            match self.next() {
                DebugEvent::Paused { reason, location } => return (reason, location),
                DebugEvent::Resumed | DebugEvent::Output(_) => {}
                other => panic!("expected a pause, got {other:?}"),
            }
        }
    }

    /// Every event until the engine thread drops its sender.
    fn remaining(&self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.recv_timeout(TIMEOUT) {
            events.push(event);
        }
        events
    }
}

fn at(line: u32, column: u32) -> Location {
    Location::new(MAIN.into(), Position::new(line, column))
}

fn breakpoint(handle: &DebuggerHandle, line: u32, options: BreakpointOptions) -> Position {
    handle
        .set_breakpoint(MAIN.into(), Position::new(line, 1), options)
        .wait()
        .unwrap()
}

#[test]
fn breakpoint_then_step_over() {
    let source = (1..=20)
        .map(|n| format!("let v{n} = {n};"))
        .chain(["v20;".to_owned()])
        .collect::<Vec<_>>()
        .join("\n");
    let session = Session::launch(&source, |handle| {
        assert_eq!(
            breakpoint(handle, 10, BreakpointOptions::default()),
            Position::new(10, 1)
        );
    });

    assert_eq!(session.expect_pause(), (PauseReason::BreakPoint, at(10, 1)));
    assert_eq!(
        session.handle.evaluate("v9 + 1").wait().unwrap(),
        Value::from(10.0)
    );
    assert_eq!(
        session.handle.state().wait().unwrap(),
        DebuggerState::Stepping
    );

    session.handle.step_over();
    assert_eq!(session.expect_pause(), (PauseReason::Step, at(11, 1)));
    assert_eq!(
        session.handle.current_location().wait().unwrap(),
        Some(at(11, 1))
    );

    session.handle.run();
    assert!(matches!(session.remaining().last(), Some(DebugEvent::Done(_))));
    assert_eq!(session.engine.join().unwrap(), Value::from(20.0));
}

#[test]
fn step_into_and_out_of_a_function() {
    let source = indoc! {"
        function double(n) {
          let twice = n * 2;
          return twice;
        }
        let x = double(4);
        let y = x + 1;
    "};
    let session = Session::launch(source, |handle| {
        breakpoint(handle, 5, BreakpointOptions::default());
    });

    assert_eq!(session.expect_pause(), (PauseReason::BreakPoint, at(5, 1)));
    session.handle.step_into();
    assert_eq!(session.expect_pause(), (PauseReason::Step, at(2, 3)));
    assert_eq!(
        session.handle.evaluate("n").wait().unwrap(),
        Value::from(4.0)
    );

    session.handle.step_out();
    assert_eq!(session.expect_pause(), (PauseReason::Step, at(6, 1)));
    assert_eq!(
        session.handle.evaluate("x").wait().unwrap(),
        Value::from(8.0)
    );

    session.handle.run();
    session.engine.join().unwrap();
}

#[test]
fn step_over_survives_a_logpoint_in_the_callee() {
    let source = indoc! {"
        function f() {
          let a = 1;
          return a;
        }
        let y = 0;
        let x = f();
        let z = x + 1;
    "};
    let session = Session::launch(source, |handle| {
        breakpoint(handle, 6, BreakpointOptions::default());
        breakpoint(
            handle,
            2,
            BreakpointOptions {
                log_message: Some("in f".into()),
                ..BreakpointOptions::default()
            },
        );
    });

    assert_eq!(session.expect_pause(), (PauseReason::BreakPoint, at(6, 1)));
    session.handle.step_over();

    let mut logs = Vec::new();
    let stop = loop {
        match session.next() {
            DebugEvent::Log { message, .. } => logs.push(message),
            DebugEvent::Paused { reason, location } => break (reason, location),
            DebugEvent::Resumed => {}
            other => panic!("expected a step pause, got {other:?}"),
        }
    };
    assert_eq!(logs, ["in f"]);
    assert_eq!(stop, (PauseReason::Step, at(7, 1)));

    session.handle.run();
    session.engine.join().unwrap();
}

#[test]
fn step_over_survives_an_unmet_hit_count_in_the_callee() {
    let source = indoc! {"
        function f() {
          let a = 1;
          return a;
        }
        let x = f();
        let z = x + 1;
    "};
    let session = Session::launch(source, |handle| {
        breakpoint(handle, 5, BreakpointOptions::default());
        breakpoint(
            handle,
            2,
            BreakpointOptions {
                hit_condition: Some("5".into()),
                ..BreakpointOptions::default()
            },
        );
    });

    assert_eq!(session.expect_pause(), (PauseReason::BreakPoint, at(5, 1)));
    session.handle.step_over();
    assert_eq!(session.expect_pause(), (PauseReason::Step, at(6, 1)));

    session.handle.run();
    session.engine.join().unwrap();
}

#[test]
fn logpoints_log_every_hit_and_never_pause() {
    let source = indoc! {"
        let i = 0;
        while (i < 3) {
          i = i + 1;
        }
    "};
    let session = Session::launch(source, |handle| {
        breakpoint(
            handle,
            3,
            BreakpointOptions {
                log_message: Some("i = {i}".into()),
                ..BreakpointOptions::default()
            },
        );
    });

    let events = session.remaining();
    let logs: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            DebugEvent::Log { message, location } => {
                assert_eq!(location, &at(3, 3));
                Some(message.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(logs, ["i = 0", "i = 1", "i = 2"]);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, DebugEvent::Paused { .. }))
    );
    session.engine.join().unwrap();
}

#[test]
fn conditions_and_hit_counts_filter_pauses() {
    let source = indoc! {"
        let i = 0;
        while (i < 10) {
          i = i + 1;
        }
    "};
    let session = Session::launch(source, |handle| {
        breakpoint(
            handle,
            3,
            BreakpointOptions {
                condition: Some("i % 2 == 1".into()),
                hit_condition: Some("2".into()),
                ..BreakpointOptions::default()
            },
        );
    });

    // Odd values of `i` satisfy the condition; the hit condition skips the first.
    let mut seen = Vec::new();
    loop {
        match session.next() {
            DebugEvent::Paused { reason, .. } => {
                assert_eq!(reason, PauseReason::BreakPoint);
                let i = session.handle.evaluate("i").wait().unwrap();
                seen.push(i.to_number());
                session.handle.run();
            }
            DebugEvent::Done(_) => break,
            DebugEvent::Resumed => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(seen, [3.0, 5.0, 7.0, 9.0]);
}

#[test]
fn pause_before_start_stops_once_at_the_first_statement() {
    let session = Session::launch("let a = 1;\nlet b = 2;\n", |handle| {
        handle.pause();
    });

    assert_eq!(session.expect_pause(), (PauseReason::Pause, at(1, 1)));
    session.handle.run();

    let events = session.remaining();
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, DebugEvent::Paused { .. }))
    );
    session.engine.join().unwrap();
}

#[test]
fn pause_interrupts_a_running_loop() {
    let source = indoc! {"
        let i = 0;
        while (i >= 0) {
          i = i + 1;
        }
    "};
    let session = Session::launch(source, |_| {});

    session.handle.pause();
    let (reason, location) = session.expect_pause();
    assert_eq!(reason, PauseReason::Pause);
    if location.position.line > 1 {
        assert!(
            session
                .handle
                .evaluate("i >= 0")
                .wait()
                .unwrap()
                .to_boolean()
        );
    }

    session.handle.terminate();
    assert_eq!(session.engine.join(), Err(DebugError::Cancelled));
}

#[test]
fn terminate_while_paused_only_reports_cancellation() {
    let session = Session::launch("let a = 1;\ndebugger;\nlet b = 2;\n", |_| {});

    assert_eq!(
        session.expect_pause(),
        (PauseReason::DebuggerStatement, at(2, 1))
    );
    session.handle.terminate();

    let events = session.remaining();
    assert_eq!(events, [DebugEvent::Cancelled]);
    assert_eq!(session.engine.join(), Err(DebugError::Cancelled));
}

#[test]
fn second_attach_is_rejected() {
    let session = Session::launch("let a = 1;", |handle| {
        assert!(matches!(
            handle.attach(false),
            Err(DebugError::InvalidOperation(_))
        ));
    });
    assert!(session.handle.is_attached());
    session.engine.join().unwrap();
}

#[test]
fn unattached_scripts_ignore_debugger_statements() {
    let (sender, events) = mpsc::channel();
    let engine = EngineThread::spawn(
        DebuggerOptions::default(),
        sender,
        MAIN.into(),
        "let a = 1;\ndebugger;\na = a + 1;\na;".to_owned(),
        Context::default,
    )
    .unwrap();

    // Disconnecting without ever attaching is harmless.
    engine.handle().disconnect();
    assert!(!engine.handle().is_attached());

    assert_eq!(engine.join().unwrap(), Value::from(2.0));
    assert!(
        !events
            .try_iter()
            .any(|event| matches!(event, DebugEvent::Paused { .. }))
    );
}

#[test]
fn disconnect_releases_an_engine_waiting_for_a_client() {
    let (sender, events) = mpsc::channel();
    let engine = EngineThread::spawn(
        DebuggerOptions::default().with_wait_for_client(true),
        sender,
        MAIN.into(),
        "let a = 1;\ndebugger;\na + 1;".to_owned(),
        Context::default,
    )
    .unwrap();

    engine.handle().disconnect();
    assert!(matches!(
        events.recv_timeout(TIMEOUT),
        Ok(DebugEvent::Done(_))
    ));
    assert_eq!(engine.join().unwrap(), Value::from(2.0));
}

#[test]
fn run_releases_an_engine_waiting_for_a_client() {
    let (sender, events) = mpsc::channel();
    let engine = EngineThread::spawn(
        DebuggerOptions::default().with_wait_for_client(true),
        sender,
        MAIN.into(),
        "let a = 1;\na;".to_owned(),
        Context::default,
    )
    .unwrap();

    engine.handle().run();
    assert!(matches!(
        events.recv_timeout(TIMEOUT),
        Ok(DebugEvent::Done(_))
    ));
    assert_eq!(engine.join().unwrap(), Value::from(1.0));
}

#[test]
fn disconnect_while_paused_runs_to_completion() {
    let session = Session::launch("let a = 1;\ndebugger;\ndebugger;\na + 1;\n", |_| {});

    assert_eq!(
        session.expect_pause(),
        (PauseReason::DebuggerStatement, at(2, 1))
    );
    session.handle.disconnect();
    assert!(!session.handle.is_attached());

    let events = session.remaining();
    assert!(matches!(events.last(), Some(DebugEvent::Done(_))));
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, DebugEvent::Paused { .. }))
    );
    assert_eq!(session.engine.join().unwrap(), Value::from(2.0));
}

#[test]
fn uncaught_errors_are_reported() {
    let session = Session::launch("let a = 1;\nthrow 'boom';\n", |_| {});

    let events = session.remaining();
    assert_eq!(
        events,
        [DebugEvent::Error(TernError::Thrown(Value::from("boom")))]
    );
    assert!(matches!(
        session.engine.join(),
        Err(DebugError::Script(TernError::Thrown(_)))
    ));
}

#[test]
fn breakpoints_need_a_loaded_source() {
    let session = Session::launch("let a = 1;", |handle| {
        let err = handle
            .set_breakpoint("other.tern".into(), Position::new(1, 1), BreakpointOptions::default())
            .wait()
            .unwrap_err();
        assert!(matches!(err, DebugError::InvalidOperation(_)));

        let positions = handle
            .breakable_positions(MAIN.into(), Position::new(1, 1), Position::new(1, u32::MAX))
            .wait()
            .unwrap();
        assert_eq!(positions, [Position::new(1, 1)]);
    });
    session.engine.join().unwrap();
}
