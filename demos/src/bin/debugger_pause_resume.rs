//! Demonstrates pausing and resuming a script from another thread.
//!
//! The script runs on its own engine thread and stops at every `debugger;`
//! statement. The main thread plays the part of a debugger UI: it waits for
//! each pause, inspects a variable, and resumes the script.
#![allow(clippy::print_stdout)]

use std::error::Error;
use std::sync::mpsc;
use tern_engine::Context;
use tern_engine::debugger::{DebugEvent, DebuggerOptions, EngineThread};

const SCRIPT: &str = "\
let total = 0;
let i = 1;
while (i <= 3) {
  total = total + i;
  debugger;
  i = i + 1;
}
print('total', total);
total;
";

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::init_with_level(log::Level::Info)?;

    let (events, event_rx) = mpsc::channel();
    let engine = EngineThread::spawn(
        DebuggerOptions::default().with_wait_for_client(true),
        events,
        "pause_resume.tern".into(),
        SCRIPT.to_owned(),
        || {
            let mut context = Context::default();
            context.set_output(|line| println!("[script] {line}"));
            context
        },
    )?;
    let handle = engine.handle().clone();
    handle.attach(false)?;

    for event in event_rx {
        match event {
            DebugEvent::Paused { reason, location } => {
                let total = handle.evaluate("total").wait()?;
                println!("paused at {location} ({reason}), total = {total}");
                handle.run();
            }
            DebugEvent::Resumed => println!("resumed"),
            DebugEvent::Done(value) => {
                println!("script finished with {value}");
                break;
            }
            DebugEvent::Error(err) => {
                println!("script failed: {err}");
                break;
            }
            DebugEvent::Cancelled => break,
            DebugEvent::Log { .. } | DebugEvent::Output(_) => {}
        }
    }

    engine.join()?;
    Ok(())
}
