//! DAP server implementation
//!
//! Reads requests from a byte stream, answers them through the
//! [`DebugSession`] and forwards the engine's [`DebugEvent`]s as protocol
//! events from a second thread. Both share one writer, so every message
//! carries a strictly increasing sequence number.

use super::messages::{
    ContinuedEventBody, ExitedEventBody, OutputEventBody, Source, StoppedEventBody,
    TerminatedEventBody,
};
use super::session::{DebugSession, THREAD_ID};
use super::{Event, ProtocolMessage, Request, Response, transport};
use crate::debugger::{DebugError, DebugEvent, DebugResult};
use crate::Location;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

/// DAP server that handles protocol communication
#[derive(Debug)]
pub struct DapServer<W> {
    session: DebugSession,
    outbox: Arc<Outbox<W>>,
    events: Option<mpsc::Receiver<DebugEvent>>,
}

impl<W: Write + Send + 'static> DapServer<W> {
    /// Creates a server that writes protocol messages to `writer`.
    pub fn new(writer: W) -> Self {
        let (events, receiver) = mpsc::channel();
        Self {
            session: DebugSession::new(events),
            outbox: Arc::new(Outbox::new(writer)),
            events: Some(receiver),
        }
    }

    /// Serves requests from `reader` until the client disconnects or the
    /// stream ends, then terminates the program if it is still running.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors of either stream. Malformed messages are logged and
    /// skipped.
    pub fn run<R: BufRead>(mut self, mut reader: R) -> io::Result<()> {
        let forwarder = match self.events.take() {
            Some(events) => {
                let outbox = Arc::clone(&self.outbox);
                Some(
                    thread::Builder::new()
                        .name("tern-dap-events".into())
                        .spawn(move || forward_events(&events, &outbox))?,
                )
            }
            None => None,
        };

        let result = self.serve(&mut reader);

        // Dropping the session stops the engine and closes the event channel.
        drop(self);
        if let Some(forwarder) = forwarder {
            if forwarder.join().is_err() {
                log::error!("DAP event forwarder panicked");
            }
        }
        log::info!("DAP session ended");
        result
    }

    fn serve<R: BufRead>(&mut self, reader: &mut R) -> io::Result<()> {
        while let Some(body) = transport::read_message(reader)? {
            log::trace!("<- {body}");
            match serde_json::from_str::<ProtocolMessage>(&body) {
                Ok(ProtocolMessage::Request(request)) => {
                    self.handle_request(&request)?;
                    if request.command == "disconnect" {
                        break;
                    }
                }
                Ok(other) => log::warn!("ignoring unexpected message (seq {})", other.seq()),
                Err(err) => log::warn!("ignoring malformed message: {err}"),
            }
        }
        Ok(())
    }

    /// Handles one request and writes its response.
    ///
    /// # Errors
    ///
    /// Fails only if the response cannot be written; request failures are
    /// reported to the client as unsuccessful responses.
    pub fn handle_request(&mut self, request: &Request) -> io::Result<()> {
        log::debug!("request `{}` (seq {})", request.command, request.seq);
        let session = &mut self.session;

        let result = match request.command.as_str() {
            "initialize" => arguments(request).and_then(|args| body(&session.handle_initialize(&args))),
            "launch" => arguments(request)
                .and_then(|args| session.handle_launch(args))
                .map(|()| None),
            "attach" => arguments(request)
                .and_then(|args| session.handle_attach(args))
                .map(|()| None),
            "configurationDone" => session.handle_configuration_done().map(|()| None),
            "setBreakpoints" => arguments(request)
                .and_then(|args| session.handle_set_breakpoints(args))
                .and_then(|response| body(&response)),
            "breakpointLocations" => arguments(request)
                .and_then(|args| session.handle_breakpoint_locations(&args))
                .and_then(|response| body(&response)),
            "threads" => body(&session.handle_threads()),
            "stackTrace" => arguments(request)
                .and_then(|args| session.handle_stack_trace(&args))
                .and_then(|response| body(&response)),
            "evaluate" => arguments(request)
                .and_then(|args| session.handle_evaluate(&args))
                .and_then(|response| body(&response)),
            "continue" => session.handle_continue().and_then(|response| body(&response)),
            "next" => session.handle_next().map(|()| None),
            "stepIn" => session.handle_step_in().map(|()| None),
            "stepOut" => session.handle_step_out().map(|()| None),
            "pause" => session.handle_pause().map(|()| None),
            "terminate" => session.handle_terminate().map(|()| None),
            "disconnect" => arguments(request)
                .and_then(|args| session.handle_disconnect(&args))
                .map(|()| None),
            command => Err(DebugError::invalid(format!("unsupported command `{command}`"))),
        };

        let succeeded = result.is_ok();
        self.outbox.respond(request, result)?;
        if succeeded && request.command == "initialize" {
            self.outbox.event("initialized", None)?;
        }
        Ok(())
    }
}

/// The writer shared by the request loop and the event forwarder.
#[derive(Debug)]
struct Outbox<W> {
    inner: Mutex<OutboxInner<W>>,
}

#[derive(Debug)]
struct OutboxInner<W> {
    writer: W,
    seq: i64,
}

impl<W: Write> Outbox<W> {
    const fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(OutboxInner { writer, seq: 1 }),
        }
    }

    fn send(&self, build: impl FnOnce(i64) -> ProtocolMessage) -> io::Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("DAP writer lock poisoned"))?;
        let message = build(inner.seq);
        inner.seq += 1;

        let json = serde_json::to_string(&message)?;
        log::trace!("-> {json}");
        transport::write_message(&mut inner.writer, &json)
    }

    fn respond(&self, request: &Request, result: DebugResult<Option<Value>>) -> io::Result<()> {
        let (success, message, body) = match result {
            Ok(body) => (true, None, body),
            Err(err) => {
                log::debug!("request `{}` failed: {err}", request.command);
                (false, Some(err.to_string()), None)
            }
        };
        self.send(|seq| {
            ProtocolMessage::Response(Response {
                seq,
                request_seq: request.seq,
                success,
                command: request.command.clone(),
                message,
                body,
            })
        })
    }

    fn event(&self, event: &str, body: Option<Value>) -> io::Result<()> {
        self.send(|seq| {
            ProtocolMessage::Event(Event {
                seq,
                event: event.to_owned(),
                body,
            })
        })
    }
}

fn forward_events<W: Write>(events: &mpsc::Receiver<DebugEvent>, outbox: &Outbox<W>) {
    for event in events {
        let messages = match protocol_events(event) {
            Ok(messages) => messages,
            Err(err) => {
                log::error!("cannot encode debug event: {err}");
                continue;
            }
        };
        for (name, body) in messages {
            if let Err(err) = outbox.event(name, body) {
                log::warn!("stopped forwarding debug events: {err}");
                return;
            }
        }
    }
}

/// Translates one engine event into the protocol events that report it.
fn protocol_events(event: DebugEvent) -> serde_json::Result<Vec<(&'static str, Option<Value>)>> {
    let terminated = || encode(&TerminatedEventBody::default());
    let exited = |exit_code| encode(&ExitedEventBody { exit_code });

    Ok(match event {
        DebugEvent::Paused { reason, location } => vec![(
            "stopped",
            encode(&StoppedEventBody {
                reason: reason.as_str().to_owned(),
                description: Some(format!("Paused on {reason} at {location}")),
                thread_id: Some(THREAD_ID),
                all_threads_stopped: true,
            })?,
        )],
        DebugEvent::Resumed => vec![(
            "continued",
            encode(&ContinuedEventBody {
                thread_id: THREAD_ID,
                all_threads_continued: true,
            })?,
        )],
        DebugEvent::Log { message, location } => {
            vec![("output", output("console", message, Some(&location))?)]
        }
        DebugEvent::Output(line) => vec![("output", output("stdout", line, None)?)],
        DebugEvent::Done(_) => vec![("exited", exited(0)?), ("terminated", terminated()?)],
        DebugEvent::Error(err) => vec![
            ("output", output("stderr", err.to_string(), None)?),
            ("exited", exited(1)?),
            ("terminated", terminated()?),
        ],
        DebugEvent::Cancelled => vec![("terminated", terminated()?)],
    })
}

fn output(
    category: &str,
    mut text: String,
    location: Option<&Location>,
) -> serde_json::Result<Option<Value>> {
    text.push('\n');
    encode(&OutputEventBody {
        category: Some(category.to_owned()),
        output: text,
        source: location.map(|location| Source {
            path: Some(location.source_id.as_str().to_owned()),
            ..Source::default()
        }),
        line: location.map(|location| i64::from(location.position.line)),
        column: location.map(|location| i64::from(location.position.column)),
    })
}

fn encode<T: Serialize>(body: &T) -> serde_json::Result<Option<Value>> {
    serde_json::to_value(body).map(Some)
}

fn arguments<T: DeserializeOwned>(request: &Request) -> DebugResult<T> {
    let arguments = request
        .arguments
        .clone()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(arguments).map_err(|e| {
        DebugError::invalid(format!("invalid `{}` arguments: {e}", request.command))
    })
}

fn body<T: Serialize>(response: &T) -> DebugResult<Option<Value>> {
    encode(response).map_err(|e| DebugError::invalid(format!("cannot encode response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::PauseReason;
    use crate::{Position, TernError, Value as ScriptValue};
    use indoc::indoc;
    use serde_json::json;
    use std::io::Cursor;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frame(message: &Value) -> Vec<u8> {
        let mut buffer = Vec::new();
        transport::write_message(&mut buffer, &message.to_string()).unwrap();
        buffer
    }

    fn request(seq: i64, command: &str, arguments: Option<Value>) -> Vec<u8> {
        let mut message = json!({ "seq": seq, "type": "request", "command": command });
        if let Some(arguments) = arguments {
            message["arguments"] = arguments;
        }
        frame(&message)
    }

    fn replies(buffer: &SharedBuffer) -> Vec<Value> {
        let bytes = buffer.0.lock().unwrap().clone();
        let mut reader = Cursor::new(bytes);
        let mut messages = Vec::new();
        while let Some(body) = transport::read_message(&mut reader).unwrap() {
            messages.push(serde_json::from_str(&body).unwrap());
        }
        messages
    }

    fn serve(input: Vec<u8>) -> Vec<Value> {
        let output = SharedBuffer::default();
        DapServer::new(output.clone()).run(Cursor::new(input)).unwrap();
        replies(&output)
    }

    #[test]
    fn initialize_is_answered_then_announced() {
        let replies = serve(request(1, "initialize", Some(json!({ "adapterID": "tern" }))));

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["type"], "response");
        assert_eq!(replies[0]["command"], "initialize");
        assert_eq!(replies[0]["request_seq"], 1);
        assert_eq!(replies[0]["success"], true);
        assert_eq!(replies[0]["body"]["supportsLogPoints"], true);
        assert_eq!(replies[1]["type"], "event");
        assert_eq!(replies[1]["event"], "initialized");
        assert_eq!(replies[0]["seq"], 1);
        assert_eq!(replies[1]["seq"], 2);
    }

    #[test]
    fn failures_and_unknown_commands_are_unsuccessful_responses() {
        let mut input = request(1, "continue", None);
        input.extend(request(2, "restartFrame", None));
        input.extend(request(3, "evaluate", Some(json!({ "frameId": 0 }))));
        input.extend(request(4, "threads", None));

        let replies = serve(input);
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0]["success"], false);
        assert!(
            replies[0]["message"]
                .as_str()
                .unwrap()
                .contains("no program is running")
        );
        assert!(
            replies[1]["message"]
                .as_str()
                .unwrap()
                .contains("unsupported command `restartFrame`")
        );
        assert!(
            replies[2]["message"]
                .as_str()
                .unwrap()
                .contains("invalid `evaluate` arguments")
        );
        assert_eq!(replies[3]["success"], true);
        assert_eq!(replies[3]["body"]["threads"][0]["id"], THREAD_ID);
    }

    #[test]
    fn disconnect_ends_the_session() {
        let mut input = request(1, "disconnect", None);
        input.extend(request(2, "threads", None));

        let replies = serve(input);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["command"], "disconnect");
        assert_eq!(replies[0]["success"], true);
    }

    #[test]
    fn malformed_messages_are_skipped() {
        let mut input = Vec::new();
        transport::write_message(&mut input, "{ not json").unwrap();
        input.extend(frame(&json!({ "seq": 9, "type": "event", "event": "stray" })));
        input.extend(request(1, "threads", None));

        let replies = serve(input);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["command"], "threads");
    }

    #[test]
    fn launch_runs_the_program_to_completion() {
        let path = std::env::temp_dir().join(format!("tern-dap-{}.tern", std::process::id()));
        std::fs::write(
            &path,
            indoc! {"
                let greeting = 'hi';
                print(greeting);
            "},
        )
        .unwrap();

        let output = SharedBuffer::default();
        let server_output = output.clone();
        let (to_server, from_client) = std::sync::mpsc::channel::<Vec<u8>>();
        let server = thread::spawn(move || {
            let input: Vec<u8> = from_client.iter().flatten().collect();
            DapServer::new(server_output).run(Cursor::new(input))
        });

        let program = path.to_string_lossy().into_owned();
        to_server
            .send(request(1, "launch", Some(json!({ "program": program }))))
            .unwrap();
        to_server.send(request(2, "configurationDone", None)).unwrap();
        drop(to_server);
        server.join().unwrap().unwrap();
        std::fs::remove_file(&path).ok();

        let replies = replies(&output);
        let launch = replies
            .iter()
            .find(|reply| reply["command"] == "launch")
            .unwrap();
        assert_eq!(launch["success"], true);
        let seqs: Vec<_> = replies.iter().map(|reply| reply["seq"].as_i64().unwrap()).collect();
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn pauses_become_stopped_events() {
        let location = Location::new("main.tern".into(), Position::new(3, 1));
        let events = protocol_events(DebugEvent::Paused {
            reason: PauseReason::BreakPoint,
            location,
        })
        .unwrap();

        assert_eq!(events.len(), 1);
        let (name, body) = &events[0];
        assert_eq!(*name, "stopped");
        let body = body.as_ref().unwrap();
        assert_eq!(body["reason"], "breakpoint");
        assert_eq!(body["threadId"], THREAD_ID);
        assert_eq!(body["allThreadsStopped"], true);
    }

    #[test]
    fn logpoints_go_to_the_console_category() {
        let location = Location::new("main.tern".into(), Position::new(7, 5));
        let events = protocol_events(DebugEvent::Log {
            message: "x = 3".into(),
            location,
        })
        .unwrap();

        let body = events[0].1.as_ref().unwrap();
        assert_eq!(events[0].0, "output");
        assert_eq!(body["category"], "console");
        assert_eq!(body["output"], "x = 3\n");
        assert_eq!(body["source"]["path"], "main.tern");
        assert_eq!(body["line"], 7);
    }

    #[test]
    fn run_outcomes_end_the_session() {
        let names = |event| {
            protocol_events(event)
                .unwrap()
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>()
        };

        assert_eq!(names(DebugEvent::Done(ScriptValue::Undefined)), ["exited", "terminated"]);
        assert_eq!(
            names(DebugEvent::Error(TernError::Reference("x".into()))),
            ["output", "exited", "terminated"]
        );
        assert_eq!(names(DebugEvent::Cancelled), ["terminated"]);
        assert_eq!(names(DebugEvent::Output("hi".into())), ["output"]);
        assert_eq!(names(DebugEvent::Resumed), ["continued"]);
    }
}
