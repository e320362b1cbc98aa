//! Integration tests for the `tern` binary.
//!
//! The DAP tests drive `tern --dap` over stdio exactly as an editor would:
//! framed JSON requests in, framed responses and events out.
#![allow(clippy::unwrap_used, clippy::print_stderr)]

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(20);

/// A `tern --dap` child process.
struct DapClient {
    child: Child,
    stdin: ChildStdin,
    messages: mpsc::Receiver<Value>,
    seq: i64,
    /// Events received while waiting for something else.
    events: Vec<Value>,
}

impl DapClient {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_tern"))
            .arg("--dap")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start tern --dap");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();
        let (sender, messages) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            while let Some(message) = read_frame(&mut reader) {
                if sender.send(message).is_err() {
                    break;
                }
            }
        });

        Self {
            child,
            stdin,
            messages,
            seq: 0,
            events: Vec::new(),
        }
    }

    fn send(&mut self, command: &str, arguments: Value) -> i64 {
        self.seq += 1;
        let message = json!({
            "seq": self.seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        })
        .to_string();
        write!(self.stdin, "Content-Length: {}\r\n\r\n{message}", message.len()).unwrap();
        self.stdin.flush().unwrap();
        self.seq
    }

    fn next(&mut self) -> Value {
        let message = self
            .messages
            .recv_timeout(TIMEOUT)
            .expect("timed out waiting for the adapter");
        eprintln!("<- {message}");
        message
    }

    /// Sends a request and returns its response.
    fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments);
        loop {
            let message = self.next();
            if message["type"] == "response" && message["request_seq"] == seq {
                assert_eq!(message["command"], command);
                return message;
            }
            self.events.push(message);
        }
    }

    /// Returns the next event named `name`, including ones already received.
    fn event(&mut self, name: &str) -> Value {
        if let Some(index) = self.events.iter().position(|event| event["event"] == name) {
            return self.events.remove(index);
        }
        loop {
            let message = self.next();
            if message["type"] == "event" && message["event"] == name {
                return message;
            }
            self.events.push(message);
        }
    }

    fn events_named(&self, name: &str) -> Vec<&Value> {
        self.events
            .iter()
            .filter(|event| event["event"] == name)
            .collect()
    }

    fn initialize(&mut self) -> Value {
        let response = self.request("initialize", json!({ "adapterID": "tern" }));
        self.event("initialized");
        response
    }

    fn finish(mut self) {
        let response = self.request("disconnect", json!({}));
        assert_eq!(response["success"], true);
        drop(self.stdin);
        let status = self.child.wait().unwrap();
        assert!(status.success());
    }
}

fn read_frame<R: BufRead>(reader: &mut R) -> Option<Value> {
    let mut length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            length = value.trim().parse::<usize>().ok();
        }
    }
    let mut body = vec![0; length?];
    reader.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

fn script(name: &str, source: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("tern-cli-{}-{name}.tern", std::process::id()));
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn initialize_reports_capabilities() {
    let mut client = DapClient::start();
    let response = client.initialize();

    assert_eq!(response["success"], true);
    let capabilities = &response["body"];
    assert_eq!(capabilities["supportsConfigurationDoneRequest"], true);
    assert_eq!(capabilities["supportsConditionalBreakpoints"], true);
    assert_eq!(capabilities["supportsHitConditionalBreakpoints"], true);
    assert_eq!(capabilities["supportsLogPoints"], true);
    client.finish();
}

#[test]
fn unknown_commands_are_rejected() {
    let mut client = DapClient::start();
    client.initialize();

    let response = client.request("unknownCommand", json!({}));
    assert_eq!(response["success"], false);
    assert!(
        response["message"]
            .as_str()
            .unwrap()
            .contains("unknownCommand")
    );

    let threads = client.request("threads", json!({}));
    assert_eq!(threads["body"]["threads"][0]["id"], 1);
    client.finish();
}

#[test]
fn breakpoint_then_step_then_continue() {
    let path = script(
        "stepping",
        "let x = 1;\n\
         let y = 2;\n\
         x = x + y;\n\
         y = x * 2;\n\
         print(x, y);\n",
    );
    let program = path.to_string_lossy().into_owned();

    let mut client = DapClient::start();
    client.initialize();
    assert_eq!(
        client.request("launch", json!({ "program": program }))["success"],
        true
    );

    let breakpoints = client.request(
        "setBreakpoints",
        json!({ "source": { "path": program }, "breakpoints": [{ "line": 3 }] }),
    );
    let breakpoint = &breakpoints["body"]["breakpoints"][0];
    assert_eq!(breakpoint["verified"], true);
    assert_eq!(breakpoint["line"], 3);

    let locations = client.request(
        "breakpointLocations",
        json!({ "source": { "path": program }, "line": 2, "endLine": 4 }),
    );
    assert_eq!(
        locations["body"]["breakpoints"],
        json!([
            { "line": 2, "column": 1 },
            { "line": 3, "column": 1 },
            { "line": 4, "column": 1 },
        ])
    );

    client.request("configurationDone", json!({}));
    let stopped = client.event("stopped");
    assert_eq!(stopped["body"]["reason"], "breakpoint");

    let trace = client.request("stackTrace", json!({ "threadId": 1 }));
    assert_eq!(trace["body"]["stackFrames"][0]["line"], 3);

    let value = client.request("evaluate", json!({ "expression": "x + y" }));
    assert_eq!(value["body"]["result"], "3");
    assert_eq!(value["body"]["type"], "number");

    client.request("next", json!({ "threadId": 1 }));
    let stopped = client.event("stopped");
    assert_eq!(stopped["body"]["reason"], "step");
    let trace = client.request("stackTrace", json!({ "threadId": 1 }));
    assert_eq!(trace["body"]["stackFrames"][0]["line"], 4);

    client.request("continue", json!({ "threadId": 1 }));
    let output = client.event("output");
    assert_eq!(output["body"]["category"], "stdout");
    assert_eq!(output["body"]["output"], "3 6\n");
    assert_eq!(client.event("exited")["body"]["exitCode"], 0);
    client.event("terminated");

    client.finish();
    std::fs::remove_file(path).ok();
}

#[test]
fn logpoints_print_without_stopping() {
    let path = script(
        "logpoint",
        "let i = 0;\n\
         while (i < 3) {\n\
         \x20 i = i + 1;\n\
         }\n",
    );
    let program = path.to_string_lossy().into_owned();

    let mut client = DapClient::start();
    client.initialize();
    client.request("launch", json!({ "program": program }));
    let breakpoints = client.request(
        "setBreakpoints",
        json!({
            "source": { "path": program },
            "breakpoints": [{ "line": 3, "logMessage": "i is {i}" }],
        }),
    );
    assert_eq!(breakpoints["body"]["breakpoints"][0]["verified"], true);
    client.request("configurationDone", json!({}));

    client.event("terminated");
    let logs: Vec<_> = client
        .events_named("output")
        .into_iter()
        .filter(|event| event["body"]["category"] == "console")
        .map(|event| event["body"]["output"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(logs, ["i is 0\n", "i is 1\n", "i is 2\n"]);
    assert!(client.events_named("stopped").is_empty());

    client.finish();
    std::fs::remove_file(path).ok();
}

#[test]
fn uncaught_errors_end_the_session() {
    let path = script("error", "let a = 1;\nthrow 'boom';\n");
    let program = path.to_string_lossy().into_owned();

    let mut client = DapClient::start();
    client.initialize();
    client.request("launch", json!({ "program": program }));
    client.request("configurationDone", json!({}));

    let output = client.event("output");
    assert_eq!(output["body"]["category"], "stderr");
    assert!(output["body"]["output"].as_str().unwrap().contains("boom"));
    assert_eq!(client.event("exited")["body"]["exitCode"], 1);
    client.event("terminated");

    client.finish();
    std::fs::remove_file(path).ok();
}

#[test]
fn running_a_file_prints_its_output() {
    let path = script("run", "let a = 20;\nprint('answer', a * 2 + 2);\n");
    let output = Command::new(env!("CARGO_BIN_EXE_tern"))
        .arg(&path)
        .output()
        .unwrap();
    std::fs::remove_file(path).ok();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "answer 42\n");
}

#[test]
fn script_errors_fail_the_process() {
    let path = script("fail", "print(missing);\n");
    let output = Command::new(env!("CARGO_BIN_EXE_tern"))
        .arg(&path)
        .output()
        .unwrap();
    std::fs::remove_file(path).ok();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ReferenceError"));
}
