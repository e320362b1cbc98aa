//! A dedicated engine thread.
//!
//! The host is built inside the thread, so it never has to be `Send`; only the
//! factory closure crosses over. Everything else talks to it through the
//! [`DebuggerHandle`].

use super::event::EventSender;
use super::{
    DebugError, DebugHost, DebugResult, Debugger, DebuggerHandle, DebuggerOptions, Pending,
};
use crate::{SourceId, Value};
use futures_channel::oneshot;
use std::io;
use std::thread;

/// Stack size of the engine thread; the interpreter recurses once per call.
const ENGINE_STACK_SIZE: usize = 16 * 1024 * 1024;

/// A script running under the debugger on its own thread.
///
/// Dropping an `EngineThread` terminates the script and joins the thread.
#[derive(Debug)]
pub struct EngineThread {
    handle: DebuggerHandle,
    launch: Option<Pending<Value>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EngineThread {
    /// Spawns the engine thread and starts running `source` on the host built
    /// by `make_host`.
    ///
    /// Depending on `options` the script may first wait for a client to
    /// attach or for [`DebuggerHandle::notify_ui_ready`].
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn<H, F>(
        options: DebuggerOptions,
        events: EventSender,
        source_id: SourceId,
        source: String,
        make_host: F,
    ) -> io::Result<Self>
    where
        H: DebugHost,
        F: FnOnce() -> H + Send + 'static,
    {
        let (handle, mailbox) = DebuggerHandle::new();
        let (completion, receiver) = oneshot::channel();
        let launch = handle.pending(receiver);

        let thread = thread::Builder::new()
            .name("tern-engine".into())
            .stack_size(ENGINE_STACK_SIZE)
            .spawn(move || {
                let debugger = Debugger::new(mailbox, options, events);
                let mut host = make_host();
                log::debug!("engine thread started for {source_id}");
                let result = debugger.execute(&mut host, source_id, &source);
                drop(completion.send(result));
                log::debug!("engine thread finished");
            })?;

        Ok(Self {
            handle,
            launch: Some(launch),
            thread: Some(thread),
        })
    }

    /// The handle controlling this run.
    #[must_use]
    pub const fn handle(&self) -> &DebuggerHandle {
        &self.handle
    }

    /// Takes the future that completes with the script's outcome.
    ///
    /// Returns `None` if it was already taken.
    pub fn launch(&mut self) -> Option<Pending<Value>> {
        self.launch.take()
    }

    /// Waits for the script to finish.
    ///
    /// # Errors
    ///
    /// Returns the script's failure, [`DebugError::Cancelled`] if it was
    /// terminated, or [`DebugError::Disconnected`] if the outcome was already
    /// taken through [`EngineThread::launch`] or the thread panicked.
    pub fn join(mut self) -> DebugResult<Value> {
        let result = match self.launch.take() {
            Some(launch) => launch.wait(),
            None => Err(DebugError::Disconnected),
        };
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("engine thread panicked");
                return Err(DebugError::Disconnected);
            }
        }
        result
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.terminate();
            if thread.join().is_err() {
                log::error!("engine thread panicked");
            }
        }
    }
}
