//! The message channel between client threads and the engine thread.
//!
//! Client calls never touch engine state. They box up what they want done as
//! a [`Message`] and send it; the engine thread runs it the next time a hook
//! drains the queue. Requests that produce a value hand back a [`Pending`].

use super::controller::Shared;
use super::{CancellationToken, DebugError, DebugFrame, DebugResult, Debugger};
use futures_channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, mpsc};
use std::task::{Context, Poll};

/// What a queued closure sees when the engine thread runs it.
pub(crate) struct EngineScope<'a> {
    pub(crate) debugger: &'a Debugger,
    /// The engine, when the queue is drained from inside a statement hook.
    pub(crate) frame: Option<&'a mut dyn DebugFrame>,
}

impl EngineScope<'_> {
    /// The frame, or an error naming `operation` when there is none.
    pub(crate) fn frame(&mut self, operation: &str) -> DebugResult<&mut dyn DebugFrame> {
        match &mut self.frame {
            Some(frame) => Ok(&mut **frame),
            None => Err(DebugError::invalid(format!(
                "{operation} requires the script to be stopped at a statement"
            ))),
        }
    }
}

pub(crate) type ActionFn = Box<dyn FnOnce(&mut EngineScope<'_>) -> DebugResult<()> + Send>;
pub(crate) type FunctionFn = Box<dyn FnOnce(&mut EngineScope<'_>) + Send>;

/// A control message.
pub(crate) enum Message {
    /// Resume whoever is parked in [`Pump::wait`].
    Continue,
    /// Run a closure and report success or failure.
    Action {
        run: ActionFn,
        completion: oneshot::Sender<DebugResult<()>>,
    },
    /// Run a closure that delivers its own typed result.
    Function(FunctionFn),
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Continue => "Continue",
            Self::Action { .. } => "Action",
            Self::Function(_) => "Function",
        })
    }
}

/// The eventual result of a request sent to the engine thread.
///
/// Poll it from an async runtime or block on it with [`Pending::wait`]. If the
/// engine thread goes away before handling the request, the result is
/// [`DebugError::Disconnected`].
#[derive(Debug)]
pub struct Pending<T> {
    receiver: oneshot::Receiver<DebugResult<T>>,
    shared: Arc<Shared>,
}

impl<T> Pending<T> {
    pub(crate) const fn new(receiver: oneshot::Receiver<DebugResult<T>>, shared: Arc<Shared>) -> Self {
        Self { receiver, shared }
    }

    /// Blocks the calling thread until the engine thread has handled the request.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::WrongThread`] when called on the engine thread,
    /// where waiting would deadlock; otherwise whatever the request produced.
    pub fn wait(self) -> DebugResult<T> {
        if self.shared.is_engine_thread() {
            return Err(DebugError::WrongThread);
        }
        futures_lite::future::block_on(self)
    }

    /// Returns the result if it is already available.
    pub fn try_take(&mut self) -> Option<DebugResult<T>> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(DebugError::Disconnected)),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = DebugResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(DebugError::Disconnected)))
    }
}

/// The engine thread's end of the channel.
#[derive(Debug)]
pub(crate) struct Pump {
    receiver: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl Pump {
    pub(crate) const fn new(receiver: mpsc::Receiver<Message>, cancel: CancellationToken) -> Self {
        Self { receiver, cancel }
    }

    /// Runs every queued message without blocking.
    ///
    /// A `Continue` found here has nobody to wake and is dropped.
    pub(crate) fn drain(&self, scope: &mut EngineScope<'_>) {
        while let Ok(message) = self.receiver.try_recv() {
            if !matches!(message, Message::Continue) {
                Self::process(message, scope);
            }
        }
    }

    /// Parks the engine thread, running messages as they arrive, until a
    /// `Continue` is received.
    ///
    /// # Errors
    ///
    /// Returns [`DebugError::Cancelled`] once the session is cancelled or every
    /// handle is gone.
    pub(crate) fn wait(&self, scope: &mut EngineScope<'_>) -> DebugResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(DebugError::Cancelled);
            }
            match self.receiver.recv() {
                Ok(Message::Continue) => {
                    return if self.cancel.is_cancelled() {
                        Err(DebugError::Cancelled)
                    } else {
                        Ok(())
                    };
                }
                Ok(message) => Self::process(message, scope),
                Err(mpsc::RecvError) => {
                    log::warn!("every debugger handle dropped while the engine was parked");
                    return Err(DebugError::Cancelled);
                }
            }
        }
    }

    fn process(message: Message, scope: &mut EngineScope<'_>) {
        log::trace!("pump: {message:?}");
        match message {
            Message::Continue => {}
            Message::Action { run, completion } => {
                let result = run(scope);
                if let Err(err) = &result {
                    log::debug!("debugger action failed: {err}");
                }
                // The caller may have stopped listening; that is fine.
                drop(completion.send(result));
            }
            Message::Function(run) => run(scope),
        }
    }
}
