//! Tern is a small embeddable scripting engine with a cross-thread debugger.
//!
//! The engine itself is deliberately simple: a tree-walking interpreter for a
//! JavaScript-like language. The interesting part is the [`debugger`] module,
//! which lets a client on any thread drive a script that runs on a dedicated
//! engine thread: breakpoints with conditions, hit counts and log messages,
//! stepping, pausing and evaluating expressions at a stop.
//!
//! # Crate Features
//!
//!  - **dap** - Enables the Debug Adapter Protocol server in
//!    [`debugger::dap`]. Enabled by default.
//!
//! # Example
//!
//! ```
//! use tern_engine::{Context, Value};
//!
//! let mut context = Context::default();
//! let result = context.eval("hello.tern".into(), "let a = 'tern'; a + '!';")?;
//! assert_eq!(result, Value::from("tern!"));
//! # Ok::<(), tern_engine::TernError>(())
//! ```
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod context;
pub mod debugger;
pub mod error;
pub mod parser;
pub mod script;
pub mod source;
pub mod value;

pub use context::Context;
pub use error::{TernError, TernResult};
pub use script::Script;
pub use source::{Location, Position, SourceId};
pub use value::Value;
