//! A small "run this, with this environment, in this directory" engine.
//!
//! Arguments are consumed left to right by a dispatch loop that threads an
//! environment mapping, a working directory and an option-parsing flag through
//! nested `docmd` invocations. Each command token is looked up in an alias table
//! (stored in the environment itself) and either runs one of the built-in actions
//! in-process or is launched as an external program.
//!
//! The main entry point is [`Interpreter`]. The public modules expose the pieces
//! it is built from: [`resource`] turns identifiers such as `data:,hi` or
//! `x-jcr36-env:HOME` into readable bytes, [`external`] launches child processes
//! and pumps their standard streams, and [`alias`] holds the canonical action
//! identifiers.

pub mod alias;
mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod external;
mod interpreter;
pub mod io_adapters;
pub mod properties;
pub mod resource;

/// Just a convenient re-export of the dispatch entry points.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::{HELP_TEXT, Interpreter, VERSION, do_cmd, do_cmd_main};

pub use command::{ExitCode, Streams};
pub use env::{EnvMap, Environment};
pub use error::Error;
