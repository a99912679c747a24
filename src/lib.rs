//! `wsh`: a small interactive shell.
//!
//! The crate contains the command execution engine: a space-delimited
//! tokenizer, `$NAME` substitution, a single trailing I/O redirection per
//! line, `PATH` resolution, fork/exec of external programs and a fixed set of
//! built-in commands (`exit`, `ls`, `cd`, `export`, `local`, `vars`,
//! `history`) operating on the shell variable and history stores.
//!
//! The main entry point is [`Interpreter`], which owns all shell state and
//! executes one line at a time. Lines come from a [`LineSource`]; the `wsh`
//! binary wires up an interactive or a script source.

pub mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod external;
pub mod history;
pub mod io_adapters;
mod interpreter;
pub mod lexer;
pub mod redirect;
pub mod vars;

/// Just a convenient re-export of the shell context.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

pub use env::Environment;
pub use error::ShellError;
pub use io_adapters::{InteractiveSource, LineSource, ScriptSource};
