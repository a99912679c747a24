use nix::errno::Errno;
use thiserror::Error;

/// Errors produced by the command execution engine.
///
/// Every variant is reported to the user and turned into a non-zero status;
/// none of them terminates the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// A token can't be handed to `execve` (it contains a NUL byte).
    #[error("invalid token {0:?}: contains a NUL byte")]
    InvalidToken(String),

    /// Neither the current directory nor any `PATH` entry holds the command.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// The left-hand side of a redirection isn't a file descriptor number.
    #[error("{token}: bad file descriptor number {fd:?}")]
    BadFd { token: String, fd: String },

    /// The redirection token has a shape the resolver doesn't accept.
    #[error("{0}: malformed redirection")]
    MalformedRedirect(String),

    /// A syscall failed while remapping a descriptor.
    #[error("{target}: {source}")]
    Redirect {
        target: String,
        #[source]
        source: Errno,
    },

    /// An OS call outside of redirection failed (fork, exec, wait, ...).
    #[error("{op}: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: Errno,
    },
}

impl ShellError {
    pub(crate) fn os(op: &'static str) -> impl FnOnce(Errno) -> Self {
        move |source| ShellError::Os { op, source }
    }
}
