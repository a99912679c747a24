//! Trailing-token I/O redirection and its scoped undo.
//!
//! Only the last token of a command is inspected. A redirection is applied
//! by [`RedirectGuard::apply`], which saves a copy of every descriptor it
//! replaces; dropping the guard puts the originals back.

use crate::error::ShellError;
use crate::lexer::Argv;
use log::{debug, trace};
use nix::fcntl::{self, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2};
use std::io::Write;
use std::os::unix::io::RawFd;

/// Saved copies are placed at or above this descriptor number.
const SAVED_FD_BASE: RawFd = 10;

/// Kind of redirection, in the precedence the resolver checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `&>>`: stdout and stderr, append.
    AppendAll,
    /// `&>`: stdout and stderr, truncate.
    OutputAll,
    /// `>>`
    Append,
    /// `>`
    Output,
    /// `<`
    Input,
}

impl RedirectKind {
    /// Longer operators come first so `>` never matches inside `>>` or `&>>`.
    const OPERATORS: [(&'static str, RedirectKind); 5] = [
        ("&>>", RedirectKind::AppendAll),
        ("&>", RedirectKind::OutputAll),
        (">>", RedirectKind::Append),
        (">", RedirectKind::Output),
        ("<", RedirectKind::Input),
    ];

    fn flags(self) -> OFlag {
        let base = match self {
            RedirectKind::Input => OFlag::O_RDONLY,
            RedirectKind::Output | RedirectKind::OutputAll => {
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC
            }
            RedirectKind::Append | RedirectKind::AppendAll => {
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND
            }
        };
        base | OFlag::O_CLOEXEC
    }

    fn default_fd(self) -> RawFd {
        match self {
            RedirectKind::Input => 0,
            _ => 1,
        }
    }

    fn is_all(self) -> bool {
        matches!(self, RedirectKind::AppendAll | RedirectKind::OutputAll)
    }
}

/// A parsed redirection: which descriptor(s) go where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSpec {
    pub kind: RedirectKind,
    /// Descriptor named on the left-hand side; unused by `&>` and `&>>`.
    pub fd: RawFd,
    pub target: String,
}

impl RedirectSpec {
    /// Descriptors that get remapped.
    pub fn fds(&self) -> Vec<RawFd> {
        if self.kind.is_all() {
            vec![1, 2]
        } else {
            vec![self.fd]
        }
    }
}

/// Parse a token as a redirection.
///
/// Returns `Ok(None)` when the token holds no operator, so it stays a plain argument.
pub fn parse_redirect(token: &str) -> Result<Option<RedirectSpec>, ShellError> {
    let Some((pos, op, kind)) = RedirectKind::OPERATORS
        .iter()
        .find_map(|&(op, kind)| token.find(op).map(|pos| (pos, op, kind)))
    else {
        return Ok(None);
    };

    let lhs = &token[..pos];
    let target = token[pos + op.len()..].to_string();

    let fd = if kind.is_all() {
        if !lhs.is_empty() {
            return Err(ShellError::MalformedRedirect(token.to_string()));
        }
        1
    } else if lhs.is_empty() {
        kind.default_fd()
    } else {
        match lhs.parse::<RawFd>() {
            Ok(fd) if lhs.bytes().all(|b| b.is_ascii_digit()) => fd,
            _ => {
                return Err(ShellError::BadFd {
                    token: token.to_string(),
                    fd: lhs.to_string(),
                });
            }
        }
    };

    Ok(Some(RedirectSpec { kind, fd, target }))
}

/// Look at the last token of `argv`; if it is a redirection, remove it and return it.
pub fn take_redirect(argv: &mut Argv) -> Result<Option<RedirectSpec>, ShellError> {
    let Some(last) = argv.last() else {
        return Ok(None);
    };
    let spec = parse_redirect(last)?;
    if spec.is_some() {
        argv.pop();
    }
    Ok(spec)
}

#[derive(Debug)]
struct SavedFd {
    fd: RawFd,
    copy: RawFd,
}

/// Undo record for an applied redirection.
///
/// Holds at most two saved descriptors. The originals are restored when the
/// guard is dropped, on every path out of the command.
#[derive(Debug, Default)]
pub struct RedirectGuard {
    saved: Vec<SavedFd>,
}

impl RedirectGuard {
    /// Guard for a command without redirection.
    pub fn none() -> Self {
        Self::default()
    }

    /// Remap the descriptors named by `spec`.
    ///
    /// On failure every descriptor already remapped is put back before the
    /// error is returned.
    pub fn apply(spec: &RedirectSpec) -> Result<Self, ShellError> {
        flush_std_streams();
        let fds = spec.fds();
        let mut guard = Self {
            saved: Vec::with_capacity(fds.len()),
        };
        let redirect_err = |source| ShellError::Redirect {
            target: spec.target.clone(),
            source,
        };

        for &fd in &fds {
            let copy = fcntl::fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(SAVED_FD_BASE))
                .map_err(|source| ShellError::Redirect {
                    target: fd.to_string(),
                    source,
                })?;
            trace!("redirect: saved fd {fd} as {copy}");
            guard.saved.push(SavedFd { fd, copy });
        }

        let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP;
        let file = fcntl::open(spec.target.as_str(), spec.kind.flags(), mode).map_err(redirect_err)?;

        let remapped = fds
            .iter()
            .try_for_each(|&fd| dup2(file, fd).map(drop))
            .map_err(redirect_err);
        if !fds.contains(&file) {
            let _ = close(file);
        }
        remapped?;

        debug!("redirect: {:?} {:?} -> {}", spec.kind, fds, spec.target);
        Ok(guard)
    }

    /// Put every saved descriptor back and forget about it.
    pub fn restore(&mut self) {
        if self.saved.is_empty() {
            return;
        }
        flush_std_streams();
        while let Some(SavedFd { fd, copy }) = self.saved.pop() {
            if let Err(e) = dup2(copy, fd) {
                eprintln!("wsh: restore fd {fd}: {e}");
            }
            let _ = close(copy);
            trace!("redirect: restored fd {fd}");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.saved.is_empty()
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

fn flush_std_streams() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;
    use std::fs::{self, File};
    use std::mem::ManuallyDrop;
    use std::os::unix::io::{AsRawFd, FromRawFd};

    fn spec(kind: RedirectKind, fd: RawFd, target: &str) -> Option<RedirectSpec> {
        Some(RedirectSpec {
            kind,
            fd,
            target: target.to_string(),
        })
    }

    #[test]
    fn plain_tokens_are_not_redirections() {
        assert_eq!(parse_redirect("out.txt").unwrap(), None);
        assert_eq!(parse_redirect("-la").unwrap(), None);
    }

    #[test]
    fn defaults_for_bare_operators() {
        use RedirectKind::*;
        assert_eq!(parse_redirect(">out").unwrap(), spec(Output, 1, "out"));
        assert_eq!(parse_redirect(">>out").unwrap(), spec(Append, 1, "out"));
        assert_eq!(parse_redirect("<in").unwrap(), spec(Input, 0, "in"));
    }

    #[test]
    fn explicit_descriptor_numbers() {
        use RedirectKind::*;
        assert_eq!(parse_redirect("2>err.log").unwrap(), spec(Output, 2, "err.log"));
        assert_eq!(parse_redirect("2>>err.log").unwrap(), spec(Append, 2, "err.log"));
        assert_eq!(parse_redirect("3<data").unwrap(), spec(Input, 3, "data"));
    }

    #[test]
    fn longest_operator_wins() {
        let all = parse_redirect("&>>log").unwrap().unwrap();
        assert_eq!(all.kind, RedirectKind::AppendAll);
        assert_eq!(all.target, "log");
        assert_eq!(all.fds(), vec![1, 2]);

        let all = parse_redirect("&>log").unwrap().unwrap();
        assert_eq!(all.kind, RedirectKind::OutputAll);
        assert_eq!(all.fds(), vec![1, 2]);
    }

    #[test]
    fn non_numeric_descriptor_is_rejected() {
        assert!(matches!(
            parse_redirect("abc>out"),
            Err(ShellError::BadFd { .. })
        ));
        assert!(matches!(
            parse_redirect("-1>out"),
            Err(ShellError::BadFd { .. })
        ));
        assert!(matches!(
            parse_redirect("x&>out"),
            Err(ShellError::MalformedRedirect(_))
        ));
    }

    #[test]
    fn take_redirect_only_looks_at_last_token() {
        let mut argv = split_into_tokens("echo >a b");
        assert_eq!(take_redirect(&mut argv).unwrap(), None);
        assert_eq!(argv.len(), 3);

        let mut argv = split_into_tokens("echo hi >out.txt");
        let found = take_redirect(&mut argv).unwrap();
        assert_eq!(found, spec(RedirectKind::Output, 1, "out.txt"));
        assert_eq!(argv.to_string(), "echo hi");
        assert_eq!(argv.len(), 2);
    }

    fn write_fd(fd: RawFd, data: &[u8]) {
        let mut f = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
        f.write_all(data).unwrap();
    }

    #[test]
    fn guard_remaps_and_restores_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("original.txt");
        let redirected = dir.path().join("redirected.txt");
        let file = File::create(&original).unwrap();
        let fd = file.as_raw_fd();

        let token = format!("{fd}>{}", redirected.display());
        let spec = parse_redirect(&token).unwrap().unwrap();
        {
            let guard = RedirectGuard::apply(&spec).unwrap();
            assert!(guard.is_active());
            write_fd(fd, b"inside\n");
        }
        write_fd(fd, b"after\n");

        assert_eq!(fs::read_to_string(&redirected).unwrap(), "inside\n");
        assert_eq!(fs::read_to_string(&original).unwrap(), "after\n");
    }

    #[test]
    fn append_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let holder = File::create(dir.path().join("holder")).unwrap();
        let fd = holder.as_raw_fd();
        let log = dir.path().join("log.txt");
        fs::write(&log, "first\n").unwrap();

        let spec = parse_redirect(&format!("{fd}>>{}", log.display()))
            .unwrap()
            .unwrap();
        {
            let _guard = RedirectGuard::apply(&spec).unwrap();
            write_fd(fd, b"second\n");
        }
        assert_eq!(fs::read_to_string(&log).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn unopened_descriptor_fails_without_creating_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never");
        let spec = parse_redirect(&format!("987>{}", target.display()))
            .unwrap()
            .unwrap();
        assert!(matches!(
            RedirectGuard::apply(&spec),
            Err(ShellError::Redirect { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn unopenable_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let holder = File::create(dir.path().join("holder")).unwrap();
        let fd = holder.as_raw_fd();
        let missing = dir.path().join("no/such/dir/file");

        let spec = parse_redirect(&format!("{fd}<{}", missing.display()))
            .unwrap()
            .unwrap();
        assert!(RedirectGuard::apply(&spec).is_err());

        // the descriptor still points at the original file
        write_fd(fd, b"ok\n");
        assert_eq!(fs::read_to_string(dir.path().join("holder")).unwrap(), "ok\n");
    }
}
