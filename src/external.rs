use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use crate::lexer::Argv;
use log::{debug, trace};
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{AccessFlags, ForkResult, Pid, access, execve, fork};
use std::ffi::CString;
use std::io::Write;

/// Command that is not a builtin, resolved to an executable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    path: String,
    argv: Argv,
}

impl ExternalCommand {
    /// Resolve `argv[0]` against the current directory and `PATH`.
    pub fn resolve(env: &Environment, argv: Argv) -> Result<Self, ShellError> {
        let name = argv.name().unwrap_or_default();
        let path = find_command_path(env.get_var("PATH"), name)
            .ok_or_else(|| ShellError::CommandNotFound(name.to_string()))?;
        Ok(Self { path, argv })
    }

    /// Path that will be passed to `execve`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn argv(&self) -> &Argv {
        &self.argv
    }

    /// Fork, exec the program in the child and wait for it in the parent.
    ///
    /// `Ok` means the child was forked and reaped; only then is the command
    /// worth remembering in history.
    pub fn spawn_and_wait(&self, env: &Environment) -> Result<ExitCode, ShellError> {
        let path = CString::new(self.path.as_str())
            .map_err(|_| ShellError::InvalidToken(self.path.clone()))?;
        let args = self.argv.to_exec_args()?;
        let envp = env
            .to_envp()
            .into_iter()
            .filter_map(|kv| CString::new(kv).ok())
            .collect::<Vec<_>>();

        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        // SAFETY: the shell is single-threaded and the child only calls execve
        // and, on failure, writes a message and exits.
        match unsafe { fork() }.map_err(ShellError::os("fork"))? {
            ForkResult::Child => {
                let err = match execve(&path, &args, &envp) {
                    Err(e) => e,
                    Ok(never) => match never {},
                };
                eprintln!("wsh: {}: {}", self.path, err);
                std::process::exit(if err == Errno::ENOENT { 127 } else { 126 })
            }
            ForkResult::Parent { child } => {
                debug!("exec: `{}` as pid {child}", self.argv);
                wait_for(child)
            }
        }
    }
}

fn wait_for(child: Pid) -> Result<ExitCode, ShellError> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                trace!("wait: pid {child} exited with {code}");
                return Ok(code);
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                trace!("wait: pid {child} killed by {signal:?}");
                return Ok(128 + signal as i32);
            }
            Ok(other) => trace!("wait: pid {child} reported {other:?}"),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(ShellError::Os { op: "wait", source: e }),
        }
    }
}

/// Resolve a command path the way the shell does.
///
/// Behavior:
/// - `name` itself, relative to the current directory (covers `./foo`,
///   `bin/foo` and absolute paths), if it is executable.
/// - Otherwise each directory in `search_paths` (colon-separated) in order,
///   returning the first `<dir>/<name>` that is executable.
/// - Empty name or no match: `None`.
///
/// The returned string is used verbatim, without canonicalization.
pub fn find_command_path(search_paths: Option<&str>, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if is_executable(name) {
        return Some(name.to_string());
    }
    search_paths?
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| format!("{dir}/{name}"))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &str) -> bool {
    let found = access(path, AccessFlags::X_OK).is_ok();
    trace!("path: probe {path} -> {found}");
    found
}
