use crate::builtin::BuiltinKind;
use crate::command::{Command, EXIT_FAILURE, EXIT_NOT_FOUND, EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::ExternalCommand;
use crate::history::History;
use crate::io_adapters::LineSource;
use crate::lexer::{self, Argv};
use crate::redirect::{self, RedirectGuard};
use crate::vars::ShellVars;
use anyhow::bail;
use log::{debug, warn};
use std::io::Write;
use std::time::Duration;

/// Upper bound of the pause between retries of a failing input source.
const MAX_READ_BACKOFF: Duration = Duration::from_millis(500);

/// The shell context: every piece of process-wide state the commands act on.
///
/// One line is processed at a time:
/// tokenize → substitute → apply redirection → built-in or external → restore
/// redirection → record history (external commands only).
///
/// Example
/// ```
/// use wsh::{Environment, Interpreter};
/// let mut sh = Interpreter::new(Environment::with_vars([("PATH", "/bin")]), 5);
/// let mut out = Vec::new();
/// sh.execute_line_with_output("local greeting=hi", &mut out);
/// sh.execute_line_with_output("vars", &mut out);
/// assert_eq!(String::from_utf8(out).unwrap(), "greeting=hi\n");
/// ```
pub struct Interpreter {
    pub(crate) env: Environment,
    pub(crate) vars: ShellVars,
    pub(crate) history: History,
    last_status: ExitCode,
    should_exit: bool,
    input_error: bool,
}

impl Interpreter {
    /// Create a shell over `env` keeping at most `history_limit` commands.
    pub fn new(env: Environment, history_limit: usize) -> Self {
        Self {
            env,
            vars: ShellVars::new(),
            history: History::new(history_limit),
            last_status: EXIT_SUCCESS,
            should_exit: false,
            input_error: false,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn vars(&self) -> &ShellVars {
        &self.vars
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Status of the most recently completed command, 0 before any.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Set once `exit` ran or the input ended.
    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    /// Whether the line source ever failed to deliver a line.
    pub fn input_error(&self) -> bool {
        self.input_error
    }

    pub(crate) fn request_exit(&mut self) {
        self.should_exit = true;
    }

    /// Read and execute lines until `exit` or end of input.
    ///
    /// Returns the status the shell process should exit with.
    pub fn repl(&mut self, source: &mut dyn LineSource) -> ExitCode {
        let mut failures: u32 = 0;
        while !self.should_exit {
            match source.read_line() {
                Ok(Some(line)) => {
                    failures = 0;
                    self.execute_line(&line);
                }
                Ok(None) => {
                    debug!("input: end of input");
                    self.request_exit();
                }
                Err(err) => {
                    self.input_error = true;
                    failures += 1;
                    warn!("input: read failed ({failures} in a row): {err:#}");
                    eprintln!("wsh: error reading input: {err:#}");
                    let pause = Duration::from_millis(10)
                        .saturating_mul(failures.min(64))
                        .min(MAX_READ_BACKOFF);
                    std::thread::sleep(pause);
                }
            }
        }
        self.last_status
    }

    /// Execute one input line with built-in output going to the process stdout.
    pub fn execute_line(&mut self, line: &str) -> ExitCode {
        self.execute_line_with_output(line, &mut std::io::stdout())
    }

    /// Execute one input line, writing built-in output to `stdout`.
    ///
    /// External programs always write to the process descriptors. Comment and
    /// blank lines leave the last status untouched.
    pub fn execute_line_with_output(&mut self, line: &str, stdout: &mut dyn Write) -> ExitCode {
        let mut argv = lexer::split_into_tokens(line);
        if argv.is_empty() || argv.is_comment() {
            return self.last_status;
        }
        lexer::substitute(&mut argv, &self.env, &self.vars);

        let status = match self.run_redirected(argv, stdout) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("wsh: {err}");
                match err {
                    ShellError::CommandNotFound(_) => EXIT_NOT_FOUND,
                    _ => EXIT_FAILURE,
                }
            }
        };
        self.last_status = status;
        status
    }

    fn run_redirected(&mut self, mut argv: Argv, stdout: &mut dyn Write) -> Result<ExitCode, ShellError> {
        let guard = match redirect::take_redirect(&mut argv)? {
            Some(spec) => RedirectGuard::apply(&spec)?,
            None => RedirectGuard::none(),
        };
        let result = self.dispatch(argv, stdout);
        let _ = stdout.flush();
        drop(guard);
        result
    }

    fn dispatch(&mut self, argv: Argv, stdout: &mut dyn Write) -> Result<ExitCode, ShellError> {
        let Some(name) = argv.name() else {
            return Ok(self.last_status);
        };
        match Command::classify(name) {
            Command::Builtin(kind) => Ok(self.run_builtin(kind, &argv, stdout)),
            Command::External => self.run_external(argv),
        }
    }

    fn run_builtin(&mut self, kind: BuiltinKind, argv: &Argv, stdout: &mut dyn Write) -> ExitCode {
        debug!("dispatch: builtin `{argv}`");
        match kind.run(argv.args(), stdout, self) {
            Ok(code) => code,
            Err(err) => {
                let _ = stdout.flush();
                eprintln!("wsh: {}: {err:#}", kind.name());
                EXIT_FAILURE
            }
        }
    }

    fn run_external(&mut self, argv: Argv) -> Result<ExitCode, ShellError> {
        let cmd = ExternalCommand::resolve(&self.env, argv)?;
        debug!("dispatch: external `{}` -> {}", cmd.argv(), cmd.path());
        let code = cmd.spawn_and_wait(&self.env)?;
        self.history.push(cmd.argv().clone());
        Ok(code)
    }

    /// Run a command taken from history. Built-ins are never replayed, which
    /// keeps `history N` from re-entering itself.
    pub(crate) fn replay(&mut self, argv: Argv) -> anyhow::Result<ExitCode> {
        let name = argv.name().unwrap_or_default();
        if let Command::Builtin(_) = Command::classify(name) {
            bail!("refusing to replay built-in `{argv}`");
        }
        match self.run_external(argv) {
            Err(err @ ShellError::CommandNotFound(_)) => {
                eprintln!("wsh: {err}");
                Ok(EXIT_NOT_FOUND)
            }
            res => Ok(res?),
        }
    }
}

impl Default for Interpreter {
    /// A shell over the current process environment with the default history size.
    fn default() -> Self {
        Self::new(Environment::new(), crate::history::DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::ScriptSource;
    use std::io::Cursor;

    fn shell() -> Interpreter {
        Interpreter::new(Environment::with_vars([("PATH", "/bin:/usr/bin")]), 5)
    }

    fn exec(sh: &mut Interpreter, line: &str) -> (ExitCode, String) {
        let mut out = Vec::new();
        let code = sh.execute_line_with_output(line, &mut out);
        (code, String::from_utf8(out).unwrap())
    }

    fn history_lines(sh: &Interpreter) -> Vec<String> {
        sh.history().iter().map(|(_, argv)| argv.to_string()).collect()
    }

    #[test]
    fn blank_and_comment_lines_do_nothing() {
        let mut sh = shell();
        assert_eq!(exec(&mut sh, ""), (0, String::new()));
        assert_eq!(exec(&mut sh, "    "), (0, String::new()));
        assert_eq!(exec(&mut sh, "#local x=1"), (0, String::new()));
        assert!(sh.vars().is_empty());
        assert!(sh.history().is_empty());
    }

    #[test]
    fn export_is_visible_to_substitution() {
        let mut sh = shell();
        exec(&mut sh, "export FOO=1");
        exec(&mut sh, "local y=$FOO");
        assert_eq!(exec(&mut sh, "vars"), (0, "y=1\n".to_string()));
    }

    #[test]
    fn substituted_command_name() {
        let mut sh = shell();
        exec(&mut sh, "local cmd=vars");
        exec(&mut sh, "local a=b");
        let (code, out) = exec(&mut sh, "$cmd");
        assert_eq!(code, 0);
        assert_eq!(out, "cmd=vars\na=b\n");
    }

    #[test]
    fn unknown_command_reports_not_found() {
        let mut sh = shell();
        let (code, _) = exec(&mut sh, "definitely-not-a-command-wsh");
        assert_eq!(code, EXIT_NOT_FOUND);
        assert_eq!(sh.last_status(), EXIT_NOT_FOUND);
        assert!(sh.history().is_empty());
    }

    #[test]
    fn builtin_errors_set_failure_status() {
        let mut sh = shell();
        assert_eq!(exec(&mut sh, "local novalue").0, EXIT_FAILURE);
        assert_eq!(exec(&mut sh, "vars").0, EXIT_SUCCESS);
    }

    #[test]
    fn external_commands_are_recorded() {
        let mut sh = shell();
        assert_eq!(exec(&mut sh, "true one").0, 0);
        assert_eq!(exec(&mut sh, "false two").0, 1);
        exec(&mut sh, "vars");
        exec(&mut sh, "false two");
        assert_eq!(history_lines(&sh), vec!["false two", "true one"]);
    }

    #[test]
    fn history_keeps_limit_and_drops_oldest() {
        let mut sh = shell();
        for i in 1..=6 {
            exec(&mut sh, &format!("true {i}"));
        }
        assert_eq!(sh.history().len(), 5);
        let (_, out) = exec(&mut sh, "history");
        assert_eq!(out, "1) true 6\n2) true 5\n3) true 4\n4) true 3\n5) true 2\n");
    }

    #[test]
    fn history_replay_runs_entry() {
        let mut sh = shell();
        exec(&mut sh, "false a");
        exec(&mut sh, "true b");
        assert_eq!(exec(&mut sh, "history 2").0, 1);
        assert_eq!(history_lines(&sh), vec!["false a", "true b", "false a"]);

        // replaying the newest entry doesn't grow the store
        assert_eq!(exec(&mut sh, "history 1").0, 1);
        assert_eq!(sh.history().len(), 3);
    }

    #[test]
    fn replay_refuses_builtins() {
        let mut sh = shell();
        assert!(sh.replay(lexer::split_into_tokens("history 1")).is_err());
    }

    #[test]
    fn replay_of_vanished_command_is_not_found() {
        let mut sh = shell();
        assert_eq!(exec(&mut sh, "true x").0, EXIT_SUCCESS);
        assert_eq!(exec(&mut sh, "export PATH=").0, EXIT_SUCCESS);
        assert_eq!(exec(&mut sh, "true x").0, EXIT_NOT_FOUND);
        assert_eq!(exec(&mut sh, "history 1").0, EXIT_NOT_FOUND);
        assert_eq!(sh.last_status(), EXIT_NOT_FOUND);
    }

    #[test]
    fn bad_redirection_abandons_line() {
        let mut sh = shell();
        let (code, out) = exec(&mut sh, "local x=1 abc>file");
        assert_eq!(code, EXIT_FAILURE);
        assert!(out.is_empty());
        assert!(sh.vars().is_empty());
    }

    #[test]
    fn exit_keeps_last_status() {
        let mut sh = shell();
        exec(&mut sh, "false");
        assert_eq!(exec(&mut sh, "exit").0, 1);
        assert!(sh.should_exit());
    }

    #[test]
    fn repl_stops_at_exit() {
        let mut sh = shell();
        let script = "local a=1\nexit\nlocal b=2\n";
        let code = sh.repl(&mut ScriptSource::new(Cursor::new(script)));
        assert_eq!(code, 0);
        assert_eq!(sh.vars().len(), 1);
    }

    #[test]
    fn repl_returns_last_status_at_end_of_input() {
        let mut sh = shell();
        let code = sh.repl(&mut ScriptSource::new(Cursor::new("false\n# comment\n")));
        assert_eq!(code, 1);
        assert!(sh.should_exit());
        assert!(!sh.input_error());
    }

    /// Fails `failures` times, then yields `line` once, then ends.
    struct FlakySource {
        failures: usize,
        line: Option<String>,
    }

    impl LineSource for FlakySource {
        fn read_line(&mut self) -> anyhow::Result<Option<String>> {
            if self.failures > 0 {
                self.failures -= 1;
                anyhow::bail!("device gone");
            }
            Ok(self.line.take())
        }
    }

    #[test]
    fn repl_keeps_reading_after_input_errors() {
        let mut sh = shell();
        let mut source = FlakySource {
            failures: 20,
            line: Some("local after=errors".to_string()),
        };
        let code = sh.repl(&mut source);
        assert_eq!(code, 0);
        assert!(sh.input_error());
        assert_eq!(sh.vars().get("after"), Some("errors"));
    }
}
