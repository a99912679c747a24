use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::interpreter::Interpreter;
use crate::lexer::{Argv, expand_word};
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::sync::LazyLock;

/// `NAME=VALUE` with a non-empty name and exactly one `=`.
static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^=]+)=([^=]*)$").expect("assignment pattern is valid"));

/// The closed set of commands implemented inside the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Exit,
    Ls,
    Cd,
    Export,
    Local,
    Vars,
    History,
}

impl BuiltinKind {
    const TABLE: [(&'static str, BuiltinKind); 7] = [
        ("exit", BuiltinKind::Exit),
        ("ls", BuiltinKind::Ls),
        ("cd", BuiltinKind::Cd),
        ("export", BuiltinKind::Export),
        ("local", BuiltinKind::Local),
        ("vars", BuiltinKind::Vars),
        ("history", BuiltinKind::History),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, kind)| kind)
    }

    pub fn name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, k)| *k == self)
            .map(|&(n, _)| n)
            .unwrap_or_default()
    }

    /// Parse `args` for this built-in and run it.
    pub(crate) fn run(
        self,
        args: &[String],
        stdout: &mut dyn Write,
        sh: &mut Interpreter,
    ) -> Result<ExitCode> {
        match self {
            BuiltinKind::Exit => invoke::<Exit>(self, args, stdout, sh),
            BuiltinKind::Ls => invoke::<Ls>(self, args, stdout, sh),
            BuiltinKind::Cd => invoke::<Cd>(self, args, stdout, sh),
            BuiltinKind::Export => invoke::<Export>(self, args, stdout, sh),
            BuiltinKind::Local => invoke::<Local>(self, args, stdout, sh),
            BuiltinKind::Vars => invoke::<Vars>(self, args, stdout, sh),
            BuiltinKind::History => invoke::<History>(self, args, stdout, sh),
        }
    }
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`), which enforces
/// their arity, and executed directly in-process without spawning a child.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Executes the command against the shell state.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode>;
}

fn invoke<T: BuiltinCommand>(
    kind: BuiltinKind,
    args: &[String],
    stdout: &mut dyn Write,
    sh: &mut Interpreter,
) -> Result<ExitCode> {
    // Every word is an operand: `--` and `--help` must count against arity.
    let args: Vec<&str> = std::iter::once("--")
        .chain(args.iter().map(String::as_str))
        .collect();
    match T::from_args(&[kind.name()], &args) {
        Ok(cmd) => cmd.execute(stdout, sh),
        Err(EarlyExit { output, .. }) => Err(anyhow!("{}", output.trim_end())),
    }
}

/// Split `NAME=VALUE` and expand a `$NAME` value.
fn parse_assignment(assignment: &str, sh: &Interpreter) -> Result<(String, String)> {
    let caps = ASSIGNMENT
        .captures(assignment)
        .ok_or_else(|| anyhow!("{assignment}: expected NAME=VALUE"))?;
    let value = expand_word(&caps[2], &sh.env, &sh.vars);
    Ok((caps[1].to_string(), value))
}

#[derive(FromArgs)]
/// Exit the shell with the status of the last command.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn execute(self, _stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        sh.request_exit();
        Ok(sh.last_status())
    }
}

#[derive(FromArgs)]
/// List the current directory, one entry per line; directories end with `/`.
pub struct Ls {}

impl BuiltinCommand for Ls {
    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        let dir = &sh.env.current_dir;
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("{}", dir.display()))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.path().is_dir();
            entries.push((name, is_dir));
        }
        entries.sort();

        for (name, is_dir) in entries {
            if is_dir {
                writeln!(stdout, "{name}/")?;
            } else {
                writeln!(stdout, "{name}")?;
            }
        }
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: String,
}

impl BuiltinCommand for Cd {
    fn execute(self, _stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        let new_dir = sh.env.current_dir.join(&self.target);

        let canonical =
            fs::canonicalize(&new_dir).with_context(|| format!("{}", self.target))?;

        std::env::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        sh.env.current_dir = canonical;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Set an environment variable visible to launched programs.
pub struct Export {
    #[argh(positional)]
    /// assignment of the form NAME=VALUE.
    pub assignment: String,
}

impl BuiltinCommand for Export {
    fn execute(self, _stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        let (name, value) = parse_assignment(&self.assignment, sh)?;
        sh.env.set_var(name, value);
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Set a shell variable that is not exported to launched programs.
pub struct Local {
    #[argh(positional)]
    /// assignment of the form NAME=VALUE.
    pub assignment: String,
}

impl BuiltinCommand for Local {
    fn execute(self, _stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        let (name, value) = parse_assignment(&self.assignment, sh)?;
        sh.vars.set(name, value);
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Print every shell variable as NAME=VALUE.
pub struct Vars {}

impl BuiltinCommand for Vars {
    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        for (name, value) in sh.vars.iter() {
            writeln!(stdout, "{name}={value}")?;
        }
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Show history, re-run entry N, or change the history size with `set N`.
pub struct History {
    #[argh(positional, greedy)]
    /// nothing, an entry number, or `set` followed by the new size.
    pub args: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum HistoryAction {
    List,
    Replay(usize),
    SetLimit(usize),
}

fn parse_positive(arg: &str) -> Result<usize> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => bail!("{arg}: expected a positive number"),
    }
}

impl History {
    fn action(&self) -> Result<HistoryAction> {
        match self.args.as_slice() {
            [] => Ok(HistoryAction::List),
            [n] => parse_positive(n).map(HistoryAction::Replay),
            [set, n] if set == "set" => parse_positive(n).map(HistoryAction::SetLimit),
            _ => bail!("usage: history [N | set N]"),
        }
    }
}

impl BuiltinCommand for History {
    fn execute(self, stdout: &mut dyn Write, sh: &mut Interpreter) -> Result<ExitCode> {
        match self.action()? {
            HistoryAction::List => {
                for (index, argv) in sh.history.iter() {
                    writeln!(stdout, "{index}) {argv}")?;
                }
                Ok(EXIT_SUCCESS)
            }
            HistoryAction::SetLimit(limit) => {
                sh.history.set_limit(limit);
                Ok(EXIT_SUCCESS)
            }
            HistoryAction::Replay(index) => {
                let argv: Argv = sh
                    .history
                    .get(index)
                    .cloned()
                    .ok_or_else(|| anyhow!("{index}: no such history entry"))?;
                sh.replay(argv)
            }
        }
    }
}
