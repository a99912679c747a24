use anyhow::{Context, Result};
use argh::FromArgs;
use std::fs::File;
use std::io::{BufReader, IsTerminal};
use std::path::PathBuf;
use wsh::command::ExitCode;
use wsh::history::DEFAULT_HISTORY_LIMIT;
use wsh::{Environment, InteractiveSource, Interpreter, ScriptSource};

#[derive(FromArgs)]
/// A small shell: built-ins, PATH lookup, one redirection per line.
struct Args {
    #[argh(positional)]
    /// script to run instead of reading commands from the terminal.
    script: Option<PathBuf>,

    #[argh(option, default = "DEFAULT_HISTORY_LIMIT")]
    /// number of commands kept in history (default 5).
    history_limit: usize,
}

fn run(shell: &mut Interpreter, script: Option<PathBuf>) -> Result<ExitCode> {
    let status = match script {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("{}", path.display()))?;
            shell.repl(&mut ScriptSource::new(BufReader::new(file)))
        }
        None if std::io::stdin().is_terminal() => shell.repl(&mut InteractiveSource::new()?),
        None => shell.repl(&mut ScriptSource::new(std::io::stdin().lock())),
    };
    Ok(status)
}

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();
    if args.history_limit == 0 {
        eprintln!("wsh: --history-limit must be positive");
        std::process::exit(1);
    }

    let mut shell = Interpreter::new(Environment::new(), args.history_limit);
    let status = match run(&mut shell, args.script) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("wsh: {err:#}");
            1
        }
    };
    drop(shell);
    std::process::exit(status);
}
