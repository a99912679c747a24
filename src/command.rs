use crate::builtin::BuiltinKind;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

pub const EXIT_SUCCESS: ExitCode = 0;
/// Status of a built-in, redirection or parse failure.
pub const EXIT_FAILURE: ExitCode = 1;
/// Status of a command that could not be resolved.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// What the first token of a line names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Runs inside the shell process, never forked.
    Builtin(BuiltinKind),
    /// Anything else: resolved through `PATH` and executed in a child.
    External,
}

impl Command {
    pub fn classify(name: &str) -> Self {
        BuiltinKind::from_name(name).map_or(Command::External, Command::Builtin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_match_exactly() {
        assert_eq!(Command::classify("cd"), Command::Builtin(BuiltinKind::Cd));
        assert_eq!(
            Command::classify("history"),
            Command::Builtin(BuiltinKind::History)
        );
        assert_eq!(Command::classify("CD"), Command::External);
        assert_eq!(Command::classify("./ls"), Command::External);
        assert_eq!(Command::classify("echo"), Command::External);
    }
}
