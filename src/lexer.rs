//! Tokenization and `$NAME` substitution for a single input line.

use crate::env::Environment;
use crate::error::ShellError;
use crate::vars::ShellVars;
use std::ffi::CString;
use std::fmt;

/// Token sequence of one command line.
///
/// `len()` counts real tokens only. The exec form built by
/// [`Argv::to_exec_args`] is handed to `execve`, which terminates it with the
/// null sentinel one past the last token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Argv {
    tokens: Vec<String>,
}

impl Argv {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The command name, if any.
    pub fn name(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Everything after the command name.
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or(&[])
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    /// Drop the trailing token (a consumed redirection).
    pub fn pop(&mut self) -> Option<String> {
        self.tokens.pop()
    }

    /// A line whose first token starts with `#`.
    pub fn is_comment(&self) -> bool {
        self.name().is_some_and(|t| t.starts_with('#'))
    }

    /// Convert to the C strings `execve` expects as `argv`.
    pub fn to_exec_args(&self) -> Result<Vec<CString>, ShellError> {
        self.tokens
            .iter()
            .map(|t| CString::new(t.as_str()).map_err(|_| ShellError::InvalidToken(t.clone())))
            .collect()
    }
}

impl fmt::Display for Argv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for Argv {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Split a line on runs of spaces.
///
/// Only the space character separates tokens; consecutive spaces never yield
/// empty tokens and a blank line yields none.
pub fn split_into_tokens(line: &str) -> Argv {
    line.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Resolve `name` the way `$name` is resolved: OS environment, then shell
/// variables, then the empty string.
pub fn lookup_var<'a>(name: &str, env: &'a Environment, vars: &'a ShellVars) -> &'a str {
    env.get_var(name).or_else(|| vars.get(name)).unwrap_or("")
}

/// Expand a single word if it is a `$NAME` reference, otherwise return it unchanged.
pub fn expand_word(word: &str, env: &Environment, vars: &ShellVars) -> String {
    match word.strip_prefix('$') {
        Some(name) => lookup_var(name, env, vars).to_string(),
        None => word.to_string(),
    }
}

/// Replace every `$NAME` token in place. Token count and order are preserved.
pub fn substitute(argv: &mut Argv, env: &Environment, vars: &ShellVars) {
    for token in argv.tokens.iter_mut() {
        if let Some(name) = token.strip_prefix('$') {
            *token = lookup_var(name, env, vars).to_string();
        }
    }
}
