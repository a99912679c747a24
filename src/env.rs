use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// PATH used when the process environment doesn't provide one.
pub const DEFAULT_PATH: &str = "/bin";

/// The OS environment table as seen by the shell and every program it launches.
///
/// The environment contains:
/// - `vars`: variables passed to executed commands and consulted by `$NAME` lookups.
/// - `current_dir`: the working directory, updated only by `cd`.
///
/// Note: fields are public to keep built-ins short; only `export` writes `vars`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory of the shell process.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// Copies variables from `std::env::vars_os()` (lossily) and seeds
    /// `PATH=/bin` when the process has no `PATH`.
    pub fn new() -> Self {
        let mut vars: HashMap<String, String> = stdenv::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        vars.entry("PATH".to_string())
            .or_insert_with(|| DEFAULT_PATH.to_string());
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Build an environment from an explicit table, seeding `PATH` if it is missing.
    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            current_dir: stdenv::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        if !env.vars.contains_key("PATH") {
            env.set_var("PATH", DEFAULT_PATH);
        }
        env
    }

    /// Get the value of an environment variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Render the table as `KEY=VALUE` strings in the form `execve` expects.
    pub fn to_envp(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
