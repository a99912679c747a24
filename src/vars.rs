//! Shell-local variables set by `local`, kept apart from the OS environment.

/// Insertion-ordered `name -> value` table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShellVars {
    entries: Vec<(String, String)>,
}

impl ShellVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new variable or overwrite an existing one in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in store order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
