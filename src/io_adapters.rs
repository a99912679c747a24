use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::BufRead;

/// Prompt shown before every interactive read.
pub const PROMPT: &str = "wsh> ";

/// Where the interpreter gets its lines from.
///
/// `Ok(None)` signals end of input. Lines are returned without their terminator.
pub trait LineSource {
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// Terminal input with a prompt and line editing.
pub struct InteractiveSource {
    editor: DefaultEditor,
}

impl InteractiveSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for InteractiveSource {
    fn read_line(&mut self) -> Result<Option<String>> {
        match self.editor.readline(PROMPT) {
            Ok(line) => {
                self.editor.add_history_entry(line.as_str())?;
                Ok(Some(line))
            }
            // Ctrl-C drops the line being typed.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Non-interactive input (a script file or piped stdin); no prompts.
pub struct ScriptSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ScriptSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> LineSource for ScriptSource<R> {
    fn read_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
