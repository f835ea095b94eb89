use std::fmt;
use std::io;
use std::path::Path;

use failure::{Fail, ResultExt};
use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{ErrorKind, Result};

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        None
    }
}

impl Highlighter for EditorHelper {}

impl Helper for EditorHelper {}

impl Validator for EditorHelper {}

/// Line editor for the interactive prompt, with filename completion and a
/// bounded command history.
pub struct Editor {
    internal: rustyline::Editor<EditorHelper, DefaultHistory>,
    history_capacity: usize,
}

impl Editor {
    pub fn with_capacity(history_capacity: usize) -> Result<Editor> {
        let config = Config::builder()
            .max_history_size(history_capacity)
            .context(ErrorKind::Readline)?
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config).context(ErrorKind::Readline)?;
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Ok(Editor {
            internal,
            history_capacity,
        })
    }

    /// Returns `None` when end of file is reached. An interrupted line reads as empty.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.internal.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) => Ok(None),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(e) => Err(e.context(ErrorKind::Readline).into()),
        }
    }

    /// A missing history file is not an error; there is just nothing to load.
    pub fn load_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        match self.internal.load_history(path) {
            Ok(()) => Ok(()),
            Err(ReadlineError::Io(ref inner)) if inner.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.context(ErrorKind::Readline).into()),
        }
    }

    pub fn save_history<P: AsRef<Path> + ?Sized>(&mut self, path: &P) -> Result<()> {
        self.internal
            .save_history(path)
            .context(ErrorKind::Readline)?;
        Ok(())
    }

    pub fn add_history_entry(&mut self, line: &str) {
        let temp_result = self.internal.add_history_entry(line);
        log_if_err!(temp_result, "failed to add history entry");
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "editor: history capacity {}", self.history_capacity)
    }
}
