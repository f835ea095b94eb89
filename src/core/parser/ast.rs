/// Where a stage's standard output goes when it is redirected to a file.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRedirect {
    pub path: String,
    /// `>>` appends, `>` truncates.
    pub append: bool,
}

/// One stage of a pipeline, as produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandDescriptor {
    /// Never empty; `argv[0]` is the program name.
    pub argv: Vec<String>,
    pub stdin: Option<String>,
    pub stdout: Option<OutputRedirect>,
    pub stderr: Option<String>,
}

impl CommandDescriptor {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

#[derive(Debug, Default)]
pub struct CommandDescriptorBuilder {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
    pub stdout: Option<OutputRedirect>,
    pub stderr: Option<String>,
}

impl CommandDescriptorBuilder {
    pub fn new() -> CommandDescriptorBuilder {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
            && self.stdin.is_none()
            && self.stdout.is_none()
            && self.stderr.is_none()
    }

    pub fn update(mut self, part: CommandPart) -> CommandDescriptorBuilder {
        match part {
            CommandPart::Word(w) => self.argv.push(w),
            CommandPart::Input(path) => self.stdin = Some(path),
            CommandPart::Output(path, append) => self.stdout = Some(OutputRedirect { path, append }),
            CommandPart::Error(path) => self.stderr = Some(path),
        };

        self
    }

    /// Returns `None` when no program name was given.
    pub fn build(self) -> Option<CommandDescriptor> {
        if self.argv.is_empty() {
            return None;
        }

        Some(CommandDescriptor {
            argv: self.argv,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
        })
    }
}

/// A later redirect of the same stream replaces an earlier one.
#[derive(Debug)]
pub enum CommandPart {
    Word(String),
    Input(String),
    Output(String, bool),
    Error(String),
}
