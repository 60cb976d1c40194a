//! Command invocations.
//!
//! An [`Invocation`] describes one command to run: its argv, working
//! directory, environment overlay and terminal options. It is built once
//! and never changes after it has been handed to the
//! [`Launcher`](crate::Launcher).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::escalation::RootMethod;

/// Where the child's stderr goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrMode {
    /// Interleaved with stdout on the terminal.
    #[default]
    Merged,
    /// Captured through a pipe and returned in the result.
    Separate,
}

/// Changes applied on top of the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverlay {
    /// Whether the launcher's environment is inherited.
    pub inherit: bool,
    /// Variables to set, replacing inherited values and defaults.
    pub set: BTreeMap<String, String>,
    /// Variables to remove.
    pub remove: Vec<String>,
}

impl Default for EnvOverlay {
    fn default() -> Self {
        Self {
            inherit: true,
            set: BTreeMap::new(),
            remove: Vec::new(),
        }
    }
}

/// A command to run in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    argv: Vec<String>,
    working_directory: Option<PathBuf>,
    env: EnvOverlay,
    masked_input: bool,
    stderr: StderrMode,
    window_size: Option<(u16, u16)>,
    translate_newlines: bool,
    root: Option<RootMethod>,
}

impl Invocation {
    /// Start building an invocation of `program`.
    #[must_use]
    pub fn builder(program: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder::new(program)
    }

    /// An invocation of a ready-made argv with default options.
    ///
    /// An empty argv is accepted here and rejected at launch.
    #[must_use]
    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            working_directory: None,
            env: EnvOverlay::default(),
            masked_input: false,
            stderr: StderrMode::default(),
            window_size: None,
            translate_newlines: false,
            root: None,
        }
    }

    /// The program, if any.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// The full argument vector, program first.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The working directory, if one was set.
    #[must_use]
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// The environment overlay.
    #[must_use]
    pub const fn env(&self) -> &EnvOverlay {
        &self.env
    }

    /// Whether all input is treated as secret.
    #[must_use]
    pub const fn masked_input(&self) -> bool {
        self.masked_input
    }

    /// Where stderr goes.
    #[must_use]
    pub const fn stderr(&self) -> StderrMode {
        self.stderr
    }

    /// Window size override, if any.
    #[must_use]
    pub const fn window_size(&self) -> Option<(u16, u16)> {
        self.window_size
    }

    /// Whether the terminal turns `\n` into `\r\n` on output.
    #[must_use]
    pub const fn translate_newlines(&self) -> bool {
        self.translate_newlines
    }

    /// Requested privilege escalation, if any.
    #[must_use]
    pub const fn root(&self) -> Option<RootMethod> {
        self.root
    }

    /// Render the argv for a log header.
    ///
    /// Arguments containing whitespace are single-quoted the way a POSIX
    /// shell would need them.
    #[must_use]
    pub fn display_command(&self) -> String {
        self.argv
            .iter()
            .map(|arg| quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        format!("'{}'", arg.replace('\'', "'\\''"))
    } else {
        arg.to_string()
    }
}

/// Builder for [`Invocation`].
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    inner: Invocation,
}

impl InvocationBuilder {
    /// Create a builder for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            inner: Invocation::from_argv([program.into()]),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inner.argv.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.inner.env.remove.retain(|k| *k != key);
        self.inner.env.set.insert(key, value.into());
        self
    }

    /// Remove an inherited environment variable.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.inner.env.set.remove(&key);
        self.inner.env.remove.push(key);
        self
    }

    /// Do not inherit the launcher's environment.
    #[must_use]
    pub const fn env_clear(mut self) -> Self {
        self.inner.env.inherit = false;
        self
    }

    /// Run in `path`.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.working_directory = Some(path.into());
        self
    }

    /// Treat all input as secret: the terminal starts without echo.
    #[must_use]
    pub const fn masked_input(mut self, masked: bool) -> Self {
        self.inner.masked_input = masked;
        self
    }

    /// Capture stderr separately instead of interleaving it.
    #[must_use]
    pub const fn separate_stderr(mut self, separate: bool) -> Self {
        self.inner.stderr = if separate {
            StderrMode::Separate
        } else {
            StderrMode::Merged
        };
        self
    }

    /// Override the initial window size.
    #[must_use]
    pub const fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.inner.window_size = Some((cols, rows));
        self
    }

    /// Let the terminal turn `\n` into `\r\n`, as an interactive
    /// terminal would. Off by default so output lines end in `\n`.
    #[must_use]
    pub const fn translate_newlines(mut self, translate: bool) -> Self {
        self.inner.translate_newlines = translate;
        self
    }

    /// Run the command as root through `sudo` or `doas`.
    #[must_use]
    pub const fn as_root(mut self, method: RootMethod) -> Self {
        self.inner.root = Some(method);
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Invocation {
        self.inner
    }
}

impl From<InvocationBuilder> for Invocation {
    fn from(builder: InvocationBuilder) -> Self {
        builder.build()
    }
}
