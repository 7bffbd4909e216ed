//! External commands as retryable operations.

use anyhow::{Context, Result};
use log::debug;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Longest stderr excerpt kept in a [`CommandFailure`].
const STDERR_TAIL_BYTES: usize = 512;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

/// The command ran but did not exit successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub program: String,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Tail of what the command wrote to stderr.
    pub stderr: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with status {}", self.program, code)?,
            None => write!(f, "`{}` was terminated by a signal", self.program)?,
        }
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a spec from `argv`, the first element being the program.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    /// Runs the command once, inheriting stdout.
    ///
    /// Stderr is forwarded after the command exits. The child is killed if
    /// the returned future is dropped.
    #[tracing::instrument(skip(self), fields(program = %self.program))]
    pub async fn run_once(&self) -> Result<()> {
        debug!("Running {} {:?}", self.program, self.args);

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start `{}`", self.program))?;

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for `{}`", self.program))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            eprint!("{}", stderr);
        }

        if output.status.success() {
            return Ok(());
        }

        Err(CommandFailure {
            program: self.program.clone(),
            code: output.status.code(),
            stderr: tail(stderr.trim_end(), STDERR_TAIL_BYTES).to_string(),
        }
        .into())
    }
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
