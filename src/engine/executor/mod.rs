//! External program execution with optional virtualization wrappers.
//!
//! Every engine CLI call goes through the [`CommandExecutor`] seam so that
//! query behaviour can be unit-tested without real engine binaries. The
//! executor never fails: launch errors and non-zero exits are both reported
//! through [`CommandResult`].

mod service;

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use camino::Utf8PathBuf;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

pub use self::service::{
    ProcessSpawner, ServiceEvent, ServiceHandle, ServiceSpawner, SpawnFuture, SpawnedService,
    TerminateFuture,
};

/// Exit code reported when the program could not be launched at all.
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// One prefix segment of a wrapper command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperSegment {
    /// Program launched for this segment.
    pub program: String,
    /// Arguments passed to the segment program.
    pub args: Vec<String>,
}

/// Prefix command sequence routing execution into a virtualized backend.
///
/// The effective invocation of `program args...` through a wrapper is
/// `seg0.program seg0.args... seg1.program seg1.args... program args...`,
/// launched as a single child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperCommand {
    segments: Vec<WrapperSegment>,
}

impl WrapperCommand {
    /// Creates a wrapper with a single segment.
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().then(program, args)
    }

    /// Appends another segment after the existing ones.
    #[must_use]
    pub fn then<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments.push(WrapperSegment {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Returns the wrapper segments in invocation order.
    #[must_use]
    pub fn segments(&self) -> &[WrapperSegment] {
        &self.segments
    }

    /// Returns true when the wrapper has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Flattens the wrapper and the target into the program actually
    /// launched and its argument vector.
    #[must_use]
    pub fn invocation(&self, program: &str, args: &[String]) -> (String, Vec<String>) {
        let mut words = self
            .segments
            .iter()
            .flat_map(|segment| std::iter::once(&segment.program).chain(segment.args.iter()))
            .cloned()
            .chain(std::iter::once(String::from(program)))
            .chain(args.iter().cloned());
        let launched = words.next().unwrap_or_else(|| String::from(program));
        (launched, words.collect())
    }
}

/// Options for a single command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Wrapper routing the call into a virtualized backend.
    pub wrapper: Option<WrapperCommand>,
    /// Working directory of the child process.
    pub cwd: Option<Utf8PathBuf>,
    /// Extra environment variables for the child process.
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    /// Options carrying only a wrapper (if any).
    #[must_use]
    pub fn wrapped(wrapper: Option<WrapperCommand>) -> Self {
        Self {
            wrapper: wrapper.filter(|w| !w.is_empty()),
            ..Self::default()
        }
    }
}

/// Outcome of one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// True iff the exit code is zero.
    pub success: bool,
    /// Exit code, or [`LAUNCH_FAILURE_CODE`] when the program did not start.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandResult {
    /// Builds a result from a finished process.
    #[must_use]
    pub fn from_exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: code == 0,
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Builds the result reported when the program could not be launched.
    #[must_use]
    pub fn launch_failure(message: impl Into<String>) -> Self {
        Self::from_exit(LAUNCH_FAILURE_CODE, String::new(), message)
    }
}

/// Boxed future type returned by [`CommandExecutor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = CommandResult> + Send + 'a>>;

/// Behaviour required to run an external program to completion.
pub trait CommandExecutor: Send + Sync {
    /// Run `program args...`, prefixed by `options.wrapper` when present,
    /// and capture its streams and exit status.
    fn execute(&self, program: &str, args: &[String], options: &ExecOptions) -> ExecuteFuture<'_>;
}

/// [`CommandExecutor`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn execute(&self, program: &str, args: &[String], options: &ExecOptions) -> ExecuteFuture<'_> {
        let (launched, argv) = options.wrapper.as_ref().map_or_else(
            || (String::from(program), args.to_vec()),
            |wrapper| wrapper.invocation(program, args),
        );
        let cwd = options.cwd.clone();
        let env = options.env.clone();
        Box::pin(async move { run_to_completion(&launched, &argv, cwd, &env).await })
    }
}

async fn run_to_completion(
    program: &str,
    args: &[String],
    cwd: Option<Utf8PathBuf>,
    env: &[(String, String)],
) -> CommandResult {
    let mut command = Command::new(program);
    command
        .args(args)
        .envs(env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!(target: "podbridge::executor", %program, ?args, "executing command");
    match command.output().await {
        Ok(output) => {
            let code = output.status.code().unwrap_or(LAUNCH_FAILURE_CODE);
            let result = CommandResult::from_exit(
                code,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            );
            if !result.success {
                debug!(
                    target: "podbridge::executor",
                    %program,
                    code,
                    stderr = %result.stderr.trim(),
                    "command exited unsuccessfully"
                );
            }
            result
        }
        Err(error) => {
            warn!(target: "podbridge::executor", %program, %error, "failed to launch command");
            CommandResult::launch_failure(format!("failed to launch '{program}': {error}"))
        }
    }
}
