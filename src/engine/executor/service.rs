//! Background service processes supervised by the runner.
//!
//! A spawned service is split into a [`ServiceHandle`] used to terminate it
//! and an event channel that reports how the process ended. The process is
//! owned by a supervisor task; dropping the handle kills it.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ConnectorError;

const EVENT_CHANNEL_CAPACITY: usize = 4;

/// Something that happened to a spawned service process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// The process exited on its own.
    Exited {
        /// Exit code, `None` when the process was ended by a signal.
        code: Option<i32>,
    },
    /// Waiting on the process failed.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Boxed future type returned by [`ServiceHandle::terminate`].
pub type TerminateFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Control handle of a spawned service process.
pub trait ServiceHandle: Send + Sync {
    /// Operating system process identifier, when known.
    fn pid(&self) -> Option<u32>;

    /// Forcibly terminate the process. Returns true once the process is
    /// gone, including when it had already exited.
    fn terminate(&mut self) -> TerminateFuture<'_>;
}

/// A freshly spawned service: its handle and its event stream.
pub struct SpawnedService {
    /// Handle used to terminate the process.
    pub handle: Box<dyn ServiceHandle>,
    /// Events emitted by the process supervisor.
    pub events: mpsc::Receiver<ServiceEvent>,
}

/// Boxed future type returned by [`ServiceSpawner::spawn`].
pub type SpawnFuture<'a> =
    Pin<Box<dyn Future<Output = Result<SpawnedService, ConnectorError>> + Send + 'a>>;

/// Behaviour required to launch a long-running API service process.
pub trait ServiceSpawner: Send + Sync {
    /// Launch `program args...` in the background.
    fn spawn(&self, program: &str, args: &[String]) -> SpawnFuture<'_>;
}

/// [`ServiceSpawner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl ServiceSpawner for ProcessSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> SpawnFuture<'_> {
        let program_owned = String::from(program);
        let args_owned = args.to_vec();
        Box::pin(async move { spawn_service(&program_owned, &args_owned) })
    }
}

type KillRequest = oneshot::Sender<bool>;

struct ProcessHandle {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<KillRequest>>,
}

impl ServiceHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&mut self) -> TerminateFuture<'_> {
        let kill = self.kill.take();
        Box::pin(async move {
            let Some(sender) = kill else {
                return true;
            };
            let (ack_tx, ack_rx) = oneshot::channel();
            if sender.send(ack_tx).is_err() {
                // The supervisor already observed the exit.
                return true;
            }
            ack_rx.await.unwrap_or(true)
        })
    }
}

fn spawn_service(program: &str, args: &[String]) -> Result<SpawnedService, ConnectorError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| ConnectorError::SpawnFailed {
            program: String::from(program),
            message: error.to_string(),
        })?;

    let pid = child.id();
    debug!(target: "podbridge::runner", %program, ?args, ?pid, "spawned API service");

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_output(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_output(stderr, "stderr"));
    }

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (kill_tx, kill_rx) = oneshot::channel();
    tokio::spawn(supervise(child, kill_rx, events_tx));

    Ok(SpawnedService {
        handle: Box::new(ProcessHandle {
            pid,
            kill: Some(kill_tx),
        }),
        events: events_rx,
    })
}

async fn supervise(
    mut child: Child,
    kill: oneshot::Receiver<KillRequest>,
    events: mpsc::Sender<ServiceEvent>,
) {
    let event = tokio::select! {
        status = child.wait() => match status {
            Ok(exit) => ServiceEvent::Exited { code: exit.code() },
            Err(error) => ServiceEvent::Failed { message: error.to_string() },
        },
        request = kill => {
            let killed = match child.kill().await {
                Ok(()) => true,
                Err(error) => {
                    warn!(target: "podbridge::runner", %error, "failed to terminate API service");
                    false
                }
            };
            if let Ok(ack) = request
                && ack.send(killed).is_err()
            {
                debug!(target: "podbridge::runner", "termination acknowledgement dropped");
            }
            return;
        }
    };

    debug!(target: "podbridge::runner", ?event, "API service ended");
    if events.send(event).await.is_err() {
        debug!(target: "podbridge::runner", "no listener for API service events");
    }
}

async fn forward_output<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "podbridge::runner", stream = name, "{line}");
    }
}
