//! Scripted service processes for runner scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use podbridge::engine::executor::{
    ExecuteFuture, ServiceEvent, ServiceHandle, ServiceSpawner, SpawnFuture, SpawnedService,
    TerminateFuture,
};
use podbridge::engine::{CommandExecutor, CommandResult, ExecOptions};
use tokio::sync::mpsc;

/// Spawns services that optionally exit straight away with `exit_code`.
#[derive(Default)]
pub(crate) struct ScriptedSpawner {
    pub(crate) exit_code: Option<i32>,
    pub(crate) spawned: Arc<AtomicUsize>,
    pub(crate) terminations: Arc<AtomicUsize>,
}

struct ScriptedHandle {
    terminations: Arc<AtomicUsize>,
}

impl ServiceHandle for ScriptedHandle {
    fn pid(&self) -> Option<u32> {
        Some(31337)
    }

    fn terminate(&mut self) -> TerminateFuture<'_> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { true })
    }
}

impl ServiceSpawner for ScriptedSpawner {
    fn spawn(&self, _program: &str, _args: &[String]) -> SpawnFuture<'_> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let (sender, events) = mpsc::channel(4);
        if let Some(code) = self.exit_code {
            // The receiver is still held here, so the buffered send cannot fail.
            let queued = sender.try_send(ServiceEvent::Exited { code: Some(code) });
            assert!(queued.is_ok(), "exit event should be buffered");
        }
        let handle = ScriptedHandle {
            terminations: Arc::clone(&self.terminations),
        };
        Box::pin(async move {
            Ok(SpawnedService {
                handle: Box::new(handle),
                events,
            })
        })
    }
}

/// Executor for runners that are never given a stopper.
pub(crate) struct NoStopper;

impl CommandExecutor for NoStopper {
    fn execute(&self, program: &str, _args: &[String], _options: &ExecOptions) -> ExecuteFuture<'_> {
        let result = CommandResult::launch_failure(format!("{program} should not run"));
        Box::pin(async move { result })
    }
}

/// Counts status checks and answers once `ready_after` is reached.
pub(crate) fn status_check(
    ready_after: Option<u32>,
) -> impl Fn() -> podbridge::engine::runner::StatusCheckFuture + Send + Sync + 'static {
    let checks = Arc::new(AtomicU32::new(0));
    move || {
        let seen = checks.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = ready_after.is_some_and(|threshold| seen >= threshold);
        Box::pin(async move { ready })
    }
}
