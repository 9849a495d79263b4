//! Supervised startup and shutdown of an engine's API service.
//!
//! A [`Runner`] is bound to one engine client. Starting spawns the starter
//! program in the background and then races two tasks for a single outcome:
//! a watcher that reports the process failing, and a poller that asks
//! `check_status` up to `retry.count` times, `retry.wait` apart. Whichever
//! settles first decides the result; the loser is discarded.
//!
//! Start and stop are serialised by a per-runner lock, so a stop issued while
//! a start is in flight waits for the start race to settle.

mod completion;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use self::completion::Completion;
use super::executor::{
    CommandExecutor, ExecOptions, ServiceEvent, ServiceHandle, ServiceSpawner, SpawnedService,
};
use super::notify::{LifecycleEvent, LifecycleNotifier};
use super::settings::EngineConnectorSettings;
use crate::error::ConnectorError;

/// Default number of status checks during a start.
pub const DEFAULT_RETRY_COUNT: u32 = 10;

/// Default delay between status checks, in milliseconds.
pub const DEFAULT_RETRY_WAIT_MS: u64 = 5000;

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RunnerState {
    /// Nothing has been started.
    #[default]
    Idle,
    /// A start is in flight.
    Starting,
    /// The API service was started by this runner.
    Started,
    /// A stop is in flight.
    Stopping,
    /// The API service was stopped.
    Stopped,
    /// The last start failed.
    Failed,
}

/// Command that launches the API service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStarterOptions {
    /// Program to spawn. Starting fails without one.
    pub path: Option<String>,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl RunnerStarterOptions {
    /// Creates starter options for `path args...`.
    #[must_use]
    pub fn new(path: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: Some(path.into()),
            args: args.into_iter().collect(),
        }
    }
}

/// Command that stops the API service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStopperOptions {
    /// Program to execute, if any.
    pub path: Option<String>,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl RunnerStopperOptions {
    /// Creates stopper options for `path args...`.
    #[must_use]
    pub fn new(path: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: Some(path.into()),
            args: args.into_iter().collect(),
        }
    }
}

/// Readiness polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of status checks.
    pub count: u32,
    /// Delay between consecutive status checks.
    pub wait: Duration,
}

impl RetryPolicy {
    /// Creates a policy of `count` checks `wait` apart.
    #[must_use]
    pub const fn new(count: u32, wait: Duration) -> Self {
        Self { count, wait }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_COUNT,
            Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
        )
    }
}

/// Future returned by a status check.
pub type StatusCheckFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Asks whether the API is up.
pub type CheckStatusFn = Arc<dyn Fn() -> StatusCheckFuture + Send + Sync>;

/// Called before each status check with `(attempt, max)`.
pub type StatusCheckHook = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Called once the service is spawned, with its process id.
pub type SpawnHook = Arc<dyn Fn(Option<u32>) + Send + Sync>;

/// Retry policy and hooks governing one supervised start.
#[derive(Clone)]
pub struct ServiceOpts {
    /// Readiness polling budget.
    pub retry: RetryPolicy,
    /// Readiness check, usually the client's `is_api_running`.
    pub check_status: CheckStatusFn,
    /// Hook run before every status check.
    pub on_status_check: Option<StatusCheckHook>,
    /// Hook run after the service is spawned.
    pub on_spawn: Option<SpawnHook>,
}

impl ServiceOpts {
    /// Creates options with no hooks.
    #[must_use]
    pub fn new<F>(retry: RetryPolicy, check_status: F) -> Self
    where
        F: Fn() -> StatusCheckFuture + Send + Sync + 'static,
    {
        Self {
            retry,
            check_status: Arc::new(check_status),
            on_status_check: None,
            on_spawn: None,
        }
    }

    /// Sets the status check hook.
    #[must_use]
    pub fn with_on_status_check<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, u32) + Send + Sync + 'static,
    {
        self.on_status_check = Some(Arc::new(hook));
        self
    }

    /// Sets the spawn hook.
    #[must_use]
    pub fn with_on_spawn<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<u32>) + Send + Sync + 'static,
    {
        self.on_spawn = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ServiceOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOpts")
            .field("retry", &self.retry)
            .field("on_status_check", &self.on_status_check.is_some())
            .field("on_spawn", &self.on_spawn.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RetainedService {
    handle: Option<Box<dyn ServiceHandle>>,
    watcher: Option<JoinHandle<()>>,
}

/// Owns the lifecycle of one connector's API service.
pub struct Runner {
    executor: Arc<dyn CommandExecutor>,
    spawner: Arc<dyn ServiceSpawner>,
    notifier: Arc<dyn LifecycleNotifier>,
    retained: tokio::sync::Mutex<RetainedService>,
    state: Mutex<RunnerState>,
}

impl Runner {
    /// Creates an idle runner.
    #[must_use]
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        spawner: Arc<dyn ServiceSpawner>,
        notifier: Arc<dyn LifecycleNotifier>,
    ) -> Self {
        Self {
            executor,
            spawner,
            notifier,
            retained: tokio::sync::Mutex::new(RetainedService::default()),
            state: Mutex::new(RunnerState::Idle),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while the API service started by this runner is up.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state() == RunnerState::Started
    }

    fn set_state(&self, next: RunnerState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(target: "podbridge::runner", from = ?*state, to = ?next, "runner state change");
        *state = next;
    }

    fn notify(&self, trace: &str) {
        self.notifier.transmit(LifecycleEvent::startup_phase(trace));
    }

    /// Starts the API service and waits until it is ready.
    ///
    /// Returns true when the service is (already) up. Returns false when no
    /// starter program is configured, the spawn fails, the service process
    /// fails, or the retry budget runs out; the runner is then `Failed`.
    pub async fn start_api(&self, opts: &ServiceOpts, starter: &RunnerStarterOptions) -> bool {
        info!(target: "podbridge::runner", "starting API");
        let mut retained = match self.retained.try_lock() {
            Ok(guard) => guard,
            Err(_) if matches!(self.state(), RunnerState::Starting | RunnerState::Started) => {
                debug!(target: "podbridge::runner", "start already in flight");
                return true;
            }
            Err(_) => self.retained.lock().await,
        };
        if self.is_started() {
            debug!(target: "podbridge::runner", "API already started");
            self.notify("Api started");
            return true;
        }

        self.set_state(RunnerState::Starting);
        self.notify("Starting the api");

        let Some(program) = starter.path.as_deref().filter(|path| !path.is_empty()) else {
            error!(target: "podbridge::runner", "{}", ConnectorError::StarterNotConfigured);
            self.set_state(RunnerState::Failed);
            return false;
        };

        match self
            .supervise_start(&mut retained, program, &starter.args, opts)
            .await
        {
            Ok(()) => {
                self.set_state(RunnerState::Started);
                self.notify("Api started");
                info!(target: "podbridge::runner", %program, "API started");
                true
            }
            Err(err) => {
                error!(target: "podbridge::runner", %program, error = %err, "API start failed");
                self.set_state(RunnerState::Failed);
                false
            }
        }
    }

    async fn supervise_start(
        &self,
        retained: &mut RetainedService,
        program: &str,
        args: &[String],
        opts: &ServiceOpts,
    ) -> Result<(), ConnectorError> {
        let SpawnedService { mut handle, events } = self.spawner.spawn(program, args).await?;
        if let Some(hook) = &opts.on_spawn {
            hook(handle.pid());
        }

        let (completion, outcome_rx) = Completion::new();
        let shared = Arc::new(completion);
        let watcher = tokio::spawn(watch_service(events, Arc::clone(&shared)));
        let poller = tokio::spawn(poll_until_ready(opts.clone(), Arc::clone(&shared)));

        let outcome = outcome_rx.await.unwrap_or_else(|_| {
            Err(ConnectorError::ProcessError {
                message: String::from("start race ended without an outcome"),
            })
        });
        poller.abort();

        match outcome {
            Ok(()) => {
                retained.handle = Some(handle);
                retained.watcher = Some(watcher);
                Ok(())
            }
            Err(err) => {
                watcher.abort();
                if !handle.terminate().await {
                    warn!(target: "podbridge::runner", %program, "unable to terminate failed API service");
                }
                Err(err)
            }
        }
    }

    /// Stops the API service started by this runner.
    ///
    /// Returns true without doing anything unless the runner is `Started`.
    /// Otherwise runs the stopper (when configured) and terminates the
    /// retained service process. Terminating a retained process always
    /// counts as success; without one the stopper's result decides.
    pub async fn stop_api(
        &self,
        custom_settings: Option<&EngineConnectorSettings>,
        stopper: Option<&RunnerStopperOptions>,
    ) -> bool {
        let mut retained = self.retained.lock().await;
        let connector = custom_settings.map_or("", |settings| settings.id.as_str());
        if !self.is_started() {
            debug!(target: "podbridge::runner", %connector, "stopping API skipped, not started here");
            return true;
        }

        info!(target: "podbridge::runner", %connector, "stopping API");
        self.set_state(RunnerState::Stopping);

        let stopper_succeeded = self.run_stopper(stopper).await;
        let terminated = retained.handle.is_some();
        if let Some(mut handle) = retained.handle.take()
            && !handle.terminate().await
        {
            warn!(target: "podbridge::runner", pid = ?handle.pid(), "API service did not confirm termination");
        }
        if let Some(watcher) = retained.watcher.take() {
            watcher.abort();
        }

        self.set_state(RunnerState::Stopped);
        let stopped = terminated || stopper_succeeded;
        info!(target: "podbridge::runner", %connector, stopped, "API stop complete");
        stopped
    }

    async fn run_stopper(&self, stopper: Option<&RunnerStopperOptions>) -> bool {
        let Some(options) = stopper else {
            debug!(target: "podbridge::runner", "no stopper specified");
            return true;
        };
        let Some(path) = options.path.as_deref().filter(|path| !path.is_empty()) else {
            debug!(target: "podbridge::runner", "stopper has no program");
            return true;
        };
        let result = self
            .executor
            .execute(path, &options.args, &ExecOptions::default())
            .await;
        if !result.success {
            warn!(target: "podbridge::runner", program = path, code = result.code, stderr = %result.stderr.trim(), "API stopper failed");
        }
        result.success
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Settles the start race with an error when the service process fails.
///
/// A clean exit is not a failure: some starters only boot a VM and return.
/// Failures after a successful start are logged and leave the runner
/// `Started` until [`Runner::stop_api`] releases the service.
async fn watch_service(
    mut events: mpsc::Receiver<ServiceEvent>,
    completion: Arc<Completion<Result<(), ConnectorError>>>,
) {
    while let Some(event) = events.recv().await {
        let message = match event {
            ServiceEvent::Exited { code: Some(0) } => {
                debug!(target: "podbridge::runner", "API starter exited cleanly");
                continue;
            }
            ServiceEvent::Exited { code } => code.map_or_else(
                || String::from("service terminated by signal"),
                |status| format!("service exited with status {status}"),
            ),
            ServiceEvent::Failed { message } => message,
        };
        let failure = ConnectorError::ProcessError {
            message: message.clone(),
        };
        if completion.settle(Err(failure)) {
            error!(target: "podbridge::runner", %message, "API service process error");
        } else {
            warn!(target: "podbridge::runner", %message, "API service ended after startup, stop the API to release it");
        }
    }
}

/// Polls `check_status` until it succeeds or the retry budget is spent.
async fn poll_until_ready(
    opts: ServiceOpts,
    completion: Arc<Completion<Result<(), ConnectorError>>>,
) {
    let max = opts.retry.count;
    for attempt in 1..=max {
        if completion.is_settled() {
            return;
        }
        debug!(target: "podbridge::runner", attempt, max, "checking API status");
        if let Some(hook) = &opts.on_status_check {
            hook(attempt, max);
        }
        if (opts.check_status)().await {
            if !completion.settle(Ok(())) {
                warn!(target: "podbridge::runner", "start already settled, readiness discarded");
            }
            return;
        }
        if attempt < max {
            tokio::time::sleep(opts.retry.wait).await;
        }
    }
    if !completion.settle(Err(ConnectorError::StartupTimeout { attempts: max })) {
        debug!(target: "podbridge::runner", "start already settled, timeout discarded");
    }
}
