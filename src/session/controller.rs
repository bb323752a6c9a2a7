use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::{
    auth::IdentityProvider,
    db::{Run, RunStop},
    error::{Operation, OperationError, RunError},
    settings::{DurationPolicy, Settings},
    store::{RunStore, RunSubscription, StoreError, StoreResult},
};

use super::{
    project_runs,
    ticker::{SessionTimer, Tick},
    RunUiState, RunsStatus, SessionPhase,
};

// Set to false to silence this module.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub duration_policy: DurationPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            tick_interval: settings.tick_interval(),
            duration_policy: settings.duration_policy,
        }
    }
}

#[derive(Debug)]
enum SessionCommand {
    Start,
    Stop,
    Delete(String),
    ClearError,
    Shutdown,
}

/// Handle to a running session actor.
///
/// Intents are fire-and-forget: they are queued and their outcome shows up
/// in [`RunUiState`]. Clones share the same actor. The actor shuts down,
/// stopping the timer and releasing the live subscription, on
/// [`shutdown`](Self::shutdown) or once every handle is dropped.
#[derive(Clone)]
pub struct RunSessionController {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<RunUiState>,
}

impl RunSessionController {
    /// Spawns the actor on the current tokio runtime. Recovery of an active
    /// run and the run-list subscription start immediately.
    pub fn spawn(
        store: Arc<dyn RunStore>,
        identity: Arc<dyn IdentityProvider>,
        config: SessionConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let initial = RunUiState {
            runs_status: RunsStatus::Loading,
            ..RunUiState::default()
        };
        let (state_tx, state_rx) = watch::channel(initial.clone());

        let actor = SessionActor {
            store,
            identity,
            config,
            state: initial,
            publisher: state_tx,
            timer: SessionTimer::new(config.tick_interval),
            ticks_tx,
            ticks_rx,
            commands: commands_rx,
            subscription: None,
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            state: state_rx,
        }
    }

    pub fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop)
    }

    pub fn delete(&self, run_id: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::Delete(run_id.into()))
    }

    pub fn clear_error(&self) -> Result<()> {
        self.send(SessionCommand::ClearError)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RunUiState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RunUiState> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate` and returns that state.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<RunUiState>
    where
        F: FnMut(&RunUiState) -> bool,
    {
        let mut receiver = self.state.clone();
        let state = receiver
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| anyhow!("run session has shut down"))?;
        Ok(state.clone())
    }

    /// Stops the actor and waits for it to release its resources.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        let mut receiver = self.state.clone();
        while receiver.changed().await.is_ok() {}
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("run session has shut down"))
    }
}

struct SessionActor {
    store: Arc<dyn RunStore>,
    identity: Arc<dyn IdentityProvider>,
    config: SessionConfig,
    state: RunUiState,
    publisher: watch::Sender<RunUiState>,
    timer: SessionTimer,
    ticks_tx: mpsc::UnboundedSender<Tick>,
    ticks_rx: mpsc::UnboundedReceiver<Tick>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    subscription: Option<RunSubscription>,
}

impl SessionActor {
    async fn run(mut self) {
        self.initialize().await;
        self.publish();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                Some(tick) = self.ticks_rx.recv() => self.handle_tick(tick),
                delivery = next_delivery(&mut self.subscription) => {
                    match delivery {
                        Some(result) => self.handle_delivery(result),
                        None => {
                            log_warn!("run subscription ended");
                            self.subscription = None;
                        }
                    }
                }
            }
            self.publish();
        }

        self.timer.stop();
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close();
        }
        log_info!("run session shut down");
    }

    /// Opens the run-list subscription and resumes a run that was still
    /// active when the previous session ended.
    async fn initialize(&mut self) {
        let Some(owner_id) = self.identity.current_owner_id() else {
            self.state.runs_status = RunsStatus::Failed(RunError::NotAuthenticated.to_string());
            self.fail(Operation::Recover, RunError::NotAuthenticated);
            return;
        };

        self.subscription = Some(self.store.subscribe(&owner_id));

        match self.store.find_active(&owner_id).await {
            Ok(Some(run)) => {
                let elapsed = run.wall_clock_elapsed(Utc::now());
                log_info!("Resuming active run {} at {}s", run.id, elapsed);
                self.state.current_run = Some(run);
                self.state.elapsed_seconds = elapsed;
                self.state.phase = SessionPhase::Running;
                self.timer.start(self.ticks_tx.clone());
            }
            Ok(None) => log_debug!("No active run to resume for {owner_id}"),
            Err(err) => self.fail(Operation::Recover, err.into()),
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start().await,
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Delete(run_id) => self.delete(&run_id).await,
            SessionCommand::ClearError => self.state.error = None,
            SessionCommand::Shutdown => {}
        }
    }

    async fn start(&mut self) {
        let Some(owner_id) = self.require_owner(Operation::Start) else {
            return;
        };

        if self.state.phase != SessionPhase::Idle || self.state.current_run.is_some() {
            log_warn!("Run already in progress, ignoring start request");
            self.fail(Operation::Start, RunError::AlreadyActive);
            return;
        }

        match self.store.find_active(&owner_id).await {
            Ok(Some(existing)) => {
                log_warn!("Active run already exists: {}", existing.id);
                self.fail(Operation::Start, RunError::AlreadyActive);
                return;
            }
            Ok(None) => {}
            Err(err) => {
                self.fail(Operation::Start, err.into());
                return;
            }
        }

        let run = Run::begin(owner_id, Utc::now());
        match self.store.create(run.clone()).await {
            Ok(run_id) => {
                log_info!("Run {run_id} started");
                self.state.current_run = Some(run.with_id(run_id));
                self.state.elapsed_seconds = 0;
                self.state.phase = SessionPhase::Running;
                self.clear_error_for(Operation::Start);
                self.timer.start(self.ticks_tx.clone());
            }
            Err(err) => self.fail(Operation::Start, err.into()),
        }
    }

    async fn stop(&mut self) {
        let Some(run) = self.state.current_run.clone() else {
            log_debug!("stop requested with no current run");
            return;
        };
        let Some(owner_id) = self.require_owner(Operation::Stop) else {
            return;
        };
        if run.owner_id != owner_id {
            self.fail(Operation::Stop, RunError::Unauthorized);
            return;
        }

        // No tick may land once a stop is under way.
        self.timer.stop();
        self.state.phase = SessionPhase::Stopping;
        self.publish();

        let end_time = Utc::now();
        let duration_seconds = match self.config.duration_policy {
            DurationPolicy::TickCount => self.state.elapsed_seconds,
            DurationPolicy::WallClock => run.wall_clock_elapsed(end_time),
        };
        let stop = RunStop {
            end_time,
            duration_seconds,
        };

        match self.store.update(&run.id, stop).await {
            Ok(()) => {
                log_info!("Run {} stopped after {}s", run.id, duration_seconds);
                self.settle_idle();
            }
            Err(StoreError::AlreadyStopped(_)) => {
                log_info!("Run {} was already stopped elsewhere", run.id);
                self.settle_idle();
            }
            Err(err) => {
                // Keep the run; the caller may retry. The timer stays stopped.
                self.state.phase = SessionPhase::Running;
                self.fail(Operation::Stop, err.into());
            }
        }
    }

    async fn delete(&mut self, run_id: &str) {
        let Some(owner_id) = self.require_owner(Operation::Delete) else {
            return;
        };

        if self
            .state
            .current_run
            .as_ref()
            .is_some_and(|current| current.id == run_id)
        {
            self.fail(Operation::Delete, RunError::RunInProgress);
            return;
        }

        let run = match self.store.get(run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                self.fail(Operation::Delete, RunError::NotFound);
                return;
            }
            Err(err) => {
                self.fail(Operation::Delete, err.into());
                return;
            }
        };

        if run.owner_id != owner_id {
            self.fail(Operation::Delete, RunError::Unauthorized);
            return;
        }
        if run.is_active {
            self.fail(Operation::Delete, RunError::RunInProgress);
            return;
        }

        // The list itself refreshes through the subscription.
        match self.store.delete(run_id).await {
            Ok(()) => {
                log_info!("Run {run_id} deleted");
                self.clear_error_for(Operation::Delete);
            }
            Err(err) => self.fail(Operation::Delete, err.into()),
        }
    }

    fn handle_tick(&mut self, tick: Tick) {
        if self.timer.accepts(tick) && self.state.phase == SessionPhase::Running {
            self.state.elapsed_seconds += 1;
        }
    }

    fn handle_delivery(&mut self, result: StoreResult<Vec<Run>>) {
        match result {
            Ok(runs) => {
                let stopped_elsewhere = self.state.current_run.as_ref().is_some_and(|current| {
                    runs.iter().any(|run| run.id == current.id && !run.is_active)
                });
                if stopped_elsewhere {
                    log_info!("Current run was stopped by another session");
                    self.timer.stop();
                    self.settle_idle();
                }
                self.state.runs = project_runs(runs);
                self.state.runs_status = RunsStatus::Loaded;
            }
            Err(err) => {
                log_warn!("run subscription delivery failed: {err}");
                self.state.runs_status = RunsStatus::Failed(err.to_string());
            }
        }
    }

    fn settle_idle(&mut self) {
        self.state.phase = SessionPhase::Idle;
        self.state.current_run = None;
        self.state.elapsed_seconds = 0;
        self.clear_error_for(Operation::Stop);
    }

    fn require_owner(&mut self, operation: Operation) -> Option<String> {
        let owner = self.identity.current_owner_id();
        if owner.is_none() {
            self.fail(operation, RunError::NotAuthenticated);
        }
        owner
    }

    fn fail(&mut self, operation: Operation, error: RunError) {
        log_warn!("{operation:?} failed: {error}");
        self.state.error = Some(OperationError { operation, error });
    }

    fn clear_error_for(&mut self, operation: Operation) {
        if self
            .state
            .error
            .as_ref()
            .is_some_and(|err| err.operation == operation)
        {
            self.state.error = None;
        }
    }

    fn publish(&self) {
        self.publisher.send_if_modified(|published| {
            if *published == self.state {
                false
            } else {
                *published = self.state.clone();
                true
            }
        });
    }
}

async fn next_delivery(
    subscription: &mut Option<RunSubscription>,
) -> Option<StoreResult<Vec<Run>>> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
