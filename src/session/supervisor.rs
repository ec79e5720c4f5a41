//! Stream supervisor
//!
//! Owns one media process at a time and keeps relaunching it after every exit
//! until told to stop. The run loop is the only writer of the session status;
//! `stop` reaches it through a cancellation token, which also interrupts the
//! wait on a running process and the cooldown sleep.
//!
//! ```text
//!   Idle ──▶ Starting ──▶ Running ──▶ (exit) ──▶ Idle ──cooldown──▶ Starting ...
//!               │            │
//!               │            └──stop──▶ Stopping ──▶ Stopped
//!               └──executable missing──▶ Failed
//! ```

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::error::{Error, SessionError};
use crate::session::command::CommandBuilder;
use crate::session::outcome::ExitOutcome;
use crate::session::process::MediaProcess;
use crate::session::state::{SessionEvent, SessionState, SessionStatus};

const EVENT_CAPACITY: usize = 64;

/// Result of a `start` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session is already running; nothing was launched
    AlreadyActive,
}

/// Supervises the media process for one role (sender or receiver)
pub struct StreamSupervisor<B: CommandBuilder> {
    builder: Arc<B>,
    settings: SupervisorConfig,
    status: Arc<RwLock<SessionStatus>>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<B: CommandBuilder> StreamSupervisor<B> {
    pub fn new(builder: B, settings: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            builder: Arc::new(builder),
            settings,
            status: Arc::new(RwLock::new(SessionStatus::default())),
            events,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Start a session with `config`.
    ///
    /// Invalid configs are rejected before anything is launched. Calling this
    /// while a session is active does nothing and reports `AlreadyActive`.
    pub fn start(&mut self, config: B::Config) -> Result<StartOutcome, Error> {
        if self.is_active() {
            tracing::warn!("Session already active, ignoring start");
            return Ok(StartOutcome::AlreadyActive);
        }

        self.builder.validate(&config)?;

        self.cancel = CancellationToken::new();
        let ctx = LoopContext {
            builder: self.builder.clone(),
            settings: self.settings.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        };

        // Leave Failed/Stopped before returning so a second start sees this run
        ctx.update(|status| {
            status.attempt = 0;
            status.last_outcome = None;
            status.last_error = None;
        });
        ctx.transition(SessionState::Idle);

        self.task = Some(tokio::spawn(run_loop(ctx, config)));
        Ok(StartOutcome::Started)
    }

    /// Request the session to stop. Idempotent; does nothing when idle.
    pub fn stop(&self) {
        if self.is_active() && !self.cancel.is_cancelled() {
            tracing::info!("Stop requested");
        }
        self.cancel.cancel();
    }

    /// Stop and wait until the loop has exited and the process is gone
    pub async fn shutdown(&mut self) {
        self.stop();
        self.join().await;
    }

    /// Wait for the run loop to finish, e.g. after a fatal launch failure.
    /// Cancel-safe: dropping this future leaves the loop attached.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                tracing::error!("Supervisor loop ended abnormally: {}", e);
            }
            self.task = None;
        }
    }

    /// Whether a run loop is currently alive. A loop that has already
    /// recorded `Failed` or `Stopped` is only unwinding and does not count.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
            && !self.status.read().state.is_terminal()
    }

    pub fn state(&self) -> SessionState {
        self.status.read().state
    }

    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl<B: CommandBuilder> Drop for StreamSupervisor<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything the run loop needs, shared with the supervisor handle
struct LoopContext<B: CommandBuilder> {
    builder: Arc<B>,
    settings: SupervisorConfig,
    status: Arc<RwLock<SessionStatus>>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl<B: CommandBuilder> Clone for LoopContext<B> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            settings: self.settings.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<B: CommandBuilder> LoopContext<B> {
    fn transition(&self, state: SessionState) {
        {
            let mut status = self.status.write();
            if status.state == state {
                return;
            }
            status.state = state;
            status.since = Utc::now();
            if !state.is_active() {
                status.pid = None;
            }
        }
        tracing::debug!("Session state -> {}", state);
        self.emit(SessionEvent::StateChanged(state));
    }

    fn update(&self, f: impl FnOnce(&mut SessionStatus)) {
        f(&mut self.status.write());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// How a single attempt ended
enum AttemptEnd {
    Exited(ExitOutcome),
    Stopped,
}

async fn run_loop<B: CommandBuilder>(ctx: LoopContext<B>, config: B::Config) {
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        // Each attempt runs as its own task so a panic is contained to it
        let attempt = tokio::spawn(run_attempt(ctx.clone(), config.clone())).await;
        let result = match attempt {
            Ok(result) => result,
            Err(join_error) => Err(SessionError::Internal(join_error.to_string())),
        };

        let cooldown = match result {
            Ok(AttemptEnd::Stopped) => break,
            Ok(AttemptEnd::Exited(outcome)) => {
                report_exit(&outcome);
                ctx.update(|status| status.last_outcome = Some(outcome.clone()));
                ctx.emit(SessionEvent::Exited(outcome));
                ctx.transition(SessionState::Idle);
                ctx.settings.cooldown()
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("{}. Fix the executable and start the session again.", e);
                ctx.update(|status| status.last_error = Some(e.to_string()));
                ctx.emit(SessionEvent::LaunchFailed(e.to_string()));
                ctx.transition(SessionState::Failed);
                return;
            }
            Err(e) => {
                tracing::error!("Session attempt failed: {}", e);
                ctx.update(|status| status.last_error = Some(e.to_string()));
                ctx.emit(SessionEvent::AttemptFailed(e.to_string()));
                ctx.transition(SessionState::Idle);
                ctx.settings.error_cooldown()
            }
        };

        if !cooldown_or_cancel(&ctx.cancel, cooldown).await {
            break;
        }
    }

    ctx.transition(SessionState::Stopped);
    tracing::info!("Session stopped");
}

async fn run_attempt<B: CommandBuilder>(
    ctx: LoopContext<B>,
    config: B::Config,
) -> Result<AttemptEnd, SessionError> {
    ctx.transition(SessionState::Starting);
    let attempt = {
        let mut status = ctx.status.write();
        status.attempt += 1;
        status.attempt
    };

    let command = ctx.builder.build(&config);
    tracing::info!("Launching attempt {}: {}", attempt, command);

    let mut process = MediaProcess::spawn(&command)?;
    let pid = process.pid();
    ctx.update(|status| status.pid = pid);
    ctx.transition(SessionState::Running);
    ctx.emit(SessionEvent::Launched { attempt, pid });

    let exited = tokio::select! {
        status = process.wait() => Some(status),
        _ = ctx.cancel.cancelled() => None,
    };

    match exited {
        Some(status) => {
            let status = status?;
            let diagnostic = process.diagnostics().await;
            Ok(AttemptEnd::Exited(ExitOutcome::classify(status.code(), &diagnostic)))
        }
        None => {
            ctx.transition(SessionState::Stopping);
            let status = process.terminate(ctx.settings.stop_grace()).await?;
            tracing::info!("Media process exited after stop ({})", status);
            Ok(AttemptEnd::Stopped)
        }
    }
}

/// Sleep for `cooldown`. Returns false if cancelled first.
async fn cooldown_or_cancel(cancel: &CancellationToken, cooldown: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(cooldown) => true,
    }
}

fn report_exit(outcome: &ExitOutcome) {
    match outcome {
        ExitOutcome::Clean => tracing::info!("Stream ended normally"),
        ExitOutcome::Failed {
            diagnostic, cause, ..
        } => {
            tracing::warn!("Stream {}", outcome);
            if !diagnostic.is_empty() {
                tracing::debug!(?cause, "Media process output:\n{}", diagnostic);
            }
        }
    }
}
