//! The streaming engine: the heart of this crate.
//!
//! Owns a single background pump task that is the only mutator of the
//! active [`Program`], [`Cursors`], [`RetryState`], and [`EngineState`].
//! Every public operation is a message into that task over a command
//! channel; [`StreamingEngine::snapshot`] reads a `parking_lot::RwLock`
//! the pump task publishes after every state change, so callers never
//! need to round-trip through the task just to observe it.
//!
//! Real-time bytes (`?`, `!`, `~`, soft-reset) bypass the pump entirely and
//! are written straight to the transport, since the transport already
//! serializes concurrent writers internally.

use super::config::EngineConfig;
use super::cursors::{Cursors, RetryState};
use super::error::ControllerError;
use super::observer::{EngineEvent, ObserverSink};
use super::program::Program;
use crate::communication::Transport;
use crate::protocol::response::{self, Response};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, broadcast};

const STATUS_QUERY: u8 = b'?';
const FEED_HOLD: u8 = 0x21; // '!'
const CYCLE_START: u8 = 0x7E; // '~'
const SOFT_RESET: u8 = 0x18;

/// The engine's finite state set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No run in progress.
    Idle,
    /// Actively streaming.
    Running,
    /// Streaming suspended; outstanding line (if any) is frozen.
    Paused,
    /// All lines sent and acknowledged; waiting for the controller to go quiet.
    Draining,
    /// The controller has been idle for `t_quiesce`; the run is done.
    ExecutionComplete,
    /// A `stop()` is being applied.
    Stopping,
    /// Unrecoverable error; this run is over.
    Faulted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A read-only view of the engine's current run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Current engine state.
    pub state: EngineState,
    /// Current cursors.
    pub cursors: Cursors,
    /// Attempts made on the currently outstanding line.
    pub attempts_current_line: u32,
}

enum Command {
    Load(String, oneshot::Sender<()>),
    Start(oneshot::Sender<Result<(), ControllerError>>),
    Pause(String, oneshot::Sender<Result<(), ControllerError>>),
    Resume(oneshot::Sender<Result<(), ControllerError>>),
    Stop(oneshot::Sender<()>),
}

/// What an armed deadline is waiting for.
#[derive(Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    RespTimeout,
    RetryDelay,
    Quiesce,
}

/// The streaming engine: the public handle a consumer holds.
pub struct StreamingEngine {
    cmd_tx: mpsc::Sender<Command>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    observer: Arc<ObserverSink>,
    transport: Arc<dyn Transport>,
    _pump: tokio::task::JoinHandle<()>,
}

impl StreamingEngine {
    /// Build an engine bound to `transport`, spawning its pump task.
    pub fn new(transport: Arc<dyn Transport>, config: EngineConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let snapshot = Arc::new(RwLock::new(EngineSnapshot {
            state: EngineState::Idle,
            cursors: Cursors::default(),
            attempts_current_line: 0,
        }));
        let observer = Arc::new(ObserverSink::default());

        let pump = tokio::spawn(run_pump(
            cmd_rx,
            transport.clone(),
            observer.clone(),
            snapshot.clone(),
            config,
        ));

        Self { cmd_tx, snapshot, observer, transport, _pump: pump }
    }

    /// Replace the active program. Never fails on well-formed text.
    pub async fn load(&self, text: &str) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Load(text.to_string(), tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Begin streaming the loaded program.
    pub async fn start(&self) -> Result<(), ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start(tx))
            .await
            .map_err(|_| ControllerError::Other { message: "engine stopped".into() })?;
        rx.await.map_err(|_| ControllerError::Other { message: "engine stopped".into() })?
    }

    /// Pause the active run; injects a feed-hold real-time byte.
    pub async fn pause(&self, reason: impl Into<String>) -> Result<(), ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Pause(reason.into(), tx))
            .await
            .map_err(|_| ControllerError::Other { message: "engine stopped".into() })?;
        rx.await.map_err(|_| ControllerError::Other { message: "engine stopped".into() })?
    }

    /// Resume a paused run; injects a cycle-start real-time byte.
    pub async fn resume(&self) -> Result<(), ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Resume(tx))
            .await
            .map_err(|_| ControllerError::Other { message: "engine stopped".into() })?;
        rx.await.map_err(|_| ControllerError::Other { message: "engine stopped".into() })?
    }

    /// Abandon the active run. Idempotent.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Fire a `?` status query out-of-band.
    pub async fn status_query(&self) -> Result<(), ControllerError> {
        if !self.transport.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        let _ = self.transport.write(&[STATUS_QUERY]).await;
        Ok(())
    }

    /// Read-only snapshot of the current run.
    pub fn snapshot(&self) -> EngineSnapshot {
        *self.snapshot.read()
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.observer.subscribe()
    }
}

async fn maybe_sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d.into()),
        None => std::future::pending().await,
    }
    .await
}

struct PumpCtx {
    program: Program,
    cursors: Cursors,
    retry: RetryState,
    state: EngineState,
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    observer: Arc<ObserverSink>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    timer: Option<(Instant, TimerKind)>,
    last_progress_emit: Option<Instant>,
    last_exec_progress_emit: Option<Instant>,
    execution_complete_fired: bool,
}

impl PumpCtx {
    fn publish_snapshot(&self) {
        *self.snapshot.write() = EngineSnapshot {
            state: self.state,
            cursors: self.cursors,
            attempts_current_line: self.retry.attempts_current_line,
        };
    }

    fn emit(&self, event: EngineEvent) {
        self.observer.publish(event);
    }

    fn emit_progress_throttled(&mut self) {
        let now = Instant::now();
        let due = self
            .last_progress_emit
            .is_none_or(|t| now.duration_since(t) >= self.config.t_ui());
        if due {
            self.last_progress_emit = Some(now);
            self.emit(EngineEvent::progress(&self.cursors));
        }
    }

    /// Emit the current progress unconditionally, bypassing the throttle.
    /// Terminal events always deliver the final value (§4.4).
    fn emit_progress_forced(&mut self) {
        self.last_progress_emit = Some(Instant::now());
        self.emit(EngineEvent::progress(&self.cursors));
    }

    fn emit_execution_progress_throttled(&mut self) {
        let now = Instant::now();
        let due = self
            .last_exec_progress_emit
            .is_none_or(|t| now.duration_since(t) >= self.config.t_ui());
        if due {
            self.last_exec_progress_emit = Some(now);
            self.emit(EngineEvent::execution_progress(&self.cursors));
        }
    }

    /// Emit the current execution progress unconditionally, bypassing the
    /// throttle. Terminal events always deliver the final value (§4.4).
    fn emit_execution_progress_forced(&mut self) {
        self.last_exec_progress_emit = Some(Instant::now());
        self.emit(EngineEvent::execution_progress(&self.cursors));
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.timer = Some((Instant::now() + delay, kind));
    }

    fn disarm(&mut self) {
        self.timer = None;
    }

    async fn write_line(&self, text: &str) -> bool {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(b'\n');
        self.transport.write(&bytes).await.is_ok()
    }

    /// Toggle the controller's check (dry-run) mode via `$C`. Called once at
    /// the start of a check-mode run and once more when that run ends, so
    /// the controller is left the way it started.
    async fn toggle_check_mode(&self) {
        if self.config.check_mode {
            let _ = self.transport.write(b"$C\n").await;
        }
    }

    fn compose(&self, index: usize) -> Option<String> {
        let line = self.program.get(index)?;
        if self.config.use_line_numbers {
            let n = self.config.line_number_base + index as u64;
            Some(format!("N{n} {}", line.payload))
        } else {
            Some(line.payload.clone())
        }
    }

    /// Send the line at `cursors.sent`, if the lock-step invariant allows it.
    async fn pump_next(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        if self.cursors.sent != self.cursors.acknowledged {
            return; // one line already outstanding
        }
        if self.cursors.sent >= self.cursors.total {
            return;
        }
        self.send_current().await;
    }

    /// Send the next untransmitted line (`cursors.sent`) and advance past it.
    /// Only valid when no line is currently outstanding, i.e.
    /// `sent == acknowledged`.
    async fn send_current(&mut self) {
        let index = self.cursors.sent;
        let Some(text) = self.compose(index) else { return };
        if self.write_line(&text).await {
            self.cursors.sent = index + 1;
            self.arm(TimerKind::RespTimeout, self.config.t_resp());
        } else {
            self.fail_write(index).await;
        }
    }

    /// Retransmit the line that is still outstanding after an `Error`/
    /// timeout. That line is `cursors.acknowledged`, not `cursors.sent`
    /// (which already points one past it, at the next never-yet-sent line).
    /// Neither cursor moves.
    async fn retransmit_outstanding(&mut self) {
        let index = self.cursors.acknowledged;
        let Some(text) = self.compose(index) else { return };
        if self.write_line(&text).await {
            self.arm(TimerKind::RespTimeout, self.config.t_resp());
        } else {
            self.fail_write(index).await;
        }
    }

    async fn fail_write(&mut self, index: usize) {
        let payload = self.program.get(index).map(|l| l.payload.clone()).unwrap_or_default();
        self.emit(EngineEvent::LineError {
            index,
            payload,
            reason: "write failed".to_string(),
        });
        self.transition(EngineState::Paused);
        self.emit(EngineEvent::Pause { reason: "write failed".to_string() });
    }

    fn transition(&mut self, state: EngineState) {
        self.state = state;
        self.publish_snapshot();
    }

    async fn handle_ok(&mut self) {
        if self.cursors.acknowledged >= self.cursors.sent {
            return; // stray Ok, nothing outstanding
        }
        let index = self.cursors.acknowledged;
        self.retry.reset();
        self.cursors.acknowledged += 1;
        self.disarm();
        let payload = self.program.get(index).map(|l| l.payload.clone()).unwrap_or_default();
        self.emit(EngineEvent::LineSuccess { index, payload });
        self.emit_progress_throttled();

        if self.cursors.acknowledged == self.cursors.total {
            // Completion is a property of the cursors, not of whether the
            // pump happens to be paused: a late `Ok` that completes the
            // program while `Paused` still drains into `Complete`.
            if matches!(self.state, EngineState::Running | EngineState::Paused) {
                self.emit_progress_forced();
                self.transition(EngineState::Draining);
                self.emit(EngineEvent::Complete { total: self.cursors.total });
            }
            return;
        }

        if self.state == EngineState::Running {
            self.pump_next().await;
        }
    }

    async fn handle_failure(&mut self, reason: String) {
        if self.cursors.acknowledged >= self.cursors.sent {
            return; // nothing outstanding to fail
        }
        let index = self.cursors.acknowledged;
        let payload = self.program.get(index).map(|l| l.payload.clone()).unwrap_or_default();
        self.emit(EngineEvent::LineError { index, payload, reason: reason.clone() });

        if self.retry.record_attempt(self.config.max_retries) {
            self.arm(TimerKind::RetryDelay, self.config.t_retry());
        } else {
            self.disarm();
            self.transition(EngineState::Paused);
            self.emit(EngineEvent::Pause { reason: format!("max retries exceeded: {reason}") });
        }
    }

    async fn handle_alarm(&mut self, message: String) {
        self.disarm();
        self.transition(EngineState::Paused);
        self.emit(EngineEvent::Pause { reason: message });
    }

    async fn handle_status(&mut self, report: crate::protocol::StatusReport) {
        if let Some(ln) = report.executed_line {
            let before = self.cursors.executed;
            self.cursors.observe_executed_line(ln, self.config.line_number_base);
            if self.cursors.executed != before {
                self.emit_execution_progress_throttled();
            }
        }

        if self.state == EngineState::Draining {
            if report.state.eq_ignore_ascii_case("idle") {
                if !matches!(self.timer, Some((_, TimerKind::Quiesce))) {
                    self.arm(TimerKind::Quiesce, self.config.t_quiesce());
                }
            } else {
                self.disarm();
            }
        }

        self.publish_snapshot();
        self.emit(EngineEvent::StatusUpdate(report));
    }

    async fn handle_timer_fire(&mut self) {
        let Some((_, kind)) = self.timer.take() else { return };
        match kind {
            TimerKind::RespTimeout => {
                self.handle_failure("response timeout".to_string()).await;
            }
            TimerKind::RetryDelay => {
                self.retransmit_outstanding().await;
            }
            TimerKind::Quiesce => {
                if self.state == EngineState::Draining && !self.execution_complete_fired {
                    self.execution_complete_fired = true;
                    self.emit_execution_progress_forced();
                    self.toggle_check_mode().await;
                    self.transition(EngineState::ExecutionComplete);
                    self.emit(EngineEvent::ExecutionComplete { total: self.cursors.total });
                    self.transition(EngineState::Idle);
                }
            }
        }
    }

    async fn handle_response(&mut self, response: Response) {
        match response {
            Response::Ok => self.handle_ok().await,
            Response::Error { text, .. } => self.handle_failure(text).await,
            Response::Alarm { text, .. } => self.handle_alarm(text).await,
            Response::Status(report) => self.handle_status(report).await,
            Response::Welcome { text } => {
                if self.state == EngineState::Running || self.state == EngineState::Paused {
                    self.disarm();
                    self.transition(EngineState::Faulted);
                    self.emit(EngineEvent::Error {
                        message: format!("unexpected controller reset: {text}"),
                    });
                }
                // A welcome banner before `start` is consumed and ignored.
            }
            Response::Other(text) => {
                tracing::debug!(%text, "unclassified controller message");
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Load(text, reply) => {
                self.program = Program::load(&text);
                self.cursors = Cursors::reset(self.program.total());
                self.retry = RetryState::default();
                self.disarm();
                self.execution_complete_fired = false;
                if self.state != EngineState::Faulted {
                    self.transition(EngineState::Idle);
                }
                let _ = reply.send(());
            }
            Command::Start(reply) => {
                let result = if self.state != EngineState::Idle {
                    Err(ControllerError::Busy)
                } else if self.program.is_empty() {
                    Err(ControllerError::Empty)
                } else if !self.transport.is_connected() {
                    Err(ControllerError::NotConnected)
                } else {
                    self.cursors = Cursors::reset(self.program.total());
                    self.retry = RetryState::default();
                    self.execution_complete_fired = false;
                    self.toggle_check_mode().await;
                    self.transition(EngineState::Running);
                    self.pump_next().await;
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Pause(reason, reply) => {
                let result = if self.state != EngineState::Running {
                    Err(ControllerError::WrongState { current: self.state, op: "pause" })
                } else {
                    let _ = self.transport.write(&[FEED_HOLD]).await;
                    self.transition(EngineState::Paused);
                    self.emit(EngineEvent::Pause { reason });
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Resume(reply) => {
                let result = if self.state != EngineState::Paused {
                    Err(ControllerError::WrongState { current: self.state, op: "resume" })
                } else {
                    let _ = self.transport.write(&[CYCLE_START]).await;
                    self.retry.reset();
                    self.transition(EngineState::Running);
                    self.emit(EngineEvent::Resume);
                    if self.cursors.sent == self.cursors.acknowledged {
                        self.pump_next().await;
                    } else {
                        self.arm(TimerKind::RespTimeout, self.config.t_resp());
                    }
                    Ok(())
                };
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                if !matches!(self.state, EngineState::Idle) {
                    if !self.execution_complete_fired {
                        self.toggle_check_mode().await;
                    }
                    let _ = self.transport.write(&[FEED_HOLD]).await;
                    let _ = self.transport.write(&[SOFT_RESET]).await;
                    self.disarm();
                    self.program = Program::default();
                    self.cursors = Cursors::default();
                    self.retry = RetryState::default();
                    self.transition(EngineState::Idle);
                }
                let _ = reply.send(());
            }
        }
    }
}

async fn run_pump(
    mut cmd_rx: mpsc::Receiver<Command>,
    transport: Arc<dyn Transport>,
    observer: Arc<ObserverSink>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    config: EngineConfig,
) {
    let mut ctx = PumpCtx {
        program: Program::default(),
        cursors: Cursors::default(),
        retry: RetryState::default(),
        state: EngineState::Idle,
        config,
        transport,
        observer,
        snapshot,
        timer: None,
        last_progress_emit: None,
        last_exec_progress_emit: None,
        execution_complete_fired: false,
    };

    loop {
        if ctx.state == EngineState::Faulted {
            // keep draining commands so pending callers don't hang, but stop touching the wire
        }

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => ctx.handle_command(cmd).await,
                    None => break,
                }
            }
            line = ctx.transport.recv_line() => {
                match line {
                    Ok(Some(raw)) => {
                        let response = response::parse(&raw);
                        ctx.handle_response(response).await;
                    }
                    Ok(None) => {
                        if ctx.state != EngineState::Idle && ctx.state != EngineState::Faulted {
                            ctx.disarm();
                            ctx.transition(EngineState::Faulted);
                            ctx.emit(EngineEvent::Error { message: "transport closed".to_string() });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "transport read error");
                    }
                }
            }
            _ = maybe_sleep_until(ctx.timer.map(|(d, _)| d)) => {
                ctx.handle_timer_fire().await;
            }
        }
    }
}
