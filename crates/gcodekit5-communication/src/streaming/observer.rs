//! The Observer Sink: a tagged event enum over an instance-owned broadcast
//! channel, replacing the callback-object-per-event-type registries and
//! process-wide event buses this codebase has used elsewhere. There is no
//! global here — each [`StreamingEngine`](super::engine::StreamingEngine)
//! owns exactly one `broadcast::Sender`.

use super::cursors::Cursors;
use crate::protocol::StatusReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// One event published by the streaming engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Send-side progress, throttled to at most one per `t_ui`.
    Progress {
        /// Lines written so far.
        sent: usize,
        /// Lines acknowledged so far.
        acknowledged: usize,
        /// Program length.
        total: usize,
        /// `acknowledged / total * 100`, saturating.
        percent: f64,
    },
    /// Execution-side progress (derived from `Ln:`), throttled likewise.
    ExecutionProgress {
        /// Highest executed line observed.
        executed: usize,
        /// Program length.
        total: usize,
        /// `executed / total * 100`, saturating.
        percent: f64,
    },
    /// A line was acknowledged `Ok`.
    LineSuccess {
        /// The line's index in the program.
        index: usize,
        /// The line's payload text.
        payload: String,
    },
    /// A line received `Error`/`Alarm`/timeout; may or may not retry.
    LineError {
        /// The line's index in the program.
        index: usize,
        /// The line's payload text.
        payload: String,
        /// Why it failed.
        reason: String,
    },
    /// The engine entered `Paused`.
    Pause {
        /// Why the engine paused.
        reason: String,
    },
    /// The engine left `Paused` back to `Running`.
    Resume,
    /// All lines have been sent and acknowledged (entering `Draining`).
    Complete {
        /// Program length.
        total: usize,
    },
    /// The controller has reported sustained idle after completion.
    ExecutionComplete {
        /// Program length.
        total: usize,
    },
    /// A status report was parsed.
    StatusUpdate(StatusReport),
    /// An unrecoverable error; the engine has transitioned to `Faulted`.
    Error {
        /// The error message.
        message: String,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress { sent, total, .. } => write!(f, "progress {sent}/{total}"),
            Self::ExecutionProgress { executed, total, .. } => {
                write!(f, "execution progress {executed}/{total}")
            }
            Self::LineSuccess { index, .. } => write!(f, "line {index} ok"),
            Self::LineError { index, reason, .. } => write!(f, "line {index} failed: {reason}"),
            Self::Pause { reason } => write!(f, "paused: {reason}"),
            Self::Resume => write!(f, "resumed"),
            Self::Complete { total } => write!(f, "send complete ({total} lines)"),
            Self::ExecutionComplete { total } => write!(f, "execution complete ({total} lines)"),
            Self::StatusUpdate(r) => write!(f, "status: {}", r.state),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

impl EngineEvent {
    pub(crate) fn progress(cursors: &Cursors) -> Self {
        Self::Progress {
            sent: cursors.sent,
            acknowledged: cursors.acknowledged,
            total: cursors.total,
            percent: cursors.percent_acknowledged(),
        }
    }

    pub(crate) fn execution_progress(cursors: &Cursors) -> Self {
        Self::ExecutionProgress {
            executed: cursors.executed,
            total: cursors.total,
            percent: cursors.percent_executed(),
        }
    }
}

/// An instance-owned fan-out point for [`EngineEvent`]s.
///
/// Delivery is best-effort: a lagging subscriber simply misses old events
/// rather than back-pressuring the engine's pump task, which must never
/// block on observer delivery.
pub struct ObserverSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl ObserverSink {
    /// Create a sink with the given broadcast buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future events. Existing history is not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers. Never blocks; returns
    /// the number of receivers it was delivered to (0 if there are none).
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ObserverSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let sink = ObserverSink::default();
        let mut rx = sink.subscribe();
        sink.publish(EngineEvent::Resume);
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Resume);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let sink = ObserverSink::default();
        assert_eq!(sink.publish(EngineEvent::Resume), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let sink = ObserverSink::default();
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();
        sink.publish(EngineEvent::Complete { total: 3 });
        assert_eq!(a.recv().await.unwrap(), EngineEvent::Complete { total: 3 });
        assert_eq!(b.recv().await.unwrap(), EngineEvent::Complete { total: 3 });
    }
}
