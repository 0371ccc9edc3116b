use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::pipeline::TransformStep;
use crate::session::focus::FocusMode;
use crate::session::settings::SettingsSnapshot;

const EVENT_CAPACITY: usize = 64;

/// Observer notification. Serialized as `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    SettingsChanged {
        index: usize,
        snapshot: SettingsSnapshot,
    },
    QueueChanged {
        pending_count: usize,
        summary: String,
    },
    ModeChanged {
        previous: FocusMode,
        current: FocusMode,
    },
    MaskChanged {
        present: bool,
    },
    CommitStarted {
        ticket: u64,
        steps: Vec<TransformStep>,
    },
    StepCompleted {
        ticket: u64,
        step: TransformStep,
        elapsed_ms: u64,
    },
    CommitSucceeded {
        ticket: u64,
        steps: Vec<TransformStep>,
    },
    CommitFailed {
        ticket: u64,
        step: TransformStep,
        code: String,
        message: String,
    },
    CommitCanceled {
        ticket: u64,
        completed_steps: usize,
    },
    AnalysisStarted,
    AnalysisCompleted {
        recommendations: usize,
    },
    AnalysisFailed {
        message: String,
    },
    SourceChanged {
        identity: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnvelope {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Fan-out to subscribers. Sending with nobody listening is not an error.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    session_id: Uuid,
    sender: broadcast::Sender<SessionEnvelope>,
}

impl EventEmitter {
    pub fn new(session_id: Uuid) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { session_id, sender }
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(SessionEnvelope {
            session_id: self.session_id,
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnvelope> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_as_type_and_payload() {
        let value = serde_json::to_value(SessionEvent::QueueChanged {
            pending_count: 2,
            summary: String::from("Colorize Photo"),
        })
        .expect("event json");
        assert_eq!(value["type"], "queue_changed");
        assert_eq!(value["payload"]["pending_count"], 2);

        let bare = serde_json::to_value(SessionEvent::AnalysisStarted).expect("unit event");
        assert_eq!(bare["type"], "analysis_started");
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let emitter = EventEmitter::new(Uuid::new_v4());
        let mut rx = emitter.subscribe();
        emitter.emit(SessionEvent::MaskChanged { present: true });
        let received = rx.recv().await.expect("event");
        assert_eq!(received.event, SessionEvent::MaskChanged { present: true });
    }

    #[test]
    fn emitting_without_subscribers_is_silent() {
        let emitter = EventEmitter::new(Uuid::new_v4());
        emitter.emit(SessionEvent::AnalysisStarted);
    }
}
