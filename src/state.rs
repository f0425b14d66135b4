use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Dispatched,
    Receiving,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut
        )
    }
}

/// Signals that can end a dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEvent {
    Done,
    ErrorMessage,
    WorkerExit,
    StorageFailure,
    ProtocolViolation,
    Timeout,
}

impl TerminalEvent {
    pub fn target(&self) -> JobState {
        match self {
            TerminalEvent::Done => JobState::Completed,
            TerminalEvent::Timeout => JobState::TimedOut,
            TerminalEvent::ErrorMessage
            | TerminalEvent::WorkerExit
            | TerminalEvent::StorageFailure
            | TerminalEvent::ProtocolViolation => JobState::Failed,
        }
    }
}

/// Per-job state machine. The first terminal event wins; every later one
/// is ignored.
#[derive(Debug)]
pub struct JobTracker {
    state: JobState,
    resolved_by: Option<TerminalEvent>,
    ignored: Vec<TerminalEvent>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            state: JobState::Pending,
            resolved_by: None,
            ignored: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn resolved_by(&self) -> Option<TerminalEvent> {
        self.resolved_by
    }

    pub fn ignored(&self) -> &[TerminalEvent] {
        &self.ignored
    }

    pub fn dispatched(&mut self) {
        if self.state == JobState::Pending {
            self.state = JobState::Dispatched;
        }
    }

    pub fn message_received(&mut self) {
        if self.state == JobState::Dispatched {
            self.state = JobState::Receiving;
        }
    }

    /// Applies a terminal event. Returns true only for the event that
    /// resolved the job.
    pub fn resolve(&mut self, event: TerminalEvent) -> bool {
        if self.state.is_terminal() {
            debug!(
                "ignoring {:?}; job already {:?} by {:?}",
                event, self.state, self.resolved_by
            );
            self.ignored.push(event);
            return false;
        }
        self.state = event.target();
        self.resolved_by = Some(event);
        true
    }
}
