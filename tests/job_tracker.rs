use pdf2img::state::{JobState, JobTracker, TerminalEvent};

const EVENTS: [TerminalEvent; 6] = [
    TerminalEvent::Done,
    TerminalEvent::ErrorMessage,
    TerminalEvent::WorkerExit,
    TerminalEvent::StorageFailure,
    TerminalEvent::ProtocolViolation,
    TerminalEvent::Timeout,
];

#[test]
fn walks_the_happy_path() {
    let mut t = JobTracker::new();
    assert_eq!(t.state(), JobState::Pending);
    t.message_received();
    assert_eq!(t.state(), JobState::Pending);
    t.dispatched();
    assert_eq!(t.state(), JobState::Dispatched);
    t.message_received();
    assert_eq!(t.state(), JobState::Receiving);
    assert!(t.resolve(TerminalEvent::Done));
    assert_eq!(t.state(), JobState::Completed);
}

#[test]
fn first_terminal_event_wins_in_every_order() {
    for first in EVENTS {
        for second in EVENTS {
            for third in EVENTS {
                let mut t = JobTracker::new();
                t.dispatched();
                let wins: Vec<bool> = [first, second, third]
                    .into_iter()
                    .map(|e| t.resolve(e))
                    .collect();
                assert_eq!(wins, vec![true, false, false]);
                assert_eq!(t.resolved_by(), Some(first));
                assert_eq!(t.state(), first.target());
                assert_eq!(t.ignored(), &[second, third]);
            }
        }
    }
}

#[test]
fn terminal_state_is_sticky() {
    let mut t = JobTracker::new();
    t.dispatched();
    assert!(t.resolve(TerminalEvent::Timeout));
    t.message_received();
    t.dispatched();
    assert_eq!(t.state(), JobState::TimedOut);
    assert!(!t.resolve(TerminalEvent::Done));
    assert_eq!(t.state(), JobState::TimedOut);
}

#[test]
fn exit_and_error_are_failures_timeout_is_distinct() {
    assert_eq!(TerminalEvent::WorkerExit.target(), JobState::Failed);
    assert_eq!(TerminalEvent::ErrorMessage.target(), JobState::Failed);
    assert_eq!(TerminalEvent::Timeout.target(), JobState::TimedOut);
    assert_eq!(TerminalEvent::Done.target(), JobState::Completed);
}
