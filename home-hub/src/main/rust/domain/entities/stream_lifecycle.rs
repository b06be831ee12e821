use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::domain::value_objects::{StreamState, StreamStatus};

/// Number of transitions remembered per stream
const HISTORY_LIMIT: usize = 32;

/// How a decoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Killed because a stop was requested
    Requested,
    /// Exited on its own with status 0
    Clean,
    /// Exited with a nonzero status or was killed by someone else
    Failed { code: Option<i32> },
}

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: StreamState,
    pub to: StreamState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Domain entity tracking one camera stream's decoder lifecycle
#[derive(Debug)]
pub struct StreamLifecycle {
    current_state: StreamState,
    history: VecDeque<StateTransition>,
    started_at: Option<DateTime<Utc>>,
}

impl StreamLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: StreamState::Idle,
            history: VecDeque::new(),
            started_at: None,
        }
    }

    pub fn current_state(&self) -> StreamState {
        self.current_state
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            state: self.current_state,
            started_at: self.started_at,
        }
    }

    pub fn transition_count(&self) -> usize {
        self.history.len()
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.back()
    }

    pub fn transition_to_starting(&mut self) {
        self.record_transition(StreamState::Starting, None);
    }

    /// Decoder spawned; records the start timestamp
    pub fn transition_to_running(&mut self) {
        self.record_transition(StreamState::Running, None);
        self.started_at = Some(Utc::now());
    }

    pub fn transition_to_idle(&mut self, reason: Option<String>) {
        self.record_transition(StreamState::Idle, reason);
    }

    pub fn transition_to_error(&mut self, reason: Option<String>) {
        self.record_transition(StreamState::Error, reason);
    }

    /// Apply a process exit, returning the resulting state
    pub fn apply_exit(&mut self, exit: ExitKind) -> StreamState {
        match exit {
            ExitKind::Requested => self.transition_to_idle(Some("stopped".to_string())),
            ExitKind::Clean => self.transition_to_idle(Some("exited with status 0".to_string())),
            ExitKind::Failed { code } if self.current_state.is_running() => {
                self.transition_to_error(Some(format!("exited with status {:?}", code)))
            }
            ExitKind::Failed { .. } => self.transition_to_idle(None),
        }
        self.current_state
    }

    fn record_transition(&mut self, new_state: StreamState, reason: Option<String>) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        });

        self.current_state = new_state;
        if new_state != StreamState::Running {
            self.started_at = None;
        }
    }
}

impl Default for StreamLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
