//! Job state machine states

use core::fmt;

/// State of a scheduled job
///
/// ```text
///  (created) -> Waiting
///  Waiting  --[event]--------------------> Running
///  Running  --[event]--------------------> Cycling
///  Cycling  --[dispatch returned]--------> Running (re-enqueued)
///  Running  --[dispatch returned]--------> Waiting
///  Running  --[closed / one-shot / cancel]> Purged
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Idle, waiting for readiness or for its deadline
    Waiting = 0,

    /// Owned by exactly one worker, dispatch in progress
    Running = 1,

    /// Running, and another event arrived meanwhile; re-runs on return
    Cycling = 2,

    /// Terminal. Never scheduled again
    Purged = 3,
}

impl JobState {
    /// Whether a readiness event may move this job to Running
    #[inline]
    pub const fn is_schedulable(&self) -> bool {
        matches!(self, JobState::Waiting)
    }

    /// Whether a worker currently owns the job
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, JobState::Running | JobState::Cycling)
    }

    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobState::Purged)
    }
}

impl From<u8> for JobState {
    fn from(v: u8) -> Self {
        match v {
            0 => JobState::Waiting,
            1 => JobState::Running,
            2 => JobState::Cycling,
            _ => JobState::Purged,
        }
    }
}

impl From<JobState> for u8 {
    fn from(state: JobState) -> u8 {
        state as u8
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "WAITING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Cycling => write!(f, "CYCLING"),
            JobState::Purged => write!(f, "PURGED"),
        }
    }
}
