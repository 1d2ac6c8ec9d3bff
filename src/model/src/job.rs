//! `Job`, `JobRequest`, `PendingChange`, `AllocationHistory` (spec.md §3).

use serde::{Deserialize, Serialize};

use crate::ids::{BoardId, JobId, MachineId};

/// spec.md §3: `QUEUED→POWER→READY→DESTROYED`, terminal at `DESTROYED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Unknown,
    Queued,
    Power,
    Ready,
    Destroyed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Destroyed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: String,
    pub group: String,
    pub machine: MachineId,
    pub job_state: JobState,
    pub keepalive_interval_secs: i64,
    pub keepalive_timestamp: i64,
    /// Set iff `job_state >= POWER`.
    pub allocation_size: Option<u32>,
    pub allocation_timestamp: Option<i64>,
    pub death_timestamp: Option<i64>,
    pub death_reason: Option<String>,
    pub original_request: Vec<u8>,
    pub num_pending: u32,
    pub accounted_for: bool,
}

impl Job {
    /// Enforces spec.md §3's state-transition invariants. Returns `Err` and
    /// leaves `self` unchanged if the transition is illegal.
    pub fn transition(&mut self, to: JobState, now: i64) -> Result<(), String> {
        if self.job_state.is_terminal() {
            return Err("job is already DESTROYED; no further transitions allowed".into());
        }

        match (self.job_state, to) {
            (JobState::Unknown, JobState::Queued)
            | (JobState::Queued, JobState::Power)
            | (JobState::Power, JobState::Ready)
            | (JobState::Queued, JobState::Destroyed)
            | (JobState::Power, JobState::Destroyed)
            | (JobState::Ready, JobState::Destroyed)
            | (JobState::Unknown, JobState::Destroyed) => {},
            (from, to) if from == to => {},
            (from, to) => return Err(format!("illegal job transition {from:?} -> {to:?}")),
        }

        if to == JobState::Power && self.allocation_size.is_none() {
            return Err("cannot enter POWER without an allocation_size".into());
        }

        if to == JobState::Destroyed {
            self.death_timestamp = Some(now.max(self.allocation_timestamp.unwrap_or(now)));
        }

        self.job_state = to;
        Ok(())
    }

    pub fn keepalive_expired(&self, now: i64) -> bool {
        !self.job_state.is_terminal()
            && now - self.keepalive_timestamp > self.keepalive_interval_secs
    }
}

/// One of the three allocation strategies a caller can ask for (spec.md
/// §3). `importance`/`priority` order competing requests; they do not
/// change which boards get picked, only request ordering (spec.md §2's
/// "priorities are a simple importance order" Non-goal on full scheduling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobRequest {
    ByCount {
        num_boards: u32,
        max_dead: u32,
        importance: i32,
        priority: i32,
    },
    ByRectangle {
        width: u32,
        height: u32,
        max_dead: u32,
        importance: i32,
        priority: i32,
    },
    BySpecificBoard {
        board: BoardId,
        importance: i32,
        priority: i32,
    },
}

impl JobRequest {
    pub fn importance(&self) -> i32 {
        match self {
            JobRequest::ByCount { importance, .. }
            | JobRequest::ByRectangle { importance, .. }
            | JobRequest::BySpecificBoard { importance, .. } => *importance,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            JobRequest::ByCount { priority, .. }
            | JobRequest::ByRectangle { priority, .. }
            | JobRequest::BySpecificBoard { priority, .. } => *priority,
        }
    }
}

/// Ties `(job, board)` to a desired power/link state (spec.md §3); unique
/// per board. `power_on` doubles as the "to_state typically READY" target
/// once every pending change for the job has drained (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub job: JobId,
    pub board: BoardId,
    pub power_on: bool,
    /// One bit per [`spalloc_topology::Direction`], in `Direction::ALL`
    /// order: `true` means that FPGA link should be powered.
    pub link_enable: [bool; 6],
    pub to_state: JobState,
}

/// Append-only record of every fresh allocation (spec.md §3). Quota spend
/// is derived, not stored: `allocation_size * max(0, death_timestamp -
/// allocation_timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationHistoryEntry {
    pub job: JobId,
    pub board: BoardId,
    pub timestamp: i64,
}

/// One row of the job-usage view named in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUsageRow {
    pub machine_id: MachineId,
    pub job_id: JobId,
    pub owner: String,
    pub group_id: String,
    pub quota: Option<u64>,
    pub size: u32,
    pub start: i64,
    pub finish: Option<i64>,
    pub duration: Option<i64>,
    pub quota_used: u64,
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_job() -> Job {
        Job {
            id: JobId::new(1),
            owner: "alice".into(),
            group: "g".into(),
            machine: MachineId::new(0),
            job_state: JobState::Unknown,
            keepalive_interval_secs: 10,
            keepalive_timestamp: 0,
            allocation_size: None,
            allocation_timestamp: None,
            death_timestamp: None,
            death_reason: None,
            original_request: vec![],
            num_pending: 0,
            accounted_for: false,
        }
    }

    #[test]
    fn destroyed_is_terminal() {
        let mut job = fresh_job();
        job.transition(JobState::Queued, 0).unwrap();
        job.transition(JobState::Destroyed, 5).unwrap();
        assert!(job.transition(JobState::Queued, 6).is_err());
        assert_eq!(job.job_state, JobState::Destroyed);
    }

    #[test]
    fn power_requires_allocation_size() {
        let mut job = fresh_job();
        job.transition(JobState::Queued, 0).unwrap();
        assert!(job.transition(JobState::Power, 1).is_err());
        job.allocation_size = Some(3);
        job.transition(JobState::Power, 1).unwrap();
    }

    #[test]
    fn keepalive_zero_expires_immediately() {
        let mut job = fresh_job();
        job.keepalive_interval_secs = 0;
        job.transition(JobState::Queued, 0).unwrap();
        assert!(job.keepalive_expired(1));
    }
}
