//! `ChangeApplier`: drains `pending_changes` per machine (spec.md §4.5).

use std::time::Duration;

use spalloc_core::{BmpError, Result};
use spalloc_model::{Board, Job, JobState, MachineSnapshot, PendingChange, PersistentStore};

/// External collaborator seam for actually toggling board power and FPGA
/// links. Out of scope to implement against real BMP hardware (spec.md §2);
/// this crate only needs the contract.
pub trait BmpDriver: Send + Sync {
    fn apply(&self, change: &PendingChange) -> Result<(), BmpError>;
}

/// Bounded exponential backoff before a job is destroyed for a persistently
/// failing `BmpDriver` (spec.md §4.5's retry rule).
pub struct RetryPolicy {
    pub limit: u32,
    pub base_delay_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { limit: 3, base_delay_secs: 1 }
    }
}

impl RetryPolicy {
    pub fn backoff_secs(&self, attempt: u32) -> i64 {
        self.base_delay_secs * (1i64 << attempt.min(16))
    }
}

pub struct ChangeApplier<'a> {
    store: &'a dyn PersistentStore,
    bmp: &'a dyn BmpDriver,
    retry: RetryPolicy,
    on_delay_secs: i64,
    off_delay_secs: i64,
}

impl<'a> ChangeApplier<'a> {
    pub fn new(store: &'a dyn PersistentStore, bmp: &'a dyn BmpDriver, on_delay_secs: i64, off_delay_secs: i64) -> Self {
        Self { store, bmp, retry: RetryPolicy::default(), on_delay_secs, off_delay_secs }
    }

    /// One drain pass over every pending change in `snapshot`'s machine.
    /// Applies every change whose job has no busy boards, retrying
    /// transient `BmpError`s up to `self.retry.limit` times before
    /// destroying the job with the failure as `death_reason`.
    pub fn drain(&self, snapshot: &MachineSnapshot, now: i64) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let changes = self.store.pending_changes(snapshot.machine.id)?;

        let mut by_job: std::collections::BTreeMap<_, Vec<PendingChange>> = Default::default();
        for change in changes {
            by_job.entry(change.job).or_default().push(change);
        }

        for (job_id, job_changes) in by_job {
            let Some(mut job) = self.store.load_job(job_id)? else { continue };
            if job_changes.iter().any(|c| board_busy(snapshot, c.board, now, self.on_delay_secs, self.off_delay_secs)) {
                report.deferred += job_changes.len();
                continue;
            }

            let mut remaining = Vec::new();
            for change in job_changes {
                match self.apply_with_retry(&change) {
                    Ok(()) => {
                        job.num_pending = job.num_pending.saturating_sub(1);
                        report.applied += 1;
                    },
                    Err(reason) => {
                        job.transition(JobState::Destroyed, now).ok();
                        job.death_reason = Some(reason);
                        self.store.save_job(job.clone())?;
                        self.store.save_pending_changes(job_id, Vec::new())?;
                        report.failed_jobs.push(job_id);
                        break;
                    },
                }
            }

            if job.job_state != JobState::Destroyed {
                self.store.save_pending_changes(job_id, remaining)?;
                if job.num_pending == 0 {
                    let target = job_changes_target(&job);
                    job.transition(target, now).ok();
                }
                self.store.save_job(job)?;
            }
        }

        Ok(report)
    }

    fn apply_with_retry(&self, change: &PendingChange) -> std::result::Result<(), String> {
        let mut attempt = 0;
        loop {
            match self.bmp.apply(change) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.retry.limit => {
                    attempt += 1;
                    let backoff = self.retry.backoff_secs(attempt);
                    tracing::warn!(attempt, backoff, board = %change.board, "bmp apply failed, retrying");
                    std::thread::sleep(Duration::from_secs(backoff.max(0) as u64));
                },
                Err(err) => return Err(err.to_string()),
            }
        }
    }
}

fn board_busy(snapshot: &MachineSnapshot, board: spalloc_model::BoardId, now: i64, on_delay: i64, off_delay: i64) -> bool {
    snapshot.boards.iter().find(|b| b.id == board).is_some_and(|b| b.is_busy(now, on_delay, off_delay))
}

fn job_changes_target(job: &Job) -> JobState {
    if job.job_state == JobState::Queued {
        JobState::Power
    } else {
        JobState::Ready
    }
}

#[derive(Debug, Default)]
pub struct DrainReport {
    pub applied: usize,
    pub deferred: usize,
    pub failed_jobs: Vec<spalloc_model::JobId>,
}

/// An always-succeeding `BmpDriver`, useful for tests and for running the
/// change applier against [`spalloc_model::InMemoryStore`] without real
/// hardware.
pub struct NoopBmpDriver;

impl BmpDriver for NoopBmpDriver {
    fn apply(&self, _change: &PendingChange) -> Result<(), BmpError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spalloc_model::{
        BoardId, Functioning, InMemoryStore, JobId, Machine, MachineId,
    };

    fn snapshot_with(board_busy: bool) -> MachineSnapshot {
        MachineSnapshot {
            machine: Machine {
                id: MachineId::new(0),
                name: "m".into(),
                width: 1,
                height: 1,
                depth: 1,
                board_model: 3,
                default_quota: None,
                in_service: true,
            },
            boards: vec![Board {
                id: BoardId::new(0),
                machine: MachineId::new(0),
                x: 0,
                y: 0,
                z: 0,
                root_x: 0,
                root_y: 0,
                bmp_address: None,
                board_num: Some(0),
                allocated_job: Some(JobId::new(1)),
                functioning: Functioning::Working,
                power_off_timestamp: None,
                power_on_timestamp: if board_busy { Some(100) } else { None },
                blacklist: vec![],
            }],
            links: vec![],
        }
    }

    fn queued_job() -> Job {
        Job {
            id: JobId::new(1),
            owner: "alice".into(),
            group: "g".into(),
            machine: MachineId::new(0),
            job_state: JobState::Queued,
            keepalive_interval_secs: 60,
            keepalive_timestamp: 0,
            allocation_size: Some(1),
            allocation_timestamp: Some(0),
            death_timestamp: None,
            death_reason: None,
            original_request: vec![],
            num_pending: 1,
            accounted_for: false,
        }
    }

    fn one_change() -> PendingChange {
        PendingChange {
            job: JobId::new(1),
            board: BoardId::new(0),
            power_on: true,
            link_enable: [false; 6],
            to_state: JobState::Power,
        }
    }

    #[test]
    fn busy_board_defers_its_whole_job() {
        let store = InMemoryStore::new();
        store.save_job(queued_job()).unwrap();
        store.save_pending_changes(JobId::new(1), vec![one_change()]).unwrap();
        let bmp = NoopBmpDriver;
        let applier = ChangeApplier::new(&store, &bmp, 20, 30);

        let snapshot = snapshot_with(true);
        let report = applier.drain(&snapshot, 101).unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn idle_board_applies_and_advances_job_to_power() {
        let store = InMemoryStore::new();
        store.save_job(queued_job()).unwrap();
        store.save_pending_changes(JobId::new(1), vec![one_change()]).unwrap();
        let bmp = NoopBmpDriver;
        let applier = ChangeApplier::new(&store, &bmp, 20, 30);

        let snapshot = snapshot_with(false);
        let report = applier.drain(&snapshot, 0).unwrap();
        assert_eq!(report.applied, 1);
        let job = store.load_job(JobId::new(1)).unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Power);
        assert_eq!(job.num_pending, 0);
    }

    struct AlwaysRejects;
    impl BmpDriver for AlwaysRejects {
        fn apply(&self, _change: &PendingChange) -> Result<(), BmpError> {
            Err(BmpError::Rejected("no such core".into()))
        }
    }

    #[test]
    fn non_retryable_failure_destroys_the_job() {
        let store = InMemoryStore::new();
        store.save_job(queued_job()).unwrap();
        store.save_pending_changes(JobId::new(1), vec![one_change()]).unwrap();
        let bmp = AlwaysRejects;
        let applier = ChangeApplier::new(&store, &bmp, 20, 30);

        let snapshot = snapshot_with(false);
        applier.drain(&snapshot, 0).unwrap();
        let job = store.load_job(JobId::new(1)).unwrap().unwrap();
        assert_eq!(job.job_state, JobState::Destroyed);
        assert_eq!(job.death_reason.as_deref(), Some("BMP rejected the request: no such core"));
    }
}
