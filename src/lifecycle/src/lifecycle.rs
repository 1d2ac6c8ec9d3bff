//! `JobLifecycle` state machine (spec.md §4.4).
//!
//! ```text
//! UNKNOWN -create-> QUEUED -alloc-> POWER -applied-> READY
//!                      |              |               |
//!                      +---destroy----+----destroy-----+--destroy-> DESTROYED
//! ```

use spalloc_core::Result;
use spalloc_model::{
    AllocationHistoryEntry, Board, BoardId, Job, JobId, JobState, PendingChange, PersistentStore,
};

pub struct JobLifecycle<'a> {
    store: &'a dyn PersistentStore,
}

impl<'a> JobLifecycle<'a> {
    pub fn new(store: &'a dyn PersistentStore) -> Self {
        Self { store }
    }

    /// spec.md §4.4: expire any job in `{QUEUED, POWER, READY}` whose
    /// keepalive has lapsed.
    pub fn tick(&self, job_id: JobId, now: i64) -> Result<bool> {
        let Some(mut job) = self.store.load_job(job_id)? else {
            return Ok(false);
        };
        if job.job_state.is_terminal() || !job.keepalive_expired(now) {
            return Ok(false);
        }
        self.destroy(&mut job, now, "keepalive expired")?;
        Ok(true)
    }

    /// spec.md §4.4: transition to DESTROYED, freeing boards and emitting
    /// power-off `PendingChange`s for anything that was powered.
    pub fn destroy(&self, job: &mut Job, now: i64, reason: &str) -> Result<()> {
        if job.job_state.is_terminal() {
            return Ok(());
        }
        let was_powered = matches!(job.job_state, JobState::Power | JobState::Ready);

        job.transition(JobState::Destroyed, now)
            .map_err(|e| spalloc_core::Error::Unexpected(e))?;
        job.death_reason = Some(reason.to_string());

        if was_powered {
            let snapshot = self.store.load_machine(job.machine)?;
            let mut power_off = Vec::new();
            for board in snapshot.boards.iter().filter(|b| b.allocated_job == Some(job.id)) {
                power_off.push(PendingChange {
                    job: job.id,
                    board: board.id,
                    power_on: false,
                    link_enable: [false; 6],
                    to_state: JobState::Destroyed,
                });
            }
            self.store.save_pending_changes(job.id, power_off)?;
        }

        self.store.save_job(job.clone())?;
        Ok(())
    }

    /// spec.md §4.4: deduct `quota_used` for every not-yet-accounted job
    /// that has either died or is being billed periodically while alive,
    /// applying the spend against the job's `UserGroup` quota (`None` quota
    /// is unconstrained, so nothing is deducted there beyond bookkeeping).
    /// Returns the amount deducted, clamped to `>= 0`.
    pub fn accounting(&self, job: &mut Job, now: i64) -> Result<i64> {
        if job.accounted_for {
            return Ok(0);
        }
        let Some(allocation_timestamp) = job.allocation_timestamp else {
            return Ok(0);
        };
        let Some(size) = job.allocation_size else {
            return Ok(0);
        };
        let end = job.death_timestamp.unwrap_or(now).min(now);
        let elapsed = (end - allocation_timestamp).max(0);
        let used = (i64::from(size) * elapsed).max(0);

        if used > 0 {
            if let Some(mut group) = self.store.load_user_group(&job.group)? {
                group.deduct(used as u64);
                self.store.save_user_group(group)?;
            }
        }

        if job.job_state.is_terminal() {
            job.accounted_for = true;
        }
        Ok(used)
    }
}

/// Marks every board allocated to `job` as free, for use once a power-off
/// `PendingChange` for it has actually drained (spec.md §4.5's "allocator
/// must free boards" contract, invoked by the change applier).
pub fn free_boards(boards: &mut [Board], job: JobId) {
    for board in boards.iter_mut().filter(|b| b.allocated_job == Some(job)) {
        board.allocated_job = None;
    }
}

pub fn record_allocation(store: &dyn PersistentStore, job: JobId, boards: &[BoardId], now: i64) -> Result<()> {
    for &board in boards {
        store.append_allocation_history(AllocationHistoryEntry { job, board, timestamp: now })?;
    }
    Ok(())
}
