//! `PersistentStore`: the database seam (spec.md §2 Non-goals — "no real
//! storage engine is implemented here", spec.md §5's "`StoreSink` owns the
//! database handle exclusively").
//!
//! The allocator, change-applier and sink only ever see this trait; a real
//! deployment backs it with a SQL engine, `ds.sqlite3`/`buffer.sqlite3` per
//! spec.md §6. This crate ships one reference implementation,
//! [`InMemoryStore`], used by tests and by anything that doesn't need
//! durability across restarts.

use std::collections::BTreeMap;
use std::sync::Mutex;

use spalloc_core::{PersistenceError, Result};

use crate::ids::{BoardId, JobId, LinkId, MachineId};
use crate::job::{AllocationHistoryEntry, Job, JobUsageRow, PendingChange};
use crate::machine::{Board, Link, Machine};
use crate::usergroup::UserGroup;

/// A read-write snapshot of one machine's boards and links, handed out by
/// [`PersistentStore::load_machine`].
#[derive(Debug, Clone)]
pub struct MachineSnapshot {
    pub machine: Machine,
    pub boards: Vec<Board>,
    pub links: Vec<Link>,
}

/// Pessimistic-writer-exclusion contract (spec.md §5): only one transaction
/// may be open per machine at a time; readers may proceed against the last
/// committed snapshot without holding the lock.
pub trait PersistentStore: Send + Sync {
    /// Opens an exclusive allocation/change-applier transaction for
    /// `machine`. Returns [`PersistenceError::Busy`] if another transaction
    /// is already open on it; callers retry with backoff (spec.md §7).
    fn allocate_transaction(&self, machine: MachineId) -> Result<TransactionGuard<'_>>;

    fn load_machine(&self, machine: MachineId) -> Result<MachineSnapshot>;

    /// Replaces the full set of pending changes for `job`. Called only
    /// while holding that job's machine's transaction.
    fn save_pending_changes(&self, job: JobId, changes: Vec<PendingChange>) -> Result<()>;

    fn pending_changes(&self, machine: MachineId) -> Result<Vec<PendingChange>>;

    fn append_allocation_history(&self, entry: AllocationHistoryEntry) -> Result<()>;

    fn append_recording_contents(&self, region_key: RegionKey, buffer: Vec<u8>) -> Result<()>;

    fn job_usage_view(&self) -> Result<Vec<JobUsageRow>>;

    fn save_job(&self, job: Job) -> Result<()>;

    fn load_job(&self, job: JobId) -> Result<Option<Job>>;

    fn load_user_group(&self, group_id: &str) -> Result<Option<UserGroup>>;

    fn save_user_group(&self, group: UserGroup) -> Result<()>;
}

/// RAII handle representing an open transaction. Dropping it without
/// calling [`TransactionGuard::commit`] rolls back (mirrors the teacher's
/// `Cork` guard: Drop is the only path that must always run).
pub struct TransactionGuard<'a> {
    machine: MachineId,
    store: &'a InMemoryStore,
    committed: bool,
}

impl<'a> TransactionGuard<'a> {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.store.locked.lock().expect("lock poisoned");
        locks.remove(&self.machine);
    }
}

/// Key identifying one fetched byte range, for `append_recording_contents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegionKey {
    pub board: BoardId,
    pub region_index: u16,
}

/// Plain in-process reference implementation of [`PersistentStore`].
/// Not durable across restarts; exists for tests and for the transport
/// crates to exercise against something real without a database engine.
#[derive(Default)]
pub struct InMemoryStore {
    machines: Mutex<BTreeMap<MachineId, MachineSnapshot>>,
    locked: Mutex<std::collections::BTreeSet<MachineId>>,
    pending: Mutex<BTreeMap<MachineId, Vec<PendingChange>>>,
    history: Mutex<Vec<AllocationHistoryEntry>>,
    recordings: Mutex<BTreeMap<(BoardId, u16), Vec<u8>>>,
    jobs: Mutex<BTreeMap<JobId, Job>>,
    usage: Mutex<Vec<JobUsageRow>>,
    groups: Mutex<BTreeMap<String, UserGroup>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_machine(&self, snapshot: MachineSnapshot) {
        self.machines
            .lock()
            .expect("lock poisoned")
            .insert(snapshot.machine.id, snapshot);
    }

    pub fn set_usage_view(&self, rows: Vec<JobUsageRow>) {
        *self.usage.lock().expect("lock poisoned") = rows;
    }
}

impl PersistentStore for InMemoryStore {
    fn allocate_transaction(&self, machine: MachineId) -> Result<TransactionGuard<'_>> {
        let mut locked = self.locked.lock().expect("lock poisoned");
        if !locked.insert(machine) {
            return Err(PersistenceError::Busy.into());
        }
        Ok(TransactionGuard { machine, store: self, committed: false })
    }

    fn load_machine(&self, machine: MachineId) -> Result<MachineSnapshot> {
        self.machines
            .lock()
            .expect("lock poisoned")
            .get(&machine)
            .cloned()
            .ok_or_else(|| PersistenceError::Constraint(format!("unknown machine {machine}")).into())
    }

    fn save_pending_changes(&self, job: JobId, changes: Vec<PendingChange>) -> Result<()> {
        let Some(job_record) = self.jobs.lock().expect("lock poisoned").get(&job).cloned() else {
            return Err(PersistenceError::Constraint(format!("unknown job {job}")).into());
        };
        let mut pending = self.pending.lock().expect("lock poisoned");
        let bucket = pending.entry(job_record.machine).or_default();
        bucket.retain(|c| c.job != job);
        bucket.extend(changes);
        Ok(())
    }

    fn pending_changes(&self, machine: MachineId) -> Result<Vec<PendingChange>> {
        Ok(self
            .pending
            .lock()
            .expect("lock poisoned")
            .get(&machine)
            .cloned()
            .unwrap_or_default())
    }

    fn append_allocation_history(&self, entry: AllocationHistoryEntry) -> Result<()> {
        self.history.lock().expect("lock poisoned").push(entry);
        Ok(())
    }

    fn append_recording_contents(&self, region_key: RegionKey, buffer: Vec<u8>) -> Result<()> {
        self.recordings
            .lock()
            .expect("lock poisoned")
            .insert((region_key.board, region_key.region_index), buffer);
        Ok(())
    }

    fn job_usage_view(&self) -> Result<Vec<JobUsageRow>> {
        Ok(self.usage.lock().expect("lock poisoned").clone())
    }

    fn save_job(&self, job: Job) -> Result<()> {
        self.jobs.lock().expect("lock poisoned").insert(job.id, job);
        Ok(())
    }

    fn load_job(&self, job: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.lock().expect("lock poisoned").get(&job).cloned())
    }

    fn load_user_group(&self, group_id: &str) -> Result<Option<UserGroup>> {
        Ok(self.groups.lock().expect("lock poisoned").get(group_id).cloned())
    }

    fn save_user_group(&self, group: UserGroup) -> Result<()> {
        self.groups.lock().expect("lock poisoned").insert(group.group_id.clone(), group);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobState;

    fn sample_job(id: u32, machine: u32) -> Job {
        Job {
            id: JobId::new(id),
            owner: "alice".into(),
            group: "g".into(),
            machine: MachineId::new(machine),
            job_state: JobState::Queued,
            keepalive_interval_secs: 60,
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
    fn second_transaction_on_same_machine_is_busy() {
        let store = InMemoryStore::new();
        let guard = store.allocate_transaction(MachineId::new(0)).unwrap();
        let err = store.allocate_transaction(MachineId::new(0)).unwrap_err();
        assert!(matches!(err, spalloc_core::Error::Persistence(PersistenceError::Busy)));
        drop(guard);
        assert!(store.allocate_transaction(MachineId::new(0)).is_ok());
    }

    #[test]
    fn different_machines_do_not_contend() {
        let store = InMemoryStore::new();
        let _a = store.allocate_transaction(MachineId::new(0)).unwrap();
        assert!(store.allocate_transaction(MachineId::new(1)).is_ok());
    }

    #[test]
    fn pending_changes_for_job_replace_not_append() {
        let store = InMemoryStore::new();
        store.save_job(sample_job(1, 0)).unwrap();
        let change = |power: bool| PendingChange {
            job: JobId::new(1),
            board: BoardId::new(0),
            power_on: power,
            link_enable: [true; 6],
            to_state: JobState::Power,
        };
        store.save_pending_changes(JobId::new(1), vec![change(true)]).unwrap();
        store.save_pending_changes(JobId::new(1), vec![change(false)]).unwrap();
        let pending = store.pending_changes(MachineId::new(0)).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].power_on);
    }
}
