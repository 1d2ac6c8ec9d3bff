//! `StoreSink`: single-writer, multiple-producer recording-contents drain
//! (spec.md §4.10).
//!
//! One worker task owns `PersistentStore`'s write path exclusively
//! (spec.md §5's "`StoreSink` owns the database handle exclusively");
//! every board's receiver loop only ever pushes onto the bounded channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use spalloc_model::{PersistentStore, RegionKey};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);
const SLOW_SHUTDOWN_THRESHOLD: Duration = Duration::from_millis(250);

pub struct StoreSink {
    sender: mpsc::Sender<(RegionKey, Vec<u8>)>,
    worker: JoinHandle<()>,
}

impl StoreSink {
    pub fn spawn(store: Arc<dyn PersistentStore>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel(capacity);
        let worker = tokio::spawn(async move {
            while let Some((region, buffer)) = receiver.recv().await {
                if let Err(err) = store.append_recording_contents(region, buffer) {
                    tracing::error!(%err, board = %region.board, region_index = region.region_index, "failed to append recording contents");
                }
            }
        });
        Self { sender, worker }
    }

    /// Enqueues one fetched region's bytes. Per-board producers are
    /// single-threaded, so order within a board is preserved
    /// (spec.md §5's ordering guarantee); order across boards is not.
    pub async fn push(&self, region: RegionKey, buffer: Vec<u8>) -> Result<(), SinkClosed> {
        self.sender.send((region, buffer)).await.map_err(|_| SinkClosed)
    }

    /// Closes the input side and waits up to 60s for the worker to drain
    /// (spec.md §4.10). Logs if shutdown took longer than 250ms.
    pub async fn shutdown(self) {
        drop(self.sender);
        let start = Instant::now();
        let outcome = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, self.worker).await;
        let elapsed = start.elapsed();

        if elapsed > SLOW_SHUTDOWN_THRESHOLD {
            tracing::warn!(?elapsed, "StoreSink shutdown took longer than expected");
        }
        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(join_err)) => tracing::error!(%join_err, "StoreSink worker panicked"),
            Err(_elapsed) => tracing::error!("StoreSink worker did not drain within the 60s shutdown timeout"),
        }
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("StoreSink worker has already shut down")]
pub struct SinkClosed;

#[cfg(test)]
mod tests {
    use super::*;
    use spalloc_core::Result;
    use spalloc_model::{
        AllocationHistoryEntry, BoardId, Job, JobId, JobUsageRow, MachineId, MachineSnapshot,
    };
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        written: Mutex<BTreeMap<(BoardId, u16), Vec<u8>>>,
    }

    impl PersistentStore for RecordingStore {
        fn allocate_transaction(&self, _machine: MachineId) -> Result<spalloc_model::TransactionGuard<'_>> {
            unimplemented!("not needed for sink tests")
        }
        fn load_machine(&self, _machine: MachineId) -> Result<MachineSnapshot> {
            unimplemented!("not needed for sink tests")
        }
        fn save_pending_changes(&self, _job: JobId, _changes: Vec<spalloc_model::PendingChange>) -> Result<()> {
            unimplemented!("not needed for sink tests")
        }
        fn pending_changes(&self, _machine: MachineId) -> Result<Vec<spalloc_model::PendingChange>> {
            unimplemented!("not needed for sink tests")
        }
        fn append_allocation_history(&self, _entry: AllocationHistoryEntry) -> Result<()> {
            unimplemented!("not needed for sink tests")
        }
        fn append_recording_contents(&self, region_key: RegionKey, buffer: Vec<u8>) -> Result<()> {
            self.written.lock().unwrap().insert((region_key.board, region_key.region_index), buffer);
            Ok(())
        }
        fn job_usage_view(&self) -> Result<Vec<JobUsageRow>> {
            unimplemented!("not needed for sink tests")
        }
        fn save_job(&self, _job: Job) -> Result<()> {
            unimplemented!("not needed for sink tests")
        }
        fn load_job(&self, _job: JobId) -> Result<Option<Job>> {
            unimplemented!("not needed for sink tests")
        }
        fn load_user_group(&self, _group_id: &str) -> Result<Option<spalloc_model::UserGroup>> {
            unimplemented!("not needed for sink tests")
        }
        fn save_user_group(&self, _group: spalloc_model::UserGroup) -> Result<()> {
            unimplemented!("not needed for sink tests")
        }
    }

    #[tokio::test]
    async fn pushed_items_are_written_by_the_worker() {
        let store = Arc::new(RecordingStore::default());
        let sink = StoreSink::spawn(store.clone(), 8);

        let region = RegionKey { board: BoardId::new(0), region_index: 3 };
        sink.push(region, vec![1, 2, 3]).await.unwrap();
        sink.shutdown().await;

        let written = store.written.lock().unwrap().get(&(region.board, region.region_index)).cloned();
        assert_eq!(written, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn shutdown_drains_everything_queued_before_it() {
        let store = Arc::new(RecordingStore::default());
        let sink = StoreSink::spawn(store.clone(), 8);

        for i in 0..5u16 {
            let region = RegionKey { board: BoardId::new(0), region_index: i };
            sink.push(region, vec![i as u8]).await.unwrap();
        }
        sink.shutdown().await;

        assert_eq!(store.written.lock().unwrap().len(), 5);
    }
}
