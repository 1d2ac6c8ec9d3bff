//! `JobLifecycle` and `ChangeApplier` (spec.md §4.4-4.5).

pub mod change_applier;
pub mod lifecycle;

pub use change_applier::{BmpDriver, ChangeApplier, DrainReport, NoopBmpDriver, RetryPolicy};
pub use lifecycle::{free_boards, record_allocation, JobLifecycle};
