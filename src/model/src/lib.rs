//! Data model and `PersistentStore` contract (spec.md §3).

pub mod board_model;
pub mod ids;
pub mod job;
pub mod machine;
pub mod store;
pub mod transport;
pub mod usergroup;

pub use ids::{BoardId, JobId, LinkId, MachineId};
pub use job::{
    AllocationHistoryEntry, Job, JobRequest, JobState, JobUsageRow, PendingChange,
};
pub use machine::{BlacklistEntry, Board, Functioning, Link, Machine};
pub use store::{InMemoryStore, MachineSnapshot, PersistentStore, RegionKey, TransactionGuard};
pub use transport::{
    Core, Gather, GatherDescriptor, MachineDescriptor, Monitor, Placement,
    PlacementsDescriptor, RecordingRegion, Region, Vertex,
};
pub use usergroup::UserGroup;
