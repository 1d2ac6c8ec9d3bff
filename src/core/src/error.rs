//! Error taxonomy (spec.md §7).
//!
//! Each subsystem gets its own enum; callers match on the specific variant
//! they care about (e.g. `TransportError::Timeout` to trigger the slow-path
//! fallback). [`Error`] is the umbrella type returned by anything that can
//! fail for more than one subsystem's reason.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Alloc(#[from] AllocError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Bmp(#[from] BmpError),

    #[error("unexpected: {0}")]
    Unexpected(String),
}

/// Reasons an allocation request can fail. A failure never mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("no capacity satisfies the request")]
    NoCapacity,
    #[error("machine is unknown")]
    MachineUnknown,
    #[error("quota would be exceeded")]
    QuotaExceeded,
    #[error("requested board cannot be allocated")]
    BoardUnallocatable,
    #[error("candidate boards are not connected")]
    NotConnected,
}

/// Reasons an FDSU stream can fail.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("receive timed out for this stream")]
    Timeout,
    #[error("sequence number {got:#x} out of range for max_seq={max}")]
    InsaneSequence { max: u32, got: u32 },
    #[error("dangling reference to a region or monitor that no longer exists")]
    DanglingReference,
    #[error("interrupted while performing IO: {0}")]
    InterruptedIo(String),
    #[error("peer closed the connection")]
    PeerClosed,
}

/// Reasons the persistent store can fail a call.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store is busy, retry")]
    Busy,
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("store is corrupted: {0}")]
    Corrupted(String),
}

/// Reasons the BMP driver can fail a power-change request.
#[derive(Debug, Error)]
pub enum BmpError {
    #[error("BMP unreachable")]
    Unreachable,
    #[error("BMP rejected the request: {0}")]
    Rejected(String),
    #[error("board still settling from a previous power change")]
    Settling,
}

impl PersistenceError {
    /// True for errors a caller should retry with backoff inside the same
    /// transaction, per spec.md §7.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

impl BmpError {
    /// True for errors the change applier should retry with bounded
    /// exponential backoff before destroying the job.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Settling)
    }
}
