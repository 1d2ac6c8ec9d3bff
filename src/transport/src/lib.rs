//! SDP framing and the FDSU download/upload protocol (spec.md §4.6-4.9).

pub mod context;
pub mod fdsu_download;
pub mod fdsu_upload;
pub mod sdp;
pub mod socket;

pub use context::{CoreStateDriver, NoDropContext, RouterContext, RouterTableDriver};
pub use fdsu_download::{DownloadState, NackOutcome};
pub use fdsu_upload::{build_retransmit_frames, build_upload_frames};
