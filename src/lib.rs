//! Multi-threaded AF_PACKET/TPACKETv3 fanout capture core, with an
//! offline capture-file replay source sharing the same frame-handler
//! interface as the live path.
//!
//! The hard part of this crate is the ring-buffer concurrency: the
//! start-barrier discipline, the poll/advance loop that tracks an
//! undocumented kernel invariant, the freeze-recovery heuristic, and the
//! teardown ordering that keeps the final stats reading honest. See
//! [`coordinator::Coordinator`] for the entry point that ties it together.

pub mod config;
pub mod coordinator;
pub mod drainer;
pub mod error;
pub mod handler;
pub mod offline;
pub mod provision;
pub mod ring_mapping;
pub mod sizing;
pub mod socket;
pub mod stats;
pub mod stats_aggregator;
pub mod tpacket3;
pub mod types;
pub mod worker;

pub use config::Config;
pub use coordinator::{CaptureTotals, Coordinator};
pub use error::{CaptureError, Result};
pub use handler::{FnHandlerFactory, FrameHandler, FrameHandlerFactory};
pub use offline::OfflineSource;
pub use types::PacketInfo;
