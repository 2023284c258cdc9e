use std::io;

/// Errors surfaced by the capture core.
///
/// Variants map onto the error kinds in the core's error-handling design:
/// FATAL-AT-STARTUP and FATAL-AT-SHUTDOWN conditions are returned to the
/// caller rather than calling `exit()` directly, so the embedding binary
/// decides how to report them and what status code to exit with.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("syscall failed: {0}")]
    Io(#[from] io::Error),

    #[error("interface {0:?} could not be resolved to an index")]
    UnknownInterface(String),

    #[error(
        "interface name mismatch after bind: requested {requested:?}, kernel reports {actual:?}"
    )]
    InterfaceNameMismatch { requested: String, actual: String },

    #[error("only {available} blocks available per ring, minimum is {minimum}")]
    RingTooSmall { available: u32, minimum: u32 },

    #[error("computed block size {block_size} is not a multiple of frame size {frame_size}")]
    BlockSizeMisaligned { block_size: u32, frame_size: u32 },

    #[error("start barrier mutex or condvar is in a poisoned state")]
    BarrierPoisoned,

    #[error("worker thread could not be spawned: {0}")]
    ThreadSpawn(io::Error),

    #[error("privilege drop to user {user:?} was refused: {reason}")]
    PrivilegeDropRefused { user: String, reason: String },

    #[error("pcap-ng capture files (magic 0x0a0d0d0a) are not supported")]
    UnsupportedPcapNg,

    #[error("unrecognized capture file magic: {0:#010x}")]
    UnknownMagic(u32),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
