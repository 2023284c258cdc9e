use crate::error::{CaptureError, Result};
use crate::tpacket3::{TpacketReq3, TP_FT_REQ_FILL_RXHASH};

/// `setsockopt(PACKET_RX_RING, ...)` cannot allocate more than this in one
/// call, so the sizer never proposes a per-thread budget above it.
pub const RING_LIMIT: u64 = u32::MAX as u64;

/// Queries total physical memory via `sysconf(_SC_PHYS_PAGES)`, the
/// physical-memory query the Ring Sizer is specified to take as an input.
pub fn query_total_memory_bytes() -> u64 {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    if page_size <= 0 || pages <= 0 {
        return 0;
    }
    page_size as u64 * pages as u64
}

/// Tunable knobs for the Ring Sizer, independent of any one capture run.
/// Defaults match the original implementation's `ring_limits_init`.
#[derive(Debug, Clone, Copy)]
pub struct RingConstants {
    pub frame_size: u32,
    pub preferred_block_size: u32,
    pub min_block_size: u32,
    pub target_blocks: u32,
    pub min_blocks: u32,
    pub retire_timeout_ms: u32,
}

impl Default for RingConstants {
    fn default() -> Self {
        Self {
            frame_size: 2 * 1024,
            preferred_block_size: 4 * 1024 * 1024,
            min_block_size: 64 * 1024,
            target_blocks: 64,
            min_blocks: 8,
            retire_timeout_ms: 100,
        }
    }
}

/// An immutable, legal ring descriptor produced by [`size_rings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingParams {
    pub block_size: u32,
    pub block_count: u32,
    pub frame_size: u32,
    pub frame_count: u32,
    pub retire_timeout_ms: u32,
}

impl RingParams {
    pub fn total_bytes(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    pub fn to_tpacket_req3(self) -> TpacketReq3 {
        TpacketReq3 {
            tp_block_size: self.block_size,
            tp_block_nr: self.block_count,
            tp_frame_size: self.frame_size,
            tp_frame_nr: self.frame_count,
            tp_retire_blk_tov: self.retire_timeout_ms,
            tp_sizeof_priv: 0,
            tp_feature_req_word: TP_FT_REQ_FILL_RXHASH,
        }
    }
}

/// Turns a total memory budget and a worker count into per-worker
/// [`RingParams`].
///
/// Halves the block size down toward `min_block_size` while that keeps the
/// per-thread block count below `target_blocks`, since the kernel's
/// freeze-on-head-blocked behavior makes block count the critical
/// resilience parameter, not raw block size.
pub fn size_rings(
    total_budget_bytes: u64,
    worker_count: u32,
    constants: &RingConstants,
) -> Result<RingParams> {
    assert!(worker_count > 0, "worker_count must be nonzero");

    let requested_per_thread = total_budget_bytes / worker_count as u64;
    let per_thread = if requested_per_thread > RING_LIMIT {
        log::warn!(
            "desired per-thread memory {} exceeds the {} ring limit for {} threads; capping",
            requested_per_thread,
            RING_LIMIT,
            worker_count
        );
        RING_LIMIT
    } else {
        requested_per_thread
    };

    let mut block_size = constants.preferred_block_size;
    while block_size >= 2 * constants.min_block_size
        && per_thread / block_size as u64 < constants.target_blocks as u64
    {
        block_size /= 2;
    }

    let block_count = (per_thread / block_size as u64) as u32;
    if block_count < constants.min_blocks {
        return Err(CaptureError::RingTooSmall {
            available: block_count,
            minimum: constants.min_blocks,
        });
    }

    if block_size % constants.frame_size != 0 {
        return Err(CaptureError::BlockSizeMisaligned {
            block_size,
            frame_size: constants.frame_size,
        });
    }

    let actual_total = worker_count as u64 * block_count as u64 * block_size as u64;
    if actual_total < total_budget_bytes {
        log::info!(
            "requested memory {} will be less than desired memory {} after rounding to legal ring parameters",
            actual_total,
            total_budget_bytes
        );
    }

    let frame_count = (block_size as u64 * block_count as u64 / constants.frame_size as u64) as u32;

    Ok(RingParams {
        block_size,
        block_count,
        frame_size: constants.frame_size,
        frame_count,
        retire_timeout_ms: constants.retire_timeout_ms,
    })
}
