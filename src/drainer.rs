//! The Ring Drainer: one per worker thread, pulling completed blocks off a
//! ring and handing their frames to a [`FrameHandler`].

use std::os::unix::io::RawFd;
use std::sync::Arc;

use libc::{poll, pollfd, POLLERR, POLLIN};

use crate::error::Result;
use crate::handler::FrameHandler;
use crate::stats::{ShutdownFlags, Stats};
use crate::types::PacketInfo;

/// Abstracts the mmap'd ring just enough for [`run_drainer`] to implement
/// the freeze-recovery heuristic without depending on a real socket or
/// kernel mapping -- the production implementation is
/// [`crate::ring_mapping::RingMapping`]; tests use a synthetic double.
pub trait RingDrain {
    fn block_count(&self) -> u32;
    fn as_raw_fd(&self) -> RawFd;
    fn is_user_owned(&self, idx: u32) -> bool;
    fn mark_kernel_owned(&mut self, idx: u32);

    /// Walks every frame currently in block `idx`, in order, invoking `f`
    /// with its metadata and L2 payload. Also returns the total payload
    /// byte count, for the received-bytes counter.
    fn for_each_packet<F: FnMut(&PacketInfo, &[u8])>(&self, idx: u32, f: F) -> u64;

    /// Returns every block currently owned by userspace back to the
    /// kernel. Called once at startup, after the socket's stats are
    /// discarded, to clear whatever accumulated while this thread waited
    /// at the start barrier.
    fn reset_user_owned_blocks(&mut self) {
        for idx in 0..self.block_count() {
            if self.is_user_owned(idx) {
                self.mark_kernel_owned(idx);
            }
        }
    }

    /// Queries and discards the kernel's per-socket stats counters (which
    /// clear on read), so startup latency never shows up as steady-state
    /// drops. A no-op default for rings with no underlying socket, such as
    /// the synthetic test double.
    fn discard_kernel_stats(&self) {}
}

/// Tunables for the freeze-recovery heuristic, independent of any one ring.
#[derive(Debug, Clone, Copy)]
pub struct DrainerConfig {
    /// Number of consecutive unproductive `poll()` wakes before the
    /// Drainer forces the cursor forward to hunt for the block the kernel
    /// is actually stuck on. The original implementation hardcodes 2;
    /// kept configurable here since it is a pure tuning knob with no
    /// protocol significance.
    pub pstreak_threshold: u32,
    /// Milliseconds to block in `poll()` between cursor checks.
    pub poll_timeout_ms: i32,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            pstreak_threshold: 2,
            poll_timeout_ms: 1000,
        }
    }
}

/// Runs the Ring Drainer loop for one worker thread until
/// `shutdown.workers_should_close()` is observed.
pub fn run_drainer<R, H>(
    mut ring: R,
    handler: &mut H,
    stats: &Arc<Stats>,
    shutdown: &Arc<ShutdownFlags>,
    config: &DrainerConfig,
) -> Result<()>
where
    R: RingDrain,
    H: FrameHandler,
{
    ring.discard_kernel_stats();
    ring.reset_user_owned_blocks();
    ring.discard_kernel_stats();

    let fd = ring.as_raw_fd();
    let block_count = ring.block_count();
    let mut cursor: u32 = 0;
    let mut pstreak: u32 = 0;

    while !shutdown.workers_should_close() {
        if !ring.is_user_owned(cursor) {
            let mut pfd = pollfd {
                fd,
                events: POLLIN | POLLERR,
                revents: 0,
            };
            let ret = unsafe { poll(&mut pfd, 1, config.poll_timeout_ms) };
            if ret < 0 {
                log::warn!(
                    "poll() returned error: {}",
                    std::io::Error::last_os_error()
                );
            } else if ret > 0 {
                pstreak += 1;
            }

            if pstreak > config.pstreak_threshold {
                cursor = (cursor + 1) % block_count;
                stats.record_drainer_resync();
            }
            continue;
        }

        pstreak = 0;
        let mut packet_count: u64 = 0;
        let byte_count = ring.for_each_packet(cursor, |info, l2| {
            packet_count += 1;
            handler.handle(info, l2);
        });
        stats.add_received(packet_count, byte_count);
        ring.mark_kernel_owned(cursor);
        cursor = (cursor + 1) % block_count;
    }

    Ok(())
}
