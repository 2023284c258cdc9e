use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::error::{CaptureError, Result};
use crate::tpacket3::TpacketStatsV3;

/// Process-wide packet counters.
///
/// `received_packets`/`received_bytes` are written by every Drainer via
/// atomic add and read by the Stats Aggregator; `socket_*` fields are
/// written exclusively by the Stats Aggregator (summing kernel-reported
/// per-socket deltas) and read by the Aggregator itself and, after join,
/// by the Coordinator. All fields are atomics so the type needs no unsafe
/// `Sync` justification.
#[derive(Debug, Default)]
pub struct Stats {
    received_packets: AtomicU64,
    received_bytes: AtomicU64,
    socket_packets: AtomicU64,
    socket_drops: AtomicU64,
    socket_freezes: AtomicU64,
    /// Number of times a Drainer's freeze-recovery heuristic fired (see
    /// the Ring Drainer's pstreak mechanism). Distinct from
    /// `socket_freezes`, which is the kernel's own freeze counter; this
    /// one instruments our own resynchronization heuristic per the open
    /// question in the design notes.
    drainer_resyncs: AtomicU64,
}

/// A point-in-time read of [`Stats`], cheap to copy and diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received_packets: u64,
    pub received_bytes: u64,
    pub socket_packets: u64,
    pub socket_drops: u64,
    pub socket_freezes: u64,
    pub drainer_resyncs: u64,
}

impl StatsSnapshot {
    /// Per-second (or any-interval) delta between two snapshots taken in
    /// order, used for the Stats Aggregator's rate display.
    pub fn delta_since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            received_packets: self.received_packets - earlier.received_packets,
            received_bytes: self.received_bytes - earlier.received_bytes,
            socket_packets: self.socket_packets - earlier.socket_packets,
            socket_drops: self.socket_drops - earlier.socket_drops,
            socket_freezes: self.socket_freezes - earlier.socket_freezes,
            drainer_resyncs: self.drainer_resyncs - earlier.drainer_resyncs,
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_received(&self, packets: u64, bytes: u64) {
        self.received_packets.fetch_add(packets, Ordering::Relaxed);
        self.received_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Folds one socket's kernel-reported delta into the shared totals.
    /// The kernel clears its own counters on read, so the caller is
    /// expected to pass the raw `getsockopt` result directly, not an
    /// already-diffed value.
    pub fn add_socket_delta(&self, delta: &TpacketStatsV3) {
        self.socket_packets
            .fetch_add(delta.tp_packets as u64, Ordering::Relaxed);
        self.socket_drops
            .fetch_add(delta.tp_drops as u64, Ordering::Relaxed);
        self.socket_freezes
            .fetch_add(delta.tp_freeze_q_cnt as u64, Ordering::Relaxed);
    }

    pub fn record_drainer_resync(&self) {
        self.drainer_resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received_packets: self.received_packets.load(Ordering::Relaxed),
            received_bytes: self.received_bytes.load(Ordering::Relaxed),
            socket_packets: self.socket_packets.load(Ordering::Relaxed),
            socket_drops: self.socket_drops.load(Ordering::Relaxed),
            socket_freezes: self.socket_freezes.load(Ordering::Relaxed),
            drainer_resyncs: self.drainer_resyncs.load(Ordering::Relaxed),
        }
    }
}

/// One-shot start gate: every Drainer and the Stats Aggregator block in
/// [`StartBarrier::wait`] until the Coordinator calls
/// [`StartBarrier::release`], which happens only once all sockets are
/// provisioned. This keeps startup latency out of the kernel's per-socket
/// drop counters.
#[derive(Debug)]
pub struct StartBarrier {
    released: Mutex<bool>,
    condvar: Condvar,
}

impl StartBarrier {
    pub fn new() -> Self {
        Self {
            released: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn wait(&self) -> Result<()> {
        let mut released = self
            .released
            .lock()
            .map_err(|_| CaptureError::BarrierPoisoned)?;
        while !*released {
            released = self
                .condvar
                .wait(released)
                .map_err(|_| CaptureError::BarrierPoisoned)?;
        }
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        let mut released = self
            .released
            .lock()
            .map_err(|_| CaptureError::BarrierPoisoned)?;
        *released = true;
        self.condvar.notify_all();
        Ok(())
    }
}

impl Default for StartBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// The two-phase shutdown flags.
///
/// `close_stats` is set by the signal-handling collaborator (out of
/// scope here) and observed by the Stats Aggregator; `close_workers` is
/// set by the Coordinator only after the Stats Aggregator has joined, and
/// is observed by the Drainers. This ordering is load-bearing: see the
/// Coordinator's step-ordering rationale.
#[derive(Debug, Default)]
pub struct ShutdownFlags {
    close_stats: AtomicBool,
    close_workers: AtomicBool,
}

impl ShutdownFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stats_close(&self) {
        self.close_stats.store(true, Ordering::Relaxed);
    }

    pub fn stats_should_close(&self) -> bool {
        self.close_stats.load(Ordering::Relaxed)
    }

    pub fn close_workers(&self) {
        self.close_workers.store(true, Ordering::Relaxed);
    }

    pub fn workers_should_close(&self) -> bool {
        self.close_workers.load(Ordering::Relaxed)
    }
}
