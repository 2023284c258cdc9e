//! The Stats Aggregator: one background thread that folds per-socket
//! kernel counters into the shared [`Stats`] totals once a second and
//! logs the delta.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::socket::{query_stats_for_fd, SocketHandle};
use crate::stats::{ShutdownFlags, StartBarrier, Stats};

/// Runs until `shutdown.stats_should_close()` is observed. Must be joined
/// by the Coordinator before `close_workers` is set (see the Coordinator's
/// step-ordering rationale): its final per-socket query has to happen
/// while the rings are still draining normally, or the last reading would
/// see an artificial spike in drops accumulated during the Drainers' own
/// shutdown window.
pub fn run_stats_aggregator(
    sockets: &[SocketHandle],
    stats: &Arc<Stats>,
    barrier: &Arc<StartBarrier>,
    shutdown: &Arc<ShutdownFlags>,
) -> Result<()> {
    barrier.wait()?;

    while !shutdown.stats_should_close() {
        let before = stats.snapshot();
        std::thread::sleep(Duration::from_secs(1));

        for socket in sockets {
            match query_stats_for_fd(socket.fd) {
                Ok(delta) => stats.add_socket_delta(&delta),
                Err(err) => {
                    log::warn!(
                        "stats query failed for interface {:?}: {}",
                        socket.if_name,
                        err
                    );
                }
            }
        }

        let after = stats.snapshot();
        let delta = after.delta_since(&before);
        log::debug!(
            "packets {} bytes {}; socket packets {} drops {} freezes {}",
            delta.received_packets,
            delta.received_bytes,
            delta.socket_packets,
            delta.socket_drops,
            delta.socket_freezes
        );
    }

    Ok(())
}
