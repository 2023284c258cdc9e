//! The Coordinator: top-level orchestration of the whole capture run.

use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::drainer::DrainerConfig;
use crate::error::Result;
use crate::handler::FrameHandlerFactory;
use crate::provision::{fanout_id, provision_worker};
use crate::sizing::{query_total_memory_bytes, size_rings, RingConstants};
use crate::socket::{SocketHandle, PACKET_FANOUT_HASH};
use crate::stats::{ShutdownFlags, StartBarrier, Stats};
use crate::stats_aggregator::run_stats_aggregator;
use crate::worker::Worker;

/// Cumulative counters reported once the whole run has wound down,
/// mirroring the original implementation's final summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTotals {
    pub received_packets: u64,
    pub received_bytes: u64,
    pub socket_packets: u64,
    pub socket_drops: u64,
    pub socket_freezes: u64,
}

/// Orchestrates one capture run: sizing, provisioning, privilege drop,
/// worker and aggregator threads, barrier release, and graceful shutdown
/// in the order that keeps the final stats reading honest.
pub struct Coordinator<F: FrameHandlerFactory> {
    config: Config,
    factory: F,
    drop_privileges: Box<dyn Fn(&str) -> Result<()> + Send + Sync>,
    setup_output_dir: Box<dyn Fn(&str) -> Result<()> + Send + Sync>,
    shutdown: Arc<ShutdownFlags>,
}

impl<F: FrameHandlerFactory> Coordinator<F> {
    pub fn new(config: Config, factory: F) -> Self {
        Self {
            config,
            factory,
            drop_privileges: Box::new(|_user| Ok(())),
            setup_output_dir: Box::new(|_dir| Ok(())),
            shutdown: Arc::new(ShutdownFlags::new()),
        }
    }

    /// Overrides step 4 (privilege drop). Defaults to a no-op, since
    /// privilege dropping is handled by the embedding binary, not this
    /// crate.
    pub fn with_privilege_drop(
        mut self,
        f: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.drop_privileges = Box::new(f);
        self
    }

    /// Overrides step 5 (output subdirectory creation), only invoked when
    /// `worker_count > 1`. Defaults to a no-op.
    pub fn with_output_dir_setup(
        mut self,
        f: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.setup_output_dir = Box::new(f);
        self
    }

    /// Returns a handle the caller's signal handler can use to request
    /// shutdown by setting `close_stats`.
    pub fn shutdown_handle(&self) -> Arc<ShutdownFlags> {
        Arc::clone(&self.shutdown)
    }

    pub fn run(self) -> Result<CaptureTotals> {
        let Coordinator {
            config,
            factory,
            drop_privileges,
            setup_output_dir,
            shutdown,
        } = self;

        // Step 1: fanout id and ring parameters.
        let group_id = fanout_id(PACKET_FANOUT_HASH);
        let budget = (query_total_memory_bytes() as f64 * config.memory_fraction()) as u64;
        let ring_params = size_rings(budget, config.worker_count as u32, &RingConstants::default())?;
        log::info!(
            "ring parameters: {} blocks of {} bytes ({} frames of {} bytes each)",
            ring_params.block_count,
            ring_params.block_size,
            ring_params.frame_count,
            ring_params.frame_size
        );

        // Step 2/3: provision one socket+ring per worker.
        let mut mappings = Vec::with_capacity(config.worker_count);
        for _ in 0..config.worker_count {
            mappings.push(provision_worker(&config.interface, &ring_params, group_id)?);
        }

        // Step 4: drop privileges.
        if let Some(user) = &config.user {
            drop_privileges(user)?;
            log::info!("dropped privileges to user {:?}", user);
        }

        // Step 5: output subdirectory, only when fanning out to multiple files.
        if config.worker_count > 1 {
            if let Some(dir) = &config.output_dir {
                setup_output_dir(dir)?;
                log::info!("created output subdirectory {:?}", dir);
            }
        }

        // Snapshot socket handles for the Stats Aggregator before the
        // mappings are moved into their owning worker threads.
        let socket_handles: Vec<SocketHandle> =
            mappings.iter().map(|m| m.socket_handle()).collect();

        let stats = Arc::new(Stats::new());
        let barrier = Arc::new(StartBarrier::new());
        let drainer_config = DrainerConfig {
            pstreak_threshold: config.pstreak_threshold,
            ..DrainerConfig::default()
        };

        // Step 6/7: spawn the Stats Aggregator first.
        let stats_thread = {
            let stats = Arc::clone(&stats);
            let barrier = Arc::clone(&barrier);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("stats-aggregator".into())
                .spawn(move || run_stats_aggregator(&socket_handles, &stats, &barrier, &shutdown))
                .map_err(crate::error::CaptureError::ThreadSpawn)?
        };

        // Step 8: spawn N Drainer threads, one per provisioned worker.
        let mut workers = Vec::with_capacity(config.worker_count);
        for (id, mapping) in mappings.into_iter().enumerate() {
            let file_set_id = if config.worker_count > 1 {
                Some(format!("{:x}", id))
            } else {
                None
            };
            let handler = factory.create(id, file_set_id.as_deref())?;
            let worker = Worker::spawn(
                id,
                mapping,
                handler,
                Arc::clone(&stats),
                Arc::clone(&barrier),
                Arc::clone(&shutdown),
                drainer_config,
            )?;
            workers.push(worker);
        }

        // Step 9: release the barrier.
        barrier.release()?;

        // Step 10: join the Stats Aggregator; it exits on close_stats.
        match stats_thread.join() {
            Ok(result) => result?,
            Err(_) => log::error!("stats aggregator thread panicked"),
        }

        // Step 11/12: signal and join all Drainers.
        shutdown.close_workers();
        for worker in workers {
            worker.join()?;
        }

        // Step 13: block-pointer index, mapping, and socket are all torn
        // down by `RingMapping`'s `Drop` impl, which already ran when the
        // worker's closure (and the `mapping` it owned) dropped above.

        // Step 14: cumulative totals.
        let snapshot = stats.snapshot();
        let totals = CaptureTotals {
            received_packets: snapshot.received_packets,
            received_bytes: snapshot.received_bytes,
            socket_packets: snapshot.socket_packets,
            socket_drops: snapshot.socket_drops,
            socket_freezes: snapshot.socket_freezes,
        };
        log::info!(
            "{} packets captured / {} bytes captured / {} socket packets / {} socket drops / {} socket freezes",
            totals.received_packets,
            totals.received_bytes,
            totals.socket_packets,
            totals.socket_drops,
            totals.socket_freezes
        );

        Ok(totals)
    }
}
