//! Ties a provisioned ring, a frame handler, and the shared synchronization
//! primitives together into one joinable worker thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::drainer::{run_drainer, DrainerConfig};
use crate::error::{CaptureError, Result};
use crate::handler::FrameHandler;
use crate::ring_mapping::RingMapping;
use crate::stats::{ShutdownFlags, StartBarrier, Stats};

/// A spawned Drainer thread, joinable by the Coordinator.
pub struct Worker {
    pub id: usize,
    handle: JoinHandle<Result<()>>,
}

impl Worker {
    pub fn spawn<H>(
        id: usize,
        mapping: RingMapping,
        mut handler: H,
        stats: Arc<Stats>,
        barrier: Arc<StartBarrier>,
        shutdown: Arc<ShutdownFlags>,
        config: DrainerConfig,
    ) -> Result<Self>
    where
        H: FrameHandler + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("drainer-{}", id))
            .spawn(move || {
                barrier.wait()?;
                run_drainer(mapping, &mut handler, &stats, &shutdown, &config)
            })
            .map_err(CaptureError::ThreadSpawn)?;

        Ok(Self { id, handle })
    }

    pub fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => {
                log::error!("drainer thread {} panicked", self.id);
                Ok(())
            }
        }
    }
}
