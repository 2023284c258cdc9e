use crate::error::Result;
use crate::types::PacketInfo;

/// Receives one frame at a time from a single Drainer thread.
///
/// A `FrameHandler` is owned exclusively by the worker thread that created
/// it, so it needs no internal synchronization; `&mut self` is enough.
pub trait FrameHandler {
    fn handle(&mut self, info: &PacketInfo, l2: &[u8]);
}

/// Builds one [`FrameHandler`] per worker, and (for the Offline Source)
/// one per replayed file set.
///
/// Kept as a trait rather than a plain closure so implementations can carry
/// state that depends on which worker or file set they were created for --
/// an output-file-per-worker handler, for instance.
pub trait FrameHandlerFactory {
    type Handler: FrameHandler + Send + 'static;

    fn create(&self, worker_id: usize, file_set_id: Option<&str>) -> Result<Self::Handler>;
}

/// A [`FrameHandlerFactory`] built from a single `Fn` closure, for callers
/// that don't need per-worker state.
pub struct FnHandlerFactory<F, H>
where
    F: Fn(usize, Option<&str>) -> Result<H>,
    H: FrameHandler + Send + 'static,
{
    factory: F,
}

impl<F, H> FnHandlerFactory<F, H>
where
    F: Fn(usize, Option<&str>) -> Result<H>,
    H: FrameHandler + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, H> FrameHandlerFactory for FnHandlerFactory<F, H>
where
    F: Fn(usize, Option<&str>) -> Result<H>,
    H: FrameHandler + Send + 'static,
{
    type Handler = H;

    fn create(&self, worker_id: usize, file_set_id: Option<&str>) -> Result<Self::Handler> {
        (self.factory)(worker_id, file_set_id)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Records every frame it is handed, for assertions in drainer/offline
    /// tests.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub frames: Vec<(PacketInfo, Vec<u8>)>,
    }

    impl FrameHandler for RecordingHandler {
        fn handle(&mut self, info: &PacketInfo, l2: &[u8]) {
            self.frames.push((*info, l2.to_vec()));
        }
    }
}
