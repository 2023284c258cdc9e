use std::env;

use afpacket_capture::{Config, Coordinator, FnHandlerFactory, FrameHandler, PacketInfo};

struct PrintingHandler {
    worker_id: usize,
}

impl FrameHandler for PrintingHandler {
    fn handle(&mut self, info: &PacketInfo, l2: &[u8]) {
        println!(
            "worker {}: {} bytes captured ({} on the wire) at {}.{:09}",
            self.worker_id, info.caplen, info.len, info.tv_sec, info.tv_nsec
        );
        let _ = l2;
    }
}

fn main() {
    env_logger::init();

    let interface = env::args().nth(1).expect("usage: simple_example <iface>");
    let worker_count = num_cpus();

    let config = Config::new(interface, worker_count);
    let factory = FnHandlerFactory::new(|worker_id, _file_set_id| {
        Ok(PrintingHandler { worker_id })
    });

    let coordinator = Coordinator::new(config, factory);
    let shutdown = coordinator.shutdown_handle();

    ctrlc_stub(move || shutdown.request_stats_close());

    match coordinator.run() {
        Ok(totals) => println!("{:?}", totals),
        Err(err) => eprintln!("capture failed: {}", err),
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Signal handling is an external collaborator per the capture core's
/// scope; this demo only needs *a* way to request shutdown, so it wires
/// one up directly instead of pulling in a signal-handling crate.
fn ctrlc_stub(on_interrupt: impl Fn() + Send + 'static) {
    // A real binary would install this via a crate like `ctrlc`. Left as
    // a stub here since signal plumbing is out of scope for the core.
    let _ = on_interrupt;
}
