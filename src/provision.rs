//! The Socket Provisioner: turns an interface name and a [`RingParams`]
//! into a ready-to-drain [`RingMapping`], joined to the process's shared
//! fanout group.

use libc::getpid;

use crate::error::Result;
use crate::ring_mapping::RingMapping;
use crate::sizing::RingParams;
use crate::socket::Socket;

/// Computes the fanout group id shared by every worker socket in this
/// process: `(pid & 0xFFFF) | (fanout_method << 16)`, matching the
/// original implementation exactly so multiple instances of this process
/// never collide on the same fanout group.
pub fn fanout_id(fanout_method: i32) -> i32 {
    let pid = unsafe { getpid() };
    (pid & 0xFFFF) | (fanout_method << 16)
}

/// Provisions one worker's capture socket and ring mapping.
///
/// On any failure after the socket is opened, the partially-built `Socket`
/// is dropped (closing the fd) before the error propagates -- `Socket`'s
/// `Drop` impl stands in for the original implementation's manual
/// cleanup-on-error path.
pub fn provision_worker(if_name: &str, params: &RingParams, fanout_id: i32) -> Result<RingMapping> {
    let socket = Socket::open(if_name)?;
    socket.set_version_v3()?;
    socket.join_promiscuous()?;

    let req = params.to_tpacket_req3();
    socket.install_rx_ring(&req)?;

    let mapping = RingMapping::map(socket, params)?;

    mapping.socket().bind_all_protocols()?;
    mapping.socket().verify_if_name()?;
    mapping.socket().join_fanout(fanout_id)?;

    log::info!(
        "provisioned worker on {:?}: {} blocks of {} bytes, fanout group {:#x}",
        if_name,
        params.block_count,
        params.block_size,
        fanout_id
    );

    Ok(mapping)
}
