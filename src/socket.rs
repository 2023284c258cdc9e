//! Thin wrapper around the raw AF_PACKET socket syscalls the Socket
//! Provisioner needs: version negotiation, promiscuous membership, RX ring
//! installation, binding, fanout join, and kernel-maintained statistics.

use std::ffi::CString;
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use libc::{
    bind, c_int, c_void, close, getsockopt, if_indextoname, if_nametoindex, setsockopt, socket,
    sockaddr, sockaddr_ll, socklen_t, AF_PACKET, ETH_P_ALL, IF_NAMESIZE, SOCK_RAW, SOL_PACKET,
};

use crate::error::{CaptureError, Result};
use crate::tpacket3::{TpacketReq3, TpacketStatsV3, TPACKET_V3};

// These option values are not all exposed by the `libc` crate version this
// crate targets, so (matching the convention the teacher already used for
// `PACKET_FANOUT`) they are hardcoded here from `linux/if_packet.h`.
const PACKET_ADD_MEMBERSHIP: c_int = 1;
const PACKET_VERSION: c_int = 10;
const PACKET_RX_RING: c_int = 5;
const PACKET_STATISTICS: c_int = 6;
pub const PACKET_FANOUT: c_int = 18;
/// Pins each flow's packets to one worker by hash, matching the fanout
/// method the Socket Provisioner is specified to use.
pub const PACKET_FANOUT_HASH: c_int = 0;

const PACKET_MR_PROMISC: u16 = 1;

/// `struct packet_mreq` from `linux/if_packet.h`. Joining promiscuous mode
/// this way registers a per-socket membership that the kernel drops
/// automatically when the socket closes, instead of toggling the
/// interface-wide `IFF_PROMISC` flag that every worker socket would
/// otherwise race to set and clear.
#[repr(C)]
struct PacketMreq {
    mr_ifindex: c_int,
    mr_type: u16,
    mr_alen: u16,
    mr_address: [u8; 8],
}

/// An AF_PACKET capture socket bound to one interface.
///
/// `Socket` owns the file descriptor and closes it on drop. Read-only
/// operations (`query_stats`, `as_raw_fd`) are safe to call from a thread
/// other than the one that provisioned it -- the Stats Aggregator does
/// exactly that -- which is why `Socket` is declared `Send + Sync` despite
/// wrapping a raw fd.
#[derive(Debug)]
pub struct Socket {
    fd: RawFd,
    pub if_name: String,
    pub if_index: u32,
}

unsafe impl Send for Socket {}
unsafe impl Sync for Socket {}

impl Socket {
    /// Opens a raw packet socket bound to all L2 protocols and resolves
    /// `if_name` to its kernel interface index.
    pub fn open(if_name: &str) -> Result<Socket> {
        let if_index = resolve_if_index(if_name)?;

        let fd = unsafe { socket(AF_PACKET, SOCK_RAW, (ETH_P_ALL as u16).to_be() as c_int) };
        if fd < 0 {
            return Err(CaptureError::Io(std::io::Error::last_os_error()));
        }

        Ok(Socket {
            fd,
            if_name: if_name.to_string(),
            if_index,
        })
    }

    pub fn set_version_v3(&self) -> Result<()> {
        self.setsockopt(PACKET_VERSION, TPACKET_V3)
    }

    /// Enables promiscuous-mode reception on this socket's interface.
    pub fn join_promiscuous(&self) -> Result<()> {
        let mreq = PacketMreq {
            mr_ifindex: self.if_index as c_int,
            mr_type: PACKET_MR_PROMISC,
            mr_alen: 0,
            mr_address: [0; 8],
        };
        self.setsockopt(PACKET_ADD_MEMBERSHIP, mreq)
    }

    pub fn install_rx_ring(&self, req: &TpacketReq3) -> Result<()> {
        self.setsockopt(PACKET_RX_RING, req.clone())
    }

    /// Binds the socket to this interface, accepting all L2 protocols.
    pub fn bind_all_protocols(&self) -> Result<()> {
        let mut sll: sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = AF_PACKET as u16;
        sll.sll_protocol = (ETH_P_ALL as u16).to_be();
        sll.sll_ifindex = self.if_index as c_int;

        let res = unsafe {
            bind(
                self.fd,
                &sll as *const sockaddr_ll as *const sockaddr,
                mem::size_of::<sockaddr_ll>() as socklen_t,
            )
        };
        if res != 0 {
            return Err(CaptureError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Confirms the kernel's current name for `if_index` still matches the
    /// interface this socket was opened against, catching the case where
    /// an interface was renamed or replaced out from under a long-running
    /// capture.
    pub fn verify_if_name(&self) -> Result<()> {
        let mut buf = [0i8; IF_NAMESIZE];
        let ptr = unsafe { if_indextoname(self.if_index, buf.as_mut_ptr()) };
        if ptr.is_null() {
            return Err(CaptureError::Io(std::io::Error::last_os_error()));
        }
        let actual = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        if actual != self.if_name {
            return Err(CaptureError::InterfaceNameMismatch {
                requested: self.if_name.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Joins the shared fanout group identified by `fanout_id`. All
    /// sockets in this process that pass the same id (the Socket
    /// Provisioner derives it once per run, from the pid) end up sharing
    /// one fanout group, with the kernel hash-distributing flows across
    /// them.
    pub fn join_fanout(&self, fanout_id: i32) -> Result<()> {
        self.setsockopt(PACKET_FANOUT, fanout_id)
    }

    /// Reads and clears the kernel's per-socket packet/drop/freeze
    /// counters.
    pub fn query_stats(&self) -> Result<TpacketStatsV3> {
        query_stats_for_fd(self.fd)
    }

    /// A lightweight, `Send`-safe reference to this socket for the Stats
    /// Aggregator: just the fd and name, not ownership. The fd stays
    /// valid for as long as the `Socket` (owned by this worker's
    /// `RingMapping`) is alive, which the Coordinator guarantees by
    /// joining the Stats Aggregator before the Drainers are torn down.
    pub fn handle(&self) -> SocketHandle {
        SocketHandle {
            fd: self.fd,
            if_name: self.if_name.clone(),
        }
    }

    fn setsockopt<T>(&self, opt: c_int, value: T) -> Result<()> {
        let res = unsafe {
            setsockopt(
                self.fd,
                SOL_PACKET,
                opt,
                &value as *const T as *const c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };
        if res != 0 {
            return Err(CaptureError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                close(self.fd);
            }
        }
    }
}

/// A non-owning reference to a provisioned socket: just enough for the
/// Stats Aggregator to query kernel counters by fd without sharing
/// ownership of the `Socket` itself across threads.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    pub fd: RawFd,
    pub if_name: String,
}

/// Reads and clears the kernel's per-socket packet/drop/freeze counters
/// for a raw fd. Matches the teacher's own free-function
/// `get_rx_statistics`, generalized to the v3 stats struct used
/// throughout this crate.
pub fn query_stats_for_fd(fd: RawFd) -> Result<TpacketStatsV3> {
    let mut stats = TpacketStatsV3::default();
    let mut len = mem::size_of::<TpacketStatsV3>() as socklen_t;
    let res = unsafe {
        getsockopt(
            fd,
            SOL_PACKET,
            PACKET_STATISTICS,
            &mut stats as *mut _ as *mut c_void,
            &mut len,
        )
    };
    if res != 0 {
        return Err(CaptureError::Io(std::io::Error::last_os_error()));
    }
    Ok(stats)
}

fn resolve_if_index(if_name: &str) -> Result<u32> {
    let name =
        CString::new(if_name).map_err(|_| CaptureError::UnknownInterface(if_name.to_string()))?;
    let index = unsafe { if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(CaptureError::UnknownInterface(if_name.to_string()));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_interface_is_reported() {
        let err = Socket::open("definitely-not-a-real-nic-0").unwrap_err();
        assert!(matches!(err, CaptureError::UnknownInterface(_)));
    }
}
