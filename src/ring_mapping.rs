//! Maps the kernel-shared RX ring into this process's address space and
//! implements [`RingDrain`] over it.

use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;

use libc::{c_void, mmap, munmap, MAP_LOCKED, MAP_NORESERVE, MAP_SHARED, PROT_READ, PROT_WRITE};

use crate::drainer::RingDrain;
use crate::error::{CaptureError, Result};
use crate::sizing::RingParams;
use crate::socket::Socket;
use crate::tpacket3::{Tpacket3Hdr, TpacketBlockDesc, TP_STATUS_KERNEL, TP_STATUS_USER};
use crate::types::PacketInfo;

/// An mmap'd RX ring for one socket, with a pointer into each block.
///
/// Owns the mapping (unmapped on drop) and the socket it was mapped from,
/// so a `RingMapping` going out of scope tears both down in the right
/// order regardless of how the owning thread exits.
pub struct RingMapping {
    socket: Socket,
    base: *mut u8,
    map_len: usize,
    block_size: u32,
    block_count: u32,
}

unsafe impl Send for RingMapping {}

impl RingMapping {
    /// Maps the RX ring for `socket`, which must already have had
    /// `PACKET_VERSION`/`PACKET_RX_RING` negotiated against `params` by
    /// the Socket Provisioner.
    pub fn map(socket: Socket, params: &RingParams) -> Result<Self> {
        let map_len = params.total_bytes() as usize;
        let base = unsafe {
            mmap(
                ptr::null_mut(),
                map_len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED | MAP_LOCKED | MAP_NORESERVE,
                socket.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(CaptureError::Io(std::io::Error::last_os_error()));
        }

        Ok(Self {
            socket,
            base: base as *mut u8,
            map_len,
            block_size: params.block_size,
            block_count: params.block_count,
        })
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    pub fn socket_handle(&self) -> crate::socket::SocketHandle {
        self.socket.handle()
    }

    fn block_ptr(&self, idx: u32) -> *mut TpacketBlockDesc {
        assert!(idx < self.block_count);
        unsafe { self.base.offset(idx as isize * self.block_size as isize) as *mut TpacketBlockDesc }
    }

    fn block_desc(&self, idx: u32) -> &TpacketBlockDesc {
        unsafe { &*self.block_ptr(idx) }
    }

    fn block_desc_mut(&mut self, idx: u32) -> &mut TpacketBlockDesc {
        unsafe { &mut *self.block_ptr(idx) }
    }
}

impl RingDrain for RingMapping {
    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn is_user_owned(&self, idx: u32) -> bool {
        self.block_desc(idx).hdr.block_status & TP_STATUS_USER != 0
    }

    fn mark_kernel_owned(&mut self, idx: u32) {
        self.block_desc_mut(idx).hdr.block_status = TP_STATUS_KERNEL;
    }

    fn discard_kernel_stats(&self) {
        if let Err(err) = self.socket.query_stats() {
            log::warn!("discarding startup stats failed: {}", err);
        }
    }

    fn for_each_packet<F: FnMut(&PacketInfo, &[u8])>(&self, idx: u32, mut f: F) -> u64 {
        let desc = self.block_desc(idx);
        let block_base = self.block_ptr(idx) as *const u8;
        let num_pkts = desc.hdr.num_pkts;
        let mut offset = desc.hdr.offset_to_first_pkt as usize;
        let mut byte_count: u64 = 0;

        for _ in 0..num_pkts {
            let hdr = unsafe { &*(block_base.add(offset) as *const Tpacket3Hdr) };
            let payload_offset = offset + hdr.tp_mac as usize;
            let payload = unsafe {
                std::slice::from_raw_parts(
                    block_base.add(payload_offset),
                    hdr.tp_snaplen as usize,
                )
            };

            let info = PacketInfo {
                tv_sec: hdr.tp_sec,
                tv_nsec: hdr.tp_nsec,
                caplen: hdr.tp_snaplen,
                len: hdr.tp_len,
            };
            byte_count += hdr.tp_snaplen as u64;
            f(&info, payload);

            offset += hdr.tp_next_offset as usize;
        }

        byte_count
    }
}

impl Drop for RingMapping {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe {
                munmap(self.base as *mut c_void, self.map_len);
            }
        }
    }
}
