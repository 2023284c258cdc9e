/// Handler-visible metadata for one captured or replayed frame.
///
/// `caplen` is the number of bytes actually present at the L2 pointer handed
/// to the frame handler; `len` is the original on-wire length, which can
/// exceed `caplen` when a snaplen or a buffer limit truncated the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub tv_sec: u32,
    pub tv_nsec: u32,
    pub caplen: u32,
    pub len: u32,
}
