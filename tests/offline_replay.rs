//! End-to-end Offline Source tests against real files on disk, through a
//! real `std::fs::File` instead of an in-memory `Cursor`.

use std::io::{Seek, SeekFrom, Write};

use afpacket_capture::handler::FrameHandler;
use afpacket_capture::offline::{OfflineSource, BUFLEN, MAGIC_NATIVE};
use afpacket_capture::PacketInfo;

#[derive(Default)]
struct CollectingHandler {
    frames: Vec<(PacketInfo, Vec<u8>)>,
}

impl FrameHandler for CollectingHandler {
    fn handle(&mut self, info: &PacketInfo, l2: &[u8]) {
        self.frames.push((*info, l2.to_vec()));
    }
}

fn write_global_header(file: &mut impl Write, magic: u32) {
    file.write_all(&magic.to_ne_bytes()).unwrap();
    file.write_all(&2u16.to_ne_bytes()).unwrap();
    file.write_all(&4u16.to_ne_bytes()).unwrap();
    file.write_all(&0i32.to_ne_bytes()).unwrap();
    file.write_all(&0u32.to_ne_bytes()).unwrap();
    file.write_all(&65535u32.to_ne_bytes()).unwrap();
    file.write_all(&1u32.to_ne_bytes()).unwrap();
}

fn write_record(file: &mut impl Write, ts_sec: u32, ts_usec: u32, payload: &[u8]) {
    file.write_all(&ts_sec.to_ne_bytes()).unwrap();
    file.write_all(&ts_usec.to_ne_bytes()).unwrap();
    file.write_all(&(payload.len() as u32).to_ne_bytes())
        .unwrap();
    file.write_all(&(payload.len() as u32).to_ne_bytes())
        .unwrap();
    file.write_all(payload).unwrap();
}

/// A 10-record file, loop_count=1, timestamps 1000us..10000us, one-byte
/// payloads 0x01..0x0A.
#[test]
fn replays_ten_records_with_expected_timestamps_and_payloads() {
    let mut file = tempfile::tempfile().unwrap();
    write_global_header(&mut file, MAGIC_NATIVE);
    for i in 1..=10u32 {
        write_record(&mut file, 0, i * 1000, &[i as u8]);
    }
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut source = OfflineSource::open(file, 1).unwrap();
    let mut handler = CollectingHandler::default();
    let dispatched = source.dispatch(&mut handler).unwrap();

    assert_eq!(dispatched, 10);
    assert_eq!(handler.frames.len(), 10);
    for (i, (info, payload)) in handler.frames.iter().enumerate() {
        assert_eq!(info.tv_sec, 0);
        assert_eq!(info.tv_nsec, (i as u32 + 1) * 1_000_000);
        assert_eq!(payload, &vec![(i + 1) as u8]);
    }
}

/// The same file replayed three times reproduces the 10-record sequence
/// exactly three times, in order.
#[test]
fn loop_count_three_repeats_sequence_exactly() {
    let mut file = tempfile::tempfile().unwrap();
    write_global_header(&mut file, MAGIC_NATIVE);
    for i in 1..=10u32 {
        write_record(&mut file, 0, i * 1000, &[i as u8]);
    }
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut source = OfflineSource::open(file, 3).unwrap();
    let mut handler = CollectingHandler::default();
    let dispatched = source.dispatch(&mut handler).unwrap();

    assert_eq!(dispatched, 30);
    for pass in 0..3 {
        for i in 0..10 {
            let (info, payload) = &handler.frames[pass * 10 + i];
            assert_eq!(info.tv_nsec, (i as u32 + 1) * 1_000_000);
            assert_eq!(payload, &vec![(i + 1) as u8]);
        }
    }
}

/// An oversized record (caplen = 2*BUFLEN) is truncated to BUFLEN on
/// delivery but reports the true original length.
#[test]
fn oversized_record_truncates_to_buflen() {
    let mut file = tempfile::tempfile().unwrap();
    write_global_header(&mut file, MAGIC_NATIVE);
    let payload = vec![0xABu8; 2 * BUFLEN];
    write_record(&mut file, 42, 0, &payload);
    // A normal-sized record follows, to prove the seek-past-remainder
    // correctly resynchronizes the reader onto the next record header.
    write_record(&mut file, 43, 500, &[0x01, 0x02, 0x03]);
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut source = OfflineSource::open(file, 1).unwrap();
    let mut handler = CollectingHandler::default();
    let dispatched = source.dispatch(&mut handler).unwrap();

    assert_eq!(dispatched, 2);
    let (first_info, first_payload) = &handler.frames[0];
    assert_eq!(first_info.caplen, BUFLEN as u32);
    assert_eq!(first_info.len, (2 * BUFLEN) as u32);
    assert_eq!(first_payload.len(), BUFLEN);
    assert!(first_payload.iter().all(|&b| b == 0xAB));

    let (second_info, second_payload) = &handler.frames[1];
    assert_eq!(second_info.tv_sec, 43);
    assert_eq!(second_payload, &vec![0x01, 0x02, 0x03]);
}

/// A truncated final record (file ends partway through a packet-record
/// header, as a writer killed mid-record would leave behind) ends replay
/// normally rather than failing the whole dispatch.
#[test]
fn truncated_trailing_record_ends_replay_cleanly() {
    let mut file = tempfile::tempfile().unwrap();
    write_global_header(&mut file, MAGIC_NATIVE);
    write_record(&mut file, 0, 1000, &[0x01]);
    file.write_all(&1u32.to_ne_bytes()).unwrap();
    file.write_all(&2u32.to_ne_bytes()).unwrap();
    // incl_len/orig_len/payload are missing entirely.
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut source = OfflineSource::open(file, 1).unwrap();
    let mut handler = CollectingHandler::default();
    let dispatched = source.dispatch(&mut handler).unwrap();

    assert_eq!(dispatched, 1);
    assert_eq!(handler.frames.len(), 1);
    assert_eq!(handler.frames[0].1, vec![0x01]);
}
