// List-mode event records and their wire images
//
// Every record is a fixed-size, packed, little-endian struct. The sizes are
// part of the acquisition format and must never drift:
//   SingleEvent          15 bytes
//   Coincidence          25 bytes
//   CoincidenceTof       29 bytes
//   DigitalSingleEvent    8 bytes
//   DigitalCoincidence   12 bytes
// Timestamps are u32 nanoseconds, wrapping at about 4.29 s; the default
// acquisition is far shorter than that.

use rand::Rng;

use crate::error::{Error, Result};

// ============================================================================
// BYTE HELPERS
// ============================================================================

#[inline]
fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

// ============================================================================
// RECORD TRAIT
// ============================================================================

// A record with a fixed little-endian wire image
//
// write_to and read_from work on exactly SIZE bytes and are allowed to
// assume the caller sliced correctly; from_bytes is the validated entry
// point for untrusted buffers.
pub trait Record: Sized {
    const SIZE: usize;

    fn write_to(&self, buf: &mut [u8]);
    fn read_from(buf: &[u8]) -> Self;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.write_to(&mut buf);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::TruncatedBuffer {
                needed: Self::SIZE,
                len: buf.len(),
            });
        }
        Ok(Self::read_from(&buf[..Self::SIZE]))
    }
}

// Encode a record slice as a flat concatenation of wire images
pub fn encode_stream<R: Record>(records: &[R]) -> Vec<u8> {
    let mut buf = vec![0u8; records.len() * R::SIZE];
    for (record, chunk) in records.iter().zip(buf.chunks_exact_mut(R::SIZE)) {
        record.write_to(chunk);
    }
    buf
}

// Decode a flat concatenation; a trailing partial record is corruption
pub fn decode_stream<R: Record>(buf: &[u8]) -> Result<Vec<R>> {
    if buf.len() % R::SIZE != 0 {
        return Err(Error::TruncatedBuffer {
            needed: R::SIZE - buf.len() % R::SIZE,
            len: buf.len(),
        });
    }
    Ok(buf.chunks_exact(R::SIZE).map(R::read_from).collect())
}

// ============================================================================
// DETECTOR POSITION
// ============================================================================

// Packed crystal-block address: ((block & 0x3F) << 4) | (ring & 0xF)
//
// 6 bits of transaxial block index, 4 bits of axial block ring. The base
// scanner uses 48 blocks and 4 rings, well inside the field widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DetectorPosition(u16);

impl DetectorPosition {
    pub fn new(block: u16, ring: u16) -> Self {
        assert!(block < 64, "Block index exceeds the 6-bit field");
        assert!(ring < 16, "Block ring index exceeds the 4-bit field");
        Self((block << 4) | ring)
    }

    // Reinterpret a wire value, masking to the 10 used bits
    #[inline]
    pub fn from_raw(raw: u16) -> Self {
        Self(raw & 0x3FF)
    }

    #[inline]
    pub fn raw(&self) -> u16 {
        self.0
    }

    #[inline]
    pub fn block(&self) -> u16 {
        (self.0 >> 4) & 0x3F
    }

    #[inline]
    pub fn ring(&self) -> u16 {
        self.0 & 0xF
    }

    // Uniform position over the base scanner (48 blocks, 4 block rings)
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::new(rng.gen_range(0..48), rng.gen_range(0..4))
    }
}

// ============================================================================
// ANGER CHANNEL QUAD
// ============================================================================

// The four photomultiplier channels of one crystal hit
//
// X carries the transaxial light split, Y the axial one. 8 bytes on the
// wire, in x_plus, x_minus, y_plus, y_minus order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub x_plus: u16,
    pub x_minus: u16,
    pub y_plus: u16,
    pub y_minus: u16,
}

impl Channels {
    pub const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8], off: usize) {
        put_u16(buf, off, self.x_plus);
        put_u16(buf, off + 2, self.x_minus);
        put_u16(buf, off + 4, self.y_plus);
        put_u16(buf, off + 6, self.y_minus);
    }

    fn read_from(buf: &[u8], off: usize) -> Self {
        Self {
            x_plus: get_u16(buf, off),
            x_minus: get_u16(buf, off + 2),
            y_plus: get_u16(buf, off + 4),
            y_minus: get_u16(buf, off + 6),
        }
    }

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            x_plus: rng.gen_range(0..=255),
            x_minus: rng.gen_range(0..=255),
            y_plus: rng.gen_range(0..=255),
            y_minus: rng.gen_range(0..=255),
        }
    }
}

// ============================================================================
// ANALOG RECORDS
// ============================================================================

// One crystal hit with its raw Anger channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleEvent {
    pub timestamp_ns: u32,
    pub position: DetectorPosition,
    pub channels: Channels,
    pub flags: u8,
}

impl SingleEvent {
    // Random event for codec and packet tests
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            timestamp_ns: rng.gen(),
            position: DetectorPosition::random(rng),
            channels: Channels::random(rng),
            flags: 0,
        }
    }
}

impl Record for SingleEvent {
    const SIZE: usize = 15;

    fn write_to(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.timestamp_ns);
        put_u16(buf, 4, self.position.raw());
        self.channels.write_to(buf, 6);
        buf[14] = self.flags;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            timestamp_ns: get_u32(buf, 0),
            position: DetectorPosition::from_raw(get_u16(buf, 4)),
            channels: Channels::read_from(buf, 6),
            flags: buf[14],
        }
    }
}

// A prompt pair collapsed onto one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coincidence {
    pub timestamp_ns: u32,
    pub position_1: DetectorPosition,
    pub position_2: DetectorPosition,
    pub channels_1: Channels,
    pub channels_2: Channels,
    pub flags: u8,
}

impl Coincidence {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            timestamp_ns: rng.gen(),
            position_1: DetectorPosition::random(rng),
            position_2: DetectorPosition::random(rng),
            channels_1: Channels::random(rng),
            channels_2: Channels::random(rng),
            flags: 0,
        }
    }
}

impl Record for Coincidence {
    const SIZE: usize = 25;

    fn write_to(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.timestamp_ns);
        put_u16(buf, 4, self.position_1.raw());
        put_u16(buf, 6, self.position_2.raw());
        self.channels_1.write_to(buf, 8);
        self.channels_2.write_to(buf, 16);
        buf[24] = self.flags;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            timestamp_ns: get_u32(buf, 0),
            position_1: DetectorPosition::from_raw(get_u16(buf, 4)),
            position_2: DetectorPosition::from_raw(get_u16(buf, 6)),
            channels_1: Channels::read_from(buf, 8),
            channels_2: Channels::read_from(buf, 16),
            flags: buf[24],
        }
    }
}

// A prompt pair keeping both hit timestamps for time-of-flight use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoincidenceTof {
    pub timestamp_1_ns: u32,
    pub timestamp_2_ns: u32,
    pub position_1: DetectorPosition,
    pub position_2: DetectorPosition,
    pub channels_1: Channels,
    pub channels_2: Channels,
    pub flags: u8,
}

impl CoincidenceTof {
    // Pair two detected singles; the earlier event goes first
    pub fn from_singles(first: &SingleEvent, second: &SingleEvent) -> Self {
        Self {
            timestamp_1_ns: first.timestamp_ns,
            timestamp_2_ns: second.timestamp_ns,
            position_1: first.position,
            position_2: second.position,
            channels_1: first.channels,
            channels_2: second.channels,
            flags: first.flags | second.flags,
        }
    }

    // Drop the second timestamp, keeping the earlier one
    pub fn collapse(&self) -> Coincidence {
        Coincidence {
            timestamp_ns: self.timestamp_1_ns,
            position_1: self.position_1,
            position_2: self.position_2,
            channels_1: self.channels_1,
            channels_2: self.channels_2,
            flags: self.flags,
        }
    }

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            timestamp_1_ns: rng.gen(),
            timestamp_2_ns: rng.gen(),
            position_1: DetectorPosition::random(rng),
            position_2: DetectorPosition::random(rng),
            channels_1: Channels::random(rng),
            channels_2: Channels::random(rng),
            flags: 0,
        }
    }
}

impl Record for CoincidenceTof {
    const SIZE: usize = 29;

    fn write_to(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.timestamp_1_ns);
        put_u32(buf, 4, self.timestamp_2_ns);
        put_u16(buf, 8, self.position_1.raw());
        put_u16(buf, 10, self.position_2.raw());
        self.channels_1.write_to(buf, 12);
        self.channels_2.write_to(buf, 20);
        buf[28] = self.flags;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            timestamp_1_ns: get_u32(buf, 0),
            timestamp_2_ns: get_u32(buf, 4),
            position_1: DetectorPosition::from_raw(get_u16(buf, 8)),
            position_2: DetectorPosition::from_raw(get_u16(buf, 10)),
            channels_1: Channels::read_from(buf, 12),
            channels_2: Channels::read_from(buf, 20),
            flags: buf[28],
        }
    }
}

// ============================================================================
// DIGITAL RECORDS
// ============================================================================

// A crystal hit reduced to its (I, J) crystal coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalSingleEvent {
    pub timestamp_ns: u32,
    pub position: DetectorPosition,
    pub i: u8,
    pub j: u8,
}

impl Record for DigitalSingleEvent {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.timestamp_ns);
        put_u16(buf, 4, self.position.raw());
        buf[6] = self.i;
        buf[7] = self.j;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            timestamp_ns: get_u32(buf, 0),
            position: DetectorPosition::from_raw(get_u16(buf, 4)),
            i: buf[6],
            j: buf[7],
        }
    }
}

// A prompt pair reduced to crystal coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalCoincidence {
    pub timestamp_ns: u32,
    pub position_1: DetectorPosition,
    pub position_2: DetectorPosition,
    pub i1: u8,
    pub j1: u8,
    pub i2: u8,
    pub j2: u8,
}

impl Record for DigitalCoincidence {
    const SIZE: usize = 12;

    fn write_to(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.timestamp_ns);
        put_u16(buf, 4, self.position_1.raw());
        put_u16(buf, 6, self.position_2.raw());
        buf[8] = self.i1;
        buf[9] = self.j1;
        buf[10] = self.i2;
        buf[11] = self.j2;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            timestamp_ns: get_u32(buf, 0),
            position_1: DetectorPosition::from_raw(get_u16(buf, 4)),
            position_2: DetectorPosition::from_raw(get_u16(buf, 6)),
            i1: buf[8],
            j1: buf[9],
            i2: buf[10],
            j2: buf[11],
        }
    }
}

// Wire sizes are format constants; fail the build if a layout drifts
const _: () = assert!(SingleEvent::SIZE == 15);
const _: () = assert!(Coincidence::SIZE == 25);
const _: () = assert!(CoincidenceTof::SIZE == 29);
const _: () = assert!(DigitalSingleEvent::SIZE == 8);
const _: () = assert!(DigitalCoincidence::SIZE == 12);

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn position_packs_block_and_ring() {
        let p = DetectorPosition::new(37, 2);
        assert_eq!(p.raw(), (37 << 4) | 2);
        assert_eq!(p.block(), 37);
        assert_eq!(p.ring(), 2);
    }

    #[test]
    fn position_from_raw_masks_high_bits() {
        let p = DetectorPosition::from_raw(0xFFFF);
        assert_eq!(p.block(), 63);
        assert_eq!(p.ring(), 15);
        assert_eq!(p.raw(), 0x3FF);
    }

    #[test]
    fn single_event_layout_is_little_endian() {
        let ev = SingleEvent {
            timestamp_ns: 0x0102_0304,
            position: DetectorPosition::from_raw(0x0201),
            channels: Channels {
                x_plus: 1,
                x_minus: 2,
                y_plus: 3,
                y_minus: 4,
            },
            flags: 0xAB,
        };
        let bytes = ev.to_bytes();
        assert_eq!(bytes.len(), 15);
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[4..6], &[0x01, 0x02]);
        assert_eq!(&bytes[6..8], &[0x01, 0x00]);
        assert_eq!(bytes[14], 0xAB);
    }

    #[test]
    fn records_round_trip() {
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..50 {
            let s = SingleEvent::random(&mut rng);
            assert_eq!(SingleEvent::read_from(&s.to_bytes()), s);

            let c = Coincidence::random(&mut rng);
            assert_eq!(Coincidence::read_from(&c.to_bytes()), c);

            let t = CoincidenceTof::random(&mut rng);
            assert_eq!(CoincidenceTof::read_from(&t.to_bytes()), t);
        }
    }

    #[test]
    fn digital_records_round_trip() {
        let d = DigitalSingleEvent {
            timestamp_ns: 42,
            position: DetectorPosition::new(5, 1),
            i: 7,
            j: 11,
        };
        assert_eq!(DigitalSingleEvent::read_from(&d.to_bytes()), d);

        let c = DigitalCoincidence {
            timestamp_ns: 43,
            position_1: DetectorPosition::new(5, 1),
            position_2: DetectorPosition::new(29, 3),
            i1: 0,
            j1: 14,
            i2: 14,
            j2: 0,
        };
        assert_eq!(DigitalCoincidence::read_from(&c.to_bytes()), c);
    }

    #[test]
    fn short_buffer_is_a_fatal_error() {
        let err = SingleEvent::from_bytes(&[0u8; 14]).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn tof_from_singles_keeps_both_timestamps() {
        let mut rng = StdRng::seed_from_u64(22);
        let mut a = SingleEvent::random(&mut rng);
        let mut b = SingleEvent::random(&mut rng);
        a.timestamp_ns = 100;
        b.timestamp_ns = 105;
        let tof = CoincidenceTof::from_singles(&a, &b);
        assert_eq!(tof.timestamp_1_ns, 100);
        assert_eq!(tof.timestamp_2_ns, 105);
        assert_eq!(tof.position_1, a.position);
        assert_eq!(tof.collapse().timestamp_ns, 100);
    }

    #[test]
    fn stream_codec_round_trips_and_rejects_tails() {
        let mut rng = StdRng::seed_from_u64(23);
        let records: Vec<SingleEvent> = (0..7).map(|_| SingleEvent::random(&mut rng)).collect();
        let buf = encode_stream(&records);
        assert_eq!(buf.len(), 7 * SingleEvent::SIZE);
        let back: Vec<SingleEvent> = decode_stream(&buf).unwrap();
        assert_eq!(back, records);

        assert!(decode_stream::<SingleEvent>(&buf[..buf.len() - 1]).is_err());
    }
}
