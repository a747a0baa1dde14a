// Packet framing for event streams
//
// The acquisition front end ships records in small packets: a one-byte
// flags field, a one-byte record count, then the packed records. A stream
// of packets can optionally carry a u16 length prefix per packet so a
// reader can skip ahead without decoding; the prefix counts the packet
// bytes only, not itself.

use rand::Rng;

use crate::error::{Error, Result};
use crate::events::{Channels, Coincidence, DetectorPosition, Record, SingleEvent};

// Packet header: flags byte + count byte
const HEADER_SIZE: usize = 2;

// A record count must fit the count byte
pub const MAX_RECORDS_PER_PACKET: usize = 255;

// ============================================================================
// PACKET
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Packet<R: Record> {
    pub flags: u8,
    pub records: Vec<R>,
}

impl<R: Record> Packet<R> {
    pub fn new(flags: u8, records: Vec<R>) -> Self {
        assert!(
            records.len() <= MAX_RECORDS_PER_PACKET,
            "Packet can hold at most 255 records"
        );
        Self { flags, records }
    }

    // Encoded size of this packet in bytes
    #[inline]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.records.len() * R::SIZE
    }

    pub fn encode(&self) -> Vec<u8> {
        assert!(self.records.len() <= MAX_RECORDS_PER_PACKET);
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.flags);
        buf.push(self.records.len() as u8);
        for record in &self.records {
            buf.extend_from_slice(&record.to_bytes());
        }
        buf
    }

    // Decode one packet from the start of the buffer; trailing bytes after
    // the declared payload are left for the caller
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::TruncatedBuffer {
                needed: HEADER_SIZE,
                len: buf.len(),
            });
        }
        let flags = buf[0];
        let count = buf[1] as usize;
        let needed = HEADER_SIZE + count * R::SIZE;
        if buf.len() < needed {
            return Err(Error::TruncatedBuffer {
                needed,
                len: buf.len(),
            });
        }
        let records = buf[HEADER_SIZE..needed]
            .chunks_exact(R::SIZE)
            .map(R::read_from)
            .collect();
        Ok(Self { flags, records })
    }
}

// ============================================================================
// PACKET STREAMS
// ============================================================================

// Chunk a record list into packets of at most 255 records each
pub fn pack<R: Record + Clone>(records: &[R], flags: u8) -> Vec<Packet<R>> {
    records
        .chunks(MAX_RECORDS_PER_PACKET)
        .map(|chunk| Packet::new(flags, chunk.to_vec()))
        .collect()
}

// Flatten a packet list back into its records
pub fn unpack<R: Record + Clone>(packets: &[Packet<R>]) -> Vec<R> {
    packets.iter().flat_map(|p| p.records.clone()).collect()
}

// Encode a packet sequence, optionally with a u16 length prefix per packet
pub fn encode_packets<R: Record>(packets: &[Packet<R>], with_size_prefix: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    for packet in packets {
        if with_size_prefix {
            buf.extend_from_slice(&(packet.encoded_len() as u16).to_le_bytes());
        }
        buf.extend_from_slice(&packet.encode());
    }
    buf
}

// Decode a packet sequence produced by encode_packets
//
// With prefixes the declared length must agree with the packet's own
// header; a disagreement is corruption, not something to resynchronize.
pub fn decode_packets<R: Record>(buf: &[u8], with_size_prefix: bool) -> Result<Vec<Packet<R>>> {
    let mut packets = Vec::new();
    let mut cursor = 0;
    while cursor < buf.len() {
        if with_size_prefix {
            if buf.len() - cursor < 2 {
                return Err(Error::TruncatedBuffer {
                    needed: 2,
                    len: buf.len() - cursor,
                });
            }
            let declared = u16::from_le_bytes([buf[cursor], buf[cursor + 1]]) as usize;
            cursor += 2;
            if buf.len() - cursor < declared {
                return Err(Error::TruncatedBuffer {
                    needed: declared,
                    len: buf.len() - cursor,
                });
            }
            let packet = Packet::decode(&buf[cursor..cursor + declared])?;
            if packet.encoded_len() != declared {
                return Err(Error::MalformedPacket(format!(
                    "length prefix says {} bytes, header implies {}",
                    declared,
                    packet.encoded_len()
                )));
            }
            cursor += declared;
            packets.push(packet);
        } else {
            let packet = Packet::<R>::decode(&buf[cursor..])?;
            cursor += packet.encoded_len();
            packets.push(packet);
        }
    }
    Ok(packets)
}

// ============================================================================
// REFERENCE PACKETS
// ============================================================================

// Fixed packets with known byte images, used as codec test vectors and as
// a smoke payload for link bring-up.

pub fn unit_single_packet() -> Packet<SingleEvent> {
    Packet::new(
        63,
        vec![SingleEvent {
            timestamp_ns: 255,
            position: DetectorPosition::from_raw(2),
            channels: Channels {
                x_plus: 4,
                x_minus: 3,
                y_plus: 6,
                y_minus: 5,
            },
            flags: 1,
        }],
    )
}

pub fn unit_coincidence_packet() -> Packet<Coincidence> {
    Packet::new(
        63,
        vec![Coincidence {
            timestamp_ns: 255,
            position_1: DetectorPosition::from_raw(1),
            position_2: DetectorPosition::from_raw(2),
            channels_1: Channels {
                x_plus: 5,
                x_minus: 6,
                y_plus: 7,
                y_minus: 8,
            },
            channels_2: Channels {
                x_plus: 9,
                x_minus: 10,
                y_plus: 11,
                y_minus: 12,
            },
            flags: 13,
        }],
    )
}

// Random packets for fuzz-style codec tests
pub fn random_single_packet<R: Rng>(rng: &mut R, count: usize) -> Packet<SingleEvent> {
    let records = (0..count).map(|_| SingleEvent::random(rng)).collect();
    Packet::new(rng.gen(), records)
}

pub fn random_coincidence_packet<R: Rng>(rng: &mut R, count: usize) -> Packet<Coincidence> {
    let records = (0..count).map(|_| Coincidence::random(rng)).collect();
    Packet::new(rng.gen(), records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CoincidenceTof;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn unit_coincidence_packet_bytes() {
        let bytes = unit_coincidence_packet().encode();
        let expected = [
            63, 1, // header
            255, 0, 0, 0, // timestamp
            1, 0, 2, 0, // positions
            5, 0, 6, 0, 7, 0, 8, 0, // channels 1
            9, 0, 10, 0, 11, 0, 12, 0, // channels 2
            13, // flags
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn unit_single_packet_bytes() {
        let bytes = unit_single_packet().encode();
        let expected = [
            63, 1, // header
            255, 0, 0, 0, // timestamp
            2, 0, // position
            4, 0, 3, 0, 6, 0, 5, 0, // channels
            1, // flags
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn packet_round_trip() {
        let mut rng = StdRng::seed_from_u64(31);
        for count in [0, 1, 17, 255] {
            let packet = random_single_packet(&mut rng, count);
            let back = Packet::<SingleEvent>::decode(&packet.encode()).unwrap();
            assert_eq!(back, packet);
        }
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let packet = unit_coincidence_packet();
        let bytes = packet.encode();
        assert!(Packet::<Coincidence>::decode(&bytes[..1]).is_err());
        assert!(Packet::<Coincidence>::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn pack_chunks_at_255_records() {
        let mut rng = StdRng::seed_from_u64(32);
        let records: Vec<CoincidenceTof> =
            (0..600).map(|_| CoincidenceTof::random(&mut rng)).collect();
        let packets = pack(&records, 7);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].records.len(), 255);
        assert_eq!(packets[1].records.len(), 255);
        assert_eq!(packets[2].records.len(), 90);
        assert!(packets.iter().all(|p| p.flags == 7));
        assert_eq!(unpack(&packets), records);
    }

    #[test]
    fn packet_stream_round_trip_without_prefix() {
        let mut rng = StdRng::seed_from_u64(33);
        let packets = vec![
            random_coincidence_packet(&mut rng, 3),
            random_coincidence_packet(&mut rng, 0),
            random_coincidence_packet(&mut rng, 11),
        ];
        let buf = encode_packets(&packets, false);
        let back = decode_packets::<Coincidence>(&buf, false).unwrap();
        assert_eq!(back, packets);
    }

    #[test]
    fn packet_stream_round_trip_with_prefix() {
        let mut rng = StdRng::seed_from_u64(34);
        let packets = vec![
            random_single_packet(&mut rng, 255),
            random_single_packet(&mut rng, 1),
        ];
        let buf = encode_packets(&packets, true);
        // The prefix adds exactly two bytes per packet
        let bare: usize = packets.iter().map(Packet::encoded_len).sum();
        assert_eq!(buf.len(), bare + 2 * packets.len());
        let back = decode_packets::<SingleEvent>(&buf, true).unwrap();
        assert_eq!(back, packets);
    }

    #[test]
    fn lying_size_prefix_is_malformed() {
        let packet = unit_single_packet();
        let mut buf = encode_packets(&[packet], true);
        // Inflate the declared length past the real packet size
        buf[0] = buf[0] + 5;
        buf.extend_from_slice(&[0u8; 5]);
        let err = decode_packets::<SingleEvent>(&buf, true).unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }
}
