//! Datagram layout for transmissions sent on the multicast channel.
//!
//! All integers are big-endian; floats are IEEE-754 single precision.
//!
//! ```text
//! magic "JMR1" | session (16) | sequence u64 | timestamp µs u64
//! source u16 | destination u16 | registration id u16 | sub id u16
//! bandwidth Hz u64 | spectral mask u16 | gain flag u8 | gain dBi f32
//! pair count u8 | (nem u16, value u16)*
//! segment count u8 | (frequency Hz u64, offset µs u64, duration µs u64, power dBm f32)*
//! ```

use jammer_core::TransmissionEvent;

pub const MAGIC: [u8; 4] = *b"JMR1";

/// Bytes preceding the antenna-offset pairs.
pub const HEADER_LEN: usize = 4 + 16 + 8 + 8 + 2 * 4 + 8 + 2 + 1 + 4;
pub const PAIR_LEN: usize = 4;
pub const SEGMENT_LEN: usize = 8 * 3 + 4;

/// Encodes `event` into `buffer`, replacing its previous contents.
pub fn encode(event: &TransmissionEvent<'_>, buffer: &mut Vec<u8>) {
    let descriptor = event.descriptor;
    buffer.clear();
    buffer.reserve(
        HEADER_LEN
            + 2
            + descriptor.antenna_offsets.len() * PAIR_LEN
            + descriptor.segments.len() * SEGMENT_LEN,
    );

    buffer.extend_from_slice(&MAGIC);
    buffer.extend_from_slice(event.session.as_bytes());
    buffer.extend_from_slice(&event.transmission_sequence.to_be_bytes());
    buffer.extend_from_slice(&event.timestamp_micros.to_be_bytes());
    buffer.extend_from_slice(&descriptor.source.to_be_bytes());
    buffer.extend_from_slice(&descriptor.destination.to_be_bytes());
    buffer.extend_from_slice(&descriptor.registration_id.to_be_bytes());
    buffer.extend_from_slice(&descriptor.sub_id.to_be_bytes());
    buffer.extend_from_slice(&descriptor.bandwidth_hz.to_be_bytes());
    buffer.extend_from_slice(&descriptor.spectral_mask_index.to_be_bytes());

    match descriptor.antenna_gain_dbi {
        Some(gain) => {
            buffer.push(1);
            buffer.extend_from_slice(&gain.to_be_bytes());
        }
        None => {
            buffer.push(0);
            buffer.extend_from_slice(&0f32.to_be_bytes());
        }
    }

    buffer.push(count_byte(descriptor.antenna_offsets.len()));
    for pair in descriptor.antenna_offsets.iter() {
        buffer.extend_from_slice(&pair.0.to_be_bytes());
        buffer.extend_from_slice(&pair.1.to_be_bytes());
    }

    buffer.push(count_byte(descriptor.segments.len()));
    for segment in descriptor.segments.iter() {
        buffer.extend_from_slice(&segment.frequency_hz.to_be_bytes());
        buffer.extend_from_slice(&segment.offset_micros.to_be_bytes());
        buffer.extend_from_slice(&segment.duration_micros.to_be_bytes());
        buffer.extend_from_slice(&segment.power_dbm.to_be_bytes());
    }
}

fn count_byte(count: usize) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}
