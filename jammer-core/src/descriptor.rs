//! Transmission descriptors built from accepted ON commands.
//!
//! A descriptor is everything the transmission channel needs to describe one
//! burst except the per-emission fields (timestamp, sequence, session). It is
//! rebuilt from scratch for every accepted ON and never mutated afterwards.

use core::iter;

use heapless::Vec;

use crate::command::{NemId, OnParameters};

/// Largest number of frequencies a single ON command may jam.
pub const MAX_FREQUENCIES: usize = 16;

/// Addressing passed through unchanged from the service configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MessageRouting {
    pub destination: u16,
    pub registration_id: u16,
    pub sub_id: u16,
}

impl MessageRouting {
    #[must_use]
    pub const fn new(destination: u16, registration_id: u16, sub_id: u16) -> Self {
        Self {
            destination,
            registration_id,
            sub_id,
        }
    }
}

/// Opaque two-field value required by the downstream transmission format.
///
/// The controller always emits `(nem_id, 0)` and does not interpret either
/// field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AntennaOffsetPair(pub NemId, pub u16);

/// One frequency within a burst.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrequencySegment {
    pub frequency_hz: u64,
    /// Offset from the burst start; all segments start together.
    pub offset_micros: u64,
    pub duration_micros: u64,
    pub power_dbm: f32,
}

/// Immutable description of the bursts emitted while an ON is current.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionDescriptor {
    pub source: NemId,
    pub destination: u16,
    pub registration_id: u16,
    pub sub_id: u16,
    pub bandwidth_hz: u64,
    pub antenna_offsets: Vec<AntennaOffsetPair, 1>,
    pub segments: Vec<FrequencySegment, MAX_FREQUENCIES>,
    pub antenna_gain_dbi: Option<f32>,
    pub spectral_mask_index: u16,
}

impl TransmissionDescriptor {
    /// Length of every segment in the burst.
    #[must_use]
    pub fn on_duration_micros(&self) -> Option<u64> {
        self.segments.first().map(|segment| segment.duration_micros)
    }
}

/// Builds the descriptor for an ON command.
#[must_use]
pub fn build(
    on: &OnParameters,
    on_duration_micros: u64,
    routing: &MessageRouting,
) -> TransmissionDescriptor {
    let antenna_offsets = iter::once(AntennaOffsetPair(on.nem_id, 0)).collect();

    // Same capacity as the command's frequency list.
    let segments = on
        .frequencies
        .iter()
        .map(|frequency| FrequencySegment {
            frequency_hz: frequency.frequency_hz,
            offset_micros: 0,
            duration_micros: on_duration_micros,
            power_dbm: frequency.power_dbm,
        })
        .collect();

    TransmissionDescriptor {
        source: on.nem_id,
        destination: routing.destination,
        registration_id: routing.registration_id,
        sub_id: routing.sub_id,
        bandwidth_hz: on.bandwidth_hz,
        antenna_offsets,
        segments,
        antenna_gain_dbi: on.antenna.gain_override(),
        spectral_mask_index: on.spectral_mask_index,
    }
}
