//! Telemetry ring for controller decisions.
//!
//! Every accepted, ignored, or rejected request and every chain firing leaves
//! a record here. Hosts drain or inspect the ring for diagnostics; the
//! controller never reads it back.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::command::CommandKind;
use crate::control::request::MalformedRequest;
use crate::controller::Generation;

/// Monotonic identifier assigned to each telemetry record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Why a request was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RejectionReason {
    /// The request line could not be decoded.
    Syntax,
    /// The request decoded but its kind and payload disagree.
    Malformed(MalformedRequest),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Syntax => f.write_str("syntax"),
            RejectionReason::Malformed(malformed) => f.write_str(malformed.message()),
        }
    }
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    CommandAccepted(CommandKind),
    CommandIgnored(CommandKind),
    CommandRejected(RejectionReason),
    ChainStarted,
    TransmissionEmitted,
    TransmissionDropped,
    StaleFireSkipped,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::CommandAccepted(kind) => write!(f, "command-accepted {kind}"),
            TelemetryEventKind::CommandIgnored(kind) => write!(f, "command-ignored {kind}"),
            TelemetryEventKind::CommandRejected(reason) => write!(f, "command-rejected {reason}"),
            TelemetryEventKind::ChainStarted => f.write_str("chain-started"),
            TelemetryEventKind::TransmissionEmitted => f.write_str("transmission-emitted"),
            TelemetryEventKind::TransmissionDropped => f.write_str("transmission-dropped"),
            TelemetryEventKind::StaleFireSkipped => f.write_str("stale-fire-skipped"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    /// Generation that the event started or belongs to.
    Generation(Generation),
    Transmission {
        generation: Generation,
        transmission_sequence: u64,
    },
    Stale {
        scheduled: Generation,
        current: Generation,
    },
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a command that changed the controller state.
    pub fn record_accepted(
        &mut self,
        kind: CommandKind,
        generation: Generation,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::CommandAccepted(kind),
            TelemetryPayload::Generation(generation),
            timestamp,
        )
    }

    /// Records a valid command that had nothing to do.
    pub fn record_ignored(&mut self, kind: CommandKind, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::CommandIgnored(kind),
            TelemetryPayload::None,
            timestamp,
        )
    }

    pub fn record_rejected(&mut self, reason: RejectionReason, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::CommandRejected(reason),
            TelemetryPayload::None,
            timestamp,
        )
    }

    pub fn record_chain_started(&mut self, generation: Generation, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::ChainStarted,
            TelemetryPayload::Generation(generation),
            timestamp,
        )
    }

    /// Records one burst handed to the transmission channel.
    pub fn record_emitted(
        &mut self,
        generation: Generation,
        transmission_sequence: u64,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::TransmissionEmitted,
            TelemetryPayload::Transmission {
                generation,
                transmission_sequence,
            },
            timestamp,
        )
    }

    /// Records a burst the channel could not take.
    pub fn record_dropped(
        &mut self,
        generation: Generation,
        transmission_sequence: u64,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::TransmissionDropped,
            TelemetryPayload::Transmission {
                generation,
                transmission_sequence,
            },
            timestamp,
        )
    }

    /// Records a firing that belonged to a superseded chain.
    pub fn record_stale(
        &mut self,
        scheduled: Generation,
        current: Generation,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::StaleFireSkipped,
            TelemetryPayload::Stale { scheduled, current },
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequential_event_ids() {
        let mut recorder = TelemetryRecorder::<u64>::new();
        assert!(recorder.is_empty());

        let first = recorder.record_accepted(CommandKind::On, 1, 10);
        let second = recorder.record_chain_started(1, 10);
        let third = recorder.record_emitted(1, 0, 10);

        assert_eq!((first, second, third), (0, 1, 2));
        assert_eq!(recorder.len(), 3);

        let latest = recorder.latest().copied().unwrap();
        assert_eq!(latest.event, TelemetryEventKind::TransmissionEmitted);
        assert_eq!(
            latest.details,
            TelemetryPayload::Transmission {
                generation: 1,
                transmission_sequence: 0,
            }
        );
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<u64, 4>::new();
        for tick in 0..6 {
            recorder.record_ignored(CommandKind::Off, tick);
        }

        assert_eq!(recorder.len(), 4);
        let timestamps: heapless::Vec<u64, 4> =
            recorder.oldest_first().map(|record| record.timestamp).collect();
        assert_eq!(timestamps.as_slice(), &[2, 3, 4, 5]);
        assert_eq!(recorder.latest().map(|record| record.id), Some(5));
    }

    #[test]
    fn stale_and_rejected_events_render() {
        let mut recorder = TelemetryRecorder::<u64>::new();
        recorder.record_stale(1, 3, 0);
        let stale = recorder.latest().copied().unwrap();
        assert_eq!(
            stale.details,
            TelemetryPayload::Stale {
                scheduled: 1,
                current: 3
            }
        );

        recorder.record_rejected(
            RejectionReason::Malformed(MalformedRequest::OnMissingPayload),
            1,
        );
        let rejected = recorder.latest().copied().unwrap();
        let mut text: heapless::String<96> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{}", rejected.event)).unwrap();
        assert_eq!(
            text.as_str(),
            "command-rejected malformed on request missing on payload"
        );
    }
}
