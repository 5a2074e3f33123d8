//! Generation-guarded periodic rescheduling.
//!
//! A chain is a sequence of timer firings that all carry the generation that
//! was current when the chain started. Every firing compares that value with
//! the controller's request sequence: on a match it emits one burst and arms
//! the next firing, even when the channel dropped the burst. On a mismatch it
//! stops without arming anything. Nothing
//! ever cancels a timer; a superseded chain fires at most once more and then
//! ends itself.
//!
//! The host owns the clock, the timer queue, and the transmission channel and
//! exposes them through the traits below. The host must dispatch firings and
//! control requests one at a time; the check-then-emit sequence in [`fire`]
//! relies on that.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use crate::controller::{ControllerState, Generation, SessionId};
use crate::descriptor::TransmissionDescriptor;

/// Instant type supplied by the host clock.
pub trait EpochInstant: Copy + Add<Duration, Output = Self> {
    /// Wall-clock microseconds since the Unix epoch, rounded to nearest.
    fn epoch_micros(&self) -> u64;
}

/// One burst handed to the transmission channel.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionEvent<'a> {
    pub descriptor: &'a TransmissionDescriptor,
    pub timestamp_micros: u64,
    pub transmission_sequence: u64,
    pub session: SessionId,
}

/// Whether a burst left the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    Sent,
    /// The channel could not take the burst. The emitter reports the cause.
    Dropped,
}

/// Channel that carries transmission events to the emulated network.
pub trait TransmissionEmitter {
    /// Sends the event without waiting for any acknowledgment.
    ///
    /// A dropped burst is not retried; the next firing replaces it.
    fn emit(&mut self, event: &TransmissionEvent<'_>) -> Delivery;
}

/// Host timer capability consumed by the rescheduler.
pub trait TimerService {
    /// Instant type used for deadlines.
    type Instant: Copy;
    /// Timer-specific error type.
    type Error;

    /// Arranges for the chain of `generation` to fire again at `deadline`.
    ///
    /// Entries are never cancelled.
    fn schedule_at(
        &mut self,
        deadline: Self::Instant,
        generation: Generation,
    ) -> Result<(), Self::Error>;
}

/// Result of one chain firing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChainStep<I> {
    /// A burst was emitted and the next firing is armed.
    Continue {
        generation: Generation,
        transmission_sequence: u64,
        next_at: I,
    },
    /// The channel dropped the burst. The sequence is not advanced and the
    /// next firing is armed anyway.
    Dropped {
        generation: Generation,
        transmission_sequence: u64,
        next_at: I,
    },
    /// The chain was superseded; nothing was emitted or armed.
    Stale {
        scheduled: Generation,
        current: Generation,
    },
    /// The generation is current but nothing is transmitting.
    Idle { generation: Generation },
}

impl<I> ChainStep<I> {
    /// Returns `true` when the chain armed its next firing.
    pub const fn is_armed(&self) -> bool {
        matches!(
            self,
            ChainStep::Continue { .. } | ChainStep::Dropped { .. }
        )
    }
}

/// Failure reported by the host while running a chain step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RescheduleError<T> {
    /// The next firing could not be armed. The chain has ended.
    Timer(T),
}

impl<T: fmt::Display> fmt::Display for RescheduleError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescheduleError::Timer(err) => write!(f, "timer arm failed: {err}"),
        }
    }
}

/// Error type produced for a given timer service.
pub type StepError<T> = RescheduleError<<T as TimerService>::Error>;

/// Starts a chain for `generation`; the first burst goes out immediately.
pub fn start<I, E, T>(
    state: &mut ControllerState,
    generation: Generation,
    now: I,
    emitter: &mut E,
    timer: &mut T,
) -> Result<ChainStep<I>, StepError<T>>
where
    I: EpochInstant,
    E: TransmissionEmitter,
    T: TimerService<Instant = I>,
{
    fire(state, generation, now, emitter, timer)
}

/// Runs one firing of the chain for `generation`.
pub fn fire<I, E, T>(
    state: &mut ControllerState,
    generation: Generation,
    now: I,
    emitter: &mut E,
    timer: &mut T,
) -> Result<ChainStep<I>, StepError<T>>
where
    I: EpochInstant,
    E: TransmissionEmitter,
    T: TimerService<Instant = I>,
{
    let current = state.request_sequence();
    if current != generation {
        return Ok(ChainStep::Stale {
            scheduled: generation,
            current,
        });
    }

    let transmission_sequence = state.transmission_sequence();
    let (delivery, period) = {
        let Some(active) = state.active() else {
            return Ok(ChainStep::Idle { generation });
        };

        let event = TransmissionEvent {
            descriptor: &active.descriptor,
            timestamp_micros: now.epoch_micros(),
            transmission_sequence,
            session: state.session(),
        };
        (emitter.emit(&event), active.timing.period)
    };
    if delivery == Delivery::Sent {
        state.advance_transmission_sequence();
    }

    let next_at = now + period;
    timer
        .schedule_at(next_at, generation)
        .map_err(RescheduleError::Timer)?;

    Ok(match delivery {
        Delivery::Sent => ChainStep::Continue {
            generation,
            transmission_sequence,
            next_at,
        },
        Delivery::Dropped => ChainStep::Dropped {
            generation,
            transmission_sequence,
            next_at,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{FrequencyPower, OnParameters};
    use crate::controller::ActiveTransmission;
    use crate::descriptor::{self, MessageRouting};
    use crate::duty_cycle::translate;
    use heapless::Vec as HeaplessVec;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + rhs.as_micros() as u64)
        }
    }

    impl EpochInstant for MockInstant {
        fn epoch_micros(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        sent: HeaplessVec<(u64, u64), 8>,
        fail: bool,
    }

    impl TransmissionEmitter for RecordingEmitter {
        fn emit(&mut self, event: &TransmissionEvent<'_>) -> Delivery {
            if self.fail {
                return Delivery::Dropped;
            }
            self.sent
                .push((event.transmission_sequence, event.timestamp_micros))
                .unwrap();
            Delivery::Sent
        }
    }

    #[derive(Default)]
    struct RecordingTimer {
        armed: HeaplessVec<(MockInstant, Generation), 8>,
    }

    impl TimerService for RecordingTimer {
        type Instant = MockInstant;
        type Error = ();

        fn schedule_at(&mut self, deadline: MockInstant, generation: Generation) -> Result<(), ()> {
            self.armed.push((deadline, generation)).map_err(|_| ())
        }
    }

    fn active_state() -> (ControllerState, Generation) {
        let mut on = OnParameters::new(5, 2_000_000, 50);
        on.frequencies
            .push(FrequencyPower::new(100_000_000, 10.0))
            .unwrap();
        let timing = translate(on.period_micros, on.duty_cycle_percent);
        let descriptor =
            descriptor::build(&on, timing.on_duration_micros, &MessageRouting::new(1, 2, 3));

        let mut state = ControllerState::new(SessionId::from_bytes([7; 16]));
        let generation = state.activate(ActiveTransmission { descriptor, timing });
        (state, generation)
    }

    #[test]
    fn current_generation_emits_and_rearms() {
        let (mut state, generation) = active_state();
        let mut emitter = RecordingEmitter::default();
        let mut timer = RecordingTimer::default();

        let step = start(&mut state, generation, MockInstant(10), &mut emitter, &mut timer)
            .expect("step should succeed");

        assert_eq!(
            step,
            ChainStep::Continue {
                generation,
                transmission_sequence: 0,
                next_at: MockInstant(2_000_010),
            }
        );
        assert_eq!(emitter.sent.as_slice(), &[(0, 10)]);
        assert_eq!(timer.armed.as_slice(), &[(MockInstant(2_000_010), generation)]);
        assert_eq!(state.transmission_sequence(), 1);
    }

    #[test]
    fn stale_generation_neither_emits_nor_rearms() {
        let (mut state, generation) = active_state();
        state.deactivate();
        let mut emitter = RecordingEmitter::default();
        let mut timer = RecordingTimer::default();

        let step = fire(&mut state, generation, MockInstant(5), &mut emitter, &mut timer)
            .expect("stale step should succeed");

        assert_eq!(
            step,
            ChainStep::Stale {
                scheduled: generation,
                current: generation + 1,
            }
        );
        assert!(emitter.sent.is_empty());
        assert!(timer.armed.is_empty());
        assert_eq!(state.transmission_sequence(), 0);
    }

    #[test]
    fn inactive_current_generation_is_idle() {
        let mut state = ControllerState::new(SessionId::from_bytes([0; 16]));
        let mut emitter = RecordingEmitter::default();
        let mut timer = RecordingTimer::default();

        let step = fire(&mut state, 0, MockInstant(0), &mut emitter, &mut timer).unwrap();

        assert_eq!(step, ChainStep::Idle { generation: 0 });
        assert!(emitter.sent.is_empty());
        assert!(timer.armed.is_empty());
    }

    #[test]
    fn dropped_burst_rearms_without_counting() {
        let (mut state, generation) = active_state();
        let mut emitter = RecordingEmitter {
            fail: true,
            ..RecordingEmitter::default()
        };
        let mut timer = RecordingTimer::default();

        let step = fire(&mut state, generation, MockInstant(0), &mut emitter, &mut timer).unwrap();

        assert_eq!(
            step,
            ChainStep::Dropped {
                generation,
                transmission_sequence: 0,
                next_at: MockInstant(2_000_000),
            }
        );
        assert!(step.is_armed());
        assert_eq!(timer.armed.as_slice(), &[(MockInstant(2_000_000), generation)]);
        assert_eq!(state.transmission_sequence(), 0);

        emitter.fail = false;
        let step = fire(
            &mut state,
            generation,
            MockInstant(2_000_000),
            &mut emitter,
            &mut timer,
        )
        .unwrap();
        assert!(matches!(
            step,
            ChainStep::Continue {
                transmission_sequence: 0,
                ..
            }
        ));
        assert_eq!(state.transmission_sequence(), 1);
    }

    #[test]
    fn timer_failure_ends_chain_after_emitting() {
        struct FullTimer;

        impl TimerService for FullTimer {
            type Instant = MockInstant;
            type Error = &'static str;

            fn schedule_at(&mut self, _: MockInstant, _: Generation) -> Result<(), &'static str> {
                Err("queue full")
            }
        }

        let (mut state, generation) = active_state();
        let mut emitter = RecordingEmitter::default();

        let error = fire(&mut state, generation, MockInstant(0), &mut emitter, &mut FullTimer)
            .expect_err("arm failure should surface");

        assert_eq!(error, RescheduleError::Timer("queue full"));
        assert_eq!(emitter.sent.len(), 1);
    }
}
