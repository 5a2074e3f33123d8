//! Command state machine and controller state.
//!
//! [`ControllerState`] is the single piece of mutable state in the system. It
//! is owned by [`JammerController`], which validates requests, applies the
//! ON/OFF transition table, and starts rescheduler chains. The rescheduler
//! reads the same state and only ever advances the transmission sequence.

use core::fmt;

use crate::command::{Command, CommandKind, OnParameters};
use crate::control::grammar;
use crate::control::request::{ControlRequest, MalformedRequest};
use crate::control::response::ControlResponse;
use crate::descriptor::{self, MessageRouting, TransmissionDescriptor};
use crate::duty_cycle::{self, DutyCycleTiming};
use crate::rescheduler::{
    self, ChainStep, EpochInstant, StepError, TimerService, TransmissionEmitter,
};
use crate::telemetry::{RejectionReason, TelemetryRecorder};

/// Value of the request sequence that identifies a rescheduler chain.
pub type Generation = u64;

/// Opaque identifier attached to every transmission of this process.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.0.iter().enumerate() {
            if matches!(index, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Descriptor and timing of the transmission that is currently on.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveTransmission {
    pub descriptor: TransmissionDescriptor,
    pub timing: DutyCycleTiming,
}

/// Process-lifetime controller state.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerState {
    session: SessionId,
    request_sequence: Generation,
    transmission_sequence: u64,
    active: Option<ActiveTransmission>,
}

impl ControllerState {
    /// Creates the initial state: both counters at zero, transmitter off.
    #[must_use]
    pub const fn new(session: SessionId) -> Self {
        Self {
            session,
            request_sequence: 0,
            transmission_sequence: 0,
            active: None,
        }
    }

    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Current generation.
    pub const fn request_sequence(&self) -> Generation {
        self.request_sequence
    }

    /// Sequence number the next emitted transmission will carry.
    pub const fn transmission_sequence(&self) -> u64 {
        self.transmission_sequence
    }

    pub const fn active(&self) -> Option<&ActiveTransmission> {
        self.active.as_ref()
    }

    pub const fn is_on(&self) -> bool {
        self.active.is_some()
    }

    /// Installs a new transmission and starts a new generation.
    pub(crate) fn activate(&mut self, active: ActiveTransmission) -> Generation {
        self.active = Some(active);
        self.bump_generation()
    }

    /// Turns the transmitter off and starts a new generation.
    pub(crate) fn deactivate(&mut self) -> Generation {
        self.active = None;
        self.bump_generation()
    }

    pub(crate) fn advance_transmission_sequence(&mut self) {
        self.transmission_sequence = self.transmission_sequence.wrapping_add(1);
    }

    fn bump_generation(&mut self) -> Generation {
        self.request_sequence = self.request_sequence.wrapping_add(1);
        self.request_sequence
    }
}

/// State change produced by an accepted command.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition<I> {
    /// An ON was applied. `chain` is `None` when the timing is muted.
    Activated {
        generation: Generation,
        replaced: bool,
        timing: DutyCycleTiming,
        chain: Option<ChainStep<I>>,
    },
    /// An OFF stopped the transmitter.
    Deactivated { generation: Generation },
    /// OFF while already off; nothing changed.
    Unchanged,
}

/// Response and state change produced for one control request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOutcome<I> {
    pub response: ControlResponse,
    pub transition: Option<Transition<I>>,
}

impl<I> RequestOutcome<I> {
    fn rejected(response: ControlResponse) -> Self {
        Self {
            response,
            transition: None,
        }
    }
}

/// Command state machine for the simulated jammer.
pub struct JammerController<I>
where
    I: EpochInstant,
{
    state: ControllerState,
    routing: MessageRouting,
    telemetry: TelemetryRecorder<I>,
}

impl<I> JammerController<I>
where
    I: EpochInstant,
{
    /// Creates a controller in the off state.
    #[must_use]
    pub const fn new(session: SessionId, routing: MessageRouting) -> Self {
        Self {
            state: ControllerState::new(session),
            routing,
            telemetry: TelemetryRecorder::new(),
        }
    }

    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    pub const fn routing(&self) -> &MessageRouting {
        &self.routing
    }

    pub const fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    /// Decodes a text request line and handles it.
    ///
    /// Syntax errors are answered with a failure response and leave the state
    /// untouched.
    pub fn handle_line<E, T>(
        &mut self,
        line: &str,
        now: I,
        emitter: &mut E,
        timer: &mut T,
    ) -> Result<RequestOutcome<I>, StepError<T>>
    where
        E: TransmissionEmitter,
        T: TimerService<Instant = I>,
    {
        match grammar::parse(line) {
            Ok(request) => self.handle_request(request, now, emitter, timer),
            Err(error) => {
                self.telemetry.record_rejected(RejectionReason::Syntax, now);
                Ok(RequestOutcome::rejected(ControlResponse::syntax_error(&error)))
            }
        }
    }

    /// Validates a decoded request and applies it.
    pub fn handle_request<E, T>(
        &mut self,
        request: ControlRequest,
        now: I,
        emitter: &mut E,
        timer: &mut T,
    ) -> Result<RequestOutcome<I>, StepError<T>>
    where
        E: TransmissionEmitter,
        T: TimerService<Instant = I>,
    {
        match request.into_command() {
            Ok(command) => {
                let transition = self.apply(command, now, emitter, timer)?;
                Ok(RequestOutcome {
                    response: ControlResponse::ok(),
                    transition: Some(transition),
                })
            }
            Err(malformed) => Ok(self.reject(malformed, now)),
        }
    }

    /// Applies a validated command to the state.
    pub fn apply<E, T>(
        &mut self,
        command: Command,
        now: I,
        emitter: &mut E,
        timer: &mut T,
    ) -> Result<Transition<I>, StepError<T>>
    where
        E: TransmissionEmitter,
        T: TimerService<Instant = I>,
    {
        match command {
            Command::On(on) => self.turn_on(&on, now, emitter, timer),
            Command::Off => Ok(self.turn_off(now)),
        }
    }

    /// Runs a timer firing for the chain of `generation`.
    pub fn fire<E, T>(
        &mut self,
        generation: Generation,
        now: I,
        emitter: &mut E,
        timer: &mut T,
    ) -> Result<ChainStep<I>, StepError<T>>
    where
        E: TransmissionEmitter,
        T: TimerService<Instant = I>,
    {
        let step = rescheduler::fire(&mut self.state, generation, now, emitter, timer)?;
        self.record_step(&step, now);
        Ok(step)
    }

    fn turn_on<E, T>(
        &mut self,
        on: &OnParameters,
        now: I,
        emitter: &mut E,
        timer: &mut T,
    ) -> Result<Transition<I>, StepError<T>>
    where
        E: TransmissionEmitter,
        T: TimerService<Instant = I>,
    {
        let replaced = self.state.is_on();
        let timing = duty_cycle::translate(on.period_micros, on.duty_cycle_percent);
        let descriptor = descriptor::build(on, timing.on_duration_micros, &self.routing);

        let generation = self
            .state
            .activate(ActiveTransmission { descriptor, timing });
        self.telemetry
            .record_accepted(CommandKind::On, generation, now);

        if timing.is_muted() {
            return Ok(Transition::Activated {
                generation,
                replaced,
                timing,
                chain: None,
            });
        }

        self.telemetry.record_chain_started(generation, now);
        let step = rescheduler::start(&mut self.state, generation, now, emitter, timer)?;
        self.record_step(&step, now);

        Ok(Transition::Activated {
            generation,
            replaced,
            timing,
            chain: Some(step),
        })
    }

    fn turn_off(&mut self, now: I) -> Transition<I> {
        if !self.state.is_on() {
            self.telemetry.record_ignored(CommandKind::Off, now);
            return Transition::Unchanged;
        }

        let generation = self.state.deactivate();
        self.telemetry
            .record_accepted(CommandKind::Off, generation, now);
        Transition::Deactivated { generation }
    }

    fn reject(&mut self, malformed: MalformedRequest, now: I) -> RequestOutcome<I> {
        self.telemetry
            .record_rejected(RejectionReason::Malformed(malformed), now);
        RequestOutcome::rejected(ControlResponse::failure(malformed.message()))
    }

    fn record_step(&mut self, step: &ChainStep<I>, now: I) {
        match *step {
            ChainStep::Continue {
                generation,
                transmission_sequence,
                ..
            } => {
                self.telemetry
                    .record_emitted(generation, transmission_sequence, now);
            }
            ChainStep::Dropped {
                generation,
                transmission_sequence,
                ..
            } => {
                self.telemetry
                    .record_dropped(generation, transmission_sequence, now);
            }
            ChainStep::Stale { scheduled, current } => {
                self.telemetry.record_stale(scheduled, current, now);
            }
            ChainStep::Idle { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FrequencyPower;
    use crate::control::request::RequestKind;
    use crate::rescheduler::{Delivery, TransmissionEvent};
    use core::ops::Add;
    use core::time::Duration;
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
    struct CountingEmitter {
        sequences: HeaplessVec<u64, 16>,
    }

    impl TransmissionEmitter for CountingEmitter {
        fn emit(&mut self, event: &TransmissionEvent<'_>) -> Delivery {
            self.sequences.push(event.transmission_sequence).unwrap();
            Delivery::Sent
        }
    }

    #[derive(Default)]
    struct CountingTimer {
        armed: HeaplessVec<(MockInstant, Generation), 16>,
    }

    impl TimerService for CountingTimer {
        type Instant = MockInstant;
        type Error = ();

        fn schedule_at(&mut self, deadline: MockInstant, generation: Generation) -> Result<(), ()> {
            self.armed.push((deadline, generation)).map_err(|_| ())
        }
    }

    struct Harness {
        controller: JammerController<MockInstant>,
        emitter: CountingEmitter,
        timer: CountingTimer,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                controller: JammerController::new(
                    SessionId::from_bytes([1; 16]),
                    MessageRouting::new(0xFFFF, 0, 0),
                ),
                emitter: CountingEmitter::default(),
                timer: CountingTimer::default(),
            }
        }

        fn request(&mut self, request: ControlRequest, at: u64) -> RequestOutcome<MockInstant> {
            self.controller
                .handle_request(request, MockInstant(at), &mut self.emitter, &mut self.timer)
                .expect("request should not fail")
        }
    }

    fn on_request(duty: u32) -> ControlRequest {
        let mut on = OnParameters::new(5, 2_000_000, duty);
        on.frequencies
            .push(FrequencyPower::new(100_000_000, 10.0))
            .unwrap();
        ControlRequest::on(on)
    }

    #[test]
    fn on_while_off_starts_generation_one() {
        let mut harness = Harness::new();

        let outcome = harness.request(on_request(50), 0);

        assert!(outcome.response.success);
        match outcome.transition {
            Some(Transition::Activated {
                generation: 1,
                replaced: false,
                chain: Some(ChainStep::Continue { .. }),
                ..
            }) => {}
            other => panic!("unexpected transition: {other:?}"),
        }
        assert_eq!(harness.controller.state().request_sequence(), 1);
        assert_eq!(harness.emitter.sequences.as_slice(), &[0]);
    }

    #[test]
    fn on_while_on_bumps_generation() {
        let mut harness = Harness::new();
        harness.request(on_request(50), 0);

        let outcome = harness.request(on_request(25), 10);

        match outcome.transition {
            Some(Transition::Activated {
                generation: 2,
                replaced: true,
                ..
            }) => {}
            other => panic!("unexpected transition: {other:?}"),
        }
        assert_eq!(harness.controller.state().request_sequence(), 2);
        let active = harness.controller.state().active().unwrap();
        assert_eq!(active.timing.on_duration_micros, 500_000);
    }

    #[test]
    fn off_while_on_clears_transmission() {
        let mut harness = Harness::new();
        harness.request(on_request(50), 0);

        let outcome = harness.request(ControlRequest::off(), 5);

        assert!(outcome.response.success);
        assert_eq!(
            outcome.transition,
            Some(Transition::Deactivated { generation: 2 })
        );
        assert!(!harness.controller.state().is_on());
    }

    #[test]
    fn off_while_off_is_a_noop() {
        let mut harness = Harness::new();

        let outcome = harness.request(ControlRequest::off(), 0);

        assert!(outcome.response.success);
        assert!(outcome.response.description.is_none());
        assert_eq!(outcome.transition, Some(Transition::Unchanged));
        assert_eq!(harness.controller.state().request_sequence(), 0);
        assert!(harness.emitter.sequences.is_empty());
    }

    #[test]
    fn malformed_requests_leave_state_untouched() {
        let mut harness = Harness::new();
        harness.request(on_request(50), 0);
        let before = harness.controller.state().clone();

        let missing = harness.request(
            ControlRequest {
                kind: RequestKind::On,
                on: None,
            },
            1,
        );
        assert!(!missing.response.success);
        assert_eq!(
            missing.response.description.as_deref(),
            Some("malformed on request missing on payload")
        );

        let extra = harness.request(
            ControlRequest {
                kind: RequestKind::Off,
                on: Some(OnParameters::default()),
            },
            2,
        );
        assert!(!extra.response.success);
        assert_eq!(
            extra.response.description.as_deref(),
            Some("malformed off request has on payload")
        );

        assert_eq!(harness.controller.state(), &before);
    }

    #[test]
    fn zero_duty_cycle_is_accepted_without_chain() {
        let mut harness = Harness::new();

        let outcome = harness.request(on_request(0), 0);

        match outcome.transition {
            Some(Transition::Activated {
                generation: 1,
                chain: None,
                ..
            }) => {}
            other => panic!("unexpected transition: {other:?}"),
        }
        assert!(harness.controller.state().is_on());
        assert!(harness.emitter.sequences.is_empty());
        assert!(harness.timer.armed.is_empty());

        let off = harness.request(ControlRequest::off(), 1);
        assert_eq!(off.transition, Some(Transition::Deactivated { generation: 2 }));
    }

    #[test]
    fn syntax_errors_are_reported_as_failures() {
        let mut harness = Harness::new();

        let outcome = harness
            .controller
            .handle_line(
                "on { nem=5 period=",
                MockInstant(0),
                &mut harness.emitter,
                &mut harness.timer,
            )
            .unwrap();

        assert!(!outcome.response.success);
        let description = outcome.response.description.unwrap();
        assert!(description.starts_with("syntax "));
        assert_eq!(harness.controller.state().request_sequence(), 0);
    }

    #[test]
    fn session_id_formats_like_uuid() {
        let session = SessionId::from_bytes([
            0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef,
        ]);
        let mut text: heapless::String<40> = heapless::String::new();
        core::fmt::write(&mut text, format_args!("{session}")).unwrap();
        assert_eq!(text.as_str(), "12345678-9abc-def0-0123-456789abcdef");
    }
}
