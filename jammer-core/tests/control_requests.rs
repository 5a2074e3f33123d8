use core::convert::Infallible;
use core::ops::Add;
use core::time::Duration;

use jammer_core::control::{self, ControlResponse};
use jammer_core::descriptor::MessageRouting;
use jammer_core::rescheduler::{
    ChainStep, Delivery, EpochInstant, TimerService, TransmissionEmitter, TransmissionEvent,
};
use jammer_core::telemetry::{RejectionReason, TelemetryEventKind};
use jammer_core::{Generation, JammerController, SessionId, Transition};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct MockInstant(u64);

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_micros()).unwrap())
    }
}

impl EpochInstant for MockInstant {
    fn epoch_micros(&self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct CountingEmitter {
    sent: usize,
    dropping: bool,
}

impl TransmissionEmitter for CountingEmitter {
    fn emit(&mut self, _event: &TransmissionEvent<'_>) -> Delivery {
        if self.dropping {
            return Delivery::Dropped;
        }
        self.sent += 1;
        Delivery::Sent
    }
}

#[derive(Default)]
struct CountingTimer(Vec<Generation>);

impl TimerService for CountingTimer {
    type Instant = MockInstant;
    type Error = Infallible;

    fn schedule_at(&mut self, _deadline: MockInstant, generation: Generation) -> Result<(), Infallible> {
        self.0.push(generation);
        Ok(())
    }
}

fn respond(controller: &mut JammerController<MockInstant>, line: &str) -> String {
    let mut emitter = CountingEmitter::default();
    let mut timer = CountingTimer::default();
    let outcome = controller
        .handle_line(line, MockInstant(0), &mut emitter, &mut timer)
        .unwrap();
    outcome.response.to_string()
}

fn controller() -> JammerController<MockInstant> {
    JammerController::new(SessionId::from_bytes([3; 16]), MessageRouting::new(1, 0, 0))
}

#[test]
fn accepted_requests_answer_ok() {
    let mut controller = controller();

    assert_eq!(
        respond(&mut controller, "on { nem=2 period=1000 duty=10 frequency=5e8@1 }"),
        "OK"
    );
    assert_eq!(respond(&mut controller, "OFF"), "OK");
    assert_eq!(respond(&mut controller, "off"), "OK");
    assert_eq!(controller.state().request_sequence(), 2);
}

#[test]
fn malformed_combinations_answer_with_reason() {
    let mut controller = controller();

    assert_eq!(
        respond(&mut controller, "on"),
        "ERR malformed on request missing on payload"
    );
    assert_eq!(
        respond(&mut controller, "command_off { nem=1 }"),
        "ERR malformed off request has on payload"
    );
    assert_eq!(controller.state().request_sequence(), 0);
    assert_eq!(
        controller.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::CommandRejected(
            RejectionReason::Malformed(jammer_core::control::MalformedRequest::OffWithPayload)
        ))
    );
}

#[test]
fn undecodable_lines_answer_with_syntax_error() {
    let mut controller = controller();

    let response = respond(&mut controller, "on { nem=1 color=red }");
    assert!(response.starts_with("ERR syntax unknown field `color`"), "{response}");

    let response = respond(&mut controller, "jam");
    assert!(response.starts_with("ERR syntax expected request kind"), "{response}");

    assert!(!controller.state().is_on());
    assert_eq!(
        controller.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::CommandRejected(RejectionReason::Syntax))
    );
}

#[test]
fn failure_response_renders_without_description() {
    let response = ControlResponse {
        success: false,
        description: None,
    };
    assert_eq!(response.to_string(), "ERR");
}

#[test]
fn on_stays_committed_when_first_burst_is_dropped() {
    let mut controller = controller();
    let mut emitter = CountingEmitter {
        dropping: true,
        ..CountingEmitter::default()
    };
    let mut timer = CountingTimer::default();
    let request = control::parse("on { nem=4 period=1000 duty=50 frequency=9e8@2 }").unwrap();

    let outcome = controller
        .handle_request(request, MockInstant(0), &mut emitter, &mut timer)
        .unwrap();

    assert_eq!(outcome.response, ControlResponse::ok());
    assert!(matches!(
        outcome.transition,
        Some(Transition::Activated {
            generation: 1,
            replaced: false,
            chain: Some(ChainStep::Dropped {
                generation: 1,
                transmission_sequence: 0,
                next_at: MockInstant(1_000),
            }),
            ..
        })
    ));
    assert!(controller.state().is_on());
    assert_eq!(controller.state().request_sequence(), 1);
    assert_eq!(controller.state().transmission_sequence(), 0);
    assert_eq!(timer.0, vec![1]);
    assert_eq!(
        controller.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::TransmissionDropped)
    );

    emitter.dropping = false;
    let step = controller
        .fire(1, MockInstant(1_000), &mut emitter, &mut timer)
        .unwrap();

    assert!(matches!(
        step,
        ChainStep::Continue {
            transmission_sequence: 0,
            ..
        }
    ));
    assert_eq!(emitter.sent, 1);
    assert_eq!(controller.state().transmission_sequence(), 1);
}
