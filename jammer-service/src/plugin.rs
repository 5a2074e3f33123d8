//! Service lifecycle and the single-threaded event loop.
//!
//! The loop owns the controller, the timer queue, and the multicast channel.
//! Control requests and timer firings are dispatched one at a time, so the
//! controller never observes concurrent access.

use std::convert::Infallible;
use std::future::{self, Future};
use std::net::SocketAddr;

use jammer_core::rescheduler::{ChainStep, RescheduleError};
use jammer_core::telemetry::TelemetryEventKind;
use jammer_core::{EpochInstant, JammerController, SessionId, Transition};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::MulticastChannel;
use crate::config::ServiceConfig;
use crate::error::{Phase, ServiceError};
use crate::timer::{HostInstant, HostTimerQueue};
use crate::transport::{self, REQUEST_QUEUE_DEPTH, RequestLine};

type Controller = JammerController<HostInstant>;

/// Simulated jammer service hosting one controller.
pub struct JammerService {
    config: ServiceConfig,
    phase: Phase,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    channel: Option<MulticastChannel>,
    controller: Option<Controller>,
    timers: HostTimerQueue,
    requests: Option<mpsc::Receiver<RequestLine>>,
    transport: Option<JoinHandle<()>>,
}

impl JammerService {
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            phase: Phase::Created,
            listener: None,
            local_addr: None,
            channel: None,
            controller: None,
            timers: HostTimerQueue::new(),
            requests: None,
            transport: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Address the control listener is bound to once initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }

    /// Binds the control endpoint, opens the multicast channel, and creates the controller.
    pub async fn initialize(&mut self) -> Result<(), ServiceError> {
        self.expect_phase("initialize", Phase::Created)?;

        let config = &self.config;
        info!(endpoint = %config.endpoint, "control endpoint");
        info!(
            group = %config.ota_channel.group,
            port = config.ota_channel.port,
            device = ?config.ota_channel.device,
            ttl = config.ota_channel.ttl,
            loopback = config.ota_channel.loopback,
            "ota channel"
        );
        info!(
            destination = config.ota_message.destination,
            registration_id = config.ota_message.registration_id,
            sub_id = config.ota_message.sub_id,
            "ota message"
        );

        let listener = TcpListener::bind(config.endpoint)
            .await
            .map_err(|source| ServiceError::Bind {
                addr: config.endpoint,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServiceError::Bind {
                addr: config.endpoint,
                source,
            })?;
        let channel = MulticastChannel::open(&config.ota_channel)
            .await
            .map_err(ServiceError::Channel)?;

        let session = Uuid::new_v4();
        let controller = JammerController::new(
            SessionId::from_bytes(session.into_bytes()),
            config.routing(),
        );
        info!(%session, control = %local_addr, ota = %channel.target(), "initialized");

        self.listener = Some(listener);
        self.local_addr = Some(local_addr);
        self.channel = Some(channel);
        self.controller = Some(controller);
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// Starts accepting control connections.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        self.expect_phase("start", Phase::Initialized)?;
        let Some(listener) = self.listener.take() else {
            return Err(self.lifecycle_error("start"));
        };

        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        self.transport = Some(transport::spawn_listener(listener, requests_tx));
        self.requests = Some(requests_rx);
        self.phase = Phase::Running;
        info!("started");
        Ok(())
    }

    /// Runs the event loop until `shutdown` resolves or the transport stops.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()>,
    {
        self.expect_phase("run", Phase::Running)?;
        let phase = self.phase;
        let (Some(requests), Some(controller), Some(channel)) = (
            self.requests.as_mut(),
            self.controller.as_mut(),
            self.channel.as_mut(),
        ) else {
            return Err(ServiceError::Lifecycle {
                operation: "run",
                phase,
            });
        };
        let timers = &mut self.timers;

        tokio::pin!(shutdown);
        loop {
            let next_deadline = timers.next_deadline();
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
                () = sleep_until(next_deadline) => {
                    fire_due(controller, channel, timers);
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        return Err(ServiceError::TransportClosed);
                    };
                    handle_request(controller, channel, timers, request);
                }
            }
        }
    }

    /// Stops accepting control requests and logs a telemetry summary.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        self.expect_phase("stop", Phase::Running)?;

        if let Some(transport) = self.transport.take() {
            transport.abort();
        }
        self.requests = None;

        if let (Some(controller), Some(channel)) = (&self.controller, &self.channel) {
            log_summary(controller, channel, self.timers.len());
        }

        self.phase = Phase::Stopped;
        info!("stopped");
        Ok(())
    }

    /// Releases the listener, the channel, and the controller.
    pub fn destroy(&mut self) -> Result<(), ServiceError> {
        if matches!(self.phase, Phase::Running | Phase::Destroyed) {
            return Err(self.lifecycle_error("destroy"));
        }

        self.listener = None;
        self.local_addr = None;
        self.channel = None;
        self.controller = None;
        self.timers = HostTimerQueue::new();
        self.phase = Phase::Destroyed;
        info!("destroyed");
        Ok(())
    }

    fn expect_phase(&self, operation: &'static str, expected: Phase) -> Result<(), ServiceError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(self.lifecycle_error(operation))
        }
    }

    fn lifecycle_error(&self, operation: &'static str) -> ServiceError {
        ServiceError::Lifecycle {
            operation,
            phase: self.phase,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

fn fire_due(
    controller: &mut Controller,
    channel: &mut MulticastChannel,
    timers: &mut HostTimerQueue,
) {
    // Entries armed while draining are due strictly later than this.
    let due_by = Instant::now();
    while let Some(generation) = timers.pop_due(due_by) {
        let step = settled(controller.fire(generation, HostInstant::now(), channel, timers));
        log_step(&step);
    }
}

fn handle_request(
    controller: &mut Controller,
    channel: &mut MulticastChannel,
    timers: &mut HostTimerQueue,
    request: RequestLine,
) {
    let RequestLine { peer, line, reply } = request;
    info!(%peer, request = line.trim(), "control request");

    let outcome = settled(controller.handle_line(&line, HostInstant::now(), channel, timers));
    if let Some(transition) = &outcome.transition {
        log_transition(transition);
    }

    let response = outcome.response;
    if !response.success {
        warn!(%peer, %response, "request rejected");
    }
    if reply.send(response.to_string()).is_err() {
        debug!(%peer, "control client left before the reply");
    }
}

/// Unwraps a chain result; the host timer queue never fails to arm.
fn settled<O>(result: Result<O, RescheduleError<Infallible>>) -> O {
    match result {
        Ok(output) => output,
        Err(RescheduleError::Timer(never)) => match never {},
    }
}

fn log_transition(transition: &Transition<HostInstant>) {
    match transition {
        Transition::Activated {
            generation,
            replaced,
            timing,
            chain,
        } => {
            info!(
                generation,
                replaced,
                on_duration_micros = timing.on_duration_micros,
                period_seconds = timing.period_seconds(),
                "jammer on"
            );
            match chain {
                Some(step) => log_step(step),
                None => info!(generation, "zero on-duration, no transmissions scheduled"),
            }
        }
        Transition::Deactivated { generation } => info!(generation, "jammer off"),
        Transition::Unchanged => info!("jammer already off"),
    }
}

fn log_step(step: &ChainStep<HostInstant>) {
    match step {
        ChainStep::Continue {
            generation,
            transmission_sequence,
            next_at,
        } => debug!(
            generation,
            transmission_sequence,
            next_at_micros = next_at.epoch_micros(),
            "transmission sent"
        ),
        ChainStep::Dropped {
            generation,
            transmission_sequence,
            next_at,
        } => warn!(
            generation,
            transmission_sequence,
            next_at_micros = next_at.epoch_micros(),
            "transmission dropped, next firing armed"
        ),
        ChainStep::Stale { scheduled, current } => info!(
            "transmission was scheduled for generation {scheduled} but current generation is {current}, skipping"
        ),
        ChainStep::Idle { generation } => debug!(generation, "chain idle"),
    }
}

fn log_summary(controller: &Controller, channel: &MulticastChannel, pending_timers: usize) {
    let telemetry = controller.telemetry();
    let (emitted, skipped) =
        telemetry
            .oldest_first()
            .fold((0usize, 0usize), |(emitted, skipped), record| match record.event {
                TelemetryEventKind::TransmissionEmitted => (emitted + 1, skipped),
                TelemetryEventKind::StaleFireSkipped => (emitted, skipped + 1),
                _ => (emitted, skipped),
            });

    info!(
        records = telemetry.len(),
        recent_emissions = emitted,
        recent_skips = skipped,
        generation = controller.state().request_sequence(),
        transmission_sequence = controller.state().transmission_sequence(),
        frames_sent = channel.sent(),
        frames_dropped = channel.dropped(),
        pending_timers,
        "telemetry summary"
    );
}
