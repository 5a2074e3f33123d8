#![no_std]

// Shared logic for the simulated jammer controller.
//
// This crate stays portable by avoiding the Rust standard library. The host
// supplies time, timers, and the transmission channel through the traits in
// `rescheduler`; everything else is pure state and value construction.

pub mod command;
pub mod control;
pub mod controller;
pub mod descriptor;
pub mod duty_cycle;
pub mod rescheduler;
pub mod telemetry;

pub use command::{Antenna, AntennaKind, Command, CommandKind, FrequencyPower, NemId, OnParameters};
pub use controller::{
    ActiveTransmission, ControllerState, Generation, JammerController, RequestOutcome, SessionId,
    Transition,
};
pub use descriptor::{MAX_FREQUENCIES, MessageRouting, TransmissionDescriptor};
pub use duty_cycle::{DutyCycleTiming, translate};
pub use rescheduler::{
    ChainStep, Delivery, EpochInstant, RescheduleError, TimerService, TransmissionEmitter,
    TransmissionEvent,
};
