//! Validated controller commands.
//!
//! The wire request allows an ON without parameters and an OFF with
//! parameters; [`Command`] does not. Conversion happens once at the decoding
//! boundary in [`crate::control::request`].

use heapless::Vec;

use crate::descriptor::MAX_FREQUENCIES;

/// Identifier of the emulated radio that sources the transmissions.
pub type NemId = u16;

/// Commands accepted by the controller state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    On(OnParameters),
    Off,
}

impl Command {
    /// Short label used in logs and telemetry.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Command::On(_) => CommandKind::On,
            Command::Off => CommandKind::Off,
        }
    }
}

/// Discriminant of a [`Command`] without its payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandKind {
    On,
    Off,
}

impl core::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandKind::On => f.write_str("on"),
            CommandKind::Off => f.write_str("off"),
        }
    }
}

/// Parameters carried by an ON command.
#[derive(Clone, Debug, PartialEq)]
pub struct OnParameters {
    pub nem_id: NemId,
    pub period_micros: u64,
    pub duty_cycle_percent: u32,
    pub bandwidth_hz: u64,
    pub frequencies: Vec<FrequencyPower, MAX_FREQUENCIES>,
    pub antenna: Antenna,
    pub spectral_mask_index: u16,
}

impl OnParameters {
    /// Creates parameters with no frequencies and a profile-defined antenna.
    #[must_use]
    pub const fn new(nem_id: NemId, period_micros: u64, duty_cycle_percent: u32) -> Self {
        Self {
            nem_id,
            period_micros,
            duty_cycle_percent,
            bandwidth_hz: 0,
            frequencies: Vec::new(),
            antenna: Antenna::profile_defined(),
            spectral_mask_index: 0,
        }
    }
}

impl Default for OnParameters {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

/// One jammed frequency and the power transmitted on it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrequencyPower {
    pub frequency_hz: u64,
    pub power_dbm: f32,
}

impl FrequencyPower {
    #[must_use]
    pub const fn new(frequency_hz: u64, power_dbm: f32) -> Self {
        Self {
            frequency_hz,
            power_dbm,
        }
    }
}

/// Antenna model requested for the transmissions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AntennaKind {
    /// Ideal omnidirectional antenna with a fixed gain.
    IdealOmni,
    /// Antenna gain comes from the receiver's antenna profile.
    ProfileDefined,
    /// Any antenna type the controller does not know; treated like a profile.
    Unrecognized,
}

/// Antenna selection carried by an ON command.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Antenna {
    pub kind: AntennaKind,
    pub fixed_gain_dbi: f32,
}

impl Antenna {
    /// Ideal omni antenna with the given fixed gain.
    #[must_use]
    pub const fn ideal_omni(fixed_gain_dbi: f32) -> Self {
        Self {
            kind: AntennaKind::IdealOmni,
            fixed_gain_dbi,
        }
    }

    /// Antenna whose gain is resolved downstream.
    #[must_use]
    pub const fn profile_defined() -> Self {
        Self {
            kind: AntennaKind::ProfileDefined,
            fixed_gain_dbi: 0.0,
        }
    }

    /// Gain override carried in transmissions, present only for ideal omni.
    #[must_use]
    pub const fn gain_override(&self) -> Option<f32> {
        match self.kind {
            AntennaKind::IdealOmni => Some(self.fixed_gain_dbi),
            AntennaKind::ProfileDefined | AntennaKind::Unrecognized => None,
        }
    }
}
