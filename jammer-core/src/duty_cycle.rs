//! Duty cycle to burst timing translation.
//!
//! A burst is transmitted once per period and lasts for the on-duration. A
//! 100% duty cycle is a CW tone: it is emulated with fixed one second bursts
//! re-armed every 800ms so consecutive bursts overlap and scheduling jitter
//! never opens a gap. Receivers ignore energy from the same source in the same
//! time bin, so the overlap is harmless.

use core::time::Duration;

/// Duty cycle that is treated as a continuous tone.
pub const CW_DUTY_CYCLE_PERCENT: u32 = 100;

/// Burst length used for continuous tones.
pub const CW_ON_DURATION_MICROS: u64 = 1_000_000;

/// Re-arm period used for continuous tones.
pub const CW_PERIOD: Duration = Duration::from_millis(800);

/// Burst timing derived from a period and duty cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DutyCycleTiming {
    /// Length of each burst in microseconds.
    pub on_duration_micros: u64,
    /// Interval between consecutive bursts.
    pub period: Duration,
}

impl DutyCycleTiming {
    /// Period expressed in fractional seconds.
    #[must_use]
    pub fn period_seconds(&self) -> f64 {
        self.period.as_secs_f64()
    }

    /// Returns `true` when the timing yields no on-time at all.
    #[must_use]
    pub const fn is_muted(&self) -> bool {
        self.on_duration_micros == 0
    }
}

/// Translates a period and duty cycle into burst timing.
///
/// Ranges are not validated: percentages above 100 produce an on-duration
/// longer than the period, and the widened arithmetic saturates instead of
/// overflowing.
#[must_use]
pub fn translate(period_micros: u64, duty_cycle_percent: u32) -> DutyCycleTiming {
    if duty_cycle_percent == CW_DUTY_CYCLE_PERCENT {
        return DutyCycleTiming {
            on_duration_micros: CW_ON_DURATION_MICROS,
            period: CW_PERIOD,
        };
    }

    let on_time = u128::from(period_micros) * u128::from(duty_cycle_percent) / 100;

    DutyCycleTiming {
        on_duration_micros: u64::try_from(on_time).unwrap_or(u64::MAX),
        period: Duration::from_micros(period_micros),
    }
}
