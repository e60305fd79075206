//! Boot-time configuration consumed once by the driver manager.
//!
//! Everything here is plain `Copy` data with `const` defaults, so a firmware
//! image can pick its configuration at compile time and override individual
//! fields from storage.

use crate::error::ConfigError;
use crate::types::{ProtocolType, TransportType};

/// Number of addressable GPIO pins.
pub const MAX_PINS: usize = 32;

/// Input bias for a GPIO pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

/// Direction of a GPIO pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    #[default]
    Input,
    Output,
}

/// Configuration of a single GPIO pin owned by the GPIO transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpioPinConfig {
    pub pin: u8,
    pub pull: Pull,
    pub mode: PinMode,
    /// Debounce window in milliseconds; 0 disables debouncing.
    pub debounce_ms: u32,
}

impl GpioPinConfig {
    #[must_use]
    pub const fn input(pin: u8, pull: Pull) -> Self {
        Self {
            pin,
            pull,
            mode: PinMode::Input,
            debounce_ms: 0,
        }
    }

    #[must_use]
    pub const fn output(pin: u8) -> Self {
        Self {
            pin,
            pull: Pull::None,
            mode: PinMode::Output,
            debounce_ms: 0,
        }
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce_ms: u32) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }
}

/// Validate a pin table: every pin in range, no pin listed twice.
pub fn validate_pins(pins: &[GpioPinConfig]) -> Result<(), ConfigError> {
    for (i, cfg) in pins.iter().enumerate() {
        if cfg.pin as usize >= MAX_PINS {
            return Err(ConfigError::PinOutOfRange(cfg.pin));
        }
        if pins[..i].iter().any(|other| other.pin == cfg.pin) {
            return Err(ConfigError::DuplicatePin(cfg.pin));
        }
    }
    Ok(())
}

/// Tunables for one SNES controller port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SnesConfig {
    /// Multitap address, 0..=3.
    pub controller_id: u8,
    /// Console-driven latch line (input).
    pub latch_pin: u8,
    /// Console-driven clock line (input).
    pub clock_pin: u8,
    /// Serial data line back to the console (output).
    pub data_pin: u8,
    /// Duration of one data bit after the latch pulse.
    pub clock_period_us: u32,
    /// Width of the console's latch pulse.
    pub latch_duration_us: u32,
}

impl SnesConfig {
    pub const DEFAULT: Self = Self {
        controller_id: 0,
        latch_pin: 18,
        clock_pin: 19,
        data_pin: 20,
        clock_period_us: 12,
        latch_duration_us: 12,
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller_id > 3 {
            return Err(ConfigError::ControllerIdOutOfRange(self.controller_id));
        }
        if self.clock_period_us == 0 || self.latch_duration_us == 0 {
            return Err(ConfigError::ZeroTiming);
        }
        validate_pins(&[
            GpioPinConfig::input(self.latch_pin, Pull::Down),
            GpioPinConfig::input(self.clock_pin, Pull::Up),
            GpioPinConfig::output(self.data_pin),
        ])
    }
}

impl Default for SnesConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How the XInput driver treats host authentication requests.
///
/// Neither mode performs a cryptographic handshake. `SimulatedTimer` only
/// reports success after a fixed number of auxiliary ticks and must not be
/// mistaken for security behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum XInputAuth {
    /// Requests are recognised and logged but never complete.
    #[default]
    Disabled,
    /// Requests complete after a fixed tick count and light player 1.
    SimulatedTimer,
}

/// Boot configuration for the driver manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    pub mode: ProtocolType,
    pub preferred_transport: TransportType,
    pub xinput_auth: XInputAuth,
    pub snes: SnesConfig,
}

impl DriverConfig {
    pub const DEFAULT: Self = Self {
        mode: ProtocolType::XInput,
        preferred_transport: TransportType::Usb,
        xinput_auth: XInputAuth::Disabled,
        snes: SnesConfig::DEFAULT,
    };
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
