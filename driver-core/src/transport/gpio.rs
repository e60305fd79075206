//! GPIO pin-bank transport.
//!
//! The byte mapping of `send`/`receive` is generic: bit `i` of byte `i / 8`
//! corresponds to pin `i`, covering pins 0..32. Protocols with their own
//! clocking (SNES) use the [`PinBus`] interface instead.

use heapless::Vec;

use super::{PinBus, Transport};
use crate::backend::{GpioBackend, PwmSettings};
use crate::clock::Clock;
use crate::config::{validate_pins, GpioPinConfig, PinMode, MAX_PINS};
use crate::debounce::Debouncer;
use crate::error::TransportError;
use crate::types::TransportType;

/// Bytes covered by the generic byte/pin mapping.
const MAPPED_BYTES: usize = MAX_PINS / 8;

/// Change of the aggregate pin levels between two scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinChange {
    /// Pins whose level changed, as a bitmask.
    pub changed: u32,
    /// Levels of all configured pins after the change.
    pub levels: u32,
}

pub type PinChangeCallback = fn(PinChange);

struct PinState {
    config: GpioPinConfig,
    debouncer: Debouncer,
}

/// Transport over a bank of GPIO pins.
pub struct GpioTransport<G: GpioBackend, C: Clock> {
    backend: G,
    clock: C,
    initialized: bool,
    pins: Vec<PinState, MAX_PINS>,
    pwm_pins: u32,
    levels: u32,
    last_change: Option<PinChange>,
    callback: Option<PinChangeCallback>,
}

#[inline]
const fn bit(pin: u8) -> u32 {
    1 << pin
}

impl<G: GpioBackend, C: Clock> GpioTransport<G, C> {
    pub fn new(backend: G, clock: C) -> Self {
        Self {
            backend,
            clock,
            initialized: false,
            pins: Vec::new(),
            pwm_pins: 0,
            levels: 0,
            last_change: None,
            callback: None,
        }
    }

    /// Called from `process` whenever the aggregate pin levels change.
    pub fn register_callback(&mut self, callback: PinChangeCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Most recent change seen by `process`.
    pub fn last_change(&self) -> Option<PinChange> {
        self.last_change
    }

    pub fn is_pin_configured(&self, pin: u8) -> bool {
        self.find(pin).is_some()
    }

    /// Bitmask of configured pins.
    pub fn configured_mask(&self) -> u32 {
        self.pins.iter().fold(0, |acc, p| acc | bit(p.config.pin))
    }

    /// Drive every output pin selected by `mask` to the matching bit of
    /// `values`. Returns the mask of pins actually driven.
    pub fn set_pins(&mut self, mask: u32, values: u32) -> u32 {
        let mut driven = 0;
        for pin in 0..MAX_PINS as u8 {
            if mask & bit(pin) != 0 && self.set_pin(pin, values & bit(pin) != 0).is_ok() {
                driven |= bit(pin);
            }
        }
        driven
    }

    /// Levels of the configured pins selected by `mask`.
    pub fn get_pins(&mut self, mask: u32) -> u32 {
        let mut levels = 0;
        for pin in 0..MAX_PINS as u8 {
            if mask & bit(pin) != 0 && self.get_pin(pin).unwrap_or(false) {
                levels |= bit(pin);
            }
        }
        levels
    }

    /// Route an output pin to its PWM slice.
    ///
    /// `duty_permille` is clamped to 0..=1000.
    pub fn enable_pwm(
        &mut self,
        pin: u8,
        frequency_hz: u32,
        duty_permille: u16,
    ) -> Result<(), TransportError> {
        match self.find(pin) {
            Some(i) if self.pins[i].config.mode == PinMode::Output => {}
            _ => return Err(TransportError::InvalidArgument),
        }
        if frequency_hz == 0 {
            return Err(TransportError::InvalidArgument);
        }
        let settings = pwm_settings(self.backend.sys_clock_hz(), frequency_hz, duty_permille);
        self.backend.apply_pwm(pin, settings)?;
        self.pwm_pins |= bit(pin);
        debug!(
            "gpio: pwm on pin {} div={} wrap={} level={}",
            pin,
            settings.divider,
            settings.wrap,
            settings.level
        );
        Ok(())
    }

    pub fn disable_pwm(&mut self, pin: u8) {
        if self.is_pwm_enabled(pin) {
            self.backend.disable_pwm(pin);
            self.pwm_pins &= !bit(pin);
        }
    }

    pub fn is_pwm_enabled(&self, pin: u8) -> bool {
        (pin as usize) < MAX_PINS && self.pwm_pins & bit(pin) != 0
    }

    pub fn backend(&self) -> &G {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut G {
        &mut self.backend
    }

    fn find(&self, pin: u8) -> Option<usize> {
        self.pins.iter().position(|p| p.config.pin == pin)
    }

    fn level_of(&mut self, index: usize) -> bool {
        let state = &self.pins[index];
        if state.config.debounce_ms == 0 {
            self.backend.read(state.config.pin)
        } else {
            state.debouncer.level()
        }
    }

    fn aggregate_levels(&mut self) -> u32 {
        let mut levels = 0;
        for i in 0..self.pins.len() {
            if self.level_of(i) {
                levels |= bit(self.pins[i].config.pin);
            }
        }
        levels
    }

    fn release_all(&mut self) {
        for pin in 0..MAX_PINS as u8 {
            self.disable_pwm(pin);
        }
        for state in self.pins.iter() {
            self.backend.release(state.config.pin);
        }
        self.pins.clear();
        self.levels = 0;
    }

    fn claim(&mut self, config: &GpioPinConfig, now_us: u64) -> Result<(), TransportError> {
        match config.mode {
            PinMode::Input => self.backend.configure_input(config.pin, config.pull)?,
            PinMode::Output => {
                self.backend.configure_output(config.pin)?;
                self.backend.set_output(config.pin, false);
            }
        }
        let level = self.backend.read(config.pin);
        let state = PinState {
            config: *config,
            debouncer: Debouncer::new(level, config.debounce_ms, now_us),
        };
        // Capacity equals MAX_PINS and pins were validated unique and in range.
        self.pins
            .push(state)
            .map_err(|_| TransportError::InvalidArgument)
    }
}

/// Compute PWM divider, wrap and compare level for a target frequency.
///
/// The divider is rounded up so that the wrap value always fits the 16-bit
/// counter.
#[must_use]
pub fn pwm_settings(sys_clock_hz: u32, frequency_hz: u32, duty_permille: u16) -> PwmSettings {
    let clock = sys_clock_hz as u64;
    let frequency = (frequency_hz as u64).max(1);
    let divider = clock.div_ceil(frequency * 65_536).clamp(1, 255);
    let wrap = (clock / (frequency * divider))
        .saturating_sub(1)
        .min(u16::MAX as u64);
    let duty = duty_permille.min(1000) as u64;
    PwmSettings {
        divider: divider as u8,
        wrap: wrap as u16,
        level: (wrap * duty / 1000) as u16,
    }
}

impl<G: GpioBackend, C: Clock> PinBus for GpioTransport<G, C> {
    fn configure_pins(&mut self, pins: &[GpioPinConfig]) -> Result<(), TransportError> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        validate_pins(pins).map_err(|_| TransportError::InvalidArgument)?;

        self.release_all();
        let now = self.clock.now_us();
        for config in pins {
            if let Err(e) = self.claim(config, now) {
                warn!("gpio: failed to claim pin {}: {:?}", config.pin, e);
                self.release_all();
                return Err(e);
            }
        }
        self.levels = self.aggregate_levels();
        debug!("gpio: {} pins configured", self.pins.len());
        Ok(())
    }

    fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), TransportError> {
        match self.find(pin) {
            Some(i) if self.pins[i].config.mode == PinMode::Output => {}
            _ => return Err(TransportError::InvalidArgument),
        }
        if self.is_pwm_enabled(pin) {
            return Err(TransportError::Busy);
        }
        self.backend.set_output(pin, high);
        Ok(())
    }

    fn get_pin(&mut self, pin: u8) -> Result<bool, TransportError> {
        let index = self.find(pin).ok_or(TransportError::InvalidArgument)?;
        Ok(self.level_of(index))
    }
}

impl<G: GpioBackend, C: Clock> Transport for GpioTransport<G, C> {
    fn initialize(&mut self) -> Result<(), TransportError> {
        if !self.initialized {
            self.initialized = true;
            info!("gpio: transport initialized");
        }
        Ok(())
    }

    fn deinitialize(&mut self) {
        if !self.initialized {
            return;
        }
        self.release_all();
        self.callback = None;
        self.last_change = None;
        self.initialized = false;
        info!("gpio: transport deinitialized");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_ready(&self) -> bool {
        self.initialized && !self.pins.is_empty()
    }

    /// Drive output pins from the payload. Input and unconfigured pins are
    /// left untouched. Returns the number of bytes consumed (at most 4).
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        if data.is_empty() {
            return Err(TransportError::InvalidArgument);
        }
        let count = data.len().min(MAPPED_BYTES);
        for (i, byte) in data[..count].iter().enumerate() {
            for b in 0..8u8 {
                let pin = (i * 8) as u8 + b;
                let _ = self.set_pin(pin, byte & (1 << b) != 0);
            }
        }
        Ok(count)
    }

    /// Read configured pin levels into the buffer; unconfigured pins read 0.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        if buf.is_empty() {
            return Err(TransportError::InvalidArgument);
        }
        let count = buf.len().min(MAPPED_BYTES);
        let levels = self.get_pins(u32::MAX);
        for (i, byte) in buf[..count].iter_mut().enumerate() {
            *byte = (levels >> (i * 8)) as u8;
        }
        Ok(count)
    }

    fn process(&mut self) {
        if !self.initialized {
            return;
        }
        let now = self.clock.now_us();
        for state in self.pins.iter_mut() {
            if state.config.debounce_ms > 0 {
                let raw = self.backend.read(state.config.pin);
                state.debouncer.update(raw, now);
            }
        }

        let levels = self.aggregate_levels();
        if levels != self.levels {
            let change = PinChange {
                changed: levels ^ self.levels,
                levels,
            };
            trace!("gpio: levels {:?}", change);
            self.levels = levels;
            self.last_change = Some(change);
            if let Some(callback) = self.callback {
                callback(change);
            }
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Gpio
    }

    fn pin_bus(&mut self) -> Option<&mut dyn PinBus> {
        Some(self)
    }
}

impl<G: GpioBackend, C: Clock> Drop for GpioTransport<G, C> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
