//! SNES controller emulation over GPIO.
//!
//! The console is the bus master: it pulses the latch line, then pulses the
//! clock line sixteen times and samples the data line while the clock is low.
//! Each `process` arms a response word; `process_aux` follows the console's
//! edges, presenting bit 0 on the latch and the next bit on every rising clock
//! edge. Bits are active-low.
//!
//! The driver sees the lines only when `process_aux` runs, so it must be called
//! at least every [`ProtocolDriver::service_interval_us`]. The configured latch
//! and clock timing set that interval and bound how long a read may take.

use super::{check_bound, check_supported, ProtocolDriver};
use crate::bitbang::{msb_first_bit, EdgeDetector, ShiftSchedule};
use crate::clock::Clock;
use crate::config::{GpioPinConfig, Pull, SnesConfig};
use crate::error::{ConfigError, DriverError};
use crate::transport::{PinBus, Transport};
use crate::types::{Buttons, Dpad, GamepadSnapshot, ProtocolType, TransportType};

/// A poll that has not completed this long after arming is abandoned.
pub const SNES_POLL_TIMEOUT_US: u64 = 100_000;

const PREFERRED: &[TransportType] = &[TransportType::Gpio];

const WORD_BITS: u8 = 16;

/// Bit assignment of the 16-bit response word (MSB is shifted out first).
pub mod button {
    pub const B: u16 = 0x8000;
    pub const Y: u16 = 0x4000;
    pub const SELECT: u16 = 0x2000;
    pub const START: u16 = 0x1000;
    pub const UP: u16 = 0x0800;
    pub const DOWN: u16 = 0x0400;
    pub const LEFT: u16 = 0x0200;
    pub const RIGHT: u16 = 0x0100;
    pub const A: u16 = 0x0080;
    pub const X: u16 = 0x0040;
    pub const L: u16 = 0x0020;
    pub const R: u16 = 0x0010;
}

/// Pressed SNES buttons for a snapshot, active-high.
#[must_use]
pub fn snes_buttons(snapshot: &GamepadSnapshot) -> u16 {
    let mut pressed = 0;
    for (b, mask) in [
        (Buttons::B1, button::B),
        (Buttons::B2, button::A),
        (Buttons::B3, button::Y),
        (Buttons::B4, button::X),
        (Buttons::L1, button::L),
        (Buttons::R1, button::R),
        (Buttons::S1, button::SELECT),
        (Buttons::S2, button::START),
    ] {
        if snapshot.pressed(b) {
            pressed |= mask;
        }
    }
    for (dir, mask) in [
        (Dpad::UP, button::UP),
        (Dpad::DOWN, button::DOWN),
        (Dpad::LEFT, button::LEFT),
        (Dpad::RIGHT, button::RIGHT),
    ] {
        if snapshot.pressed_dpad(dir) {
            pressed |= mask;
        }
    }
    pressed
}

/// Wire word for a snapshot: active-low, so released buttons read 1.
#[inline]
#[must_use]
pub fn snes_word(snapshot: &GamepadSnapshot) -> u16 {
    !snes_buttons(snapshot)
}

/// Where the driver is in the poll cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollState {
    #[default]
    Idle,
    /// Response armed, waiting for the console's latch pulse.
    Armed { word: u16, armed_at_us: u64 },
    /// Latch seen; `bit` is on the data line.
    Shifting {
        word: u16,
        bit: u8,
        armed_at_us: u64,
        latched_at_us: u64,
    },
}

/// SNES protocol driver for one controller port.
pub struct SnesDriver<C: Clock> {
    config: SnesConfig,
    clock: C,
    state: PollState,
    latch: EdgeDetector,
    shift_clock: EdgeDetector,
    last_buttons: u16,
    completed_polls: u32,
    bound: Option<TransportType>,
}

impl<C: Clock> SnesDriver<C> {
    pub fn new(config: SnesConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            state: PollState::Idle,
            latch: EdgeDetector::default(),
            shift_clock: EdgeDetector::default(),
            last_buttons: 0,
            completed_polls: 0,
            bound: None,
        })
    }

    /// Multitap address, 0..=3.
    pub fn set_controller_id(&mut self, id: u8) -> Result<(), ConfigError> {
        if id > 3 {
            return Err(ConfigError::ControllerIdOutOfRange(id));
        }
        self.config.controller_id = id;
        Ok(())
    }

    pub fn controller_id(&self) -> u8 {
        self.config.controller_id
    }

    pub fn set_timing(&mut self, clock_period_us: u32, latch_duration_us: u32) -> Result<(), ConfigError> {
        if clock_period_us == 0 || latch_duration_us == 0 {
            return Err(ConfigError::ZeroTiming);
        }
        self.config.clock_period_us = clock_period_us;
        self.config.latch_duration_us = latch_duration_us;
        Ok(())
    }

    pub fn config(&self) -> &SnesConfig {
        &self.config
    }

    pub fn poll_state(&self) -> PollState {
        self.state
    }

    /// Buttons (active-high) of the most recently armed response.
    pub fn last_buttons(&self) -> u16 {
        self.last_buttons
    }

    /// Number of polls shifted out completely since `initialize`.
    pub fn completed_polls(&self) -> u32 {
        self.completed_polls
    }

    fn schedule(&self) -> ShiftSchedule {
        ShiftSchedule::new(
            self.config.latch_duration_us,
            self.config.clock_period_us,
            WORD_BITS,
        )
    }

    fn pins(&self) -> [GpioPinConfig; 3] {
        [
            GpioPinConfig::input(self.config.latch_pin, Pull::Down),
            GpioPinConfig::input(self.config.clock_pin, Pull::Up),
            GpioPinConfig::output(self.config.data_pin),
        ]
    }

    fn read(&self, bus: &mut dyn PinBus, pin: u8) -> bool {
        bus.get_pin(pin).unwrap_or(false)
    }

    fn drive_data(&self, bus: &mut dyn PinBus, high: bool) {
        if let Err(e) = bus.set_pin(self.config.data_pin, high) {
            trace!("snes: data pin write failed: {:?}", e);
        }
    }

    /// Configure the pins and idle the data line.
    fn bind<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<TransportType, DriverError> {
        let ty = check_supported(self, transport)?;
        let pins = self.pins();
        let bus = transport.pin_bus().ok_or(DriverError::NoTransport)?;
        bus.configure_pins(&pins)?;
        self.drive_data(bus, true);
        let latch = self.read(bus, self.config.latch_pin);
        self.latch.reset(latch);
        self.state = PollState::Idle;
        self.bound = Some(ty);
        Ok(ty)
    }

    fn abandon(&mut self, bus: &mut dyn PinBus) {
        debug!("snes: poll timed out, abandoning");
        self.drive_data(bus, true);
        self.state = PollState::Idle;
    }

    fn start_shift(&mut self, bus: &mut dyn PinBus, word: u16, armed_at_us: u64, now: u64) {
        let level = self.read(bus, self.config.clock_pin);
        self.shift_clock.reset(level);
        self.drive_data(bus, msb_first_bit(word, 0));
        self.state = PollState::Shifting {
            word,
            bit: 0,
            armed_at_us,
            latched_at_us: now,
        };
    }

    /// Follow the console's latch and clock edges.
    fn handle_polling(&mut self, bus: &mut dyn PinBus) {
        let now = self.clock.now_us();
        let level = self.read(bus, self.config.latch_pin);
        let latched = self.latch.rising(level);

        match self.state {
            PollState::Idle => {}
            PollState::Armed { word, armed_at_us } => {
                if now.saturating_sub(armed_at_us) > SNES_POLL_TIMEOUT_US {
                    self.abandon(bus);
                } else if latched {
                    self.start_shift(bus, word, armed_at_us, now);
                }
            }
            PollState::Shifting {
                word,
                bit,
                armed_at_us,
                latched_at_us,
            } => {
                // A fresh latch restarts the read from the first bit.
                if latched {
                    self.start_shift(bus, word, armed_at_us, now);
                    return;
                }
                let stalled = now.saturating_sub(latched_at_us) > 2 * self.schedule().duration_us();
                if stalled || now.saturating_sub(armed_at_us) > SNES_POLL_TIMEOUT_US {
                    self.abandon(bus);
                    return;
                }
                let level = self.read(bus, self.config.clock_pin);
                if !self.shift_clock.rising(level) {
                    return;
                }
                let next = bit + 1;
                if next < WORD_BITS {
                    self.drive_data(bus, msb_first_bit(word, next));
                    self.state = PollState::Shifting {
                        word,
                        bit: next,
                        armed_at_us,
                        latched_at_us,
                    };
                } else {
                    self.drive_data(bus, true);
                    self.completed_polls = self.completed_polls.wrapping_add(1);
                    self.state = PollState::Idle;
                }
            }
        }
    }
}

impl<C: Clock> ProtocolDriver for SnesDriver<C> {
    fn initialize<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        self.bind(transport)?;
        self.last_buttons = 0;
        self.completed_polls = 0;
        info!(
            "snes: controller {} on latch={} clock={} data={}",
            self.config.controller_id,
            self.config.latch_pin,
            self.config.clock_pin,
            self.config.data_pin
        );
        Ok(())
    }

    fn deinitialize<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if self.bound.take().is_none() {
            return;
        }
        self.state = PollState::Idle;
        if let Some(bus) = transport.pin_bus() {
            if let Err(e) = bus.configure_pins(&[]) {
                warn!("snes: failed to release pins: {:?}", e);
            }
        }
        debug!("snes: unbound");
    }

    fn rebind<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        self.bind(transport).map(|_| ())
    }

    /// Arms a response when idle. While armed, the pending word is refreshed
    /// so the console reads the latest state; a read already under way keeps
    /// its word.
    fn process<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        snapshot: &GamepadSnapshot,
    ) -> Result<bool, DriverError> {
        check_bound(self.bound, transport)?;
        let pressed = snes_buttons(snapshot);
        match self.state {
            PollState::Idle => {
                self.last_buttons = pressed;
                self.state = PollState::Armed {
                    word: !pressed,
                    armed_at_us: self.clock.now_us(),
                };
                Ok(true)
            }
            PollState::Armed { armed_at_us, .. } => {
                self.last_buttons = pressed;
                self.state = PollState::Armed {
                    word: !pressed,
                    armed_at_us,
                };
                Ok(false)
            }
            PollState::Shifting { .. } => Ok(false),
        }
    }

    fn process_aux<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if check_bound(self.bound, transport).is_err() {
            return;
        }
        if let Some(bus) = transport.pin_bus() {
            self.handle_polling(bus);
        }
    }

    /// The console never sends data to the controller.
    fn handle_incoming_data(&mut self, _data: &[u8]) -> bool {
        false
    }

    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Snes
    }

    fn protocol_name(&self) -> &'static str {
        "SNES"
    }

    fn preferred_transports(&self) -> &'static [TransportType] {
        PREFERRED
    }

    /// No analog sticks.
    fn joystick_mid_value(&self) -> u16 {
        128
    }

    fn service_interval_us(&self) -> Option<u32> {
        Some(self.schedule().sample_interval_us())
    }

    fn is_mid_transfer(&self) -> bool {
        matches!(self.state, PollState::Shifting { .. })
    }

    fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ready_usb, GpioT, MockClock, MockGpio};
    use crate::transport::GpioTransport;
    use std::vec::Vec;

    const LATCH: u8 = 18;
    const CLOCK: u8 = 19;
    const DATA: u8 = 20;

    fn setup() -> (
        SnesDriver<MockClock>,
        GpioTransport<MockGpio, MockClock>,
        MockGpio,
        MockClock,
    ) {
        let gpio = MockGpio::new();
        let clock = MockClock::new();
        let mut t = GpioTransport::new(gpio.clone(), clock.clone());
        t.initialize().unwrap();
        let mut d = SnesDriver::new(SnesConfig::DEFAULT, clock.clone()).unwrap();
        d.initialize(&mut t).unwrap();
        (d, t, gpio, clock)
    }

    #[test]
    fn test_word_is_active_low() {
        let mut snap = GamepadSnapshot::neutral();
        assert_eq!(snes_word(&snap), 0xFFFF);
        snap.buttons = Buttons::B1 | Buttons::S2;
        snap.dpad = Dpad::LEFT;
        assert_eq!(snes_word(&snap), !(button::B | button::START | button::LEFT));
    }

    #[test]
    fn test_initialize_configures_pins() {
        let (_d, t, gpio, _clock) = setup();
        assert!(t.is_pin_configured(18));
        assert!(t.is_pin_configured(19));
        assert!(t.is_pin_configured(20));
        assert!(gpio.output(DATA));
    }

    #[test]
    fn test_only_gpio_supported() {
        let (mut t, _usb) = ready_usb();
        let mut d = SnesDriver::new(SnesConfig::DEFAULT, MockClock::new()).unwrap();
        assert!(!d.supports_transport(TransportType::Usb));
        assert_eq!(
            d.initialize(&mut t),
            Err(DriverError::UnsupportedTransport(TransportType::Usb))
        );
    }

    /// Clock the console's sixteen pulses, reading the data line while the
    /// clock is low as the console does.
    fn clock_out(d: &mut SnesDriver<MockClock>, t: &mut GpioT, gpio: &MockGpio, clock: &MockClock) -> u16 {
        let mut seen = 0u16;
        for bit in 0..16 {
            clock.advance_us(6);
            gpio.set_input(CLOCK, false);
            d.process_aux(t);
            if gpio.output(DATA) {
                seen |= 0x8000 >> bit;
            }
            clock.advance_us(6);
            gpio.set_input(CLOCK, true);
            d.process_aux(t);
        }
        seen
    }

    #[test]
    fn test_full_poll_shifts_word() {
        let (mut d, mut t, gpio, clock) = setup();
        gpio.set_input(CLOCK, true);
        let mut snap = GamepadSnapshot::neutral();
        snap.buttons = Buttons::B1 | Buttons::R1;
        assert_eq!(d.process(&mut t, &snap), Ok(true));
        assert_eq!(d.last_buttons(), button::B | button::R);

        // Second process while a poll is pending does not re-arm.
        assert_eq!(d.process(&mut t, &snap), Ok(false));

        clock.set_us(50);
        gpio.set_input(LATCH, true);
        d.process_aux(&mut t);
        assert!(matches!(d.poll_state(), PollState::Shifting { bit: 0, .. }));
        assert!(d.is_mid_transfer());
        clock.set_us(62);
        gpio.set_input(LATCH, false);
        d.process_aux(&mut t);

        let seen = clock_out(&mut d, &mut t, &gpio, &clock);
        assert_eq!(seen, !(button::B | button::R));
        assert_eq!(d.poll_state(), PollState::Idle);
        assert_eq!(d.completed_polls(), 1);
        assert!(gpio.output(DATA));
    }

    #[test]
    fn test_armed_word_follows_latest_snapshot() {
        let (mut d, mut t, gpio, clock) = setup();
        gpio.set_input(CLOCK, true);
        d.process(&mut t, &GamepadSnapshot::neutral()).unwrap();
        let mut snap = GamepadSnapshot::neutral();
        snap.dpad = Dpad::UP;
        assert_eq!(d.process(&mut t, &snap), Ok(false));
        assert_eq!(d.last_buttons(), button::UP);

        gpio.set_input(LATCH, true);
        d.process_aux(&mut t);
        gpio.set_input(LATCH, false);
        assert_eq!(clock_out(&mut d, &mut t, &gpio, &clock), !button::UP);
    }

    #[test]
    fn test_console_cadence() {
        const FRAME_US: u64 = 16_667;
        const LATCH_US: u64 = 12;
        const PERIOD_US: u64 = 12;

        // Line levels at time `t` for a console polling once per frame.
        fn lines(t: u64) -> (bool, bool) {
            let f = t % FRAME_US;
            let latch = f < LATCH_US;
            let shifting = (LATCH_US..LATCH_US + 16 * PERIOD_US).contains(&f);
            let clock_low = shifting && (f - LATCH_US) % PERIOD_US < PERIOD_US / 2;
            (latch, !clock_low)
        }

        let (mut d, mut t, gpio, clock) = setup();
        let step = d.service_interval_us().unwrap() as u64;
        assert_eq!(step, 6);

        let mut snap = GamepadSnapshot::neutral();
        snap.buttons = Buttons::B2 | Buttons::S1;
        let expected = !(button::A | button::SELECT);

        let mut words = Vec::new();
        let mut word = 0u16;
        let mut next_tick = 0;
        let mut now = 3;
        while now < 1_000_000 {
            clock.set_us(now);
            if now >= next_tick {
                d.process(&mut t, &snap).unwrap();
                next_tick += 1_000;
            }
            let (latch, clk) = lines(now);
            gpio.set_input(LATCH, latch);
            gpio.set_input(CLOCK, clk);
            d.process_aux(&mut t);

            let f = now % FRAME_US;
            if latch {
                word = 0;
            } else if !clk {
                let bit = (f - LATCH_US) / PERIOD_US;
                if gpio.output(DATA) {
                    word |= 0x8000 >> bit;
                }
                if bit == 15 {
                    words.push(word);
                }
            }
            now += step;
        }

        assert_eq!(words.len(), 60);
        assert!(words.iter().all(|&w| w == expected));
        assert_eq!(d.completed_polls(), 60);
    }

    #[test]
    fn test_relatch_restarts_read() {
        let (mut d, mut t, gpio, clock) = setup();
        gpio.set_input(CLOCK, true);
        d.process(&mut t, &GamepadSnapshot::neutral()).unwrap();
        gpio.set_input(LATCH, true);
        d.process_aux(&mut t);
        gpio.set_input(LATCH, false);
        d.process_aux(&mut t);
        for _ in 0..3 {
            gpio.set_input(CLOCK, false);
            d.process_aux(&mut t);
            gpio.set_input(CLOCK, true);
            d.process_aux(&mut t);
        }
        assert!(matches!(d.poll_state(), PollState::Shifting { bit: 3, .. }));

        clock.set_us(100);
        gpio.set_input(LATCH, true);
        d.process_aux(&mut t);
        assert!(matches!(
            d.poll_state(),
            PollState::Shifting { bit: 0, latched_at_us: 100, .. }
        ));
    }

    #[test]
    fn test_stalled_read_is_dropped() {
        let (mut d, mut t, gpio, clock) = setup();
        gpio.set_input(CLOCK, true);
        d.process(&mut t, &GamepadSnapshot::neutral()).unwrap();
        gpio.set_input(LATCH, true);
        d.process_aux(&mut t);
        gpio.set_input(LATCH, false);

        // Default timing: a read takes 192 us, the console gave up long ago.
        clock.set_us(2 * 192);
        d.process_aux(&mut t);
        assert!(d.is_mid_transfer());
        clock.set_us(2 * 192 + 1);
        d.process_aux(&mut t);
        assert_eq!(d.poll_state(), PollState::Idle);
        assert_eq!(d.completed_polls(), 0);
        assert!(gpio.output(DATA));

        assert_eq!(d.process(&mut t, &GamepadSnapshot::neutral()), Ok(true));
    }

    #[test]
    fn test_rebind_keeps_settings_and_counters() {
        let (mut d, mut t, gpio, clock) = setup();
        gpio.set_input(CLOCK, true);
        d.set_controller_id(2).unwrap();
        d.process(&mut t, &GamepadSnapshot::neutral()).unwrap();
        gpio.set_input(LATCH, true);
        d.process_aux(&mut t);
        gpio.set_input(LATCH, false);
        clock_out(&mut d, &mut t, &gpio, &clock);
        assert_eq!(d.completed_polls(), 1);

        d.deinitialize(&mut t);
        assert!(gpio.is_released(DATA));
        d.rebind(&mut t).unwrap();
        assert!(d.is_initialized());
        assert!(t.is_pin_configured(DATA));
        assert_eq!(d.controller_id(), 2);
        assert_eq!(d.completed_polls(), 1);
    }

    #[test]
    fn test_unanswered_poll_is_abandoned() {
        let (mut d, mut t, _gpio, clock) = setup();
        let snap = GamepadSnapshot::neutral();
        assert_eq!(d.process(&mut t, &snap), Ok(true));

        clock.set_us(SNES_POLL_TIMEOUT_US);
        d.process_aux(&mut t);
        assert!(matches!(d.poll_state(), PollState::Armed { .. }));

        clock.set_us(SNES_POLL_TIMEOUT_US + 1);
        d.process_aux(&mut t);
        assert_eq!(d.poll_state(), PollState::Idle);

        // A new poll can be armed on the next tick.
        assert_eq!(d.process(&mut t, &snap), Ok(true));
        assert!(matches!(d.poll_state(), PollState::Armed { .. }));
    }

    #[test]
    fn test_stuck_shift_is_abandoned() {
        let (mut d, mut t, gpio, clock) = setup();
        d.set_timing(50_000, 50_000).unwrap();
        d.process(&mut t, &GamepadSnapshot::neutral()).unwrap();
        gpio.set_input(LATCH, true);
        clock.set_us(10);
        d.process_aux(&mut t);
        assert!(matches!(d.poll_state(), PollState::Shifting { .. }));
        clock.set_us(100_011);
        d.process_aux(&mut t);
        assert_eq!(d.poll_state(), PollState::Idle);
        assert_eq!(d.completed_polls(), 0);
    }

    #[test]
    fn test_latch_already_high_waits_for_edge() {
        let gpio = MockGpio::new();
        let clock = MockClock::new();
        gpio.set_input(LATCH, true);
        let mut t = GpioTransport::new(gpio.clone(), clock.clone());
        t.initialize().unwrap();
        let mut d = SnesDriver::new(SnesConfig::DEFAULT, clock.clone()).unwrap();
        d.initialize(&mut t).unwrap();

        d.process(&mut t, &GamepadSnapshot::neutral()).unwrap();
        clock.set_us(5);
        d.process_aux(&mut t);
        assert!(matches!(d.poll_state(), PollState::Armed { .. }));

        gpio.set_input(LATCH, false);
        clock.set_us(10);
        d.process_aux(&mut t);
        assert!(matches!(d.poll_state(), PollState::Armed { .. }));

        gpio.set_input(LATCH, true);
        clock.set_us(15);
        d.process_aux(&mut t);
        assert!(matches!(d.poll_state(), PollState::Shifting { latched_at_us: 15, .. }));
    }

    #[test]
    fn test_controller_id_and_timing_validation() {
        let mut d = SnesDriver::new(SnesConfig::DEFAULT, MockClock::new()).unwrap();
        assert_eq!(d.set_controller_id(3), Ok(()));
        assert_eq!(d.controller_id(), 3);
        assert_eq!(d.set_controller_id(4), Err(ConfigError::ControllerIdOutOfRange(4)));
        assert_eq!(d.set_timing(0, 12), Err(ConfigError::ZeroTiming));
        assert_eq!(d.set_timing(6, 12), Ok(()));
        assert_eq!(d.config().clock_period_us, 6);

        let bad = SnesConfig {
            controller_id: 9,
            ..SnesConfig::DEFAULT
        };
        assert!(SnesDriver::new(bad, MockClock::new()).is_err());
    }

    #[test]
    fn test_deinitialize_releases_pins() {
        let (mut d, mut t, gpio, _clock) = setup();
        d.deinitialize(&mut t);
        assert!(!d.is_initialized());
        assert!(!t.is_pin_configured(DATA));
        assert!(gpio.is_released(LATCH));
        assert!(gpio.is_released(DATA));
    }
}
