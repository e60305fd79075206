//! RP2040 GPIO bank behind [`GpioBackend`].
//!
//! Pins are handed to the bank once at boot as [`Flex`] pins and stay there;
//! transports configure them through [`RpGpioBank`]. PWM is driven straight
//! through the PWM slice registers so a pin can switch between SIO and PWM
//! without giving up its `Flex` handle.

use core::cell::RefCell;

use defmt::debug;
use driver_core::{GpioBackend, Pull, PwmSettings, TransportError};
use embassy_rp::gpio::{Flex, Pull as RpPull};
use embassy_rp::pac;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::{OutputPin, PinState};
use portable_atomic::{AtomicBool, Ordering};

/// User GPIOs on the RP2040.
pub const BANK_SIZE: usize = 30;

const FUNCSEL_PWM: u8 = 4;
const FUNCSEL_SIO: u8 = 5;

type PinTable = [Option<Flex<'static>>; BANK_SIZE];

static PINS: Mutex<CriticalSectionRawMutex, RefCell<PinTable>> =
    Mutex::new(RefCell::new([const { None }; BANK_SIZE]));
static CLAIMED: AtomicBool = AtomicBool::new(false);

/// Hand GPIO `number` to the bank.
pub fn install(number: u8, pin: Flex<'static>) {
    PINS.lock(|pins| {
        if let Some(slot) = pins.borrow_mut().get_mut(number as usize) {
            *slot = Some(pin);
        }
    });
}

fn with_pin<R>(pin: u8, f: impl FnOnce(&mut Flex<'static>) -> R) -> Option<R> {
    PINS.lock(|pins| {
        pins.borrow_mut()
            .get_mut(pin as usize)
            .and_then(Option::as_mut)
            .map(f)
    })
}

fn route(pin: u8, funcsel: u8) {
    pac::IO_BANK0
        .gpio(pin as usize)
        .ctrl()
        .write(|w| w.set_funcsel(funcsel));
}

const fn rp_pull(pull: Pull) -> RpPull {
    match pull {
        Pull::None => RpPull::None,
        Pull::Up => RpPull::Up,
        Pull::Down => RpPull::Down,
    }
}

/// Single handle onto the GPIO bank.
pub struct RpGpioBank {
    _claim: (),
}

impl RpGpioBank {
    pub fn claim() -> Option<Self> {
        CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { _claim: () })
    }
}

impl Drop for RpGpioBank {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
    }
}

impl GpioBackend for RpGpioBank {
    fn configure_input(&mut self, pin: u8, pull: Pull) -> Result<(), TransportError> {
        with_pin(pin, |p| {
            p.set_as_input();
            p.set_pull(rp_pull(pull));
        })
        .ok_or(TransportError::InvalidArgument)
    }

    fn configure_output(&mut self, pin: u8) -> Result<(), TransportError> {
        with_pin(pin, |p| {
            p.set_pull(RpPull::None);
            p.set_as_output();
        })
        .ok_or(TransportError::InvalidArgument)
    }

    fn set_output(&mut self, pin: u8, high: bool) {
        with_pin(pin, |p| {
            let _ = OutputPin::set_state(p, PinState::from(high));
        });
    }

    fn read(&mut self, pin: u8) -> bool {
        with_pin(pin, |p| p.is_high()).unwrap_or(false)
    }

    fn release(&mut self, pin: u8) {
        with_pin(pin, |p| {
            p.set_as_input();
            p.set_pull(RpPull::None);
        });
    }

    fn sys_clock_hz(&self) -> u32 {
        embassy_rp::clocks::clk_sys_freq()
    }

    fn apply_pwm(&mut self, pin: u8, settings: PwmSettings) -> Result<(), TransportError> {
        if pin as usize >= BANK_SIZE || with_pin(pin, |_| ()).is_none() {
            return Err(TransportError::InvalidArgument);
        }
        let slice = pac::PWM.ch((pin as usize >> 1) & 7);
        slice.div().write(|w| {
            w.set_int(settings.divider);
            w.set_frac(0);
        });
        slice.top().write(|w| w.set_top(settings.wrap));
        slice.cc().modify(|w| {
            if pin & 1 == 0 {
                w.set_a(settings.level);
            } else {
                w.set_b(settings.level);
            }
        });
        slice.csr().modify(|w| w.set_en(true));
        route(pin, FUNCSEL_PWM);
        debug!("gpio: pwm on pin {} div={} top={}", pin, settings.divider, settings.wrap);
        Ok(())
    }

    fn disable_pwm(&mut self, pin: u8) {
        if pin as usize >= BANK_SIZE {
            return;
        }
        let slice = pac::PWM.ch((pin as usize >> 1) & 7);
        slice.cc().modify(|w| {
            if pin & 1 == 0 {
                w.set_a(0);
            } else {
                w.set_b(0);
            }
        });
        route(pin, FUNCSEL_SIO);
    }
}
