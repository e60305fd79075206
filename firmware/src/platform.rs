//! The RP2040 board as seen by the driver manager.

use driver_core::{Clock, Platform, ProtocolType};
use embassy_time::Instant;

use crate::bluetooth::NoRadio;
use crate::gpio_bank::RpGpioBank;
use crate::legacy_hid::LegacyHidDriver;
use crate::usb_link::RpUsbBackend;

/// Microseconds since boot from the embassy time driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
}

#[derive(Default)]
pub struct RpPlatform;

impl Platform for RpPlatform {
    type Usb = RpUsbBackend;
    type Bluetooth = NoRadio;
    type Gpio = RpGpioBank;
    type Clock = EmbassyClock;
    type Legacy = LegacyHidDriver;

    fn usb(&mut self) -> Option<RpUsbBackend> {
        RpUsbBackend::claim()
    }

    fn bluetooth(&mut self) -> Option<NoRadio> {
        Some(NoRadio)
    }

    fn gpio(&mut self) -> Option<RpGpioBank> {
        RpGpioBank::claim()
    }

    fn clock(&self) -> EmbassyClock {
        EmbassyClock
    }

    fn legacy_driver(&mut self, mode: ProtocolType) -> Option<LegacyHidDriver> {
        match mode {
            ProtocolType::HidGeneric => LegacyHidDriver::new(),
            _ => None,
        }
    }
}
