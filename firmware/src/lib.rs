//! RP2040 gamepad firmware.
//!
//! This crate provides the embedded implementations of the backend traits in
//! `driver_core` (USB HID link, GPIO bank, absent Bluetooth radio), the legacy
//! standard-HID driver, and the boot configuration for the driver manager.

#![no_std]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

// Re-export core types for convenience
pub use driver_core::{DriverConfig, DriverManager, GamepadSnapshot, ProtocolType, TransportType};

pub mod bluetooth;
pub mod config;
pub mod gpio_bank;
pub mod legacy_hid;
pub mod platform;
pub mod usb_link;

pub use bluetooth::NoRadio;
pub use gpio_bank::RpGpioBank;
pub use legacy_hid::{GamepadReport, LegacyHidDriver};
pub use platform::{EmbassyClock, RpPlatform};
pub use usb_link::{configure_usb_link, LinkDeviceHandler, LinkRequestHandler, RpUsbBackend};

/// Latest gamepad state from whatever input source the board has.
///
/// "Latest value wins": the driver loop only cares about the most recent
/// snapshot, so input tasks overwrite rather than queue.
pub static SNAPSHOT: Signal<CriticalSectionRawMutex, GamepadSnapshot> = Signal::new();
