//! Platform-agnostic protocol/transport driver layer for gamepad firmware.
//!
//! The crate splits a controller's host link into two halves that can be
//! combined at runtime:
//!
//! - a **transport** moves bytes over one physical channel (USB device,
//!   Bluetooth HID, raw GPIO pins), see [`transport`];
//! - a **protocol driver** turns a [`GamepadSnapshot`] into one peer's wire
//!   format (XInput, PS4, SNES), see [`protocol`].
//!
//! A [`DriverManager`] owns at most one pair, picks a transport for the
//! requested protocol, and switches either half at runtime with rollback on
//! failure. Modes that have no protocol driver yet run through a
//! [`LegacyDriver`] supplied by the board.
//!
//! Hardware is reached through the traits in [`backend`]; the firmware crate
//! implements them for the RP2040, tests implement them with mocks.
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)
//! - **`log`**: Route internal logging through the `log` facade
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations,
//! making it suitable for embedded systems with limited resources.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod backend;
pub mod bitbang;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod legacy;
pub mod manager;
pub mod protocol;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use backend::{
    BluetoothBackend, BluetoothEvent, GpioBackend, Platform, PwmSettings, UsbBackend, UsbEvent,
};
pub use clock::Clock;
pub use config::{DriverConfig, GpioPinConfig, PinMode, Pull, SnesConfig, XInputAuth};
pub use debounce::Debouncer;
pub use error::{ConfigError, DriverError, ManagerError, TransportError};
pub use legacy::{LegacyDriver, NoLegacyDriver};
pub use manager::{Active, DriverManager, PlatformDriver, PlatformTransport};
pub use protocol::{Driver, ProtocolDriver, Ps4Driver, SnesDriver, XInputDriver};
pub use transport::{
    AnyTransport, BluetoothTransport, GpioTransport, PinBus, Transport, UsbTransport,
};
pub use types::{Buttons, Dpad, GamepadOptions, GamepadSnapshot, ProtocolType, TransportType, JOYSTICK_MID};
