//! Hardware seams.
//!
//! Transports are written against these traits; the firmware crate provides
//! RP2040 implementations and the test suite provides mocks. Every method is
//! synchronous and non-blocking: the firmware main loop calls transports from
//! a single task, and a backend that needs async I/O runs it in its own task
//! and exchanges data through channels.

use crate::clock::Clock;
use crate::config::Pull;
use crate::error::TransportError;
use crate::legacy::LegacyDriver;
use crate::types::ProtocolType;

/// Events reported by the USB device stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbEvent {
    /// Host configured the device.
    Mounted,
    /// Cable pulled or device reset.
    Unmounted,
    Suspended,
    Resumed,
}

/// USB device stack.
pub trait UsbBackend {
    /// Bring up the device stack. Fails if the controller is unavailable.
    fn start(&mut self) -> Result<(), TransportError>;
    fn stop(&mut self);
    /// Next pending bus event, if any.
    fn poll_event(&mut self) -> Option<UsbEvent>;
    /// Queue one input report to the host. Returns the bytes accepted.
    fn write_report(&mut self, data: &[u8]) -> Result<usize, TransportError>;
    /// Copy one output report from the host into `buf`. `Ok(0)` when none.
    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    /// Service the device stack. Called once per transport `process`.
    fn task(&mut self) {}
}

/// Events reported by the Bluetooth controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BluetoothEvent {
    /// A host connected; carries its address.
    Connected([u8; 6]),
    Disconnected,
}

/// Bluetooth HID controller.
pub trait BluetoothBackend {
    fn power_on(&mut self) -> Result<(), TransportError>;
    fn power_off(&mut self);
    fn start_advertising(&mut self, name: &str) -> Result<(), TransportError>;
    fn stop_advertising(&mut self);
    fn disconnect(&mut self);
    fn poll_event(&mut self) -> Option<BluetoothEvent>;
    /// Copy one packet received from the host into `buf`. `Ok(0)` when none.
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    /// Send one packet on the HID interrupt channel.
    fn send_interrupt(&mut self, data: &[u8]) -> Result<usize, TransportError>;
    /// Install the HID report descriptor advertised to hosts.
    fn set_report_map(&mut self, descriptor: &'static [u8]);
}

/// PWM register settings for one pin, as computed by the GPIO transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmSettings {
    /// Integer clock divider, 1..=255.
    pub divider: u8,
    /// Counter wrap value.
    pub wrap: u16,
    /// Compare level (duty cycle in counter ticks).
    pub level: u16,
}

/// Raw GPIO bank.
pub trait GpioBackend {
    /// Claim `pin` as an input with the given bias. Outputs are claimed via
    /// `set_output`, which must also work on an already-configured pin.
    fn configure_input(&mut self, pin: u8, pull: Pull) -> Result<(), TransportError>;
    fn configure_output(&mut self, pin: u8) -> Result<(), TransportError>;
    fn set_output(&mut self, pin: u8, high: bool);
    fn read(&mut self, pin: u8) -> bool;
    /// Return `pin` to its reset state.
    fn release(&mut self, pin: u8);
    /// System clock feeding the PWM slices.
    fn sys_clock_hz(&self) -> u32;
    fn apply_pwm(&mut self, pin: u8, settings: PwmSettings) -> Result<(), TransportError>;
    fn disable_pwm(&mut self, pin: u8);
}

/// Everything the driver manager needs from the board.
///
/// Backend getters return a fresh handle per call and `None` when the
/// hardware is absent or already claimed, which lets the manager try a
/// transport and drop it again.
pub trait Platform {
    type Usb: UsbBackend;
    type Bluetooth: BluetoothBackend;
    type Gpio: GpioBackend;
    type Clock: Clock + Clone;
    type Legacy: LegacyDriver;

    fn usb(&mut self) -> Option<Self::Usb>;
    fn bluetooth(&mut self) -> Option<Self::Bluetooth>;
    fn gpio(&mut self) -> Option<Self::Gpio>;
    fn clock(&self) -> Self::Clock;
    /// Driver for a mode that has no protocol driver, if the board has one.
    fn legacy_driver(&mut self, mode: ProtocolType) -> Option<Self::Legacy>;
}
