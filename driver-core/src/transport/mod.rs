//! Byte-channel transports.
//!
//! A [`Transport`] owns one hardware channel (USB device stack, Bluetooth HID
//! link or a bank of GPIO pins) and knows nothing about report layouts. The
//! driver manager owns exactly one transport at a time, wrapped in
//! [`AnyTransport`].
//!
//! All calls are non-blocking. `receive` returns `Ok(0)` when nothing is
//! pending; background work (USB task, Bluetooth event pump, GPIO debounce
//! scan) happens in [`Transport::process`].

mod bluetooth;
mod gpio;
mod usb;

pub use bluetooth::{BluetoothTransport, DEFAULT_DEVICE_NAME, MAX_DEVICE_NAME_LEN};
pub use gpio::{pwm_settings, GpioTransport, PinChange, PinChangeCallback};
pub use usb::UsbTransport;

use heapless::Vec;

use crate::backend::{BluetoothBackend, GpioBackend, UsbBackend};
use crate::clock::Clock;
use crate::config::GpioPinConfig;
use crate::error::TransportError;
use crate::types::TransportType;

/// Capability set shared by every transport.
pub trait Transport {
    /// Acquire the channel. Calling it again on an initialized transport is a
    /// no-op that succeeds.
    fn initialize(&mut self) -> Result<(), TransportError>;

    /// Release the channel. Safe to call when not initialized.
    fn deinitialize(&mut self);

    fn is_initialized(&self) -> bool;

    /// Initialized and a peer is attached.
    fn is_ready(&self) -> bool;

    /// Transmit up to [`mtu`](Self::mtu) bytes; longer payloads are truncated.
    /// Returns the number of bytes sent.
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Copy one pending inbound message into `buf`. `Ok(0)` when none.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Background work, called once per tick.
    fn process(&mut self);

    fn transport_type(&self) -> TransportType;

    fn mtu(&self) -> usize {
        self.transport_type().mtu()
    }

    fn is_bidirectional(&self) -> bool {
        true
    }

    /// Pin-level access, for transports backed by GPIO.
    fn pin_bus(&mut self) -> Option<&mut dyn PinBus> {
        None
    }
}

/// Direct pin access exposed by GPIO-backed transports.
///
/// Protocols that clock bits themselves (SNES) drive pins through this
/// instead of the generic byte mapping of `send`/`receive`.
pub trait PinBus {
    /// Replace the configured pin set. An empty slice releases every pin.
    fn configure_pins(&mut self, pins: &[GpioPinConfig]) -> Result<(), TransportError>;

    /// Drive an output pin. Fails for pins that are not configured as outputs.
    fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), TransportError>;

    /// Current (debounced, if configured) level of a configured pin.
    fn get_pin(&mut self, pin: u8) -> Result<bool, TransportError>;
}

/// The closed set of transports the manager can own.
pub enum AnyTransport<U, B, G, C>
where
    U: UsbBackend,
    B: BluetoothBackend,
    G: GpioBackend,
    C: Clock,
{
    Usb(UsbTransport<U>),
    Bluetooth(BluetoothTransport<B>),
    Gpio(GpioTransport<G, C>),
}

macro_rules! dispatch {
    ($self:expr, $t:ident => $body:expr) => {
        match $self {
            AnyTransport::Usb($t) => $body,
            AnyTransport::Bluetooth($t) => $body,
            AnyTransport::Gpio($t) => $body,
        }
    };
}

impl<U, B, G, C> AnyTransport<U, B, G, C>
where
    U: UsbBackend,
    B: BluetoothBackend,
    G: GpioBackend,
    C: Clock,
{
    pub fn as_usb(&mut self) -> Option<&mut UsbTransport<U>> {
        match self {
            Self::Usb(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_bluetooth(&mut self) -> Option<&mut BluetoothTransport<B>> {
        match self {
            Self::Bluetooth(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_gpio(&mut self) -> Option<&mut GpioTransport<G, C>> {
        match self {
            Self::Gpio(t) => Some(t),
            _ => None,
        }
    }
}

impl<U, B, G, C> Transport for AnyTransport<U, B, G, C>
where
    U: UsbBackend,
    B: BluetoothBackend,
    G: GpioBackend,
    C: Clock,
{
    fn initialize(&mut self) -> Result<(), TransportError> {
        dispatch!(self, t => t.initialize())
    }

    fn deinitialize(&mut self) {
        dispatch!(self, t => t.deinitialize())
    }

    fn is_initialized(&self) -> bool {
        dispatch!(self, t => t.is_initialized())
    }

    fn is_ready(&self) -> bool {
        dispatch!(self, t => t.is_ready())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        dispatch!(self, t => t.send(data))
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        dispatch!(self, t => t.receive(buf))
    }

    fn process(&mut self) {
        dispatch!(self, t => t.process())
    }

    fn transport_type(&self) -> TransportType {
        dispatch!(self, t => t.transport_type())
    }

    fn mtu(&self) -> usize {
        dispatch!(self, t => t.mtu())
    }

    fn is_bidirectional(&self) -> bool {
        dispatch!(self, t => t.is_bidirectional())
    }

    fn pin_bus(&mut self) -> Option<&mut dyn PinBus> {
        dispatch!(self, t => t.pin_bus())
    }
}

/// Copy the single buffered inbound message out, clearing the slot.
fn drain_pending<const N: usize>(pending: &mut Option<Vec<u8, N>>, buf: &mut [u8]) -> usize {
    match pending.take() {
        Some(data) => {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            n
        }
        None => 0,
    }
}
