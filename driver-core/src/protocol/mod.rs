//! Protocol drivers.
//!
//! A protocol driver translates a [`GamepadSnapshot`] into one peer's wire
//! format and back. Drivers never own a transport: the manager lends its
//! transport to every call, and a driver only records which transport type it
//! was initialized against so that it can refuse to run on anything else.

mod ps4;
mod snes;
mod xinput;

pub use ps4::{hat as ps4_hat, hat_from_dpad, Ps4Driver, Ps4Report, PS4_REPORT_ID, PS4_REPORT_LEN};
pub use snes::{
    button as snes_button, snes_buttons, snes_word, PollState, SnesDriver, SNES_POLL_TIMEOUT_US,
};
pub use xinput::{
    AuthState, XInputDriver, XInputReport, AUTH_TICKS, XINPUT_REPORT_LEN,
};

use crate::clock::Clock;
use crate::error::DriverError;
use crate::transport::Transport;
use crate::types::{GamepadSnapshot, ProtocolType, TransportType, JOYSTICK_MID};

/// Player LED patterns shared by the Xbox-family protocols.
pub mod led {
    pub const OFF: u8 = 0x00;
    pub const ON1: u8 = 0x06;
    pub const ON2: u8 = 0x07;
    pub const ON3: u8 = 0x08;
    pub const ON4: u8 = 0x09;
}

/// Capability set shared by every protocol driver.
pub trait ProtocolDriver {
    /// Bind to `transport` and reset all protocol state to defaults.
    fn initialize<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError>;

    /// Unbind, releasing anything the driver configured on the transport.
    fn deinitialize<T: Transport + ?Sized>(&mut self, transport: &mut T);

    /// Bind to `transport` again after `deinitialize` without resetting
    /// protocol state (authentication, LEDs, host feedback, counters).
    fn rebind<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError>;

    /// Build the wire report for `snapshot` and send it if it differs from the
    /// last report sent. Returns whether a send happened.
    fn process<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        snapshot: &GamepadSnapshot,
    ) -> Result<bool, DriverError>;

    /// Background work: timers, polling, draining inbound data.
    fn process_aux<T: Transport + ?Sized>(&mut self, transport: &mut T);

    /// Dispatch one inbound message. Returns whether it was recognised.
    fn handle_incoming_data(&mut self, data: &[u8]) -> bool;

    fn protocol_type(&self) -> ProtocolType;

    fn protocol_name(&self) -> &'static str;

    /// Transports this protocol can run on, most preferred first.
    fn preferred_transports(&self) -> &'static [TransportType];

    fn supports_transport(&self, transport: TransportType) -> bool {
        self.preferred_transports().contains(&transport)
    }

    fn joystick_mid_value(&self) -> u16 {
        JOYSTICK_MID
    }

    fn supports_authentication(&self) -> bool {
        false
    }

    fn supports_force_feedback(&self) -> bool {
        false
    }

    /// How often `process_aux` must run for protocols whose peer clocks the
    /// bus. `None` when the regular tick is enough.
    fn service_interval_us(&self) -> Option<u32> {
        None
    }

    /// A peer-clocked transfer is under way and must not be interrupted.
    fn is_mid_transfer(&self) -> bool {
        false
    }

    fn is_initialized(&self) -> bool;
}

/// Last report successfully handed to the transport.
///
/// Suppresses sends of unchanged reports. The cache only advances after a
/// successful send, so a failed send is retried on the next tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportCache<const N: usize> {
    last: Option<[u8; N]>,
}

impl<const N: usize> ReportCache<N> {
    pub const fn new() -> Self {
        Self { last: None }
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<&[u8; N]> {
        self.last.as_ref()
    }

    /// Send `report` if it differs from the cached one and the transport is
    /// ready.
    pub fn send_if_changed<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        report: &[u8; N],
    ) -> Result<bool, DriverError> {
        if self.last.as_ref() == Some(report) || !transport.is_ready() {
            return Ok(false);
        }
        match transport.send(report)? {
            0 => Ok(false),
            _ => {
                self.last = Some(*report);
                Ok(true)
            }
        }
    }
}

impl<const N: usize> Default for ReportCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that `transport` is the one the driver was bound to.
fn check_bound<T: Transport + ?Sized>(
    bound: Option<TransportType>,
    transport: &T,
) -> Result<(), DriverError> {
    match bound {
        Some(ty) if ty == transport.transport_type() && transport.is_initialized() => Ok(()),
        _ => Err(DriverError::NoTransport),
    }
}

/// Check that `transport` can carry the protocol, before binding.
fn check_supported<D: ProtocolDriver, T: Transport + ?Sized>(
    driver: &D,
    transport: &T,
) -> Result<TransportType, DriverError> {
    let ty = transport.transport_type();
    if !driver.supports_transport(ty) {
        return Err(DriverError::UnsupportedTransport(ty));
    }
    if !transport.is_initialized() {
        return Err(DriverError::NoTransport);
    }
    Ok(ty)
}

/// The closed set of protocol drivers the manager can own.
pub enum Driver<C: Clock> {
    XInput(XInputDriver),
    Ps4(Ps4Driver),
    Snes(SnesDriver<C>),
}

macro_rules! dispatch {
    ($self:expr, $d:ident => $body:expr) => {
        match $self {
            Driver::XInput($d) => $body,
            Driver::Ps4($d) => $body,
            Driver::Snes($d) => $body,
        }
    };
}

impl<C: Clock> Driver<C> {
    pub fn as_xinput(&mut self) -> Option<&mut XInputDriver> {
        match self {
            Self::XInput(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_ps4(&mut self) -> Option<&mut Ps4Driver> {
        match self {
            Self::Ps4(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_snes(&mut self) -> Option<&mut SnesDriver<C>> {
        match self {
            Self::Snes(d) => Some(d),
            _ => None,
        }
    }
}

impl<C: Clock> ProtocolDriver for Driver<C> {
    fn initialize<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        dispatch!(self, d => d.initialize(transport))
    }

    fn deinitialize<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        dispatch!(self, d => d.deinitialize(transport))
    }

    fn rebind<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        dispatch!(self, d => d.rebind(transport))
    }

    fn process<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        snapshot: &GamepadSnapshot,
    ) -> Result<bool, DriverError> {
        dispatch!(self, d => d.process(transport, snapshot))
    }

    fn process_aux<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        dispatch!(self, d => d.process_aux(transport))
    }

    fn handle_incoming_data(&mut self, data: &[u8]) -> bool {
        dispatch!(self, d => d.handle_incoming_data(data))
    }

    fn protocol_type(&self) -> ProtocolType {
        dispatch!(self, d => d.protocol_type())
    }

    fn protocol_name(&self) -> &'static str {
        dispatch!(self, d => d.protocol_name())
    }

    fn preferred_transports(&self) -> &'static [TransportType] {
        dispatch!(self, d => d.preferred_transports())
    }

    fn supports_transport(&self, transport: TransportType) -> bool {
        dispatch!(self, d => d.supports_transport(transport))
    }

    fn joystick_mid_value(&self) -> u16 {
        dispatch!(self, d => d.joystick_mid_value())
    }

    fn supports_authentication(&self) -> bool {
        dispatch!(self, d => d.supports_authentication())
    }

    fn supports_force_feedback(&self) -> bool {
        dispatch!(self, d => d.supports_force_feedback())
    }

    fn service_interval_us(&self) -> Option<u32> {
        dispatch!(self, d => d.service_interval_us())
    }

    fn is_mid_transfer(&self) -> bool {
        dispatch!(self, d => d.is_mid_transfer())
    }

    fn is_initialized(&self) -> bool {
        dispatch!(self, d => d.is_initialized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ready_usb, MockUsb};

    #[test]
    fn test_cache_suppresses_identical_reports() {
        let (mut t, usb) = ready_usb();
        let mut cache = ReportCache::<4>::new();
        let report = [1, 2, 3, 4];
        for _ in 0..10 {
            let _ = cache.send_if_changed(&mut t, &report);
        }
        assert_eq!(usb.send_count(), 1);
    }

    #[test]
    fn test_cache_not_advanced_on_failure() {
        let (mut t, usb) = ready_usb();
        let mut cache = ReportCache::<2>::new();
        usb.fail_writes(true);
        assert!(cache.send_if_changed(&mut t, &[9, 9]).is_err());
        assert_eq!(cache.last(), None);

        usb.fail_writes(false);
        assert_eq!(cache.send_if_changed(&mut t, &[9, 9]), Ok(true));
        assert_eq!(cache.last(), Some(&[9, 9]));
    }

    #[test]
    fn test_cache_waits_for_ready_transport() {
        let usb = MockUsb::new();
        let mut t = crate::transport::UsbTransport::new(usb.clone());
        t.initialize().unwrap();
        let mut cache = ReportCache::<1>::new();
        assert_eq!(cache.send_if_changed(&mut t, &[7]), Ok(false));
        assert_eq!(usb.send_count(), 0);
        assert_eq!(cache.last(), None);
    }
}
