//! Standard HID gamepad, run as a legacy driver.
//!
//! This mode predates the protocol/transport split: it owns the USB link
//! directly and writes a fixed report layout matching [`REPORT_DESCRIPTOR`].

use defmt::{warn, Format};
use driver_core::protocol::hat_from_dpad;
use driver_core::{Buttons, GamepadSnapshot, LegacyDriver, UsbBackend, UsbEvent, JOYSTICK_MID};

use crate::usb_link::RpUsbBackend;

/// One input report, laid out as [`REPORT_DESCRIPTOR`] declares it.
///
/// Axes are the high byte of the 16-bit snapshot axes, re-centred on zero.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Format)]
pub struct GamepadReport {
    pub buttons: u16,
    /// 0..=7 clockwise from up, 8 when released.
    pub hat: u8,
    /// LX, LY, RX, RY.
    pub sticks: [i8; 4],
    /// LT, RT.
    pub triggers: [u8; 2],
}

impl GamepadReport {
    pub const SIZE: usize = 9;

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..2].copy_from_slice(&self.buttons.to_le_bytes());
        out[2] = self.hat;
        for (dst, &axis) in out[3..7].iter_mut().zip(&self.sticks) {
            *dst = axis as u8;
        }
        out[7..].copy_from_slice(&self.triggers);
        out
    }
}

const fn centred(raw: u16) -> i8 {
    ((raw >> 8) as u8 ^ 0x80) as i8
}

fn trigger(analog: Option<u8>, digital: bool) -> u8 {
    analog.unwrap_or(if digital { 0xFF } else { 0 })
}

impl From<&GamepadSnapshot> for GamepadReport {
    fn from(s: &GamepadSnapshot) -> Self {
        Self {
            buttons: s.buttons.raw() as u16,
            hat: hat_from_dpad(s.dpad),
            sticks: [centred(s.lx), centred(s.ly), centred(s.rx), centred(s.ry)],
            triggers: [
                trigger(s.lt, s.pressed(Buttons::L2)),
                trigger(s.rt, s.pressed(Buttons::R2)),
            ],
        }
    }
}

/// Generic Desktop gamepad: 16 buttons, a hat, four signed 8-bit axes and two
/// 8-bit triggers.
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Gamepad)
    0xA1, 0x01, // Collection (Application)
    // buttons 1..16, one bit each
    0x05, 0x09, 0x19, 0x01, 0x29, 0x10, //
    0x15, 0x00, 0x25, 0x01, //
    0x95, 0x10, 0x75, 0x01, 0x81, 0x02, //
    // hat, 4 bits + 4 bits padding
    0x05, 0x01, 0x09, 0x39, //
    0x15, 0x00, 0x25, 0x07, 0x35, 0x00, 0x46, 0x3B, 0x01, //
    0x65, 0x14, 0x75, 0x04, 0x95, 0x01, 0x81, 0x42, //
    0x65, 0x00, 0x81, 0x03, //
    // X, Y, Z, Rz: -127..127
    0x09, 0x30, 0x09, 0x31, 0x09, 0x32, 0x09, 0x35, //
    0x15, 0x81, 0x25, 0x7F, 0x95, 0x04, 0x75, 0x08, 0x81, 0x02, //
    // Rx, Ry as triggers: 0..255
    0x09, 0x33, 0x09, 0x34, //
    0x15, 0x00, 0x26, 0xFF, 0x00, 0x95, 0x02, 0x81, 0x02, //
    0xC0, // End Collection
];

/// Standard HID gamepad over the USB link.
pub struct LegacyHidDriver {
    usb: RpUsbBackend,
    last: Option<[u8; GamepadReport::SIZE]>,
}

impl LegacyHidDriver {
    /// `None` while a transport holds the USB link.
    pub fn new() -> Option<Self> {
        RpUsbBackend::claim().map(|usb| Self { usb, last: None })
    }
}

impl LegacyDriver for LegacyHidDriver {
    fn initialize(&mut self) {
        if let Err(e) = self.usb.start() {
            warn!("hid: USB link failed to start: {:?}", e);
        }
        self.last = None;
    }

    fn process(&mut self, snapshot: &GamepadSnapshot) -> bool {
        let report = GamepadReport::from(snapshot).to_bytes();
        if self.last == Some(report) {
            return false;
        }
        match self.usb.write_report(&report) {
            Ok(_) => {
                self.last = Some(report);
                true
            }
            Err(_) => false,
        }
    }

    fn process_aux(&mut self) {
        while let Some(event) = self.usb.poll_event() {
            // Re-send the current state to a freshly (re)attached host.
            if matches!(event, UsbEvent::Mounted | UsbEvent::Resumed) {
                self.last = None;
            }
        }
        // No output reports in this mode.
        let mut sink = [0u8; 8];
        while matches!(self.usb.read_report(&mut sink), Ok(n) if n > 0) {}
    }

    fn joystick_mid_value(&self) -> u16 {
        JOYSTICK_MID
    }
}

impl Drop for LegacyHidDriver {
    fn drop(&mut self) {
        self.usb.stop();
    }
}
