//! PS4 (DualShock 4 compatible) protocol driver.

use super::{check_bound, check_supported, ProtocolDriver, ReportCache};
use crate::error::DriverError;
use crate::transport::Transport;
use crate::types::{Buttons, Dpad, GamepadSnapshot, ProtocolType, TransportType};

pub const PS4_REPORT_ID: u8 = 0x01;
pub const PS4_REPORT_LEN: usize = 10;

const PREFERRED: &[TransportType] = &[TransportType::Bluetooth, TransportType::Usb];

/// Host-to-device output report carrying rumble and lightbar.
const OUTPUT_REPORT_ID: u8 = 0x05;
const OUTPUT_REPORT_MIN_LEN: usize = 9;

pub mod hat {
    pub const UP: u8 = 0;
    pub const UP_RIGHT: u8 = 1;
    pub const RIGHT: u8 = 2;
    pub const DOWN_RIGHT: u8 = 3;
    pub const DOWN: u8 = 4;
    pub const DOWN_LEFT: u8 = 5;
    pub const LEFT: u8 = 6;
    pub const UP_LEFT: u8 = 7;
    pub const NEUTRAL: u8 = 8;
}

// Byte 5, high nibble (low nibble is the hat).
const MASK_SQUARE: u8 = 0x10;
const MASK_CROSS: u8 = 0x20;
const MASK_CIRCLE: u8 = 0x40;
const MASK_TRIANGLE: u8 = 0x80;

// Byte 6.
const MASK_L1: u8 = 0x01;
const MASK_R1: u8 = 0x02;
const MASK_L2: u8 = 0x04;
const MASK_R2: u8 = 0x08;
const MASK_SHARE: u8 = 0x10;
const MASK_OPTIONS: u8 = 0x20;
const MASK_L3: u8 = 0x40;
const MASK_R3: u8 = 0x80;

// Byte 7.
const MASK_PS: u8 = 0x01;
const MASK_TOUCHPAD: u8 = 0x02;

/// DS4 input report.
///
/// ```text
/// [0] report id (0x01)
/// [1..5] lx, ly, rx, ry (high byte of each 16-bit axis)
/// [5] hat (low nibble) | square, cross, circle, triangle
/// [6] L1 R1 L2 R2 share options L3 R3
/// [7] PS | touchpad
/// [8..10] left/right trigger
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ps4Report {
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
    pub hat: u8,
    pub face: u8,
    pub buttons: u8,
    pub special: u8,
    pub lt: u8,
    pub rt: u8,
}

impl Default for Ps4Report {
    fn default() -> Self {
        Self {
            lx: 0x80,
            ly: 0x80,
            rx: 0x80,
            ry: 0x80,
            hat: hat::NEUTRAL,
            face: 0,
            buttons: 0,
            special: 0,
            lt: 0,
            rt: 0,
        }
    }
}

/// Hat switch value for a d-pad mask; opposing or 3+ directions are neutral.
#[must_use]
pub fn hat_from_dpad(dpad: Dpad) -> u8 {
    const UP: u8 = Dpad::UP.0;
    const DOWN: u8 = Dpad::DOWN.0;
    const LEFT: u8 = Dpad::LEFT.0;
    const RIGHT: u8 = Dpad::RIGHT.0;

    match dpad.raw() {
        UP => hat::UP,
        x if x == UP | RIGHT => hat::UP_RIGHT,
        RIGHT => hat::RIGHT,
        x if x == DOWN | RIGHT => hat::DOWN_RIGHT,
        DOWN => hat::DOWN,
        x if x == DOWN | LEFT => hat::DOWN_LEFT,
        LEFT => hat::LEFT,
        x if x == UP | LEFT => hat::UP_LEFT,
        _ => hat::NEUTRAL,
    }
}

impl Ps4Report {
    #[must_use]
    pub fn from_snapshot(snapshot: &GamepadSnapshot) -> Self {
        let mut face = 0;
        for (button, mask) in [
            (Buttons::B3, MASK_SQUARE),
            (Buttons::B1, MASK_CROSS),
            (Buttons::B2, MASK_CIRCLE),
            (Buttons::B4, MASK_TRIANGLE),
        ] {
            if snapshot.pressed(button) {
                face |= mask;
            }
        }

        let mut buttons = 0;
        for (button, mask) in [
            (Buttons::L1, MASK_L1),
            (Buttons::R1, MASK_R1),
            (Buttons::L2, MASK_L2),
            (Buttons::R2, MASK_R2),
            (Buttons::S2, MASK_OPTIONS),
            (Buttons::L3, MASK_L3),
            (Buttons::R3, MASK_R3),
        ] {
            if snapshot.pressed(button) {
                buttons |= mask;
            }
        }

        let any_aux = snapshot.pressed_any_aux();
        let select = snapshot.pressed(Buttons::S1);
        let (share, touchpad) = if snapshot.options.switch_touchpad_and_share {
            (any_aux, select)
        } else {
            (select, any_aux)
        };
        if share {
            buttons |= MASK_SHARE;
        }

        let mut special = 0;
        if snapshot.pressed(Buttons::A1) {
            special |= MASK_PS;
        }
        if touchpad {
            special |= MASK_TOUCHPAD;
        }

        let digital = |b: Buttons| if snapshot.pressed(b) { 0xFF } else { 0x00 };

        Self {
            lx: (snapshot.lx >> 8) as u8,
            ly: (snapshot.ly >> 8) as u8,
            rx: (snapshot.rx >> 8) as u8,
            ry: (snapshot.ry >> 8) as u8,
            hat: hat_from_dpad(snapshot.dpad),
            face,
            buttons,
            special,
            lt: snapshot.lt.unwrap_or_else(|| digital(Buttons::L2)),
            rt: snapshot.rt.unwrap_or_else(|| digital(Buttons::R2)),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; PS4_REPORT_LEN] {
        [
            PS4_REPORT_ID,
            self.lx,
            self.ly,
            self.rx,
            self.ry,
            (self.hat & 0x0F) | (self.face & 0xF0),
            self.buttons,
            self.special,
            self.lt,
            self.rt,
        ]
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; PS4_REPORT_LEN]) -> Self {
        Self {
            lx: bytes[1],
            ly: bytes[2],
            rx: bytes[3],
            ry: bytes[4],
            hat: bytes[5] & 0x0F,
            face: bytes[5] & 0xF0,
            buttons: bytes[6],
            special: bytes[7],
            lt: bytes[8],
            rt: bytes[9],
        }
    }
}

/// PS4 protocol driver.
pub struct Ps4Driver {
    report: Ps4Report,
    cache: ReportCache<PS4_REPORT_LEN>,
    rumble: (u8, u8),
    lightbar: (u8, u8, u8),
    bound: Option<TransportType>,
}

impl Ps4Driver {
    pub fn new() -> Self {
        Self {
            report: Ps4Report::default(),
            cache: ReportCache::new(),
            rumble: (0, 0),
            lightbar: (0, 0, 0),
            bound: None,
        }
    }

    /// Last rumble values from the host, (heavy left, light right).
    pub fn rumble(&self) -> (u8, u8) {
        self.rumble
    }

    /// Last lightbar colour from the host, (r, g, b).
    pub fn lightbar(&self) -> (u8, u8, u8) {
        self.lightbar
    }

    pub fn current_report(&self) -> &Ps4Report {
        &self.report
    }
}

impl Default for Ps4Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolDriver for Ps4Driver {
    fn initialize<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        let ty = check_supported(self, transport)?;
        self.report = Ps4Report::default();
        self.cache.clear();
        self.rumble = (0, 0);
        self.lightbar = (0, 0, 0);
        self.bound = Some(ty);
        info!("ps4: bound to {}", ty.name());
        Ok(())
    }

    fn deinitialize<T: Transport + ?Sized>(&mut self, _transport: &mut T) {
        if self.bound.take().is_some() {
            debug!("ps4: unbound");
        }
    }

    fn rebind<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        let ty = check_supported(self, transport)?;
        self.cache.clear();
        self.bound = Some(ty);
        Ok(())
    }

    fn process<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        snapshot: &GamepadSnapshot,
    ) -> Result<bool, DriverError> {
        check_bound(self.bound, transport)?;
        self.report = Ps4Report::from_snapshot(snapshot);
        self.cache.send_if_changed(transport, &self.report.to_bytes())
    }

    fn process_aux<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if check_bound(self.bound, transport).is_err() || !transport.is_ready() {
            return;
        }
        let mut buf = [0u8; TransportType::MAX_MTU];
        if let Ok(n @ 1..) = transport.receive(&mut buf) {
            if !self.handle_incoming_data(&buf[..n]) {
                trace!("ps4: ignored {} byte message", n);
            }
        }
    }

    fn handle_incoming_data(&mut self, data: &[u8]) -> bool {
        if data.len() < OUTPUT_REPORT_MIN_LEN || data[0] != OUTPUT_REPORT_ID {
            return false;
        }
        self.rumble = (data[5], data[4]);
        self.lightbar = (data[6], data[7], data[8]);
        true
    }

    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Ps4
    }

    fn protocol_name(&self) -> &'static str {
        "PS4"
    }

    fn preferred_transports(&self) -> &'static [TransportType] {
        PREFERRED
    }

    fn supports_force_feedback(&self) -> bool {
        true
    }

    fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }
}
