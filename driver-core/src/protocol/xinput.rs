//! XInput (Xbox 360 wired) protocol driver.

use super::{check_bound, check_supported, led, ProtocolDriver, ReportCache};
use crate::config::XInputAuth;
use crate::error::DriverError;
use crate::transport::Transport;
use crate::types::{Buttons, Dpad, GamepadSnapshot, ProtocolType, TransportType};

/// Size of the XInput input report in bytes.
pub const XINPUT_REPORT_LEN: usize = 20;

/// `process_aux` ticks between an authentication request and simulated success.
pub const AUTH_TICKS: u32 = 1000;

const PREFERRED: &[TransportType] = &[TransportType::Usb, TransportType::Bluetooth];

/// Inbound report types, selected by the first byte.
const REPORT_RUMBLE: u8 = 0x00;
const REPORT_FEATURE: u8 = 0x01;
const FEATURE_LED: u8 = 0x01;
const FEATURE_AUTH: u8 = 0x02;

const RUMBLE_MIN_LEN: usize = 8;

// buttons1
const MASK_UP: u8 = 0x01;
const MASK_DOWN: u8 = 0x02;
const MASK_LEFT: u8 = 0x04;
const MASK_RIGHT: u8 = 0x08;
const MASK_START: u8 = 0x10;
const MASK_BACK: u8 = 0x20;
const MASK_LS: u8 = 0x40;
const MASK_RS: u8 = 0x80;

// buttons2
const MASK_LB: u8 = 0x01;
const MASK_RB: u8 = 0x02;
const MASK_HOME: u8 = 0x04;
const MASK_A: u8 = 0x10;
const MASK_B: u8 = 0x20;
const MASK_X: u8 = 0x40;
const MASK_Y: u8 = 0x80;

/// Host authentication progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthState {
    #[default]
    Unauthenticated,
    InProgress {
        ticks: u32,
    },
    Authenticated,
}

/// XInput input report.
///
/// Wire layout (little-endian):
///
/// ```text
/// [0]      report id (0)
/// [1]      report size (20)
/// [2]      buttons1: dpad, start, back, stick clicks
/// [3]      buttons2: shoulders, home, face buttons
/// [4..6]   left/right trigger
/// [6..14]  lx, ly, rx, ry as i16
/// [14..20] reserved
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct XInputReport {
    pub buttons1: u8,
    pub buttons2: u8,
    pub lt: u8,
    pub rt: u8,
    pub lx: i16,
    pub ly: i16,
    pub rx: i16,
    pub ry: i16,
}

/// Unsigned axis centred at 0x8000 to signed.
#[inline]
fn axis(raw: u16) -> i16 {
    raw.wrapping_add(0x8000) as i16
}

/// Same as [`axis`], flipped so that up is positive.
#[inline]
fn axis_inverted(raw: u16) -> i16 {
    axis(!raw)
}

impl XInputReport {
    /// Translate a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &GamepadSnapshot) -> Self {
        let mut buttons1 = 0;
        let mut buttons2 = 0;

        for (dir, mask) in [
            (Dpad::UP, MASK_UP),
            (Dpad::DOWN, MASK_DOWN),
            (Dpad::LEFT, MASK_LEFT),
            (Dpad::RIGHT, MASK_RIGHT),
        ] {
            if snapshot.pressed_dpad(dir) {
                buttons1 |= mask;
            }
        }
        for (button, mask) in [
            (Buttons::S2, MASK_START),
            (Buttons::S1, MASK_BACK),
            (Buttons::L3, MASK_LS),
            (Buttons::R3, MASK_RS),
        ] {
            if snapshot.pressed(button) {
                buttons1 |= mask;
            }
        }
        for (button, mask) in [
            (Buttons::L1, MASK_LB),
            (Buttons::R1, MASK_RB),
            (Buttons::A1, MASK_HOME),
            (Buttons::B1, MASK_A),
            (Buttons::B2, MASK_B),
            (Buttons::B3, MASK_X),
            (Buttons::B4, MASK_Y),
        ] {
            if snapshot.pressed(button) {
                buttons2 |= mask;
            }
        }

        let digital = |b: Buttons| if snapshot.pressed(b) { 0xFF } else { 0x00 };

        Self {
            buttons1,
            buttons2,
            lt: snapshot.lt.unwrap_or_else(|| digital(Buttons::L2)),
            rt: snapshot.rt.unwrap_or_else(|| digital(Buttons::R2)),
            lx: axis(snapshot.lx),
            ly: axis_inverted(snapshot.ly),
            rx: axis(snapshot.rx),
            ry: axis_inverted(snapshot.ry),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; XINPUT_REPORT_LEN] {
        let mut out = [0u8; XINPUT_REPORT_LEN];
        out[0] = 0x00;
        out[1] = XINPUT_REPORT_LEN as u8;
        out[2] = self.buttons1;
        out[3] = self.buttons2;
        out[4] = self.lt;
        out[5] = self.rt;
        out[6..8].copy_from_slice(&self.lx.to_le_bytes());
        out[8..10].copy_from_slice(&self.ly.to_le_bytes());
        out[10..12].copy_from_slice(&self.rx.to_le_bytes());
        out[12..14].copy_from_slice(&self.ry.to_le_bytes());
        out
    }

    /// Parse a report as the host sees it.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; XINPUT_REPORT_LEN]) -> Self {
        let word = |i: usize| i16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Self {
            buttons1: bytes[2],
            buttons2: bytes[3],
            lt: bytes[4],
            rt: bytes[5],
            lx: word(6),
            ly: word(8),
            rx: word(10),
            ry: word(12),
        }
    }
}

/// XInput protocol driver.
///
/// Authentication is not a real handshake. With [`XInputAuth::Disabled`]
/// (the default) requests are acknowledged and ignored; with
/// [`XInputAuth::SimulatedTimer`] the driver reports success after
/// [`AUTH_TICKS`] auxiliary ticks.
pub struct XInputDriver {
    auth_mode: XInputAuth,
    auth: AuthState,
    player_led: u8,
    rumble: (u8, u8),
    report: XInputReport,
    cache: ReportCache<XINPUT_REPORT_LEN>,
    bound: Option<TransportType>,
}

impl XInputDriver {
    pub fn new(auth_mode: XInputAuth) -> Self {
        Self {
            auth_mode,
            auth: AuthState::Unauthenticated,
            player_led: led::OFF,
            rumble: (0, 0),
            report: XInputReport::default(),
            cache: ReportCache::new(),
            bound: None,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth == AuthState::Authenticated
    }

    pub fn player_led(&self) -> u8 {
        self.player_led
    }

    pub fn set_player_led(&mut self, pattern: u8) {
        if pattern != self.player_led {
            debug!("xinput: player led {}", pattern);
        }
        self.player_led = pattern;
    }

    /// Last rumble values from the host, (left, right).
    pub fn rumble(&self) -> (u8, u8) {
        self.rumble
    }

    /// Report built by the most recent `process`.
    pub fn current_report(&self) -> &XInputReport {
        &self.report
    }

    fn reset(&mut self) {
        self.auth = AuthState::Unauthenticated;
        self.player_led = led::OFF;
        self.rumble = (0, 0);
        self.report = XInputReport::default();
        self.cache.clear();
    }

    fn request_authentication(&mut self) {
        match self.auth_mode {
            XInputAuth::Disabled => {
                warn!("xinput: host requested authentication, not supported");
            }
            XInputAuth::SimulatedTimer => {
                debug!("xinput: authentication started");
                self.auth = AuthState::InProgress { ticks: 0 };
            }
        }
    }

    fn advance_authentication(&mut self) {
        if let AuthState::InProgress { ticks } = self.auth {
            let ticks = ticks + 1;
            if ticks >= AUTH_TICKS {
                info!("xinput: authenticated");
                self.auth = AuthState::Authenticated;
                self.set_player_led(led::ON1);
            } else {
                self.auth = AuthState::InProgress { ticks };
            }
        }
    }

    fn handle_feature_report(&mut self, data: &[u8]) -> bool {
        match data[1] {
            FEATURE_LED if data.len() >= 3 => {
                self.set_player_led(data[2]);
                true
            }
            FEATURE_AUTH => {
                self.request_authentication();
                true
            }
            _ => false,
        }
    }
}

impl Default for XInputDriver {
    fn default() -> Self {
        Self::new(XInputAuth::default())
    }
}

impl ProtocolDriver for XInputDriver {
    fn initialize<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        let ty = check_supported(self, transport)?;
        self.reset();
        self.bound = Some(ty);
        info!("xinput: bound to {}", ty.name());
        Ok(())
    }

    fn deinitialize<T: Transport + ?Sized>(&mut self, _transport: &mut T) {
        if self.bound.take().is_some() {
            debug!("xinput: unbound");
        }
    }

    fn rebind<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DriverError> {
        let ty = check_supported(self, transport)?;
        self.cache.clear();
        self.bound = Some(ty);
        debug!("xinput: rebound to {}", ty.name());
        Ok(())
    }

    fn process<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        snapshot: &GamepadSnapshot,
    ) -> Result<bool, DriverError> {
        check_bound(self.bound, transport)?;
        self.report = XInputReport::from_snapshot(snapshot);
        self.cache.send_if_changed(transport, &self.report.to_bytes())
    }

    fn process_aux<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if check_bound(self.bound, transport).is_err() {
            return;
        }
        self.advance_authentication();

        if !transport.is_ready() {
            return;
        }
        let mut buf = [0u8; TransportType::MAX_MTU];
        match transport.receive(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if !self.handle_incoming_data(&buf[..n]) {
                    trace!("xinput: ignored {} byte message", n);
                }
            }
            Err(e) => trace!("xinput: receive failed: {:?}", e),
        }
    }

    fn handle_incoming_data(&mut self, data: &[u8]) -> bool {
        if data.len() < 2 {
            return false;
        }
        match data[0] {
            REPORT_RUMBLE if data.len() >= RUMBLE_MIN_LEN => {
                self.rumble = (data[2], data[3]);
                true
            }
            REPORT_FEATURE => self.handle_feature_report(data),
            _ => false,
        }
    }

    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::XInput
    }

    fn protocol_name(&self) -> &'static str {
        "XInput"
    }

    fn preferred_transports(&self) -> &'static [TransportType] {
        PREFERRED
    }

    fn supports_authentication(&self) -> bool {
        true
    }

    fn supports_force_feedback(&self) -> bool {
        true
    }

    fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }
}
