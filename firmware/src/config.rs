//! Boot configuration, selected with Cargo features.

use driver_core::{DriverConfig, ProtocolType, SnesConfig, TransportType, XInputAuth};

#[cfg(any(
    all(feature = "mode-xinput", feature = "mode-ps4"),
    all(feature = "mode-xinput", feature = "mode-snes"),
    all(feature = "mode-xinput", feature = "mode-legacy-hid"),
    all(feature = "mode-ps4", feature = "mode-snes"),
    all(feature = "mode-ps4", feature = "mode-legacy-hid"),
    all(feature = "mode-snes", feature = "mode-legacy-hid"),
))]
compile_error!("select exactly one of the mode-* features");

#[cfg(not(any(
    feature = "mode-xinput",
    feature = "mode-ps4",
    feature = "mode-snes",
    feature = "mode-legacy-hid",
)))]
compile_error!("select one of the mode-* features");

#[cfg(feature = "mode-xinput")]
const MODE: (ProtocolType, TransportType) = (ProtocolType::XInput, TransportType::Usb);
// The Pico has no radio, so PS4 mode comes up wired.
#[cfg(feature = "mode-ps4")]
const MODE: (ProtocolType, TransportType) = (ProtocolType::Ps4, TransportType::Usb);
#[cfg(feature = "mode-snes")]
const MODE: (ProtocolType, TransportType) = (ProtocolType::Snes, TransportType::Gpio);
#[cfg(feature = "mode-legacy-hid")]
const MODE: (ProtocolType, TransportType) = (ProtocolType::HidGeneric, TransportType::Usb);

#[cfg(feature = "xinput-auth-sim")]
const XINPUT_AUTH: XInputAuth = XInputAuth::SimulatedTimer;
#[cfg(not(feature = "xinput-auth-sim"))]
const XINPUT_AUTH: XInputAuth = XInputAuth::Disabled;

/// What the driver manager brings up at boot.
pub const BOOT_CONFIG: DriverConfig = DriverConfig {
    mode: MODE.0,
    preferred_transport: MODE.1,
    xinput_auth: XINPUT_AUTH,
    snes: SnesConfig::DEFAULT,
};

/// pid.codes test VID/PID.
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0001;
pub const USB_MANUFACTURER: &str = "Rust Gamepad";
pub const USB_PRODUCT: &str = "Gamepad Firmware";
pub const USB_SERIAL: &str = "001";

/// Driver manager tick period.
pub const TICK_MS: u64 = 1;
