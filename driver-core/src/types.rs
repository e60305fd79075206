//! Core types: transport/protocol identifiers and the gamepad snapshot.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Centre value of a 16-bit analog axis.
pub const JOYSTICK_MID: u16 = 0x7FFF;

/// Identifies a transport implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportType {
    Usb,
    Bluetooth,
    Gpio,
}

impl TransportType {
    /// Every transport type, in declaration order.
    pub const ALL: [TransportType; 3] = [Self::Usb, Self::Bluetooth, Self::Gpio];

    /// Largest [`mtu`](Self::mtu) of any transport. Receive buffers of this
    /// size hold any inbound message whole.
    pub const MAX_MTU: usize = {
        let mut max = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            let mtu = Self::ALL[i].mtu();
            if mtu > max {
                max = mtu;
            }
            i += 1;
        }
        max
    };

    /// Maximum payload accepted by a single `send` on this transport.
    #[must_use]
    pub const fn mtu(self) -> usize {
        match self {
            Self::Usb => 64,
            Self::Bluetooth => 512,
            Self::Gpio => 32,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Usb => "USB",
            Self::Bluetooth => "Bluetooth",
            Self::Gpio => "GPIO",
        }
    }
}

/// Identifies a wire protocol (the boot "input mode").
///
/// Only [`is_migrated`](Self::is_migrated) protocols have a protocol driver in
/// this crate; everything else is served by the legacy driver shim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolType {
    XInput,
    DInput,
    Ps3,
    Ps4,
    Ps5,
    Switch,
    XboxOne,
    XboxOriginal,
    Keyboard,
    HidGeneric,
    MdMini,
    NeoGeo,
    PcEngineMini,
    Egret,
    Astro,
    PsClassic,
    /// SNES controller emulation over bit-banged GPIO.
    Snes,
    /// Web configuration mode.
    Config,
}

impl ProtocolType {
    /// Whether a protocol driver exists for this mode.
    #[must_use]
    pub const fn is_migrated(self) -> bool {
        matches!(self, Self::XInput | Self::Ps4 | Self::Snes)
    }

    #[must_use]
    pub const fn is_config(self) -> bool {
        matches!(self, Self::Config)
    }
}

/// D-pad state as a 4-bit mask.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dpad(pub u8);

impl Dpad {
    pub const UP: Self = Self(1 << 0);
    pub const DOWN: Self = Self(1 << 1);
    pub const LEFT: Self = Self(1 << 2);
    pub const RIGHT: Self = Self(1 << 3);

    pub const NONE: Self = Self(0);

    /// Only the low four bits carry direction state.
    pub const MASK: u8 = 0x0F;

    #[inline]
    #[must_use]
    pub const fn contains(self, dir: Dpad) -> bool {
        (self.0 & dir.0) == dir.0
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0 & Self::MASK
    }
}

macro_rules! bit_ops {
    ($ty:ident) => {
        impl BitOr for $ty {
            type Output = Self;
            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $ty {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $ty {
            type Output = Self;
            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl BitAndAssign for $ty {
            #[inline]
            fn bitand_assign(&mut self, rhs: Self) {
                self.0 &= rhs.0;
            }
        }

        impl Not for $ty {
            type Output = Self;
            #[inline]
            fn not(self) -> Self {
                Self(!self.0)
            }
        }
    };
}

bit_ops!(Dpad);

/// Button state represented as a bitfield.
///
/// Buttons are named by position rather than by any one console's labels:
/// `B1..B4` are the face buttons (south, east, west, north), `L1/R1` the
/// shoulders, `L2/R2` the triggers, `S1/S2` select/start, `L3/R3` the stick
/// clicks and `A1..A4` the auxiliary buttons (home, capture/touchpad, ...).
///
/// # Example
///
/// ```
/// use driver_core::Buttons;
///
/// let buttons = Buttons::B1 | Buttons::R1;
/// assert!(buttons.contains(Buttons::B1));
/// assert!(!buttons.contains(Buttons::B2));
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Buttons(pub u32);

impl Buttons {
    pub const B1: Self = Self(1 << 0);
    pub const B2: Self = Self(1 << 1);
    pub const B3: Self = Self(1 << 2);
    pub const B4: Self = Self(1 << 3);
    pub const L1: Self = Self(1 << 4);
    pub const R1: Self = Self(1 << 5);
    pub const L2: Self = Self(1 << 6);
    pub const R2: Self = Self(1 << 7);
    pub const S1: Self = Self(1 << 8);
    pub const S2: Self = Self(1 << 9);
    pub const L3: Self = Self(1 << 10);
    pub const R3: Self = Self(1 << 11);
    pub const A1: Self = Self(1 << 12);
    pub const A2: Self = Self(1 << 13);
    pub const A3: Self = Self(1 << 14);
    pub const A4: Self = Self(1 << 15);

    /// No buttons pressed.
    pub const NONE: Self = Self(0);

    /// Every named button, in bit order.
    pub const ALL: [Buttons; 16] = [
        Self::B1,
        Self::B2,
        Self::B3,
        Self::B4,
        Self::L1,
        Self::R1,
        Self::L2,
        Self::R2,
        Self::S1,
        Self::S2,
        Self::L3,
        Self::R3,
        Self::A1,
        Self::A2,
        Self::A3,
        Self::A4,
    ];

    /// Check if the given button(s) are pressed.
    #[inline]
    #[must_use]
    pub const fn contains(self, button: Buttons) -> bool {
        (self.0 & button.0) == button.0
    }

    /// Check if any of the given buttons is pressed.
    #[inline]
    #[must_use]
    pub const fn intersects(self, buttons: Buttons) -> bool {
        (self.0 & buttons.0) != 0
    }

    /// Set or clear button(s).
    #[inline]
    pub fn set(&mut self, button: Buttons, pressed: bool) {
        if pressed {
            self.0 |= button.0;
        } else {
            self.0 &= !button.0;
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

bit_ops!(Buttons);

/// Per-snapshot semantic flags that change how buttons are mapped.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadOptions {
    /// Swap S1 and A2..A4 between the DS4 Share and Touchpad buttons.
    pub switch_touchpad_and_share: bool,
}

/// Immutable read of the gamepad input state for one tick.
///
/// Axes are unsigned 16-bit with [`JOYSTICK_MID`] at rest. Triggers are `None`
/// when the hardware has no analog trigger source; protocols then derive a
/// digital 0/255 value from `L2`/`R2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadSnapshot {
    pub dpad: Dpad,
    pub buttons: Buttons,
    pub lx: u16,
    pub ly: u16,
    pub rx: u16,
    pub ry: u16,
    pub lt: Option<u8>,
    pub rt: Option<u8>,
    pub options: GamepadOptions,
}

impl GamepadSnapshot {
    /// No buttons pressed, sticks centred, digital triggers.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            dpad: Dpad::NONE,
            buttons: Buttons::NONE,
            lx: JOYSTICK_MID,
            ly: JOYSTICK_MID,
            rx: JOYSTICK_MID,
            ry: JOYSTICK_MID,
            lt: None,
            rt: None,
            options: GamepadOptions {
                switch_touchpad_and_share: false,
            },
        }
    }

    #[inline]
    #[must_use]
    pub const fn pressed(&self, button: Buttons) -> bool {
        self.buttons.contains(button)
    }

    #[inline]
    #[must_use]
    pub const fn pressed_dpad(&self, dir: Dpad) -> bool {
        self.dpad.contains(dir)
    }

    /// Whether any of the auxiliary buttons A2, A3 or A4 is held.
    #[inline]
    #[must_use]
    pub const fn pressed_any_aux(&self) -> bool {
        self.buttons
            .intersects(Buttons(Buttons::A2.0 | Buttons::A3.0 | Buttons::A4.0))
    }
}

impl Default for GamepadSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}
