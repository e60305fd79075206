//! Shim for monolithic drivers that predate the transport split.
//!
//! A legacy driver owns its own USB (or network) plumbing end to end. The
//! manager only forwards the tick calls to it.

use crate::types::GamepadSnapshot;

/// A self-contained driver for a mode without a protocol driver.
pub trait LegacyDriver {
    fn initialize(&mut self);

    /// Returns whether a report was sent.
    fn process(&mut self, snapshot: &GamepadSnapshot) -> bool;

    fn process_aux(&mut self);

    fn joystick_mid_value(&self) -> u16;
}

/// Placeholder for platforms that ship no legacy drivers.
///
/// Uninhabited: a `Platform` using it can never hand one out.
#[derive(Debug)]
pub enum NoLegacyDriver {}

impl LegacyDriver for NoLegacyDriver {
    fn initialize(&mut self) {
        match *self {}
    }

    fn process(&mut self, _snapshot: &GamepadSnapshot) -> bool {
        match *self {}
    }

    fn process_aux(&mut self) {
        match *self {}
    }

    fn joystick_mid_value(&self) -> u16 {
        match *self {}
    }
}
