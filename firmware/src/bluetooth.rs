//! Bluetooth backend for boards without a radio.
//!
//! The plain RP2040 Pico has no Bluetooth controller. Powering on always
//! fails, so transport selection moves on to the next candidate.

use defmt::debug;
use driver_core::{BluetoothBackend, BluetoothEvent, TransportError};

pub struct NoRadio;

impl BluetoothBackend for NoRadio {
    fn power_on(&mut self) -> Result<(), TransportError> {
        debug!("bt: no radio on this board");
        Err(TransportError::Hardware)
    }

    fn power_off(&mut self) {}

    fn start_advertising(&mut self, _name: &str) -> Result<(), TransportError> {
        Err(TransportError::Hardware)
    }

    fn stop_advertising(&mut self) {}

    fn disconnect(&mut self) {}

    fn poll_event(&mut self) -> Option<BluetoothEvent> {
        None
    }

    fn read_packet(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Err(TransportError::Hardware)
    }

    fn send_interrupt(&mut self, _data: &[u8]) -> Result<usize, TransportError> {
        Err(TransportError::Hardware)
    }

    fn set_report_map(&mut self, _descriptor: &'static [u8]) {}
}
