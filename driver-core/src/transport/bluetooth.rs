//! Bluetooth HID transport.

use heapless::{String, Vec};

use super::{drain_pending, Transport};
use crate::backend::{BluetoothBackend, BluetoothEvent};
use crate::error::TransportError;
use crate::types::TransportType;

/// Longest advertised device name, in bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 31;

pub const DEFAULT_DEVICE_NAME: &str = "Gamepad Controller";

const RECEIVE_BUFFER_SIZE: usize = 512;

/// Bluetooth HID transport over a [`BluetoothBackend`].
///
/// `initialize` powers the radio and starts advertising under the configured
/// name. The transport is ready while a host is connected; on disconnect it
/// goes back to advertising.
pub struct BluetoothTransport<B: BluetoothBackend> {
    backend: B,
    initialized: bool,
    advertising: bool,
    connected: Option<[u8; 6]>,
    device_name: String<MAX_DEVICE_NAME_LEN>,
    report_map: Option<&'static [u8]>,
    pending: Option<Vec<u8, RECEIVE_BUFFER_SIZE>>,
}

impl<B: BluetoothBackend> BluetoothTransport<B> {
    pub fn new(backend: B) -> Self {
        let mut device_name = String::new();
        // Fits: the default is shorter than the limit.
        let _ = device_name.push_str(DEFAULT_DEVICE_NAME);
        Self {
            backend,
            initialized: false,
            advertising: false,
            connected: None,
            device_name,
            report_map: None,
            pending: None,
        }
    }

    /// Start advertising, optionally under a new name (truncated to
    /// [`MAX_DEVICE_NAME_LEN`] bytes on a character boundary).
    pub fn start_advertising(&mut self, name: Option<&str>) -> Result<(), TransportError> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        if self.advertising {
            return Err(TransportError::Busy);
        }
        if let Some(name) = name {
            self.set_device_name(name);
        }
        self.backend.start_advertising(self.device_name.as_str())?;
        self.advertising = true;
        info!("bt: advertising as {}", self.device_name.as_str());
        Ok(())
    }

    pub fn stop_advertising(&mut self) {
        if self.advertising {
            self.backend.stop_advertising();
            self.advertising = false;
        }
    }

    pub fn disconnect(&mut self) {
        if self.connected.take().is_some() {
            self.backend.disconnect();
            self.pending = None;
            info!("bt: disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn connected_address(&self) -> Option<[u8; 6]> {
        self.connected
    }

    pub fn device_name(&self) -> &str {
        self.device_name.as_str()
    }

    /// Install the HID report descriptor. Rejects an empty map.
    pub fn set_hid_report_map(&mut self, map: &'static [u8]) -> Result<(), TransportError> {
        if map.is_empty() {
            return Err(TransportError::InvalidArgument);
        }
        self.report_map = Some(map);
        self.backend.set_report_map(map);
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn set_device_name(&mut self, name: &str) {
        self.device_name.clear();
        for c in name.chars() {
            if self.device_name.push(c).is_err() {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: BluetoothEvent) {
        match event {
            BluetoothEvent::Connected(addr) => {
                debug!("bt: connected");
                self.connected = Some(addr);
                self.advertising = false;
            }
            BluetoothEvent::Disconnected => {
                debug!("bt: link lost");
                self.connected = None;
                self.pending = None;
                self.advertising = false;
                if let Err(e) = self.start_advertising(None) {
                    warn!("bt: failed to resume advertising: {:?}", e);
                }
            }
        }
    }

    fn poll_packet(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        match self.backend.read_packet(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let n = n.min(RECEIVE_BUFFER_SIZE);
                self.pending = Vec::from_slice(&buf[..n]).ok();
            }
            Err(e) => warn!("bt: read failed: {:?}", e),
        }
    }
}

impl<B: BluetoothBackend> Transport for BluetoothTransport<B> {
    fn initialize(&mut self) -> Result<(), TransportError> {
        if self.initialized {
            return Ok(());
        }
        self.backend.power_on()?;
        if let Some(map) = self.report_map {
            self.backend.set_report_map(map);
        }
        self.initialized = true;
        self.connected = None;
        self.pending = None;
        if let Err(e) = self.start_advertising(None) {
            self.initialized = false;
            self.backend.power_off();
            return Err(e);
        }
        info!("bt: transport initialized");
        Ok(())
    }

    fn deinitialize(&mut self) {
        if !self.initialized {
            return;
        }
        self.stop_advertising();
        self.disconnect();
        self.backend.power_off();
        self.initialized = false;
        info!("bt: transport deinitialized");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.connected.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        if data.is_empty() {
            return Err(TransportError::InvalidArgument);
        }
        let len = data.len().min(self.mtu());
        self.backend.send_interrupt(&data[..len])
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        if buf.is_empty() {
            return Err(TransportError::InvalidArgument);
        }
        Ok(drain_pending(&mut self.pending, buf))
    }

    fn process(&mut self) {
        if !self.initialized {
            return;
        }
        while let Some(event) = self.backend.poll_event() {
            self.handle_event(event);
        }
        if self.is_ready() {
            self.poll_packet();
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Bluetooth
    }
}

impl<B: BluetoothBackend> Drop for BluetoothTransport<B> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBluetooth;

    const ADDR: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

    fn connected() -> (BluetoothTransport<MockBluetooth>, MockBluetooth) {
        let bt = MockBluetooth::new();
        let mut t = BluetoothTransport::new(bt.clone());
        t.initialize().unwrap();
        bt.push_event(BluetoothEvent::Connected(ADDR));
        t.process();
        (t, bt)
    }

    #[test]
    fn test_initialize_advertises_default_name() {
        let bt = MockBluetooth::new();
        let mut t = BluetoothTransport::new(bt.clone());
        t.initialize().unwrap();
        assert!(t.is_advertising());
        assert!(!t.is_ready());
        assert_eq!(bt.advertised_name().as_deref(), Some(DEFAULT_DEVICE_NAME));
    }

    #[test]
    fn test_radio_absent_fails_initialize() {
        let bt = MockBluetooth::new();
        bt.fail_power_on(true);
        let mut t = BluetoothTransport::new(bt.clone());
        assert_eq!(t.initialize(), Err(TransportError::Hardware));
        assert!(!t.is_initialized());
    }

    #[test]
    fn test_connect_makes_ready() {
        let (t, _bt) = connected();
        assert!(t.is_ready());
        assert!(t.is_connected());
        assert!(!t.is_advertising());
        assert_eq!(t.connected_address(), Some(ADDR));
    }

    #[test]
    fn test_disconnect_resumes_advertising() {
        let (mut t, bt) = connected();
        bt.push_event(BluetoothEvent::Disconnected);
        t.process();
        assert!(!t.is_ready());
        assert!(t.is_advertising());
        assert_eq!(t.connected_address(), None);
    }

    #[test]
    fn test_advertising_twice_is_busy() {
        let bt = MockBluetooth::new();
        let mut t = BluetoothTransport::new(bt);
        t.initialize().unwrap();
        assert_eq!(t.start_advertising(None), Err(TransportError::Busy));
    }

    #[test]
    fn test_name_is_truncated() {
        let bt = MockBluetooth::new();
        let mut t = BluetoothTransport::new(bt.clone());
        t.initialize().unwrap();
        t.stop_advertising();
        t.start_advertising(Some("An Extremely Long Controller Name For Testing"))
            .unwrap();
        assert_eq!(t.device_name().len(), MAX_DEVICE_NAME_LEN);
        assert!(t.device_name().starts_with("An Extremely Long"));
    }

    #[test]
    fn test_receive_and_send() {
        let (mut t, bt) = connected();
        bt.push_packet(&[0x05, 0xFF, 0x00, 0x00, 0x10, 0x20]);
        t.process();
        let mut buf = [0u8; 16];
        assert_eq!(t.receive(&mut buf), Ok(6));
        assert_eq!(buf[4], 0x10);
        assert_eq!(t.send(&[1, 2, 3]), Ok(3));
        assert_eq!(bt.sent(), std::vec![std::vec![1u8, 2, 3]]);
    }

    #[test]
    fn test_deinitialize_disconnects_and_powers_off() {
        let (mut t, bt) = connected();
        t.deinitialize();
        assert!(!t.is_initialized());
        assert!(!t.is_connected());
        assert!(bt.is_powered_off());
        assert_eq!(bt.disconnect_count(), 1);
    }

    #[test]
    fn test_empty_report_map_rejected() {
        let bt = MockBluetooth::new();
        let mut t = BluetoothTransport::new(bt);
        assert_eq!(t.set_hid_report_map(&[]), Err(TransportError::InvalidArgument));
    }
}
