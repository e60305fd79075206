//! USB device transport.

use heapless::Vec;

use super::{drain_pending, Transport};
use crate::backend::{UsbBackend, UsbEvent};
use crate::error::TransportError;
use crate::types::TransportType;

/// Largest OUT report buffered between `process` and `receive`.
const RECEIVE_BUFFER_SIZE: usize = 64;

/// USB HID transport over a [`UsbBackend`].
///
/// Ready once the host has configured the device and while the bus is not
/// suspended. Bus events are drained from the backend during `process`, which
/// also buffers at most one OUT report for the next `receive`.
pub struct UsbTransport<U: UsbBackend> {
    backend: U,
    initialized: bool,
    mounted: bool,
    configured: bool,
    pending: Option<Vec<u8, RECEIVE_BUFFER_SIZE>>,
}

impl<U: UsbBackend> UsbTransport<U> {
    pub fn new(backend: U) -> Self {
        Self {
            backend,
            initialized: false,
            mounted: false,
            configured: false,
            pending: None,
        }
    }

    /// Host enumerated and configured the device.
    pub fn on_mount(&mut self) {
        debug!("usb: mounted");
        self.mounted = true;
        self.configured = true;
    }

    pub fn on_unmount(&mut self) {
        debug!("usb: unmounted");
        self.mounted = false;
        self.configured = false;
        self.pending = None;
    }

    pub fn on_suspend(&mut self) {
        debug!("usb: suspended");
        self.configured = false;
    }

    pub fn on_resume(&mut self) {
        debug!("usb: resumed");
        if self.mounted {
            self.configured = true;
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn backend(&self) -> &U {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut U {
        &mut self.backend
    }

    fn poll_out_report(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        match self.backend.read_report(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let n = n.min(RECEIVE_BUFFER_SIZE);
                self.pending = Vec::from_slice(&buf[..n]).ok();
            }
            Err(e) => warn!("usb: read failed: {:?}", e),
        }
    }
}

impl<U: UsbBackend> Transport for UsbTransport<U> {
    fn initialize(&mut self) -> Result<(), TransportError> {
        if self.initialized {
            return Ok(());
        }
        self.backend.start()?;
        self.initialized = true;
        self.mounted = false;
        self.configured = false;
        self.pending = None;
        info!("usb: transport initialized");
        Ok(())
    }

    fn deinitialize(&mut self) {
        if !self.initialized {
            return;
        }
        self.backend.stop();
        self.initialized = false;
        self.mounted = false;
        self.configured = false;
        self.pending = None;
        info!("usb: transport deinitialized");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.mounted && self.configured
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
        self.backend.write_report(&data[..len])
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
        self.backend.task();
        while let Some(event) = self.backend.poll_event() {
            match event {
                UsbEvent::Mounted => self.on_mount(),
                UsbEvent::Unmounted => self.on_unmount(),
                UsbEvent::Suspended => self.on_suspend(),
                UsbEvent::Resumed => self.on_resume(),
            }
        }
        if self.is_ready() {
            self.poll_out_report();
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Usb
    }
}

impl<U: UsbBackend> Drop for UsbTransport<U> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockUsb;

    fn mounted() -> (UsbTransport<MockUsb>, MockUsb) {
        let usb = MockUsb::new();
        let mut t = UsbTransport::new(usb.clone());
        t.initialize().unwrap();
        usb.push_event(UsbEvent::Mounted);
        t.process();
        (t, usb)
    }

    #[test]
    fn test_not_ready_until_mounted() {
        let usb = MockUsb::new();
        let mut t = UsbTransport::new(usb.clone());
        t.initialize().unwrap();
        assert!(t.is_initialized());
        assert!(!t.is_ready());
        assert_eq!(t.send(&[1, 2, 3]), Err(TransportError::NotReady));

        usb.push_event(UsbEvent::Mounted);
        t.process();
        assert!(t.is_ready());
    }

    #[test]
    fn test_initialize_failure_leaves_uninitialized() {
        let usb = MockUsb::new();
        usb.fail_start(true);
        let mut t = UsbTransport::new(usb.clone());
        assert_eq!(t.initialize(), Err(TransportError::Hardware));
        assert!(!t.is_initialized());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let usb = MockUsb::new();
        let mut t = UsbTransport::new(usb.clone());
        t.initialize().unwrap();
        t.initialize().unwrap();
        assert_eq!(usb.start_count(), 1);
    }

    #[test]
    fn test_send_truncates_to_mtu() {
        let (mut t, usb) = mounted();
        let data = [0xAAu8; 100];
        assert_eq!(t.send(&data), Ok(64));
        assert_eq!(usb.sent().last().map(|r| r.len()), Some(64));
    }

    #[test]
    fn test_send_empty_rejected() {
        let (mut t, _usb) = mounted();
        assert_eq!(t.send(&[]), Err(TransportError::InvalidArgument));
    }

    #[test]
    fn test_suspend_and_resume() {
        let (mut t, usb) = mounted();
        usb.push_event(UsbEvent::Suspended);
        t.process();
        assert!(!t.is_ready());
        usb.push_event(UsbEvent::Resumed);
        t.process();
        assert!(t.is_ready());
        usb.push_event(UsbEvent::Unmounted);
        t.process();
        assert!(!t.is_ready());
    }

    #[test]
    fn test_receive_drains_single_message() {
        let (mut t, usb) = mounted();
        let mut buf = [0u8; 64];
        assert_eq!(t.receive(&mut buf), Ok(0));

        usb.push_out_report(&[0x00, 0x08, 0x10, 0x20]);
        t.process();
        assert_eq!(t.receive(&mut buf), Ok(4));
        assert_eq!(&buf[..4], &[0x00, 0x08, 0x10, 0x20]);
        assert_eq!(t.receive(&mut buf), Ok(0));
    }

    #[test]
    fn test_drop_stops_backend() {
        let (t, usb) = mounted();
        drop(t);
        assert_eq!(usb.stop_count(), 1);
    }
}
