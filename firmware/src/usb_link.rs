//! USB HID link between the embassy-usb device and the driver layer.
//!
//! The embassy-usb device and HID endpoints live in their own tasks. They talk
//! to [`RpUsbBackend`], the synchronous handle the transports use, through
//! static channels:
//!
//! - bus state changes from [`LinkDeviceHandler`] land in an event queue;
//! - IN reports written by the backend are drained by [`usb_io_task`];
//! - OUT and feature reports from the host are queued for `read_report`.

use defmt::{debug, info, warn};
use driver_core::{TransportError, UsbBackend, UsbEvent};
use embassy_futures::join::join;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::class::hid::{
    Config as HidConfig, HidBootProtocol, HidReader, HidReaderWriter, HidSubclass, HidWriter,
    ReportId, RequestHandler, State,
};
use embassy_usb::control::OutResponse;
use embassy_usb::{Builder, Handler, UsbDevice};
use heapless::Vec;
use portable_atomic::{AtomicBool, Ordering};

/// Largest report carried in either direction (RP2040 full-speed endpoint).
pub const REPORT_SIZE: usize = 64;

/// Feature reports reach the drivers prefixed with this byte.
pub const FEATURE_REPORT_TAG: u8 = 0x01;

pub type Report = Vec<u8, REPORT_SIZE>;
pub type UsbDriver = Driver<'static, USB>;

static EVENTS: Channel<CriticalSectionRawMutex, UsbEvent, 8> = Channel::new();
static IN_REPORTS: Channel<CriticalSectionRawMutex, Report, 4> = Channel::new();
static OUT_REPORTS: Channel<CriticalSectionRawMutex, Report, 4> = Channel::new();

/// A backend has started the link; host traffic is only forwarded while set.
static RUNNING: AtomicBool = AtomicBool::new(false);
/// A backend handle exists.
static CLAIMED: AtomicBool = AtomicBool::new(false);
/// Host configuration state, replayed to a backend that starts late.
static CONFIGURED: AtomicBool = AtomicBool::new(false);

/// Vendor-defined 64-byte report descriptor used by the protocol drivers.
///
/// The wire layout is owned by the active protocol driver, so the descriptor
/// only declares opaque input, output and feature reports.
pub const RAW_REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, // Usage (Vendor Usage 1)
    0xA1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    //
    // --- Input: driver report ---
    0x95, 0x40, //   Report Count (64)
    0x09, 0x01, //   Usage (Vendor Usage 1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Output: rumble / LEDs ---
    0x95, 0x40, //   Report Count (64)
    0x09, 0x01, //   Usage (Vendor Usage 1)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    //
    // --- Feature: LED and authentication requests ---
    0x95, 0x3F, //   Report Count (63)
    0x09, 0x01, //   Usage (Vendor Usage 1)
    0xB1, 0x02, //   Feature (Data, Variable, Absolute)
    //
    0xC0, // End Collection
];

fn post_event(event: UsbEvent) {
    if !RUNNING.load(Ordering::Acquire) {
        return;
    }
    if EVENTS.try_send(event).is_err() {
        warn!("usb: event queue full, dropped {:?}", event);
    }
}

fn post_out_report(report: Report) {
    if !RUNNING.load(Ordering::Acquire) {
        return;
    }
    if OUT_REPORTS.try_send(report).is_err() {
        debug!("usb: OUT queue full, report dropped");
    }
}

fn clear_queues() {
    EVENTS.clear();
    IN_REPORTS.clear();
    OUT_REPORTS.clear();
}

fn truncated(data: &[u8]) -> Report {
    let n = data.len().min(REPORT_SIZE);
    // Cannot fail: `n` is within capacity.
    Report::from_slice(&data[..n]).unwrap_or_default()
}

/// Device-level callbacks from embassy-usb.
pub struct LinkDeviceHandler;

impl Handler for LinkDeviceHandler {
    fn reset(&mut self) {
        if CONFIGURED.swap(false, Ordering::AcqRel) {
            post_event(UsbEvent::Unmounted);
        }
    }

    fn configured(&mut self, configured: bool) {
        CONFIGURED.store(configured, Ordering::Release);
        info!("usb: configured={}", configured);
        post_event(if configured {
            UsbEvent::Mounted
        } else {
            UsbEvent::Unmounted
        });
    }

    fn suspended(&mut self, suspended: bool) {
        post_event(if suspended {
            UsbEvent::Suspended
        } else {
            UsbEvent::Resumed
        });
    }
}

/// HID control requests (SET_REPORT).
pub struct LinkRequestHandler;

impl RequestHandler for LinkRequestHandler {
    fn get_report(&mut self, _id: ReportId, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    fn set_report(&mut self, id: ReportId, data: &[u8]) -> OutResponse {
        match id {
            ReportId::Out(_) => post_out_report(truncated(data)),
            ReportId::Feature(_) => {
                let mut report = Report::new();
                let _ = report.push(FEATURE_REPORT_TAG);
                let n = data.len().min(REPORT_SIZE - 1);
                let _ = report.extend_from_slice(&data[..n]);
                post_out_report(report);
            }
            ReportId::In(_) => {}
        }
        OutResponse::Accepted
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, _duration_ms: u32) {}

    fn get_idle_ms(&mut self, _id: Option<ReportId>) -> Option<u32> {
        None
    }
}

/// Register the HID interface on `builder`.
pub fn configure_usb_link(
    builder: &mut Builder<'static, UsbDriver>,
    state: &'static mut State<'static>,
    request_handler: &'static mut LinkRequestHandler,
    report_descriptor: &'static [u8],
) -> HidReaderWriter<'static, UsbDriver, REPORT_SIZE, REPORT_SIZE> {
    let config = HidConfig {
        report_descriptor,
        request_handler: Some(request_handler),
        poll_ms: 1,
        max_packet_size: REPORT_SIZE as u16,
        hid_subclass: HidSubclass::No,
        hid_boot_protocol: HidBootProtocol::None,
    };
    HidReaderWriter::new(builder, state, config)
}

/// Single handle onto the USB link.
///
/// At most one exists at a time; [`claim`](Self::claim) returns `None` while
/// another handle is alive.
pub struct RpUsbBackend {
    _claim: (),
}

impl RpUsbBackend {
    pub fn claim() -> Option<Self> {
        CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { _claim: () })
    }
}

impl Drop for RpUsbBackend {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::Release);
        CLAIMED.store(false, Ordering::Release);
    }
}

impl UsbBackend for RpUsbBackend {
    fn start(&mut self) -> Result<(), TransportError> {
        if RUNNING.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        clear_queues();
        if CONFIGURED.load(Ordering::Acquire) {
            post_event(UsbEvent::Mounted);
        }
        debug!("usb: link started");
        Ok(())
    }

    fn stop(&mut self) {
        RUNNING.store(false, Ordering::Release);
        clear_queues();
        debug!("usb: link stopped");
    }

    fn poll_event(&mut self) -> Option<UsbEvent> {
        EVENTS.try_receive().ok()
    }

    fn write_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !RUNNING.load(Ordering::Acquire) {
            return Err(TransportError::NotInitialized);
        }
        let report = truncated(data);
        let n = report.len();
        IN_REPORTS
            .try_send(report)
            .map(|()| n)
            .map_err(|_| TransportError::Busy)
    }

    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match OUT_REPORTS.try_receive() {
            Ok(report) => {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
pub async fn usb_device_task(mut device: UsbDevice<'static, UsbDriver>) {
    device.run().await;
}

/// Moves reports between the queues and the HID endpoints.
#[embassy_executor::task]
pub async fn usb_io_task(
    mut reader: HidReader<'static, UsbDriver, REPORT_SIZE>,
    mut writer: HidWriter<'static, UsbDriver, REPORT_SIZE>,
) {
    let in_fut = async {
        loop {
            let report = IN_REPORTS.receive().await;
            if let Err(e) = writer.write(&report).await {
                warn!("usb: IN report dropped: {:?}", e);
            }
        }
    };

    let out_fut = async {
        let mut buf = [0u8; REPORT_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(n) => post_out_report(truncated(&buf[..n])),
                Err(e) => {
                    debug!("usb: OUT endpoint: {:?}", e);
                    reader.ready().await;
                }
            }
        }
    };

    join(in_fut, out_fut).await;
}
