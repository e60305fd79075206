//! Host-side backends for unit tests.
//!
//! Every mock is a cheap handle over shared state, so a test can give one
//! clone to a transport and keep another to script events and inspect what
//! the transport did.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::backend::{
    BluetoothBackend, BluetoothEvent, GpioBackend, Platform, PwmSettings, UsbBackend, UsbEvent,
};
use crate::clock::Clock;
use crate::config::{GpioPinConfig, Pull};
use crate::error::TransportError;
use crate::legacy::LegacyDriver;
use crate::transport::{BluetoothTransport, GpioTransport, PinBus, Transport, UsbTransport};
use crate::types::{GamepadSnapshot, ProtocolType, TransportType};

pub type UsbT = UsbTransport<MockUsb>;
pub type BluetoothT = BluetoothTransport<MockBluetooth>;
pub type GpioT = GpioTransport<MockGpio, MockClock>;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockClock(Rc<Cell<u64>>);

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_us(&self, now: u64) {
        self.0.set(now);
    }

    pub fn advance_us(&self, delta: u64) {
        self.0.set(self.0.get() + delta);
    }
}

impl Clock for MockClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

// ---------------------------------------------------------------------------
// USB
// ---------------------------------------------------------------------------

#[derive(Default)]
struct UsbState {
    started: bool,
    fail_start: bool,
    fail_writes: bool,
    start_count: u32,
    stop_count: u32,
    events: VecDeque<UsbEvent>,
    out_reports: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct MockUsb(Rc<RefCell<UsbState>>);

impl MockUsb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: UsbEvent) {
        self.0.borrow_mut().events.push_back(event);
    }

    pub fn push_out_report(&self, report: &[u8]) {
        self.0.borrow_mut().out_reports.push_back(report.to_vec());
    }

    pub fn fail_start(&self, fail: bool) {
        self.0.borrow_mut().fail_start = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.borrow_mut().fail_writes = fail;
    }

    pub fn start_count(&self) -> u32 {
        self.0.borrow().start_count
    }

    pub fn stop_count(&self) -> u32 {
        self.0.borrow().stop_count
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.borrow().sent.clone()
    }

    pub fn send_count(&self) -> usize {
        self.0.borrow().sent.len()
    }
}

impl UsbBackend for MockUsb {
    fn start(&mut self) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        if s.fail_start {
            return Err(TransportError::Hardware);
        }
        s.started = true;
        s.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut s = self.0.borrow_mut();
        s.started = false;
        s.stop_count += 1;
    }

    fn poll_event(&mut self) -> Option<UsbEvent> {
        self.0.borrow_mut().events.pop_front()
    }

    fn write_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut s = self.0.borrow_mut();
        if s.fail_writes || !s.started {
            return Err(TransportError::Hardware);
        }
        s.sent.push(data.to_vec());
        Ok(data.len())
    }

    fn read_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let Some(report) = self.0.borrow_mut().out_reports.pop_front() else {
            return Ok(0);
        };
        let n = report.len().min(buf.len());
        buf[..n].copy_from_slice(&report[..n]);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Bluetooth
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BluetoothState {
    powered: bool,
    fail_power_on: bool,
    advertised: Option<String>,
    disconnects: u32,
    events: VecDeque<BluetoothEvent>,
    packets: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    report_map: Option<&'static [u8]>,
}

#[derive(Clone, Default)]
pub struct MockBluetooth(Rc<RefCell<BluetoothState>>);

impl MockBluetooth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, event: BluetoothEvent) {
        self.0.borrow_mut().events.push_back(event);
    }

    pub fn push_packet(&self, packet: &[u8]) {
        self.0.borrow_mut().packets.push_back(packet.to_vec());
    }

    /// Simulate an absent or broken radio.
    pub fn fail_power_on(&self, fail: bool) {
        self.0.borrow_mut().fail_power_on = fail;
    }

    /// Last name passed to `start_advertising`.
    pub fn advertised_name(&self) -> Option<String> {
        self.0.borrow().advertised.clone()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.borrow().sent.clone()
    }

    pub fn is_powered_off(&self) -> bool {
        !self.0.borrow().powered
    }

    pub fn disconnect_count(&self) -> u32 {
        self.0.borrow().disconnects
    }

    pub fn report_map(&self) -> Option<&'static [u8]> {
        self.0.borrow().report_map
    }
}

impl BluetoothBackend for MockBluetooth {
    fn power_on(&mut self) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        if s.fail_power_on {
            return Err(TransportError::Hardware);
        }
        s.powered = true;
        Ok(())
    }

    fn power_off(&mut self) {
        self.0.borrow_mut().powered = false;
    }

    fn start_advertising(&mut self, name: &str) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        if !s.powered {
            return Err(TransportError::NotReady);
        }
        s.advertised = Some(name.to_string());
        Ok(())
    }

    fn stop_advertising(&mut self) {}

    fn disconnect(&mut self) {
        self.0.borrow_mut().disconnects += 1;
    }

    fn poll_event(&mut self) -> Option<BluetoothEvent> {
        self.0.borrow_mut().events.pop_front()
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let Some(packet) = self.0.borrow_mut().packets.pop_front() else {
            return Ok(0);
        };
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    fn send_interrupt(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.0.borrow_mut().sent.push(data.to_vec());
        Ok(data.len())
    }

    fn set_report_map(&mut self, descriptor: &'static [u8]) {
        self.0.borrow_mut().report_map = Some(descriptor);
    }
}

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

const BANK: usize = 32;

#[derive(Default)]
struct GpioState {
    is_output: [bool; BANK],
    outputs: [bool; BANK],
    driven: [bool; BANK],
    inputs: [bool; BANK],
    released: [bool; BANK],
    pwm: [Option<PwmSettings>; BANK],
}

#[derive(Clone, Default)]
pub struct MockGpio(Rc<RefCell<GpioState>>);

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level last driven on `pin`.
    pub fn output(&self, pin: u8) -> bool {
        self.0.borrow().outputs[pin as usize]
    }

    pub fn was_driven(&self, pin: u8) -> bool {
        self.0.borrow().driven[pin as usize]
    }

    /// Level the outside world presents on `pin`.
    pub fn set_input(&self, pin: u8, high: bool) {
        self.0.borrow_mut().inputs[pin as usize] = high;
    }

    pub fn pwm(&self, pin: u8) -> Option<PwmSettings> {
        self.0.borrow().pwm[pin as usize]
    }

    pub fn is_released(&self, pin: u8) -> bool {
        self.0.borrow().released[pin as usize]
    }
}

impl GpioBackend for MockGpio {
    fn configure_input(&mut self, pin: u8, _pull: Pull) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        let i = pin as usize;
        if i >= BANK {
            return Err(TransportError::InvalidArgument);
        }
        s.is_output[i] = false;
        s.released[i] = false;
        Ok(())
    }

    fn configure_output(&mut self, pin: u8) -> Result<(), TransportError> {
        let mut s = self.0.borrow_mut();
        let i = pin as usize;
        if i >= BANK {
            return Err(TransportError::InvalidArgument);
        }
        s.is_output[i] = true;
        s.released[i] = false;
        Ok(())
    }

    fn set_output(&mut self, pin: u8, high: bool) {
        let mut s = self.0.borrow_mut();
        let i = pin as usize;
        s.outputs[i] = high;
        s.driven[i] = true;
    }

    fn read(&mut self, pin: u8) -> bool {
        let s = self.0.borrow();
        let i = pin as usize;
        if s.is_output[i] {
            s.outputs[i]
        } else {
            s.inputs[i]
        }
    }

    fn release(&mut self, pin: u8) {
        let mut s = self.0.borrow_mut();
        let i = pin as usize;
        s.is_output[i] = false;
        s.pwm[i] = None;
        s.released[i] = true;
    }

    fn sys_clock_hz(&self) -> u32 {
        125_000_000
    }

    fn apply_pwm(&mut self, pin: u8, settings: PwmSettings) -> Result<(), TransportError> {
        self.0.borrow_mut().pwm[pin as usize] = Some(settings);
        Ok(())
    }

    fn disable_pwm(&mut self, pin: u8) {
        self.0.borrow_mut().pwm[pin as usize] = None;
    }
}

// ---------------------------------------------------------------------------
// Ready-made transports
// ---------------------------------------------------------------------------

/// Initialized and mounted.
pub fn ready_usb() -> (UsbT, MockUsb) {
    let usb = MockUsb::new();
    let mut t = UsbTransport::new(usb.clone());
    t.initialize().unwrap();
    usb.push_event(UsbEvent::Mounted);
    t.process();
    (t, usb)
}

/// Initialized and connected to a host.
pub fn ready_bluetooth() -> (BluetoothT, MockBluetooth) {
    let bt = MockBluetooth::new();
    let mut t = BluetoothTransport::new(bt.clone());
    t.initialize().unwrap();
    bt.push_event(BluetoothEvent::Connected([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]));
    t.process();
    (t, bt)
}

/// Initialized with a single output pin.
pub fn ready_gpio() -> (GpioT, MockGpio) {
    let gpio = MockGpio::new();
    let mut t = GpioTransport::new(gpio.clone(), MockClock::new());
    t.initialize().unwrap();
    t.configure_pins(&[GpioPinConfig::output(0)]).unwrap();
    (t, gpio)
}

/// Ready transport of any type that records the size of every receive
/// buffer it is handed.
pub struct ReceiveSpy {
    pub ty: TransportType,
    pub buffer_sizes: Vec<usize>,
}

impl ReceiveSpy {
    pub fn new(ty: TransportType) -> Self {
        Self {
            ty,
            buffer_sizes: Vec::new(),
        }
    }
}

impl Transport for ReceiveSpy {
    fn initialize(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn deinitialize(&mut self) {}

    fn is_initialized(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.buffer_sizes.push(buf.len());
        Ok(0)
    }

    fn process(&mut self) {}

    fn transport_type(&self) -> TransportType {
        self.ty
    }
}

// ---------------------------------------------------------------------------
// Legacy driver and platform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LegacyCounts {
    init: u32,
    process: u32,
    aux: u32,
}

#[derive(Clone, Default)]
pub struct MockLegacy(Rc<RefCell<LegacyCounts>>);

impl MockLegacy {
    const MID: u16 = 0x0200;

    pub fn init_count(&self) -> u32 {
        self.0.borrow().init
    }

    pub fn process_count(&self) -> u32 {
        self.0.borrow().process
    }

    pub fn aux_count(&self) -> u32 {
        self.0.borrow().aux
    }

    pub fn mid_value(&self) -> u16 {
        Self::MID
    }
}

impl LegacyDriver for MockLegacy {
    fn initialize(&mut self) {
        self.0.borrow_mut().init += 1;
    }

    fn process(&mut self, _snapshot: &GamepadSnapshot) -> bool {
        self.0.borrow_mut().process += 1;
        true
    }

    fn process_aux(&mut self) {
        self.0.borrow_mut().aux += 1;
    }

    fn joystick_mid_value(&self) -> u16 {
        Self::MID
    }
}

/// Board with every transport present unless switched off.
pub struct MockPlatform {
    pub usb: MockUsb,
    pub bt: MockBluetooth,
    pub gpio: MockGpio,
    pub clock: MockClock,
    pub legacy: MockLegacy,
    pub usb_present: bool,
    pub bt_present: bool,
    pub gpio_present: bool,
    pub legacy_present: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            usb: MockUsb::new(),
            bt: MockBluetooth::new(),
            gpio: MockGpio::new(),
            clock: MockClock::new(),
            legacy: MockLegacy::default(),
            usb_present: true,
            bt_present: true,
            gpio_present: true,
            legacy_present: true,
        }
    }
}

impl Platform for MockPlatform {
    type Usb = MockUsb;
    type Bluetooth = MockBluetooth;
    type Gpio = MockGpio;
    type Clock = MockClock;
    type Legacy = MockLegacy;

    fn usb(&mut self) -> Option<MockUsb> {
        self.usb_present.then(|| self.usb.clone())
    }

    fn bluetooth(&mut self) -> Option<MockBluetooth> {
        self.bt_present.then(|| self.bt.clone())
    }

    fn gpio(&mut self) -> Option<MockGpio> {
        self.gpio_present.then(|| self.gpio.clone())
    }

    fn clock(&self) -> MockClock {
        self.clock.clone()
    }

    fn legacy_driver(&mut self, _mode: ProtocolType) -> Option<MockLegacy> {
        self.legacy_present.then(|| self.legacy.clone())
    }
}
