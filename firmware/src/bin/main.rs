#![no_std]
#![no_main]

use defmt::{error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::Flex;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_futures::yield_now;
use embassy_time::{Duration, Instant, Ticker};
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig};
use gamepad_firmware::config::{self, BOOT_CONFIG, TICK_MS};
use gamepad_firmware::usb_link::{self, LinkDeviceHandler, LinkRequestHandler};
use gamepad_firmware::{
    configure_usb_link, gpio_bank, legacy_hid, DriverManager, GamepadSnapshot, ProtocolType,
    RpPlatform, SNAPSHOT,
};

type Manager = DriverManager<RpPlatform>;
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// HID state and handlers.
static HID_STATE: StaticCell<State> = StaticCell::new();
static DEVICE_HANDLER: StaticCell<LinkDeviceHandler> = StaticCell::new();
static REQUEST_HANDLER: StaticCell<LinkRequestHandler> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Gamepad firmware starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- GPIO bank ---
    gpio_bank::install(16, Flex::new(p.PIN_16));
    gpio_bank::install(17, Flex::new(p.PIN_17));
    gpio_bank::install(18, Flex::new(p.PIN_18));
    gpio_bank::install(19, Flex::new(p.PIN_19));
    gpio_bank::install(20, Flex::new(p.PIN_20));
    gpio_bank::install(21, Flex::new(p.PIN_21));

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );
    builder.handler(DEVICE_HANDLER.init(LinkDeviceHandler));

    // The report layout is fixed at enumeration, so pick it from the boot mode.
    let descriptor = match BOOT_CONFIG.mode {
        ProtocolType::HidGeneric => legacy_hid::REPORT_DESCRIPTOR,
        _ => usb_link::RAW_REPORT_DESCRIPTOR,
    };
    let hid = configure_usb_link(
        &mut builder,
        HID_STATE.init(State::new()),
        REQUEST_HANDLER.init(LinkRequestHandler),
        descriptor,
    );
    let (reader, writer) = hid.split();
    let usb_device = builder.build();

    spawner.spawn(usb_link::usb_device_task(usb_device).unwrap());
    spawner.spawn(usb_link::usb_io_task(reader, writer).unwrap());

    // --- Driver manager ---
    let mut manager = DriverManager::new(RpPlatform, BOOT_CONFIG);
    match manager.setup_from_config() {
        Ok(()) => info!(
            "Driver manager up: {:?} over {:?}",
            BOOT_CONFIG.mode,
            manager.transport_type()
        ),
        Err(e) => error!("Driver manager setup failed: {:?}", e),
    }

    match manager.service_interval_us() {
        Some(interval) => {
            info!("Following bus edges, service interval {} us", interval);
            run_polled(&mut manager).await
        }
        None => run_ticked(&mut manager).await,
    }
}

fn refresh(snapshot: &mut GamepadSnapshot) {
    if let Some(latest) = SNAPSHOT.try_take() {
        *snapshot = latest;
    }
}

async fn run_ticked(manager: &mut Manager) -> ! {
    let mut snapshot = GamepadSnapshot::neutral();
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    loop {
        refresh(&mut snapshot);
        manager.tick(&snapshot);
        ticker.next().await;
    }
}

/// Bus-mastered drivers see the lines only when `process_aux` runs, so this
/// loop spins on it and hands the executor back between reads.
async fn run_polled(manager: &mut Manager) -> ! {
    let tick = Duration::from_millis(TICK_MS);
    let mut snapshot = GamepadSnapshot::neutral();
    let mut next_tick = Instant::now();
    let mut was_reading = false;
    loop {
        manager.process_aux();
        let reading = manager.is_mid_transfer();
        let read_done = was_reading && !reading;
        was_reading = reading;

        let now = Instant::now();
        if now >= next_tick {
            next_tick = now + tick;
            refresh(&mut snapshot);
            manager.process(&snapshot);
            manager.process_transport();
            if !reading {
                yield_now().await;
            }
        } else if read_done {
            yield_now().await;
        }
    }
}
