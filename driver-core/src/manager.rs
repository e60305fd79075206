//! Driver manager: owns the single active protocol/transport pair.
//!
//! # Lifecycle
//!
//! ```text
//!            setup(migrated mode)             switch_transport / switch_protocol
//!   Idle ─────────────────────────────► Native{transport, driver} ◄──────┐
//!    │  ▲                                   │                            │
//!    │  └────────── deinitialize ◄──────────┘ ───────────────────────────┘
//!    │
//!    └── setup(other mode) ──► Legacy(driver)
//! ```
//!
//! At most one pair exists at any time, and if one exists both halves are
//! initialized and bound to each other. A failed switch leaves the previous
//! pair in place.

use core::mem;

use crate::backend::Platform;
use crate::config::DriverConfig;
use crate::error::ManagerError;
use crate::legacy::LegacyDriver;
use crate::protocol::{Driver, ProtocolDriver, Ps4Driver, SnesDriver, XInputDriver};
use crate::transport::{AnyTransport, BluetoothTransport, GpioTransport, Transport, UsbTransport};
use crate::types::{GamepadSnapshot, ProtocolType, TransportType, JOYSTICK_MID};

/// Transport type owned by a manager on platform `P`.
pub type PlatformTransport<P> = AnyTransport<
    <P as Platform>::Usb,
    <P as Platform>::Bluetooth,
    <P as Platform>::Gpio,
    <P as Platform>::Clock,
>;

/// Protocol driver type owned by a manager on platform `P`.
pub type PlatformDriver<P> = Driver<<P as Platform>::Clock>;

/// What the manager is currently running.
pub enum Active<P: Platform> {
    Idle,
    Legacy(P::Legacy),
    Native {
        transport: PlatformTransport<P>,
        driver: PlatformDriver<P>,
    },
}

/// Owns and switches the active driver.
pub struct DriverManager<P: Platform> {
    platform: P,
    config: DriverConfig,
    mode: Option<ProtocolType>,
    active: Active<P>,
}

fn create_transport<P: Platform>(
    platform: &mut P,
    ty: TransportType,
) -> Result<PlatformTransport<P>, ManagerError> {
    let transport = match ty {
        TransportType::Usb => platform.usb().map(|b| AnyTransport::Usb(UsbTransport::new(b))),
        TransportType::Bluetooth => platform
            .bluetooth()
            .map(|b| AnyTransport::Bluetooth(BluetoothTransport::new(b))),
        TransportType::Gpio => {
            let clock = platform.clock();
            platform
                .gpio()
                .map(|b| AnyTransport::Gpio(GpioTransport::new(b, clock)))
        }
    };
    transport.ok_or(ManagerError::TransportUnavailable(ty))
}

/// Construct and initialize a transport.
fn open_transport<P: Platform>(
    platform: &mut P,
    ty: TransportType,
) -> Result<PlatformTransport<P>, ManagerError> {
    let mut transport = create_transport(platform, ty)?;
    transport.initialize().map_err(|e| {
        warn!("manager: {} transport failed to initialize: {:?}", ty.name(), e);
        ManagerError::TransportInit(ty)
    })?;
    Ok(transport)
}

fn create_driver<P: Platform>(
    platform: &P,
    config: &DriverConfig,
    mode: ProtocolType,
) -> Result<PlatformDriver<P>, ManagerError> {
    match mode {
        ProtocolType::XInput => Ok(Driver::XInput(XInputDriver::new(config.xinput_auth))),
        ProtocolType::Ps4 => Ok(Driver::Ps4(Ps4Driver::new())),
        ProtocolType::Snes => SnesDriver::new(config.snes, platform.clock())
            .map(Driver::Snes)
            .map_err(|e| {
                warn!("manager: invalid SNES configuration: {:?}", e);
                ManagerError::DriverUnavailable
            }),
        _ => Err(ManagerError::NotMigrated),
    }
}

impl<P: Platform> DriverManager<P> {
    pub fn new(platform: P, config: DriverConfig) -> Self {
        Self {
            platform,
            config,
            mode: None,
            active: Active::Idle,
        }
    }

    /// Bring up the mode and transport named in the boot configuration.
    pub fn setup_from_config(&mut self) -> Result<(), ManagerError> {
        self.setup(self.config.mode, self.config.preferred_transport)
    }

    /// Tear down whatever is running and start `mode`.
    ///
    /// Modes without a protocol driver go through the platform's legacy
    /// driver. On failure the manager is left idle.
    pub fn setup(&mut self, mode: ProtocolType, preferred: TransportType) -> Result<(), ManagerError> {
        self.deinitialize();

        if !mode.is_migrated() {
            let mut legacy = self
                .platform
                .legacy_driver(mode)
                .ok_or(ManagerError::NoLegacyDriver)?;
            legacy.initialize();
            info!("manager: {:?} running on legacy driver", mode);
            self.active = Active::Legacy(legacy);
            self.mode = Some(mode);
            return Ok(());
        }

        let mut driver = create_driver(&self.platform, &self.config, mode)?;
        let ty = self.select_best_transport(mode, preferred);
        let mut transport = open_transport(&mut self.platform, ty)?;
        driver.initialize(&mut transport).map_err(|e| {
            warn!("manager: {} refused {}: {:?}", driver.protocol_name(), ty.name(), e);
            ManagerError::DriverInit(e)
        })?;

        info!("manager: {} over {}", driver.protocol_name(), ty.name());
        self.active = Active::Native { transport, driver };
        self.mode = Some(mode);
        Ok(())
    }

    /// Pick the transport for `mode`.
    ///
    /// In order: `preferred` if the protocol supports it; the first of the
    /// protocol's preferred transports that can be brought up (each candidate
    /// is initialized and immediately torn down again); the protocol's first
    /// preference; USB.
    pub fn select_best_transport(&mut self, mode: ProtocolType, preferred: TransportType) -> TransportType {
        let Ok(driver) = create_driver(&self.platform, &self.config, mode) else {
            return preferred;
        };
        if driver.supports_transport(preferred) {
            return preferred;
        }

        let candidates = driver.preferred_transports();
        for &ty in candidates {
            if let Ok(mut transport) = open_transport(&mut self.platform, ty) {
                transport.deinitialize();
                debug!("manager: trial init found {} for {:?}", ty.name(), mode);
                return ty;
            }
        }

        candidates.first().copied().unwrap_or(TransportType::Usb)
    }

    /// Move the active protocol onto a different transport.
    ///
    /// The new transport is brought up before the driver leaves the old one;
    /// if the driver cannot bind to it, the driver is rebound to the old
    /// transport with its protocol state intact.
    pub fn switch_transport(&mut self, new_type: TransportType) -> Result<(), ManagerError> {
        let Active::Native { transport, driver } = &mut self.active else {
            return Err(ManagerError::NotActive);
        };
        if !driver.supports_transport(new_type) {
            warn!("manager: {} cannot use {}", driver.protocol_name(), new_type.name());
            return Err(ManagerError::UnsupportedTransport(new_type));
        }
        if transport.transport_type() == new_type {
            return Ok(());
        }

        let mut replacement = open_transport(&mut self.platform, new_type)?;
        let old_type = transport.transport_type();

        driver.deinitialize(transport);
        match driver.initialize(&mut replacement) {
            Ok(()) => {
                let mut old = mem::replace(transport, replacement);
                old.deinitialize();
                info!("manager: switched {} -> {}", old_type.name(), new_type.name());
                Ok(())
            }
            Err(e) => {
                warn!("manager: bind to {} failed, rolling back", new_type.name());
                drop(replacement);
                if let Err(e) = driver.rebind(transport) {
                    error!("manager: rollback failed: {:?}", e);
                    self.deinitialize();
                }
                Err(ManagerError::DriverInit(e))
            }
        }
    }

    /// Replace the active protocol driver.
    ///
    /// If the new protocol can use the current transport, the old driver is
    /// unbound first (it may hold pins the new one configures) and the new one
    /// bound in its place. If that fails the old driver is rebound with its
    /// protocol state intact. Otherwise a complete new pair is brought up
    /// first and the old pair is retired only once the new one is running.
    pub fn switch_protocol(&mut self, new_mode: ProtocolType) -> Result<(), ManagerError> {
        let current_type = match &self.active {
            Active::Native { transport, .. } => transport.transport_type(),
            _ => return Err(ManagerError::NotActive),
        };
        if !new_mode.is_migrated() {
            return Err(ManagerError::NotMigrated);
        }

        let mut new_driver = create_driver(&self.platform, &self.config, new_mode)?;

        if new_driver.supports_transport(current_type) {
            let Active::Native { transport, driver } = &mut self.active else {
                return Err(ManagerError::NotActive);
            };
            driver.deinitialize(transport);
            if let Err(e) = new_driver.initialize(transport) {
                warn!("manager: {} failed to bind, rolling back", new_driver.protocol_name());
                if let Err(e) = driver.rebind(transport) {
                    error!("manager: rollback failed: {:?}", e);
                    self.deinitialize();
                }
                return Err(ManagerError::DriverInit(e));
            }
            info!("manager: protocol {} -> {}", driver.protocol_name(), new_driver.protocol_name());
            *driver = new_driver;
            self.mode = Some(new_mode);
            return Ok(());
        }

        let new_type = self.select_best_transport(new_mode, current_type);
        let mut new_transport = open_transport(&mut self.platform, new_type)?;
        new_driver
            .initialize(&mut new_transport)
            .map_err(ManagerError::DriverInit)?;

        let old = mem::replace(
            &mut self.active,
            Active::Native {
                transport: new_transport,
                driver: new_driver,
            },
        );
        if let Active::Native {
            mut transport,
            mut driver,
        } = old
        {
            driver.deinitialize(&mut transport);
            transport.deinitialize();
        }
        info!("manager: {:?} over {}", new_mode, new_type.name());
        self.mode = Some(new_mode);
        Ok(())
    }

    /// Forward one snapshot to the active driver. Returns whether a report
    /// was sent.
    pub fn process(&mut self, snapshot: &GamepadSnapshot) -> bool {
        match &mut self.active {
            Active::Idle => false,
            Active::Legacy(legacy) => legacy.process(snapshot),
            Active::Native { transport, driver } => match driver.process(transport, snapshot) {
                Ok(sent) => sent,
                Err(e) => {
                    trace!("manager: process failed: {:?}", e);
                    false
                }
            },
        }
    }

    pub fn process_aux(&mut self) {
        match &mut self.active {
            Active::Idle => {}
            Active::Legacy(legacy) => legacy.process_aux(),
            Active::Native { transport, driver } => driver.process_aux(transport),
        }
    }

    pub fn process_transport(&mut self) {
        if let Active::Native { transport, .. } = &mut self.active {
            transport.process();
        }
    }

    /// One scheduler tick: `process`, `process_aux`, `process_transport`.
    pub fn tick(&mut self, snapshot: &GamepadSnapshot) -> bool {
        let sent = self.process(snapshot);
        self.process_aux();
        self.process_transport();
        sent
    }

    /// Unbind the driver, release the transport and return to idle.
    pub fn deinitialize(&mut self) {
        match mem::replace(&mut self.active, Active::Idle) {
            Active::Idle => {}
            Active::Legacy(_) => debug!("manager: legacy driver released"),
            Active::Native {
                mut transport,
                mut driver,
            } => {
                driver.deinitialize(&mut transport);
                transport.deinitialize();
                debug!("manager: pair released");
            }
        }
        self.mode = None;
    }

    /// Type of the active transport; `None` when idle or running a legacy
    /// driver.
    pub fn transport_type(&self) -> Option<TransportType> {
        match &self.active {
            Active::Native { transport, .. } => Some(transport.transport_type()),
            _ => None,
        }
    }

    pub fn protocol_type(&self) -> Option<ProtocolType> {
        match &self.active {
            Active::Native { driver, .. } => Some(driver.protocol_type()),
            _ => None,
        }
    }

    pub fn input_mode(&self) -> Option<ProtocolType> {
        self.mode
    }

    pub fn is_config_mode(&self) -> bool {
        self.mode.is_some_and(ProtocolType::is_config)
    }

    pub fn is_using_new_architecture(&self) -> bool {
        matches!(self.active, Active::Native { .. })
    }

    pub fn joystick_mid_value(&self) -> u16 {
        match &self.active {
            Active::Idle => JOYSTICK_MID,
            Active::Legacy(legacy) => legacy.joystick_mid_value(),
            Active::Native { driver, .. } => driver.joystick_mid_value(),
        }
    }

    /// Sampling interval the active driver needs from `process_aux`, for
    /// protocols whose peer clocks the bus.
    pub fn service_interval_us(&self) -> Option<u32> {
        self.driver().and_then(ProtocolDriver::service_interval_us)
    }

    /// The active driver is in the middle of a peer-clocked transfer.
    pub fn is_mid_transfer(&self) -> bool {
        self.driver().is_some_and(ProtocolDriver::is_mid_transfer)
    }

    pub fn active(&self) -> &Active<P> {
        &self.active
    }

    pub fn driver(&self) -> Option<&PlatformDriver<P>> {
        match &self.active {
            Active::Native { driver, .. } => Some(driver),
            _ => None,
        }
    }

    pub fn driver_mut(&mut self) -> Option<&mut PlatformDriver<P>> {
        match &mut self.active {
            Active::Native { driver, .. } => Some(driver),
            _ => None,
        }
    }

    pub fn transport(&self) -> Option<&PlatformTransport<P>> {
        match &self.active {
            Active::Native { transport, .. } => Some(transport),
            _ => None,
        }
    }

    pub fn transport_mut(&mut self) -> Option<&mut PlatformTransport<P>> {
        match &mut self.active {
            Active::Native { transport, .. } => Some(transport),
            _ => None,
        }
    }

    pub fn legacy_driver_mut(&mut self) -> Option<&mut P::Legacy> {
        match &mut self.active {
            Active::Legacy(legacy) => Some(legacy),
            _ => None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }
}

impl<P: Platform> Drop for DriverManager<P> {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
