//! Error types for transports, protocol drivers, configuration and the manager.

use crate::types::TransportType;

/// Error type for transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The channel has not been initialized.
    NotInitialized,
    /// Initialized, but no peer is attached (USB not configured, BT not connected).
    NotReady,
    /// Empty payload, zero-length buffer or an unconfigured pin.
    InvalidArgument,
    /// The hardware backend reported a failure.
    Hardware,
    /// Outgoing queue full; retry on a later tick.
    Busy,
}

/// Error type for protocol driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// The driver is not bound to a transport, or was handed a different one.
    NoTransport,
    /// The protocol cannot run over the given transport type.
    UnsupportedTransport(TransportType),
    /// The underlying transport failed.
    Transport(TransportError),
}

impl From<TransportError> for DriverError {
    fn from(err: TransportError) -> Self {
        DriverError::Transport(err)
    }
}

/// Error type for invalid tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// SNES multitap addresses controllers 0..=3.
    ControllerIdOutOfRange(u8),
    /// Clock period and latch duration must be non-zero.
    ZeroTiming,
    /// GPIO pins are limited to 0..32.
    PinOutOfRange(u8),
    /// The same pin appears twice in one configuration.
    DuplicatePin(u8),
}

/// Error type for driver manager operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ManagerError {
    /// The requested mode has no protocol driver yet.
    NotMigrated,
    /// No legacy driver exists for the requested mode.
    NoLegacyDriver,
    /// The protocol driver could not be constructed (invalid configuration).
    DriverUnavailable,
    /// The platform could not hand out a backend for this transport.
    TransportUnavailable(TransportType),
    /// The transport was constructed but failed to initialize.
    TransportInit(TransportType),
    /// The protocol driver refused to bind to the transport.
    DriverInit(DriverError),
    /// The active protocol does not support the requested transport.
    UnsupportedTransport(TransportType),
    /// No protocol/transport pair is active.
    NotActive,
}
