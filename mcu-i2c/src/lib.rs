//! # I2C transfer engine
//!
//! Master and slave I2C channels on top of two hardware engines:
//!
//! - The FIFO I2C controller ([lpi2c]), a dedicated controller with command and data FIFOs.
//! - The shift-timer I/O block ([flexio]), configured to emulate an I2C master with one
//!   transmit shifter, one receive shifter and two timers per channel.
//!
//! Applications address logical channels. The [driver::I2c] transfer core maps each logical
//! channel to the hardware unit configured for it, tracks the [ChannelStatus] of every unit and
//! dispatches synchronous, interrupt driven and DMA driven transfers to the engine backing the
//! unit. Hardware events re-enter through the completion routers in [irq].
#![no_std]

pub mod config;
pub mod diag;
pub mod dma;
pub mod driver;
pub mod engine;
pub mod flexio;
pub mod hal;
pub mod irq;
pub mod lpi2c;
pub mod request;
pub mod status;
pub mod time;

#[cfg(test)]
pub(crate) mod sim;

pub use config::{
    AsyncMethod, ChannelConfig, Config, ConfigError, DemConfig, EngineConfig, I2cSpeed, Role,
};
pub use driver::{Hooks, I2c};
pub use request::{Direction, Payload, SlaveAddress, TransferRequest};

/// Number of FIFO I2C controller modules.
pub const LPI2C_MODULE_COUNT: usize = 2;
/// Number of I2C master channels which can be emulated by the shift-timer block.
pub const FLEXIO_CHANNEL_COUNT: usize = 2;
pub const MAX_HW_UNITS: usize = LPI2C_MODULE_COUNT + FLEXIO_CHANNEL_COUNT;
pub const MAX_CHANNELS: usize = MAX_HW_UNITS;

pub const VENDOR_ID: u16 = 0x002B;
pub const MODULE_ID: u16 = 0x00FF;

/// Application-visible channel identifier.
pub type LogicalChannel = u8;

/// Status of one hardware unit, as seen through the logical channel mapped to it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    #[default]
    Idle,
    Sending,
    Receiving,
    Finished,
    ErrorPresent,
}

impl ChannelStatus {
    /// A busy channel rejects new transfer requests.
    #[inline]
    pub const fn is_busy(self) -> bool {
        matches!(self, ChannelStatus::Sending | ChannelStatus::Receiving)
    }
}

/// One physical engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwUnit {
    /// FIFO I2C controller module.
    Lpi2c(u8),
    /// Shift-timer block sub-channel.
    Flexio(u8),
}

impl HwUnit {
    /// Flat index over all hardware units. Controller modules come first.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            HwUnit::Lpi2c(module) => module as usize,
            HwUnit::Flexio(channel) => LPI2C_MODULE_COUNT + channel as usize,
        }
    }

    /// Index of the unit inside its engine.
    #[inline]
    pub const fn local_index(self) -> usize {
        match self {
            HwUnit::Lpi2c(module) => module as usize,
            HwUnit::Flexio(channel) => channel as usize,
        }
    }

    pub const fn is_valid(self) -> bool {
        match self {
            HwUnit::Lpi2c(module) => (module as usize) < LPI2C_MODULE_COUNT,
            HwUnit::Flexio(channel) => (channel as usize) < FLEXIO_CHANNEL_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub vendor_id: u16,
    pub module_id: u16,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Vendor, module and software version of this driver.
pub fn version_info() -> VersionInfo {
    VersionInfo {
        vendor_id: VENDOR_ID,
        module_id: MODULE_ID,
        major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    }
}

/// Errors detected on the bus or by the hardware while a transfer is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("pin low timeout")]
    PinLowTimeout,
    #[error("FIFO error")]
    FifoError,
    #[error("arbitration lost")]
    ArbitrationLost,
    #[error("unexpected NACK")]
    Nack,
    #[error("slave bit error")]
    SlaveBitError,
    #[error("slave FIFO overrun or underrun")]
    SlaveFifoError,
    #[error("shifter error")]
    ShifterError,
    #[error("timeout waiting for hardware")]
    Timeout,
}

impl embedded_hal::i2c::Error for BusError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self {
            BusError::ArbitrationLost => ErrorKind::ArbitrationLoss,
            BusError::Nack | BusError::ShifterError => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
            }
            BusError::FifoError | BusError::SlaveFifoError => ErrorKind::Overrun,
            BusError::PinLowTimeout | BusError::SlaveBitError => ErrorKind::Bus,
            BusError::Timeout => ErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("driver is not initialized")]
    Uninit,
    #[error("driver is already initialized")]
    AlreadyInitialized,
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("invalid logical channel {0}")]
    InvalidChannel(LogicalChannel),
    #[error("empty or missing buffer")]
    EmptyBuffer,
    #[error("buffer length {len} exceeds maximum {max}")]
    BufferTooLarge { len: usize, max: usize },
    #[error("channel busy")]
    Busy,
    #[error("request does not match the configured channel role")]
    RoleMismatch,
    #[error("operation not supported by the engine")]
    Unsupported,
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

impl Error {
    /// Development error code for admission errors. Bus errors are not reported to the
    /// development error sink.
    pub const fn det_code(&self) -> Option<diag::DetErrorCode> {
        use diag::DetErrorCode;
        Some(match self {
            Error::Uninit => DetErrorCode::Uninit,
            Error::AlreadyInitialized => DetErrorCode::AlreadyInitialized,
            Error::InvalidConfig(_) => DetErrorCode::InvalidConfig,
            Error::InvalidChannel(_) => DetErrorCode::InvalidChannel,
            Error::EmptyBuffer => DetErrorCode::NullBuffer,
            Error::BufferTooLarge { .. } => DetErrorCode::BufferTooLarge,
            Error::Busy => DetErrorCode::Busy,
            Error::RoleMismatch => DetErrorCode::RoleMismatch,
            Error::Unsupported => DetErrorCode::Unsupported,
            Error::Bus(_) => return None,
        })
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match self {
            Error::Bus(bus) => bus.kind(),
            _ => embedded_hal::i2c::ErrorKind::Other,
        }
    }
}
