//! Driver configuration.
//!
//! The configuration is supplied wholesale at [crate::I2c::init] and is not mutable afterwards.
use arbitrary_int::{u4, u12};

use crate::{
    FLEXIO_CHANNEL_COUNT, HwUnit, LPI2C_MODULE_COUNT, LogicalChannel, MAX_CHANNELS,
    diag::DemEventId, lpi2c::ClockConfig, request::SlaveAddress, time::Hertz,
};

/// Iteration ceiling of every bounded wait if the configuration does not specify one.
pub const DEFAULT_POLL_BUDGET: u32 = 10_000;

const FLEXIO_SHIFTER_COUNT: u8 = mcu_i2c_regs::flexio::SHIFTER_COUNT as u8;
const FLEXIO_TIMER_COUNT: u8 = mcu_i2c_regs::flexio::TIMER_COUNT as u8;
const FLEXIO_PIN_COUNT: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cSpeed {
    Standard100kHz,
    Fast400kHz,
    FastPlus1MHz,
    HighSpeed3_4MHz,
}

impl I2cSpeed {
    pub const fn frequency(&self) -> Hertz {
        Hertz::from_raw(match self {
            I2cSpeed::Standard100kHz => 100_000,
            I2cSpeed::Fast400kHz => 400_000,
            I2cSpeed::FastPlus1MHz => 1_000_000,
            I2cSpeed::HighSpeed3_4MHz => 3_400_000,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("I2C speed not attainable")]
pub struct I2cSpeedNotAttainable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
    MasterSlave,
}

impl Role {
    #[inline]
    pub const fn is_master(self) -> bool {
        matches!(self, Role::Master | Role::MasterSlave)
    }

    #[inline]
    pub const fn is_slave(self) -> bool {
        matches!(self, Role::Slave | Role::MasterSlave)
    }
}

/// Completion method of asynchronous transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncMethod {
    Interrupt,
    Dma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaChannels {
    pub tx: u8,
    pub rx: u8,
}

impl DmaChannels {
    #[inline]
    pub const fn contains(&self, channel: u8) -> bool {
        self.tx == channel || self.rx == channel
    }
}

/// Resources of a FIFO I2C controller unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lpi2cUnitConfig {
    pub module: u8,
    pub clock: ClockConfig,
    /// Clock configuration used for high-speed requests. The normal clock configuration is
    /// used if not set.
    pub high_speed_clock: Option<ClockConfig>,
    /// Own address for the slave role.
    pub slave_address: Option<SlaveAddress>,
    /// Pin low timeout in units of 256 prescaled clock cycles. 0 disables the timeout.
    pub pin_low_timeout: u12,
    /// Bus idle timeout in prescaled clock cycles. 0 disables the timeout.
    pub bus_idle_timeout: u12,
    /// Glitch filter width for SCL and SDA in functional clock cycles.
    pub glitch_filter: u4,
    pub dma: Option<DmaChannels>,
}

impl Lpi2cUnitConfig {
    pub const fn new(module: u8, clock: ClockConfig) -> Self {
        Self {
            module,
            clock,
            high_speed_clock: None,
            slave_address: None,
            pin_low_timeout: u12::new(0),
            bus_idle_timeout: u12::new(0),
            glitch_filter: u4::new(0),
            dma: None,
        }
    }

    pub const fn with_high_speed_clock(mut self, clock: ClockConfig) -> Self {
        self.high_speed_clock = Some(clock);
        self
    }

    pub const fn with_slave_address(mut self, address: SlaveAddress) -> Self {
        self.slave_address = Some(address);
        self
    }

    pub const fn with_timeouts(mut self, pin_low: u12, bus_idle: u12) -> Self {
        self.pin_low_timeout = pin_low;
        self.bus_idle_timeout = bus_idle;
        self
    }

    pub const fn with_glitch_filter(mut self, filter: u4) -> Self {
        self.glitch_filter = filter;
        self
    }

    pub const fn with_dma(mut self, dma: DmaChannels) -> Self {
        self.dma = Some(dma);
        self
    }
}

/// Resources of one emulated I2C master on the shift-timer block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexioUnitConfig {
    pub sub_channel: u8,
    pub sda_pin: u8,
    pub scl_pin: u8,
    pub tx_shifter: u8,
    pub rx_shifter: u8,
    /// Generates SCL and counts the edges of the whole transfer.
    pub scl_timer: u8,
    /// Clocks the shifters.
    pub control_timer: u8,
    /// See [crate::flexio::calculate_baud_divider].
    pub baud_divider: u8,
    pub dma: Option<DmaChannels>,
}

impl FlexioUnitConfig {
    #[inline]
    pub const fn shifter_mask(&self) -> u32 {
        (1 << self.tx_shifter) | (1 << self.rx_shifter)
    }

    #[inline]
    pub const fn timer_mask(&self) -> u32 {
        (1 << self.scl_timer) | (1 << self.control_timer)
    }
}

/// Tagged engine selection and resources of one hardware unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineConfig {
    Lpi2c(Lpi2cUnitConfig),
    Flexio(FlexioUnitConfig),
}

impl EngineConfig {
    #[inline]
    pub const fn hw_unit(&self) -> HwUnit {
        match self {
            EngineConfig::Lpi2c(cfg) => HwUnit::Lpi2c(cfg.module),
            EngineConfig::Flexio(cfg) => HwUnit::Flexio(cfg.sub_channel),
        }
    }

    #[inline]
    pub const fn dma(&self) -> Option<DmaChannels> {
        match self {
            EngineConfig::Lpi2c(cfg) => cfg.dma,
            EngineConfig::Flexio(cfg) => cfg.dma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: LogicalChannel,
    pub role: Role,
    pub async_method: AsyncMethod,
    /// Forward bus errors to [crate::diag::Notifier::error].
    pub notify_errors: bool,
    pub engine: EngineConfig,
}

impl ChannelConfig {
    /// Master channel with interrupt driven asynchronous transfers and error notifications.
    pub const fn new(channel: LogicalChannel, engine: EngineConfig) -> Self {
        Self {
            channel,
            role: Role::Master,
            async_method: AsyncMethod::Interrupt,
            notify_errors: true,
            engine,
        }
    }

    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub const fn with_async_method(mut self, method: AsyncMethod) -> Self {
        self.async_method = method;
        self
    }

    pub const fn with_error_notification(mut self, enabled: bool) -> Self {
        self.notify_errors = enabled;
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DemConfig {
    /// Event reported on exhausted poll budgets. Timeouts are not reported if unset.
    pub timeout: Option<DemEventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config<'a> {
    pub channels: &'a [ChannelConfig],
    pub poll_budget: u32,
    pub dem: DemConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{count} channels configured, at most {max} are supported")]
    TooManyChannels { count: usize, max: usize },
    #[error("logical channel {0} configured twice")]
    DuplicateChannel(LogicalChannel),
    #[error("logical channel {0} out of range")]
    ChannelOutOfRange(LogicalChannel),
    #[error("hardware unit {0:?} used by more than one channel")]
    DuplicateUnit(HwUnit),
    #[error("resource index out of range for channel {0}")]
    ResourceOutOfRange(LogicalChannel),
    #[error("shifter or timer of channel {0} used twice")]
    OverlappingResources(LogicalChannel),
    #[error("channel {0} uses DMA without DMA channels")]
    DmaWithoutChannels(LogicalChannel),
    #[error("channel {0}: the slave role is not supported by the shift-timer engine")]
    SlaveOnSoftEngine(LogicalChannel),
    #[error("channel {0}: slave role without slave address")]
    MissingSlaveAddress(LogicalChannel),
    #[error("poll budget must not be zero")]
    ZeroPollBudget,
}

impl<'a> Config<'a> {
    pub const fn new(channels: &'a [ChannelConfig]) -> Self {
        Self {
            channels,
            poll_budget: DEFAULT_POLL_BUDGET,
            dem: DemConfig { timeout: None },
        }
    }

    pub const fn with_poll_budget(mut self, poll_budget: u32) -> Self {
        self.poll_budget = poll_budget;
        self
    }

    pub const fn with_timeout_event(mut self, event: DemEventId) -> Self {
        self.dem.timeout = Some(event);
        self
    }

    pub fn channel(&self, channel: LogicalChannel) -> Option<&ChannelConfig> {
        self.channels.iter().find(|cfg| cfg.channel == channel)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_budget == 0 {
            return Err(ConfigError::ZeroPollBudget);
        }
        if self.channels.len() > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels {
                count: self.channels.len(),
                max: MAX_CHANNELS,
            });
        }
        let mut used_shifters = 0u32;
        let mut used_timers = 0u32;
        for (idx, cfg) in self.channels.iter().enumerate() {
            let channel = cfg.channel;
            if channel as usize >= MAX_CHANNELS {
                return Err(ConfigError::ChannelOutOfRange(channel));
            }
            let previous = &self.channels[..idx];
            if previous.iter().any(|other| other.channel == channel) {
                return Err(ConfigError::DuplicateChannel(channel));
            }
            let unit = cfg.engine.hw_unit();
            if !unit.is_valid() {
                return Err(ConfigError::ResourceOutOfRange(channel));
            }
            if previous.iter().any(|other| other.engine.hw_unit() == unit) {
                return Err(ConfigError::DuplicateUnit(unit));
            }
            if cfg.async_method == AsyncMethod::Dma && cfg.engine.dma().is_none() {
                return Err(ConfigError::DmaWithoutChannels(channel));
            }
            match &cfg.engine {
                EngineConfig::Lpi2c(lpi2c) => {
                    if lpi2c.module as usize >= LPI2C_MODULE_COUNT {
                        return Err(ConfigError::ResourceOutOfRange(channel));
                    }
                    if cfg.role.is_slave() && lpi2c.slave_address.is_none() {
                        return Err(ConfigError::MissingSlaveAddress(channel));
                    }
                }
                EngineConfig::Flexio(flexio) => {
                    if cfg.role.is_slave() {
                        return Err(ConfigError::SlaveOnSoftEngine(channel));
                    }
                    if flexio.sub_channel as usize >= FLEXIO_CHANNEL_COUNT
                        || flexio.tx_shifter >= FLEXIO_SHIFTER_COUNT
                        || flexio.rx_shifter >= FLEXIO_SHIFTER_COUNT
                        || flexio.scl_timer >= FLEXIO_TIMER_COUNT
                        || flexio.control_timer >= FLEXIO_TIMER_COUNT
                        || flexio.sda_pin >= FLEXIO_PIN_COUNT
                        || flexio.scl_pin >= FLEXIO_PIN_COUNT
                    {
                        return Err(ConfigError::ResourceOutOfRange(channel));
                    }
                    if flexio.tx_shifter == flexio.rx_shifter
                        || flexio.scl_timer == flexio.control_timer
                        || used_shifters & flexio.shifter_mask() != 0
                        || used_timers & flexio.timer_mask() != 0
                    {
                        return Err(ConfigError::OverlappingResources(channel));
                    }
                    used_shifters |= flexio.shifter_mask();
                    used_timers |= flexio.timer_mask();
                }
            }
        }
        Ok(())
    }
}
