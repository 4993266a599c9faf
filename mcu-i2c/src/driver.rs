//! Transfer core.
//!
//! [I2c] maps logical channels to hardware units, guards the [ChannelStatus] of every unit and
//! dispatches requests to the engine backing the unit. Engines report progress through events
//! which are drained before every entry point and completion router returns. Draining applies
//! the status transitions and invokes the [Notifier] and the diagnostic sinks.
use raw_slice::RawBufSliceMut;

use crate::{
    BusError, ChannelStatus, Error, HwUnit, LPI2C_MODULE_COUNT, LogicalChannel, MAX_CHANNELS,
    MAX_HW_UNITS, MODULE_ID,
    config::{AsyncMethod, ChannelConfig, Config, DEFAULT_POLL_BUDGET},
    diag::{
        DemEventId, DemEventStatus, DemSink, DevErrorSink, NoDemSink, NoDevErrorSink, NoNotifier,
        Notifier, ServiceId,
    },
    dma::DmaService,
    engine::{Env, Event, EventKind, EventQueue, TransferEngine, TransferMode},
    flexio::{FlexioEngine, FlexioRegisters},
    lpi2c::{Lpi2cEngine, Lpi2cRegisters},
    request::{Direction, Transfer, TransferRequest},
    status::StatusCell,
};

/// Instance id reported to the development error sink.
pub const INSTANCE_ID: u8 = 0;

/// Collaborators notified by the driver.
#[derive(Clone, Copy)]
pub struct Hooks<'a> {
    pub notifier: &'a dyn Notifier,
    pub det: &'a dyn DevErrorSink,
    pub dem: &'a dyn DemSink,
}

impl Hooks<'static> {
    pub const fn none() -> Self {
        Self {
            notifier: &NoNotifier,
            det: &NoDevErrorSink,
            dem: &NoDemSink,
        }
    }
}

impl Default for Hooks<'static> {
    fn default() -> Self {
        Self::none()
    }
}

impl core::fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

/// I2C driver.
///
/// The application shares one driver value between thread mode and the interrupt handlers, for
/// example inside a `critical_section::Mutex<RefCell<..>>`. The interrupt handlers call the
/// completion routers [Self::on_lpi2c_interrupt], [Self::on_flexio_interrupt] and
/// [Self::on_dma_complete].
pub struct I2c<'a, L, F, D> {
    lpi2c: Lpi2cEngine<L>,
    flexio: FlexioEngine<F>,
    dma: D,
    hooks: Hooks<'a>,
    config: Option<&'a Config<'a>>,
    channel_map: [Option<HwUnit>; MAX_CHANNELS],
    unit_config: [Option<&'a ChannelConfig>; MAX_HW_UNITS],
    status: [StatusCell; MAX_HW_UNITS],
    last_error: [Option<BusError>; MAX_HW_UNITS],
    events: EventQueue,
}

impl<'a, L: Lpi2cRegisters, F: FlexioRegisters, D: DmaService> I2c<'a, L, F, D> {
    pub fn new(lpi2c: [L; LPI2C_MODULE_COUNT], flexio: F, dma: D, hooks: Hooks<'a>) -> Self {
        Self {
            lpi2c: Lpi2cEngine::new(lpi2c),
            flexio: FlexioEngine::new(flexio),
            dma,
            hooks,
            config: None,
            channel_map: [None; MAX_CHANNELS],
            unit_config: [None; MAX_HW_UNITS],
            status: [const { StatusCell::new() }; MAX_HW_UNITS],
            last_error: [None; MAX_HW_UNITS],
            events: EventQueue::new(),
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    #[inline]
    pub fn config(&self) -> Option<&'a Config<'a>> {
        self.config
    }

    /// Last bus error of a logical channel, cleared when the next request is admitted.
    pub fn last_error(&self, channel: LogicalChannel) -> Option<BusError> {
        let unit = self.channel_map.get(channel as usize).copied().flatten()?;
        self.last_error.get(unit.index()).copied().flatten()
    }

    /// Largest transfer the engine behind a logical channel accepts.
    pub fn max_transfer_len(&self, channel: LogicalChannel) -> Result<usize, Error> {
        let (unit, _) = self.resolve(channel)?;
        Ok(self.engine(unit).max_transfer_len())
    }

    #[inline]
    pub fn dma(&mut self) -> &mut D {
        &mut self.dma
    }

    /// Configure all channels. Every channel is [ChannelStatus::Idle] afterwards.
    pub fn init(&mut self, config: &'a Config<'a>) -> Result<(), Error> {
        if self.config.is_some() {
            return Err(self.reject(ServiceId::Init, INSTANCE_ID, Error::AlreadyInitialized));
        }
        if let Err(error) = config.validate() {
            return Err(self.reject(ServiceId::Init, INSTANCE_ID, error.into()));
        }
        self.events.clear();
        for cfg in config.channels {
            let unit = cfg.engine.hw_unit();
            self.channel_map[cfg.channel as usize] = Some(unit);
            self.unit_config[unit.index()] = Some(cfg);
            self.status[unit.index()].set(ChannelStatus::Idle);
            self.last_error[unit.index()] = None;
            self.dispatch(unit, |engine, index, _| engine.init_unit(index, cfg));
        }
        self.config = Some(config);
        log::info!(
            "I2C driver initialized with {} channels",
            config.channels.len()
        );
        Ok(())
    }

    /// Stop all hardware units and drop the configuration.
    pub fn deinit(&mut self) -> Result<(), Error> {
        let Some(config) = self.config else {
            return Err(self.reject(ServiceId::DeInit, INSTANCE_ID, Error::Uninit));
        };
        for cfg in config.channels {
            let unit = cfg.engine.hw_unit();
            self.dispatch(unit, |engine, index, _| engine.deinit_unit(index));
        }
        self.channel_map = [None; MAX_CHANNELS];
        self.unit_config = [None; MAX_HW_UNITS];
        self.last_error = [None; MAX_HW_UNITS];
        for status in self.status.iter() {
            status.set(ChannelStatus::Idle);
        }
        self.events.clear();
        self.config = None;
        log::info!("I2C driver de-initialized");
        Ok(())
    }

    /// Run a master transfer to completion.
    ///
    /// Bus errors and exhausted poll budgets leave the channel in
    /// [ChannelStatus::ErrorPresent] and are returned as [Error::Bus].
    pub fn sync_transmit(
        &mut self,
        channel: LogicalChannel,
        request: &mut TransferRequest<'_>,
    ) -> Result<(), Error> {
        let (unit, _, transfer) = self.admit(ServiceId::SyncTransmit, channel, request)?;
        self.dispatch(unit, |engine, index, env| {
            engine.start(index, transfer, TransferMode::Sync, env)
        });
        self.drain_events();
        let status = &self.status[unit.index()];
        match status.get() {
            ChannelStatus::Finished => {
                if let Some(event) = self.timeout_event() {
                    self.hooks.dem.report(event, DemEventStatus::Passed);
                }
                Ok(())
            }
            current => {
                if current.is_busy() {
                    status.set(ChannelStatus::ErrorPresent);
                }
                Err(Error::Bus(
                    self.last_error[unit.index()].unwrap_or(BusError::Timeout),
                ))
            }
        }
    }

    /// Start a master transfer completed by interrupts or DMA, depending on the configured
    /// [AsyncMethod] of the channel. Completion is reported through the [Notifier] and
    /// [Self::get_status].
    ///
    /// # Safety
    ///
    /// The payload buffer of the request must stay valid and must not be accessed until the
    /// transfer completed or failed. For DMA transfers on the shift-timer engine, the driver
    /// must not be moved until then.
    pub unsafe fn async_transmit(
        &mut self,
        channel: LogicalChannel,
        request: &mut TransferRequest<'_>,
    ) -> Result<(), Error> {
        let (unit, cfg, transfer) = self.admit(ServiceId::AsyncTransmit, channel, request)?;
        let mode = match cfg.async_method {
            AsyncMethod::Interrupt => TransferMode::Interrupt,
            AsyncMethod::Dma => TransferMode::Dma,
        };
        self.dispatch(unit, |engine, index, env| {
            engine.start(index, transfer, mode, env)
        });
        self.drain_events();
        Ok(())
    }

    /// Status of a channel. Latched hardware errors of an idle unit are collected first.
    /// Reading [ChannelStatus::Finished] returns the channel to [ChannelStatus::Idle].
    pub fn get_status(&mut self, channel: LogicalChannel) -> Result<ChannelStatus, Error> {
        let (unit, _) = self
            .resolve(channel)
            .map_err(|error| self.reject(ServiceId::GetStatus, channel, error))?;
        self.dispatch(unit, |engine, index, env| engine.poll_errors(index, env));
        self.drain_events();
        Ok(self.status[unit.index()].acknowledge())
    }

    /// Register the buffer used by the next slave transaction of a channel.
    ///
    /// # Safety
    ///
    /// The buffer must stay valid and must not be accessed until the slave transaction
    /// completed, or until another buffer was prepared.
    pub unsafe fn prepare_slave_buffer(
        &mut self,
        channel: LogicalChannel,
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        let result = self.try_prepare_slave_buffer(channel, buffer);
        result.map_err(|error| self.reject(ServiceId::PrepareSlaveBuffer, channel, error))
    }

    fn try_prepare_slave_buffer(
        &mut self,
        channel: LogicalChannel,
        buffer: &mut [u8],
    ) -> Result<(), Error> {
        let (unit, cfg) = self.resolve(channel)?;
        if !cfg.role.is_slave() {
            return Err(Error::RoleMismatch);
        }
        if buffer.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        if self.status[unit.index()].get().is_busy() {
            return Err(Error::Busy);
        }
        let mut slice = RawBufSliceMut::new_nulled();
        unsafe { slice.set(buffer) };
        self.dispatch(unit, |engine, index, _| {
            engine.prepare_slave_buffer(index, slice)
        })
    }

    /// Arm a slave channel for the next transaction addressed to it. The channel becomes
    /// [ChannelStatus::Idle].
    pub fn start_listening(&mut self, channel: LogicalChannel) -> Result<(), Error> {
        let result = self.try_start_listening(channel);
        self.drain_events();
        result.map_err(|error| self.reject(ServiceId::StartListening, channel, error))
    }

    fn try_start_listening(&mut self, channel: LogicalChannel) -> Result<(), Error> {
        let (unit, cfg) = self.resolve(channel)?;
        if !cfg.role.is_slave() {
            return Err(Error::RoleMismatch);
        }
        if self.status[unit.index()].get().is_busy() {
            return Err(Error::Busy);
        }
        self.dispatch(unit, |engine, index, env| engine.start_listening(index, env))?;
        self.status[unit.index()].set(ChannelStatus::Idle);
        self.last_error[unit.index()] = None;
        Ok(())
    }

    fn resolve(&self, channel: LogicalChannel) -> Result<(HwUnit, &'a ChannelConfig), Error> {
        if self.config.is_none() {
            return Err(Error::Uninit);
        }
        self.channel_map
            .get(channel as usize)
            .copied()
            .flatten()
            .and_then(|unit| {
                self.unit_config
                    .get(unit.index())
                    .copied()
                    .flatten()
                    .map(|cfg| (unit, cfg))
            })
            .ok_or(Error::InvalidChannel(channel))
    }

    fn admit(
        &mut self,
        service: ServiceId,
        channel: LogicalChannel,
        request: &mut TransferRequest<'_>,
    ) -> Result<(HwUnit, &'a ChannelConfig, Transfer), Error> {
        let result = self.check_request(channel, request);
        result.map_err(|error| self.reject(service, channel, error))
    }

    fn check_request(
        &mut self,
        channel: LogicalChannel,
        request: &mut TransferRequest<'_>,
    ) -> Result<(HwUnit, &'a ChannelConfig, Transfer), Error> {
        let (unit, cfg) = self.resolve(channel)?;
        if request.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        if !cfg.role.is_master() {
            return Err(Error::RoleMismatch);
        }
        let max = self.engine(unit).max_transfer_len();
        if request.len() > max {
            return Err(Error::BufferTooLarge {
                len: request.len(),
                max,
            });
        }
        let transfer = unsafe { request.to_transfer() };
        self.engine(unit).check_transfer(&transfer)?;
        // Admission clears a previous error.
        self.status[unit.index()]
            .try_admit(transfer.direction().busy_status())
            .map_err(|_| Error::Busy)?;
        self.last_error[unit.index()] = None;
        Ok((unit, cfg, transfer))
    }

    fn reject(&self, service: ServiceId, channel: LogicalChannel, error: Error) -> Error {
        if let Some(code) = error.det_code() {
            self.hooks.det.report(MODULE_ID, INSTANCE_ID, service, code);
        }
        log::warn!("{service:?} on channel {channel} rejected: {error}");
        error
    }

    #[inline]
    fn timeout_event(&self) -> Option<DemEventId> {
        self.config.and_then(|config| config.dem.timeout)
    }

    #[inline]
    fn poll_budget(&self) -> u32 {
        self.config
            .map_or(DEFAULT_POLL_BUDGET, |config| config.poll_budget)
    }

    fn engine(&self, unit: HwUnit) -> &dyn TransferEngine {
        match unit {
            HwUnit::Lpi2c(_) => &self.lpi2c,
            HwUnit::Flexio(_) => &self.flexio,
        }
    }

    /// Call into the engine backing `unit`.
    pub(crate) fn dispatch<R>(
        &mut self,
        unit: HwUnit,
        f: impl FnOnce(&mut dyn TransferEngine, usize, &mut Env<'_>) -> R,
    ) -> R {
        let poll_budget = self.poll_budget();
        let mut env = Env {
            dma: &mut self.dma,
            events: &mut self.events,
            poll_budget,
        };
        let engine: &mut dyn TransferEngine = match unit {
            HwUnit::Lpi2c(_) => &mut self.lpi2c,
            HwUnit::Flexio(_) => &mut self.flexio,
        };
        f(engine, unit.local_index(), &mut env)
    }

    /// Call into both engines with an environment, used by the completion routers.
    pub(crate) fn with_engines<R>(
        &mut self,
        f: impl FnOnce(&mut Lpi2cEngine<L>, &mut FlexioEngine<F>, &mut Env<'_>) -> R,
    ) -> R {
        let poll_budget = self.poll_budget();
        let mut env = Env {
            dma: &mut self.dma,
            events: &mut self.events,
            poll_budget,
        };
        f(&mut self.lpi2c, &mut self.flexio, &mut env)
    }

    pub(crate) fn drain_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: Event) {
        let index = event.unit.index();
        let Some(cfg) = self.unit_config.get(index).copied().flatten() else {
            log::trace!("dropping {event:?} of unmapped unit");
            return;
        };
        let channel = cfg.channel;
        let notifier = self.hooks.notifier;
        let status = &self.status[index];
        match event.kind {
            EventKind::MasterDone { direction, bytes } => {
                status.set(ChannelStatus::Finished);
                match direction {
                    Direction::Send => notifier.master_transmit_complete(channel, bytes),
                    Direction::Receive => notifier.master_receive_complete(channel, bytes),
                }
            }
            EventKind::SlaveAddressed {
                direction,
                accepted,
            } => {
                if accepted {
                    status.set(direction.busy_status());
                }
                notifier.slave_address_match(channel, direction);
            }
            EventKind::SlaveDone { direction, bytes } => {
                status.set(ChannelStatus::Finished);
                match direction {
                    Direction::Send => notifier.slave_transmit_complete(channel, bytes),
                    Direction::Receive => notifier.slave_receive_complete(channel, bytes),
                }
            }
            EventKind::Fault(error) => {
                status.set(ChannelStatus::ErrorPresent);
                self.last_error[index] = Some(error);
                log::warn!("channel {channel}: {error}");
                if error == BusError::Timeout {
                    if let Some(event) = self.timeout_event() {
                        self.hooks.dem.report(event, DemEventStatus::Failed);
                    }
                }
                if cfg.notify_errors {
                    notifier.error(channel, error);
                }
            }
        }
    }
}
