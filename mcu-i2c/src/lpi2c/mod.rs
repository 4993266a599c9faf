//! FIFO I2C controller engine.
//!
//! The controller executes a queue of command words: start conditions with the address byte,
//! data bytes to transmit, receive commands and the stop condition. Master transfers are
//! expressed as such a command sequence and fed into the transmit FIFO, either by a bounded poll
//! loop, from the interrupt handler or, for the data bytes, by DMA.
//!
//! Every module can additionally act as a slave with one own address, see [asynch].
use arbitrary_int::{u3, u4, u6, u10};
use mcu_i2c_regs::lpi2c::{
    AddressConfig, Command, FifoControl, FifoStatus, MRDR_OFFSET, MTDR_OFFSET, MasterClockConfig,
    MasterConfig1, MasterConfig2, MasterConfig3, MasterControl, MasterDma, MasterInterrupts,
    MasterStatus, MmioLpi2c, Parameters, ReceiveData, ReceivedAddress, SlaveAddressMatch,
    SlaveConfig1, SlaveControl, SlaveInterrupts, SlaveReceiveData, SlaveStatus, SlaveTransmitData,
    TransmitData,
};
use raw_slice::RawBufSliceMut;

use crate::{
    BusError, Error, HwUnit, LPI2C_MODULE_COUNT,
    config::{ChannelConfig, DmaChannels, EngineConfig, I2cSpeed, I2cSpeedNotAttainable, Role},
    config::Lpi2cUnitConfig,
    engine::{Env, EventKind, TransferEngine, TransferMode},
    request::{AddressByte, Direction, SlaveAddress, Transfer, ten_bit_header, ten_bit_low_byte},
    time::Hertz,
};

pub mod asynch;
pub mod dma;

/// Maximum number of data bytes of one transfer, limited by the 8 bit count of the receive
/// command.
pub const MAX_TRANSFER_LEN: usize = 256;

/// Start, optional 10-bit low byte, optional repeated start and the receive command.
const MAX_PROLOGUE: usize = 4;

const MASTER_W1C: MasterStatus = MasterStatus::new_with_raw_value(0x7F00);
const SLAVE_W1C: SlaveStatus = SlaveStatus::new_with_raw_value(0x0F00);

/// Register access used by the engine.
///
/// Implemented for the MMIO block of the controller. Tests implement it for a simulated
/// controller.
pub trait Lpi2cRegisters {
    fn parameters(&mut self) -> Parameters;

    fn master_control(&mut self) -> MasterControl;
    fn set_master_control(&mut self, value: MasterControl);
    fn master_status(&mut self) -> MasterStatus;
    /// Write-1-to-clear.
    fn clear_master_status(&mut self, flags: MasterStatus);
    fn master_interrupts(&mut self) -> MasterInterrupts;
    fn set_master_interrupts(&mut self, value: MasterInterrupts);
    fn set_master_dma(&mut self, value: MasterDma);
    fn set_master_config(&mut self, cfg1: MasterConfig1, cfg2: MasterConfig2, cfg3: MasterConfig3);
    fn set_clock_config(&mut self, normal: MasterClockConfig, high_speed: MasterClockConfig);
    fn set_fifo_control(&mut self, value: FifoControl);
    fn fifo_status(&mut self) -> FifoStatus;
    fn push_command(&mut self, command: TransmitData);
    fn pop_data(&mut self) -> ReceiveData;

    fn slave_control(&mut self) -> SlaveControl;
    fn set_slave_control(&mut self, value: SlaveControl);
    fn slave_status(&mut self) -> SlaveStatus;
    /// Write-1-to-clear.
    fn clear_slave_status(&mut self, flags: SlaveStatus);
    fn slave_interrupts(&mut self) -> SlaveInterrupts;
    fn set_slave_interrupts(&mut self, value: SlaveInterrupts);
    fn set_slave_config(&mut self, cfg1: SlaveConfig1, address: SlaveAddressMatch);
    /// Reading the received address clears the address valid flag.
    fn received_address(&mut self) -> ReceivedAddress;
    fn push_slave_data(&mut self, byte: u8);
    fn pop_slave_data(&mut self) -> SlaveReceiveData;

    /// Bus address of the master transmit data register.
    fn transmit_data_address(&self) -> usize;
    /// Bus address of the master receive data register.
    fn receive_data_address(&self) -> usize;
}

impl Lpi2cRegisters for MmioLpi2c<'static> {
    #[inline]
    fn parameters(&mut self) -> Parameters {
        self.read_param()
    }

    #[inline]
    fn master_control(&mut self) -> MasterControl {
        self.read_mcr()
    }

    #[inline]
    fn set_master_control(&mut self, value: MasterControl) {
        self.write_mcr(value);
    }

    #[inline]
    fn master_status(&mut self) -> MasterStatus {
        self.read_msr()
    }

    #[inline]
    fn clear_master_status(&mut self, flags: MasterStatus) {
        self.write_msr(flags);
    }

    #[inline]
    fn master_interrupts(&mut self) -> MasterInterrupts {
        self.read_mier()
    }

    #[inline]
    fn set_master_interrupts(&mut self, value: MasterInterrupts) {
        self.write_mier(value);
    }

    #[inline]
    fn set_master_dma(&mut self, value: MasterDma) {
        self.write_mder(value);
    }

    fn set_master_config(
        &mut self,
        cfg1: MasterConfig1,
        cfg2: MasterConfig2,
        cfg3: MasterConfig3,
    ) {
        self.write_mcfgr1(cfg1);
        self.write_mcfgr2(cfg2);
        self.write_mcfgr3(cfg3);
    }

    fn set_clock_config(&mut self, normal: MasterClockConfig, high_speed: MasterClockConfig) {
        self.write_mccr0(normal);
        self.write_mccr1(high_speed);
    }

    #[inline]
    fn set_fifo_control(&mut self, value: FifoControl) {
        self.write_mfcr(value);
    }

    #[inline]
    fn fifo_status(&mut self) -> FifoStatus {
        self.read_mfsr()
    }

    #[inline]
    fn push_command(&mut self, command: TransmitData) {
        self.write_mtdr(command);
    }

    #[inline]
    fn pop_data(&mut self) -> ReceiveData {
        self.read_mrdr()
    }

    #[inline]
    fn slave_control(&mut self) -> SlaveControl {
        self.read_scr()
    }

    #[inline]
    fn set_slave_control(&mut self, value: SlaveControl) {
        self.write_scr(value);
    }

    #[inline]
    fn slave_status(&mut self) -> SlaveStatus {
        self.read_ssr()
    }

    #[inline]
    fn clear_slave_status(&mut self, flags: SlaveStatus) {
        self.write_ssr(flags);
    }

    #[inline]
    fn slave_interrupts(&mut self) -> SlaveInterrupts {
        self.read_sier()
    }

    #[inline]
    fn set_slave_interrupts(&mut self, value: SlaveInterrupts) {
        self.write_sier(value);
    }

    fn set_slave_config(&mut self, cfg1: SlaveConfig1, address: SlaveAddressMatch) {
        self.write_scfgr1(cfg1);
        self.write_samr(address);
    }

    #[inline]
    fn received_address(&mut self) -> ReceivedAddress {
        self.read_sasr()
    }

    #[inline]
    fn push_slave_data(&mut self, byte: u8) {
        self.write_stdr(SlaveTransmitData::new_with_raw_value(byte as u32));
    }

    #[inline]
    fn pop_slave_data(&mut self) -> SlaveReceiveData {
        self.read_srdr()
    }

    fn transmit_data_address(&self) -> usize {
        unsafe { self.ptr() as usize + MTDR_OFFSET }
    }

    fn receive_data_address(&self) -> usize {
        unsafe { self.ptr() as usize + MRDR_OFFSET }
    }
}

/// SCL timing of the controller.
///
/// The SCL low period is `clklo + 1` and the high period roughly `clkhi + 1` prescaled clock
/// cycles, the remaining cycle accounts for the synchronization of the SCL input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    prescale: u3,
    clklo: u6,
    clkhi: u6,
}

impl ClockConfig {
    #[inline]
    pub const fn new(prescale: u3, clklo: u6, clkhi: u6) -> Self {
        Self {
            prescale,
            clklo,
            clkhi,
        }
    }

    #[inline]
    pub const fn prescale(&self) -> u3 {
        self.prescale
    }

    #[inline]
    pub const fn clklo(&self) -> u6 {
        self.clklo
    }

    #[inline]
    pub const fn clkhi(&self) -> u6 {
        self.clkhi
    }

    /// Setup and hold times follow the high period, the data valid delay is half of it.
    pub const fn register(&self) -> MasterClockConfig {
        MasterClockConfig::new_with_raw_value(0)
            .with_clklo(self.clklo)
            .with_clkhi(self.clkhi)
            .with_sethold(self.clkhi)
            .with_datavd(u6::new(self.clkhi.value() / 2))
    }
}

/// SCL frequency resulting from the functional clock `fclk` and the given configuration.
pub fn calculate_i2c_speed(fclk: Hertz, cfg: ClockConfig) -> Hertz {
    let cycles = cfg.clklo.value() as u32 + cfg.clkhi.value() as u32 + 3;
    fclk / (cycles << cfg.prescale.value())
}

/// Find the clock configuration closest to the requested bus speed. The high period is kept at
/// half the low period, which satisfies the fast mode duty cycle requirements.
///
/// Fails if the best configuration deviates more than 10 % from the requested speed.
pub fn calculate_clock_config(
    fclk: Hertz,
    speed: I2cSpeed,
) -> Result<ClockConfig, I2cSpeedNotAttainable> {
    let target_speed = speed.frequency().raw();
    let mut smallest_deviation = u32::MAX;
    let mut best = None;
    for prescale in 0..=7 {
        for clklo in 2..=63 {
            let cfg = ClockConfig::new(u3::new(prescale), u6::new(clklo), u6::new(clklo / 2));
            let deviation = target_speed.abs_diff(calculate_i2c_speed(fclk, cfg).raw());
            if deviation < smallest_deviation {
                smallest_deviation = deviation;
                best = Some(cfg);
            }
        }
    }
    match best {
        Some(cfg) if smallest_deviation <= target_speed / 10 => Ok(cfg),
        _ => Err(I2cSpeedNotAttainable),
    }
}

#[inline]
pub(crate) const fn start_command(expect_nack: bool, high_speed: bool) -> Command {
    match (high_speed, expect_nack) {
        (false, false) => Command::Start,
        (false, true) => Command::StartExpectNack,
        (true, false) => Command::StartHighSpeed,
        (true, true) => Command::StartHighSpeedExpectNack,
    }
}

#[inline]
const fn command(cmd: Command, data: u8) -> TransmitData {
    TransmitData::new_with_raw_value(0).with_cmd(cmd).with_data(data)
}

#[inline]
const fn stop_command() -> TransmitData {
    command(Command::Stop, 0)
}

/// Map latched master error flags to a bus error. Pin low timeouts take precedence because
/// they usually cause the other flags.
pub(crate) const fn master_error(status: MasterStatus) -> Option<BusError> {
    if status.pltf() {
        Some(BusError::PinLowTimeout)
    } else if status.fef() {
        Some(BusError::FifoError)
    } else if status.alf() {
        Some(BusError::ArbitrationLost)
    } else if status.ndf() {
        Some(BusError::Nack)
    } else {
        None
    }
}

/// A running master transfer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MasterTransfer {
    transfer: Transfer,
    mode: TransferMode,
    prologue: [TransmitData; MAX_PROLOGUE],
    prologue_len: usize,
    prologue_sent: usize,
    /// Data bytes queued for a send, data bytes read for a receive.
    index: usize,
    stop_queued: bool,
    /// Data bytes moved by completed DMA bursts.
    dma_offset: usize,
    /// Length of the DMA burst in flight.
    dma_segment: usize,
}

impl MasterTransfer {
    fn new(transfer: Transfer, mode: TransferMode) -> Self {
        let mut xfer = Self {
            transfer,
            mode,
            prologue: [TransmitData::new_with_raw_value(0); MAX_PROLOGUE],
            prologue_len: 0,
            prologue_sent: 0,
            index: 0,
            stop_queued: false,
            dma_offset: 0,
            dma_segment: 0,
        };
        xfer.build_prologue();
        xfer
    }

    fn push_prologue(&mut self, cmd: Command, data: u8) {
        if let Some(slot) = self.prologue.get_mut(self.prologue_len) {
            *slot = command(cmd, data);
            self.prologue_len += 1;
        }
    }

    fn build_prologue(&mut self) {
        if self.transfer.no_start {
            return;
        }
        let start = start_command(self.transfer.expect_nack, self.transfer.high_speed);
        let direction = self.transfer.direction();
        match self.transfer.address {
            SlaveAddress::SevenBit(address) => {
                self.push_prologue(start, AddressByte::for_address(address, direction).raw_value());
            }
            SlaveAddress::TenBit(address) => {
                self.push_prologue(start, ten_bit_header(address, false));
                self.push_prologue(Command::Transmit, ten_bit_low_byte(address));
                if direction == Direction::Receive {
                    self.push_prologue(start, ten_bit_header(address, true));
                }
            }
        }
        if direction == Direction::Receive {
            // Receive count is encoded as count - 1, admission rejects empty transfers.
            self.push_prologue(Command::Receive, self.transfer.len.saturating_sub(1) as u8);
        }
    }

    fn next_command(&mut self) -> Option<TransmitData> {
        if let Some(cmd) = self.prologue[..self.prologue_len].get(self.prologue_sent) {
            self.prologue_sent += 1;
            return Some(*cmd);
        }
        if self.transfer.direction() == Direction::Send && self.index < self.transfer.len {
            let byte = unsafe { self.transfer.send_byte(self.index) }.unwrap_or(0);
            self.index += 1;
            return Some(command(Command::Transmit, byte));
        }
        if !self.stop_queued {
            self.stop_queued = true;
            if !self.transfer.no_stop {
                return Some(stop_command());
            }
        }
        None
    }

    #[inline]
    fn all_queued(&self) -> bool {
        self.stop_queued
    }

    #[inline]
    fn is_complete(&self) -> bool {
        self.stop_queued
            && (self.transfer.direction() == Direction::Send || self.index >= self.transfer.len)
    }
}

#[derive(Debug, Clone, Copy)]
struct UnitSetup {
    config: Lpi2cUnitConfig,
    role: Role,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SlaveTransfer {
    direction: Direction,
    index: usize,
}

/// One controller module.
pub struct Lpi2cUnit<L> {
    regs: L,
    module: u8,
    setup: Option<UnitSetup>,
    tx_fifo_depth: usize,
    rx_fifo_depth: usize,
    master: Option<MasterTransfer>,
    slave_buffer: RawBufSliceMut,
    slave_len: usize,
    listening: bool,
    /// Direction of a transaction stretched on the bus because the unit was not listening.
    stalled: Option<Direction>,
    slave: Option<SlaveTransfer>,
}

impl<L: Lpi2cRegisters> Lpi2cUnit<L> {
    fn new(regs: L, module: u8) -> Self {
        Self {
            regs,
            module,
            setup: None,
            tx_fifo_depth: 1,
            rx_fifo_depth: 1,
            master: None,
            slave_buffer: RawBufSliceMut::new_nulled(),
            slave_len: 0,
            listening: false,
            stalled: None,
            slave: None,
        }
    }

    #[inline]
    pub fn hw_unit(&self) -> HwUnit {
        HwUnit::Lpi2c(self.module)
    }

    #[inline]
    pub fn regs(&mut self) -> &mut L {
        &mut self.regs
    }

    #[inline]
    fn dma_channels(&self) -> Option<DmaChannels> {
        self.setup.and_then(|setup| setup.config.dma)
    }

    fn init(&mut self, role: Role, config: Lpi2cUnitConfig) {
        self.reset_hardware();
        let param = self.regs.parameters();
        self.tx_fifo_depth = 1 << param.mtxfifo().value();
        self.rx_fifo_depth = 1 << param.mrxfifo().value();
        if role.is_master() {
            self.regs.set_master_config(
                MasterConfig1::new_with_raw_value(0).with_prescale(config.clock.prescale()),
                MasterConfig2::new_with_raw_value(0)
                    .with_busidle(config.bus_idle_timeout)
                    .with_filtscl(config.glitch_filter)
                    .with_filtsda(config.glitch_filter),
                MasterConfig3::new_with_raw_value(0).with_pinlow(config.pin_low_timeout),
            );
            self.regs.set_clock_config(
                config.clock.register(),
                config.high_speed_clock.unwrap_or(config.clock).register(),
            );
            self.regs.set_fifo_control(FifoControl::new_with_raw_value(0));
            self.regs
                .set_master_control(MasterControl::new_with_raw_value(0).with_men(true));
        }
        if role.is_slave() {
            if let Some(address) = config.slave_address {
                self.configure_slave(address, config.glitch_filter);
            }
        }
        self.setup = Some(UnitSetup { config, role });
        self.master = None;
        self.slave = None;
        self.listening = false;
        self.stalled = None;
        self.slave_buffer.set_null();
        self.slave_len = 0;
        log::debug!(
            "I2C module {}: initialized as {:?}, TX FIFO {} RX FIFO {}",
            self.module,
            role,
            self.tx_fifo_depth,
            self.rx_fifo_depth
        );
    }

    fn configure_slave(&mut self, address: SlaveAddress, glitch_filter: u4) {
        let (addrcfg, raw) = match address {
            SlaveAddress::SevenBit(addr) => (AddressConfig::Addr0SevenBit, addr.value() as u16),
            SlaveAddress::TenBit(addr) => (AddressConfig::Addr0TenBit, addr.value()),
        };
        // Stretch SCL until the data registers are serviced.
        self.regs.set_slave_config(
            SlaveConfig1::new_with_raw_value(0)
                .with_addrcfg(addrcfg)
                .with_rxstall(true)
                .with_txdstall(true),
            SlaveAddressMatch::new_with_raw_value(0).with_addr0(u10::new(raw & 0x3FF)),
        );
        self.regs.set_slave_interrupts(
            SlaveInterrupts::new_with_raw_value(0)
                .with_avie(true)
                .with_sdie(true)
                .with_beie(true)
                .with_feie(true),
        );
        self.regs.set_slave_control(
            SlaveControl::new_with_raw_value(0)
                .with_sen(true)
                .with_filten(glitch_filter.value() != 0),
        );
    }

    fn deinit(&mut self) {
        self.reset_hardware();
        self.setup = None;
        self.master = None;
        self.slave = None;
        self.listening = false;
        self.stalled = None;
        self.slave_buffer.set_null();
        self.slave_len = 0;
    }

    /// Disable and reset the master and slave logic.
    pub(crate) fn reset_hardware(&mut self) {
        self.regs
            .set_master_interrupts(MasterInterrupts::new_with_raw_value(0));
        self.regs.set_master_dma(MasterDma::new_with_raw_value(0));
        self.regs.set_slave_interrupts(SlaveInterrupts::new_with_raw_value(0));
        self.regs
            .set_master_control(MasterControl::new_with_raw_value(0).with_rst(true));
        self.regs.set_master_control(MasterControl::new_with_raw_value(0));
        self.regs
            .set_slave_control(SlaveControl::new_with_raw_value(0).with_rst(true));
        self.regs.set_slave_control(SlaveControl::new_with_raw_value(0));
        self.regs.clear_master_status(MASTER_W1C);
        self.regs.clear_slave_status(SLAVE_W1C);
    }

    fn reset_fifos(&mut self) {
        let mcr = self.regs.master_control();
        self.regs.set_master_control(mcr.with_rtf(true).with_rrf(true));
    }

    fn start_master(&mut self, transfer: Transfer, mode: TransferMode, env: &mut Env<'_>) {
        if self.setup.is_none() {
            log::warn!("I2C module {}: transfer on unconfigured module", self.module);
            return;
        }
        self.regs
            .set_master_interrupts(MasterInterrupts::new_with_raw_value(0));
        self.regs.set_master_dma(MasterDma::new_with_raw_value(0));
        self.reset_fifos();
        self.regs.clear_master_status(MASTER_W1C);
        self.regs.set_fifo_control(FifoControl::new_with_raw_value(0));
        self.master = Some(MasterTransfer::new(transfer, mode));
        log::debug!(
            "I2C module {}: {:?} of {} bytes, address {:?}, {:?}",
            self.module,
            transfer.direction(),
            transfer.len,
            transfer.address,
            mode
        );
        match mode {
            TransferMode::Sync => self.run_blocking(env),
            TransferMode::Interrupt => self.start_interrupt(),
            TransferMode::Dma => dma::start(self, env),
        }
    }

    /// Push pending commands while the transmit FIFO has room. Returns true once all commands
    /// including the stop are queued.
    fn feed(&mut self) -> bool {
        let Some(xfer) = self.master.as_mut() else {
            return true;
        };
        let queued = self.regs.fifo_status().txcount().value() as usize;
        for _ in queued..self.tx_fifo_depth {
            match xfer.next_command() {
                Some(cmd) => self.regs.push_command(cmd),
                None => break,
            }
        }
        xfer.all_queued()
    }

    fn drain_rx(&mut self) {
        let Some(xfer) = self.master.as_mut() else {
            return;
        };
        for _ in 0..MAX_TRANSFER_LEN {
            let data = self.regs.pop_data();
            if data.rxempty() {
                break;
            }
            unsafe { xfer.transfer.store_byte(xfer.index, data.data()) };
            xfer.index += 1;
        }
    }

    /// Push a single command, waiting a bounded number of polls for room in the FIFO.
    fn push_blocking(&mut self, cmd: TransmitData, poll_budget: u32) -> bool {
        for _ in 0..poll_budget {
            if (self.regs.fifo_status().txcount().value() as usize) < self.tx_fifo_depth {
                self.regs.push_command(cmd);
                return true;
            }
        }
        false
    }

    /// One step of a CPU driven master transfer.
    fn service_master(&mut self, env: &mut Env<'_>) {
        let Some(xfer) = self.master else {
            return;
        };
        let status = self.regs.master_status();
        if let Some(error) = master_error(status) {
            self.fail_master(error, env);
            return;
        }
        if xfer.transfer.direction() == Direction::Receive {
            self.drain_rx();
        }
        self.feed();
        if self.transfer_ended(status) {
            self.finish_master(env);
        }
    }

    /// The running transfer is over on the bus: the STOP was detected, or every command of a
    /// transfer without STOP left the FIFO.
    fn transfer_ended(&mut self, status: MasterStatus) -> bool {
        let Some(xfer) = self.master else {
            return false;
        };
        if !xfer.is_complete() {
            return false;
        }
        if xfer.transfer.no_stop {
            self.regs.fifo_status().txcount().value() == 0
        } else {
            status.sdf()
        }
    }

    fn run_blocking(&mut self, env: &mut Env<'_>) {
        for _ in 0..env.poll_budget {
            self.service_master(env);
            if self.master.is_none() {
                return;
            }
        }
        self.fail_master(BusError::Timeout, env);
    }

    /// Bounded wait for the stop condition after all data moved.
    fn wait_for_stop(&mut self, env: &mut Env<'_>) {
        for _ in 0..env.poll_budget {
            let status = self.regs.master_status();
            if let Some(error) = master_error(status) {
                self.fail_master(error, env);
                return;
            }
            if self.transfer_ended(status) {
                self.finish_master(env);
                return;
            }
        }
        self.fail_master(BusError::Timeout, env);
    }

    fn finish_master(&mut self, env: &mut Env<'_>) {
        self.regs
            .set_master_interrupts(MasterInterrupts::new_with_raw_value(0));
        self.regs.set_master_dma(MasterDma::new_with_raw_value(0));
        self.regs.clear_master_status(MASTER_W1C);
        if let Some(xfer) = self.master.take() {
            let direction = xfer.transfer.direction();
            log::debug!(
                "I2C module {}: {:?} of {} bytes done",
                self.module,
                direction,
                xfer.transfer.len
            );
            env.emit(
                self.hw_unit(),
                EventKind::MasterDone {
                    direction,
                    bytes: xfer.transfer.len,
                },
            );
        }
    }

    pub(crate) fn fail_master(&mut self, error: BusError, env: &mut Env<'_>) {
        self.regs
            .set_master_interrupts(MasterInterrupts::new_with_raw_value(0));
        self.regs.set_master_dma(MasterDma::new_with_raw_value(0));
        if let Some(xfer) = self.master.take() {
            if xfer.mode == TransferMode::Dma {
                if let Some(channels) = self.dma_channels() {
                    env.dma.disable(channels.tx);
                    env.dma.disable(channels.rx);
                }
            }
        }
        // The controller halts on a NACK with the rest of the transfer still queued.
        if matches!(
            error,
            BusError::FifoError | BusError::Nack | BusError::Timeout
        ) {
            self.reset_fifos();
        }
        self.regs.clear_master_status(MASTER_W1C);
        log::warn!("I2C module {}: master transfer failed: {}", self.module, error);
        env.emit(self.hw_unit(), EventKind::Fault(error));
    }

    fn poll_errors(&mut self, env: &mut Env<'_>) {
        let Some(setup) = self.setup else {
            return;
        };
        if setup.role.is_master() && self.master.is_none() {
            if let Some(error) = master_error(self.regs.master_status()) {
                self.fail_master(error, env);
            }
        }
        if setup.role.is_slave() && self.slave.is_none() {
            if let Some(error) = asynch::slave_error(self.regs.slave_status()) {
                self.fail_slave(error, env);
            }
        }
    }
}

/// All controller modules.
pub struct Lpi2cEngine<L> {
    units: [Lpi2cUnit<L>; LPI2C_MODULE_COUNT],
}

impl<L: Lpi2cRegisters> Lpi2cEngine<L> {
    pub fn new(regs: [L; LPI2C_MODULE_COUNT]) -> Self {
        let mut module = 0;
        Self {
            units: regs.map(|regs| {
                let unit = Lpi2cUnit::new(regs, module);
                module += 1;
                unit
            }),
        }
    }

    #[inline]
    pub fn unit_mut(&mut self, module: usize) -> Option<&mut Lpi2cUnit<L>> {
        self.units.get_mut(module)
    }
}

impl<L: Lpi2cRegisters> TransferEngine for Lpi2cEngine<L> {
    fn init_unit(&mut self, index: usize, config: &ChannelConfig) {
        if let (Some(unit), EngineConfig::Lpi2c(cfg)) = (self.units.get_mut(index), &config.engine)
        {
            unit.init(config.role, *cfg);
        }
    }

    fn deinit_unit(&mut self, index: usize) {
        if let Some(unit) = self.units.get_mut(index) {
            unit.deinit();
        }
    }

    fn max_transfer_len(&self) -> usize {
        MAX_TRANSFER_LEN
    }

    fn check_transfer(&self, transfer: &Transfer) -> Result<(), Error> {
        // A receive needs the address phase for its direction bit.
        if transfer.no_start && transfer.direction() == Direction::Receive {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    fn start(&mut self, index: usize, transfer: Transfer, mode: TransferMode, env: &mut Env<'_>) {
        if let Some(unit) = self.units.get_mut(index) {
            unit.start_master(transfer, mode, env);
        }
    }

    fn poll_errors(&mut self, index: usize, env: &mut Env<'_>) {
        if let Some(unit) = self.units.get_mut(index) {
            unit.poll_errors(env);
        }
    }

    fn prepare_slave_buffer(
        &mut self,
        index: usize,
        buffer: RawBufSliceMut,
    ) -> Result<(), Error> {
        let unit = self.units.get_mut(index).ok_or(Error::Unsupported)?;
        unit.prepare_slave_buffer(buffer)
    }

    fn start_listening(&mut self, index: usize, env: &mut Env<'_>) -> Result<(), Error> {
        let unit = self.units.get_mut(index).ok_or(Error::Unsupported)?;
        unit.start_listening(env)
    }

    fn on_dma_complete(&mut self, index: usize, dma_channel: u8, env: &mut Env<'_>) {
        if let Some(unit) = self.units.get_mut(index) {
            dma::on_complete(unit, dma_channel, env);
        }
    }
}
