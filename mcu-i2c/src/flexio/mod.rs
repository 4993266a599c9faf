//! Shift-timer block engine.
//!
//! Each channel emulates an I2C master with four resources of the block:
//!
//! - A transmit shifter driving SDA as open drain output. Its start bit produces the START
//!   condition, its stop bit the ACK/NACK slot of received bytes.
//! - A receive shifter sampling SDA. It reads back every frame, its stop bit setting checks the
//!   ACK slot.
//! - The SCL timer, a dual 8-bit baud counter which generates SCL and counts the edges of the
//!   whole transfer. Its compare value therefore depends on the transfer length.
//! - The control timer, a 16-bit counter clocking the shifters.
//!
//! A frame is nine bits on the bus: eight data bits followed by the ACK slot. Writing
//! [STOP_BYTE] after the last frame produces the STOP condition, the SCL timer flags the end of
//! the transfer.
use arbitrary_int::{u2, u3, u5, u6};
use mcu_i2c_regs::flexio::{
    Control, MmioFlexio, Parameters, PinConfig, SHIFTBUFBBS_OFFSET, SHIFTBUFBIS_OFFSET,
    ShifterConfig, ShifterControl, ShifterMode, StartBit, StopBit, TimerCompare, TimerConfig,
    TimerControl, TimerMode,
};
use raw_slice::RawBufSliceMut;

use crate::{
    BusError, Error, FLEXIO_CHANNEL_COUNT, HwUnit,
    config::{ChannelConfig, EngineConfig, FlexioUnitConfig, I2cSpeed, I2cSpeedNotAttainable},
    engine::{Env, EventKind, TransferEngine, TransferMode},
    request::{AddressByte, Direction, SlaveAddress, Transfer},
    time::Hertz,
};

pub mod asynch;
pub mod dma;

/// Maximum number of data bytes of one transfer. The SCL timer counts at most 255 edges and
/// every frame takes 18 of them.
pub const MAX_TRANSFER_LEN: usize = 13;

/// Loaded after the last frame to produce the STOP condition.
pub const STOP_BYTE: u8 = 0x00;
/// Loaded for every received byte, the open drain output leaves SDA to the slave.
pub const IDLE_BYTE: u8 = 0xFF;

/// Edges of one frame: eight data bits and the ACK slot.
const EDGES_PER_FRAME: usize = 18;

/// Address frame, data frames and the stop frame.
const AUX_LEN: usize = MAX_TRANSFER_LEN + 2;

/// Register access used by the engine. Masks carry one bit per shifter or timer.
pub trait FlexioRegisters {
    fn parameters(&mut self) -> Parameters;
    fn control(&mut self) -> Control;
    fn set_control(&mut self, value: Control);

    fn shifter_status(&mut self) -> u32;
    fn shifter_errors(&mut self) -> u32;
    /// Write-1-to-clear.
    fn clear_shifter_errors(&mut self, mask: u32);
    fn timer_status(&mut self) -> u32;
    /// Write-1-to-clear.
    fn clear_timer_status(&mut self, mask: u32);

    fn shifter_status_interrupts(&mut self) -> u32;
    fn set_shifter_status_interrupts(&mut self, mask: u32);
    fn timer_interrupts(&mut self) -> u32;
    fn set_timer_interrupts(&mut self, mask: u32);
    fn shifter_dma(&mut self) -> u32;
    fn set_shifter_dma(&mut self, mask: u32);

    fn shifter_config(&mut self, shifter: usize) -> ShifterConfig;
    fn set_shifter_config(&mut self, shifter: usize, value: ShifterConfig);
    fn set_shifter_control(&mut self, shifter: usize, value: ShifterControl);
    fn set_timer_control(&mut self, timer: usize, value: TimerControl);
    fn set_timer_config(&mut self, timer: usize, value: TimerConfig);
    fn set_timer_compare(&mut self, timer: usize, value: TimerCompare);

    /// Load a transmit shifter, most significant bit first.
    fn write_tx_buffer(&mut self, shifter: usize, byte: u8);
    /// Read the byte sampled by a receive shifter.
    fn read_rx_buffer(&mut self, shifter: usize) -> u8;
    /// Bus address used as DMA destination for a transmit shifter.
    fn tx_buffer_address(&self, shifter: usize) -> usize;
    /// Bus address used as DMA source for a receive shifter.
    fn rx_buffer_address(&self, shifter: usize) -> usize;
}

impl FlexioRegisters for MmioFlexio<'static> {
    #[inline]
    fn parameters(&mut self) -> Parameters {
        self.read_param()
    }

    #[inline]
    fn control(&mut self) -> Control {
        self.read_ctrl()
    }

    #[inline]
    fn set_control(&mut self, value: Control) {
        self.write_ctrl(value);
    }

    #[inline]
    fn shifter_status(&mut self) -> u32 {
        self.read_shiftstat()
    }

    #[inline]
    fn shifter_errors(&mut self) -> u32 {
        self.read_shifterr()
    }

    #[inline]
    fn clear_shifter_errors(&mut self, mask: u32) {
        self.write_shifterr(mask);
    }

    #[inline]
    fn timer_status(&mut self) -> u32 {
        self.read_timstat()
    }

    #[inline]
    fn clear_timer_status(&mut self, mask: u32) {
        self.write_timstat(mask);
    }

    #[inline]
    fn shifter_status_interrupts(&mut self) -> u32 {
        self.read_shiftsien()
    }

    #[inline]
    fn set_shifter_status_interrupts(&mut self, mask: u32) {
        self.write_shiftsien(mask);
    }

    #[inline]
    fn timer_interrupts(&mut self) -> u32 {
        self.read_timien()
    }

    #[inline]
    fn set_timer_interrupts(&mut self, mask: u32) {
        self.write_timien(mask);
    }

    #[inline]
    fn shifter_dma(&mut self) -> u32 {
        self.read_shiftsden()
    }

    #[inline]
    fn set_shifter_dma(&mut self, mask: u32) {
        self.write_shiftsden(mask);
    }

    fn shifter_config(&mut self, shifter: usize) -> ShifterConfig {
        self.read_shiftcfg(shifter).unwrap_or_else(|_| {
            log::warn!("shifter {shifter} out of range");
            ShifterConfig::new_with_raw_value(0)
        })
    }

    fn set_shifter_config(&mut self, shifter: usize, value: ShifterConfig) {
        if self.write_shiftcfg(shifter, value).is_err() {
            log::warn!("shifter {shifter} out of range");
        }
    }

    fn set_shifter_control(&mut self, shifter: usize, value: ShifterControl) {
        if self.write_shiftctl(shifter, value).is_err() {
            log::warn!("shifter {shifter} out of range");
        }
    }

    fn set_timer_control(&mut self, timer: usize, value: TimerControl) {
        if self.write_timctl(timer, value).is_err() {
            log::warn!("timer {timer} out of range");
        }
    }

    fn set_timer_config(&mut self, timer: usize, value: TimerConfig) {
        if self.write_timcfg(timer, value).is_err() {
            log::warn!("timer {timer} out of range");
        }
    }

    fn set_timer_compare(&mut self, timer: usize, value: TimerCompare) {
        if self.write_timcmp(timer, value).is_err() {
            log::warn!("timer {timer} out of range");
        }
    }

    fn write_tx_buffer(&mut self, shifter: usize, byte: u8) {
        if self.write_shiftbufbbs(shifter, byte as u32).is_err() {
            log::warn!("shifter {shifter} out of range");
        }
    }

    fn read_rx_buffer(&mut self, shifter: usize) -> u8 {
        // The bit swapped view places the last sampled byte in the low bits.
        match self.read_shiftbufbis(shifter) {
            Ok(value) => (value & 0xFF) as u8,
            Err(_) => {
                log::warn!("shifter {shifter} out of range");
                0
            }
        }
    }

    fn tx_buffer_address(&self, shifter: usize) -> usize {
        unsafe { self.ptr() as usize + SHIFTBUFBBS_OFFSET + 4 * shifter }
    }

    fn rx_buffer_address(&self, shifter: usize) -> usize {
        unsafe { self.ptr() as usize + SHIFTBUFBIS_OFFSET + 4 * shifter }
    }
}

/// Baud divider of the SCL timer for the requested bus speed. SCL toggles every
/// `divider + 1` functional clock cycles.
pub fn calculate_baud_divider(fclk: Hertz, speed: I2cSpeed) -> Result<u8, I2cSpeedNotAttainable> {
    let half_periods = fclk.raw() / (2 * speed.frequency().raw());
    match half_periods.checked_sub(1) {
        Some(divider @ 1..=255) => Ok(divider as u8),
        _ => Err(I2cSpeedNotAttainable),
    }
}

/// SCL timer compare value for a transfer of `len` data bytes.
///
/// The timer runs for `(len + 1) * 18 + 1` edges: the address frame, the data frames and the
/// edge of the STOP condition. The upper byte holds that count minus one.
pub const fn timer_compare(len: usize, baud_divider: u8) -> TimerCompare {
    let edges = ((len + 1) * EDGES_PER_FRAME) as u16;
    TimerCompare::new_with_raw_value(0).with_cmp((edges << 8) | baud_divider as u16)
}

#[inline]
const fn bit(index: u8) -> u32 {
    1 << index
}

#[inline]
const fn update_mask(current: u32, mask: u32, enable: bool) -> u32 {
    if enable { current | mask } else { current & !mask }
}

pub(crate) fn enable_status_interrupts<F: FlexioRegisters>(regs: &mut F, mask: u32, enable: bool) {
    let current = regs.shifter_status_interrupts();
    regs.set_shifter_status_interrupts(update_mask(current, mask, enable));
}

pub(crate) fn enable_timer_interrupts<F: FlexioRegisters>(regs: &mut F, mask: u32, enable: bool) {
    let current = regs.timer_interrupts();
    regs.set_timer_interrupts(update_mask(current, mask, enable));
}

pub(crate) fn enable_shifter_dma<F: FlexioRegisters>(regs: &mut F, mask: u32, enable: bool) {
    let current = regs.shifter_dma();
    regs.set_shifter_dma(update_mask(current, mask, enable));
}

/// Set the stop bit of the transmit shifter, which drives the ACK slot, and the stop bit
/// expected by the receive shifter.
pub(crate) fn set_stop_bits<F: FlexioRegisters>(
    regs: &mut F,
    cfg: &FlexioUnitConfig,
    tx_stop: StopBit,
    rx_stop: StopBit,
) {
    let tx = cfg.tx_shifter as usize;
    let rx = cfg.rx_shifter as usize;
    let tx_cfg = regs.shifter_config(tx);
    regs.set_shifter_config(tx, tx_cfg.with_sstop(tx_stop));
    let rx_cfg = regs.shifter_config(rx);
    regs.set_shifter_config(rx, rx_cfg.with_sstop(rx_stop));
}

/// Trigger of both timers: the status flag of the transmit shifter.
#[inline]
const fn tx_trigger(tx_shifter: u8) -> u6 {
    u6::new(tx_shifter.wrapping_mul(4).wrapping_add(1) & 0x3F)
}

fn configure_channel<F: FlexioRegisters>(regs: &mut F, cfg: &FlexioUnitConfig) {
    let tx = cfg.tx_shifter as usize;
    let rx = cfg.rx_shifter as usize;
    let sda = u5::new(cfg.sda_pin & 0x1F);
    let scl = u5::new(cfg.scl_pin & 0x1F);
    let shift_clock = u3::new(cfg.control_timer & 0x7);

    regs.set_shifter_config(
        tx,
        ShifterConfig::new_with_raw_value(0)
            .with_sstart(StartBit::Low)
            .with_sstop(StopBit::High),
    );
    regs.set_shifter_control(
        tx,
        ShifterControl::new_with_raw_value(0)
            .with_timsel(shift_clock)
            .with_pincfg(PinConfig::OpenDrainOrBidirectional)
            .with_pinsel(sda)
            .with_pinpol(true)
            .with_smod(ShifterMode::Transmit),
    );
    regs.set_shifter_config(
        rx,
        ShifterConfig::new_with_raw_value(0)
            .with_sstart(StartBit::Disabled)
            .with_sstop(StopBit::Low),
    );
    regs.set_shifter_control(
        rx,
        ShifterControl::new_with_raw_value(0)
            .with_timsel(shift_clock)
            .with_timpol(true)
            .with_pincfg(PinConfig::OutputDisabled)
            .with_pinsel(sda)
            .with_smod(ShifterMode::Receive),
    );

    let scl_timer = cfg.scl_timer as usize;
    regs.set_timer_compare(scl_timer, timer_compare(1, cfg.baud_divider));
    // Enable on trigger high, disable on compare, start and stop bits enabled.
    regs.set_timer_config(
        scl_timer,
        TimerConfig::new_with_raw_value(0)
            .with_timout(u2::new(0b10))
            .with_tdis(u3::new(0b010))
            .with_tena(u3::new(0b010))
            .with_tstop(u2::new(0b10))
            .with_tstart(true),
    );
    regs.set_timer_control(
        scl_timer,
        TimerControl::new_with_raw_value(0)
            .with_trgsel(tx_trigger(cfg.tx_shifter))
            .with_trgpol(true)
            .with_trgsrc(true)
            .with_pincfg(PinConfig::OpenDrainOrBidirectional)
            .with_pinsel(scl)
            .with_tmod(TimerMode::DualBaud8Bit),
    );

    let control_timer = cfg.control_timer as usize;
    regs.set_timer_compare(
        control_timer,
        TimerCompare::new_with_raw_value(0).with_cmp(0x0F),
    );
    // Decrement on the SCL pin, enable and disable together with the SCL timer.
    regs.set_timer_config(
        control_timer,
        TimerConfig::new_with_raw_value(0)
            .with_tdec(u2::new(0b10))
            .with_tdis(u3::new(0b001))
            .with_tena(u3::new(0b001))
            .with_tstop(u2::new(0b01))
            .with_tstart(true),
    );
    regs.set_timer_control(
        control_timer,
        TimerControl::new_with_raw_value(0)
            .with_trgsel(tx_trigger(cfg.tx_shifter))
            .with_trgpol(true)
            .with_trgsrc(true)
            .with_pincfg(PinConfig::OutputDisabled)
            .with_pinsel(scl)
            .with_pinpol(true)
            .with_tmod(TimerMode::Counter16Bit),
    );
}

/// Flags of one channel which need service.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Pending {
    rx: bool,
    tx: bool,
    timer: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SoftTransfer {
    transfer: Transfer,
    mode: TransferMode,
    /// Data frames loaded into the transmit shifter.
    fed: usize,
    /// Frames read back by the receive shifter, the address frame included.
    read_back: usize,
    stop_written: bool,
    /// Receive fill frames are being loaded by DMA.
    dma_fill: bool,
}

impl SoftTransfer {
    const fn new(transfer: Transfer, mode: TransferMode) -> Self {
        Self {
            transfer,
            mode,
            fed: 0,
            read_back: 0,
            stop_written: false,
            dma_fill: false,
        }
    }
}

/// One emulated master.
pub struct FlexioChannel {
    sub_channel: u8,
    setup: Option<FlexioUnitConfig>,
    xfer: Option<SoftTransfer>,
    /// Frames of a DMA transfer.
    aux: [u8; AUX_LEN],
    /// Sink of the read back frames of a DMA send.
    scratch: u8,
}

impl FlexioChannel {
    const fn new(sub_channel: u8) -> Self {
        Self {
            sub_channel,
            setup: None,
            xfer: None,
            aux: [0; AUX_LEN],
            scratch: 0,
        }
    }

    #[inline]
    const fn hw_unit(&self) -> HwUnit {
        HwUnit::Flexio(self.sub_channel)
    }

    fn init<F: FlexioRegisters>(&mut self, regs: &mut F, cfg: FlexioUnitConfig) {
        self.disable(regs, &cfg);
        configure_channel(regs, &cfg);
        regs.clear_shifter_errors(cfg.shifter_mask());
        regs.clear_timer_status(cfg.timer_mask());
        self.setup = Some(cfg);
        self.xfer = None;
        log::debug!(
            "soft I2C channel {}: SDA pin {} SCL pin {} baud divider {}",
            self.sub_channel,
            cfg.sda_pin,
            cfg.scl_pin,
            cfg.baud_divider
        );
    }

    fn deinit<F: FlexioRegisters>(&mut self, regs: &mut F) {
        if let Some(cfg) = self.setup.take() {
            self.disable(regs, &cfg);
        }
        self.xfer = None;
    }

    /// Mask interrupts and DMA requests of the channel and switch off its resources.
    fn disable<F: FlexioRegisters>(&mut self, regs: &mut F, cfg: &FlexioUnitConfig) {
        enable_status_interrupts(regs, cfg.shifter_mask(), false);
        enable_timer_interrupts(regs, cfg.timer_mask(), false);
        enable_shifter_dma(regs, cfg.shifter_mask(), false);
        regs.set_timer_control(cfg.scl_timer as usize, TimerControl::new_with_raw_value(0));
        regs.set_timer_control(
            cfg.control_timer as usize,
            TimerControl::new_with_raw_value(0),
        );
        regs.set_shifter_control(
            cfg.tx_shifter as usize,
            ShifterControl::new_with_raw_value(0),
        );
        regs.set_shifter_control(
            cfg.rx_shifter as usize,
            ShifterControl::new_with_raw_value(0),
        );
    }

    /// Drop frames left in the receive shifter.
    fn flush_rx<F: FlexioRegisters>(regs: &mut F, cfg: &FlexioUnitConfig) {
        let rx_bit = bit(cfg.rx_shifter);
        for _ in 0..AUX_LEN {
            if regs.shifter_status() & rx_bit == 0 {
                break;
            }
            regs.read_rx_buffer(cfg.rx_shifter as usize);
        }
    }

    fn start<F: FlexioRegisters>(
        &mut self,
        regs: &mut F,
        transfer: Transfer,
        mode: TransferMode,
        env: &mut Env<'_>,
    ) {
        let Some(cfg) = self.setup else {
            log::warn!("soft I2C channel {}: transfer on unconfigured channel", self.sub_channel);
            return;
        };
        let SlaveAddress::SevenBit(address) = transfer.address else {
            return;
        };
        regs.clear_shifter_errors(cfg.shifter_mask());
        regs.clear_timer_status(bit(cfg.scl_timer));
        Self::flush_rx(regs, &cfg);
        // An expected address NACK must not raise a receive shifter error.
        let rx_stop = if transfer.expect_nack {
            StopBit::Disabled
        } else {
            StopBit::Low
        };
        set_stop_bits(regs, &cfg, StopBit::High, rx_stop);
        regs.set_timer_compare(
            cfg.scl_timer as usize,
            timer_compare(transfer.len, cfg.baud_divider),
        );
        self.xfer = Some(SoftTransfer::new(transfer, mode));
        let address_byte = AddressByte::for_address(address, transfer.direction()).raw_value();
        log::debug!(
            "soft I2C channel {}: {:?} of {} bytes, address {:#04x}, {:?}",
            self.sub_channel,
            transfer.direction(),
            transfer.len,
            address.value(),
            mode
        );
        match mode {
            TransferMode::Sync => {
                regs.write_tx_buffer(cfg.tx_shifter as usize, address_byte);
                self.run_blocking(regs, env);
            }
            TransferMode::Interrupt => {
                regs.write_tx_buffer(cfg.tx_shifter as usize, address_byte);
                self.enable_interrupts(regs, &cfg);
            }
            TransferMode::Dma => dma::start(self, regs, address_byte, env),
        }
    }

    fn enable_interrupts<F: FlexioRegisters>(&mut self, regs: &mut F, cfg: &FlexioUnitConfig) {
        enable_status_interrupts(regs, cfg.shifter_mask(), true);
        enable_timer_interrupts(regs, bit(cfg.scl_timer), true);
    }

    /// Flags of the channel, restricted to `status_enable` and `timer_enable`.
    fn pending<F: FlexioRegisters>(
        &self,
        regs: &mut F,
        status_enable: u32,
        timer_enable: u32,
    ) -> Pending {
        let Some(cfg) = self.setup else {
            return Pending::default();
        };
        let status = regs.shifter_status() & status_enable;
        let timers = regs.timer_status() & timer_enable;
        Pending {
            rx: status & bit(cfg.rx_shifter) != 0,
            tx: status & bit(cfg.tx_shifter) != 0,
            timer: timers & bit(cfg.scl_timer) != 0,
        }
    }

    /// Receive before transmit: the transmit shifter is only reloaded once the frame it
    /// clocked has been read back.
    fn service<F: FlexioRegisters>(&mut self, regs: &mut F, pending: Pending, env: &mut Env<'_>) {
        if pending.rx {
            self.on_rx(regs);
        }
        if pending.tx {
            self.on_tx_empty(regs, env);
        }
        if pending.timer {
            self.complete(regs, env);
        }
    }

    fn run_blocking<F: FlexioRegisters>(&mut self, regs: &mut F, env: &mut Env<'_>) {
        for _ in 0..env.poll_budget {
            let pending = self.pending(regs, u32::MAX, u32::MAX);
            self.service(regs, pending, env);
            if self.xfer.is_none() {
                return;
            }
        }
        self.abort(regs, BusError::Timeout, env);
    }

    fn on_tx_empty<F: FlexioRegisters>(&mut self, regs: &mut F, env: &mut Env<'_>) {
        let Some(cfg) = self.setup else {
            return;
        };
        if dma::start_fill(self, regs, env) {
            return;
        }
        let Some(xfer) = self.xfer.as_mut() else {
            return;
        };
        let tx = cfg.tx_shifter as usize;
        let len = xfer.transfer.len;
        if xfer.fed < len {
            let byte = match xfer.transfer.direction() {
                Direction::Send => {
                    if xfer.fed == 0 {
                        set_stop_bits(regs, &cfg, StopBit::High, StopBit::Low);
                    }
                    unsafe { xfer.transfer.send_byte(xfer.fed) }.unwrap_or(IDLE_BYTE)
                }
                Direction::Receive => {
                    if xfer.fed + 1 == len {
                        // NACK the last byte.
                        set_stop_bits(regs, &cfg, StopBit::High, StopBit::High);
                    } else {
                        set_stop_bits(regs, &cfg, StopBit::Low, StopBit::Low);
                    }
                    IDLE_BYTE
                }
            };
            regs.write_tx_buffer(tx, byte);
            xfer.fed += 1;
        } else if !xfer.stop_written {
            regs.write_tx_buffer(tx, STOP_BYTE);
            xfer.stop_written = true;
            enable_status_interrupts(regs, bit(cfg.tx_shifter), false);
        }
    }

    fn on_rx<F: FlexioRegisters>(&mut self, regs: &mut F) {
        let Some(cfg) = self.setup else {
            return;
        };
        let byte = regs.read_rx_buffer(cfg.rx_shifter as usize);
        let Some(xfer) = self.xfer.as_mut() else {
            return;
        };
        // The first frame read back is the address.
        if xfer.read_back > 0 && xfer.transfer.direction() == Direction::Receive {
            unsafe { xfer.transfer.store_byte(xfer.read_back - 1, byte) };
        }
        xfer.read_back += 1;
    }

    fn complete<F: FlexioRegisters>(&mut self, regs: &mut F, env: &mut Env<'_>) {
        let Some(cfg) = self.setup else {
            return;
        };
        regs.clear_timer_status(bit(cfg.scl_timer));
        enable_status_interrupts(regs, cfg.shifter_mask(), false);
        enable_timer_interrupts(regs, bit(cfg.scl_timer), false);
        enable_shifter_dma(regs, cfg.shifter_mask(), false);
        if self.xfer.is_some_and(|xfer| xfer.mode != TransferMode::Dma) {
            for _ in 0..AUX_LEN {
                if regs.shifter_status() & bit(cfg.rx_shifter) == 0 {
                    break;
                }
                self.on_rx(regs);
            }
        }
        let errors = regs.shifter_errors() & cfg.shifter_mask();
        if errors != 0 {
            regs.clear_shifter_errors(errors);
        }
        set_stop_bits(regs, &cfg, StopBit::High, StopBit::Low);
        let Some(mut xfer) = self.xfer.take() else {
            return;
        };
        let direction = xfer.transfer.direction();
        if xfer.mode == TransferMode::Dma {
            if let Some(channels) = cfg.dma {
                env.dma.disable(channels.tx);
                env.dma.disable(channels.rx);
            }
            if direction == Direction::Receive {
                let frames = self.aux.get(1..=xfer.transfer.len).unwrap_or(&[]);
                for (index, byte) in frames.iter().enumerate() {
                    unsafe { xfer.transfer.store_byte(index, *byte) };
                }
            }
        }
        if errors != 0 {
            log::warn!(
                "soft I2C channel {}: shifter error {:#x}, {:?} failed",
                self.sub_channel,
                errors,
                direction
            );
            env.emit(self.hw_unit(), EventKind::Fault(BusError::ShifterError));
        } else {
            log::debug!(
                "soft I2C channel {}: {:?} of {} bytes done",
                self.sub_channel,
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

    /// Stop a transfer which did not complete and restore the idle configuration.
    fn abort<F: FlexioRegisters>(&mut self, regs: &mut F, error: BusError, env: &mut Env<'_>) {
        let Some(cfg) = self.setup else {
            return;
        };
        self.disable(regs, &cfg);
        if self.xfer.is_some_and(|xfer| xfer.mode == TransferMode::Dma) {
            if let Some(channels) = cfg.dma {
                env.dma.disable(channels.tx);
                env.dma.disable(channels.rx);
            }
        }
        configure_channel(regs, &cfg);
        regs.clear_shifter_errors(cfg.shifter_mask());
        regs.clear_timer_status(cfg.timer_mask());
        Self::flush_rx(regs, &cfg);
        self.xfer = None;
        log::warn!("soft I2C channel {}: transfer aborted: {}", self.sub_channel, error);
        env.emit(self.hw_unit(), EventKind::Fault(error));
    }

    fn poll_errors<F: FlexioRegisters>(&mut self, regs: &mut F, env: &mut Env<'_>) {
        let Some(cfg) = self.setup else {
            return;
        };
        if self.xfer.is_some() {
            return;
        }
        let errors = regs.shifter_errors() & cfg.shifter_mask();
        if errors != 0 {
            regs.clear_shifter_errors(errors);
            log::warn!("soft I2C channel {}: shifter error while idle", self.sub_channel);
            env.emit(self.hw_unit(), EventKind::Fault(BusError::ShifterError));
        }
    }
}

/// The shift-timer block and its emulated masters.
pub struct FlexioEngine<F> {
    regs: F,
    channels: [FlexioChannel; FLEXIO_CHANNEL_COUNT],
}

impl<F: FlexioRegisters> FlexioEngine<F> {
    pub fn new(regs: F) -> Self {
        let mut sub_channel = 0;
        Self {
            regs,
            channels: core::array::from_fn(|_| {
                let channel = FlexioChannel::new(sub_channel);
                sub_channel += 1;
                channel
            }),
        }
    }

    #[inline]
    pub fn regs(&mut self) -> &mut F {
        &mut self.regs
    }

    fn any_configured(&self) -> bool {
        self.channels.iter().any(|channel| channel.setup.is_some())
    }
}

impl<F: FlexioRegisters> TransferEngine for FlexioEngine<F> {
    fn init_unit(&mut self, index: usize, config: &ChannelConfig) {
        let EngineConfig::Flexio(cfg) = config.engine else {
            return;
        };
        if !self.any_configured() {
            let param = self.regs.parameters();
            log::debug!(
                "shift-timer block: {} shifters, {} timers, {} pins",
                param.shifter_count(),
                param.timer_count(),
                param.pin_count()
            );
            let ctrl = self.regs.control();
            self.regs.set_control(ctrl.with_swrst(false).with_flexen(true));
        }
        if let Some(channel) = self.channels.get_mut(index) {
            channel.init(&mut self.regs, cfg);
        }
    }

    fn deinit_unit(&mut self, index: usize) {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.deinit(&mut self.regs);
        }
        if !self.any_configured() {
            self.regs.set_control(Control::new_with_raw_value(0));
        }
    }

    fn max_transfer_len(&self) -> usize {
        MAX_TRANSFER_LEN
    }

    /// 10-bit addressing is not supported. High-speed requests run at the configured speed.
    fn check_transfer(&self, transfer: &Transfer) -> Result<(), Error> {
        // Every frame sequence ends with the stop frame.
        if transfer.address.is_ten_bit() || transfer.no_stop || transfer.no_start {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    fn start(&mut self, index: usize, transfer: Transfer, mode: TransferMode, env: &mut Env<'_>) {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.start(&mut self.regs, transfer, mode, env);
        }
    }

    fn poll_errors(&mut self, index: usize, env: &mut Env<'_>) {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.poll_errors(&mut self.regs, env);
        }
    }

    fn prepare_slave_buffer(
        &mut self,
        _index: usize,
        _buffer: RawBufSliceMut,
    ) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn start_listening(&mut self, _index: usize, _env: &mut Env<'_>) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn on_dma_complete(&mut self, index: usize, dma_channel: u8, env: &mut Env<'_>) {
        if let Some(channel) = self.channels.get_mut(index) {
            dma::on_complete(channel, &mut self.regs, dma_channel, env);
        }
    }
}
