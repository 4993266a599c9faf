//! Simulated controller modules, shift-timer block, DMA engine and bus devices for the driver
//! tests.
//!
//! The bus is infinitely fast: a controller executes queued commands as soon as they are pushed
//! and a soft channel clocks a frame as soon as its transmit buffer is written. Interrupts and
//! DMA requests are only served by [Sim::run], which makes the asynchronous paths observable
//! between the start of a transfer and its completion.
extern crate std;

use std::{cell::RefCell, collections::VecDeque, rc::Rc, vec::Vec};

use arbitrary_int::{u3, u6, u11};
use mcu_i2c_regs::{
    flexio::{
        Control, FLEXIO_BASE_ADDR, Parameters as FlexioParameters, SHIFTBUFBBS_OFFSET,
        SHIFTBUFBIS_OFFSET, SHIFTER_COUNT, ShifterConfig, ShifterControl, ShifterMode, StopBit,
        TIMER_COUNT, TimerCompare, TimerConfig, TimerControl, TimerMode,
    },
    lpi2c::{
        Command, FifoControl, FifoStatus, LPI2C_0_BASE_ADDR, LPI2C_1_BASE_ADDR, MRDR_OFFSET,
        MTDR_OFFSET, MasterClockConfig, MasterConfig1, MasterConfig2, MasterConfig3,
        MasterControl, MasterDma, MasterInterrupts, MasterStatus, Parameters, ReceiveData,
        ReceivedAddress, SlaveAddressMatch, SlaveConfig1, SlaveControl, SlaveInterrupts,
        SlaveReceiveData, SlaveStatus, TransmitData,
    },
};

use crate::{
    BusError, ChannelConfig, EngineConfig, Hooks, I2c, LPI2C_MODULE_COUNT, LogicalChannel,
    MODULE_ID, Role, SlaveAddress,
    config::{AsyncMethod, DmaChannels, FlexioUnitConfig, Lpi2cUnitConfig},
    diag::{DemEventId, DemEventStatus, DemSink, DetErrorCode, DevErrorSink, Notifier, ServiceId},
    dma::{DmaService, TransferDescriptor},
    flexio::FlexioRegisters,
    lpi2c::{ClockConfig, Lpi2cRegisters},
    request::Direction,
};

/// Depth of both controller FIFOs.
pub const FIFO_DEPTH: usize = 4;
pub const DMA_CHANNELS: usize = 8;

const LPI2C_PARAMETERS: u32 = 0x0202;
/// 8 shifters, 8 timers, 32 pins, 4 triggers.
const FLEXIO_PARAMETERS: u32 = 0x0420_0808;
const EDGES_PER_FRAME: usize = 18;
const RUN_LIMIT: usize = 1000;
const PUMP_LIMIT: usize = 1000;

const MASTER_W1C: u32 = 0x7F00;
const SLAVE_W1C: u32 = 0x0F00;
const NDF: u32 = MasterStatus::new_with_raw_value(0).with_ndf(true).raw_value();
const SDF: u32 = MasterStatus::new_with_raw_value(0).with_sdf(true).raw_value();
const FEF: u32 = MasterStatus::new_with_raw_value(0).with_fef(true).raw_value();

pub type TestI2c<'a> = I2c<'a, SimLpi2c, SimFlexio, SimDma>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    /// Address or data byte sent by the master.
    Byte(u8),
    /// The previous byte was not acknowledged.
    Nack,
    /// Byte read by the master and the acknowledge it sent.
    Read { byte: u8, ack: bool },
    Stop,
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub address: SlaveAddress,
    pub read_data: VecDeque<u8>,
    pub written: Vec<u8>,
    pub nack_address: bool,
    pub nack_data: bool,
}

impl SimDevice {
    pub fn new(address: SlaveAddress) -> Self {
        Self {
            address,
            read_data: VecDeque::new(),
            written: Vec::new(),
            nack_address: false,
            nack_data: false,
        }
    }

    pub fn with_read_data(mut self, data: &[u8]) -> Self {
        self.read_data.extend(data.iter().copied());
        self
    }

    pub fn with_data_nack(mut self) -> Self {
        self.nack_data = true;
        self
    }
}

/// Bus lines: one per controller module, then one per shift-timer transmit shifter.
pub const LINE_COUNT: usize = LPI2C_MODULE_COUNT + SHIFTER_COUNT;

pub const fn lpi2c_line(module: usize) -> usize {
    module
}

/// Line of a soft sub-channel configured by [flexio_unit].
pub const fn flexio_line(sub_channel: usize) -> usize {
    LPI2C_MODULE_COUNT + 2 * sub_channel
}

/// State of one bus line.
#[derive(Debug, Default, Clone)]
struct Line {
    trace: Vec<BusEvent>,
    /// Addressed device and whether the master reads from it.
    selected: Option<(usize, bool)>,
    /// Upper address bits of a 10-bit header waiting for the low address byte.
    ten_bit_header: Option<u16>,
}

/// Devices reachable from every line and the trace of everything the masters did. Each line
/// keeps its own addressing state, transfers on different lines may overlap.
#[derive(Debug, Default)]
pub struct Bus {
    pub devices: Vec<SimDevice>,
    /// Events of all lines in the order they happened.
    pub trace: Vec<BusEvent>,
    lines: [Line; LINE_COUNT],
}

impl Bus {
    fn push(&mut self, line: usize, event: BusEvent) {
        self.trace.push(event);
        self.lines[line].trace.push(event);
    }

    pub fn line_trace(&self, line: usize) -> &[BusEvent] {
        &self.lines[line].trace
    }

    fn start(&mut self, line: usize) {
        self.push(line, BusEvent::Start);
    }

    /// First byte after a START. Returns whether a device acknowledged.
    fn address(&mut self, line: usize, byte: u8) -> bool {
        self.push(line, BusEvent::Byte(byte));
        let read = byte & 1 != 0;
        let acked = if byte & 0xF8 == 0xF0 {
            let upper = ((byte >> 1) & 0b11) as u16;
            if read {
                // Repeated START after the full 10-bit address.
                match self.lines[line].selected {
                    Some((index, _)) if self.ten_bit_upper(index) == Some(upper) => {
                        self.lines[line].selected = Some((index, true));
                        true
                    }
                    _ => false,
                }
            } else {
                self.lines[line].selected = None;
                self.lines[line].ten_bit_header = Some(upper);
                self.devices.iter().any(|device| {
                    !device.nack_address
                        && matches!(device.address,
                            SlaveAddress::TenBit(addr) if addr.value() >> 8 == upper)
                })
            }
        } else {
            self.lines[line].ten_bit_header = None;
            let address = (byte >> 1) as u16;
            let selected = self
                .find(|device| {
                    matches!(device.address,
                        SlaveAddress::SevenBit(addr) if addr.value() as u16 == address)
                })
                .map(|index| (index, read));
            self.lines[line].selected = selected;
            selected.is_some()
        };
        if !acked {
            self.push(line, BusEvent::Nack);
        }
        acked
    }

    /// Data byte written by the master. Returns whether it was acknowledged.
    fn write(&mut self, line: usize, byte: u8) -> bool {
        self.push(line, BusEvent::Byte(byte));
        let acked = if let Some(upper) = self.lines[line].ten_bit_header.take() {
            let address = (upper << 8) | byte as u16;
            let selected = self
                .find(|device| {
                    matches!(device.address, SlaveAddress::TenBit(addr) if addr.value() == address)
                })
                .map(|index| (index, false));
            self.lines[line].selected = selected;
            selected.is_some()
        } else {
            match self.lines[line].selected {
                Some((index, false)) => {
                    let device = &mut self.devices[index];
                    device.written.push(byte);
                    !device.nack_data
                }
                _ => false,
            }
        };
        if !acked {
            self.push(line, BusEvent::Nack);
        }
        acked
    }

    /// Byte read by the master, which answers with `ack`.
    fn read(&mut self, line: usize, ack: bool) -> u8 {
        let byte = match self.lines[line].selected {
            Some((index, true)) => self.devices[index].read_data.pop_front().unwrap_or(0xFF),
            _ => 0xFF,
        };
        self.push(line, BusEvent::Read { byte, ack });
        byte
    }

    fn stop(&mut self, line: usize) {
        self.push(line, BusEvent::Stop);
        self.lines[line].selected = None;
        self.lines[line].ten_bit_header = None;
    }

    fn clear_traces(&mut self) {
        self.trace.clear();
        for line in self.lines.iter_mut() {
            line.trace.clear();
        }
    }

    fn find(&self, matches: impl Fn(&SimDevice) -> bool) -> Option<usize> {
        self.devices
            .iter()
            .position(|device| !device.nack_address && matches(device))
    }

    fn ten_bit_upper(&self, index: usize) -> Option<u16> {
        match self.devices.get(index)?.address {
            SlaveAddress::TenBit(addr) => Some(addr.value() >> 8),
            SlaveAddress::SevenBit(_) => None,
        }
    }
}

/// One controller module. Registers are stored raw.
#[derive(Debug, Default)]
pub struct Lpi2cModel {
    pub mcr: u32,
    /// Write-1-to-clear master flags.
    pub msr: u32,
    pub mier: u32,
    pub mder: u32,
    pub mcfgr1: u32,
    pub mcfgr2: u32,
    pub mcfgr3: u32,
    pub mccr0: u32,
    pub mccr1: u32,
    pub mfcr: u32,
    pub commands: VecDeque<u32>,
    pub rx: VecDeque<u8>,
    pending_receive: usize,
    bus_active: bool,
    halted: bool,
    /// Commands are accepted but never executed, as with SCL held low.
    pub stall: bool,
    /// Number of software resets of the master logic.
    pub resets: usize,

    pub scr: u32,
    /// Write-1-to-clear slave flags.
    pub ssr: u32,
    pub sier: u32,
    pub scfgr1: u32,
    pub samr: u32,
    pending_address: Option<u8>,
    pub slave_rx: VecDeque<u8>,
    pub slave_tx: Vec<u8>,
    slave_reads: usize,
}

impl Lpi2cModel {
    fn master_status(&self) -> MasterStatus {
        let fcr = FifoControl::new_with_raw_value(self.mfcr);
        MasterStatus::new_with_raw_value(self.msr)
            .with_tdf(self.commands.len() <= fcr.txwater().value() as usize)
            .with_rdf(self.rx.len() > fcr.rxwater().value() as usize)
            .with_mbf(self.bus_active)
    }

    fn slave_status(&self) -> SlaveStatus {
        SlaveStatus::new_with_raw_value(self.ssr)
            .with_avf(self.pending_address.is_some())
            .with_rdf(!self.slave_rx.is_empty())
            .with_tdf(self.slave_reads > 0)
    }

    pub fn irq_pending(&self) -> bool {
        let master = self.master_status().raw_value() & self.mier != 0;
        let slave = SlaveControl::new_with_raw_value(self.scr).sen()
            && self.slave_status().raw_value() & self.sier & 0x0FFF != 0;
        master || slave
    }

    pub fn master_interrupts(&self) -> MasterInterrupts {
        MasterInterrupts::new_with_raw_value(self.mier)
    }

    pub fn slave_interrupts(&self) -> SlaveInterrupts {
        SlaveInterrupts::new_with_raw_value(self.sier)
    }

    fn nack(&mut self, bus: &mut Bus, line: usize) {
        // The controller ends the transfer with a STOP and halts until its FIFO is reset.
        bus.stop(line);
        self.bus_active = false;
        self.halted = true;
        self.msr |= NDF | SDF;
    }

    fn reset_master(&mut self) {
        self.msr = 0;
        self.mier = 0;
        self.mder = 0;
        self.mfcr = 0;
        self.commands.clear();
        self.rx.clear();
        self.pending_receive = 0;
        self.bus_active = false;
        self.halted = false;
        self.resets += 1;
    }

    fn reset_slave(&mut self) {
        self.ssr = 0;
        self.pending_address = None;
        self.slave_rx.clear();
        self.slave_reads = 0;
    }
}

/// The shift-timer block. Registers are stored raw.
#[derive(Debug, Default)]
pub struct FlexioModel {
    pub ctrl: u32,
    pub shifterr: u32,
    pub timstat: u32,
    pub shiftsien: u32,
    pub shifteien: u32,
    pub timien: u32,
    pub shiftsden: u32,
    pub shiftctl: [u32; SHIFTER_COUNT],
    pub shiftcfg: [u32; SHIFTER_COUNT],
    pub timctl: [u32; TIMER_COUNT],
    pub timcfg: [u32; TIMER_COUNT],
    pub timcmp: [u32; TIMER_COUNT],
    rx_full: u32,
    rx_buf: [u8; SHIFTER_COUNT],
    /// Frames left before the STOP, per running SCL timer.
    frames_left: [Option<usize>; TIMER_COUNT],
    reading: [bool; TIMER_COUNT],
    /// Frames are never clocked.
    pub stall: bool,
    /// Number of software resets of the block.
    pub resets: usize,
}

impl FlexioModel {
    fn shifter_control(&self, shifter: usize) -> ShifterControl {
        ShifterControl::new_with_raw_value(self.shiftctl[shifter])
    }

    pub fn shiftstat(&self) -> u32 {
        (0..SHIFTER_COUNT).fold(0, |flags, shifter| {
            let set = match self.shifter_control(shifter).smod() {
                ShifterMode::Transmit => !self.stall,
                ShifterMode::Receive => self.rx_full & (1 << shifter) != 0,
                _ => false,
            };
            if set { flags | (1 << shifter) } else { flags }
        })
    }

    fn scl_timer_of(&self, tx: usize) -> Option<usize> {
        (0..TIMER_COUNT).find(|&timer| {
            let ctl = TimerControl::new_with_raw_value(self.timctl[timer]);
            ctl.tmod() == TimerMode::DualBaud8Bit && ctl.trgsel().value() as usize == tx * 4 + 1
        })
    }

    fn receiver_of(&self, tx: usize) -> Option<usize> {
        let pin = self.shifter_control(tx).pinsel();
        (0..SHIFTER_COUNT).find(|&shifter| {
            let ctl = self.shifter_control(shifter);
            ctl.smod() == ShifterMode::Receive && ctl.pinsel() == pin
        })
    }

    fn reset(&mut self) {
        let ctrl = self.ctrl;
        let stall = self.stall;
        let resets = self.resets + 1;
        *self = Self::default();
        self.ctrl = ctrl;
        self.stall = stall;
        self.resets = resets;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DmaChannelModel {
    pub descriptor: Option<TransferDescriptor>,
    pub enabled: bool,
    pub notify: bool,
    pub moved: usize,
}

#[derive(Debug, Default)]
pub struct DmaModel {
    pub channels: [DmaChannelModel; DMA_CHANNELS],
    pub configured: Vec<(u8, TransferDescriptor)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    Lpi2cTx(usize),
    Lpi2cRx(usize),
    FlexioTx(usize),
    FlexioRx(usize),
}

pub const fn lpi2c_base(module: usize) -> usize {
    if module == 0 {
        LPI2C_0_BASE_ADDR
    } else {
        LPI2C_1_BASE_ADDR
    }
}

const fn flexio_tx_address(shifter: usize) -> usize {
    FLEXIO_BASE_ADDR + SHIFTBUFBBS_OFFSET + 4 * shifter
}

const fn flexio_rx_address(shifter: usize) -> usize {
    FLEXIO_BASE_ADDR + SHIFTBUFBIS_OFFSET + 4 * shifter
}

fn port(address: usize) -> Option<Port> {
    for module in 0..LPI2C_MODULE_COUNT {
        if address == lpi2c_base(module) + MTDR_OFFSET {
            return Some(Port::Lpi2cTx(module));
        }
        if address == lpi2c_base(module) + MRDR_OFFSET {
            return Some(Port::Lpi2cRx(module));
        }
    }
    for shifter in 0..SHIFTER_COUNT {
        if address == flexio_tx_address(shifter) {
            return Some(Port::FlexioTx(shifter));
        }
        if address == flexio_rx_address(shifter) {
            return Some(Port::FlexioRx(shifter));
        }
    }
    None
}

#[derive(Debug, Default)]
pub struct World {
    pub lpi2c: [Lpi2cModel; LPI2C_MODULE_COUNT],
    pub flexio: FlexioModel,
    pub dma: DmaModel,
    pub bus: Bus,
}

impl World {
    fn lpi2c_set_control(&mut self, module: usize, value: MasterControl) {
        let model = &mut self.lpi2c[module];
        if value.rst() {
            model.reset_master();
        }
        if value.rtf() {
            model.commands.clear();
            model.halted = false;
        }
        if value.rrf() {
            model.rx.clear();
        }
        model.mcr = value
            .with_rst(false)
            .with_rtf(false)
            .with_rrf(false)
            .raw_value();
        self.lpi2c_process(module);
    }

    fn lpi2c_push(&mut self, module: usize, command: TransmitData) {
        let model = &mut self.lpi2c[module];
        if model.commands.len() >= FIFO_DEPTH {
            return;
        }
        model.commands.push_back(command.raw_value());
        self.lpi2c_process(module);
    }

    fn lpi2c_pop(&mut self, module: usize) -> ReceiveData {
        let data = match self.lpi2c[module].rx.pop_front() {
            Some(byte) => ReceiveData::new_with_raw_value(0).with_data(byte),
            None => ReceiveData::new_with_raw_value(0).with_rxempty(true),
        };
        self.lpi2c_process(module);
        data
    }

    /// Clear a stall and execute the commands queued meanwhile.
    pub fn release_lpi2c(&mut self, module: usize) {
        self.lpi2c[module].stall = false;
        self.lpi2c_process(module);
    }

    /// Execute queued commands until the FIFO is empty or the receive FIFO is full.
    fn lpi2c_process(&mut self, module: usize) {
        let World { lpi2c, bus, .. } = self;
        let model = &mut lpi2c[module];
        let line = lpi2c_line(module);
        loop {
            if model.stall || model.halted || !MasterControl::new_with_raw_value(model.mcr).men()
            {
                return;
            }
            if model.pending_receive > 0 {
                if model.rx.len() >= FIFO_DEPTH {
                    return;
                }
                let more = model.pending_receive > 1
                    || model.commands.front().is_some_and(|raw| {
                        TransmitData::new_with_raw_value(*raw).cmd() == Command::Receive
                    });
                let byte = bus.read(line, more);
                model.rx.push_back(byte);
                model.pending_receive -= 1;
                continue;
            }
            let Some(raw) = model.commands.pop_front() else {
                return;
            };
            let command = TransmitData::new_with_raw_value(raw);
            match command.cmd() {
                Command::Start
                | Command::StartExpectNack
                | Command::StartHighSpeed
                | Command::StartHighSpeedExpectNack => {
                    let expect_nack = matches!(
                        command.cmd(),
                        Command::StartExpectNack | Command::StartHighSpeedExpectNack
                    );
                    bus.start(line);
                    model.bus_active = true;
                    if !bus.address(line, command.data()) && !expect_nack {
                        model.nack(bus, line);
                    }
                }
                Command::Transmit => {
                    if !model.bus_active {
                        model.msr |= FEF;
                    } else if !bus.write(line, command.data()) {
                        model.nack(bus, line);
                    }
                }
                Command::Receive | Command::ReceiveDiscard => {
                    if model.bus_active {
                        model.pending_receive = command.data() as usize + 1;
                    } else {
                        model.msr |= FEF;
                    }
                }
                Command::Stop => {
                    if model.bus_active {
                        bus.stop(line);
                        model.bus_active = false;
                        model.msr |= SDF;
                    }
                }
            }
        }
    }

    fn flexio_set_control(&mut self, value: Control) {
        if value.swrst() {
            self.flexio.reset();
        }
        self.flexio.ctrl = value.raw_value();
    }

    fn flexio_set_timer_control(&mut self, timer: usize, value: TimerControl) {
        if value.tmod() == TimerMode::Disabled {
            self.flexio.frames_left[timer] = None;
        }
        self.flexio.timctl[timer] = value.raw_value();
    }

    fn flexio_read(&mut self, shifter: usize) -> u8 {
        self.flexio.rx_full &= !(1 << shifter);
        self.flexio.rx_buf[shifter]
    }

    /// Clock the frame loaded into transmit shifter `tx`.
    fn flexio_write(&mut self, tx: usize, byte: u8) {
        let fx = &self.flexio;
        if fx.stall || !Control::new_with_raw_value(fx.ctrl).flexen() {
            return;
        }
        let Some(timer) = fx.scl_timer_of(tx) else {
            return;
        };
        let rx = fx.receiver_of(tx);
        let line = LPI2C_MODULE_COUNT + tx;
        let cmp = TimerCompare::new_with_raw_value(fx.timcmp[timer]).cmp();
        let frames_left = fx.frames_left[timer];
        match frames_left {
            None => {
                let frames = (cmp >> 8) as usize / EDGES_PER_FRAME;
                self.bus.start(line);
                self.flexio.reading[timer] = byte & 1 != 0;
                self.flexio.frames_left[timer] = Some(frames);
                self.flexio_frame(tx, rx, timer, byte, true);
            }
            Some(0) => {
                self.bus.stop(line);
                self.flexio.frames_left[timer] = None;
                self.flexio.timstat |= 1 << timer;
            }
            Some(_) => self.flexio_frame(tx, rx, timer, byte, false),
        }
    }

    fn flexio_frame(&mut self, tx: usize, rx: Option<usize>, timer: usize, byte: u8, first: bool) {
        if let Some(left) = self.flexio.frames_left[timer].as_mut() {
            *left = left.saturating_sub(1);
        }
        // A high stop bit releases SDA during the ACK slot.
        let released =
            ShifterConfig::new_with_raw_value(self.flexio.shiftcfg[tx]).sstop() == StopBit::High;
        let line = LPI2C_MODULE_COUNT + tx;
        let (data, slot_high) = if first {
            let acked = self.bus.address(line, byte);
            (byte, released && !acked)
        } else if self.flexio.reading[timer] {
            (self.bus.read(line, !released), released)
        } else {
            let acked = self.bus.write(line, byte);
            (byte, released && !acked)
        };
        let Some(rx) = rx else {
            return;
        };
        let fx = &mut self.flexio;
        let mismatch = match ShifterConfig::new_with_raw_value(fx.shiftcfg[rx]).sstop() {
            StopBit::Low => slot_high,
            StopBit::High => !slot_high,
            StopBit::Disabled | StopBit::Reserved => false,
        };
        if mismatch || fx.rx_full & (1 << rx) != 0 {
            fx.shifterr |= 1 << rx;
        }
        fx.rx_buf[rx] = data;
        fx.rx_full |= 1 << rx;
    }

    pub fn flexio_irq(&self) -> bool {
        let fx = &self.flexio;
        (fx.shiftstat() & fx.shiftsien) | (fx.shifterr & fx.shifteien) | (fx.timstat & fx.timien)
            != 0
    }

    fn port_ready(&self, port: Port) -> bool {
        match port {
            Port::Lpi2cTx(module) => {
                let model = &self.lpi2c[module];
                MasterDma::new_with_raw_value(model.mder).tdde() && model.master_status().tdf()
            }
            Port::Lpi2cRx(module) => {
                let model = &self.lpi2c[module];
                MasterDma::new_with_raw_value(model.mder).rdde() && model.master_status().rdf()
            }
            Port::FlexioTx(shifter) | Port::FlexioRx(shifter) => {
                let fx = &self.flexio;
                fx.shiftsden & fx.shiftstat() & (1 << shifter) != 0
            }
        }
    }

    fn dma_ready(&self, descriptor: &TransferDescriptor) -> bool {
        match port(descriptor.source.address()).or(port(descriptor.destination.address())) {
            Some(port) => self.port_ready(port),
            None => true,
        }
    }

    fn next_dma_request(&self) -> Option<usize> {
        // Reads from peripherals first, the bus never waits for a receive request.
        let ready = |from_peripheral: bool| {
            (0..DMA_CHANNELS).find(|&channel| {
                let model = &self.dma.channels[channel];
                let Some(descriptor) = model.descriptor else {
                    return false;
                };
                model.enabled
                    && model.moved < descriptor.total_bytes()
                    && port(descriptor.source.address()).is_some() == from_peripheral
                    && self.dma_ready(&descriptor)
            })
        };
        ready(true).or_else(|| ready(false))
    }

    fn dma_read(&mut self, address: usize) -> u8 {
        match port(address) {
            Some(Port::Lpi2cRx(module)) => self.lpi2c_pop(module).data(),
            Some(Port::FlexioRx(shifter)) => self.flexio_read(shifter),
            _ => unsafe { core::ptr::read_volatile(address as *const u8) },
        }
    }

    fn dma_write(&mut self, address: usize, byte: u8) {
        match port(address) {
            Some(Port::Lpi2cTx(module)) => {
                self.lpi2c_push(module, TransmitData::new_with_raw_value(byte as u32))
            }
            Some(Port::FlexioTx(shifter)) => self.flexio_write(shifter, byte),
            _ => unsafe { core::ptr::write_volatile(address as *mut u8, byte) },
        }
    }

    /// Move one minor loop. Returns true if the descriptor completed with notification.
    fn dma_burst(&mut self, channel: usize) -> bool {
        let model = self.dma.channels[channel];
        let Some(descriptor) = model.descriptor else {
            return false;
        };
        for index in 0..descriptor.minor_bytes {
            let offset = model.moved + index;
            let byte = self.dma_read(descriptor.source.address_at(offset));
            self.dma_write(descriptor.destination.address_at(offset), byte);
        }
        let model = &mut self.dma.channels[channel];
        model.moved += descriptor.minor_bytes;
        if model.moved >= descriptor.total_bytes() {
            model.enabled = false;
            return model.notify;
        }
        false
    }

    /// Serve DMA requests until none is pending. Returns whether anything moved and the
    /// channels which completed with notification.
    pub fn pump_dma(&mut self) -> (bool, Vec<u8>) {
        let mut moved = false;
        let mut completed = Vec::new();
        for _ in 0..PUMP_LIMIT {
            let Some(channel) = self.next_dma_request() else {
                break;
            };
            moved = true;
            if self.dma_burst(channel) {
                completed.push(channel as u8);
            }
        }
        (moved, completed)
    }
}

type Shared = Rc<RefCell<World>>;

pub struct SimLpi2c {
    world: Shared,
    module: usize,
}

impl Lpi2cRegisters for SimLpi2c {
    fn parameters(&mut self) -> Parameters {
        Parameters::new_with_raw_value(LPI2C_PARAMETERS)
    }

    fn master_control(&mut self) -> MasterControl {
        MasterControl::new_with_raw_value(self.world.borrow().lpi2c[self.module].mcr)
    }

    fn set_master_control(&mut self, value: MasterControl) {
        self.world.borrow_mut().lpi2c_set_control(self.module, value);
    }

    fn master_status(&mut self) -> MasterStatus {
        self.world.borrow().lpi2c[self.module].master_status()
    }

    fn clear_master_status(&mut self, flags: MasterStatus) {
        self.world.borrow_mut().lpi2c[self.module].msr &= !(flags.raw_value() & MASTER_W1C);
    }

    fn master_interrupts(&mut self) -> MasterInterrupts {
        self.world.borrow().lpi2c[self.module].master_interrupts()
    }

    fn set_master_interrupts(&mut self, value: MasterInterrupts) {
        self.world.borrow_mut().lpi2c[self.module].mier = value.raw_value();
    }

    fn set_master_dma(&mut self, value: MasterDma) {
        self.world.borrow_mut().lpi2c[self.module].mder = value.raw_value();
    }

    fn set_master_config(&mut self, cfg1: MasterConfig1, cfg2: MasterConfig2, cfg3: MasterConfig3) {
        let mut world = self.world.borrow_mut();
        let model = &mut world.lpi2c[self.module];
        model.mcfgr1 = cfg1.raw_value();
        model.mcfgr2 = cfg2.raw_value();
        model.mcfgr3 = cfg3.raw_value();
    }

    fn set_clock_config(&mut self, normal: MasterClockConfig, high_speed: MasterClockConfig) {
        let mut world = self.world.borrow_mut();
        let model = &mut world.lpi2c[self.module];
        model.mccr0 = normal.raw_value();
        model.mccr1 = high_speed.raw_value();
    }

    fn set_fifo_control(&mut self, value: FifoControl) {
        self.world.borrow_mut().lpi2c[self.module].mfcr = value.raw_value();
    }

    fn fifo_status(&mut self) -> FifoStatus {
        let world = self.world.borrow();
        let model = &world.lpi2c[self.module];
        FifoStatus::new_with_raw_value(0)
            .with_txcount(u3::new(model.commands.len() as u8))
            .with_rxcount(u3::new(model.rx.len() as u8))
    }

    fn push_command(&mut self, command: TransmitData) {
        self.world.borrow_mut().lpi2c_push(self.module, command);
    }

    fn pop_data(&mut self) -> ReceiveData {
        self.world.borrow_mut().lpi2c_pop(self.module)
    }

    fn slave_control(&mut self) -> SlaveControl {
        SlaveControl::new_with_raw_value(self.world.borrow().lpi2c[self.module].scr)
    }

    fn set_slave_control(&mut self, value: SlaveControl) {
        let mut world = self.world.borrow_mut();
        let model = &mut world.lpi2c[self.module];
        if value.rst() {
            model.reset_slave();
        }
        if value.rtf() || value.rrf() {
            model.slave_rx.clear();
        }
        model.scr = value
            .with_rst(false)
            .with_rtf(false)
            .with_rrf(false)
            .raw_value();
    }

    fn slave_status(&mut self) -> SlaveStatus {
        self.world.borrow().lpi2c[self.module].slave_status()
    }

    fn clear_slave_status(&mut self, flags: SlaveStatus) {
        self.world.borrow_mut().lpi2c[self.module].ssr &= !(flags.raw_value() & SLAVE_W1C);
    }

    fn slave_interrupts(&mut self) -> SlaveInterrupts {
        self.world.borrow().lpi2c[self.module].slave_interrupts()
    }

    fn set_slave_interrupts(&mut self, value: SlaveInterrupts) {
        self.world.borrow_mut().lpi2c[self.module].sier = value.raw_value();
    }

    fn set_slave_config(&mut self, cfg1: SlaveConfig1, address: SlaveAddressMatch) {
        let mut world = self.world.borrow_mut();
        let model = &mut world.lpi2c[self.module];
        model.scfgr1 = cfg1.raw_value();
        model.samr = address.raw_value();
    }

    fn received_address(&mut self) -> ReceivedAddress {
        match self.world.borrow_mut().lpi2c[self.module].pending_address.take() {
            Some(byte) => ReceivedAddress::new_with_raw_value(0).with_raddr(u11::new(byte as u16)),
            None => ReceivedAddress::new_with_raw_value(0).with_anv(true),
        }
    }

    fn push_slave_data(&mut self, byte: u8) {
        let mut world = self.world.borrow_mut();
        let model = &mut world.lpi2c[self.module];
        model.slave_tx.push(byte);
        model.slave_reads = model.slave_reads.saturating_sub(1);
    }

    fn pop_slave_data(&mut self) -> SlaveReceiveData {
        match self.world.borrow_mut().lpi2c[self.module].slave_rx.pop_front() {
            Some(byte) => SlaveReceiveData::new_with_raw_value(0).with_data(byte),
            None => SlaveReceiveData::new_with_raw_value(0).with_rxempty(true),
        }
    }

    fn transmit_data_address(&self) -> usize {
        lpi2c_base(self.module) + MTDR_OFFSET
    }

    fn receive_data_address(&self) -> usize {
        lpi2c_base(self.module) + MRDR_OFFSET
    }
}

pub struct SimFlexio {
    world: Shared,
}

impl FlexioRegisters for SimFlexio {
    fn parameters(&mut self) -> FlexioParameters {
        FlexioParameters::new_with_raw_value(FLEXIO_PARAMETERS)
    }

    fn control(&mut self) -> Control {
        Control::new_with_raw_value(self.world.borrow().flexio.ctrl)
    }

    fn set_control(&mut self, value: Control) {
        self.world.borrow_mut().flexio_set_control(value);
    }

    fn shifter_status(&mut self) -> u32 {
        self.world.borrow().flexio.shiftstat()
    }

    fn shifter_errors(&mut self) -> u32 {
        self.world.borrow().flexio.shifterr
    }

    fn clear_shifter_errors(&mut self, mask: u32) {
        self.world.borrow_mut().flexio.shifterr &= !mask;
    }

    fn timer_status(&mut self) -> u32 {
        self.world.borrow().flexio.timstat
    }

    fn clear_timer_status(&mut self, mask: u32) {
        self.world.borrow_mut().flexio.timstat &= !mask;
    }

    fn shifter_status_interrupts(&mut self) -> u32 {
        self.world.borrow().flexio.shiftsien
    }

    fn set_shifter_status_interrupts(&mut self, mask: u32) {
        self.world.borrow_mut().flexio.shiftsien = mask;
    }

    fn timer_interrupts(&mut self) -> u32 {
        self.world.borrow().flexio.timien
    }

    fn set_timer_interrupts(&mut self, mask: u32) {
        self.world.borrow_mut().flexio.timien = mask;
    }

    fn shifter_dma(&mut self) -> u32 {
        self.world.borrow().flexio.shiftsden
    }

    fn set_shifter_dma(&mut self, mask: u32) {
        self.world.borrow_mut().flexio.shiftsden = mask;
    }

    fn shifter_config(&mut self, shifter: usize) -> ShifterConfig {
        ShifterConfig::new_with_raw_value(self.world.borrow().flexio.shiftcfg[shifter])
    }

    fn set_shifter_config(&mut self, shifter: usize, value: ShifterConfig) {
        self.world.borrow_mut().flexio.shiftcfg[shifter] = value.raw_value();
    }

    fn set_shifter_control(&mut self, shifter: usize, value: ShifterControl) {
        self.world.borrow_mut().flexio.shiftctl[shifter] = value.raw_value();
    }

    fn set_timer_control(&mut self, timer: usize, value: TimerControl) {
        self.world.borrow_mut().flexio_set_timer_control(timer, value);
    }

    fn set_timer_config(&mut self, timer: usize, value: TimerConfig) {
        self.world.borrow_mut().flexio.timcfg[timer] = value.raw_value();
    }

    fn set_timer_compare(&mut self, timer: usize, value: TimerCompare) {
        self.world.borrow_mut().flexio.timcmp[timer] = value.raw_value();
    }

    fn write_tx_buffer(&mut self, shifter: usize, byte: u8) {
        self.world.borrow_mut().flexio_write(shifter, byte);
    }

    fn read_rx_buffer(&mut self, shifter: usize) -> u8 {
        self.world.borrow_mut().flexio_read(shifter)
    }

    fn tx_buffer_address(&self, shifter: usize) -> usize {
        flexio_tx_address(shifter)
    }

    fn rx_buffer_address(&self, shifter: usize) -> usize {
        flexio_rx_address(shifter)
    }
}

pub struct SimDma {
    world: Shared,
}

impl DmaService for SimDma {
    fn configure(&mut self, channel: u8, descriptor: &TransferDescriptor) {
        let mut world = self.world.borrow_mut();
        world.dma.channels[channel as usize] = DmaChannelModel {
            descriptor: Some(*descriptor),
            ..Default::default()
        };
        world.dma.configured.push((channel, *descriptor));
    }

    fn enable(&mut self, channel: u8) {
        self.world.borrow_mut().dma.channels[channel as usize].enabled = true;
    }

    fn disable(&mut self, channel: u8) {
        self.world.borrow_mut().dma.channels[channel as usize].enabled = false;
    }

    fn enable_notification(&mut self, channel: u8) {
        self.world.borrow_mut().dma.channels[channel as usize].notify = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Note {
    MasterTransmit { channel: LogicalChannel, bytes: usize },
    MasterReceive { channel: LogicalChannel, bytes: usize },
    SlaveTransmit { channel: LogicalChannel, bytes: usize },
    SlaveReceive { channel: LogicalChannel, bytes: usize },
    AddressMatch { channel: LogicalChannel, direction: Direction },
    Error { channel: LogicalChannel, error: BusError },
}

/// Records notifications, development errors and diagnostic events.
#[derive(Debug, Default)]
pub struct Recorder {
    notes: RefCell<Vec<Note>>,
    det: RefCell<Vec<(ServiceId, DetErrorCode)>>,
    dem: RefCell<Vec<(DemEventId, DemEventStatus)>>,
}

impl Recorder {
    pub fn hooks(&self) -> Hooks<'_> {
        Hooks {
            notifier: self,
            det: self,
            dem: self,
        }
    }

    pub fn notes(&self) -> Vec<Note> {
        self.notes.borrow().clone()
    }

    pub fn det(&self) -> Vec<(ServiceId, DetErrorCode)> {
        self.det.borrow().clone()
    }

    pub fn dem(&self) -> Vec<(DemEventId, DemEventStatus)> {
        self.dem.borrow().clone()
    }
}

impl Notifier for Recorder {
    fn master_transmit_complete(&self, channel: LogicalChannel, bytes: usize) {
        self.notes
            .borrow_mut()
            .push(Note::MasterTransmit { channel, bytes });
    }

    fn master_receive_complete(&self, channel: LogicalChannel, bytes: usize) {
        self.notes
            .borrow_mut()
            .push(Note::MasterReceive { channel, bytes });
    }

    fn slave_transmit_complete(&self, channel: LogicalChannel, bytes: usize) {
        self.notes
            .borrow_mut()
            .push(Note::SlaveTransmit { channel, bytes });
    }

    fn slave_receive_complete(&self, channel: LogicalChannel, bytes: usize) {
        self.notes
            .borrow_mut()
            .push(Note::SlaveReceive { channel, bytes });
    }

    fn slave_address_match(&self, channel: LogicalChannel, direction: Direction) {
        self.notes
            .borrow_mut()
            .push(Note::AddressMatch { channel, direction });
    }

    fn error(&self, channel: LogicalChannel, error: BusError) {
        self.notes.borrow_mut().push(Note::Error { channel, error });
    }
}

impl DevErrorSink for Recorder {
    fn report(&self, module_id: u16, instance: u8, service: ServiceId, error: DetErrorCode) {
        assert_eq!(module_id, MODULE_ID);
        assert_eq!(instance, 0);
        self.det.borrow_mut().push((service, error));
    }
}

impl DemSink for Recorder {
    fn report(&self, event: DemEventId, status: DemEventStatus) {
        self.dem.borrow_mut().push((event, status));
    }
}

/// Handle on the simulated hardware shared with the register handles of a driver.
#[derive(Debug, Clone, Default)]
pub struct Sim {
    world: Shared,
}

impl Sim {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver<'a>(&self, hooks: Hooks<'a>) -> TestI2c<'a> {
        I2c::new(
            [0, 1].map(|module| SimLpi2c {
                world: self.world.clone(),
                module,
            }),
            SimFlexio {
                world: self.world.clone(),
            },
            SimDma {
                world: self.world.clone(),
            },
            hooks,
        )
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.world.borrow_mut())
    }

    pub fn add_device(&self, device: SimDevice) {
        self.with(|world| world.bus.devices.push(device));
    }

    pub fn device(&self, index: usize) -> SimDevice {
        self.with(|world| world.bus.devices[index].clone())
    }

    pub fn trace(&self) -> Vec<BusEvent> {
        self.with(|world| world.bus.trace.clone())
    }

    pub fn line_trace(&self, line: usize) -> Vec<BusEvent> {
        self.with(|world| world.bus.line_trace(line).to_vec())
    }

    pub fn clear_trace(&self) {
        self.with(|world| world.bus.clear_traces());
    }

    /// Deliver DMA requests, DMA completions and interrupts until the hardware is quiet.
    pub fn run(&self, i2c: &mut TestI2c<'_>) {
        for _ in 0..RUN_LIMIT {
            let (mut active, completed) = self.with(|world| world.pump_dma());
            for channel in completed {
                i2c.on_dma_complete(channel);
            }
            let (lpi2c, flexio) = self.with(|world| {
                (
                    [world.lpi2c[0].irq_pending(), world.lpi2c[1].irq_pending()],
                    world.flexio_irq(),
                )
            });
            for (module, pending) in lpi2c.into_iter().enumerate() {
                if pending {
                    active = true;
                    i2c.on_lpi2c_interrupt(module);
                }
            }
            if flexio {
                active = true;
                i2c.on_flexio_interrupt();
            }
            if !active {
                return;
            }
        }
        panic!("simulated hardware did not settle");
    }

    /// An external master addresses slave module `module`. Returns false if the module does
    /// not match the address.
    pub fn slave_address(&self, module: usize, address_byte: u8) -> bool {
        self.with(|world| {
            let model = &mut world.lpi2c[module];
            let scr = SlaveControl::new_with_raw_value(model.scr);
            let samr = SlaveAddressMatch::new_with_raw_value(model.samr);
            if !scr.sen() || samr.addr0().value() != (address_byte >> 1) as u16 {
                return false;
            }
            model.pending_address = Some(address_byte);
            true
        })
    }

    pub fn slave_write(&self, module: usize, data: &[u8]) {
        self.with(|world| world.lpi2c[module].slave_rx.extend(data.iter().copied()));
    }

    pub fn slave_read(&self, module: usize, count: usize) {
        self.with(|world| world.lpi2c[module].slave_reads += count);
    }

    pub fn slave_stop(&self, module: usize) {
        self.with(|world| {
            world.lpi2c[module].ssr |= SlaveStatus::new_with_raw_value(0).with_sdf(true).raw_value()
        });
    }
}

/// 100 kHz at a 48 MHz functional clock.
pub const STANDARD_CLOCK: ClockConfig = ClockConfig::new(u3::new(3), u6::new(38), u6::new(19));
/// 100 kHz at a 48 MHz functional clock.
pub const SOFT_BAUD_DIVIDER: u8 = 239;

pub const fn lpi2c_dma(module: u8) -> DmaChannels {
    DmaChannels {
        tx: 2 * module,
        rx: 2 * module + 1,
    }
}

pub const fn flexio_dma(sub_channel: u8) -> DmaChannels {
    DmaChannels {
        tx: 4 + 2 * sub_channel,
        rx: 5 + 2 * sub_channel,
    }
}

pub const fn lpi2c_channel(channel: LogicalChannel, module: u8) -> ChannelConfig {
    ChannelConfig::new(
        channel,
        EngineConfig::Lpi2c(Lpi2cUnitConfig::new(module, STANDARD_CLOCK)),
    )
}

pub const fn lpi2c_dma_channel(channel: LogicalChannel, module: u8) -> ChannelConfig {
    ChannelConfig::new(
        channel,
        EngineConfig::Lpi2c(Lpi2cUnitConfig::new(module, STANDARD_CLOCK).with_dma(lpi2c_dma(module))),
    )
    .with_async_method(AsyncMethod::Dma)
}

pub const fn lpi2c_slave_channel(channel: LogicalChannel, module: u8, address: u8) -> ChannelConfig {
    ChannelConfig::new(
        channel,
        EngineConfig::Lpi2c(
            Lpi2cUnitConfig::new(module, STANDARD_CLOCK)
                .with_slave_address(SlaveAddress::seven_bit(address)),
        ),
    )
    .with_role(Role::Slave)
}

pub const fn flexio_unit(sub_channel: u8) -> FlexioUnitConfig {
    FlexioUnitConfig {
        sub_channel,
        sda_pin: 2 * sub_channel,
        scl_pin: 2 * sub_channel + 1,
        tx_shifter: 2 * sub_channel,
        rx_shifter: 2 * sub_channel + 1,
        scl_timer: 2 * sub_channel,
        control_timer: 2 * sub_channel + 1,
        baud_divider: SOFT_BAUD_DIVIDER,
        dma: None,
    }
}

pub const fn flexio_channel(channel: LogicalChannel, sub_channel: u8) -> ChannelConfig {
    ChannelConfig::new(channel, EngineConfig::Flexio(flexio_unit(sub_channel)))
}

pub const fn flexio_dma_channel(channel: LogicalChannel, sub_channel: u8) -> ChannelConfig {
    let mut unit = flexio_unit(sub_channel);
    unit.dma = Some(flexio_dma(sub_channel));
    ChannelConfig::new(channel, EngineConfig::Flexio(unit)).with_async_method(AsyncMethod::Dma)
}
