//! FIFO I2C controller register module.
use arbitrary_int::{u2, u3, u4, u6, u10, u11, u12};

pub const LPI2C_0_BASE_ADDR: usize = 0x4006_6000;
pub const LPI2C_1_BASE_ADDR: usize = 0x4006_7000;

/// Offset of the master transmit data register, used as a DMA destination.
pub const MTDR_OFFSET: usize = 0x60;
/// Offset of the master receive data register, used as a DMA source.
pub const MRDR_OFFSET: usize = 0x70;

#[bitbybit::bitfield(u32, debug)]
pub struct Parameters {
    /// Log2 of the master transmit FIFO depth.
    #[bits(0..=3, r)]
    mtxfifo: u4,
    /// Log2 of the master receive FIFO depth.
    #[bits(8..=11, r)]
    mrxfifo: u4,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterControl {
    /// Reset receive FIFO. Write only, always reads as 0.
    #[bit(9, rw)]
    rrf: bool,
    /// Reset transmit FIFO. Write only, always reads as 0.
    #[bit(8, rw)]
    rtf: bool,
    #[bit(3, rw)]
    dbgen: bool,
    #[bit(2, rw)]
    dozen: bool,
    /// Software reset of all master logic and registers except this one.
    #[bit(1, rw)]
    rst: bool,
    #[bit(0, rw)]
    men: bool,
}

/// Master status register. All flags except the FIFO flags and the busy flags are
/// write-1-to-clear.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterStatus {
    /// Bus busy.
    #[bit(25, rw)]
    bbf: bool,
    /// Master busy.
    #[bit(24, rw)]
    mbf: bool,
    /// Data match.
    #[bit(14, rw)]
    dmf: bool,
    /// Pin low timeout.
    #[bit(13, rw)]
    pltf: bool,
    /// FIFO error, for example a transmit command without a preceding start.
    #[bit(12, rw)]
    fef: bool,
    /// Arbitration lost.
    #[bit(11, rw)]
    alf: bool,
    /// Unexpected NACK.
    #[bit(10, rw)]
    ndf: bool,
    /// Stop detected.
    #[bit(9, rw)]
    sdf: bool,
    /// End of packet, set on a STOP or repeated START.
    #[bit(8, rw)]
    epf: bool,
    /// Receive data. Set while the receive FIFO holds more words than the watermark.
    #[bit(1, rw)]
    rdf: bool,
    /// Transmit data. Set while the transmit FIFO holds no more words than the watermark.
    #[bit(0, rw)]
    tdf: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterInterrupts {
    #[bit(14, rw)]
    dmie: bool,
    #[bit(13, rw)]
    pltie: bool,
    #[bit(12, rw)]
    feie: bool,
    #[bit(11, rw)]
    alie: bool,
    #[bit(10, rw)]
    ndie: bool,
    #[bit(9, rw)]
    sdie: bool,
    #[bit(8, rw)]
    epie: bool,
    #[bit(1, rw)]
    rdie: bool,
    #[bit(0, rw)]
    tdie: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterDma {
    #[bit(1, rw)]
    rdde: bool,
    #[bit(0, rw)]
    tdde: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterConfig1 {
    #[bits(24..=26, rw)]
    pincfg: u3,
    #[bits(16..=18, rw)]
    matcfg: u3,
    /// Pin low timeout also checks SDA, not only SCL.
    #[bit(10, rw)]
    timecfg: bool,
    /// Treat a NACK like an ACK.
    #[bit(9, rw)]
    ignack: bool,
    /// Generate a STOP automatically once the transmit FIFO is empty.
    #[bit(8, rw)]
    autostop: bool,
    /// Functional clock divider is 2^prescale.
    #[bits(0..=2, rw)]
    prescale: u3,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterConfig2 {
    #[bits(24..=27, rw)]
    filtsda: u4,
    #[bits(16..=19, rw)]
    filtscl: u4,
    /// Bus idle timeout in prescaled clock cycles. 0 disables the timeout.
    #[bits(0..=11, rw)]
    busidle: u12,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterConfig3 {
    /// Pin low timeout in units of 256 prescaled clock cycles. 0 disables the timeout.
    #[bits(8..=19, rw)]
    pinlow: u12,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct MasterClockConfig {
    #[bits(24..=29, rw)]
    datavd: u6,
    #[bits(16..=21, rw)]
    sethold: u6,
    #[bits(8..=13, rw)]
    clkhi: u6,
    #[bits(0..=5, rw)]
    clklo: u6,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct FifoControl {
    #[bits(16..=17, rw)]
    rxwater: u2,
    #[bits(0..=1, rw)]
    txwater: u2,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct FifoStatus {
    #[bits(16..=18, rw)]
    rxcount: u3,
    #[bits(0..=2, rw)]
    txcount: u3,
}

/// Command field of the master transmit data register.
#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Transmit the data byte.
    Transmit = 0b000,
    /// Receive `data + 1` bytes.
    Receive = 0b001,
    /// Generate a STOP condition.
    Stop = 0b010,
    /// Receive and discard `data + 1` bytes.
    ReceiveDiscard = 0b011,
    /// Generate a (repeated) START and transmit the address in the data byte.
    Start = 0b100,
    /// Like [Command::Start], but a NACK of the address is expected and not flagged.
    StartExpectNack = 0b101,
    /// Like [Command::Start], using high-speed mode.
    StartHighSpeed = 0b110,
    /// Like [Command::StartExpectNack], using high-speed mode.
    StartHighSpeedExpectNack = 0b111,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TransmitData {
    #[bits(8..=10, rw)]
    cmd: Command,
    #[bits(0..=7, rw)]
    data: u8,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ReceiveData {
    #[bit(14, rw)]
    rxempty: bool,
    #[bits(0..=7, rw)]
    data: u8,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveControl {
    #[bit(9, rw)]
    rrf: bool,
    #[bit(8, rw)]
    rtf: bool,
    #[bit(5, rw)]
    filtdz: bool,
    #[bit(4, rw)]
    filten: bool,
    #[bit(1, rw)]
    rst: bool,
    #[bit(0, rw)]
    sen: bool,
}

/// Slave status register. The bus condition and error flags are write-1-to-clear.
#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveStatus {
    #[bit(25, rw)]
    bbf: bool,
    #[bit(24, rw)]
    sbf: bool,
    #[bit(15, rw)]
    sarf: bool,
    #[bit(14, rw)]
    gcf: bool,
    #[bit(13, rw)]
    am1f: bool,
    #[bit(12, rw)]
    am0f: bool,
    /// FIFO error: receive overrun or transmit underrun.
    #[bit(11, rw)]
    fef: bool,
    /// Bit error: transmitted data did not match the bus.
    #[bit(10, rw)]
    bef: bool,
    /// Stop detected.
    #[bit(9, rw)]
    sdf: bool,
    /// Repeated start detected.
    #[bit(8, rw)]
    rsf: bool,
    #[bit(3, rw)]
    taf: bool,
    /// Address valid. Cleared by reading the received address register.
    #[bit(2, rw)]
    avf: bool,
    /// Receive data. Cleared by reading the receive data register.
    #[bit(1, rw)]
    rdf: bool,
    /// Transmit data. Cleared by writing the transmit data register.
    #[bit(0, rw)]
    tdf: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveInterrupts {
    #[bit(15, rw)]
    sarie: bool,
    #[bit(14, rw)]
    gcie: bool,
    #[bit(13, rw)]
    am1ie: bool,
    #[bit(12, rw)]
    am0ie: bool,
    #[bit(11, rw)]
    feie: bool,
    #[bit(10, rw)]
    beie: bool,
    #[bit(9, rw)]
    sdie: bool,
    #[bit(8, rw)]
    rsie: bool,
    #[bit(3, rw)]
    taie: bool,
    #[bit(2, rw)]
    avie: bool,
    #[bit(1, rw)]
    rdie: bool,
    #[bit(0, rw)]
    tdie: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveDma {
    #[bit(2, rw)]
    avde: bool,
    #[bit(1, rw)]
    rdde: bool,
    #[bit(0, rw)]
    tdde: bool,
}

#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum AddressConfig {
    Addr0SevenBit = 0b000,
    Addr0TenBit = 0b001,
    Addr0OrAddr1SevenBit = 0b010,
    Addr0OrAddr1TenBit = 0b011,
    Addr0SevenBitOrAddr1TenBit = 0b100,
    Addr0TenBitOrAddr1SevenBit = 0b101,
    RangeSevenBit = 0b110,
    RangeTenBit = 0b111,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveConfig1 {
    #[bits(16..=18, rw)]
    addrcfg: AddressConfig,
    #[bit(13, rw)]
    hsmen: bool,
    #[bit(12, rw)]
    ignack: bool,
    #[bit(11, rw)]
    rxcfg: bool,
    #[bit(10, rw)]
    txcfg: bool,
    #[bit(9, rw)]
    saen: bool,
    #[bit(8, rw)]
    gcen: bool,
    #[bit(3, rw)]
    ackstall: bool,
    #[bit(2, rw)]
    txdstall: bool,
    #[bit(1, rw)]
    rxstall: bool,
    #[bit(0, rw)]
    adrstall: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveAddressMatch {
    #[bits(17..=26, rw)]
    addr1: u10,
    #[bits(1..=10, rw)]
    addr0: u10,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ReceivedAddress {
    /// Address not valid.
    #[bit(14, rw)]
    anv: bool,
    /// Received address. For 7-bit addresses, bit 0 is the R/W bit.
    #[bits(0..=10, rw)]
    raddr: u11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveTransmitData {
    #[bits(0..=7, rw)]
    data: u8,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct SlaveReceiveData {
    /// Start of frame, first byte after an address.
    #[bit(15, rw)]
    sof: bool,
    #[bit(14, rw)]
    rxempty: bool,
    #[bits(0..=7, rw)]
    data: u8,
}

#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Lpi2c {
    #[mmio(PureRead)]
    verid: u32,
    #[mmio(PureRead)]
    param: Parameters,
    _reserved0: [u32; 2],
    mcr: MasterControl,
    #[mmio(PureRead, Write)]
    msr: MasterStatus,
    mier: MasterInterrupts,
    mder: MasterDma,
    mcfgr0: u32,
    mcfgr1: MasterConfig1,
    mcfgr2: MasterConfig2,
    mcfgr3: MasterConfig3,
    _reserved1: [u32; 4],
    mdmr: u32,
    _reserved2: u32,
    mccr0: MasterClockConfig,
    _reserved3: u32,
    mccr1: MasterClockConfig,
    _reserved4: u32,
    mfcr: FifoControl,
    #[mmio(PureRead)]
    mfsr: FifoStatus,
    #[mmio(Write)]
    mtdr: TransmitData,
    _reserved5: [u32; 3],
    #[mmio(Read)]
    mrdr: ReceiveData,
    _reserved6: [u32; 39],
    scr: SlaveControl,
    #[mmio(PureRead, Write)]
    ssr: SlaveStatus,
    sier: SlaveInterrupts,
    sder: SlaveDma,
    _reserved7: u32,
    scfgr1: SlaveConfig1,
    scfgr2: u32,
    _reserved8: [u32; 5],
    samr: SlaveAddressMatch,
    _reserved9: [u32; 3],
    #[mmio(Read)]
    sasr: ReceivedAddress,
    star: u32,
    _reserved10: [u32; 2],
    #[mmio(Write)]
    stdr: SlaveTransmitData,
    _reserved11: [u32; 3],
    #[mmio(Read)]
    srdr: SlaveReceiveData,
}

static_assertions::const_assert_eq!(core::mem::size_of::<Lpi2c>(), 0x174);

impl Lpi2c {
    /// Create a new MMIO instance for controller 0 at address [LPI2C_0_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    pub const unsafe fn new_mmio_fixed_0() -> MmioLpi2c<'static> {
        unsafe { Self::new_mmio_at(LPI2C_0_BASE_ADDR) }
    }

    /// Create a new MMIO instance for controller 1 at address [LPI2C_1_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    pub const unsafe fn new_mmio_fixed_1() -> MmioLpi2c<'static> {
        unsafe { Self::new_mmio_at(LPI2C_1_BASE_ADDR) }
    }
}
