//! Configurable shifter/timer block register module.
//!
//! The block provides 8 shifters and 8 timers. An I2C master channel uses one transmit shifter,
//! one receive shifter, one SCL timer and one control timer.
use arbitrary_int::{u2, u3, u5, u6};

pub const FLEXIO_BASE_ADDR: usize = 0x4005_A000;

pub const SHIFTER_COUNT: usize = 8;
pub const TIMER_COUNT: usize = 8;

/// Offset of the shifter buffer array with bit order swapped.
pub const SHIFTBUFBIS_OFFSET: usize = 0x280;
/// Offset of the shifter buffer array with bit order swapped inside each byte.
pub const SHIFTBUFBBS_OFFSET: usize = 0x380;

#[bitbybit::bitfield(u32, debug)]
pub struct Parameters {
    #[bits(24..=31, r)]
    trigger_count: u8,
    #[bits(16..=23, r)]
    pin_count: u8,
    #[bits(8..=15, r)]
    timer_count: u8,
    #[bits(0..=7, r)]
    shifter_count: u8,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct Control {
    #[bit(31, rw)]
    dozen: bool,
    #[bit(30, rw)]
    dbge: bool,
    #[bit(2, rw)]
    fastacc: bool,
    /// Software reset of all shifters and timers. Stays asserted until cleared.
    #[bit(1, rw)]
    swrst: bool,
    #[bit(0, rw)]
    flexen: bool,
}

#[bitbybit::bitenum(u3, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum ShifterMode {
    Disabled = 0b000,
    Receive = 0b001,
    Transmit = 0b010,
    Reserved = 0b011,
    MatchStore = 0b100,
    MatchContinuous = 0b101,
    State = 0b110,
    Logic = 0b111,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum PinConfig {
    OutputDisabled = 0b00,
    OpenDrainOrBidirectional = 0b01,
    BidirectionalOutputData = 0b10,
    Output = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ShifterControl {
    #[bits(24..=26, rw)]
    timsel: u3,
    /// Shift on negative edge of the shift clock if set.
    #[bit(23, rw)]
    timpol: bool,
    #[bits(16..=17, rw)]
    pincfg: PinConfig,
    #[bits(8..=12, rw)]
    pinsel: u5,
    /// Pin is active low if set.
    #[bit(7, rw)]
    pinpol: bool,
    #[bits(0..=2, rw)]
    smod: ShifterMode,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum StartBit {
    Disabled = 0b00,
    DisabledLoadOnEnable = 0b01,
    Low = 0b10,
    High = 0b11,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum StopBit {
    Disabled = 0b00,
    Reserved = 0b01,
    Low = 0b10,
    High = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct ShifterConfig {
    #[bits(16..=20, rw)]
    pwidth: u5,
    /// Input from the next shifter output if set, otherwise from the pin.
    #[bit(8, rw)]
    insrc: bool,
    /// Stop bit. For a receive shifter a mismatching stop bit sets the shifter error flag.
    #[bits(4..=5, rw)]
    sstop: StopBit,
    #[bits(0..=1, rw)]
    sstart: StartBit,
}

#[bitbybit::bitenum(u2, exhaustive = true)]
#[derive(Debug, PartialEq, Eq)]
pub enum TimerMode {
    Disabled = 0b00,
    DualBaud8Bit = 0b01,
    DualPwm8Bit = 0b10,
    Counter16Bit = 0b11,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerControl {
    #[bits(24..=29, rw)]
    trgsel: u6,
    /// Trigger is active low if set.
    #[bit(23, rw)]
    trgpol: bool,
    /// Internal trigger source if set.
    #[bit(22, rw)]
    trgsrc: bool,
    #[bits(16..=17, rw)]
    pincfg: PinConfig,
    #[bits(8..=12, rw)]
    pinsel: u5,
    #[bit(7, rw)]
    pinpol: bool,
    #[bits(0..=1, rw)]
    tmod: TimerMode,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerConfig {
    #[bits(24..=25, rw)]
    timout: u2,
    #[bits(20..=21, rw)]
    tdec: u2,
    #[bits(16..=18, rw)]
    trst: u3,
    #[bits(12..=14, rw)]
    tdis: u3,
    #[bits(8..=10, rw)]
    tena: u3,
    #[bits(4..=5, rw)]
    tstop: u2,
    #[bit(1, rw)]
    tstart: bool,
}

#[bitbybit::bitfield(u32, default = 0x0, debug)]
pub struct TimerCompare {
    /// In dual 8-bit baud mode, the upper byte holds the number of edges minus one and the
    /// lower byte the baud rate divider.
    #[bits(0..=15, rw)]
    cmp: u16,
}

/// Shifter/timer block.
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct Flexio {
    #[mmio(PureRead)]
    verid: u32,
    #[mmio(PureRead)]
    param: Parameters,
    ctrl: Control,
    #[mmio(PureRead)]
    pin: u32,
    /// Shifter status flags, one bit per shifter. Receive shifters clear their flag on a buffer
    /// read, transmit shifters on a buffer write. Write-1-to-clear otherwise.
    #[mmio(PureRead, Write)]
    shiftstat: u32,
    /// Shifter error flags, one bit per shifter. Write-1-to-clear.
    #[mmio(PureRead, Write)]
    shifterr: u32,
    /// Timer status flags, one bit per timer. Write-1-to-clear.
    #[mmio(PureRead, Write)]
    timstat: u32,
    _reserved0: u32,
    shiftsien: u32,
    shifteien: u32,
    timien: u32,
    _reserved1: u32,
    shiftsden: u32,
    _reserved2: [u32; 19],
    shiftctl: [ShifterControl; SHIFTER_COUNT],
    _reserved3: [u32; 24],
    shiftcfg: [ShifterConfig; SHIFTER_COUNT],
    _reserved4: [u32; 56],
    shiftbuf: [u32; SHIFTER_COUNT],
    _reserved5: [u32; 24],
    shiftbufbis: [u32; SHIFTER_COUNT],
    _reserved6: [u32; 24],
    shiftbufbys: [u32; SHIFTER_COUNT],
    _reserved7: [u32; 24],
    shiftbufbbs: [u32; SHIFTER_COUNT],
    _reserved8: [u32; 24],
    timctl: [TimerControl; TIMER_COUNT],
    _reserved9: [u32; 24],
    timcfg: [TimerConfig; TIMER_COUNT],
    _reserved10: [u32; 24],
    timcmp: [TimerCompare; TIMER_COUNT],
}

static_assertions::const_assert_eq!(core::mem::offset_of!(Flexio, shiftctl), 0x80);
static_assertions::const_assert_eq!(core::mem::offset_of!(Flexio, shiftbufbis), SHIFTBUFBIS_OFFSET);
static_assertions::const_assert_eq!(core::mem::offset_of!(Flexio, shiftbufbbs), SHIFTBUFBBS_OFFSET);
static_assertions::const_assert_eq!(core::mem::size_of::<Flexio>(), 0x520);

impl Flexio {
    /// Create a new MMIO instance at address [FLEXIO_BASE_ADDR].
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple threads. The user must ensure that concurrent accesses are safe and do not
    /// interfere with each other.
    pub const unsafe fn new_mmio_fixed() -> MmioFlexio<'static> {
        unsafe { Self::new_mmio_at(FLEXIO_BASE_ADDR) }
    }
}
