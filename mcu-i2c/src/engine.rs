//! Capability interface implemented once per hardware engine.
//!
//! Engines never touch the channel status. They report progress by pushing [Event]s into the
//! [EventQueue] of the [Env] they are called with, and the transfer core drains the queue before
//! returning from the API call or completion router which triggered the engine.
use raw_slice::RawBufSliceMut;

use crate::{
    BusError, Error, HwUnit, config::ChannelConfig, dma::DmaService, request::Direction,
    request::Transfer,
};

pub const EVENT_QUEUE_DEPTH: usize = 16;

pub type EventQueue = heapless::Deque<Event, EVENT_QUEUE_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Run to completion inside a bounded poll loop.
    Sync,
    Interrupt,
    Dma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MasterDone {
        direction: Direction,
        bytes: usize,
    },
    /// The slave unit was addressed. `accepted` is false if the unit was not listening, in
    /// which case the data phase stays stalled.
    SlaveAddressed {
        direction: Direction,
        accepted: bool,
    },
    SlaveDone {
        direction: Direction,
        bytes: usize,
    },
    Fault(BusError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub unit: HwUnit,
    pub kind: EventKind,
}

/// Services an engine may use while it processes a call.
pub struct Env<'a> {
    pub dma: &'a mut dyn DmaService,
    pub events: &'a mut EventQueue,
    /// Iteration ceiling of bounded waits.
    pub poll_budget: u32,
}

impl Env<'_> {
    pub fn emit(&mut self, unit: HwUnit, kind: EventKind) {
        if self.events.push_back(Event { unit, kind }).is_err() {
            log::error!("event queue full, dropping {kind:?} for {unit:?}");
        }
    }
}

/// Operations the transfer core dispatches to the engine backing a hardware unit.
///
/// `index` is the index of the unit inside the engine, see [HwUnit::local_index].
pub trait TransferEngine {
    fn init_unit(&mut self, index: usize, config: &ChannelConfig);

    fn deinit_unit(&mut self, index: usize);

    /// Maximum number of data bytes of one transfer.
    fn max_transfer_len(&self) -> usize;

    /// Engine specific admission checks which do not depend on the unit state.
    fn check_transfer(&self, transfer: &Transfer) -> Result<(), Error>;

    /// Start an admitted transfer. With [TransferMode::Sync] the call returns once the transfer
    /// completed, failed or exhausted the poll budget.
    fn start(&mut self, index: usize, transfer: Transfer, mode: TransferMode, env: &mut Env<'_>);

    /// Report latched hardware errors of an idle unit.
    fn poll_errors(&mut self, index: usize, env: &mut Env<'_>);

    fn prepare_slave_buffer(&mut self, index: usize, buffer: RawBufSliceMut)
    -> Result<(), Error>;

    /// Arm a slave unit. A transaction which addressed the unit before it listened resumes.
    fn start_listening(&mut self, index: usize, env: &mut Env<'_>) -> Result<(), Error>;

    fn on_dma_complete(&mut self, index: usize, dma_channel: u8, env: &mut Env<'_>);
}
