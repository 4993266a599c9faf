//! Collaborator interfaces for notifications, development errors and diagnostic events.
use crate::{BusError, LogicalChannel, request::Direction};

/// User notifications.
///
/// All methods are invoked from the context which drained the completion event, which is the
/// interrupt context for asynchronous transfers. The default implementations do nothing.
pub trait Notifier {
    fn master_transmit_complete(&self, _channel: LogicalChannel, _bytes: usize) {}
    fn master_receive_complete(&self, _channel: LogicalChannel, _bytes: usize) {}
    fn slave_transmit_complete(&self, _channel: LogicalChannel, _bytes: usize) {}
    fn slave_receive_complete(&self, _channel: LogicalChannel, _bytes: usize) {}
    /// The slave unit was addressed. `direction` is the data direction from the slave's point
    /// of view: [Direction::Send] if the master reads.
    fn slave_address_match(&self, _channel: LogicalChannel, _direction: Direction) {}
    fn error(&self, _channel: LogicalChannel, _error: BusError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoNotifier;

impl Notifier for NoNotifier {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum ServiceId {
    Init = 0x00,
    DeInit = 0x01,
    SyncTransmit = 0x02,
    AsyncTransmit = 0x03,
    GetStatus = 0x04,
    PrepareSlaveBuffer = 0x05,
    StartListening = 0x06,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum DetErrorCode {
    Uninit = 0x01,
    AlreadyInitialized = 0x02,
    InvalidConfig = 0x03,
    InvalidChannel = 0x04,
    NullBuffer = 0x05,
    BufferTooLarge = 0x06,
    Busy = 0x07,
    RoleMismatch = 0x08,
    Unsupported = 0x09,
}

/// Development error sink.
pub trait DevErrorSink {
    fn report(&self, module_id: u16, instance: u8, service: ServiceId, error: DetErrorCode);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevErrorSink;

impl DevErrorSink for NoDevErrorSink {
    fn report(&self, _module_id: u16, _instance: u8, _service: ServiceId, _error: DetErrorCode) {}
}

/// Development error sink which forwards reports to the [log] facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDevErrorSink;

impl DevErrorSink for LogDevErrorSink {
    fn report(&self, module_id: u16, instance: u8, service: ServiceId, error: DetErrorCode) {
        log::error!(
            "development error: module {module_id}, instance {instance}, service {:#04x}, \
             error {:#04x}",
            u8::from(service),
            u8::from(error)
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemEventId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemEventStatus {
    Passed,
    Failed,
}

/// Diagnostic event sink.
pub trait DemSink {
    fn report(&self, event: DemEventId, status: DemEventStatus);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDemSink;

impl DemSink for NoDemSink {
    fn report(&self, _event: DemEventId, _status: DemEventStatus) {}
}
