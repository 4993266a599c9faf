//! Per-unit channel status shared between API calls and interrupt handlers.
use core::cell::Cell;

use critical_section::Mutex;

use crate::ChannelStatus;

/// Channel status guarded by a critical section.
///
/// Every read-modify-write of the status happens inside one critical section, which makes
/// admission of a new request atomic with respect to the completion routers.
pub struct StatusCell(Mutex<Cell<ChannelStatus>>);

impl StatusCell {
    pub const fn new() -> Self {
        Self(Mutex::new(Cell::new(ChannelStatus::Idle)))
    }

    #[inline]
    pub fn get(&self) -> ChannelStatus {
        critical_section::with(|cs| self.0.borrow(cs).get())
    }

    #[inline]
    pub fn set(&self, status: ChannelStatus) {
        critical_section::with(|cs| self.0.borrow(cs).set(status));
    }

    /// Move to `next` unless the channel is busy.
    ///
    /// Returns the previous status on success and the current busy status otherwise.
    pub fn try_admit(&self, next: ChannelStatus) -> Result<ChannelStatus, ChannelStatus> {
        critical_section::with(|cs| {
            let cell = self.0.borrow(cs);
            let current = cell.get();
            if current.is_busy() {
                return Err(current);
            }
            cell.set(next);
            Ok(current)
        })
    }

    /// Read the status. Reading [ChannelStatus::Finished] acknowledges it, the channel is
    /// [ChannelStatus::Idle] afterwards.
    pub fn acknowledge(&self) -> ChannelStatus {
        critical_section::with(|cs| {
            let cell = self.0.borrow(cs);
            let current = cell.get();
            if current == ChannelStatus::Finished {
                cell.set(ChannelStatus::Idle);
            }
            current
        })
    }
}

impl core::fmt::Debug for StatusCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("StatusCell").field(&self.get()).finish()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
