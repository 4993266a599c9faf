//! Transfer requests.
use arbitrary_int::{u7, u10};
use raw_slice::{RawBufSlice, RawBufSliceMut};

use crate::ChannelStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveAddress {
    SevenBit(u7),
    TenBit(u10),
}

impl SlaveAddress {
    #[inline]
    pub const fn seven_bit(addr: u8) -> Self {
        SlaveAddress::SevenBit(u7::new(addr & 0x7F))
    }

    #[inline]
    pub const fn ten_bit(addr: u16) -> Self {
        SlaveAddress::TenBit(u10::new(addr & 0x3FF))
    }

    #[inline]
    pub const fn is_ten_bit(&self) -> bool {
        matches!(self, SlaveAddress::TenBit(_))
    }
}

/// Data direction on the bus, seen from the unit which performs the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    /// Status of a channel while a transfer in this direction is running.
    #[inline]
    pub const fn busy_status(self) -> ChannelStatus {
        match self {
            Direction::Send => ChannelStatus::Sending,
            Direction::Receive => ChannelStatus::Receiving,
        }
    }
}

/// First byte after a START for a 7-bit address.
#[bitbybit::bitfield(u8, default = 0x0)]
pub struct AddressByte {
    #[bits(1..=7, rw)]
    address: u7,
    /// Master reads from the slave.
    #[bit(0, rw)]
    read: bool,
}

impl AddressByte {
    #[inline]
    pub fn for_address(address: u7, direction: Direction) -> Self {
        Self::DEFAULT
            .with_address(address)
            .with_read(direction == Direction::Receive)
    }
}

/// Header byte of a 10-bit address: `11110` followed by address bits 9 and 8 and the R/W bit.
#[inline]
pub const fn ten_bit_header(address: u10, read: bool) -> u8 {
    0b1111_0000 | (((address.value() >> 7) as u8) & 0b110) | read as u8
}

#[inline]
pub const fn ten_bit_low_byte(address: u10) -> u8 {
    (address.value() & 0xFF) as u8
}

pub enum Payload<'buf> {
    Send(&'buf [u8]),
    Receive(&'buf mut [u8]),
}

/// A master transfer. The buffer stays owned by the caller.
pub struct TransferRequest<'buf> {
    pub address: SlaveAddress,
    /// The addressed slave is expected to NACK its address.
    pub expect_nack: bool,
    pub high_speed: bool,
    /// End without a STOP condition. The bus stays owned by the master and the next transfer
    /// of the channel begins with a repeated START.
    pub no_stop: bool,
    /// Continue the send of a transfer which ended without STOP: no START and no address.
    pub no_start: bool,
    pub payload: Payload<'buf>,
}

impl<'buf> TransferRequest<'buf> {
    pub fn send(address: SlaveAddress, data: &'buf [u8]) -> Self {
        Self {
            address,
            expect_nack: false,
            high_speed: false,
            no_stop: false,
            no_start: false,
            payload: Payload::Send(data),
        }
    }

    pub fn receive(address: SlaveAddress, buf: &'buf mut [u8]) -> Self {
        Self {
            address,
            expect_nack: false,
            high_speed: false,
            no_stop: false,
            no_start: false,
            payload: Payload::Receive(buf),
        }
    }

    pub fn with_expect_nack(mut self, expect_nack: bool) -> Self {
        self.expect_nack = expect_nack;
        self
    }

    pub fn with_high_speed(mut self, high_speed: bool) -> Self {
        self.high_speed = high_speed;
        self
    }

    pub fn with_no_stop(mut self, no_stop: bool) -> Self {
        self.no_stop = no_stop;
        self
    }

    pub fn with_no_start(mut self, no_start: bool) -> Self {
        self.no_start = no_start;
        self
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        match self.payload {
            Payload::Send(_) => Direction::Send,
            Payload::Receive(_) => Direction::Receive,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Send(data) => data.len(),
            Payload::Receive(buf) => buf.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Engine view of the request.
    ///
    /// # Safety
    ///
    /// The returned [Transfer] stores raw pointers to the payload buffer. The buffer must
    /// outlive every use of the transfer by an engine.
    pub(crate) unsafe fn to_transfer(&mut self) -> Transfer {
        let buffer = match &mut self.payload {
            Payload::Send(data) => {
                let mut slice = RawBufSlice::new_nulled();
                unsafe { slice.set(*data) };
                TransferBuffer::Send(slice)
            }
            Payload::Receive(buf) => {
                let mut slice = RawBufSliceMut::new_nulled();
                unsafe { slice.set(&mut **buf) };
                TransferBuffer::Receive(slice)
            }
        };
        Transfer {
            address: self.address,
            expect_nack: self.expect_nack,
            high_speed: self.high_speed,
            no_stop: self.no_stop,
            no_start: self.no_start,
            len: self.len(),
            buffer,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TransferBuffer {
    Send(RawBufSlice),
    Receive(RawBufSliceMut),
}

/// A master transfer as stored by the engines while it is running.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub address: SlaveAddress,
    pub expect_nack: bool,
    pub high_speed: bool,
    pub no_stop: bool,
    pub no_start: bool,
    pub len: usize,
    pub buffer: TransferBuffer,
}

impl Transfer {
    #[inline]
    pub fn direction(&self) -> Direction {
        match self.buffer {
            TransferBuffer::Send(_) => Direction::Send,
            TransferBuffer::Receive(_) => Direction::Receive,
        }
    }

    /// Byte `index` of a send buffer.
    ///
    /// # Safety
    ///
    /// The buffer the transfer was created from must still be alive.
    #[inline]
    pub unsafe fn send_byte(&self, index: usize) -> Option<u8> {
        match self.buffer {
            TransferBuffer::Send(slice) => unsafe { slice.get() }
                .and_then(|data| data.get(index))
                .copied(),
            TransferBuffer::Receive(_) => None,
        }
    }

    /// Store byte `index` of a receive buffer. Bytes beyond the buffer are dropped.
    ///
    /// # Safety
    ///
    /// The buffer the transfer was created from must still be alive and must not be accessed
    /// by anything else.
    #[inline]
    pub unsafe fn store_byte(&mut self, index: usize, byte: u8) {
        if let TransferBuffer::Receive(slice) = &mut self.buffer {
            if let Some(slot) = unsafe { slice.get_mut() }.and_then(|buf| buf.get_mut(index)) {
                *slot = byte;
            }
        }
    }

    /// Start address of the buffer, used as a DMA endpoint.
    ///
    /// # Safety
    ///
    /// The buffer the transfer was created from must still be alive.
    pub unsafe fn buffer_address(&mut self) -> Option<usize> {
        match &mut self.buffer {
            TransferBuffer::Send(slice) => unsafe { slice.get() }.map(|s| s.as_ptr() as usize),
            TransferBuffer::Receive(slice) => {
                unsafe { slice.get_mut() }.map(|s| s.as_mut_ptr() as usize)
            }
        }
    }
}
