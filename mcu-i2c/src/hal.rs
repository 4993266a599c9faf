//! [embedded_hal::i2c] adapter for one master channel.
//!
//! A transaction starts with a START and ends with a single STOP. Operations after the first
//! begin with a repeated START, adjacent writes are sent back to back without one.
//! Transactions of more than one operation need the FIFO controller, the shift-timer engine
//! always ends a transfer with a STOP.
use embedded_hal::i2c::{Operation, SevenBitAddress, TenBitAddress};

use crate::{
    Error, I2c, LogicalChannel, SlaveAddress, TransferRequest,
    dma::DmaService,
    flexio::FlexioRegisters,
    lpi2c::Lpi2cRegisters,
    request::Direction,
};

const fn op_direction(op: &Operation<'_>) -> Direction {
    match op {
        Operation::Read(_) => Direction::Receive,
        Operation::Write(_) => Direction::Send,
    }
}

/// Blocking access to one logical channel of an initialized driver.
pub struct BlockingChannel<'d, 'a, L, F, D> {
    driver: &'d mut I2c<'a, L, F, D>,
    channel: LogicalChannel,
}

impl<'d, 'a, L: Lpi2cRegisters, F: FlexioRegisters, D: DmaService> BlockingChannel<'d, 'a, L, F, D> {
    pub fn new(driver: &'d mut I2c<'a, L, F, D>, channel: LogicalChannel) -> Self {
        Self { driver, channel }
    }

    #[inline]
    pub fn channel(&self) -> LogicalChannel {
        self.channel
    }

    pub fn release(self) -> &'d mut I2c<'a, L, F, D> {
        self.driver
    }

    /// Reject transactions which would fail after the bus was taken, a failed operation must
    /// not leave the bus without STOP.
    fn check(&self, operations: &[Operation<'_>]) -> Result<(), Error> {
        let max = self.driver.max_transfer_len(self.channel)?;
        let mut previous = None;
        for op in operations {
            let len = match op {
                Operation::Read(buf) => buf.len(),
                Operation::Write(data) => data.len(),
            };
            if len == 0 {
                return Err(Error::EmptyBuffer);
            }
            if len > max {
                return Err(Error::BufferTooLarge { len, max });
            }
            // The last byte of a read is NACKed, a following read cannot continue it.
            let direction = op_direction(op);
            if previous == Some(Direction::Receive) && direction == Direction::Receive {
                return Err(Error::Unsupported);
            }
            previous = Some(direction);
        }
        Ok(())
    }

    fn run(&mut self, address: SlaveAddress, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        self.check(operations)?;
        let count = operations.len();
        let mut previous = None;
        for (index, op) in operations.iter_mut().enumerate() {
            let direction = op_direction(op);
            let request = match op {
                Operation::Read(buf) => TransferRequest::receive(address, &mut **buf),
                Operation::Write(data) => TransferRequest::send(address, *data),
            };
            let mut request = request
                .with_no_start(previous == Some(direction))
                .with_no_stop(index + 1 < count);
            self.driver.sync_transmit(self.channel, &mut request)?;
            previous = Some(direction);
        }
        Ok(())
    }
}

impl<L, F, D> embedded_hal::i2c::ErrorType for BlockingChannel<'_, '_, L, F, D> {
    type Error = Error;
}

impl<L: Lpi2cRegisters, F: FlexioRegisters, D: DmaService> embedded_hal::i2c::I2c<SevenBitAddress>
    for BlockingChannel<'_, '_, L, F, D>
{
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address > 0x7F {
            return Err(Error::Unsupported);
        }
        self.run(SlaveAddress::seven_bit(address), operations)
    }
}

impl<L: Lpi2cRegisters, F: FlexioRegisters, D: DmaService> embedded_hal::i2c::I2c<TenBitAddress>
    for BlockingChannel<'_, '_, L, F, D>
{
    fn transaction(
        &mut self,
        address: TenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address > 0x3FF {
            return Err(Error::Unsupported);
        }
        self.run(SlaveAddress::ten_bit(address), operations)
    }
}
