//! DMA collaborator interface.
//!
//! Every DMA transfer is described by an immutable [TransferDescriptor] value which is built per
//! transfer segment and handed to the [DmaService].

/// One side of a DMA transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The address advances by one byte after every byte.
    Incrementing(usize),
    /// The address stays fixed, for example a peripheral data register.
    Fixed(usize),
}

impl Endpoint {
    #[inline]
    pub const fn address(&self) -> usize {
        match self {
            Endpoint::Incrementing(addr) | Endpoint::Fixed(addr) => *addr,
        }
    }

    /// Address of the byte with the given offset into the transfer.
    #[inline]
    pub const fn address_at(&self, offset: usize) -> usize {
        match self {
            Endpoint::Incrementing(addr) => *addr + offset,
            Endpoint::Fixed(addr) => *addr,
        }
    }
}

/// Byte-wise transfer of `major_count` bursts of `minor_bytes` bytes. The peripheral request
/// is checked once per burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub minor_bytes: usize,
    pub major_count: usize,
}

impl TransferDescriptor {
    pub const fn new(
        source: Endpoint,
        destination: Endpoint,
        minor_bytes: usize,
        major_count: usize,
    ) -> Self {
        Self {
            source,
            destination,
            minor_bytes,
            major_count,
        }
    }

    /// One burst moving `len` bytes.
    pub const fn burst(source: Endpoint, destination: Endpoint, len: usize) -> Self {
        Self::new(source, destination, len, 1)
    }

    /// `len` bursts of one byte each.
    pub const fn bytewise(source: Endpoint, destination: Endpoint, len: usize) -> Self {
        Self::new(source, destination, 1, len)
    }

    #[inline]
    pub const fn total_bytes(&self) -> usize {
        self.minor_bytes * self.major_count
    }
}

/// DMA engine capability consumed by the transfer engines.
pub trait DmaService {
    fn configure(&mut self, channel: u8, descriptor: &TransferDescriptor);
    fn enable(&mut self, channel: u8);
    fn disable(&mut self, channel: u8);
    /// Request a completion notification. The platform forwards it to
    /// [crate::I2c::on_dma_complete].
    fn enable_notification(&mut self, channel: u8);
}

/// Placeholder for targets without a DMA engine. Configurations must not select
/// [crate::AsyncMethod::Dma] with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDma;

impl DmaService for NoDma {
    fn configure(&mut self, channel: u8, _descriptor: &TransferDescriptor) {
        log::warn!("DMA channel {channel} configured without DMA support");
    }

    fn enable(&mut self, _channel: u8) {}

    fn disable(&mut self, _channel: u8) {}

    fn enable_notification(&mut self, _channel: u8) {}
}
