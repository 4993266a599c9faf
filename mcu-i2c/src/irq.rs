//! Completion routers.
//!
//! The platform calls these from the interrupt handlers of the controller modules, the
//! shift-timer block and the DMA engine. Every router drains the engine events before it
//! returns, so notifications run inside the interrupt context.
use crate::{
    I2c,
    dma::DmaService,
    flexio::FlexioRegisters,
    lpi2c::Lpi2cRegisters,
};

impl<L: Lpi2cRegisters, F: FlexioRegisters, D: DmaService> I2c<'_, L, F, D> {
    /// Interrupt of FIFO I2C controller module `module`.
    pub fn on_lpi2c_interrupt(&mut self, module: usize) {
        self.with_engines(|lpi2c, _, env| lpi2c.on_interrupt(module, env));
        self.drain_events();
    }

    /// Interrupt of the shift-timer block, shared by all soft channels.
    pub fn on_flexio_interrupt(&mut self) {
        let initialized = self.is_initialized();
        self.with_engines(|_, flexio, env| flexio.on_interrupt(initialized, env));
        self.drain_events();
    }

    /// Completion notification of a DMA channel.
    pub fn on_dma_complete(&mut self, dma_channel: u8) {
        let owner = self.config().and_then(|config| {
            config.channels.iter().find(|cfg| {
                cfg.engine
                    .dma()
                    .is_some_and(|channels| channels.contains(dma_channel))
            })
        });
        let Some(cfg) = owner else {
            log::trace!("DMA channel {dma_channel}: completion without owner");
            return;
        };
        self.dispatch(cfg.engine.hw_unit(), |engine, index, env| {
            engine.on_dma_complete(index, dma_channel, env)
        });
        self.drain_events();
    }
}
