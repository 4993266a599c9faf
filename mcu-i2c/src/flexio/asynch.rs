//! Interrupt entry of the shift-timer block.
//!
//! All channels share one interrupt line. The handler serves every channel with a running
//! transfer, flags of idle channels are cleared.
use super::{FlexioChannel, FlexioEngine, FlexioRegisters, bit};
use crate::engine::Env;

impl<F: FlexioRegisters> FlexioEngine<F> {
    /// `initialized` tells whether the transfer core holds a configuration. Interrupts while it
    /// does not, or while no channel is configured, reset the block.
    pub(crate) fn on_interrupt(&mut self, initialized: bool, env: &mut Env<'_>) {
        if !initialized || !self.any_configured() {
            log::trace!("shift-timer block interrupt while unconfigured, resetting");
            self.software_reset();
            return;
        }
        let status_enable = self.regs.shifter_status_interrupts();
        let timer_enable = self.regs.timer_interrupts();
        for channel in self.channels.iter_mut() {
            if channel.setup.is_none() {
                continue;
            }
            if channel.xfer.is_some() {
                let pending = channel.pending(&mut self.regs, status_enable, timer_enable);
                channel.service(&mut self.regs, pending, env);
            } else {
                channel.clear_idle_flags(&mut self.regs);
            }
        }
    }

    fn software_reset(&mut self) {
        let ctrl = self.regs.control();
        self.regs.set_control(ctrl.with_swrst(true));
        self.regs.set_control(ctrl.with_swrst(false));
        self.regs.set_shifter_status_interrupts(0);
        self.regs.set_timer_interrupts(0);
        self.regs.set_shifter_dma(0);
    }
}

impl FlexioChannel {
    fn clear_idle_flags<F: FlexioRegisters>(&mut self, regs: &mut F) {
        let Some(cfg) = self.setup else {
            return;
        };
        let timers = regs.timer_status() & cfg.timer_mask();
        let errors = regs.shifter_errors() & cfg.shifter_mask();
        let rx_pending = regs.shifter_status() & bit(cfg.rx_shifter) != 0;
        if timers == 0 && errors == 0 && !rx_pending {
            return;
        }
        log::trace!(
            "soft I2C channel {}: spurious flags, timers {:#x} errors {:#x}",
            self.sub_channel,
            timers,
            errors
        );
        regs.clear_timer_status(timers);
        regs.clear_shifter_errors(errors);
        Self::flush_rx(regs, &cfg);
    }
}
