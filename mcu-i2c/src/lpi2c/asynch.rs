//! Interrupt driven master transfers and the slave role of the controller.
use mcu_i2c_regs::lpi2c::{MasterInterrupts, MasterStatus, SlaveStatus};
use raw_slice::RawBufSliceMut;

use super::{
    Lpi2cEngine, Lpi2cRegisters, Lpi2cUnit, MASTER_W1C, SLAVE_W1C, SlaveTransfer, master_error,
};
use crate::{
    BusError, Error,
    engine::{Env, EventKind, TransferMode},
    request::Direction,
};

/// Byte sent by the slave once the prepared buffer is exhausted.
pub const SLAVE_FILL_BYTE: u8 = 0xFF;

const fn master_interrupt_mask(direction: Direction, commands_pending: bool) -> MasterInterrupts {
    MasterInterrupts::new_with_raw_value(0)
        .with_tdie(commands_pending)
        .with_rdie(matches!(direction, Direction::Receive))
        .with_sdie(true)
        .with_ndie(true)
        .with_alie(true)
        .with_feie(true)
        .with_pltie(true)
}

pub(crate) const fn slave_error(status: SlaveStatus) -> Option<BusError> {
    if status.bef() {
        Some(BusError::SlaveBitError)
    } else if status.fef() {
        Some(BusError::SlaveFifoError)
    } else {
        None
    }
}

impl<L: Lpi2cRegisters> Lpi2cUnit<L> {
    pub(super) fn start_interrupt(&mut self) {
        let all_queued = self.feed();
        let Some(xfer) = self.master else {
            return;
        };
        self.regs.set_master_interrupts(master_interrupt_mask(
            xfer.transfer.direction(),
            !all_queued || xfer.transfer.no_stop,
        ));
    }

    fn on_master_interrupt(&mut self, status: MasterStatus, env: &mut Env<'_>) {
        let Some(xfer) = self.master else {
            if status.raw_value() & MASTER_W1C.raw_value() != 0 {
                log::trace!(
                    "I2C module {}: spurious master interrupt {:?}",
                    self.module,
                    status
                );
                self.regs.clear_master_status(MASTER_W1C);
            }
            return;
        };
        match xfer.mode {
            TransferMode::Interrupt => {
                self.service_master(env);
                // Without a STOP there is no stop interrupt, the FIFO running empty ends it.
                if self.master.is_some_and(|xfer| xfer.all_queued() && !xfer.transfer.no_stop) {
                    let mier = self.regs.master_interrupts();
                    self.regs.set_master_interrupts(mier.with_tdie(false));
                }
            }
            // Data moves by DMA, only errors are signalled by interrupt.
            TransferMode::Dma => {
                if let Some(error) = master_error(status) {
                    self.fail_master(error, env);
                }
            }
            TransferMode::Sync => (),
        }
    }

    pub(super) fn prepare_slave_buffer(&mut self, buffer: RawBufSliceMut) -> Result<(), Error> {
        if self.slave.is_some() {
            return Err(Error::Busy);
        }
        self.slave_len = buffer.len().unwrap_or(0);
        self.slave_buffer = buffer;
        Ok(())
    }

    /// Arm the slave for the next transaction addressed to it. Armed slaves disarm at the stop
    /// condition which ends the transaction.
    pub(super) fn start_listening(&mut self, env: &mut Env<'_>) -> Result<(), Error> {
        if self.slave.is_some() {
            return Err(Error::Busy);
        }
        if self.slave_buffer.is_null() || self.slave_len == 0 {
            return Err(Error::EmptyBuffer);
        }
        self.listening = true;
        log::debug!("I2C module {}: listening", self.module);
        if let Some(direction) = self.stalled.take() {
            log::debug!(
                "I2C module {}: resuming stalled {:?}",
                self.module,
                direction
            );
            self.accept(direction, env);
        }
        Ok(())
    }

    fn accept(&mut self, direction: Direction, env: &mut Env<'_>) {
        self.slave = Some(SlaveTransfer {
            direction,
            index: 0,
        });
        let sier = self.regs.slave_interrupts();
        self.regs.set_slave_interrupts(
            sier.with_tdie(direction == Direction::Send)
                .with_rdie(direction == Direction::Receive),
        );
        env.emit(
            self.hw_unit(),
            EventKind::SlaveAddressed {
                direction,
                accepted: true,
            },
        );
    }

    fn on_slave_interrupt(&mut self, env: &mut Env<'_>) {
        let status = self.regs.slave_status();
        let enabled = self.regs.slave_interrupts();
        if let Some(error) = slave_error(status) {
            self.fail_slave(error, env);
            return;
        }
        if status.avf() && enabled.avie() {
            self.on_address(env);
        }
        if status.rdf() && enabled.rdie() {
            self.on_slave_rx();
        }
        if status.tdf() && enabled.tdie() {
            self.on_slave_tx();
        }
        if status.sdf() && enabled.sdie() {
            self.regs
                .clear_slave_status(SlaveStatus::new_with_raw_value(0).with_sdf(true));
            self.finish_slave(env);
        }
    }

    fn on_address(&mut self, env: &mut Env<'_>) {
        let received = self.regs.received_address();
        // R/W bit set: the master reads, so the slave sends.
        let direction = if received.raddr().value() & 1 != 0 {
            Direction::Send
        } else {
            Direction::Receive
        };
        // A repeated start inside an accepted transaction keeps it accepted.
        let accepted = self.slave.is_some() || (self.listening && !self.slave_buffer.is_null());
        if accepted {
            self.accept(direction, env);
            return;
        }
        // Data interrupts stay masked, SCL is stretched until the application listens.
        let sier = self.regs.slave_interrupts();
        self.regs
            .set_slave_interrupts(sier.with_tdie(false).with_rdie(false));
        self.stalled = Some(direction);
        log::debug!(
            "I2C module {}: addressed for {:?} while not listening",
            self.module,
            direction
        );
        env.emit(
            self.hw_unit(),
            EventKind::SlaveAddressed {
                direction,
                accepted: false,
            },
        );
    }

    fn on_slave_rx(&mut self) {
        let data = self.regs.pop_slave_data();
        if data.rxempty() {
            return;
        }
        let Some(slave) = self.slave.as_mut() else {
            return;
        };
        if slave.index < self.slave_len {
            if let Some(slot) =
                unsafe { self.slave_buffer.get_mut() }.and_then(|buf| buf.get_mut(slave.index))
            {
                *slot = data.data();
            }
        }
        slave.index += 1;
    }

    fn on_slave_tx(&mut self) {
        let Some(slave) = self.slave.as_mut() else {
            return;
        };
        let byte = if slave.index < self.slave_len {
            unsafe { self.slave_buffer.get_mut() }
                .and_then(|buf| buf.get(slave.index).copied())
                .unwrap_or(SLAVE_FILL_BYTE)
        } else {
            SLAVE_FILL_BYTE
        };
        self.regs.push_slave_data(byte);
        slave.index += 1;
    }

    fn finish_slave(&mut self, env: &mut Env<'_>) {
        let sier = self.regs.slave_interrupts();
        self.regs
            .set_slave_interrupts(sier.with_tdie(false).with_rdie(false));
        let Some(slave) = self.slave.take() else {
            return;
        };
        let bytes = slave.index.min(self.slave_len);
        self.slave_buffer.set_null();
        self.slave_len = 0;
        self.listening = false;
        log::debug!(
            "I2C module {}: slave {:?} of {} bytes done",
            self.module,
            slave.direction,
            bytes
        );
        env.emit(
            self.hw_unit(),
            EventKind::SlaveDone {
                direction: slave.direction,
                bytes,
            },
        );
    }

    pub(super) fn fail_slave(&mut self, error: BusError, env: &mut Env<'_>) {
        self.regs.clear_slave_status(SLAVE_W1C);
        if error == BusError::SlaveFifoError {
            let scr = self.regs.slave_control();
            self.regs.set_slave_control(scr.with_rtf(true).with_rrf(true));
        }
        let sier = self.regs.slave_interrupts();
        self.regs
            .set_slave_interrupts(sier.with_tdie(false).with_rdie(false));
        self.slave = None;
        self.listening = false;
        self.stalled = None;
        log::warn!("I2C module {}: slave error: {}", self.module, error);
        env.emit(self.hw_unit(), EventKind::Fault(error));
    }
}

impl<L: Lpi2cRegisters> Lpi2cEngine<L> {
    /// Interrupt entry of controller module `module`.
    ///
    /// Interrupts of a module without configuration reset the module.
    pub(crate) fn on_interrupt(&mut self, module: usize, env: &mut Env<'_>) {
        let Some(unit) = self.units.get_mut(module) else {
            return;
        };
        let Some(setup) = unit.setup else {
            log::trace!("I2C module {module}: interrupt while unconfigured, resetting");
            unit.reset_hardware();
            return;
        };
        if setup.role.is_master() {
            let status = unit.regs.master_status();
            unit.on_master_interrupt(status, env);
        }
        if setup.role.is_slave() {
            unit.on_slave_interrupt(env);
        }
    }
}
