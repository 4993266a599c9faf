//! DMA driven master transfers.
//!
//! The address commands are pushed by the CPU. Data bytes move in bursts of at most one FIFO
//! depth, each burst is one DMA descriptor which is started once the previous burst completed.
//! For a send the stop command follows the last burst, for a receive it is queued right after
//! the receive command. Transfers without STOP end once the command FIFO ran empty.
use arbitrary_int::u2;
use mcu_i2c_regs::lpi2c::{FifoControl, MasterDma, MasterInterrupts};

use super::{Lpi2cRegisters, Lpi2cUnit, master_error, stop_command};
use crate::{
    BusError,
    dma::{Endpoint, TransferDescriptor},
    engine::{Env, TransferMode},
    request::Direction,
};

/// Deepest receive watermark of the controller.
const MAX_RX_BURST: usize = 4;

const fn error_interrupts() -> MasterInterrupts {
    MasterInterrupts::new_with_raw_value(0)
        .with_ndie(true)
        .with_alie(true)
        .with_feie(true)
        .with_pltie(true)
}

pub(super) fn start<L: Lpi2cRegisters>(unit: &mut Lpi2cUnit<L>, env: &mut Env<'_>) {
    if unit.dma_channels().is_none() {
        log::warn!(
            "I2C module {}: no DMA channels, using interrupts",
            unit.module
        );
        if let Some(xfer) = unit.master.as_mut() {
            xfer.mode = TransferMode::Interrupt;
        }
        unit.start_interrupt();
        return;
    }
    let Some(mut xfer) = unit.master else {
        return;
    };
    while let Some(cmd) = xfer.prologue[..xfer.prologue_len].get(xfer.prologue_sent).copied() {
        if !unit.push_blocking(cmd, env.poll_budget) {
            unit.fail_master(BusError::Timeout, env);
            return;
        }
        xfer.prologue_sent += 1;
    }
    if xfer.transfer.direction() == Direction::Receive
        && !xfer.transfer.no_stop
        && !unit.push_blocking(stop_command(), env.poll_budget)
    {
        unit.fail_master(BusError::Timeout, env);
        return;
    }
    xfer.stop_queued |= xfer.transfer.direction() == Direction::Receive;
    unit.master = Some(xfer);
    unit.regs.set_master_interrupts(error_interrupts());
    next_burst(unit, env);
}

fn next_burst<L: Lpi2cRegisters>(unit: &mut Lpi2cUnit<L>, env: &mut Env<'_>) {
    let Some(channels) = unit.dma_channels() else {
        return;
    };
    let tx_data = unit.regs.transmit_data_address();
    let rx_data = unit.regs.receive_data_address();
    let Some(xfer) = unit.master.as_mut() else {
        return;
    };
    let Some(buffer) = (unsafe { xfer.transfer.buffer_address() }) else {
        return;
    };
    let remaining = xfer.transfer.len.saturating_sub(xfer.dma_offset);
    match xfer.transfer.direction() {
        Direction::Send => {
            let len = remaining.min(unit.tx_fifo_depth);
            xfer.dma_segment = len;
            let desc = TransferDescriptor::burst(
                Endpoint::Incrementing(buffer + xfer.dma_offset),
                Endpoint::Fixed(tx_data),
                len,
            );
            env.dma.configure(channels.tx, &desc);
            env.dma.enable_notification(channels.tx);
            env.dma.enable(channels.tx);
            unit.regs
                .set_master_dma(MasterDma::new_with_raw_value(0).with_tdde(true));
        }
        Direction::Receive => {
            let len = remaining.min(unit.rx_fifo_depth).min(MAX_RX_BURST);
            xfer.dma_segment = len;
            // Request once the whole burst is in the FIFO.
            unit.regs.set_fifo_control(
                FifoControl::new_with_raw_value(0)
                    .with_rxwater(u2::new((len.saturating_sub(1) & 0b11) as u8)),
            );
            let desc = TransferDescriptor::burst(
                Endpoint::Fixed(rx_data),
                Endpoint::Incrementing(buffer + xfer.dma_offset),
                len,
            );
            env.dma.configure(channels.rx, &desc);
            env.dma.enable_notification(channels.rx);
            env.dma.enable(channels.rx);
            unit.regs
                .set_master_dma(MasterDma::new_with_raw_value(0).with_rdde(true));
        }
    }
}

pub(super) fn on_complete<L: Lpi2cRegisters>(
    unit: &mut Lpi2cUnit<L>,
    dma_channel: u8,
    env: &mut Env<'_>,
) {
    let Some(channels) = unit.dma_channels() else {
        return;
    };
    let Some(xfer) = unit.master.as_mut() else {
        log::trace!(
            "I2C module {}: DMA completion without transfer",
            unit.module
        );
        return;
    };
    if xfer.mode != TransferMode::Dma || !channels.contains(dma_channel) {
        return;
    }
    unit.regs.set_master_dma(MasterDma::new_with_raw_value(0));
    env.dma.disable(dma_channel);
    xfer.dma_offset += xfer.dma_segment;
    xfer.index = xfer.dma_offset;
    xfer.dma_segment = 0;
    let done = xfer.dma_offset >= xfer.transfer.len;
    let direction = xfer.transfer.direction();
    let no_stop = xfer.transfer.no_stop;

    if let Some(error) = master_error(unit.regs.master_status()) {
        unit.fail_master(error, env);
        return;
    }
    if !done {
        next_burst(unit, env);
        return;
    }
    if direction == Direction::Send {
        if !no_stop && !unit.push_blocking(stop_command(), env.poll_budget) {
            unit.fail_master(BusError::Timeout, env);
            return;
        }
        if let Some(xfer) = unit.master.as_mut() {
            xfer.stop_queued = true;
        }
    }
    unit.wait_for_stop(env);
}
