//! DMA driven transfers of the shift-timer engine.
//!
//! A send is fully prepared in the channel's frame buffer: address, data and the stop frame are
//! moved into the transmit shifter by one DMA channel while a second one drains the read back
//! frames. The SCL timer interrupt completes the transfer.
//!
//! A receive needs the ACK slot of the last byte changed to NACK while the transfer runs. The
//! CPU loads the address frame, DMA loads all fill frames except the last one and the read back
//! frames land in the frame buffer. The last fill frame and the stop frame are loaded from the
//! interrupt handler again.
//!
//! The frame buffer lives inside the engine, so the driver must not move while a DMA transfer
//! is in flight.
use mcu_i2c_regs::flexio::StopBit;

use super::{
    FlexioChannel, FlexioRegisters, IDLE_BYTE, STOP_BYTE, bit, enable_shifter_dma,
    enable_status_interrupts, enable_timer_interrupts, set_stop_bits,
};
use crate::{
    dma::{Endpoint, TransferDescriptor},
    engine::{Env, TransferMode},
    request::Direction,
};

/// Source of the receive fill frames.
static IDLE_PATTERN: u8 = IDLE_BYTE;

pub(super) fn start<F: FlexioRegisters>(
    channel: &mut FlexioChannel,
    regs: &mut F,
    address_byte: u8,
    env: &mut Env<'_>,
) {
    let Some(cfg) = channel.setup else {
        return;
    };
    let tx = cfg.tx_shifter as usize;
    let Some(dma) = cfg.dma else {
        log::warn!(
            "soft I2C channel {}: no DMA channels, using interrupts",
            channel.sub_channel
        );
        if let Some(xfer) = channel.xfer.as_mut() {
            xfer.mode = TransferMode::Interrupt;
        }
        regs.write_tx_buffer(tx, address_byte);
        channel.enable_interrupts(regs, &cfg);
        return;
    };
    let tx_data = regs.tx_buffer_address(tx);
    let rx_data = regs.rx_buffer_address(cfg.rx_shifter as usize);
    let Some(xfer) = channel.xfer.as_mut() else {
        return;
    };
    let len = xfer.transfer.len;
    match xfer.transfer.direction() {
        Direction::Send => {
            channel.aux[0] = address_byte;
            for index in 0..len {
                channel.aux[index + 1] =
                    unsafe { xfer.transfer.send_byte(index) }.unwrap_or(IDLE_BYTE);
            }
            channel.aux[len + 1] = STOP_BYTE;
            xfer.fed = len;
            xfer.stop_written = true;
            // An expected address NACK disables the ACK check for the whole transfer, the
            // stop bits cannot be changed between DMA driven frames.
            if xfer.transfer.expect_nack {
                log::debug!(
                    "soft I2C channel {}: ACK check disabled for DMA send",
                    channel.sub_channel
                );
            }
            let frames = channel.aux.as_ptr() as usize;
            let scratch = core::ptr::addr_of_mut!(channel.scratch) as usize;
            env.dma.configure(
                dma.rx,
                &TransferDescriptor::bytewise(
                    Endpoint::Fixed(rx_data),
                    Endpoint::Fixed(scratch),
                    len + 1,
                ),
            );
            env.dma.configure(
                dma.tx,
                &TransferDescriptor::bytewise(
                    Endpoint::Incrementing(frames),
                    Endpoint::Fixed(tx_data),
                    len + 2,
                ),
            );
            env.dma.enable(dma.rx);
            env.dma.enable(dma.tx);
            enable_timer_interrupts(regs, bit(cfg.scl_timer), true);
            enable_shifter_dma(regs, cfg.shifter_mask(), true);
        }
        Direction::Receive => {
            let frames = channel.aux.as_mut_ptr() as usize;
            env.dma.configure(
                dma.rx,
                &TransferDescriptor::bytewise(
                    Endpoint::Fixed(rx_data),
                    Endpoint::Incrementing(frames),
                    len + 1,
                ),
            );
            env.dma.enable(dma.rx);
            enable_shifter_dma(regs, bit(cfg.rx_shifter), true);
            enable_timer_interrupts(regs, bit(cfg.scl_timer), true);
            enable_status_interrupts(regs, bit(cfg.tx_shifter), true);
            regs.write_tx_buffer(tx, address_byte);
        }
    }
}

/// Hand the fill frames of a receive to DMA. Returns false if the transmit shifter is to be
/// served by the CPU.
pub(super) fn start_fill<F: FlexioRegisters>(
    channel: &mut FlexioChannel,
    regs: &mut F,
    env: &mut Env<'_>,
) -> bool {
    let Some(cfg) = channel.setup else {
        return false;
    };
    let Some(dma) = cfg.dma else {
        return false;
    };
    let Some(xfer) = channel.xfer.as_mut() else {
        return false;
    };
    if xfer.mode != TransferMode::Dma
        || xfer.transfer.direction() != Direction::Receive
        || xfer.fed != 0
        || xfer.dma_fill
        || xfer.transfer.len < 2
    {
        return false;
    }
    set_stop_bits(regs, &cfg, StopBit::Low, StopBit::Low);
    let tx_data = regs.tx_buffer_address(cfg.tx_shifter as usize);
    env.dma.configure(
        dma.tx,
        &TransferDescriptor::bytewise(
            Endpoint::Fixed(core::ptr::addr_of!(IDLE_PATTERN) as usize),
            Endpoint::Fixed(tx_data),
            xfer.transfer.len - 1,
        ),
    );
    env.dma.enable_notification(dma.tx);
    env.dma.enable(dma.tx);
    xfer.dma_fill = true;
    enable_status_interrupts(regs, bit(cfg.tx_shifter), false);
    enable_shifter_dma(regs, bit(cfg.tx_shifter), true);
    true
}

pub(super) fn on_complete<F: FlexioRegisters>(
    channel: &mut FlexioChannel,
    regs: &mut F,
    dma_channel: u8,
    env: &mut Env<'_>,
) {
    let Some(cfg) = channel.setup else {
        return;
    };
    let Some(dma) = cfg.dma else {
        return;
    };
    // Receive frames are complete once the SCL timer expires.
    if dma_channel != dma.tx {
        return;
    }
    let Some(xfer) = channel.xfer.as_mut() else {
        log::trace!(
            "soft I2C channel {}: DMA completion without transfer",
            channel.sub_channel
        );
        return;
    };
    if !xfer.dma_fill {
        return;
    }
    enable_shifter_dma(regs, bit(cfg.tx_shifter), false);
    env.dma.disable(dma.tx);
    xfer.fed = xfer.transfer.len - 1;
    xfer.dma_fill = false;
    enable_status_interrupts(regs, bit(cfg.tx_shifter), true);
}
