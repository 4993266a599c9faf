//! # Register definitions for the I2C transfer engines
//!
//! This crate only describes register layouts. It contains no behavior: every access is a
//! volatile read or write generated by [derive_mmio].
//!
//! - [lpi2c]: dedicated I2C controller with command and receive FIFOs for the master side and
//!   a single byte data path for the slave side.
//! - [flexio]: generic shifter and timer block which can be configured to emulate I2C.
#![no_std]

pub mod flexio;
pub mod lpi2c;
