//! A flash programming algorithm for the internal flash of STM32WBA MCUs, in the CMSIS
//! layout that debug probes load into RAM: a `DevDscr` device description plus the `Init`,
//! `UnInit`, `EraseChip`, `EraseSector` and `ProgramPage` entry points.
//!
//! The algorithm figures out at runtime whether it runs in the secure or non-secure domain,
//! and whether the part has one or two banks, and drives the matching controller registers.
//!
//! Register access goes through the [`port::FlashPort`] trait, so the erase and program
//! sequences run unchanged against a simulated controller in host tests.
//!
//! Enable the `defmt` feature for log output. The `option-bytes` feature builds the
//! option-byte variant of the algorithm.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

#[macro_use]
mod macros;

pub mod algo;
pub mod device;
pub mod error;
pub mod flash;
pub mod port;
pub mod regs;
pub mod topology;

#[cfg(test)]
mod sim;
