//! Download-then-play pipeline logic, independent of the board.
//!
//! Everything here is `no_std` and runs on the host under `cargo test`; the
//! HAL crate and the firmware binary plug radio, flash and I2S into the
//! traits defined below.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

pub mod audio;
pub mod config;
pub mod download;
pub mod http;
pub mod run;
pub mod storage;

#[cfg(test)]
mod testing;
