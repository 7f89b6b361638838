//! ESP32-S3 glue for the download-and-play firmware.

#![no_std]
#![allow(async_fn_in_trait)]

pub mod audio;
pub mod network;
pub mod storage;
