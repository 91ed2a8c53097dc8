//! An embedded BLE proximity-detection stack implementing the Herald protocol.
//!
//! Peers advertise a Herald service along with a rotating pseudo-identifier, scan for other
//! Herald peers, opportunistically connect to read an opaque identity payload, and record
//! proximity measurements keyed by pseudo-identity. Proximity samples can then be fed into the
//! [`exposure`] engine, which aggregates them into per-agent risk scores.
//!
//! # Using the stack
//!
//! Proxima is runtime and hardware-agnostic: It does not need an RTOS (although you can certainly
//! use one if you want) and provides hardware interfaces that need to be implemented once for
//! every supported MCU family or host stack.
//!
//! The platform layer provides implementations of the [`hal`] traits (advertiser, scanner,
//! central-role reader, and the local GATT transmitter) and a [`Clock`], and drives the core by
//! feeding scan reports and read callbacks into [`ble::BleSensor`]. Everything the C-style
//! implementations of this protocol keep in file-scope globals is an explicit value here, owned
//! by the caller.
//!
//! [`Clock`]: time/trait.Clock.html
//! [`hal`]: hal/index.html
//! [`ble::BleSensor`]: ble/struct.BleSensor.html

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
#[macro_use]
mod utils;
pub mod addr;
pub mod ble;
pub mod bytes;
pub mod config;
mod error;
pub mod exposure;
pub mod hal;
pub mod payload;
pub mod time;
pub mod uuid;

pub use self::error::Error;
