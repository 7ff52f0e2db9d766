//! Drivers for the sensors on M5Stack environment units, written against
//! the blocking `embedded-hal` 1.0 traits.
//!
//! Every driver implements [`Component`] for detection and polling and
//! [`PeriodicMeasurement`] for the buffered results of periodic mode.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod component;
mod error;
pub mod periodic;
mod register;
mod sensirion;

pub mod bme688;
pub mod bmp280;
pub mod env;
pub mod qmp6988;
pub mod scd4x;
pub mod sgp30;
pub mod sht3x;
pub mod sht4x;

#[cfg(test)]
mod debug_utils;

pub use component::Component;
pub use error::Error;
pub use periodic::{Periodic, PeriodicMeasurement};
