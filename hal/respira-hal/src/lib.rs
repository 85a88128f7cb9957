//! Hardware abstraction traits for the Respira ventilator core
//!
//! The sensing/actuation core never touches registers directly; every
//! hardware interaction goes through one of these seams:
//!
//! - [`i2c::I2cBus`] - I2C master transactions (sensors, mux, EEPROM)
//! - [`gpio`] - digital pins and the bus enable-line switch used by
//!   enable-pin multiplexed sensor boards
//!
//! Board crates implement these for their chip and hand the concrete
//! types to `respira-drivers`.

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod i2c;

pub use gpio::{EnableLines, InputPin, NoEnables, OutputPin};
pub use i2c::I2cBus;
