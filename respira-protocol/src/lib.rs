//! Shared types between the Respira core and its operator-facing layers
//!
//! The serial command parser, the settings/EEPROM persistence code and the
//! display renderer all live outside this repository. What they share with
//! the sensing/actuation core is defined here:
//!
//! - [`health`] - system-health snapshots and the diagnostic events the
//!   core emits each control-loop tick
//! - [`record`] - the byte layout of the per-unit configuration record
//!   stored in the sensor-head EEPROM
//!
//! With the `wire` feature enabled, events and health snapshots encode to
//! `postcard` for the serial link.

#![no_std]
#![deny(unsafe_code)]

pub mod health;
pub mod record;

pub use health::{BodyType, BusTopology, CoreEvent, MotorKind, RunState, SystemHealth};
pub use record::{SensorMapping, UnitRecord, EEPROM_PAGE_SIZE, RECORD_LEN};
