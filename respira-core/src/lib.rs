//! Board-agnostic core logic for the Respira ventilator controller
//!
//! This crate contains all sensing/actuation logic that does not depend
//! on specific hardware implementations:
//!
//! - Actuator traits and the motor-output abstraction
//! - Motor-type autodetection state machine
//! - Stepper speed-ramp generator (acceleration-limited step scheduling)
//! - Flow, volume and tidal-volume math for both body geometries
//! - Sensor offset calibration
//! - Breath-settings sanitization
//! - Interrupt-boundary feedback counters
//!
//! Everything here is a deterministic function of its inputs plus caller
//! supplied timestamps, so the whole crate tests on the host.

#![no_std]
#![deny(unsafe_code)]

pub mod calibration;
pub mod config;
pub mod detect;
pub mod feedback;
pub mod flow;
pub mod motion;
pub mod traits;
