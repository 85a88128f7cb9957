//! Real-time motion generation
//!
//! [`ramp::SpeedRamp`] turns a target position or speed into a schedule of
//! inter-step intervals under an acceleration limit. It never sleeps; the
//! control loop polls it and emits a pulse when one is due.

pub mod ramp;

pub use ramp::SpeedRamp;
