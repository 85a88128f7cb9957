//! Actuator backends and the motor controller
//!
//! Four motor families can drive the bag compressor arm. Each backend is
//! pure logic over the [`MotorOutputs`] seam, so the reversal interlock
//! and speed handling are testable without hardware. The controller owns
//! whichever backend autodetection binds and runs the detection state
//! machine until then.
//!
//! Reversal rule for every DC-drive family: command zero output, let the
//! driver stage settle if the motor was moving, and only then raise the
//! new direction's line - with the opposite line already dropped. The
//! two drive enables must never be active together.

pub mod bldc;
pub mod controller;
pub mod hbridge;
pub mod stepper;
pub mod wiper;

use respira_core::traits::MotorOutputs;
use respira_protocol::{MotorKind, RunState};

pub use controller::MotorController;

/// Probe/minimum sweep duty per family, percent
pub const HBRIDGE_SWEEP_SPEED: u8 = 11;
pub const BLDC_SWEEP_SPEED: u8 = 50;
pub const WIPER_SWEEP_SPEED: u8 = 65;
/// Stepper probe sweep in steps per second
pub const STEPPER_SWEEP_SPEED: f32 = 50.0;

/// Settle time between zeroing the output and re-enabling the opposite
/// drive line during a reversal
pub const REVERSAL_SETTLE_MS: u32 = 10;

/// Default stepper geometry
pub const STEPPER_STEPS_PER_REV: u16 = 200;
/// Speed ceiling: three revs per second
pub const STEPPER_MAX_SPEED: f32 = STEPPER_STEPS_PER_REV as f32 * 3.0;
/// Ramp acceleration in steps/s^2
pub const STEPPER_ACCELERATION: f32 = 2000.0;

/// Map a percentage to a full-scale value
pub(crate) fn scale_percent(percent: u8, full_scale: f32) -> f32 {
    full_scale * percent.min(100) as f32 / 100.0
}

/// The bound actuator, dispatched by family tag
///
/// Exactly one family is active at a time; rebinding goes through the
/// detection state machine in [`controller`].
pub enum MotorBinding {
    None,
    HBridge(hbridge::HBridgeMotor),
    Stepper(stepper::StepperMotor),
    Brushless(bldc::BldcMotor),
    Wiper(wiper::WiperMotor),
}

impl MotorBinding {
    pub fn kind(&self) -> MotorKind {
        match self {
            MotorBinding::None => MotorKind::Unknown,
            MotorBinding::HBridge(_) => MotorKind::HBridge,
            MotorBinding::Stepper(_) => MotorKind::Stepper,
            MotorBinding::Brushless(_) => MotorKind::Brushless,
            MotorBinding::Wiper(_) => MotorKind::Wiper,
        }
    }

    pub fn run_state(&self) -> RunState {
        match self {
            MotorBinding::None => RunState::Stopped,
            MotorBinding::HBridge(m) => m.run_state(),
            MotorBinding::Stepper(m) => m.run_state(),
            MotorBinding::Brushless(m) => m.run_state(),
            MotorBinding::Wiper(m) => m.run_state(),
        }
    }

    pub fn speed(&self) -> u8 {
        match self {
            MotorBinding::None => 0,
            MotorBinding::HBridge(m) => m.speed(),
            MotorBinding::Stepper(m) => m.speed(),
            MotorBinding::Brushless(m) => m.speed(),
            MotorBinding::Wiper(m) => m.speed(),
        }
    }

    pub fn speed_up(&mut self, outputs: &mut impl MotorOutputs) {
        match self {
            MotorBinding::None => {}
            MotorBinding::HBridge(m) => m.speed_up(outputs),
            MotorBinding::Stepper(m) => m.speed_up(outputs),
            MotorBinding::Brushless(m) => m.speed_up(outputs),
            MotorBinding::Wiper(m) => m.speed_up(outputs),
        }
    }

    pub fn slow_down(&mut self, outputs: &mut impl MotorOutputs) {
        match self {
            MotorBinding::None => {}
            MotorBinding::HBridge(m) => m.slow_down(outputs),
            MotorBinding::Stepper(m) => m.slow_down(outputs),
            MotorBinding::Brushless(m) => m.slow_down(outputs),
            MotorBinding::Wiper(m) => m.slow_down(outputs),
        }
    }

    pub fn reverse(
        &mut self,
        outputs: &mut impl MotorOutputs,
        delay: &mut impl embedded_hal::delay::DelayNs,
    ) {
        match self {
            MotorBinding::None => {}
            MotorBinding::HBridge(m) => m.reverse(outputs, delay),
            MotorBinding::Stepper(m) => m.reverse(outputs),
            MotorBinding::Brushless(m) => m.reverse(outputs, delay),
            MotorBinding::Wiper(m) => m.reverse(outputs, delay),
        }
    }

    pub fn stop(&mut self, outputs: &mut impl MotorOutputs) {
        match self {
            MotorBinding::None => {}
            MotorBinding::HBridge(m) => m.stop(outputs),
            MotorBinding::Stepper(m) => m.stop(outputs),
            MotorBinding::Brushless(m) => m.stop(outputs),
            MotorBinding::Wiper(m) => m.stop(outputs),
        }
    }

    /// Per-tick run work; only the stepper emits anything here
    pub fn run(&mut self, now_us: u32, outputs: &mut impl MotorOutputs) {
        if let MotorBinding::Stepper(m) = self {
            m.run(now_us, outputs);
        }
    }

    /// Start moving toward the home switch at homing speed
    pub fn begin_homing(
        &mut self,
        outputs: &mut impl MotorOutputs,
        delay: &mut impl embedded_hal::delay::DelayNs,
    ) {
        match self {
            MotorBinding::None => {}
            MotorBinding::HBridge(m) => m.begin_homing(outputs, delay),
            MotorBinding::Stepper(m) => m.begin_homing(outputs),
            MotorBinding::Brushless(m) => m.begin_homing(outputs, delay),
            MotorBinding::Wiper(m) => m.begin_homing(outputs, delay),
        }
    }
}
