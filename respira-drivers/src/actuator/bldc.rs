//! Brushless motor backend
//!
//! Commercial BLDC drive: PWM speed input, a direction select pin, and a
//! commutation feedback output that pulses as the rotor turns (that
//! feedback line shares the stepper-enable pin, handled by the pin-mode
//! switching in the detection layer). The drive electronics object to a
//! direction flip under power just like an H-bridge, so reversals zero
//! the PWM and settle before the direction pin moves.

use super::REVERSAL_SETTLE_MS;
use embedded_hal::delay::DelayNs;
use respira_core::traits::MotorOutputs;
use respira_protocol::RunState;

/// Brushless motor state
pub struct BldcMotor {
    /// Commanded speed, percent
    speed: u8,
    forward: bool,
    min_speed: u8,
    homing_speed: u8,
    run_state: RunState,
}

impl BldcMotor {
    pub fn new(min_speed: u8, homing_speed: u8) -> Self {
        Self {
            speed: 0,
            forward: true,
            min_speed,
            homing_speed,
            run_state: RunState::Stopped,
        }
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    fn go(&mut self, outputs: &mut impl MotorOutputs) {
        outputs.set_direction(self.forward);
        outputs.set_pwm(self.speed);
    }

    /// Flip direction: zero output, settle, then move the select pin
    pub fn reverse(&mut self, outputs: &mut impl MotorOutputs, delay: &mut impl DelayNs) {
        self.forward = !self.forward;

        outputs.set_pwm(0);
        if self.speed > 0 {
            delay.delay_ms(REVERSAL_SETTLE_MS);
        }
        self.run_state = RunState::Homing;
        self.go(outputs);
    }

    pub fn stop(&mut self, outputs: &mut impl MotorOutputs) {
        outputs.set_pwm(0);
        self.speed = 0;
        self.run_state = RunState::Stopped;
    }

    pub fn speed_up(&mut self, outputs: &mut impl MotorOutputs) {
        if self.speed < 100 {
            self.speed += 1;
            if self.speed < self.min_speed {
                self.speed = self.min_speed;
            }
            self.run_state = RunState::Running;
            self.go(outputs);
        }
    }

    pub fn slow_down(&mut self, outputs: &mut impl MotorOutputs) {
        if self.speed > self.min_speed {
            self.speed -= 1;
            self.run_state = RunState::Running;
            self.go(outputs);
        }
    }

    pub fn begin_homing(&mut self, outputs: &mut impl MotorOutputs, delay: &mut impl DelayNs) {
        self.speed = self.homing_speed;
        self.reverse(outputs, delay);
    }
}
