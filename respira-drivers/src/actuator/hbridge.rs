//! H-bridge DC motor backend (BTS7960-class driver stage)
//!
//! Two active-high drive enables select direction and a shared PWM line
//! sets the duty. Enabling both sides shoots current straight through
//! the bridge, so every direction change drops the old line before the
//! new one rises and lets the stage settle at zero output in between.

use super::REVERSAL_SETTLE_MS;
use embedded_hal::delay::DelayNs;
use respira_core::traits::MotorOutputs;
use respira_protocol::RunState;

/// H-bridge DC motor state
pub struct HBridgeMotor {
    /// Commanded speed, percent
    speed: u8,
    forward: bool,
    min_speed: u8,
    homing_speed: u8,
    run_state: RunState,
}

impl HBridgeMotor {
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

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Apply the current direction and duty to the outputs
    ///
    /// The inactive line always drops before the active line rises.
    fn go(&mut self, outputs: &mut impl MotorOutputs) {
        if self.forward {
            outputs.set_reverse_enable(false);
            outputs.set_forward_enable(true);
        } else {
            outputs.set_forward_enable(false);
            outputs.set_reverse_enable(true);
        }
        outputs.set_pwm(self.speed);
    }

    /// Flip direction with the zero-output settle sequence
    ///
    /// Reversals head back toward the home switch, so the motor comes
    /// out of this homing.
    pub fn reverse(&mut self, outputs: &mut impl MotorOutputs, delay: &mut impl DelayNs) {
        self.forward = !self.forward;

        outputs.set_pwm(0);
        outputs.set_forward_enable(false);
        outputs.set_reverse_enable(false);
        // Only a spinning motor needs the stage to bleed off
        if self.speed > 0 {
            delay.delay_ms(REVERSAL_SETTLE_MS);
        }
        self.run_state = RunState::Homing;
        self.go(outputs);
    }

    pub fn stop(&mut self, outputs: &mut impl MotorOutputs) {
        outputs.set_pwm(0);
        outputs.set_forward_enable(false);
        outputs.set_reverse_enable(false);
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

    /// Head for the home switch at homing speed
    pub fn begin_homing(&mut self, outputs: &mut impl MotorOutputs, delay: &mut impl DelayNs) {
        self.speed = self.homing_speed;
        self.reverse(outputs, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDelay, SimOutputs};

    #[test]
    fn speed_up_jumps_to_minimum() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        assert_eq!(motor.speed(), 11);
        assert_eq!(out.pwm, 11);
        assert_eq!(motor.run_state(), RunState::Running);
    }

    #[test]
    fn slow_down_floors_at_minimum() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        for _ in 0..5 {
            motor.speed_up(&mut out);
        }
        for _ in 0..50 {
            motor.slow_down(&mut out);
        }
        assert_eq!(motor.speed(), 11);
    }

    #[test]
    fn forward_raises_only_the_forward_line() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        assert!(out.forward_enable);
        assert!(!out.reverse_enable);
        assert_eq!(out.dual_enable_violations, 0);
    }

    #[test]
    fn reversal_never_activates_both_enables() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        let mut delay = SimDelay::default();

        motor.speed_up(&mut out);
        for _ in 0..6 {
            motor.reverse(&mut out, &mut delay);
        }
        assert_eq!(out.dual_enable_violations, 0);
    }

    #[test]
    fn reversal_of_a_moving_motor_settles_first() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        let mut delay = SimDelay::default();

        motor.speed_up(&mut out);
        motor.reverse(&mut out, &mut delay);
        assert_eq!(delay.total_ns, REVERSAL_SETTLE_MS as u64 * 1_000_000);
        assert!(out.reverse_enable);
        assert!(!out.forward_enable);
    }

    #[test]
    fn reversal_at_rest_skips_the_settle() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        let mut delay = SimDelay::default();
        motor.reverse(&mut out, &mut delay);
        assert_eq!(delay.total_ns, 0);
    }

    #[test]
    fn stop_kills_output_and_both_enables() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        motor.stop(&mut out);
        assert_eq!(out.pwm, 0);
        assert!(!out.forward_enable);
        assert!(!out.reverse_enable);
        assert_eq!(motor.run_state(), RunState::Stopped);
    }

    #[test]
    fn homing_runs_at_homing_speed() {
        let mut motor = HBridgeMotor::new(11, 12);
        let mut out = SimOutputs::default();
        let mut delay = SimDelay::default();
        motor.begin_homing(&mut out, &mut delay);
        assert_eq!(motor.speed(), 12);
        assert_eq!(motor.run_state(), RunState::Homing);
        assert_eq!(out.pwm, 12);
    }
}
