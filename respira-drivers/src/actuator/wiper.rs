//! Wiper gearmotor backend
//!
//! A windscreen-wiper motor on the same H-bridge stage: torquey, cheap,
//! everywhere - but happy at only one speed, so the percent commands
//! collapse onto a fixed sweep duty. Its park switch doubles as the home
//! sensor. The dual-enable reversal rule applies unchanged.

use super::{REVERSAL_SETTLE_MS, WIPER_SWEEP_SPEED};
use embedded_hal::delay::DelayNs;
use respira_core::traits::MotorOutputs;
use respira_protocol::RunState;

/// Wiper motor state
pub struct WiperMotor {
    /// Either 0 or the sweep duty
    speed: u8,
    forward: bool,
    run_state: RunState,
}

impl Default for WiperMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl WiperMotor {
    pub fn new() -> Self {
        Self {
            speed: 0,
            forward: true,
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
        if self.forward {
            outputs.set_reverse_enable(false);
            outputs.set_forward_enable(true);
        } else {
            outputs.set_forward_enable(false);
            outputs.set_reverse_enable(true);
        }
        outputs.set_pwm(self.speed);
    }

    pub fn reverse(&mut self, outputs: &mut impl MotorOutputs, delay: &mut impl DelayNs) {
        self.forward = !self.forward;

        outputs.set_pwm(0);
        outputs.set_forward_enable(false);
        outputs.set_reverse_enable(false);
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

    /// Fixed-speed family: any speed-up means "run at sweep speed"
    pub fn speed_up(&mut self, outputs: &mut impl MotorOutputs) {
        self.speed = WIPER_SWEEP_SPEED;
        self.run_state = RunState::Running;
        self.go(outputs);
    }

    /// No intermediate speeds to slow to; stays at sweep while running
    pub fn slow_down(&mut self, _outputs: &mut impl MotorOutputs) {}

    /// Run toward the park switch
    pub fn begin_homing(&mut self, outputs: &mut impl MotorOutputs, delay: &mut impl DelayNs) {
        self.speed = WIPER_SWEEP_SPEED;
        self.reverse(outputs, delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDelay, SimOutputs};

    #[test]
    fn runs_only_at_sweep_speed() {
        let mut motor = WiperMotor::new();
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        assert_eq!(motor.speed(), WIPER_SWEEP_SPEED);
        motor.slow_down(&mut out);
        assert_eq!(motor.speed(), WIPER_SWEEP_SPEED);
    }

    #[test]
    fn reversal_keeps_the_enables_exclusive() {
        let mut motor = WiperMotor::new();
        let mut out = SimOutputs::default();
        let mut delay = SimDelay::default();
        motor.speed_up(&mut out);
        for _ in 0..4 {
            motor.reverse(&mut out, &mut delay);
        }
        assert_eq!(out.dual_enable_violations, 0);
    }

    #[test]
    fn stop_drops_everything() {
        let mut motor = WiperMotor::new();
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        motor.stop(&mut out);
        assert_eq!(out.pwm, 0);
        assert!(!out.forward_enable && !out.reverse_enable);
    }
}
