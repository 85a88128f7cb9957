//! Stepper motor backend
//!
//! Step/dir driver behind an active-low enable that physically shares a
//! pin with the brushless feedback input. The speed ramp lives in
//! `respira-core`; this backend scales percent commands onto it and
//! pulses the step pin when the ramp says one is due.
//!
//! Pure steppers reverse electrically without a settle window - there is
//! no bridge to shoot through - but the direction pin is always written
//! before the step pulse so the driver never latches a rogue edge.

use super::{scale_percent, STEPPER_ACCELERATION, STEPPER_MAX_SPEED};
use respira_core::motion::SpeedRamp;
use respira_core::traits::{Direction, MotorOutputs, SharedPinMode};
use respira_protocol::RunState;

/// Stepper motor state
pub struct StepperMotor {
    ramp: SpeedRamp,
    /// Commanded speed, percent of max
    speed: u8,
    forward: bool,
    min_speed: u8,
    homing_speed: u8,
    run_state: RunState,
}

impl StepperMotor {
    pub fn new(min_speed: u8, homing_speed: u8) -> Self {
        let mut ramp = SpeedRamp::new();
        ramp.set_max_speed(STEPPER_MAX_SPEED);
        ramp.set_acceleration(STEPPER_ACCELERATION);
        Self {
            ramp,
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

    pub fn ramp(&self) -> &SpeedRamp {
        &self.ramp
    }

    /// Drive the enable line low (active) and park the direction pin low
    /// so the shared wiring cannot wake the H-bridge reverse input
    pub fn enable(&mut self, outputs: &mut impl MotorOutputs) {
        outputs.set_direction(false);
        outputs.set_shared_pin(SharedPinMode::StepperEnabled);
    }

    /// Release the driver: the shared pin drives high (enable is
    /// active-low), which also parks the line where the brushless probe
    /// expects to find it
    pub fn disable(&mut self, outputs: &mut impl MotorOutputs) {
        outputs.set_shared_pin(SharedPinMode::StepperDisabled);
    }

    fn go(&mut self) {
        let steps = scale_percent(self.speed, STEPPER_MAX_SPEED);
        self.ramp
            .set_speed(if self.forward { steps } else { -steps });
    }

    pub fn reverse(&mut self, _outputs: &mut impl MotorOutputs) {
        self.forward = !self.forward;
        self.run_state = RunState::Homing;
        self.go();
    }

    pub fn stop(&mut self, _outputs: &mut impl MotorOutputs) {
        self.ramp.set_speed(0.0);
        self.ramp.stop();
        self.speed = 0;
        self.run_state = RunState::Stopped;
    }

    pub fn speed_up(&mut self, _outputs: &mut impl MotorOutputs) {
        if self.speed < 100 {
            self.speed += 1;
            if self.speed < self.min_speed {
                self.speed = self.min_speed;
            }
            self.run_state = RunState::Running;
            self.go();
        }
    }

    pub fn slow_down(&mut self, _outputs: &mut impl MotorOutputs) {
        if self.speed > 0 {
            self.speed -= 1;
            if self.speed < self.min_speed {
                self.speed = self.min_speed;
            }
            self.run_state = RunState::Running;
            self.go();
        }
    }

    pub fn begin_homing(&mut self, outputs: &mut impl MotorOutputs) {
        self.speed = self.homing_speed;
        self.forward = !self.forward;
        self.run_state = RunState::Homing;
        self.enable(outputs);
        self.go();
    }

    /// Emit at most one step if the ramp says one is due
    pub fn run(&mut self, now_us: u32, outputs: &mut impl MotorOutputs) -> bool {
        if self.ramp.run_speed(now_us) {
            // Direction first, then the pulse, or the driver can latch a
            // step in the old direction
            outputs.set_direction(self.ramp.direction() == Direction::Clockwise);
            outputs.set_step(true);
            outputs.set_step(false);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimOutputs;

    #[test]
    fn speed_scales_onto_the_ramp() {
        let mut motor = StepperMotor::new(50, 51);
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        // jumps to min 50% of 600 steps/s
        assert_eq!(motor.speed(), 50);
        assert_eq!(motor.ramp().speed(), 300.0);
    }

    #[test]
    fn run_emits_time_spaced_pulses() {
        let mut motor = StepperMotor::new(50, 51);
        let mut out = SimOutputs::default();
        motor.enable(&mut out);
        motor.speed_up(&mut out); // 300 steps/s -> 3333 us interval

        let interval = motor.ramp().step_interval_us();
        assert_eq!(interval, 3333);

        let mut now = 0u32;
        let mut pulses = 0;
        for _ in 0..10_000 {
            now += 100;
            if motor.run(now, &mut out) {
                pulses += 1;
            }
        }
        // 1 ms ticks over 1 s at 300 steps/s, quantized by polling
        assert!(pulses >= 290 && pulses <= 300, "pulses = {pulses}");
        assert_eq!(out.step_pulses, pulses);
    }

    #[test]
    fn reverse_flips_the_direction_pin_on_next_step() {
        let mut motor = StepperMotor::new(50, 51);
        let mut out = SimOutputs::default();
        motor.enable(&mut out);
        motor.speed_up(&mut out);

        let mut now = 0;
        while !motor.run(now, &mut out) {
            now += 100;
        }
        assert!(out.direction_forward);

        motor.reverse(&mut out);
        now += 10_000;
        assert!(motor.run(now, &mut out));
        assert!(!out.direction_forward);
    }

    #[test]
    fn stop_zeroes_the_ramp() {
        let mut motor = StepperMotor::new(50, 51);
        let mut out = SimOutputs::default();
        motor.speed_up(&mut out);
        motor.stop(&mut out);
        assert_eq!(motor.ramp().speed(), 0.0);
        assert_eq!(motor.run_state(), RunState::Stopped);
        assert!(!motor.run(5000, &mut out));
    }

    #[test]
    fn enable_parks_direction_low_first() {
        let mut motor = StepperMotor::new(50, 51);
        let mut out = SimOutputs::default();
        out.direction_forward = true;
        motor.enable(&mut out);
        assert!(!out.direction_forward);
        assert_eq!(out.shared_mode, SharedPinMode::StepperEnabled);

        motor.disable(&mut out);
        assert_eq!(out.shared_mode, SharedPinMode::StepperDisabled);
    }
}
