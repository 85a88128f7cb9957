//! Motor controller: detection, binding, homing, run ticks
//!
//! Owns the one active [`MotorBinding`] and the autodetection state
//! machine that establishes it. While detection runs it also owns the
//! outputs - the command surface refuses speed/direction requests so
//! nothing fights the probe drive.

use super::{
    bldc::BldcMotor, hbridge::HBridgeMotor, stepper::StepperMotor, wiper::WiperMotor,
    MotorBinding, BLDC_SWEEP_SPEED, HBRIDGE_SWEEP_SPEED, STEPPER_MAX_SPEED,
    STEPPER_SWEEP_SPEED, WIPER_SWEEP_SPEED,
};
use embedded_hal::delay::DelayNs;
use respira_core::detect::{DetectAction, DetectInputs, DetectPhase, MotorDetector};
use respira_core::feedback::FeedbackCounters;
use respira_core::motion::SpeedRamp;
use respira_core::traits::{MotorError, MotorOutputs, SharedPinMode};
use respira_protocol::{CoreEvent, MotorKind, RunState};

/// Stepper percentage floor once the family binds
const STEPPER_MIN_PERCENT: u8 = 50;

/// Motor controller
pub struct MotorController {
    binding: MotorBinding,
    detector: MotorDetector,
    /// Constant-speed ramp used for the stepper probe sweep
    probe_ramp: SpeedRamp,
    /// Bind this family directly on the next poll (operator override)
    pending_bind: Option<MotorKind>,
}

impl MotorController {
    /// Start with the given family, or `Autodetect` to probe for one
    pub fn new(kind: MotorKind) -> Self {
        let mut probe_ramp = SpeedRamp::new();
        probe_ramp.set_max_speed(STEPPER_MAX_SPEED);

        let mut controller = Self {
            binding: MotorBinding::None,
            detector: MotorDetector::new(),
            probe_ramp,
            pending_bind: None,
        };
        match kind {
            MotorKind::Autodetect => controller.detector.begin(),
            MotorKind::Unknown => {}
            concrete => controller.pending_bind = Some(concrete),
        }
        controller
    }

    pub fn kind(&self) -> MotorKind {
        if self.detector.in_progress() {
            MotorKind::Autodetect
        } else {
            self.binding.kind()
        }
    }

    pub fn run_state(&self) -> RunState {
        self.binding.run_state()
    }

    pub fn detection_in_progress(&self) -> bool {
        self.detector.in_progress()
    }

    /// Calibration sampling defers while a probe may be moving air
    pub fn detection_energizing(&self) -> bool {
        self.detector.is_energizing()
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.binding, MotorBinding::None)
    }

    /// Operator request to change the motor type
    ///
    /// A concrete family binds on the next poll; `Autodetect` tears the
    /// binding down and restarts the probe sweep.
    pub fn set_kind(&mut self, kind: MotorKind, outputs: &mut impl MotorOutputs) {
        self.binding.stop(outputs);
        self.all_off(outputs);
        self.binding = MotorBinding::None;
        self.pending_bind = None;
        match kind {
            MotorKind::Autodetect => self.detector.begin(),
            MotorKind::Unknown => self.detector.abort(),
            concrete => {
                self.detector.abort();
                self.pending_bind = Some(concrete);
            }
        }
    }

    /// One control-loop tick
    ///
    /// Drains the feedback counters, advances detection or the bound
    /// actuator, and reports a diagnostic event when something changed.
    pub fn poll(
        &mut self,
        now_ms: u32,
        now_us: u32,
        counters: &FeedbackCounters,
        home_level: bool,
        calibration_in_progress: bool,
        outputs: &mut impl MotorOutputs,
        delay: &mut impl DelayNs,
    ) -> Option<CoreEvent> {
        let inputs = DetectInputs {
            encoder_pulses: counters.take_encoder(),
            feedback_pulses: counters.take_feedback(),
            home_seen: counters.take_home(),
            calibration_in_progress,
        };

        if let Some(kind) = self.pending_bind.take() {
            self.bind(kind, home_level, outputs, delay);
            return Some(CoreEvent::MotorDetected(kind));
        }

        if self.detector.in_progress() {
            // The stepper probe only moves if something emits its pulses
            if self.detector.phase() == DetectPhase::WaitStepper
                && self.probe_ramp.run_speed(now_us)
            {
                outputs.set_direction(false);
                outputs.set_step(true);
                outputs.set_step(false);
            }

            return match self.detector.poll(now_ms, &inputs) {
                DetectAction::Pending => None,
                DetectAction::Configure(mode) => {
                    outputs.set_shared_pin(mode);
                    counters.clear();
                    None
                }
                DetectAction::EnergizePrimary => {
                    outputs.set_reverse_enable(false);
                    outputs.set_forward_enable(true);
                    outputs.set_pwm(HBRIDGE_SWEEP_SPEED);
                    None
                }
                DetectAction::EnergizeStepper => {
                    outputs.set_direction(false);
                    outputs.set_shared_pin(SharedPinMode::StepperEnabled);
                    // Negative speed keeps the direction pin low, which
                    // on the shared harness keeps the bridge asleep
                    self.probe_ramp.set_speed(-STEPPER_SWEEP_SPEED);
                    None
                }
                DetectAction::EnergizeWiper => {
                    outputs.set_reverse_enable(false);
                    outputs.set_forward_enable(true);
                    outputs.set_pwm(WIPER_SWEEP_SPEED);
                    None
                }
                DetectAction::AllOff => {
                    self.all_off(outputs);
                    None
                }
                DetectAction::Bound(kind) => {
                    self.all_off(outputs);
                    self.bind(kind, home_level, outputs, delay);
                    Some(CoreEvent::MotorDetected(kind))
                }
                DetectAction::GaveUp => {
                    self.all_off(outputs);
                    Some(CoreEvent::MotorNotDetected)
                }
            };
        }

        // Bound: step generation plus homing completion
        self.binding.run(now_us, outputs);
        if self.binding.run_state() == RunState::Homing && (inputs.home_seen || home_level) {
            self.binding.stop(outputs);
        }
        None
    }

    pub fn speed_up(&mut self, outputs: &mut impl MotorOutputs) -> Result<(), MotorError> {
        self.command_guard()?;
        self.binding.speed_up(outputs);
        Ok(())
    }

    pub fn slow_down(&mut self, outputs: &mut impl MotorOutputs) -> Result<(), MotorError> {
        self.command_guard()?;
        self.binding.slow_down(outputs);
        Ok(())
    }

    pub fn reverse(
        &mut self,
        outputs: &mut impl MotorOutputs,
        delay: &mut impl DelayNs,
    ) -> Result<(), MotorError> {
        self.command_guard()?;
        self.binding.reverse(outputs, delay);
        Ok(())
    }

    pub fn stop(&mut self, outputs: &mut impl MotorOutputs) -> Result<(), MotorError> {
        self.command_guard()?;
        self.binding.stop(outputs);
        Ok(())
    }

    fn command_guard(&self) -> Result<(), MotorError> {
        if self.detector.in_progress() {
            return Err(MotorError::DetectionInProgress);
        }
        if !self.is_bound() {
            return Err(MotorError::NotBound);
        }
        Ok(())
    }

    fn all_off(&mut self, outputs: &mut impl MotorOutputs) {
        outputs.set_pwm(0);
        outputs.set_forward_enable(false);
        outputs.set_reverse_enable(false);
        self.probe_ramp.set_speed(0.0);
    }

    fn bind(
        &mut self,
        kind: MotorKind,
        home_level: bool,
        outputs: &mut impl MotorOutputs,
        delay: &mut impl DelayNs,
    ) {
        self.binding = match kind {
            MotorKind::HBridge => MotorBinding::HBridge(HBridgeMotor::new(
                HBRIDGE_SWEEP_SPEED,
                HBRIDGE_SWEEP_SPEED + 1,
            )),
            MotorKind::Stepper => {
                let mut motor = StepperMotor::new(STEPPER_MIN_PERCENT, STEPPER_MIN_PERCENT + 1);
                motor.enable(outputs);
                MotorBinding::Stepper(motor)
            }
            MotorKind::Brushless => MotorBinding::Brushless(BldcMotor::new(
                BLDC_SWEEP_SPEED,
                BLDC_SWEEP_SPEED + 1,
            )),
            MotorKind::Wiper => MotorBinding::Wiper(WiperMotor::new()),
            MotorKind::Unknown | MotorKind::Autodetect => MotorBinding::None,
        };

        // First order of business with a fresh binding: find home
        if self.is_bound() && !home_level {
            self.binding.begin_homing(outputs, delay);
        }
    }
}
