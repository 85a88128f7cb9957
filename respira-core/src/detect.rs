//! Actuator-type autodetection state machine
//!
//! The controller board ships with whatever motor the builder could get:
//! an H-bridge DC motor, a stepper, a brushless motor or a car wiper
//! gearmotor. Which one is wired is discovered at runtime by energizing
//! one candidate family at a time and watching the feedback counters.
//!
//! The machine is pure logic: each [`MotorDetector::poll`] consumes the
//! pulses drained from the interrupt counters this tick and answers with
//! what the caller should do to the outputs. Timeouts, retry cadence and
//! the calibration interlock all live here where they can be unit tested.
//!
//! Probe ordering matters electrically: the DC families are probed with
//! the shared enable/feedback pin configured as an input (which its
//! pull-up holds high, keeping the active-low stepper driver disabled),
//! and the stepper probe runs counter-clockwise so its direction pin
//! stays low and never raises the H-bridge reverse enable.

use crate::traits::SharedPinMode;
use respira_protocol::MotorKind;

/// How long each family gets to produce feedback before moving on
pub const DETECT_WINDOW_MS: u32 = 2500;

/// Pause after all families time out, before the next full sweep
pub const DETECT_RETRY_DELAY_MS: u32 = 2500;

/// More than this many pulses inside a window binds the family
pub const DETECT_PULSE_THRESHOLD: u32 = 2;

/// Detection phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DetectPhase {
    /// Not detecting (either bound, or never started)
    Idle,
    /// Outputs safed; stalls while calibration is sampling
    Start,
    /// Energize the DC drive (catches H-bridge and brushless)
    DrivePrimary,
    WaitPrimary,
    /// Enable the stepper driver and sweep it
    DriveStepper,
    WaitStepper,
    /// Energize the wiper profile
    DriveWiper,
    WaitWiper,
    /// Every family timed out
    Timeout,
    WaitTimeout,
}

/// Signals drained from the feedback counters for this tick
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectInputs {
    /// Encoder pulses since the last poll
    pub encoder_pulses: u32,
    /// Shared-pin feedback pulses since the last poll (brushless)
    pub feedback_pulses: u32,
    /// Home/park switch fired since the last poll
    pub home_seen: bool,
    /// Offset calibration is sampling; motors must stay still
    pub calibration_in_progress: bool,
}

/// What the caller must do after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DetectAction {
    /// Nothing to change
    Pending,
    /// Reconfigure the shared pin, clear counters
    Configure(SharedPinMode),
    /// Drive the primary (DC) probe: forward enable + sweep PWM
    EnergizePrimary,
    /// Sweep the stepper counter-clockwise; caller steps it every tick
    EnergizeStepper,
    /// Drive the wiper probe profile
    EnergizeWiper,
    /// De-energize everything
    AllOff,
    /// A family answered; outputs are safed, bind and exit to idle
    Bound(MotorKind),
    /// Sweep exhausted with no feedback; will retry after the pause
    GaveUp,
}

/// Autodetection state machine
#[derive(Debug)]
pub struct MotorDetector {
    phase: DetectPhase,
    deadline_ms: u32,
    /// Pulses accumulated inside the current window
    encoder_total: u32,
    feedback_total: u32,
    home_latched: bool,
}

impl Default for MotorDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorDetector {
    pub const fn new() -> Self {
        Self {
            phase: DetectPhase::Idle,
            deadline_ms: 0,
            encoder_total: 0,
            feedback_total: 0,
            home_latched: false,
        }
    }

    /// Begin (or restart) a detection sweep
    pub fn begin(&mut self) {
        self.phase = DetectPhase::Start;
        self.reset_window();
    }

    /// Abort and return to idle; outputs are the caller's to safe
    pub fn abort(&mut self) {
        self.phase = DetectPhase::Idle;
        self.reset_window();
    }

    pub fn phase(&self) -> DetectPhase {
        self.phase
    }

    pub fn in_progress(&self) -> bool {
        self.phase != DetectPhase::Idle
    }

    /// True while a probe is (or may be) moving the motor
    ///
    /// Calibration defers on this, not on [`MotorDetector::in_progress`]:
    /// the `Start` phase stalls waiting for calibration itself, and the
    /// timeout phases have everything de-energized, so blocking sampling
    /// there would deadlock the boot sequence.
    pub fn is_energizing(&self) -> bool {
        !matches!(
            self.phase,
            DetectPhase::Idle
                | DetectPhase::Start
                | DetectPhase::Timeout
                | DetectPhase::WaitTimeout
        )
    }

    fn reset_window(&mut self) {
        self.encoder_total = 0;
        self.feedback_total = 0;
        self.home_latched = false;
    }

    fn window_expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.deadline_ms) as i32 >= 0
    }

    fn accumulate(&mut self, inputs: &DetectInputs) {
        self.encoder_total += inputs.encoder_pulses;
        self.feedback_total += inputs.feedback_pulses;
        self.home_latched |= inputs.home_seen;
    }

    fn family_answered(&self) -> bool {
        self.home_latched || self.encoder_total > DETECT_PULSE_THRESHOLD
    }

    fn bind(&mut self, kind: MotorKind) -> DetectAction {
        self.phase = DetectPhase::Idle;
        self.reset_window();
        DetectAction::Bound(kind)
    }

    /// Advance the machine by one control-loop tick
    pub fn poll(&mut self, now_ms: u32, inputs: &DetectInputs) -> DetectAction {
        match self.phase {
            DetectPhase::Idle => DetectAction::Pending,

            DetectPhase::Start => {
                // Stall here until calibration sampling finishes; both
                // sides use the same no-op deferral so neither errors.
                if inputs.calibration_in_progress {
                    return DetectAction::Pending;
                }
                self.phase = DetectPhase::DrivePrimary;
                DetectAction::Configure(SharedPinMode::FeedbackInput)
            }

            DetectPhase::DrivePrimary => {
                self.reset_window();
                self.deadline_ms = now_ms.wrapping_add(DETECT_WINDOW_MS);
                self.phase = DetectPhase::WaitPrimary;
                DetectAction::EnergizePrimary
            }

            DetectPhase::WaitPrimary => {
                self.accumulate(inputs);
                // Encoder pulses mean the DC motor turned: H-bridge.
                // Pulses on the shared feedback pin are commutation
                // pulses: brushless.
                if self.family_answered() {
                    return self.bind(MotorKind::HBridge);
                }
                if self.feedback_total > DETECT_PULSE_THRESHOLD {
                    return self.bind(MotorKind::Brushless);
                }
                if self.window_expired(now_ms) {
                    self.phase = DetectPhase::DriveStepper;
                    return DetectAction::AllOff;
                }
                DetectAction::Pending
            }

            DetectPhase::DriveStepper => {
                self.reset_window();
                self.deadline_ms = now_ms.wrapping_add(DETECT_WINDOW_MS);
                self.phase = DetectPhase::WaitStepper;
                DetectAction::EnergizeStepper
            }

            DetectPhase::WaitStepper => {
                self.accumulate(inputs);
                if self.family_answered() {
                    return self.bind(MotorKind::Stepper);
                }
                if self.window_expired(now_ms) {
                    self.phase = DetectPhase::DriveWiper;
                    // Shared pin back to input; driving it high would
                    // only burn power in the disabled stepper driver.
                    return DetectAction::Configure(SharedPinMode::FeedbackInput);
                }
                DetectAction::Pending
            }

            DetectPhase::DriveWiper => {
                self.reset_window();
                self.deadline_ms = now_ms.wrapping_add(DETECT_WINDOW_MS);
                self.phase = DetectPhase::WaitWiper;
                DetectAction::EnergizeWiper
            }

            DetectPhase::WaitWiper => {
                self.accumulate(inputs);
                // The wiper's park switch lands on the home input
                if self.family_answered() {
                    return self.bind(MotorKind::Wiper);
                }
                if self.window_expired(now_ms) {
                    self.phase = DetectPhase::Timeout;
                    return DetectAction::AllOff;
                }
                DetectAction::Pending
            }

            DetectPhase::Timeout => {
                self.deadline_ms = now_ms.wrapping_add(DETECT_RETRY_DELAY_MS);
                self.phase = DetectPhase::WaitTimeout;
                DetectAction::GaveUp
            }

            DetectPhase::WaitTimeout => {
                if self.window_expired(now_ms) {
                    self.phase = DetectPhase::Start;
                }
                DetectAction::Pending
            }
        }
    }
}
