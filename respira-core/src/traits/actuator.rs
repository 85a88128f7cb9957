//! Motor output abstraction
//!
//! The four actuator families all drive the same small set of logical
//! outputs; the board layer maps them onto its (heavily shared) physical
//! pins. Keeping the drivers behind this trait lets every safety property,
//! the dual-enable interlock above all, be tested in a simulation.

/// Errors that can occur commanding the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorError {
    /// No actuator family is bound yet
    NotBound,
    /// Detection state machine currently owns the outputs
    DetectionInProgress,
}

/// Mode of the shared enable/feedback pin
///
/// The stepper's active-low enable line is physically the same pin as the
/// brushless motor's commutation-feedback input. Whoever owns the outputs
/// must switch the pin's role before energizing either family; interrupts
/// on the pin are detached while it acts as an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SharedPinMode {
    /// Input with pull-up, counting feedback pulses
    FeedbackInput,
    /// Output driven low: stepper driver enabled
    StepperEnabled,
    /// Output driven high: stepper driver disabled
    StepperDisabled,
}

/// Logical motor outputs
///
/// Implementations write pins (or a test log). Drivers promise to call
/// `set_forward_enable`/`set_reverse_enable` in an order that never leaves
/// both lines active; implementations must apply calls immediately and in
/// the order received for that promise to mean anything.
pub trait MotorOutputs {
    /// PWM duty as a percentage (0-100)
    fn set_pwm(&mut self, percent: u8);

    /// Forward drive enable (active high)
    fn set_forward_enable(&mut self, on: bool);

    /// Reverse drive enable (active high)
    fn set_reverse_enable(&mut self, on: bool);

    /// Direction pin for step/dir and brushless drivers
    fn set_direction(&mut self, forward: bool);

    /// Step pulse pin; drivers pulse high then low, the implementation
    /// guarantees the driver chip's minimum pulse width
    fn set_step(&mut self, high: bool);

    /// Reconfigure the shared enable/feedback pin
    fn set_shared_pin(&mut self, mode: SharedPinMode);
}
