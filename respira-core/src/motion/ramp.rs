//! Acceleration-limited step scheduler
//!
//! Classic trapezoidal/triangular ramp generator: from the acceleration it
//! derives the first inter-step interval
//!
//! ```text
//! c0 = 0.676 * sqrt(2 / accel) * 1e6   microseconds
//! ```
//!
//! and each later interval from the previous one
//!
//! ```text
//! c(n) = c(n-1) - 2 * c(n-1) / (4n + 1)
//! ```
//!
//! clamped at the interval implied by the maximum speed. The signed ramp
//! counter `n` encodes accelerating (positive) vs decelerating (negative);
//! it passes through zero exactly when the motor does.
//!
//! [`SpeedRamp::run_speed`] emits at most one step per call and only when
//! the interval has elapsed; the caller owns the step pin and the clock.

use crate::traits::Direction;
use libm::sqrtf;

/// Per-tick kinematic state for one stepper axis
#[derive(Debug, Clone)]
pub struct SpeedRamp {
    /// Current absolute position in steps
    current_pos: i32,
    /// Target position in steps
    target_pos: i32,
    /// Current speed in steps/s; positive is clockwise
    speed: f32,
    /// Maximum permitted speed in steps/s
    max_speed: f32,
    /// Acceleration in steps/s^2
    acceleration: f32,
    /// Current inter-step interval in us; 0 means stopped
    step_interval: u32,
    /// Timestamp of the last emitted step in us (wraps)
    last_step_time: u32,
    /// Signed step count into the ramp
    n: i32,
    /// First interval of a ramp segment
    c0: f32,
    /// Most recently computed interval
    cn: f32,
    /// Interval floor implied by max_speed
    cmin: f32,
    direction: Direction,
}

impl Default for SpeedRamp {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedRamp {
    pub fn new() -> Self {
        let mut ramp = Self {
            current_pos: 0,
            target_pos: 0,
            speed: 0.0,
            max_speed: 1.0,
            acceleration: 0.0,
            step_interval: 0,
            last_step_time: 0,
            n: 0,
            c0: 0.0,
            cn: 0.0,
            cmin: 1.0,
            direction: Direction::CounterClockwise,
        };
        ramp.set_acceleration(1.0);
        ramp
    }

    /// Move to an absolute position in steps
    pub fn move_to(&mut self, absolute: i32) {
        if self.target_pos != absolute {
            self.target_pos = absolute;
            self.compute_new_speed();
        }
    }

    /// Move relative to the current position
    pub fn move_relative(&mut self, delta: i32) {
        self.move_to(self.current_pos.wrapping_add(delta));
    }

    pub fn distance_to_go(&self) -> i32 {
        self.target_pos - self.current_pos
    }

    pub fn current_position(&self) -> i32 {
        self.current_pos
    }

    pub fn target_position(&self) -> i32 {
        self.target_pos
    }

    /// Redefine "here"; also zeroes speed. Useful after homing.
    pub fn set_current_position(&mut self, position: i32) {
        self.target_pos = position;
        self.current_pos = position;
        self.n = 0;
        self.step_interval = 0;
        self.speed = 0.0;
    }

    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    /// Set the speed ceiling in steps/s
    pub fn set_max_speed(&mut self, speed: f32) {
        let speed = if speed < 0.0 { -speed } else { speed };
        if speed <= 0.0 || self.max_speed == speed {
            return;
        }
        self.max_speed = speed;
        self.cmin = 1_000_000.0 / speed;
        // If mid-ramp, rebase n from the current speed so the clamp
        // takes effect on the next computed interval
        if self.n > 0 {
            self.n = ((self.speed * self.speed) / (2.0 * self.acceleration)) as i32;
            self.compute_new_speed();
        }
    }

    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    /// Set the acceleration in steps/s^2
    pub fn set_acceleration(&mut self, acceleration: f32) {
        if acceleration == 0.0 {
            return;
        }
        let acceleration = if acceleration < 0.0 {
            -acceleration
        } else {
            acceleration
        };
        if self.acceleration != acceleration {
            // Rescale the ramp counter so the profile stays continuous
            self.n = ((self.n as f32) * (self.acceleration / acceleration)) as i32;
            self.c0 = 0.676 * sqrtf(2.0 / acceleration) * 1_000_000.0;
            self.acceleration = acceleration;
            self.compute_new_speed();
        }
    }

    /// Set a constant speed directly, bypassing the ramp
    ///
    /// Used for constant-speed runs (homing, detection sweeps) together
    /// with [`SpeedRamp::run_speed`]. Sign selects direction.
    pub fn set_speed(&mut self, speed: f32) {
        if speed == self.speed {
            return;
        }
        let speed = speed.clamp(-self.max_speed, self.max_speed);
        if speed == 0.0 {
            self.step_interval = 0;
        } else {
            self.step_interval = (1_000_000.0 / if speed < 0.0 { -speed } else { speed }) as u32;
            self.direction = if speed > 0.0 {
                Direction::Clockwise
            } else {
                Direction::CounterClockwise
            };
        }
        self.speed = speed;
    }

    /// Current speed in steps/s, signed
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Current inter-step interval in microseconds (0 when stopped)
    pub fn step_interval_us(&self) -> u32 {
        self.step_interval
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Emit at most one step if its interval has elapsed
    ///
    /// Returns true when a step was taken; the caller pulses the step
    /// pin with the direction from [`SpeedRamp::direction`].
    pub fn run_speed(&mut self, now_us: u32) -> bool {
        if self.step_interval == 0 {
            return false;
        }
        if now_us.wrapping_sub(self.last_step_time) >= self.step_interval {
            match self.direction {
                Direction::Clockwise => self.current_pos = self.current_pos.wrapping_add(1),
                Direction::CounterClockwise => {
                    self.current_pos = self.current_pos.wrapping_sub(1)
                }
            }
            self.last_step_time = now_us;
            true
        } else {
            false
        }
    }

    /// Step toward the target under the ramp; call once per loop tick
    ///
    /// Returns true while the motor still has somewhere to go.
    pub fn run(&mut self, now_us: u32) -> bool {
        if self.run_speed(now_us) {
            self.compute_new_speed();
        }
        self.speed != 0.0 || self.distance_to_go() != 0
    }

    pub fn is_running(&self) -> bool {
        !(self.speed == 0.0 && self.target_pos == self.current_pos)
    }

    /// Retarget to the nearest achievable stop at the current deceleration
    pub fn stop(&mut self) {
        if self.speed != 0.0 {
            let steps_to_stop =
                ((self.speed * self.speed) / (2.0 * self.acceleration)) as i32 + 1;
            if self.speed > 0.0 {
                self.move_relative(steps_to_stop);
            } else {
                self.move_relative(-steps_to_stop);
            }
        }
    }

    /// Recompute the interval/direction after a step or a target change
    pub fn compute_new_speed(&mut self) {
        let distance_to = self.distance_to_go();
        let steps_to_stop = ((self.speed * self.speed) / (2.0 * self.acceleration)) as i32;

        if distance_to == 0 && steps_to_stop <= 1 {
            // At the target, time to stop
            self.step_interval = 0;
            self.speed = 0.0;
            self.n = 0;
            return;
        }

        if distance_to > 0 {
            // Target is clockwise of here
            if self.n > 0 {
                // Accelerating: begin braking if we would overshoot, or
                // if we are accelerating the wrong way
                if steps_to_stop >= distance_to || self.direction == Direction::CounterClockwise
                {
                    self.n = -steps_to_stop;
                }
            } else if self.n < 0 {
                // Decelerating: resume accelerating when braking room allows
                if steps_to_stop < distance_to && self.direction == Direction::Clockwise {
                    self.n = -self.n;
                }
            }
        } else if distance_to < 0 {
            // Target is counter-clockwise of here
            if self.n > 0 {
                if steps_to_stop >= -distance_to || self.direction == Direction::Clockwise {
                    self.n = -steps_to_stop;
                }
            } else if self.n < 0 {
                if steps_to_stop < -distance_to && self.direction == Direction::CounterClockwise
                {
                    self.n = -self.n;
                }
            }
        }

        if self.n == 0 {
            // First step from stopped; direction decided by the target
            self.cn = self.c0;
            self.direction = if distance_to > 0 {
                Direction::Clockwise
            } else {
                Direction::CounterClockwise
            };
        } else {
            // Works for both acceleration (n > 0) and deceleration (n < 0)
            self.cn = self.cn - ((2.0 * self.cn) / ((4.0 * self.n as f32) + 1.0));
            if self.cn < self.cmin {
                self.cn = self.cmin;
            }
        }
        self.n += 1;
        self.step_interval = self.cn as u32;
        self.speed = 1_000_000.0 / self.cn;
        if self.direction == Direction::CounterClockwise {
            self.speed = -self.speed;
        }
    }
}
