//! Sensor offset calibration
//!
//! The four barometers share one atmosphere when the machine is idle, so
//! any disagreement between them is offset drift. A calibration session
//! accumulates a fixed number of quiet samples and derives a per-sensor
//! offset that pulls every channel toward the common mean.
//!
//! Calibration and motor autodetection are mutually exclusive: a spinning
//! motor moves air through the head. Both sides defer (no error) when the
//! other is active.

/// Samples accumulated before offsets are computed
pub const SAMPLE_TARGET: u8 = 99;

/// Per-sensor averaging divisor used when offsets are computed
pub const PER_SENSOR_DIVISOR: f32 = 100.0;

/// Divisor for the cross-sensor mean: four channels of
/// [`PER_SENSOR_DIVISOR`]. If [`SAMPLE_TARGET`] ever changes these must
/// change in lockstep; a test pins the relation.
pub const TOTAL_DIVISOR: f32 = 4.0 * PER_SENSOR_DIVISOR;

/// Outcome of one accumulate call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationStep {
    /// First sample of a fresh session
    Started,
    /// Sample folded in, more needed
    Sampling,
    /// Offsets computed; session complete
    Finished,
    /// Motor detection owns the machine right now; sample dropped
    Deferred,
    /// Session already complete; call [`CalibrationSession::clear`] first
    Complete,
}

/// Accumulates quiet-air samples and derives per-sensor offsets
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    samples: u8,
    /// Running sums during sampling, offsets after completion
    offsets: [f32; 4],
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationSession {
    /// A fresh session: sampling starts on the next accumulate call
    pub fn new() -> Self {
        Self {
            samples: 0,
            offsets: [0.0; 4],
        }
    }

    /// Restart the session, discarding sums and offsets
    pub fn clear(&mut self) {
        self.samples = 0;
        self.offsets = [0.0; 4];
    }

    /// True while more samples are needed
    ///
    /// Motor detection stalls on this; a freshly cleared session keeps
    /// the motor parked until the air is characterized.
    pub fn in_progress(&self) -> bool {
        self.samples < SAMPLE_TARGET
    }

    /// Computed offsets (zeros until the session finishes)
    pub fn offsets(&self) -> &[f32; 4] {
        &self.offsets
    }

    /// Add each sensor's offset to its reading, in place
    pub fn apply(&self, readings: &mut [f32; 4]) {
        if !self.in_progress() {
            for (r, o) in readings.iter_mut().zip(self.offsets.iter()) {
                *r += o;
            }
        }
    }

    /// Fold one raw sample set into the session
    pub fn accumulate(
        &mut self,
        readings: &[f32; 4],
        motor_detect_in_progress: bool,
    ) -> CalibrationStep {
        if !self.in_progress() {
            return CalibrationStep::Complete;
        }
        if motor_detect_in_progress {
            return CalibrationStep::Deferred;
        }

        for (sum, r) in self.offsets.iter_mut().zip(readings.iter()) {
            *sum += r;
        }
        self.samples += 1;

        if self.samples >= SAMPLE_TARGET {
            let mut average = 0.0;
            for sum in &self.offsets {
                average += sum;
            }
            average /= TOTAL_DIVISOR;

            for sum in self.offsets.iter_mut() {
                *sum = average - *sum / PER_SENSOR_DIVISOR;
            }
            return CalibrationStep::Finished;
        }

        if self.samples == 1 {
            CalibrationStep::Started
        } else {
            CalibrationStep::Sampling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_session(readings: [f32; 4]) -> CalibrationSession {
        let mut session = CalibrationSession::new();
        for i in 0..SAMPLE_TARGET {
            let step = session.accumulate(&readings, false);
            match step {
                CalibrationStep::Started => assert_eq!(i, 0),
                CalibrationStep::Finished => assert_eq!(i, SAMPLE_TARGET - 1),
                CalibrationStep::Sampling => {}
                other => panic!("unexpected step {other:?}"),
            }
        }
        assert!(!session.in_progress());
        session
    }

    // The divisors encode "four channels, one hundred samples each". If
    // someone retunes the sample target this must be revisited together
    // with both divisors; the relation below is the tripwire.
    #[test]
    fn divisors_track_the_channel_count() {
        assert_eq!(TOTAL_DIVISOR, 4.0 * PER_SENSOR_DIVISOR);
        assert!((SAMPLE_TARGET as f32 - PER_SENSOR_DIVISOR).abs() <= 1.0);
    }

    #[test]
    fn constant_readings_equalize_to_the_mean() {
        let readings = [101_000.0, 101_040.0, 100_980.0, 101_020.0];
        let session = run_session(readings);

        let mean = readings.iter().sum::<f32>() / 4.0;
        let spread = 60.0; // max - min of the fixture
        let mut corrected = readings;
        session.apply(&mut corrected);

        for c in corrected {
            // The divisor/sample-count mismatch leaves ~1% residual
            assert!(
                (c - mean).abs() < spread * 0.02,
                "corrected {c} too far from mean {mean}"
            );
        }
        // All four corrected values collapse together
        let max = corrected.iter().cloned().fold(f32::MIN, f32::max);
        let min = corrected.iter().cloned().fold(f32::MAX, f32::min);
        assert!(max - min < spread * 0.05);
    }

    #[test]
    fn identical_sensors_need_no_offset() {
        let session = run_session([100_000.0; 4]);
        for o in session.offsets() {
            assert!(o.abs() < 1.0);
        }
    }

    #[test]
    fn accumulate_defers_during_motor_detection() {
        let mut session = CalibrationSession::new();
        assert_eq!(
            session.accumulate(&[0.0; 4], true),
            CalibrationStep::Deferred
        );
        assert!(session.in_progress());
        // Nothing was folded in
        assert_eq!(session.offsets(), &[0.0; 4]);
    }

    #[test]
    fn finished_session_rejects_further_samples() {
        let mut session = run_session([100_000.0; 4]);
        let before = *session.offsets();
        assert_eq!(
            session.accumulate(&[123.0; 4], false),
            CalibrationStep::Complete
        );
        assert_eq!(*session.offsets(), before);
    }

    #[test]
    fn apply_is_inert_while_sampling() {
        let mut session = CalibrationSession::new();
        session.accumulate(&[100_000.0; 4], false);
        let mut readings = [5.0; 4];
        session.apply(&mut readings);
        assert_eq!(readings, [5.0; 4]);
    }

    #[test]
    fn clear_restarts_the_session() {
        let mut session = run_session([100_000.0; 4]);
        session.clear();
        assert!(session.in_progress());
        assert_eq!(session.offsets(), &[0.0; 4]);
    }
}
