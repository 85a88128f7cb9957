//! Breath settings and their limits
//!
//! The command layer writes these over the serial link and persists them
//! in the unit record; the core only ever sees sanitized values.

use respira_protocol::UnitRecord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const MIN_BREATH_RATE: u8 = 5;
pub const MAX_BREATH_RATE: u8 = 20;
pub const MIN_BREATH_RATIO: u8 = 2;
pub const MAX_BREATH_RATIO: u8 = 5;
pub const MIN_BREATH_PRESSURE: u16 = 0;
pub const MAX_BREATH_PRESSURE: u16 = 100;
pub const MIN_BREATH_VOLUME: u16 = 0;
pub const MAX_BREATH_VOLUME: u16 = 1000;

/// Ventilation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BreathSettings {
    /// Target pressure for pressure-controlled ventilation (cmH2O)
    pub pressure: u16,
    /// Target volume for volume-controlled ventilation (ml)
    pub volume: u16,
    /// Breaths per minute
    pub rate: u8,
    /// Inhale:exhale ratio
    pub ratio: u8,
    /// Patient-trigger threshold
    pub threshold: u16,
}

impl Default for BreathSettings {
    fn default() -> Self {
        Self {
            pressure: 20,
            volume: 500,
            rate: 12,
            ratio: 2,
            threshold: 0,
        }
    }
}

impl BreathSettings {
    /// Clamp every field into its clinical range
    ///
    /// Called after every load and every remote update; garbage in the
    /// EEPROM or on the wire must never reach the motion layer.
    pub fn sanitize(&mut self) {
        self.rate = self.rate.clamp(MIN_BREATH_RATE, MAX_BREATH_RATE);
        self.ratio = self.ratio.clamp(MIN_BREATH_RATIO, MAX_BREATH_RATIO);
        self.pressure = self.pressure.clamp(MIN_BREATH_PRESSURE, MAX_BREATH_PRESSURE);
        self.volume = self.volume.clamp(MIN_BREATH_VOLUME, MAX_BREATH_VOLUME);
    }

    /// Pull settings out of a stored unit record and sanitize them
    pub fn from_record(record: &UnitRecord) -> Self {
        let mut s = Self {
            pressure: record.breath_pressure,
            volume: record.breath_volume,
            rate: record.breath_rate,
            ratio: record.breath_ratio,
            threshold: record.breath_threshold,
        };
        s.sanitize();
        s
    }

    /// Store settings into a unit record for persistence
    pub fn store(&self, record: &mut UnitRecord) {
        record.breath_pressure = self.pressure;
        record.breath_volume = self.volume;
        record.breath_rate = self.rate;
        record.breath_ratio = self.ratio;
        record.breath_threshold = self.threshold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use respira_protocol::{BodyType, BusTopology};

    #[test]
    fn defaults_are_already_sane() {
        let mut s = BreathSettings::default();
        let before = s;
        s.sanitize();
        assert_eq!(s, before);
    }

    #[test]
    fn out_of_range_values_clamp() {
        let mut s = BreathSettings {
            pressure: 9999,
            volume: 9999,
            rate: 0,
            ratio: 99,
            threshold: 0,
        };
        s.sanitize();
        assert_eq!(s.pressure, MAX_BREATH_PRESSURE);
        assert_eq!(s.volume, MAX_BREATH_VOLUME);
        assert_eq!(s.rate, MIN_BREATH_RATE);
        assert_eq!(s.ratio, MAX_BREATH_RATIO);
    }

    #[test]
    fn record_round_trip_sanitizes_on_load() {
        let mut record = UnitRecord::format(BusTopology::Mux, BodyType::Venturi);
        record.breath_rate = 200; // corrupt
        record.breath_volume = 400;

        let s = BreathSettings::from_record(&record);
        assert_eq!(s.rate, MAX_BREATH_RATE);
        assert_eq!(s.volume, 400);

        let mut out = UnitRecord::format(BusTopology::Mux, BodyType::Venturi);
        s.store(&mut out);
        assert_eq!(out.breath_volume, 400);
        assert_eq!(out.breath_rate, MAX_BREATH_RATE);
    }
}
