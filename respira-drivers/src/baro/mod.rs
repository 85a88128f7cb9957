//! Barometric pressure/temperature backends
//!
//! Three interchangeable chip families can populate the sensor head:
//! SPL06-007, BMP280 and BMP388. All three expose the same capability
//! contract - probe the chip id, pull and decode the calibration image,
//! then compensate raw samples into Pa / degrees C - and a
//! [`BaroSensor`] binds whichever family answers at its bus position.
//!
//! Probe order is BMP280, BMP388, SPL06: the BMP280's id register sits
//! at 0xD0 where the other chips carry nothing that aliases it, so the
//! cheapest disambiguation runs first.

pub mod bmp280;
pub mod bmp388;
pub mod spl06;

use crate::bus::{BusError, BusRegistry, DeviceHandle};
use embedded_hal::delay::DelayNs;
use respira_hal::{EnableLines, I2cBus};

/// Chip-id probe attempts per family before giving up on it
pub const PROBE_RETRY_COUNT: u32 = 2;
/// Backoff between probe attempts
pub const PROBE_RETRY_DELAY_MS: u32 = 100;

/// Which chip family answered at this position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorKind {
    #[default]
    Unknown,
    Spl06,
    Bmp280,
    Bmp388,
}

/// Per-family state: decoded calibration plus the last raw sample
///
/// One variant per chip family, selected at detection time; the
/// compensation math dispatches on the tag.
#[derive(Debug, Clone)]
pub enum Backend {
    Spl06(spl06::Spl06),
    Bmp280(bmp280::Bmp280),
    Bmp388(bmp388::Bmp388),
}

/// One logical pressure/temperature source
///
/// The sensor does not own its bus device's lifetime - the registry
/// does; [`BaroSensor::clear`] hands the handle back for release.
#[derive(Debug, Clone, Default)]
pub struct BaroSensor {
    device: Option<DeviceHandle>,
    backend: Option<Backend>,
    pressure: f32,
    temperature: f32,
}

impl BaroSensor {
    pub const fn new() -> Self {
        Self {
            device: None,
            backend: None,
            pressure: 0.0,
            temperature: 0.0,
        }
    }

    pub fn kind(&self) -> SensorKind {
        match self.backend {
            None => SensorKind::Unknown,
            Some(Backend::Spl06(_)) => SensorKind::Spl06,
            Some(Backend::Bmp280(_)) => SensorKind::Bmp280,
            Some(Backend::Bmp388(_)) => SensorKind::Bmp388,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.backend.is_some()
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.device
    }

    /// Last compensated pressure in Pa
    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    /// Last compensated temperature in degrees C
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Try each family in probe order at the given device
    ///
    /// On success the sensor owns a configured, continuously-sampling
    /// chip and the matching compensation path. On failure the device
    /// handle is untouched; the caller releases it.
    pub fn attach<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        device: DeviceHandle,
    ) -> bool
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let backend = if let Some(chip) = bmp280::detect(registry, device) {
            Backend::Bmp280(chip)
        } else if let Some(chip) = bmp388::detect(registry, device) {
            Backend::Bmp388(chip)
        } else if let Some(chip) = spl06::detect(registry, device) {
            Backend::Spl06(chip)
        } else {
            return false;
        };
        self.device = Some(device);
        self.backend = Some(backend);
        self.pressure = 0.0;
        self.temperature = 0.0;
        true
    }

    /// Read a raw sample and compensate it
    ///
    /// Never called before detection binds a backend; an unbound sensor
    /// reports [`BusError::InvalidHandle`] rather than fabricating data.
    pub fn sample<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
    ) -> Result<(), BusError>
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let device = self.device.ok_or(BusError::InvalidHandle)?;
        let backend = self.backend.as_mut().ok_or(BusError::InvalidHandle)?;
        let (pressure, temperature) = match backend {
            Backend::Spl06(chip) => chip.sample(registry, device)?,
            Backend::Bmp280(chip) => chip.sample(registry, device)?,
            Backend::Bmp388(chip) => chip.sample(registry, device)?,
        };
        self.pressure = pressure;
        self.temperature = temperature;
        Ok(())
    }

    /// Detach from the bus device, returning the handle for release
    pub fn clear(&mut self) -> Option<DeviceHandle> {
        self.backend = None;
        self.pressure = 0.0;
        self.temperature = 0.0;
        self.device.take()
    }
}

/// Sign-extend a 24-bit two's-complement value
pub(crate) fn sign_extend_24(raw: u32) -> i32 {
    if raw & 0x80_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusId, DeviceRole};
    use crate::sim::{FakeBus, SimDelay};
    use respira_hal::NoEnables;

    type Registry = BusRegistry<FakeBus, NoEnables, SimDelay>;

    fn registry(bus: FakeBus) -> Registry {
        BusRegistry::new(bus, None, NoEnables, SimDelay::default())
    }

    #[test]
    fn sign_extension_of_24_bit_values() {
        assert_eq!(sign_extend_24(0x000000), 0);
        assert_eq!(sign_extend_24(0x7FFFFF), 8_388_607);
        assert_eq!(sign_extend_24(0x800000), -8_388_608);
        assert_eq!(sign_extend_24(0xFFFFFF), -1);
    }

    #[test]
    fn probe_order_prefers_bmp280() {
        // A device that answers both id registers binds as BMP280
        let mut bus = FakeBus::new();
        bus.add_device(0x76, 0, false);
        bus.device_mut(0x76).mem[0xD0] = bmp280::CHIP_ID;
        bus.device_mut(0x76).mem[0x00] = bmp388::CHIP_ID;
        let mut reg = registry(bus);
        let dev = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, None, DeviceRole::Sensor)
            .unwrap();

        let mut sensor = BaroSensor::new();
        assert!(sensor.attach(&mut reg, dev));
        assert_eq!(sensor.kind(), SensorKind::Bmp280);
    }

    #[test]
    fn unknown_chip_binds_nothing() {
        let mut bus = FakeBus::new();
        bus.add_device(0x76, 0, false);
        let mut reg = registry(bus);
        let dev = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, None, DeviceRole::Sensor)
            .unwrap();

        let mut sensor = BaroSensor::new();
        assert!(!sensor.attach(&mut reg, dev));
        assert_eq!(sensor.kind(), SensorKind::Unknown);
        assert!(sensor.device().is_none());
    }

    #[test]
    fn unbound_sensor_refuses_to_sample() {
        let mut reg = registry(FakeBus::new());
        let mut sensor = BaroSensor::new();
        assert_eq!(sensor.sample(&mut reg), Err(BusError::InvalidHandle));
    }
}
