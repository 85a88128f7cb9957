//! BMP280 barometric sensor backend
//!
//! 20-bit raw values, a 24-byte little-endian calibration image, and the
//! classic Bosch integer double-compensation: temperature produces the
//! `t_fine` intermediate that pressure compensation depends on, so for
//! any given sample temperature MUST be compensated first.

use crate::bus::{BusError, BusRegistry, DeviceHandle};
use embedded_hal::delay::DelayNs;
use respira_hal::{EnableLines, I2cBus};

pub const CHIP_ID: u8 = 0x58;

const CHIP_ID_REG: u16 = 0xD0;
const CTRL_MEAS_REG: u16 = 0xF4;
const CONFIG_REG: u16 = 0xF5;
const PRESSURE_MSB_REG: u16 = 0xF7;
const CALIB_START_REG: u16 = 0x88;
const CALIB_LEN: usize = 24;
const DATA_FRAME_SIZE: usize = 6;

const NORMAL_MODE: u8 = 0x03;
const OVERSAMP_2X: u8 = 0x02;
const OVERSAMP_8X: u8 = 0x04;
const FILTER_COEFF_OFF: u8 = 0x00;
const STANDBY_MS_1: u8 = 0x00;

/// Pressure 8x, temperature 2x, continuous sampling
const CTRL_MEAS_MODE: u8 = OVERSAMP_8X << 2 | OVERSAMP_2X << 5 | NORMAL_MODE;

/// Trimming parameters, straight from the chip's NVM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

/// Chip state: calibration plus the last raw sample pair
#[derive(Debug, Clone, Default)]
pub struct Bmp280 {
    pub cal: Calibration,
    up: i32,
    ut: i32,
}

/// Decode the little-endian calibration image
pub fn decode_calibration(raw: &[u8; CALIB_LEN]) -> Calibration {
    let u = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]);
    let s = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]);
    Calibration {
        dig_t1: u(0),
        dig_t2: s(2),
        dig_t3: s(4),
        dig_p1: u(6),
        dig_p2: s(8),
        dig_p3: s(10),
        dig_p4: s(12),
        dig_p5: s(14),
        dig_p6: s(16),
        dig_p7: s(18),
        dig_p8: s(20),
        dig_p9: s(22),
    }
}

/// Temperature in 0.01 degC units plus the `t_fine` intermediate
///
/// An output of 5123 is 51.23 degC.
pub fn compensate_temperature(cal: &Calibration, adc_t: i32) -> (i32, i32) {
    let var1 = ((adc_t >> 3) - ((cal.dig_t1 as i32) << 1)) * (cal.dig_t2 as i32) >> 11;
    let var2 = (((adc_t >> 4) - cal.dig_t1 as i32) * ((adc_t >> 4) - cal.dig_t1 as i32) >> 12)
        * (cal.dig_t3 as i32)
        >> 14;
    let t_fine = var1 + var2;
    let t = (t_fine * 5 + 128) >> 8;
    (t, t_fine)
}

/// Pressure in Pa as Q24.8: 24674867 is 24674867/256 = 96386.2 Pa
///
/// `t_fine` must come from [`compensate_temperature`] on the same sample.
pub fn compensate_pressure(cal: &Calibration, adc_p: i32, t_fine: i32) -> u32 {
    let mut var1 = t_fine as i64 - 128_000;
    let mut var2 = var1 * var1 * cal.dig_p6 as i64;
    var2 += (var1 * cal.dig_p5 as i64) << 17;
    var2 += (cal.dig_p4 as i64) << 35;
    var1 = ((var1 * var1 * cal.dig_p3 as i64) >> 8) + ((var1 * cal.dig_p2 as i64) << 12);
    var1 = ((1i64 << 47) + var1) * (cal.dig_p1 as i64) >> 33;
    if var1 == 0 {
        return 0; // avoid division by zero with a blank calibration
    }

    let mut p: i64 = 1_048_576 - adc_p as i64;
    p = (((p << 31) - var2) * 3125) / var1;
    var1 = ((cal.dig_p9 as i64) * (p >> 13) * (p >> 13)) >> 25;
    var2 = ((cal.dig_p8 as i64) * p) >> 19;
    p = ((p + var1 + var2) >> 8) + ((cal.dig_p7 as i64) << 4);
    p as u32
}

/// Probe for the chip; on match, pull calibration and start sampling
pub fn detect<I2C, EN, D>(
    registry: &mut BusRegistry<I2C, EN, D>,
    device: DeviceHandle,
) -> Option<Bmp280>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    for _ in 0..super::PROBE_RETRY_COUNT {
        if let Ok(id) = registry.read_byte(device, CHIP_ID_REG) {
            if id == CHIP_ID {
                let mut raw = [0u8; CALIB_LEN];
                registry.read(device, CALIB_START_REG, &mut raw).ok()?;
                registry
                    .write_byte(device, CONFIG_REG, FILTER_COEFF_OFF | STANDBY_MS_1)
                    .ok()?;
                registry.write_byte(device, CTRL_MEAS_REG, CTRL_MEAS_MODE).ok()?;
                return Some(Bmp280 {
                    cal: decode_calibration(&raw),
                    up: 0,
                    ut: 0,
                });
            }
        }
        registry.delay_ms(super::PROBE_RETRY_DELAY_MS);
    }
    None
}

impl Bmp280 {
    /// Read one pressure+temperature frame and compensate it
    pub fn sample<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        device: DeviceHandle,
    ) -> Result<(f32, f32), BusError>
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let mut data = [0u8; DATA_FRAME_SIZE];
        registry.read(device, PRESSURE_MSB_REG, &mut data)?;
        self.up =
            ((data[0] as u32) << 12 | (data[1] as u32) << 4 | (data[2] as u32) >> 4) as i32;
        self.ut =
            ((data[3] as u32) << 12 | (data[4] as u32) << 4 | (data[5] as u32) >> 4) as i32;

        // t_fine first; pressure depends on it
        let (t, t_fine) = compensate_temperature(&self.cal, self.ut);
        let p = compensate_pressure(&self.cal, self.up, t_fine);

        Ok((p as f32 / 256.0, t as f32 / 100.0))
    }
}
