//! SPL06-007 barometric sensor backend
//!
//! 24-bit raw values; nine calibration words bit-packed into 18 bytes,
//! with 12- and 20-bit two's-complement fields that need sign extension.
//! Compensation is a degree-3 polynomial in the scaled pressure reading
//! with temperature cross terms, per the datasheet.

use super::sign_extend_24;
use crate::bus::{BusError, BusRegistry, DeviceHandle};
use embedded_hal::delay::DelayNs;
use respira_hal::{EnableLines, I2cBus};

pub const CHIP_ID: u8 = 0x10;

const PRESSURE_START_REG: u16 = 0x00;
const TEMPERATURE_START_REG: u16 = 0x03;
const PRESSURE_CFG_REG: u16 = 0x06;
const TEMPERATURE_CFG_REG: u16 = 0x07;
const MODE_AND_STATUS_REG: u16 = 0x08;
const INT_AND_FIFO_CFG_REG: u16 = 0x09;
const CHIP_ID_REG: u16 = 0x0D;
const CALIB_COEFFS_START: u16 = 0x10;
const CALIB_COEFFS_LEN: usize = 18;

// TEMPERATURE_CFG_REG
const TEMP_USE_EXT_SENSOR: u8 = 1 << 7;

// MODE_AND_STATUS_REG
const MEAS_PRESSURE: u8 = 1 << 0;
const MEAS_TEMPERATURE: u8 = 1 << 1;
const MEAS_CFG_CONTINUOUS: u8 = 1 << 2;
const MEAS_CFG_COEFFS_RDY: u8 = 1 << 7;

// INT_AND_FIFO_CFG_REG: result bit-shift flags, required above 8x
const PRESSURE_RESULT_BIT_SHIFT: u8 = 1 << 2;
const TEMPERATURE_RESULT_BIT_SHIFT: u8 = 1 << 3;

/// Background sample rates (value << 4 in the config registers)
const SAMPLE_RATE_8: u8 = 3;
const SAMPLE_RATE_64: u8 = 6;

pub const PRESSURE_OVERSAMPLING: u8 = 8;
pub const TEMPERATURE_OVERSAMPLING: u8 = 1;
const PRESSURE_SAMPLING_RATE: u8 = SAMPLE_RATE_64;
const TEMPERATURE_SAMPLING_RATE: u8 = SAMPLE_RATE_8;

/// Decoded calibration coefficients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    pub c0: i16,
    pub c1: i16,
    pub c00: i32,
    pub c10: i32,
    pub c01: i16,
    pub c11: i16,
    pub c20: i16,
    pub c21: i16,
    pub c30: i16,
}

/// Chip state: calibration plus the last raw readings
///
/// Pressure compensation uses the most recent temperature raw value, so
/// the raws persist between samples.
#[derive(Debug, Clone, Default)]
pub struct Spl06 {
    pub cal: Calibration,
    pressure_raw: i32,
    temperature_raw: i32,
}

/// Compensation scale factor for an oversampling setting
pub fn scale_factor(oversampling: u8) -> i32 {
    match oversampling {
        1 => 524_288,
        2 => 1_572_864,
        4 => 3_670_016,
        8 => 7_864_320,
        16 => 253_952,
        32 => 516_096,
        64 => 1_040_384,
        128 => 2_088_960,
        _ => -1,
    }
}

fn samples_to_cfg(sample_rate: u8) -> u8 {
    match sample_rate {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        16 => 4,
        32 => 5,
        64 => 6,
        _ => 7,
    }
}

/// Unpack the 18-byte calibration image
///
/// c0/c1 are 12-bit and c00/c10 are 20-bit two's complement straddling
/// nibble boundaries; the high bit of each field drives sign extension.
pub fn decode_calibration(raw: &[u8; CALIB_COEFFS_LEN]) -> Calibration {
    let c0_sign: u16 = if raw[0] & 0x80 != 0 { 0xF000 } else { 0 };
    let c0 = (c0_sign | (raw[0] as u16) << 4 | (raw[1] as u16 & 0xF0) >> 4) as i16;
    let c1_sign: u16 = if raw[1] & 0x08 != 0 { 0xF000 } else { 0 };
    let c1 = (c1_sign | (raw[1] as u16 & 0x0F) << 8 | raw[2] as u16) as i16;
    let c00_sign: u32 = if raw[3] & 0x80 != 0 { 0xFFF0_0000 } else { 0 };
    let c00 = (c00_sign
        | (raw[3] as u32) << 12
        | (raw[4] as u32) << 4
        | (raw[5] as u32 & 0xF0) >> 4) as i32;
    let c10_sign: u32 = if raw[5] & 0x08 != 0 { 0xFFF0_0000 } else { 0 };
    let c10 = (c10_sign
        | (raw[5] as u32 & 0x0F) << 16
        | (raw[6] as u32) << 8
        | raw[7] as u32) as i32;
    let c01 = ((raw[8] as u16) << 8 | raw[9] as u16) as i16;
    let c11 = ((raw[10] as u16) << 8 | raw[11] as u16) as i16;
    let c20 = ((raw[12] as u16) << 8 | raw[13] as u16) as i16;
    let c21 = ((raw[14] as u16) << 8 | raw[15] as u16) as i16;
    let c30 = ((raw[16] as u16) << 8 | raw[17] as u16) as i16;
    Calibration {
        c0,
        c1,
        c00,
        c10,
        c01,
        c11,
        c20,
        c21,
        c30,
    }
}

/// Temperature in degrees C from a raw reading
pub fn compensate_temperature(cal: &Calibration, temperature_raw: i32) -> f32 {
    let t_raw_sc = temperature_raw as f32 / scale_factor(TEMPERATURE_OVERSAMPLING) as f32;
    cal.c0 as f32 / 2.0 + t_raw_sc * cal.c1 as f32
}

/// Pressure in Pa from raw pressure and the matching raw temperature
pub fn compensate_pressure(cal: &Calibration, pressure_raw: i32, temperature_raw: i32) -> f32 {
    let p_raw_sc = pressure_raw as f32 / scale_factor(PRESSURE_OVERSAMPLING) as f32;
    let t_raw_sc = temperature_raw as f32 / scale_factor(TEMPERATURE_OVERSAMPLING) as f32;

    let pressure_cal = cal.c00 as f32
        + p_raw_sc
            * (cal.c10 as f32 + p_raw_sc * (cal.c20 as f32 + p_raw_sc * cal.c30 as f32));
    let p_temp_comp =
        t_raw_sc * (cal.c01 as f32 + p_raw_sc * (cal.c11 as f32 + p_raw_sc * cal.c21 as f32));

    pressure_cal + p_temp_comp
}

/// Probe for the chip; on match, pull calibration and start sampling
pub fn detect<I2C, EN, D>(
    registry: &mut BusRegistry<I2C, EN, D>,
    device: DeviceHandle,
) -> Option<Spl06>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    for _ in 0..super::PROBE_RETRY_COUNT {
        if let Ok(id) = registry.read_byte(device, CHIP_ID_REG) {
            if id == CHIP_ID {
                let cal = read_calibration(registry, device)?;
                configure(registry, device).ok()?;
                return Some(Spl06 {
                    cal,
                    pressure_raw: 0,
                    temperature_raw: 0,
                });
            }
        }
        registry.delay_ms(super::PROBE_RETRY_DELAY_MS);
    }
    None
}

fn read_calibration<I2C, EN, D>(
    registry: &mut BusRegistry<I2C, EN, D>,
    device: DeviceHandle,
) -> Option<Calibration>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    let status = registry.read_byte(device, MODE_AND_STATUS_REG).ok()?;
    if status & MEAS_CFG_COEFFS_RDY == 0 {
        return None;
    }
    let mut raw = [0u8; CALIB_COEFFS_LEN];
    registry.read(device, CALIB_COEFFS_START, &mut raw).ok()?;
    Some(decode_calibration(&raw))
}

fn configure<I2C, EN, D>(
    registry: &mut BusRegistry<I2C, EN, D>,
    device: DeviceHandle,
) -> Result<(), BusError>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    let temp_cfg = TEMP_USE_EXT_SENSOR
        | samples_to_cfg(TEMPERATURE_OVERSAMPLING)
        | TEMPERATURE_SAMPLING_RATE << 4;
    registry.write_byte(device, TEMPERATURE_CFG_REG, temp_cfg)?;

    let press_cfg = samples_to_cfg(PRESSURE_OVERSAMPLING) | PRESSURE_SAMPLING_RATE << 4;
    registry.write_byte(device, PRESSURE_CFG_REG, press_cfg)?;

    let mut shift_cfg = 0;
    if TEMPERATURE_OVERSAMPLING > 8 {
        shift_cfg |= TEMPERATURE_RESULT_BIT_SHIFT;
    }
    if PRESSURE_OVERSAMPLING > 8 {
        shift_cfg |= PRESSURE_RESULT_BIT_SHIFT;
    }
    registry.write_byte(device, INT_AND_FIFO_CFG_REG, shift_cfg)?;

    registry.write_byte(
        device,
        MODE_AND_STATUS_REG,
        MEAS_PRESSURE | MEAS_TEMPERATURE | MEAS_CFG_CONTINUOUS,
    )
}

impl Spl06 {
    /// Read and compensate one sample
    ///
    /// Pressure is read and compensated first (against the previous raw
    /// temperature), then the temperature refreshes - same cadence the
    /// chip's continuous mode produces them.
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
        let mut data = [0u8; 3];
        registry.read(device, PRESSURE_START_REG, &mut data)?;
        self.pressure_raw = sign_extend_24(
            (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32,
        );
        let pressure = compensate_pressure(&self.cal, self.pressure_raw, self.temperature_raw);

        registry.read(device, TEMPERATURE_START_REG, &mut data)?;
        self.temperature_raw = sign_extend_24(
            (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32,
        );
        let temperature = compensate_temperature(&self.cal, self.temperature_raw);

        Ok((pressure, temperature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusId, BusRegistry, DeviceRole};
    use crate::sim::{FakeBus, SimDelay};
    use respira_hal::NoEnables;

    #[test]
    fn oversampling_scale_table() {
        assert_eq!(scale_factor(1), 524_288);
        assert_eq!(scale_factor(8), 7_864_320);
        assert_eq!(scale_factor(128), 2_088_960);
        assert_eq!(scale_factor(3), -1);
    }

    #[test]
    fn calibration_decoding_sign_extends_packed_fields() {
        let mut raw = [0u8; CALIB_COEFFS_LEN];
        // c0 = all ones (12-bit) -> -1; c1 = all ones -> -1
        raw[0] = 0xFF;
        raw[1] = 0xFF;
        raw[2] = 0xFF;
        // c00 = 0x80000 with sign -> -524288; c10 = 0x00102 = 258
        raw[3] = 0x80;
        raw[4] = 0x00;
        raw[5] = 0x00;
        raw[6] = 0x01;
        raw[7] = 0x02;
        // 16-bit words
        raw[8] = 0x80; // c01 = -32768
        raw[10] = 0x00;
        raw[11] = 0x7F; // c11 = 127
        raw[12] = 0xFF;
        raw[13] = 0xFF; // c20 = -1
        raw[16] = 0x7F;
        raw[17] = 0xFF; // c30 = 32767

        let cal = decode_calibration(&raw);
        assert_eq!(cal.c0, -1);
        assert_eq!(cal.c1, -1);
        assert_eq!(cal.c00, -524_288);
        assert_eq!(cal.c10, 258);
        assert_eq!(cal.c01, -32_768);
        assert_eq!(cal.c11, 127);
        assert_eq!(cal.c20, -1);
        assert_eq!(cal.c21, 0);
        assert_eq!(cal.c30, 32_767);
    }

    #[test]
    fn positive_packed_fields_decode_unchanged() {
        let mut raw = [0u8; CALIB_COEFFS_LEN];
        raw[0] = 0x12;
        raw[1] = 0x34; // c0 = 0x123, c1 = 0x4xx
        raw[2] = 0x56;
        let cal = decode_calibration(&raw);
        assert_eq!(cal.c0, 0x123);
        assert_eq!(cal.c1, 0x456);
    }

    #[test]
    fn temperature_compensation_is_linear_in_scaled_raw() {
        let cal = Calibration {
            c0: 210,
            c1: -2,
            ..Calibration::default()
        };
        // raw = 2x the 1x-oversampling scale factor -> t_raw_sc = 2.0
        let t = compensate_temperature(&cal, 2 * 524_288);
        assert!((t - (105.0 - 4.0)).abs() < 1e-3);
    }

    #[test]
    fn pressure_polynomial_matches_hand_computation() {
        let cal = Calibration {
            c0: 0,
            c1: 0,
            c00: 1000,
            c10: 100,
            c20: 10,
            c30: 1,
            c01: 50,
            c11: 5,
            c21: 2,
        };
        // p_raw_sc = 1.0 (8x oversampling), t_raw_sc = 2.0
        let p = compensate_pressure(&cal, 7_864_320, 2 * 524_288);
        // 1000 + 1*(100 + 1*(10 + 1)) + 2*(50 + 1*(5 + 2)) = 1111 + 114
        assert!((p - 1225.0).abs() < 1e-2);
    }

    #[test]
    fn same_raw_same_output() {
        let cal = Calibration {
            c0: 150,
            c1: -3,
            c00: 50_000,
            c10: -2000,
            c20: 33,
            c30: -4,
            c01: 77,
            c11: -8,
            c21: 1,
        };
        let a = compensate_pressure(&cal, 1_234_567, 654_321);
        let b = compensate_pressure(&cal, 1_234_567, 654_321);
        assert_eq!(a, b);
    }

    /// Wire a simulated chip with a plausible register image
    fn sim_chip() -> FakeBus {
        let mut bus = FakeBus::new();
        bus.add_device(0x76, 0, false);
        let dev = bus.device_mut(0x76);
        dev.mem[CHIP_ID_REG as usize] = CHIP_ID;
        dev.mem[MODE_AND_STATUS_REG as usize] = MEAS_CFG_COEFFS_RDY;
        // c0 = 0x123, c1 = 0x456, rest zero
        dev.mem[0x10] = 0x12;
        dev.mem[0x11] = 0x34;
        dev.mem[0x12] = 0x56;
        bus
    }

    #[test]
    fn detect_reads_calibration_and_configures() {
        let mut reg = BusRegistry::new(sim_chip(), None, NoEnables, SimDelay::default());
        let dev = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, None, DeviceRole::Sensor)
            .unwrap();

        let chip = detect(&mut reg, dev).expect("chip present");
        assert_eq!(chip.cal.c0, 0x123);
        assert_eq!(chip.cal.c1, 0x456);

        // Continuous measurement was started
        let mode = reg.primary_mut().device_mut(0x76).mem[MODE_AND_STATUS_REG as usize];
        assert_eq!(
            mode & 0x07,
            MEAS_PRESSURE | MEAS_TEMPERATURE | MEAS_CFG_CONTINUOUS
        );
        let press_cfg = reg.primary_mut().device_mut(0x76).mem[PRESSURE_CFG_REG as usize];
        assert_eq!(press_cfg, 3 | 6 << 4);
    }

    #[test]
    fn wrong_chip_id_is_not_this_family() {
        let mut bus = sim_chip();
        bus.device_mut(0x76).mem[CHIP_ID_REG as usize] = 0x58;
        let mut reg = BusRegistry::new(bus, None, NoEnables, SimDelay::default());
        let dev = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, None, DeviceRole::Sensor)
            .unwrap();
        assert!(detect(&mut reg, dev).is_none());
    }

    #[test]
    fn sample_round_trip_through_registers() {
        let mut bus = sim_chip();
        {
            let dev = bus.device_mut(0x76);
            // pressure raw = scale factor (p_raw_sc = 1.0)
            dev.mem[0x00] = 0x78;
            dev.mem[0x01] = 0x00;
            dev.mem[0x02] = 0x00; // 0x780000 = 7864320
            // temperature raw = 524288 (t_raw_sc = 1.0)
            dev.mem[0x03] = 0x08;
            dev.mem[0x04] = 0x00;
            dev.mem[0x05] = 0x00;
        }
        let mut reg = BusRegistry::new(bus, None, NoEnables, SimDelay::default());
        let dev = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, None, DeviceRole::Sensor)
            .unwrap();
        let mut chip = detect(&mut reg, dev).unwrap();

        let (_, t1) = chip.sample(&mut reg, dev).unwrap();
        // c0 = 0x123 (291), c1 = 0x456 (1110): t = 145.5 + 1110
        assert!((t1 - (291.0 / 2.0 + 1110.0)).abs() < 1e-2);

        // Second sample now has a matching raw temperature for pressure
        let (p2, _) = chip.sample(&mut reg, dev).unwrap();
        let expected = compensate_pressure(&chip.cal, 7_864_320, 524_288);
        assert!((p2 - expected).abs() < 1e-3);
    }
}
