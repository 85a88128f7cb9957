//! BMP388 barometric sensor backend
//!
//! 24-bit raw values and a floating-point compensation path: fourteen
//! packed trim words are each normalized by a parameter-specific power
//! of two, then temperature is a quadratic in `(raw - T1)` and pressure
//! a 6-term polynomial in the linearized temperature and raw pressure,
//! including a cubic self-term.

use crate::bus::{BusError, BusRegistry, DeviceHandle};
use embedded_hal::delay::DelayNs;
use libm::powf;
use respira_hal::{EnableLines, I2cBus};

pub const CHIP_ID: u8 = 0x50;

const CHIP_ID_REG: u16 = 0x00;
const DATA_0_REG: u16 = 0x04;
const EVENT_REG: u16 = 0x10;
const PWR_CTRL_REG: u16 = 0x1B;
const OSR_REG: u16 = 0x1C;
const ODR_REG: u16 = 0x1D;
const CONFIG_REG: u16 = 0x1F;
const TRIMMING_START_REG: u16 = 0x31;
const TRIMMING_LEN: usize = 21;
const CMD_REG: u16 = 0x7E;

const RESET_CODE: u8 = 0xB6;
const RESET_SETTLE_MS: u32 = 10;
const DATA_FRAME_SIZE: usize = 6;

const OVERSAMP_1X: u8 = 0x00;
const OVERSAMP_8X: u8 = 0x03;
const FILTER_COEFF_OFF: u8 = 0x00;
const TIME_STANDBY_20MS: u8 = 0x02;

/// Temperature+pressure measurement enables, sleep mode
const PWR_CTRL_ENABLES: u8 = 0x03;
/// Same enables with normal (continuous) mode bits
const PWR_CTRL_NORMAL: u8 = 0x33;

/// Normalized floating-point trim parameters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    pub t1: f32,
    pub t2: f32,
    pub t3: f32,
    pub p1: f32,
    pub p2: f32,
    pub p3: f32,
    pub p4: f32,
    pub p5: f32,
    pub p6: f32,
    pub p7: f32,
    pub p8: f32,
    pub p9: f32,
    pub p10: f32,
    pub p11: f32,
}

/// Chip state: calibration plus the last raw sample pair
#[derive(Debug, Clone, Default)]
pub struct Bmp388 {
    pub cal: Calibration,
    up: i32,
    ut: i32,
}

/// Decode the packed trim words and normalize them
///
/// Word layout per the trimming memory map: T1/T2/P5/P6 unsigned 16-bit
/// little-endian, P1/P2/P9 signed 16-bit, the rest signed bytes.
pub fn decode_calibration(raw: &[u8; TRIMMING_LEN]) -> Calibration {
    let u = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]) as f32;
    let s = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]) as f32;
    let b = |i: usize| raw[i] as i8 as f32;

    Calibration {
        t1: u(0) / powf(2.0, -8.0),
        t2: u(2) / powf(2.0, 30.0),
        t3: b(4) / powf(2.0, 48.0),
        p1: (s(5) - powf(2.0, 14.0)) / powf(2.0, 20.0),
        p2: (s(7) - powf(2.0, 14.0)) / powf(2.0, 29.0),
        p3: b(9) / powf(2.0, 32.0),
        p4: b(10) / powf(2.0, 37.0),
        p5: u(11) / powf(2.0, -3.0),
        p6: u(13) / powf(2.0, 6.0),
        p7: b(15) / powf(2.0, 8.0),
        p8: b(16) / powf(2.0, 15.0),
        p9: s(17) / powf(2.0, 48.0),
        p10: b(19) / powf(2.0, 48.0),
        p11: b(20) / powf(2.0, 65.0),
    }
}

/// Linearized temperature; divide by 100 for degrees C
pub fn compensate_temperature(cal: &Calibration, ut: i32) -> f32 {
    let partial_data1 = ut as f32 - cal.t1;
    let partial_data2 = partial_data1 * cal.t2;
    partial_data2 + partial_data1 * partial_data1 * cal.t3
}

/// Pressure in Pa from the raw reading and the linearized temperature
pub fn compensate_pressure(cal: &Calibration, up: i32, t_lin: f32) -> f32 {
    let uncomp = up as f32;

    let partial_data1 = cal.p6 * t_lin;
    let partial_data2 = cal.p7 * t_lin * t_lin;
    let partial_data3 = cal.p8 * t_lin * t_lin * t_lin;
    let partial_out1 = cal.p5 + partial_data1 + partial_data2 + partial_data3;

    let partial_data1 = cal.p2 * t_lin;
    let partial_data2 = cal.p3 * t_lin * t_lin;
    let partial_data3 = cal.p4 * t_lin * t_lin * t_lin;
    let partial_out2 = uncomp * (cal.p1 + partial_data1 + partial_data2 + partial_data3);

    let partial_data1 = uncomp * uncomp;
    let partial_data2 = cal.p9 + cal.p10 * t_lin;
    let partial_data3 = partial_data1 * partial_data2;
    let partial_data4 = partial_data3 + uncomp * uncomp * uncomp * cal.p11;

    partial_out1 + partial_out2 + partial_data4
}

/// Soft-reset; true when the chip reports the por/reset event
fn reset<I2C, EN, D>(registry: &mut BusRegistry<I2C, EN, D>, device: DeviceHandle) -> bool
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    let _ = registry.write_byte(device, CMD_REG, RESET_CODE);
    registry.delay_ms(RESET_SETTLE_MS);
    matches!(registry.read_byte(device, EVENT_REG), Ok(event) if event != 0)
}

/// Probe for the chip; on match, pull calibration and start sampling
pub fn detect<I2C, EN, D>(
    registry: &mut BusRegistry<I2C, EN, D>,
    device: DeviceHandle,
) -> Option<Bmp388>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    for _ in 0..super::PROBE_RETRY_COUNT {
        reset(registry, device);

        if let Ok(id) = registry.read_byte(device, CHIP_ID_REG) {
            if id == CHIP_ID {
                let mut raw = [0u8; TRIMMING_LEN];
                registry.read(device, TRIMMING_START_REG, &mut raw).ok()?;
                configure(registry, device).ok()?;
                return Some(Bmp388 {
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

fn configure<I2C, EN, D>(
    registry: &mut BusRegistry<I2C, EN, D>,
    device: DeviceHandle,
) -> Result<(), BusError>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    registry.write_byte(device, CONFIG_REG, FILTER_COEFF_OFF << 1)?;
    // Pressure 8x, temperature 1x
    registry.write_byte(device, OSR_REG, OVERSAMP_8X | OVERSAMP_1X << 3)?;
    registry.write_byte(device, PWR_CTRL_REG, PWR_CTRL_ENABLES)?;
    registry.write_byte(device, ODR_REG, TIME_STANDBY_20MS)?;
    registry.write_byte(device, PWR_CTRL_REG, PWR_CTRL_NORMAL)
}

impl Bmp388 {
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
        registry.read(device, DATA_0_REG, &mut data)?;
        self.up = ((data[2] as u32) << 16 | (data[1] as u32) << 8 | data[0] as u32) as i32;
        self.ut = ((data[5] as u32) << 16 | (data[4] as u32) << 8 | data[3] as u32) as i32;

        let t_lin = compensate_temperature(&self.cal, self.ut);
        let pressure = compensate_pressure(&self.cal, self.up, t_lin);

        Ok((pressure, t_lin / 100.0))
    }
}
