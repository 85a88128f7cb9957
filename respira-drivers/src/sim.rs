//! Simulated hardware for host tests
//!
//! A small I2C fabric: devices with register memories, an optional mux
//! that gates visibility by channel, and recording enable lines. Chip
//! fixtures (calibration blobs, ids) are loaded by the individual tests.

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use respira_core::traits::{MotorOutputs, SharedPinMode};
use respira_hal::{EnableLines, I2cBus, InputPin, OutputPin};

/// One simulated register-mapped device
pub struct FakeDevice {
    pub address: u8,
    /// Mux channel this device answers on; 0 = always visible
    pub channel: u8,
    /// EEPROM-style two-byte register addressing
    pub two_byte_reg: bool,
    /// Force NACK (simulates a wiring fault mid-run)
    pub nack: bool,
    pub mem: [u8; 256],
    pointer: usize,
}

impl FakeDevice {
    fn new(address: u8, channel: u8, two_byte_reg: bool) -> Self {
        Self {
            address,
            channel,
            two_byte_reg,
            nack: false,
            mem: [0; 256],
            pointer: 0,
        }
    }
}

/// Simulated I2C bus with up to six devices and an optional mux
pub struct FakeBus {
    pub devices: Vec<FakeDevice, 6>,
    pub mux_address: Option<u8>,
    pub mux_channel: u8,
    /// Channel-select writes observed (for cache-elision assertions)
    pub mux_selects: u32,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            mux_address: None,
            mux_channel: 0,
            mux_selects: 0,
        }
    }

    pub fn with_mux(address: u8) -> Self {
        let mut bus = Self::new();
        bus.mux_address = Some(address);
        bus
    }

    pub fn add_device(&mut self, address: u8, channel: u8, two_byte_reg: bool) {
        let _ = self
            .devices
            .push(FakeDevice::new(address, channel, two_byte_reg));
    }

    pub fn device_mut(&mut self, address: u8) -> &mut FakeDevice {
        self.devices
            .iter_mut()
            .find(|d| d.address == address)
            .expect("no such simulated device")
    }

    /// Device visible at `address` with the current mux channel
    fn visible_mut(&mut self, address: u8) -> Option<&mut FakeDevice> {
        let mux_channel = self.mux_channel;
        self.devices
            .iter_mut()
            .find(|d| d.address == address && (d.channel == 0 || d.channel == mux_channel))
            .filter(|d| !d.nack)
    }
}

impl I2cBus for FakeBus {
    type Error = ();

    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error> {
        if Some(address) == self.mux_address {
            if let [channel] = data {
                self.mux_channel = *channel;
                self.mux_selects += 1;
            }
            return Ok(());
        }
        let dev = self.visible_mut(address).ok_or(())?;
        if data.is_empty() {
            return Ok(()); // address-only probe
        }
        let (pointer, payload) = if dev.two_byte_reg {
            if data.len() < 2 {
                return Err(());
            }
            ((data[0] as usize) << 8 | data[1] as usize, &data[2..])
        } else {
            (data[0] as usize, &data[1..])
        };
        dev.pointer = pointer % dev.mem.len();
        for (i, &b) in payload.iter().enumerate() {
            let at = (dev.pointer + i) % 256;
            dev.mem[at] = b;
        }
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        if Some(address) == self.mux_address {
            buf.fill(self.mux_channel);
            return Ok(());
        }
        let dev = self.visible_mut(address).ok_or(())?;
        for (i, b) in buf.iter_mut().enumerate() {
            *b = dev.mem[(dev.pointer + i) % 256];
        }
        dev.pointer = (dev.pointer + buf.len()) % 256;
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.write(address, write_data)?;
        self.read(address, read_buf)
    }
}

/// Enable-line bank that records every transition
#[derive(Default)]
pub struct RecordingEnables {
    pub log: Vec<(u8, bool), 64>,
}

impl EnableLines for RecordingEnables {
    fn set(&mut self, line: u8, enabled: bool) {
        let _ = self.log.push((line, enabled));
    }
}

/// Delay provider that only counts time
#[derive(Default)]
pub struct SimDelay {
    pub total_ns: u64,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

/// Loopback pin: tests drive it as an output, the core reads it as an
/// input (the home switch, with its pull-up idling high)
pub struct SimPin {
    pub level_high: bool,
}

impl Default for SimPin {
    fn default() -> Self {
        Self { level_high: true }
    }
}

impl InputPin for SimPin {
    fn is_high(&self) -> bool {
        self.level_high
    }
}

impl OutputPin for SimPin {
    fn set_high(&mut self) {
        self.level_high = true;
    }

    fn set_low(&mut self) {
        self.level_high = false;
    }

    fn is_set_high(&self) -> bool {
        self.level_high
    }
}

/// Motor output recorder with the dual-enable interlock tripwire
///
/// Every transition applies immediately, like real pins; the violation
/// counter trips the moment both drive enables read active together.
pub struct SimOutputs {
    pub pwm: u8,
    pub forward_enable: bool,
    pub reverse_enable: bool,
    pub direction_forward: bool,
    pub step_level: bool,
    pub shared_mode: SharedPinMode,
    pub step_pulses: u32,
    pub dual_enable_violations: u32,
}

impl Default for SimOutputs {
    fn default() -> Self {
        Self {
            pwm: 0,
            forward_enable: false,
            reverse_enable: false,
            direction_forward: false,
            step_level: false,
            shared_mode: SharedPinMode::FeedbackInput,
            step_pulses: 0,
            dual_enable_violations: 0,
        }
    }
}

impl SimOutputs {
    fn check_interlock(&mut self) {
        if self.forward_enable && self.reverse_enable {
            self.dual_enable_violations += 1;
        }
    }
}

impl MotorOutputs for SimOutputs {
    fn set_pwm(&mut self, percent: u8) {
        self.pwm = percent;
    }

    fn set_forward_enable(&mut self, on: bool) {
        self.forward_enable = on;
        self.check_interlock();
    }

    fn set_reverse_enable(&mut self, on: bool) {
        self.reverse_enable = on;
        self.check_interlock();
    }

    fn set_direction(&mut self, forward: bool) {
        self.direction_forward = forward;
    }

    fn set_step(&mut self, high: bool) {
        if high && !self.step_level {
            self.step_pulses += 1;
        }
        self.step_level = high;
    }

    fn set_shared_pin(&mut self, mode: SharedPinMode) {
        self.shared_mode = mode;
    }
}
