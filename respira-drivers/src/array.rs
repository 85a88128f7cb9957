//! Sensor-array topology detection and sampling
//!
//! Four barometers populate the head in one of three physical layouts,
//! discovered at runtime in this order:
//!
//! 1. **Mux**: a switch chip at 0x70 with the sensor pairs on channels 1
//!    and 2 (and the identity EEPROM alongside the first pair)
//! 2. **Address-translated**: all four sensors on one bus at distinct
//!    addresses 0x74-0x77
//! 3. **Dual-bus / enable-switched**: one pair per bus (or per enable
//!    line on single-bus boards), with the EEPROM's location deciding
//!    which path is A - paths swap automatically if it answers on B
//!
//! A topology only counts once all four logical slots resolve; anything
//! partial is torn down so the pool never leaks handles.

use crate::baro::BaroSensor;
use crate::bus::{BusError, BusId, BusRegistry, DeviceHandle, DeviceRole};
use embedded_hal::delay::DelayNs;
use respira_hal::{EnableLines, I2cBus};
use respira_protocol::{BusTopology, SensorMapping};

/// I2C switch address probed for the mux topology
pub const MUX_ADDRESS: u8 = 0x70;
/// Identity EEPROM address (all topologies)
pub const EEPROM_ADDRESS: u8 = 0x54;
/// Primary sensor address within a pair
pub const SENSOR_ADDR_A: u8 = 0x76;
/// Secondary sensor address within a pair
pub const SENSOR_ADDR_B: u8 = 0x77;
/// Translated addresses of the second pair in the xlate topology;
/// 0x74 answering is also the topology's signature
pub const XLATE_ADDR_A: u8 = 0x74;
pub const XLATE_ADDR_B: u8 = 0x75;

/// Why topology detection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArrayError {
    /// No layout signature answered at all
    NoTopology,
    /// A layout matched but some slots stayed empty; bit N = slot N
    Missing(u8),
}

/// The four-slot sensor array
#[derive(Default)]
pub struct SensorArray {
    sensors: [BaroSensor; 4],
    topology: BusTopology,
    eeprom: Option<DeviceHandle>,
    found: bool,
}

impl SensorArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn topology(&self) -> BusTopology {
        self.topology
    }

    pub fn eeprom(&self) -> Option<DeviceHandle> {
        self.eeprom
    }

    pub fn sensors(&self) -> &[BaroSensor; 4] {
        &self.sensors
    }

    /// Walk the topology candidates until one resolves all four slots
    ///
    /// `enable_a`/`enable_b` are the bus enable lines of the two sensor
    /// paths on boards that have them; every candidate is tried with
    /// each line before falling through to the next layout.
    pub fn detect<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        enable_a: Option<u8>,
        enable_b: Option<u8>,
    ) -> Result<BusTopology, ArrayError>
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        self.release_all(registry);

        let matched = self.try_mux(registry, enable_a)
            || self.try_mux(registry, enable_b)
            || self.try_xlate(registry, enable_a)
            || self.try_xlate(registry, enable_b)
            || self.try_dual(registry, enable_a, enable_b);

        if !matched {
            self.release_all(registry);
            return Err(ArrayError::NoTopology);
        }

        let mut missing = 0u8;
        for (i, sensor) in self.sensors.iter().enumerate() {
            if !sensor.is_bound() {
                missing |= 1 << i;
            }
        }
        if missing != 0 {
            // Partial heads are unusable; drop every acquired device
            self.release_all(registry);
            return Err(ArrayError::Missing(missing));
        }

        self.found = true;
        Ok(self.topology)
    }

    /// Mux topology: pairs behind channels 1 and 2 of a switch at 0x70
    fn try_mux<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        enable: Option<u8>,
    ) -> bool
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let Ok(mux) = registry.allocate_i2c(
            BusId::Primary,
            MUX_ADDRESS,
            0,
            None,
            enable,
            DeviceRole::Mux,
        ) else {
            return false;
        };
        if !registry.detect(mux) {
            registry.release(mux);
            return false;
        }

        self.detect_eeprom(registry, EEPROM_ADDRESS, 1, Some(mux), enable);

        self.attach_sensor(registry, 0, SENSOR_ADDR_A, 1, Some(mux), enable);
        self.attach_sensor(registry, 1, SENSOR_ADDR_B, 1, Some(mux), enable);
        self.attach_sensor(registry, 2, SENSOR_ADDR_A, 2, Some(mux), enable);
        self.attach_sensor(registry, 3, SENSOR_ADDR_B, 2, Some(mux), enable);

        // The allocator's own mux reference; the sensors keep it alive
        registry.release(mux);

        self.topology = BusTopology::Mux;
        true
    }

    /// Address-translated topology: 0x74 answering is the signature
    fn try_xlate<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        enable: Option<u8>,
    ) -> bool
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let Ok(probe) = registry.allocate_i2c(
            BusId::Primary,
            XLATE_ADDR_A,
            0,
            None,
            enable,
            DeviceRole::Sensor,
        ) else {
            return false;
        };
        let present = registry.detect(probe);
        registry.release(probe);
        if !present {
            return false;
        }

        self.detect_eeprom(registry, EEPROM_ADDRESS, 0, None, enable);

        self.attach_sensor(registry, 0, SENSOR_ADDR_A, 0, None, enable);
        self.attach_sensor(registry, 1, SENSOR_ADDR_B, 0, None, enable);
        self.attach_sensor(registry, 2, XLATE_ADDR_A, 0, None, enable);
        self.attach_sensor(registry, 3, XLATE_ADDR_B, 0, None, enable);

        self.topology = BusTopology::Xlate;
        true
    }

    /// Dual-bus or enable-switched topology
    ///
    /// The EEPROM lives with pair A. Probe for it bare, then behind each
    /// enable line; finding it behind B means the harness is crossed, so
    /// the paths swap rather than failing the head.
    fn try_dual<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        enable_a: Option<u8>,
        enable_b: Option<u8>,
    ) -> bool
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let mut path_a = (BusId::Primary, enable_a);
        let mut path_b = (BusId::Secondary, enable_b);

        if !self.detect_eeprom(registry, EEPROM_ADDRESS, 0, None, None)
            && !self.detect_eeprom(registry, EEPROM_ADDRESS, 0, None, enable_a)
        {
            if self.detect_eeprom(registry, EEPROM_ADDRESS, 0, None, enable_b) {
                core::mem::swap(&mut path_a, &mut path_b);
            } else {
                return false;
            }
        }

        self.attach_sensor_on(registry, 0, path_a.0, SENSOR_ADDR_A, path_a.1);
        self.attach_sensor_on(registry, 1, path_a.0, SENSOR_ADDR_B, path_a.1);
        self.attach_sensor_on(registry, 2, path_b.0, SENSOR_ADDR_A, path_b.1);
        self.attach_sensor_on(registry, 3, path_b.0, SENSOR_ADDR_B, path_b.1);

        self.topology = BusTopology::DualI2c;
        true
    }

    fn detect_eeprom<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        address: u8,
        channel: u8,
        mux: Option<DeviceHandle>,
        enable: Option<u8>,
    ) -> bool
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        if self.eeprom.is_some() {
            return true;
        }
        let Ok(dev) = registry.allocate_i2c(
            BusId::Primary,
            address,
            channel,
            mux,
            enable,
            DeviceRole::Eeprom,
        ) else {
            return false;
        };
        if registry.detect(dev) {
            self.eeprom = Some(dev);
            true
        } else {
            registry.release(dev);
            false
        }
    }

    fn attach_sensor<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        slot: usize,
        address: u8,
        channel: u8,
        mux: Option<DeviceHandle>,
        enable: Option<u8>,
    ) where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let Ok(dev) =
            registry.allocate_i2c(BusId::Primary, address, channel, mux, enable, DeviceRole::Sensor)
        else {
            return;
        };
        if !self.sensors[slot].attach(registry, dev) {
            registry.release(dev);
        }
    }

    fn attach_sensor_on<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
        slot: usize,
        bus: BusId,
        address: u8,
        enable: Option<u8>,
    ) where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let Ok(dev) =
            registry.allocate_i2c(bus, address, 0, None, enable, DeviceRole::Sensor)
        else {
            return;
        };
        if !self.sensors[slot].attach(registry, dev) {
            registry.release(dev);
        }
    }

    /// Release every acquired device and reset the slots
    pub fn release_all<I2C, EN, D>(&mut self, registry: &mut BusRegistry<I2C, EN, D>)
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        for sensor in self.sensors.iter_mut() {
            if let Some(dev) = sensor.clear() {
                registry.release(dev);
            }
        }
        if let Some(rom) = self.eeprom.take() {
            registry.release(rom);
        }
        self.topology = BusTopology::None;
        self.found = false;
    }

    /// Global fail-safe after any sensor I/O fault
    ///
    /// A mixed valid/invalid sensor set cannot compute flow safely, so
    /// one failure invalidates all four slots. The identity EEPROM stays
    /// bound; it is not part of the sampling path.
    pub fn fail_all<I2C, EN, D>(&mut self, registry: &mut BusRegistry<I2C, EN, D>)
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        for sensor in self.sensors.iter_mut() {
            if let Some(dev) = sensor.clear() {
                registry.release(dev);
            }
        }
        self.found = false;
    }

    /// Sample all four sensors; any fault trips the global fail-safe
    pub fn sample<I2C, EN, D>(
        &mut self,
        registry: &mut BusRegistry<I2C, EN, D>,
    ) -> Result<[f32; 4], BusError>
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let mut readings = [0.0f32; 4];
        for (i, sensor) in self.sensors.iter_mut().enumerate() {
            match sensor.sample(registry) {
                Ok(()) => readings[i] = sensor.pressure(),
                Err(e) => {
                    self.fail_all(registry);
                    return Err(e);
                }
            }
        }
        Ok(readings)
    }

    /// Bus mapping bytes for the persisted record
    pub fn mappings<I2C, EN, D>(
        &self,
        registry: &BusRegistry<I2C, EN, D>,
    ) -> [SensorMapping; 4]
    where
        I2C: I2cBus,
        EN: EnableLines,
        D: DelayNs,
    {
        let mut out = [SensorMapping::default(); 4];
        for (i, sensor) in self.sensors.iter().enumerate() {
            if let Some(dev) = sensor.device() {
                out[i] = SensorMapping {
                    mapping_type: 1,
                    i2c_address: registry.address(dev),
                    mux_address: registry.mux_address(dev),
                    bus_number: registry.channel(dev),
                };
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baro::{bmp280, SensorKind};
    use crate::sim::{FakeBus, SimDelay};
    use respira_hal::NoEnables;

    type Registry = BusRegistry<FakeBus, NoEnables, SimDelay>;

    fn registry(bus: FakeBus) -> Registry {
        BusRegistry::new(bus, None, NoEnables, SimDelay::default())
    }

    fn dual_registry(a: FakeBus, b: FakeBus) -> Registry {
        BusRegistry::new(a, Some(b), NoEnables, SimDelay::default())
    }

    /// Minimal BMP280 image: id plus a couple of trim words
    fn load_bmp280(bus: &mut FakeBus, address: u8, channel: u8) {
        bus.add_device(address, channel, false);
        let dev = bus.devices.last_mut().unwrap();
        dev.mem[0xD0] = bmp280::CHIP_ID;
        dev.mem[0x88] = 0x70;
        dev.mem[0x89] = 0x6B; // dig_t1
        dev.mem[0x8E] = 0x7D;
        dev.mem[0x8F] = 0x8E; // dig_p1
    }

    fn mux_head_full() -> FakeBus {
        let mut bus = FakeBus::with_mux(MUX_ADDRESS);
        load_bmp280(&mut bus, SENSOR_ADDR_A, 1);
        load_bmp280(&mut bus, SENSOR_ADDR_B, 1);
        load_bmp280(&mut bus, SENSOR_ADDR_A, 2);
        load_bmp280(&mut bus, SENSOR_ADDR_B, 2);
        bus.add_device(EEPROM_ADDRESS, 1, true);
        bus
    }

    #[test]
    fn mux_head_resolves_behind_the_switch() {
        let mut reg = registry(mux_head_full());
        let mut array = SensorArray::new();

        let topology = array.detect(&mut reg, None, None).unwrap();
        assert_eq!(topology, BusTopology::Mux);
        assert!(array.found());
        assert!(array.eeprom().is_some());

        let maps = array.mappings(&reg);
        assert_eq!(maps[0].mux_address, MUX_ADDRESS);
        assert_eq!(maps[0].bus_number, 1);
        assert_eq!(maps[3].bus_number, 2);

        // Sampling sweeps both channels through the shared mux
        assert!(array.sample(&mut reg).is_ok());
    }

    #[test]
    fn mux_head_fails_partial_and_releases_everything() {
        // Only the channel-1 pair is populated; slots 2/3 cannot resolve
        let mut bus = FakeBus::with_mux(MUX_ADDRESS);
        load_bmp280(&mut bus, SENSOR_ADDR_A, 1);
        load_bmp280(&mut bus, SENSOR_ADDR_B, 1);
        bus.add_device(EEPROM_ADDRESS, 1, true);
        let mut reg = registry(bus);
        let mut array = SensorArray::new();

        let err = array.detect(&mut reg, None, None).unwrap_err();
        assert_eq!(err, ArrayError::Missing(0b1100));
        assert!(!array.found());

        // Nothing leaked: the pool is completely free again
        for i in 0..crate::bus::MAX_DEVICES {
            assert!(reg
                .allocate_i2c(BusId::Primary, 0x20 + i as u8, 0, None, None, DeviceRole::None)
                .is_ok());
        }
    }

    fn xlate_head() -> FakeBus {
        let mut bus = FakeBus::new();
        load_bmp280(&mut bus, SENSOR_ADDR_A, 0);
        load_bmp280(&mut bus, SENSOR_ADDR_B, 0);
        load_bmp280(&mut bus, XLATE_ADDR_A, 0);
        load_bmp280(&mut bus, XLATE_ADDR_B, 0);
        bus.add_device(EEPROM_ADDRESS, 0, true);
        bus
    }

    #[test]
    fn xlate_head_resolves_all_four_slots() {
        let mut reg = registry(xlate_head());
        let mut array = SensorArray::new();

        let topology = array.detect(&mut reg, None, None).unwrap();
        assert_eq!(topology, BusTopology::Xlate);
        assert!(array.found());
        assert!(array.eeprom().is_some());
        for sensor in array.sensors() {
            assert_eq!(sensor.kind(), SensorKind::Bmp280);
        }

        let maps = array.mappings(&reg);
        assert_eq!(maps[0].i2c_address, SENSOR_ADDR_A);
        assert_eq!(maps[2].i2c_address, XLATE_ADDR_A);
        assert_eq!(maps[0].mux_address, 0);
    }

    #[test]
    fn dual_bus_head_uses_both_buses() {
        let mut bus_a = FakeBus::new();
        load_bmp280(&mut bus_a, SENSOR_ADDR_A, 0);
        load_bmp280(&mut bus_a, SENSOR_ADDR_B, 0);
        bus_a.add_device(EEPROM_ADDRESS, 0, true);
        let mut bus_b = FakeBus::new();
        load_bmp280(&mut bus_b, SENSOR_ADDR_A, 0);
        load_bmp280(&mut bus_b, SENSOR_ADDR_B, 0);

        let mut reg = dual_registry(bus_a, bus_b);
        let mut array = SensorArray::new();

        let topology = array.detect(&mut reg, None, None).unwrap();
        assert_eq!(topology, BusTopology::DualI2c);
        assert!(array.found());
    }

    #[test]
    fn empty_bus_matches_no_topology() {
        let mut reg = registry(FakeBus::new());
        let mut array = SensorArray::new();
        assert_eq!(
            array.detect(&mut reg, None, None).unwrap_err(),
            ArrayError::NoTopology
        );
    }

    #[test]
    fn sensor_fault_mid_run_invalidates_all_slots() {
        let mut reg = registry(xlate_head());
        let mut array = SensorArray::new();
        array.detect(&mut reg, None, None).unwrap();

        // First sweep works
        assert!(array.sample(&mut reg).is_ok());

        // One sensor drops off the bus
        reg.primary_mut().device_mut(XLATE_ADDR_B).nack = true;
        assert_eq!(array.sample(&mut reg), Err(BusError::Nack));
        assert!(!array.found());
        for sensor in array.sensors() {
            assert_eq!(sensor.kind(), SensorKind::Unknown);
        }
        // The EEPROM is still ours
        assert!(array.eeprom().is_some());
    }

    #[test]
    fn redetection_after_failure_recovers() {
        let mut reg = registry(xlate_head());
        let mut array = SensorArray::new();
        array.detect(&mut reg, None, None).unwrap();

        reg.primary_mut().device_mut(SENSOR_ADDR_A).nack = true;
        let _ = array.sample(&mut reg);
        assert!(!array.found());

        // Fault clears (loose harness reseated); detection recovers
        reg.primary_mut().device_mut(SENSOR_ADDR_A).nack = false;
        assert!(array.detect(&mut reg, None, None).is_ok());
        assert!(array.found());
    }
}
