//! Device registry: fixed pool, refcounted handles, mux routing
//!
//! Ported semantics, in one place so they stay testable:
//!
//! - Slots come from a fixed pool of [`MAX_DEVICES`]; nothing allocates.
//! - A slot is free while its refcount is zero. Allocating a device
//!   behind a mux bumps the mux's refcount; releasing the last reference
//!   walks the parent chain and releases each mux whose count reaches
//!   zero. Chains may nest.
//! - Before any transaction through a muxed handle the registry writes
//!   the channel-select byte to each mux on the path, root first, and
//!   caches the selected channel per mux so back-to-back transactions on
//!   the same channel cost nothing.
//! - EEPROM-class devices use two register-address bytes and need the
//!   write-cycle ack-poll; everything else is single-byte addressed.

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use respira_hal::{EnableLines, I2cBus};

/// Size of the device pool
pub const MAX_DEVICES: usize = 8;

/// EEPROM write-page size in bytes
pub const EEPROM_PAGE_SIZE: usize = respira_protocol::EEPROM_PAGE_SIZE;

/// Settle time after setting the EEPROM address pointer
const EEPROM_SETTLE_MS: u32 = 10;
/// Write-cycle poll: attempts and spacing
const EEPROM_POLL_TRIES: u32 = 100;
const EEPROM_POLL_INTERVAL_US: u32 = 500;

/// Longest register write the registry will assemble (address + one page
/// leaves generous slack for sensor configuration bursts)
const WRITE_BUF: usize = 2 + 32;

/// Which physical bus a device hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusId {
    #[default]
    Primary,
    /// Falls back to the primary bus on boards without a second
    /// controller; enable lines keep the addresses from colliding
    Secondary,
}

/// Transport used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusKind {
    #[default]
    I2c,
    Spi,
}

/// What the device is, for addressing quirks and bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceRole {
    #[default]
    None,
    Sensor,
    Mux,
    Eeprom,
    Display,
}

/// Errors from registry transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// Device did not acknowledge (or the bus faulted mid-transfer)
    Nack,
    /// Handle does not name a live slot
    InvalidHandle,
    /// Transaction type unsupported on this endpoint (SPI slots carry no
    /// register I/O)
    NotI2c,
    /// EEPROM write did not start on a page boundary
    Unaligned,
    /// The pool is full
    PoolExhausted,
    /// Register payload larger than the registry will assemble
    TooLong,
}

/// Stable index into the registry pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceHandle(u8);

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    ref_count: u8,
    kind: BusKind,
    role: DeviceRole,
    bus: BusId,
    address: u8,
    /// Mux channel; 0 means not muxed
    channel: u8,
    /// Pool index of the parent mux, if any
    parent: Option<u8>,
    /// Enable line raised around transactions, if any
    enable_line: Option<u8>,
    /// For mux slots: last selected channel (0 = none yet)
    current_channel: u8,
}

/// Fixed-capacity pool of bus devices plus the buses themselves
pub struct BusRegistry<I2C, EN, D> {
    primary: I2C,
    secondary: Option<I2C>,
    enables: EN,
    delay: D,
    slots: [Slot; MAX_DEVICES],
}

impl<I2C, EN, D> BusRegistry<I2C, EN, D>
where
    I2C: I2cBus,
    EN: EnableLines,
    D: DelayNs,
{
    pub fn new(primary: I2C, secondary: Option<I2C>, enables: EN, delay: D) -> Self {
        Self {
            primary,
            secondary,
            enables,
            delay,
            slots: [Slot::default(); MAX_DEVICES],
        }
    }

    /// Claim a pool slot for an I2C endpoint
    ///
    /// `parent` names the mux the device sits behind; its refcount is
    /// bumped so the mux outlives every device routed through it.
    pub fn allocate_i2c(
        &mut self,
        bus: BusId,
        address: u8,
        channel: u8,
        parent: Option<DeviceHandle>,
        enable_line: Option<u8>,
        role: DeviceRole,
    ) -> Result<DeviceHandle, BusError> {
        if let Some(p) = parent {
            // Validate before claiming a slot
            self.slot(p)?;
        }
        let idx = self.free_slot()?;
        self.slots[idx] = Slot {
            ref_count: 1,
            kind: BusKind::I2c,
            role,
            bus,
            address,
            channel,
            parent: parent.map(|p| p.0),
            enable_line,
            current_channel: 0,
        };
        if let Some(p) = parent {
            self.slots[p.0 as usize].ref_count += 1;
        }
        Ok(DeviceHandle(idx as u8))
    }

    /// Claim a pool slot for an SPI endpoint
    ///
    /// SPI devices are lifetime-tracked only; no shipping sensor head
    /// uses SPI register I/O yet.
    pub fn allocate_spi(
        &mut self,
        bus: BusId,
        enable_line: Option<u8>,
        role: DeviceRole,
    ) -> Result<DeviceHandle, BusError> {
        let idx = self.free_slot()?;
        self.slots[idx] = Slot {
            ref_count: 1,
            kind: BusKind::Spi,
            role,
            bus,
            enable_line,
            ..Slot::default()
        };
        Ok(DeviceHandle(idx as u8))
    }

    /// Add a reference to a live device
    pub fn retain(&mut self, handle: DeviceHandle) -> Result<(), BusError> {
        let idx = self.slot(handle)?;
        self.slots[idx].ref_count += 1;
        Ok(())
    }

    /// Drop a reference; frees the slot at zero and walks the mux chain
    ///
    /// Releasing the last user of a muxed device also drops the mux's
    /// reference, which may free the mux, which may drop *its* parent,
    /// and so on up the chain. Mux chains form a DAG by construction, so
    /// the walk terminates.
    pub fn release(&mut self, handle: DeviceHandle) {
        let mut next = match self.slot(handle) {
            Ok(idx) => Some(idx),
            Err(_) => None,
        };
        while let Some(idx) = next {
            let slot = &mut self.slots[idx];
            slot.ref_count -= 1;
            if slot.ref_count > 0 {
                break;
            }
            let parent = slot.parent;
            self.slots[idx] = Slot::default();
            next = parent.map(|p| p as usize).filter(|&p| self.slots[p].ref_count > 0);
        }
    }

    /// Current refcount, 0 for freed/invalid handles
    pub fn ref_count(&self, handle: DeviceHandle) -> u8 {
        self.slots
            .get(handle.0 as usize)
            .map(|s| s.ref_count)
            .unwrap_or(0)
    }

    pub fn role(&self, handle: DeviceHandle) -> DeviceRole {
        self.slots
            .get(handle.0 as usize)
            .map(|s| s.role)
            .unwrap_or(DeviceRole::None)
    }

    pub fn set_role(&mut self, handle: DeviceHandle, role: DeviceRole) {
        if let Ok(idx) = self.slot(handle) {
            self.slots[idx].role = role;
        }
    }

    pub fn address(&self, handle: DeviceHandle) -> u8 {
        self.slots
            .get(handle.0 as usize)
            .map(|s| s.address)
            .unwrap_or(0)
    }

    pub fn channel(&self, handle: DeviceHandle) -> u8 {
        self.slots
            .get(handle.0 as usize)
            .map(|s| s.channel)
            .unwrap_or(0)
    }

    /// Address of the mux directly above this device, 0 if unmuxed
    pub fn mux_address(&self, handle: DeviceHandle) -> u8 {
        self.slots
            .get(handle.0 as usize)
            .and_then(|s| s.parent)
            .map(|p| self.slots[p as usize].address)
            .unwrap_or(0)
    }

    /// Bounded blocking delay, shared with detection backoff loops
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// The delay provider itself, for the actuator settle windows
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Zero-length transaction: does anything acknowledge at the address?
    pub fn detect(&mut self, handle: DeviceHandle) -> bool {
        let Ok(idx) = self.slot(handle) else {
            return false;
        };
        if self.slots[idx].kind != BusKind::I2c {
            return false;
        }
        let (address, bus, enable) =
            (self.slots[idx].address, self.slots[idx].bus, self.slots[idx].enable_line);

        self.set_enable(enable, true);
        let _ = self.select_route(idx);
        let acked = self.bus_mut(bus).probe(address);
        self.set_enable(enable, false);
        acked
    }

    /// Read `buf.len()` bytes starting at `reg`
    pub fn read(
        &mut self,
        handle: DeviceHandle,
        reg: u16,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        let idx = self.slot(handle)?;
        let slot = self.slots[idx];
        if slot.kind != BusKind::I2c {
            return Err(BusError::NotI2c);
        }

        self.set_enable(slot.enable_line, true);
        let result = (|| {
            self.select_route(idx)?;
            if slot.role == DeviceRole::Eeprom {
                // Two-byte address, then a settle before the read: the
                // chip may still be inside a write cycle
                let reg_bytes = [(reg >> 8) as u8, (reg & 0xFF) as u8];
                self.bus_mut(slot.bus)
                    .write(slot.address, &reg_bytes)
                    .map_err(|_| BusError::Nack)?;
                self.delay.delay_ms(EEPROM_SETTLE_MS);
                self.bus_mut(slot.bus)
                    .read(slot.address, buf)
                    .map_err(|_| BusError::Nack)
            } else {
                self.bus_mut(slot.bus)
                    .write_read(slot.address, &[(reg & 0xFF) as u8], buf)
                    .map_err(|_| BusError::Nack)
            }
        })();
        self.set_enable(slot.enable_line, false);
        result
    }

    /// Read a single register
    pub fn read_byte(&mut self, handle: DeviceHandle, reg: u16) -> Result<u8, BusError> {
        let mut b = [0u8];
        self.read(handle, reg, &mut b)?;
        Ok(b[0])
    }

    /// Write `data` starting at `reg`
    ///
    /// For EEPROM devices this also polls for write-cycle completion:
    /// the chip NACKs its own address until the internal write finishes.
    pub fn write(
        &mut self,
        handle: DeviceHandle,
        reg: u16,
        data: &[u8],
    ) -> Result<(), BusError> {
        let idx = self.slot(handle)?;
        let slot = self.slots[idx];
        if slot.kind != BusKind::I2c {
            return Err(BusError::NotI2c);
        }

        let mut frame: Vec<u8, WRITE_BUF> = Vec::new();
        if slot.role == DeviceRole::Eeprom {
            let _ = frame.push((reg >> 8) as u8);
        }
        let _ = frame.push((reg & 0xFF) as u8);
        frame
            .extend_from_slice(data)
            .map_err(|_| BusError::TooLong)?;

        self.set_enable(slot.enable_line, true);
        let result = (|| {
            self.select_route(idx)?;
            self.bus_mut(slot.bus)
                .write(slot.address, &frame)
                .map_err(|_| BusError::Nack)?;
            if slot.role == DeviceRole::Eeprom {
                self.poll_eeprom_ready(slot.bus, slot.address)?;
            }
            Ok(())
        })();
        self.set_enable(slot.enable_line, false);
        result
    }

    /// Write a single register
    pub fn write_byte(
        &mut self,
        handle: DeviceHandle,
        reg: u16,
        value: u8,
    ) -> Result<(), BusError> {
        self.write(handle, reg, &[value])
    }

    /// Read a stored record in page-size chunks
    ///
    /// The wire layer buffers one page at a time, so larger requests are
    /// split here rather than trusting every board's I2C FIFO depth.
    pub fn read_record(
        &mut self,
        handle: DeviceHandle,
        reg: u16,
        buf: &mut [u8],
    ) -> Result<(), BusError> {
        for (i, chunk) in buf.chunks_mut(EEPROM_PAGE_SIZE).enumerate() {
            self.read(handle, reg + (i * EEPROM_PAGE_SIZE) as u16, chunk)?;
        }
        Ok(())
    }

    /// Write a stored record in page-size chunks
    ///
    /// Writes that straddle a page wrap around inside the chip, so the
    /// start address must be page-aligned.
    pub fn write_record(
        &mut self,
        handle: DeviceHandle,
        reg: u16,
        data: &[u8],
    ) -> Result<(), BusError> {
        if reg as usize % EEPROM_PAGE_SIZE != 0 {
            return Err(BusError::Unaligned);
        }
        for (i, chunk) in data.chunks(EEPROM_PAGE_SIZE).enumerate() {
            self.write(handle, reg + (i * EEPROM_PAGE_SIZE) as u16, chunk)?;
        }
        Ok(())
    }

    fn poll_eeprom_ready(&mut self, bus: BusId, address: u8) -> Result<(), BusError> {
        for _ in 0..EEPROM_POLL_TRIES {
            self.delay.delay_us(EEPROM_POLL_INTERVAL_US);
            // Reset the address pointer; doubles as the ack probe
            if self.bus_mut(bus).write(address, &[0, 0]).is_ok() {
                return Ok(());
            }
        }
        Err(BusError::Nack)
    }

    /// Select every mux channel between the root bus and this device
    ///
    /// Walks the parent chain, then selects root-first so each deeper
    /// select already routes through its ancestors. Selecting a channel
    /// that a mux already has selected is skipped via the cached value.
    fn select_route(&mut self, idx: usize) -> Result<(), BusError> {
        // (mux index, channel to select on it), leaf-first
        let mut chain: Vec<(usize, u8), MAX_DEVICES> = Vec::new();
        let mut cursor = idx;
        while let Some(parent) = self.slots[cursor].parent {
            let channel = self.slots[cursor].channel;
            if channel != 0 {
                chain.push((parent as usize, channel)).map_err(|_| BusError::InvalidHandle)?;
            }
            cursor = parent as usize;
        }

        for &(mux_idx, channel) in chain.iter().rev() {
            if self.slots[mux_idx].current_channel == channel {
                continue;
            }
            let (address, bus) = (self.slots[mux_idx].address, self.slots[mux_idx].bus);
            self.bus_mut(bus)
                .write(address, &[channel])
                .map_err(|_| BusError::Nack)?;
            self.slots[mux_idx].current_channel = channel;
        }
        Ok(())
    }

    fn bus_mut(&mut self, id: BusId) -> &mut I2C {
        match (id, self.secondary.as_mut()) {
            (BusId::Secondary, Some(bus)) => bus,
            _ => &mut self.primary,
        }
    }

    fn set_enable(&mut self, line: Option<u8>, on: bool) {
        if let Some(line) = line {
            self.enables.set(line, on);
        }
    }

    /// Direct bus access for test fixtures
    #[cfg(test)]
    pub(crate) fn primary_mut(&mut self) -> &mut I2C {
        &mut self.primary
    }

    fn slot(&self, handle: DeviceHandle) -> Result<usize, BusError> {
        let idx = handle.0 as usize;
        if idx < MAX_DEVICES && self.slots[idx].ref_count > 0 {
            Ok(idx)
        } else {
            Err(BusError::InvalidHandle)
        }
    }

    fn free_slot(&self) -> Result<usize, BusError> {
        self.slots
            .iter()
            .position(|s| s.ref_count == 0)
            .ok_or(BusError::PoolExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FakeBus, SimDelay};
    use respira_hal::NoEnables;

    type Registry = BusRegistry<FakeBus, NoEnables, SimDelay>;

    fn registry(bus: FakeBus) -> Registry {
        BusRegistry::new(bus, None, NoEnables, SimDelay::default())
    }

    #[test]
    fn pool_exhausts_at_capacity() {
        let mut reg = registry(FakeBus::new());
        for _ in 0..MAX_DEVICES {
            reg.allocate_i2c(BusId::Primary, 0x10, 0, None, None, DeviceRole::None)
                .unwrap();
        }
        assert_eq!(
            reg.allocate_i2c(BusId::Primary, 0x11, 0, None, None, DeviceRole::None),
            Err(BusError::PoolExhausted)
        );
    }

    #[test]
    fn release_frees_the_slot_for_reuse() {
        let mut reg = registry(FakeBus::new());
        let h = reg
            .allocate_i2c(BusId::Primary, 0x10, 0, None, None, DeviceRole::Sensor)
            .unwrap();
        assert_eq!(reg.ref_count(h), 1);
        reg.release(h);
        assert_eq!(reg.ref_count(h), 0);

        let h2 = reg
            .allocate_i2c(BusId::Primary, 0x22, 0, None, None, DeviceRole::None)
            .unwrap();
        assert_eq!(reg.address(h2), 0x22);
    }

    #[test]
    fn releasing_last_child_releases_the_mux_chain() {
        let mut reg = registry(FakeBus::new());
        // Two nested muxes: root at 0x70, inner at 0x71 on root channel 1,
        // sensor on inner channel 2
        let root = reg
            .allocate_i2c(BusId::Primary, 0x70, 0, None, None, DeviceRole::Mux)
            .unwrap();
        let inner = reg
            .allocate_i2c(BusId::Primary, 0x71, 1, Some(root), None, DeviceRole::Mux)
            .unwrap();
        let sensor = reg
            .allocate_i2c(BusId::Primary, 0x76, 2, Some(inner), None, DeviceRole::Sensor)
            .unwrap();

        assert_eq!(reg.ref_count(root), 2); // self + inner
        assert_eq!(reg.ref_count(inner), 2); // self + sensor

        // The allocator's own references
        reg.release(inner);
        reg.release(root);
        assert_eq!(reg.ref_count(root), 1);
        assert_eq!(reg.ref_count(inner), 1);

        // Dropping the sensor unwinds the whole chain
        reg.release(sensor);
        assert_eq!(reg.ref_count(sensor), 0);
        assert_eq!(reg.ref_count(inner), 0);
        assert_eq!(reg.ref_count(root), 0);
    }

    #[test]
    fn shared_mux_survives_partial_release() {
        let mut reg = registry(FakeBus::new());
        let mux = reg
            .allocate_i2c(BusId::Primary, 0x70, 0, None, None, DeviceRole::Mux)
            .unwrap();
        let a = reg
            .allocate_i2c(BusId::Primary, 0x76, 1, Some(mux), None, DeviceRole::Sensor)
            .unwrap();
        let b = reg
            .allocate_i2c(BusId::Primary, 0x77, 1, Some(mux), None, DeviceRole::Sensor)
            .unwrap();
        reg.release(mux); // allocator's reference

        reg.release(a);
        assert_eq!(reg.ref_count(mux), 1, "mux still used by b");
        reg.release(b);
        assert_eq!(reg.ref_count(mux), 0);
    }

    #[test]
    fn retain_adds_a_reference() {
        let mut reg = registry(FakeBus::new());
        let h = reg
            .allocate_i2c(BusId::Primary, 0x10, 0, None, None, DeviceRole::None)
            .unwrap();
        reg.retain(h).unwrap();
        reg.release(h);
        assert_eq!(reg.ref_count(h), 1);
    }

    #[test]
    fn detect_reports_ack_and_nack() {
        let mut bus = FakeBus::new();
        bus.add_device(0x76, 0, false);
        let mut reg = registry(bus);

        let present = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, None, DeviceRole::Sensor)
            .unwrap();
        let absent = reg
            .allocate_i2c(BusId::Primary, 0x40, 0, None, None, DeviceRole::Sensor)
            .unwrap();
        assert!(reg.detect(present));
        assert!(!reg.detect(absent));
    }

    #[test]
    fn muxed_read_selects_the_channel_once() {
        let mut bus = FakeBus::with_mux(0x70);
        bus.add_device(0x76, 2, false);
        bus.device_mut(0x76).mem[0x0D] = 0x42;
        let mut reg = registry(bus);

        let mux = reg
            .allocate_i2c(BusId::Primary, 0x70, 0, None, None, DeviceRole::Mux)
            .unwrap();
        let dev = reg
            .allocate_i2c(BusId::Primary, 0x76, 2, Some(mux), None, DeviceRole::Sensor)
            .unwrap();

        assert_eq!(reg.read_byte(dev, 0x0D), Ok(0x42));
        assert_eq!(reg.read_byte(dev, 0x0D), Ok(0x42));
        // The second read reuses the cached channel
        assert_eq!(reg.primary.mux_selects, 1);
    }

    #[test]
    fn channel_cache_invalidates_on_other_channel() {
        let mut bus = FakeBus::with_mux(0x70);
        bus.add_device(0x76, 1, false);
        bus.add_device(0x77, 2, false);
        let mut reg = registry(bus);

        let mux = reg
            .allocate_i2c(BusId::Primary, 0x70, 0, None, None, DeviceRole::Mux)
            .unwrap();
        let a = reg
            .allocate_i2c(BusId::Primary, 0x76, 1, Some(mux), None, DeviceRole::Sensor)
            .unwrap();
        let b = reg
            .allocate_i2c(BusId::Primary, 0x77, 2, Some(mux), None, DeviceRole::Sensor)
            .unwrap();

        let _ = reg.read_byte(a, 0);
        let _ = reg.read_byte(b, 0);
        let _ = reg.read_byte(a, 0);
        assert_eq!(reg.primary.mux_selects, 3, "alternating channels re-select");
    }

    #[test]
    fn eeprom_uses_two_byte_addressing() {
        let mut bus = FakeBus::new();
        bus.add_device(0x54, 0, true);
        bus.device_mut(0x54).mem[0x40] = 0xA5;
        let mut reg = registry(bus);

        let rom = reg
            .allocate_i2c(BusId::Primary, 0x54, 0, None, None, DeviceRole::Eeprom)
            .unwrap();
        assert_eq!(reg.read_byte(rom, 0x40), Ok(0xA5));

        reg.write(rom, 0x0008, &[1, 2, 3]).unwrap();
        let mem = &reg.primary.device_mut(0x54).mem;
        assert_eq!(&mem[8..11], &[1, 2, 3]);
    }

    #[test]
    fn record_write_requires_page_alignment() {
        let mut bus = FakeBus::new();
        bus.add_device(0x54, 0, true);
        let mut reg = registry(bus);
        let rom = reg
            .allocate_i2c(BusId::Primary, 0x54, 0, None, None, DeviceRole::Eeprom)
            .unwrap();

        assert_eq!(
            reg.write_record(rom, 3, &[0u8; 16]),
            Err(BusError::Unaligned)
        );

        let data: [u8; 24] = core::array::from_fn(|i| i as u8);
        reg.write_record(rom, 8, &data).unwrap();
        let mut back = [0u8; 24];
        reg.read_record(rom, 8, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn spi_slots_track_lifetime_but_carry_no_io() {
        let mut reg = registry(FakeBus::new());
        let spi = reg
            .allocate_spi(BusId::Primary, Some(3), DeviceRole::Display)
            .unwrap();
        assert_eq!(reg.ref_count(spi), 1);
        assert!(!reg.detect(spi));
        let mut b = [0u8];
        assert_eq!(reg.read(spi, 0, &mut b), Err(BusError::NotI2c));
        reg.release(spi);
        assert_eq!(reg.ref_count(spi), 0);
    }

    #[test]
    fn enable_line_wraps_each_transaction() {
        use crate::sim::RecordingEnables;

        let mut bus = FakeBus::new();
        bus.add_device(0x76, 0, false);
        let mut reg =
            BusRegistry::new(bus, None, RecordingEnables::default(), SimDelay::default());
        let h = reg
            .allocate_i2c(BusId::Primary, 0x76, 0, None, Some(2), DeviceRole::Sensor)
            .unwrap();

        assert!(reg.detect(h));
        let _ = reg.read_byte(h, 0);
        assert_eq!(
            reg.enables.log.as_slice(),
            &[(2, true), (2, false), (2, true), (2, false)]
        );
    }

    #[test]
    fn transaction_to_missing_device_is_nack() {
        let mut reg = registry(FakeBus::new());
        let h = reg
            .allocate_i2c(BusId::Primary, 0x33, 0, None, None, DeviceRole::Sensor)
            .unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(reg.read(h, 0, &mut buf), Err(BusError::Nack));
        assert_eq!(reg.write_byte(h, 0, 1), Err(BusError::Nack));
    }
}
