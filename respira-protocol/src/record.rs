//! Per-unit EEPROM record layout
//!
//! Each sensor head carries a small EEPROM (24C01-class, 128 bytes,
//! 8-byte write pages) holding the unit's identity and breath settings.
//! The persistence layer decides *when* to read/write; the byte layout is
//! owned here so the core and the desktop tools agree on it.
//!
//! Record layout (all multi-byte fields little-endian):
//!
//! ```text
//! offset  len  field
//!      0    4  signature "RSPa"
//!      4    1  bus topology byte
//!      5    1  body type byte
//!      6    1  body version (printable)
//!      7    1  NUL terminator
//!      8    2  spare
//!     10   16  sensor mapping, 4 x 4 bytes
//!     26    2  breath pressure (cmH2O)
//!     28    2  breath volume (ml)
//!     30    1  breath rate (breaths/min)
//!     31    1  breath I:E ratio
//!     32    2  breath trigger threshold
//!     34    2  fixed motor speed (demo mode)
//!     36   26  spare
//!     62    2  checksum over bytes 0..62
//!     64   64  body-specific calibration area
//! ```

use crate::health::{BodyType, BusTopology};

/// Record signature, stored at offset 0
pub const RECORD_SIGNATURE: [u8; 4] = *b"RSPa";

/// EEPROM write-page size; the record length must stay a multiple of this
pub const EEPROM_PAGE_SIZE: usize = 8;

/// Configuration block length (signature through checksum)
pub const CONFIG_BLOCK_LEN: usize = 64;

/// Body-specific calibration area length
pub const CALIBRATION_AREA_LEN: usize = 64;

/// Total record length
pub const RECORD_LEN: usize = CONFIG_BLOCK_LEN + CALIBRATION_AREA_LEN;

const MAPPING_OFFSET: usize = 10;
const CHECKSUM_OFFSET: usize = 62;

/// How one logical sensor slot reaches the bus
///
/// Stored so a formatted unit can be re-probed without running full
/// topology discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorMapping {
    /// Layout revision of this entry
    pub mapping_type: u8,
    /// I2C address; 0 means the slot is SPI-attached
    pub i2c_address: u8,
    /// Mux address, 0 if the slot is not behind a mux
    pub mux_address: u8,
    /// Mux channel, bus index, or enable line depending on topology
    pub bus_number: u8,
}

/// Errors decoding a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Buffer shorter than [`RECORD_LEN`]
    TooShort,
    /// Signature bytes do not match; the EEPROM is blank or foreign
    NotFormatted,
    /// Stored checksum does not match the config block
    BadChecksum,
}

/// Decoded unit record
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub bus_type: BusTopology,
    pub body_type: BodyType,
    /// Printable body revision character
    pub body_version: u8,
    pub mappings: [SensorMapping; 4],
    pub breath_pressure: u16,
    pub breath_volume: u16,
    pub breath_rate: u8,
    pub breath_ratio: u8,
    pub breath_threshold: u16,
    /// Fixed demo-mode motor speed
    pub motor_speed: u16,
    pub calibration: [u8; CALIBRATION_AREA_LEN],
}

impl UnitRecord {
    /// A freshly formatted record for a blank unit
    pub fn format(bus_type: BusTopology, body_type: BodyType) -> Self {
        Self {
            bus_type,
            body_type,
            body_version: b'0',
            mappings: [SensorMapping::default(); 4],
            breath_pressure: 0,
            breath_volume: 0,
            breath_rate: 0,
            breath_ratio: 0,
            breath_threshold: 0,
            motor_speed: 0,
            calibration: [0; CALIBRATION_AREA_LEN],
        }
    }

    /// Serialize to the fixed EEPROM layout, computing the checksum
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&RECORD_SIGNATURE);
        out[4] = self.bus_type.as_byte();
        out[5] = self.body_type.as_byte();
        out[6] = self.body_version;
        // out[7] stays NUL so the identity prefix prints as a C string
        for (i, m) in self.mappings.iter().enumerate() {
            let at = MAPPING_OFFSET + i * 4;
            out[at] = m.mapping_type;
            out[at + 1] = m.i2c_address;
            out[at + 2] = m.mux_address;
            out[at + 3] = m.bus_number;
        }
        out[26..28].copy_from_slice(&self.breath_pressure.to_le_bytes());
        out[28..30].copy_from_slice(&self.breath_volume.to_le_bytes());
        out[30] = self.breath_rate;
        out[31] = self.breath_ratio;
        out[32..34].copy_from_slice(&self.breath_threshold.to_le_bytes());
        out[34..36].copy_from_slice(&self.motor_speed.to_le_bytes());
        let sum = checksum(&out[..CHECKSUM_OFFSET]);
        out[CHECKSUM_OFFSET..CONFIG_BLOCK_LEN].copy_from_slice(&sum.to_le_bytes());
        out[CONFIG_BLOCK_LEN..].copy_from_slice(&self.calibration);
        out
    }

    /// Decode a stored record
    ///
    /// A stored checksum of zero is accepted: units formatted by older
    /// firmware never filled the field in.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_LEN {
            return Err(RecordError::TooShort);
        }
        if bytes[0..4] != RECORD_SIGNATURE {
            return Err(RecordError::NotFormatted);
        }
        let stored = u16::from_le_bytes([bytes[CHECKSUM_OFFSET], bytes[CHECKSUM_OFFSET + 1]]);
        if stored != 0 && stored != checksum(&bytes[..CHECKSUM_OFFSET]) {
            return Err(RecordError::BadChecksum);
        }

        let mut mappings = [SensorMapping::default(); 4];
        for (i, m) in mappings.iter_mut().enumerate() {
            let at = MAPPING_OFFSET + i * 4;
            *m = SensorMapping {
                mapping_type: bytes[at],
                i2c_address: bytes[at + 1],
                mux_address: bytes[at + 2],
                bus_number: bytes[at + 3],
            };
        }
        let mut calibration = [0u8; CALIBRATION_AREA_LEN];
        calibration.copy_from_slice(&bytes[CONFIG_BLOCK_LEN..RECORD_LEN]);

        Ok(Self {
            bus_type: BusTopology::from_byte(bytes[4]),
            body_type: BodyType::from_byte(bytes[5]),
            body_version: bytes[6],
            mappings,
            breath_pressure: u16::from_le_bytes([bytes[26], bytes[27]]),
            breath_volume: u16::from_le_bytes([bytes[28], bytes[29]]),
            breath_rate: bytes[30],
            breath_ratio: bytes[31],
            breath_threshold: u16::from_le_bytes([bytes[32], bytes[33]]),
            motor_speed: u16::from_le_bytes([bytes[34], bytes[35]]),
            calibration,
        })
    }

    /// Check whether a raw buffer carries a formatted record
    pub fn is_formatted(bytes: &[u8]) -> bool {
        bytes.len() >= 4 && bytes[0..4] == RECORD_SIGNATURE
    }
}

/// 16-bit wrapping byte sum over the config block
fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    // The EEPROM wraps writes that straddle a page, so the layout must
    // stay page-aligned end to end.
    #[test]
    fn record_is_page_multiple() {
        assert_eq!(RECORD_LEN % EEPROM_PAGE_SIZE, 0);
        assert_eq!(CONFIG_BLOCK_LEN % EEPROM_PAGE_SIZE, 0);
    }

    #[test]
    fn round_trip() {
        let mut rec = UnitRecord::format(BusTopology::Mux, BodyType::Venturi);
        rec.breath_pressure = 25;
        rec.breath_volume = 500;
        rec.breath_rate = 12;
        rec.breath_ratio = 3;
        rec.mappings[2] = SensorMapping {
            mapping_type: 1,
            i2c_address: 0x76,
            mux_address: 0x70,
            bus_number: 2,
        };
        rec.calibration[0] = 0xAB;

        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), RECORD_LEN);
        let back = UnitRecord::from_bytes(&bytes).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn blank_eeprom_is_not_formatted() {
        let blank = [0xFFu8; RECORD_LEN];
        assert!(!UnitRecord::is_formatted(&blank));
        assert_eq!(
            UnitRecord::from_bytes(&blank),
            Err(RecordError::NotFormatted)
        );
    }

    #[test]
    fn zero_checksum_is_accepted() {
        let rec = UnitRecord::format(BusTopology::DualI2c, BodyType::Pitot);
        let mut bytes = rec.to_bytes();
        bytes[CHECKSUM_OFFSET] = 0;
        bytes[CHECKSUM_OFFSET + 1] = 0;
        assert!(UnitRecord::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn corrupt_checksum_is_rejected() {
        let rec = UnitRecord::format(BusTopology::DualI2c, BodyType::Pitot);
        let mut bytes = rec.to_bytes();
        bytes[CHECKSUM_OFFSET] ^= 0x55;
        bytes[CHECKSUM_OFFSET + 1] = 0x77;
        assert_eq!(
            UnitRecord::from_bytes(&bytes),
            Err(RecordError::BadChecksum)
        );
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let rec = UnitRecord::format(BusTopology::Mux, BodyType::Venturi);
        let bytes = rec.to_bytes();
        assert_eq!(
            UnitRecord::from_bytes(&bytes[..RECORD_LEN - 1]),
            Err(RecordError::TooShort)
        );
    }
}
