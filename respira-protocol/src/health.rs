//! System health and diagnostic events
//!
//! The core never prints; anything the operator layer should surface is
//! pushed as a [`CoreEvent`] from the control-loop tick. The command layer
//! drains the queue and renders/transmits as it sees fit.

#[cfg(feature = "wire")]
use serde::{Deserialize, Serialize};

/// Physical bus topology of the attached sensor head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "wire", derive(Serialize, Deserialize))]
pub enum BusTopology {
    /// No sensor head detected
    #[default]
    None,
    /// SPI-attached head (reserved; no shipping head uses it yet)
    Spi,
    /// Two independent buses, or one bus with per-path enable switches
    DualI2c,
    /// All four sensors behind an I2C mux
    Mux,
    /// Address-translated: four distinct addresses on one bus
    Xlate,
}

impl BusTopology {
    /// Byte stored in the EEPROM record
    pub fn as_byte(self) -> u8 {
        match self {
            BusTopology::None => b' ',
            BusTopology::Spi => b's',
            BusTopology::DualI2c => b'i',
            BusTopology::Mux => b'm',
            BusTopology::Xlate => b'x',
        }
    }

    /// Decode the EEPROM record byte
    pub fn from_byte(b: u8) -> Self {
        match b {
            b's' => BusTopology::Spi,
            b'i' => BusTopology::DualI2c,
            b'm' => BusTopology::Mux,
            b'x' => BusTopology::Xlate,
            _ => BusTopology::None,
        }
    }
}

/// Flow-sensing body geometry of the attached head
///
/// Pitot and venturi bodies carry the same four sensors but need
/// different derived-flow formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "wire", derive(Serialize, Deserialize))]
pub enum BodyType {
    #[default]
    Unknown,
    Pitot,
    Venturi,
    /// Reserved body geometries; treated as venturi by the flow engine
    Hybrid,
    Experimental,
}

impl BodyType {
    /// Byte stored in the EEPROM record
    pub fn as_byte(self) -> u8 {
        match self {
            BodyType::Unknown => 0,
            BodyType::Pitot => b'p',
            BodyType::Venturi => b'v',
            BodyType::Hybrid => b'h',
            BodyType::Experimental => b'x',
        }
    }

    /// Decode the EEPROM record byte
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'p' => BodyType::Pitot,
            b'v' => BodyType::Venturi,
            b'h' => BodyType::Hybrid,
            b'x' => BodyType::Experimental,
            _ => BodyType::Unknown,
        }
    }
}

/// Actuator family driving the bag compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "wire", derive(Serialize, Deserialize))]
pub enum MotorKind {
    /// Nothing bound and detection not requested
    Unknown,
    /// Detection state machine owns the outputs
    #[default]
    Autodetect,
    /// BTS7960-style H-bridge DC motor
    HBridge,
    /// Step/dir stepper behind an active-low enable
    Stepper,
    /// Brushless motor with commutation feedback pulses
    Brushless,
    /// Windscreen-wiper gearmotor, homed off its park switch
    Wiper,
}

/// Current motion state of the bound actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "wire", derive(Serialize, Deserialize))]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Homing,
}

/// Snapshot of everything the operator layer needs for its status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "wire", derive(Serialize, Deserialize))]
pub struct SystemHealth {
    pub sensors_found: bool,
    pub motor_kind: MotorKind,
    pub motor_state: RunState,
    pub calibration_in_progress: bool,
}

/// Diagnostic events emitted by the control-loop tick
///
/// All failure modes in the core degrade to "feature unavailable" plus one
/// of these; none of them halts the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "wire", derive(Serialize, Deserialize))]
pub enum CoreEvent {
    /// An I2C transaction to a sensor failed; all four slots were
    /// invalidated and flow computation stops until redetection
    SensorFailure,
    /// Topology detection resolved all four slots
    SensorsDetected(BusTopology),
    /// No topology matched; bit N set means slot N did not resolve
    SensorsMissing(u8),
    /// Actuator detection bound a family
    MotorDetected(MotorKind),
    /// Every candidate family timed out; detection will retry
    MotorNotDetected,
    CalibrationStarted,
    CalibrationFinished,
    /// Health snapshot changed
    Health(SystemHealth),
}

#[cfg(feature = "wire")]
impl CoreEvent {
    /// Encode for the serial link
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Decode from the serial link
    pub fn decode(buf: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_bytes_round_trip() {
        for t in [
            BusTopology::None,
            BusTopology::Spi,
            BusTopology::DualI2c,
            BusTopology::Mux,
            BusTopology::Xlate,
        ] {
            assert_eq!(BusTopology::from_byte(t.as_byte()), t);
        }
    }

    #[test]
    fn body_bytes_round_trip() {
        for b in [
            BodyType::Unknown,
            BodyType::Pitot,
            BodyType::Venturi,
            BodyType::Hybrid,
            BodyType::Experimental,
        ] {
            assert_eq!(BodyType::from_byte(b.as_byte()), b);
        }
    }

    #[test]
    fn unrecognized_bytes_decode_to_defaults() {
        assert_eq!(BusTopology::from_byte(0xFF), BusTopology::None);
        assert_eq!(BodyType::from_byte(b'q'), BodyType::Unknown);
    }
}
