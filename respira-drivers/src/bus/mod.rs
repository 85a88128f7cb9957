//! Bus-device abstraction
//!
//! Every peripheral the core talks to - four barometers, an optional I2C
//! mux, the identity EEPROM - is represented by a handle into a fixed
//! pool of device slots. The registry routes each transaction through
//! whatever mux chain the device sits behind and owns all device
//! lifetime: handles are reference counted, and releasing the last
//! reference to a muxed device releases its mux recursively.

mod registry;

pub use registry::{
    BusError, BusId, BusKind, BusRegistry, DeviceHandle, DeviceRole, MAX_DEVICES,
};
