//! I2C bus abstraction
//!
//! One trait for I2C master transactions. The bus-device registry in
//! `respira-drivers` layers addressing, mux routing and EEPROM paging
//! on top of these three primitives.

/// I2C bus master
pub trait I2cBus {
    /// Error type for I2C operations
    type Error;

    /// Write data to a device at the given 7-bit address
    ///
    /// An empty `data` slice performs an address-only transaction
    /// (start, address byte, stop) and reports whether the device
    /// acknowledged - see [`I2cBus::probe`].
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Read data from a device at the given 7-bit address
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write then read in a single transaction (repeated start)
    ///
    /// Used to set a register address and read back its contents.
    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Address-only transaction: true if the device acknowledged
    ///
    /// This is how presence detection works for every device type;
    /// a NACK means "not fitted", never a fatal error.
    fn probe(&mut self, address: u8) -> bool {
        self.write(address, &[]).is_ok()
    }
}
