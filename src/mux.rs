//! Channel router for a TCA9548A-family I2C bus multiplexer.
//!
//! All sensors of the matrix share the same four possible bus addresses,
//! so at most one multiplexer channel may be live at any instant or the
//! devices behind different channels would collide. The router only ever
//! writes a one-hot mask (or zero) to the control register and leaves the
//! exclusion discipline across multiple chips to the sweep engine.

use crate::{Error, Result};

/// Mask selecting the address bits fixed by the TCA9548A family.
const ADDRESS_FAMILY_MASK: u8 = 0b1111_1000;

/// Fixed upper address bits of every TCA9548A (A0..A2 pins select the rest).
const ADDRESS_FAMILY: u8 = 0b0111_0000;

/// Number of downstream channels per chip, the width of the control register.
pub const CHANNEL_COUNT: u8 = 8;

/// Checks whether an address carries the fixed TCA9548A family bits.
pub(crate) fn valid_mux_address(address: u8) -> bool {
    (address & ADDRESS_FAMILY_MASK) == ADDRESS_FAMILY
}

/// Represents one TCA9548A multiplexer at a fixed bus address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tca9548a {
    address: u8,
}

impl Tca9548a {
    /// Binds the router to a multiplexer address (0x70 through 0x77).
    pub fn new(address: u8) -> Result<Self> {
        if !valid_mux_address(address) {
            return Err(Error::InvalidAddress);
        }
        Ok(Self { address })
    }

    /// The bus address this router is bound to.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Makes exactly one downstream channel live.
    ///
    /// Writes the one-hot mask `1 << channel` to the control register,
    /// which implicitly disconnects whatever channel of this chip was live
    /// before. Channels of *other* multiplexers are not affected; callers
    /// must deselect those themselves before switching chips.
    pub fn select_channel<I2C>(&self, i2c: &mut I2C, channel: u8) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write,
    {
        if channel >= CHANNEL_COUNT {
            return Err(Error::InvalidChannel);
        }
        i2c.write(self.address, &[1u8 << channel])
            .map_err(|_| Error::WriteI2CError)?;

        Ok(())
    }

    /// Electrically isolates every downstream channel of this chip.
    pub fn deselect_all<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write,
    {
        i2c.write(self.address, &[0x00])
            .map_err(|_| Error::WriteI2CError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::MockError;

    #[test]
    fn test_new_accepts_family_addresses() {
        for address in 0x70..=0x77u8 {
            let mux = Tca9548a::new(address).unwrap();
            assert_eq!(mux.address(), address);
        }
    }

    #[test]
    fn test_new_rejects_foreign_addresses() {
        for address in [0x00, 0x44, 0x6F, 0x78, 0x7F] {
            assert_eq!(Tca9548a::new(address), Err(Error::InvalidAddress));
        }
    }

    #[test]
    fn test_select_channel_writes_one_hot_mask() {
        let expectations = [
            I2cTransaction::write(0x70, [0b0000_0001].to_vec()),
            I2cTransaction::write(0x70, [0b0010_0000].to_vec()),
            I2cTransaction::write(0x70, [0b1000_0000].to_vec()),
        ];
        let mut i2c_mock = I2cMock::new(&expectations);

        let mux = Tca9548a::new(0x70).unwrap();
        mux.select_channel(&mut i2c_mock, 0).unwrap();
        mux.select_channel(&mut i2c_mock, 5).unwrap();
        mux.select_channel(&mut i2c_mock, 7).unwrap();

        i2c_mock.done();
    }

    #[test]
    fn test_select_channel_rejects_out_of_range() {
        let mut i2c_mock = I2cMock::new(&[]);

        let mux = Tca9548a::new(0x71).unwrap();
        let result = mux.select_channel(&mut i2c_mock, 8);
        assert_eq!(result, Err(Error::InvalidChannel));

        i2c_mock.done();
    }

    #[test]
    fn test_deselect_all_writes_zero_mask() {
        let expectations = [I2cTransaction::write(0x72, [0x00].to_vec())];
        let mut i2c_mock = I2cMock::new(&expectations);

        let mux = Tca9548a::new(0x72).unwrap();
        mux.deselect_all(&mut i2c_mock).unwrap();

        i2c_mock.done();
    }

    #[test]
    fn test_select_channel_bus_error() {
        let expectations = [I2cTransaction::write(0x70, [0b0000_0100].to_vec())
            .with_error(MockError::Io(std::io::ErrorKind::Other))];
        let mut i2c_mock = I2cMock::new(&expectations);

        let mux = Tca9548a::new(0x70).unwrap();
        let result = mux.select_channel(&mut i2c_mock, 2);
        assert_eq!(result, Err(Error::WriteI2CError));

        i2c_mock.done();
    }
}
