//! Register-level driver for a single OPT3001 ambient light sensor.
//!
//! The driver is a lightweight value: it only remembers the target bus
//! address, and every operation takes the I2C handle as an argument. This
//! makes it cheap to re-bind to a different address for each cell of a
//! sensor matrix, and it cannot be used without a bus at all.

use crate::{Error, Result};

/// Mask selecting the address bits fixed by the OPT3001 family.
const ADDRESS_FAMILY_MASK: u8 = 0b1111_1100;

/// Fixed upper address bits of every OPT3001 part (ADDR pin selects the rest).
const ADDRESS_FAMILY: u8 = 0b0100_0100;

/// Expected content of the manufacturer ID register ("TI" in ASCII).
pub const MANUFACTURER_ID: u16 = 0x5449;

/// Expected content of the device ID register.
pub const DEVICE_ID: u16 = 0x3001;

/// Power-on default of the configuration register, used for a soft reset.
pub const CONFIG_POWER_ON_DEFAULT: u16 = 0xC810;

/// Conversion mode field position within the configuration register.
const CONFIG_MODE_SHIFT: u16 = 9;
const CONFIG_MODE_MASK: u16 = 0b11 << CONFIG_MODE_SHIFT;

/// Conversion time select bit (0 = 100 ms, 1 = 800 ms).
const CONFIG_CONVERSION_TIME: u16 = 1 << 11;

/// Full-scale range field; 0b1100 enables automatic range selection.
const CONFIG_RANGE_MASK: u16 = 0b1111 << 12;
const CONFIG_RANGE_AUTO: u16 = 0b1100 << 12;

/// Register map of the OPT3001 sensor.
#[derive(Copy, Clone, Debug)]
pub enum Register {
    /// Latest conversion result (mantissa/exponent encoded).
    Result = 0x00,

    /// Configuration register (mode, conversion time, range).
    Config = 0x01,

    /// Low limit register for the interrupt mechanism.
    LimitLow = 0x02,

    /// High limit register for the interrupt mechanism.
    LimitHigh = 0x03,

    /// Manufacturer ID register.
    ManufacturerId = 0x7E,

    /// Device ID register.
    DeviceId = 0x7F,
}

/// Conversion time per measurement.
///
/// The same setting determines how long a caller has to wait after
/// [`Opt3001::trigger_single_shot`] before the result register is valid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConversionTime {
    /// 100 ms per conversion.
    Ms100,
    /// 800 ms per conversion (better low-light resolution).
    Ms800,
}

impl ConversionTime {
    /// Duration of one conversion in milliseconds.
    pub fn as_millis(self) -> u32 {
        match self {
            ConversionTime::Ms100 => 100,
            ConversionTime::Ms800 => 800,
        }
    }
}

/// Conversion mode as encoded in the configuration register.
///
/// The three modes are mutually exclusive and any transition between them
/// is legal. After power-on or [`Opt3001::reset`] the sensor is in
/// [`Mode::Shutdown`]. A single-shot conversion returns to shutdown on its
/// own once the conversion time has elapsed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// No conversions, minimal power draw.
    Shutdown,
    /// One conversion, then automatic shutdown.
    SingleShot,
    /// A new conversion every conversion-time interval.
    Continuous,
}

impl Mode {
    fn encode(self) -> u16 {
        match self {
            Mode::Shutdown => 0b00,
            Mode::SingleShot => 0b01,
            Mode::Continuous => 0b11,
        }
    }

    fn decode(field: u16) -> Mode {
        match field & 0b11 {
            0b00 => Mode::Shutdown,
            0b01 => Mode::SingleShot,
            // The datasheet treats 0b10 and 0b11 both as continuous.
            _ => Mode::Continuous,
        }
    }
}

/// Checks whether an address carries the fixed OPT3001 family bits.
pub(crate) fn valid_sensor_address(address: u8) -> bool {
    (address & ADDRESS_FAMILY_MASK) == ADDRESS_FAMILY
}

/// Decodes a raw result register value into lux.
///
/// The low 12 bits are a mantissa, the high 4 bits an exponent:
/// lux = mantissa * 0.01 * 2^exponent. This logarithmic encoding covers
/// roughly 0.01 lx to 83k lx and must not be read as a linear scale.
pub fn decode_lux(raw: u16) -> f32 {
    let mantissa = raw & 0x0FFF;
    let exponent = (raw & 0xF000) >> 12;
    f32::from(mantissa) * 0.01 * (1u32 << exponent) as f32
}

/// Returns `config` with the mode field replaced, all other bits kept.
pub(crate) fn config_with_mode(config: u16, mode: Mode) -> u16 {
    (config & !CONFIG_MODE_MASK) | (mode.encode() << CONFIG_MODE_SHIFT)
}

/// Returns `config` with automatic full-scale range and the given
/// conversion time, all other bits kept.
pub(crate) fn config_with_conversion_time(config: u16, ct: ConversionTime) -> u16 {
    let mut config = (config & !CONFIG_RANGE_MASK) | CONFIG_RANGE_AUTO;
    config &= !CONFIG_CONVERSION_TIME;
    if ct == ConversionTime::Ms800 {
        config |= CONFIG_CONVERSION_TIME;
    }
    config
}

/// Represents one OPT3001 sensor at a fixed bus address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Opt3001 {
    address: u8,
}

impl Opt3001 {
    /// Binds the driver to a sensor address.
    ///
    /// The OPT3001 only decodes addresses whose upper six bits are
    /// `0b010001`, i.e. 0x44 through 0x47; anything else cannot be a
    /// sensor of this family and is rejected with
    /// [`Error::InvalidAddress`].
    pub fn bind(address: u8) -> Result<Self> {
        if !valid_sensor_address(address) {
            return Err(Error::InvalidAddress);
        }
        Ok(Self { address })
    }

    /// The bus address this driver is bound to.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Reads a 16-bit register.
    ///
    /// Issues the register-pointer write and the two-byte read as one
    /// write-then-read transaction (repeated start, no stop in between)
    /// and composes the bytes big-endian.
    pub fn read_register<I2C>(&self, i2c: &mut I2C, register: Register) -> Result<u16>
    where
        I2C: embedded_hal::blocking::i2c::WriteRead,
    {
        let mut buffer = [0u8; 2];
        i2c.write_read(self.address, &[register as u8], &mut buffer)
            .map_err(|_| Error::ReadI2CError)?;

        Ok(u16::from_be_bytes(buffer))
    }

    /// Writes a 16-bit register, high byte first.
    pub fn write_register<I2C>(&self, i2c: &mut I2C, register: Register, value: u16) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write,
    {
        let [high, low] = value.to_be_bytes();
        i2c.write(self.address, &[register as u8, high, low])
            .map_err(|_| Error::WriteI2CError)?;

        Ok(())
    }

    /// Confirms that an OPT3001 is actually present at the bound address.
    ///
    /// Reads the manufacturer and device ID registers and fails with
    /// [`Error::DeviceMismatch`] unless both match their expected
    /// constants. A plain register read succeeding is not enough to tell
    /// the sensor apart from an unrelated device or bus noise.
    pub fn identify<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::WriteRead,
    {
        if self.read_register(i2c, Register::ManufacturerId)? != MANUFACTURER_ID {
            return Err(Error::DeviceMismatch);
        }
        if self.read_register(i2c, Register::DeviceId)? != DEVICE_ID {
            return Err(Error::DeviceMismatch);
        }

        Ok(())
    }

    /// Restores the configuration register to its power-on default.
    ///
    /// Leaves the sensor in shutdown mode with a 800 ms conversion time
    /// and automatic range, exactly as after a power cycle.
    pub fn reset<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write,
    {
        self.write_register(i2c, Register::Config, CONFIG_POWER_ON_DEFAULT)
    }

    /// Sets the conversion time and enables automatic full-scale range.
    pub fn set_conversion_time<I2C>(&self, i2c: &mut I2C, ct: ConversionTime) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    {
        let config = self.read_register(i2c, Register::Config)?;
        self.write_register(i2c, Register::Config, config_with_conversion_time(config, ct))
    }

    /// Switches the sensor into the given conversion mode.
    pub fn set_mode<I2C>(&self, i2c: &mut I2C, mode: Mode) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    {
        let config = self.read_register(i2c, Register::Config)?;
        self.write_register(i2c, Register::Config, config_with_mode(config, mode))
    }

    /// Starts back-to-back conversions; a fresh result appears every
    /// conversion-time interval.
    pub fn enable_continuous_conversion<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    {
        self.set_mode(i2c, Mode::Continuous)
    }

    /// Stops conversions and puts the sensor into low-power shutdown.
    pub fn disable_continuous_conversion<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    {
        self.set_mode(i2c, Mode::Shutdown)
    }

    /// Triggers one conversion; the sensor shuts itself down afterwards.
    ///
    /// The driver does not wait: the result register is only valid once
    /// the configured conversion time has elapsed, and reading it earlier
    /// yields the previous (stale) conversion, not an error. The caller
    /// must enforce the delay.
    pub fn trigger_single_shot<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    {
        self.set_mode(i2c, Mode::SingleShot)
    }

    /// Reads the conversion mode back out of the configuration register.
    pub fn mode<I2C>(&self, i2c: &mut I2C) -> Result<Mode>
    where
        I2C: embedded_hal::blocking::i2c::WriteRead,
    {
        let config = self.read_register(i2c, Register::Config)?;
        Ok(Mode::decode(config >> CONFIG_MODE_SHIFT))
    }

    /// Reads the latest conversion result and decodes it into lux.
    pub fn read_illuminance<I2C>(&self, i2c: &mut I2C) -> Result<f32>
    where
        I2C: embedded_hal::blocking::i2c::WriteRead,
    {
        let raw = self.read_register(i2c, Register::Result)?;
        Ok(decode_lux(raw))
    }
}
