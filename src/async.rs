//! Async API
//!
//! This module mirrors the blocking driver, router and sweep engine over
//! the [`embedded-hal-async`](https://crates.io/crates/embedded-hal-async)
//! traits. The register protocol, address validation, lux decoding and the
//! matrix/topology types are shared with the blocking API; only the bus
//! plumbing differs.

use crate::matrix::{MatrixStore, Reading};
use crate::mux::valid_mux_address;
use crate::opt3001::{
    config_with_conversion_time, config_with_mode, decode_lux, valid_sensor_address,
    ConversionTime, Mode, Register, CONFIG_POWER_ON_DEFAULT, DEVICE_ID, MANUFACTURER_ID,
};
use crate::topology::{Topology, TopologyError};
use crate::{Error, Result};

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

/// Represents one OPT3001 sensor at a fixed bus address.
#[derive(Copy, Clone, Debug)]
pub struct Opt3001 {
    address: u8,
}

impl Opt3001 {
    /// Binds the driver to a sensor address (0x44 through 0x47).
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

    /// Reads a 16-bit register, big-endian.
    pub async fn read_register<I2C>(&self, i2c: &mut I2C, register: Register) -> Result<u16>
    where
        I2C: I2c<SevenBitAddress>,
    {
        let mut buffer = [0u8; 2];
        i2c.write_read(self.address, &[register as u8], &mut buffer)
            .await
            .map_err(|_| Error::ReadI2CError)?;

        Ok(u16::from_be_bytes(buffer))
    }

    /// Writes a 16-bit register, high byte first.
    pub async fn write_register<I2C>(
        &self,
        i2c: &mut I2C,
        register: Register,
        value: u16,
    ) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        let [high, low] = value.to_be_bytes();
        i2c.write(self.address, &[register as u8, high, low])
            .await
            .map_err(|_| Error::WriteI2CError)?;

        Ok(())
    }

    /// Confirms that an OPT3001 is actually present at the bound address.
    pub async fn identify<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        if self.read_register(i2c, Register::ManufacturerId).await? != MANUFACTURER_ID {
            return Err(Error::DeviceMismatch);
        }
        if self.read_register(i2c, Register::DeviceId).await? != DEVICE_ID {
            return Err(Error::DeviceMismatch);
        }

        Ok(())
    }

    /// Restores the configuration register to its power-on default.
    pub async fn reset<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        self.write_register(i2c, Register::Config, CONFIG_POWER_ON_DEFAULT)
            .await
    }

    /// Sets the conversion time and enables automatic full-scale range.
    pub async fn set_conversion_time<I2C>(&self, i2c: &mut I2C, ct: ConversionTime) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        let config = self.read_register(i2c, Register::Config).await?;
        self.write_register(i2c, Register::Config, config_with_conversion_time(config, ct))
            .await
    }

    /// Switches the sensor into the given conversion mode.
    pub async fn set_mode<I2C>(&self, i2c: &mut I2C, mode: Mode) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        let config = self.read_register(i2c, Register::Config).await?;
        self.write_register(i2c, Register::Config, config_with_mode(config, mode))
            .await
    }

    /// Starts back-to-back conversions.
    pub async fn enable_continuous_conversion<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        self.set_mode(i2c, Mode::Continuous).await
    }

    /// Stops conversions and puts the sensor into low-power shutdown.
    pub async fn disable_continuous_conversion<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        self.set_mode(i2c, Mode::Shutdown).await
    }

    /// Triggers one conversion; the caller must wait out the conversion
    /// time before reading the result.
    pub async fn trigger_single_shot<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        self.set_mode(i2c, Mode::SingleShot).await
    }

    /// Reads the latest conversion result and decodes it into lux.
    pub async fn read_illuminance<I2C>(&self, i2c: &mut I2C) -> Result<f32>
    where
        I2C: I2c<SevenBitAddress>,
    {
        let raw = self.read_register(i2c, Register::Result).await?;
        Ok(decode_lux(raw))
    }
}

/// Represents one TCA9548A multiplexer at a fixed bus address.
#[derive(Copy, Clone, Debug)]
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
    pub async fn select_channel<I2C>(&self, i2c: &mut I2C, channel: u8) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        if channel >= crate::mux::CHANNEL_COUNT {
            return Err(Error::InvalidChannel);
        }
        i2c.write(self.address, &[1u8 << channel])
            .await
            .map_err(|_| Error::WriteI2CError)?;

        Ok(())
    }

    /// Electrically isolates every downstream channel of this chip.
    pub async fn deselect_all<I2C>(&self, i2c: &mut I2C) -> Result<()>
    where
        I2C: I2c<SevenBitAddress>,
    {
        i2c.write(self.address, &[0x00])
            .await
            .map_err(|_| Error::WriteI2CError)?;

        Ok(())
    }
}

/// Drives complete acquisition passes over a fixed topology.
#[derive(Copy, Clone, Debug)]
pub struct Sweep<'a, const ROWS: usize, const COLS: usize> {
    topology: Topology<'a>,
    settle_ms: u32,
}

const DEFAULT_SETTLE_MS: u32 = 2;
const RESET_SETTLE_MS: u32 = 5;

impl<'a, const ROWS: usize, const COLS: usize> Sweep<'a, ROWS, COLS> {
    /// Creates an engine for the given topology.
    pub fn new(topology: Topology<'a>) -> core::result::Result<Self, TopologyError> {
        if topology.rows() != ROWS || topology.columns() != COLS {
            return Err(TopologyError::DimensionMismatch);
        }
        Ok(Self {
            topology,
            settle_ms: DEFAULT_SETTLE_MS,
        })
    }

    /// Overrides the channel settling delay in milliseconds.
    pub fn with_settle_time(mut self, settle_ms: u32) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    /// Brings up every reachable sensor; returns how many completed.
    pub async fn configure<I2C, D>(
        &self,
        i2c: &mut I2C,
        delay: &mut D,
        conversion_time: ConversionTime,
    ) -> usize
    where
        I2C: I2c<SevenBitAddress>,
        D: DelayNs,
    {
        let mut configured = 0;

        for descriptor in self.topology.muxes() {
            let router = match Tca9548a::new(descriptor.address) {
                Ok(router) => router,
                Err(_) => {
                    log::warn!("invalid mux address 0x{:02x}, skipping", descriptor.address);
                    continue;
                }
            };

            for channel in 0..descriptor.channels {
                if router.select_channel(i2c, channel).await.is_err() {
                    log::warn!(
                        "mux 0x{:02x} channel {} unreachable during bring-up",
                        router.address(),
                        channel
                    );
                    continue;
                }
                delay.delay_ms(self.settle_ms).await;

                for &address in self.topology.sensor_addresses() {
                    match bring_up(address, i2c, delay, conversion_time).await {
                        Ok(()) => configured += 1,
                        Err(error) => log::debug!(
                            "sensor 0x{:02x} on mux 0x{:02x} channel {} not brought up: {:?}",
                            address,
                            router.address(),
                            channel,
                            error
                        ),
                    }
                }
            }

            if router.deselect_all(i2c).await.is_err() {
                log::warn!("failed to deselect mux 0x{:02x}", router.address());
            }
        }

        configured
    }

    /// Runs one complete acquisition pass and publishes it.
    pub async fn run<I2C, D>(
        &self,
        i2c: &mut I2C,
        delay: &mut D,
        store: &mut MatrixStore<ROWS, COLS>,
    ) -> crate::sweep::SweepSummary
    where
        I2C: I2c<SevenBitAddress>,
        D: DelayNs,
    {
        let mut grid = [[Reading::Unavailable; COLS]; ROWS];
        let mut row = 0;

        for descriptor in self.topology.muxes() {
            let router = match Tca9548a::new(descriptor.address) {
                Ok(router) => router,
                Err(_) => {
                    log::warn!("invalid mux address 0x{:02x}, skipping", descriptor.address);
                    row += descriptor.channels as usize;
                    continue;
                }
            };

            for channel in 0..descriptor.channels {
                if router.select_channel(i2c, channel).await.is_err() {
                    log::debug!(
                        "mux 0x{:02x} channel {} unreachable this sweep",
                        router.address(),
                        channel
                    );
                    row += 1;
                    continue;
                }
                delay.delay_ms(self.settle_ms).await;

                for (column, &address) in self.topology.sensor_addresses().iter().enumerate() {
                    match read_cell(address, i2c).await {
                        Ok(lux) => grid[row][column] = Reading::Lux(lux),
                        Err(error) => log::debug!(
                            "cell ({}, {}) at 0x{:02x} unavailable: {:?}",
                            row,
                            column,
                            address,
                            error
                        ),
                    }
                }
                row += 1;
            }

            if router.deselect_all(i2c).await.is_err() {
                log::warn!("failed to deselect mux 0x{:02x}", router.address());
            }
        }

        store.publish(grid);

        let cells_read = store
            .grid()
            .iter()
            .flatten()
            .filter(|cell| cell.is_available())
            .count();
        crate::sweep::SweepSummary {
            cells_read,
            cells_unavailable: ROWS * COLS - cells_read,
        }
    }
}

async fn read_cell<I2C>(address: u8, i2c: &mut I2C) -> Result<f32>
where
    I2C: I2c<SevenBitAddress>,
{
    let sensor = Opt3001::bind(address)?;
    sensor.read_illuminance(i2c).await
}

async fn bring_up<I2C, D>(
    address: u8,
    i2c: &mut I2C,
    delay: &mut D,
    conversion_time: ConversionTime,
) -> Result<()>
where
    I2C: I2c<SevenBitAddress>,
    D: DelayNs,
{
    let sensor = Opt3001::bind(address)?;
    sensor.reset(i2c).await?;
    delay.delay_ms(RESET_SETTLE_MS).await;
    sensor.identify(i2c).await?;
    sensor.set_conversion_time(i2c, conversion_time).await?;
    sensor.enable_continuous_conversion(i2c).await
}
