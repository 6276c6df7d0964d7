//! This crate provides a platform agnostic no_std acquisition pipeline for grids of
//! Texas Instruments OPT3001 ambient light sensors reached through TCA9548A I2C bus
//! multiplexers. It is compatible with the [`embedded-hal`](https://crates.io/crates/embedded-hal)
//! traits.
//!
//! The datasheet of the sensor can be found [here](https://www.ti.com/lit/ds/symlink/opt3001.pdf).
//!
//! All OPT3001 parts answer on the same four bus addresses, so a larger grid only
//! works with one multiplexer channel live at a time. The sweep engine enforces that
//! discipline, reads every sensor behind every channel and publishes the results as
//! one consistent matrix of lux readings.
//!
//! ## Supported features
//! * Register-level OPT3001 driver: shutdown / continuous / single-shot conversion
//!   modes, conversion time selection, identity check, mantissa/exponent lux decoding
//! * Exclusive-channel routing through chains of TCA9548A multiplexers
//! * Full-topology acquisition sweeps with per-cell failure isolation
//! * A double-buffered matrix store that never exposes a half-written sweep
//!
//! ## Unsupported features
//! * The OPT3001 interrupt/limit mechanism
//! * Historical logging; only the latest sweep is retained
//!
//! ## Usage
//!
//! ### Reading a single sensor
//!
//! ```rust,ignore
//! use opt3001_matrix::{ConversionTime, Opt3001};
//!
//! let sensor = Opt3001::bind(0x44)?;
//! sensor.identify(&mut i2c)?;
//! sensor.set_conversion_time(&mut i2c, ConversionTime::Ms100)?;
//! sensor.trigger_single_shot(&mut i2c)?;
//! delay.delay_ms(ConversionTime::Ms100.as_millis());
//! let lux = sensor.read_illuminance(&mut i2c)?;
//! ```
//!
//! ### Sweeping a matrix
//!
//! ```rust,ignore
//! use opt3001_matrix::{ConversionTime, MatrixStore, MuxDescriptor, Sweep, Topology};
//!
//! const MUXES: [MuxDescriptor; 2] = [
//!     MuxDescriptor { address: 0x70, channels: 8 },
//!     MuxDescriptor { address: 0x71, channels: 4 },
//! ];
//! const SENSORS: [u8; 3] = [0x44, 0x45, 0x46];
//!
//! let topology = Topology::new(&MUXES, &SENSORS)?;
//! let sweep: Sweep<12, 3> = Sweep::new(topology)?;
//! let mut store = MatrixStore::new();
//!
//! sweep.configure(&mut i2c, &mut delay, ConversionTime::Ms100);
//! loop {
//!     sweep.run(&mut i2c, &mut delay, &mut store);
//!     // hand store.grid() to whatever consumes the matrix
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod matrix;
pub mod mux;
pub mod opt3001;
pub mod sweep;
pub mod topology;

#[cfg(feature = "async")]
#[path = "async.rs"]
pub mod asynch;

pub use matrix::{MatrixStore, Reading};
pub use mux::Tca9548a;
pub use opt3001::{decode_lux, ConversionTime, Mode, Opt3001, Register};
pub use sweep::{Sweep, SweepSummary};
pub use topology::{MuxDescriptor, Topology, TopologyError};

/// Shorthand for all functions returning an error in this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Represents any error that may happen during bus communication.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub enum Error {
    /// An error occurred while reading from a device.
    ReadI2CError,
    /// An error occurred while writing to a device.
    WriteI2CError,
    /// An address does not carry the fixed bit pattern of the device family.
    InvalidAddress,
    /// The identification registers do not match the expected constants;
    /// whatever answered is not the expected device.
    DeviceMismatch,
    /// A multiplexer channel index beyond the control register width.
    InvalidChannel,
}
