//! Static description of the physical sensor wiring.
//!
//! The topology lists the multiplexer chips in chain order plus the fixed
//! set of sensor addresses present behind every channel. It fixes the
//! logical numbering of the result matrix for the process lifetime: rows
//! are channels counted cumulatively across all multiplexers, columns are
//! positions in the sensor address sequence.

use crate::mux;

/// One multiplexer chip in the chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MuxDescriptor {
    /// Bus address of the chip.
    pub address: u8,
    /// Number of wired downstream channels. Chips may be partially
    /// populated, so counts are heterogeneous by design (e.g. 8, 8, 4).
    pub channels: u8,
}

/// Errors detected while building a [`Topology`].
///
/// These indicate malformed static configuration and are startup-fatal;
/// nothing here is recoverable at sweep time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TopologyError {
    /// The multiplexer list is empty.
    EmptyMuxChain,
    /// The sensor address list is empty.
    NoSensorAddresses,
    /// A multiplexer is declared with zero channels.
    ZeroChannelMux,
    /// A multiplexer is declared with more channels than its control
    /// register has bits.
    TooManyChannels,
    /// The matrix dimensions chosen at the use site do not match the
    /// topology's row/column counts.
    DimensionMismatch,
}

/// Immutable wiring table, built once at startup.
///
/// Address *patterns* are deliberately not validated here: a sensor or
/// multiplexer configured with a foreign address degrades to unavailable
/// cells during the sweep instead of keeping the whole grid from coming
/// up.
#[derive(Copy, Clone, Debug)]
pub struct Topology<'a> {
    muxes: &'a [MuxDescriptor],
    sensor_addresses: &'a [u8],
}

impl<'a> Topology<'a> {
    /// Builds the table, validating structural invariants.
    pub fn new(
        muxes: &'a [MuxDescriptor],
        sensor_addresses: &'a [u8],
    ) -> core::result::Result<Self, TopologyError> {
        if muxes.is_empty() {
            return Err(TopologyError::EmptyMuxChain);
        }
        if sensor_addresses.is_empty() {
            return Err(TopologyError::NoSensorAddresses);
        }
        for descriptor in muxes {
            if descriptor.channels == 0 {
                return Err(TopologyError::ZeroChannelMux);
            }
            if descriptor.channels > mux::CHANNEL_COUNT {
                return Err(TopologyError::TooManyChannels);
            }
        }

        Ok(Self {
            muxes,
            sensor_addresses,
        })
    }

    /// Total logical row count: the sum of all channel counts.
    pub fn rows(&self) -> usize {
        self.muxes
            .iter()
            .map(|descriptor| descriptor.channels as usize)
            .sum()
    }

    /// Column count: the number of sensor addresses per channel.
    pub fn columns(&self) -> usize {
        self.sensor_addresses.len()
    }

    /// The multiplexer chain in scan order.
    pub fn muxes(&self) -> &'a [MuxDescriptor] {
        self.muxes
    }

    /// The sensor addresses present behind every channel, in column order.
    pub fn sensor_addresses(&self) -> &'a [u8] {
        self.sensor_addresses
    }

    /// Maps a logical row to its (multiplexer index, channel) pair.
    pub fn locate(&self, row: usize) -> Option<(usize, u8)> {
        let mut remaining = row;
        for (index, descriptor) in self.muxes.iter().enumerate() {
            if remaining < descriptor.channels as usize {
                return Some((index, remaining as u8));
            }
            remaining -= descriptor.channels as usize;
        }
        None
    }
}
