//! Acquisition sweep over the whole multiplexer/sensor topology.
//!
//! One sweep visits every multiplexer in chain order, selects its channels
//! one at a time, reads every sensor address behind the live channel and
//! assembles the results into a scratch grid that is published to the
//! [`MatrixStore`] wholesale at the end. Individual sensor dropout is
//! normal on a bus this size, so every per-cell and per-channel failure is
//! isolated: the cell goes [`Reading::Unavailable`] and the sweep carries
//! on. A sweep never fails as a whole.

use crate::matrix::{MatrixStore, Reading};
use crate::mux::Tca9548a;
use crate::opt3001::{ConversionTime, Opt3001};
use crate::topology::{Topology, TopologyError};
use crate::Result;

/// Outcome counters of one sweep.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SweepSummary {
    /// Cells that produced a reading.
    pub cells_read: usize,
    /// Cells marked unavailable this sweep.
    pub cells_unavailable: usize,
}

/// Drives complete acquisition passes over a fixed topology.
///
/// `ROWS` and `COLS` must match the topology's dimensions; the mismatch is
/// caught at construction. The engine owns no bus state between calls, so
/// an external scheduler can invoke [`run`](Sweep::run) at whatever period
/// suits the deployment (the conversion time bounds how often fresh values
/// appear).
#[derive(Copy, Clone, Debug)]
pub struct Sweep<'a, const ROWS: usize, const COLS: usize> {
    topology: Topology<'a>,
    settle_ms: u32,
}

/// Delay between selecting a channel and the first sensor transaction on
/// it. The minimum safe value is board-dependent; this default is on the
/// conservative side and can be tuned with [`Sweep::with_settle_time`].
const DEFAULT_SETTLE_MS: u32 = 2;

/// Delay after resetting a sensor to its power-on configuration.
const RESET_SETTLE_MS: u32 = 5;

impl<'a, const ROWS: usize, const COLS: usize> Sweep<'a, ROWS, COLS> {
    /// Creates an engine for the given topology.
    ///
    /// Fails with [`TopologyError::DimensionMismatch`] if the const
    /// dimensions do not equal the topology's row and column counts.
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

    /// The topology this engine scans.
    pub fn topology(&self) -> &Topology<'a> {
        &self.topology
    }

    /// Brings up every reachable sensor: reset to power-on defaults,
    /// identity check, conversion time, continuous conversion.
    ///
    /// Returns the number of sensors that completed the whole sequence.
    /// Sensors that fail any step are logged and skipped; they will simply
    /// read as unavailable until they come back.
    pub fn configure<I2C, D>(
        &self,
        i2c: &mut I2C,
        delay: &mut D,
        conversion_time: ConversionTime,
    ) -> usize
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
        D: embedded_hal::blocking::delay::DelayMs<u32>,
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
                if router.select_channel(i2c, channel).is_err() {
                    log::warn!(
                        "mux 0x{:02x} channel {} unreachable during bring-up",
                        router.address(),
                        channel
                    );
                    continue;
                }
                delay.delay_ms(self.settle_ms);

                for &address in self.topology.sensor_addresses() {
                    match bring_up(address, i2c, delay, conversion_time) {
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

            if router.deselect_all(i2c).is_err() {
                log::warn!("failed to deselect mux 0x{:02x}", router.address());
            }
        }

        configured
    }

    /// Runs one complete acquisition pass and publishes it.
    ///
    /// Rows are produced in topology order. A multiplexer's channels are
    /// always deselected before the next multiplexer is addressed, since
    /// the sensor addresses behind different chips are identical and would
    /// otherwise collide on the bus.
    pub fn run<I2C, D>(
        &self,
        i2c: &mut I2C,
        delay: &mut D,
        store: &mut MatrixStore<ROWS, COLS>,
    ) -> SweepSummary
    where
        I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
        D: embedded_hal::blocking::delay::DelayMs<u32>,
    {
        let mut grid = [[Reading::Unavailable; COLS]; ROWS];
        let mut row = 0;

        for descriptor in self.topology.muxes() {
            let router = match Tca9548a::new(descriptor.address) {
                Ok(router) => router,
                Err(_) => {
                    // The chip's whole channel range stays unavailable.
                    log::warn!("invalid mux address 0x{:02x}, skipping", descriptor.address);
                    row += descriptor.channels as usize;
                    continue;
                }
            };

            for channel in 0..descriptor.channels {
                if router.select_channel(i2c, channel).is_err() {
                    log::debug!(
                        "mux 0x{:02x} channel {} unreachable this sweep",
                        router.address(),
                        channel
                    );
                    row += 1;
                    continue;
                }
                delay.delay_ms(self.settle_ms);

                for (column, &address) in self.topology.sensor_addresses().iter().enumerate() {
                    match read_cell(address, i2c) {
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

            if router.deselect_all(i2c).is_err() {
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
        let summary = SweepSummary {
            cells_read,
            cells_unavailable: ROWS * COLS - cells_read,
        };
        log::debug!("sweep complete: {:?}", summary);
        summary
    }
}

/// Reads one cell: fresh bind, then a result-register read.
fn read_cell<I2C>(address: u8, i2c: &mut I2C) -> Result<f32>
where
    I2C: embedded_hal::blocking::i2c::WriteRead,
{
    let sensor = Opt3001::bind(address)?;
    sensor.read_illuminance(i2c)
}

/// Full bring-up sequence for one sensor.
fn bring_up<I2C, D>(
    address: u8,
    i2c: &mut I2C,
    delay: &mut D,
    conversion_time: ConversionTime,
) -> Result<()>
where
    I2C: embedded_hal::blocking::i2c::Write + embedded_hal::blocking::i2c::WriteRead,
    D: embedded_hal::blocking::delay::DelayMs<u32>,
{
    let sensor = Opt3001::bind(address)?;
    sensor.reset(i2c)?;
    delay.delay_ms(RESET_SETTLE_MS);
    sensor.identify(i2c)?;
    sensor.set_conversion_time(i2c, conversion_time)?;
    sensor.enable_continuous_conversion(i2c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opt3001::decode_lux;
    use crate::topology::MuxDescriptor;
    use embedded_hal_mock::delay::MockNoop as DelayMock;
    use embedded_hal_mock::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::MockError;

    /// Raw result register bytes used by the happy-path expectations.
    const RAW_RESULT: [u8; 2] = [0x12, 0x34];

    fn lux_of_raw() -> f32 {
        decode_lux(0x1234)
    }

    #[test]
    fn test_sweep_visits_topology_in_order() {
        let muxes = [
            MuxDescriptor {
                address: 0x70,
                channels: 2,
            },
            MuxDescriptor {
                address: 0x71,
                channels: 1,
            },
        ];
        let sensors = [0x44, 0x45];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        // The expectation list doubles as an ordering assertion: mux 0x70
        // must be fully deselected before mux 0x71 is selected.
        let expectations = [
            I2cTransaction::write(0x70, [0b01].to_vec()),
            I2cTransaction::write_read(0x44, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write_read(0x45, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write(0x70, [0b10].to_vec()),
            I2cTransaction::write_read(0x44, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write_read(0x45, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write(0x70, [0x00].to_vec()),
            I2cTransaction::write(0x71, [0b01].to_vec()),
            I2cTransaction::write_read(0x44, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write_read(0x45, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write(0x71, [0x00].to_vec()),
        ];
        let mut i2c_mock = I2cMock::new(&expectations);
        let mut delay_mock = DelayMock::new();

        let sweep: Sweep<3, 2> = Sweep::new(topology).unwrap();
        let mut store = MatrixStore::new();
        let summary = sweep.run(&mut i2c_mock, &mut delay_mock, &mut store);

        assert_eq!(
            summary,
            SweepSummary {
                cells_read: 6,
                cells_unavailable: 0
            }
        );
        assert_eq!(store.sweep_count(), 1);
        for row in 0..3 {
            for column in 0..2 {
                assert_eq!(store.get(row, column), Some(Reading::Lux(lux_of_raw())));
            }
        }

        i2c_mock.done();
    }

    #[test]
    fn test_single_cell_failure_is_isolated() {
        // Full deployment: 8 + 8 + 4 channels, 3 sensors per channel.
        let muxes = [
            MuxDescriptor {
                address: 0x70,
                channels: 8,
            },
            MuxDescriptor {
                address: 0x71,
                channels: 8,
            },
            MuxDescriptor {
                address: 0x72,
                channels: 4,
            },
        ];
        let sensors = [0x44, 0x45, 0x46];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        let failing = (5usize, 1usize);
        let mut expectations = Vec::new();
        let mut row = 0usize;
        for descriptor in &muxes {
            for channel in 0..descriptor.channels {
                expectations.push(I2cTransaction::write(
                    descriptor.address,
                    [1u8 << channel].to_vec(),
                ));
                for (column, &address) in sensors.iter().enumerate() {
                    let read =
                        I2cTransaction::write_read(address, [0x00].to_vec(), RAW_RESULT.to_vec());
                    if (row, column) == failing {
                        expectations
                            .push(read.with_error(MockError::Io(std::io::ErrorKind::Other)));
                    } else {
                        expectations.push(read);
                    }
                }
                row += 1;
            }
            expectations.push(I2cTransaction::write(descriptor.address, [0x00].to_vec()));
        }

        let mut i2c_mock = I2cMock::new(&expectations);
        let mut delay_mock = DelayMock::new();

        let sweep: Sweep<20, 3> = Sweep::new(topology).unwrap();
        let mut store = MatrixStore::new();
        let summary = sweep.run(&mut i2c_mock, &mut delay_mock, &mut store);

        assert_eq!(
            summary,
            SweepSummary {
                cells_read: 59,
                cells_unavailable: 1
            }
        );
        for row in 0..20 {
            for column in 0..3 {
                let expected = if (row, column) == failing {
                    Reading::Unavailable
                } else {
                    Reading::Lux(lux_of_raw())
                };
                assert_eq!(store.get(row, column), Some(expected));
            }
        }

        i2c_mock.done();
    }

    #[test]
    fn test_failed_channel_select_degrades_only_that_row() {
        let muxes = [MuxDescriptor {
            address: 0x70,
            channels: 2,
        }];
        let sensors = [0x44, 0x45];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        let expectations = [
            I2cTransaction::write(0x70, [0b01].to_vec())
                .with_error(MockError::Io(std::io::ErrorKind::Other)),
            I2cTransaction::write(0x70, [0b10].to_vec()),
            I2cTransaction::write_read(0x44, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write_read(0x45, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write(0x70, [0x00].to_vec()),
        ];
        let mut i2c_mock = I2cMock::new(&expectations);
        let mut delay_mock = DelayMock::new();

        let sweep: Sweep<2, 2> = Sweep::new(topology).unwrap();
        let mut store = MatrixStore::new();
        let summary = sweep.run(&mut i2c_mock, &mut delay_mock, &mut store);

        assert_eq!(
            summary,
            SweepSummary {
                cells_read: 2,
                cells_unavailable: 2
            }
        );
        assert_eq!(store.get(0, 0), Some(Reading::Unavailable));
        assert_eq!(store.get(0, 1), Some(Reading::Unavailable));
        assert_eq!(store.get(1, 0), Some(Reading::Lux(lux_of_raw())));
        assert_eq!(store.get(1, 1), Some(Reading::Lux(lux_of_raw())));

        i2c_mock.done();
    }

    #[test]
    fn test_invalid_mux_address_degrades_its_rows() {
        // 0x50 is not a TCA9548A-family address; its rows stay unavailable
        // without a single bus transaction, the rest of the sweep proceeds.
        let muxes = [
            MuxDescriptor {
                address: 0x50,
                channels: 2,
            },
            MuxDescriptor {
                address: 0x70,
                channels: 1,
            },
        ];
        let sensors = [0x44];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        let expectations = [
            I2cTransaction::write(0x70, [0b01].to_vec()),
            I2cTransaction::write_read(0x44, [0x00].to_vec(), RAW_RESULT.to_vec()),
            I2cTransaction::write(0x70, [0x00].to_vec()),
        ];
        let mut i2c_mock = I2cMock::new(&expectations);
        let mut delay_mock = DelayMock::new();

        let sweep: Sweep<3, 1> = Sweep::new(topology).unwrap();
        let mut store = MatrixStore::new();
        let summary = sweep.run(&mut i2c_mock, &mut delay_mock, &mut store);

        assert_eq!(
            summary,
            SweepSummary {
                cells_read: 1,
                cells_unavailable: 2
            }
        );
        assert_eq!(store.get(0, 0), Some(Reading::Unavailable));
        assert_eq!(store.get(1, 0), Some(Reading::Unavailable));
        assert_eq!(store.get(2, 0), Some(Reading::Lux(lux_of_raw())));

        i2c_mock.done();
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let muxes = [
            MuxDescriptor {
                address: 0x70,
                channels: 8,
            },
            MuxDescriptor {
                address: 0x71,
                channels: 4,
            },
        ];
        let sensors = [0x44, 0x45, 0x46];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        assert_eq!(
            Sweep::<20, 3>::new(topology).unwrap_err(),
            TopologyError::DimensionMismatch
        );
        assert!(Sweep::<12, 3>::new(topology).is_ok());
    }

    #[test]
    fn test_configure_brings_up_reachable_sensors() {
        let muxes = [MuxDescriptor {
            address: 0x70,
            channels: 1,
        }];
        let sensors = [0x44];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        let expectations = [
            I2cTransaction::write(0x70, [0b01].to_vec()),
            // Reset to power-on defaults.
            I2cTransaction::write(0x44, [0x01, 0xC8, 0x10].to_vec()),
            // Identity check.
            I2cTransaction::write_read(0x44, [0x7E].to_vec(), [0x54, 0x49].to_vec()),
            I2cTransaction::write_read(0x44, [0x7F].to_vec(), [0x30, 0x01].to_vec()),
            // Conversion time 100 ms (clears bit 11 of the default).
            I2cTransaction::write_read(0x44, [0x01].to_vec(), [0xC8, 0x10].to_vec()),
            I2cTransaction::write(0x44, [0x01, 0xC0, 0x10].to_vec()),
            // Continuous conversion.
            I2cTransaction::write_read(0x44, [0x01].to_vec(), [0xC0, 0x10].to_vec()),
            I2cTransaction::write(0x44, [0x01, 0xC6, 0x10].to_vec()),
            I2cTransaction::write(0x70, [0x00].to_vec()),
        ];
        let mut i2c_mock = I2cMock::new(&expectations);
        let mut delay_mock = DelayMock::new();

        let sweep: Sweep<1, 1> = Sweep::new(topology).unwrap();
        let configured = sweep.configure(&mut i2c_mock, &mut delay_mock, ConversionTime::Ms100);
        assert_eq!(configured, 1);

        i2c_mock.done();
    }

    #[test]
    fn test_configure_skips_unidentified_sensors() {
        let muxes = [MuxDescriptor {
            address: 0x70,
            channels: 1,
        }];
        let sensors = [0x44, 0x45];
        let topology = Topology::new(&muxes, &sensors).unwrap();

        let expectations = [
            I2cTransaction::write(0x70, [0b01].to_vec()),
            // 0x44 answers with a foreign manufacturer ID and is skipped.
            I2cTransaction::write(0x44, [0x01, 0xC8, 0x10].to_vec()),
            I2cTransaction::write_read(0x44, [0x7E].to_vec(), [0xBE, 0xEF].to_vec()),
            // 0x45 completes the full bring-up.
            I2cTransaction::write(0x45, [0x01, 0xC8, 0x10].to_vec()),
            I2cTransaction::write_read(0x45, [0x7E].to_vec(), [0x54, 0x49].to_vec()),
            I2cTransaction::write_read(0x45, [0x7F].to_vec(), [0x30, 0x01].to_vec()),
            I2cTransaction::write_read(0x45, [0x01].to_vec(), [0xC8, 0x10].to_vec()),
            I2cTransaction::write(0x45, [0x01, 0xC8, 0x10].to_vec()),
            I2cTransaction::write_read(0x45, [0x01].to_vec(), [0xC8, 0x10].to_vec()),
            I2cTransaction::write(0x45, [0x01, 0xCE, 0x10].to_vec()),
            I2cTransaction::write(0x70, [0x00].to_vec()),
        ];
        let mut i2c_mock = I2cMock::new(&expectations);
        let mut delay_mock = DelayMock::new();

        let sweep: Sweep<1, 2> = Sweep::new(topology).unwrap();
        let configured = sweep.configure(&mut i2c_mock, &mut delay_mock, ConversionTime::Ms800);
        assert_eq!(configured, 1);

        i2c_mock.done();
    }
}
