// This example demonstrates how to scan an OPT3001 matrix from a Raspberry Pi.
// It is so far untested, but should be a good reference for any kind of embedded system.

use embedded_hal::blocking::delay::DelayMs;
use linux_embedded_hal as hal;
use opt3001_matrix::{ConversionTime, MatrixStore, MuxDescriptor, Sweep, Topology};

// Three multiplexers with 8 + 8 + 4 wired channels, three sensors behind
// every channel: a 20 x 3 matrix.
const MUXES: [MuxDescriptor; 3] = [
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
const SENSORS: [u8; 3] = [0x44, 0x45, 0x46];

fn main() {
    let mut i2c = hal::I2cdev::new("/dev/i2c-1").unwrap();
    let mut delay = hal::Delay;

    let topology = Topology::new(&MUXES, &SENSORS).unwrap();
    let sweep: Sweep<20, 3> = Sweep::new(topology).unwrap();
    let mut store = MatrixStore::new();

    // Reset, verify and start every reachable sensor.
    let configured = sweep.configure(&mut i2c, &mut delay, ConversionTime::Ms100);
    log::info!("{} of {} sensors configured", configured, 20 * 3);

    loop {
        let summary = sweep.run(&mut i2c, &mut delay, &mut store);
        log::info!(
            "sweep {}: {} cells read, {} unavailable",
            store.sweep_count(),
            summary.cells_read,
            summary.cells_unavailable
        );

        for (row, cells) in store.grid().iter().enumerate() {
            for (column, cell) in cells.iter().enumerate() {
                match cell.lux() {
                    Some(lux) => log::info!("({}, {}): {:.1} lx", row, column, lux),
                    None => log::info!("({}, {}): unavailable", row, column),
                }
            }
        }

        // In continuous 100 ms mode a fresh result appears every interval.
        delay.delay_ms(200u32);
    }
}
