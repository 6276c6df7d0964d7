//! Shared store for the latest completed sweep.

/// One cell of the matrix: a calibrated reading, or an explicit marker
/// that the cell could not be read this sweep.
///
/// An unreadable sensor is never reported as 0.0 lx; consumers must be
/// able to tell "dark" from "unreachable".
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum Reading {
    /// Illuminance in lux.
    Lux(f32),
    /// Communication failure, absent device, or identity mismatch.
    #[default]
    Unavailable,
}

impl Reading {
    /// The lux value, if the cell was readable.
    pub fn lux(&self) -> Option<f32> {
        match self {
            Reading::Lux(value) => Some(*value),
            Reading::Unavailable => None,
        }
    }

    /// Whether the cell holds a reading.
    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Lux(_))
    }
}

/// The latest sweep's grid, `ROWS` x `COLS` as fixed by the topology.
///
/// The sweep engine is the only writer: it assembles a complete scratch
/// grid and then replaces the stored one wholesale via [`publish`], so a
/// reader never observes a mix of old and new cells. The store itself is
/// not a synchronization primitive; to share it across execution contexts,
/// wrap it in whatever mutex or critical section the platform provides.
///
/// [`publish`]: MatrixStore::publish
#[derive(Clone, Debug)]
pub struct MatrixStore<const ROWS: usize, const COLS: usize> {
    grid: [[Reading; COLS]; ROWS],
    sweeps: u32,
}

impl<const ROWS: usize, const COLS: usize> MatrixStore<ROWS, COLS> {
    /// Creates a store with every cell unavailable.
    pub fn new() -> Self {
        Self {
            grid: [[Reading::Unavailable; COLS]; ROWS],
            sweeps: 0,
        }
    }

    /// Replaces the whole grid with the result of a completed sweep.
    pub fn publish(&mut self, grid: [[Reading; COLS]; ROWS]) {
        self.grid = grid;
        self.sweeps = self.sweeps.wrapping_add(1);
    }

    /// The cell at (row, column), if in range.
    pub fn get(&self, row: usize, column: usize) -> Option<Reading> {
        self.grid.get(row)?.get(column).copied()
    }

    /// Read-only view of the whole grid.
    pub fn grid(&self) -> &[[Reading; COLS]; ROWS] {
        &self.grid
    }

    /// Number of sweeps published so far; lets readers detect updates.
    pub fn sweep_count(&self) -> u32 {
        self.sweeps
    }

    /// Row count of the grid.
    pub fn rows(&self) -> usize {
        ROWS
    }

    /// Column count of the grid.
    pub fn columns(&self) -> usize {
        COLS
    }
}

impl<const ROWS: usize, const COLS: usize> Default for MatrixStore<ROWS, COLS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_all_unavailable() {
        let store: MatrixStore<4, 3> = MatrixStore::new();

        assert_eq!(store.sweep_count(), 0);
        for row in 0..4 {
            for column in 0..3 {
                assert_eq!(store.get(row, column), Some(Reading::Unavailable));
            }
        }
        assert_eq!(store.get(4, 0), None);
        assert_eq!(store.get(0, 3), None);
    }

    #[test]
    fn test_publish_replaces_grid_wholesale() {
        let mut store: MatrixStore<2, 2> = MatrixStore::new();

        let mut grid = [[Reading::Unavailable; 2]; 2];
        grid[0][0] = Reading::Lux(12.5);
        grid[1][1] = Reading::Lux(800.0);
        store.publish(grid);

        assert_eq!(store.sweep_count(), 1);
        assert_eq!(store.get(0, 0), Some(Reading::Lux(12.5)));
        assert_eq!(store.get(0, 1), Some(Reading::Unavailable));
        assert_eq!(store.get(1, 1), Some(Reading::Lux(800.0)));

        // A later sweep overwrites every cell, including stale values.
        store.publish([[Reading::Lux(1.0); 2]; 2]);
        assert_eq!(store.sweep_count(), 2);
        assert_eq!(store.get(0, 0), Some(Reading::Lux(1.0)));
        assert_eq!(store.get(1, 1), Some(Reading::Lux(1.0)));
    }

    #[test]
    fn test_reading_accessors() {
        assert_eq!(Reading::Lux(3.25).lux(), Some(3.25));
        assert_eq!(Reading::Unavailable.lux(), None);
        assert!(Reading::Lux(0.0).is_available());
        assert!(!Reading::Unavailable.is_available());
    }
}
