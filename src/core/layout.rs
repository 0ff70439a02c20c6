//! Layouts place the neurons of a group on the 2-D plane.
//!
//! Positions matter to the numerics in two places: the SOM neighborhood is a physical
//! Euclidean distance between neuron positions, and radial connectors wire by distance.
//! Every other topology lays neurons out purely for the benefit of whoever draws them.
//!
//! A grid is a 2-D space of `rows x columns` cells. As with any dense N-dimensional space,
//! linear indices and coordinates convert through stride values, which are the cumulative
//! product of the trailing dimension sizes.

use serde::{Deserialize, Serialize};

/// Arrangement of a group's neurons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Layout {
    /// A single horizontal row.
    Line { spacing: f64 },

    /// A rectangular grid. `columns = None` picks the smallest square that fits the group.
    Grid {
        columns: Option<usize>,
        h_spacing: f64,
        v_spacing: f64,
    },

    /// A grid whose odd rows are shifted by half a cell, so every interior neuron has six
    /// equidistant neighbors.
    Hexagonal { columns: Option<usize>, spacing: f64 },
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Line { spacing: 50.0 }
    }
}

impl Layout {
    /// Computes `count` positions starting at `origin`.
    #[inline]
    pub fn positions(&self, count: usize, origin: (f64, f64)) -> Vec<(f64, f64)> {
        let (x0, y0) = origin;
        match *self {
            Layout::Line { spacing } => (0..count)
                .map(|i| (x0 + i as f64 * spacing, y0))
                .collect(),
            Layout::Grid {
                columns,
                h_spacing,
                v_spacing,
            } => {
                let shape = GridShape::fitting(count, columns);
                (0..count)
                    .map(|i| {
                        let [row, col] = shape.coordinates(i);
                        (x0 + col as f64 * h_spacing, y0 + row as f64 * v_spacing)
                    })
                    .collect()
            }
            Layout::Hexagonal { columns, spacing } => {
                let shape = GridShape::fitting(count, columns);
                let row_height = spacing * 3f64.sqrt() / 2.0;
                (0..count)
                    .map(|i| {
                        let [row, col] = shape.coordinates(i);
                        let shift = if row % 2 == 1 { spacing / 2.0 } else { 0.0 };
                        (x0 + col as f64 * spacing + shift, y0 + row as f64 * row_height)
                    })
                    .collect()
            }
        }
    }
}

/// Shape of a 2-D grid with precomputed strides for index conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    dims: [usize; 2],
    strides: [usize; 2],
}

impl GridShape {
    #[inline]
    pub fn new(rows: usize, columns: usize) -> Self {
        let columns = columns.max(1);
        Self {
            dims: [rows, columns],
            strides: [columns, 1],
        }
    }

    /// The grid that holds `count` cells with the given number of columns, or the smallest
    /// square that does when `columns` is `None`.
    #[inline]
    pub fn fitting(count: usize, columns: Option<usize>) -> Self {
        let columns = columns
            .unwrap_or_else(|| (count as f64).sqrt().ceil() as usize)
            .max(1);
        Self::new(count.div_ceil(columns), columns)
    }

    pub fn rows(&self) -> usize {
        self.dims[0]
    }

    pub fn columns(&self) -> usize {
        self.dims[1]
    }

    /// Converts a linear index into `[row, column]`.
    #[inline]
    pub fn coordinates(&self, index: usize) -> [usize; 2] {
        let mut remainder = index;
        self.strides.map(|stride| {
            let coord = remainder / stride;
            remainder %= stride;
            coord
        })
    }

    /// Converts `[row, column]` back into a linear index.
    #[inline]
    pub fn index_from_coordinates(&self, coords: [usize; 2]) -> usize {
        coords.iter().zip(&self.strides).map(|(&c, &s)| c * s).sum()
    }
}

/// Euclidean distance between two positions.
#[inline]
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_coordinates_round_trip() {
        let shape = GridShape::new(3, 4);
        for i in 0..12 {
            assert_eq!(shape.index_from_coordinates(shape.coordinates(i)), i);
        }
        assert_eq!(shape.coordinates(5), [1, 1]);
    }

    #[test]
    fn fitting_grid_is_square_by_default() {
        let shape = GridShape::fitting(10, None);
        assert_eq!(shape.columns(), 4);
        assert_eq!(shape.rows(), 3);
    }

    #[test]
    fn hexagonal_neighbors_are_equidistant() {
        let layout = Layout::Hexagonal {
            columns: Some(3),
            spacing: 50.0,
        };
        let p = layout.positions(6, (0.0, 0.0));
        // Cell 1 (row 0) touches cells 0, 2 in its row and 3, 4 below it.
        for j in [0, 2, 3, 4] {
            assert!((distance(p[1], p[j]) - 50.0).abs() < 1e-9, "cell {j}");
        }
    }

    #[test]
    fn line_spacing() {
        let p = Layout::Line { spacing: 10.0 }.positions(3, (5.0, 1.0));
        assert_eq!(p, vec![(5.0, 1.0), (15.0, 1.0), (25.0, 1.0)]);
    }
}
