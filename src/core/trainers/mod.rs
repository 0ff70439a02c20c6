//! Supervised trainers.
//!
//! Every trainer works on a [`TrainingSet`]: an input matrix with one row per example and
//! one column per input neuron, plus a target matrix with one column per output neuron.
//! Both shapes are checked against the layers when the data is handed over, so a trainer
//! that holds data can always run. Trainers also take the two matrices one at a time through
//! [`TrainingData`]; each is checked against its own layer when it is assigned.
//!
//! Iterative trainers implement [`IterableTrainer`]. One call to `iterate` is one epoch over
//! every row; `train` repeats that and reports the final error.

pub mod backprop;
pub mod bptt;
pub mod lms;
pub mod lms_offline;

pub use backprop::BackpropTrainer;
pub use bptt::BpttTrainer;
pub use lms::LmsIterative;
pub use lms_offline::{LmsOffline, SolutionType};

use super::network::Network;
use crate::error::{Result, SimError};
use ndarray::{Array2, ArrayView1};
use tracing::{debug, info};

/// Paired input and target rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    input: Array2<f64>,
    target: Array2<f64>,
}

impl TrainingSet {
    /// Pairs `input` with `target`. Both must have the same number of rows.
    pub fn new(input: Array2<f64>, target: Array2<f64>) -> Result<Self> {
        if input.nrows() != target.nrows() {
            return Err(SimError::mismatch(
                "target rows",
                input.nrows(),
                target.nrows(),
            ));
        }
        Ok(Self { input, target })
    }

    /// Builds a set from nested rows.
    pub fn from_rows(input: &[Vec<f64>], target: &[Vec<f64>]) -> Result<Self> {
        Self::new(to_matrix(input)?, to_matrix(target)?)
    }

    /// Checks the column counts against the layer sizes.
    pub fn validate(&self, input_len: usize, output_len: usize) -> Result<()> {
        if self.input.ncols() != input_len {
            return Err(SimError::mismatch(
                "input data columns",
                input_len,
                self.input.ncols(),
            ));
        }
        if self.target.ncols() != output_len {
            return Err(SimError::mismatch(
                "training data columns",
                output_len,
                self.target.ncols(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn input(&self) -> &Array2<f64> {
        &self.input
    }

    #[inline]
    pub fn target(&self) -> &Array2<f64> {
        &self.target
    }

    #[inline]
    pub fn input_row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.input.row(row)
    }

    #[inline]
    pub fn target_row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.target.row(row)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.input.nrows()
    }
}

/// Training data held by a trainer.
///
/// The input and target matrices may be assigned together as a [`TrainingSet`] or one at a
/// time. Column counts are checked on assignment. The row counts are checked once both
/// halves are present.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    input: Option<Array2<f64>>,
    target: Option<Array2<f64>>,
    set: Option<TrainingSet>,
}

impl TrainingData {
    /// Replaces both matrices with `set`.
    pub fn set(&mut self, set: TrainingSet, input_len: usize, output_len: usize) -> Result<()> {
        set.validate(input_len, output_len)?;
        self.input = None;
        self.target = None;
        self.set = Some(set);
        Ok(())
    }

    /// Replaces the input matrix. It needs one column per input neuron.
    pub fn set_input(&mut self, input: Array2<f64>, input_len: usize) -> Result<()> {
        if input.ncols() != input_len {
            return Err(SimError::mismatch(
                "input data columns",
                input_len,
                input.ncols(),
            ));
        }
        self.split();
        self.input = Some(input);
        self.assemble();
        Ok(())
    }

    /// Replaces the target matrix. It needs one column per output neuron.
    pub fn set_target(&mut self, target: Array2<f64>, output_len: usize) -> Result<()> {
        if target.ncols() != output_len {
            return Err(SimError::mismatch(
                "training data columns",
                output_len,
                target.ncols(),
            ));
        }
        self.split();
        self.target = Some(target);
        self.assemble();
        Ok(())
    }

    pub fn input(&self) -> Option<&Array2<f64>> {
        match &self.set {
            Some(set) => Some(set.input()),
            None => self.input.as_ref(),
        }
    }

    pub fn target(&self) -> Option<&Array2<f64>> {
        match &self.set {
            Some(set) => Some(set.target()),
            None => self.target.as_ref(),
        }
    }

    /// The paired set, if both halves are present and their rows agree.
    pub fn training_set(&self) -> Option<&TrainingSet> {
        self.set.as_ref()
    }

    /// The paired set, or the reason there is none.
    pub fn ready(&self) -> Result<&TrainingSet> {
        if let Some(set) = &self.set {
            return Ok(set);
        }
        match (&self.input, &self.target) {
            (Some(input), Some(target)) => Err(SimError::mismatch(
                "target rows",
                input.nrows(),
                target.nrows(),
            )),
            (None, _) => Err(SimError::DataNotInitialized("input")),
            (_, None) => Err(SimError::DataNotInitialized("training")),
        }
    }

    fn split(&mut self) {
        if let Some(set) = self.set.take() {
            self.input = Some(set.input);
            self.target = Some(set.target);
        }
    }

    fn assemble(&mut self) {
        let paired = matches!(
            (&self.input, &self.target),
            (Some(input), Some(target)) if input.nrows() == target.nrows()
        );
        if paired {
            if let (Some(input), Some(target)) = (self.input.take(), self.target.take()) {
                self.set = Some(TrainingSet { input, target });
            }
        }
    }
}

/// Converts nested rows into a matrix. Every row must have the length of the first.
pub fn to_matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let cols = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(rows.len() * cols);
    for row in rows {
        if row.len() != cols {
            return Err(SimError::mismatch("row length", cols, row.len()));
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), cols), flat)
        .map_err(|e| SimError::invalid("rows", e.to_string()))
}

/// Root mean squared error from a sum of squared errors over `rows * outputs` terms.
#[inline]
pub fn rms(sum_squared: f64, rows: usize, outputs: usize) -> f64 {
    let count = rows * outputs;
    if count == 0 {
        0.0
    } else {
        (sum_squared / count as f64).sqrt()
    }
}

/// A trainer that improves the network one epoch at a time.
pub trait IterableTrainer {
    /// Runs one epoch over the training set.
    fn iterate(&mut self, net: &mut Network) -> Result<()>;

    /// Error measured during the last epoch.
    fn error(&self) -> f64;

    /// Number of completed epochs.
    fn iteration(&self) -> usize;

    /// Runs `iterations` epochs and returns the final error.
    fn train(&mut self, net: &mut Network, iterations: usize) -> Result<f64> {
        for _ in 0..iterations {
            self.iterate(net)?;
            debug!(
                iteration = self.iteration(),
                error = self.error(),
                "epoch complete"
            );
        }
        info!(
            iterations,
            error = self.error(),
            "training complete"
        );
        Ok(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rows_must_pair_up() {
        let result = TrainingSet::new(Array2::zeros((3, 2)), Array2::zeros((2, 1)));
        assert!(matches!(result, Err(SimError::DimensionMismatch { .. })));
    }

    #[test]
    fn validate_checks_columns() {
        let set = TrainingSet::new(array![[1.0, 0.0]], array![[1.0]]).unwrap();
        assert!(set.validate(2, 1).is_ok());
        assert!(set.validate(3, 1).is_err());
        assert!(set.validate(2, 2).is_err());
    }

    #[test]
    fn halves_are_checked_on_assignment() {
        let mut data = TrainingData::default();
        assert!(matches!(
            data.set_input(array![[1.0, 0.0, 0.0]], 2),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            data.set_target(array![[1.0, 0.0]], 1),
            Err(SimError::DimensionMismatch { .. })
        ));
        assert!(matches!(data.ready(), Err(SimError::DataNotInitialized(_))));

        data.set_input(array![[1.0, 0.0], [0.0, 1.0]], 2).unwrap();
        assert!(matches!(data.ready(), Err(SimError::DataNotInitialized(_))));
        data.set_target(array![[1.0]], 1).unwrap();
        assert!(matches!(data.ready(), Err(SimError::DimensionMismatch { .. })));

        data.set_target(array![[1.0], [0.0]], 1).unwrap();
        assert_eq!(data.ready().unwrap().rows(), 2);

        // Replacing one half keeps the other.
        data.set_input(array![[0.5, 0.5], [0.2, 0.8]], 2).unwrap();
        assert_eq!(data.target(), Some(&array![[1.0], [0.0]]));
        assert_eq!(data.ready().unwrap().input_row(1).to_vec(), vec![0.2, 0.8]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(to_matrix(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        let m = to_matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m, array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn rms_of_nothing_is_zero() {
        assert_eq!(rms(0.0, 0, 3), 0.0);
        assert!((rms(8.0, 2, 1) - 2.0).abs() < 1e-12);
    }
}
