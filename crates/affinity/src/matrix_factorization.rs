//! Matrix Factorization using regularized Stochastic Gradient Descent (SGD)
//!
//! Decomposes a sparse user × category strength matrix `R` into user factors
//! `U` (users × K) and category factors `V` (categories × K) so that `U·Vᵗ`
//! approximates the observed cells of `R`.
//!
//! Cells holding `0` are treated as unobserved and never contribute to the
//! gradient. A genuine zero-strength interaction therefore cannot be
//! represented; it is indistinguishable from "no interaction".

use crate::error::{AffinityError, Result};
use ndarray::{Array2, ArrayView1, ArrayViewMut1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Epoch interval for progress logging
const LOG_EVERY: usize = 100;

/// SGD configuration parameters
///
/// All five values drive the training trajectory; the defaults are fixed and
/// documented so that two runs with default configuration are identical.
/// Fields missing from a deserialized config take these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdConfig {
    /// Number of latent factors K (default: 4)
    pub rank: usize,
    /// Step size alpha (default: 0.01)
    pub learning_rate: f64,
    /// Regularization weight beta (default: 0.02)
    pub regularization: f64,
    /// Number of passes over the observed cells (default: 2000)
    pub epochs: usize,
    /// Seed for factor initialization (default: 42)
    pub seed: u64,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            rank: 4,
            learning_rate: 0.01,
            regularization: 0.02,
            epochs: 2000,
            seed: 42,
        }
    }
}

impl SgdConfig {
    /// Check hyper-parameters before any factor is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.rank == 0 {
            return Err(AffinityError::InvalidRank(self.rank));
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(AffinityError::InvalidConfig(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }

        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(AffinityError::InvalidConfig(format!(
                "regularization must be a non-negative finite number, got {}",
                self.regularization
            )));
        }

        Ok(())
    }
}

/// Sparse user-category strength matrix
///
/// Dimensions are fixed at construction. Entries are kept in row-major order
/// so that iteration visits cells exactly as a dense nested loop would.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    /// (row_index, col_index) -> aggregated strength
    entries: BTreeMap<(usize, usize), f64>,
    num_rows: usize,
    num_cols: usize,
}

impl SparseMatrix {
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            num_rows,
            num_cols,
        }
    }

    /// Build from a dense grid, keeping non-zero cells.
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let (num_rows, num_cols) = dense.dim();
        let mut matrix = Self::new(num_rows, num_cols);
        for ((row, col), &value) in dense.indexed_iter() {
            if value != 0.0 {
                matrix.entries.insert((row, col), value);
            }
        }
        matrix
    }

    /// Set a cell. Returns `DimensionMismatch` when the cell lies outside the
    /// frozen dimensions.
    pub fn insert(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.num_rows || col >= self.num_cols {
            return Err(AffinityError::DimensionMismatch(format!(
                "cell ({}, {}) outside {}x{} matrix",
                row, col, self.num_rows, self.num_cols
            )));
        }
        if value == 0.0 {
            self.entries.remove(&(row, col));
        } else {
            self.entries.insert((row, col), value);
        }
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        *self.entries.get(&(row, col)).unwrap_or(&0.0)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Cells that take part in training: value strictly greater than zero,
    /// in row-major order.
    pub fn observed(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.entries
            .iter()
            .filter(|(_, &value)| value > 0.0)
            .map(|(&(row, col), &value)| (row, col, value))
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::<f64>::zeros((self.num_rows, self.num_cols));
        for (&(row, col), &value) in &self.entries {
            dense[[row, col]] = value;
        }
        dense
    }
}

/// Loss recorded for one training epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub epoch: usize,
    /// Sum of squared errors over observed cells
    pub sse: f64,
    /// `(beta / 2) * (ΣU² + ΣV²)`
    pub penalty: f64,
}

impl EpochLoss {
    pub fn total(&self) -> f64 {
        self.sse + self.penalty
    }
}

/// Output of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedFactors {
    /// User latent factors: [num_rows x rank]
    pub user_factors: Array2<f64>,
    /// Category latent factors: [num_cols x rank]
    pub item_factors: Array2<f64>,
    /// One entry per completed epoch
    pub loss_history: Vec<EpochLoss>,
}

impl TrainedFactors {
    pub fn rank(&self) -> usize {
        self.user_factors.ncols()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().map(EpochLoss::total)
    }
}

/// SGD-based matrix factorization trainer
///
/// The RNG is owned by the trainer; nothing touches a process-wide generator.
pub struct SgdTrainer<R = StdRng> {
    config: SgdConfig,
    rng: R,
}

impl SgdTrainer<StdRng> {
    /// Trainer seeded from `config.seed`
    pub fn from_config(config: SgdConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }
}

impl<R: Rng> SgdTrainer<R> {
    pub fn new(config: SgdConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    /// Draw fresh `Uniform[0, 1)` factors, U first then V, row-major.
    pub fn initialize(&mut self, num_rows: usize, num_cols: usize) -> (Array2<f64>, Array2<f64>) {
        let k = self.config.rank;
        let rng = &mut self.rng;
        let user_factors = Array2::from_shape_simple_fn((num_rows, k), || rng.gen::<f64>());
        let item_factors = Array2::from_shape_simple_fn((num_cols, k), || rng.gen::<f64>());
        (user_factors, item_factors)
    }

    /// Train U and V on the observed cells of `matrix`.
    pub fn fit(&mut self, matrix: &SparseMatrix) -> Result<TrainedFactors> {
        if matrix.num_rows() == 0 || matrix.num_cols() == 0 {
            return Err(AffinityError::InvalidDimension {
                rows: matrix.num_rows(),
                cols: matrix.num_cols(),
            });
        }
        self.config.validate()?;

        let alpha = self.config.learning_rate;
        let beta = self.config.regularization;
        let (mut user_factors, mut item_factors) =
            self.initialize(matrix.num_rows(), matrix.num_cols());

        let observed: Vec<(usize, usize, f64)> = matrix.observed().collect();
        let mut loss_history = Vec::with_capacity(self.config.epochs);

        debug!(
            rows = matrix.num_rows(),
            cols = matrix.num_cols(),
            observed = observed.len(),
            rank = self.config.rank,
            "Starting SGD matrix factorization"
        );

        for epoch in 0..self.config.epochs {
            let mut sse = 0.0;

            for &(i, j, rating) in &observed {
                let mut user_row = user_factors.row_mut(i);
                let mut item_row = item_factors.row_mut(j);

                let prediction = user_row.dot(&item_row);
                let error = rating - prediction;
                sse += error * error;

                step(&mut user_row, &item_row.view(), error, alpha, beta);
                step(&mut item_row, &user_row.view(), error, alpha, beta);

                if !all_finite(&user_row.view()) || !all_finite(&item_row.view()) {
                    return Err(AffinityError::NonFiniteState {
                        epoch,
                        row: i,
                        col: j,
                    });
                }
            }

            let penalty = penalty(&user_factors, &item_factors, beta);
            loss_history.push(EpochLoss {
                epoch,
                sse,
                penalty,
            });

            if epoch % LOG_EVERY == 0 {
                debug!("SGD epoch {}: loss = {:.6}", epoch, sse + penalty);
            }
        }

        if let Some(last) = loss_history.last() {
            info!(
                epochs = loss_history.len(),
                sse = last.sse,
                loss = last.total(),
                "SGD matrix factorization finished"
            );
        }

        Ok(TrainedFactors {
            user_factors,
            item_factors,
            loss_history,
        })
    }

    /// Loss of an arbitrary factor pair against `matrix`, using this
    /// trainer's regularization weight.
    pub fn loss(
        &self,
        matrix: &SparseMatrix,
        user_factors: &Array2<f64>,
        item_factors: &Array2<f64>,
    ) -> Result<EpochLoss> {
        compute_loss(
            matrix,
            user_factors,
            item_factors,
            self.config.regularization,
        )
    }
}

/// `target += alpha * (2 * error * other - beta * target)`, elementwise.
fn step(
    target: &mut ArrayViewMut1<f64>,
    other: &ArrayView1<f64>,
    error: f64,
    alpha: f64,
    beta: f64,
) {
    for (t, &o) in target.iter_mut().zip(other.iter()) {
        *t += alpha * (2.0 * error * o - beta * *t);
    }
}

fn all_finite(row: &ArrayView1<f64>) -> bool {
    row.iter().all(|v| v.is_finite())
}

fn penalty(user_factors: &Array2<f64>, item_factors: &Array2<f64>, beta: f64) -> f64 {
    let squares = user_factors.iter().map(|v| v * v).sum::<f64>()
        + item_factors.iter().map(|v| v * v).sum::<f64>();
    (beta / 2.0) * squares
}

/// SSE over observed cells plus the regularization penalty.
pub fn compute_loss(
    matrix: &SparseMatrix,
    user_factors: &Array2<f64>,
    item_factors: &Array2<f64>,
    regularization: f64,
) -> Result<EpochLoss> {
    if user_factors.nrows() != matrix.num_rows()
        || item_factors.nrows() != matrix.num_cols()
        || user_factors.ncols() != item_factors.ncols()
    {
        return Err(AffinityError::DimensionMismatch(format!(
            "factors {:?} / {:?} do not fit a {}x{} matrix",
            user_factors.dim(),
            item_factors.dim(),
            matrix.num_rows(),
            matrix.num_cols()
        )));
    }

    let sse = matrix
        .observed()
        .map(|(i, j, rating)| {
            let error = rating - user_factors.row(i).dot(&item_factors.row(j));
            error * error
        })
        .sum();

    Ok(EpochLoss {
        epoch: 0,
        sse,
        penalty: penalty(user_factors, item_factors, regularization),
    })
}

/// Train one model per candidate rank and report its final loss.
///
/// Every candidate starts from `base.seed`. This is a diagnostic; choosing a
/// rank is left to the caller.
pub fn sweep_ranks(
    matrix: &SparseMatrix,
    ranks: &[usize],
    base: &SgdConfig,
) -> Result<Vec<(usize, f64)>> {
    ranks
        .iter()
        .map(|&rank| {
            let config = SgdConfig {
                rank,
                ..base.clone()
            };
            let factors = SgdTrainer::from_config(config).fit(matrix)?;
            let loss = factors.final_loss().unwrap_or(f64::NAN);
            debug!("Rank sweep K={}: final loss = {:.6}", rank, loss);
            Ok((rank, loss))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_matrix() -> SparseMatrix {
        SparseMatrix::from_dense(&array![[4.0, 2.0], [5.0, 0.0], [0.0, 1.0]])
    }

    #[test]
    fn test_sparse_matrix() {
        let mut matrix = SparseMatrix::new(2, 2);
        matrix.insert(0, 0, 1.0).unwrap();
        matrix.insert(0, 1, 2.0).unwrap();
        matrix.insert(1, 0, 3.0).unwrap();

        assert_eq!(matrix.num_rows(), 2);
        assert_eq!(matrix.num_cols(), 2);
        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.get(0, 1), 2.0);
        assert_eq!(matrix.get(1, 0), 3.0);
        assert_eq!(matrix.get(1, 1), 0.0);
        assert_eq!(matrix.nnz(), 3);
    }

    #[test]
    fn test_sparse_matrix_dimensions_are_frozen() {
        let mut matrix = SparseMatrix::new(2, 2);
        let result = matrix.insert(2, 0, 1.0);
        assert!(matches!(result, Err(AffinityError::DimensionMismatch(_))));
        assert_eq!(matrix.num_rows(), 2);
    }

    #[test]
    fn test_observed_skips_non_positive_cells() {
        let matrix = SparseMatrix::from_dense(&array![[3.0, -1.0], [0.0, 2.0]]);
        let observed: Vec<_> = matrix.observed().collect();
        assert_eq!(observed, vec![(0, 0, 3.0), (1, 1, 2.0)]);
    }

    #[test]
    fn test_fit_shapes() {
        let matrix = small_matrix();
        let mut trainer = SgdTrainer::from_config(SgdConfig {
            rank: 2,
            epochs: 50,
            ..SgdConfig::default()
        });

        let factors = trainer.fit(&matrix).unwrap();

        assert_eq!(factors.user_factors.dim(), (3, 2));
        assert_eq!(factors.item_factors.dim(), (2, 2));
        assert_eq!(factors.loss_history.len(), 50);
        assert_eq!(factors.rank(), 2);
    }

    #[test]
    fn test_rank_larger_than_dimensions_is_allowed() {
        let matrix = small_matrix();
        let mut trainer = SgdTrainer::from_config(SgdConfig {
            rank: 10,
            epochs: 10,
            ..SgdConfig::default()
        });
        assert!(trainer.fit(&matrix).is_ok());
    }

    #[test]
    fn test_zero_rank_rejected() {
        let matrix = small_matrix();
        let mut trainer = SgdTrainer::from_config(SgdConfig {
            rank: 0,
            ..SgdConfig::default()
        });
        assert!(matches!(
            trainer.fit(&matrix),
            Err(AffinityError::InvalidRank(0))
        ));
    }

    #[test]
    fn test_empty_matrix_rejected() {
        let mut trainer = SgdTrainer::from_config(SgdConfig::default());
        assert!(matches!(
            trainer.fit(&SparseMatrix::new(0, 3)),
            Err(AffinityError::InvalidDimension { rows: 0, cols: 3 })
        ));
        assert!(matches!(
            trainer.fit(&SparseMatrix::new(2, 0)),
            Err(AffinityError::InvalidDimension { rows: 2, cols: 0 })
        ));
    }

    #[test]
    fn test_invalid_learning_rate_rejected() {
        let config = SgdConfig {
            learning_rate: 0.0,
            ..SgdConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AffinityError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_initialization_is_unit_interval() {
        let mut trainer = SgdTrainer::from_config(SgdConfig::default());
        let (u, v) = trainer.initialize(5, 3);
        assert!(u.iter().chain(v.iter()).all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn test_single_step_matches_reference_update() {
        // One observed cell, one epoch: the V update must see the new U row.
        let matrix = SparseMatrix::from_dense(&array![[3.0]]);
        let config = SgdConfig {
            rank: 2,
            epochs: 1,
            ..SgdConfig::default()
        };

        let mut reference = SgdTrainer::from_config(config.clone());
        let (u0, v0) = reference.initialize(1, 1);

        let factors = SgdTrainer::from_config(config.clone())
            .fit(&matrix)
            .unwrap();

        let (alpha, beta) = (config.learning_rate, config.regularization);
        let error = 3.0 - u0.row(0).dot(&v0.row(0));
        let mut u = u0.row(0).to_owned();
        for k in 0..2 {
            u[k] += alpha * (2.0 * error * v0[[0, k]] - beta * u[k]);
        }
        let mut v = v0.row(0).to_owned();
        for k in 0..2 {
            v[k] += alpha * (2.0 * error * u[k] - beta * v[k]);
        }

        assert_eq!(factors.user_factors.row(0), u);
        assert_eq!(factors.item_factors.row(0), v);
        assert_eq!(factors.loss_history[0].sse, error * error);

        let expected_penalty = (beta / 2.0) * (u.dot(&u) + v.dot(&v));
        let recorded = factors.loss_history[0];
        assert!((recorded.penalty - expected_penalty).abs() < 1e-12);
        assert!(recorded.penalty > 0.0);
        assert!((recorded.total() - (error * error + expected_penalty)).abs() < 1e-12);
    }

    #[test]
    fn test_trainer_loss_uses_configured_regularization() {
        let matrix = small_matrix();
        let trainer = SgdTrainer::from_config(SgdConfig {
            regularization: 0.5,
            ..SgdConfig::default()
        });
        let u = Array2::from_elem((3, 2), 1.0);
        let v = Array2::from_elem((2, 2), 0.5);

        let loss = trainer.loss(&matrix, &u, &v).unwrap();

        // Every prediction is 1.0; penalty is 0.25 * (6 * 1.0 + 4 * 0.25).
        assert_eq!(loss.sse, 9.0 + 1.0 + 16.0 + 0.0);
        assert!((loss.penalty - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_divergence_detected() {
        let matrix = small_matrix();
        let mut trainer = SgdTrainer::from_config(SgdConfig {
            learning_rate: 100.0,
            epochs: 50,
            ..SgdConfig::default()
        });

        let result = trainer.fit(&matrix);
        assert!(matches!(result, Err(AffinityError::NonFiniteState { .. })));
    }

    #[test]
    fn test_compute_loss_dimension_check() {
        let matrix = small_matrix();
        let u = Array2::<f64>::zeros((3, 2));
        let v = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            compute_loss(&matrix, &u, &v, 0.02),
            Err(AffinityError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_compute_loss_zero_factors() {
        let matrix = small_matrix();
        let u = Array2::<f64>::zeros((3, 2));
        let v = Array2::<f64>::zeros((2, 2));
        let loss = compute_loss(&matrix, &u, &v, 0.02).unwrap();
        assert_eq!(loss.sse, 16.0 + 4.0 + 25.0 + 1.0);
        assert_eq!(loss.penalty, 0.0);
    }

    #[test]
    fn test_sweep_ranks() {
        let matrix = small_matrix();
        let base = SgdConfig {
            epochs: 200,
            ..SgdConfig::default()
        };
        let results = sweep_ranks(&matrix, &[1, 2, 3], &base).unwrap();
        assert_eq!(
            results.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(results.iter().all(|(_, loss)| loss.is_finite()));
    }
}
