//! Dense prediction matrix reconstruction

use crate::aggregator::InteractionMatrix;
use crate::error::{AffinityError, Result};
use crate::io::USER_ID_COLUMN;
use crate::matrix_factorization::TrainedFactors;
use ndarray::Array2;

/// `U · Vᵗ` with every cell populated.
pub fn reconstruct(user_factors: &Array2<f64>, item_factors: &Array2<f64>) -> Result<Array2<f64>> {
    if user_factors.ncols() != item_factors.ncols() {
        return Err(AffinityError::DimensionMismatch(format!(
            "user factors have rank {}, item factors have rank {}",
            user_factors.ncols(),
            item_factors.ncols()
        )));
    }

    Ok(user_factors.dot(&item_factors.t()))
}

/// Dense user × category affinity scores with their identifiers
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    pub user_ids: Vec<String>,
    pub category_values: Vec<String>,
    pub scores: Array2<f64>,
}

impl PredictionTable {
    /// Rows and columns keep the order established by the aggregator.
    pub fn from_factors(axes: &InteractionMatrix, factors: &TrainedFactors) -> Result<Self> {
        if factors.user_factors.nrows() != axes.user_ids.len() {
            return Err(AffinityError::DimensionMismatch(format!(
                "{} user factor rows for {} user ids",
                factors.user_factors.nrows(),
                axes.user_ids.len()
            )));
        }
        if factors.item_factors.nrows() != axes.category_values.len() {
            return Err(AffinityError::DimensionMismatch(format!(
                "{} category factor rows for {} category values",
                factors.item_factors.nrows(),
                axes.category_values.len()
            )));
        }

        check_category_labels(&axes.category_values)?;

        let scores = reconstruct(&factors.user_factors, &factors.item_factors)?;

        Ok(Self {
            user_ids: axes.user_ids.clone(),
            category_values: axes.category_values.clone(),
            scores,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.scores.dim()
    }

    pub fn get(&self, user_id: &str, category_value: &str) -> Option<f64> {
        let row = self.user_ids.iter().position(|u| u == user_id)?;
        let col = self
            .category_values
            .iter()
            .position(|c| c == category_value)?;
        Some(self.scores[[row, col]])
    }

    /// Highest scored categories for a user, best first. Equal scores keep
    /// column order.
    pub fn top_categories(&self, user_id: &str, n: usize) -> Option<Vec<(String, f64)>> {
        let row = self.user_ids.iter().position(|u| u == user_id)?;
        let mut ranked: Vec<(usize, f64)> =
            self.scores.row(row).iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Some(
            ranked
                .into_iter()
                .take(n)
                .map(|(col, score)| (self.category_values[col].clone(), score))
                .collect(),
        )
    }
}

/// Category values share the export header with the `User_ID` key column.
pub(crate) fn check_category_labels(category_values: &[String]) -> Result<()> {
    match category_values.iter().find(|c| c.as_str() == USER_ID_COLUMN) {
        Some(label) => Err(AffinityError::ReservedLabel(label.clone())),
        None => Ok(()),
    }
}
