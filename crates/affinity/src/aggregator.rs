//! Interaction aggregation
//!
//! Reduces raw interaction records into a user × category strength matrix.
//! Row (user) and column (category value) identifiers are sorted
//! lexicographically, so the output does not depend on record order.

use crate::error::{AffinityError, Result};
use crate::matrix_factorization::SparseMatrix;
use crate::types::InteractionRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Rule for combining several strengths recorded for the same
/// (user, category value) pair.
///
/// The choice changes downstream predictions, so callers always name it.
/// `Max` is the conventional choice for this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Max,
    Sum,
    Mean,
}

impl Reducer {
    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Sum => values.iter().sum(),
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Max => "max",
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
        };
        f.write_str(name)
    }
}

impl FromStr for Reducer {
    type Err = AffinityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(Reducer::Max),
            "sum" => Ok(Reducer::Sum),
            "mean" => Ok(Reducer::Mean),
            other => Err(AffinityError::UnknownReducer(other.to_string())),
        }
    }
}

/// Record counts observed while aggregating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub total_records: usize,
    pub kept_records: usize,
    pub other_category_type: usize,
    pub incomplete: usize,
}

/// Aggregated strength matrix plus the identifiers for its axes
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    pub matrix: SparseMatrix,
    /// Row identifiers, in row order
    pub user_ids: Vec<String>,
    /// Column identifiers, in column order
    pub category_values: Vec<String>,
    pub stats: AggregationStats,
}

impl InteractionMatrix {
    pub fn shape(&self) -> (usize, usize) {
        (self.user_ids.len(), self.category_values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty() || self.category_values.is_empty()
    }
}

/// Build the user × category matrix for one `category_type`.
///
/// Records with a different category type, or missing user id, category value
/// or finite strength, are dropped. Pairs with no record stay at zero, which
/// the trainer reads as "unobserved".
pub fn aggregate(
    records: &[InteractionRecord],
    category_type: &str,
    reducer: Reducer,
) -> Result<InteractionMatrix> {
    let mut stats = AggregationStats {
        total_records: records.len(),
        ..Default::default()
    };
    let mut grouped: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    let mut users: BTreeSet<&str> = BTreeSet::new();
    let mut categories: BTreeSet<&str> = BTreeSet::new();

    for record in records {
        if record.category_type != category_type {
            stats.other_category_type += 1;
            continue;
        }
        let Some((user_id, category_value, strength)) = record.usable_parts() else {
            stats.incomplete += 1;
            continue;
        };

        stats.kept_records += 1;
        users.insert(user_id);
        categories.insert(category_value);
        grouped
            .entry((user_id, category_value))
            .or_default()
            .push(strength);
    }

    let user_index: BTreeMap<&str, usize> =
        users.iter().enumerate().map(|(i, &u)| (u, i)).collect();
    let category_index: BTreeMap<&str, usize> = categories
        .iter()
        .enumerate()
        .map(|(j, &c)| (c, j))
        .collect();

    let mut matrix = SparseMatrix::new(users.len(), categories.len());
    for ((user_id, category_value), strengths) in &grouped {
        matrix.insert(
            user_index[user_id],
            category_index[category_value],
            reducer.reduce(strengths),
        )?;
    }

    debug!(
        category_type,
        %reducer,
        users = users.len(),
        categories = categories.len(),
        kept = stats.kept_records,
        other_type = stats.other_category_type,
        incomplete = stats.incomplete,
        "Aggregated interactions"
    );

    Ok(InteractionMatrix {
        matrix,
        user_ids: users.into_iter().map(String::from).collect(),
        category_values: categories.into_iter().map(String::from).collect(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet(user: &str, value: &str, strength: f64) -> InteractionRecord {
        InteractionRecord::new(user, "Planet", value, strength)
    }

    #[test]
    fn test_reducers_on_duplicate_pair() {
        let records = vec![
            planet("U1", "Gas Giant", 2.0),
            planet("U1", "Gas Giant", 5.0),
        ];

        for (reducer, expected) in [
            (Reducer::Max, 5.0),
            (Reducer::Sum, 7.0),
            (Reducer::Mean, 3.5),
        ] {
            let result = aggregate(&records, "Planet", reducer).unwrap();
            assert_eq!(result.matrix.get(0, 0), expected, "reducer {}", reducer);
        }
    }

    #[test]
    fn test_planet_example() {
        let records = vec![
            planet("U1", "Dwarf Planet", 4.0),
            planet("U1", "Gas Giant", 2.0),
            planet("U2", "Dwarf Planet", 5.0),
        ];

        let result = aggregate(&records, "Planet", Reducer::Max).unwrap();

        assert_eq!(result.user_ids, vec!["U1", "U2"]);
        assert_eq!(result.category_values, vec!["Dwarf Planet", "Gas Giant"]);
        assert_eq!(
            result.matrix.to_dense(),
            ndarray::array![[4.0, 2.0], [5.0, 0.0]]
        );
    }

    #[test]
    fn test_order_independent_of_input() {
        let forward = vec![
            planet("U2", "Terrestrial", 3.0),
            planet("U1", "Gas Giant", 1.0),
            planet("U3", "Dwarf Planet", 4.0),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = aggregate(&forward, "Planet", Reducer::Max).unwrap();
        let b = aggregate(&reversed, "Planet", Reducer::Max).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.user_ids, vec!["U1", "U2", "U3"]);
    }

    #[test]
    fn test_filters_category_type_and_incomplete_records() {
        let mut missing_strength = planet("U3", "Ice Giant", 1.0);
        missing_strength.strength = None;

        let records = vec![
            planet("U1", "Gas Giant", 2.0),
            InteractionRecord::new("U2", "Star_Type", "G", 5.0),
            missing_strength,
        ];

        let result = aggregate(&records, "Planet", Reducer::Max).unwrap();

        assert_eq!(result.shape(), (1, 1));
        assert_eq!(result.stats.total_records, 3);
        assert_eq!(result.stats.kept_records, 1);
        assert_eq!(result.stats.other_category_type, 1);
        assert_eq!(result.stats.incomplete, 1);
    }

    #[test]
    fn test_no_matching_records_gives_empty_matrix() {
        let records = vec![InteractionRecord::new("U1", "Moon_Parent", "Earth", 3.0)];
        let result = aggregate(&records, "Planet", Reducer::Sum).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.matrix.num_rows(), 0);
    }

    #[test]
    fn test_reducer_parse() {
        assert_eq!("MAX".parse::<Reducer>().unwrap(), Reducer::Max);
        assert_eq!(" mean ".parse::<Reducer>().unwrap(), Reducer::Mean);
        assert!(matches!(
            "median".parse::<Reducer>(),
            Err(AffinityError::UnknownReducer(_))
        ));
    }
}
