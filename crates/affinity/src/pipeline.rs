//! Affinity stage: aggregate → train → reconstruct

use crate::aggregator::{aggregate, AggregationStats, Reducer};
use crate::error::Result;
use crate::matrix_factorization::{EpochLoss, SgdConfig, SgdTrainer};
use crate::reconstruction::PredictionTable;
use crate::types::InteractionRecord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Everything a caller must supply to run the stage
///
/// `reducer` has no default: the aggregation convention is always stated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Only records with this `Category_Type` are used (e.g. "Planet")
    pub category_type: String,
    pub reducer: Reducer,
    #[serde(default)]
    pub sgd: SgdConfig,
}

impl StageConfig {
    pub fn new(category_type: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            category_type: category_type.into(),
            reducer,
            sgd: SgdConfig::default(),
        }
    }

    pub fn with_sgd(mut self, sgd: SgdConfig) -> Self {
        self.sgd = sgd;
        self
    }
}

/// Result of one stage run
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub predictions: PredictionTable,
    pub loss_history: Vec<EpochLoss>,
    pub stats: AggregationStats,
}

impl StageOutput {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().map(EpochLoss::total)
    }
}

/// Runs the affinity stage over an injected snapshot of records.
pub struct AffinityStage {
    config: StageConfig,
}

impl AffinityStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Run with an RNG seeded from `sgd.seed`.
    pub fn run(&self, records: &[InteractionRecord]) -> Result<StageOutput> {
        let mut trainer = SgdTrainer::from_config(self.config.sgd.clone());
        self.run_with_trainer(records, &mut trainer)
    }

    /// Run with a caller-supplied trainer (and therefore RNG).
    pub fn run_with_trainer<R: Rng>(
        &self,
        records: &[InteractionRecord],
        trainer: &mut SgdTrainer<R>,
    ) -> Result<StageOutput> {
        let started = Instant::now();

        let interactions = aggregate(records, &self.config.category_type, self.config.reducer)?;
        let factors = trainer.fit(&interactions.matrix)?;
        let predictions = PredictionTable::from_factors(&interactions, &factors)?;

        info!(
            category_type = %self.config.category_type,
            users = predictions.user_ids.len(),
            categories = predictions.category_values.len(),
            rank = trainer.config().rank,
            final_loss = factors.final_loss(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Affinity stage completed"
        );

        Ok(StageOutput {
            predictions,
            loss_history: factors.loss_history,
            stats: interactions.stats,
        })
    }
}
