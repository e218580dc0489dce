//! Poppy Affinity: user × category affinity via matrix factorization
//!
//! Turns sparse user–category interaction records into a dense predicted
//! affinity table:
//!
//! records → [`aggregator`] → sparse matrix → [`matrix_factorization`] →
//! factors (U, V) → [`reconstruction`] → prediction table
//!
//! [`pipeline::AffinityStage`] runs the three steps over an injected record
//! snapshot. [`io`] holds the CSV loader and writer, [`server`] the HTTP
//! trigger used by the `affinity-service` binary.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod io;
pub mod matrix_factorization;
pub mod pipeline;
pub mod reconstruction;
pub mod server;
pub mod types;

// Re-export key types
pub use crate::config::{load_dotenv, ServiceConfig};
pub use aggregator::{aggregate, AggregationStats, InteractionMatrix, Reducer};
pub use error::{AffinityError, Result};
pub use io::{load_interactions_csv, read_interactions, save_predictions_csv, write_predictions};
pub use matrix_factorization::{
    compute_loss, sweep_ranks, EpochLoss, SgdConfig, SgdTrainer, SparseMatrix, TrainedFactors,
};
pub use pipeline::{AffinityStage, StageConfig, StageOutput};
pub use reconstruction::{reconstruct, PredictionTable};
pub use types::InteractionRecord;
