//! Thin HTTP layer that triggers the affinity stage

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ServiceConfig;
use crate::error::{AffinityError, Result};
use crate::io::{load_interactions_csv, save_predictions_csv, USER_ID_COLUMN};
use crate::pipeline::{AffinityStage, StageOutput};
use crate::reconstruction::PredictionTable;

const DEFAULT_TOP_N: usize = 3;

/// Application state shared across all handlers
pub struct AppState {
    pub config: Arc<ServiceConfig>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// Number of top categories reported per user. Absent or 0 means the
    /// default of 3.
    pub top: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: String,
    pub category_type: String,
    pub users: usize,
    pub categories: usize,
    pub epochs: usize,
    pub final_loss: Option<f64>,
    pub records_used: usize,
    pub output_path: String,
    /// One object per user: `User_ID` first, then one field per category
    /// value in column order
    pub predictions: Vec<Map<String, Value>>,
    pub top_categories: BTreeMap<String, Vec<(String, f64)>>,
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "affinity-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /run - load the configured interactions, run the stage and persist
/// the prediction table.
async fn run_stage(
    state: web::Data<AppState>,
    query: web::Query<RunQuery>,
) -> Result<HttpResponse> {
    let config = Arc::clone(&state.config);
    let top_n = query.top.filter(|&n| n > 0).unwrap_or(DEFAULT_TOP_N);

    info!(
        category_type = %config.stage.category_type,
        input = %config.data.interactions_path.display(),
        "Affinity run requested"
    );

    let output = web::block(move || execute(&config))
        .await
        .map_err(|e| AffinityError::Internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %e, "Affinity run failed");
            e
        })?;

    let predictions = &output.predictions;
    let top_categories = predictions
        .user_ids
        .iter()
        .filter_map(|user_id| {
            predictions
                .top_categories(user_id, top_n)
                .map(|top| (user_id.clone(), top))
        })
        .collect();

    Ok(HttpResponse::Ok().json(RunResponse {
        status: "success".to_string(),
        category_type: state.config.stage.category_type.clone(),
        users: predictions.user_ids.len(),
        categories: predictions.category_values.len(),
        epochs: output.loss_history.len(),
        final_loss: output.final_loss(),
        records_used: output.stats.kept_records,
        output_path: state.config.data.predictions_path.display().to_string(),
        predictions: prediction_rows(predictions),
        top_categories,
    }))
}

fn execute(config: &ServiceConfig) -> Result<StageOutput> {
    let records = load_interactions_csv(&config.data.interactions_path)?;
    let output = AffinityStage::new(config.stage.clone()).run(&records)?;
    save_predictions_csv(&output.predictions, &config.data.predictions_path)?;
    Ok(output)
}

fn prediction_rows(table: &PredictionTable) -> Vec<Map<String, Value>> {
    table
        .user_ids
        .iter()
        .zip(table.scores.rows())
        .map(|(user_id, scores)| {
            let mut row = Map::new();
            row.insert(USER_ID_COLUMN.to_string(), Value::from(user_id.as_str()));
            for (category, &score) in table.category_values.iter().zip(scores.iter()) {
                row.insert(category.clone(), Value::from(score));
            }
            row
        })
        .collect()
}

/// Configure application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health))
        .route("/health", web::get().to(health))
        .route("/run", web::post().to(run_stage));
}
