use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

pub type Result<T> = std::result::Result<T, AffinityError>;

#[derive(Debug, thiserror::Error)]
pub enum AffinityError {
    #[error("Invalid matrix dimensions: {rows} rows x {cols} columns")]
    InvalidDimension { rows: usize, cols: usize },

    #[error("Invalid rank: {0} (must be at least 1)")]
    InvalidRank(usize),

    #[error("Training diverged: non-finite factor at epoch {epoch}, cell ({row}, {col})")]
    NonFiniteState {
        epoch: usize,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Category value {0:?} collides with the key column")]
    ReservedLabel(String),

    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown reducer: {0} (expected max, sum or mean)")]
    UnknownReducer(String),

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AffinityError {
    /// True for errors raised by the stage itself rather than by its I/O
    /// collaborators. These are reported as 422.
    pub fn is_training_failure(&self) -> bool {
        matches!(
            self,
            AffinityError::InvalidDimension { .. }
                | AffinityError::InvalidRank(_)
                | AffinityError::NonFiniteState { .. }
                | AffinityError::DimensionMismatch(_)
                | AffinityError::ReservedLabel(_)
                | AffinityError::InvalidConfig(_)
        )
    }

    fn error_code(&self) -> &'static str {
        match self {
            AffinityError::InvalidDimension { .. } => "invalid_dimension",
            AffinityError::InvalidRank(_) => "invalid_rank",
            AffinityError::NonFiniteState { .. } => "non_finite_state",
            AffinityError::DimensionMismatch(_) => "dimension_mismatch",
            AffinityError::ReservedLabel(_) => "reserved_label",
            AffinityError::InvalidConfig(_) => "invalid_config",
            AffinityError::UnknownReducer(_) => "unknown_reducer",
            AffinityError::Configuration { .. } => "configuration_error",
            AffinityError::Io(_) => "io_error",
            AffinityError::Csv(_) => "csv_error",
            AffinityError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AffinityError {
    fn status_code(&self) -> StatusCode {
        match self {
            e if e.is_training_failure() => StatusCode::UNPROCESSABLE_ENTITY,
            AffinityError::UnknownReducer(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "status": "error",
            "error": self.error_code(),
            "message": self.to_string(),
        }))
    }
}
