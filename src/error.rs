use thiserror::Error;

use crate::backend::InferenceError;
use crate::record::ValidationError;
use crate::store::AuditStoreError;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Regression model prediction service error: {0}")]
    Downstream(#[from] InferenceError),
    #[error("prediction log persistence error: {0}")]
    Persistence(#[from] AuditStoreError),
}

pub type Result<T> = std::result::Result<T, PredictionError>;
