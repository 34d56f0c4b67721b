//! Error taxonomy for the scoring pipeline and its store collaborator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("behavior sample has an empty session id")]
    InvalidSample,

    #[error("outlier model scored before any successful fit")]
    ModelNotTrained,

    #[error("outlier model fit requires at least one feature vector")]
    EmptyTrainingSet,

    #[error("decision boundary is zero; risk normalization is undefined")]
    DegenerateBoundary,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Failures raised by a [`crate::storage::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("payload encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("payload crypto: {0}")]
    Crypto(String),

    #[error("{0}")]
    Unavailable(String),
}
