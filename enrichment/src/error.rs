//! Error types returned by the enrichment transformations

use datafusion::error::DataFusionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Static arguments rejected before any row is processed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("datafusion: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
