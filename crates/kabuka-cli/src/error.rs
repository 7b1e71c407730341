use thiserror::Error;

use kabuka_core::{MasterDataError, PipelineError, ValidationError, WarehouseError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    MasterData(#[from] MasterDataError),

    #[error(transparent)]
    Persistence(#[from] WarehouseError),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for CliError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::Persistence(error) => Self::Persistence(error),
            PipelineError::Validation(error) => Self::Validation(error),
        }
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::MasterData(_) => 2,
            Self::Persistence(_) => 3,
            Self::Logging(_) => 10,
            Self::Serialization(_) => 10,
            Self::Io(_) => 10,
        }
    }
}
