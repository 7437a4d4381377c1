// Service Errors
// Failures while loading service configuration

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
