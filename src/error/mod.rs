use crate::config::ConfigError;
use crate::extract::{DecodeError, ExtractError};
use crate::session::SessionFailure;
use crate::state::StateError;
use thiserror::Error;

pub type CropResult<T> = std::result::Result<T, CropError>;

#[derive(Debug, Error)]
pub enum CropError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionFailure),
}
