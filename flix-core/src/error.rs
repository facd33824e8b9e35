use thiserror::Error;

use crate::models::ItemId;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("response decoding error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Rejections surfaced synchronously to the caller, one per offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("item has no id")]
    MissingId,
    #[error("a toggle for item {0} is already in progress")]
    AlreadyPending(ItemId),
    #[error("item {0} is already a favorite")]
    AlreadyFavorite(ItemId),
    #[error("item {0} is not a favorite")]
    NotFavorite(ItemId),
    #[error("comment must be at least {min} characters, got {actual}")]
    CommentTooShort { min: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("toggle round trip failed: {0}")]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("controller task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("controller stopped")]
    Stopped,
}
