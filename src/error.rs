use std::result;

use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
pub enum Error {
    #[error("{0}")]
    Telegram(String),
    #[error("{0}")]
    Database(String),
    #[error("{0}")]
    Cache(String),
    #[error("{0}")]
    Giveaway(String),
    #[error("{0}")]
    Draw(DrawError),
    #[error("{0}")]
    Publish(PublishError),
}

// Failures of the draw step. Kept as a separate enum so the owner-facing
// handlers can tell a retryable precondition from a state conflict.
#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
pub enum DrawError {
    #[error("The giveaway must be ended before drawing winners (current status: {0}).")]
    InvalidStatus(String),
    #[error("Not enough eligible entries: {eligible} eligible, {required} required.")]
    NotEnoughEligible { eligible: u32, required: u32 },
    #[error("Winners have already been drawn for this giveaway.")]
    AlreadyDrawn,
}

// Failures of the publish step that are real errors. Losing the publish
// race is not among them: that case is reported as a regular outcome.
#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
pub enum PublishError {
    #[error("Winners must be drawn before publishing results (current status: {0}).")]
    InvalidStatus(String),
    #[error("The giveaway has no publish channel attached.")]
    MissingChannel,
}

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Error {
        Error::Telegram(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Error {
        Error::Database(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Error {
        Error::Cache(err.to_string())
    }
}

impl From<DrawError> for Error {
    fn from(err: DrawError) -> Error {
        Error::Draw(err)
    }
}

impl From<PublishError> for Error {
    fn from(err: PublishError) -> Error {
        Error::Publish(err)
    }
}
