use reqwest::StatusCode;
use thiserror::Error;

/// Failures of a single REST round trip against the meeting backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("request to {path} failed with status {status}: {message}")]
    Status {
        path: String,
        status: StatusCode,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModerationError {
    /// The room data has not been fetched yet, nothing was sent.
    #[error("room id is not available")]
    RoomUnavailable,

    #[error("room media connection is not available")]
    MediaBackendUnavailable,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to publish notification: {0}")]
    Publish(String),
}

#[derive(Debug, Error)]
pub enum PipError {
    #[error("picture-in-picture is not supported by this host")]
    Unsupported,

    #[error("host refused to open a picture-in-picture window: {0}")]
    Host(String),

    #[error("failed to mount the picture-in-picture view: {0}")]
    Mount(String),
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to create local {kind} track: {reason}")]
    Create { kind: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown panel {0:?}")]
pub struct UnknownPanel(pub String);
