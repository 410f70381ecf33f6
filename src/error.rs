use reqwest::StatusCode;
use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("order not found")]
    NotFound,
    #[error("not authorized to view this order")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(String),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl TrackError {
    /// NotFound and Unauthorized end autonomous scheduling for the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unauthorized)
    }
}

impl From<reqwest::Error> for TrackError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            return match status {
                StatusCode::NOT_FOUND => Self::NotFound,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized,
                other => Self::Unknown(format!("unexpected http status {other}")),
            };
        }
        if value.is_timeout() || value.is_connect() {
            return Self::Network(value.to_string());
        }
        if value.is_decode() {
            return Self::Unknown(format!("snapshot decode failed: {value}"));
        }
        Self::Network(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TrackError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

impl serde::Serialize for TrackError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
