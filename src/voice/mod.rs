//! Voice Calls Module
//!
//! Call-control boundary used by the IVR. The [`Call`] trait is what the
//! handler talks to; [`RelayClient`] implements it on top of the SignalWire
//! RELAY websocket API.

pub mod call;
pub mod config;
pub mod protocol;
pub mod relay;

pub use call::*;
pub use config::*;
pub use relay::{RelayCall, RelayClient};

use thiserror::Error;

/// Voice module errors
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{method} rejected by RELAY ({code}): {message}")]
    Rejected {
        method: String,
        code: String,
        message: String,
    },

    #[error("RELAY request timed out: {0}")]
    Timeout(String),

    #[error("Call ended before {0} completed")]
    CallEnded(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Digit collection failed: {0}")]
    Collect(String),

    #[error("Recording failed: {0}")]
    Recording(String),

    #[error("RELAY connection closed")]
    Disconnected,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for voice operations
pub type Result<T> = std::result::Result<T, VoiceError>;
