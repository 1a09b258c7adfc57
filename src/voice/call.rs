//! Call handle and call-control types
//!
//! Everything the IVR does to a live call goes through the [`Call`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::Result;

/// Call state as reported by the telephony platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Call object exists but has not rung yet
    Created,
    /// Call is ringing
    Ringing,
    /// Call was answered
    Answered,
    /// Call is being torn down
    Ending,
    /// Call is over
    Ended,
}

impl CallState {
    /// Parse a platform state string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "ringing" => Some(Self::Ringing),
            "answered" => Some(Self::Answered),
            "ending" => Some(Self::Ending),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }

    pub fn is_ended(self) -> bool {
        self == Self::Ended
    }
}

/// Condition a caller can suspend on with [`Call::wait_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCondition {
    Answered,
    Ending,
    Ended,
}

impl CallCondition {
    /// Whether the given state satisfies this condition
    pub fn is_satisfied_by(self, state: CallState) -> bool {
        match self {
            Self::Answered => matches!(
                state,
                CallState::Answered | CallState::Ending | CallState::Ended
            ),
            Self::Ending => matches!(state, CallState::Ending | CallState::Ended),
            Self::Ended => state == CallState::Ended,
        }
    }
}

/// Digit collection settings for [`Call::prompt_tts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    /// Maximum number of digits to collect
    pub digit_count: u32,
    /// Time allowed between digits
    pub per_digit_timeout: Duration,
    /// Digits that end collection early
    pub terminators: Option<String>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            digit_count: 1,
            per_digit_timeout: Duration::from_secs(15),
            terminators: None,
        }
    }
}

/// Outcome of a prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptResult {
    /// Collected digits; `None` when the caller pressed nothing usable
    pub digits: Option<String>,
    /// Terminator digit, if one ended collection
    pub terminator: Option<String>,
}

impl PromptResult {
    pub fn digits(digits: impl Into<String>) -> Self {
        Self {
            digits: Some(digits.into()),
            terminator: None,
        }
    }

    pub fn no_input() -> Self {
        Self::default()
    }
}

/// Recording settings for [`Call::record_audio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    /// Play a beep before recording starts
    pub beep: bool,
    /// Digits that stop the recording
    pub terminators: String,
}

/// A started TTS playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playback {
    pub control_id: String,
}

/// A finished audio capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Control ID of the record operation
    pub id: String,
    /// Where the platform stored the audio
    pub url: String,
    /// Length in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

/// A live call, borrowed by the IVR for the duration of its task.
///
/// Every operation is a remote call against the platform. Implementations
/// must resolve `play_tts` once the platform accepted the playback and
/// `prompt_tts`/`record_audio` once the platform reported their result.
#[async_trait]
pub trait Call: Send + Sync {
    /// Platform call ID
    fn id(&self) -> &str;

    /// Origin address of the caller
    fn from(&self) -> &str;

    /// Dialed address
    fn to(&self) -> &str;

    async fn answer(&self) -> Result<()>;

    /// Start text-to-speech playback
    async fn play_tts(&self, text: &str) -> Result<Playback>;

    /// Suspend until a playback started with `play_tts` has finished
    async fn wait_for_playback(&self, playback: &Playback) -> Result<()>;

    /// Play text and collect digits
    async fn prompt_tts(&self, text: &str, options: &PromptOptions) -> Result<PromptResult>;

    /// Record audio until a terminator digit, silence or hangup
    async fn record_audio(&self, options: &RecordOptions) -> Result<Recording>;

    async fn hangup(&self) -> Result<()>;

    /// Suspend until the call reaches the given condition
    async fn wait_for(&self, condition: CallCondition) -> Result<()>;
}

/// Stream of inbound calls delivered by a voice client
pub type IncomingCalls = mpsc::Receiver<Arc<dyn Call>>;

/// Producer side of [`IncomingCalls`]
pub type CallSender = mpsc::Sender<Arc<dyn Call>>;
