//! IVR prompts and timing

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GREETING: &str = "Hello. Thank you for calling. Please listen carefully, \
as the following prompt may contain new options.";

pub const DEFAULT_MENU: &str = "Press 1 to hear our hours of operation. \
Press 2 to leave a voice message. \
Press 9 to hear these options again. \
Press 0 if done, or hang up to disconnect the call.";

pub const DEFAULT_HOURS: &str = "Our current hours of operation are from 8 AM, to just after 9 AM. \
If you need to reach us outside of these hours, please hang up and call again later.";

pub const DEFAULT_RECORD_PROMPT: &str =
    "Please record your message after the tone. When you are finished, you may hang up.";

/// IVR configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IvrConfig {
    /// Played once after answering
    pub greeting: String,
    /// Menu read while collecting a digit
    pub menu: String,
    /// Played for option 1
    pub hours: String,
    /// Played for option 2 before recording
    pub record_prompt: String,
    /// Seconds allowed per collected digit
    pub digit_timeout_secs: u64,
    /// Seconds between the record prompt and the start of recording
    pub record_delay_secs: u64,
    /// Digits that stop a voicemail recording
    pub record_terminators: String,
    /// Finished calls kept in the call registry
    pub history_limit: usize,
}

impl Default for IvrConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            menu: DEFAULT_MENU.to_string(),
            hours: DEFAULT_HOURS.to_string(),
            record_prompt: DEFAULT_RECORD_PROMPT.to_string(),
            digit_timeout_secs: 15,
            record_delay_secs: 7,
            record_terminators: "0".to_string(),
            history_limit: 100,
        }
    }
}

impl IvrConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, text) in [
            ("greeting", &self.greeting),
            ("menu", &self.menu),
            ("hours", &self.hours),
            ("recordPrompt", &self.record_prompt),
        ] {
            if text.trim().is_empty() {
                return Err(format!("IVR {} message must not be empty", name));
            }
        }

        if self.digit_timeout_secs == 0 {
            return Err("IVR digit timeout must be at least one second".to_string());
        }

        Ok(())
    }

    pub fn digit_timeout(&self) -> Duration {
        Duration::from_secs(self.digit_timeout_secs)
    }

    pub fn record_delay(&self) -> Duration {
        Duration::from_secs(self.record_delay_secs)
    }
}
