//! Menu selections

use serde::Serialize;

/// What the caller picked from the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MenuSelection {
    /// `1`: hear the hours of operation
    Hours,
    /// `2`: leave a voicemail
    Voicemail,
    /// `9`: hear the menu again
    Repeat,
    /// `0`: end the call
    Hangup,
    /// Anything else, including no input
    Invalid,
}

impl MenuSelection {
    pub fn from_digits(digits: Option<&str>) -> Self {
        match digits {
            Some("1") => Self::Hours,
            Some("2") => Self::Voicemail,
            Some("9") => Self::Repeat,
            Some("0") => Self::Hangup,
            _ => Self::Invalid,
        }
    }
}
