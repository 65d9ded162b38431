//! View projection
//!
//! A read-only snapshot of the controller, rebuilt after every handled
//! event. Rendering never sees partially-applied transitions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::TurnState;
use crate::animator::ActivityLevels;
use crate::error::{Error, ErrorKind};

/// Light or dark presentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Dark,
    Light,
}

impl DisplayMode {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

/// A transient, non-fatal error shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&Error> for Notice {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

/// What rendering sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub state: TurnState,
    pub listening: bool,
    pub transcript: String,
    pub reply: String,
    pub activity_levels: ActivityLevels,
    pub display_mode: DisplayMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}

impl ViewState {
    /// Label under the indicator
    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        if self.listening {
            "Listening..."
        } else {
            "Not Listening"
        }
    }

    /// Whether "start listening" should be offered
    #[must_use]
    pub const fn can_start(&self) -> bool {
        !self.listening
    }

    /// Whether "stop listening" should be offered
    #[must_use]
    pub const fn can_stop(&self) -> bool {
        self.listening
    }
}
