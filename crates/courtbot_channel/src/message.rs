use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An out-of-band notification (e.g. a scheduled reminder) that is not a
/// reply to a conversation turn.
///
/// Every adapter sees every notification and decides for itself whether
/// `communication_type` addresses it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NonReplyMessage {
    pub communication_type: String,      // e.g. "console", "sms"
    pub msg: String,
    pub recipient: Option<String>,       // phone number, tty, ... when the channel needs one
    pub timestamp: DateTime<Utc>,
}

impl NonReplyMessage {
    pub fn new(communication_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            communication_type: communication_type.into(),
            msg: msg.into(),
            recipient: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Is this notification meant for the given communication type?
    pub fn is_for(&self, communication_type: &str) -> bool {
        self.communication_type == communication_type
    }
}

/// What log levels are supported?
/// Higher‐value variants are more severe.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

impl LogLevel {
    /// The `EnvFilter` directive matching this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl From<&str> for LogLevel {
    fn from(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "critical" => LogLevel::Critical,
            _ => LogLevel::Info,
        }
    }
}
