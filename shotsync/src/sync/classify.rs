use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    FileSystem,
    Quota,
    Network,
    RateLimit,
    Server,
    Unknown,
}

impl ErrorCategory {
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorCategory::Authentication | ErrorCategory::FileSystem | ErrorCategory::Quota
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::FileSystem => "file_system",
            ErrorCategory::Quota => "quota",
            ErrorCategory::Network => "network",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Server => "server",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
    pub category: ErrorCategory,
}

impl From<ErrorCategory> for Classification {
    fn from(category: ErrorCategory) -> Self {
        Self {
            retryable: category.is_retryable(),
            category,
        }
    }
}

// Checked in order; the first rule with a matching signal wins.
const RULES: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Authentication,
        &["authentication", "credentials", "permission"],
    ),
    (ErrorCategory::FileSystem, &["file not found", "path not found"]),
    (ErrorCategory::Quota, &["quota exceeded", "storage full"]),
    (ErrorCategory::Network, &["network", "connection", "timeout"]),
    (ErrorCategory::RateLimit, &["rate limit", "too many requests"]),
    (
        ErrorCategory::Server,
        &["server error", "500", "502", "503"],
    ),
];

/// Maps an error to a retry decision. A category attached at the transport
/// boundary is trusted; otherwise the message text decides.
pub fn classify(message: &str, hint: Option<ErrorCategory>) -> Classification {
    match hint {
        Some(category) => category.into(),
        None => classify_message(message),
    }
}

pub fn classify_message(message: &str) -> Classification {
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, signals)| signals.iter().any(|signal| lowered.contains(signal)))
        .map(|(category, _)| Classification::from(*category))
        .unwrap_or_else(|| ErrorCategory::Unknown.into())
}
