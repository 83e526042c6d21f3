use http::StatusCode;

use crate::error::TransportErrorKind;

/// Result of one request, covering real HTTP codes and engine-level outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnifiedStatus {
    /// Status reported by the transport. `0` means the transport completed
    /// without ever receiving a status line.
    Http(u16),
    /// The exchange failed and the transport had no trustworthy status.
    ExecutionFailed,
    /// A stop was requested between attempts.
    Cancelled,
}

impl UnifiedStatus {
    pub const OK: Self = Self::Http(200);
    pub const BAD_GATEWAY: Self = Self::Http(502);
    pub const SERVICE_UNAVAILABLE: Self = Self::Http(503);

    pub fn is_success(self) -> bool {
        matches!(self, Self::Http(code) if (200..300).contains(&code))
    }

    pub fn http_code(self) -> Option<u16> {
        match self {
            Self::Http(code) => Some(code),
            Self::ExecutionFailed | Self::Cancelled => None,
        }
    }

    pub fn as_status_code(self) -> Option<StatusCode> {
        self.http_code()
            .and_then(|code| StatusCode::from_u16(code).ok())
    }
}

impl std::fmt::Display for UnifiedStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(code) => {
                let reason = StatusCode::from_u16(*code)
                    .ok()
                    .and_then(|status| status.canonical_reason());
                match reason {
                    Some(reason) => write!(formatter, "{code} {reason}"),
                    None => write!(formatter, "{code}"),
                }
            }
            Self::ExecutionFailed => formatter.write_str("transport execution failed"),
            Self::Cancelled => formatter.write_str("cancelled"),
        }
    }
}

/// Raw completion of one transport exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    Complete,
    /// The transfer ended before the final chunk arrived.
    PartialFile { description: String },
    Failed {
        kind: TransportErrorKind,
        description: String,
    },
}

impl Completion {
    pub fn failed(kind: TransportErrorKind, description: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            description: description.into(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Complete => None,
            Self::PartialFile { description } | Self::Failed { description, .. } => {
                Some(description)
            }
        }
    }
}

/// Maps a transport completion and the status it reported to a [`UnifiedStatus`].
///
/// A partial transfer keeps the reported status; body integrity is left to a
/// higher layer. A failed exchange that still claims `200` (or no status at
/// all) becomes [`UnifiedStatus::ExecutionFailed`].
pub fn classify_completion(completion: &Completion, http_status: Option<u16>) -> UnifiedStatus {
    let reported = http_status.unwrap_or(0);
    match completion {
        Completion::Complete | Completion::PartialFile { .. } => UnifiedStatus::Http(reported),
        Completion::Failed { .. } => {
            if reported == 0 || reported == 200 {
                UnifiedStatus::ExecutionFailed
            } else {
                UnifiedStatus::Http(reported)
            }
        }
    }
}
