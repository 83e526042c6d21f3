use http::Method;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Write,
    Timeout,
    LowSpeed,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Write => "write",
            Self::Timeout => "timeout",
            Self::LowSpeed => "low_speed",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    AlreadyConnected,
    UnsupportedMethod,
    EmptyHeaderList,
    InvalidHeaderValue,
    OpenResponseSink,
    ResetResponseSink,
    TransportInit,
    TlsBackendUnavailable,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyConnected => "already_connected",
            Self::UnsupportedMethod => "unsupported_method",
            Self::EmptyHeaderList => "empty_header_list",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::OpenResponseSink => "open_response_sink",
            Self::ResetResponseSink => "reset_response_sink",
            Self::TransportInit => "transport_init",
            Self::TlsBackendUnavailable => "tls_backend_unavailable",
        }
    }
}

/// Misuse of the session API.
///
/// These are never retried. Transport failures and HTTP error statuses are
/// not errors: they come back as a [`UnifiedStatus`](crate::UnifiedStatus)
/// together with [`Session::error_description`](crate::Session::error_description).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("session is already connected to {uri}")]
    AlreadyConnected { uri: String },
    #[error("unsupported http method {method} for {uri}")]
    UnsupportedMethod { method: Method, uri: String },
    #[error("request header list is empty for {uri}")]
    EmptyHeaderList { uri: String },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: &'static str,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to open response sink for {uri}: {source}")]
    OpenResponseSink {
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to reset response sink before retrying {uri}: {source}")]
    ResetResponseSink {
        uri: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to initialize transport: {message}")]
    TransportInit { message: String },
    #[error("requested tls backend is not enabled in this build: {backend}")]
    TlsBackendUnavailable { backend: &'static str },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyConnected { .. } => ErrorCode::AlreadyConnected,
            Self::UnsupportedMethod { .. } => ErrorCode::UnsupportedMethod,
            Self::EmptyHeaderList { .. } => ErrorCode::EmptyHeaderList,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::OpenResponseSink { .. } => ErrorCode::OpenResponseSink,
            Self::ResetResponseSink { .. } => ErrorCode::ResetResponseSink,
            Self::TransportInit { .. } => ErrorCode::TransportInit,
            Self::TlsBackendUnavailable { .. } => ErrorCode::TlsBackendUnavailable,
        }
    }
}
