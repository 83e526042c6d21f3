//! `reqx-session` is a blocking HTTP request engine bound to one logical server.
//!
//! A [`Session`] builds each request from a [`RequestDescriptor`], runs it
//! through a pluggable [`Transport`], folds every outcome into a
//! [`UnifiedStatus`] and retries transient failures (502, 503, transport
//! errors) after a fixed cooldown.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use reqx_session::prelude::{MemoryStream, RequestDescriptor, RetryPolicy, Session};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder()
//!         .user_agent("my-sdk/1.0")
//!         .recv_timeout(Duration::from_secs(30))
//!         .retry_policy(RetryPolicy::standard().cooldown(Duration::from_millis(500)))
//!         .build();
//!
//!     let mut descriptor = RequestDescriptor::post("https://api.example.com/v1/items")
//!         .body(MemoryStream::from_bytes(br#"{"name":"demo"}"#.to_vec())
//!             .with_media_type("application/json"))
//!         .auth_token("token-123");
//!     let mut response = MemoryStream::new();
//!
//!     let status = session.send(&mut descriptor, &mut response)?;
//!     if status.is_success() {
//!         println!("created: {}", response.text_lossy());
//!     } else {
//!         eprintln!("request failed: {status} ({})", session.error_description());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Outcomes
//!
//! - `Ok(UnifiedStatus::Http(code))`: the server answered, possibly after retries.
//! - `Ok(UnifiedStatus::ExecutionFailed)`: the transport failed without a usable status.
//! - `Ok(UnifiedStatus::Cancelled)`: the stop signal was raised between attempts.
//! - `Err(Error)`: API misuse such as an unsupported method or a sink that cannot be opened.

#[cfg(all(not(feature = "rustls"), not(feature = "native-tls")))]
compile_error!("reqx-session requires one TLS backend feature: enable `rustls` or `native-tls`");

mod blocking_client;
mod cancel;
mod error;
mod metrics;
mod request;
mod retry;
mod status;
mod stream;
mod tls;
mod util;

pub use crate::blocking_client::transport::{
    Connector, LowSpeedLimit, PreparedRequest, RequestBodyView, Transport, TransportMethod,
    TransportOptions, UreqConnector,
};
pub use crate::blocking_client::{Session, SessionBuilder};
pub use crate::cancel::{StopFlag, StopSignal};
pub use crate::error::{Error, ErrorCode, TransportErrorKind};
pub use crate::metrics::SessionMetricsSnapshot;
pub use crate::request::{HttpRequest, RequestDescriptor};
pub use crate::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_COOLDOWN, RetryPolicy};
pub use crate::status::{Completion, UnifiedStatus, classify_completion};
pub use crate::stream::{AccessMode, ContentStream, FileStream, MemoryStream};
pub use crate::tls::TlsBackend;
pub use crate::util::upgrade_to_https;

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AccessMode, ContentStream, Error, ErrorCode, FileStream, HttpRequest, MemoryStream,
        RequestDescriptor, Result, RetryPolicy, Session, SessionBuilder, SessionMetricsSnapshot,
        StopFlag, StopSignal, TlsBackend, TransportErrorKind, UnifiedStatus,
    };
}

#[cfg(test)]
mod tests;
