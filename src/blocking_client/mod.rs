use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::Result;
use crate::cancel::{StopFlag, StopSignal};
use crate::error::Error;
use crate::metrics::{SessionMetrics, SessionMetricsSnapshot};
use crate::retry::RetryPolicy;
use crate::tls::TlsBackend;
use crate::util::{lock_unpoisoned, redact_uri_for_logs};

mod assemble;
mod builder;
mod execute;
pub mod transport;

use transport::{
    Connector, LOW_SPEED_BYTES_PER_SECOND, LowSpeedLimit, Transport, TransportOptions,
};

pub use builder::SessionBuilder;

const DEFAULT_USER_AGENT: &str = concat!("reqx-session/", env!("CARGO_PKG_VERSION"));
const DEFAULT_MAX_REDIRECTS: u32 = 10;

static GLOBAL_INIT_LOCK: Mutex<()> = Mutex::new(());
static GLOBAL_INIT_DONE: AtomicBool = AtomicBool::new(false);

/// Runs the connector's process-wide setup once. A failed attempt is retried
/// on the next connect.
fn ensure_global_init(connector: &dyn Connector) -> Result<()> {
    if GLOBAL_INIT_DONE.load(Ordering::Acquire) {
        return Ok(());
    }
    let _guard = lock_unpoisoned(&GLOBAL_INIT_LOCK);
    if GLOBAL_INIT_DONE.load(Ordering::Acquire) {
        return Ok(());
    }
    connector.global_init()?;
    GLOBAL_INIT_DONE.store(true, Ordering::Release);
    Ok(())
}

struct SessionConfig {
    user_agent: String,
    recv_timeout: Option<Duration>,
    verify_tls: bool,
    upgrade_to_https: bool,
    follow_redirects: bool,
    max_redirects: u32,
    tls_backend: TlsBackend,
    retry_policy: RetryPolicy,
    fill_response_on_error: bool,
    cancel_on_stop: bool,
}

/// A blocking request engine bound to one logical server.
///
/// A session is reused across many requests. It connects lazily on the
/// first request and keeps the transport handle until [`disconnect`] or drop.
///
/// [`disconnect`]: Session::disconnect
pub struct Session {
    connector: Arc<dyn Connector>,
    stop_signal: Arc<dyn StopSignal>,
    own_stop_flag: Option<StopFlag>,
    config: SessionConfig,
    transport: Option<Box<dyn Transport>>,
    server_uri: Option<String>,
    effective_url: Option<String>,
    redirect_count: u32,
    error_description: String,
    idle_timer_started_at: Option<Instant>,
    last_request_at: Option<Instant>,
    metrics: SessionMetrics,
}

impl Session {
    /// Binds the session to `uri` and creates its transport handle.
    pub fn connect(&mut self, uri: &str) -> Result<()> {
        if self.transport.is_some() {
            return Err(Error::AlreadyConnected {
                uri: redact_uri_for_logs(uri),
            });
        }
        ensure_global_init(self.connector.as_ref())?;

        let options = self.transport_options(uri);
        let transport = self.connector.connect(&options)?;
        debug!(uri = %redact_uri_for_logs(uri), "session connected");

        self.transport = Some(transport);
        self.server_uri = Some(uri.to_owned());
        self.effective_url = Some(uri.to_owned());
        if self.idle_timer_started_at.is_none() {
            self.idle_timer_started_at = Some(Instant::now());
        }
        self.last_request_at = Some(Instant::now());
        Ok(())
    }

    /// Drops the transport handle. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        self.idle_timer_started_at = None;
        if self.transport.take().is_some() {
            debug!(
                uri = %self.server_uri.as_deref().map(redact_uri_for_logs).unwrap_or_default(),
                "session disconnected"
            );
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Time since the last request completed. `None` while disconnected.
    pub fn idle_time(&self) -> Option<Duration> {
        if self.idle_timer_started_at.is_none() {
            return None;
        }
        self.last_request_at.map(|completed_at| completed_at.elapsed())
    }

    pub fn server_uri(&self) -> Option<&str> {
        self.server_uri.as_deref()
    }

    /// URL the last exchange ended at after following redirects.
    pub fn effective_url(&self) -> Option<&str> {
        self.effective_url.as_deref()
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    /// Transport description of the last attempt. Empty after a clean exchange.
    pub fn error_description(&self) -> &str {
        &self.error_description
    }

    pub fn fill_response_on_error(&self) -> bool {
        self.config.fill_response_on_error
    }

    pub fn set_fill_response_on_error(&mut self, fill: bool) {
        self.config.fill_response_on_error = fill;
    }

    pub fn cancel_on_stop(&self) -> bool {
        self.config.cancel_on_stop
    }

    pub fn set_cancel_on_stop(&mut self, cancel: bool) {
        self.config.cancel_on_stop = cancel;
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry_policy
    }

    /// Flag polled between retries when no external stop signal was given.
    ///
    /// Raising a clone from another thread cancels the pending retries of
    /// this session.
    pub fn stop_flag(&self) -> Option<StopFlag> {
        self.own_stop_flag.clone()
    }

    pub fn metrics_snapshot(&self) -> SessionMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn transport_options(&self, uri: &str) -> TransportOptions {
        let low_speed_limit = self
            .config
            .recv_timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|window| LowSpeedLimit {
                bytes_per_second: LOW_SPEED_BYTES_PER_SECOND,
                window,
            });
        TransportOptions {
            server_uri: uri.to_owned(),
            user_agent: self.config.user_agent.clone(),
            follow_redirects: self.config.follow_redirects,
            max_redirects: self.config.max_redirects,
            verify_tls: self.config.verify_tls,
            tls_backend: self.config.tls_backend,
            low_speed_limit,
        }
    }

    fn ensure_connected(&mut self, uri: &str) -> Result<&mut (dyn Transport + 'static)> {
        if self.transport.is_none() {
            self.connect(uri)?;
        }
        self.transport
            .as_deref_mut()
            .ok_or_else(|| Error::TransportInit {
                message: "connector produced no transport handle".to_owned(),
            })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("connected", &self.is_connected())
            .field(
                "server_uri",
                &self.server_uri.as_deref().map(redact_uri_for_logs),
            )
            .field("redirect_count", &self.redirect_count)
            .finish_non_exhaustive()
    }
}
