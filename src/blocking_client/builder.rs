use std::sync::Arc;
use std::time::Duration;

use crate::cancel::{StopFlag, StopSignal};
use crate::metrics::SessionMetrics;
use crate::retry::RetryPolicy;
use crate::tls::TlsBackend;

use super::transport::{Connector, UreqConnector};
use super::{DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, Session, SessionConfig};

pub struct SessionBuilder {
    connector: Arc<dyn Connector>,
    stop_signal: Arc<dyn StopSignal>,
    own_stop_flag: Option<StopFlag>,
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

impl SessionBuilder {
    pub(crate) fn new() -> Self {
        let own_stop_flag = StopFlag::new();
        Self {
            connector: Arc::new(UreqConnector),
            stop_signal: Arc::new(own_stop_flag.clone()),
            own_stop_flag: Some(own_stop_flag),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            recv_timeout: None,
            verify_tls: false,
            upgrade_to_https: true,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            tls_backend: TlsBackend::default(),
            retry_policy: RetryPolicy::standard(),
            fill_response_on_error: false,
            cancel_on_stop: true,
        }
    }

    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replaces the session's own [`StopFlag`]. After this,
    /// [`Session::stop_flag`] returns `None` and only `stop_signal` can cancel
    /// retries.
    pub fn stop_signal(mut self, stop_signal: Arc<dyn StopSignal>) -> Self {
        self.stop_signal = stop_signal;
        self.own_stop_flag = None;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Aborts a transfer that stays below 50 bytes/s for this long.
    pub fn recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = Some(recv_timeout);
        self
    }

    pub fn verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Rewrites `http://` request URIs to `https://` before sending.
    pub fn upgrade_to_https(mut self, upgrade: bool) -> Self {
        self.upgrade_to_https = upgrade;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn tls_backend(mut self, tls_backend: TlsBackend) -> Self {
        self.tls_backend = tls_backend;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn fill_response_on_error(mut self, fill: bool) -> Self {
        self.fill_response_on_error = fill;
        self
    }

    pub fn cancel_on_stop(mut self, cancel: bool) -> Self {
        self.cancel_on_stop = cancel;
        self
    }

    pub fn build(self) -> Session {
        Session {
            connector: self.connector,
            stop_signal: self.stop_signal,
            own_stop_flag: self.own_stop_flag,
            config: SessionConfig {
                user_agent: self.user_agent,
                recv_timeout: self.recv_timeout,
                verify_tls: self.verify_tls,
                upgrade_to_https: self.upgrade_to_https,
                follow_redirects: self.follow_redirects,
                max_redirects: self.max_redirects,
                tls_backend: self.tls_backend,
                retry_policy: self.retry_policy,
                fill_response_on_error: self.fill_response_on_error,
                cancel_on_stop: self.cancel_on_stop,
            },
            transport: None,
            server_uri: None,
            effective_url: None,
            redirect_count: 0,
            error_description: String::new(),
            idle_timer_started_at: None,
            last_request_at: None,
            metrics: SessionMetrics::default(),
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// A session over the default `ureq` transport.
    pub fn new() -> Self {
        SessionBuilder::new().build()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
