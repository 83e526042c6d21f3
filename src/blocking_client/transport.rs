use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use http::{HeaderName, HeaderValue, Method};
use tracing::trace;
use ureq::ResponseExt;

use crate::Result;
use crate::error::{Error, TransportErrorKind};
use crate::status::Completion;
use crate::tls::TlsBackend;
use crate::util::redact_uri_for_logs;

const READ_CHUNK_BYTES: usize = 16 * 1024;
const WATCHED_CHUNKS_IN_FLIGHT: usize = 4;

pub(crate) const LOW_SPEED_BYTES_PER_SECOND: u64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMethod {
    Get,
    Post,
    /// Sent verbatim as the request line method.
    Custom(&'static str),
}

impl TransportMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Custom(name) => name,
        }
    }

    pub fn carries_body(self) -> bool {
        !matches!(self, Self::Get)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestBodyView<'a> {
    /// No body is attached at all.
    None,
    /// An explicit zero-length body.
    Empty,
    Bytes(&'a [u8]),
}

impl RequestBodyView<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::None | Self::Empty => 0,
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One exchange as handed to a [`Transport`].
#[derive(Debug)]
pub struct PreparedRequest<'a> {
    pub method: TransportMethod,
    pub url: String,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: RequestBodyView<'a>,
}

impl PreparedRequest<'_> {
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.as_str().eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

/// Abort when fewer than `bytes_per_second` arrive on average over `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LowSpeedLimit {
    pub bytes_per_second: u64,
    pub window: Duration,
}

#[derive(Clone, Debug)]
pub struct TransportOptions {
    pub server_uri: String,
    pub user_agent: String,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub verify_tls: bool,
    pub tls_backend: TlsBackend,
    pub low_speed_limit: Option<LowSpeedLimit>,
}

/// A connected handle performing one blocking exchange per call.
///
/// `write` receives every body chunk and returns how many bytes it accepted.
/// Anything short of the full chunk aborts the exchange.
pub trait Transport: Send {
    fn perform(
        &mut self,
        request: &PreparedRequest<'_>,
        write: &mut dyn FnMut(&[u8]) -> usize,
    ) -> Completion;

    /// Status of the last exchange, if one was received.
    fn http_status(&self) -> Option<u16>;

    /// URL the last exchange ended at after redirects.
    fn effective_url(&self) -> Option<String>;

    fn redirect_count(&self) -> Option<u32>;
}

pub trait Connector: Send + Sync {
    /// Process-wide setup. The session calls this at most once per process.
    fn global_init(&self) -> Result<()> {
        Ok(())
    }

    fn connect(&self, options: &TransportOptions) -> Result<Box<dyn Transport>>;
}

/// Default connector backed by a blocking `ureq` agent.
#[derive(Clone, Copy, Debug, Default)]
pub struct UreqConnector;

impl Connector for UreqConnector {
    fn global_init(&self) -> Result<()> {
        #[cfg(feature = "rustls")]
        {
            // An already installed process default is fine.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }
        Ok(())
    }

    fn connect(&self, options: &TransportOptions) -> Result<Box<dyn Transport>> {
        if !options.tls_backend.is_available() {
            return Err(Error::TlsBackendUnavailable {
                backend: options.tls_backend.as_str(),
            });
        }
        Ok(Box::new(UreqTransport {
            agent: make_agent(options),
            low_speed_limit: options.low_speed_limit,
            last_status: None,
            last_uri: None,
            last_redirects: None,
        }))
    }
}

fn make_agent(options: &TransportOptions) -> ureq::Agent {
    let provider = match options.tls_backend {
        TlsBackend::Rustls => ureq::tls::TlsProvider::Rustls,
        TlsBackend::NativeTls => ureq::tls::TlsProvider::NativeTls,
    };
    let tls_config = ureq::tls::TlsConfig::builder()
        .provider(provider)
        .disable_verification(!options.verify_tls)
        .build();
    let max_redirects = if options.follow_redirects {
        options.max_redirects
    } else {
        0
    };
    let stall_timeout = options.low_speed_limit.map(|limit| limit.window);

    // One agent per handle, so every connection starts with an empty cookie jar.
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .user_agent(options.user_agent.as_str())
        .max_redirects(max_redirects)
        .save_redirect_history(true)
        .timeout_recv_response(stall_timeout)
        .tls_config(tls_config)
        .build()
        .new_agent()
}

struct UreqTransport {
    agent: ureq::Agent,
    low_speed_limit: Option<LowSpeedLimit>,
    last_status: Option<u16>,
    last_uri: Option<String>,
    last_redirects: Option<u32>,
}

impl UreqTransport {
    fn run(
        &self,
        request: &PreparedRequest<'_>,
    ) -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|source| ureq::Error::BadUri(source.to_string()))?;
        let mut builder = ureq::http::Request::builder()
            .method(method)
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            // The agent derives the framing from the body itself.
            if name == http::header::CONTENT_LENGTH {
                continue;
            }
            builder = builder.header(name, value);
        }
        match request.body {
            RequestBodyView::None => {
                let built = builder.body(()).map_err(ureq::Error::from)?;
                self.agent.run(built)
            }
            RequestBodyView::Empty => {
                let built = builder.body(Vec::<u8>::new()).map_err(ureq::Error::from)?;
                self.agent.run(built)
            }
            RequestBodyView::Bytes(bytes) => {
                let built = builder.body(bytes.to_vec()).map_err(ureq::Error::from)?;
                self.agent.run(built)
            }
        }
    }

    fn read_body(
        &self,
        response: ureq::http::Response<ureq::Body>,
        write: &mut dyn FnMut(&[u8]) -> usize,
    ) -> Completion {
        let reader = response.into_body().into_reader();
        match self.low_speed_limit {
            Some(limit) => read_watched(reader, limit, write),
            None => read_inline(reader, write),
        }
    }
}

fn read_inline(mut reader: impl Read, write: &mut dyn FnMut(&[u8]) -> usize) -> Completion {
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    let mut received = 0_u64;
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Completion::Complete,
            Ok(read) => read,
            Err(source) => return completion_from_read_error(&source, received),
        };
        received = received.saturating_add(read as u64);
        if let Some(rejected) = deliver(&chunk[..read], write) {
            return rejected;
        }
    }
}

/// Reads on a helper thread so a stalled peer cannot block past the
/// low-speed window. The helper exits once its pending read returns.
fn read_watched(
    mut reader: impl Read + Send + 'static,
    limit: LowSpeedLimit,
    write: &mut dyn FnMut(&[u8]) -> usize,
) -> Completion {
    let (sender, receiver) =
        mpsc::sync_channel::<std::io::Result<Vec<u8>>>(WATCHED_CHUNKS_IN_FLIGHT);
    let spawned = thread::Builder::new()
        .name("reqx-session-body".to_owned())
        .spawn(move || {
            let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
            loop {
                let message = match reader.read(&mut chunk) {
                    Ok(0) => return,
                    Ok(read) => Ok(chunk[..read].to_vec()),
                    Err(source) => Err(source),
                };
                let failed = message.is_err();
                if sender.send(message).is_err() || failed {
                    return;
                }
            }
        });
    if let Err(source) = spawned {
        return Completion::failed(
            TransportErrorKind::Other,
            format!("failed to start body reader: {source}"),
        );
    }

    let mut monitor = LowSpeedMonitor::new(limit);
    let mut received = 0_u64;
    loop {
        match receiver.recv_timeout(monitor.remaining()) {
            Ok(Ok(bytes)) => {
                received = received.saturating_add(bytes.len() as u64);
                if let Some(rejected) = deliver(&bytes, write) {
                    return rejected;
                }
                if let Some(description) = monitor.record(bytes.len() as u64) {
                    return Completion::failed(TransportErrorKind::LowSpeed, description);
                }
            }
            Ok(Err(source)) => return completion_from_read_error(&source, received),
            Err(RecvTimeoutError::Disconnected) => return Completion::Complete,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(description) = monitor.record(0) {
                    return Completion::failed(TransportErrorKind::LowSpeed, description);
                }
            }
        }
    }
}

fn deliver(chunk: &[u8], write: &mut dyn FnMut(&[u8]) -> usize) -> Option<Completion> {
    if write(chunk) == chunk.len() {
        return None;
    }
    Some(Completion::failed(
        TransportErrorKind::Write,
        format!("response sink rejected a {} byte chunk", chunk.len()),
    ))
}

impl Transport for UreqTransport {
    fn perform(
        &mut self,
        request: &PreparedRequest<'_>,
        write: &mut dyn FnMut(&[u8]) -> usize,
    ) -> Completion {
        self.last_status = None;
        let redacted_uri = redact_uri_for_logs(&request.url);

        let response = match self.run(request) {
            Ok(response) => response,
            Err(error) => {
                let kind = classify_ureq_transport_error(&error);
                trace!(
                    method = request.method.as_str(),
                    uri = %redacted_uri,
                    kind = %kind,
                    error = %error,
                    "exchange failed before a response arrived"
                );
                return Completion::failed(kind, error.to_string());
            }
        };

        let status = response.status().as_u16();
        self.last_status = Some(status);
        self.last_uri = Some(response.get_uri().to_string());
        self.last_redirects = response
            .get_redirect_history()
            .map(|history| u32::try_from(history.len().saturating_sub(1)).unwrap_or(u32::MAX));

        let completion = self.read_body(response, write);
        trace!(
            method = request.method.as_str(),
            uri = %redacted_uri,
            status,
            redirects = self.last_redirects.unwrap_or(0),
            completion = ?completion,
            "exchange finished"
        );
        completion
    }

    fn http_status(&self) -> Option<u16> {
        self.last_status
    }

    fn effective_url(&self) -> Option<String> {
        self.last_uri.clone()
    }

    fn redirect_count(&self) -> Option<u32> {
        self.last_redirects
    }
}

struct LowSpeedMonitor {
    limit: LowSpeedLimit,
    window_started_at: Instant,
    window_bytes: u64,
}

impl LowSpeedMonitor {
    fn new(limit: LowSpeedLimit) -> Self {
        Self {
            limit,
            window_started_at: Instant::now(),
            window_bytes: 0,
        }
    }

    /// Time left before the current window is judged.
    fn remaining(&self) -> Duration {
        self.limit
            .window
            .saturating_sub(self.window_started_at.elapsed())
    }

    fn record(&mut self, bytes: u64) -> Option<String> {
        self.window_bytes = self.window_bytes.saturating_add(bytes);
        let elapsed = self.window_started_at.elapsed();
        if elapsed < self.limit.window {
            return None;
        }
        let required = self
            .limit
            .bytes_per_second
            .saturating_mul(elapsed.as_secs().max(1));
        if self.window_bytes < required {
            return Some(format!(
                "transfer slower than {} bytes/s for {} ms",
                self.limit.bytes_per_second,
                elapsed.as_millis()
            ));
        }
        self.window_started_at = Instant::now();
        self.window_bytes = 0;
        None
    }
}

fn completion_from_read_error(source: &std::io::Error, received: u64) -> Completion {
    let unexpected_eof = source.kind() == std::io::ErrorKind::UnexpectedEof
        || matches!(
            wrapped_ureq_error(source),
            Some(ureq::Error::Io(inner)) if inner.kind() == std::io::ErrorKind::UnexpectedEof
        );
    if unexpected_eof {
        return Completion::PartialFile {
            description: format!("transfer closed after {received} bytes: {source}"),
        };
    }
    let kind = match wrapped_ureq_error(source) {
        Some(error) => classify_ureq_transport_error(error),
        None => TransportErrorKind::Read,
    };
    Completion::failed(kind, source.to_string())
}

pub(crate) fn classify_ureq_transport_error(error: &ureq::Error) -> TransportErrorKind {
    match error {
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::Tls(_) => TransportErrorKind::Tls,
        #[cfg(feature = "rustls")]
        ureq::Error::Rustls(_) => TransportErrorKind::Tls,
        #[cfg(feature = "native-tls")]
        ureq::Error::NativeTls(_) => TransportErrorKind::Tls,
        ureq::Error::ConnectProxyFailed(_) | ureq::Error::ConnectionFailed => {
            TransportErrorKind::Connect
        }
        ureq::Error::Io(source) => match source.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportErrorKind::Timeout
            }
            std::io::ErrorKind::NotFound => TransportErrorKind::Dns,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::Read,
            _ => TransportErrorKind::Other,
        },
        _ => TransportErrorKind::Other,
    }
}

fn wrapped_ureq_error(io_error: &std::io::Error) -> Option<&ureq::Error> {
    io_error
        .get_ref()
        .and_then(|source| source.downcast_ref::<ureq::Error>())
}
