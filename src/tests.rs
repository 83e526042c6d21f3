use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http::Method;

use crate::blocking_client::transport::{
    Connector, PreparedRequest, RequestBodyView, Transport, TransportMethod, TransportOptions,
};
use crate::cancel::StopFlag;
use crate::error::{ErrorCode, TransportErrorKind};
use crate::request::{HttpRequest, RequestDescriptor};
use crate::retry::RetryPolicy;
use crate::status::{Completion, UnifiedStatus};
use crate::stream::{AccessMode, ContentStream, MemoryStream};
use crate::{Result, Session};

static GLOBAL_INIT_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone, Debug)]
struct Step {
    completion: Completion,
    status: Option<u16>,
    body: Vec<u8>,
    effective_url: Option<String>,
    redirects: Option<u32>,
}

impl Step {
    fn status(code: u16, body: &[u8]) -> Self {
        Self {
            completion: Completion::Complete,
            status: Some(code),
            body: body.to_vec(),
            effective_url: None,
            redirects: None,
        }
    }

    fn failed(kind: TransportErrorKind, status: Option<u16>, description: &str) -> Self {
        Self {
            completion: Completion::failed(kind, description),
            status,
            body: Vec::new(),
            effective_url: None,
            redirects: None,
        }
    }

    fn partial(code: u16, body: &[u8]) -> Self {
        Self {
            completion: Completion::PartialFile {
                description: "transfer closed with bytes remaining".to_owned(),
            },
            ..Self::status(code, body)
        }
    }

    fn redirected(mut self, effective_url: &str, redirects: u32) -> Self {
        self.effective_url = Some(effective_url.to_owned());
        self.redirects = Some(redirects);
        self
    }
}

#[derive(Debug)]
struct RecordedRequest {
    method: TransportMethod,
    url: String,
    headers: Vec<(String, String)>,
    body: RecordedBody,
    at: Instant,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RecordedBody {
    None,
    Empty,
    Bytes(Vec<u8>),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    requests: Vec<RecordedRequest>,
    connects: Vec<TransportOptions>,
    stop_after_attempt: Option<(usize, StopFlag)>,
}

#[derive(Clone, Default)]
struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let connector = Self::default();
        connector.script().steps.extend(steps);
        connector
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("script lock should not be poisoned")
    }

    fn attempts(&self) -> usize {
        self.script().requests.len()
    }

    fn stop_after_attempt(&self, attempt: usize, flag: StopFlag) {
        self.script().stop_after_attempt = Some((attempt, flag));
    }
}

impl Connector for ScriptedConnector {
    fn global_init(&self) -> Result<()> {
        GLOBAL_INIT_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn connect(&self, options: &TransportOptions) -> Result<Box<dyn Transport>> {
        self.script().connects.push(options.clone());
        Ok(Box::new(ScriptedTransport {
            script: Arc::clone(&self.script),
            last: None,
        }))
    }
}

struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
    last: Option<Step>,
}

impl Transport for ScriptedTransport {
    fn perform(
        &mut self,
        request: &PreparedRequest<'_>,
        write: &mut dyn FnMut(&[u8]) -> usize,
    ) -> Completion {
        let mut script = self.script.lock().expect("script lock should not be poisoned");
        script.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        value.to_str().unwrap_or_default().to_owned(),
                    )
                })
                .collect(),
            body: match request.body {
                RequestBodyView::None => RecordedBody::None,
                RequestBodyView::Empty => RecordedBody::Empty,
                RequestBodyView::Bytes(bytes) => RecordedBody::Bytes(bytes.to_vec()),
            },
            at: Instant::now(),
        });
        let attempt = script.requests.len() - 1;
        if let Some((stop_at, flag)) = &script.stop_after_attempt
            && *stop_at == attempt
        {
            flag.request_stop();
        }
        let step = script.steps.pop_front().unwrap_or_else(|| {
            Step::failed(TransportErrorKind::Other, None, "script exhausted")
        });
        drop(script);

        let body = step.body.clone();
        let (head, tail) = body.split_at(body.len() / 2);
        for chunk in [head, tail] {
            if write(chunk) != chunk.len() {
                let completion = Completion::failed(TransportErrorKind::Write, "sink rejected chunk");
                self.last = Some(Step {
                    completion: completion.clone(),
                    ..step
                });
                return completion;
            }
        }
        let completion = step.completion.clone();
        self.last = Some(step);
        completion
    }

    fn http_status(&self) -> Option<u16> {
        self.last.as_ref().and_then(|step| step.status)
    }

    fn effective_url(&self) -> Option<String> {
        self.last.as_ref().and_then(|step| step.effective_url.clone())
    }

    fn redirect_count(&self) -> Option<u32> {
        self.last.as_ref().and_then(|step| step.redirects)
    }
}

/// Memory sink that records every truncation and can refuse to open or write.
#[derive(Default)]
struct RecordingSink {
    inner: MemoryStream,
    resets: Vec<u64>,
    fail_open: bool,
    fail_write: bool,
}

impl RecordingSink {
    fn bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }
}

impl ContentStream for RecordingSink {
    fn set_access_mode(&mut self, mode: AccessMode) {
        self.inner.set_access_mode(mode);
    }

    fn access_mode(&self) -> AccessMode {
        self.inner.access_mode()
    }

    fn open(&mut self) -> io::Result<()> {
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.inner.open()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn map(&mut self) -> Option<&[u8]> {
        self.inner.map()
    }

    fn unmap(&mut self) {
        self.inner.unmap();
    }

    fn set_size(&mut self, size: u64) -> io::Result<()> {
        self.resets.push(size);
        self.inner.set_size(size)
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.fail_write {
            return Err(io::Error::other("disk full"));
        }
        self.inner.write(chunk)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn media_type(&self) -> Option<&str> {
        self.inner.media_type()
    }
}

fn session_for(connector: &ScriptedConnector) -> Session {
    Session::builder()
        .connector(connector.clone())
        .retry_policy(RetryPolicy::standard().cooldown(Duration::ZERO))
        .build()
}

#[test]
fn session_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Session>();
}

#[test]
fn transient_status_runs_max_retries_plus_one_attempts() {
    let connector = ScriptedConnector::with_steps((0..6).map(|_| Step::status(503, b"busy")));
    let mut session = session_for(&connector);
    let mut sink = RecordingSink::default();

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/b"), &mut sink, 4)
        .expect("transient statuses are not fatal");

    assert_eq!(status, UnifiedStatus::SERVICE_UNAVAILABLE);
    assert_eq!(connector.attempts(), 5);
    assert_eq!(sink.resets, vec![0, 0, 0, 0, 0]);
}

#[test]
fn retries_until_success_and_keeps_only_final_body() {
    let connector = ScriptedConnector::with_steps([
        Step::status(503, b"first"),
        Step::status(503, b"second"),
        Step::status(200, b"third"),
    ]);
    let mut session = session_for(&connector);
    let mut sink = RecordingSink::default();

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("http://a/b"), &mut sink, 2)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(connector.attempts(), 3);
    assert_eq!(sink.bytes(), b"third");
    assert_eq!(sink.resets, vec![0, 0]);
    assert!(!sink.is_open());
}

#[test]
fn exhausted_budget_returns_last_transient_status() {
    let connector = ScriptedConnector::with_steps([
        Step::status(503, b"first"),
        Step::status(503, b"second"),
        Step::status(200, b"third"),
    ]);
    let mut session = session_for(&connector);
    let mut sink = RecordingSink::default();

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("http://a/b"), &mut sink, 1)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::SERVICE_UNAVAILABLE);
    assert_eq!(connector.attempts(), 2);
}

#[test]
fn send_request_uses_policy_budget() {
    let connector = ScriptedConnector::with_steps([
        Step::status(502, b""),
        Step::status(503, b""),
        Step::status(200, b"ok"),
    ]);
    let mut session = Session::builder()
        .connector(connector.clone())
        .retry_policy(
            RetryPolicy::standard()
                .max_retries(2)
                .cooldown(Duration::ZERO),
        )
        .build();
    let mut sink = MemoryStream::new();

    let status = session
        .send_request(Method::GET, "http://a/b", &mut sink)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(sink.as_bytes(), b"ok");
    assert_eq!(connector.attempts(), 3);
}

#[test]
fn non_transient_statuses_are_not_retried() {
    for code in [200_u16, 404, 500, 504] {
        let connector = ScriptedConnector::with_steps([Step::status(code, b""), Step::status(200, b"")]);
        let mut session = session_for(&connector);
        let status = session
            .send(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new())
            .expect("request should complete");
        assert_eq!(status, UnifiedStatus::Http(code));
        assert_eq!(connector.attempts(), 1, "status {code} must not be retried");
    }
}

#[test]
fn cooldown_separates_attempts() {
    let cooldown = Duration::from_millis(20);
    let connector = ScriptedConnector::with_steps([
        Step::status(503, b""),
        Step::status(503, b""),
        Step::status(503, b""),
    ]);
    let mut session = Session::builder()
        .connector(connector.clone())
        .retry_policy(RetryPolicy::standard().cooldown(cooldown))
        .build();

    session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new(), 2)
        .expect("request should complete");

    let script = connector.script();
    assert_eq!(script.requests.len(), 3);
    for pair in script.requests.windows(2) {
        assert!(pair[1].at.duration_since(pair[0].at) >= cooldown);
    }
}

#[test]
fn stop_signal_cancels_between_attempts() {
    let stop = StopFlag::new();
    let connector = ScriptedConnector::with_steps((0..4).map(|_| Step::status(503, b"busy")));
    connector.stop_after_attempt(0, stop.clone());
    let mut session = Session::builder()
        .connector(connector.clone())
        .stop_signal(Arc::new(stop))
        .retry_policy(RetryPolicy::standard().cooldown(Duration::ZERO))
        .build();
    let mut sink = RecordingSink::default();

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/"), &mut sink, 3)
        .expect("cancellation is not fatal");

    assert_eq!(status, UnifiedStatus::Cancelled);
    assert_eq!(connector.attempts(), 1);
    assert!(sink.resets.is_empty());
    assert!(session.idle_time().is_some());
    assert_eq!(session.metrics_snapshot().requests_cancelled, 1);
}

#[test]
fn first_attempt_runs_even_when_stop_is_already_requested() {
    let stop = StopFlag::new();
    stop.request_stop();
    let connector = ScriptedConnector::with_steps([Step::status(200, b"done")]);
    let mut session = Session::builder()
        .connector(connector.clone())
        .stop_signal(Arc::new(stop))
        .build();
    let mut sink = MemoryStream::new();

    let status = session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut sink)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(sink.as_bytes(), b"done");
}

#[test]
fn stop_signal_is_ignored_when_cancel_on_stop_is_off() {
    let stop = StopFlag::new();
    stop.request_stop();
    let connector = ScriptedConnector::with_steps([
        Step::status(503, b""),
        Step::status(503, b""),
        Step::status(200, b"done"),
    ]);
    let mut session = Session::builder()
        .connector(connector.clone())
        .stop_signal(Arc::new(stop))
        .cancel_on_stop(false)
        .retry_policy(RetryPolicy::standard().cooldown(Duration::ZERO))
        .build();

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new(), 2)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(connector.attempts(), 3);
}

#[test]
fn effective_url_and_redirects_update_only_when_reported() {
    let connector = ScriptedConnector::with_steps([
        Step::status(200, b"").redirected("https://a.test/final", 2),
        Step::status(200, b""),
    ]);
    let mut session = session_for(&connector);

    session
        .send(&mut RequestDescriptor::get("https://a.test/start"), &mut MemoryStream::new())
        .expect("first request");
    assert_eq!(session.effective_url(), Some("https://a.test/final"));
    assert_eq!(session.redirect_count(), 2);

    session
        .send(&mut RequestDescriptor::get("https://a.test/other"), &mut MemoryStream::new())
        .expect("second request");
    assert_eq!(session.effective_url(), Some("https://a.test/final"));
    assert_eq!(session.redirect_count(), 2);
}

#[test]
fn http_uris_are_upgraded_by_default() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = session_for(&connector);
    session
        .send(&mut RequestDescriptor::get("http://a.test/x"), &mut MemoryStream::new())
        .expect("request should complete");
    assert_eq!(connector.script().requests[0].url, "https://a.test/x");
}

#[test]
fn upgrade_can_be_disabled() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = Session::builder()
        .connector(connector.clone())
        .upgrade_to_https(false)
        .build();
    session
        .send(&mut RequestDescriptor::get("http://a.test/x"), &mut MemoryStream::new())
        .expect("request should complete");
    assert_eq!(connector.script().requests[0].url, "http://a.test/x");
}

#[test]
fn partial_transfer_with_ok_status_is_ok() {
    let connector = ScriptedConnector::with_steps([Step::partial(200, b"trunc")]);
    let mut session = session_for(&connector);
    let mut sink = MemoryStream::new();

    let status = session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut sink)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(connector.attempts(), 1);
    assert_eq!(sink.as_bytes(), b"trunc");
    assert_eq!(session.error_description(), "transfer closed with bytes remaining");
    assert_eq!(session.metrics_snapshot().partial_transfers, 1);
}

#[test]
fn failure_claiming_ok_becomes_execution_failed() {
    let connector = ScriptedConnector::with_steps([Step::failed(
        TransportErrorKind::Read,
        Some(200),
        "connection reset by peer",
    )]);
    let mut session = session_for(&connector);

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new(), 0)
        .expect("transport failure is not fatal");

    assert_eq!(status, UnifiedStatus::ExecutionFailed);
    assert_eq!(session.error_description(), "connection reset by peer");
}

#[test]
fn execution_failures_are_retried() {
    let connector = ScriptedConnector::with_steps([
        Step::failed(TransportErrorKind::Connect, None, "connection refused"),
        Step::status(200, b"up"),
    ]);
    let mut session = session_for(&connector);
    let mut sink = MemoryStream::new();

    let status = session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut sink)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(sink.as_bytes(), b"up");
    assert_eq!(session.error_description(), "");
}

#[test]
fn failure_with_meaningful_status_keeps_the_status() {
    let connector = ScriptedConnector::with_steps([Step::failed(
        TransportErrorKind::Read,
        Some(404),
        "connection reset by peer",
    )]);
    let mut session = session_for(&connector);

    let status = session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new())
        .expect("transport failure is not fatal");

    assert_eq!(status, UnifiedStatus::Http(404));
    assert_eq!(connector.attempts(), 1);
}

#[test]
fn sink_write_failure_aborts_the_attempt() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"payload")]);
    let mut session = session_for(&connector);
    let mut sink = RecordingSink {
        fail_write: true,
        ..RecordingSink::default()
    };

    let status = session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/"), &mut sink, 0)
        .expect("sink write failure is not fatal");

    assert_eq!(status, UnifiedStatus::ExecutionFailed);
    assert!(!sink.is_open());
}

#[test]
fn unsupported_method_is_fatal() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = session_for(&connector);

    let error = session
        .send(
            &mut RequestDescriptor::new(Method::DELETE, "https://a.test/items/1"),
            &mut MemoryStream::new(),
        )
        .expect_err("DELETE is not supported");

    assert_eq!(error.code(), ErrorCode::UnsupportedMethod);
    assert_eq!(connector.attempts(), 0);
}

#[test]
fn connecting_twice_is_fatal() {
    let connector = ScriptedConnector::default();
    let mut session = session_for(&connector);
    session.connect("https://a.test/").expect("first connect");
    let error = session
        .connect("https://a.test/")
        .expect_err("second connect must fail");
    assert_eq!(error.code(), ErrorCode::AlreadyConnected);
    assert_eq!(connector.script().connects.len(), 1);
}

#[test]
fn sink_open_failure_is_fatal_and_releases_the_body() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = session_for(&connector);
    let mut descriptor = RequestDescriptor::post("https://a.test/upload")
        .body(MemoryStream::from_bytes(b"payload".to_vec()));
    let mut sink = RecordingSink {
        fail_open: true,
        ..RecordingSink::default()
    };

    let error = session
        .send(&mut descriptor, &mut sink)
        .expect_err("sink open failure is fatal");

    assert_eq!(error.code(), ErrorCode::OpenResponseSink);
    assert_eq!(connector.attempts(), 0);
    let body = descriptor.body_stream().expect("body stays attached");
    assert!(!body.is_open());
}

#[test]
fn request_headers_follow_the_descriptor() {
    let connector = ScriptedConnector::with_steps([Step::status(201, b"")]);
    let mut session = session_for(&connector);
    let mut descriptor = RequestDescriptor::put("https://a.test/items/1")
        .body(MemoryStream::from_bytes(b"{\"n\":1}".to_vec()).with_media_type("application/json"))
        .cache_control_max_age(30)
        .auth_token("token-9");

    session
        .send(&mut descriptor, &mut MemoryStream::new())
        .expect("request should complete");

    let script = connector.script();
    let request = &script.requests[0];
    assert_eq!(request.method, TransportMethod::Custom("PUT"));
    assert_eq!(request.header("cache-control"), Some("max-age=30"));
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("content-length"), Some("7"));
    assert_eq!(request.header("x-auth-token"), Some("token-9"));
    assert_eq!(request.header("connection"), Some("keep-alive"));
    assert_eq!(request.header("keep-alive"), Some("300"));
    assert_eq!(request.body, RecordedBody::Bytes(b"{\"n\":1}".to_vec()));
    let body = descriptor.body_stream().expect("body stays attached");
    assert!(!body.is_open());
}

#[test]
fn get_never_sends_a_body() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = session_for(&connector);
    let mut descriptor =
        RequestDescriptor::get("https://a.test/").body(MemoryStream::from_bytes(b"x".to_vec()));

    session
        .send(&mut descriptor, &mut MemoryStream::new())
        .expect("request should complete");

    let script = connector.script();
    assert_eq!(script.requests[0].method, TransportMethod::Get);
    assert_eq!(script.requests[0].body, RecordedBody::None);
}

#[test]
fn post_without_body_sends_explicit_empty_body() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = session_for(&connector);

    session
        .send(&mut RequestDescriptor::post("https://a.test/ping"), &mut MemoryStream::new())
        .expect("request should complete");

    let script = connector.script();
    assert_eq!(script.requests[0].body, RecordedBody::Empty);
    assert_eq!(script.requests[0].header("content-length"), Some("0"));
}

#[test]
fn global_init_runs_once_per_process() {
    for _ in 0..3 {
        let connector = ScriptedConnector::default();
        let mut session = session_for(&connector);
        session.connect("https://a.test/").expect("connect");
    }
    assert_eq!(GLOBAL_INIT_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn connect_passes_transport_options() {
    let connector = ScriptedConnector::default();
    let mut session = Session::builder()
        .connector(connector.clone())
        .user_agent("agent/1.0")
        .recv_timeout(Duration::from_secs(15))
        .verify_tls(true)
        .build();
    session.connect("https://a.test/").expect("connect");

    let script = connector.script();
    let options = &script.connects[0];
    assert_eq!(options.server_uri, "https://a.test/");
    assert_eq!(options.user_agent, "agent/1.0");
    assert!(options.verify_tls);
    assert!(options.follow_redirects);
    let limit = options.low_speed_limit.expect("low speed limit configured");
    assert_eq!(limit.bytes_per_second, 50);
    assert_eq!(limit.window, Duration::from_secs(15));
}

#[test]
fn zero_recv_timeout_disables_low_speed_abort() {
    let connector = ScriptedConnector::default();
    let mut session = Session::builder()
        .connector(connector.clone())
        .recv_timeout(Duration::ZERO)
        .build();
    session.connect("https://a.test/").expect("connect");
    assert!(connector.script().connects[0].low_speed_limit.is_none());
}

#[test]
fn idle_time_tracks_connection_state() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b"")]);
    let mut session = session_for(&connector);
    assert!(session.idle_time().is_none());

    session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new())
        .expect("request should complete");
    assert!(session.is_connected());
    let idle = session.idle_time().expect("connected session has idle time");
    assert!(idle < Duration::from_secs(5));

    session.disconnect();
    assert!(!session.is_connected());
    assert!(session.idle_time().is_none());
    session.disconnect();
}

#[test]
fn session_reconnects_lazily_after_disconnect() {
    let connector = ScriptedConnector::with_steps([Step::status(200, b""), Step::status(200, b"")]);
    let mut session = session_for(&connector);
    session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new())
        .expect("first request");
    session.disconnect();
    session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new())
        .expect("second request");
    assert_eq!(connector.script().connects.len(), 2);
}

#[test]
fn error_body_is_discarded_unless_requested() {
    let connector = ScriptedConnector::with_steps([Step::status(404, b"missing")]);
    let mut session = session_for(&connector);
    let mut sink = MemoryStream::new();
    let status = session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut sink)
        .expect("request should complete");
    assert_eq!(status, UnifiedStatus::Http(404));
    assert!(sink.as_bytes().is_empty());

    let connector = ScriptedConnector::with_steps([Step::status(404, b"missing")]);
    let mut session = session_for(&connector);
    session.set_fill_response_on_error(true);
    let mut sink = MemoryStream::new();
    session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut sink)
        .expect("request should complete");
    assert_eq!(sink.as_bytes(), b"missing");
}

#[test]
fn send_http_request_records_effective_uri() {
    let connector = ScriptedConnector::with_steps([
        Step::status(200, b"hello").redirected("https://a.test/moved", 1),
    ]);
    let mut session = session_for(&connector);
    let mut request = HttpRequest::new(RequestDescriptor::get("https://a.test/"));

    let status = session
        .send_http_request(&mut request)
        .expect("request should complete");

    assert_eq!(status, UnifiedStatus::OK);
    assert_eq!(request.effective_uri(), Some("https://a.test/moved"));
    assert_eq!(request.response_stream().size(), 5);
}

#[test]
fn metrics_count_attempts_and_outcomes() {
    let connector = ScriptedConnector::with_steps([
        Step::status(503, b""),
        Step::status(200, b""),
        Step::failed(TransportErrorKind::Dns, None, "no such host"),
    ]);
    let mut session = session_for(&connector);
    session
        .send(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new())
        .expect("first request");
    session
        .send_with_retries(&mut RequestDescriptor::get("https://a.test/"), &mut MemoryStream::new(), 0)
        .expect("second request");

    let snapshot = session.metrics_snapshot();
    assert_eq!(snapshot.requests_started, 2);
    assert_eq!(snapshot.requests_succeeded, 1);
    assert_eq!(snapshot.requests_failed, 1);
    assert_eq!(snapshot.attempts, 3);
    assert_eq!(snapshot.retries, 1);
    assert_eq!(snapshot.transport_failures, 1);
    assert_eq!(snapshot.status_counts.get(&200), Some(&1));
}
