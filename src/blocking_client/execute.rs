use std::thread::sleep;
use std::time::Instant;

use http::Method;
use tracing::{debug, warn};

use crate::Result;
use crate::error::Error;
use crate::request::{HttpRequest, RequestDescriptor};
use crate::status::{Completion, UnifiedStatus, classify_completion};
use crate::stream::{AccessMode, ContentStream};
use crate::util::redact_uri_for_logs;

use super::Session;
use super::assemble::{self, BodyGuard};

/// Keeps the response sink open for one attempt and closes it on every exit.
///
/// Every chunk is accepted in full. The only short count is 0 after a sink
/// I/O error, which makes the transport abort the exchange.
struct SinkGuard<'a> {
    sink: &'a mut dyn ContentStream,
    redacted_uri: &'a str,
}

impl<'a> SinkGuard<'a> {
    fn open(sink: &'a mut dyn ContentStream, redacted_uri: &'a str) -> Result<Self> {
        sink.set_access_mode(AccessMode::Write);
        sink.open().map_err(|source| Error::OpenResponseSink {
            uri: redacted_uri.to_owned(),
            source,
        })?;
        Ok(Self { sink, redacted_uri })
    }

    fn accept(&mut self, chunk: &[u8]) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        match self.sink.write(chunk) {
            Ok(()) => chunk.len(),
            Err(source) => {
                warn!(
                    uri = %self.redacted_uri,
                    error = %source,
                    "response sink write failed; aborting transfer"
                );
                0
            }
        }
    }
}

impl Drop for SinkGuard<'_> {
    fn drop(&mut self) {
        if self.sink.is_open() {
            self.sink.close();
        }
    }
}

impl Session {
    /// Sends a bare request and retries it up to the policy's default budget.
    pub fn send_request(
        &mut self,
        method: Method,
        uri: &str,
        sink: &mut dyn ContentStream,
    ) -> Result<UnifiedStatus> {
        let mut descriptor = RequestDescriptor::new(method, uri);
        self.send(&mut descriptor, sink)
    }

    pub fn send(
        &mut self,
        descriptor: &mut RequestDescriptor,
        sink: &mut dyn ContentStream,
    ) -> Result<UnifiedStatus> {
        let max_retries = self.config.retry_policy.max_retries_value();
        self.send_with_retries(descriptor, sink, max_retries)
    }

    /// Sends `descriptor`, retrying transient outcomes at most `max_retries` times.
    ///
    /// Transport failures and HTTP error statuses come back as `Ok`. `Err` is
    /// reserved for misuse that a retry cannot fix.
    pub fn send_with_retries(
        &mut self,
        descriptor: &mut RequestDescriptor,
        sink: &mut dyn ContentStream,
        max_retries: usize,
    ) -> Result<UnifiedStatus> {
        self.metrics.record_request_started();
        let outcome = self.retry_loop(descriptor, sink, max_retries);
        self.last_request_at = Some(Instant::now());
        let status = outcome?;

        if !self.config.fill_response_on_error
            && matches!(status, UnifiedStatus::Http(code) if code >= 400)
            && let Err(source) = sink.set_size(0)
        {
            warn!(
                uri = %redact_uri_for_logs(descriptor.uri()),
                error = %source,
                "failed to discard error response body"
            );
        }

        self.metrics.record_request_completed(status);
        Ok(status)
    }

    /// Sends the request's descriptor into its own response stream and records
    /// where the exchange ended up.
    pub fn send_http_request(&mut self, request: &mut HttpRequest) -> Result<UnifiedStatus> {
        let (descriptor, response, effective_uri) = request.parts_mut();
        let status = self.send(descriptor, response)?;
        *effective_uri = self.effective_url.clone();
        Ok(status)
    }

    fn retry_loop(
        &mut self,
        descriptor: &mut RequestDescriptor,
        sink: &mut dyn ContentStream,
        max_retries: usize,
    ) -> Result<UnifiedStatus> {
        let policy = self.config.retry_policy.clone();
        let redacted_uri = redact_uri_for_logs(descriptor.uri());

        let mut status = self.run_once(descriptor, sink)?;
        let mut retries = 0_usize;
        while policy.is_transient(status) && retries < max_retries {
            let cooldown = policy.cooldown_value();
            if !cooldown.is_zero() {
                sleep(cooldown);
            }
            retries += 1;
            warn!(
                uri = %redacted_uri,
                status = %status,
                retry = retries,
                max_retries,
                "transient failure; retrying request"
            );

            if self.config.cancel_on_stop && self.stop_signal.stop_requested() {
                warn!(
                    uri = %redacted_uri,
                    retry = retries,
                    "stop requested; cancelling request"
                );
                return Ok(UnifiedStatus::Cancelled);
            }

            sink.set_size(0).map_err(|source| Error::ResetResponseSink {
                uri: redacted_uri.clone(),
                source,
            })?;
            self.metrics.record_retry();
            status = self.run_once(descriptor, sink)?;
        }
        Ok(status)
    }

    /// Runs exactly one exchange and classifies its outcome.
    pub(crate) fn run_once(
        &mut self,
        descriptor: &mut RequestDescriptor,
        sink: &mut dyn ContentStream,
    ) -> Result<UnifiedStatus> {
        let upgrade = self.config.upgrade_to_https;
        let redacted_uri = redact_uri_for_logs(descriptor.uri());

        let transport = self.ensure_connected(descriptor.uri())?;
        let method = assemble::transport_method(descriptor.method(), descriptor.uri())?;
        let url = assemble::normalize_url(descriptor.uri(), upgrade);
        let headers = assemble::build_headers(descriptor)?;

        let mut body = BodyGuard::attach(method, descriptor.body_stream_mut(), &redacted_uri);
        let mut sink = SinkGuard::open(sink, &redacted_uri)?;
        let body_attached = body.is_attached();
        let prepared = assemble::prepare(method, url, headers, &mut body);

        debug!(
            method = method.as_str(),
            uri = %redacted_uri,
            body_attached,
            body_bytes = prepared.body.len(),
            "sending request"
        );
        let mut write = |chunk: &[u8]| sink.accept(chunk);
        let completion = transport.perform(&prepared, &mut write);
        let http_status = transport.http_status();
        let effective_url = transport.effective_url();
        let redirect_count = transport.redirect_count();

        drop(prepared);
        drop(body);
        drop(sink);

        if let Some(effective_url) = effective_url {
            self.effective_url = Some(effective_url);
        }
        if let Some(redirect_count) = redirect_count {
            self.redirect_count = redirect_count;
        }

        let status = classify_completion(&completion, http_status);
        match &completion {
            Completion::Complete => {}
            Completion::PartialFile { description } => {
                warn!(
                    uri = %redacted_uri,
                    http_code = http_status.unwrap_or(0),
                    error = %description,
                    "partial transfer; keeping reported status"
                );
            }
            Completion::Failed { kind, description } => {
                warn!(
                    uri = %redacted_uri,
                    kind = %kind,
                    http_code = http_status.unwrap_or(0),
                    status = %status,
                    error = %description,
                    "transport failed"
                );
            }
        }

        self.error_description = completion.description().unwrap_or_default().to_owned();
        self.metrics.record_attempt(&completion);
        Ok(status)
    }
}
