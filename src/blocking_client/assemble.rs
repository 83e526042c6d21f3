use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method};
use tracing::debug;

use crate::Result;
use crate::error::Error;
use crate::request::RequestDescriptor;
use crate::stream::{AccessMode, ContentStream};
use crate::util::{redact_uri_for_logs, upgrade_to_https};

use super::transport::{PreparedRequest, RequestBodyView, TransportMethod};

pub(crate) const KEEP_ALIVE_SECS: u32 = 300;

const X_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");
const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

pub(crate) fn transport_method(method: &Method, uri: &str) -> Result<TransportMethod> {
    match *method {
        Method::GET => Ok(TransportMethod::Get),
        Method::POST => Ok(TransportMethod::Post),
        Method::PUT => Ok(TransportMethod::Custom("PUT")),
        _ => Err(Error::UnsupportedMethod {
            method: method.clone(),
            uri: redact_uri_for_logs(uri),
        }),
    }
}

pub(crate) fn normalize_url(uri: &str, upgrade: bool) -> String {
    if upgrade {
        upgrade_to_https(uri)
    } else {
        uri.to_owned()
    }
}

pub(crate) fn build_headers(
    descriptor: &RequestDescriptor,
) -> Result<Vec<(HeaderName, HeaderValue)>> {
    let mut headers = Vec::with_capacity(6);

    let max_age = descriptor.cache_control_max_age_value();
    if max_age > 0 {
        headers.push((
            CACHE_CONTROL,
            header_value("cache-control", format!("max-age={max_age}"))?,
        ));
    }

    let body = descriptor.body_stream();
    if let Some(media_type) = body.and_then(|body| body.media_type()) {
        headers.push((CONTENT_TYPE, header_value("content-type", media_type)?));
    }
    let content_length = body.map_or(0, |body| body.size());
    headers.push((CONTENT_LENGTH, HeaderValue::from(content_length)));

    if let Some(token) = descriptor.auth_token_value() {
        let mut value = header_value("x-auth-token", token)?;
        value.set_sensitive(true);
        headers.push((X_AUTH_TOKEN, value));
    }

    headers.push((CONNECTION, HeaderValue::from_static("keep-alive")));
    headers.push((KEEP_ALIVE, HeaderValue::from(KEEP_ALIVE_SECS)));

    if headers.is_empty() {
        return Err(Error::EmptyHeaderList {
            uri: redact_uri_for_logs(descriptor.uri()),
        });
    }
    Ok(headers)
}

fn header_value(name: &'static str, value: impl AsRef<str>) -> Result<HeaderValue> {
    HeaderValue::from_str(value.as_ref())
        .map_err(|source| Error::InvalidHeaderValue { name, source })
}

/// Holds the request body open and mapped for one attempt.
///
/// Dropping the guard unmaps and closes whatever it opened.
pub(crate) struct BodyGuard<'a> {
    stream: Option<&'a mut (dyn ContentStream + 'static)>,
    mapped: bool,
}

impl<'a> BodyGuard<'a> {
    pub(crate) fn detached() -> Self {
        Self {
            stream: None,
            mapped: false,
        }
    }

    /// Opens `body` for reading when the method carries one.
    ///
    /// A body that fails to open is sent as an explicit empty body.
    pub(crate) fn attach(
        method: TransportMethod,
        body: Option<&'a mut (dyn ContentStream + 'static)>,
        uri: &str,
    ) -> Self {
        if !method.carries_body() {
            return Self::detached();
        }
        let Some(stream) = body else {
            return Self::detached();
        };
        stream.set_access_mode(AccessMode::Read);
        if let Err(source) = stream.open() {
            debug!(
                uri = %redact_uri_for_logs(uri),
                error = %source,
                "request body could not be opened; sending an empty body"
            );
            return Self::detached();
        }
        Self {
            stream: Some(stream),
            mapped: false,
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn view(&mut self, method: TransportMethod) -> RequestBodyView<'_> {
        if !method.carries_body() {
            return RequestBodyView::None;
        }
        let Some(stream) = self.stream.as_deref_mut() else {
            return RequestBodyView::Empty;
        };
        match stream.map() {
            Some(bytes) => {
                self.mapped = true;
                RequestBodyView::Bytes(bytes)
            }
            None => RequestBodyView::Empty,
        }
    }
}

impl Drop for BodyGuard<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if self.mapped {
                stream.unmap();
            }
            stream.close();
        }
    }
}

/// Builds the exchange for one attempt. The body view borrows from `body`.
pub(crate) fn prepare<'g>(
    method: TransportMethod,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: &'g mut BodyGuard<'_>,
) -> PreparedRequest<'g> {
    PreparedRequest {
        method,
        url,
        headers,
        body: body.view(method),
    }
}
