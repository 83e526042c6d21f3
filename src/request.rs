use http::Method;

use crate::stream::{ContentStream, MemoryStream};

/// Structured description of one request.
///
/// The session never changes these fields. It only opens, maps and closes
/// the body stream while an attempt is running.
pub struct RequestDescriptor {
    method: Method,
    uri: String,
    body: Option<Box<dyn ContentStream>>,
    cache_control_max_age: u32,
    auth_token: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            body: None,
            cache_control_max_age: 0,
            auth_token: None,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::PUT, uri)
    }

    pub fn body(mut self, body: impl ContentStream + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn boxed_body(mut self, body: Box<dyn ContentStream>) -> Self {
        self.body = Some(body);
        self
    }

    /// `0` leaves the `Cache-Control` header out.
    pub fn cache_control_max_age(mut self, max_age_secs: u32) -> Self {
        self.cache_control_max_age = max_age_secs;
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn body_stream(&self) -> Option<&dyn ContentStream> {
        self.body.as_deref()
    }

    pub(crate) fn body_stream_mut(&mut self) -> Option<&mut (dyn ContentStream + 'static)> {
        self.body.as_deref_mut()
    }

    pub fn take_body(&mut self) -> Option<Box<dyn ContentStream>> {
        self.body.take()
    }

    pub fn cache_control_max_age_value(&self) -> u32 {
        self.cache_control_max_age
    }

    pub fn auth_token_value(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("has_body", &self.body.is_some())
            .field("cache_control_max_age", &self.cache_control_max_age)
            .field("has_auth_token", &self.auth_token.is_some())
            .finish()
    }
}

/// A descriptor bundled with the stream its response is written to.
///
/// After [`Session::send_http_request`](crate::Session::send_http_request)
/// returns, [`effective_uri`](Self::effective_uri) holds the URL the transport
/// ended up at after redirects.
pub struct HttpRequest {
    descriptor: RequestDescriptor,
    response: Box<dyn ContentStream>,
    effective_uri: Option<String>,
}

impl HttpRequest {
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self::with_response_stream(descriptor, MemoryStream::new())
    }

    pub fn with_response_stream(
        descriptor: RequestDescriptor,
        response: impl ContentStream + 'static,
    ) -> Self {
        Self {
            descriptor,
            response: Box::new(response),
            effective_uri: None,
        }
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn response_stream(&self) -> &dyn ContentStream {
        self.response.as_ref()
    }

    pub fn into_response_stream(self) -> Box<dyn ContentStream> {
        self.response
    }

    pub fn effective_uri(&self) -> Option<&str> {
        self.effective_uri.as_deref()
    }

    pub(crate) fn parts_mut(
        &mut self,
    ) -> (
        &mut RequestDescriptor,
        &mut (dyn ContentStream + 'static),
        &mut Option<String>,
    ) {
        (
            &mut self.descriptor,
            self.response.as_mut(),
            &mut self.effective_uri,
        )
    }
}
