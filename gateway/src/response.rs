//! Turning handler return values into HTTP responses.
//!
//! A webhook handler can hand back TwiML as a string, as raw bytes, as a
//! markup builder, or as a complete response. Everything except the last
//! shape is wrapped in a 200 with `Content-Type: application/xml`; the markup
//! is not validated, Twilio reports malformed documents itself.

use std::fmt;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::twiml::{Markup, MessagingResponse, VoiceResponse};

pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Every shape a webhook handler may return.
pub enum HandlerReply {
    /// TwiML text
    Text(String),
    /// TwiML as raw bytes
    Bytes(Bytes),
    /// A markup builder serialized on the way out
    Markup(Box<dyn Markup>),
    /// A finished response, passed through untouched
    Http(Response),
}

impl HandlerReply {
    /// Convert the reply into the response sent back to Twilio.
    pub fn coerce(self) -> Response {
        match self {
            HandlerReply::Text(text) => xml_response(text),
            HandlerReply::Bytes(bytes) => xml_response(bytes),
            HandlerReply::Markup(markup) => xml_response(markup.to_xml()),
            HandlerReply::Http(response) => response,
        }
    }
}

/// A 200 response carrying an XML body.
pub fn xml_response(body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(XML_CONTENT_TYPE),
    );
    response
}

impl fmt::Debug for HandlerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerReply::Text(text) => f.debug_tuple("Text").field(text).finish(),
            HandlerReply::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            HandlerReply::Markup(markup) => f.debug_tuple("Markup").field(&markup.to_xml()).finish(),
            HandlerReply::Http(response) => f.debug_tuple("Http").field(&response.status()).finish(),
        }
    }
}

impl IntoResponse for HandlerReply {
    fn into_response(self) -> Response {
        self.coerce()
    }
}

impl From<String> for HandlerReply {
    fn from(text: String) -> Self {
        HandlerReply::Text(text)
    }
}

impl From<&'static str> for HandlerReply {
    fn from(text: &'static str) -> Self {
        HandlerReply::Text(text.to_string())
    }
}

impl From<Vec<u8>> for HandlerReply {
    fn from(bytes: Vec<u8>) -> Self {
        HandlerReply::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for HandlerReply {
    fn from(bytes: &'static [u8]) -> Self {
        HandlerReply::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Bytes> for HandlerReply {
    fn from(bytes: Bytes) -> Self {
        HandlerReply::Bytes(bytes)
    }
}

impl From<VoiceResponse> for HandlerReply {
    fn from(markup: VoiceResponse) -> Self {
        HandlerReply::Markup(Box::new(markup))
    }
}

impl From<MessagingResponse> for HandlerReply {
    fn from(markup: MessagingResponse) -> Self {
        HandlerReply::Markup(Box::new(markup))
    }
}

impl From<Box<dyn Markup>> for HandlerReply {
    fn from(markup: Box<dyn Markup>) -> Self {
        HandlerReply::Markup(markup)
    }
}

impl From<StatusCode> for HandlerReply {
    fn from(status: StatusCode) -> Self {
        HandlerReply::Http(status.into_response())
    }
}

impl From<Response> for HandlerReply {
    fn from(response: Response) -> Self {
        HandlerReply::Http(response)
    }
}

/// Handler errors become the error's own response, leaving error handling to
/// the host application.
impl<T, E> From<Result<T, E>> for HandlerReply
where
    T: Into<HandlerReply>,
    E: IntoResponse,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(reply) => reply.into(),
            Err(e) => HandlerReply::Http(e.into_response()),
        }
    }
}
