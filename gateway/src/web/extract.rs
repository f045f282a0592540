//! Extracting a [`WebhookRequest`] from an axum request.

use axum::{
    async_trait,
    body::Bytes,
    extract::{
        rejection::{BytesRejection, FailedToBufferBody},
        FromRequest, Request,
    },
    http::{header, StatusCode},
};
use tracing::warn;

use crate::request::WebhookRequest;

/// Largest webhook body accepted. Twilio payloads are a few kilobytes.
///
/// The router enforces it with `DefaultBodyLimit`; without that layer axum's
/// own default applies.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Application user bound to the request by upstream middleware.
///
/// When present, that user's stored credential is a candidate signing secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

#[async_trait]
impl<S> FromRequest<S> for WebhookRequest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let headers = req.headers().clone();
        let user = req
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.0.clone());

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| body_rejection(rejection, uri.path()))?;

        // Only form bodies carry Twilio parameters
        let is_form = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with(FORM_CONTENT_TYPE))
            .unwrap_or(true);
        let body: &[u8] = if is_form { &bytes[..] } else { &[] };

        let mut request = WebhookRequest::new(method, uri, headers, body);
        request.user = user;

        Ok(request)
    }
}

fn body_rejection(rejection: BytesRejection, path: &str) -> (StatusCode, &'static str) {
    match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            warn!(path = %path, "webhook_body_too_large");
            (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
        }
        other => {
            warn!(error = %other, path = %path, "webhook_body_read_failed");
            (StatusCode::BAD_REQUEST, "Unreadable request body")
        }
    }
}
