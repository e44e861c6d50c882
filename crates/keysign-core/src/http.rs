// ABOUTME: Shared HTTP plumbing for the OAuth and CA clients
// ABOUTME: Cancellable sends, status checks carrying the body, and JSON decoding

use crate::error::{KeysignError, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client used by the production OAuth and CA clients.
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("ssh-keysign/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| KeysignError::network("creating HTTP client", e))
}

/// Send `request`, giving up as soon as `cancel` fires.
pub(crate) async fn send(
    request: RequestBuilder,
    context: &str,
    cancel: &CancellationToken,
) -> Result<Response> {
    tokio::select! {
        _ = cancel.cancelled() => Err(KeysignError::Canceled(context.to_string())),
        response = request.send() => response.map_err(|e| KeysignError::network(context, e)),
    }
}

/// Read the response body as text.
pub(crate) async fn text(
    response: Response,
    context: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    tokio::select! {
        _ = cancel.cancelled() => Err(KeysignError::Canceled(context.to_string())),
        body = response.text() => body.map_err(|e| KeysignError::network(context, e)),
    }
}

/// Fail with an Http error carrying the body unless the status is 200.
pub(crate) async fn expect_ok(
    response: Response,
    context: &str,
    cancel: &CancellationToken,
) -> Result<Response> {
    if response.status() == StatusCode::OK {
        return Ok(response);
    }
    Err(status_error(response, context, cancel).await)
}

/// Http error for an unexpected status, with whatever body could be read.
pub(crate) async fn status_error(
    response: Response,
    context: &str,
    cancel: &CancellationToken,
) -> KeysignError {
    let status = response.status().as_u16();
    match text(response, context, cancel).await {
        Ok(body) => KeysignError::Http {
            context: context.to_string(),
            status,
            body: body.trim().to_string(),
        },
        Err(e) => e,
    }
}

/// Decode a JSON body; an undecodable body is a network-kind error.
pub(crate) async fn json<T: DeserializeOwned>(
    response: Response,
    context: &str,
    cancel: &CancellationToken,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(KeysignError::Canceled(context.to_string())),
        decoded = response.json::<T>() => decoded.map_err(|e| KeysignError::network(context, e)),
    }
}
