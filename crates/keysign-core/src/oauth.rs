// ABOUTME: OAuth token acquisition against the identity provider
// ABOUTME: Client credentials grant and device authorization grant with backoff polling

use crate::config::OAuthConfig;
use crate::error::{KeysignError, Result};
use crate::http;
use crate::printer::{Printer, Verbosity};
use crate::service::OAuthClient;
use crate::types::{AccessToken, AuthPending, DeviceFlowStartResponse};
use async_trait::async_trait;
use qrcode::render::unicode;
use qrcode::{EcLevel, QrCode};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
const GRANT_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEVICE_SCOPE: &str = "openid";

/// Retry timing for the device flow poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_elapsed_time: Duration,
    pub factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(120),
            factor: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Apply what the device endpoint advertised: never poll faster than
    /// `interval`, never keep polling after the code `expires_in`.
    ///
    /// Zero means the server did not advertise a value.
    pub fn for_device(&self, interval_secs: u64, expires_in_secs: u64) -> Self {
        let interval = Duration::from_secs(interval_secs);
        let mut policy = *self;
        policy.initial_delay = policy.initial_delay.max(interval);
        policy.max_delay = policy.max_delay.max(interval);
        if expires_in_secs > 0 {
            policy.max_elapsed_time = policy
                .max_elapsed_time
                .min(Duration::from_secs(expires_in_secs));
        }
        policy
    }

    /// Delay to use after `current`, grown by `factor` and capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.factor.max(1.0)).min(self.max_delay)
    }
}

/// Result of one poll against the token endpoint.
enum Poll {
    Token(AccessToken),
    Pending(AuthPending),
}

/// Production [`OAuthClient`] speaking form-encoded OAuth over HTTP.
pub struct CaAuthClient {
    http: reqwest::Client,
    backoff: BackoffConfig,
}

impl CaAuthClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    async fn start_device_flow(
        &self,
        oauth: &OAuthConfig,
        cancel: &CancellationToken,
    ) -> Result<DeviceFlowStartResponse> {
        let context = "device authorization request";
        let url = required(&oauth.device_flow_url, "--device-flow-url")?;
        let form = [
            ("client_id", required(&oauth.client_id, "--client-id")?),
            ("client_secret", required(&oauth.client_secret, "--client-secret")?),
            ("scope", DEVICE_SCOPE),
        ];

        let response = http::send(self.http.post(url).form(&form), context, cancel).await?;
        let response = http::expect_ok(response, context, cancel).await?;
        http::json(response, context, cancel).await
    }

    async fn poll_token(
        &self,
        oauth: &OAuthConfig,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<Poll> {
        let context = "device token poll";
        let url = required(&oauth.token_poll_url, "--token-poll-url")?;
        let form = [
            ("client_id", required(&oauth.client_id, "--client-id")?),
            ("client_secret", required(&oauth.client_secret, "--client-secret")?),
            ("grant_type", GRANT_DEVICE_CODE),
            ("device_code", device_code),
        ];

        let response = http::send(self.http.post(url).form(&form), context, cancel).await?;
        match response.status() {
            StatusCode::OK => Ok(Poll::Token(http::json(response, context, cancel).await?)),
            StatusCode::BAD_REQUEST => {
                let body = http::text(response, context, cancel).await?;
                match serde_json::from_str::<AuthPending>(&body) {
                    Ok(pending) => Ok(Poll::Pending(pending)),
                    Err(_) => Err(KeysignError::Http {
                        context: context.to_string(),
                        status: StatusCode::BAD_REQUEST.as_u16(),
                        body,
                    }),
                }
            }
            _ => Err(http::status_error(response, context, cancel).await),
        }
    }

    /// Poll until a token arrives, a non-pending reply ends the loop, the
    /// policy's elapsed time runs out, or the caller cancels.
    async fn poll_until_authorized(
        &self,
        oauth: &OAuthConfig,
        start: &DeviceFlowStartResponse,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        let policy = self.backoff.for_device(start.interval, start.expires_in);
        let started = Instant::now();
        let mut delay = policy.initial_delay;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let pending = match self.poll_token(oauth, &start.device_code, cancel).await? {
                Poll::Token(token) => {
                    debug!(attempts, "device authorization granted");
                    return Ok(token);
                }
                Poll::Pending(pending) => pending,
            };
            printer.println(Verbosity::VeryVerbose, &pending);

            let elapsed = started.elapsed();
            if elapsed >= policy.max_elapsed_time {
                return Err(KeysignError::Auth(format!(
                    "timed out after {}s waiting for device authorization: {pending}",
                    policy.max_elapsed_time.as_secs()
                )));
            }

            let sleep_for = delay.min(policy.max_elapsed_time - elapsed);
            debug!(
                attempts,
                error = %pending.error,
                delay_ms = sleep_for.as_millis() as u64,
                "device authorization pending"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(KeysignError::Canceled("waiting for device authorization".into()));
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }

            delay = policy.next_delay(delay);
        }
    }
}

#[async_trait]
impl OAuthClient for CaAuthClient {
    async fn client_credential_login(
        &self,
        oauth: &OAuthConfig,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        let context = "token request";
        let url = required(&oauth.token_url, "--token-url")?;
        let client_id = required(&oauth.client_id, "--client-id")?;

        info!(client_id, token_url = url, "requesting client credentials token");
        printer.println(Verbosity::Verbose, "using client credential");

        let form = [
            ("client_id", client_id),
            ("client_secret", required(&oauth.client_secret, "--client-secret")?),
            ("grant_type", GRANT_CLIENT_CREDENTIALS),
        ];

        let response = http::send(self.http.post(url).form(&form), context, cancel).await?;
        let response = http::expect_ok(response, context, cancel).await?;
        http::json(response, context, cancel).await
    }

    async fn device_flow_login(
        &self,
        oauth: &OAuthConfig,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        info!(
            client_id = oauth.client_id.as_deref().unwrap_or_default(),
            device_flow_url = oauth.device_flow_url.as_deref().unwrap_or_default(),
            "starting device authorization"
        );
        printer.println(Verbosity::Verbose, "using device flow");

        let start = self.start_device_flow(oauth, cancel).await?;
        info!(
            expires_in = start.expires_in,
            interval = start.interval,
            "device authorization started"
        );

        printer.print(Verbosity::Normal, &device_prompt(&start));

        self.poll_until_authorized(oauth, &start, printer, cancel).await
    }
}

/// A configured, non-empty value, or a usage error naming `flag`.
fn required<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| KeysignError::Usage(format!("{flag} is required")))
}

/// Operator instructions for the device flow, with a QR code of the complete URI.
fn device_prompt(start: &DeviceFlowStartResponse) -> String {
    let mut prompt = format!(
        "browse to the below URL and enter the code [ {} ] to complete the login, alternatively, scan the QR code\n{}\n\n",
        start.user_code, start.verification_uri
    );

    if !start.verification_uri_complete.is_empty() {
        match render_qr(&start.verification_uri_complete) {
            Some(qr) => {
                prompt.push_str(&qr);
                prompt.push('\n');
            }
            None => warn!("verification URI too long for a QR code"),
        }
    }
    prompt
}

fn render_qr(data: &str) -> Option<String> {
    let code = QrCode::with_error_correction_level(data, EcLevel::H).ok()?;
    Some(
        code.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}
