// ABOUTME: CA REST client that submits public keys for signing
// ABOUTME: Posts {filename?, publicKey, principal} to /rest/key/hostSign or /userSign with a bearer token

use crate::config::{HostConfig, OAuthConfig, UserConfig};
use crate::error::{KeysignError, Result};
use crate::http;
use crate::service::CertClient;
use crate::types::{AccessToken, Keys, SignRequest, SignedResponse};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

const HOST_SIGN_PATH: &str = "/rest/key/hostSign";
const USER_SIGN_PATH: &str = "/rest/key/userSign";

/// Production [`CertClient`].
pub struct CaCertClient {
    http: reqwest::Client,
}

impl CaCertClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn sign(
        &self,
        oauth: &OAuthConfig,
        path: &str,
        principals: &[String],
        keys: &Keys,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<SignedResponse> {
        let server = oauth
            .server_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KeysignError::Usage("--ca-server-url is required".into()))?;
        let principal = principals
            .first()
            .ok_or_else(|| KeysignError::Usage("missing required parameters: --principal".into()))?;

        let url = sign_url(server, path);
        let request = SignRequest {
            filename: keys.filename(),
            public_key: keys.public_key().to_string(),
            principal: principal.clone(),
        };

        info!(
            ca_server_url = %url,
            principal = %principal,
            key_type = keys.key_type(),
            "requesting certificate"
        );

        let context = "certificate signing request";
        let response = http::send(
            self.http
                .post(&url)
                .bearer_auth(&token.access_token)
                .json(&request),
            context,
            cancel,
        )
        .await?;
        let response = http::expect_ok(response, context, cancel).await?;
        let signed: SignedResponse = http::json(response, context, cancel).await?;

        if signed.signed_public_key.trim().is_empty() {
            return Err(KeysignError::Cert(
                "CA returned an empty signed key".to_string(),
            ));
        }
        Ok(signed)
    }
}

#[async_trait]
impl CertClient for CaCertClient {
    async fn issue_host_cert(
        &self,
        host: &HostConfig,
        oauth: &OAuthConfig,
        keys: &Keys,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<SignedResponse> {
        self.sign(oauth, HOST_SIGN_PATH, &host.principals, keys, token, cancel)
            .await
    }

    async fn issue_user_cert(
        &self,
        user: &UserConfig,
        oauth: &OAuthConfig,
        keys: &Keys,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<SignedResponse> {
        self.sign(oauth, USER_SIGN_PATH, &user.principals, keys, token, cancel)
            .await
    }
}

fn sign_url(server: &str, path: &str) -> String {
    format!("{}{}", server.trim_end_matches('/'), path)
}
