// ABOUTME: Orchestrates key resolution, authentication, signing and storage
// ABOUTME: Runner sequences the host and user flows over injected capability traits

use crate::ca::CaCertClient;
use crate::config::{Config, DEFAULT_USER_DURATION_SECS};
use crate::error::{KeysignError, Result};
use crate::keys::SshKeyHandler;
use crate::oauth::CaAuthClient;
use crate::printer::{truncate_token, Printer, Verbosity};
use crate::service::{CertClient, CertHandler, KeyHandler, OAuthClient};
use crate::store::CaCertHandler;
use crate::types::{AccessToken, Keys, StoredCert};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Which OAuth grant a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    ClientCredential,
    DeviceFlow,
}

/// Runs the issuance pipeline for one resolved configuration.
pub struct Runner {
    config: Config,
    key_handler: Box<dyn KeyHandler>,
    oauth_client: Box<dyn OAuthClient>,
    cert_client: Box<dyn CertClient>,
    cert_handler: Box<dyn CertHandler>,
}

impl Runner {
    /// Runner wired to the production HTTP clients, filesystem and ssh-agent.
    ///
    /// # Errors
    /// Returns a network error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let http = crate::http::client()?;
        Ok(Self {
            config,
            key_handler: Box::new(SshKeyHandler),
            oauth_client: Box::new(CaAuthClient::new(http.clone())),
            cert_client: Box::new(CaCertClient::new(http)),
            cert_handler: Box::new(CaCertHandler::default()),
        })
    }

    pub fn with_key_handler(mut self, handler: impl KeyHandler + 'static) -> Self {
        self.key_handler = Box::new(handler);
        self
    }

    pub fn with_oauth_client(mut self, client: impl OAuthClient + 'static) -> Self {
        self.oauth_client = Box::new(client);
        self
    }

    pub fn with_cert_client(mut self, client: impl CertClient + 'static) -> Self {
        self.cert_client = Box::new(client);
        self
    }

    pub fn with_cert_handler(mut self, handler: impl CertHandler + 'static) -> Self {
        self.cert_handler = Box::new(handler);
        self
    }

    /// Sign a host public key with client credentials and store the
    /// certificate next to the key file.
    ///
    /// # Errors
    /// Returns the first failing stage's error; its kind decides the exit code.
    pub async fn sign_host_key(
        &self,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<StoredCert> {
        self.config.validate_host()?;
        let host = &self.config.host;
        let key_path = host.key.as_deref().unwrap_or_default();

        info!(
            key = key_path,
            principal = ?host.principals,
            duration = host.duration_seconds,
            "signing host key"
        );

        printer.println(Verbosity::Verbose, "fetching key details");
        let keys = Keys::File {
            path: key_path.to_string(),
            info: self.key_handler.read_public_key(key_path)?,
        };

        let token = self
            .authenticate(Grant::ClientCredential, printer, cancel)
            .await?;

        printer.println(
            Verbosity::Verbose,
            "initiating connection to CA server to sign public key",
        );
        let signed = self
            .cert_client
            .issue_host_cert(host, &self.config.oauth, &keys, &token, cancel)
            .await?;
        printer.println(Verbosity::Verbose, "received signed certificate");

        printer.println(Verbosity::Verbose, "storing the certificate");
        let stored = self.cert_handler.store_certificate_file(key_path, &signed)?;

        self.finish(printer, &stored);
        Ok(stored)
    }

    /// Sign a user key (from a file or freshly generated) with whichever
    /// grant is configured, and store the result according to the key source
    /// and the `agent` setting.
    ///
    /// # Errors
    /// Returns the first failing stage's error; its kind decides the exit code.
    pub async fn sign_user_key(
        &self,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<StoredCert> {
        self.config.validate_user()?;
        let user = &self.config.user;
        let key_path = user.key.as_deref().filter(|k| !k.is_empty());

        info!(
            key = key_path.unwrap_or("<generated>"),
            principal = ?user.principals,
            duration = user.duration_seconds,
            agent = user.agent,
            "signing user key"
        );

        printer.println(Verbosity::Verbose, "fetching key details");
        let keys = match key_path {
            Some(path) => Keys::File {
                path: path.to_string(),
                info: self.key_handler.read_public_key(path)?,
            },
            None => Keys::Generated(self.key_handler.new_ed25519()?),
        };

        let grant = if self.config.oauth.has_client_credential() {
            Grant::ClientCredential
        } else {
            Grant::DeviceFlow
        };
        let token = self.authenticate(grant, printer, cancel).await?;

        printer.println(
            Verbosity::Verbose,
            "initiating connection to CA server to sign public key",
        );
        let signed = self
            .cert_client
            .issue_user_cert(user, &self.config.oauth, &keys, &token, cancel)
            .await?;
        printer.println(Verbosity::Verbose, "received signed certificate");

        printer.println(Verbosity::Verbose, "storing the certificate");
        let stored = match &keys {
            Keys::File { path, .. } => self.cert_handler.store_certificate_file(path, &signed)?,
            Keys::Generated(pair) if user.agent => {
                let socket = user.agent_socket.as_deref().ok_or_else(|| {
                    KeysignError::Usage("SSH_AUTH_SOCK not set; is ssh-agent running?".into())
                })?;
                let lifetime = user.duration_seconds.min(DEFAULT_USER_DURATION_SECS);
                self.cert_handler
                    .add_to_agent(socket, pair, &signed, lifetime, cancel)
                    .await?
            }
            Keys::Generated(pair) => {
                let ssh_dir = self.ssh_dir()?;
                self.cert_handler.store_key_pair(&ssh_dir, pair, &signed)?
            }
        };

        self.finish(printer, &stored);
        Ok(stored)
    }

    async fn authenticate(
        &self,
        grant: Grant,
        printer: &Printer,
        cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        let oauth = &self.config.oauth;
        info!(
            ca_server_url = oauth.server_url.as_deref().unwrap_or_default(),
            client_id = oauth.client_id.as_deref().unwrap_or_default(),
            grant = ?grant,
            "authenticating"
        );
        printer.println(Verbosity::Verbose, "initiating connection to OAuth");

        let token = match grant {
            Grant::ClientCredential => {
                self.oauth_client
                    .client_credential_login(oauth, printer, cancel)
                    .await
            }
            Grant::DeviceFlow => self.oauth_client.device_flow_login(oauth, printer, cancel).await,
        }
        .map_err(KeysignError::into_auth)?;

        if !token.is_valid() {
            return Err(KeysignError::Auth(
                "identity provider returned an incomplete access token".into(),
            ));
        }

        info!(
            token_type = %token.token_type,
            expires_in = token.expires_in,
            "received access token"
        );
        printer.println(Verbosity::Verbose, "received access token");
        printer.println(
            Verbosity::VeryVerbose,
            format!("access token: {}", truncate_token(&token.access_token)),
        );
        Ok(token)
    }

    fn ssh_dir(&self) -> Result<PathBuf> {
        match &self.config.user.ssh_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(keysign_ssh::normalize_path("~/.ssh")?),
        }
    }

    fn finish(&self, printer: &Printer, stored: &StoredCert) {
        info!(stored = %stored, "certificate stored");
        printer.println(Verbosity::Normal, stored);
        printer.println(Verbosity::Verbose, "done");
    }
}
