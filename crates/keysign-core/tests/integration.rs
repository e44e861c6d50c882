// ABOUTME: End-to-end tests for the host and user issuance flows.
// ABOUTME: Runs the Runner against wiremock OAuth/CA servers and a fake ssh-agent socket.

use keysign_core::{
    BackoffConfig, CaAuthClient, CancellationToken, Config, ErrorKind, HostConfig, OAuthConfig,
    Printer, Runner, StoredCert, UserConfig, Verbosity,
};
use serde_json::json;
use ssh_key::certificate::{Builder, CertType};
use ssh_key::{Algorithm, PrivateKey, PublicKey};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const HOST_CERT: &str =
    "ssh-ed25519-cert-v01@openssh.com AAAAIHNzaC1lZDI1NTE5LWNlcnQtdjAxQG9wZW5zc2guY29t web01";

// ============================================================================
// Fixtures
// ============================================================================

fn token_body(token: &str) -> serde_json::Value {
    json!({
        "access_token": token,
        "expires_in": 300,
        "refresh_expires_in": 0,
        "token_type": "Bearer",
        "scope": "openid"
    })
}

fn client_credentials(server: &MockServer) -> OAuthConfig {
    OAuthConfig {
        server_url: Some(server.uri()),
        client_id: Some("ssh-keysign".into()),
        client_secret: Some("s3cret".into()),
        token_url: Some(format!("{}/token", server.uri())),
        device_flow_url: None,
        token_poll_url: None,
    }
}

fn device_flow(server: &MockServer) -> OAuthConfig {
    OAuthConfig {
        token_url: None,
        device_flow_url: Some(format!("{}/device", server.uri())),
        token_poll_url: Some(format!("{}/token", server.uri())),
        ..client_credentials(server)
    }
}

/// Writes a fresh public key with a comment and returns (path, normalized key).
fn write_public_key(dir: &Path, name: &str) -> (String, String) {
    let pair = keysign_ssh::new_ed25519().unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("  {} root@web01  \n", pair.public_key)).unwrap();
    (path.to_string_lossy().into_owned(), pair.public_key)
}

async fn mount_client_credentials(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
        .mount(server)
        .await;
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// CA stand-in that signs whatever public key it is sent.
struct SigningCa {
    ca_key: PrivateKey,
    valid_for: u64,
}

impl Respond for SigningCa {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let public = PublicKey::from_openssh(body["publicKey"].as_str().unwrap()).unwrap();
        let principal = body["principal"].as_str().unwrap();

        let issued = now();
        let mut builder = Builder::new_with_random_nonce(
            &mut rand::thread_rng(),
            public.key_data().clone(),
            issued - 10,
            issued + self.valid_for,
        )
        .unwrap();
        builder.serial(42).unwrap();
        builder.key_id(principal).unwrap();
        builder.cert_type(CertType::User).unwrap();
        builder.valid_principal(principal).unwrap();
        let certificate = builder.sign(&self.ca_key).unwrap();

        ResponseTemplate::new(200)
            .set_body_json(json!({ "signedKey": certificate.to_openssh().unwrap() }))
    }
}

fn signing_ca(valid_for: u64) -> SigningCa {
    SigningCa {
        ca_key: PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap(),
        valid_for,
    }
}

const SSH_AGENT_FAILURE: u8 = 5;
const SSH_AGENT_SUCCESS: u8 = 6;

/// Fake ssh-agent accepting one request and answering with `reply`;
/// returns the raw message body.
fn fake_agent(dir: &Path, reply: u8) -> (PathBuf, tokio::task::JoinHandle<Vec<u8>>) {
    let socket = dir.join("agent.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    let handle = tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let len = conn.read_u32().await.unwrap();
        let mut body = vec![0u8; len as usize];
        conn.read_exact(&mut body).await.unwrap();
        conn.write_all(&[0, 0, 0, 1, reply]).await.unwrap();
        body
    });
    (socket, handle)
}

/// Fake ssh-agent that accepts a connection and never answers.
fn silent_agent(dir: &Path) -> PathBuf {
    let socket = dir.join("agent.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(async move {
        let (conn, _) = listener.accept().await.unwrap();
        std::future::pending::<()>().await;
        drop(conn);
    });
    socket
}

fn agent_config(server: &MockServer, dir: &Path, socket: PathBuf) -> Config {
    Config {
        oauth: client_credentials(server),
        user: UserConfig {
            principals: vec!["alice".into()],
            agent: true,
            agent_socket: Some(socket),
            ssh_dir: Some(dir.join(".ssh")),
            ..Default::default()
        },
        ..Default::default()
    }
}

// ============================================================================
// Host flow
// ============================================================================

#[tokio::test]
async fn test_host_flow_writes_certificate_beside_key() {
    let dir = TempDir::new().unwrap();
    let (key, public_key) = write_public_key(dir.path(), "ssh_host_ed25519_key.pub");

    let server = MockServer::start().await;
    mount_client_credentials(&server, "host-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/hostSign"))
        .and(header("authorization", "Bearer host-token"))
        .and(body_json(json!({
            "filename": "ssh_host_ed25519_key.pub",
            "publicKey": public_key,
            "principal": "web01.example.com"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "signedKey": HOST_CERT })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        oauth: client_credentials(&server),
        host: HostConfig {
            key: Some(key),
            principals: vec!["web01.example.com".into(), "web01".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (printer, output) = Printer::buffer(Verbosity::Normal);

    let stored = Runner::new(config)
        .unwrap()
        .sign_host_key(&printer, &CancellationToken::new())
        .await
        .expect("host flow should succeed");

    let cert_path = dir.path().join("ssh_host_ed25519_key-cert.pub");
    assert_eq!(stored, StoredCert::File(cert_path.clone()));
    assert_eq!(
        std::fs::read_to_string(&cert_path).unwrap().trim_end(),
        HOST_CERT
    );
    assert_eq!(
        output.contents(),
        format!("certificate stored at {}\n", cert_path.display())
    );
}

#[tokio::test]
async fn test_host_flow_uses_ca_filename() {
    let dir = TempDir::new().unwrap();
    let (key, _) = write_public_key(dir.path(), "ssh_host_ed25519_key.pub");

    let server = MockServer::start().await;
    mount_client_credentials(&server, "host-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/hostSign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "filename": "web01-cert.pub",
            "signedKey": HOST_CERT
        })))
        .mount(&server)
        .await;

    let config = Config {
        oauth: client_credentials(&server),
        host: HostConfig {
            key: Some(key),
            principals: vec!["web01".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let stored = Runner::new(config)
        .unwrap()
        .sign_host_key(&printer, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stored, StoredCert::File(dir.path().join("web01-cert.pub")));
}

#[tokio::test]
async fn test_host_flow_ca_rejection_is_http_error() {
    let dir = TempDir::new().unwrap();
    let (key, _) = write_public_key(dir.path(), "ssh_host_ed25519_key.pub");

    let server = MockServer::start().await;
    mount_client_credentials(&server, "host-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/hostSign"))
        .respond_with(ResponseTemplate::new(403).set_body_string("principal not allowed"))
        .mount(&server)
        .await;

    let config = Config {
        oauth: client_credentials(&server),
        host: HostConfig {
            key: Some(key),
            principals: vec!["db01".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let err = Runner::new(config)
        .unwrap()
        .sign_host_key(&printer, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Http);
    assert_eq!(err.exit_code(), 14);
    assert!(err.to_string().contains("principal not allowed"));
    assert!(!dir.path().join("ssh_host_ed25519_key-cert.pub").exists());
}

#[tokio::test]
async fn test_host_flow_token_rejection_is_auth_error() {
    let dir = TempDir::new().unwrap();
    let (key, _) = write_public_key(dir.path(), "ssh_host_ed25519_key.pub");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let config = Config {
        oauth: client_credentials(&server),
        host: HostConfig {
            key: Some(key),
            principals: vec!["web01".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let err = Runner::new(config)
        .unwrap()
        .sign_host_key(&printer, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.exit_code(), 11);
}

#[tokio::test]
async fn test_host_flow_unreachable_ca_is_network_error() {
    let dir = TempDir::new().unwrap();
    let (key, _) = write_public_key(dir.path(), "ssh_host_ed25519_key.pub");

    let server = MockServer::start().await;
    mount_client_credentials(&server, "host-token").await;

    let config = Config {
        oauth: OAuthConfig {
            server_url: Some("http://127.0.0.1:1".into()),
            ..client_credentials(&server)
        },
        host: HostConfig {
            key: Some(key),
            principals: vec!["web01".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let err = Runner::new(config)
        .unwrap()
        .sign_host_key(&printer, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
}

// ============================================================================
// User flow
// ============================================================================

#[tokio::test]
async fn test_user_flow_device_login_writes_generated_key_pair() {
    let dir = TempDir::new().unwrap();
    let ssh_dir = dir.path().join(".ssh");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dc-1",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://id.example.com/device",
            "verification_uri_complete": "https://id.example.com/device?user_code=ABCD-EFGH",
            "expires_in": 600,
            "interval": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending",
            "error_description": "pending"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("device_code=dc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-token")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/key/userSign"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(signing_ca(3600))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        oauth: device_flow(&server),
        user: UserConfig {
            principals: vec!["alice".into(), "admin".into()],
            ssh_dir: Some(ssh_dir.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    let fast = BackoffConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        max_elapsed_time: Duration::from_secs(5),
        factor: 2.0,
    };
    let (printer, output) = Printer::buffer(Verbosity::Normal);

    let stored = Runner::new(config)
        .unwrap()
        .with_oauth_client(
            CaAuthClient::new(keysign_core::http_client().unwrap()).with_backoff(fast),
        )
        .sign_user_key(&printer, &CancellationToken::new())
        .await
        .expect("user flow should succeed");

    let StoredCert::KeyPair(files) = stored else {
        panic!("expected generated key pair storage, got {stored:?}");
    };
    assert!(files.private_key.starts_with(&ssh_dir));

    let private = PrivateKey::read_openssh_file(&files.private_key).unwrap();
    let cert_line = std::fs::read_to_string(&files.certificate).unwrap();
    let certificate = keysign_ssh::parse_certificate(&cert_line).unwrap();
    assert_eq!(certificate.public_key(), private.public_key().key_data());
    assert_eq!(certificate.valid_principals(), ["alice".to_string()]);

    let output = output.contents();
    assert!(output.contains("[ ABCD-EFGH ]"));
    assert!(output.contains(&format!(
        "certificate stored at {}",
        files.certificate.display()
    )));
}

#[tokio::test]
async fn test_user_flow_loads_generated_key_into_agent() {
    let dir = TempDir::new().unwrap();
    let (socket, agent) = fake_agent(dir.path(), SSH_AGENT_SUCCESS);

    let server = MockServer::start().await;
    mount_client_credentials(&server, "user-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/userSign"))
        .respond_with(signing_ca(60))
        .mount(&server)
        .await;

    let config = agent_config(&server, dir.path(), socket);
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let stored = Runner::new(config)
        .unwrap()
        .sign_user_key(&printer, &CancellationToken::new())
        .await
        .expect("agent storage should succeed");

    let StoredCert::Agent { lifetime_secs } = stored else {
        panic!("expected agent storage, got {stored:?}");
    };
    assert!((55..=60).contains(&lifetime_secs));

    let message = agent.await.unwrap();
    assert_eq!(message[0], 25);
    assert_eq!(*message.last().unwrap(), 2);
    let lifetime_bytes = &message[message.len() - 5..message.len() - 1];
    assert_eq!(u32::from_be_bytes(lifetime_bytes.try_into().unwrap()) as u64, lifetime_secs);

    assert!(!dir.path().join(".ssh").exists());
}

#[tokio::test]
async fn test_user_flow_missing_agent_socket_is_usage_error() {
    let dir = TempDir::new().unwrap();

    let server = MockServer::start().await;
    mount_client_credentials(&server, "user-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/userSign"))
        .respond_with(signing_ca(60))
        .expect(0)
        .mount(&server)
        .await;

    let config = agent_config(&server, dir.path(), dir.path().join("no-such.sock"));
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let err = Runner::new(config)
        .unwrap()
        .sign_user_key(&printer, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(err.exit_code(), 2);
    assert!(err.to_string().contains("no-such.sock"));
}

#[tokio::test]
async fn test_user_flow_agent_failure_reply_is_network_error() {
    let dir = TempDir::new().unwrap();
    let (socket, _agent) = fake_agent(dir.path(), SSH_AGENT_FAILURE);

    let server = MockServer::start().await;
    mount_client_credentials(&server, "user-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/userSign"))
        .respond_with(signing_ca(3600))
        .mount(&server)
        .await;

    let config = agent_config(&server, dir.path(), socket);
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let err = Runner::new(config)
        .unwrap()
        .sign_user_key(&printer, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.exit_code(), 10);
    assert!(err.to_string().contains("ssh-agent"));
}

#[tokio::test]
async fn test_user_flow_cancel_interrupts_silent_agent() {
    let dir = TempDir::new().unwrap();
    let socket = silent_agent(dir.path());

    let server = MockServer::start().await;
    mount_client_credentials(&server, "user-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/userSign"))
        .respond_with(signing_ca(3600))
        .mount(&server)
        .await;

    let config = agent_config(&server, dir.path(), socket);
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let runner = Runner::new(config).unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), runner.sign_user_key(&printer, &cancel))
        .await
        .expect("cancel should stop the agent exchange")
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(err.exit_code(), 12);
}

#[tokio::test]
async fn test_user_flow_with_key_file_writes_certificate() {
    let dir = TempDir::new().unwrap();
    let (key, public_key) = write_public_key(dir.path(), "id_ed25519.pub");

    let server = MockServer::start().await;
    mount_client_credentials(&server, "user-token").await;
    Mock::given(method("POST"))
        .and(path("/rest/key/userSign"))
        .and(body_json(json!({
            "filename": "id_ed25519.pub",
            "publicKey": public_key,
            "principal": "alice"
        })))
        .respond_with(signing_ca(3600))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config {
        oauth: client_credentials(&server),
        user: UserConfig {
            key: Some(key),
            principals: vec!["alice".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let stored = Runner::new(config)
        .unwrap()
        .sign_user_key(&printer, &CancellationToken::new())
        .await
        .unwrap();

    let cert_path = dir.path().join("id_ed25519-cert.pub");
    assert_eq!(stored, StoredCert::File(cert_path.clone()));
    keysign_ssh::parse_certificate(&std::fs::read_to_string(cert_path).unwrap()).unwrap();
}

#[tokio::test]
async fn test_user_flow_canceled_before_start() {
    let server = MockServer::start().await;
    mount_client_credentials(&server, "user-token").await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        oauth: client_credentials(&server),
        user: UserConfig {
            principals: vec!["alice".into()],
            ssh_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        },
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (printer, _) = Printer::buffer(Verbosity::Quiet);

    let err = Runner::new(config)
        .unwrap()
        .sign_user_key(&printer, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(err.exit_code(), 12);
}
