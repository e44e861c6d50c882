// ABOUTME: SSH key, certificate and ssh-agent utilities for ssh-keysign.
// ABOUTME: Re-exports key resolution, certificate helpers and the agent client.

pub mod agent;
pub mod cert;
pub mod error;
pub mod fs;
pub mod key;

pub use agent::{add_certificate, AddedKey};
pub use cert::{
    agent_lifetime, certificate_file_path, named_certificate_path, parse_certificate,
    random_key_file_name, CERT_TIME_INFINITY,
};
pub use error::{Result, SshError};
pub use fs::{ensure_private_dir, write_private_file};
pub use key::{
    new_ed25519, normalize_path, parse_public_key, read_public_key, Ed25519KeyPair,
    PublicKeyInfo,
};
pub use ssh_key::Certificate;
