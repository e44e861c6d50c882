// ABOUTME: Production KeyHandler backed by the keysign-ssh key helpers
// ABOUTME: Reads public key files and generates ed25519 pairs

use crate::error::Result;
use crate::service::KeyHandler;
use keysign_ssh::{Ed25519KeyPair, PublicKeyInfo};

#[derive(Debug, Clone, Copy, Default)]
pub struct SshKeyHandler;

impl KeyHandler for SshKeyHandler {
    fn read_public_key(&self, path: &str) -> Result<PublicKeyInfo> {
        Ok(keysign_ssh::read_public_key(path)?)
    }

    fn new_ed25519(&self) -> Result<Ed25519KeyPair> {
        Ok(keysign_ssh::new_ed25519()?)
    }
}
