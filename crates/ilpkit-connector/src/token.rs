//! Node identity and per-peer namespace derivation.

use rand::RngCore;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::ConnectorError;

const TOKEN_CONTEXT: &str = "ilpkit-peer-token-v1";

/// The node's X25519 key pair.
pub struct NodeKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl NodeKey {
    /// Load the key from a hex encoded 32 byte secret.
    pub fn from_hex(secret_hex: &str) -> Result<Self, ConnectorError> {
        let bytes = decode_key(secret_hex)?;
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Token shared with the owner of `peer_public_key_hex`. Both ends of a
    /// peer pair derive the same value.
    pub fn shared_token(&self, peer_public_key_hex: &str) -> Result<String, ConnectorError> {
        let peer = PublicKey::from(decode_key(peer_public_key_hex)?);
        let shared = self.secret.diffie_hellman(&peer);
        let token = blake3::derive_key(TOKEN_CONTEXT, shared.as_bytes());
        Ok(hex::encode(token))
    }

    /// Namespace of the channel to the given peer.
    pub fn namespace(
        &self,
        peer_public_key_hex: &str,
        currency: &str,
    ) -> Result<String, ConnectorError> {
        let token = self.shared_token(peer_public_key_hex)?;
        Ok(format!("peer.{}.{}.", &token[..5], currency.to_lowercase()))
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

fn decode_key(key_hex: &str) -> Result<[u8; 32], ConnectorError> {
    let bytes = hex::decode(key_hex.trim())
        .map_err(|e| ConnectorError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ConnectorError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))
}
