//! Signing identities and the signature verification seam
//!
//! Post authenticity rests on Ed25519: every post is signed by its author
//! over a canonical byte string, and admission verifies against the public
//! key on file for that author. Verification goes through the
//! [`SignatureVerifier`] trait so embedders can substitute their own
//! implementation; [`Ed25519Verifier`] is the stock one.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{SyncError, SyncResult};
use crate::types::{PeerId, PeerRecord};

/// Verifies a detached signature against a raw Ed25519 public key
pub trait SignatureVerifier: Send + Sync {
    /// Check `signature` over `message` against `public_key`
    ///
    /// Returns `Ok(())` when the signature verifies; any failure (malformed
    /// key, wrong key, forged signature) is `SyncError::SignatureInvalid`.
    fn verify(&self, message: &[u8], signature: &[u8; 64], public_key: &[u8; 32])
        -> SyncResult<()>;
}

/// Stock verifier backed by ed25519-dalek
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8; 64],
        public_key: &[u8; 32],
    ) -> SyncResult<()> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| SyncError::SignatureInvalid(format!("malformed public key: {e}")))?;
        let signature = Signature::from_bytes(signature);
        key.verify(message, &signature)
            .map_err(|e| SyncError::SignatureInvalid(e.to_string()))
    }
}

/// Derive a peer identifier from a raw Ed25519 public key
///
/// Peer ids are the hex-encoded SHA-256 of the public key, so they are
/// stable across sessions and verifiable by anyone holding the key.
pub fn derive_peer_id(public_key: &[u8; 32]) -> PeerId {
    let digest = Sha256::digest(public_key);
    PeerId::new(hex::encode(digest))
}

/// The local node's signing identity
///
/// Holds the Ed25519 signing key used by
/// [`crate::sync::SyncManager::publish_post`] and the peer id derived from
/// its public half.
pub struct LocalIdentity {
    peer_id: PeerId,
    signing_key: SigningKey,
}

impl LocalIdentity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        // Seed bytes straight from the OS; SigningKey::from_bytes sidesteps
        // rand_core version coupling in ed25519-dalek.
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Build a deterministic identity from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let peer_id = derive_peer_id(&signing_key.verifying_key().to_bytes());
        Self {
            peer_id,
            signing_key,
        }
    }

    /// The peer id derived from this identity's public key
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Raw public verification key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message, returning the detached 64-byte signature
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Peer record announcing this identity, for seeding peer stores
    pub fn peer_record(&self) -> PeerRecord {
        PeerRecord {
            peer_id: self.peer_id.clone(),
            public_key: self.public_key_bytes(),
            is_trusted: false,
            is_banned: false,
        }
    }
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the signing key
        f.debug_struct("LocalIdentity")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}
