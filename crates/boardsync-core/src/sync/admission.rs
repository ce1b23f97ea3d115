//! Admission gates for posts arriving from the network
//!
//! Everything a remote peer sends is untrusted until it clears the
//! pipeline in [`crate::sync::SyncManager::handle_incoming_post`]. This
//! module holds the pipeline's vocabulary ([`AdmitOutcome`],
//! [`RejectReason`]) and the first gate: structural validation of the raw
//! wire payload into a typed [`ValidatedPost`].

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::sync::protocol::PostPayload;
use crate::types::Post;

/// Why admission refused a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// A required field is empty
    #[error("missing required fields")]
    IncompleteFields,

    /// The signature is not valid hex or not 64 bytes
    #[error("malformed signature encoding")]
    MalformedSignature,

    /// The timestamp is not valid RFC 3339
    #[error("unparseable timestamp")]
    InvalidTimestamp,

    /// No identity record exists for the claimed author
    #[error("unknown author")]
    UnknownAuthor,

    /// The signature does not verify against the author's key
    #[error("signature verification failed")]
    BadSignature,
}

/// Result of running a post through admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The post was new, verified, and persisted
    Stored,
    /// The post was already in storage; a no-op, not a failure
    AlreadyPresent,
    /// The post failed a gate and no state changed
    Rejected(RejectReason),
}

impl AdmitOutcome {
    /// True for outcomes a sender should consider successful delivery
    pub fn is_success(&self) -> bool {
        matches!(self, AdmitOutcome::Stored | AdmitOutcome::AlreadyPresent)
    }
}

/// A payload that cleared structural validation
///
/// Holds the typed post and the decoded signature; the canonical bytes for
/// verification still come from the original payload so the received
/// timestamp text is used verbatim.
#[derive(Debug)]
pub struct ValidatedPost {
    /// The typed post, ready to persist
    pub post: Post,
    /// Decoded 64-byte signature
    pub signature: [u8; 64],
}

/// Structural validation: field completeness, signature decode, timestamp
/// parse
///
/// Purely local checks; key resolution and verification happen later, under
/// the admission lock.
pub fn validate_payload(payload: &PostPayload) -> Result<ValidatedPost, RejectReason> {
    if payload.content.is_empty()
        || payload.author_peer_id.as_str().is_empty()
        || payload.created_at.is_empty()
        || payload.signature.is_empty()
    {
        return Err(RejectReason::IncompleteFields);
    }

    let signature_bytes =
        hex::decode(&payload.signature).map_err(|_| RejectReason::MalformedSignature)?;
    let signature: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| RejectReason::MalformedSignature)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&payload.created_at)
        .map_err(|_| RejectReason::InvalidTimestamp)?
        .with_timezone(&Utc);

    Ok(ValidatedPost {
        post: Post {
            id: payload.id,
            thread_id: payload.thread_id,
            author_peer_id: payload.author_peer_id.clone(),
            content: payload.content.clone(),
            created_at,
            sequence_number: payload.sequence_number,
            signature: signature.to_vec(),
            parent_post_id: payload.parent_post_id,
        },
        signature,
    })
}
