//! Wire protocol for board synchronization
//!
//! Messages are serialized with postcard and delivered through the
//! transport. The set is closed: five message kinds cover the whole
//! protocol, and every message is self-contained (board id plus full clock
//! where relevant), so no session state exists outside the clock registry
//! and the store.
//!
//! ## Message Flow
//!
//! ```text
//! Peer A                               Peer B
//!   |                                    |
//!   |--- SyncRequest {clock_A} -------->|
//!   |<-- SyncResponse {clock_B} --------|
//!   |<-- PostBatch {posts A lacks} -----|   (proactive push)
//!   |                                    |
//!   |--- ReqMissing {ids} ------------->|   (when locally resolvable)
//!   |<-- PostBatch {found posts} -------|
//!   |                                    |
//!   |--- Post {payload} --------------->|   (gossip of a fresh post)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BoardId, PeerId, Post, PostId, ThreadId};

/// Render a timestamp in the canonical wire form
///
/// Microsecond precision with a `Z` suffix. Locally produced posts are
/// signed over this exact rendering, so it must stay byte-stable across
/// parse/format round trips.
pub fn canonical_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The byte string a post signature covers
///
/// Concatenation of the hyphenated post and thread UUIDs, author id,
/// content, timestamp text, and sequence number, in that order with no
/// separators. The timestamp goes in exactly as transmitted; verification
/// must never re-serialize it.
pub fn canonical_post_bytes(
    id: &PostId,
    thread_id: &ThreadId,
    author: &PeerId,
    content: &str,
    created_at: &str,
    sequence_number: u64,
) -> Vec<u8> {
    format!(
        "{}{}{}{}{}{}",
        id.as_uuid(),
        thread_id.as_uuid(),
        author.as_str(),
        content,
        created_at,
        sequence_number
    )
    .into_bytes()
}

/// A post as it travels on the wire
///
/// Carries everything admission needs, including the board id (posts in
/// storage reach their board through the thread instead). The signature is
/// hex-encoded; the timestamp is RFC 3339 text and is verified verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    /// Post identifier
    pub id: PostId,
    /// Thread the post belongs to
    pub thread_id: ThreadId,
    /// Author peer id
    pub author_peer_id: PeerId,
    /// Post body
    pub content: String,
    /// Creation timestamp, RFC 3339
    pub created_at: String,
    /// Per-author sequence number
    pub sequence_number: u64,
    /// Hex-encoded Ed25519 signature
    pub signature: String,
    /// Parent post for replies
    pub parent_post_id: Option<PostId>,
    /// Board the post belongs to
    pub board_id: BoardId,
}

impl PostPayload {
    /// Build the wire form of a stored post
    pub fn from_post(post: &Post, board_id: BoardId) -> Self {
        Self {
            id: post.id,
            thread_id: post.thread_id,
            author_peer_id: post.author_peer_id.clone(),
            content: post.content.clone(),
            created_at: canonical_timestamp(&post.created_at),
            sequence_number: post.sequence_number,
            signature: hex::encode(&post.signature),
            parent_post_id: post.parent_post_id,
            board_id,
        }
    }

    /// The byte string this payload's signature covers
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_post_bytes(
            &self.id,
            &self.thread_id,
            &self.author_peer_id,
            &self.content,
            &self.created_at,
            self.sequence_number,
        )
    }
}

/// Messages exchanged between peers during board sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// "Here is what I have": opens a sync exchange
    ///
    /// The receiver replies with its own clock and proactively pushes
    /// whatever the sender is missing.
    SyncRequest {
        /// The board being synchronized
        board_id: BoardId,
        /// The sender's full clock for the board
        vector_clock: BTreeMap<PeerId, u64>,
    },

    /// Reply to a SyncRequest carrying the responder's clock
    SyncResponse {
        /// The board being synchronized
        board_id: BoardId,
        /// The responder's full clock for the board
        vector_clock: BTreeMap<PeerId, u64>,
    },

    /// "Send me these posts"
    ///
    /// Ids the receiver cannot find are skipped silently.
    ReqMissing {
        /// The board being synchronized
        board_id: BoardId,
        /// Posts the sender wants
        post_ids: Vec<PostId>,
    },

    /// A single post delivered by gossip
    Post {
        /// The full post payload
        post: PostPayload,
    },

    /// Bulk post delivery
    ///
    /// Each post is admitted independently; one bad post never blocks the
    /// rest of the batch.
    PostBatch {
        /// The board being synchronized
        board_id: BoardId,
        /// The posts being transferred
        posts: Vec<PostPayload>,
    },
}

impl SyncMessage {
    /// Encode message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// The board this message relates to
    pub fn board_id(&self) -> BoardId {
        match self {
            SyncMessage::SyncRequest { board_id, .. } => *board_id,
            SyncMessage::SyncResponse { board_id, .. } => *board_id,
            SyncMessage::ReqMissing { board_id, .. } => *board_id,
            SyncMessage::Post { post } => post.board_id,
            SyncMessage::PostBatch { board_id, .. } => *board_id,
        }
    }

    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::SyncRequest { .. } => "sync_request",
            SyncMessage::SyncResponse { .. } => "sync_response",
            SyncMessage::ReqMissing { .. } => "req_missing",
            SyncMessage::Post { .. } => "post",
            SyncMessage::PostBatch { .. } => "post_batch",
        }
    }
}

/// Wrapper for versioned messages (future-proofing)
///
/// Allows protocol evolution while maintaining backward compatibility.
/// New versions can be added as variants without breaking existing nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// Protocol version 1
    V1(SyncMessage),
}

impl WireMessage {
    /// Create a new wire message wrapping a sync message
    pub fn new(msg: SyncMessage) -> Self {
        WireMessage::V1(msg)
    }

    /// Encode wire message to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode wire message from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Unwrap the inner SyncMessage
    pub fn into_inner(self) -> SyncMessage {
        match self {
            WireMessage::V1(msg) => msg,
        }
    }

    /// Get a reference to the inner SyncMessage
    pub fn as_inner(&self) -> &SyncMessage {
        match self {
            WireMessage::V1(msg) => msg,
        }
    }

    /// Get the protocol version
    pub fn version(&self) -> u8 {
        match self {
            WireMessage::V1(_) => 1,
        }
    }
}
