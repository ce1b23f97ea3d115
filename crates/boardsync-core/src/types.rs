//! Core types for boardsync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a board
///
/// A board is the unit of synchronization: every vector clock, sync
/// session, and gossip fan-out is scoped to one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardId(pub Uuid);

impl BoardId {
    /// Create a new random BoardId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a BoardId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from a hyphenated UUID string
    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "board_{:.8}", self.0.simple().to_string())
    }
}

/// Unique identifier for a thread within a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    /// Create a new random ThreadId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a ThreadId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from a hyphenated UUID string
    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "thread_{:.8}", self.0.simple().to_string())
    }
}

/// Unique identifier for a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostId(pub Uuid);

impl PostId {
    /// Create a new random PostId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a PostId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from a hyphenated UUID string
    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "post_{:.8}", self.0.simple().to_string())
    }
}

/// Opaque identifier for a peer
///
/// Produced locally as the hex-encoded SHA-256 of the peer's Ed25519
/// public key (see [`crate::crypto::LocalIdentity`]), but treated as an
/// opaque string everywhere else so imported identities round-trip
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a PeerId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form for logs; full id via as_str()
        write!(f, "{:.8}", self.0)
    }
}

/// A discussion post
///
/// The signature covers the canonical concatenation of id, thread id,
/// author, content, timestamp, and sequence number (see
/// [`crate::sync::canonical_post_bytes`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    /// Unique identifier for the post
    pub id: PostId,
    /// Thread this post belongs to
    pub thread_id: ThreadId,
    /// Peer that authored the post
    pub author_peer_id: PeerId,
    /// Post body text
    pub content: String,
    /// Creation timestamp (UTC)
    pub created_at: DateTime<Utc>,
    /// Per-author sequence number within the board
    pub sequence_number: u64,
    /// Ed25519 signature bytes (64 bytes)
    pub signature: Vec<u8>,
    /// Post this one replies to, if any
    pub parent_post_id: Option<PostId>,
}

/// Identity record for a known peer
///
/// The admission pipeline reads `public_key` to verify post signatures.
/// Trust and ban flags are carried for upper layers; the sync core never
/// writes this record.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    /// Peer identifier
    pub peer_id: PeerId,
    /// Raw Ed25519 public verification key
    pub public_key: [u8; 32],
    /// Whether the local user marked this peer trusted
    pub is_trusted: bool,
    /// Whether the local user banned this peer
    pub is_banned: bool,
}

/// Board metadata row
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRecord {
    /// Unique identifier for the board
    pub id: BoardId,
    /// Human-readable name
    pub name: String,
}

impl BoardRecord {
    /// Create a new board with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BoardId::new(),
            name: name.into(),
        }
    }
}

/// Thread metadata row
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRecord {
    /// Unique identifier for the thread
    pub id: ThreadId,
    /// Board this thread belongs to
    pub board_id: BoardId,
    /// Thread title
    pub title: String,
}

impl ThreadRecord {
    /// Create a new thread on the given board
    pub fn new(board_id: BoardId, title: impl Into<String>) -> Self {
        Self {
            id: ThreadId::new(),
            board_id,
            title: title.into(),
        }
    }
}
