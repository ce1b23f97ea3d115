//! Events emitted while boards synchronize
//!
//! The [`crate::sync::SyncManager`] broadcasts a [`SyncEvent`] for every
//! notable outcome so embedders (UI, metrics, tests) can observe sync
//! activity without polling. Events are informational only; protocol
//! correctness never depends on anyone listening.

use crate::sync::admission::RejectReason;
use crate::types::{BoardId, PeerId, PostId};

/// Notifications about sync activity
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A remote post passed admission and was stored
    PostStored {
        /// Board the post belongs to
        board_id: BoardId,
        /// The stored post
        post_id: PostId,
        /// The post's author
        author: PeerId,
    },
    /// A remote post was rejected by admission
    PostRejected {
        /// Board the post claimed
        board_id: BoardId,
        /// The rejected post's id
        post_id: PostId,
        /// Why admission refused it
        reason: RejectReason,
    },
    /// A sync round was initiated for a board
    BoardSynced {
        /// The board that was synchronized
        board_id: BoardId,
        /// Peers the request reached
        peers_contacted: usize,
    },
    /// A send to a peer failed
    PeerUnreachable {
        /// Board the send belonged to
        board_id: BoardId,
        /// The unreachable peer
        peer_id: PeerId,
    },
}

impl SyncEvent {
    /// The board this event relates to
    pub fn board_id(&self) -> BoardId {
        match self {
            SyncEvent::PostStored { board_id, .. } => *board_id,
            SyncEvent::PostRejected { board_id, .. } => *board_id,
            SyncEvent::BoardSynced { board_id, .. } => *board_id,
            SyncEvent::PeerUnreachable { board_id, .. } => *board_id,
        }
    }
}
