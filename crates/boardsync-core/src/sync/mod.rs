//! Board synchronization layer
//!
//! ## Overview
//!
//! The sync module is the replication engine of boardsync: it keeps every
//! node's copy of a discussion board converging to the same set of posts.
//! Each board carries its own vector clock; peers exchange clocks to find
//! out who is ahead, push the posts the other side lacks, and gossip fresh
//! posts as they are published. Every post is signed by its author and
//! verified before it is accepted.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncManager (per-node orchestrator)                            │
//! │  ├── clock registry (BoardId → VectorClock)                     │
//! │  ├── admission pipeline (validate → verify → persist → clock)   │
//! │  ├── sync rounds (SyncRequest fan-out, proactive push back)     │
//! │  └── gossip (forward stored posts to subscribed peers)          │
//! │                                                                 │
//! │  SyncScheduler (background task)                                │
//! │  └── periodic rounds with failure backoff                       │
//! │                                                                 │
//! │  Events (broadcast channel)                                     │
//! │  └── PostStored / PostRejected / BoardSynced / PeerUnreachable  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Five message kinds cover the whole protocol:
//!
//! - **SyncRequest**: open an exchange by sending the local clock
//! - **SyncResponse**: answer with the responder's clock
//! - **ReqMissing**: ask for specific posts by id
//! - **Post**: gossip one freshly stored post
//! - **PostBatch**: bulk transfer of posts, admitted independently
//!
//! ## Usage
//!
//! ```ignore
//! let manager = Arc::new(SyncManager::new(identity, store, transport, config));
//!
//! // Register as the transport's inbound handler, then sync a board.
//! network.register_handler(manager.local_peer().clone(), manager.clone());
//! manager.sync_board(&board_id, None).await?;
//!
//! // Or let the scheduler drive rounds in the background.
//! let scheduler = SyncScheduler::new(manager.clone());
//! scheduler.start();
//! ```

pub mod admission;
pub mod events;
pub mod manager;
pub mod protocol;
pub mod scheduler;

pub use admission::{validate_payload, AdmitOutcome, RejectReason, ValidatedPost};
pub use events::SyncEvent;
pub use manager::{missing_ranges, SyncManager};
pub use protocol::{
    canonical_post_bytes, canonical_timestamp, PostPayload, SyncMessage, WireMessage,
};
pub use scheduler::SyncScheduler;
