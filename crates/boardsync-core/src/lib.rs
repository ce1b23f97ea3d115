//! Boardsync Core Library
//!
//! Replication core for a P2P discussion board: per-board vector clocks,
//! signed posts, and a pairwise sync protocol that converges every peer to
//! the same set of posts without a central server.
//!
//! ## Overview
//!
//! Each board is replicated independently. A board's vector clock tracks
//! the highest post sequence number seen per author; two peers exchange
//! clocks to discover which posts the other lacks, then transfer exactly
//! those. Fresh posts also spread by gossip as they are published. Every
//! post is signed with the author's Ed25519 key and verified on admission,
//! so peers relay each other's posts without being trusted.
//!
//! ## Core Principles
//!
//! - **Local-first**: authoring works offline; replication catches up when
//!   peers are reachable
//! - **Verify everything**: a post enters storage only after its signature
//!   checks out against the author's registered key
//! - **Converge from both ends**: periodic sync rounds plus gossip, with
//!   idempotent admission, so duplicate and out-of-order delivery are
//!   harmless
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use boardsync_core::{
//!     BoardRecord, InProcessNetwork, LocalIdentity, MemoryStore, SyncConfig,
//!     SyncManager, SyncScheduler, ThreadRecord,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let identity = LocalIdentity::generate();
//!     let store = MemoryStore::new();
//!
//!     // Boards, threads, and peer keys are seeded out of band.
//!     let board = BoardRecord::new("general");
//!     let thread = ThreadRecord::new(board.id, "introductions");
//!     store.insert_board(board.clone());
//!     store.insert_thread(thread.clone())?;
//!     store.upsert_peer(identity.peer_record());
//!
//!     let network = InProcessNetwork::new();
//!     let endpoint = network.endpoint(identity.peer_id().clone());
//!     let manager = Arc::new(SyncManager::new(
//!         identity,
//!         Arc::new(store),
//!         Arc::new(endpoint),
//!         SyncConfig::default(),
//!     ));
//!     network.register_handler(manager.local_peer().clone(), manager.clone());
//!
//!     // Author a post; it is signed, stored, and gossiped.
//!     manager.publish_post(&board.id, &thread.id, "hello, board", None).await?;
//!
//!     // Keep converging in the background.
//!     let scheduler = SyncScheduler::new(manager.clone());
//!     scheduler.start();
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod store;
pub mod sync;
pub mod transport;
pub mod types;

// Re-exports
pub use clock::{ClockOrdering, VectorClock};
pub use config::SyncConfig;
pub use crypto::{derive_peer_id, Ed25519Verifier, LocalIdentity, SignatureVerifier};
pub use error::{SyncError, SyncResult};
pub use store::{MemoryStore, Store};
pub use sync::{
    AdmitOutcome, PostPayload, RejectReason, SyncEvent, SyncManager, SyncMessage, SyncScheduler,
    WireMessage,
};
pub use transport::{InProcessEndpoint, InProcessNetwork, MessageHandler, Transport};
pub use types::*;
