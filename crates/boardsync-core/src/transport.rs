//! Transport interface consumed by the sync core
//!
//! Real networking (connection setup, discovery, framing) lives outside this
//! crate. The core sends through [`Transport`] and receives through the
//! [`MessageHandler`] it registers with the transport; that handler call is
//! the sole inbound entry point into the replication core.
//!
//! [`InProcessNetwork`] wires co-resident nodes together directly and is
//! what the integration tests run on: sends invoke the receiver's handler
//! inline, and removing a handler simulates a partition.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::sync::WireMessage;
use crate::types::{BoardId, PeerId};

/// Peer-addressed message channel plus per-board membership view
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a wire message to one peer
    async fn send_message(&self, peer_id: &PeerId, message: WireMessage) -> SyncResult<()>;

    /// Peers currently known to participate in a board, excluding the
    /// local node
    fn peers_for_board(&self, board_id: &BoardId) -> Vec<PeerId>;
}

/// Inbound side of the transport: invoked once per received message
///
/// Implementations absorb their own failures; a malformed or unprocessable
/// message must never take down the network loop that delivered it.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message sent by `from`
    async fn handle_message(&self, from: &PeerId, message: WireMessage);
}

#[derive(Default)]
struct HubState {
    handlers: RwLock<HashMap<PeerId, Arc<dyn MessageHandler>>>,
    subscriptions: RwLock<HashMap<BoardId, BTreeSet<PeerId>>>,
}

/// In-process message hub connecting co-resident nodes
///
/// Each node registers a handler under its peer id and subscribes to the
/// boards it carries. [`InProcessNetwork::endpoint`] hands out the per-node
/// [`Transport`] view.
#[derive(Clone, Default)]
pub struct InProcessNetwork {
    state: Arc<HubState>,
}

impl InProcessNetwork {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the inbound handler for a peer
    pub fn register_handler(&self, peer_id: PeerId, handler: Arc<dyn MessageHandler>) {
        self.state.handlers.write().insert(peer_id, handler);
    }

    /// Mark a peer as participating in a board
    pub fn subscribe(&self, peer_id: &PeerId, board_id: BoardId) {
        self.state
            .subscriptions
            .write()
            .entry(board_id)
            .or_default()
            .insert(peer_id.clone());
    }

    /// Drop a peer's handler so sends to it fail, keeping its board
    /// subscriptions (simulates an unreachable peer)
    pub fn disconnect(&self, peer_id: &PeerId) {
        self.state.handlers.write().remove(peer_id);
    }

    /// Remove a peer from one board's membership
    pub fn unsubscribe(&self, peer_id: &PeerId, board_id: &BoardId) {
        if let Some(members) = self.state.subscriptions.write().get_mut(board_id) {
            members.remove(peer_id);
        }
    }

    /// The [`Transport`] view for one local peer
    pub fn endpoint(&self, local_peer: PeerId) -> InProcessEndpoint {
        InProcessEndpoint {
            state: self.state.clone(),
            local_peer,
        }
    }
}

/// Per-node transport view onto an [`InProcessNetwork`]
#[derive(Clone)]
pub struct InProcessEndpoint {
    state: Arc<HubState>,
    local_peer: PeerId,
}

#[async_trait]
impl Transport for InProcessEndpoint {
    async fn send_message(&self, peer_id: &PeerId, message: WireMessage) -> SyncResult<()> {
        // Clone the handler out so the lock is not held across the await
        let handler = self.state.handlers.read().get(peer_id).cloned();
        match handler {
            Some(handler) => {
                handler.handle_message(&self.local_peer, message).await;
                Ok(())
            }
            None => Err(SyncError::Network(format!("no route to peer {peer_id}"))),
        }
    }

    fn peers_for_board(&self, board_id: &BoardId) -> Vec<PeerId> {
        let subscriptions = self.state.subscriptions.read();
        subscriptions
            .get(board_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|peer| **peer != self.local_peer)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
