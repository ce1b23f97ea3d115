//! Board replication orchestrator
//!
//! [`SyncManager`] owns the per-board clock registry and drives the whole
//! protocol: it initiates sync rounds, answers every inbound message kind,
//! admits remote posts, publishes local ones, and gossips fresh posts to
//! subscribed peers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  SyncManager                                                     │
//! │  ├── clocks: Mutex<HashMap<BoardId, VectorClock>>                │
//! │  │     └── one clock per board; the admission critical section   │
//! │  ├── store: Arc<dyn Store>           posts, threads, peer keys   │
//! │  ├── transport: Arc<dyn Transport>   outbound messages           │
//! │  ├── verifier: Arc<dyn SignatureVerifier>                        │
//! │  └── event_tx: broadcast::Sender<SyncEvent>                      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound messages arrive through the [`MessageHandler`] implementation,
//! which the embedder registers with its transport. Every exchange is
//! stateless: each message carries the board id and, where relevant, a full
//! clock, so nothing persists between messages except the clock registry
//! and the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::VectorClock;
use crate::config::SyncConfig;
use crate::crypto::{Ed25519Verifier, LocalIdentity, SignatureVerifier};
use crate::error::{SyncError, SyncResult};
use crate::store::Store;
use crate::sync::admission::{validate_payload, AdmitOutcome, RejectReason, ValidatedPost};
use crate::sync::events::SyncEvent;
use crate::sync::protocol::{
    canonical_post_bytes, canonical_timestamp, PostPayload, SyncMessage, WireMessage,
};
use crate::transport::{MessageHandler, Transport};
use crate::types::{BoardId, PeerId, Post, PostId, ThreadId};

/// Default capacity for the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-author sequence ranges one side has and the other lacks
///
/// For every author where `have` is ahead of `need`, yields the author with
/// the exclusive lower bound (`need`'s counter) and inclusive upper bound
/// (`have`'s counter) of the missing sequence numbers. Authors `have` does
/// not materialize read as zero and never produce a range.
pub fn missing_ranges(have: &VectorClock, need: &VectorClock) -> Vec<(PeerId, u64, u64)> {
    have.entries()
        .filter(|(author, have_seq)| *have_seq > need.get(author))
        .map(|(author, have_seq)| (author.clone(), need.get(author), have_seq))
        .collect()
}

/// Orchestrates replication for every board this node carries
///
/// One instance per node. Cheap to share behind an [`Arc`], which is also
/// how it registers as the transport's [`MessageHandler`].
pub struct SyncManager {
    /// Local signing identity
    identity: LocalIdentity,
    /// Post, thread, and peer persistence
    store: Arc<dyn Store>,
    /// Outbound message channel and board membership view
    transport: Arc<dyn Transport>,
    /// Signature verification seam
    verifier: Arc<dyn SignatureVerifier>,
    /// Per-board vector clocks, created lazily on first touch
    clocks: Mutex<HashMap<BoardId, VectorClock>>,
    /// Scheduling and batching tunables
    config: SyncConfig,
    /// Event broadcast channel for observers
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncManager {
    /// Create a manager with the stock Ed25519 verifier
    pub fn new(
        identity: LocalIdentity,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        Self::with_verifier(identity, store, transport, Arc::new(Ed25519Verifier), config)
    }

    /// Create a manager with a custom signature verifier
    pub fn with_verifier(
        identity: LocalIdentity,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn SignatureVerifier>,
        config: SyncConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            identity,
            store,
            transport,
            verifier,
            clocks: Mutex::new(HashMap::new()),
            config,
            event_tx,
        }
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// The local node's peer id
    pub fn local_peer(&self) -> &PeerId {
        self.identity.peer_id()
    }

    /// The local signing identity
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// The active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Snapshot of a board's vector clock
    ///
    /// First touch materializes the clock with the local peer at zero, so
    /// the local author always appears in exchanged clocks.
    pub fn board_clock(&self, board_id: &BoardId) -> VectorClock {
        let mut clocks = self.clocks.lock();
        clocks
            .entry(*board_id)
            .or_insert_with(|| VectorClock::seeded(self.identity.peer_id()))
            .clone()
    }

    /// Run one sync round for a board
    ///
    /// Sends a `SyncRequest` carrying the local clock to `peers`, or to
    /// every subscribed peer when `peers` is `None`. Per-peer send failures
    /// are absorbed (logged, evented) so one unreachable peer never blocks
    /// the rest; the round only errs when there were peers and none could
    /// be reached. Returns the number of peers contacted; no peers at all
    /// is a quiet `Ok(0)`.
    pub async fn sync_board(
        &self,
        board_id: &BoardId,
        peers: Option<Vec<PeerId>>,
    ) -> SyncResult<usize> {
        let peers = match peers {
            Some(peers) => peers,
            None => self.transport.peers_for_board(board_id),
        };
        if peers.is_empty() {
            debug!(board_id = %board_id, "no peers to sync with");
            return Ok(0);
        }

        let vector_clock = self.board_clock(board_id).to_map();
        let mut contacted = 0usize;
        for peer in &peers {
            let message = WireMessage::new(SyncMessage::SyncRequest {
                board_id: *board_id,
                vector_clock: vector_clock.clone(),
            });
            match self.transport.send_message(peer, message).await {
                Ok(()) => contacted += 1,
                Err(e) => {
                    warn!(board_id = %board_id, peer = %peer, error = %e, "sync request failed");
                    self.emit(SyncEvent::PeerUnreachable {
                        board_id: *board_id,
                        peer_id: peer.clone(),
                    });
                }
            }
        }

        if contacted == 0 {
            return Err(SyncError::Network(format!(
                "all {} peers unreachable for board {board_id}",
                peers.len()
            )));
        }

        debug!(board_id = %board_id, contacted, "sync round dispatched");
        self.emit(SyncEvent::BoardSynced {
            board_id: *board_id,
            peers_contacted: contacted,
        });
        Ok(contacted)
    }

    /// Author and replicate a new post on this node
    ///
    /// Assigns the next local sequence number, signs the canonical byte
    /// string, persists, and gossips the post to every subscribed peer.
    /// Sequence assignment and persistence happen atomically with respect
    /// to admission of remote posts on the same board.
    pub async fn publish_post(
        &self,
        board_id: &BoardId,
        thread_id: &ThreadId,
        content: impl Into<String>,
        parent_post_id: Option<PostId>,
    ) -> SyncResult<Post> {
        let content = content.into();
        let author = self.identity.peer_id().clone();

        let post = {
            let mut clocks = self.clocks.lock();
            let clock = clocks
                .entry(*board_id)
                .or_insert_with(|| VectorClock::seeded(&author));
            let sequence_number = clock.get(&author) + 1;

            let id = PostId::new();
            let created_at = Utc::now();
            let timestamp_text = canonical_timestamp(&created_at);
            let bytes = canonical_post_bytes(
                &id,
                thread_id,
                &author,
                &content,
                &timestamp_text,
                sequence_number,
            );
            let signature = self.identity.sign(&bytes);

            let post = Post {
                id,
                thread_id: *thread_id,
                author_peer_id: author.clone(),
                content,
                created_at,
                sequence_number,
                signature: signature.to_vec(),
                parent_post_id,
            };
            // Clock advances only once the row is actually in the store.
            self.store.save_post(&post)?;
            clock.set(author.clone(), sequence_number);
            post
        };

        info!(board_id = %board_id, post_id = %post.id, seq = post.sequence_number, "published post");

        let payload = PostPayload::from_post(&post, *board_id);
        self.propagate(&payload, None).await;

        Ok(post)
    }

    /// Admit one post received from the network
    ///
    /// Runs the full admission pipeline: structural validation, duplicate
    /// check, author key resolution, signature verification over the
    /// payload's canonical bytes, persistence, then clock import. A stored
    /// post is gossiped onward to every subscribed peer except `from`;
    /// duplicates and rejections stop here, which is what terminates
    /// gossip.
    pub async fn handle_incoming_post(
        &self,
        from: &PeerId,
        payload: PostPayload,
    ) -> SyncResult<AdmitOutcome> {
        let board_id = payload.board_id;
        let post_id = payload.id;

        let outcome = match validate_payload(&payload) {
            Ok(validated) => self.admit(&payload, validated)?,
            Err(reason) => AdmitOutcome::Rejected(reason),
        };

        match outcome {
            AdmitOutcome::Stored => {
                debug!(
                    board_id = %board_id,
                    post_id = %post_id,
                    author = %payload.author_peer_id,
                    seq = payload.sequence_number,
                    "stored remote post"
                );
                self.emit(SyncEvent::PostStored {
                    board_id,
                    post_id,
                    author: payload.author_peer_id.clone(),
                });
                self.propagate(&payload, Some(from)).await;
            }
            AdmitOutcome::AlreadyPresent => {
                debug!(board_id = %board_id, post_id = %post_id, "post already present");
            }
            AdmitOutcome::Rejected(reason) => {
                warn!(
                    board_id = %board_id,
                    post_id = %post_id,
                    author = %payload.author_peer_id,
                    %reason,
                    "rejected remote post"
                );
                self.emit(SyncEvent::PostRejected {
                    board_id,
                    post_id,
                    reason,
                });
            }
        }

        Ok(outcome)
    }

    /// Admission gates that must run atomically with the clock registry
    ///
    /// Holds the clock lock from duplicate check through clock import so
    /// two concurrent deliveries of the same post cannot both store it,
    /// and the clock never advances past what the store holds. No awaits
    /// happen under the lock.
    fn admit(&self, payload: &PostPayload, validated: ValidatedPost) -> SyncResult<AdmitOutcome> {
        let mut clocks = self.clocks.lock();

        // Duplicates short-circuit before any clock movement.
        if self.store.post_by_id(&payload.id)?.is_some() {
            return Ok(AdmitOutcome::AlreadyPresent);
        }

        let Some(peer) = self.store.peer_record(&payload.author_peer_id)? else {
            return Ok(AdmitOutcome::Rejected(RejectReason::UnknownAuthor));
        };

        // Verification covers the received timestamp text verbatim; the
        // payload is never re-serialized here.
        if self
            .verifier
            .verify(
                &payload.canonical_bytes(),
                &validated.signature,
                &peer.public_key,
            )
            .is_err()
        {
            return Ok(AdmitOutcome::Rejected(RejectReason::BadSignature));
        }

        match self.store.save_post(&validated.post) {
            Ok(()) => {}
            // A concurrent writer beat us to it; same terminal state.
            Err(SyncError::DuplicateEntry(_)) => return Ok(AdmitOutcome::AlreadyPresent),
            Err(e) => return Err(e),
        }

        let clock = clocks
            .entry(payload.board_id)
            .or_insert_with(|| VectorClock::seeded(self.identity.peer_id()));
        if payload.sequence_number > clock.get(&payload.author_peer_id) {
            clock.set(payload.author_peer_id.clone(), payload.sequence_number);
        }

        Ok(AdmitOutcome::Stored)
    }

    /// Gossip a post to every subscribed peer, optionally excluding one
    ///
    /// Send failures are per-peer and non-fatal; the periodic sync repairs
    /// whatever gossip misses.
    async fn propagate(&self, payload: &PostPayload, exclude: Option<&PeerId>) {
        let peers = self.transport.peers_for_board(&payload.board_id);
        for peer in peers {
            if Some(&peer) == exclude {
                continue;
            }
            let message = WireMessage::new(SyncMessage::Post {
                post: payload.clone(),
            });
            if let Err(e) = self.transport.send_message(&peer, message).await {
                warn!(board_id = %payload.board_id, peer = %peer, error = %e, "gossip send failed");
            }
        }
    }

    async fn dispatch(&self, from: &PeerId, message: SyncMessage) -> SyncResult<()> {
        match message {
            SyncMessage::SyncRequest {
                board_id,
                vector_clock,
            } => self.handle_sync_request(from, board_id, vector_clock).await,
            SyncMessage::SyncResponse {
                board_id,
                vector_clock,
            } => {
                self.handle_sync_response(from, board_id, vector_clock)
                    .await
            }
            SyncMessage::ReqMissing { board_id, post_ids } => {
                self.handle_req_missing(from, board_id, post_ids).await
            }
            SyncMessage::Post { post } => self.handle_incoming_post(from, post).await.map(|_| ()),
            SyncMessage::PostBatch { posts, .. } => self.handle_post_batch(from, posts).await,
        }
    }

    /// Answer a peer's sync request
    ///
    /// Replies with the local clock, then resolves whatever the requester
    /// is missing against the local store and pushes it without waiting to
    /// be asked. The push is what actually moves data during a sync round.
    async fn handle_sync_request(
        &self,
        from: &PeerId,
        board_id: BoardId,
        vector_clock: BTreeMap<PeerId, u64>,
    ) -> SyncResult<()> {
        let local = self.board_clock(&board_id);
        let remote = VectorClock::from_map(vector_clock);

        let response = WireMessage::new(SyncMessage::SyncResponse {
            board_id,
            vector_clock: local.to_map(),
        });
        self.transport.send_message(from, response).await?;

        self.push_missing(from, &board_id, &local, &remote).await
    }

    /// Process the responder's clock from a sync round we initiated
    ///
    /// Ranges the responder is ahead on are resolved against the local
    /// store; any ids that resolve (posts imported out of band, ahead of
    /// the clock registry) are requested explicitly. Ids that do not
    /// resolve locally arrive through the responder's proactive push
    /// instead, so an empty resolution sends nothing.
    async fn handle_sync_response(
        &self,
        from: &PeerId,
        board_id: BoardId,
        vector_clock: BTreeMap<PeerId, u64>,
    ) -> SyncResult<()> {
        let local = self.board_clock(&board_id);
        let remote = VectorClock::from_map(vector_clock);

        let ranges = missing_ranges(&remote, &local);
        if ranges.is_empty() {
            debug!(board_id = %board_id, peer = %from, "clocks agree, nothing to request");
            return Ok(());
        }

        let mut post_ids = Vec::new();
        for (author, after, through) in &ranges {
            post_ids.extend(
                self.store
                    .post_ids_by_author_range(&board_id, author, *after, *through)?,
            );
        }
        if post_ids.is_empty() {
            debug!(
                board_id = %board_id,
                peer = %from,
                ranges = ranges.len(),
                "behind remote clock, waiting on push"
            );
            return Ok(());
        }

        let message = WireMessage::new(SyncMessage::ReqMissing { board_id, post_ids });
        self.transport.send_message(from, message).await
    }

    /// Serve explicitly requested posts
    ///
    /// Ids not found locally are skipped; the requester may know of posts
    /// this node never saw.
    async fn handle_req_missing(
        &self,
        from: &PeerId,
        board_id: BoardId,
        post_ids: Vec<PostId>,
    ) -> SyncResult<()> {
        let mut payloads = Vec::new();
        for post_id in &post_ids {
            if let Some(post) = self.store.post_by_id(post_id)? {
                payloads.push(PostPayload::from_post(&post, board_id));
            }
        }

        debug!(
            from = %from,
            board_id = %board_id,
            requested = post_ids.len(),
            found = payloads.len(),
            "serving requested posts"
        );
        self.send_batches(from, &board_id, payloads).await
    }

    /// Admit each post of a batch independently
    async fn handle_post_batch(&self, from: &PeerId, posts: Vec<PostPayload>) -> SyncResult<()> {
        debug!(from = %from, count = posts.len(), "processing post batch");
        for payload in posts {
            let post_id = payload.id;
            // One bad post must not sink the rest of the batch.
            if let Err(e) = self.handle_incoming_post(from, payload).await {
                warn!(from = %from, post_id = %post_id, error = %e, "failed to admit batched post");
            }
        }
        Ok(())
    }

    /// Resolve and push the posts `need` lacks relative to `have`
    async fn push_missing(
        &self,
        peer: &PeerId,
        board_id: &BoardId,
        have: &VectorClock,
        need: &VectorClock,
    ) -> SyncResult<()> {
        let ranges = missing_ranges(have, need);
        if ranges.is_empty() {
            return Ok(());
        }

        let mut payloads = Vec::new();
        for (author, after, through) in &ranges {
            for post_id in self
                .store
                .post_ids_by_author_range(board_id, author, *after, *through)?
            {
                if let Some(post) = self.store.post_by_id(&post_id)? {
                    payloads.push(PostPayload::from_post(&post, *board_id));
                }
            }
        }

        if !payloads.is_empty() {
            debug!(board_id = %board_id, peer = %peer, count = payloads.len(), "pushing missing posts");
        }
        self.send_batches(peer, board_id, payloads).await
    }

    /// Ship payloads as `PostBatch` messages, chunked to the batch limit
    async fn send_batches(
        &self,
        peer: &PeerId,
        board_id: &BoardId,
        payloads: Vec<PostPayload>,
    ) -> SyncResult<()> {
        for chunk in payloads.chunks(self.config.max_batch_size) {
            let message = WireMessage::new(SyncMessage::PostBatch {
                board_id: *board_id,
                posts: chunk.to_vec(),
            });
            self.transport.send_message(peer, message).await?;
        }
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.event_tx.send(event);
    }
}

#[async_trait]
impl MessageHandler for SyncManager {
    async fn handle_message(&self, from: &PeerId, message: WireMessage) {
        let message = message.into_inner();
        debug!(
            from = %from,
            kind = message.kind(),
            board_id = %message.board_id(),
            "received sync message"
        );
        if let Err(e) = self.dispatch(from, message).await {
            warn!(from = %from, error = %e, "failed to process sync message");
        }
    }
}
