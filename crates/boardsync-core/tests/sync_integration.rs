//! Multi-node sync integration tests
//!
//! Co-resident nodes wired through `InProcessNetwork` exercise the whole
//! replication path: publish-time gossip, sync rounds with proactive push,
//! explicit post requests, admission gates, and the background scheduler.
//! Partitions are simulated by dropping a node's inbound handler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use boardsync_core::sync::{canonical_post_bytes, canonical_timestamp};
use boardsync_core::{
    AdmitOutcome, BoardId, BoardRecord, ClockOrdering, InProcessNetwork, LocalIdentity,
    MemoryStore, PeerId, PeerRecord, Post, PostId, PostPayload, RejectReason, Store, SyncConfig,
    SyncError, SyncEvent, SyncManager, SyncMessage, SyncResult, SyncScheduler, ThreadId,
    ThreadRecord, Transport, WireMessage,
};

// ============================================================================
// Test Utilities
// ============================================================================

/// A node under test: identity, store, and manager on a shared hub
struct TestNode {
    manager: Arc<SyncManager>,
    store: MemoryStore,
}

impl TestNode {
    /// Create a node carrying `board`/`thread`, registered and subscribed
    fn new(network: &InProcessNetwork, board: &BoardRecord, thread: &ThreadRecord) -> Self {
        Self::with_config(network, board, thread, SyncConfig::default())
    }

    fn with_config(
        network: &InProcessNetwork,
        board: &BoardRecord,
        thread: &ThreadRecord,
        config: SyncConfig,
    ) -> Self {
        let identity = LocalIdentity::generate();
        let store = MemoryStore::new();
        store.insert_board(board.clone());
        store.insert_thread(thread.clone()).expect("seed thread");
        store.upsert_peer(identity.peer_record());

        let peer_id = identity.peer_id().clone();
        let endpoint = network.endpoint(peer_id.clone());
        let manager = Arc::new(SyncManager::new(
            identity,
            Arc::new(store.clone()),
            Arc::new(endpoint),
            config,
        ));
        network.register_handler(peer_id.clone(), manager.clone());
        network.subscribe(&peer_id, board.id);

        Self { manager, store }
    }

    fn peer_id(&self) -> &PeerId {
        self.manager.local_peer()
    }

    /// Teach this node another node's author key
    fn learn_peer(&self, other: &TestNode) {
        self.store.upsert_peer(other.manager.identity().peer_record());
    }

    /// Drop the inbound handler so sends to this node fail
    fn go_offline(&self, network: &InProcessNetwork) {
        network.disconnect(self.peer_id());
    }

    /// Restore the inbound handler
    fn go_online(&self, network: &InProcessNetwork) {
        network.register_handler(self.peer_id().clone(), self.manager.clone());
    }

    fn post_count(&self) -> usize {
        self.store.post_count()
    }
}

/// A board and thread to seed identically on every node
fn shared_board() -> (BoardRecord, ThreadRecord) {
    let board = BoardRecord::new("general");
    let thread = ThreadRecord::new(board.id, "introductions");
    (board, thread)
}

/// Two nodes on one board, each knowing the other's key
fn two_nodes(network: &InProcessNetwork) -> (TestNode, TestNode, BoardRecord, ThreadRecord) {
    let (board, thread) = shared_board();
    let a = TestNode::new(network, &board, &thread);
    let b = TestNode::new(network, &board, &thread);
    a.learn_peer(&b);
    b.learn_peer(&a);
    (a, b, board, thread)
}

/// Build a signed wire payload without going through a manager
fn hand_signed_payload(
    identity: &LocalIdentity,
    board_id: BoardId,
    thread_id: ThreadId,
    content: &str,
    sequence_number: u64,
) -> PostPayload {
    let id = PostId::new();
    let created_at = canonical_timestamp(&Utc::now());
    let bytes = canonical_post_bytes(
        &id,
        &thread_id,
        identity.peer_id(),
        content,
        &created_at,
        sequence_number,
    );
    let signature = identity.sign(&bytes);

    PostPayload {
        id,
        thread_id,
        author_peer_id: identity.peer_id().clone(),
        content: content.to_string(),
        created_at,
        sequence_number,
        signature: hex::encode(signature),
        parent_post_id: None,
        board_id,
    }
}

// ============================================================================
// Gossip Propagation
// ============================================================================

/// Publishing on one node delivers the post to a connected peer directly
#[tokio::test]
async fn test_publish_gossips_to_connected_peer() {
    let _ = tracing_subscriber::fmt::try_init();
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    a.manager
        .publish_post(&board.id, &thread.id, "hello from a", None)
        .await
        .expect("publish");

    assert_eq!(b.post_count(), 1);
    assert_eq!(b.manager.board_clock(&board.id).get(a.peer_id()), 1);
}

/// A post injected at one node relays through it to the rest of the board,
/// and the relay stops once everyone has the post
#[tokio::test]
async fn test_gossip_relays_across_nodes_and_terminates() {
    let network = InProcessNetwork::new();
    let (board, thread) = shared_board();
    let a = TestNode::new(&network, &board, &thread);
    let b = TestNode::new(&network, &board, &thread);
    let c = TestNode::new(&network, &board, &thread);
    for (node, other) in [(&a, &b), (&a, &c), (&b, &a), (&b, &c), (&c, &a), (&c, &b)] {
        node.learn_peer(other);
    }

    // Author on a while the others are unreachable, so only the explicit
    // injection below delivers the post to b.
    b.go_offline(&network);
    c.go_offline(&network);
    let post = a
        .manager
        .publish_post(&board.id, &thread.id, "relayed", None)
        .await
        .expect("publish");
    b.go_online(&network);
    c.go_online(&network);

    let payload = PostPayload::from_post(&post, board.id);
    let outcome = b
        .manager
        .handle_incoming_post(a.peer_id(), payload)
        .await
        .expect("inject at b");

    assert_eq!(outcome, AdmitOutcome::Stored);
    // c never heard from a directly; the post reached it through b.
    assert_eq!(c.post_count(), 1);
    assert_eq!(a.post_count(), 1);
    assert_eq!(b.post_count(), 1);
}

/// Storing an event is observable through the broadcast channel
#[tokio::test]
async fn test_post_stored_event_is_emitted() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);
    let mut events = b.manager.subscribe();

    a.manager
        .publish_post(&board.id, &thread.id, "observable", None)
        .await
        .expect("publish");

    let event = events.try_recv().expect("event buffered");
    match event {
        SyncEvent::PostStored {
            board_id, author, ..
        } => {
            assert_eq!(board_id, board.id);
            assert_eq!(&author, a.peer_id());
        }
        other => panic!("expected PostStored, got {other:?}"),
    }
}

// ============================================================================
// Sync Rounds and Convergence
// ============================================================================

/// Two peers author one post each while partitioned; a sync round from each
/// side converges both stores and both clocks
#[tokio::test]
async fn test_two_peer_convergence_via_sync_rounds() {
    let _ = tracing_subscriber::fmt::try_init();
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    a.go_offline(&network);
    b.go_offline(&network);
    a.manager
        .publish_post(&board.id, &thread.id, "post from a", None)
        .await
        .expect("publish a");
    b.manager
        .publish_post(&board.id, &thread.id, "post from b", None)
        .await
        .expect("publish b");
    assert_eq!(a.post_count(), 1);
    assert_eq!(b.post_count(), 1);

    a.go_online(&network);
    b.go_online(&network);

    // a's round pulls b's post to a (proactive push from b); b's round
    // pulls a's post to b.
    a.manager.sync_board(&board.id, None).await.expect("sync a");
    b.manager.sync_board(&board.id, None).await.expect("sync b");

    assert_eq!(a.post_count(), 2);
    assert_eq!(b.post_count(), 2);

    let clock_a = a.manager.board_clock(&board.id);
    let clock_b = b.manager.board_clock(&board.id);
    assert_eq!(clock_a.get(a.peer_id()), 1);
    assert_eq!(clock_a.get(b.peer_id()), 1);
    assert_eq!(clock_a.compare(&clock_b), ClockOrdering::Equal);
}

/// Several posts per author survive a partition, and both replicas list
/// them in the same order afterwards
#[tokio::test]
async fn test_partition_recovery_with_multiple_posts() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    a.go_offline(&network);
    b.go_offline(&network);
    for i in 0..3 {
        a.manager
            .publish_post(&board.id, &thread.id, format!("a{i}"), None)
            .await
            .expect("publish on a");
    }
    for i in 0..2 {
        b.manager
            .publish_post(&board.id, &thread.id, format!("b{i}"), None)
            .await
            .expect("publish on b");
    }
    a.go_online(&network);
    b.go_online(&network);

    a.manager.sync_board(&board.id, None).await.expect("sync a");
    b.manager.sync_board(&board.id, None).await.expect("sync b");

    assert_eq!(a.post_count(), 5);
    assert_eq!(b.post_count(), 5);
    let clock_b = b.manager.board_clock(&board.id);
    assert_eq!(clock_b.get(a.peer_id()), 3);
    assert_eq!(clock_b.get(b.peer_id()), 2);

    let a_ids: Vec<PostId> = a
        .store
        .posts_for_thread(&thread.id)
        .expect("list a")
        .iter()
        .map(|p| p.id)
        .collect();
    let b_ids: Vec<PostId> = b
        .store
        .posts_for_thread(&thread.id)
        .expect("list b")
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(a_ids, b_ids);
}

/// Interleaved publishes serialize through the clock: every post gets a
/// distinct consecutive sequence number
#[tokio::test]
async fn test_concurrent_publishes_assign_unique_sequences() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    let publishes = (0..5).map(|i| {
        let manager = a.manager.clone();
        let board_id = board.id;
        let thread_id = thread.id;
        async move {
            manager
                .publish_post(&board_id, &thread_id, format!("burst {i}"), None)
                .await
                .expect("publish")
        }
    });
    let posts = futures::future::join_all(publishes).await;

    let mut sequences: Vec<u64> = posts.iter().map(|p| p.sequence_number).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(a.manager.board_clock(&board.id).get(a.peer_id()), 5);
    assert_eq!(b.post_count(), 5);
}

/// Push transfers are chunked to the configured batch size
#[tokio::test]
async fn test_push_is_chunked_to_the_batch_limit() {
    let network = InProcessNetwork::new();
    let (board, thread) = shared_board();
    let config = SyncConfig {
        max_batch_size: 2,
        ..SyncConfig::default()
    };
    let a = TestNode::with_config(&network, &board, &thread, config.clone());
    let b = TestNode::with_config(&network, &board, &thread, config);
    a.learn_peer(&b);
    b.learn_peer(&a);

    b.go_offline(&network);
    for i in 0..5 {
        a.manager
            .publish_post(&board.id, &thread.id, format!("bulk {i}"), None)
            .await
            .expect("publish");
    }
    b.go_online(&network);

    // a pushes five posts in three batches; each is admitted independently.
    b.manager.sync_board(&board.id, None).await.expect("sync b");

    assert_eq!(b.post_count(), 5);
    assert_eq!(b.manager.board_clock(&board.id).get(a.peer_id()), 5);
}

/// One unreachable peer neither aborts the round nor hides the others
#[tokio::test]
async fn test_sync_round_isolates_per_peer_failures() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);
    network.subscribe(&PeerId::new("ghost"), board.id);

    b.go_offline(&network);
    a.manager
        .publish_post(&board.id, &thread.id, "survives the ghost", None)
        .await
        .expect("publish");
    b.go_online(&network);

    let contacted = b.manager.sync_board(&board.id, None).await.expect("sync b");
    assert_eq!(contacted, 1);
    assert_eq!(b.post_count(), 1);

    // The ghost shows up when a initiates: one unreachable, one contacted.
    let mut events = a.manager.subscribe();
    let contacted = a.manager.sync_board(&board.id, None).await.expect("sync a");
    assert_eq!(contacted, 1);

    let mut saw_unreachable = false;
    let mut saw_synced = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::PeerUnreachable { peer_id, .. } => {
                assert_eq!(peer_id, PeerId::new("ghost"));
                saw_unreachable = true;
            }
            SyncEvent::BoardSynced {
                peers_contacted, ..
            } => {
                assert_eq!(peers_contacted, 1);
                saw_synced = true;
            }
            _ => {}
        }
    }
    assert!(saw_unreachable);
    assert!(saw_synced);
}

// ============================================================================
// Admission Gates
// ============================================================================

/// Delivering the same post twice stores it once and leaves the clock alone
#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    b.go_offline(&network);
    let post = a
        .manager
        .publish_post(&board.id, &thread.id, "once", None)
        .await
        .expect("publish");
    let payload = PostPayload::from_post(&post, board.id);

    let first = b
        .manager
        .handle_incoming_post(a.peer_id(), payload.clone())
        .await
        .expect("first delivery");
    let second = b
        .manager
        .handle_incoming_post(a.peer_id(), payload)
        .await
        .expect("second delivery");

    assert_eq!(first, AdmitOutcome::Stored);
    assert_eq!(second, AdmitOutcome::AlreadyPresent);
    assert_eq!(b.post_count(), 1);
    assert_eq!(b.manager.board_clock(&board.id).get(a.peer_id()), 1);
}

/// A tampered post is rejected, stores nothing, and never moves the clock
#[tokio::test]
async fn test_forged_signature_is_rejected() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);
    let mut events = b.manager.subscribe();

    b.go_offline(&network);
    let post = a
        .manager
        .publish_post(&board.id, &thread.id, "genuine", None)
        .await
        .expect("publish");

    let mut payload = PostPayload::from_post(&post, board.id);
    payload.content = "tampered".to_string();

    let outcome = b
        .manager
        .handle_incoming_post(a.peer_id(), payload)
        .await
        .expect("handled");

    assert_eq!(outcome, AdmitOutcome::Rejected(RejectReason::BadSignature));
    assert_eq!(b.post_count(), 0);
    assert_eq!(b.manager.board_clock(&board.id).get(a.peer_id()), 0);

    let event = events.try_recv().expect("rejection evented");
    assert!(matches!(
        event,
        SyncEvent::PostRejected {
            reason: RejectReason::BadSignature,
            ..
        }
    ));
}

/// Posts from authors with no registered key are rejected
#[tokio::test]
async fn test_unknown_author_is_rejected() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    // A valid signature does not help without a key on file.
    let stranger = LocalIdentity::generate();
    let payload = hand_signed_payload(&stranger, board.id, thread.id, "who am i", 1);

    let outcome = b
        .manager
        .handle_incoming_post(a.peer_id(), payload)
        .await
        .expect("handled");

    assert_eq!(outcome, AdmitOutcome::Rejected(RejectReason::UnknownAuthor));
    assert_eq!(b.post_count(), 0);
}

/// Structural garbage is rejected before any key lookup happens
#[tokio::test]
async fn test_malformed_signature_encoding_is_rejected() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    let mut payload = hand_signed_payload(a.manager.identity(), board.id, thread.id, "short", 1);
    payload.signature = hex::encode([0u8; 16]);

    let outcome = b
        .manager
        .handle_incoming_post(a.peer_id(), payload)
        .await
        .expect("handled");

    assert_eq!(
        outcome,
        AdmitOutcome::Rejected(RejectReason::MalformedSignature)
    );
}

// ============================================================================
// Protocol Edge Cases
// ============================================================================

/// A request for posts the serving node never saw is answered with what it
/// has and silence for the rest
#[tokio::test]
async fn test_req_missing_skips_unknown_ids() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    b.go_offline(&network);
    let post = a
        .manager
        .publish_post(&board.id, &thread.id, "requested", None)
        .await
        .expect("publish");
    b.go_online(&network);

    let request = WireMessage::new(SyncMessage::ReqMissing {
        board_id: board.id,
        post_ids: vec![post.id, PostId::new()],
    });
    network
        .endpoint(b.peer_id().clone())
        .send_message(a.peer_id(), request)
        .await
        .expect("send request");

    assert_eq!(b.post_count(), 1);
    assert!(b.store.post_by_id(&post.id).expect("lookup").is_some());
}

/// A sync round against a peer with an identical clock moves nothing
#[tokio::test]
async fn test_sync_between_identical_replicas_is_quiet() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    a.manager
        .publish_post(&board.id, &thread.id, "shared", None)
        .await
        .expect("publish");
    assert_eq!(b.post_count(), 1);

    a.manager.sync_board(&board.id, None).await.expect("sync a");
    b.manager.sync_board(&board.id, None).await.expect("sync b");

    assert_eq!(a.post_count(), 1);
    assert_eq!(b.post_count(), 1);
}

// ============================================================================
// Background Scheduler
// ============================================================================

/// Partitioned nodes converge with no manual rounds once the schedulers run
#[tokio::test(start_paused = true)]
async fn test_scheduler_converges_partitioned_nodes() {
    let network = InProcessNetwork::new();
    let (a, b, board, thread) = two_nodes(&network);

    a.go_offline(&network);
    b.go_offline(&network);
    a.manager
        .publish_post(&board.id, &thread.id, "from a", None)
        .await
        .expect("publish a");
    b.manager
        .publish_post(&board.id, &thread.id, "from b", None)
        .await
        .expect("publish b");
    a.go_online(&network);
    b.go_online(&network);

    let scheduler_a = SyncScheduler::new(a.manager.clone());
    let scheduler_b = SyncScheduler::new(b.manager.clone());
    scheduler_a.start();
    scheduler_b.start();

    tokio::time::timeout(Duration::from_secs(120), async {
        while a.post_count() < 2 || b.post_count() < 2 {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await
    .expect("nodes converge within two intervals");

    scheduler_a.stop().await;
    scheduler_b.stop().await;

    let clock_a = a.manager.board_clock(&board.id);
    let clock_b = b.manager.board_clock(&board.id);
    assert_eq!(clock_a.compare(&clock_b), ClockOrdering::Equal);
}

/// A store that fails everything never takes the scheduler down
#[tokio::test(start_paused = true)]
async fn test_scheduler_survives_store_failure() {
    struct FailingStore;

    impl Store for FailingStore {
        fn save_post(&self, _post: &Post) -> SyncResult<()> {
            Err(SyncError::Storage("store offline".to_string()))
        }
        fn post_by_id(&self, _id: &PostId) -> SyncResult<Option<Post>> {
            Err(SyncError::Storage("store offline".to_string()))
        }
        fn posts_for_thread(&self, _thread_id: &ThreadId) -> SyncResult<Vec<Post>> {
            Err(SyncError::Storage("store offline".to_string()))
        }
        fn all_boards(&self) -> SyncResult<Vec<BoardRecord>> {
            Err(SyncError::Storage("store offline".to_string()))
        }
        fn peer_record(&self, _peer_id: &PeerId) -> SyncResult<Option<PeerRecord>> {
            Err(SyncError::Storage("store offline".to_string()))
        }
        fn post_ids_by_author_range(
            &self,
            _board_id: &BoardId,
            _author: &PeerId,
            _after: u64,
            _through: u64,
        ) -> SyncResult<Vec<PostId>> {
            Err(SyncError::Storage("store offline".to_string()))
        }
    }

    let identity = LocalIdentity::generate();
    let network = InProcessNetwork::new();
    let endpoint = network.endpoint(identity.peer_id().clone());
    let manager = Arc::new(SyncManager::new(
        identity,
        Arc::new(FailingStore),
        Arc::new(endpoint),
        SyncConfig::default(),
    ));

    let scheduler = SyncScheduler::new(manager);
    scheduler.start();

    // Several failed rounds, well into backoff territory.
    tokio::time::sleep(Duration::from_secs(200)).await;

    assert!(scheduler.is_running());
    assert!(scheduler.stop().await);
}
