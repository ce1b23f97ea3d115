//! Storage interface consumed by the sync core
//!
//! The replication core never owns durable storage; it talks to a [`Store`]
//! implementation. All methods are synchronous so the admission pipeline can
//! run its dedup-check-then-save sequence under one lock without suspension
//! points. [`MemoryStore`] is the in-process reference implementation used
//! by tests and embedders; a durable backend implements the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{SyncError, SyncResult};
use crate::types::{BoardId, BoardRecord, PeerId, PeerRecord, Post, PostId, ThreadId, ThreadRecord};

/// Durable storage contract for boards, threads, posts, and peer identities
///
/// Implementations must report a duplicate post id as
/// [`SyncError::DuplicateEntry`] so the admission pipeline can fold a racing
/// re-insert into an idempotent no-op.
pub trait Store: Send + Sync {
    /// Persist a post. Fails with `DuplicateEntry` if the id exists and
    /// `ThreadNotFound` if the thread does not.
    fn save_post(&self, post: &Post) -> SyncResult<()>;

    /// Fetch a post by id
    fn post_by_id(&self, id: &PostId) -> SyncResult<Option<Post>>;

    /// All posts in a thread, ordered by creation time (oldest first)
    fn posts_for_thread(&self, thread_id: &ThreadId) -> SyncResult<Vec<Post>>;

    /// All known boards
    fn all_boards(&self) -> SyncResult<Vec<BoardRecord>>;

    /// Identity record for a peer, if known
    fn peer_record(&self, peer_id: &PeerId) -> SyncResult<Option<PeerRecord>>;

    /// Ids of the author's posts on a board with sequence numbers in
    /// `(after, through]`, ordered by sequence number
    ///
    /// This is the storage half of missing-item identification: the sync
    /// layer derives the ranges, the store resolves them to concrete ids.
    fn post_ids_by_author_range(
        &self,
        board_id: &BoardId,
        author: &PeerId,
        after: u64,
        through: u64,
    ) -> SyncResult<Vec<PostId>>;
}

#[derive(Default)]
struct MemoryState {
    boards: HashMap<BoardId, BoardRecord>,
    threads: HashMap<ThreadId, ThreadRecord>,
    posts: HashMap<PostId, Post>,
    peers: HashMap<PeerId, PeerRecord>,
}

/// In-memory reference implementation of [`Store`]
///
/// Clones share the same backing state, so a test can hand one handle to a
/// `SyncManager` and keep another for assertions. Boards, threads, and peer
/// records are seeded through the `insert_*`/`upsert_*` methods; the sync
/// protocol itself only ever writes posts.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a board
    pub fn insert_board(&self, board: BoardRecord) {
        self.inner.write().boards.insert(board.id, board);
    }

    /// Add a thread; its board must already exist
    pub fn insert_thread(&self, thread: ThreadRecord) -> SyncResult<()> {
        let mut state = self.inner.write();
        if !state.boards.contains_key(&thread.board_id) {
            return Err(SyncError::BoardNotFound(thread.board_id.to_string()));
        }
        state.threads.insert(thread.id, thread);
        Ok(())
    }

    /// Add or replace a peer identity record
    pub fn upsert_peer(&self, record: PeerRecord) {
        self.inner.write().peers.insert(record.peer_id.clone(), record);
    }

    /// Number of stored posts, for test assertions
    pub fn post_count(&self) -> usize {
        self.inner.read().posts.len()
    }
}

impl Store for MemoryStore {
    fn save_post(&self, post: &Post) -> SyncResult<()> {
        let mut state = self.inner.write();
        if !state.threads.contains_key(&post.thread_id) {
            return Err(SyncError::ThreadNotFound(post.thread_id.to_string()));
        }
        if state.posts.contains_key(&post.id) {
            return Err(SyncError::DuplicateEntry(post.id.to_string()));
        }
        state.posts.insert(post.id, post.clone());
        Ok(())
    }

    fn post_by_id(&self, id: &PostId) -> SyncResult<Option<Post>> {
        Ok(self.inner.read().posts.get(id).cloned())
    }

    fn posts_for_thread(&self, thread_id: &ThreadId) -> SyncResult<Vec<Post>> {
        let state = self.inner.read();
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| p.thread_id == *thread_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(posts)
    }

    fn all_boards(&self) -> SyncResult<Vec<BoardRecord>> {
        let state = self.inner.read();
        let mut boards: Vec<BoardRecord> = state.boards.values().cloned().collect();
        boards.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(boards)
    }

    fn peer_record(&self, peer_id: &PeerId) -> SyncResult<Option<PeerRecord>> {
        Ok(self.inner.read().peers.get(peer_id).cloned())
    }

    fn post_ids_by_author_range(
        &self,
        board_id: &BoardId,
        author: &PeerId,
        after: u64,
        through: u64,
    ) -> SyncResult<Vec<PostId>> {
        let state = self.inner.read();
        let mut matches: Vec<(u64, PostId)> = state
            .posts
            .values()
            .filter(|p| {
                p.author_peer_id == *author
                    && p.sequence_number > after
                    && p.sequence_number <= through
                    && state
                        .threads
                        .get(&p.thread_id)
                        .is_some_and(|t| t.board_id == *board_id)
            })
            .map(|p| (p.sequence_number, p.id))
            .collect();
        matches.sort();
        Ok(matches.into_iter().map(|(_, id)| id).collect())
    }
}
