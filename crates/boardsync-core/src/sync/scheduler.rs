//! Periodic background sync with failure backoff
//!
//! [`SyncScheduler`] runs one background task that periodically enumerates
//! every board in the store and runs a sync round for each. Repeated
//! failures (network down, all peers gone) switch the inter-round wait to
//! exponential backoff so a dead link is probed gently; one successful
//! board sync restores the regular cadence.
//!
//! Cancellation is cooperative: an atomic flag plus a [`Notify`] wakeup, so
//! a stop request interrupts an in-progress wait promptly and is never an
//! error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::sync::manager::SyncManager;

/// Handle to the periodic sync task
pub struct SyncScheduler {
    manager: Arc<SyncManager>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<LoopHandle>>,
}

/// One spawned loop: its join handle and the wakeup used to stop it
struct LoopHandle {
    handle: JoinHandle<()>,
    stop_notify: Arc<Notify>,
}

/// What one round of syncing every board achieved
struct RoundStats {
    succeeded: usize,
    failed: usize,
}

impl SyncScheduler {
    /// Create a scheduler for the given manager; does not start it
    pub fn new(manager: Arc<SyncManager>) -> Self {
        Self {
            manager,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the periodic loop
    ///
    /// Returns false (and changes nothing) if the loop is already running.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("sync scheduler already running");
            return false;
        }

        let manager = self.manager.clone();
        let running = self.running.clone();
        // Each start gets its own Notify, so a permit left behind by an
        // earlier stop can never wake this loop.
        let stop_notify = Arc::new(Notify::new());
        let loop_notify = stop_notify.clone();
        let handle = tokio::spawn(async move {
            run_loop(manager, running, loop_notify).await;
        });
        *self.task.lock() = Some(LoopHandle { handle, stop_notify });

        info!("sync scheduler started");
        true
    }

    /// Stop the loop and wait for the task to wind down
    ///
    /// Idempotent; returns false if the loop was not running. An in-flight
    /// round finishes its current board and then exits.
    pub async fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            // notify_one leaves a permit behind, so a stop that lands while
            // the loop is between waits still wakes the next one.
            task.stop_notify.notify_one();
            let _ = task.handle.await;
        }

        info!("sync scheduler stopped");
        true
    }

    /// Whether the periodic loop is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn run_loop(manager: Arc<SyncManager>, running: Arc<AtomicBool>, stop_notify: Arc<Notify>) {
    let mut consecutive_failures: u32 = 0;

    while running.load(Ordering::SeqCst) {
        let delay = manager.config().next_delay(consecutive_failures);
        if consecutive_failures >= manager.config().failure_threshold {
            warn!(
                consecutive_failures,
                delay_secs = delay.as_secs(),
                "sync failing repeatedly, backing off"
            );
        }

        // The flag is authoritative; a wakeup only cuts the wait short.
        tokio::select! {
            _ = stop_notify.notified() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match run_round(&manager, &running).await {
            Ok(stats) => {
                if stats.succeeded > 0 || stats.failed == 0 {
                    if consecutive_failures > 0 {
                        info!(succeeded = stats.succeeded, "sync recovered");
                    }
                    consecutive_failures = 0;
                    debug!(
                        succeeded = stats.succeeded,
                        failed = stats.failed,
                        "periodic sync round complete"
                    );
                } else {
                    consecutive_failures += 1;
                    warn!(
                        failed = stats.failed,
                        consecutive_failures, "periodic sync round failed"
                    );
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(error = %e, consecutive_failures, "board enumeration failed");
            }
        }
    }

    debug!("sync scheduler loop exited");
}

/// Sync every board once, sequentially
///
/// A stop request arriving mid-round skips the remaining boards. Per-board
/// failures are counted, not propagated, so one dead board never hides the
/// others.
async fn run_round(manager: &SyncManager, running: &AtomicBool) -> SyncResult<RoundStats> {
    let boards = manager.store().all_boards()?;
    let mut stats = RoundStats {
        succeeded: 0,
        failed: 0,
    };

    for board in &boards {
        if !running.load(Ordering::SeqCst) {
            debug!("stop requested mid-round, skipping remaining boards");
            break;
        }
        match manager.sync_board(&board.id, None).await {
            Ok(_) => stats.succeeded += 1,
            Err(e) => {
                warn!(board_id = %board.id, error = %e, "board sync failed");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::crypto::LocalIdentity;
    use crate::store::MemoryStore;
    use crate::sync::events::SyncEvent;
    use crate::transport::InProcessNetwork;
    use crate::types::{BoardRecord, PeerId};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Manager on a board whose only peer is subscribed but unreachable,
    /// so every sync round fails
    fn manager_with_ghost_peer() -> (Arc<SyncManager>, BoardRecord) {
        let identity = LocalIdentity::generate();
        let store = MemoryStore::new();
        let board = BoardRecord::new("general");
        store.insert_board(board.clone());

        let network = InProcessNetwork::new();
        network.subscribe(&PeerId::new("ghost"), board.id);
        let endpoint = network.endpoint(identity.peer_id().clone());

        let manager = Arc::new(SyncManager::new(
            identity,
            Arc::new(store),
            Arc::new(endpoint),
            SyncConfig::default(),
        ));
        (manager, board)
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let (manager, _board) = manager_with_ghost_peer();
        let scheduler = SyncScheduler::new(manager);

        assert!(!scheduler.is_running());
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());

        assert!(scheduler.stop().await);
        assert!(!scheduler.stop().await);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_a_noop() {
        let (manager, _board) = manager_with_ghost_peer();
        let scheduler = SyncScheduler::new(manager);
        assert!(!scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (manager, _board) = manager_with_ghost_peer();
        let scheduler = SyncScheduler::new(manager);

        assert!(scheduler.start());
        assert!(scheduler.stop().await);
        assert!(scheduler.start());
        assert!(scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarted_scheduler_keeps_syncing() {
        let (manager, board) = manager_with_ghost_peer();
        let mut events = manager.subscribe();
        let scheduler = SyncScheduler::new(manager);

        // Two full stop/start cycles. A stop that lands before the loop is
        // ever polled strands its wakeup permit; the restarted loop must
        // still run rounds on the regular cadence.
        for _ in 0..2 {
            scheduler.start();
            assert!(scheduler.stop().await);

            let restarted = Instant::now();
            assert!(scheduler.start(), "restart refused");
            assert!(scheduler.is_running());

            let event = events.recv().await.unwrap();
            assert!(matches!(
                event,
                SyncEvent::PeerUnreachable { board_id, .. } if board_id == board.id
            ));
            let elapsed = restarted.elapsed();
            assert!(elapsed >= Duration::from_secs(30), "fired at {elapsed:?}");
            assert!(elapsed < Duration::from_secs(31), "fired at {elapsed:?}");

            assert!(scheduler.stop().await);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_round_fires_after_the_sync_interval() {
        let (manager, board) = manager_with_ghost_peer();
        let mut events = manager.subscribe();
        let scheduler = SyncScheduler::new(manager);

        let started = Instant::now();
        scheduler.start();

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            SyncEvent::PeerUnreachable { board_id, .. } if board_id == board.id
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "fired at {elapsed:?}");
        assert!(elapsed < Duration::from_secs(31), "fired at {elapsed:?}");

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_shrink_the_wait_to_backoff() {
        let (manager, _board) = manager_with_ghost_peer();
        let mut events = manager.subscribe();
        let scheduler = SyncScheduler::new(manager);
        scheduler.start();

        // One PeerUnreachable per round; capture each round's firing time.
        let mut fired_at = Vec::new();
        for _ in 0..5 {
            events.recv().await.unwrap();
            fired_at.push(Instant::now());
        }
        scheduler.stop().await;

        let gaps: Vec<Duration> = fired_at.windows(2).map(|w| w[1] - w[0]).collect();

        // Rounds 2 and 3 still run at the regular interval. After the third
        // consecutive failure the wait drops to the backoff base, then
        // doubles.
        assert!(gaps[0] >= Duration::from_secs(30) && gaps[0] < Duration::from_secs(31));
        assert!(gaps[1] >= Duration::from_secs(30) && gaps[1] < Duration::from_secs(31));
        assert!(gaps[2] >= Duration::from_secs(5) && gaps[2] < Duration::from_secs(6));
        assert!(gaps[3] >= Duration::from_secs(10) && gaps[3] < Duration::from_secs(11));
    }
}
