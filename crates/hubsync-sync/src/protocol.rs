//! Reconciliation session state machine.
//!
//! A session walks the peer's trie from the root, descending only into
//! children whose hashes differ from ours. Subtrees small enough are resolved
//! by listing their ids; larger ones are descended into even when we hold
//! none of them. The ids we are missing are then fetched in batches and merged
//! through the engine.
//!
//! ```text
//! Idle -> ComparingPrefix -> CollectingMissingIds -> FetchingMessages <-> Merging -> Idle
//!              |                                                          ^
//!              +---------------- roots equal / nothing missing -----------+
//! ```
//!
//! Every transition is one call to [`SyncSession::step`]. Peer calls are
//! bounded by [`SyncConfig::rpc_timeout`]; a failed call skips only the prefix
//! or batch it was serving. Store failures and cancellation end the session.

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hubsync_core::{Message, SyncId};
use hubsync_store::{MergeResult, MessageStore};
use hubsync_trie::{TrieNodeMetadata, MAX_DEPTH};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::messages::limits;
use crate::peer::SyncPeer;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout for each peer call.
    pub rpc_timeout: Duration,
    /// Maximum sync ids per message fetch.
    pub max_batch_size: usize,
    /// Differing subtrees with at most this many peer messages are resolved
    /// by listing their ids instead of descending further.
    pub leaf_resolution_threshold: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(10),
            max_batch_size: 256,
            leaf_resolution_threshold: 16,
        }
    }
}

impl SyncConfig {
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Clamped to `1..=limits::MAX_SYNC_IDS_PER_REQUEST`.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.clamp(1, limits::MAX_SYNC_IDS_PER_REQUEST);
        self
    }

    pub fn with_leaf_resolution_threshold(mut self, threshold: u64) -> Self {
        self.leaf_resolution_threshold = threshold;
        self
    }
}

/// Where a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started, or finished.
    Idle,
    /// Comparing trie nodes prefix by prefix.
    ComparingPrefix,
    /// Listing peer ids under the prefixes that differ.
    CollectingMissingIds,
    /// Requesting the next batch of messages.
    FetchingMessages,
    /// Handing a fetched batch to the store.
    Merging,
}

/// Result of a sync session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Trie nodes compared against the peer.
    pub nodes_visited: usize,
    /// Ids the peer holds that we did not.
    pub missing_ids: usize,
    /// Messages received from the peer.
    pub fetched: usize,
    /// Messages that entered the local set.
    pub inserted: usize,
    /// Local messages displaced by merged ones.
    pub removed: usize,
    /// Messages we already had by the time they were merged.
    pub duplicates: usize,
    /// Messages that lost a conflict against a stored one.
    pub conflicts_ignored: usize,
    /// Messages the store refused, or the peer sent unrequested.
    pub rejected: usize,
    /// Requested ids the peer no longer had.
    pub not_served: usize,
    /// Subtrees only we hold; the peer learns them by syncing with us.
    pub local_only_prefixes: usize,
    /// Prefixes skipped after a failed peer call.
    pub failed_prefixes: Vec<Vec<u8>>,
    /// Fetch batches skipped after a failed peer call.
    pub failed_batches: usize,
    /// Root hashes matched on the first comparison.
    pub converged_at_root: bool,
}

impl SyncReport {
    /// Whether the session changed the local message set.
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.removed > 0
    }

    /// Whether every peer call succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed_prefixes.is_empty() && self.failed_batches == 0
    }
}

/// Cancels a running session from another task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One reconciliation pass against one peer.
///
/// Pulls what the peer has and we lack. Run a session in the other direction
/// to push.
pub struct SyncSession<S, P> {
    engine: Arc<SyncEngine<S>>,
    peer: P,
    config: SyncConfig,
    state: SessionState,
    started: bool,
    finished: bool,
    /// Prefixes still to compare, deepest last.
    pending: Vec<Vec<u8>>,
    /// Prefixes to resolve by listing ids.
    collect: VecDeque<Vec<u8>>,
    missing: BTreeSet<SyncId>,
    batches: VecDeque<Vec<SyncId>>,
    fetched: Vec<Message>,
    report: SyncReport,
    cancel: CancelHandle,
}

impl<S: MessageStore, P: SyncPeer> SyncSession<S, P> {
    pub fn new(engine: Arc<SyncEngine<S>>, peer: P, config: SyncConfig) -> Self {
        Self {
            engine,
            peer,
            config,
            state: SessionState::Idle,
            started: false,
            finished: false,
            pending: Vec::new(),
            collect: VecDeque::new(),
            missing: BTreeSet::new(),
            batches: VecDeque::new(),
            fetched: Vec::new(),
            report: SyncReport::default(),
            cancel: CancelHandle::default(),
        }
    }

    /// Replace the configuration before the session starts.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Counters so far.
    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    /// Handle that makes the next [`step`](Self::step) fail with
    /// [`SyncError::Cancelled`].
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run to completion.
    pub async fn run(mut self) -> Result<SyncReport> {
        while !self.finished {
            self.step().await?;
        }
        Ok(self.report)
    }

    /// Perform one transition and return the new state.
    ///
    /// A finished session stays `Idle`.
    pub async fn step(&mut self) -> Result<SessionState> {
        if self.finished {
            return Ok(self.state);
        }
        if self.cancel.is_cancelled() {
            tracing::info!(
                state = ?self.state,
                inserted = self.report.inserted,
                "sync session cancelled"
            );
            self.finish();
            return Err(SyncError::Cancelled);
        }

        let result = match self.state {
            SessionState::Idle => {
                tracing::debug!("sync session started");
                self.started = true;
                self.pending.push(Vec::new());
                self.state = SessionState::ComparingPrefix;
                Ok(())
            }
            SessionState::ComparingPrefix => self.compare_next().await,
            SessionState::CollectingMissingIds => self.collect_next().await,
            SessionState::FetchingMessages => self.fetch_next().await,
            SessionState::Merging => self.merge_fetched().await,
        };

        if let Err(err) = result {
            self.finish();
            return Err(err);
        }
        Ok(self.state)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    async fn compare_next(&mut self) -> Result<()> {
        if let Some(prefix) = self.pending.pop() {
            let call = self.peer.get_sync_metadata_by_prefix(&prefix);
            match with_timeout(self.config.rpc_timeout, "sync metadata", call).await {
                Ok(theirs) if theirs.prefix == prefix => self.compare(prefix, theirs)?,
                Ok(theirs) => {
                    let err = SyncError::InvalidMessage(format!(
                        "metadata for prefix of {} bytes answered with {} bytes",
                        prefix.len(),
                        theirs.prefix.len()
                    ));
                    self.skip_prefix(prefix, err)?;
                }
                Err(err) => self.skip_prefix(prefix, err)?,
            }
        }

        if self.pending.is_empty() {
            if self.collect.is_empty() {
                self.finish();
            } else {
                self.state = SessionState::CollectingMissingIds;
            }
        }
        Ok(())
    }

    fn compare(&mut self, prefix: Vec<u8>, theirs: TrieNodeMetadata) -> Result<()> {
        self.report.nodes_visited += 1;
        let ours = self.engine.snapshot().get_node_metadata(&prefix)?;

        if let Some(ours) = &ours {
            if ours.hash == theirs.hash {
                if prefix.is_empty() {
                    self.report.converged_at_root = true;
                }
                return Ok(());
            }
        }
        if self.listable(prefix.len(), theirs.num_messages) {
            self.collect.push_back(prefix);
            return Ok(());
        }

        if let Some(ours) = &ours {
            self.report.local_only_prefixes += ours
                .children
                .keys()
                .filter(|key| !theirs.children.contains_key(key))
                .count();
        }

        // Reverse so the lowest key is compared first.
        for (key, child) in theirs.children.iter().rev() {
            let mut child_prefix = prefix.clone();
            child_prefix.push(*key);
            match ours.as_ref().and_then(|ours| ours.children.get(key)) {
                Some(local) if local.hash == child.hash => {}
                None if self.listable(child_prefix.len(), child.num_messages) => {
                    self.collect.push_front(child_prefix)
                }
                _ => self.pending.push(child_prefix),
            }
        }
        Ok(())
    }

    /// Whether a peer subtree of `count` ids is resolved with one listing.
    ///
    /// Larger subtrees are descended into, even when we hold none of them, so
    /// no listing outgrows a frame.
    fn listable(&self, prefix_len: usize, count: u64) -> bool {
        let cap = limits::MAX_SYNC_IDS_PER_LISTING as u64;
        prefix_len >= MAX_DEPTH || count <= self.config.leaf_resolution_threshold.min(cap)
    }

    async fn collect_next(&mut self) -> Result<()> {
        if let Some(prefix) = self.collect.pop_front() {
            let call = self.peer.get_all_sync_ids_by_prefix(&prefix);
            match with_timeout(self.config.rpc_timeout, "sync ids", call).await {
                Ok(ids) => {
                    let snapshot = self.engine.snapshot();
                    self.missing.extend(
                        ids.into_iter()
                            .filter(|id| id.has_prefix(&prefix) && !snapshot.exists(id)),
                    );
                }
                Err(err) => self.skip_prefix(prefix, err)?,
            }
        }

        if self.collect.is_empty() {
            self.report.missing_ids = self.missing.len();
            if self.missing.is_empty() {
                self.finish();
                return Ok(());
            }

            let ids: Vec<SyncId> = std::mem::take(&mut self.missing).into_iter().collect();
            let size = self.config.max_batch_size.max(1);
            self.batches = ids.chunks(size).map(<[SyncId]>::to_vec).collect();
            tracing::debug!(
                missing = self.report.missing_ids,
                batches = self.batches.len(),
                "collected missing ids"
            );
            self.state = SessionState::FetchingMessages;
        }
        Ok(())
    }

    async fn fetch_next(&mut self) -> Result<()> {
        let Some(batch) = self.batches.pop_front() else {
            self.finish();
            return Ok(());
        };

        let call = self.peer.get_all_messages_by_sync_ids(&batch);
        match with_timeout(self.config.rpc_timeout, "messages", call).await {
            Ok(found) => {
                self.report.fetched += found.messages.len();
                self.report.not_served += found.missing_ids.len();

                let requested: BTreeSet<&SyncId> = batch.iter().collect();
                for message in found.messages {
                    match message.sync_id() {
                        Ok(id) if requested.contains(&id) => self.fetched.push(message),
                        _ => self.report.rejected += 1,
                    }
                }
                self.state = SessionState::Merging;
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, size = batch.len(), "message fetch failed, skipping batch");
                self.report.failed_batches += 1;
                if self.batches.is_empty() {
                    self.finish();
                }
            }
        }
        Ok(())
    }

    async fn merge_fetched(&mut self) -> Result<()> {
        for message in std::mem::take(&mut self.fetched) {
            match self.engine.merge_message(&message).await? {
                MergeResult::Merged { removed } => {
                    self.report.inserted += 1;
                    self.report.removed += removed.len();
                }
                MergeResult::Duplicate => self.report.duplicates += 1,
                MergeResult::ConflictIgnored { .. } => self.report.conflicts_ignored += 1,
                MergeResult::Rejected { .. } => self.report.rejected += 1,
            }
        }

        if self.batches.is_empty() {
            self.finish();
        } else {
            self.state = SessionState::FetchingMessages;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a failed prefix, or propagate if the error ends the session.
    fn skip_prefix(&mut self, prefix: Vec<u8>, err: SyncError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        tracing::warn!(error = %err, prefix_len = prefix.len(), "skipping prefix");
        self.report.failed_prefixes.push(prefix);
        Ok(())
    }

    fn finish(&mut self) {
        if self.started && !self.finished {
            tracing::info!(
                nodes_visited = self.report.nodes_visited,
                missing = self.report.missing_ids,
                inserted = self.report.inserted,
                removed = self.report.removed,
                failed_prefixes = self.report.failed_prefixes.len(),
                failed_batches = self.report.failed_batches,
                "sync session finished"
            );
        }
        self.finished = true;
        self.state = SessionState::Idle;
        self.pending.clear();
        self.collect.clear();
        self.batches.clear();
        self.fetched.clear();
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::PeerTimeout(format!(
            "{what} request exceeded {timeout:?}"
        ))),
    }
}
