//! Viewport read tracking.
//!
//! The tracker turns visibility signals from a rendered item list into
//! `mark_read` calls. An item is marked read when it leaves the viewport
//! across the top edge, or when the reader opens it. Entering the viewport
//! from below never marks anything.
//!
//! The tracker itself owns no read state. Marks are queued on a channel
//! and applied by the task started with [`spawn_read_marker`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::ReadStateStore;

/// Where an item sits relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPosition {
    /// Entirely above the viewport (scrolled past).
    Above,
    /// At least partly inside the viewport.
    Visible,
    /// Entirely below the viewport (not reached yet).
    Below,
}

impl ItemPosition {
    /// Classify an item from its vertical extent and the viewport's, in the
    /// same coordinate space (y grows downwards).
    pub fn classify(top: f64, bottom: f64, viewport_top: f64, viewport_bottom: f64) -> Self {
        if bottom <= viewport_top {
            ItemPosition::Above
        } else if top >= viewport_bottom {
            ItemPosition::Below
        } else {
            ItemPosition::Visible
        }
    }
}

/// Emits read marks for tracked articles as the reader scrolls.
///
/// Each article is marked at most once per tracker, however many scroll
/// events report it.
#[derive(Debug)]
pub struct ViewportReadTracker {
    positions: HashMap<i64, ItemPosition>,
    marked: HashSet<i64>,
    tx: mpsc::UnboundedSender<i64>,
}

impl ViewportReadTracker {
    /// Create a tracker sending article IDs to mark on `tx`.
    pub fn new(tx: mpsc::UnboundedSender<i64>) -> Self {
        Self {
            positions: HashMap::new(),
            marked: HashSet::new(),
            tx,
        }
    }

    /// Skip articles already known to be read.
    pub fn mark_known_read(&mut self, article_ids: impl IntoIterator<Item = i64>) {
        self.marked.extend(article_ids);
    }

    /// Report the current position of an article.
    ///
    /// Returns `true` if this observation queued a read mark.
    pub fn observe(&mut self, article_id: i64, position: ItemPosition) -> bool {
        let previous = self.positions.insert(article_id, position);
        if previous == Some(ItemPosition::Visible) && position == ItemPosition::Above {
            return self.emit(article_id);
        }
        false
    }

    /// The reader opened the article's full content.
    pub fn opened(&mut self, article_id: i64) -> bool {
        self.emit(article_id)
    }

    /// Forget all positions, e.g. after the list is re-rendered.
    ///
    /// Articles already marked stay marked.
    pub fn reset(&mut self) {
        self.positions.clear();
    }

    fn emit(&mut self, article_id: i64) -> bool {
        if !self.marked.insert(article_id) {
            return false;
        }
        debug!(article_id, "queueing read mark");
        if self.tx.send(article_id).is_err() {
            warn!(article_id, "read marker stopped; mark dropped");
            self.marked.remove(&article_id);
            return false;
        }
        true
    }
}

/// Handle to a running read-marker task.
pub struct ReadMarkerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<u64>,
}

impl ReadMarkerHandle {
    /// Stop the task after applying marks already queued.
    ///
    /// Returns how many marks were applied successfully.
    pub async fn stop(self) -> Result<u64> {
        let _ = self.cancel_tx.send(());
        Ok(self.join.await?)
    }

    /// Wait for the task to finish on its own, which happens once every
    /// tracker feeding it has been dropped.
    pub async fn finish(self) -> Result<u64> {
        Ok(self.join.await?)
    }
}

/// Start a task applying a tracker's read marks for `user_id`.
pub fn spawn_read_marker(
    store: Arc<dyn ReadStateStore>,
    user_id: impl Into<String>,
) -> (ViewportReadTracker, ReadMarkerHandle) {
    let user_id = user_id.into();
    let (tx, mut rx) = mpsc::unbounded_channel::<i64>();
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);

    let join = tokio::spawn(async move {
        let mut applied = 0;
        loop {
            tokio::select! {
                biased;
                next = rx.recv() => match next {
                    Some(article_id) => {
                        if apply(store.as_ref(), article_id, &user_id).await {
                            applied += 1;
                        }
                    }
                    None => break,
                },
                _ = cancel_rx.recv() => {
                    info!("read marker shutdown requested");
                    while let Ok(article_id) = rx.try_recv() {
                        if apply(store.as_ref(), article_id, &user_id).await {
                            applied += 1;
                        }
                    }
                    break;
                }
            }
        }
        applied
    });

    (
        ViewportReadTracker::new(tx),
        ReadMarkerHandle { cancel_tx, join },
    )
}

async fn apply(store: &dyn ReadStateStore, article_id: i64, user_id: &str) -> bool {
    match store.mark_read(article_id, user_id).await {
        Ok(_) => true,
        Err(e) => {
            warn!(article_id, error = %e, "failed to mark article read");
            false
        }
    }
}
