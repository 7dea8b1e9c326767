//! Feed synchronization.
//!
//! [`SyncReconciler`] runs fetch, parse and reconciliation for one feed;
//! [`FeedService`] wraps it with subscription and folder management.

mod reconciler;
mod service;

pub use reconciler::{AnnotatedFeedItem, SyncOutcome, SyncReconciler};
pub use service::{
    AddFeedRequest, FeedRefresh, FeedService, ImportReport, SkipReason, SkippedImport,
    SubscriptionImport,
};
