//! Stable item identity.
//!
//! The identity is what the read-state store keys on: the publisher's
//! guid when present, else the link, else the title. Values are trimmed and
//! otherwise used as-is. URL normalization and content hashing are not
//! applied, so two items that differ only in those respects are distinct.

use crate::feed::types::FeedItem;

/// Which field an identity was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Guid,
    Link,
    Title,
}

/// Compute an item's identity, or `None` when guid, link and title are all blank.
pub fn resolve_identity(item: &FeedItem) -> Option<String> {
    resolve_identity_with_source(item).map(|(identity, _)| identity)
}

/// Like [`resolve_identity`], also reporting which field was used.
pub fn resolve_identity_with_source(item: &FeedItem) -> Option<(String, IdentitySource)> {
    let candidates = [
        (item.guid.as_deref(), IdentitySource::Guid),
        (item.link.as_deref(), IdentitySource::Link),
        (Some(item.title.as_str()), IdentitySource::Title),
    ];

    candidates.into_iter().find_map(|(value, source)| {
        let value = value?.trim();
        (!value.is_empty()).then(|| (value.to_string(), source))
    })
}
