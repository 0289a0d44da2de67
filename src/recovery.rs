use std::time::Duration;

use crate::store::{KeyValueStore, get_or_log, keys, remove_or_log, set_or_log};

/// Where a previous viewer mount left off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecoveryMarker {
    pub last_session_ms: i64,
    pub last_page: i64,
    pub return_url: String,
}

impl SessionRecoveryMarker {
    pub fn new(last_page: usize, return_url: &str, now_ms: i64) -> Self {
        Self {
            last_session_ms: now_ms,
            last_page: i64::try_from(last_page).unwrap_or(i64::MAX),
            return_url: return_url.to_owned(),
        }
    }

    /// All three keys must be present and numeric, otherwise there is no marker.
    pub fn load(store: &dyn KeyValueStore) -> Option<Self> {
        let last_session_ms = get_or_log(store, keys::LAST_SESSION)?.trim().parse().ok()?;
        let last_page = get_or_log(store, keys::LAST_PAGE)?.trim().parse().ok()?;
        let return_url = get_or_log(store, keys::RETURN_URL)?;
        Some(Self {
            last_session_ms,
            last_page,
            return_url,
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        set_or_log(store, keys::RETURN_URL, &self.return_url);
        set_or_log(store, keys::LAST_PAGE, &self.last_page.to_string());
        set_or_log(store, keys::LAST_SESSION, &self.last_session_ms.to_string());
    }

    pub fn clear(store: &dyn KeyValueStore) {
        remove_or_log(store, keys::LAST_SESSION);
        remove_or_log(store, keys::LAST_PAGE);
        remove_or_log(store, keys::RETURN_URL);
    }

    /// Computed from the stored timestamp each time, never cached.
    pub fn is_expired(&self, now_ms: i64, expiry: Duration) -> bool {
        let expiry_ms = i64::try_from(expiry.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.last_session_ms) > expiry_ms
    }

    pub fn restorable_page(&self) -> Option<usize> {
        usize::try_from(self.last_page).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    Fresh,
    /// Jump to `page` once the next extraction completes; the marker stays until then.
    Resume { page: usize },
    /// The session expired elsewhere; send the user back where they came from.
    Redirect { return_url: String },
}

/// Decides, once per mount, whether to resume, redirect or start fresh.
pub fn evaluate(
    store: &dyn KeyValueStore,
    now_ms: i64,
    location: &str,
    expiry: Duration,
) -> RecoveryDecision {
    let Some(marker) = SessionRecoveryMarker::load(store) else {
        return RecoveryDecision::Fresh;
    };

    if marker.is_expired(now_ms, expiry) {
        tracing::info!(
            return_url = %marker.return_url,
            age_ms = now_ms.saturating_sub(marker.last_session_ms),
            "viewer session expired"
        );
        SessionRecoveryMarker::clear(store);
        if marker.return_url != location {
            return RecoveryDecision::Redirect {
                return_url: marker.return_url,
            };
        }
        return RecoveryDecision::Fresh;
    }

    match marker.restorable_page() {
        Some(page) => {
            tracing::info!(page, "resuming viewer session");
            RecoveryDecision::Resume { page }
        }
        None => RecoveryDecision::Fresh,
    }
}

/// Page to restore when the user resubmits while a live marker exists.
pub fn pending_restore(store: &dyn KeyValueStore, now_ms: i64, expiry: Duration) -> Option<usize> {
    let marker = SessionRecoveryMarker::load(store)?;
    if marker.is_expired(now_ms, expiry) {
        return None;
    }
    marker.restorable_page()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const EXPIRY: Duration = Duration::from_secs(60);
    const NOW: i64 = 1_700_000_000_000;

    fn store_with(marker: &SessionRecoveryMarker) -> MemoryStore {
        let store = MemoryStore::new();
        marker.save(&store);
        store
    }

    #[test]
    fn no_marker_means_fresh() {
        let store = MemoryStore::new();
        assert_eq!(
            evaluate(&store, NOW, "/comic-viewer", EXPIRY),
            RecoveryDecision::Fresh
        );
    }

    #[test]
    fn fresh_marker_resumes_and_is_kept() {
        let marker = SessionRecoveryMarker {
            last_session_ms: NOW - 5_000,
            last_page: 3,
            return_url: "/comic-viewer".to_owned(),
        };
        let store = store_with(&marker);
        assert_eq!(
            evaluate(&store, NOW, "/comic-viewer", EXPIRY),
            RecoveryDecision::Resume { page: 3 }
        );
        assert_eq!(SessionRecoveryMarker::load(&store), Some(marker));
    }

    #[test]
    fn stale_marker_redirects_and_clears() {
        let marker = SessionRecoveryMarker {
            last_session_ms: NOW - 90_000,
            last_page: 7,
            return_url: "/period/x".to_owned(),
        };
        let store = store_with(&marker);
        assert_eq!(
            evaluate(&store, NOW, "/comic-viewer", EXPIRY),
            RecoveryDecision::Redirect {
                return_url: "/period/x".to_owned()
            }
        );
        assert_eq!(SessionRecoveryMarker::load(&store), None);
    }

    #[test]
    fn stale_marker_for_same_location_starts_fresh() {
        let marker = SessionRecoveryMarker {
            last_session_ms: NOW - 90_000,
            last_page: 7,
            return_url: "/comic-viewer".to_owned(),
        };
        let store = store_with(&marker);
        assert_eq!(
            evaluate(&store, NOW, "/comic-viewer", EXPIRY),
            RecoveryDecision::Fresh
        );
        assert_eq!(SessionRecoveryMarker::load(&store), None);
    }

    #[test]
    fn negative_or_corrupt_page_is_not_restored() {
        let marker = SessionRecoveryMarker {
            last_session_ms: NOW - 1_000,
            last_page: -1,
            return_url: "/comic-viewer".to_owned(),
        };
        let store = store_with(&marker);
        assert_eq!(
            evaluate(&store, NOW, "/comic-viewer", EXPIRY),
            RecoveryDecision::Fresh
        );

        store.set(keys::LAST_PAGE, "three").unwrap();
        assert_eq!(SessionRecoveryMarker::load(&store), None);
    }

    #[test]
    fn resubmission_only_restores_live_markers() {
        let live = SessionRecoveryMarker::new(4, "/comic-viewer", NOW - 1_000);
        let store = store_with(&live);
        assert_eq!(pending_restore(&store, NOW, EXPIRY), Some(4));

        let stale = SessionRecoveryMarker::new(4, "/comic-viewer", NOW - 61_000);
        stale.save(&store);
        assert_eq!(pending_restore(&store, NOW, EXPIRY), None);
    }
}
