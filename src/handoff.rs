use serde::Serialize;

use crate::recovery::SessionRecoveryMarker;
use crate::store::{KeyValueStore, Persisted, get_or_log, keys, remove_or_log, set_or_log};

/// What a listing page hands over to the viewer through durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerHandoff {
    pub link: String,
    pub title: String,
    pub table_content: Option<Vec<u32>>,
    pub labels: Option<Vec<String>>,
}

fn table_contents() -> Persisted<Vec<u32>> {
    Persisted::new(keys::TABLE_CONTENTS, Vec::new())
}

fn labels() -> Persisted<Vec<String>> {
    Persisted::new(keys::LABELS, Vec::new())
}

/// Stores the edition to read plus a fresh marker pointing back at `return_url`.
pub fn open_in_viewer(
    store: &dyn KeyValueStore,
    handoff: &ViewerHandoff,
    return_url: &str,
    now_ms: i64,
) {
    tracing::info!(
        title = %handoff.title,
        has_table_content = handoff.table_content.is_some(),
        has_labels = handoff.labels.is_some(),
        "opening viewer"
    );
    set_or_log(store, keys::DRIVE_LINK, &handoff.link);
    set_or_log(store, keys::EDITION_TITLE, &handoff.title);
    table_contents().save(store, &handoff.table_content.clone().unwrap_or_default());
    labels().save(store, &handoff.labels.clone().unwrap_or_default());
    SessionRecoveryMarker::new(0, return_url, now_ms).save(store);
}

/// `None` when no link or title was handed over.
pub fn read_handoff(store: &dyn KeyValueStore) -> Option<ViewerHandoff> {
    let link = get_or_log(store, keys::DRIVE_LINK).filter(|link| !link.is_empty())?;
    let title = get_or_log(store, keys::EDITION_TITLE).filter(|title| !title.is_empty())?;
    Some(ViewerHandoff {
        link,
        title,
        table_content: table_contents().try_load(store),
        labels: labels().try_load(store),
    })
}

pub fn clear_handoff(store: &dyn KeyValueStore) {
    for key in [
        keys::DRIVE_LINK,
        keys::EDITION_TITLE,
        keys::TABLE_CONTENTS,
        keys::LABELS,
    ] {
        remove_or_log(store, key);
    }
    SessionRecoveryMarker::clear(store);
}
