use super::{ContentId, ProgressRecord, ProgressStore};

/// Progress at or below this percentage counts as "not really started".
pub(crate) const RESUME_FLOOR_PERCENT: f64 = 5.0;

fn is_resumable(record: &ProgressRecord) -> bool {
    !record.completed && record.progress > RESUME_FLOOR_PERCENT
}

/// Stored progress worth resuming from, or `None` to start from the
/// beginning.
pub(crate) fn resume_progress(
    store: &ProgressStore,
    tmdb_id: u64,
    season: Option<u32>,
    episode: Option<u32>,
) -> Option<ProgressRecord> {
    let id = ContentId::generate(tmdb_id, season, episode);
    store.load(&id).filter(is_resumable)
}

/// The continue-watching list, most recently watched first.
pub(crate) fn incomplete_progress(store: &ProgressStore) -> Vec<ProgressRecord> {
    let mut items = store
        .get_all()
        .into_values()
        .filter(is_resumable)
        .collect::<Vec<_>>();
    // Stable, so ties keep content-id order from the table.
    items.sort_by(|left, right| right.last_watched.cmp(&left.last_watched));
    items
}

/// Every stored record, most recently watched first.
pub(crate) fn all_progress(store: &ProgressStore) -> Vec<ProgressRecord> {
    let mut items = store.get_all().into_values().collect::<Vec<_>>();
    items.sort_by(|left, right| right.last_watched.cmp(&left.last_watched));
    items
}
