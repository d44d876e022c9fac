/// Stream merger for the all-activities feed
///
/// Each chain pages independently. A chain that filled its page may hold more
/// history right below its oldest returned item, so nothing older than that
/// item can be reported yet without risking a gap. A chain that returned less
/// than a full page is exhausted and imposes no cap.
use crate::activity::{sort_activities, Activity};
use std::collections::HashSet;

/// Oldest timestamp a source vouches for, or 0 when the source is exhausted
fn safe_cap(activities: &[Activity], limit: usize) -> i64 {
    if activities.len() >= limit {
        activities.last().map(Activity::timestamp).unwrap_or(0)
    } else {
        0
    }
}

/// Merge two newest-first pages, keeping only items every source can vouch for
pub fn merge_activities_to_max_time(
    first: Vec<Activity>,
    second: Vec<Activity>,
    limit: usize,
) -> Vec<Activity> {
    let from_timestamp = safe_cap(&first, limit).max(safe_cap(&second, limit));

    let mut seen = HashSet::new();
    let mut merged: Vec<Activity> = first
        .into_iter()
        .chain(second)
        .filter(|activity| activity.timestamp() >= from_timestamp)
        .filter(|activity| seen.insert(activity.id().to_string()))
        .collect();

    sort_activities(&mut merged);
    merged
}
