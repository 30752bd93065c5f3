use chrono::{DateTime, Duration, Utc};
use insights_core::{Money, TransactionId};
use std::collections::HashMap;

/// The fields the pairing scan orders and groups by.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PairKey {
    pub amount: Money,
    pub at: DateTime<Utc>,
    pub id: TransactionId,
}

/// Calls `visit(i, j)` for every pair of indices into `items` whose amounts
/// have the same absolute value and whose timestamps are at most `window`
/// apart (inclusive). Sign and account checks are left to the caller.
///
/// Items are bucketed by absolute amount; singleton buckets are skipped.
/// Each bucket is sorted by `(timestamp, id)` and the inner scan stops at
/// the first entry past the window, since everything after it is further.
pub(crate) fn for_each_pair_in_window<T>(
    items: &[T],
    key: impl Fn(&T) -> PairKey,
    window: Duration,
    mut visit: impl FnMut(usize, usize),
) {
    let mut groups: HashMap<Money, Vec<(PairKey, usize)>> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        let k = key(item);
        groups.entry(k.amount.abs()).or_default().push((k, idx));
    }

    for mut group in groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|(a, _), (b, _)| a.at.cmp(&b.at).then_with(|| a.id.cmp(&b.id)));

        for (i, (left, left_idx)) in group.iter().enumerate() {
            for (right, right_idx) in &group[i + 1..] {
                if right.at - left.at > window {
                    break;
                }
                visit(*left_idx, *right_idx);
            }
        }
    }
}
