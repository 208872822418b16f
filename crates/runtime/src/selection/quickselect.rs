use std::cmp::Ordering;

use super::{admitted, by_cost_desc, Ranked, SelectionCriteria, TopK};

/// Hoare-style selection with Lomuto partitioning around the middle element.
///
/// After selection the first K slots hold the K most expensive candidates in
/// arbitrary order; only those are sorted.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickSelect;

impl TopK for QuickSelect {
    fn name(&self) -> &'static str {
        "quick_select"
    }

    fn select<R: Ranked>(&self, items: Vec<R>, criteria: SelectionCriteria) -> Vec<R> {
        let mut candidates = admitted(items, &criteria);
        let k = criteria.effective_limit(candidates.len());
        if k < candidates.len() {
            select_top(&mut candidates, k);
            candidates.truncate(k);
        }
        candidates.sort_unstable_by(by_cost_desc);
        candidates
    }
}

/// Rearrange `items` so that `items[..k]` are the `k` highest-cost entries.
fn select_top<R: Ranked>(items: &mut [R], k: usize) {
    let (mut lo, mut hi) = (0, items.len());
    while hi - lo > 1 {
        let pivot = lo + partition(&mut items[lo..hi]);
        match pivot.cmp(&k) {
            Ordering::Equal => return,
            Ordering::Less => lo = pivot + 1,
            Ordering::Greater => hi = pivot,
        }
    }
}

/// Entries costlier than the pivot move left of it. Returns the pivot's final index.
fn partition<R: Ranked>(items: &mut [R]) -> usize {
    let last = items.len() - 1;
    items.swap(items.len() / 2, last);
    let pivot = items[last].cost();

    let mut store = 0;
    for i in 0..last {
        if items[i].cost().total_cmp(&pivot) == Ordering::Greater {
            items.swap(i, store);
            store += 1;
        }
    }
    items.swap(store, last);
    store
}
