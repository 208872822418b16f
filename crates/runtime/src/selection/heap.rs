use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{by_cost_desc, FullSort, Ranked, SelectionCriteria, TopK};

/// Streaming top-K with a min-heap of at most K entries.
///
/// The cheapest retained candidate sits at the top of the heap and is replaced
/// whenever a strictly more expensive candidate arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedHeap;

/// Reverses the cost order so `BinaryHeap` behaves as a min-heap.
struct MinByCost<R>(R);

impl<R: Ranked> PartialEq for MinByCost<R> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<R: Ranked> Eq for MinByCost<R> {}

impl<R: Ranked> PartialOrd for MinByCost<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Ranked> Ord for MinByCost<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        by_cost_desc(&self.0, &other.0)
    }
}

impl TopK for BoundedHeap {
    fn name(&self) -> &'static str {
        "bounded_heap"
    }

    fn select<R: Ranked>(&self, items: Vec<R>, criteria: SelectionCriteria) -> Vec<R> {
        // Nothing to bound.
        let Some(k) = criteria.limit else {
            return FullSort.select(items, criteria);
        };

        let mut heap: BinaryHeap<MinByCost<R>> = BinaryHeap::with_capacity(k.min(items.len()));
        for item in items {
            let cost = item.cost();
            if !criteria.admits(cost) {
                continue;
            }
            if heap.len() < k {
                heap.push(MinByCost(item));
            } else if let Some(mut cheapest) = heap.peek_mut() {
                if cost > cheapest.0.cost() {
                    *cheapest = MinByCost(item);
                }
            }
        }

        // Ascending under the reversed order is descending by cost.
        heap.into_sorted_vec().into_iter().map(|e| e.0).collect()
    }
}
