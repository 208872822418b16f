//! Top-K selection over ranked records.
//!
//! Every strategy keeps only candidates whose cost is at least the threshold,
//! then returns the `K` most expensive of them in non-increasing cost order.
//! When `K` is unlimited all admitted candidates are returned, sorted.
//!
//! | Strategy      | Time                 | Space | Notes                         |
//! |---------------|----------------------|-------|-------------------------------|
//! | `FullSort`    | O(N log N)           | O(N)  | stable, reference behaviour   |
//! | `BoundedHeap` | O(N log K)           | O(K)  | default; streams candidates   |
//! | `QuickSelect` | O(N) avg + O(K log K)| O(N)  | in place partitioning         |
//! | `PartialSort` | O(N) avg + O(K log K)| O(N)  | `select_nth_unstable_by`      |
//!
//! Ordering among candidates with equal cost is not defined and differs
//! between strategies.

use std::cmp::Ordering;

pub use querylens_common::config::SelectionStrategy;

mod heap;
mod quickselect;

pub use heap::BoundedHeap;
pub use quickselect::QuickSelect;

/// Anything that can be ranked by a single cost figure.
pub trait Ranked {
    fn cost(&self) -> f64;
}

impl Ranked for f64 {
    fn cost(&self) -> f64 {
        *self
    }
}

/// Threshold and limit applied by every strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionCriteria {
    /// Inclusive minimum cost.
    pub threshold: f64,
    /// `None` means unlimited.
    pub limit: Option<usize>,
}

impl SelectionCriteria {
    /// Build from the configured record limit, where zero or negative means unlimited.
    pub fn new(threshold: f64, record_limit: i64) -> Self {
        let limit = usize::try_from(record_limit).ok().filter(|k| *k > 0);
        Self { threshold, limit }
    }

    /// NaN costs never pass.
    pub fn admits(&self, cost: f64) -> bool {
        cost >= self.threshold
    }

    pub fn effective_limit(&self, candidates: usize) -> usize {
        self.limit.map_or(candidates, |k| k.min(candidates))
    }
}

pub trait TopK {
    fn name(&self) -> &'static str;

    fn select<R: Ranked>(&self, items: Vec<R>, criteria: SelectionCriteria) -> Vec<R>;
}

/// Descending by cost.
pub(crate) fn by_cost_desc<R: Ranked>(a: &R, b: &R) -> Ordering {
    b.cost().total_cmp(&a.cost())
}

pub(crate) fn admitted<R: Ranked>(items: Vec<R>, criteria: &SelectionCriteria) -> Vec<R> {
    items
        .into_iter()
        .filter(|item| criteria.admits(item.cost()))
        .collect()
}

/// Sort everything, keep the head.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullSort;

impl TopK for FullSort {
    fn name(&self) -> &'static str {
        "full_sort"
    }

    fn select<R: Ranked>(&self, items: Vec<R>, criteria: SelectionCriteria) -> Vec<R> {
        let mut candidates = admitted(items, &criteria);
        candidates.sort_by(by_cost_desc);
        candidates.truncate(criteria.effective_limit(candidates.len()));
        candidates
    }
}

/// Partition around the K-th element with the standard library, then sort the head.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialSort;

impl TopK for PartialSort {
    fn name(&self) -> &'static str {
        "partial_sort"
    }

    fn select<R: Ranked>(&self, items: Vec<R>, criteria: SelectionCriteria) -> Vec<R> {
        let mut candidates = admitted(items, &criteria);
        let k = criteria.effective_limit(candidates.len());
        if k == 0 {
            return Vec::new();
        }
        if k < candidates.len() {
            candidates.select_nth_unstable_by(k - 1, by_cost_desc);
            candidates.truncate(k);
        }
        candidates.sort_unstable_by(by_cost_desc);
        candidates
    }
}

impl TopK for SelectionStrategy {
    fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::FullSort => FullSort.name(),
            SelectionStrategy::BoundedHeap => BoundedHeap.name(),
            SelectionStrategy::QuickSelect => QuickSelect.name(),
            SelectionStrategy::PartialSort => PartialSort.name(),
        }
    }

    fn select<R: Ranked>(&self, items: Vec<R>, criteria: SelectionCriteria) -> Vec<R> {
        match self {
            SelectionStrategy::FullSort => FullSort.select(items, criteria),
            SelectionStrategy::BoundedHeap => BoundedHeap.select(items, criteria),
            SelectionStrategy::QuickSelect => QuickSelect.select(items, criteria),
            SelectionStrategy::PartialSort => PartialSort.select(items, criteria),
        }
    }
}
