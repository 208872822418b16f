use proptest::prelude::*;
use querylens_runtime::selection::{Ranked, SelectionCriteria, SelectionStrategy, TopK};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STRATEGIES: [SelectionStrategy; 4] = [
    SelectionStrategy::FullSort,
    SelectionStrategy::BoundedHeap,
    SelectionStrategy::QuickSelect,
    SelectionStrategy::PartialSort,
];

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    id: usize,
    cost: f64,
}

impl Ranked for Candidate {
    fn cost(&self) -> f64 {
        self.cost
    }
}

fn candidates(costs: &[u32]) -> Vec<Candidate> {
    costs
        .iter()
        .enumerate()
        .map(|(id, c)| Candidate {
            id,
            cost: f64::from(*c) / 4.0,
        })
        .collect()
}

fn sorted_costs(items: &[Candidate]) -> Vec<f64> {
    let mut costs: Vec<f64> = items.iter().map(|c| c.cost).collect();
    costs.sort_by(|a, b| b.total_cmp(a));
    costs
}

proptest! {
    #[test]
    fn test_output_size_and_order(
        costs in prop::collection::vec(0u32..400, 0..300),
        threshold in 0u32..100,
        limit in -3i64..50,
    ) {
        let items = candidates(&costs);
        let criteria = SelectionCriteria::new(f64::from(threshold), limit);
        let admitted = items.iter().filter(|c| c.cost >= f64::from(threshold)).count();
        let expected_len = if limit > 0 { admitted.min(limit as usize) } else { admitted };

        for strategy in STRATEGIES {
            let picked = strategy.select(items.clone(), criteria);
            prop_assert_eq!(picked.len(), expected_len, "{}", strategy.name());
            prop_assert!(picked.windows(2).all(|w| w[0].cost >= w[1].cost));
            prop_assert!(picked.iter().all(|c| c.cost >= f64::from(threshold)));
        }
    }

    #[test]
    fn test_strategies_agree_on_costs(
        costs in prop::collection::vec(0u32..50, 0..200),
        limit in 0i64..20,
    ) {
        let items = candidates(&costs);
        let criteria = SelectionCriteria::new(1.0, limit);
        let reference =
            sorted_costs(&strategy_output(SelectionStrategy::FullSort, &items, criteria));

        for strategy in STRATEGIES {
            let picked = strategy_output(strategy, &items, criteria);
            prop_assert_eq!(sorted_costs(&picked), reference.clone(), "{}", strategy.name());
            prop_assert_eq!(picked.first().map(|c| c.cost), reference.first().copied());
        }
    }

    #[test]
    fn test_distinct_costs_select_same_records(
        costs in prop::collection::hash_set(0u32..10_000, 0..200),
        limit in 1i64..30,
    ) {
        let costs: Vec<u32> = costs.into_iter().collect();
        let items = candidates(&costs);
        let criteria = SelectionCriteria::new(0.0, limit);
        let reference = strategy_output(SelectionStrategy::FullSort, &items, criteria);

        for strategy in STRATEGIES {
            prop_assert_eq!(&strategy_output(strategy, &items, criteria), &reference);
        }
    }

    #[test]
    fn test_full_sort_is_idempotent(
        costs in prop::collection::vec(0u32..100, 0..100),
        limit in -1i64..10,
    ) {
        let criteria = SelectionCriteria::new(2.0, limit);
        let once = SelectionStrategy::FullSort.select(candidates(&costs), criteria);
        let twice = SelectionStrategy::FullSort.select(once.clone(), criteria);
        prop_assert_eq!(once, twice);
    }
}

fn strategy_output(
    strategy: SelectionStrategy,
    items: &[Candidate],
    criteria: SelectionCriteria,
) -> Vec<Candidate> {
    strategy.select(items.to_vec(), criteria)
}

#[test]
fn test_strategies_agree_on_large_seeded_input() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let costs: Vec<u32> = (0..100_000).map(|_| rng.gen_range(0..1_000_000)).collect();
    let items = candidates(&costs);

    for limit in [1, 10, 1_000] {
        let criteria = SelectionCriteria::new(50_000.0, limit);
        let reference = strategy_output(SelectionStrategy::FullSort, &items, criteria);
        assert_eq!(reference.len(), limit as usize);

        for strategy in STRATEGIES {
            let picked = strategy_output(strategy, &items, criteria);
            assert_eq!(
                sorted_costs(&picked),
                sorted_costs(&reference),
                "{} limit={}",
                strategy.name(),
                limit
            );
        }
    }
}
