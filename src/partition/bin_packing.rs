use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Final load of each partition after packing.
pub type PartitionLoads = Vec<u64>;

/// Assign weighted items to partitions with the longest-processing-time heuristic.
///
/// Items are expected in descending weight order; each one goes to the currently
/// least-loaded partition, the lowest index winning among equal loads. Returns the
/// partition of each item along with the final loads.
///
///     # use photon_game::partition::bin_packing::greedy_assign;
///     let (assignments, loads) = greedy_assign(&[100, 50, 50, 1], 2);
///     assert_eq!(vec![0, 1, 1, 0], assignments);
///     assert_eq!(vec![101, 100], loads);
///
pub fn greedy_assign(weights: &[u64], n_partitions: usize) -> (Vec<usize>, PartitionLoads) {
    assert!(n_partitions > 0);

    let mut heap: BinaryHeap<Reverse<(u64, usize)>> =
        (0..n_partitions).map(|p| Reverse((0, p))).collect();
    let mut assignments = Vec::with_capacity(weights.len());
    for &w in weights {
        // Never empty: every pop is followed by a push
        if let Some(Reverse((load, p))) = heap.pop() {
            assignments.push(p);
            heap.push(Reverse((load + w, p)));
        }
    }

    let mut loads = vec![0; n_partitions];
    for Reverse((load, p)) in heap {
        loads[p] = load;
    }
    (assignments, loads)
}
