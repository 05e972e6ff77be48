//! Top-K selection algorithms
//!
//! **Problem**: ranking every element of a 32768×3 difference matrix just to
//! print the five worst mismatches is O(N log N).
//!
//! **Solution**: bounded binary heap, O(N log K) time and O(K) space.
//!
//! Ordering is total and deterministic: values compare with
//! [`f64::total_cmp`] (so NaN ranks above every finite value), and equal
//! values rank by position, lower index first.

use crate::Error;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sort order for Top-K selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest K values)
    Ascending,
    /// Descending order (largest K values)
    Descending,
}

// Heap item for descending order (min-heap: weakest retained candidate at top)
#[derive(Debug)]
struct MinHeapItem {
    value: f64,
    index: usize,
}

impl MinHeapItem {
    // Higher rank = more extreme in descending order
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialEq for MinHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for MinHeapItem {}

impl Ord for MinHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for min-heap (lowest rank at top)
        other.rank_cmp(self)
    }
}

impl PartialOrd for MinHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Heap item for ascending order (max-heap: weakest retained candidate at top)
#[derive(Debug)]
struct MaxHeapItem {
    value: f64,
    index: usize,
}

impl MaxHeapItem {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialEq for MaxHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for MaxHeapItem {}

impl Ord for MaxHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

impl PartialOrd for MaxHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the indices of the top K values.
///
/// Returns at most `k` indices, most extreme first. When `k >= values.len()`
/// every index is returned in rank order.
///
/// # Errors
/// Returns `InvalidInput` if `k` is zero.
///
/// # Examples
///
/// ```rust
/// use ode_bench::topk::{top_k_indices, SortOrder};
///
/// let diffs = [0.1, 0.9, 0.3, 0.9, 0.0];
/// let worst = top_k_indices(&diffs, 3, SortOrder::Descending)?;
/// assert_eq!(worst, vec![1, 3, 2]);
/// # Ok::<(), ode_bench::Error>(())
/// ```
pub fn top_k_indices(values: &[f64], k: usize, order: SortOrder) -> crate::Result<Vec<usize>> {
    if k == 0 {
        return Err(Error::InvalidInput("k must be greater than 0".to_string()));
    }

    let indices = match order {
        SortOrder::Descending => {
            let mut heap: BinaryHeap<MinHeapItem> = BinaryHeap::with_capacity(k);
            for (index, &value) in values.iter().enumerate() {
                let item = MinHeapItem { value, index };
                if heap.len() < k {
                    heap.push(item);
                } else if let Some(top) = heap.peek() {
                    if item.rank_cmp(top) == Ordering::Greater {
                        heap.pop();
                        heap.push(item);
                    }
                }
            }
            let mut result = heap.into_vec();
            result.sort_by(|a, b| b.rank_cmp(a));
            result.into_iter().map(|item| item.index).collect()
        }
        SortOrder::Ascending => {
            let mut heap: BinaryHeap<MaxHeapItem> = BinaryHeap::with_capacity(k);
            for (index, &value) in values.iter().enumerate() {
                let item = MaxHeapItem { value, index };
                if heap.len() < k {
                    heap.push(item);
                } else if let Some(top) = heap.peek() {
                    if item.rank_cmp(top) == Ordering::Less {
                        heap.pop();
                        heap.push(item);
                    }
                }
            }
            let mut result = heap.into_vec();
            result.sort_by(MaxHeapItem::rank_cmp);
            result.into_iter().map(|item| item.index).collect()
        }
    };

    Ok(indices)
}
