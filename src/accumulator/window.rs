//! Anonymity Windows
//!
//! The run of accumulated commitments a spend proof ranges over. Both the
//! spender and every verifier derive it from the same accumulator state,
//! so only its start index travels with the proof.

use std::ops::Range;

/// Window containing `leaf_index` in an accumulator of `count` leaves.
///
/// The most recent `size` leaves when they include the leaf, otherwise the
/// size-aligned block that contains it.
pub fn window_for(leaf_index: u64, count: u64, size: u64) -> Range<u64> {
    let size = size.max(1);
    if count <= size {
        return 0..count;
    }
    let recent = count - size;
    if leaf_index >= recent {
        return recent..count;
    }
    let start = leaf_index - leaf_index % size;
    start..(start + size).min(count)
}

/// Window a verifier accepts for a claimed `start`, or `None` if no
/// spender could have produced that start.
pub fn canonical_window(start: u64, count: u64, size: u64) -> Option<Range<u64>> {
    let size = size.max(1);
    if count == 0 {
        return None;
    }
    if count <= size {
        return (start == 0).then_some(0..count);
    }
    let recent = count - size;
    if start == recent {
        return Some(recent..count);
    }
    if start % size == 0 && start < recent {
        return Some(start..start + size);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_accumulator_uses_everything() {
        assert_eq!(window_for(2, 5, 10), 0..5);
        assert_eq!(canonical_window(0, 5, 10), Some(0..5));
        assert_eq!(canonical_window(1, 5, 10), None);
    }

    #[test]
    fn test_recent_window() {
        assert_eq!(window_for(95, 100, 20), 80..100);
        assert_eq!(canonical_window(80, 100, 20), Some(80..100));
    }

    #[test]
    fn test_aligned_window_for_old_leaf() {
        let window = window_for(33, 100, 20);
        assert_eq!(window, 20..40);
        assert!(window.contains(&33));
        assert_eq!(canonical_window(20, 100, 20), Some(20..40));
        assert_eq!(canonical_window(21, 100, 20), None);
    }

    #[test]
    fn test_every_prover_window_is_canonical() {
        for count in 1..60u64 {
            for leaf in 0..count {
                let window = window_for(leaf, count, 7);
                assert!(window.contains(&leaf));
                assert_eq!(canonical_window(window.start, count, 7), Some(window));
            }
        }
    }
}
