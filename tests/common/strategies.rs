use proptest::prelude::*;

/// Task counts including the empty case
pub fn task_count_strategy() -> impl Strategy<Value = usize> {
    0usize..200
}

/// Optional batch sizes (`None` runs everything as one batch)
pub fn batch_size_strategy() -> impl Strategy<Value = Option<usize>> {
    prop::option::of(1usize..64)
}

/// Dataset size and the position of the one failing row
pub fn failing_row_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..40).prop_flat_map(|n| (Just(n), 0..n))
}
