//! # Batcher
//!
//! Splits the residual task sequence into bounded groups so a backend never
//! holds more than one batch of pending results. With a batch size of `b`
//! and `n` tasks there are `ceil(n / b)` groups whose sizes differ by at most
//! one, and the relative order of the input is preserved.

use tracing::debug;

/// Split `tasks` into nearly-equal batches of at most `batch_size` items
///
/// - no batch size: a single batch holding everything
/// - no tasks: no batches
pub fn batch<T>(tasks: Vec<T>, batch_size: Option<usize>) -> Vec<Vec<T>> {
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }

    let Some(batch_size) = batch_size.filter(|size| *size > 0) else {
        return vec![tasks];
    };

    let count = total.div_ceil(batch_size);
    let base = total / count;
    let remainder = total % count;

    let mut batches = Vec::with_capacity(count);
    let mut iter = tasks.into_iter();
    for index in 0..count {
        let size = base + usize::from(index < remainder);
        batches.push(iter.by_ref().take(size).collect());
    }

    debug!(total, batch_size, batches = count, "Split tasks into batches");
    batches
}

/// Split `items` into consecutive chunks of at most `chunk_size` (1 when unset)
pub(crate) fn chunk<T>(items: Vec<T>, chunk_size: Option<usize>) -> Vec<Vec<T>> {
    let chunk_size = chunk_size.filter(|size| *size > 0).unwrap_or(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(chunk_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(batches: &[Vec<usize>]) -> Vec<usize> {
        batches.iter().map(Vec::len).collect()
    }

    #[test]
    fn unset_batch_size_is_one_batch() {
        let batches = batch((0..7).collect(), None);
        assert_eq!(sizes(&batches), vec![7]);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(batch(Vec::<usize>::new(), Some(3)).is_empty());
        assert!(batch(Vec::<usize>::new(), None).is_empty());
    }

    #[test]
    fn large_batch_size_is_one_batch() {
        assert_eq!(sizes(&batch((0..3).collect(), Some(3))), vec![3]);
        assert_eq!(sizes(&batch((0..3).collect(), Some(999))), vec![3]);
    }

    #[test]
    fn batches_are_nearly_equal_and_ordered() {
        let batches = batch((0..5).collect(), Some(2));
        assert_eq!(sizes(&batches), vec![2, 2, 1]);
        assert_eq!(batches.concat(), (0..5).collect::<Vec<_>>());

        let batches = batch((0..10).collect(), Some(4));
        assert_eq!(sizes(&batches), vec![4, 3, 3]);
    }

    #[test]
    fn chunks_fill_up_to_size() {
        assert_eq!(chunk((0..5).collect::<Vec<_>>(), Some(2)).len(), 3);
        assert_eq!(chunk((0..5).collect::<Vec<_>>(), None).len(), 5);
        assert!(chunk(Vec::<usize>::new(), Some(2)).is_empty());
    }
}
