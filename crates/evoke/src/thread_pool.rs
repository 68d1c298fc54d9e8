//! Fixed fan-out worker pool used for buffer upload and command recording.
//!
//! Work is always dispatched as "one job per worker, then join": callers hand
//! the pool N closures inside [`ThreadPool::scope`] and the scope does not
//! return until every job has finished. There is no task queue, no work
//! stealing and no cancellation.

use std::ops::Range;

/// A worker pool with a fixed thread count and barrier-style dispatch.
///
/// Built on `std::thread::scope`, so jobs may borrow from the caller's
/// stack frame; the scope guarantees they have all completed before
/// [`ThreadPool::scope`] returns.
///
/// # Example
///
/// ```
/// use evoke::ThreadPool;
///
/// let pool = ThreadPool::new(4);
///
/// let mut results = vec![0u32; 4];
/// pool.scope(|s| {
///     for (i, slot) in results.iter_mut().enumerate() {
///         s.spawn(move || {
///             *slot = (i as u32) * 10;
///         });
///     }
/// });
/// assert_eq!(results, vec![0, 10, 20, 30]);
/// ```
pub struct ThreadPool {
    num_threads: usize,
}

impl ThreadPool {
    /// Creates a pool with the given worker count (clamped to at least 1).
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    /// Number of workers jobs are fanned out across.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs jobs within a scoped context.
    ///
    /// All jobs spawned inside the closure complete before this returns.
    pub fn scope<'env, F>(&self, f: F)
    where
        F: for<'scope> FnOnce(&Scope<'scope, 'env>),
    {
        std::thread::scope(|s| {
            let scope = Scope { inner: s };
            f(&scope);
        });
    }
}

/// A scope for spawning jobs that must complete before the scope exits.
pub struct Scope<'scope, 'env: 'scope> {
    inner: &'scope std::thread::Scope<'scope, 'env>,
}

impl<'scope, 'env> Scope<'scope, 'env> {
    /// Spawns a job on a worker within this scope.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        self.inner.spawn(f);
    }
}

/// Splits `count` elements into at most `pieces` contiguous, disjoint ranges.
///
/// Each range holds `count / pieces` elements; the remainder is folded into
/// the last range. When `count < pieces` the fan-out shrinks to one element
/// per piece. The union of the returned ranges is exactly `0..count`.
pub fn partition(count: usize, pieces: usize) -> Vec<Range<usize>> {
    if count == 0 || pieces == 0 {
        return Vec::new();
    }
    let pieces = pieces.min(count);
    let each = count / pieces;
    (0..pieces)
        .map(|i| {
            let start = i * each;
            let end = if i == pieces - 1 { count } else { start + each };
            start..end
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn scope_joins_all_jobs() {
        let pool = ThreadPool::new(4);
        let counter = AtomicUsize::new(0);
        pool.scope(|s| {
            for _ in 0..pool.num_threads() {
                s.spawn(|| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn zero_threads_clamps_to_one() {
        assert_eq!(ThreadPool::new(0).num_threads(), 1);
    }

    #[test]
    fn partition_covers_all_elements_exactly() {
        for n in [1usize, 2, 4] {
            for count in [1usize, 2, 3, 7, 100, 1001] {
                let ranges = partition(count, n);
                let total: usize = ranges.iter().map(|r| r.len()).sum();
                assert_eq!(total, count, "count={count} pieces={n}");

                // Contiguous and disjoint, starting at zero.
                let mut expected_start = 0;
                for r in &ranges {
                    assert_eq!(r.start, expected_start);
                    assert!(!r.is_empty());
                    expected_start = r.end;
                }
                assert_eq!(expected_start, count);
            }
        }
    }

    #[test]
    fn last_partition_absorbs_remainder() {
        let ranges = partition(10, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0], 0..2);
        assert_eq!(ranges[1], 2..4);
        assert_eq!(ranges[2], 4..6);
        assert_eq!(ranges[3], 6..10);
    }

    #[test]
    fn fewer_elements_than_pieces_shrinks_fan_out() {
        let ranges = partition(3, 8);
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn empty_input_yields_no_partitions() {
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn parallel_writes_into_partitioned_slices() {
        let pool = ThreadPool::new(4);
        let count = 1003;
        let mut data = vec![0usize; count];
        let ranges = partition(count, pool.num_threads());

        let mut slices: Vec<&mut [usize]> = Vec::new();
        let mut rest = data.as_mut_slice();
        for r in &ranges {
            let (head, tail) = rest.split_at_mut(r.len());
            slices.push(head);
            rest = tail;
        }

        pool.scope(|s| {
            for (range, slice) in ranges.iter().cloned().zip(slices) {
                s.spawn(move || {
                    for (offset, slot) in slice.iter_mut().enumerate() {
                        *slot = range.start + offset;
                    }
                });
            }
        });

        for (i, v) in data.iter().enumerate() {
            assert_eq!(*v, i);
        }
    }
}
