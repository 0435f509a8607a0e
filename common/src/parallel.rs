//! Concurrency-limited parallel iteration utilities.
//!
//! Wraps rayon's `par_iter` to process items in parallel while limiting
//! the number of items in flight at once.

use rayon::prelude::*;

/// Maps `f` over `items` in parallel, with at most `max_concurrent` items in flight.
///
/// Results keep the order of `items`.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited<T, R, F>(items: &[T], max_concurrent: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(max_concurrent) {
        let chunk_results: Vec<R> = chunk.par_iter().map(&f).collect();
        results.extend(chunk_results);
    }
    results
}

/// Runs [`par_map_limited`] when `parallel` is set, a plain ordered map otherwise.
///
/// Both paths produce identical output for a pure `f`.
pub fn map_maybe_parallel<T, R, F>(
    items: &[T],
    parallel: bool,
    max_concurrent: usize,
    f: F,
) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if parallel {
        par_map_limited(items, max_concurrent, f)
    } else {
        items.iter().map(f).collect()
    }
}
