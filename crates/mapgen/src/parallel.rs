//! Range-splitting worker pool for embarrassingly parallel raster loops.
//!
//! Each range is computed in isolation and the outputs are concatenated in range
//! order, so the result equals the sequential computation for any worker count.

use std::ops::Range;

use rayon::prelude::*;
use tracing::warn;

/// Splits `[0, n)` into at most `workers` contiguous, ordered, non-empty ranges.
pub fn split_ranges(n: usize, workers: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, n);
    let base = n / workers;
    let extra = n % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for i in 0..workers {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Runs `f` once per range of `[0, n)` and concatenates the outputs in order.
pub fn map_ranges<T, F>(n: usize, workers: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>) -> Vec<T> + Sync + Send,
{
    let ranges = split_ranges(n, workers);
    if ranges.len() <= 1 {
        return ranges.into_iter().flat_map(&f).collect();
    }

    let chunks: Vec<Vec<T>> = match rayon::ThreadPoolBuilder::new()
        .num_threads(ranges.len())
        .build()
    {
        Ok(pool) => pool.install(|| ranges.into_par_iter().map(&f).collect()),
        Err(e) => {
            warn!("Falling back to sequential execution: {e}");
            ranges.into_iter().map(&f).collect()
        }
    };
    chunks.into_iter().flatten().collect()
}

/// Default worker count: the number of available cores.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
