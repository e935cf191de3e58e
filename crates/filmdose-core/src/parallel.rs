//! Parallelization helpers for per-column and per-row work
//!
//! Work units (image columns for inversion, rows for denoising) are
//! dispatched through rayon's indexed parallel iterators so results come
//! back in index order regardless of completion order. Small inputs fall
//! back to a plain loop.

use rayon::prelude::*;

/// Minimum number of work units before parallel dispatch is used.
pub const PARALLEL_THRESHOLD: usize = 16;

/// How a stage schedules its independent work units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Parallel when the input is large enough, sequential otherwise.
    #[default]
    Auto,
    /// Always dispatch to the rayon pool.
    Parallel,
    /// Single-threaded, in index order.
    Sequential,
}

impl ExecutionMode {
    fn use_parallel(self, units: usize) -> bool {
        match self {
            ExecutionMode::Auto => units >= PARALLEL_THRESHOLD,
            ExecutionMode::Parallel => true,
            ExecutionMode::Sequential => false,
        }
    }
}

/// Map `f` over `0..units`, collecting results in index order. The first
/// error aborts the batch and is returned; no partial result is produced.
pub fn try_map_units<T, E, F>(units: usize, mode: ExecutionMode, f: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(usize) -> Result<T, E> + Sync + Send,
{
    if mode.use_parallel(units) {
        (0..units).into_par_iter().map(f).collect()
    } else {
        (0..units).map(f).collect()
    }
}

/// Parallel for-each over mutable chunks, e.g. output rows.
pub fn for_each_chunk_mut<T, F>(data: &mut [T], chunk_size: usize, mode: ExecutionMode, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    let chunk_size = chunk_size.max(1);
    let units = data.len() / chunk_size;
    if mode.use_parallel(units) {
        data.par_chunks_mut(chunk_size)
            .enumerate()
            .for_each(|(i, chunk)| f(i, chunk));
    } else {
        for (i, chunk) in data.chunks_mut(chunk_size).enumerate() {
            f(i, chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqrt_units(mode: ExecutionMode) -> Vec<f64> {
        try_map_units(500, mode, |i| Ok::<_, String>((i as f64).sqrt())).unwrap()
    }

    #[test]
    fn test_try_map_units_preserves_order() {
        let out: Result<Vec<usize>, String> =
            try_map_units(PARALLEL_THRESHOLD * 8, ExecutionMode::Parallel, |i| Ok(i * 2));
        for (i, v) in out.unwrap().iter().enumerate() {
            assert_eq!(*v, i * 2);
        }
    }

    #[test]
    fn test_modes_agree() {
        let seq = sqrt_units(ExecutionMode::Sequential);
        assert_eq!(seq, sqrt_units(ExecutionMode::Parallel));
        assert_eq!(seq, sqrt_units(ExecutionMode::Auto));
    }

    #[test]
    fn test_try_map_units_aborts_on_error() {
        let result: Result<Vec<usize>, String> =
            try_map_units(100, ExecutionMode::Parallel, |i| {
                if i == 57 {
                    Err(format!("bad unit {}", i))
                } else {
                    Ok(i)
                }
            });
        assert_eq!(result, Err("bad unit 57".to_string()));
    }

    #[test]
    fn test_for_each_chunk_mut_small() {
        let mut data = vec![0usize; 12];
        for_each_chunk_mut(&mut data, 4, ExecutionMode::Auto, |row, chunk| {
            for v in chunk.iter_mut() {
                *v = row;
            }
        });
        assert_eq!(data, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_for_each_chunk_mut_parallel() {
        let mut data = vec![1.0f64; 3 * 1000];
        for_each_chunk_mut(&mut data, 3, ExecutionMode::Parallel, |_, px| {
            px[0] *= 2.0;
        });
        assert!(data.chunks_exact(3).all(|px| px[0] == 2.0 && px[1] == 1.0));
    }
}
