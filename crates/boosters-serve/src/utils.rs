//! Common utilities used across the crate.
//!
//! This module provides the parallelism flag passed through training and
//! prediction, and the thread pool setup used at the API boundary.

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Components that receive `Parallel` may use `rayon` parallel iterators.
/// `Sequential` components must iterate on the calling thread.
///
/// The thread pool itself is set up once via [`run_with_threads`];
/// components never build pools of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Map a configured thread count to a mode. `0` follows the size of the
    /// current rayon pool, `1` is sequential.
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }

    /// Apply `f` to each fixed-size chunk of `data` together with its index.
    #[inline]
    pub fn maybe_par_chunks_mut<T, F>(self, data: &mut [T], chunk_size: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if chunk_size == 0 {
            return;
        }
        if self.is_parallel() {
            data.par_chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(i, chunk)| f(i, chunk));
        } else {
            data.chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(i, chunk)| f(i, chunk));
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run `f` on a pool sized for `n_threads` (see [`Parallelism::from_threads`]).
///
/// Counts above one get a dedicated pool; if it cannot be built, `f` runs on
/// the global pool instead.
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                Err(err) => {
                    tracing::warn!(n_threads, %err, "falling back to the global thread pool");
                    f(Parallelism::Parallel)
                }
            }
        }
    }
}
