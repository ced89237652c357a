//! Explicit parallelism configuration and private thread pools.
//!
//! Fold-level and estimator-level parallelism draw from one thread budget
//! and never stack: whichever scope is selected gets the threads, the other
//! runs on the calling thread. Pools are private rayon pools built per use;
//! the global pool is never configured.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which level of the evaluation gets the thread budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelScope {
    /// Everything on the calling thread.
    Sequential,
    /// Folds run concurrently; each estimator fits single-threaded.
    Folds,
    /// Folds run one after another; each estimator fits on the pool.
    Estimator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parallelism {
    pub scope: ParallelScope,
    pub threads: usize,
}

impl Default for Parallelism {
    fn default() -> Self {
        Self {
            scope: ParallelScope::Estimator,
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl Parallelism {
    pub fn sequential() -> Self {
        Self {
            scope: ParallelScope::Sequential,
            threads: 1,
        }
    }

    pub fn folds(threads: usize) -> Self {
        Self {
            scope: ParallelScope::Folds,
            threads,
        }
    }

    pub fn estimator(threads: usize) -> Self {
        Self {
            scope: ParallelScope::Estimator,
            threads,
        }
    }

    /// Threads for the outer fold scheduler.
    pub fn fold_threads(&self) -> usize {
        match self.scope {
            ParallelScope::Folds => self.threads.max(1),
            _ => 1,
        }
    }

    /// Threads handed to each estimator's `fit`.
    pub fn fit_threads(&self) -> usize {
        match self.scope {
            ParallelScope::Estimator => self.threads.max(1),
            _ => 1,
        }
    }
}

/// Evaluate `f(0..n)` and collect results in index order.
///
/// With `threads <= 1` this runs inline; otherwise on a private pool of
/// `threads` workers.
pub fn map_indexed<T, F>(
    n: usize,
    threads: usize,
    f: F,
) -> Result<Vec<T>, rayon::ThreadPoolBuildError>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if threads <= 1 || n <= 1 {
        return Ok((0..n).map(f).collect());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("odorcast-pool-{i}"))
        .build()?;
    Ok(pool.install(|| (0..n).into_par_iter().map(&f).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_never_stack() {
        let folds = Parallelism::folds(8);
        assert_eq!(folds.fold_threads(), 8);
        assert_eq!(folds.fit_threads(), 1);

        let est = Parallelism::estimator(8);
        assert_eq!(est.fold_threads(), 1);
        assert_eq!(est.fit_threads(), 8);

        let seq = Parallelism::sequential();
        assert_eq!(seq.fold_threads(), 1);
        assert_eq!(seq.fit_threads(), 1);
    }

    #[test]
    fn map_indexed_preserves_order() {
        let seq = map_indexed(50, 1, |i| i * i).unwrap();
        let par = map_indexed(50, 4, |i| i * i).unwrap();
        assert_eq!(seq, par);
        assert_eq!(par[7], 49);
    }

    #[test]
    fn private_pool_leaves_global_pool_alone() {
        let before = rayon::current_num_threads();
        let _ = map_indexed(10, 3, |i| i).unwrap();
        assert_eq!(rayon::current_num_threads(), before);
    }
}
