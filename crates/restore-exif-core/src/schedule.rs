use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::error::RestoreError;

/// Completions between two progress reports.
pub const PROGRESS_EVERY: u64 = 100;

/// Upper bound for the default worker count. Every worker drives an external
/// process, so more threads than this mostly adds disk contention.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Type alias for progress callback: (completed, total)
pub type ProgressCallback = dyn Fn(u64, u64) + Send + Sync;

/// Worker count used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

/// Count-based progress reporter: emits every `every` completions and on the last one.
pub struct ProgressCadence<'a> {
    inner: &'a ProgressCallback,
    every: u64,
    total: u64,
    done: AtomicU64,
}

impl<'a> ProgressCadence<'a> {
    pub fn new(inner: &'a ProgressCallback, every: u64, total: u64) -> Self {
        Self {
            inner,
            every: every.max(1),
            total,
            done: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.every == 0 || done == self.total {
            (self.inner)(done, self.total);
        }
    }

    pub fn completed(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

/// Results of a scheduled batch.
#[derive(Debug)]
pub struct Scheduled<R> {
    /// One entry per item that ran; order is unspecified
    pub results: Vec<R>,
    pub cancelled: bool,
}

/// Run `f` once per item on a pool of `workers` threads.
///
/// The token is checked before each item starts. After cancellation no new
/// item starts; items already running finish and their results are kept.
pub fn schedule<T, R, F>(
    items: &[T],
    workers: usize,
    token: &CancellationToken,
    progress: &ProgressCallback,
    f: F,
) -> anyhow::Result<Scheduled<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if workers == 0 {
        return Err(RestoreError::InvalidWorkerCount.into());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("restore-worker-{}", i))
        .build()?;
    let cadence = ProgressCadence::new(progress, PROGRESS_EVERY, items.len() as u64);

    let results: Vec<R> = pool.install(|| {
        items
            .par_iter()
            .with_max_len(1)
            .filter_map(|item| {
                if token.is_cancelled() {
                    return None;
                }
                let result = f(item);
                cadence.tick();
                Some(result)
            })
            .collect()
    });

    Ok(Scheduled {
        results,
        cancelled: token.is_cancelled(),
    })
}
