//! # Worker Pool
//!
//! Runs an ordered list of asynchronous jobs with at most `limit` of them in
//! flight. Jobs are admitted strictly in input order and may settle in any
//! order. Everything is polled on the caller's task; nothing is spawned, so
//! the pool works with `!Send` jobs and needs no locks.

use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Concurrency limit must be at least 1")]
    ZeroConcurrency,
}

/// Result of one pool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport<T> {
    /// One output per job, in input order
    pub outputs: Vec<T>,
    /// Highest number of jobs observed in flight at once
    pub peak_in_flight: usize,
}

/// Bounded-concurrency scheduler
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    limit: NonZeroUsize,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Result<Self, PoolError> {
        NonZeroUsize::new(limit)
            .map(|limit| Self { limit })
            .ok_or(PoolError::ZeroConcurrency)
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit.get()
    }

    /// Runs every job exactly once and resolves after all of them settled.
    ///
    /// `on_settled(index, &output)` is called once per job as soon as it
    /// settles, before the freed slot is refilled. Jobs encode their own
    /// failures in `T`; the pool never short-circuits.
    pub async fn run<J, Fut, T, S>(&self, jobs: Vec<J>, mut on_settled: S) -> PoolReport<T>
    where
        J: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        S: FnMut(usize, &T),
    {
        let total = jobs.len();
        let limit = self.limit.get();
        let mut pending: VecDeque<(usize, J)> = jobs.into_iter().enumerate().collect();
        let mut running = FuturesUnordered::new();
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut peak_in_flight = 0;

        debug!("Worker pool starting: {} jobs, limit {}", total, limit);

        loop {
            while running.len() < limit {
                let Some((index, job)) = pending.pop_front() else {
                    break;
                };
                running.push(admit(index, job));
                peak_in_flight = peak_in_flight.max(running.len());
            }

            let Some((index, output)) = running.next().await else {
                break;
            };
            on_settled(index, &output);
            slots[index] = Some(output);
        }

        let outputs: Vec<T> = slots.into_iter().flatten().collect();
        debug_assert_eq!(outputs.len(), total, "every admitted job settles exactly once");
        debug!("Worker pool finished: {} jobs settled, peak in flight {}", outputs.len(), peak_in_flight);

        PoolReport { outputs, peak_in_flight }
    }
}

async fn admit<J, Fut, T>(index: usize, job: J) -> (usize, T)
where
    J: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    (index, job().await)
}
