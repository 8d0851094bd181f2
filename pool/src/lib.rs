use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use util::Timer;

mod errors;
pub use errors::{Error, Errors};

/// What to do when one item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Stop handing out items after the first failure and fail the whole pool.
    /// Items already running are waited for.
    FailFast,
    /// Run every item; failures are collected in the `Summary`.
    Tolerant,
}

/// Runs a homogeneous batch of items on at most `limit` threads at once.
///
/// `run` does not return until every started item has finished.
#[derive(Debug, Clone)]
pub struct Pool {
    label: String,
    limit: usize,
    policy: Policy,
}

/// Outcome of a pool run that did not fail outright.
#[derive(Debug, Default)]
pub struct Summary {
    pub completed: usize,
    pub failures: Errors,
}

impl Summary {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

impl Pool {
    pub fn new(label: impl Into<String>, limit: usize, policy: Policy) -> Self {
        Self {
            label: label.into(),
            limit: limit.max(1),
            policy,
        }
    }

    pub fn fail_fast(label: impl Into<String>, limit: usize) -> Self {
        Self::new(label, limit, Policy::FailFast)
    }

    pub fn tolerant(label: impl Into<String>, limit: usize) -> Self {
        Self::new(label, limit, Policy::Tolerant)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Call `work` exactly once per item (unless a fail-fast pool aborts first).
    pub fn run<T, F>(&self, items: &[T], work: F) -> Result<Summary, Error>
    where
        T: Debug + Sync,
        F: Fn(&T) -> anyhow::Result<()> + Sync,
    {
        let timer = Timer::now();
        let workers = self.limit.min(items.len()).max(1);
        log::debug!(
            "{}: {} items on {} workers ({:?})",
            self.label,
            items.len(),
            workers,
            self.policy
        );

        let label = self.label.clone();
        let threads = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{label}-{i}"))
            .build()
            .map_err(|e| Error::Build(self.label.clone(), e))?;

        let attempt = |item: &T| -> Result<(), (String, anyhow::Error)> {
            log::trace!("{}: starting {:?}", self.label, item);
            work(item).map_err(|e| {
                log::debug!("{}: {:?} failed: {e:#}", self.label, item);
                (format!("{item:?}"), e)
            })
        };

        // rayon re-raises a worker's panic here, once the other workers are done:
        let failed = panic::catch_unwind(AssertUnwindSafe(|| {
            threads.install(|| match self.policy {
                Policy::FailFast => items
                    .par_iter()
                    .try_for_each(attempt)
                    .err()
                    .into_iter()
                    .collect::<Vec<_>>(),
                Policy::Tolerant => items
                    .par_iter()
                    .map(attempt)
                    .filter_map(Result::err)
                    .collect(),
            })
        }))
        .map_err(|_| Error::WorkerPanicked(self.label.clone()))?;

        let mut failures = Errors::default();
        for (item, e) in failed {
            failures.add(item, e);
        }
        let summary = Summary {
            completed: items.len() - failures.len(),
            failures,
        };
        timer.log_elapsed(&self.label);

        match self.policy {
            Policy::FailFast => {
                summary.failures.print_recap(&self.label)?;
                Ok(summary)
            }
            Policy::Tolerant => {
                if !summary.all_succeeded() {
                    log::warn!(
                        "{}: {} of {} items failed",
                        self.label,
                        summary.failures.len(),
                        items.len()
                    );
                }
                Ok(summary)
            }
        }
    }
}
