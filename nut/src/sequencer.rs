//! Strictly sequential execution of task jobs.

use std::future::Future;

use anyhow::Result;
use tracing::{error, info};

/// A job that failed, by position in the series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub index: usize,
    pub message: String,
}

/// Outcome of a whole series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesReport<T> {
    /// Successful results with their job index, in order.
    pub completed: Vec<(usize, T)>,
    pub failures: Vec<TaskFailure>,
}

impl<T> Default for SeriesReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> SeriesReport<T> {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    /// At least one job ran and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.completed.is_empty() && !self.failures.is_empty()
    }
}

/// Run jobs one after another. See [`run_in_series_with`].
pub async fn run_in_series<I, J, Fut, T>(jobs: I) -> SeriesReport<T>
where
    I: IntoIterator<Item = J>,
    J: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    run_in_series_with(jobs, |_, _| {}).await
}

/// Run jobs one after another, calling `on_done` after each.
///
/// Job `n + 1` is not even constructed until job `n` has resolved. A failing
/// job is logged and recorded; the series always runs to the end.
pub async fn run_in_series_with<I, J, Fut, T, C>(jobs: I, mut on_done: C) -> SeriesReport<T>
where
    I: IntoIterator<Item = J>,
    J: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: FnMut(usize, &Result<T>),
{
    let mut report = SeriesReport::default();
    for (index, job) in jobs.into_iter().enumerate() {
        let result = job().await;
        on_done(index, &result);
        match result {
            Ok(value) => {
                info!(index, "job completed");
                report.completed.push((index, value));
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(index, err = %message, "job failed");
                report.failures.push(TaskFailure { index, message });
            }
        }
    }
    report
}
