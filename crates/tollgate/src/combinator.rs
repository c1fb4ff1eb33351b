//! Fan-out/fan-in over independent asynchronous checks.
//!
//! This is the only concurrency primitive used by the engine. Hook dispatch,
//! per-field validation and multi-record deletes all nest these two functions.
//!
//! Tasks are polled concurrently on the caller's task; nothing is spawned.
//! A failing task does not cancel its siblings: the combinator settles only
//! after every task has settled, so a later phase can never overlap a
//! straggler from an earlier one.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;

/// Runs every task concurrently and AND-reduces their booleans.
///
/// - no tasks: `Ok(true)`
/// - any task fails: the first failure observed, after all tasks settle
/// - otherwise: `true` only if every task resolved `true`
pub async fn run_all<I, F, E>(tasks: I) -> Result<bool, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<bool, E>>,
{
    let mut pending: FuturesUnordered<F> = tasks.into_iter().collect();
    if pending.is_empty() {
        return Ok(true);
    }

    let mut outcome: Result<bool, E> = Ok(true);
    while let Some(result) = pending.next().await {
        match result {
            Ok(passed) => {
                if let Ok(all) = &mut outcome {
                    *all &= passed;
                }
            }
            // Only the first failure is kept; late results are drained.
            Err(err) if outcome.is_ok() => outcome = Err(err),
            Err(_) => {}
        }
    }

    outcome
}

/// Runs every task concurrently; succeeds once all complete without error.
pub async fn run_all_void<I, F, E>(tasks: I) -> Result<(), E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<(), E>>,
{
    let mut pending: FuturesUnordered<F> = tasks.into_iter().collect();

    let mut outcome: Result<(), E> = Ok(());
    while let Some(result) = pending.next().await {
        if let Err(err) = result {
            if outcome.is_ok() {
                outcome = Err(err);
            }
        }
    }

    outcome
}
