//! Bounded fan-out for batch and audio work.
//!
//! Two admission disciplines:
//! - [`fifo_window`]: rolling window. When the window is full, wait for the
//!   earliest-started unit before admitting the next one, even if a later
//!   unit has already finished.
//! - [`grouped_barrier`]: fixed groups. Every unit of a group runs at once
//!   and the next group starts only after the whole group has resolved.
//!
//! Neither cancels running siblings on failure. A failure stops further
//! admission, the in-flight units are drained, and the first error is returned.

use std::collections::VecDeque;
use std::future::Future;

use slidecast_shared::{Result, SlidecastError};
use tokio::task::JoinHandle;
use tracing::warn;

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| SlidecastError::Task(e.to_string()))?
}

/// Run `unit` over `items` with at most `limit` in flight, FIFO-drained.
///
/// Results come back in input order. `on_done` sees each success as the
/// window drains past it.
pub async fn fifo_window<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    mut unit: F,
    mut on_done: impl FnMut(&T),
) -> Result<Vec<T>>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let limit = limit.max(1);
    let mut pending = items.into_iter();
    let mut window: VecDeque<JoinHandle<Result<T>>> = VecDeque::with_capacity(limit);
    let mut results = Vec::new();
    let mut first_error: Option<SlidecastError> = None;

    loop {
        while first_error.is_none() && window.len() < limit {
            match pending.next() {
                Some(item) => window.push_back(tokio::spawn(unit(item))),
                None => break,
            }
        }

        let Some(earliest) = window.pop_front() else {
            break;
        };

        match join(earliest).await {
            Ok(value) => {
                on_done(&value);
                results.push(value);
            }
            Err(e) if first_error.is_none() => {
                warn!(error = %e, in_flight = window.len(), "unit failed, draining window");
                first_error = Some(e);
            }
            Err(e) => warn!(error = %e, "unit failed while draining"),
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

/// Run `unit` over `items` in groups of `group_size` with a barrier between groups.
///
/// Results come back in input order. `on_group` receives the number of
/// units finished so far after each group.
pub async fn grouped_barrier<I, T, F, Fut>(
    items: Vec<I>,
    group_size: usize,
    mut unit: F,
    mut on_group: impl FnMut(usize),
) -> Result<Vec<T>>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let group_size = group_size.max(1);
    let mut pending = items.into_iter().peekable();
    let mut results = Vec::new();

    while pending.peek().is_some() {
        let handles: Vec<_> = pending
            .by_ref()
            .take(group_size)
            .map(|item| tokio::spawn(unit(item)))
            .collect();

        let mut first_error = None;
        for handle in handles {
            match join(handle).await {
                Ok(value) => results.push(value),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!(error = %e, "additional failure in group"),
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        on_group(results.len());
    }

    Ok(results)
}
