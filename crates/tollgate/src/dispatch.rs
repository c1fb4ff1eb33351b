//! Lifecycle event dispatch.

use crate::combinator::run_all;
use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::hook::HookContext;
use crate::metadata::Model;
use crate::record::Record;
use tracing::debug;

/// Fires `event` on `record`.
///
/// Declared handlers (from [`Model::describe`]) and the record's runtime hooks
/// run concurrently, each exactly once. With no handlers the event passes
/// without invoking anything. The first handler failure is surfaced once all
/// handlers have settled; a failure that already is an [`Error`] comes back
/// unchanged.
///
/// Attribute writes staged through the [`HookContext`] are applied to the
/// record after the handlers settle, whether or not the event was vetoed.
/// A failing event applies nothing.
pub async fn fire<M: Model>(event: LifecycleEvent, record: &mut Record<M>) -> Result<bool> {
    let (passed, writes) = {
        let ctx = HookContext::new(record, event, true);
        let passed = dispatch(&ctx).await?;
        (passed, ctx.into_writes())
    };

    if !writes.is_empty() {
        debug!(event = %event, attributes = writes.len(), "applying handler writes");
        record.assign_all(&writes)?;
    }
    Ok(passed)
}

/// Fires `event` on a record the caller only borrows.
///
/// Handlers that try to stage writes fail with [`Error::ReadOnlyEvent`].
pub(crate) async fn fire_shared<M: Model>(
    event: LifecycleEvent,
    record: &Record<M>,
) -> Result<bool> {
    dispatch(&HookContext::new(record, event, false)).await
}

async fn dispatch<M: Model>(ctx: &HookContext<'_, M>) -> Result<bool> {
    let event = ctx.event();
    let record = ctx.record();
    let declared = record.metadata().handlers(event);
    let runtime = record.hooks().get(event);

    if declared.is_empty() && runtime.is_empty() {
        return Ok(true);
    }

    let handlers = declared.len() + runtime.len();
    let tasks = declared
        .iter()
        .chain(runtime)
        .map(|hook| hook.handle(ctx));

    match run_all(tasks).await {
        Ok(passed) => {
            if event.is_before() && !passed {
                debug!(event = %event, handlers, "lifecycle event vetoed");
            } else {
                debug!(event = %event, handlers, passed, "lifecycle event settled");
            }
            Ok(passed)
        }
        Err(err) => {
            debug!(event = %event, handlers, error = %err, "lifecycle handler failed");
            Err(Error::from(err))
        }
    }
}
