//! Lifecycle handlers.

use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::metadata::Model;
use crate::record::Record;
use crate::store::Document;
use async_trait::async_trait;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Handler invoked when a lifecycle event fires on a record.
///
/// Handlers of one event run concurrently. They read the record through the
/// [`HookContext`] and may stage attribute writes on it, which are applied
/// once every handler of the event has settled. Resolving `false` from a
/// `before-*` event vetoes the operation.
///
/// # Example
///
/// ```rust,ignore
/// struct AuditLog(Arc<Mutex<Vec<String>>>);
///
/// #[async_trait]
/// impl Hook<User> for AuditLog {
///     async fn handle(&self, user: &HookContext<'_, User>) -> anyhow::Result<bool> {
///         self.0.lock().unwrap().push(user.model().email.clone());
///         user.set_attribute("audited", true)?;
///         Ok(true)
///     }
/// }
/// ```
#[async_trait]
pub trait Hook<M: Model>: Send + Sync {
    async fn handle(&self, ctx: &HookContext<'_, M>) -> anyhow::Result<bool>;
}

/// The record an event fires on, plus the attribute writes its handlers stage.
///
/// Dereferences to the [`Record`] for reads. Writes are only accepted when
/// the event fires on a record the caller owns mutably: the validate, save
/// and delete events and `after-find`. Handlers of `before-find` and the
/// count events run on a shared query record and get
/// [`Error::ReadOnlyEvent`]. When two handlers write the same attribute, the
/// one that finished last wins.
pub struct HookContext<'r, M: Model> {
    record: &'r Record<M>,
    event: LifecycleEvent,
    writes: Option<Mutex<Document>>,
}

impl<'r, M: Model> HookContext<'r, M> {
    pub(crate) fn new(record: &'r Record<M>, event: LifecycleEvent, writable: bool) -> Self {
        Self {
            record,
            event,
            writes: writable.then(|| Mutex::new(Document::new())),
        }
    }

    pub fn record(&self) -> &'r Record<M> {
        self.record
    }

    pub fn event(&self) -> LifecycleEvent {
        self.event
    }

    pub fn is_writable(&self) -> bool {
        self.writes.is_some()
    }

    /// Current value of an attribute, staged writes included.
    pub fn attribute(&self, name: &str) -> Result<Option<Value>> {
        if let Some(writes) = &self.writes {
            let writes = writes.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = writes.get(name) {
                return Ok(Some(value.clone()).filter(|value| !value.is_null()));
            }
        }
        self.record.attribute(name)
    }

    /// Stages an attribute write, applied to the record once the event settles.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let writes = self
            .writes
            .as_ref()
            .ok_or(Error::ReadOnlyEvent(self.event))?;
        writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
        Ok(())
    }

    pub(crate) fn into_writes(self) -> Document {
        self.writes
            .map(|writes| writes.into_inner().unwrap_or_else(PoisonError::into_inner))
            .unwrap_or_default()
    }
}

impl<M: Model> Deref for HookContext<'_, M> {
    type Target = Record<M>;

    fn deref(&self) -> &Record<M> {
        self.record
    }
}

/// Wraps a synchronous closure as a [`Hook`].
pub fn hook_fn<M, F>(f: F) -> FnHook<M, F>
where
    M: Model,
    F: Fn(&HookContext<'_, M>) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    FnHook {
        f,
        _model: PhantomData,
    }
}

pub struct FnHook<M, F> {
    f: F,
    _model: PhantomData<fn(&M)>,
}

#[async_trait]
impl<M, F> Hook<M> for FnHook<M, F>
where
    M: Model,
    F: Fn(&HookContext<'_, M>) -> anyhow::Result<bool> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &HookContext<'_, M>) -> anyhow::Result<bool> {
        (self.f)(ctx)
    }
}

type HookList<M> = SmallVec<[Arc<dyn Hook<M>>; 2]>;

/// Handlers per event, in registration order.
pub(crate) struct HookTable<M: Model> {
    entries: HashMap<LifecycleEvent, HookList<M>>,
}

impl<M: Model> HookTable<M> {
    pub(crate) fn register(&mut self, event: LifecycleEvent, hook: Arc<dyn Hook<M>>) {
        self.entries.entry(event).or_default().push(hook);
    }

    pub(crate) fn get(&self, event: LifecycleEvent) -> &[Arc<dyn Hook<M>>] {
        self.entries
            .get(&event)
            .map(|hooks| hooks.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self, event: LifecycleEvent) -> usize {
        self.get(event).len()
    }
}

impl<M: Model> Default for HookTable<M> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<M: Model> Clone for HookTable<M> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}
