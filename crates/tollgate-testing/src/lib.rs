//! Testing utilities for Tollgate.
//!
//! - [`MemoryStore`]: a [`DocumentStore`](tollgate::DocumentStore) held in
//!   memory, with per-operation call counters, optional latency and
//!   injectable failures
//! - [`CountingHook`] / [`FailingHook`]: handlers that record how often they
//!   ran
//! - [`CountingValidator`]: a validator with a fixed verdict
//!
//! # Example
//!
//! ```rust,ignore
//! use tollgate_testing::{CountingHook, MemoryStore, StoreOp};
//!
//! let store = Arc::new(MemoryStore::new());
//! let veto = CountingHook::vetoing();
//!
//! let mut user = Record::new(User::default()).with_store(store.clone());
//! user.register_hook(LifecycleEvent::BeforeSave, veto.clone());
//!
//! assert!(!user.save().await?);
//! assert_eq!(veto.calls(), 1);
//! assert_eq!(store.calls(StoreOp::Save), 0);
//! ```

mod memory_store;

pub use memory_store::{MemoryStore, StoreOp};

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tollgate::{
    async_trait, ConstraintValidator, Hook, HookContext, Model, Record, Result, ValidationError,
};

/// Handler resolving a fixed verdict and counting its invocations.
///
/// Clones share the counter, so keep one clone and register the other.
#[derive(Debug, Clone)]
pub struct CountingHook {
    verdict: bool,
    calls: Arc<AtomicUsize>,
}

impl CountingHook {
    pub fn passing() -> Self {
        Self {
            verdict: true,
            calls: Arc::default(),
        }
    }

    pub fn vetoing() -> Self {
        Self {
            verdict: false,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<M: Model> Hook<M> for CountingHook {
    async fn handle(&self, _ctx: &HookContext<'_, M>) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict)
    }
}

/// Handler that always fails with the given message.
#[derive(Debug, Clone)]
pub struct FailingHook {
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingHook {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<M: Model> Hook<M> for FailingHook {
    async fn handle(&self, _ctx: &HookContext<'_, M>) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("{}", self.message)
    }
}

/// Validator with a fixed verdict.
///
/// A failing instance reports its `message` on whatever attribute it is
/// declared for.
#[derive(Debug, Clone, Serialize)]
pub struct CountingValidator {
    message: Option<String>,
    #[serde(skip)]
    calls: Arc<AtomicUsize>,
}

impl CountingValidator {
    pub fn passing() -> Self {
        Self {
            message: None,
            calls: Arc::default(),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for CountingValidator {
    fn name(&self) -> &'static str {
        "CountingValidator"
    }

    async fn is_valid(
        &self,
        _record: &Record<M>,
        _attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.message.as_ref().map(ValidationError::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tollgate::{fire, FieldDescriptor, LifecycleEvent, MetadataBuilder};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    impl Model for Note {
        fn describe(meta: &mut MetadataBuilder<Self>) {
            meta.collection("notes").field(FieldDescriptor::new("body"));
        }
    }

    #[tokio::test]
    async fn hooks_count_their_calls() {
        let passing = CountingHook::passing();
        let vetoing = CountingHook::vetoing();
        let mut record = Record::new(Note::default());
        record.register_hook(LifecycleEvent::BeforeSave, passing.clone());

        assert!(fire(LifecycleEvent::BeforeSave, &mut record).await.unwrap());
        record.register_hook(LifecycleEvent::BeforeSave, vetoing.clone());
        assert!(!fire(LifecycleEvent::BeforeSave, &mut record).await.unwrap());
        assert_eq!(passing.calls(), 2);
        assert_eq!(vetoing.calls(), 1);
    }

    #[tokio::test]
    async fn failing_hook_surfaces_its_message() {
        let failing = FailingHook::new("boom");
        let mut record = Record::new(Note::default());
        record.register_hook(LifecycleEvent::BeforeValidate, failing.clone());

        let err = record.validate().await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(failing.calls(), 1);
    }

    #[tokio::test]
    async fn counting_validator_reports_its_message() {
        let record = Record::new(Note::default());
        let failing = CountingValidator::failing("nope");

        let finding = ConstraintValidator::<Note>::is_valid(&failing, &record, Some("body"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.message, "nope");

        let passing = CountingValidator::passing();
        assert!(ConstraintValidator::<Note>::is_valid(&passing, &record, Some("body"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(failing.calls() + passing.calls(), 2);
    }
}
