//! Phase-ordering stress tests.
//!
//! Handlers and validators sleep for random intervals and append to a shared
//! log; the assertions check that no phase ever overlaps the next one.

use crate::{
    async_trait, hook_fn, ConstraintValidator, Document, DocumentStore, Error, FieldDescriptor,
    Filter, FindOptions, Hook, HookContext, LifecycleEvent, MetadataBuilder, Model, Patch, Record, Result,
    StoreError, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

async fn jitter() {
    tokio::time::sleep(Duration::from_millis(fastrand::u64(0..4))).await;
}

// ============================================================================
// Recording store
// ============================================================================

struct RecordingStore {
    log: Log,
    saves: AtomicUsize,
}

impl RecordingStore {
    fn new(log: Log) -> Arc<Self> {
        Arc::new(Self {
            log,
            saves: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn count(&self, _: &str, _: &Filter) -> std::result::Result<u64, StoreError> {
        Ok(0)
    }

    async fn find_one(
        &self,
        _: &str,
        _: &Filter,
    ) -> std::result::Result<Option<Document>, StoreError> {
        Ok(None)
    }

    async fn find_many(
        &self,
        _: &str,
        _: &Filter,
        _: &FindOptions,
    ) -> std::result::Result<Vec<Document>, StoreError> {
        Ok(Vec::new())
    }

    async fn save(&self, _: &str, _: Document) -> std::result::Result<String, StoreError> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("store".into());
        Ok(format!("doc-{n}"))
    }

    async fn update(&self, _: &str, _: &Filter, _: &Patch) -> std::result::Result<u64, StoreError> {
        Ok(0)
    }

    async fn delete(&self, _: &str, _: &Filter) -> std::result::Result<u64, StoreError> {
        Ok(0)
    }
}

// ============================================================================
// Model with slow validators
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct Order {
    sku: String,
    quantity: u32,
}

/// Adds scheduling noise to the validation phase.
#[derive(Serialize)]
struct SlowCheck(&'static str);

#[async_trait]
impl ConstraintValidator<Order> for SlowCheck {
    async fn is_valid(
        &self,
        _: &Record<Order>,
        _: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        jitter().await;
        Ok(None)
    }
}

impl Model for Order {
    fn describe(meta: &mut MetadataBuilder<Self>) {
        meta.collection("orders")
            .field(
                FieldDescriptor::new("sku")
                    .validate(SlowCheck("sku-a"))
                    .validate(SlowCheck("sku-b")),
            )
            .field(FieldDescriptor::new("quantity").validate(SlowCheck("qty")));
    }
}

struct LoggingHook {
    log: Log,
    name: String,
    verdict: std::result::Result<bool, &'static str>,
}

#[async_trait]
impl Hook<Order> for LoggingHook {
    async fn handle(&self, _: &HookContext<'_, Order>) -> anyhow::Result<bool> {
        self.log.lock().unwrap().push(format!("{}:start", self.name));
        jitter().await;
        self.log.lock().unwrap().push(format!("{}:end", self.name));
        self.verdict.map_err(|e| anyhow::anyhow!(e))
    }
}

fn hook(log: &Log, name: String, verdict: std::result::Result<bool, &'static str>) -> LoggingHook {
    LoggingHook {
        log: Arc::clone(log),
        name,
        verdict,
    }
}

fn position(log: &[String], predicate: impl Fn(&str) -> bool) -> Vec<usize> {
    log.iter()
        .enumerate()
        .filter(|(_, entry)| predicate(entry))
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn save_phases_never_overlap() {
    for round in 0..20 {
        let log: Log = Arc::default();
        let store = RecordingStore::new(Arc::clone(&log));
        let mut record = Record::new(Order {
            sku: "A-1".into(),
            quantity: 1,
        })
        .with_store(store.clone());

        let handlers = 1 + round % 5;
        for i in 0..handlers {
            record.register_hook(
                LifecycleEvent::AfterValidate,
                hook(&log, format!("after-validate{i}"), Ok(true)),
            );
            record.register_hook(
                LifecycleEvent::BeforeSave,
                hook(&log, format!("before-save{i}"), Ok(true)),
            );
            record.register_hook(
                LifecycleEvent::AfterSave,
                hook(&log, format!("after-save{i}"), Ok(true)),
            );
        }

        assert!(record.save().await.unwrap());

        let log = log.lock().unwrap().clone();
        let last_after_validate = *position(&log, |e| e.starts_with("after-validate"))
            .last()
            .unwrap();
        let before_save = position(&log, |e| e.starts_with("before-save"));
        let store_write = position(&log, |e| e == "store");
        let after_save = position(&log, |e| e.starts_with("after-save"));

        assert_eq!(before_save.len(), 2 * handlers);
        assert_eq!(store_write.len(), 1);
        assert!(last_after_validate < before_save[0]);
        assert!(*before_save.last().unwrap() < store_write[0]);
        assert!(store_write[0] < after_save[0]);
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn failing_before_save_lets_siblings_finish_and_skips_storage() {
    for failing in 0..4 {
        let log: Log = Arc::default();
        let store = RecordingStore::new(Arc::clone(&log));
        let mut record = Record::new(Order {
            sku: "B-2".into(),
            quantity: 3,
        })
        .with_store(store.clone());

        for i in 0..4 {
            let verdict = if i == failing { Err("quota exceeded") } else { Ok(true) };
            record.register_hook(
                LifecycleEvent::BeforeSave,
                hook(&log, format!("before-save{i}"), verdict),
            );
        }

        let err = record.save().await.unwrap_err();
        assert!(matches!(err, Error::Handler(_)));
        assert_eq!(err.to_string(), "quota exceeded");

        let log = log.lock().unwrap().clone();
        assert_eq!(position(&log, |e| e.ends_with(":end")).len(), 4);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        assert!(record.is_new_record());
    }
}

#[tokio::test]
async fn veto_in_one_handler_is_and_reduced() {
    let log: Log = Arc::default();
    let store = RecordingStore::new(Arc::clone(&log));
    let mut record = Record::new(Order::default()).with_store(store.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    for veto in [false, true, false] {
        let calls = Arc::clone(&calls);
        record.register_hook(
            LifecycleEvent::BeforeSave,
            hook_fn(move |_: &HookContext<Order>| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(!veto)
            }),
        );
    }

    assert!(!record.save().await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    assert!(log.lock().unwrap().is_empty());
}
