//! In-memory [`DocumentStore`] with call accounting and fault injection.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;
use tollgate::{Document, DocumentStore, Filter, FindOptions, Patch, SortOrder, StoreError, ID_FIELD};

/// Storage operations, for call counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Count,
    FindOne,
    FindMany,
    Save,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
enum Fault {
    Once(String),
    Always(String),
}

/// Document store backed by process memory.
///
/// Documents keep insertion order within a collection, which is the order
/// [`find_many`](DocumentStore::find_many) returns them in absent sorting.
///
/// ```rust,ignore
/// let store = Arc::new(MemoryStore::new());
/// store.fail_next(StoreOp::Save, "disk full");
///
/// let mut user = Record::new(user).with_store(store.clone());
/// assert!(user.save().await.is_err());
/// assert_eq!(store.calls(StoreOp::Save), 1);
/// ```
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
    calls: DashMap<StoreOp, AtomicUsize>,
    faults: DashMap<StoreOp, Fault>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation, so concurrent callers interleave.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
        self
    }

    /// Inserts a document directly, bypassing call accounting.
    /// Returns the document's id, generating one when absent.
    pub fn seed(&self, collection: &str, mut document: Document) -> String {
        let id = ensure_id(&mut document);
        self.upsert(collection, document);
        id
    }

    /// Snapshot of a collection in storage order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id))
                .cloned()
        })
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |docs| docs.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// How many times `op` has been invoked, including failed invocations.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls
            .get(&op)
            .map_or(0, |n| n.load(AtomicOrdering::SeqCst))
    }

    /// Sum of all operation calls.
    pub fn total_calls(&self) -> usize {
        self.calls
            .iter()
            .map(|entry| entry.value().load(AtomicOrdering::SeqCst))
            .sum()
    }

    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// The next invocation of `op` fails with `message`.
    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.faults.insert(op, Fault::Once(message.into()));
    }

    /// Every invocation of `op` fails with `message` until [`heal`](Self::heal).
    pub fn fail_always(&self, op: StoreOp, message: impl Into<String>) {
        self.faults.insert(op, Fault::Always(message.into()));
    }

    pub fn heal(&self) {
        self.faults.clear();
    }

    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.calls
            .entry(op)
            .or_default()
            .fetch_add(1, AtomicOrdering::SeqCst);

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let fault = match self.faults.get(&op).map(|f| f.value().clone()) {
            Some(Fault::Once(message)) => {
                self.faults.remove(&op);
                Some(message)
            }
            Some(Fault::Always(message)) => Some(message),
            None => None,
        };
        match fault {
            Some(message) => Err(StoreError::backend(anyhow::anyhow!(message))),
            None => Ok(()),
        }
    }

    fn upsert(&self, collection: &str, document: Document) {
        let mut docs = self.collections.entry(collection.to_owned()).or_default();
        let id = document.get(ID_FIELD).cloned();
        match docs.iter_mut().find(|doc| doc.get(ID_FIELD) == id.as_ref()) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for doc in docs.iter() {
            if filter.matches(doc)? {
                found.push(doc.clone());
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.enter(StoreOp::Count).await?;
        Ok(self.matching(collection, filter)?.len() as u64)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.enter(StoreOp::FindOne).await?;
        Ok(self.matching(collection, filter)?.into_iter().next())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.enter(StoreOp::FindMany).await?;
        let mut found = self.matching(collection, filter)?;

        if !options.sort.is_empty() {
            found.sort_by(|a, b| {
                options
                    .sort
                    .iter()
                    .map(|(key, order)| {
                        let ordering = compare_values(a.get(key), b.get(key));
                        match order {
                            SortOrder::Ascending => ordering,
                            SortOrder::Descending => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn save(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        self.enter(StoreOp::Save).await?;
        let id = ensure_id(&mut document);
        self.upsert(collection, document);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        self.enter(StoreOp::Update).await?;
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let hits = hits(&docs, filter)?;
        let mut matched = 0;
        for (doc, hit) in docs.iter_mut().zip(hits) {
            if hit {
                patch.apply(doc);
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.enter(StoreOp::Delete).await?;
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        let mut hits = hits(&docs, filter)?.into_iter();
        docs.retain(|_| !hits.next().unwrap_or(false));
        Ok((before - docs.len()) as u64)
    }
}

/// Evaluates the filter against every document before anything is touched,
/// so a malformed filter leaves the collection as it was.
fn hits(docs: &[Document], filter: &Filter) -> Result<Vec<bool>, StoreError> {
    docs.iter().map(|doc| filter.matches(doc)).collect()
}

fn ensure_id(document: &mut Document) -> String {
    match document.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        _ => {
            let id = uuid::Uuid::new_v4().simple().to_string();
            document.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
            id
        }
    }
}

/// Total order over JSON values: null < bool < number < string < other.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[tokio::test]
    async fn save_generates_ids_and_replaces_by_id() {
        let store = MemoryStore::new();

        let id = store.save("users", doc(json!({ "name": "Ann" }))).await.unwrap();
        assert_eq!(store.len("users"), 1);

        let mut updated = doc(json!({ "name": "Anne" }));
        updated.insert(ID_FIELD.into(), Value::String(id.clone()));
        let same = store.save("users", updated).await.unwrap();

        assert_eq!(same, id);
        assert_eq!(store.len("users"), 1);
        assert_eq!(store.get("users", &id).unwrap()["name"], json!("Anne"));
        assert_eq!(store.calls(StoreOp::Save), 2);
    }

    #[tokio::test]
    async fn find_many_sorts_and_windows() {
        let store = MemoryStore::new();
        for (name, age) in [("c", 30), ("a", 20), ("b", 20), ("d", 40)] {
            store.seed("people", doc(json!({ "name": name, "age": age })));
        }

        let options = FindOptions::new()
            .sort("age", SortOrder::Descending)
            .sort("name", SortOrder::Ascending)
            .skip(1)
            .limit(2);
        let found = store
            .find_many("people", &Filter::new(), &options)
            .await
            .unwrap();

        let names: Vec<_> = found.iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, [json!("c"), json!("a")]);
    }

    #[tokio::test]
    async fn update_and_delete_follow_the_filter() {
        let store = MemoryStore::new();
        store.seed("tasks", doc(json!({ "state": "open", "owner": "ann" })));
        store.seed("tasks", doc(json!({ "state": "open", "owner": "bob" })));
        store.seed("tasks", doc(json!({ "state": "done", "owner": "ann" })));

        let patch = Patch::new().set("state", "closed").unset("owner");
        let matched = store
            .update("tasks", &Filter::new().equals("state", "open"), &patch)
            .await
            .unwrap();
        assert_eq!(matched, 2);

        let removed = store
            .delete("tasks", &Filter::new().missing("owner"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.documents("tasks")[0]["state"], json!("done"));
    }

    #[tokio::test]
    async fn malformed_delete_filter_keeps_every_document() {
        let store = MemoryStore::new();
        for name in ["ann", "bob", "cy"] {
            store.seed("users", doc(json!({ "name": name })));
        }

        let err = store
            .delete("users", &Filter::new().pattern("name", "(", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
        assert_eq!(store.len("users"), 3);
    }

    #[tokio::test]
    async fn malformed_update_filter_patches_nothing() {
        let store = MemoryStore::new();
        for name in ["ann", "bob", "cy"] {
            store.seed("users", doc(json!({ "name": name })));
        }

        let filter = Filter::new().pattern("name", "(", "");
        let patch = Patch::new().set("state", "touched");
        assert!(store.update("users", &filter, &patch).await.is_err());
        assert!(store
            .documents("users")
            .iter()
            .all(|doc| !doc.contains_key("state")));
    }

    #[tokio::test]
    async fn faults_fire_once_or_until_healed() {
        let store = MemoryStore::new();

        store.fail_next(StoreOp::Count, "flaky");
        assert!(store.count("x", &Filter::new()).await.is_err());
        assert!(store.count("x", &Filter::new()).await.is_ok());

        store.fail_always(StoreOp::Delete, "read-only");
        assert!(store.delete("x", &Filter::new()).await.is_err());
        assert!(store.delete("x", &Filter::new()).await.is_err());
        store.heal();
        assert!(store.delete("x", &Filter::new()).await.is_ok());

        assert_eq!(store.calls(StoreOp::Count), 2);
        assert_eq!(store.calls(StoreOp::Delete), 3);
        assert_eq!(store.total_calls(), 5);
    }
}
