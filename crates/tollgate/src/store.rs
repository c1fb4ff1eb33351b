//! Storage collaborator contract and the registry of storage handles.
//!
//! The engine never talks to a database directly. Every read and write goes
//! through a [`DocumentStore`], scoped by collection name, using the small
//! [`Filter`] / [`Patch`] vocabulary below.

use crate::error::{Error, Result, StoreError};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A stored document: a JSON object keyed by attribute name.
pub type Document = serde_json::Map<String, Value>;

/// Attribute holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Registry key of the default store.
pub const MAIN_STORE: &str = "main";

/// One condition on a document attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Attribute is present and equal to the value.
    Eq(Value),
    /// Attribute is absent or differs from the value.
    Ne(Value),
    /// Attribute is absent.
    Missing,
    /// Attribute equals one of the values.
    In(Vec<Value>),
    /// Attribute is at least the value. Numbers compare numerically and
    /// strings lexicographically; values of different types never match.
    Gte(Value),
    /// Attribute is at most the value, compared like [`Condition::Gte`].
    Lte(Value),
    /// Attribute is a string containing a match of `pattern`.
    ///
    /// `options` follows the usual regex flag letters; `i` makes the match
    /// case-insensitive.
    Pattern { pattern: String, options: String },
}

/// Conjunction of conditions. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().equals(ID_FIELD, id.into())
    }

    pub fn equals(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(attribute, Condition::Eq(value.into()))
    }

    pub fn not_equals(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(attribute, Condition::Ne(value.into()))
    }

    pub fn missing(self, attribute: impl Into<String>) -> Self {
        self.with(attribute, Condition::Missing)
    }

    pub fn is_in<I, V>(self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with(attribute, Condition::In(values))
    }

    pub fn at_least(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(attribute, Condition::Gte(value.into()))
    }

    pub fn at_most(self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(attribute, Condition::Lte(value.into()))
    }

    pub fn pattern(
        self,
        attribute: impl Into<String>,
        pattern: impl Into<String>,
        options: impl Into<String>,
    ) -> Self {
        self.with(
            attribute,
            Condition::Pattern {
                pattern: pattern.into(),
                options: options.into(),
            },
        )
    }

    pub fn with(mut self, attribute: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((attribute.into(), condition));
        self
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the filter against a document.
    ///
    /// Stores without a native query engine use this directly.
    pub fn matches(&self, document: &Document) -> Result<bool, StoreError> {
        for (attribute, condition) in &self.conditions {
            let current = document.get(attribute).filter(|v| !v.is_null());
            let hit = match condition {
                Condition::Eq(expected) => current == Some(expected),
                Condition::Ne(expected) => current != Some(expected),
                Condition::Missing => current.is_none(),
                Condition::In(values) => current.is_some_and(|v| values.contains(v)),
                Condition::Gte(bound) => current
                    .and_then(|v| compare(v, bound))
                    .is_some_and(Ordering::is_ge),
                Condition::Lte(bound) => current
                    .and_then(|v| compare(v, bound))
                    .is_some_and(Ordering::is_le),
                Condition::Pattern { pattern, options } => match current {
                    Some(Value::String(text)) => RegexBuilder::new(pattern)
                        .case_insensitive(options.contains('i'))
                        .multi_line(options.contains('m'))
                        .dot_matches_new_line(options.contains('s'))
                        .build()
                        .map_err(|e| StoreError::Malformed(e.to_string()))?
                        .is_match(text),
                    _ => false,
                },
            };
            if !hit {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn compare(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Partial update applied by [`DocumentStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub set: Document,
    pub unset: Vec<String>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(attribute.into(), value.into());
        self
    }

    pub fn unset(mut self, attribute: impl Into<String>) -> Self {
        self.unset.push(attribute.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Applies the patch to a document in place.
    pub fn apply(&self, document: &mut Document) {
        for (attribute, value) in &self.set {
            document.insert(attribute.clone(), value.clone());
        }
        for attribute in &self.unset {
            document.remove(attribute);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sorting and windowing for [`DocumentStore::find_many`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, attribute: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((attribute.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Document storage used by records.
///
/// Implementations must be safe to share between records and tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of documents matching the filter.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// First document matching the filter.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError>;

    /// All documents matching the filter, in `options` order.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Inserts or replaces a document and returns its identifier.
    ///
    /// A document carrying [`ID_FIELD`] replaces the stored document with that
    /// identifier; otherwise a new identifier is generated.
    async fn save(&self, collection: &str, document: Document) -> Result<String, StoreError>;

    /// Applies `patch` to every matching document; returns how many matched.
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError>;

    /// Removes every matching document; returns how many were removed.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;
}

/// Named storage handles, assembled once at startup.
///
/// ```rust,ignore
/// let stores = StoreRegistry::builder()
///     .with_store(MAIN_STORE, Arc::new(store))?
///     .build();
/// let user = Record::new(User::default()).attach(&stores)?;
/// ```
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn DocumentStore>>,
}

impl StoreRegistry {
    pub fn builder() -> StoreRegistryBuilder {
        StoreRegistryBuilder::default()
    }

    /// Registry holding a single store under [`MAIN_STORE`].
    pub fn single(store: Arc<dyn DocumentStore>) -> Self {
        let mut stores = HashMap::new();
        stores.insert(MAIN_STORE.to_owned(), store);
        Self { stores }
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn DocumentStore>> {
        self.stores
            .get(key)
            .cloned()
            .ok_or_else(|| Error::StoreNotInitialized(key.to_owned()))
    }

    pub fn main(&self) -> Result<Arc<dyn DocumentStore>> {
        self.get(MAIN_STORE)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stores.contains_key(key)
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct StoreRegistryBuilder {
    stores: HashMap<String, Arc<dyn DocumentStore>>,
}

impl StoreRegistryBuilder {
    pub fn with_store(
        mut self,
        key: impl Into<String>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        let key = key.into();
        if self.stores.contains_key(&key) {
            return Err(Error::DuplicateStore(key));
        }
        self.stores.insert(key, store);
        Ok(self)
    }

    pub fn build(self) -> StoreRegistry {
        StoreRegistry {
            stores: self.stores,
        }
    }
}

impl fmt::Debug for StoreRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistryBuilder")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
