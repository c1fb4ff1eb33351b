//! Per-type model metadata and scenario-scoped validator resolution.
//!
//! A model describes itself once through [`Model::describe`]. The resulting
//! [`ModelMetadata`] is built on first use, cached process-wide and shared
//! read-only by every record of that type.

use crate::constraint::{Constraint, ConstraintValidator, ValidatorDescriptor};
use crate::event::LifecycleEvent;
use crate::hook::{Hook, HookTable};
use crate::scenario::{Scenario, ScenarioSet};
use crate::store::MAIN_STORE;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// A data model managed by tollgate.
///
/// The model value itself is plain data; serde maps it to and from stored
/// documents. Everything else (fields, constraints, handlers) is declared in
/// [`describe`](Model::describe).
///
/// ```rust,ignore
/// impl Model for User {
///     fn describe(meta: &mut MetadataBuilder<Self>) {
///         meta.collection("users")
///             .field(FieldDescriptor::new("email").validate(Required).validate(Email))
///             .field(FieldDescriptor::new("name").searchable(SearchMode::pattern()))
///             .on(LifecycleEvent::BeforeSave, hook_fn(|user| Ok(!user.model().banned)));
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn describe(meta: &mut MetadataBuilder<Self>);
}

/// How a searchable field turns into a filter condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    /// Equality on the given value.
    Exact,
    /// Pattern match on the given value with regex flag letters.
    Pattern { options: String },
}

impl SearchMode {
    /// Case-insensitive pattern search.
    pub fn pattern() -> Self {
        SearchMode::Pattern {
            options: "i".to_owned(),
        }
    }
}

/// Declaration of one model attribute.
pub struct FieldDescriptor<M: Model> {
    name: &'static str,
    safe: Option<ScenarioSet>,
    searchable: Option<SearchMode>,
    not_saved: bool,
    collection_typed: bool,
    constraints: Vec<Constraint<M>>,
}

impl<M: Model> FieldDescriptor<M> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            safe: None,
            searchable: None,
            not_saved: false,
            collection_typed: false,
            constraints: Vec::new(),
        }
    }

    /// Assignable in every scenario.
    pub fn safe(mut self) -> Self {
        self.safe = Some(ScenarioSet::default());
        self
    }

    /// Assignable in the listed scenarios.
    pub fn safe_in<I, S>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scenario>,
    {
        self.safe = Some(ScenarioSet::new(scenarios));
        self
    }

    pub fn searchable(mut self, mode: SearchMode) -> Self {
        self.searchable = Some(mode);
        self
    }

    /// Never written to storage.
    pub fn not_saved(mut self) -> Self {
        self.not_saved = true;
        self
    }

    /// The attribute holds a list or map; assigning an empty string clears it.
    pub fn collection(mut self) -> Self {
        self.collection_typed = true;
        self
    }

    pub fn constraint(mut self, constraint: Constraint<M>) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Shorthand for a single-validator constraint active in every scenario.
    pub fn validate(self, validator: impl ConstraintValidator<M> + 'static) -> Self {
        self.constraint(Constraint::of(validator))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn search_mode(&self) -> Option<&SearchMode> {
        self.searchable.as_ref()
    }

    pub fn is_not_saved(&self) -> bool {
        self.not_saved
    }

    pub fn is_collection(&self) -> bool {
        self.collection_typed
    }

    pub fn constraints(&self) -> &[Constraint<M>] {
        &self.constraints
    }

    /// Safe when marked safe for `scenario` or validated in it.
    pub fn is_safe_in(&self, scenario: &Scenario) -> bool {
        self.safe.as_ref().is_some_and(|set| set.includes(scenario))
            || self.constraints.iter().any(|c| c.is_active_in(scenario))
    }

    fn is_required_in(&self, scenario: &Scenario) -> bool {
        self.constraints
            .iter()
            .any(|c| c.is_required_kind() && c.is_active_in(scenario))
    }
}

impl<M: Model> fmt::Debug for FieldDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("safe", &self.safe)
            .field("searchable", &self.searchable)
            .field("not_saved", &self.not_saved)
            .field("constraints", &self.constraints)
            .finish()
    }
}

/// Collects a model's declarations inside [`Model::describe`].
pub struct MetadataBuilder<M: Model> {
    collection: Option<String>,
    store_key: String,
    fields: Vec<FieldDescriptor<M>>,
    constraints: Vec<Constraint<M>>,
    handlers: HookTable<M>,
}

impl<M: Model> MetadataBuilder<M> {
    fn new() -> Self {
        Self {
            collection: None,
            store_key: MAIN_STORE.to_owned(),
            fields: Vec::new(),
            constraints: Vec::new(),
            handlers: HookTable::default(),
        }
    }

    pub fn collection(&mut self, name: impl Into<String>) -> &mut Self {
        self.collection = Some(name.into());
        self
    }

    /// Registry key of the store records of this model attach to.
    pub fn store(&mut self, key: impl Into<String>) -> &mut Self {
        self.store_key = key.into();
        self
    }

    pub fn field(&mut self, field: FieldDescriptor<M>) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// A constraint on the model as a whole.
    pub fn constraint(&mut self, constraint: Constraint<M>) -> &mut Self {
        self.constraints.push(constraint);
        self
    }

    /// A handler run every time `event` fires on any record of the model.
    pub fn on(&mut self, event: LifecycleEvent, handler: impl Hook<M> + 'static) -> &mut Self {
        self.handlers.register(event, Arc::new(handler));
        self
    }

    fn build(self) -> ModelMetadata<M> {
        ModelMetadata {
            model_name: model_name::<M>(),
            collection: self.collection,
            store_key: self.store_key,
            fields: self.fields,
            constraints: self.constraints,
            handlers: self.handlers,
        }
    }
}

/// Everything known about a model type. Immutable once built.
pub struct ModelMetadata<M: Model> {
    model_name: &'static str,
    collection: Option<String>,
    store_key: String,
    fields: Vec<FieldDescriptor<M>>,
    constraints: Vec<Constraint<M>>,
    handlers: HookTable<M>,
}

impl<M: Model> ModelMetadata<M> {
    pub fn model_name(&self) -> &'static str {
        self.model_name
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor<M>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<M>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn model_constraints(&self) -> &[Constraint<M>] {
        &self.constraints
    }

    pub(crate) fn handlers(&self, event: LifecycleEvent) -> &[Arc<dyn Hook<M>>] {
        self.handlers.get(event)
    }

    /// Fields assignable in `scenario`.
    pub fn safe_fields<'a>(
        &'a self,
        scenario: &'a Scenario,
    ) -> impl Iterator<Item = &'a FieldDescriptor<M>> + 'a {
        self.fields.iter().filter(move |f| f.is_safe_in(scenario))
    }

    /// Safe fields carrying a required constraint active in `scenario`.
    pub fn required_fields<'a>(
        &'a self,
        scenario: &'a Scenario,
    ) -> impl Iterator<Item = &'a FieldDescriptor<M>> + 'a {
        self.safe_fields(scenario)
            .filter(move |f| f.is_required_in(scenario))
    }

    /// Validators active in `scenario` for `field`, or for the model itself
    /// when `field` is `None`, in declaration order.
    ///
    /// Misconfigured constraints are logged and skipped; the rest of the
    /// field's constraints still resolve.
    pub fn resolve(&self, field: Option<&str>, scenario: &Scenario) -> Vec<ValidatorDescriptor<M>> {
        let constraints = match field {
            None => self.constraints.as_slice(),
            Some(name) => match self.field(name) {
                Some(field) => field.constraints(),
                None => return Vec::new(),
            },
        };

        let mut resolved = Vec::new();
        for constraint in constraints {
            match constraint.descriptors(scenario) {
                Ok(descriptors) => resolved.extend(descriptors),
                Err(err) => warn!(
                    model = self.model_name,
                    field = field.unwrap_or("<model>"),
                    error = %err,
                    "skipping misconfigured constraint"
                ),
            }
        }
        resolved
    }
}

impl<M: Model> fmt::Debug for ModelMetadata<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMetadata")
            .field("model_name", &self.model_name)
            .field("collection", &self.collection)
            .field("store_key", &self.store_key)
            .field("fields", &self.fields)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

type MetadataCache = DashMap<TypeId, Box<dyn Any + Send + Sync>>;

static METADATA: OnceLock<MetadataCache> = OnceLock::new();

/// Metadata of `M`, built from [`Model::describe`] on first call.
pub fn metadata<M: Model>() -> Arc<ModelMetadata<M>> {
    let cache = METADATA.get_or_init(DashMap::new);
    let key = TypeId::of::<M>();

    if let Some(cached) = cache
        .get(&key)
        .and_then(|entry| entry.downcast_ref::<Arc<ModelMetadata<M>>>().cloned())
    {
        return cached;
    }

    // Built outside the map lock; `describe` may look up other models.
    let mut builder = MetadataBuilder::new();
    M::describe(&mut builder);
    let built = Arc::new(builder.build());

    let entry = cache
        .entry(key)
        .or_insert_with(|| Box::new(Arc::clone(&built)));
    let shared = entry.downcast_ref::<Arc<ModelMetadata<M>>>().cloned();
    shared.unwrap_or(built)
}

fn model_name<M>() -> &'static str {
    let full = std::any::type_name::<M>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
