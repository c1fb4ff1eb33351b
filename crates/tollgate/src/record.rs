//! Records: a model value plus its lifecycle state.
//!
//! Validation and the storage operations are implemented in their own
//! modules; this one holds state, attribute access and document mapping.

use crate::error::{Error, Result};
use crate::errors::{ErrorSet, ValidationError};
use crate::event::LifecycleEvent;
use crate::hook::{Hook, HookTable};
use crate::metadata::{metadata, Model, ModelMetadata, SearchMode};
use crate::scenario::Scenario;
use crate::store::{Document, DocumentStore, Filter, StoreRegistry, ID_FIELD};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Input key holding a comma-separated list of identifiers to search for.
pub const IDS_SEARCH_KEY: &str = "_ids";

/// A model instance under lifecycle control.
///
/// Mutating operations ([`validate`](Record::validate),
/// [`save`](Record::save), [`delete`](Record::delete)) take `&mut self`, so at
/// most one of them runs on a record at a time. Queries take `&self`.
pub struct Record<M: Model> {
    pub(crate) model: M,
    pub(crate) meta: Arc<ModelMetadata<M>>,
    pub(crate) scenario: Scenario,
    pub(crate) new_record: bool,
    pub(crate) id: Option<String>,
    pub(crate) errors: ErrorSet,
    pub(crate) hooks: HookTable<M>,
    pub(crate) store: Option<Arc<dyn DocumentStore>>,
}

impl<M: Model> Record<M> {
    /// A new, detached record in the main scenario.
    pub fn new(model: M) -> Self {
        Self {
            model,
            meta: metadata::<M>(),
            scenario: Scenario::main(),
            new_record: true,
            id: None,
            errors: ErrorSet::new(),
            hooks: HookTable::default(),
            store: None,
        }
    }

    /// Rebuilds a stored record from its document.
    ///
    /// The record is detached and not new; `_id` becomes its identifier.
    pub fn from_document(mut document: Document) -> Result<Self> {
        let id = document.remove(ID_FIELD).and_then(|id| id_string(&id));
        let model: M = serde_json::from_value(Value::Object(document))?;

        let mut record = Self::new(model);
        record.id = id;
        record.new_record = false;
        Ok(record)
    }

    /// Attaches the store registered under the model's store key.
    pub fn attach(mut self, stores: &StoreRegistry) -> Result<Self> {
        self.store = Some(stores.get(self.meta.store_key())?);
        Ok(self)
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn metadata(&self) -> &ModelMetadata<M> {
        &self.meta
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn set_scenario(&mut self, scenario: impl Into<Scenario>) {
        self.scenario = scenario.into();
    }

    pub fn errors(&self) -> &ErrorSet {
        &self.errors
    }

    pub fn add_error(&mut self, attribute: impl Into<String>, error: ValidationError) {
        self.errors.add(attribute, error);
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Registers a handler for `event` on this record only.
    ///
    /// Records loaded through this record's finders inherit its hooks.
    pub fn register_hook(&mut self, event: LifecycleEvent, hook: impl Hook<M> + 'static) {
        self.hooks.register(event, Arc::new(hook));
    }

    /// Same as [`register_hook`](Record::register_hook) with the event given
    /// by name, e.g. `"before-save"` or `"onBeforeSave"`.
    pub fn register_hook_named(&mut self, event: &str, hook: impl Hook<M> + 'static) -> Result<()> {
        let event = event.parse()?;
        self.register_hook(event, hook);
        Ok(())
    }

    pub fn hook_count(&self, event: LifecycleEvent) -> usize {
        self.hooks.len(event)
    }

    pub(crate) fn hooks(&self) -> &HookTable<M> {
        &self.hooks
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    /// Current value of one attribute. Absent and null both read as `None`.
    pub fn attribute(&self, name: &str) -> Result<Option<Value>> {
        if name == ID_FIELD {
            return Ok(self.id.clone().map(Value::String));
        }
        let mut document = self.model_document()?;
        Ok(document.remove(name).filter(|value| !value.is_null()))
    }

    /// Sets one attribute regardless of scenario.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let mut document = Document::new();
        document.insert(name.to_owned(), value.into());
        self.assign_all(&document)
    }

    /// Bulk assignment limited to the fields safe in the current scenario.
    ///
    /// Keys naming unsafe or undeclared fields are ignored. An empty string
    /// given to a collection field clears it.
    pub fn assign(&mut self, values: &Document) -> Result<()> {
        let mut accepted = Document::new();
        for field in self.meta.safe_fields(&self.scenario) {
            let Some(value) = values.get(field.name()) else {
                continue;
            };
            let value = match value {
                Value::String(s) if s.is_empty() && field.is_collection() => Value::Null,
                other => other.clone(),
            };
            accepted.insert(field.name().to_owned(), value);
        }
        self.merge(accepted)
    }

    /// Unrestricted assignment; `_id` updates the identifier.
    pub fn assign_all(&mut self, values: &Document) -> Result<()> {
        let mut values = values.clone();
        if let Some(id) = values.remove(ID_FIELD) {
            self.id = id_string(&id);
        }
        self.merge(values)
    }

    fn merge(&mut self, values: Document) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut document = self.model_document()?;
        document.extend(values);
        self.model = serde_json::from_value(Value::Object(document))?;
        Ok(())
    }

    fn model_document(&self) -> Result<Document> {
        match serde_json::to_value(&self.model)? {
            Value::Object(document) => Ok(document),
            other => Err(Error::Serialization(serde::ser::Error::custom(format!(
                "model `{}` serialized to {other} instead of an object",
                self.meta.model_name()
            )))),
        }
    }

    // ---------------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------------

    /// The record as a storage document.
    ///
    /// Null attributes are dropped unless `include_empty`; fields declared
    /// not-saved are dropped when `exclude_not_saved`. The identifier, if
    /// any, appears as `_id`.
    pub fn to_document(&self, include_empty: bool, exclude_not_saved: bool) -> Result<Document> {
        let mut document = self.model_document()?;
        if !include_empty {
            document.retain(|_, value| !value.is_null());
        }
        if exclude_not_saved {
            for field in self.meta.fields().iter().filter(|f| f.is_not_saved()) {
                document.remove(field.name());
            }
        }
        if let Some(id) = &self.id {
            document.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
        }
        Ok(document)
    }

    /// All attributes, or only the listed ones, nulls included.
    pub fn attributes(&self, names: Option<&[&str]>) -> Result<Document> {
        let mut document = self.to_document(true, false)?;
        if let Some(names) = names {
            document.retain(|key, _| names.contains(&key.as_str()));
        }
        Ok(document)
    }

    /// Builds a filter from user input over the searchable fields.
    ///
    /// Exact fields match by equality, pattern fields by pattern with the
    /// declared options. [`IDS_SEARCH_KEY`] restricts the identifiers.
    /// Null and empty-string inputs are skipped.
    pub fn search_filter(&self, input: &Document) -> Filter {
        let mut filter = Filter::new();
        for field in self.meta.fields() {
            let Some(mode) = field.search_mode() else {
                continue;
            };
            let value = match input.get(field.name()) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) if s.is_empty() => continue,
                Some(value) => value,
            };
            filter = match mode {
                SearchMode::Exact => filter.equals(field.name(), value.clone()),
                SearchMode::Pattern { options } => {
                    let pattern = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    filter.pattern(field.name(), pattern, options.clone())
                }
            };
        }

        if let Some(Value::String(ids)) = input.get(IDS_SEARCH_KEY) {
            let ids: Vec<&str> = ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .collect();
            if !ids.is_empty() {
                filter = filter.is_in(ID_FIELD, ids);
            }
        }
        filter
    }

    /// A loaded record sharing this record's scenario, hooks and store.
    pub(crate) fn hydrate(&self, document: Document) -> Result<Self> {
        let mut record = Self::from_document(document)?;
        record.scenario = self.scenario.clone();
        record.hooks = self.hooks.clone();
        record.store = self.store.clone();
        Ok(record)
    }
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl<M: Model + Clone> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            meta: Arc::clone(&self.meta),
            scenario: self.scenario.clone(),
            new_record: self.new_record,
            id: self.id.clone(),
            errors: self.errors.clone(),
            hooks: self.hooks.clone(),
            store: self.store.clone(),
        }
    }
}

impl<M: Model + fmt::Debug> fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model)
            .field("scenario", &self.scenario)
            .field("new_record", &self.new_record)
            .field("id", &self.id)
            .field("errors", &self.errors)
            .field("attached", &self.store.is_some())
            .finish()
    }
}
