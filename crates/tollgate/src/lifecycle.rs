//! Storage operations gated by lifecycle events.
//!
//! Every operation runs its phases strictly in sequence: a `before-*` event,
//! the storage call, then the `after-*` event. A vetoing `before-*` handler
//! stops the operation before storage is touched. Storage and handler
//! failures surface as `Err`, never as `false`.
//!
//! Bulk operations ([`Record::delete_all`], [`Record::update_all`]) and
//! partial writes ([`Record::save_attributes`], [`Record::delete_attributes`])
//! bypass validation and hooks. [`Record::delete_all_after_find_all`] is the
//! hook-aware alternative for deletes.

use crate::combinator::run_all_void;
use crate::dispatch::{fire, fire_shared};
use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::metadata::Model;
use crate::record::Record;
use crate::scenario::Scenario;
use crate::store::{Document, DocumentStore, Filter, FindOptions, Patch, ID_FIELD};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info_span, Instrument, Span};

impl<M: Model> Record<M> {
    fn span(&self, operation: &'static str) -> Span {
        info_span!(
            "record",
            operation,
            model = self.meta.model_name(),
            scenario = %self.scenario,
        )
    }

    fn backend(&self) -> Result<(&dyn DocumentStore, &str)> {
        let model = self.meta.model_name();
        let store = self.store.as_deref().ok_or(Error::Detached(model))?;
        let collection = self.meta.collection().ok_or(Error::NoCollection(model))?;
        Ok((store, collection))
    }

    pub(crate) fn stored_id(&self) -> Result<&str> {
        match (&self.id, self.new_record) {
            (Some(id), false) => Ok(id.as_str()),
            _ => Err(Error::NewRecord(self.meta.model_name())),
        }
    }

    /// Validates, then writes the record.
    ///
    /// Resolves `false` without writing when validation fails or a
    /// `before-save` handler vetoes. After a successful write the record is
    /// no longer new, whatever `after-save` then resolves.
    pub async fn save(&mut self) -> Result<bool> {
        let span = self.span("save");
        async move {
            if !self.validate().await? {
                return Ok(false);
            }
            if !fire(LifecycleEvent::BeforeSave, self).await? {
                debug!("before-save vetoed");
                return Ok(false);
            }

            let document = self.to_document(false, true)?;
            let (store, collection) = self.backend()?;
            let id = store.save(collection, document).await?;
            debug!(id = %id, "record written");
            self.id = Some(id);
            self.new_record = false;

            fire(LifecycleEvent::AfterSave, self).await
        }
        .instrument(span)
        .await
    }

    /// Like [`save`](Record::save), but invalid data is an error.
    ///
    /// Returns [`Error::Invalid`] carrying the findings when validation
    /// produced any; a handler veto still resolves `Ok(false)`.
    pub async fn try_save(&mut self) -> Result<bool> {
        let saved = self.save().await?;
        if !saved && self.has_errors() {
            return Err(Error::Invalid(self.errors.clone()));
        }
        Ok(saved)
    }

    /// Deletes the stored record.
    pub async fn delete(&mut self) -> Result<bool> {
        let span = self.span("delete");
        async move {
            let id = self.stored_id()?.to_owned();
            if !fire(LifecycleEvent::BeforeDelete, self).await? {
                debug!("before-delete vetoed");
                return Ok(false);
            }

            let (store, collection) = self.backend()?;
            let removed = store.delete(collection, &Filter::by_id(&id)).await?;
            debug!(id = %id, removed, "record deleted");

            fire(LifecycleEvent::AfterDelete, self).await
        }
        .instrument(span)
        .await
    }

    /// Counts stored records matching `filter`.
    ///
    /// A `before-count` veto is an error ([`Error::CountRejected`]), since a
    /// count has no neutral value to fall back to. The `after-count` result
    /// is ignored; its failures are not.
    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        async move {
            if !fire_shared(LifecycleEvent::BeforeCount, self).await? {
                return Err(Error::CountRejected(self.meta.model_name()));
            }

            let (store, collection) = self.backend()?;
            let count = store.count(collection, filter).await?;

            fire_shared(LifecycleEvent::AfterCount, self).await?;
            Ok(count)
        }
        .instrument(self.span("count"))
        .await
    }

    pub async fn exists(&self, filter: &Filter) -> Result<bool> {
        Ok(self.count(filter).await? > 0)
    }

    /// First stored record matching `filter`.
    ///
    /// A `before-find` veto yields `None` without reading storage. The loaded
    /// record inherits this record's scenario, hooks and store, and
    /// `after-find` fires on it.
    pub async fn find(&self, filter: &Filter) -> Result<Option<Record<M>>> {
        async move {
            if !fire_shared(LifecycleEvent::BeforeFind, self).await? {
                debug!("before-find vetoed");
                return Ok(None);
            }

            let (store, collection) = self.backend()?;
            match store.find_one(collection, filter).await? {
                Some(document) => self.load(document).await.map(Some),
                None => Ok(None),
            }
        }
        .instrument(self.span("find"))
        .await
    }

    pub async fn find_by_pk(&self, id: &str) -> Result<Option<Record<M>>> {
        self.find(&Filter::by_id(id)).await
    }

    /// All stored records matching `filter`, in storage order.
    ///
    /// Records are loaded one after another so `after-find` handlers observe
    /// them in result order.
    pub async fn find_all(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Record<M>>> {
        async move {
            if !fire_shared(LifecycleEvent::BeforeFind, self).await? {
                debug!("before-find vetoed");
                return Ok(Vec::new());
            }

            let (store, collection) = self.backend()?;
            let documents = store.find_many(collection, filter, options).await?;
            let mut records = Vec::with_capacity(documents.len());
            for document in documents {
                records.push(self.load(document).await?);
            }
            debug!(found = records.len(), "records loaded");
            Ok(records)
        }
        .instrument(self.span("find_all"))
        .await
    }

    pub async fn find_all_by_pks<I, S>(&self, ids: I) -> Result<Vec<Record<M>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<Value> = ids.into_iter().map(|id| Value::String(id.into())).collect();
        self.find_all(&Filter::new().is_in(ID_FIELD, ids), &FindOptions::default())
            .await
    }

    async fn load(&self, document: Document) -> Result<Record<M>> {
        let mut record = self.hydrate(document)?;
        fire(LifecycleEvent::AfterFind, &mut record).await?;
        Ok(record)
    }

    /// Deletes every matching stored record without firing any handler.
    ///
    /// An empty filter removes the whole collection.
    pub async fn delete_all(&self, filter: &Filter) -> Result<u64> {
        let (store, collection) = self.backend()?;
        let removed = store
            .delete(collection, filter)
            .instrument(self.span("delete_all"))
            .await?;
        Ok(removed)
    }

    /// Applies `patch` to every matching stored record without firing any
    /// handler. Returns the number of records matched.
    pub async fn update_all(&self, filter: &Filter, patch: &Patch) -> Result<u64> {
        let (store, collection) = self.backend()?;
        let matched = store
            .update(collection, filter, patch)
            .instrument(self.span("update_all"))
            .await?;
        Ok(matched)
    }

    /// Writes only the listed attributes of a stored record. Null
    /// attributes are removed from the stored document.
    pub async fn save_attributes(&self, names: &[&str]) -> Result<bool> {
        let id = self.stored_id()?;
        let mut patch = Patch::new();
        for (name, value) in self.attributes(Some(names))? {
            patch = match value {
                Value::Null => patch.unset(name),
                value => patch.set(name, value),
            };
        }

        let matched = self.update_all(&Filter::by_id(id), &patch).await?;
        Ok(matched > 0)
    }

    /// Removes the listed attributes from a stored record's document.
    pub async fn delete_attributes(&self, names: &[&str]) -> Result<bool> {
        let id = self.stored_id()?;
        let patch = names
            .iter()
            .fold(Patch::new(), |patch, name| patch.unset(*name));

        let matched = self.update_all(&Filter::by_id(id), &patch).await?;
        Ok(matched > 0)
    }

    /// Finds one record and deletes it through the full lifecycle.
    ///
    /// Nothing found counts as success.
    pub async fn delete_after_find(
        &self,
        filter: &Filter,
        scenario: Option<Scenario>,
    ) -> Result<bool> {
        match self.find(filter).await? {
            Some(mut record) => {
                if let Some(scenario) = scenario {
                    record.set_scenario(scenario);
                }
                record.delete().await
            }
            None => Ok(true),
        }
    }

    pub async fn delete_after_find_by_pk(
        &self,
        id: &str,
        scenario: Option<Scenario>,
    ) -> Result<bool> {
        self.delete_after_find(&Filter::by_id(id), scenario).await
    }

    /// Finds every matching record and deletes each through the full
    /// lifecycle, concurrently.
    ///
    /// Returns the records whose deletion resolved `false`.
    pub async fn delete_all_after_find_all(
        &self,
        filter: &Filter,
        scenario: Option<Scenario>,
    ) -> Result<Vec<Record<M>>> {
        let mut records = self.find_all(filter, &FindOptions::default()).await?;
        if let Some(scenario) = scenario {
            for record in &mut records {
                record.set_scenario(scenario.clone());
            }
        }

        let kept = Mutex::new(Vec::new());
        run_all_void(records.iter_mut().enumerate().map(|(index, record)| {
            let kept = &kept;
            async move {
                if !record.delete().await? {
                    kept.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(index);
                }
                Ok::<_, Error>(())
            }
        }))
        .await?;

        let kept = kept.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .into_iter()
            .enumerate()
            .filter(|(index, _)| kept.contains(index))
            .map(|(_, record)| record)
            .collect())
    }
}
