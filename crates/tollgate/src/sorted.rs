//! Records kept in a dense, zero-based order.
//!
//! [`Positions`] maintains an integer attribute so that the stored records of
//! a collection (or of one scope within it) always hold the positions
//! `0..n` without gaps:
//!
//! - a new record is appended: `before-save` sets its position to the
//!   number of records already stored
//! - deleting a record closes the gap: `after-delete` moves every later
//!   record up by one
//! - [`Positions::move_by`] and [`Positions::move_to`] move a record and
//!   shift the records it passes over
//!
//! ```rust,ignore
//! impl Model for Step {
//!     fn describe(meta: &mut MetadataBuilder<Self>) {
//!         meta.collection("steps").field(FieldDescriptor::new("title"));
//!         Positions::new("position").scoped_by("recipe").install(meta);
//!     }
//! }
//!
//! let positions = Positions::new("position").scoped_by("recipe");
//! positions.move_to(&mut step, 0).await?;
//! ```
//!
//! The model needs a field for the position attribute. Records that other
//! records are shifted around are saved through the full lifecycle, so their
//! validators and handlers run as usual.

use crate::combinator::run_all;
use crate::error::{Error, Result};
use crate::event::LifecycleEvent;
use crate::hook::{Hook, HookContext};
use crate::metadata::{MetadataBuilder, Model};
use crate::record::Record;
use crate::store::{Filter, FindOptions, SortOrder, ID_FIELD};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Attribute used when none is named.
pub const DEFAULT_POSITION_ATTRIBUTE: &str = "position";

/// Which way a record moves. `Up` is toward position 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Maintains a dense position attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Positions {
    attribute: String,
    scope: Vec<String>,
}

impl Default for Positions {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION_ATTRIBUTE)
    }
}

impl Positions {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            scope: Vec::new(),
        }
    }

    /// Numbers records separately per value of `attribute`.
    ///
    /// Records missing the attribute form a scope of their own.
    pub fn scoped_by(mut self, attribute: impl Into<String>) -> Self {
        self.scope.push(attribute.into());
        self
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Registers the `before-save` and `after-delete` handlers on a model.
    pub fn install<M: Model>(&self, meta: &mut MetadataBuilder<M>) {
        meta.on(LifecycleEvent::BeforeSave, self.clone())
            .on(LifecycleEvent::AfterDelete, self.clone());
    }

    /// Sorts query results by position.
    pub fn order(&self) -> FindOptions {
        FindOptions::new().sort(self.attribute.clone(), SortOrder::Ascending)
    }

    /// Stored position of `record`.
    pub fn position<M: Model>(&self, record: &Record<M>) -> Result<i64> {
        self.parse(record.attribute(&self.attribute)?)
    }

    /// Records sharing the scope of `record`.
    pub fn scope_filter<M: Model>(&self, record: &Record<M>) -> Result<Filter> {
        let mut filter = Filter::new();
        for name in &self.scope {
            filter = match record.attribute(name)? {
                Some(value) => filter.equals(name, value),
                None => filter.missing(name),
            };
        }
        Ok(filter)
    }

    pub async fn move_up<M: Model>(&self, record: &mut Record<M>) -> Result<bool> {
        self.move_by(record, 1, Direction::Up).await
    }

    pub async fn move_down<M: Model>(&self, record: &mut Record<M>) -> Result<bool> {
        self.move_by(record, 1, Direction::Down).await
    }

    /// Moves a stored record `offset` places in `direction`.
    pub async fn move_by<M: Model>(
        &self,
        record: &mut Record<M>,
        offset: u64,
        direction: Direction,
    ) -> Result<bool> {
        let old = self.position(record)?;
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let new = match direction {
            Direction::Up => old.saturating_sub(offset),
            Direction::Down => old.saturating_add(offset),
        };
        self.relocate(record, old, new).await
    }

    /// Moves a stored record to `position`.
    ///
    /// Resolves `false` without writing anything when the target lies
    /// outside the scope's current positions. If the records in between
    /// cannot all be shifted, the record is put back where it was.
    pub async fn move_to<M: Model>(&self, record: &mut Record<M>, position: i64) -> Result<bool> {
        let old = self.position(record)?;
        self.relocate(record, old, position).await
    }

    async fn relocate<M: Model>(&self, record: &mut Record<M>, old: i64, new: i64) -> Result<bool> {
        record.stored_id()?;
        if new == old {
            return Ok(true);
        }

        let count = record.count(&self.scope_filter(record)?).await?;
        if new < 0 || u64::try_from(new).map_or(true, |new| new >= count) {
            debug!(old, new, count, "target position out of range");
            return Ok(false);
        }

        record.set_attribute(&self.attribute, new)?;
        if !record.save().await? {
            record.set_attribute(&self.attribute, old)?;
            return Ok(false);
        }

        let shifted = if new > old {
            self.shift(record, old, Some(new), -1).await
        } else {
            self.shift(record, new, Some(old), 1).await
        };
        debug!(old, new, ?shifted, "record moved");

        match shifted {
            Ok(true) => Ok(true),
            outcome => {
                self.restore(record, old).await;
                outcome
            }
        }
    }

    async fn restore<M: Model>(&self, record: &mut Record<M>, old: i64) {
        let restored = match record.set_attribute(&self.attribute, old) {
            Ok(()) => record.save().await,
            Err(err) => Err(err),
        };
        match restored {
            Ok(true) => debug!(position = old, "move undone"),
            Ok(false) => warn!(position = old, "move could not be undone"),
            Err(err) => warn!(position = old, error = %err, "move could not be undone"),
        }
    }

    /// Adds `delta` to the position of every other record in the scope
    /// whose position lies in `from..=to`.
    async fn shift<M: Model>(
        &self,
        record: &Record<M>,
        from: i64,
        to: Option<i64>,
        delta: i64,
    ) -> Result<bool> {
        let mut filter = self.scope_filter(record)?.at_least(&self.attribute, from);
        if let Some(to) = to {
            filter = filter.at_most(&self.attribute, to);
        }
        if let Some(id) = record.id() {
            filter = filter.not_equals(ID_FIELD, id);
        }

        let mut others = record.find_all(&filter, &FindOptions::default()).await?;
        debug!(from, ?to, delta, records = others.len(), "shifting positions");
        run_all(others.iter_mut().map(|other| self.nudge(other, delta))).await
    }

    async fn nudge<M: Model>(&self, record: &mut Record<M>, delta: i64) -> Result<bool> {
        let position = self.position(record)?;
        record.set_attribute(&self.attribute, position + delta)?;
        record.save().await
    }

    fn parse(&self, value: Option<Value>) -> Result<i64> {
        value.as_ref().and_then(Value::as_i64).ok_or_else(|| {
            Error::unsupported_type("Positions", &self.attribute, "expected an integer position")
        })
    }
}

#[async_trait]
impl<M: Model> Hook<M> for Positions {
    async fn handle(&self, ctx: &HookContext<'_, M>) -> anyhow::Result<bool> {
        match ctx.event() {
            LifecycleEvent::BeforeSave if ctx.is_new_record() => {
                let record = ctx.record();
                let count = record.count(&self.scope_filter(record)?).await?;
                ctx.set_attribute(self.attribute.clone(), count)?;
                Ok(true)
            }
            LifecycleEvent::AfterDelete => {
                let record = ctx.record();
                let position = self.parse(ctx.attribute(&self.attribute)?)?;
                Ok(self.shift(record, position, None, -1).await?)
            }
            _ => Ok(true),
        }
    }
}
