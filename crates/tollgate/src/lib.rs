//! # Tollgate
//!
//! An asynchronous lifecycle-and-validation gate for data records: nothing
//! reaches storage until every handler and validator standing in front of it
//! has had its say.
//!
//! ## Core Concepts
//!
//! - A [`Model`] is plain serde data that [describes](Model::describe) its
//!   fields, constraints and lifecycle handlers once per type.
//! - A [`Record`] wraps a model value with its lifecycle state: the current
//!   [`Scenario`], the new-record flag, the stored id and the [`ErrorSet`].
//! - A [`LifecycleEvent`] is fired around every operation. Handlers run
//!   concurrently; a `before-*` handler resolving `false` vetoes. Handlers
//!   may stage attribute writes through their [`HookContext`].
//! - A [`ConstraintValidator`] checks one attribute (or the whole model) and
//!   is only active in the scenarios its [`Constraint`] lists.
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   │ save()
//!   ▼
//! Record ──► validate() ─────────────────────────────┐
//!   │          │                                     │
//!   │          ├─► fire(before-validate)             │
//!   │          ├─► resolve(model, scenario) ──┐      │
//!   │          ├─► resolve(field, scenario) ──┴─► run_all (concurrent)
//!   │          └─► fire(after-validate)              │
//!   │                                                │
//!   ├─► fire(before-save) ──► run_all(handlers) ◄────┘
//!   │
//!   ├─► DocumentStore.save(collection, document)
//!   │
//!   └─► fire(after-save)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Phases are sequential** - a phase starts only after every task of the
//!    previous phase has settled, including tasks that lost a race to a failure
//! 2. **Vetoes never touch storage** - a `before-*` handler resolving `false`
//!    stops the operation before the storage call
//! 3. **Invalid is not an error** - invalid input is `Ok(false)` with findings
//!    on the record; `Err` is reserved for misconfiguration and failing
//!    collaborators
//! 4. **Validation starts clean** - the error set is cleared at the start of
//!    every [`Record::validate`]
//! 5. **Main scenario is global** - declarations active in [`MAIN_SCENARIO`]
//!    are active in every scenario
//! 6. **Metadata is immutable** - built once per type, shared through `Arc`
//!
//! ## Example
//!
//! ```ignore
//! use tollgate::validators::{Email, Required, Size};
//! use tollgate::{hook_fn, FieldDescriptor, HookContext, LifecycleEvent, MetadataBuilder, Model, Record};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct User {
//!     email: Option<String>,
//!     name: Option<String>,
//!     banned: bool,
//! }
//!
//! impl Model for User {
//!     fn describe(meta: &mut MetadataBuilder<Self>) {
//!         meta.collection("users")
//!             .field(FieldDescriptor::new("email").validate(Required::new()).validate(Email::new()))
//!             .field(FieldDescriptor::new("name").validate(Size::new(2, 64)))
//!             .on(LifecycleEvent::BeforeSave, hook_fn(|user: &HookContext<User>| Ok(!user.model().banned)));
//!     }
//! }
//!
//! let stores = StoreRegistry::builder()
//!     .with_store(MAIN_STORE, Arc::new(PgDocumentStore::new(pool)))?
//!     .build();
//!
//! let mut user = Record::new(User::default()).attach(&stores)?;
//! user.assign(&input)?;
//! if !user.save().await? {
//!     return Err(render(user.errors()));
//! }
//! ```
//!
//! ## What This Is Not
//!
//! Tollgate is **not**:
//! - An ORM or query builder
//! - A schema or index manager
//! - A retry layer (storage failures surface unchanged)

// Core modules
mod combinator;
mod constraint;
mod dispatch;
mod error;
mod errors;
mod event;
mod hook;
mod lifecycle;
mod metadata;
mod record;
mod scenario;
mod sorted;
mod store;
mod validation;

// Built-in constraints
pub mod validators;

// Testing utilities are in the separate tollgate-testing crate

// Concurrency stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export the combinator
pub use combinator::{run_all, run_all_void};

// Re-export error types
pub use crate::error::{Error, ErrorKind, Result, StoreError};
pub use crate::errors::{ErrorSet, ValidationError, GENERAL_ERRORS};

// Re-export model and metadata types
pub use metadata::{metadata, FieldDescriptor, MetadataBuilder, Model, ModelMetadata, SearchMode};
pub use constraint::{Constraint, ConstraintValidator, ValidatorDescriptor};
pub use scenario::{
    Scenario, ScenarioSet, MAIN_SCENARIO, SCENARIO_CREATE, SCENARIO_DELETE, SCENARIO_SEARCH,
    SCENARIO_UPDATE,
};

// Re-export lifecycle types
pub use dispatch::fire;
pub use event::LifecycleEvent;
pub use hook::{hook_fn, FnHook, Hook, HookContext};
pub use record::{Record, IDS_SEARCH_KEY};
pub use sorted::{Direction, Positions, DEFAULT_POSITION_ATTRIBUTE};

// Re-export storage types
pub use store::{
    Condition, Document, DocumentStore, Filter, FindOptions, Patch, SortOrder, StoreRegistry,
    StoreRegistryBuilder, ID_FIELD, MAIN_STORE,
};

// Re-export commonly used external types
pub use async_trait::async_trait;
