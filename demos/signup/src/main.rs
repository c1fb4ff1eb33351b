//! # Signup Example
//!
//! A user model guarded by declarative constraints and lifecycle handlers,
//! stored in memory. Shows scenario-dependent validation, uniqueness through
//! the store, handler vetoes, and the hook-aware bulk delete.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tollgate::validators::{AssertTrue, Compare, Email, Min, Required, Size, Unique};
use tollgate::{
    hook_fn, Constraint, Document, FieldDescriptor, Filter, HookContext, LifecycleEvent,
    MetadataBuilder, Model, Record, SearchMode, StoreRegistry, MAIN_STORE, SCENARIO_CREATE,
};
use tollgate_testing::MemoryStore;

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct User {
    email: Option<String>,
    name: Option<String>,
    age: Option<i64>,
    password: Option<String>,
    password_repeat: Option<String>,
    accepted_terms: Option<bool>,
}

impl Model for User {
    fn describe(meta: &mut MetadataBuilder<Self>) {
        meta.collection("users")
            .field(
                FieldDescriptor::new("email")
                    .searchable(SearchMode::pattern())
                    .validate(Required::new())
                    .validate(Email::new())
                    .validate(Unique::new().message("email is already registered")),
            )
            .field(
                FieldDescriptor::new("name")
                    .searchable(SearchMode::Exact)
                    .validate(Size::new(2, 64)),
            )
            .field(FieldDescriptor::new("age").validate(Min::new(13)))
            .field(
                FieldDescriptor::new("password").constraint(
                    Constraint::of(Required::new()).scenarios([SCENARIO_CREATE]),
                ),
            )
            .field(
                FieldDescriptor::new("password_repeat")
                    .not_saved()
                    .constraint(Constraint::of(Compare::with("password")).scenarios([SCENARIO_CREATE])),
            )
            .field(
                FieldDescriptor::new("accepted_terms")
                    .not_saved()
                    .constraint(Constraint::of(AssertTrue::new()).scenarios([SCENARIO_CREATE])),
            )
            // Throwaway mailboxes never reach storage.
            .on(
                LifecycleEvent::BeforeSave,
                hook_fn(|user: &HookContext<User>| {
                    let email = user.model().email.as_deref().unwrap_or_default();
                    Ok(!email.ends_with("@mailinator.com"))
                }),
            )
            .on(
                LifecycleEvent::AfterSave,
                hook_fn(|user: &HookContext<User>| {
                    println!("  welcome mail queued for {:?}", user.model().email);
                    Ok(true)
                }),
            );
    }
}

fn input(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

async fn sign_up(stores: &StoreRegistry, form: Value) -> Result<Option<Record<User>>> {
    let mut user = Record::new(User::default()).attach(stores)?;
    user.set_scenario(SCENARIO_CREATE);
    user.assign(&input(form))?;

    if user.save().await? {
        println!("  saved as {}", user.id().unwrap_or("?"));
        return Ok(Some(user));
    }
    if user.has_errors() {
        for (attribute, errors) in user.errors().iter() {
            for error in errors {
                println!("  {attribute}: {}", error.message);
            }
        }
    } else {
        println!("  rejected by a before-save handler");
    }
    Ok(None)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let stores = StoreRegistry::builder()
        .with_store(MAIN_STORE, store.clone())?
        .build();

    let forms = vec![
        json!({
            "email": "ada@example.com", "name": "Ada", "age": 36,
            "password": "engine", "password_repeat": "engine", "accepted_terms": true
        }),
        json!({
            "email": "ada@example.com", "name": "Ada II", "age": 36,
            "password": "engine", "password_repeat": "engine", "accepted_terms": true
        }),
        json!({
            "email": "not-an-email", "name": "B", "age": 9,
            "password": "x", "password_repeat": "y"
        }),
        json!({
            "email": "grace@mailinator.com", "name": "Grace", "age": 45,
            "password": "cobol", "password_repeat": "cobol", "accepted_terms": true
        }),
        json!({
            "email": "grace@example.com", "name": "Grace", "age": 45,
            "password": "cobol", "password_repeat": "cobol", "accepted_terms": true
        }),
    ];

    for form in forms {
        println!("Signing up {}", form["email"]);
        sign_up(&stores, form).await?;
    }

    // Search through a query record; pattern fields match case-insensitively.
    let query = Record::new(User::default()).attach(&stores)?;
    let filter = query.search_filter(&input(json!({ "email": "EXAMPLE" })));
    println!("Users matching \"EXAMPLE\": {}", query.count(&filter).await?);

    // Updates run in the main scenario: the create-only checks stay quiet.
    if let Some(mut ada) = query.find(&Filter::new().equals("name", "Ada")).await? {
        ada.assign(&input(json!({ "name": "Ada Lovelace" })))?;
        println!("Renamed Ada: {}", ada.save().await?);
    }

    let leftovers = query.delete_all_after_find_all(&Filter::new(), None).await?;
    println!(
        "Deleted everyone, {} kept, {} left in storage",
        leftovers.len(),
        store.len("users")
    );

    Ok(())
}
