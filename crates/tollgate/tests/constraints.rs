//! Built-in constraints exercised through full save flows.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tollgate::validators::{Compare, Email, Min, Required, Size, Unique};
use tollgate::{
    FieldDescriptor, LifecycleEvent, MetadataBuilder, Model, Record, ValidatorDescriptor,
    SCENARIO_CREATE,
};
use tollgate_testing::{CountingHook, MemoryStore, StoreOp};

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Member {
    email: Option<String>,
    tenant: Option<String>,
    handle: Option<String>,
    badge: Option<String>,
}

impl Model for Member {
    fn describe(meta: &mut MetadataBuilder<Self>) {
        meta.collection("members")
            .field(
                FieldDescriptor::new("email")
                    .validate(Email::new())
                    .validate(Unique::new().message("email taken")),
            )
            .field(FieldDescriptor::new("tenant").safe())
            .field(FieldDescriptor::new("handle").validate(Unique::with("tenant")))
            .field(FieldDescriptor::new("badge").validate(Unique::new().null_is_a_value()));
    }
}

fn member(email: &str, tenant: &str, handle: &str) -> Member {
    Member {
        email: Some(email.into()),
        tenant: Some(tenant.into()),
        handle: Some(handle.into()),
        badge: Some(format!("badge-{handle}-{tenant}")),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Account {
    name: Option<String>,
    age: Option<i64>,
    password: Option<String>,
    password_repeat: Option<String>,
}

impl Model for Account {
    fn describe(meta: &mut MetadataBuilder<Self>) {
        meta.collection("accounts")
            .field(
                FieldDescriptor::new("name")
                    .validate(Required::new())
                    .validate(Size::new(2, 8)),
            )
            .field(FieldDescriptor::new("age").validate(Min::new(18)))
            .field(FieldDescriptor::new("password").safe())
            .field(
                FieldDescriptor::new("password_repeat")
                    .not_saved()
                    .constraint(
                        tollgate::Constraint::of(Compare::with("password"))
                            .scenarios([SCENARIO_CREATE]),
                    ),
            );
    }
}

async fn saved(store: &Arc<MemoryStore>, value: Member) -> Record<Member> {
    let mut record = Record::new(value).with_store(store.clone());
    assert!(record.save().await.unwrap(), "{:?}", record.errors());
    record
}

// ============================================================================
// Unique
// ============================================================================

#[tokio::test]
async fn unique_rejects_a_taken_value() {
    let store = Arc::new(MemoryStore::new());
    saved(&store, member("ann@example.com", "t1", "ann")).await;

    let mut dup = Record::new(member("ann@example.com", "t2", "anne")).with_store(store.clone());
    assert!(!dup.save().await.unwrap());

    let errors = dup.errors().get("email");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "email taken");
    assert_eq!(store.len("members"), 1);
}

#[tokio::test]
async fn unique_ignores_the_record_itself() {
    let store = Arc::new(MemoryStore::new());
    let mut record = saved(&store, member("ann@example.com", "t1", "ann")).await;

    record.model_mut().handle = Some("annie".into());
    assert!(record.save().await.unwrap());
    assert_eq!(store.len("members"), 1);
}

#[tokio::test]
async fn unique_combinations_span_the_other_attributes() {
    let store = Arc::new(MemoryStore::new());
    saved(&store, member("a@example.com", "t1", "ann")).await;

    // Same handle, different tenant.
    saved(&store, member("b@example.com", "t2", "ann")).await;

    let mut dup = Record::new(member("c@example.com", "t1", "ann")).with_store(store.clone());
    assert!(!dup.save().await.unwrap());
    let finding = &dup.errors().get("handle")[0];
    assert_eq!(finding.attribute2.as_deref(), Some("tenant"));
}

#[tokio::test]
async fn unique_nulls_follow_the_declaration() {
    let store = Arc::new(MemoryStore::new());

    // `email` does not allow nulls.
    let mut record = Record::new(Member {
        email: None,
        ..member("x@example.com", "t1", "x")
    })
    .with_store(store.clone());
    assert!(!record.save().await.unwrap());
    assert!(record.errors().contains("email"));

    // `badge` treats null as a value: one badgeless member at most.
    saved(
        &store,
        Member {
            badge: None,
            ..member("y@example.com", "t1", "y")
        },
    )
    .await;
    let mut second = Record::new(Member {
        badge: None,
        ..member("z@example.com", "t1", "z")
    })
    .with_store(store.clone());
    assert!(!second.save().await.unwrap());
    assert!(second.errors().contains("badge"));
}

#[tokio::test]
async fn unique_lookups_fire_count_handlers() {
    let store = Arc::new(MemoryStore::new());
    let before_count = CountingHook::passing();
    let mut record = Record::new(member("ann@example.com", "t1", "ann")).with_store(store.clone());
    record.register_hook(LifecycleEvent::BeforeCount, before_count.clone());

    assert!(record.save().await.unwrap());
    assert_eq!(before_count.calls(), 3);
    assert_eq!(store.calls(StoreOp::Count), 3);
}

// ============================================================================
// Field constraints
// ============================================================================

#[tokio::test]
async fn every_failing_constraint_is_reported() {
    let mut record = Record::new(Account {
        name: Some("a-very-long-name".into()),
        age: Some(16),
        password: Some("secret".into()),
        password_repeat: Some("secrets".into()),
    })
    .with_store(Arc::new(MemoryStore::new()));
    record.set_scenario(SCENARIO_CREATE);

    assert!(!record.save().await.unwrap());
    let errors = record.errors();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors.get("name")[0].value.as_deref(), Some("2"));
    assert_eq!(errors.get("name")[0].value2.as_deref(), Some("8"));
    assert!(errors.contains("age"));
    assert_eq!(
        errors.get("password_repeat")[0].attribute2.as_deref(),
        Some("password")
    );
}

#[tokio::test]
async fn create_only_constraints_are_quiet_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let mut record = Record::new(Account {
        name: Some("ann".into()),
        age: Some(30),
        password: Some("secret".into()),
        password_repeat: Some("other".into()),
    })
    .with_store(store.clone());

    assert!(record.save().await.unwrap());
    let stored = &store.documents("accounts")[0];
    assert!(!stored.contains_key("password_repeat"));
}

#[test]
fn descriptors_compare_by_configuration() {
    let record = Record::new(Account::default());
    let meta = record.metadata();

    let name: Vec<ValidatorDescriptor<Account>> = meta.resolve(Some("name"), record.scenario());
    let again = meta.resolve(Some("name"), record.scenario());
    assert_eq!(name.len(), 2);
    assert_eq!(name, again);
    assert_eq!(
        name[1].configuration(),
        Some(serde_json::json!({
            "min": 2,
            "max": 8,
            "allow_empty": false,
            "message": "{tollgate.Size.message}",
        }))
    );
    assert_ne!(name[0], name[1]);
}
