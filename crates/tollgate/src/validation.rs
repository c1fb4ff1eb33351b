//! The validation engine.
//!
//! ```text
//!   clear errors
//!        │
//!   before-validate ──false──▶ FAILED
//!        │ true
//!        ▼
//!   ┌──────────────────┐   ┌───────────────────────────┐
//!   │ model validators │ ║ │ per safe field validators │   (concurrent)
//!   └──────────────────┘   └───────────────────────────┘
//!        │ all settled
//!   errors? ──yes──▶ FAILED
//!        │ no
//!   after-validate ──▶ PASSED / FAILED
//! ```
//!
//! Any handler or validator failure ends in ERRORED (`Err`), after every
//! validator that was started has settled. Findings from validators that
//! completed are kept on the record either way.

use crate::combinator::run_all_void;
use crate::dispatch::fire;
use crate::error::Result;
use crate::errors::ErrorSet;
use crate::event::LifecycleEvent;
use crate::metadata::Model;
use crate::record::Record;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info_span, Instrument};

impl<M: Model> Record<M> {
    /// Validates the record in its current scenario.
    ///
    /// `Ok(true)` means valid, `Ok(false)` invalid (see
    /// [`errors`](Record::errors)) or vetoed by a handler.
    pub async fn validate(&mut self) -> Result<bool> {
        let span = info_span!(
            "validate",
            model = self.meta.model_name(),
            scenario = %self.scenario,
        );
        self.run_validation().instrument(span).await
    }

    async fn run_validation(&mut self) -> Result<bool> {
        self.errors.clear();

        if !fire(LifecycleEvent::BeforeValidate, self).await? {
            debug!("before-validate vetoed");
            return Ok(false);
        }

        let sink = Mutex::new(ErrorSet::new());
        let outcome = self.collect_findings(&sink).await;
        let findings = sink.into_inner().unwrap_or_else(PoisonError::into_inner);
        self.errors.merge(findings);
        outcome?;

        if self.has_errors() {
            debug!(errors = self.errors.len(), "validation failed");
            return Ok(false);
        }

        fire(LifecycleEvent::AfterValidate, self).await
    }

    /// Runs model-level and field-level validators concurrently.
    async fn collect_findings(&self, sink: &Mutex<ErrorSet>) -> Result<()> {
        let scenario = &self.scenario;
        let model_level = self.meta.resolve(None, scenario);

        let model_checks = run_all_void(
            model_level
                .iter()
                .map(|descriptor| descriptor.check(self, None, sink)),
        );

        let field_checks = run_all_void(self.meta.safe_fields(scenario).map(|field| {
            let descriptors = self.meta.resolve(Some(field.name()), scenario);
            async move {
                run_all_void(
                    descriptors
                        .iter()
                        .map(|descriptor| descriptor.check(self, Some(field.name()), sink)),
                )
                .await
            }
        }));

        let (model_result, field_result) = futures::join!(model_checks, field_checks);
        model_result.and(field_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, ConstraintValidator};
    use crate::errors::{ValidationError, GENERAL_ERRORS};
    use crate::hook::{hook_fn, HookContext};
    use crate::metadata::{FieldDescriptor, MetadataBuilder};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Ticket {
        title: String,
        seats: u32,
    }

    /// Fails when the ticket has no seats; reports on the model.
    #[derive(Serialize)]
    struct HasSeats;

    #[async_trait]
    impl ConstraintValidator<Ticket> for HasSeats {
        async fn is_valid(
            &self,
            record: &Record<Ticket>,
            _: Option<&str>,
        ) -> Result<Option<ValidationError>> {
            Ok((record.model().seats == 0).then(|| ValidationError::new("no seats")))
        }
    }

    #[derive(Serialize)]
    struct NonBlank;

    #[async_trait]
    impl ConstraintValidator<Ticket> for NonBlank {
        async fn is_valid(
            &self,
            record: &Record<Ticket>,
            attribute: Option<&str>,
        ) -> Result<Option<ValidationError>> {
            let blank = record.model().title.trim().is_empty();
            Ok(blank.then(|| ValidationError::on("blank", attribute.unwrap_or_default())))
        }
    }

    #[derive(Serialize)]
    struct Broken;

    #[async_trait]
    impl ConstraintValidator<Ticket> for Broken {
        async fn is_valid(
            &self,
            _: &Record<Ticket>,
            _: Option<&str>,
        ) -> Result<Option<ValidationError>> {
            Err(anyhow::anyhow!("lookup service down").into())
        }
    }

    impl Model for Ticket {
        fn describe(meta: &mut MetadataBuilder<Self>) {
            meta.field(FieldDescriptor::new("title").validate(NonBlank))
                .field(
                    FieldDescriptor::new("seats")
                        .constraint(Constraint::of(Broken).scenarios(["audit"])),
                )
                .constraint(Constraint::of(HasSeats));
        }
    }

    #[tokio::test]
    async fn findings_are_filed_by_attribute() {
        let mut record = Record::new(Ticket::default());

        assert!(!record.validate().await.unwrap());
        assert_eq!(record.errors().get("title")[0].message, "blank");
        assert_eq!(record.errors().get(GENERAL_ERRORS)[0].message, "no seats");
    }

    #[tokio::test]
    async fn stale_errors_are_cleared() {
        let mut record = Record::new(Ticket {
            title: "Gig".into(),
            seats: 2,
        });
        record.add_error("title", ValidationError::new("stale"));

        assert!(record.validate().await.unwrap());
        assert!(!record.has_errors());
    }

    #[tokio::test]
    async fn validator_failure_errors_but_keeps_completed_findings() {
        let mut record = Record::new(Ticket::default());
        record.set_scenario("audit");

        let err = record.validate().await.unwrap_err();
        assert_eq!(err.to_string(), "lookup service down");
        assert!(record.errors().contains("title"));
        assert!(record.errors().contains(GENERAL_ERRORS));
    }

    #[tokio::test]
    async fn after_validate_decides_a_clean_record() {
        let mut record = Record::new(Ticket {
            title: "Gig".into(),
            seats: 2,
        });
        record.register_hook(LifecycleEvent::AfterValidate, hook_fn(|_: &HookContext<Ticket>| Ok(false)));

        assert!(!record.validate().await.unwrap());
        assert!(!record.has_errors());
    }
}
