//! Constraint declarations and the validators behind them.

use crate::error::{Error, Result};
use crate::errors::{ErrorSet, ValidationError, GENERAL_ERRORS};
use crate::metadata::Model;
use crate::record::Record;
use crate::scenario::{Scenario, ScenarioSet};
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Checks one attribute (or the whole record) of a model.
///
/// Validators are plain serde structs: their serialized form is their
/// configuration, which is what makes two [`ValidatorDescriptor`]s equal.
///
/// `attribute` is `None` when the constraint is declared on the model rather
/// than on a field; findings are then filed under
/// [`GENERAL_ERRORS`](crate::GENERAL_ERRORS).
///
/// Return `Ok(Some(_))` for invalid data and `Err(_)` only when the check
/// itself could not run.
#[async_trait]
pub trait ConstraintValidator<M: Model>: erased_serde::Serialize + Send + Sync {
    /// Stable name of the implementation.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether a constraint backed by this validator makes its field required.
    fn is_required_kind(&self) -> bool {
        false
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>>;
}

erased_serde::serialize_trait_object!(<M> ConstraintValidator<M> where M: Model);

/// A named constraint: ordered validators plus the scenarios it is active in.
pub struct Constraint<M: Model> {
    name: Cow<'static, str>,
    scenarios: Option<ScenarioSet>,
    validated_by: Vec<Arc<dyn ConstraintValidator<M>>>,
    required_kind: bool,
}

impl<M: Model> Constraint<M> {
    /// A constraint named after `validator`, active in every scenario.
    pub fn of(validator: impl ConstraintValidator<M> + 'static) -> Self {
        let name = short_name(validator.name());
        Self::named(name).validated_by(validator)
    }

    /// A constraint with no validators yet.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            scenarios: Some(ScenarioSet::default()),
            validated_by: Vec::new(),
            required_kind: false,
        }
    }

    pub fn validated_by(mut self, validator: impl ConstraintValidator<M> + 'static) -> Self {
        self.required_kind |= validator.is_required_kind();
        self.validated_by.push(Arc::new(validator));
        self
    }

    /// Restricts the constraint to the listed scenarios.
    pub fn scenarios<I, S>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scenario>,
    {
        self.scenarios = Some(ScenarioSet::new(scenarios));
        self
    }

    /// Removes the scenario list altogether.
    ///
    /// Such a constraint is misconfigured and never resolves; it exists so
    /// metadata loaded from untyped sources can express the broken case.
    pub fn without_scenarios(mut self) -> Self {
        self.scenarios = None;
        self
    }

    /// Marks fields carrying this constraint as required.
    pub fn required_kind(mut self) -> Self {
        self.required_kind = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required_kind(&self) -> bool {
        self.required_kind
    }

    pub fn scenario_set(&self) -> Option<&ScenarioSet> {
        self.scenarios.as_ref()
    }

    /// Whether the constraint resolves in `scenario`. Misconfigured
    /// constraints are never active.
    pub fn is_active_in(&self, scenario: &Scenario) -> bool {
        self.scenarios
            .as_ref()
            .is_some_and(|set| set.includes(scenario))
    }

    /// One descriptor per validator when active in `scenario`, none otherwise.
    pub fn descriptors(&self, scenario: &Scenario) -> Result<Vec<ValidatorDescriptor<M>>> {
        let set = self
            .scenarios
            .as_ref()
            .ok_or_else(|| Error::ConstraintWithoutScenarios {
                constraint: self.name.to_string(),
            })?;
        if !set.includes(scenario) {
            return Ok(Vec::new());
        }
        Ok(self
            .validated_by
            .iter()
            .map(|validator| ValidatorDescriptor {
                validator: Arc::clone(validator),
                scenario: scenario.clone(),
            })
            .collect())
    }
}

impl<M: Model> Clone for Constraint<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            scenarios: self.scenarios.clone(),
            validated_by: self.validated_by.clone(),
            required_kind: self.required_kind,
        }
    }
}

impl<M: Model> fmt::Debug for Constraint<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("scenarios", &self.scenarios)
            .field("validators", &self.validated_by.len())
            .field("required_kind", &self.required_kind)
            .finish()
    }
}

/// A validator resolved for one scenario.
pub struct ValidatorDescriptor<M: Model> {
    validator: Arc<dyn ConstraintValidator<M>>,
    scenario: Scenario,
}

impl<M: Model> ValidatorDescriptor<M> {
    pub fn validator(&self) -> &dyn ConstraintValidator<M> {
        &*self.validator
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// The validator's configuration as JSON.
    pub fn configuration(&self) -> Option<serde_json::Value> {
        serde_json::to_value(&*self.validator).ok()
    }

    /// Runs the validator and files any finding into `sink`.
    pub(crate) async fn check(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
        sink: &Mutex<ErrorSet>,
    ) -> Result<()> {
        if let Some(finding) = self.validator.is_valid(record, attribute).await? {
            let key = attribute.unwrap_or(GENERAL_ERRORS);
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .add(key, finding);
        }
        Ok(())
    }
}

impl<M: Model> Clone for ValidatorDescriptor<M> {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
            scenario: self.scenario.clone(),
        }
    }
}

/// Structural: same implementation, same configuration, same scenario.
impl<M: Model> PartialEq for ValidatorDescriptor<M> {
    fn eq(&self, other: &Self) -> bool {
        if self.validator.name() != other.validator.name() || self.scenario != other.scenario {
            return false;
        }
        match (self.configuration(), other.configuration()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<M: Model> fmt::Debug for ValidatorDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorDescriptor")
            .field("validator", &self.validator.name())
            .field("configuration", &self.configuration())
            .field("scenario", &self.scenario)
            .finish()
    }
}

fn short_name(type_name: &'static str) -> &'static str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBuilder;
    use serde::{Deserialize, Serialize};

    #[derive(Default, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    impl Model for Note {
        fn describe(_: &mut MetadataBuilder<Self>) {}
    }

    #[derive(Serialize)]
    struct MaxLen {
        max: usize,
    }

    #[async_trait]
    impl ConstraintValidator<Note> for MaxLen {
        async fn is_valid(
            &self,
            _: &Record<Note>,
            _: Option<&str>,
        ) -> Result<Option<ValidationError>> {
            Ok(None)
        }
    }

    #[test]
    fn constraint_is_named_after_its_validator() {
        let constraint = Constraint::<Note>::of(MaxLen { max: 3 });

        assert_eq!(constraint.name(), "MaxLen");
        assert!(!constraint.is_required_kind());
    }

    #[test]
    fn descriptors_compare_structurally() {
        let scenario = Scenario::main();
        let a = Constraint::<Note>::of(MaxLen { max: 3 }).descriptors(&scenario).unwrap();
        let b = Constraint::<Note>::of(MaxLen { max: 3 }).descriptors(&scenario).unwrap();
        let c = Constraint::<Note>::of(MaxLen { max: 4 }).descriptors(&scenario).unwrap();
        let d = Constraint::<Note>::of(MaxLen { max: 3 })
            .descriptors(&"create".into())
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn inactive_constraints_yield_nothing() {
        let constraint = Constraint::<Note>::of(MaxLen { max: 3 }).scenarios(["signup"]);

        assert!(constraint.descriptors(&"update".into()).unwrap().is_empty());
        assert_eq!(constraint.descriptors(&"signup".into()).unwrap().len(), 1);
    }

    #[test]
    fn constraint_without_scenarios_is_a_configuration_error() {
        let constraint = Constraint::<Note>::of(MaxLen { max: 3 }).without_scenarios();

        let err = constraint.descriptors(&Scenario::main()).unwrap_err();
        assert!(err.is_configuration());
        assert!(!constraint.is_active_in(&Scenario::main()));
    }
}
