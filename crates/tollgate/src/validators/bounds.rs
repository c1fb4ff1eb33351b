use super::{field_only, type_name, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::{Error, Result};
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

fn integer_attribute<M: Model>(
    validator: &'static str,
    record: &Record<M>,
    attribute: &str,
) -> Result<Option<i64>> {
    match record.attribute(attribute)? {
        None => Ok(None),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
            // u64 beyond i64 saturates; it exceeds every configurable bound anyway.
            Ok(Some(n.as_i64().unwrap_or(i64::MAX)))
        }
        Some(other) => Err(Error::unsupported_type(
            validator,
            attribute,
            format!("expected integer, found {}", type_name(&other)),
        )),
    }
}

fn decimal_attribute<M: Model>(
    validator: &'static str,
    record: &Record<M>,
    attribute: &str,
) -> Result<Option<Decimal>> {
    let text = match record.attribute(attribute)? {
        None => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(Error::unsupported_type(
                validator,
                attribute,
                format!("expected number or numeric string, found {}", type_name(&other)),
            ))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|e| Error::unsupported_type(validator, attribute, e.to_string()))
}

fn within(ordering: Ordering, wanted: Ordering, inclusive: bool) -> bool {
    ordering == wanted || (inclusive && ordering == Ordering::Equal)
}

/// Integer lower bound, inclusive by default. Findings carry `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Min {
    pub value: i64,
    pub inclusive: bool,
    pub message: String,
}

impl Min {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            inclusive: true,
            message: Self::default_message(),
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
}

/// Integer upper bound, inclusive by default. Findings carry `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Max {
    pub value: i64,
    pub inclusive: bool,
    pub message: String,
}

impl Max {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            inclusive: true,
            message: Self::default_message(),
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
}

/// Decimal lower bound on numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalMin {
    pub value: Decimal,
    pub inclusive: bool,
    pub message: String,
}

impl DecimalMin {
    pub fn new(value: Decimal) -> Self {
        Self {
            value,
            inclusive: true,
            message: Self::default_message(),
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
}

/// Decimal upper bound on numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalMax {
    pub value: Decimal,
    pub inclusive: bool,
    pub message: String,
}

impl DecimalMax {
    pub fn new(value: Decimal) -> Self {
        Self {
            value,
            inclusive: true,
            message: Self::default_message(),
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
}

/// At most `integer` integral digits and `fraction` fractional digits.
///
/// Findings carry `value = integer` and `value2 = fraction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digits {
    pub integer: usize,
    pub fraction: usize,
    pub message: String,
}

impl Digits {
    pub fn new(integer: usize, fraction: usize) -> Self {
        Self {
            integer,
            fraction,
            message: Self::default_message(),
        }
    }

    fn accepts(&self, text: &str) -> bool {
        let unsigned = text.trim_start_matches(['-', '+']);
        let (integral, fractional) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        integral.len() <= self.integer && fractional.len() <= self.fraction
    }
}

with_message!(Min, Max, DecimalMin, DecimalMax, Digits);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Min {
    fn name(&self) -> &'static str {
        "Min"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Min", attribute)?;
        let Some(n) = integer_attribute("Min", record, attribute)? else {
            return Ok(None);
        };
        let valid = within(n.cmp(&self.value), Ordering::Greater, self.inclusive);
        Ok((!valid).then(|| ValidationError::on(&self.message, attribute).value(self.value)))
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Max {
    fn name(&self) -> &'static str {
        "Max"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Max", attribute)?;
        let Some(n) = integer_attribute("Max", record, attribute)? else {
            return Ok(None);
        };
        let valid = within(n.cmp(&self.value), Ordering::Less, self.inclusive);
        Ok((!valid).then(|| ValidationError::on(&self.message, attribute).value(self.value)))
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for DecimalMin {
    fn name(&self) -> &'static str {
        "DecimalMin"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("DecimalMin", attribute)?;
        let Some(n) = decimal_attribute("DecimalMin", record, attribute)? else {
            return Ok(None);
        };
        let valid = within(n.cmp(&self.value), Ordering::Greater, self.inclusive);
        Ok((!valid).then(|| ValidationError::on(&self.message, attribute).value(self.value)))
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for DecimalMax {
    fn name(&self) -> &'static str {
        "DecimalMax"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("DecimalMax", attribute)?;
        let Some(n) = decimal_attribute("DecimalMax", record, attribute)? else {
            return Ok(None);
        };
        let valid = within(n.cmp(&self.value), Ordering::Less, self.inclusive);
        Ok((!valid).then(|| ValidationError::on(&self.message, attribute).value(self.value)))
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Digits {
    fn name(&self) -> &'static str {
        "Digits"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Digits", attribute)?;
        let text = match record.attribute(attribute)? {
            None => return Ok(None),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(Error::unsupported_type(
                    "Digits",
                    attribute,
                    format!("expected number or numeric string, found {}", type_name(&other)),
                ))
            }
        };

        Ok((!self.accepts(&text)).then(|| {
            ValidationError::on(&self.message, attribute)
                .value(self.integer)
                .value2(self.fraction)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use serde_json::json;

    #[tokio::test]
    async fn integer_bounds_respect_inclusiveness() {
        let record = bag(json!({ "age": 18 }));

        assert!(Min::new(18).is_valid(&record, Some("age")).await.unwrap().is_none());
        assert!(Min::new(18)
            .exclusive()
            .is_valid(&record, Some("age"))
            .await
            .unwrap()
            .is_some());
        assert!(Max::new(18).is_valid(&record, Some("age")).await.unwrap().is_none());

        let finding = Max::new(17)
            .is_valid(&record, Some("age"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.value.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn integer_bounds_reject_other_types() {
        let record = bag(json!({ "ratio": 0.5, "label": "5" }));

        assert!(Min::new(0).is_valid(&record, Some("ratio")).await.is_err());
        assert!(Max::new(9).is_valid(&record, Some("label")).await.is_err());
        assert!(Max::new(9).is_valid(&record, Some("absent")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decimal_bounds_accept_numeric_strings() {
        let record = bag(json!({ "price": "19.99", "weight": 0.25, "junk": "abc" }));
        let floor = DecimalMin::new(Decimal::new(1999, 2));

        assert!(floor.is_valid(&record, Some("price")).await.unwrap().is_none());
        assert!(floor
            .clone()
            .exclusive()
            .is_valid(&record, Some("price"))
            .await
            .unwrap()
            .is_some());
        assert!(DecimalMax::new(Decimal::new(2, 1))
            .is_valid(&record, Some("weight"))
            .await
            .unwrap()
            .is_some());
        assert!(floor.is_valid(&record, Some("junk")).await.is_err());
    }

    #[tokio::test]
    async fn digits_count_both_sides_of_the_point() {
        let record = bag(json!({ "amount": "-123.45", "tight": 1234.5, "whole": 99 }));
        let check = Digits::new(3, 2);

        assert!(check.is_valid(&record, Some("amount")).await.unwrap().is_none());
        assert!(check.is_valid(&record, Some("whole")).await.unwrap().is_none());

        let finding = check
            .is_valid(&record, Some("tight"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.value.as_deref(), Some("3"));
        assert_eq!(finding.value2.as_deref(), Some("2"));
    }
}
