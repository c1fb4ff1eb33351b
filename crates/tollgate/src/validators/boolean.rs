use super::{field_only, type_name, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::{Error, Result};
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Null counts as a violation for both assertions.
async fn assert_bool<M: Model>(
    validator: &'static str,
    expected: bool,
    message: &str,
    record: &Record<M>,
    attribute: Option<&str>,
) -> Result<Option<ValidationError>> {
    let attribute = field_only(validator, attribute)?;
    let holds = match record.attribute(attribute)? {
        None => false,
        Some(Value::Bool(b)) => b == expected,
        Some(other) => {
            return Err(Error::unsupported_type(
                validator,
                attribute,
                format!("expected boolean, found {}", type_name(&other)),
            ))
        }
    };
    Ok((!holds).then(|| ValidationError::on(message, attribute)))
}

/// The attribute must be `true`, e.g. accepted terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertTrue {
    pub message: String,
}

impl AssertTrue {
    pub fn new() -> Self {
        Self {
            message: Self::default_message(),
        }
    }
}

impl Default for AssertTrue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertFalse {
    pub message: String,
}

impl AssertFalse {
    pub fn new() -> Self {
        Self {
            message: Self::default_message(),
        }
    }
}

impl Default for AssertFalse {
    fn default() -> Self {
        Self::new()
    }
}

with_message!(AssertTrue, AssertFalse);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for AssertTrue {
    fn name(&self) -> &'static str {
        "AssertTrue"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        assert_bool("AssertTrue", true, &self.message, record, attribute).await
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for AssertFalse {
    fn name(&self) -> &'static str {
        "AssertFalse"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        assert_bool("AssertFalse", false, &self.message, record, attribute).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use serde_json::json;

    #[tokio::test]
    async fn booleans_and_null() {
        let record = bag(json!({ "yes": true, "no": false, "unset": null, "text": "true" }));

        assert!(AssertTrue::new().is_valid(&record, Some("yes")).await.unwrap().is_none());
        assert!(AssertTrue::new().is_valid(&record, Some("no")).await.unwrap().is_some());
        assert!(AssertTrue::new().is_valid(&record, Some("unset")).await.unwrap().is_some());
        assert!(AssertFalse::new().is_valid(&record, Some("no")).await.unwrap().is_none());
        assert!(AssertFalse::new().is_valid(&record, Some("unset")).await.unwrap().is_some());
        assert!(AssertTrue::new().is_valid(&record, Some("text")).await.is_err());
    }
}
