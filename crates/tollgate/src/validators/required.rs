use super::{field_only, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::Result;
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The attribute must be present, non-null and not an empty string.
///
/// Fields carrying it are reported by
/// [`ModelMetadata::required_fields`](crate::ModelMetadata::required_fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Required {
    pub message: String,
}

impl Required {
    pub fn new() -> Self {
        Self {
            message: Self::default_message(),
        }
    }
}

impl Default for Required {
    fn default() -> Self {
        Self::new()
    }
}

with_message!(Required);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Required {
    fn name(&self) -> &'static str {
        "Required"
    }

    fn is_required_kind(&self) -> bool {
        true
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Required", attribute)?;
        let missing = match record.attribute(attribute)? {
            None => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        Ok(missing.then(|| ValidationError::on(&self.message, attribute)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use serde_json::json;

    #[tokio::test]
    async fn empty_values_are_missing() {
        let record = bag(json!({ "a": null, "b": "", "c": "x", "d": 0, "e": [] }));

        for (attribute, missing) in [
            ("a", true),
            ("b", true),
            ("c", false),
            ("d", false),
            ("e", false),
            ("absent", true),
        ] {
            let finding = Required::new()
                .is_valid(&record, Some(attribute))
                .await
                .unwrap();
            assert_eq!(finding.is_some(), missing, "{attribute}");
        }
    }

    #[tokio::test]
    async fn model_level_use_is_rejected() {
        let record = bag(json!({}));

        let err = Required::new().is_valid(&record, None).await.unwrap_err();
        assert!(err.is_configuration());
    }
}
