use super::{field_only, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::Result;
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The attribute must equal another attribute, e.g. a password confirmation.
///
/// Both absent is valid; one absent is not. Findings carry the other
/// attribute as `attribute2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compare {
    pub attribute: String,
    pub message: String,
}

impl Compare {
    pub fn with(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            message: Self::default_message(),
        }
    }
}

with_message!(Compare);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Compare {
    fn name(&self) -> &'static str {
        "Compare"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Compare", attribute)?;
        let left = record.attribute(attribute)?;
        let right = record.attribute(&self.attribute)?;

        Ok((left != right).then(|| {
            ValidationError::on(&self.message, attribute).attribute2(&self.attribute)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use serde_json::json;

    #[tokio::test]
    async fn matches_other_attribute() {
        let check = Compare::with("confirmation");

        let same = bag(json!({ "password": "hunter2", "confirmation": "hunter2" }));
        assert!(check.is_valid(&same, Some("password")).await.unwrap().is_none());

        let neither = bag(json!({}));
        assert!(check.is_valid(&neither, Some("password")).await.unwrap().is_none());

        let one_sided = bag(json!({ "password": "hunter2" }));
        let finding = check
            .is_valid(&one_sided, Some("password"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.attribute2.as_deref(), Some("confirmation"));
    }
}
