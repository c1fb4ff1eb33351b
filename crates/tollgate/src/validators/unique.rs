use super::{field_only, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::Result;
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use crate::store::{Filter, ID_FIELD};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// No other stored record may share the attribute's value, or the combined
/// values of the attribute and up to two others (`attribute2`, `attribute3`).
///
/// The lookup goes through [`Record::exists`], so count handlers fire, and
/// excludes the record itself once stored. A null among the values is a
/// violation unless `can_be_null`; a permitted null is skipped unless
/// `null_is_a_value`, in which case it is matched as "attribute absent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unique {
    pub attribute2: Option<String>,
    pub attribute3: Option<String>,
    pub can_be_null: bool,
    pub null_is_a_value: bool,
    pub message: String,
}

impl Unique {
    pub fn new() -> Self {
        Self {
            attribute2: None,
            attribute3: None,
            can_be_null: false,
            null_is_a_value: false,
            message: Self::default_message(),
        }
    }

    /// Unique as a pair with `other`.
    pub fn with(other: impl Into<String>) -> Self {
        Self {
            attribute2: Some(other.into()),
            ..Self::new()
        }
    }

    /// Unique as a triple with `second` and `third`.
    pub fn with_pair(second: impl Into<String>, third: impl Into<String>) -> Self {
        Self {
            attribute2: Some(second.into()),
            attribute3: Some(third.into()),
            ..Self::new()
        }
    }

    fn others(&self) -> impl Iterator<Item = &str> {
        self.attribute2.iter().chain(&self.attribute3).map(String::as_str)
    }

    pub fn can_be_null(mut self) -> Self {
        self.can_be_null = true;
        self
    }

    pub fn null_is_a_value(mut self) -> Self {
        self.can_be_null = true;
        self.null_is_a_value = true;
        self
    }

    fn finding(&self, attribute: &str) -> ValidationError {
        let mut finding = ValidationError::on(&self.message, attribute);
        if let Some(second) = &self.attribute2 {
            finding = finding.attribute2(second);
        }
        if let Some(third) = &self.attribute3 {
            finding = finding.attribute3(third);
        }
        finding
    }
}

impl Default for Unique {
    fn default() -> Self {
        Self::new()
    }
}

with_message!(Unique);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Unique {
    fn name(&self) -> &'static str {
        "Unique"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Unique", attribute)?;

        let mut filter = Filter::new();
        let mut saw_null = false;
        for name in std::iter::once(attribute).chain(self.others()) {
            filter = match record.attribute(name)? {
                Some(value) => filter.equals(name, value),
                None => {
                    saw_null = true;
                    filter.missing(name)
                }
            };
        }

        if saw_null {
            if !self.can_be_null {
                return Ok(Some(self.finding(attribute)));
            }
            if !self.null_is_a_value {
                return Ok(None);
            }
        }

        if let Some(id) = record.id() {
            filter = filter.not_equals(ID_FIELD, id);
        }

        let taken = record.exists(&filter).await?;
        Ok(taken.then(|| self.finding(attribute)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use serde_json::json;

    // Paths that never reach the store; lookups are covered by the
    // integration tests.

    #[tokio::test]
    async fn null_is_a_violation_by_default() {
        let record = bag(json!({ "email": null }));

        let finding = Unique::with("tenant")
            .is_valid(&record, Some("email"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.attribute.as_deref(), Some("email"));
        assert_eq!(finding.attribute2.as_deref(), Some("tenant"));
    }

    #[tokio::test]
    async fn triples_name_both_other_attributes() {
        let record = bag(json!({ "email": "ann@example.com", "region": null }));

        let finding = Unique::with_pair("tenant", "region")
            .is_valid(&record, Some("email"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.attribute2.as_deref(), Some("tenant"));
        assert_eq!(finding.attribute3.as_deref(), Some("region"));
    }

    #[tokio::test]
    async fn permitted_null_skips_the_lookup() {
        let record = bag(json!({ "email": "ann@example.com" }));

        // Detached record: reaching the store would fail.
        let finding = Unique::with("tenant")
            .can_be_null()
            .is_valid(&record, Some("email"))
            .await
            .unwrap();
        assert!(finding.is_none());
    }

    #[tokio::test]
    async fn model_level_use_is_rejected() {
        let record = bag(json!({}));

        let err = Unique::new().is_valid(&record, None).await.unwrap_err();
        assert!(err.is_configuration());
    }
}
