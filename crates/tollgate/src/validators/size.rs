use super::{field_only, type_name, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::{Error, Result};
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Length bounds for strings (in characters), arrays and maps.
///
/// Findings carry `value = min` and `value2 = max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub min: usize,
    pub max: usize,
    /// Accept a length of zero regardless of `min`.
    pub allow_empty: bool,
    pub message: String,
}

impl Size {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max,
            allow_empty: false,
            message: Self::default_message(),
        }
    }

    pub fn min(min: usize) -> Self {
        Self::new(min, usize::MAX)
    }

    pub fn max(max: usize) -> Self {
        Self::new(0, max)
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    fn accepts(&self, len: usize) -> bool {
        (self.allow_empty && len == 0) || (self.min..=self.max).contains(&len)
    }
}

with_message!(Size);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Size {
    fn name(&self) -> &'static str {
        "Size"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Size", attribute)?;
        let len = match record.attribute(attribute)? {
            None => return Ok(None),
            Some(Value::String(s)) => s.chars().count(),
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(entries)) => entries.len(),
            Some(other) => {
                return Err(Error::unsupported_type(
                    "Size",
                    attribute,
                    format!("expected string, array or map, found {}", type_name(&other)),
                ))
            }
        };

        Ok((!self.accepts(len)).then(|| {
            ValidationError::on(&self.message, attribute)
                .value(self.min)
                .value2(self.max)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use serde_json::json;

    #[tokio::test]
    async fn measures_strings_arrays_and_maps() {
        let record = bag(json!({
            "name": "Zoë",
            "tags": ["a", "b", "c", "d"],
            "meta": { "k": 1, "j": 2 },
        }));
        let size = Size::new(2, 3);

        assert!(size.is_valid(&record, Some("name")).await.unwrap().is_none());
        assert!(size.is_valid(&record, Some("meta")).await.unwrap().is_none());

        let finding = size.is_valid(&record, Some("tags")).await.unwrap().unwrap();
        assert_eq!(finding.attribute.as_deref(), Some("tags"));
        assert_eq!(finding.value.as_deref(), Some("2"));
        assert_eq!(finding.value2.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn allow_empty_bypasses_min() {
        let record = bag(json!({ "bio": "" }));

        assert!(Size::min(10)
            .is_valid(&record, Some("bio"))
            .await
            .unwrap()
            .is_some());
        assert!(Size::min(10)
            .allow_empty()
            .is_valid(&record, Some("bio"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn numbers_are_not_measurable() {
        let record = bag(json!({ "age": 3 }));

        let err = Size::max(2)
            .is_valid(&record, Some("age"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAttributeType { validator: "Size", .. }));
    }
}
