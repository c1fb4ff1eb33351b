use super::{field_only, type_name, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::{Error, Result};
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Reads an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
fn instant_attribute<M: Model>(
    validator: &'static str,
    record: &Record<M>,
    attribute: &str,
) -> Result<Option<DateTime<Utc>>> {
    let text = match record.attribute(attribute)? {
        None => return Ok(None),
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(Error::unsupported_type(
                validator,
                attribute,
                format!("expected timestamp string, found {}", type_name(&other)),
            ))
        }
    };

    if let Ok(instant) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Some(midnight.and_utc()))
        .ok_or_else(|| {
            Error::unsupported_type(validator, attribute, format!("`{text}` is not a timestamp"))
        })
}

async fn compare_to_now<M: Model>(
    validator: &'static str,
    wanted: Ordering,
    message: &str,
    record: &Record<M>,
    attribute: Option<&str>,
) -> Result<Option<ValidationError>> {
    let attribute = field_only(validator, attribute)?;
    let Some(instant) = instant_attribute(validator, record, attribute)? else {
        return Ok(None);
    };
    let holds = instant.cmp(&Utc::now()) == wanted;
    Ok((!holds).then(|| ValidationError::on(message, attribute)))
}

/// The timestamp must lie before now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Past {
    pub message: String,
}

impl Past {
    pub fn new() -> Self {
        Self {
            message: Self::default_message(),
        }
    }
}

impl Default for Past {
    fn default() -> Self {
        Self::new()
    }
}

/// The timestamp must lie after now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Future {
    pub message: String,
}

impl Future {
    pub fn new() -> Self {
        Self {
            message: Self::default_message(),
        }
    }
}

impl Default for Future {
    fn default() -> Self {
        Self::new()
    }
}

with_message!(Past, Future);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Past {
    fn name(&self) -> &'static str {
        "Past"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        compare_to_now("Past", Ordering::Less, &self.message, record, attribute).await
    }
}

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Future {
    fn name(&self) -> &'static str {
        "Future"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        compare_to_now("Future", Ordering::Greater, &self.message, record, attribute).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::bag;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn past_and_future_relative_to_now() {
        let yesterday = (Utc::now() - Duration::days(1)).to_rfc3339();
        let tomorrow = (Utc::now() + Duration::days(1)).to_rfc3339();
        let record = bag(json!({
            "born": "1990-04-01",
            "yesterday": yesterday,
            "tomorrow": tomorrow,
        }));

        assert!(Past::new().is_valid(&record, Some("born")).await.unwrap().is_none());
        assert!(Past::new().is_valid(&record, Some("yesterday")).await.unwrap().is_none());
        assert!(Past::new().is_valid(&record, Some("tomorrow")).await.unwrap().is_some());
        assert!(Future::new().is_valid(&record, Some("tomorrow")).await.unwrap().is_none());
        assert!(Future::new().is_valid(&record, Some("born")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unparsable_values_are_unsupported() {
        let record = bag(json!({ "when": "next tuesday", "epoch": 0 }));

        assert!(Past::new().is_valid(&record, Some("when")).await.is_err());
        assert!(Past::new().is_valid(&record, Some("epoch")).await.is_err());
        assert!(Past::new().is_valid(&record, Some("absent")).await.unwrap().is_none());
    }
}
