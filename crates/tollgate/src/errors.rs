//! Validation findings collected on a record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error-set key for findings that are not tied to one attribute.
pub const GENERAL_ERRORS: &str = "GENERAL_ERRORS";

/// One validation finding.
///
/// `attribute2`/`attribute3` name the other attributes of multi-attribute
/// constraints (uniqueness across fields, comparisons). `value`/`value2` carry
/// constraint parameters for message interpolation, such as size bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attribute: None,
            attribute2: None,
            attribute3: None,
            value: None,
            value2: None,
        }
    }

    pub fn on(message: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(message).attribute(attribute)
    }

    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn attribute2(mut self, attribute: impl Into<String>) -> Self {
        self.attribute2 = Some(attribute.into());
        self
    }

    pub fn attribute3(mut self, attribute: impl Into<String>) -> Self {
        self.attribute3 = Some(attribute.into());
        self
    }

    pub fn value(mut self, value: impl ToString) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn value2(mut self, value: impl ToString) -> Self {
        self.value2 = Some(value.to_string());
        self
    }
}

/// Findings keyed by attribute name, in insertion order per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorSet {
    entries: BTreeMap<String, Vec<ValidationError>>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: impl Into<String>, error: ValidationError) {
        self.entries.entry(attribute.into()).or_default().push(error);
    }

    /// Adds a plain message under `attribute`.
    pub fn add_message(&mut self, attribute: &str, message: impl Into<String>) {
        self.add(attribute, ValidationError::on(message, attribute));
    }

    /// Adds model-level findings under [`GENERAL_ERRORS`].
    pub fn add_general(&mut self, error: ValidationError) {
        self.add(GENERAL_ERRORS, error);
    }

    pub fn merge(&mut self, other: ErrorSet) {
        for (attribute, errors) in other.entries {
            self.entries.entry(attribute).or_default().extend(errors);
        }
    }

    pub fn get(&self, attribute: &str) -> &[ValidationError] {
        self.entries
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn general(&self) -> &[ValidationError] {
        self.get(GENERAL_ERRORS)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        !self.get(attribute).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Total number of findings across all attributes.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ValidationError])> {
        self.entries
            .iter()
            .map(|(attribute, errors)| (attribute.as_str(), errors.as_slice()))
    }

    /// All findings flattened, attribute order first.
    pub fn to_vec(&self) -> Vec<ValidationError> {
        self.entries.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_group_under_their_attribute() {
        let mut set = ErrorSet::new();
        set.add_message("email", "required");
        set.add("email", ValidationError::on("malformed", "email"));
        set.add_general(ValidationError::new("account locked"));

        assert_eq!(set.len(), 3);
        assert_eq!(set.get("email").len(), 2);
        assert_eq!(set.general()[0].message, "account locked");
        assert!(!set.contains("name"));
    }

    #[test]
    fn serializes_as_attribute_map() {
        let mut set = ErrorSet::new();
        set.add(
            "name",
            ValidationError::on("too short", "name").value(3).value2(20),
        );

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["name"][0]["value"], "3");
        assert_eq!(json["name"][0]["value2"], "20");
        assert!(json["name"][0].get("attribute2").is_none());
    }
}
