use super::{field_only, type_name, with_message};
use crate::constraint::ConstraintValidator;
use crate::error::{Error, Result};
use crate::errors::ValidationError;
use crate::metadata::Model;
use crate::record::Record;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Address shape accepted by [`Email`] unless overridden.
pub const EMAIL_PATTERN: &str =
    r"[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}";

const EMAIL_MAX_LEN: usize = 254;

fn full_match(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })
}

/// Reads a string attribute; `None` when absent.
fn string_attribute<M: Model>(
    validator: &'static str,
    record: &Record<M>,
    attribute: &str,
) -> Result<Option<String>> {
    match record.attribute(attribute)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(Error::unsupported_type(
            validator,
            attribute,
            format!("expected string, found {}", type_name(&other)),
        )),
    }
}

/// The whole string must match `regexp`. Findings carry `value = regexp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub regexp: String,
    pub case_insensitive: bool,
    pub message: String,
}

impl Pattern {
    pub fn new(regexp: impl Into<String>) -> Self {
        Self {
            regexp: regexp.into(),
            case_insensitive: false,
            message: Self::default_message(),
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

with_message!(Pattern);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Pattern {
    fn name(&self) -> &'static str {
        "Pattern"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Pattern", attribute)?;
        let regex = full_match(&self.regexp, self.case_insensitive)?;
        let Some(text) = string_attribute("Pattern", record, attribute)? else {
            return Ok(None);
        };

        Ok((!regex.is_match(&text))
            .then(|| ValidationError::on(&self.message, attribute).value(&self.regexp)))
    }
}

/// A well-formed e-mail address of at most 254 characters. Empty is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub pattern: String,
    pub message: String,
}

impl Email {
    pub fn new() -> Self {
        Self {
            pattern: EMAIL_PATTERN.to_owned(),
            message: Self::default_message(),
        }
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }
}

impl Default for Email {
    fn default() -> Self {
        Self::new()
    }
}

with_message!(Email);

#[async_trait]
impl<M: Model> ConstraintValidator<M> for Email {
    fn name(&self) -> &'static str {
        "Email"
    }

    async fn is_valid(
        &self,
        record: &Record<M>,
        attribute: Option<&str>,
    ) -> Result<Option<ValidationError>> {
        let attribute = field_only("Email", attribute)?;
        let regex = full_match(&self.pattern, false)?;
        let address = match string_attribute("Email", record, attribute)? {
            Some(address) if !address.is_empty() => address,
            _ => return Ok(None),
        };

        let valid = address.chars().count() <= EMAIL_MAX_LEN && regex.is_match(&address);
        Ok((!valid).then(|| ValidationError::on(&self.message, attribute)))
    }
}
