//! Built-in constraint validators.
//!
//! All of them apply to fields only; declaring one on the model fails
//! validation with [`Error::ConstraintNotValidInModel`]. Unless documented
//! otherwise a missing or null attribute is valid, so combine with
//! [`Required`] where presence matters.
//!
//! Each validator carries a `message` (a message key by default) that ends up
//! in the [`ValidationError`](crate::ValidationError) it reports.

mod boolean;
mod bounds;
mod compare;
mod pattern;
mod required;
mod size;
mod temporal;
mod unique;

pub use boolean::{AssertFalse, AssertTrue};
pub use bounds::{DecimalMax, DecimalMin, Digits, Max, Min};
pub use compare::Compare;
pub use pattern::{Email, Pattern, EMAIL_PATTERN};
pub use required::Required;
pub use size::Size;
pub use temporal::{Future, Past};
pub use unique::Unique;

use crate::error::{Error, Result};
use serde_json::Value;

/// The attribute a field-only validator runs on.
fn field_only<'a>(validator: &'static str, attribute: Option<&'a str>) -> Result<&'a str> {
    attribute.ok_or_else(|| Error::ConstraintNotValidInModel {
        constraint: validator.to_owned(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn message_key(validator: &str) -> String {
    format!("{{tollgate.{validator}.message}}")
}

/// Implements the `message` builder and the default message key.
macro_rules! with_message {
    ($($validator:ident),+ $(,)?) => {
        $(
            impl $validator {
                pub fn message(mut self, message: impl Into<String>) -> Self {
                    self.message = message.into();
                    self
                }

                pub(crate) fn default_message() -> String {
                    $crate::validators::message_key(stringify!($validator))
                }
            }
        )+
    };
}

pub(crate) use with_message;
