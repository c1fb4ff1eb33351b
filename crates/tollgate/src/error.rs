//! Error types for tollgate.
//!
//! Every fallible operation returns [`Error`]. Invalid *input* is not an error:
//! [`Record::validate`](crate::Record::validate) and
//! [`Record::save`](crate::Record::save) report it as `Ok(false)` with the
//! record's error set populated. [`Error::kind`] tells a misconfigured model
//! apart from a failing collaborator.

use crate::errors::ErrorSet;
use crate::event::LifecycleEvent;
use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The model, its metadata, or the way it is wired is wrong.
    Configuration,
    /// The record holds invalid data (only produced by opt-in strict calls).
    Validation,
    /// Storage, serialization, or a user-supplied handler failed.
    Collaborator,
}

/// Failure reported by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection `{0}` does not exist")]
    UnknownCollection(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("constraint `{constraint}` does not declare any scenarios")]
    ConstraintWithoutScenarios { constraint: String },

    #[error("constraint `{constraint}` cannot be applied to the model; attach it to an attribute")]
    ConstraintNotValidInModel { constraint: String },

    #[error("validator `{validator}` does not support the type of attribute `{attribute}`: {reason}")]
    UnsupportedAttributeType {
        validator: &'static str,
        attribute: String,
        reason: String,
    },

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown lifecycle event `{0}`")]
    UnknownEvent(String),

    #[error("model `{0}` has no collection configured")]
    NoCollection(&'static str),

    #[error("record of model `{0}` is not attached to a store")]
    Detached(&'static str),

    #[error("operation requires a stored record but `{0}` is a new record")]
    NewRecord(&'static str),

    #[error("store `{0}` is not initialized")]
    StoreNotInitialized(String),

    #[error("store `{0}` is already registered")]
    DuplicateStore(String),

    #[error("before-count handlers of `{0}` rejected the count")]
    CountRejected(&'static str),

    #[error("handlers of `{0}` run on a shared record and cannot write attributes")]
    ReadOnlyEvent(LifecycleEvent),

    #[error("record failed validation with {} error(s)", .0.len())]
    Invalid(ErrorSet),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("document mapping failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Handler(anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConstraintWithoutScenarios { .. }
            | Error::ConstraintNotValidInModel { .. }
            | Error::UnsupportedAttributeType { .. }
            | Error::InvalidPattern { .. }
            | Error::UnknownEvent(_)
            | Error::NoCollection(_)
            | Error::Detached(_)
            | Error::NewRecord(_)
            | Error::StoreNotInitialized(_)
            | Error::DuplicateStore(_)
            | Error::CountRejected(_)
            | Error::ReadOnlyEvent(_) => ErrorKind::Configuration,
            Error::Invalid(_) => ErrorKind::Validation,
            Error::Store(_) | Error::Serialization(_) | Error::Handler(_) => {
                ErrorKind::Collaborator
            }
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub(crate) fn unsupported_type(
        validator: &'static str,
        attribute: &str,
        reason: impl Into<String>,
    ) -> Self {
        Error::UnsupportedAttributeType {
            validator,
            attribute: attribute.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Handler failures that already carry a tollgate [`Error`] are unwrapped so the
/// original cause reaches the caller unchanged.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Error::Handler(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
