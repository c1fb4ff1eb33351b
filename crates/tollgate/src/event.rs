//! Lifecycle events fired around validation and storage operations.

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// A point in a record's lifecycle that handlers can be attached to.
///
/// Events come in before/after pairs. A `before-*` handler resolving `false`
/// vetoes the operation; an `after-*` handler's result becomes the result of
/// the operation where the operation has a boolean outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    BeforeValidate,
    AfterValidate,
    BeforeSave,
    AfterSave,
    BeforeFind,
    AfterFind,
    BeforeCount,
    AfterCount,
    BeforeDelete,
    AfterDelete,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 10] = [
        LifecycleEvent::BeforeValidate,
        LifecycleEvent::AfterValidate,
        LifecycleEvent::BeforeSave,
        LifecycleEvent::AfterSave,
        LifecycleEvent::BeforeFind,
        LifecycleEvent::AfterFind,
        LifecycleEvent::BeforeCount,
        LifecycleEvent::AfterCount,
        LifecycleEvent::BeforeDelete,
        LifecycleEvent::AfterDelete,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::BeforeValidate => "before-validate",
            LifecycleEvent::AfterValidate => "after-validate",
            LifecycleEvent::BeforeSave => "before-save",
            LifecycleEvent::AfterSave => "after-save",
            LifecycleEvent::BeforeFind => "before-find",
            LifecycleEvent::AfterFind => "after-find",
            LifecycleEvent::BeforeCount => "before-count",
            LifecycleEvent::AfterCount => "after-count",
            LifecycleEvent::BeforeDelete => "before-delete",
            LifecycleEvent::AfterDelete => "after-delete",
        }
    }

    /// Legacy camel-case hook name, e.g. `onBeforeSave`.
    pub const fn legacy_name(self) -> &'static str {
        match self {
            LifecycleEvent::BeforeValidate => "onBeforeValidate",
            LifecycleEvent::AfterValidate => "onAfterValidate",
            LifecycleEvent::BeforeSave => "onBeforeSave",
            LifecycleEvent::AfterSave => "onAfterSave",
            LifecycleEvent::BeforeFind => "onBeforeFind",
            LifecycleEvent::AfterFind => "onAfterFind",
            LifecycleEvent::BeforeCount => "onBeforeCount",
            LifecycleEvent::AfterCount => "onAfterCount",
            LifecycleEvent::BeforeDelete => "onBeforeDelete",
            LifecycleEvent::AfterDelete => "onAfterDelete",
        }
    }

    pub const fn is_before(self) -> bool {
        matches!(
            self,
            LifecycleEvent::BeforeValidate
                | LifecycleEvent::BeforeSave
                | LifecycleEvent::BeforeFind
                | LifecycleEvent::BeforeCount
                | LifecycleEvent::BeforeDelete
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        LifecycleEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == name || event.legacy_name() == name)
            .ok_or_else(|| Error::UnknownEvent(name.to_owned()))
    }
}
