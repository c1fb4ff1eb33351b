//! Validation scenarios.

use std::borrow::Cow;
use std::fmt;

/// Name of the scenario every record starts in. Declarations listing it are
/// active in all scenarios.
pub const MAIN_SCENARIO: &str = "MAIN";

/// Scenario names used by the persistence layer by convention.
pub const SCENARIO_CREATE: &str = "create";
pub const SCENARIO_UPDATE: &str = "update";
pub const SCENARIO_DELETE: &str = "delete";
pub const SCENARIO_SEARCH: &str = "search";

/// A named validation and assignment context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scenario(Cow<'static, str>);

impl Scenario {
    pub const fn main() -> Self {
        Scenario(Cow::Borrowed(MAIN_SCENARIO))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Scenario(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_main(&self) -> bool {
        self.0 == MAIN_SCENARIO
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario::main()
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Scenario {
    fn from(name: &'static str) -> Self {
        Scenario(Cow::Borrowed(name))
    }
}

impl From<String> for Scenario {
    fn from(name: String) -> Self {
        Scenario(Cow::Owned(name))
    }
}

impl PartialEq<str> for Scenario {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Scenario {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The scenarios a declaration is active in.
///
/// Defaults to `[MAIN]`, which makes the declaration active everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScenarioSet(Vec<Scenario>);

impl ScenarioSet {
    pub fn new<I, S>(scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scenario>,
    {
        ScenarioSet(scenarios.into_iter().map(Into::into).collect())
    }

    /// Active when the set names `scenario` or the main scenario.
    pub fn includes(&self, scenario: &Scenario) -> bool {
        self.0.iter().any(|s| s == scenario || s.is_main())
    }

    pub fn as_slice(&self) -> &[Scenario] {
        &self.0
    }
}

impl Default for ScenarioSet {
    fn default() -> Self {
        ScenarioSet(vec![Scenario::main()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_is_active_in_every_scenario() {
        let set = ScenarioSet::default();

        for name in ["MAIN", "create", "anything-else", ""] {
            assert!(set.includes(&Scenario::from(name.to_string())), "{name}");
        }
    }

    #[test]
    fn explicit_set_is_active_only_where_listed() {
        let set = ScenarioSet::new(["signup"]);

        assert!(set.includes(&"signup".into()));
        assert!(!set.includes(&Scenario::main()));
        assert!(!set.includes(&"update".into()));
    }

    #[test]
    fn listing_main_alongside_others_stays_global() {
        let set = ScenarioSet::new([MAIN_SCENARIO, "signup"]);

        assert!(set.includes(&"update".into()));
    }

    #[test]
    fn empty_set_is_active_nowhere() {
        assert!(!ScenarioSet::new(Vec::<Scenario>::new()).includes(&Scenario::main()));
    }
}
