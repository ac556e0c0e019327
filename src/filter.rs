//! Event filtering: global exclude-list and `ChannelVarset` variable allow-list

use std::collections::HashSet;

/// Event type whose variable name is checked against the allow-list
pub const CHANNEL_VARSET: &str = "ChannelVarset";

/// Operator-configured filter sets
///
/// Both sets are built once per configuration snapshot and never mutated;
/// a reload builds a fresh `EventFilter`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    excluded_events: HashSet<String>,
    included_variables: HashSet<String>,
}

impl EventFilter {
    /// Build a filter from the two comma-separated configuration lists
    pub fn from_lists(exclude_events: &str, include_variables: &str) -> Self {
        Self {
            excluded_events: parse_list(exclude_events),
            included_variables: parse_list(include_variables),
        }
    }

    /// Build a filter from explicit sets
    pub fn new(
        excluded_events: impl IntoIterator<Item = impl Into<String>>,
        included_variables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            excluded_events: excluded_events.into_iter().map(Into::into).collect(),
            included_variables: included_variables.into_iter().map(Into::into).collect(),
        }
    }

    /// True iff `event_name` is in the exclude-list
    pub fn is_excluded(&self, event_name: Option<&str>) -> bool {
        if self.excluded_events.is_empty() {
            return false;
        }
        event_name.is_some_and(|name| self.excluded_events.contains(name))
    }

    /// True if the allow-list is empty, otherwise iff `variable` is in it
    pub fn is_variable_included(&self, variable: Option<&str>) -> bool {
        if self.included_variables.is_empty() {
            return true;
        }
        variable.is_some_and(|name| self.included_variables.contains(name))
    }

    pub fn excluded_events(&self) -> &HashSet<String> {
        &self.excluded_events
    }

    pub fn included_variables(&self) -> &HashSet<String> {
        &self.included_variables
    }
}

/// Split a comma-separated list, trimming entries and skipping empty tokens
fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
