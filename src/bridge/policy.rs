//! Per-agent capability allow-lists.

use std::collections::{BTreeSet, HashSet};

/// Which capabilities an agent may use.
///
/// `AllowAll` comes from an absent policy; `AllowOnly` with an empty set
/// permits nothing. The two must never be conflated.
///
/// Entries are matched against both names of a capability. A bare entry
/// such as `search` authorizes that capability on every provider, including
/// providers added later. A qualified entry such as `docs.search` authorizes
/// it on that one provider only, so prefer qualified names when the
/// allow-list should be precise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgentToolPolicy {
    #[default]
    AllowAll,
    AllowOnly(BTreeSet<String>),
}

impl AgentToolPolicy {
    pub fn allow_only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowOnly(names.into_iter().map(Into::into).collect())
    }

    pub fn deny_all() -> Self {
        Self::AllowOnly(BTreeSet::new())
    }

    /// A capability passes if its qualified or its bare name is listed.
    ///
    /// See the type docs: a bare entry matches on every provider.
    pub fn permits(&self, qualified: &str, bare: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::AllowOnly(names) => names.contains(qualified) || names.contains(bare),
        }
    }
}

impl From<Option<HashSet<String>>> for AgentToolPolicy {
    fn from(names: Option<HashSet<String>>) -> Self {
        match names {
            None => Self::AllowAll,
            Some(names) => Self::AllowOnly(names.into_iter().collect()),
        }
    }
}

/// Supplies the allow-list for an agent.
pub trait AgentPolicySource: Send + Sync {
    /// `None` means every capability is permitted; an empty set means none.
    fn allowed_tool_names_for(&self, agent_id: &str) -> Option<HashSet<String>>;

    fn policy_for(&self, agent_id: &str) -> AgentToolPolicy {
        self.allowed_tool_names_for(agent_id).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_policies_differ() {
        let all = AgentToolPolicy::from(None);
        let none = AgentToolPolicy::from(Some(HashSet::new()));

        assert!(all.permits("docs.search", "search"));
        assert!(!none.permits("docs.search", "search"));
        assert_ne!(all, none);
    }

    #[test]
    fn matches_qualified_or_bare_name() {
        let policy = AgentToolPolicy::allow_only(["docs.search", "fetch"]);
        assert!(policy.permits("docs.search", "search"));
        assert!(policy.permits("web.fetch", "fetch"));
        assert!(!policy.permits("web.search", "search"));
    }

    #[test]
    fn bare_entry_spans_providers_but_qualified_entry_does_not() {
        let bare = AgentToolPolicy::allow_only(["search"]);
        assert!(bare.permits("docs.search", "search"));
        assert!(bare.permits("web.search", "search"));

        let precise = AgentToolPolicy::allow_only(["docs.search"]);
        assert!(precise.permits("docs.search", "search"));
        assert!(!precise.permits("web.search", "search"));
    }
}
