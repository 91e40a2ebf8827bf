//! Target normalization.

/// Hosts a playbook runs against: a pattern or an explicit host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Pattern(String),
    Hosts(Vec<String>),
}

impl Target {
    /// Collapse the target into the single pattern string the engine expects.
    ///
    /// Host lists are joined with `,`; patterns pass through unchanged.
    pub fn to_pattern(&self) -> String {
        match self {
            Target::Pattern(pattern) => pattern.clone(),
            Target::Hosts(hosts) => hosts.join(","),
        }
    }
}

impl From<&str> for Target {
    fn from(pattern: &str) -> Self {
        Target::Pattern(pattern.to_string())
    }
}

impl From<String> for Target {
    fn from(pattern: String) -> Self {
        Target::Pattern(pattern)
    }
}

impl From<Vec<String>> for Target {
    fn from(hosts: Vec<String>) -> Self {
        Target::Hosts(hosts)
    }
}

impl From<&[&str]> for Target {
    fn from(hosts: &[&str]) -> Self {
        Target::Hosts(hosts.iter().map(|h| (*h).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_lists_are_joined_with_commas() {
        let target = Target::from(&["h1", "h2"][..]);
        assert_eq!(target.to_pattern(), "h1,h2");
    }

    #[test]
    fn patterns_pass_through() {
        assert_eq!(Target::from("web:&prod").to_pattern(), "web:&prod");
    }

    #[test]
    fn empty_host_list_is_empty_pattern() {
        assert_eq!(Target::Hosts(Vec::new()).to_pattern(), "");
    }
}
