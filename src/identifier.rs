//! Reserved navigation identifiers
//!
//! Skip targets are plain strings. A few values are reserved and are interpreted by
//! the navigator instead of being looked up as step identifiers.

use serde::{Deserialize, Serialize};

/// Navigation targets with special meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReservedIdentifier {
    /// End the whole task
    Exit,
    /// Skip only the step being evaluated
    NextStep,
    /// Leave the enclosing section
    NextSection,
}

impl ReservedIdentifier {
    pub const ALL: [ReservedIdentifier; 3] = [
        ReservedIdentifier::Exit,
        ReservedIdentifier::NextStep,
        ReservedIdentifier::NextSection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedIdentifier::Exit => "exit",
            ReservedIdentifier::NextStep => "nextStep",
            ReservedIdentifier::NextSection => "nextSection",
        }
    }

    /// Parse a skip target, returning `None` for ordinary step identifiers
    pub fn parse(identifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == identifier)
    }

    pub fn is_reserved(identifier: &str) -> bool {
        Self::parse(identifier).is_some()
    }
}

impl PartialEq<ReservedIdentifier> for str {
    fn eq(&self, other: &ReservedIdentifier) -> bool {
        self == other.as_str()
    }
}

impl PartialEq<ReservedIdentifier> for String {
    fn eq(&self, other: &ReservedIdentifier) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::fmt::Display for ReservedIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reserved() {
        assert_eq!(ReservedIdentifier::parse("exit"), Some(ReservedIdentifier::Exit));
        assert_eq!(
            ReservedIdentifier::parse("nextSection"),
            Some(ReservedIdentifier::NextSection)
        );
        assert_eq!(ReservedIdentifier::parse("intro"), None);
    }

    #[test]
    fn test_string_comparison() {
        let target = String::from("nextStep");
        assert!(target == ReservedIdentifier::NextStep);
        assert!("exit".to_string() == ReservedIdentifier::Exit);
        assert!(target != ReservedIdentifier::NextSection);
    }
}
