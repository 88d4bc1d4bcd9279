use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// How conservative destructive actions are.
///
/// Levels are ordered `none < status < report < restart`; each level protects
/// everything the levels below it protect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// No checks at all.
    None,
    /// Protect case status files and anything already kept this session.
    Status,
    /// Also protect files needed to regenerate reports.
    Report,
    /// Also flag files needed to restart the case.
    Restart,
}

impl SafetyLevel {
    pub const ALL: [SafetyLevel; 4] = [
        SafetyLevel::None,
        SafetyLevel::Status,
        SafetyLevel::Report,
        SafetyLevel::Restart,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SafetyLevel::None => "none",
            SafetyLevel::Status => "status",
            SafetyLevel::Report => "report",
            SafetyLevel::Restart => "restart",
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SafetyLevel {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SafetyLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownSafetyLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(SafetyLevel::None < SafetyLevel::Status);
        assert!(SafetyLevel::Status < SafetyLevel::Report);
        assert!(SafetyLevel::Report < SafetyLevel::Restart);
    }

    #[test]
    fn parse_round_trip() {
        for level in SafetyLevel::ALL {
            assert_eq!(level.to_string().parse::<SafetyLevel>().unwrap(), level);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "archive".parse::<SafetyLevel>().unwrap_err();
        assert!(err.to_string().contains("'archive'"));
    }
}
