//! Safety checker: decides whether a path may be deleted.

use crate::error::{ArchiveError, Result};
use crate::session::ProtectedSets;
use casekeep_core::SafetyLevel;
use regex::Regex;
use std::fmt;

/// Files never deleted at `status` level or above: the case's persistent
/// settings and numbered run logs.
pub const PROTECTED_PATTERNS: &[&str] = &["case.json", "run.[0-9][0-9]+.[0-9]+"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    ProtectedFile,
    PreviouslyKept,
    RequiredForReports,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockReason::ProtectedFile => "protected file",
            BlockReason::PreviouslyKept => "previously kept file",
            BlockReason::RequiredForReports => "required for reports",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// The path is needed to restart the case. Reported, but deletion is
    /// still allowed at every level.
    RestartRequired,
    Block(BlockReason),
}

impl Verdict {
    pub fn allowed(self) -> bool {
        !matches!(self, Verdict::Block(_))
    }
}

#[derive(Debug, Clone)]
pub struct SafetyChecker {
    level: SafetyLevel,
    protected: Vec<Regex>,
}

impl SafetyChecker {
    pub fn new(level: SafetyLevel) -> Result<Self> {
        Self::with_patterns(level, PROTECTED_PATTERNS)
    }

    /// Checker with a custom protected-pattern table. Patterns must match
    /// the whole relative path.
    pub fn with_patterns(level: SafetyLevel, patterns: &[&str]) -> Result<Self> {
        let protected = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$")).map_err(|source| ArchiveError::Regex {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { level, protected })
    }

    pub fn level(&self) -> SafetyLevel {
        self.level
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|re| re.is_match(path))
    }

    pub fn check(&self, path: &str, sets: &ProtectedSets) -> Verdict {
        if self.level == SafetyLevel::None {
            return Verdict::Allow;
        }
        if self.is_protected(path) {
            return Verdict::Block(BlockReason::ProtectedFile);
        }
        if sets.kept.contains(path) {
            return Verdict::Block(BlockReason::PreviouslyKept);
        }
        if self.level == SafetyLevel::Status {
            return Verdict::Allow;
        }
        if sets.report.contains(path) {
            return Verdict::Block(BlockReason::RequiredForReports);
        }
        if self.level == SafetyLevel::Report {
            return Verdict::Allow;
        }
        if sets.restart.contains(path) {
            return Verdict::RestartRequired;
        }
        Verdict::Allow
    }
}
