use crate::overlay::DryRunOverlay;
use casekeep_core::SafetyLevel;
use std::collections::HashSet;

/// Relative paths that the safety checker treats as protected.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSets {
    /// Chosen for retention earlier in the same session.
    pub kept: HashSet<String>,
    /// Needed to regenerate reports.
    pub report: HashSet<String>,
    /// Needed to restart the case.
    pub restart: HashSet<String>,
}

/// State for one top-level action. Rebuilt by every `begin`.
#[derive(Debug, Clone)]
pub struct ArchiveSession {
    pub safety: SafetyLevel,
    pub dry_run: bool,
    pub bytes_touched: u64,
    /// Approved deletions, in order.
    pub deleted: Vec<String>,
    pub protected: ProtectedSets,
    /// Mutations skipped by a dry run, as seen by later steps.
    pub overlay: DryRunOverlay,
}

impl ArchiveSession {
    pub fn new(safety: SafetyLevel, dry_run: bool) -> Self {
        Self {
            safety,
            dry_run,
            bytes_touched: 0,
            deleted: Vec::new(),
            protected: ProtectedSets::default(),
            overlay: DryRunOverlay::default(),
        }
    }

    pub fn record_deleted(&mut self, path: &str) {
        if !self.deleted.iter().any(|p| p == path) {
            self.deleted.push(path.to_string());
        }
    }

    pub fn keep(&mut self, path: &str) {
        self.protected.kept.insert(path.to_string());
    }
}

impl Default for ArchiveSession {
    fn default() -> Self {
        Self::new(SafetyLevel::Report, false)
    }
}
