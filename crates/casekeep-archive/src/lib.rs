pub mod archivist;
pub mod error;
pub mod log;
pub mod overlay;
pub mod paths;
pub mod phases;
pub mod safety;
pub mod search;
pub mod session;
pub mod stat;
pub mod tar;

#[cfg(test)]
pub(crate) mod test_support;

pub use archivist::CaseArchivist;
pub use error::{ArchiveError, Result};
pub use log::{ArchiveLog, CaseLog, RecordingLog, TracingLog};
pub use overlay::DryRunOverlay;
pub use paths::CasePaths;
pub use safety::{SafetyChecker, Verdict, PROTECTED_PATTERNS};
pub use search::{search, MatchGroups};
pub use session::{ArchiveSession, ProtectedSets};
pub use tar::{SystemTar, TarTool};
