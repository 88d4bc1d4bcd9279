pub mod config;
pub mod error;
pub mod retention;
pub mod safety;

pub use config::{ArchiveFormat, ArchiveOpts, ArchiveType, SearchMethod, TarGroups};
pub use error::ConfigError;
pub use retention::{normalize, protect_subset, select, split_for_delete, RetentionOpt, RetentionSpec};
pub use safety::SafetyLevel;

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
