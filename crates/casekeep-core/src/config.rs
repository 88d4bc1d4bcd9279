use crate::error::ConfigError;
use crate::retention::RetentionOpt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name looked up by [`find_config`].
pub const CONFIG_FILE: &str = "casekeep.yaml";

/// Tar groups: bundle name (without extension) -> member patterns.
pub type TarGroups = BTreeMap<String, RetentionOpt>;

/// Whether a case archives into its own folder or shares its group folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveType {
    /// One archive folder per case group; the case itself is a bundle.
    #[default]
    Full,
    /// Full per-case folder under the archive root.
    Sub,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    #[default]
    Tar,
    Gzip,
    Bz2,
    Zip,
}

impl ArchiveFormat {
    /// File extension, including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => ".tar",
            ArchiveFormat::Gzip => ".tgz",
            ArchiveFormat::Bz2 => ".tbz2",
            ArchiveFormat::Zip => ".zip",
        }
    }

    /// Command prefix that creates a bundle; followed by dest and members.
    pub fn archive_cmd(self) -> &'static [&'static str] {
        match self {
            ArchiveFormat::Tar => &["tar", "-cf"],
            ArchiveFormat::Gzip => &["tar", "-czf"],
            ArchiveFormat::Bz2 => &["tar", "-cjf"],
            ArchiveFormat::Zip => &["zip", "-r"],
        }
    }

    /// Command prefix that unpacks a bundle; followed by the bundle path.
    pub fn unarchive_cmd(self) -> &'static [&'static str] {
        match self {
            ArchiveFormat::Tar => &["tar", "-xf"],
            ArchiveFormat::Gzip => &["tar", "-xzf"],
            ArchiveFormat::Bz2 => &["tar", "-xjf"],
            ArchiveFormat::Zip => &["unzip", "-o"],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Wildcards per path level, one unlabeled group.
    #[default]
    Glob,
    /// Regex per path level, grouped by capture values.
    Regex,
}

/// Per-case archiving options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOpts {
    pub archive_folder: String,
    pub archive_type: ArchiveType,
    pub archive_format: ArchiveFormat,
    pub search_method: SearchMethod,

    // while the job may still be running
    pub progress_archive_files: RetentionOpt,
    pub progress_tar_groups: TarGroups,
    /// Folders bundled next to themselves, then removed.
    pub progress_tar_dirs: RetentionOpt,
    pub progress_delete_files: RetentionOpt,
    pub progress_update_files: RetentionOpt,
    pub progress_delete_dirs: RetentionOpt,

    // before copying to the archive
    pub pre_delete_files: RetentionOpt,
    pub pre_update_files: RetentionOpt,
    pub pre_delete_dirs: RetentionOpt,
    pub pre_tar_groups: TarGroups,
    pub pre_tar_dirs: RetentionOpt,

    pub archive_files: RetentionOpt,

    // after copying to the archive
    pub post_tar_groups: TarGroups,
    pub post_tar_dirs: RetentionOpt,
    pub post_delete_files: RetentionOpt,
    pub post_update_files: RetentionOpt,
    pub post_delete_dirs: RetentionOpt,

    pub skeleton_files: RetentionOpt,
    pub skeleton_dirs: RetentionOpt,
    pub skeleton_tail_files: RetentionOpt,
    /// Folders bundled before the skeleton sweep; the bundles are kept.
    pub skeleton_tar_dirs: RetentionOpt,

    /// Files required to restart the case without unarchiving.
    pub restart_files: RetentionOpt,
    /// Files required to regenerate reports.
    pub report_files: RetentionOpt,
}

impl ArchiveOpts {
    /// Parse options from YAML (or JSON) text.
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read and parse an options file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    /// Absolute archive root. Relative folders resolve against `base`.
    pub fn archive_root(&self, base: &Path) -> Result<PathBuf, ConfigError> {
        if self.archive_folder.trim().is_empty() {
            return Err(ConfigError::NoArchiveFolder);
        }
        let folder = Path::new(&self.archive_folder);
        if folder.is_absolute() {
            Ok(folder.to_path_buf())
        } else {
            Ok(base.join(folder))
        }
    }

    /// Append the archive extension to `name` unless already present.
    pub fn tar_name(&self, name: &str) -> String {
        let ext = self.archive_format.extension();
        if name.ends_with(ext) {
            name.to_string()
        } else {
            format!("{name}{ext}")
        }
    }
}

/// Walk up from `start` looking for [`CONFIG_FILE`].
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = start.to_path_buf();
    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !cur.pop() {
            return None;
        }
    }
}

/// Find and load the options file governing `case_dir`.
pub fn discover(case_dir: &Path) -> Result<(PathBuf, ArchiveOpts), ConfigError> {
    let path = find_config(case_dir).ok_or_else(|| ConfigError::NotFound(case_dir.to_path_buf()))?;
    let opts = ArchiveOpts::load(&path)?;
    Ok((path, opts))
}
