use crate::error::{ArchiveError, Result};
use casekeep_core::ArchiveType;
use std::path::{Path, PathBuf};

/// Where a case lives locally and where its archive lives.
#[derive(Debug, Clone)]
pub struct CasePaths {
    pub root_dir: PathBuf,
    pub casename: String,
    pub archive_root: PathBuf,
    pub archive_type: ArchiveType,
}

/// `<group>/<case>` from the last two components of `root_dir`.
pub fn default_casename(root_dir: &Path) -> String {
    let name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned());
    match (root_dir.parent().and_then(name), name(root_dir)) {
        (Some(group), Some(case)) => format!("{group}/{case}"),
        (None, Some(case)) => case,
        _ => String::new(),
    }
}

fn assert_relative(name: &str) -> Result<()> {
    if Path::new(name).has_root() || Path::new(name).is_absolute() {
        return Err(ArchiveError::AbsolutePath(name.to_string()));
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl CasePaths {
    pub fn new(root_dir: &Path, archive_root: &Path, archive_type: ArchiveType) -> Self {
        let root_dir = absolute(root_dir);
        Self {
            casename: default_casename(&root_dir),
            root_dir,
            archive_root: absolute(archive_root),
            archive_type,
        }
    }

    pub fn with_casename(mut self, casename: impl Into<String>) -> Self {
        self.casename = casename.into();
        self
    }

    /// Absolute path of `name` inside the case folder.
    pub fn local_path(&self, name: &str) -> Result<PathBuf> {
        assert_relative(name)?;
        Ok(self.root_dir.join(name))
    }

    /// Absolute path of `name` inside the case's archive folder.
    pub fn archive_path(&self, name: &str) -> Result<PathBuf> {
        assert_relative(name)?;
        Ok(self.archive_case_dir().join(name))
    }

    pub fn archive_case_dir(&self) -> PathBuf {
        self.casename
            .split('/')
            .filter(|p| !p.is_empty())
            .fold(self.archive_root.clone(), |acc, p| acc.join(p))
    }

    /// Case name levels created under the archive root. A `full` archive
    /// stops one level short since the case is stored as bundles inside
    /// its group folder.
    pub fn archive_dir_parts(&self) -> Vec<&str> {
        let mut parts: Vec<&str> = self.casename.split('/').filter(|p| !p.is_empty()).collect();
        if self.archive_type == ArchiveType::Full {
            parts.pop();
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(kind: ArchiveType) -> CasePaths {
        CasePaths::new(
            Path::new("/work/poweroff/m0.8a4.0"),
            Path::new("/archive/project"),
            kind,
        )
    }

    #[test]
    fn casename_is_last_two_levels() {
        assert_eq!(paths(ArchiveType::Sub).casename, "poweroff/m0.8a4.0");
        assert_eq!(default_casename(Path::new("/case")), "case");
    }

    #[test]
    fn resolves_relative_names() {
        let p = paths(ArchiveType::Sub);
        assert_eq!(
            p.local_path("fm/wing.dat").unwrap(),
            PathBuf::from("/work/poweroff/m0.8a4.0/fm/wing.dat")
        );
        assert_eq!(
            p.archive_path("fm.tar").unwrap(),
            PathBuf::from("/archive/project/poweroff/m0.8a4.0/fm.tar")
        );
    }

    #[test]
    fn absolute_names_always_rejected() {
        let p = paths(ArchiveType::Sub);
        for name in ["/etc/passwd", "/work/poweroff/m0.8a4.0/q.100", "/"] {
            assert!(matches!(p.local_path(name), Err(ArchiveError::AbsolutePath(_))));
            assert!(matches!(p.archive_path(name), Err(ArchiveError::AbsolutePath(_))));
        }
    }

    #[test]
    fn full_archive_creates_one_fewer_level() {
        assert_eq!(paths(ArchiveType::Sub).archive_dir_parts(), ["poweroff", "m0.8a4.0"]);
        assert_eq!(paths(ArchiveType::Full).archive_dir_parts(), ["poweroff"]);
    }

    #[test]
    fn casename_override() {
        let p = paths(ArchiveType::Sub).with_casename("grp/c1");
        assert_eq!(p.archive_case_dir(), PathBuf::from("/archive/project/grp/c1"));
    }
}
