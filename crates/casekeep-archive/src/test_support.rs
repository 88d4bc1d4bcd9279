//! Shared fixtures for unit tests.

use crate::archivist::CaseArchivist;
use crate::error::{ArchiveError, Result};
use crate::log::RecordingLog;
use crate::tar::TarTool;
use casekeep_core::{ArchiveFormat, ArchiveOpts};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const BASE_SECS: u64 = 1_000_000_000;

/// Fixed point in time `secs` seconds after the fixture base.
pub fn t(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(BASE_SECS + secs)
}

/// Pin the modification time of a file or folder to `t(secs)`.
pub fn set_mtime(path: &Path, secs: u64) {
    let f = File::open(path).unwrap();
    f.set_times(FileTimes::new().set_modified(t(secs))).unwrap();
}

/// Create `rel` under `root` (with parents) and pin its mtime.
pub fn touch(root: &Path, rel: &str, secs: u64) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, rel.as_bytes()).unwrap();
    set_mtime(&path, secs);
    path
}

/// Relative path -> (is_dir, len, mtime) for every entry under `root`.
pub fn snapshot(root: &Path) -> BTreeMap<String, (bool, u64, SystemTime)> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .map(|e| {
            let meta = e.metadata().unwrap();
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            let len = if meta.is_dir() { 0 } else { meta.len() };
            (rel, (meta.is_dir(), len, meta.modified().unwrap()))
        })
        .collect()
}

/// A case folder at `<tmp>/runs/poweroff/m0.8a4.0` and an empty archive
/// root at `<tmp>/archive`.
pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub case: PathBuf,
    pub archive: PathBuf,
    pub log: RecordingLog,
    pub tar: FakeTar,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let case = tmp.path().join("runs").join("poweroff").join("m0.8a4.0");
        let archive = tmp.path().join("archive");
        std::fs::create_dir_all(&case).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        Self {
            tmp,
            case,
            archive,
            log: RecordingLog::default(),
            tar: FakeTar::default(),
        }
    }

    pub fn touch(&self, rel: &str, secs: u64) -> PathBuf {
        touch(&self.case, rel, secs)
    }

    pub fn archive_case_dir(&self) -> PathBuf {
        self.archive.join("poweroff").join("m0.8a4.0")
    }

    /// Archivist wired to this fixture's archive root, log and tar fake.
    pub fn archivist(&self, mut opts: ArchiveOpts) -> CaseArchivist {
        opts.archive_folder = self.archive.to_string_lossy().into_owned();
        CaseArchivist::new(opts, &self.case, self.tmp.path())
            .unwrap()
            .with_logger(self.log.clone())
            .with_tar(self.tar.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TarCall {
    Tar {
        cwd: PathBuf,
        dest: PathBuf,
        members: Vec<String>,
    },
    Untar {
        cwd: PathBuf,
        tarball: PathBuf,
    },
}

/// Tar collaborator that records calls and writes a placeholder bundle.
/// With `fail` set it leaves a truncated bundle behind and errors.
#[derive(Clone, Default)]
pub struct FakeTar {
    pub calls: Rc<RefCell<Vec<TarCall>>>,
    pub fail: Rc<Cell<bool>>,
}

impl FakeTar {
    pub fn calls(&self) -> Vec<TarCall> {
        self.calls.borrow().clone()
    }

    pub fn tar_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, TarCall::Tar { .. }))
            .count()
    }
}

impl TarTool for FakeTar {
    fn tar(&self, cwd: &Path, dest: &Path, members: &[String], _format: ArchiveFormat) -> Result<()> {
        self.calls.borrow_mut().push(TarCall::Tar {
            cwd: cwd.to_path_buf(),
            dest: dest.to_path_buf(),
            members: members.to_vec(),
        });
        if self.fail.get() {
            std::fs::write(dest, "trunc")?;
            return Err(ArchiveError::ExternalCommand {
                command: "tar".to_string(),
                status: "exit status: 2".to_string(),
            });
        }
        std::fs::write(dest, members.join("\n"))?;
        Ok(())
    }

    fn untar(&self, cwd: &Path, tarball: &Path, _format: ArchiveFormat) -> Result<()> {
        self.calls.borrow_mut().push(TarCall::Untar {
            cwd: cwd.to_path_buf(),
            tarball: tarball.to_path_buf(),
        });
        Ok(())
    }
}
