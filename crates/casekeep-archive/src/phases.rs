//! Top-level actions. Each runs its steps in a fixed order since later
//! steps depend on what earlier ones copied or removed.

use crate::archivist::CaseArchivist;
use crate::error::Result;
use crate::overlay::Kind;
use crate::search::STATE_DIR;
use casekeep_core::{select, RetentionOpt, SafetyLevel, TarGroups};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Default number of lines saved by a skeleton tail.
pub const DEFAULT_TAIL_LINES: i64 = 10;

/// Where a tar group or tar-dir bundle is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dest {
    Local,
    Archive,
}

impl CaseArchivist {
    /// Housekeeping while the case may still be running.
    pub fn run_progress(&mut self, dry_run: bool) -> Result<()> {
        self.begin(SafetyLevel::Restart, dry_run)?;
        self.log("run_progress", "run *Progress*");
        let opts = self.opts.clone();
        self.save_restartfiles(&opts.restart_files)?;
        self.save_reportfiles(&opts.report_files)?;
        self.copy_step("ProgressArchiveFiles", &opts.progress_archive_files)?;
        self.tar_groups_step("ProgressTarGroups", &opts.progress_tar_groups, Dest::Archive)?;
        self.tar_dirs_step("ProgressTarDirs", &opts.progress_tar_dirs, Dest::Local)?;
        self.delete_files_step("ProgressDeleteFiles", &opts.progress_delete_files)?;
        self.delete_files_step("ProgressUpdateFiles", &opts.progress_update_files)?;
        self.delete_dirs_step("ProgressDeleteDirs", &opts.progress_delete_dirs)?;
        self.log_summary("run_progress");
        Ok(())
    }

    /// Final archiving of a finished case.
    pub fn run_archive(&mut self, dry_run: bool) -> Result<()> {
        self.begin(SafetyLevel::Report, dry_run)?;
        self.log("run_archive", "run *Archive*");
        let opts = self.opts.clone();
        self.save_reportfiles(&opts.report_files)?;
        self.delete_files_step("PreDeleteFiles", &opts.pre_delete_files)?;
        self.delete_files_step("PreUpdateFiles", &opts.pre_update_files)?;
        self.delete_dirs_step("PreDeleteDirs", &opts.pre_delete_dirs)?;
        self.tar_groups_step("PreTarGroups", &opts.pre_tar_groups, Dest::Local)?;
        self.tar_dirs_step("PreTarDirs", &opts.pre_tar_dirs, Dest::Local)?;
        self.copy_step("ArchiveFiles", &opts.archive_files)?;
        self.tar_groups_step("PostTarGroups", &opts.post_tar_groups, Dest::Archive)?;
        self.tar_dirs_step("PostTarDirs", &opts.post_tar_dirs, Dest::Archive)?;
        self.delete_files_step("PostDeleteFiles", &opts.post_delete_files)?;
        self.delete_files_step("PostUpdateFiles", &opts.post_update_files)?;
        self.delete_dirs_step("PostDeleteDirs", &opts.post_delete_dirs)?;
        self.log_summary("run_archive");
        Ok(())
    }

    /// Reduce an archived case to the files needed to inspect its status.
    pub fn run_skeleton(&mut self, dry_run: bool) -> Result<()> {
        const TITLE: &str = "run_skeleton";
        self.begin(SafetyLevel::Status, dry_run)?;
        self.log(TITLE, "run *Skeleton*");
        let opts = self.opts.clone();
        self.keep_step("SkeletonFiles", &opts.skeleton_files)?;
        self.keep_step("SkeletonDirs", &opts.skeleton_dirs)?;
        self.tail_step(&opts.skeleton_tail_files)?;
        for bundle in self.tar_dirs_step("SkeletonTarDirs", &opts.skeleton_tar_dirs, Dest::Local)? {
            self.keep(&bundle);
        }

        self.log(TITLE, "begin *SkeletonClean*");
        for name in self.top_level_entries()? {
            if self.session().protected.kept.contains(&name) {
                continue;
            }
            if self.kind(&name) == Kind::Dir {
                let prefix = format!("{name}/");
                if self.session().protected.kept.iter().any(|k| k.starts_with(&prefix)) {
                    self.warn(TITLE, &format!("cannot rm -r '{name}'; contains kept files"));
                    continue;
                }
                self.delete_dir(&name)?;
            } else {
                self.delete_file(&name)?;
            }
        }
        self.log_summary(TITLE);
        Ok(())
    }

    /// Unpack a bundle, from the case folder or from the case archive, into
    /// the case folder.
    pub fn restore(&mut self, tarball: &str, from_archive: bool, dry_run: bool) -> Result<()> {
        self.reset_session(SafetyLevel::None, dry_run)?;
        let ftar = self.opts.tar_name(tarball);
        if from_archive {
            self.assert_archive()?;
            let path = self.paths().archive_path(&ftar)?;
            self.untar(&path, &format!("ARCHIVE/{ftar}"))
        } else {
            let path = self.paths().local_path(&ftar)?;
            self.untar(&path, &ftar)
        }
    }

    // ── Steps ───────────────────────────────────────────────────────────

    fn copy_step(&mut self, label: &str, opt: &RetentionOpt) -> Result<()> {
        self.log("copy_step", &format!("begin *{label}*"));
        for (pattern, n) in opt.normalize(0) {
            let groups = self.search(&pattern)?;
            self.archive_files(&groups, n)?;
        }
        Ok(())
    }

    fn delete_files_step(&mut self, label: &str, opt: &RetentionOpt) -> Result<()> {
        self.log("delete_files_step", &format!("begin *{label}*"));
        for (pattern, n) in opt.normalize(0) {
            let groups = self.search(&pattern)?;
            self.delete_files(&groups, n)?;
        }
        Ok(())
    }

    fn delete_dirs_step(&mut self, label: &str, opt: &RetentionOpt) -> Result<()> {
        self.log("delete_dirs_step", &format!("begin *{label}*"));
        for (pattern, n) in opt.normalize(0) {
            let groups = self.search(&pattern)?;
            self.delete_dirs(&groups, n)?;
        }
        Ok(())
    }

    fn tar_groups_step(&mut self, label: &str, groups: &TarGroups, dest: Dest) -> Result<()> {
        self.log("tar_groups_step", &format!("begin *{label}*"));
        for (tarname, opt) in groups {
            match dest {
                Dest::Local => self.tar_local(tarname, opt)?,
                Dest::Archive => self.tar_archive(tarname, opt)?,
            }
        }
        Ok(())
    }

    fn tar_dirs_step(&mut self, label: &str, opt: &RetentionOpt, dest: Dest) -> Result<Vec<String>> {
        self.log("tar_dirs_step", &format!("begin *{label}*"));
        self.tar_dirs(opt, dest == Dest::Archive)
    }

    fn keep_step(&mut self, label: &str, opt: &RetentionOpt) -> Result<()> {
        self.log("keep_step", &format!("begin *{label}*"));
        for (pattern, n) in opt.normalize(0) {
            for matches in self.search(&pattern)?.values() {
                for name in select(matches, n) {
                    self.keep(name);
                }
            }
        }
        Ok(())
    }

    /// Save the last lines of each matched file as `<file>.tail` and keep
    /// the tail.
    fn tail_step(&mut self, opt: &RetentionOpt) -> Result<()> {
        const TITLE: &str = "tail_step";
        self.log(TITLE, "begin *SkeletonTailFiles*");
        for (pattern, n) in opt.normalize(DEFAULT_TAIL_LINES) {
            let lines = usize::try_from(n.max(0)).unwrap_or(0);
            for matches in self.search(&pattern)?.values() {
                for name in matches {
                    if self.kind(name) != Kind::File {
                        continue;
                    }
                    let tail_name = format!("{name}.tail");
                    self.log(TITLE, &format!("tail -n {lines} '{name}' > '{tail_name}'"));
                    if self.dry_run() {
                        self.simulate_write(&tail_name);
                    } else {
                        let text = tail_lines(&self.paths().local_path(name)?, lines)?;
                        std::fs::write(self.paths().local_path(&tail_name)?, text)?;
                    }
                    self.keep(&tail_name);
                }
            }
        }
        Ok(())
    }

    fn top_level_entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.root_dir())? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name != STATE_DIR {
                names.push(name);
            }
        }
        Ok(self.session().overlay.top_level(names))
    }
}

/// Last `n` lines of a file, read backwards from the end in blocks so a
/// multi-gigabyte solver log costs only the blocks holding its tail.
fn tail_lines(path: &Path, n: usize) -> std::io::Result<String> {
    const BLOCK: u64 = 8 * 1024;
    if n == 0 {
        return Ok(String::new());
    }
    let mut file = File::open(path)?;
    let mut pos = file.metadata()?.len();
    let mut buf: Vec<u8> = Vec::new();
    // n + 1 newlines guarantee the first of the last n lines is complete.
    while pos > 0 && buf.iter().filter(|&&b| b == b'\n').count() <= n {
        let step = BLOCK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut block = vec![0u8; step as usize];
        file.read_exact(&mut block)?;
        block.extend_from_slice(&buf);
        buf = block;
    }
    Ok(last_lines(&String::from_utf8_lossy(&buf), n))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
