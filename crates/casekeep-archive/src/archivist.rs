//! Archive controller for one case: session setup and the file actions.

use crate::error::{ArchiveError, Result};
use crate::log::{ArchiveLog, TracingLog};
use crate::overlay::Kind;
use crate::paths::CasePaths;
use crate::safety::{SafetyChecker, Verdict};
use crate::search::{self, MatchGroups, Pattern};
use crate::session::ArchiveSession;
use crate::stat::safe_mtime;
use crate::tar::{SystemTar, TarTool};
use casekeep_core::{
    format_size, protect_subset, select, split_for_delete, ArchiveOpts, RetentionOpt,
    RetentionSpec, SafetyLevel,
};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct CaseArchivist {
    pub(crate) opts: ArchiveOpts,
    paths: CasePaths,
    session: ArchiveSession,
    checker: SafetyChecker,
    logger: Box<dyn ArchiveLog>,
    tar: Box<dyn TarTool>,
}

impl CaseArchivist {
    /// Controller for the case in `root_dir`. A relative `archive_folder`
    /// is resolved against `base`, normally the folder holding the config.
    pub fn new(opts: ArchiveOpts, root_dir: &Path, base: &Path) -> Result<Self> {
        let archive_root = opts.archive_root(base)?;
        let paths = CasePaths::new(root_dir, &archive_root, opts.archive_type);
        let session = ArchiveSession::default();
        let checker = SafetyChecker::new(session.safety)?;
        Ok(Self {
            opts,
            paths,
            session,
            checker,
            logger: Box::new(TracingLog),
            tar: Box::new(SystemTar),
        })
    }

    pub fn with_casename(mut self, casename: impl Into<String>) -> Self {
        self.paths = self.paths.with_casename(casename);
        self
    }

    pub fn with_logger(mut self, logger: impl ArchiveLog + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    pub fn with_tar(mut self, tar: impl TarTool + 'static) -> Self {
        self.tar = Box::new(tar);
        self
    }

    pub fn opts(&self) -> &ArchiveOpts {
        &self.opts
    }

    pub fn paths(&self) -> &CasePaths {
        &self.paths
    }

    pub fn session(&self) -> &ArchiveSession {
        &self.session
    }

    pub fn dry_run(&self) -> bool {
        self.session.dry_run
    }

    // ── Session ─────────────────────────────────────────────────────────

    /// Start a new action: reset counters and protected sets, check the
    /// archive root, and create the case archive folder.
    pub fn begin(&mut self, safety: SafetyLevel, dry_run: bool) -> Result<()> {
        self.checker = SafetyChecker::new(safety)?;
        self.session = ArchiveSession::new(safety, dry_run);
        self.assert_archive()?;
        self.make_case_archivedir()
    }

    /// [`begin`](Self::begin) with a safety level given by name.
    pub fn begin_named(&mut self, safety: &str, dry_run: bool) -> Result<()> {
        let level: SafetyLevel = safety.parse()?;
        self.begin(level, dry_run)
    }

    /// Fail unless the archive root exists. Skipped in dry-run mode.
    pub fn assert_archive(&self) -> Result<()> {
        if self.session.dry_run || self.paths.archive_root.is_dir() {
            return Ok(());
        }
        Err(ArchiveError::ArchiveRootMissing(self.paths.archive_root.clone()))
    }

    pub fn make_case_archivedir(&mut self) -> Result<()> {
        let parts: Vec<String> = self
            .paths
            .archive_dir_parts()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut full = self.paths.archive_root.clone();
        let mut rel = Vec::with_capacity(parts.len());
        for part in &parts {
            full.push(part);
            rel.push(part.as_str());
            if full.is_dir() {
                continue;
            }
            self.log("make_case_archivedir", &format!("mkdir ARCHIVE/{}", rel.join("/")));
            if !self.session.dry_run {
                std::fs::create_dir(&full)?;
            }
        }
        Ok(())
    }

    pub(crate) fn log(&self, title: &str, msg: &str) {
        self.logger.log_main(title, msg);
    }

    pub(crate) fn warn(&self, title: &str, msg: &str) {
        self.logger.log_warning(title, msg);
    }

    /// Whether `name` may be deleted under the current safety level. Every
    /// refusal is logged as a warning.
    pub fn check_safety(&self, name: &str) -> bool {
        let level = self.session.safety;
        match self.checker.check(name, &self.session.protected) {
            Verdict::Allow => true,
            Verdict::RestartRequired => {
                self.warn(
                    "check_safety",
                    &format!("'{name}' required for restart; safety={level}; not blocked"),
                );
                true
            }
            Verdict::Block(reason) => {
                self.warn(
                    "check_safety",
                    &format!("skipping '{name}'; safety={level}; {reason}"),
                );
                false
            }
        }
    }

    /// What a case path is, counting this session's dry-run mutations.
    pub(crate) fn kind(&self, name: &str) -> Kind {
        self.session.overlay.kind(&self.paths.root_dir, name)
    }

    /// Note a case file that a dry run would have written.
    pub(crate) fn simulate_write(&mut self, name: &str) {
        self.session.overlay.create(name);
    }

    /// Mtime of an archived file, if it exists or a dry run wrote it.
    fn archived_mtime(&self, name: &str, dest: &Path) -> Option<SystemTime> {
        self.session
            .overlay
            .archived_mtime(name)
            .or_else(|| dest.is_file().then(|| safe_mtime(dest)))
    }

    // ── Single-path actions ─────────────────────────────────────────────

    /// Copy one file into the case archive unless the archived copy is at
    /// least as new.
    pub fn copy_to_archive(&mut self, name: &str) -> Result<()> {
        const TITLE: &str = "copy_to_archive";
        let src = self.paths.local_path(name)?;
        let dest = self.paths.archive_path(name)?;
        if self.kind(name) != Kind::File {
            self.warn(TITLE, &format!("cannot cp '{name}'; no such file"));
            return Ok(());
        }
        if let Some(archived) = self.archived_mtime(name, &dest) {
            if archived >= self.session.overlay.mtime(&self.paths.root_dir, name) {
                self.log(TITLE, &format!("ARCHIVE/{name} up-to-date"));
                return Ok(());
            }
            self.log(TITLE, &format!("rm ARCHIVE/{name} (updating)"));
        }
        self.log(TITLE, &format!("{name} --> ARCHIVE/{name}"));
        if self.session.dry_run {
            self.session.overlay.archive(name);
        } else {
            create_parent(&dest)?;
            std::fs::copy(&src, &dest)?;
        }
        Ok(())
    }

    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        const TITLE: &str = "delete_file";
        let path = self.paths.local_path(name)?;
        match self.kind(name) {
            Kind::File => {}
            Kind::Dir => {
                self.warn(TITLE, &format!("cannot rm: '{name}' is a folder"));
                return Ok(());
            }
            Kind::Missing => {
                self.warn(TITLE, &format!("cannot rm: '{name}' does not exist"));
                return Ok(());
            }
        }
        self.session.bytes_touched += self.session.overlay.disk_size(&self.paths.root_dir, name);
        if !self.check_safety(name) {
            return Ok(());
        }
        self.log(TITLE, &format!("rm '{name}'"));
        self.session.record_deleted(name);
        if self.session.dry_run {
            self.session.overlay.remove(name);
        } else {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn delete_dir(&mut self, name: &str) -> Result<()> {
        const TITLE: &str = "delete_dir";
        let path = self.paths.local_path(name)?;
        match self.kind(name) {
            Kind::Dir => {}
            Kind::File => {
                self.warn(TITLE, &format!("cannot rmdir: '{name}' is a file"));
                return Ok(());
            }
            Kind::Missing => {
                self.warn(TITLE, &format!("cannot rmdir: '{name}' does not exist"));
                return Ok(());
            }
        }
        self.session.bytes_touched += self.session.overlay.disk_size(&self.paths.root_dir, name);
        if !self.check_safety(name) {
            return Ok(());
        }
        self.log(TITLE, &format!("rm -r '{name}'"));
        self.session.record_deleted(name);
        if self.session.dry_run {
            self.session.overlay.remove(name);
        } else {
            std::fs::remove_dir_all(&path)?;
        }
        Ok(())
    }

    /// Retain `name` for the rest of the session.
    pub fn keep(&mut self, name: &str) {
        self.log("keep", &format!("  keep '{name}'"));
        self.session.keep(name);
    }

    // ── Group actions ───────────────────────────────────────────────────

    /// Copy the `select(n)` subset of every group.
    pub fn archive_files(&mut self, groups: &MatchGroups, n: i64) -> Result<()> {
        for (grp, matches) in groups {
            self.log("archive_files", &format!("regex groups: {grp}"));
            for name in select(matches, n) {
                self.copy_to_archive(name)?;
            }
        }
        Ok(())
    }

    /// Delete files by signed count; the survivors are kept.
    pub fn delete_files(&mut self, groups: &MatchGroups, n: i64) -> Result<()> {
        for (grp, matches) in groups {
            self.log("delete_files", &format!("regex groups: {grp}"));
            let (remove, keep) = split_for_delete(matches, n);
            for name in remove {
                self.delete_file(name)?;
            }
            for name in keep {
                self.keep(name);
            }
        }
        Ok(())
    }

    pub fn delete_dirs(&mut self, groups: &MatchGroups, n: i64) -> Result<()> {
        for (grp, matches) in groups {
            self.log("delete_dirs", &format!("regex groups: {grp}"));
            let (remove, keep) = split_for_delete(matches, n);
            for name in remove {
                self.delete_dir(name)?;
            }
            for name in keep {
                self.keep(name);
            }
        }
        Ok(())
    }

    // ── Search ──────────────────────────────────────────────────────────

    /// Search the case folder with the configured search method. A dry run
    /// sees the folder as its earlier steps would have left it.
    pub fn search(&self, pattern: &str) -> Result<MatchGroups> {
        let compiled = Pattern::compile(pattern, self.opts.search_method)?;
        let mut groups = search::search_compiled(&self.paths.root_dir, &compiled);
        self.session
            .overlay
            .adjust(&self.paths.root_dir, &compiled, &mut groups);
        Ok(groups)
    }

    /// Flat member list for a tar group: the `select(n)` subset of every
    /// group of every pattern.
    pub fn search_targroups(&self, spec: &RetentionSpec) -> Result<Vec<String>> {
        let mut members = Vec::new();
        for (pattern, &n) in spec {
            for matches in self.search(pattern)?.values() {
                members.extend(select(matches, n).iter().cloned());
            }
        }
        Ok(members)
    }

    /// Paths a protection spec marks as required.
    pub fn find_keepfiles(&self, spec: &RetentionSpec) -> Result<Vec<String>> {
        let mut keep = Vec::new();
        for (pattern, &n) in spec {
            if n == 0 {
                continue;
            }
            for matches in self.search(pattern)?.values() {
                keep.extend(protect_subset(matches, n).iter().cloned());
            }
        }
        Ok(keep)
    }

    pub fn save_restartfiles(&mut self, opt: &RetentionOpt) -> Result<()> {
        self.log("save_restartfiles", "Saving list of files needed to restart case");
        self.session.protected.restart = self.find_keepfiles(&opt.normalize(0))?.into_iter().collect();
        Ok(())
    }

    pub fn save_reportfiles(&mut self, opt: &RetentionOpt) -> Result<()> {
        self.log("save_reportfiles", "Saving list of files needed for reports");
        self.session.protected.report = self.find_keepfiles(&opt.normalize(0))?.into_iter().collect();
        Ok(())
    }

    // ── Bundles ─────────────────────────────────────────────────────────

    /// Bundle a tar group into the case archive.
    pub fn tar_archive(&mut self, tarname: &str, opt: &RetentionOpt) -> Result<()> {
        let spec = opt.normalize(0);
        let members = self.search_targroups(&spec)?;
        let ftar = self.opts.tar_name(tarname);
        let patterns: Vec<&str> = spec.keys().map(String::as_str).collect();
        self.bundle("tar_archive", &ftar, true, &patterns, &members)
    }

    /// Bundle a tar group inside the case folder.
    pub fn tar_local(&mut self, tarname: &str, opt: &RetentionOpt) -> Result<()> {
        let spec = opt.normalize(0);
        let members = self.search_targroups(&spec)?;
        let ftar = self.opts.tar_name(tarname);
        let patterns: Vec<&str> = spec.keys().map(String::as_str).collect();
        self.bundle("tar_local", &ftar, false, &patterns, &members)
    }

    /// Bundle each selected folder into `<dir><ext>`, in the archive or next
    /// to the folder, then delete the folder. Returns the bundle names.
    pub fn tar_dirs(&mut self, opt: &RetentionOpt, to_archive: bool) -> Result<Vec<String>> {
        const TITLE: &str = "tar_dirs";
        let mut bundles = Vec::new();
        for (pattern, n) in opt.normalize(0) {
            let groups = self.search(&pattern)?;
            for (grp, matches) in &groups {
                self.log(TITLE, &format!("regex groups: {grp}"));
                for dir in select(matches, n) {
                    if self.kind(dir) != Kind::Dir {
                        self.warn(TITLE, &format!("cannot tar: '{dir}' is not a folder"));
                        continue;
                    }
                    let ftar = self.opts.tar_name(dir);
                    self.bundle(TITLE, &ftar, to_archive, &[dir.as_str()], &[dir.clone()])?;
                    self.delete_dir(dir)?;
                    bundles.push(ftar);
                }
            }
        }
        Ok(bundles)
    }

    /// Write `ftar` from `members` unless it is at least as new as all of
    /// them. A live run builds the bundle under a temporary name and renames
    /// it into place, so a failed tar leaves the previous bundle intact.
    fn bundle(
        &mut self,
        title: &str,
        ftar: &str,
        to_archive: bool,
        patterns: &[&str],
        members: &[String],
    ) -> Result<()> {
        let root = self.paths.root_dir.clone();
        let (dest, label, existing) = if to_archive {
            let dest = self.paths.archive_path(ftar)?;
            let existing = self.archived_mtime(ftar, &dest);
            (dest, format!("ARCHIVE/{ftar}"), existing)
        } else {
            let existing = (self.kind(ftar) == Kind::File)
                .then(|| self.session.overlay.mtime(&root, ftar));
            (self.paths.local_path(ftar)?, ftar.to_string(), existing)
        };
        if members.is_empty() && existing.is_none() {
            self.warn(title, &format!("no files to tar for {label}"));
            return Ok(());
        }
        if let Some(built) = existing {
            if built >= self.session.overlay.latest_mtime(&root, members) {
                self.log(title, &format!("{label} up-to-date"));
                return Ok(());
            }
        }
        self.log(title, &format!("tar {label} {}", patterns.join(" ")));
        for name in members {
            self.log(title, &format!("  add '{name}' => {label}"));
        }
        if self.session.dry_run {
            if to_archive {
                self.session.overlay.archive(ftar);
            } else {
                self.session.overlay.create(ftar);
            }
            return Ok(());
        }

        create_parent(&dest)?;
        let partial = partial_path(&dest);
        if partial.is_file() {
            std::fs::remove_file(&partial)?;
        }
        let built = self
            .tar
            .tar(&root, &partial, members, self.opts.archive_format)
            .and_then(|()| std::fs::rename(&partial, &dest).map_err(ArchiveError::from));
        if built.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        built
    }

    /// Unpack a bundle into the case folder.
    pub(crate) fn untar(&mut self, tarball: &Path, label: &str) -> Result<()> {
        if !tarball.is_file() {
            self.warn("untar", &format!("cannot untar '{label}'; no such file"));
            return Ok(());
        }
        self.log("untar", &format!("untar {label}"));
        if self.session.dry_run {
            return Ok(());
        }
        self.tar
            .untar(&self.paths.root_dir, tarball, self.opts.archive_format)
    }

    pub(crate) fn reset_session(&mut self, safety: SafetyLevel, dry_run: bool) -> Result<()> {
        self.checker = SafetyChecker::new(safety)?;
        self.session = ArchiveSession::new(safety, dry_run);
        Ok(())
    }

    /// Log deleted count and bytes examined for deletion.
    pub fn log_summary(&self, title: &str) {
        self.log(
            title,
            &format!(
                "{} deleted; {} examined for deletion",
                self.session.deleted.len(),
                format_size(self.session.bytes_touched)
            ),
        );
    }

    pub(crate) fn root_dir(&self) -> &Path {
        &self.paths.root_dir
    }
}

/// Sibling of `dest` that a bundle is built under before the rename.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
