use anyhow::Context;
use casekeep_archive::{CaseArchivist, CaseLog};
use casekeep_core::config::discover;
use casekeep_core::{format_size, ArchiveOpts};
use std::path::Path;

pub struct CaseParams<'a> {
    pub case_dir: &'a Path,
    pub config: Option<&'a Path>,
    pub case_name: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Progress,
    Archive,
    Skeleton,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Progress => "clean",
            Phase::Archive => "archive",
            Phase::Skeleton => "skeleton",
        }
    }
}

fn open(params: &CaseParams) -> anyhow::Result<CaseArchivist> {
    if !params.case_dir.is_dir() {
        anyhow::bail!("case folder not found: {}", params.case_dir.display());
    }
    let (config_path, opts) = match params.config {
        Some(path) => (path.to_path_buf(), ArchiveOpts::load(path)?),
        None => discover(params.case_dir)?,
    };
    tracing::debug!(config = %config_path.display(), "loaded archive options");
    let base = config_path.parent().unwrap_or(Path::new("."));

    let mut archivist = CaseArchivist::new(opts, params.case_dir, base)?
        .with_logger(CaseLog::new(params.case_dir));
    if let Some(name) = params.case_name {
        archivist = archivist.with_casename(name);
    }
    Ok(archivist)
}

pub fn execute(params: &CaseParams, phase: Phase, dry_run: bool) -> anyhow::Result<()> {
    let mut archivist = open(params)?;
    match phase {
        Phase::Progress => archivist.run_progress(dry_run),
        Phase::Archive => archivist.run_archive(dry_run),
        Phase::Skeleton => archivist.run_skeleton(dry_run),
    }
    .with_context(|| format!("{} failed for {}", phase.as_str(), params.case_dir.display()))?;

    let session = archivist.session();
    let verb = if dry_run { "would delete" } else { "deleted" };
    println!(
        "{}: {} {} path(s), {} examined",
        phase.as_str(),
        verb,
        session.deleted.len(),
        format_size(session.bytes_touched)
    );
    Ok(())
}

pub fn restore(
    params: &CaseParams,
    tarball: &str,
    from_archive: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut archivist = open(params)?;
    archivist
        .restore(tarball, from_archive, dry_run)
        .with_context(|| format!("restore failed for {}", params.case_dir.display()))
}
