use crate::error::{ArchiveError, Result};
use casekeep_core::ArchiveFormat;
use std::path::Path;
use std::process::Command;

/// External bundling tool.
///
/// Member paths are relative to `cwd`; implementations must run with `cwd`
/// as their working directory instead of changing the process directory.
pub trait TarTool {
    fn tar(&self, cwd: &Path, dest: &Path, members: &[String], format: ArchiveFormat) -> Result<()>;

    fn untar(&self, cwd: &Path, tarball: &Path, format: ArchiveFormat) -> Result<()>;
}

/// Runs the system `tar` / `zip` / `unzip` binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTar;

fn run(mut cmd: Command, cwd: &Path) -> Result<()> {
    cmd.current_dir(cwd);
    let command = format!("{cmd:?}");
    tracing::debug!(%command, cwd = %cwd.display(), "running");
    let status = cmd.status().map_err(|e| ArchiveError::ExternalCommand {
        command: command.clone(),
        status: e.to_string(),
    })?;
    if !status.success() {
        return Err(ArchiveError::ExternalCommand {
            command,
            status: status.to_string(),
        });
    }
    Ok(())
}

fn command(argv: &[&str]) -> Command {
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..]);
    cmd
}

impl TarTool for SystemTar {
    fn tar(&self, cwd: &Path, dest: &Path, members: &[String], format: ArchiveFormat) -> Result<()> {
        let mut cmd = command(format.archive_cmd());
        cmd.arg(dest).args(members);
        run(cmd, cwd)
    }

    fn untar(&self, cwd: &Path, tarball: &Path, format: ArchiveFormat) -> Result<()> {
        let mut cmd = command(format.unarchive_cmd());
        cmd.arg(tarball);
        run(cmd, cwd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn have_tar() -> bool {
        Command::new("tar")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn system_tar_round_trip() {
        if !have_tar() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let case = tmp.path().join("case");
        std::fs::create_dir_all(case.join("fm")).unwrap();
        std::fs::write(case.join("fm").join("wing.dat"), "lift").unwrap();

        let dest = tmp.path().join("fm.tar");
        SystemTar
            .tar(&case, &dest, &["fm".to_string()], ArchiveFormat::Tar)
            .unwrap();
        assert!(dest.is_file());

        let out = tmp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        SystemTar.untar(&out, &dest, ArchiveFormat::Tar).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.join("fm").join("wing.dat")).unwrap(),
            "lift"
        );
    }

    #[test]
    fn missing_member_is_external_error() {
        if !have_tar() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let err = SystemTar
            .tar(
                tmp.path(),
                &tmp.path().join("x.tar"),
                &["nope".to_string()],
                ArchiveFormat::Tar,
            )
            .unwrap_err();
        assert!(matches!(err, ArchiveError::ExternalCommand { .. }));
    }
}
