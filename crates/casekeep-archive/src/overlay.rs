//! What a dry run has done so far, layered over the real case folder.
//!
//! A dry run never touches the disk, so later steps of the same phase would
//! otherwise still see files an earlier step "deleted" and miss bundles an
//! earlier step "created". The archivist records every skipped mutation here
//! and reads existence, mtimes and sizes through it. In a live run nothing is
//! recorded and every lookup falls straight through to the filesystem.

use crate::search::{rel_string, MatchGroups, Pattern};
use crate::stat::{disk_size, latest_mtime, safe_mtime};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Missing,
    File,
    Dir,
}

#[derive(Debug, Clone, Default)]
pub struct DryRunOverlay {
    /// Case-relative paths removed, with everything below them.
    removed: BTreeSet<String>,
    /// Case-relative files written, with their simulated mtime.
    created: BTreeMap<String, SystemTime>,
    /// Case folders whose listing changed, with their simulated mtime.
    touched: BTreeMap<String, SystemTime>,
    /// Archive-relative files written, with their simulated mtime.
    archived: BTreeMap<String, SystemTime>,
    clock: Option<SystemTime>,
}

/// `rel` itself followed by each of its ancestors, nearest first.
fn self_and_ancestors(rel: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(rel), |&r| r.rfind('/').map(|i| &r[..i]))
}

fn parent(rel: &str) -> Option<&str> {
    rel.rfind('/').map(|i| &rel[..i])
}

fn is_below(path: &str, dir: &str) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

impl DryRunOverlay {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.created.is_empty()
            && self.touched.is_empty()
            && self.archived.is_empty()
    }

    /// Strictly increasing simulated clock, never behind the wall clock.
    fn tick(&mut self) -> SystemTime {
        let now = SystemTime::now();
        let next = match self.clock {
            Some(last) if last >= now => last + Duration::from_nanos(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    fn touch_parent(&mut self, rel: &str, at: SystemTime) {
        if let Some(dir) = parent(rel) {
            self.touched.insert(dir.to_string(), at);
        }
    }

    pub fn is_removed(&self, rel: &str) -> bool {
        self_and_ancestors(rel).any(|p| self.removed.contains(p))
    }

    /// Record the removal of a case file or folder.
    pub fn remove(&mut self, rel: &str) {
        let at = self.tick();
        self.created.retain(|p, _| p != rel && !is_below(p, rel));
        self.touched.retain(|p, _| p != rel && !is_below(p, rel));
        self.removed.insert(rel.to_string());
        self.touch_parent(rel, at);
    }

    /// Record a file written into the case folder.
    pub fn create(&mut self, rel: &str) {
        let at = self.tick();
        self.removed.remove(rel);
        self.created.insert(rel.to_string(), at);
        self.touch_parent(rel, at);
    }

    /// Record a file written into the case archive.
    pub fn archive(&mut self, rel: &str) {
        let at = self.tick();
        self.archived.insert(rel.to_string(), at);
    }

    pub fn archived_mtime(&self, rel: &str) -> Option<SystemTime> {
        self.archived.get(rel).copied()
    }

    pub fn kind(&self, root: &Path, rel: &str) -> Kind {
        if self.is_removed(rel) {
            return Kind::Missing;
        }
        if self.created.contains_key(rel) {
            return Kind::File;
        }
        let path = root.join(rel);
        if path.is_dir() {
            Kind::Dir
        } else if path.is_file() {
            Kind::File
        } else {
            Kind::Missing
        }
    }

    /// Direct mtime of a case path.
    pub fn mtime(&self, root: &Path, rel: &str) -> SystemTime {
        if self.is_removed(rel) {
            return SystemTime::UNIX_EPOCH;
        }
        self.created
            .get(rel)
            .or_else(|| self.touched.get(rel))
            .copied()
            .unwrap_or_else(|| safe_mtime(&root.join(rel)))
    }

    /// Latest mtime across `members`, recursing into folders.
    pub fn latest_mtime(&self, root: &Path, members: &[String]) -> SystemTime {
        if self.is_empty() {
            return latest_mtime(members.iter().map(|m| root.join(m)));
        }
        members
            .iter()
            .map(|m| self.tree_mtime(root, m))
            .max()
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn tree_mtime(&self, root: &Path, rel: &str) -> SystemTime {
        if self.is_removed(rel) {
            return SystemTime::UNIX_EPOCH;
        }
        if let Some(&at) = self.created.get(rel) {
            return at;
        }
        let on_disk = self
            .visible(root, rel)
            .map(|(sub, meta)| {
                self.touched
                    .get(&sub)
                    .copied()
                    .or_else(|| meta.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            })
            .max();
        let simulated = self
            .created
            .iter()
            .chain(&self.touched)
            .filter(|(p, _)| is_below(p, rel))
            .map(|(_, &at)| at)
            .max();
        on_disk.max(simulated).unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// Size like `du`, leaving out removed paths. Simulated files count 0.
    pub fn disk_size(&self, root: &Path, rel: &str) -> u64 {
        if self.is_empty() {
            return disk_size(&root.join(rel));
        }
        if self.is_removed(rel) {
            return 0;
        }
        self.visible(root, rel).map(|(_, meta)| meta.len()).sum()
    }

    /// Entries at and below `rel` on disk that have not been removed, with
    /// their case-relative paths. Symlinks are skipped.
    fn visible<'a>(
        &'a self,
        root: &'a Path,
        rel: &str,
    ) -> impl Iterator<Item = (String, std::fs::Metadata)> + 'a {
        WalkDir::new(root.join(rel))
            .into_iter()
            .filter_entry(move |e| {
                rel_string(root, e.path()).map_or(true, |r| !self.removed.contains(&r))
            })
            .filter_map(|e| e.ok())
            .filter(|e| !e.path_is_symlink())
            .filter_map(move |e| {
                let sub = rel_string(root, e.path())?;
                Some((sub, e.metadata().ok()?))
            })
    }

    /// Bring fresh search results in line with the simulated folder: drop
    /// removed paths, add created files the pattern matches, and re-sort each
    /// group by simulated mtime.
    pub fn adjust(&self, root: &Path, pattern: &Pattern, groups: &mut MatchGroups) {
        if self.is_empty() {
            return;
        }
        for paths in groups.values_mut() {
            paths.retain(|p| !self.is_removed(p));
        }
        for rel in self.created.keys() {
            if rel.split('/').count() != pattern.depth() {
                continue;
            }
            if let Some(label) = pattern.classify(rel) {
                let paths = groups.entry(label).or_default();
                if !paths.contains(rel) {
                    paths.push(rel.clone());
                }
            }
        }
        groups.retain(|_, paths| !paths.is_empty());
        for paths in groups.values_mut() {
            paths.sort_by_cached_key(|p| self.mtime(root, p));
        }
    }

    /// Top-level entry names of the simulated case folder, sorted.
    pub fn top_level(&self, names: Vec<String>) -> Vec<String> {
        let mut names: BTreeSet<String> = names
            .into_iter()
            .filter(|n| !self.removed.contains(n))
            .collect();
        names.extend(
            self.created
                .keys()
                .filter(|p| !p.contains('/'))
                .cloned(),
        );
        names.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{set_mtime, t, touch};
    use casekeep_core::SearchMethod;

    #[test]
    fn empty_overlay_reads_the_disk() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "fm/a.dat", 10);
        set_mtime(&tmp.path().join("fm"), 5);
        let overlay = DryRunOverlay::default();

        assert_eq!(overlay.kind(tmp.path(), "fm"), Kind::Dir);
        assert_eq!(overlay.kind(tmp.path(), "fm/a.dat"), Kind::File);
        assert_eq!(overlay.kind(tmp.path(), "nope"), Kind::Missing);
        assert_eq!(overlay.latest_mtime(tmp.path(), &["fm".to_string()]), t(10));
        assert_eq!(overlay.disk_size(tmp.path(), "fm/a.dat"), 8);
    }

    #[test]
    fn removed_folders_hide_their_contents() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "fm/a.dat", 10);
        touch(tmp.path(), "fm/b.dat", 20);
        let mut overlay = DryRunOverlay::default();
        overlay.remove("fm/b.dat");

        assert_eq!(overlay.kind(tmp.path(), "fm/b.dat"), Kind::Missing);
        assert_eq!(overlay.disk_size(tmp.path(), "fm/a.dat"), 8);
        // the folder listing changed, so its mtime moves forward
        assert!(overlay.mtime(tmp.path(), "fm") > t(20));

        overlay.remove("fm");
        assert_eq!(overlay.kind(tmp.path(), "fm/a.dat"), Kind::Missing);
        assert_eq!(overlay.disk_size(tmp.path(), "fm"), 0);
    }

    #[test]
    fn created_files_join_search_results_newest_last() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "adapt00/q.1", 1);
        touch(tmp.path(), "adapt01.tar", 5);
        set_mtime(&tmp.path().join("adapt00"), 1);
        let pattern = Pattern::compile("adapt*.tar", SearchMethod::Glob).unwrap();
        let mut overlay = DryRunOverlay::default();
        overlay.create("adapt00.tar");
        overlay.remove("adapt00");

        let mut groups = crate::search::search_compiled(tmp.path(), &pattern);
        overlay.adjust(tmp.path(), &pattern, &mut groups);
        assert_eq!(groups[""], ["adapt01.tar", "adapt00.tar"]);
        assert_eq!(overlay.kind(tmp.path(), "adapt00.tar"), Kind::File);
        assert_eq!(
            overlay.top_level(vec!["adapt00".into(), "adapt01.tar".into()]),
            ["adapt00.tar", "adapt01.tar"]
        );
    }

    #[test]
    fn removed_matches_leave_search_results() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "q.1", 1);
        touch(tmp.path(), "q.2", 2);
        let pattern = Pattern::compile(r"q\.[0-9]", SearchMethod::Regex).unwrap();
        let mut overlay = DryRunOverlay::default();
        overlay.remove("q.1");
        overlay.remove("q.2");

        let mut groups = crate::search::search_compiled(tmp.path(), &pattern);
        overlay.adjust(tmp.path(), &pattern, &mut groups);
        assert!(groups.is_empty());
    }

    #[test]
    fn simulated_clock_is_strictly_increasing() {
        let mut overlay = DryRunOverlay::default();
        overlay.archive("a.tar");
        overlay.archive("b.tar");
        assert!(overlay.archived_mtime("b.tar") > overlay.archived_mtime("a.tar"));
        assert!(overlay.archived_mtime("c.tar").is_none());
    }
}
