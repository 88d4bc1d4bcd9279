//! Pattern locator: find case files by slash-delimited glob or regex.
//!
//! A pattern like `lineload/(?P<comp>[a-z]+)\.([0-9]+)\.dat` is split on `/`
//! into one sub-pattern per folder level. The walk only descends into folders
//! whose name matches the sub-pattern for their level, so large run folders
//! full of old iterations are never listed. At the last level the whole
//! relative path is matched against the full pattern and the capture values
//! decide which group the path lands in.
//!
//! Glob levels follow shell rules for hidden names: a name starting with `.`
//! only matches a level whose sub-pattern also starts with `.`. Regex levels
//! match hidden names like any other.

use crate::error::{ArchiveError, Result};
use crate::stat::safe_mtime;
use casekeep_core::SearchMethod;
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Matched paths keyed by group label, each list sorted oldest first.
pub type MatchGroups = BTreeMap<String, Vec<String>>;

/// Folder under the case root holding casekeep's own logs; never searched.
pub const STATE_DIR: &str = ".casekeep";

enum Level {
    Regex(Regex),
    Glob { matcher: GlobMatcher, hidden: bool },
}

impl Level {
    fn glob(pattern: &str) -> Result<Self> {
        Ok(Level::Glob {
            matcher: glob(pattern)?,
            hidden: pattern.starts_with('.'),
        })
    }

    /// Whether a single path component may match this level at all.
    fn admits(&self, name: &str) -> bool {
        match self {
            Level::Regex(_) => true,
            Level::Glob { hidden, .. } => *hidden || !name.starts_with('.'),
        }
    }

    fn is_match(&self, name: &str) -> bool {
        match self {
            Level::Regex(re) => re.is_match(name),
            Level::Glob { matcher, .. } => self.admits(name) && matcher.is_match(name),
        }
    }
}

/// A compiled search pattern.
pub struct Pattern {
    levels: Vec<Level>,
    full: Level,
}

fn full_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ArchiveError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

fn glob(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|source| ArchiveError::Glob {
            pattern: pattern.to_string(),
            source,
        })
}

impl Pattern {
    pub fn compile(pattern: &str, method: SearchMethod) -> Result<Self> {
        let parts = pattern.split('/');
        let (levels, full) = match method {
            SearchMethod::Regex => (
                parts
                    .map(|p| full_regex(p).map(Level::Regex))
                    .collect::<Result<Vec<_>>>()?,
                Level::Regex(full_regex(pattern)?),
            ),
            SearchMethod::Glob => (
                parts.map(Level::glob).collect::<Result<Vec<_>>>()?,
                Level::glob(pattern)?,
            ),
        };
        Ok(Self { levels, full })
    }

    /// Number of path levels in the pattern.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Group label for a relative path, or `None` if it doesn't match.
    pub fn classify(&self, rel: &str) -> Option<String> {
        match &self.full {
            Level::Glob { matcher, .. } => {
                let admitted = rel
                    .split('/')
                    .zip(&self.levels)
                    .all(|(name, level)| level.admits(name));
                (admitted && matcher.is_match(rel)).then(String::new)
            }
            Level::Regex(re) => re.captures(rel).map(|caps| group_label(re, &caps)),
        }
    }
}

/// Render capture values as `name='value'` (or `index='value'` for unnamed
/// groups), space separated. Groups that did not participate render empty.
fn group_label(re: &Regex, caps: &regex::Captures<'_>) -> String {
    re.capture_names()
        .enumerate()
        .skip(1)
        .map(|(i, name)| {
            let value = caps.get(i).map_or("", |m| m.as_str());
            match name {
                Some(name) => format!("{name}='{value}'"),
                None => format!("{}='{value}'", i - 1),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn rel_string(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Search `root` for files and folders matching `pattern`.
///
/// Zero matches is an empty map, not an error. Each group is sorted by
/// ascending modification time; paths that disappear before they can be
/// stat'ed sort first.
pub fn search(root: &Path, pattern: &str, method: SearchMethod) -> Result<MatchGroups> {
    let compiled = Pattern::compile(pattern, method)?;
    Ok(search_compiled(root, &compiled))
}

pub fn search_compiled(root: &Path, pattern: &Pattern) -> MatchGroups {
    let depth = pattern.depth();
    let walker = WalkDir::new(root)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let d = e.depth();
            if d == 0 || d == depth {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if d == 1 && name == STATE_DIR {
                return false;
            }
            e.file_type().is_dir() && pattern.levels[d - 1].is_match(&name)
        });

    let mut groups = MatchGroups::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.depth() != depth {
            continue;
        }
        let Some(rel) = rel_string(root, entry.path()) else {
            continue;
        };
        if depth == 1 && rel == STATE_DIR {
            continue;
        }
        if let Some(label) = pattern.classify(&rel) {
            groups.entry(label).or_default().push(rel);
        }
    }

    for paths in groups.values_mut() {
        paths.sort_by_cached_key(|p| safe_mtime(&root.join(p)));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{set_mtime, touch};

    fn keys(groups: &MatchGroups) -> Vec<&str> {
        groups.keys().map(String::as_str).collect()
    }

    #[test]
    fn positional_groups_split_every_tuple() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "run.01.100", 1);
        touch(tmp.path(), "run.01.200", 2);
        touch(tmp.path(), "run.02.050", 3);

        let groups = search(tmp.path(), r"run\.([0-9]+)\.([0-9]+)", SearchMethod::Regex).unwrap();
        assert_eq!(
            keys(&groups),
            ["0='01' 1='100'", "0='01' 1='200'", "0='02' 1='050'"]
        );
        assert!(groups.values().all(|v| v.len() == 1));
    }

    #[test]
    fn partial_groups_collect_by_prefix_sorted_by_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "run.01.100", 20);
        touch(tmp.path(), "run.01.200", 10);
        touch(tmp.path(), "run.02.050", 30);

        let groups = search(tmp.path(), r"run\.([0-9]+)\..*", SearchMethod::Regex).unwrap();
        assert_eq!(keys(&groups), ["0='01'", "0='02'"]);
        assert_eq!(groups["0='01'"], ["run.01.200", "run.01.100"]);
        assert_eq!(groups["0='02'"], ["run.02.050"]);
    }

    #[test]
    fn named_groups_use_names() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "fm_wing.dat", 1);
        touch(tmp.path(), "fm_tail.dat", 2);

        let groups = search(
            tmp.path(),
            r"fm_(?P<comp>[a-z]+)\.(dat)",
            SearchMethod::Regex,
        )
        .unwrap();
        assert_eq!(keys(&groups), ["comp='tail' 1='dat'", "comp='wing' 1='dat'"]);
    }

    #[test]
    fn no_groups_single_empty_label() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "q.100", 2);
        touch(tmp.path(), "q.200", 1);

        let groups = search(tmp.path(), r"q\.[0-9]+", SearchMethod::Regex).unwrap();
        assert_eq!(keys(&groups), [""]);
        assert_eq!(groups[""], ["q.200", "q.100"]);
    }

    #[test]
    fn zero_matches_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "other.txt", 1);
        assert!(search(tmp.path(), r"q\.[0-9]+", SearchMethod::Regex)
            .unwrap()
            .is_empty());
        assert!(search(tmp.path(), "*.plt", SearchMethod::Glob).unwrap().is_empty());
    }

    #[test]
    fn multi_level_regex_matches_full_path() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "lineload/LL_wing.csv", 1);
        touch(tmp.path(), "lineload/LL_tail.csv", 2);
        touch(tmp.path(), "lineload/notes.txt", 3);
        touch(tmp.path(), "other/LL_wing.csv", 4);
        touch(tmp.path(), "LL_top.csv", 5);

        let groups = search(tmp.path(), r"lineload/LL_([a-z]+)\.csv", SearchMethod::Regex).unwrap();
        assert_eq!(keys(&groups), ["0='tail'", "0='wing'"]);
        assert_eq!(groups["0='wing'"], ["lineload/LL_wing.csv"]);
    }

    #[test]
    fn intermediate_levels_only_descend_into_matching_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "fm/a.dat", 1);
        // A file named like the folder level must not be treated as a folder.
        touch(tmp.path(), "fm2", 1);
        touch(tmp.path(), "fm2x/a.dat", 1);

        let groups = search(tmp.path(), r"fm[0-9]?/a\.dat", SearchMethod::Regex).unwrap();
        assert_eq!(groups[""], ["fm/a.dat"]);
    }

    #[test]
    fn matches_include_folders() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("adapt00")).unwrap();
        std::fs::create_dir_all(tmp.path().join("adapt01")).unwrap();
        set_mtime(&tmp.path().join("adapt00"), 1);
        set_mtime(&tmp.path().join("adapt01"), 2);

        let groups = search(tmp.path(), r"adapt[0-9]+", SearchMethod::Regex).unwrap();
        assert_eq!(groups[""], ["adapt00", "adapt01"]);
    }

    #[test]
    fn glob_is_one_group_per_level() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "flow.01.dat", 3);
        touch(tmp.path(), "flow.02.dat", 1);
        touch(tmp.path(), "sub/flow.03.dat", 2);

        let groups = search(tmp.path(), "flow.*.dat", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["flow.02.dat", "flow.01.dat"]);

        let groups = search(tmp.path(), "*/flow.*.dat", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["sub/flow.03.dat"]);
    }

    #[test]
    fn state_dir_is_never_searched() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), ".casekeep/archive.log", 1);
        touch(tmp.path(), "run.log", 1);

        let groups = search(tmp.path(), "*", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["run.log"]);
        let groups = search(tmp.path(), "*/*", SearchMethod::Glob).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn glob_skips_hidden_names_unless_pattern_is_dotted() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), ".restart.bak", 1);
        touch(tmp.path(), "restart.dat", 2);
        touch(tmp.path(), ".git/config", 3);
        touch(tmp.path(), "sub/.hidden.dat", 4);
        touch(tmp.path(), "sub/shown.dat", 5);

        let groups = search(tmp.path(), "*", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["restart.dat", "sub"]);
        let groups = search(tmp.path(), "*/*", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["sub/shown.dat"]);
        let groups = search(tmp.path(), "*.dat", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["restart.dat"]);

        let groups = search(tmp.path(), ".*", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], [".restart.bak", ".git"]);
        let groups = search(tmp.path(), "sub/.*.dat", SearchMethod::Glob).unwrap();
        assert_eq!(groups[""], ["sub/.hidden.dat"]);
    }

    #[test]
    fn regex_matches_hidden_names() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), ".restart.bak", 1);
        touch(tmp.path(), "restart.bak", 2);

        let groups = search(tmp.path(), r".*\.bak", SearchMethod::Regex).unwrap();
        assert_eq!(groups[""], [".restart.bak", "restart.bak"]);
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = search(tmp.path(), "run.(", SearchMethod::Regex).unwrap_err();
        assert!(matches!(err, ArchiveError::Regex { .. }));
    }
}
