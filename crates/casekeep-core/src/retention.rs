use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical retention configuration: pattern -> signed keep count.
pub type RetentionSpec = BTreeMap<String, i64>;

/// Retention configuration as users write it.
///
/// In YAML a spec can be a bare pattern (`"*.dat"`), a list of patterns or
/// nested specs (`["*.dat", {"q.*": 2}]`), or a mapping of pattern to count
/// (`{"flow.dat": 3}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RetentionOpt {
    Pattern(String),
    PatternList(Vec<RetentionOpt>),
    /// Values stay raw so non-integer counts can be dropped during
    /// normalization instead of failing the whole config.
    PatternCounts(BTreeMap<String, serde_json::Value>),
}

impl Default for RetentionOpt {
    fn default() -> Self {
        RetentionOpt::PatternList(Vec::new())
    }
}

impl From<&str> for RetentionOpt {
    fn from(pattern: &str) -> Self {
        RetentionOpt::Pattern(pattern.to_string())
    }
}

impl RetentionOpt {
    /// Mapping form built from (pattern, count) pairs.
    pub fn counts<'a>(pairs: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        RetentionOpt::PatternCounts(
            pairs
                .into_iter()
                .map(|(pat, n)| (pat.to_string(), serde_json::Value::from(n)))
                .collect(),
        )
    }

    pub fn normalize(&self, default: i64) -> RetentionSpec {
        normalize(self, default)
    }
}

/// Flatten any [`RetentionOpt`] into a [`RetentionSpec`].
///
/// Bare patterns get `default`. Lists merge their elements in order, so a
/// later entry for the same pattern overwrites an earlier one. Mapping
/// entries whose value is not an integer are dropped.
pub fn normalize(raw: &RetentionOpt, default: i64) -> RetentionSpec {
    match raw {
        RetentionOpt::Pattern(pat) => RetentionSpec::from([(pat.clone(), default)]),
        RetentionOpt::PatternCounts(map) => map
            .iter()
            .filter_map(|(pat, v)| v.as_i64().map(|n| (pat.clone(), n)))
            .collect(),
        RetentionOpt::PatternList(items) => {
            let mut out = RetentionSpec::new();
            for item in items {
                out.extend(normalize(item, default));
            }
            out
        }
    }
}

fn clamp(n: i64, len: usize) -> usize {
    usize::try_from(n.unsigned_abs()).map_or(len, |abs| abs.min(len))
}

/// Select from `matches` (sorted oldest first) by signed count.
///
/// `n < 0` selects the oldest `|n|`, `n == 0` selects everything, `n > 0`
/// selects the newest `n`. Used directly by copy and tar actions.
pub fn select<T>(matches: &[T], n: i64) -> &[T] {
    let len = matches.len();
    let count = clamp(n, len);
    match n.signum() {
        0 => matches,
        1 => &matches[len - count..],
        _ => &matches[..count],
    }
}

/// Split `matches` (sorted oldest first) into `(remove, keep)` for delete
/// actions.
///
/// `n == 0` removes everything, `n > 0` keeps the newest `n` and removes the
/// rest, `n < 0` removes the oldest `|n|` and keeps the rest.
pub fn split_for_delete<T>(matches: &[T], n: i64) -> (&[T], &[T]) {
    let len = matches.len();
    let count = clamp(n, len);
    match n.signum() {
        0 => (matches, &[]),
        1 => matches.split_at(len - count),
        _ => matches.split_at(count),
    }
}

/// Entries of `matches` that a protection spec marks as required.
///
/// `n == 0` protects nothing, `n < 0` protects every match, `n > 0` protects
/// the newest `n`.
pub fn protect_subset<T>(matches: &[T], n: i64) -> &[T] {
    match n.signum() {
        0 => &[],
        1 => select(matches, n),
        _ => matches,
    }
}
