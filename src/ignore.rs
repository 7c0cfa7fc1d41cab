// Copyright 2026 The credsift authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ignore lists: loading, validation, and the suppression pass over
//! findings.
//!
//! An ignore entry matches a finding by path equality, path pattern, or
//! file hash, optionally narrowed to a module, a set of rule references, or
//! an exact offset. Entries are evaluated in list order and the first match
//! wins; a suppressed finding is annotated, never removed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::errors::IgnoreListError;
use crate::finding::{Finding, Ignored};

fn default_module() -> String {
    "rules".to_string()
}

/// One ignore list entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnoreEntry {
    /// The path of a file to ignore.
    #[serde(default)]
    pub path: Option<String>,
    /// A pattern matched against the file path to ignore.
    #[serde(default)]
    pub pattern: Option<String>,
    /// The MD5 sum of the file to ignore.
    #[serde(default)]
    pub md5: Option<String>,
    /// The reason for ignoring the finding.
    pub reason: String,
    /// Which module to ignore findings from.
    #[serde(default = "default_module")]
    pub module: String,
    /// Rule references to ignore findings from; all rules when empty.
    #[serde(default)]
    pub references: Vec<String>,
    /// The offset of the specific finding to ignore.
    #[serde(default)]
    pub offset: Option<u64>,
}

impl IgnoreEntry {
    /// Enforces the entry invariants, naming the entry's reason in the
    /// diagnostic.
    fn validate(&self) -> Result<()> {
        let fail = |msg: &str| {
            Err(anyhow::Error::new(IgnoreListError(format!(
                "invalid ignore list entry '{}': {}",
                self.reason, msg
            ))))
        };

        if self.path.is_some() && self.pattern.is_some() {
            return fail("either path OR pattern must be specified, not both");
        }
        if self.path.is_none() && self.pattern.is_none() && self.md5.is_none() {
            return fail("one of pattern, path, or md5 must be set");
        }
        if self.offset.is_some() && !self.references.is_empty() {
            return fail("an offset cannot be combined with a list of references");
        }
        if (self.offset.is_some() || !self.references.is_empty()) && self.module.is_empty() {
            return fail("module must be set for this type of ignore");
        }
        Ok(())
    }

    /// Whether the narrowing constraints line up with a finding whose shape
    /// already matched.
    fn constraints_align(&self, finding: &Finding) -> bool {
        if self.module != finding.source.module {
            return false;
        }
        if !self.references.is_empty() {
            return self.references.contains(&finding.source.rule);
        }
        if let Some(offset) = self.offset {
            return finding.location.offset == offset;
        }
        // A fairly permissive ignore.
        true
    }
}

/// An ordered ignore list. Order matters: suppression stops at the first
/// matching entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IgnoreList {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<IgnoreEntry>,
}

/// Loads an ignore list from file, recursively flattening includes and
/// validating every entry. The returned list has an empty include list.
pub fn from_file(filename: &Path) -> Result<IgnoreList> {
    let list = load_unvalidated(filename)?;
    for entry in &list.ignore {
        entry.validate()?;
    }
    Ok(list)
}

fn load_unvalidated(filename: &Path) -> Result<IgnoreList> {
    let parent_file = fs::canonicalize(filename)
        .with_context(|| format!("resolving ignore list path {}", filename.display()))?;
    let parent_path = parent_file.parent().unwrap_or(Path::new("/")).to_path_buf();

    let raw = fs::read(&parent_file)
        .with_context(|| format!("reading ignore list {}", parent_file.display()))?;
    let mut list: IgnoreList = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing ignore list {}", parent_file.display()))?;

    let includes = std::mem::take(&mut list.include);
    for include in includes {
        let mut path = PathBuf::from(&include);
        if !path.is_absolute() {
            path = parent_path.join(path);
        }
        let child = load_unvalidated(&path)?;
        list.ignore.extend(child.ignore);
    }

    Ok(list)
}

fn by_path(finding: &Finding, entry: &IgnoreEntry) -> bool {
    match &entry.path {
        Some(path) => *path == finding.path && entry.constraints_align(finding),
        None => false,
    }
}

fn by_pattern(finding: &Finding, entry: &IgnoreEntry) -> Result<bool> {
    let pattern = match &entry.pattern {
        Some(pattern) => pattern,
        None => return Ok(false),
    };
    let regex = Regex::new(pattern).map_err(|err| {
        anyhow::Error::new(IgnoreListError(format!(
            "error in ignore list entry '{}': {}",
            entry.reason, err
        )))
    })?;
    Ok(regex.is_match(&finding.path) && entry.constraints_align(finding))
}

fn by_hash(finding: &Finding, entry: &IgnoreEntry) -> bool {
    match &entry.md5 {
        Some(md5) => *md5 == finding.md5 && entry.constraints_align(finding),
        None => false,
    }
}

/// Folds the ignore list over the findings, annotating matches. The output
/// has the same length and order as the input; only the `ignored`
/// attribute changes.
pub fn process(mut findings: Vec<Finding>, list: &IgnoreList) -> Result<Vec<Finding>> {
    for finding in &mut findings {
        for entry in &list.ignore {
            let matched = by_path(finding, entry)
                || by_pattern(finding, entry)?
                || by_hash(finding, entry);
            if matched {
                finding.ignored = Some(Ignored {
                    reason: entry.reason.clone(),
                });
                break;
            }
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Location, Sample, Source};

    fn finding(path: &str) -> Finding {
        Finding {
            path: path.to_string(),
            md5: "fa19207ef28b6a97828e3a22b11290e9".into(),
            confidence: 50,
            location: Location {
                offset: 300,
                line: None,
            },
            sample: Sample {
                window: 20,
                before: String::new(),
                content: "match".into(),
                after: String::new(),
                binary: false,
            },
            source: Source {
                module: "rules".into(),
                rule: "SomeRule".into(),
                version: None,
                description: None,
            },
            ignored: None,
        }
    }

    fn entry() -> IgnoreEntry {
        IgnoreEntry {
            path: None,
            pattern: None,
            md5: None,
            reason: "Test".into(),
            module: "rules".into(),
            references: Vec::new(),
            offset: None,
        }
    }

    #[test]
    fn test_by_path_constraints() {
        let subject = finding("/a/a");

        let mut hit = entry();
        hit.path = Some("/a/a".into());
        assert!(by_path(&subject, &hit));

        hit.references = vec!["SomeRule".into(), "OtherRule".into()];
        assert!(by_path(&subject, &hit));

        hit.references = vec!["OtherRule".into()];
        assert!(!by_path(&subject, &hit));

        let mut offset_hit = entry();
        offset_hit.path = Some("/a/a".into());
        offset_hit.offset = Some(300);
        assert!(by_path(&subject, &offset_hit));

        offset_hit.offset = Some(1234);
        assert!(!by_path(&subject, &offset_hit));

        let mut miss = entry();
        miss.path = Some("/a/b".into());
        assert!(!by_path(&subject, &miss));

        let mut wrong_module = entry();
        wrong_module.path = Some("/a/a".into());
        wrong_module.module = "other".into();
        assert!(!by_path(&subject, &wrong_module));
    }

    #[test]
    fn test_by_pattern_constraints() {
        let subject = finding("/a/tests/a");

        let mut hit = entry();
        hit.pattern = Some(".*/tests/.*".into());
        assert!(by_pattern(&subject, &hit).unwrap());

        let mut miss = entry();
        miss.pattern = Some(r"\.shasums$".into());
        assert!(!by_pattern(&subject, &miss).unwrap());

        let mut bad = entry();
        bad.pattern = Some("(unclosed".into());
        let err = by_pattern(&subject, &bad).unwrap_err();
        assert!(err.is::<IgnoreListError>());
        assert!(err.to_string().contains("Test"));
    }

    #[test]
    fn test_by_hash_reference_narrowing() {
        let subject = finding("/a/a");

        let mut hit = entry();
        hit.md5 = Some("fa19207ef28b6a97828e3a22b11290e9".into());
        hit.references = vec!["SomeRule".into(), "OtherRule".into()];
        assert!(by_hash(&subject, &hit));

        hit.references = vec!["OtherRule".into()];
        assert!(!by_hash(&subject, &hit));
    }

    #[test]
    fn test_process_first_match_wins_and_preserves_order() {
        let mut first = entry();
        first.path = Some("/a/a".into());
        first.reason = "first".into();
        let mut second = entry();
        second.md5 = Some("fa19207ef28b6a97828e3a22b11290e9".into());
        second.reason = "second".into();

        let list = IgnoreList {
            include: Vec::new(),
            ignore: vec![first, second],
        };

        let input = vec![finding("/a/a"), finding("/b/b"), finding("/c/c")];
        let output = process(input, &list).unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0].path, "/a/a");
        // Both entries match the first finding; the earlier one wins.
        assert_eq!(output[0].ignored.as_ref().unwrap().reason, "first");
        // The others only match by hash.
        assert_eq!(output[1].ignored.as_ref().unwrap().reason, "second");
        assert_eq!(output[2].ignored.as_ref().unwrap().reason, "second");
    }

    #[test]
    fn test_validation_rules() {
        let mut both = entry();
        both.path = Some("/a".into());
        both.pattern = Some(".*".into());
        assert!(both.validate().unwrap_err().is::<IgnoreListError>());

        let shapeless = entry();
        assert!(shapeless.validate().unwrap_err().is::<IgnoreListError>());

        let mut conflicted = entry();
        conflicted.path = Some("/a".into());
        conflicted.offset = Some(1);
        conflicted.references = vec!["SomeRule".into()];
        assert!(conflicted.validate().unwrap_err().is::<IgnoreListError>());

        let mut fine = entry();
        fine.path = Some("/a".into());
        fine.offset = Some(1);
        fine.validate().unwrap();

        // Setting both path and md5 stays loadable; path simply wins at
        // evaluation time.
        let mut multi_shape = entry();
        multi_shape.path = Some("/a".into());
        multi_shape.md5 = Some("abc".into());
        multi_shape.validate().unwrap();
    }

    #[test]
    fn test_from_file_flattens_includes() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("child.json"),
            r#"{"ignore": [{"path": "/child", "reason": "from child"}]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("ignore.json"),
            r#"{"include": ["child.json"],
                "ignore": [{"path": "/parent", "reason": "from parent"}]}"#,
        )
        .unwrap();

        let list = from_file(&dir.path().join("ignore.json")).unwrap();
        assert!(list.include.is_empty());
        assert_eq!(list.ignore.len(), 2);
        assert_eq!(list.ignore[0].reason, "from parent");
        assert_eq!(list.ignore[1].reason, "from child");
    }

    #[test]
    fn test_from_file_rejects_invalid_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("ignore.json"),
            r#"{"ignore": [{"reason": "no shape at all"}]}"#,
        )
        .unwrap();

        let err = from_file(&dir.path().join("ignore.json")).unwrap_err();
        assert!(err.is::<IgnoreListError>());
    }
}
