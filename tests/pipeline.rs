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

//! End-to-end pipeline tests: discovery through matching and suppression.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use libcredsift::ignore::{self, IgnoreEntry, IgnoreList};
use libcredsift::rules::{PackEntry, RulePack, Ruleset};
use libcredsift::store::ArtifactStore;
use libcredsift::{discover, rules};

const CREDENTIAL: &[u8] = b"AKIA0123456789ABCDEF";

/// Builds `<dir>/root/a.tar.gz` holding `a.tar` holding `cred.txt` with the
/// credential at offset zero.
fn build_nested_root(dir: &Path) -> PathBuf {
    let root = dir.join("root");
    fs::create_dir(&root).unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(CREDENTIAL.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "cred.txt", CREDENTIAL)
        .unwrap();
    let tarball = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tarball).unwrap();
    fs::write(root.join("a.tar.gz"), encoder.finish().unwrap()).unwrap();
    root
}

fn build_ruleset(dir: &Path) -> Arc<Ruleset> {
    let rules_path = dir.join("rules.json");
    fs::write(
        &rules_path,
        r#"{"rules": [{"name": "aws_key_v1", "pattern": "AKIA[0-9A-Z]{16}",
            "description": "AWS access key id"}]}"#,
    )
    .unwrap();
    let pack = RulePack {
        include: vec![],
        pack: vec![PackEntry {
            module: "rules".into(),
            path: rules_path.display().to_string(),
        }],
    };
    Arc::new(Ruleset::compile(&pack).unwrap())
}

fn scan(dir: &TempDir, root: &Path) -> (Vec<libcredsift::store::Artifact>, Vec<libcredsift::finding::Finding>) {
    let cache = dir.path().join("cache");
    fs::create_dir_all(&cache).unwrap();
    let store = Arc::new(ArtifactStore::create(&cache).unwrap());
    let cancel = Arc::new(AtomicBool::new(false));

    let artifacts = discover::discover(
        &[root.to_path_buf()],
        &store,
        4,
        true,
        &cancel,
    )
    .unwrap();

    let ruleset = build_ruleset(dir.path());
    let findings = rules::run(&artifacts, &ruleset, 4, true, &cancel).unwrap();
    (artifacts, findings)
}

#[test]
fn test_nested_archive_scan() {
    let dir = TempDir::new().unwrap();
    let root = build_nested_root(dir.path());
    let (artifacts, findings) = scan(&dir, &root);

    // One artifact per ancestor in the genealogy.
    assert_eq!(artifacts.len(), 3);

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(
        finding.path,
        format!("{}!a.tar!cred.txt", root.join("a.tar.gz").display())
    );
    assert_eq!(finding.location.offset, 0);
    assert_eq!(finding.sample.before, "");
    assert_eq!(finding.sample.content, "AKIA0123456789ABCDEF");
    assert!(!finding.sample.binary);
    assert_eq!(finding.confidence, 50);
}

#[test]
fn test_no_finding_reports_a_container_path() {
    let dir = TempDir::new().unwrap();
    let root = build_nested_root(dir.path());
    let (artifacts, findings) = scan(&dir, &root);

    for finding in &findings {
        for artifact in &artifacts {
            if artifact.mime.is_some() {
                assert_ne!(finding.path, artifact.path.display().to_string());
            }
        }
    }
}

#[test]
fn test_suppression_by_hash_with_references() {
    let dir = TempDir::new().unwrap();
    let root = build_nested_root(dir.path());
    let (_artifacts, findings) = scan(&dir, &root);
    let md5 = findings[0].md5.clone();

    let entry = |references: Vec<String>| IgnoreEntry {
        path: None,
        pattern: None,
        md5: Some(md5.clone()),
        reason: "known fixture credential".into(),
        module: "rules".into(),
        references,
        offset: None,
    };

    // Reference set containing the finding's rule suppresses it.
    let list = IgnoreList {
        include: vec![],
        ignore: vec![entry(vec!["aws_key_v1".into(), "OtherRule".into()])],
    };
    let suppressed = ignore::process(findings.clone(), &list).unwrap();
    assert_eq!(suppressed.len(), findings.len());
    assert!(suppressed[0].is_suppressed());
    assert_eq!(
        suppressed[0].ignored.as_ref().unwrap().reason,
        "known fixture credential"
    );

    // A reference set without the rule does not.
    let list = IgnoreList {
        include: vec![],
        ignore: vec![entry(vec!["OtherRule".into()])],
    };
    let kept = ignore::process(findings, &list).unwrap();
    assert!(!kept[0].is_suppressed());
}

#[test]
fn test_suppression_preserves_length_and_order() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(root.join(name), CREDENTIAL).unwrap();
    }

    let (_artifacts, findings) = scan(&dir, &root);
    assert_eq!(findings.len(), 3);
    let paths: Vec<String> = findings.iter().map(|f| f.path.clone()).collect();

    let list = IgnoreList {
        include: vec![],
        ignore: vec![IgnoreEntry {
            path: None,
            pattern: Some(r"b\.txt$".into()),
            md5: None,
            reason: "test data".into(),
            module: "rules".into(),
            references: vec![],
            offset: None,
        }],
    };
    let suppressed = ignore::process(findings, &list).unwrap();
    let after: Vec<String> = suppressed.iter().map(|f| f.path.clone()).collect();
    assert_eq!(paths, after);
    assert_eq!(
        suppressed.iter().filter(|f| f.is_suppressed()).count(),
        1
    );
}
