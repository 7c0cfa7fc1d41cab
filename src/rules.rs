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

//! Rule pack loading and the rules-based scanner.
//!
//! A rule pack is a JSON document naming rule source files, grouped into
//! modules. Each source file holds byte-oriented regular expressions with
//! metadata. The whole pack compiles once at startup into a flat ruleset,
//! namespaced by the MD5 of each source path, and is then applied to every
//! non-container artifact on a worker pool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use log::{debug, warn};
use md5::{Digest, Md5};
use memmap2::Mmap;
use serde::Deserialize;

use crate::errors::{FileAccess, InvalidFormat};
use crate::finding::{Finding, Source, DEFAULT_CONFIDENCE};
use crate::sample;
use crate::store::Artifact;

fn default_module() -> String {
    "rules".to_string()
}

/// One rule source in a pack.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackEntry {
    /// The module (namespace) the rules belong to.
    #[serde(default = "default_module")]
    pub module: String,
    /// Path of the rule source file, relative to the pack file.
    pub path: String,
}

/// A rule pack document. `include` is resolved and emptied at load time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulePack {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub pack: Vec<PackEntry>,
}

/// Loads a rule pack from file, recursively flattening includes. Relative
/// paths are resolved against the file that names them; the returned pack
/// has an empty include list.
pub fn pack_from_file(filename: &Path) -> Result<RulePack> {
    let parent_file = fs::canonicalize(filename)
        .with_context(|| format!("resolving rule pack path {}", filename.display()))?;
    let parent_path = parent_file.parent().unwrap_or(Path::new("/")).to_path_buf();

    let raw = fs::read(&parent_file)
        .with_context(|| format!("reading rule pack {}", parent_file.display()))?;
    let mut pack: RulePack = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing rule pack {}", parent_file.display()))?;

    // Qualify rule paths against the directory of the containing file.
    for entry in &mut pack.pack {
        if !Path::new(&entry.path).is_absolute() {
            entry.path = parent_path.join(&entry.path).display().to_string();
        }
    }

    // Recursively load included packs, then strip the resolved includes.
    let includes = std::mem::take(&mut pack.include);
    for include in includes {
        let mut path = PathBuf::from(&include);
        if !path.is_absolute() {
            path = parent_path.join(path);
        }
        let child = pack_from_file(&path)?;
        pack.pack.extend(child.pack);
    }

    Ok(pack)
}

/// One rule as written in a rule source file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    /// Byte-oriented regular expression locating the credential.
    pub pattern: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Confidence assigned to matches, defaulting to 50.
    #[serde(default)]
    pub accuracy: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    rules: Vec<RuleSpec>,
}

#[derive(Debug)]
struct CompiledRule {
    module: String,
    /// Hex MD5 of the rule source path; keys the rule within the ruleset.
    #[allow(dead_code)]
    namespace: String,
    spec: RuleSpec,
    regex: regex::bytes::Regex,
}

/// The flat, compiled form of a rule pack.
#[derive(Debug)]
pub struct Ruleset {
    rules: Vec<CompiledRule>,
}

/// One raw match: where, how long, and which rule.
#[derive(Debug)]
struct RuleHit {
    offset: u64,
    length: usize,
    rule: usize,
}

impl Ruleset {
    /// Compiles every rule source named by the pack. Any parse or pattern
    /// failure is fatal.
    pub fn compile(pack: &RulePack) -> Result<Self> {
        let mut rules = Vec::new();

        for entry in &pack.pack {
            let path = Path::new(&entry.path);
            let raw = fs::read(path).map_err(|err| {
                anyhow::Error::new(InvalidFormat(format!(
                    "unable to read rule source {}: {}",
                    path.display(),
                    err
                )))
            })?;
            let file: RuleFile = serde_json::from_slice(&raw).map_err(|err| {
                anyhow::Error::new(InvalidFormat(format!(
                    "unable to parse rule source {}: {}",
                    path.display(),
                    err
                )))
            })?;

            let mut hasher = Md5::new();
            hasher.update(entry.path.as_bytes());
            let namespace = hex::encode(hasher.finalize());

            for spec in file.rules {
                let regex = regex::bytes::Regex::new(&spec.pattern).map_err(|err| {
                    anyhow::Error::new(InvalidFormat(format!(
                        "unable to compile rule {} from {}: {}",
                        spec.name,
                        path.display(),
                        err
                    )))
                })?;
                rules.push(CompiledRule {
                    module: entry.module.clone(),
                    namespace: namespace.clone(),
                    spec,
                    regex,
                });
            }
        }

        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies every rule to the file backing `target`, producing one
    /// finding per match.
    fn match_artifact(&self, target: &Artifact) -> Result<Vec<Finding>> {
        let file = fs::File::open(&target.path).map_err(|err| {
            anyhow::Error::new(FileAccess(format!(
                "unable to open file at {}: {}",
                target.path.display(),
                err
            )))
        })?;
        let length = file
            .metadata()
            .map_err(|err| {
                anyhow::Error::new(FileAccess(format!(
                    "unable to stat file at {}: {}",
                    target.path.display(),
                    err
                )))
            })?
            .len();
        if length == 0 {
            return Ok(Vec::new());
        }

        // Safety: the mapped file lives in the scan root or our private
        // cache; a concurrent truncation would at worst corrupt the match
        // data for this artifact.
        let map = unsafe { Mmap::map(&file) }.map_err(|err| {
            anyhow::Error::new(FileAccess(format!(
                "unable to map file at {}: {}",
                target.path.display(),
                err
            )))
        })?;

        let mut hits = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            for found in rule.regex.find_iter(&map) {
                hits.push(RuleHit {
                    offset: found.start() as u64,
                    length: found.end() - found.start(),
                    rule: index,
                });
            }
        }
        drop(map);

        let mut findings = Vec::with_capacity(hits.len());
        for hit in hits {
            let rule = &self.rules[hit.rule];
            findings.push(Finding {
                path: target.reporting_path(),
                md5: target.md5.clone(),
                confidence: rule.spec.accuracy.unwrap_or(DEFAULT_CONFIDENCE),
                location: sample::generate_location(&target.path, target.mime, hit.offset)?,
                sample: sample::generate_sample(
                    &target.path,
                    target.mime,
                    hit.offset,
                    hit.length,
                )?,
                source: Source {
                    module: rule.module.clone(),
                    rule: rule.spec.name.clone(),
                    version: rule.spec.version.clone(),
                    description: rule.spec.description.clone(),
                },
                ignored: None,
            });
        }
        Ok(findings)
    }
}

/// Runs the compiled ruleset over every non-container artifact, fanning the
/// work out over `workers` threads. Findings come back over a channel and
/// carry no ordering guarantee.
///
/// Archives themselves are rejected from scanning: their contents were
/// expanded, and matching the inner file gives the finding a precise path.
/// Credentials stuffed into archive metadata will not be found.
pub fn run(
    targets: &[Artifact],
    ruleset: &Arc<Ruleset>,
    workers: usize,
    skip_on_corrupt: bool,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<Finding>> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<Artifact>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<Result<Vec<Finding>>>();

    let mut submitted = 0usize;
    for target in targets {
        if target.mime.is_none() {
            job_tx.send(target.clone()).expect("job channel closed");
            submitted += 1;
        }
    }
    drop(job_tx);
    debug!("submitted {} of {} artifacts for matching", submitted, targets.len());

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers.max(1) {
        let job_rx = job_rx.clone();
        let done_tx = done_tx.clone();
        let ruleset = Arc::clone(ruleset);
        let cancel = Arc::clone(cancel);
        handles.push(thread::spawn(move || {
            for target in job_rx.iter() {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                // Errors travel back over the channel; the driver decides
                // fatality.
                if done_tx.send(ruleset.match_artifact(&target)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(done_tx);

    let mut findings = Vec::new();
    let mut fatal: Option<anyhow::Error> = None;
    for result in done_rx.iter() {
        match result {
            Ok(batch) => findings.extend(batch),
            Err(err) if err.is::<FileAccess>() && skip_on_corrupt => {
                warn!("{:#}", err);
            }
            Err(err) => {
                // Drain outstanding jobs, then surface the failure.
                if fatal.is_none() {
                    cancel.store(true, Ordering::Relaxed);
                    fatal = Some(err);
                }
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(findings),
    }
}
