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

//! SARIF v2.1.0 rendering of findings.
//!
//! Nested archives are expressed through the artifacts table: every `!`
//! boundary in a finding's path becomes one artifact entry whose
//! `parentIndex` points at its containing archive, mirroring the artifact
//! genealogy built during discovery.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::finding::Finding;
use crate::ARCHIVE_FILE_SEPARATOR;

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA_URI: &str =
    "https://schemastore.azurewebsites.net/schemas/json/sarif-2.1.0.json";
const SARIF_URI_BASE_ID: &str = "SCANROOT";

/// Maps the confidence of a finding to a SARIF level.
fn confidence_to_level(confidence: u32) -> &'static str {
    if confidence < 70 {
        "warning"
    } else {
        "error"
    }
}

#[derive(Debug)]
struct ArtifactEntry {
    uri: String,
    parent: Option<usize>,
    md5: Option<String>,
}

/// Strips the scan root from a path so base-relative URIs resolve against
/// `originalUriBaseIds`.
fn relative_to_root(path: &str, root: &str) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .trim_start_matches('/')
        .to_string()
}

/// Adds the artifact chain for a finding, reusing entries that share both
/// uri and ancestry, and returns the index of the innermost artifact.
fn add_artifact(root: &str, finding: &Finding, artifacts: &mut Vec<ArtifactEntry>) -> usize {
    let mut parent: Option<usize> = None;

    for real_path in finding.path.split(ARCHIVE_FILE_SEPARATOR) {
        let uri = relative_to_root(real_path, root);
        let existing = artifacts
            .iter()
            .position(|entry| entry.uri == uri && entry.parent == parent);
        parent = Some(match existing {
            Some(index) => index,
            None => {
                artifacts.push(ArtifactEntry {
                    uri,
                    parent,
                    md5: None,
                });
                artifacts.len() - 1
            }
        });
    }

    let index = parent.unwrap_or(0);
    artifacts[index].md5 = Some(finding.md5.clone());
    index
}

/// Re-encodes a binary sample's window as one base64 string rather than
/// three concatenated ones.
fn binary_context(finding: &Finding) -> Result<String> {
    let mut raw = Vec::new();
    for part in [
        &finding.sample.before,
        &finding.sample.content,
        &finding.sample.after,
    ] {
        raw.extend(base64::decode(part).context("decoding stored sample")?);
    }
    Ok(base64::encode(&raw))
}

/// Renders the findings as a SARIF document.
pub fn render(root: &str, findings: &[Finding]) -> Result<String> {
    let mut rules: Vec<Value> = Vec::new();
    let mut results: Vec<Value> = Vec::new();
    let mut artifacts: Vec<ArtifactEntry> = Vec::new();

    for finding in findings {
        let (artifact_content, context_content) = if finding.sample.binary {
            (
                json!({ "binary": finding.sample.content }),
                json!({ "binary": binary_context(finding)? }),
            )
        } else {
            (
                json!({ "text": finding.sample.content }),
                json!({
                    "text": format!(
                        "{}{}{}",
                        finding.sample.before, finding.sample.content, finding.sample.after
                    )
                }),
            )
        };

        let mut region = json!({
            "byteOffset": finding.location.offset,
            "snippet": artifact_content,
        });
        // Line numbers are best-effort; binary input has none.
        if let Some(line) = finding.location.line {
            if line > 0 {
                region["startLine"] = json!(line);
            }
        }

        let index = add_artifact(root, finding, &mut artifacts);

        // The innermost path component is what the region points at.
        let inner_path = finding
            .path
            .split(ARCHIVE_FILE_SEPARATOR)
            .last()
            .unwrap_or(&finding.path);
        let physical_location = json!({
            "physicalLocation": {
                "region": region,
                "contextRegion": { "snippet": context_content },
                "artifactLocation": {
                    "uri": relative_to_root(inner_path, root),
                    "index": index,
                    "uriBaseId": SARIF_URI_BASE_ID,
                },
            },
        });

        if !rules
            .iter()
            .any(|rule| rule["id"] == json!(finding.source.rule))
        {
            rules.push(json!({
                "id": finding.source.rule,
                "shortDescription": { "text": finding.source.description },
            }));
        }

        let mut suppressions: Vec<Value> = Vec::new();
        if let Some(ignored) = &finding.ignored {
            suppressions.push(json!({
                "kind": "external",
                "status": "accepted",
                "justification": ignored.reason,
            }));
        }

        results.push(json!({
            "message": { "text": finding.source.description },
            "level": confidence_to_level(finding.confidence),
            "ruleId": finding.source.rule,
            "locations": [ physical_location ],
            "suppressions": suppressions,
        }));
    }

    let artifacts: Vec<Value> = artifacts
        .iter()
        .map(|entry| {
            let mut value = json!({
                "location": {
                    "uri": entry.uri,
                    "uriBaseId": SARIF_URI_BASE_ID,
                },
            });
            if let Some(parent) = entry.parent {
                value["parentIndex"] = json!(parent);
            }
            if let Some(md5) = &entry.md5 {
                value["hashes"] = json!({ "md5": md5 });
            }
            value
        })
        .collect();

    let document = json!({
        "version": SARIF_VERSION,
        "$schema": SARIF_SCHEMA_URI,
        "runs": [{
            "tool": {
                "driver": {
                    "name": "CREDSIFT",
                    "version": env!("CARGO_PKG_VERSION"),
                    "informationUri": "https://github.com/credsift/credsift",
                    "downloadUri": "https://github.com/credsift/credsift",
                    "rules": rules,
                },
            },
            "results": results,
            "artifacts": artifacts,
            "originalUriBaseIds": {
                (SARIF_URI_BASE_ID): {
                    "uri": format!("file://{}/", root.trim_end_matches('/')),
                },
            },
        }],
    });

    serde_json::to_string(&document).context("serialising SARIF document")
}
