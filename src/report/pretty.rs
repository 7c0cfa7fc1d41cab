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

//! Human-readable rendering of findings for terminal use. Suppressed
//! findings are omitted; nested archive paths are drawn as an indented
//! tree along the `!` boundaries.

use anyhow::{Context, Result};

use crate::finding::{Finding, Sample};
use crate::ARCHIVE_FILE_SEPARATOR;

/// Draws the virtual path of a finding as a file tree, one level per
/// archive boundary.
fn file_tree(virtual_path: &str) -> String {
    let mut tree = String::new();
    for (index, part) in virtual_path.split(ARCHIVE_FILE_SEPARATOR).enumerate() {
        tree.push_str(&" ".repeat(index * 4));
        tree.push_str("`-- ");
        tree.push_str(part);
        tree.push('\n');
    }
    tree.trim_end().to_string()
}

/// Renders the sample window as one string: re-encoded to a single base64
/// run for binary samples, concatenated text otherwise.
fn render_sample(sample: &Sample) -> Result<String> {
    if sample.binary {
        let mut raw = Vec::new();
        for part in [&sample.before, &sample.content, &sample.after] {
            raw.extend(base64::decode(part).context("decoding stored sample")?);
        }
        return Ok(base64::encode(&raw));
    }
    Ok(format!("{}{}{}", sample.before, sample.content, sample.after))
}

fn push_indented(out: &mut String, text: &str, indent: usize) {
    for line in text.lines() {
        out.push_str(&" ".repeat(indent));
        out.push_str(line);
        out.push('\n');
    }
}

/// Renders unsuppressed findings as a report for human consumption.
pub fn render(findings: &[Finding]) -> Result<String> {
    let unsuppressed: Vec<&Finding> =
        findings.iter().filter(|f| !f.is_suppressed()).collect();

    let mut out = String::new();
    if unsuppressed.is_empty() {
        out.push_str("No unsuppressed findings.\n");
        return Ok(out);
    }

    let files: std::collections::BTreeSet<&str> = unsuppressed
        .iter()
        .map(|finding| finding.path.as_str())
        .collect();
    out.push_str(&format!(
        "There were {} unsuppressed findings in {} files\n\n",
        unsuppressed.len(),
        files.len()
    ));

    for finding in unsuppressed {
        let outer = finding
            .path
            .split(ARCHIVE_FILE_SEPARATOR)
            .next()
            .unwrap_or(&finding.path);
        if finding.path.contains(ARCHIVE_FILE_SEPARATOR) {
            out.push_str(&format!("Finding inside of file {} (nested)\n", outer));
        } else {
            out.push_str(&format!("Finding inside of file {}\n", outer));
        }

        let location = match finding.location.line {
            Some(line) if line > 0 => format!("line {}", line),
            _ => format!("{}-bytes", finding.location.offset),
        };
        push_indented(
            &mut out,
            &format!(
                "Reason   : {}",
                finding.source.description.as_deref().unwrap_or("-")
            ),
            4,
        );
        push_indented(&mut out, &format!("Rule Id  : {}", finding.source.rule), 4);
        push_indented(&mut out, &format!("Location : {}", location), 4);
        out.push('\n');
        push_indented(&mut out, &file_tree(&finding.path), 4);
        out.push('\n');
        push_indented(
            &mut out,
            &format!("... {} ...", render_sample(&finding.sample)?),
            4,
        );
        out.push('\n');
    }

    Ok(out)
}
