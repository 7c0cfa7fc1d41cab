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

//! Data model for credential findings.

use serde::Serialize;

/// Default confidence assigned to a finding when the rule carries no
/// accuracy metadata.
pub const DEFAULT_CONFIDENCE: u32 = 50;

/// The location of a finding in the input file.
#[derive(Debug, Clone, Serialize)]
pub struct Location {
    /// The offset from the start of the file, in bytes.
    pub offset: u64,
    /// The line number which contains the finding. Only present for text
    /// files; the count of newlines before the match offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

/// The content and context of a finding.
///
/// `before`, `content`, and `after` are base64 encoded when `binary` is set,
/// and plain UTF-8 otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    /// The number of bytes before and after a finding included in the sample.
    pub window: usize,
    /// The contents of up to `window` bytes before the finding.
    pub before: String,
    /// The contents of the finding itself.
    pub content: String,
    /// The contents of up to `window` bytes after the finding.
    pub after: String,
    /// Indicates that the sample is from a binary file and base64 encoded.
    pub binary: bool,
}

/// The origin of a finding.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// The module (rule pack namespace) which generated the finding.
    pub module: String,
    /// The identifier of the rule which generated the finding.
    pub rule: String,
    /// The version of the rule, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// A description of the finding, if the rule provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A suppression annotation attached by the ignore list.
#[derive(Debug, Clone, Serialize)]
pub struct Ignored {
    /// The justification from the matching ignore list entry.
    pub reason: String,
}

/// One credential hit.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    /// The reporting path: the overlay path if the file lives inside an
    /// archive, otherwise the on-disk path.
    pub path: String,
    /// The MD5 sum of the file the finding is in.
    pub md5: String,
    /// The confidence of the finding.
    pub confidence: u32,
    pub location: Location,
    pub sample: Sample,
    pub source: Source,
    /// Set when an ignore list entry suppressed the finding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<Ignored>,
}

impl Finding {
    /// Whether the finding has been suppressed by the ignore list.
    pub fn is_suppressed(&self) -> bool {
        self.ignored.is_some()
    }
}
