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

//! Static credential scanner for file trees, archives, nested archives,
//! and several container formats. The pipeline walks the input roots,
//! classifies files by content signature, expands containers into a
//! per-run cache while tracking the archive genealogy, matches a compiled
//! rule pack against every expanded file, and folds an ignore list over
//! the findings.

pub mod cmdline;
pub mod discover;
pub mod errors;
pub mod extract;
pub mod finding;
pub mod ignore;
pub mod magic;
pub mod report;
pub mod rules;
pub mod sample;
pub mod store;

/// The size of chunks used when reading files.
pub const CHUNK_SIZE: usize = 65536;

/// The size, in bytes, of the sample window captured around a finding.
pub const WINDOW_SIZE: usize = 20;

/// Separator used when constructing virtual paths to findings which are
/// inside of archives.
pub const ARCHIVE_FILE_SEPARATOR: &str = "!";

/// Exit code used when the scan succeeded but unsuppressed findings remain.
pub const EXIT_CODE_UNSUPPRESSED: i32 = 100;
