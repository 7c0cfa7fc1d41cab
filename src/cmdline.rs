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

use std::path::PathBuf;

use clap::Parser;

// Args are listed in --help in the order declared in this struct. Please
// keep the entire help text to 80 columns.

/// Static credential and secret scanner for file trees, archives, and
/// disk images.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct ScanConfig {
    /// Increase verbosity of logs for debugging
    #[clap(long)]
    pub debug: bool,
    /// Render a human-readable report instead of SARIF
    #[clap(long)]
    pub pretty: bool,
    /// Number of worker threads used for each processing pool
    #[clap(long, value_name = "N", default_value = "10")]
    pub threads: usize,
    /// Path to the rule pack to load
    #[clap(long, value_name = "PATH", default_value = "~/.credsift/pack.json")]
    pub rule_pack: String,
    /// Path to the ignore list to load, if required
    #[clap(long, value_name = "PATH")]
    pub ignore_list: Option<String>,
    /// Warn and continue when a file cannot be read or unpacked
    #[clap(long)]
    pub skip_unprocessable: bool,
    /// Directory used as a cache when unpacking archives
    #[clap(long, value_name = "PATH", default_value = "/tmp")]
    pub cache_directory: PathBuf,
    /// Paths to scan
    #[clap(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Expands a leading `~/` against $HOME. Paths without a tilde pass
/// through untouched.
pub fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
