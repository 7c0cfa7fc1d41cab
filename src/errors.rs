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

//! Error markers used to classify failures at the worker-pool boundary.
//!
//! Workers return `anyhow::Result` with one of these types at the root of
//! the chain; the driver decides fatality with `Error::is::<T>()` rather
//! than matching on strings.

/// A file could not be opened, read, or created.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FileAccess(pub String);

/// A file's magic matched a known format but its contents were malformed.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidFile(pub String);

/// A rule did not match the expected format and could not be compiled.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidFormat(pub String);

/// An ignore list failed schema validation or contained a bad pattern.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct IgnoreListError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_through_context() {
        let err = anyhow::Error::new(FileAccess("unable to open /nope".into()))
            .context("reading metadata");
        assert!(err.is::<FileAccess>());
        assert!(!err.is::<InvalidFile>());
    }
}
