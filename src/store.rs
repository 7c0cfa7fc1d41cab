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

//! The on-disk unpack cache and the in-memory artifact genealogy.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::warn;
use md5::{Digest, Md5};

use crate::errors::FileAccess;
use crate::magic::Format;
use crate::ARCHIVE_FILE_SEPARATOR;

/// One discovered file. Created the first time a byte stream is scanned and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Absolute on-disk path of the file (inside the cache for extracted
    /// members).
    pub path: PathBuf,
    /// Hex MD5 digest of the file contents.
    pub md5: String,
    /// Detected container format, if any.
    pub mime: Option<Format>,
    /// The virtual path as it would appear to a user, using `!` as the
    /// archive-boundary separator. Unset for files found directly on disk.
    pub overlay: Option<String>,
    /// Index of the containing archive's artifact. Always less than this
    /// artifact's own index: parents are recorded before their children.
    pub parent: Option<usize>,
}

impl Artifact {
    /// The path reported to the user: the overlay if the file lives inside
    /// an archive, otherwise the real path.
    pub fn reporting_path(&self) -> String {
        match &self.overlay {
            Some(overlay) => overlay.clone(),
            None => self.path.display().to_string(),
        }
    }
}

/// Returns the hex MD5 of a path string, used for unique subdirectory
/// naming within a run.
pub fn path_hash(path: &Path) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.display().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Owns the per-run cache directory and the artifact table.
///
/// The cache directory is partitioned into per-archive subdirectories named
/// by the MD5 of the archive's real path, so concurrent extractors never
/// write into the same subtree.
pub struct ArtifactStore {
    root: PathBuf,
    table: Mutex<Vec<Artifact>>,
}

impl ArtifactStore {
    /// Creates the per-run cache directory under `cache_root`, named by the
    /// current time with microsecond resolution.
    pub fn create(cache_root: &Path) -> Result<Self> {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("reading system clock")?;
        let root = cache_root.join(epoch.as_micros().to_string());
        fs::create_dir_all(&root).with_context(|| {
            FileAccess(format!(
                "unable to create cache directory at {}",
                root.display()
            ))
        })?;

        Ok(Self {
            root,
            table: Mutex::new(Vec::new()),
        })
    }

    /// The root of the per-run cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The cache subdirectory an archive at `path` unpacks into.
    pub fn subdir_for(&self, path: &Path) -> PathBuf {
        self.root.join(path_hash(path))
    }

    /// Allocates a fresh extraction subdirectory for the archive at `path`.
    ///
    /// Any stale subdirectory from a previous extraction of the same path is
    /// removed first, so reruns on the same cache root start clean. The
    /// directory itself is created by the extractor, which owns the
    /// destination for the duration of the unpack.
    pub fn allocate_subdir(&self, path: &Path) -> Result<PathBuf> {
        let destination = self.subdir_for(path);
        if destination.exists() {
            fs::remove_dir_all(&destination).with_context(|| {
                FileAccess(format!(
                    "unable to clear stale unpack directory at {}",
                    destination.display()
                ))
            })?;
        }
        Ok(destination)
    }

    /// Appends an artifact to the table, returning its index.
    pub fn record(&self, artifact: Artifact) -> usize {
        let mut table = self.table.lock().expect("artifact table lock poisoned");
        table.push(artifact);
        table.len() - 1
    }

    /// The number of artifacts recorded so far.
    pub fn len(&self) -> usize {
        self.table.lock().expect("artifact table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones the current artifact table.
    pub fn snapshot(&self) -> Vec<Artifact> {
        self.table
            .lock()
            .expect("artifact table lock poisoned")
            .clone()
    }

    /// Rebuilds the user-visible virtual path of an artifact by walking
    /// parent indices to the root and joining with the archive separator.
    ///
    /// For artifacts produced by the discovery engine this is the same
    /// string as the stored overlay; it remains computable from the table
    /// alone.
    pub fn virtual_path(&self, table: &[Artifact], index: usize) -> String {
        let mut current = index;
        let mut tail = String::new();

        loop {
            let artifact = &table[current];
            match artifact.parent {
                None => {
                    let mut path = artifact.path.display().to_string();
                    if !tail.is_empty() {
                        path.push_str(ARCHIVE_FILE_SEPARATOR);
                        path.push_str(&tail);
                    }
                    return path;
                }
                Some(parent) => {
                    let parent_dir = self.subdir_for(&table[parent].path);
                    let relative = artifact
                        .path
                        .strip_prefix(&parent_dir)
                        .unwrap_or(&artifact.path)
                        .display()
                        .to_string();
                    tail = if tail.is_empty() {
                        relative
                    } else {
                        format!("{}{}{}", relative, ARCHIVE_FILE_SEPARATOR, tail)
                    };
                    current = parent;
                }
            }
        }
    }

    /// Removes the per-run cache directory. Stubborn files are logged and
    /// skipped; cleanup failure never fails the run.
    pub fn cleanup(&self) {
        if let Err(err) = fs::remove_dir_all(&self.root) {
            warn!(
                "unable to remove cache directory at {}: {}",
                self.root.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(path: &str, parent: Option<usize>) -> Artifact {
        Artifact {
            path: PathBuf::from(path),
            md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
            mime: None,
            overlay: None,
            parent,
        }
    }

    #[test]
    fn test_path_hash_is_stable_hex_md5() {
        // MD5 of the literal string "/a/a".
        assert_eq!(
            path_hash(Path::new("/a/a")),
            "53d2f747bfb64b793305f864a61a4f22"
        );
    }

    #[test]
    fn test_allocate_subdir_clears_stale_content() {
        let cache = TempDir::new().unwrap();
        let store = ArtifactStore::create(cache.path()).unwrap();

        let destination = store.allocate_subdir(Path::new("/input/a.tar")).unwrap();
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("stale.txt"), b"old").unwrap();

        let destination = store.allocate_subdir(Path::new("/input/a.tar")).unwrap();
        assert!(!destination.exists());
    }

    #[test]
    fn test_parent_precedes_child() {
        let cache = TempDir::new().unwrap();
        let store = ArtifactStore::create(cache.path()).unwrap();

        let root = store.record(artifact("/input/a.tar", None));
        let child = store.record(artifact("/cache/xx/inner.txt", Some(root)));
        assert!(root < child);

        let table = store.snapshot();
        for (index, entry) in table.iter().enumerate() {
            if let Some(parent) = entry.parent {
                assert!(parent < index);
            }
        }
    }

    #[test]
    fn test_virtual_path_reconstruction() {
        let cache = TempDir::new().unwrap();
        let store = ArtifactStore::create(cache.path()).unwrap();

        let outer_path = PathBuf::from("/input/a.tar.gz");
        let outer = store.record(artifact("/input/a.tar.gz", None));

        let inner_tar = store.subdir_for(&outer_path).join("a.tar");
        let inner = store.record(Artifact {
            path: inner_tar.clone(),
            md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
            mime: None,
            overlay: Some("/input/a.tar.gz!a.tar".into()),
            parent: Some(outer),
        });

        let leaf_path = store.subdir_for(&inner_tar).join("cred.txt");
        let leaf = store.record(Artifact {
            path: leaf_path,
            md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
            mime: None,
            overlay: Some("/input/a.tar.gz!a.tar!cred.txt".into()),
            parent: Some(inner),
        });

        let table = store.snapshot();
        assert_eq!(store.virtual_path(&table, outer), "/input/a.tar.gz");
        assert_eq!(
            store.virtual_path(&table, inner),
            "/input/a.tar.gz!a.tar"
        );
        assert_eq!(
            store.virtual_path(&table, leaf),
            "/input/a.tar.gz!a.tar!cred.txt"
        );
        // Reconstruction matches the overlay recorded at discovery time.
        assert_eq!(
            store.virtual_path(&table, leaf),
            table[leaf].overlay.clone().unwrap()
        );
    }

    #[test]
    fn test_shared_paths_differ_in_ancestry() {
        let cache = TempDir::new().unwrap();
        let store = ArtifactStore::create(cache.path()).unwrap();

        let a = store.record(artifact("/input/a.zip", None));
        let b = store.record(artifact("/input/b.zip", None));

        let under_a = store.subdir_for(Path::new("/input/a.zip")).join("x.txt");
        let under_b = store.subdir_for(Path::new("/input/b.zip")).join("x.txt");
        let left = store.record(Artifact {
            path: under_a,
            md5: String::new(),
            mime: None,
            overlay: None,
            parent: Some(a),
        });
        let right = store.record(Artifact {
            path: under_b,
            md5: String::new(),
            mime: None,
            overlay: None,
            parent: Some(b),
        });

        let table = store.snapshot();
        assert_ne!(
            store.virtual_path(&table, left),
            store.virtual_path(&table, right)
        );
    }
}
