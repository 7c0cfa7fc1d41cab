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

//! The discovery engine: walks the scan roots, hashes and classifies every
//! file, expands containers into the cache, and feeds the extracted members
//! back into the pipeline.
//!
//! Work is dynamic: an archive discovered late in the scan enqueues more
//! metadata jobs. The driver consumes a completion channel and keeps
//! submitting while draining; termination is reached only when the
//! outstanding-job counter hits zero, so a single "as completed" pass over
//! the initial job list would not be enough.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use md5::{Digest, Md5};
use walkdir::WalkDir;

use crate::errors::{FileAccess, InvalidFile};
use crate::extract;
use crate::magic::{self, Format};
use crate::store::{Artifact, ArtifactStore};
use crate::{ARCHIVE_FILE_SEPARATOR, CHUNK_SIZE};

/// Recursively walks a path, returning every regular file. Symlinks are
/// never followed, for files or directories, to avoid cycles and to stay
/// inside the scan root.
pub fn walk_files(root: &Path, skip_on_corrupt: bool) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();

    // A plain file as the root is scanned directly.
    if root.is_file() {
        entries.push(root.to_path_buf());
        return Ok(entries);
    }

    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    entries.push(entry.into_path());
                }
            }
            Err(err) => {
                if skip_on_corrupt {
                    warn!("skipping unreadable entry under {}: {}", root.display(), err);
                } else {
                    return Err(anyhow::Error::new(FileAccess(format!(
                        "unable to walk {}: {}",
                        root.display(),
                        err
                    ))));
                }
            }
        }
    }
    Ok(entries)
}

/// Streams a file through MD5 in `CHUNK_SIZE` chunks, keeping the first and
/// last chunks for head and tail classification.
fn file_metadata(path: &Path) -> Result<(String, Option<Format>)> {
    let mut file = File::open(path).map_err(|err| {
        anyhow::Error::new(FileAccess(format!(
            "unable to open file at {}: {}",
            path.display(),
            err
        )))
    })?;

    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut head: Vec<u8> = Vec::new();
    let mut tail: Vec<u8> = Vec::new();

    loop {
        // Fill the whole chunk where possible so magic offsets line up.
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let count = file.read(&mut buf[filled..]).map_err(|err| {
                anyhow::Error::new(FileAccess(format!(
                    "unable to read file at {}: {}",
                    path.display(),
                    err
                )))
            })?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        if filled == 0 {
            break;
        }

        hasher.update(&buf[..filled]);
        if head.is_empty() {
            head = buf[..filled].to_vec();
        }
        tail = buf[..filled].to_vec();
        if filled < CHUNK_SIZE {
            break;
        }
    }

    let md5 = hex::encode(hasher.finalize());
    let mime = magic::classify_chunks(&head, &tail);
    Ok((md5, mime))
}

enum Job {
    /// Hash and classify one file.
    Metadata {
        path: PathBuf,
        overlay: Option<String>,
        parent: Option<usize>,
    },
    /// Expand a container artifact into the cache and list its members.
    Expand {
        index: usize,
        path: PathBuf,
        base: String,
        mime: Format,
    },
}

enum Completion {
    Metadata {
        path: PathBuf,
        overlay: Option<String>,
        parent: Option<usize>,
        result: Result<(String, Option<Format>)>,
    },
    Expanded {
        index: usize,
        base: String,
        /// Extracted members as (absolute path, path relative to the unpack
        /// directory) pairs.
        result: Result<Vec<(PathBuf, String)>>,
    },
    /// Job observed the shutdown flag and did nothing.
    Skipped,
}

fn expand_container(
    store: &ArtifactStore,
    path: &Path,
    mime: Format,
    skip_on_corrupt: bool,
    cancel: &AtomicBool,
) -> Result<Vec<(PathBuf, String)>> {
    let destination = store.allocate_subdir(path)?;
    extract::extract(mime, path, &destination, cancel)?;

    let mut members = Vec::new();
    for member in walk_files(&destination, skip_on_corrupt)? {
        let relative = member
            .strip_prefix(&destination)
            .unwrap_or(&member)
            .display()
            .to_string();
        members.push((member, relative));
    }
    Ok(members)
}

fn worker(
    store: Arc<ArtifactStore>,
    jobs: Receiver<Job>,
    completions: Sender<Completion>,
    skip_on_corrupt: bool,
    cancel: Arc<AtomicBool>,
) {
    for job in jobs.iter() {
        if cancel.load(Ordering::Relaxed) {
            // Still complete the job so the driver's accounting drains.
            if completions.send(Completion::Skipped).is_err() {
                break;
            }
            continue;
        }

        let completion = match job {
            Job::Metadata {
                path,
                overlay,
                parent,
            } => {
                let result = file_metadata(&path);
                Completion::Metadata {
                    path,
                    overlay,
                    parent,
                    result,
                }
            }
            Job::Expand {
                index,
                path,
                base,
                mime,
            } => Completion::Expanded {
                index,
                base,
                result: expand_container(&store, &path, mime, skip_on_corrupt, &cancel),
            },
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
}

/// Walks the scan roots and produces the artifact table, expanding every
/// container found along the way.
///
/// Per-file access errors are swallowed with a warning when
/// `skip_on_corrupt` is set and abort the scan otherwise. A malformed
/// archive is always demoted to a warning: the artifact stays in the table,
/// unexpanded.
pub fn discover(
    roots: &[PathBuf],
    store: &Arc<ArtifactStore>,
    workers: usize,
    skip_on_corrupt: bool,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<Artifact>> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers.max(1) {
        let store = Arc::clone(store);
        let jobs = job_rx.clone();
        let completions = done_tx.clone();
        let cancel = Arc::clone(cancel);
        handles.push(thread::spawn(move || {
            worker(store, jobs, completions, skip_on_corrupt, cancel)
        }));
    }
    drop(done_tx);

    let mut outstanding = 0usize;
    let mut fatal: Option<anyhow::Error> = None;

    for root in roots {
        match walk_files(root, skip_on_corrupt) {
            Ok(files) => {
                for path in files {
                    job_tx
                        .send(Job::Metadata {
                            path,
                            overlay: None,
                            parent: None,
                        })
                        .expect("job channel closed");
                    outstanding += 1;
                }
            }
            Err(err) => {
                fatal = Some(err);
                cancel.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    // Completions may submit new jobs while we drain; the scan is done only
    // when every submitted job has completed.
    while outstanding > 0 {
        let completion = match done_rx.recv() {
            Ok(completion) => completion,
            Err(_) => break,
        };
        outstanding -= 1;

        match completion {
            Completion::Skipped => (),
            Completion::Metadata {
                path,
                overlay,
                parent,
                result,
            } => match result {
                Ok((md5, mime)) => {
                    let base = overlay.clone().unwrap_or_else(|| path.display().to_string());
                    let index = store.record(Artifact {
                        path: path.clone(),
                        md5,
                        mime,
                        overlay,
                        parent,
                    });
                    if let Some(mime) = mime {
                        if fatal.is_none() {
                            debug!("expanding {} ({})", path.display(), mime.tag());
                            job_tx
                                .send(Job::Expand {
                                    index,
                                    path,
                                    base,
                                    mime,
                                })
                                .expect("job channel closed");
                            outstanding += 1;
                        }
                    }
                }
                Err(err) if err.is::<FileAccess>() && skip_on_corrupt => {
                    warn!("{:#}", err);
                }
                Err(err) => {
                    if fatal.is_none() {
                        cancel.store(true, Ordering::Relaxed);
                        fatal = Some(err);
                    }
                }
            },
            Completion::Expanded {
                index,
                base,
                result,
            } => match result {
                Ok(members) => {
                    if fatal.is_none() {
                        for (path, relative) in members {
                            let overlay =
                                format!("{}{}{}", base, ARCHIVE_FILE_SEPARATOR, relative);
                            job_tx
                                .send(Job::Metadata {
                                    path,
                                    overlay: Some(overlay),
                                    parent: Some(index),
                                })
                                .expect("job channel closed");
                            outstanding += 1;
                        }
                    }
                }
                // A corrupt inner file must not fail the whole run.
                Err(err) if err.is::<InvalidFile>() => {
                    warn!("{:#}", err);
                }
                Err(err) if err.is::<FileAccess>() && skip_on_corrupt => {
                    warn!("{:#}", err);
                }
                Err(err) => {
                    if fatal.is_none() {
                        cancel.store(true, Ordering::Relaxed);
                        fatal = Some(err);
                    }
                }
            },
        }
    }

    drop(job_tx);
    for handle in handles {
        let _ = handle.join();
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(store.snapshot()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn nested_tar_gz() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(20);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "cred.txt", &b"AKIA0123456789ABCDEF"[..])
            .unwrap();
        let tarball = builder.into_inner().unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tarball).unwrap();
        encoder.finish().unwrap()
    }

    fn run_discovery(
        roots: &[PathBuf],
        cache: &Path,
        skip_on_corrupt: bool,
    ) -> (Arc<ArtifactStore>, Result<Vec<Artifact>>) {
        let store = Arc::new(ArtifactStore::create(cache).unwrap());
        let cancel = Arc::new(AtomicBool::new(false));
        let result = discover(roots, &store, 4, skip_on_corrupt, &cancel);
        (store, result)
    }

    #[test]
    fn test_nested_archive_expansion() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.tar.gz"), nested_tar_gz()).unwrap();

        let cache = dir.path().join("cache");
        fs::create_dir(&cache).unwrap();
        let (store, result) = run_discovery(&[root.clone()], &cache, true);
        let table = result.unwrap();

        // Three artifacts: the gzip, the inner tar, the credential file.
        assert_eq!(table.len(), 3);

        let outer = table.iter().position(|a| a.path.ends_with("a.tar.gz")).unwrap();
        let inner = table.iter().position(|a| a.path.ends_with("a.tar")).unwrap();
        let leaf = table.iter().position(|a| a.path.ends_with("cred.txt")).unwrap();

        assert_eq!(table[outer].mime, Some(Format::Gzip));
        assert_eq!(table[outer].parent, None);
        assert_eq!(table[inner].mime, Some(Format::Tar));
        assert_eq!(table[inner].parent, Some(outer));
        assert_eq!(table[leaf].mime, None);
        assert_eq!(table[leaf].parent, Some(inner));

        // Parent always precedes child.
        for (index, artifact) in table.iter().enumerate() {
            if let Some(parent) = artifact.parent {
                assert!(parent < index);
            }
        }

        // The overlay carries the archive genealogy.
        let expected = format!(
            "{}!a.tar!cred.txt",
            root.join("a.tar.gz").display()
        );
        assert_eq!(table[leaf].overlay.as_deref(), Some(expected.as_str()));
        assert_eq!(store.virtual_path(&table, leaf), expected);

        // The leaf's digest is the digest of the credential bytes.
        assert_eq!(table[leaf].md5, "b2e374e5db2573861c5afd6b2c0478f1");
    }

    #[test]
    fn test_corrupt_archive_is_recorded_but_not_expanded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("broken.gz"), b"\x1f\x8bGARBAGE GARBAGE").unwrap();

        let cache = dir.path().join("cache");
        fs::create_dir(&cache).unwrap();
        let (_store, result) = run_discovery(&[root], &cache, true);
        let table = result.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table[0].mime, Some(Format::Gzip));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("real.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(&root, root.join("cycle")).unwrap();

        let cache = dir.path().join("cache");
        fs::create_dir(&cache).unwrap();
        let (_store, result) = run_discovery(&[root], &cache, true);
        let table = result.unwrap();

        assert_eq!(table.len(), 1);
        assert!(table[0].path.ends_with("real.txt"));
    }

    #[test]
    fn test_missing_root_fails_without_skip() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir(&cache).unwrap();

        let missing = dir.path().join("no-such-root");
        let (_store, result) = run_discovery(&[missing], &cache, false);
        assert!(result.unwrap_err().is::<FileAccess>());
    }

    #[test]
    fn test_plain_file_root_is_scanned() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("single.txt");
        fs::write(&file, b"just one file").unwrap();

        let cache = dir.path().join("cache");
        fs::create_dir(&cache).unwrap();
        let (_store, result) = run_discovery(&[file], &cache, true);
        let table = result.unwrap();
        assert_eq!(table.len(), 1);
        assert!(table[0].overlay.is_none());
    }
}
