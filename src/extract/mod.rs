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

//! Archive extraction.
//!
//! Every extractor shares one contract: `extract(source, destination)`
//! creates the destination directory and fills it with the expanded
//! members. Failures split into two kinds: file access (the destination
//! cannot be created or the source cannot be read) and invalid file (the
//! magic matched but the contents were malformed). An extractor must never
//! leave a partially-created destination behind without also returning the
//! failure, since a failed extract followed by a successful walk would
//! silently under-report.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::Result;

use crate::errors::FileAccess;
use crate::magic::Format;

mod archive;
mod dmg;
mod iso;
mod rpm;
mod stream;
mod xar;

pub use self::dmg::Dmg;
pub use self::xar::Xar;

/// Expands the archive at `source` into `destination` using the extractor
/// for `format`. The cancel flag is honoured between files, never
/// mid-stream.
pub fn extract(
    format: Format,
    source: &Path,
    destination: &Path,
    cancel: &AtomicBool,
) -> Result<()> {
    match format {
        Format::Gzip => stream::gzip(source, destination),
        Format::Bzip2 => stream::bzip2(source, destination),
        Format::Xz => stream::xz(source, destination),
        Format::Zlib => stream::zlib(source, destination),
        Format::Zstd => stream::zstd(source, destination),
        Format::Tar => archive::tar(source, destination),
        Format::Zip => archive::zip(source, destination),
        Format::Cpio => archive::cpio(source, destination, cancel),
        Format::UnixArchive => archive::unix_ar(source, destination, cancel),
        Format::Cab => archive::cab(source, destination, cancel),
        Format::SevenZip => archive::sevenz(source, destination),
        Format::Rar => archive::rar(source, destination),
        Format::Rpm => rpm::extract(source, destination, cancel),
        Format::Iso9660 => iso::extract(source, destination, cancel),
        Format::Xar => xar::extract(source, destination, cancel),
        Format::Dmg => dmg::extract(source, destination),
    }
}

/// Creates the unpack directory for an extractor.
pub(crate) fn create_destination(destination: &Path) -> Result<()> {
    fs::create_dir_all(destination).map_err(|err| {
        anyhow::Error::new(FileAccess(format!(
            "unable to create unpack directory at {}: {}",
            destination.display(),
            err
        )))
    })
}

/// Returns the output name for a single-stream codec: the source basename
/// with its final dot-suffix stripped, or the basename as-is when there is
/// no dot.
pub(crate) fn stripped_name(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Reduces an archive member name to a safe path relative to the unpack
/// destination.
///
/// Only normal components survive: `..`, `.`, root and prefix components
/// are dropped, so the joined path always resolves to a descendant of the
/// destination. Returns `None` when nothing remains.
pub(crate) fn clean_member_path(member: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in member.components() {
        if let Component::Normal(part) = component {
            clean.push(part);
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Writes archive members into a destination directory with uniform
/// hygiene: parents are created on demand, and a pre-existing regular file
/// is replaced where a directory needs to appear.
pub(crate) struct EntrySink<'a> {
    destination: &'a Path,
}

impl<'a> EntrySink<'a> {
    pub(crate) fn new(destination: &'a Path) -> Self {
        Self { destination }
    }

    /// Resolves a member name to its output path, or `None` if the member
    /// should be skipped.
    fn resolve(&self, member: &Path) -> Option<PathBuf> {
        clean_member_path(member).map(|clean| self.destination.join(clean))
    }

    fn ensure_parent(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if parent.is_file() {
                fs::remove_file(parent)?;
            }
            if !parent.is_dir() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Creates a directory member.
    pub(crate) fn write_dir(&self, member: &Path) -> std::io::Result<()> {
        let path = match self.resolve(member) {
            Some(path) => path,
            None => return Ok(()),
        };
        if path.is_file() {
            fs::remove_file(&path)?;
        }
        self.ensure_parent(&path)?;
        fs::create_dir_all(&path)
    }

    /// Creates a file member from a reader.
    pub(crate) fn write_file(
        &self,
        member: &Path,
        reader: &mut impl Read,
    ) -> std::io::Result<()> {
        let path = match self.resolve(member) {
            Some(path) => path,
            None => return Ok(()),
        };
        if path.is_dir() {
            return Ok(());
        }
        self.ensure_parent(&path)?;
        let mut out = fs::File::create(&path)?;
        std::io::copy(reader, &mut out)?;
        Ok(())
    }
}
