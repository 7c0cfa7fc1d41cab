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

//! Extractors for multi-member archive formats backed by format crates.
//!
//! zip and tar delegate wholesale to their crates' extraction. The rest
//! (cpio, ar, cab) are drained entry by entry through the shared
//! [`EntrySink`], which owns member-path hygiene. 7z and rar extraction is
//! driven by their crates, which apply equivalent member confinement.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use super::{create_destination, EntrySink};
use crate::errors::{FileAccess, InvalidFile};

fn file_access(source: &Path, err: impl std::fmt::Display) -> anyhow::Error {
    anyhow::Error::new(FileAccess(format!(
        "unable to open file at {}: {}",
        source.display(),
        err
    )))
}

fn invalid(source: &Path, destination: &Path, err: impl std::fmt::Display) -> anyhow::Error {
    anyhow::Error::new(InvalidFile(format!(
        "unable to extract archive {} to {}: {}",
        source.display(),
        destination.display(),
        err
    )))
}

fn write_failed(destination: &Path, err: impl std::fmt::Display) -> anyhow::Error {
    anyhow::Error::new(FileAccess(format!(
        "unable to write extracted member under {}: {}",
        destination.display(),
        err
    )))
}

pub(super) fn tar(source: &Path, destination: &Path) -> Result<()> {
    create_destination(destination)?;
    let input = File::open(source).map_err(|err| file_access(source, err))?;
    let mut archive = ::tar::Archive::new(input);
    archive
        .unpack(destination)
        .map_err(|err| invalid(source, destination, err))?;
    Ok(())
}

pub(super) fn zip(source: &Path, destination: &Path) -> Result<()> {
    create_destination(destination)?;
    let input = File::open(source).map_err(|err| file_access(source, err))?;
    let mut archive =
        ::zip::ZipArchive::new(input).map_err(|err| invalid(source, destination, err))?;
    archive
        .extract(destination)
        .map_err(|err| invalid(source, destination, err))?;
    Ok(())
}

pub(super) fn cpio(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    create_destination(destination)?;
    let input = File::open(source).map_err(|err| file_access(source, err))?;
    drain_cpio(input, source, destination, cancel)
}

/// Drains a newc cpio stream into `destination`. Also used for the payload
/// of RPM packages, where `input` is the decompressed payload stream.
pub(super) fn drain_cpio<R: std::io::Read>(
    mut input: R,
    source: &Path,
    destination: &Path,
    cancel: &AtomicBool,
) -> Result<()> {
    let sink = EntrySink::new(destination);

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let mut reader =
            ::cpio::NewcReader::new(input).map_err(|err| invalid(source, destination, err))?;
        let entry = reader.entry();
        if entry.is_trailer() {
            break;
        }
        let name = entry.name().to_string();
        let is_dir = entry.mode() & 0o170000 == 0o040000;

        if is_dir {
            sink.write_dir(Path::new(&name))
                .map_err(|err| write_failed(destination, err))?;
        } else {
            sink.write_file(Path::new(&name), &mut reader)
                .map_err(|err| write_failed(destination, err))?;
        }
        input = reader
            .finish()
            .map_err(|err| invalid(source, destination, err))?;
    }
    Ok(())
}

pub(super) fn unix_ar(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    create_destination(destination)?;
    let sink = EntrySink::new(destination);
    let input = File::open(source).map_err(|err| file_access(source, err))?;
    let mut archive = ::ar::Archive::new(input);

    while let Some(entry) = archive.next_entry() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let mut entry = entry.map_err(|err| invalid(source, destination, err))?;
        let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();
        sink.write_file(Path::new(&name), &mut entry)
            .map_err(|err| write_failed(destination, err))?;
    }
    Ok(())
}

pub(super) fn cab(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    create_destination(destination)?;
    let sink = EntrySink::new(destination);
    let input = File::open(source).map_err(|err| file_access(source, err))?;
    let mut cabinet =
        ::cab::Cabinet::new(input).map_err(|err| invalid(source, destination, err))?;

    // Member names are gathered up front; reading borrows the cabinet.
    let names: Vec<String> = cabinet
        .folder_entries()
        .flat_map(|folder| folder.file_entries())
        .map(|file| file.name().to_string())
        .collect();

    for name in names {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let mut reader = cabinet
            .read_file(&name)
            .map_err(|err| invalid(source, destination, err))?;
        // Cabinet member paths are backslash-separated.
        let member = name.replace('\\', "/");
        sink.write_file(Path::new(&member), &mut reader)
            .map_err(|err| write_failed(destination, err))?;
    }
    Ok(())
}

pub(super) fn sevenz(source: &Path, destination: &Path) -> Result<()> {
    create_destination(destination)?;
    sevenz_rust2::decompress_file(source, destination)
        .map_err(|err| invalid(source, destination, err))?;
    Ok(())
}

pub(super) fn rar(source: &Path, destination: &Path) -> Result<()> {
    create_destination(destination)?;
    let mut archive = ::unrar::Archive::new(source)
        .open_for_processing()
        .map_err(|err| invalid(source, destination, err))?;

    while let Some(header) = archive
        .read_header()
        .map_err(|err| invalid(source, destination, err))?
    {
        archive = if header.entry().is_file() {
            header
                .extract_with_base(destination)
                .map_err(|err| invalid(source, destination, err))?
        } else {
            header
                .skip()
                .map_err(|err| invalid(source, destination, err))?
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Write};

    use tempfile::TempDir;

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_tar_extracts_members() {
        let dir = TempDir::new().unwrap();
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut header = ::tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "inner/cred.txt", &b"token"[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let source = dir.path().join("a.tar");
        fs::write(&source, bytes).unwrap();

        let destination = dir.path().join("out");
        tar(&source, &destination).unwrap();
        assert_eq!(
            fs::read(destination.join("inner/cred.txt")).unwrap(),
            b"token"
        );
    }

    #[test]
    fn test_zip_extracts_members() {
        let dir = TempDir::new().unwrap();
        let mut writer = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = ::zip::write::SimpleFileOptions::default()
            .compression_method(::zip::CompressionMethod::Stored);
        writer.start_file("nested/hello.txt", options).unwrap();
        writer.write_all(b"zipped").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let source = dir.path().join("a.zip");
        fs::write(&source, bytes).unwrap();

        let destination = dir.path().join("out");
        zip(&source, &destination).unwrap();
        assert_eq!(
            fs::read(destination.join("nested/hello.txt")).unwrap(),
            b"zipped"
        );
    }

    #[test]
    fn test_zip_bad_contents_is_invalid_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("bad.zip");
        fs::write(&source, b"PK\x03\x04but not really a zip").unwrap();

        let err = zip(&source, &dir.path().join("out")).unwrap_err();
        assert!(err.is::<InvalidFile>());
    }

    #[test]
    fn test_cpio_extracts_members() {
        let dir = TempDir::new().unwrap();
        let data = b"from cpio";
        let out = ::cpio::write_cpio(
            std::iter::once((
                ::cpio::NewcBuilder::new("payload/cred.txt").mode(0o100_644),
                Cursor::new(&data[..]),
            )),
            Vec::new(),
        )
        .unwrap();

        let source = dir.path().join("a.cpio");
        fs::write(&source, out).unwrap();

        let destination = dir.path().join("out");
        cpio(&source, &destination, &no_cancel()).unwrap();
        assert_eq!(
            fs::read(destination.join("payload/cred.txt")).unwrap(),
            data
        );
    }

    #[test]
    fn test_ar_extracts_members() {
        let dir = TempDir::new().unwrap();
        let mut builder = ::ar::Builder::new(Vec::new());
        let header = ::ar::Header::new(b"member.txt".to_vec(), 7);
        builder.append(&header, &b"archive"[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let source = dir.path().join("a.a");
        fs::write(&source, bytes).unwrap();

        let destination = dir.path().join("out");
        unix_ar(&source, &destination, &no_cancel()).unwrap();
        assert_eq!(fs::read(destination.join("member.txt")).unwrap(), b"archive");
    }

    #[test]
    fn test_cab_extracts_members() {
        let dir = TempDir::new().unwrap();
        let mut builder = ::cab::CabinetBuilder::new();
        builder
            .add_folder(::cab::CompressionType::None)
            .add_file("docs\\note.txt".to_string());
        let mut writer = builder.build(Cursor::new(Vec::new())).unwrap();
        while let Some(mut file) = writer.next_file().unwrap() {
            file.write_all(b"cabinet").unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();

        let source = dir.path().join("a.cab");
        fs::write(&source, bytes).unwrap();

        let destination = dir.path().join("out");
        cab(&source, &destination, &no_cancel()).unwrap();
        assert_eq!(
            fs::read(destination.join("docs/note.txt")).unwrap(),
            b"cabinet"
        );
    }

    #[test]
    fn test_tar_member_with_traversal_is_contained() {
        let dir = TempDir::new().unwrap();
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut header = ::tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        header.set_cksum();
        // Header construction may itself reject the traversal; if it gets
        // through, unpacking must still confine the member.
        if builder
            .append_data(&mut header, "../escape.txt", &b"nope"[..])
            .is_ok()
        {
            let bytes = builder.into_inner().unwrap();

            let source = dir.path().join("evil.tar");
            fs::write(&source, bytes).unwrap();

            let destination = dir.path().join("out");
            let _ = tar(&source, &destination);
            assert!(!dir.path().join("escape.txt").exists());
        }
    }
}
