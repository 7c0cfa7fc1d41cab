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

//! Minimal ISO 9660 reader used to drain disc images into the cache. Only
//! the fields needed for extraction are parsed; extensions such as Rock
//! Ridge and Joliet are not supported.
//!
//! The primary reference for this module is https://wiki.osdev.org/ISO_9660.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use bytes::{Buf, Bytes};

use super::{create_destination, EntrySink};
use crate::errors::{FileAccess, InvalidFile};
use crate::CHUNK_SIZE;

const SECTOR_SIZE: usize = 2048;

/// A directory extent: name plus the sector address and byte length of its
/// records.
#[derive(Debug, Clone)]
struct IsoDirectory {
    name: String,
    address: u32,
    length: u32,
}

/// A file extent.
#[derive(Debug, Clone)]
struct IsoFile {
    name: String,
    address: u32,
    length: u32,
}

#[derive(Debug, Clone)]
enum IsoRecord {
    Directory(IsoDirectory),
    File(IsoFile),
}

struct IsoFs {
    file: File,
    root: IsoDirectory,
}

impl IsoFs {
    fn from_file(mut file: File) -> std::result::Result<Self, String> {
        let root = find_root_directory(&mut file)?;
        Ok(Self { file, root })
    }

    /// Reads the records of one directory extent.
    fn list_dir(&mut self, dir: &IsoDirectory) -> std::result::Result<IsoDirIterator, String> {
        self.file
            .seek(SeekFrom::Start(dir.address as u64 * SECTOR_SIZE as u64))
            .map_err(|err| format!("seeking to directory {}: {}", dir.name, err))?;
        let mut buf = vec![0; dir.length as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|err| format!("reading directory {}: {}", dir.name, err))?;
        Ok(IsoDirIterator {
            dir: Bytes::from(buf),
            length: dir.length,
        })
    }

    /// Collects every record in the image, depth-first, with its path
    /// relative to the image root.
    fn walk(&mut self) -> std::result::Result<Vec<(PathBuf, IsoRecord)>, String> {
        let root = self.root.clone();
        let mut out = Vec::new();
        let mut pending = vec![(PathBuf::new(), root)];

        while let Some((prefix, dir)) = pending.pop() {
            for record in self.list_dir(&dir)? {
                let record = record?;
                match record {
                    IsoRecord::Directory(d) => {
                        let path = prefix.join(&d.name);
                        out.push((path.clone(), IsoRecord::Directory(d.clone())));
                        pending.push((path, d));
                    }
                    IsoRecord::File(f) => {
                        out.push((prefix.join(&f.name), IsoRecord::File(f)));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Returns a reader over a file extent's contents.
    fn read_file(&mut self, file: &IsoFile) -> std::result::Result<impl Read + '_, String> {
        self.file
            .seek(SeekFrom::Start(file.address as u64 * SECTOR_SIZE as u64))
            .map_err(|err| format!("seeking to file {}: {}", file.name, err))?;
        Ok(BufReader::with_capacity(
            CHUNK_SIZE,
            (&self.file).take(file.length as u64),
        ))
    }
}

/// Scans the volume descriptors for the primary descriptor and returns its
/// root directory record.
fn find_root_directory(file: &mut File) -> std::result::Result<IsoDirectory, String> {
    const VOLUME_DESCRIPTORS_START: u64 = 0x10 * SECTOR_SIZE as u64;
    const TYPE_PRIMARY: u8 = 1;
    const TYPE_TERMINATOR: u8 = 255;

    file.seek(SeekFrom::Start(VOLUME_DESCRIPTORS_START))
        .map_err(|err| format!("seeking to volume descriptors: {}", err))?;

    loop {
        let mut buf = vec![0; SECTOR_SIZE];
        file.read_exact(&mut buf)
            .map_err(|err| format!("reading volume descriptor: {}", err))?;
        let buf = &mut Bytes::from(buf);

        let type_id = buf.get_u8();
        if buf.copy_to_bytes(5) != &b"CD001"[..] {
            return Err("unknown volume descriptor ID".into());
        }
        if buf.get_u8() != 1 {
            return Err("unknown volume descriptor version".into());
        }
        match type_id {
            TYPE_PRIMARY => {
                // The root directory record sits at a fixed offset inside
                // the primary descriptor: 156 bytes from the sector start,
                // of which 7 have been consumed.
                buf.advance(156 - 7);
                return match next_record(buf, 34, true)? {
                    Some(IsoRecord::Directory(d)) => Ok(d),
                    _ => Err("failed to parse root directory record".into()),
                };
            }
            TYPE_TERMINATOR => return Err("no primary volume descriptor found".into()),
            _ => continue,
        }
    }
}

struct IsoDirIterator {
    dir: Bytes,
    length: u32,
}

impl Iterator for IsoDirIterator {
    type Item = std::result::Result<IsoRecord, String>;
    fn next(&mut self) -> Option<Self::Item> {
        next_record(&mut self.dir, self.length, false).transpose()
    }
}

/// Reads the directory record at cursor and advances to the next one.
///
/// Directory extents pad records to sector boundaries with zero bytes; a
/// zero length byte means "jump to the next sector".
fn next_record(
    buf: &mut Bytes,
    length: u32,
    is_root: bool,
) -> std::result::Result<Option<IsoRecord>, String> {
    loop {
        if !buf.has_remaining() {
            return Ok(None);
        }

        let len = buf.get_u8() as usize;
        if len == 0 {
            let jump = {
                let pos = length as usize - buf.remaining();
                ((pos + SECTOR_SIZE) & !(SECTOR_SIZE - 1)) - pos
            };
            if jump >= buf.remaining() {
                return Ok(None);
            }
            buf.advance(jump);
            continue;
        } else if len > buf.remaining() + 1 {
            // len includes the length byte itself, which is already read
            return Err("incomplete directory record; corrupt image?".into());
        }

        buf.advance(1); // extended attribute record length
        let address = buf.get_u32_le();
        buf.advance(4); // big-endian address
        let extent_length = buf.get_u32_le();
        buf.advance(4); // big-endian length
        buf.advance(25 - 18); // recording date and time
        let flags = buf.get_u8();
        buf.advance(32 - 26); // interleaving, volume sequence number
        let name_length = buf.get_u8() as usize;

        let name = if name_length == 1 && (buf[0] == 0 || buf[0] == 1) {
            let c = buf.get_u8();
            if is_root && c == 0 {
                // allow "." when reading the root record from the
                // primary volume descriptor
                Some(".".to_string())
            } else {
                // "." or ".."
                None
            }
        } else {
            Some(parse_name(buf, name_length)?)
        };

        // advance to the next record
        buf.advance(len - (33 + name_length));

        if let Some(name) = name {
            return Ok(Some(if flags & 2 > 0 {
                IsoRecord::Directory(IsoDirectory {
                    name,
                    address,
                    length: extent_length,
                })
            } else {
                IsoRecord::File(IsoFile {
                    name,
                    address,
                    length: extent_length,
                })
            }));
        }
    }
}

/// Reads a record name, stripping the ";1" version suffix and a trailing
/// dot as the kernel does.
fn parse_name(buf: &mut Bytes, len: usize) -> std::result::Result<String, String> {
    if len > buf.remaining() {
        return Err("incomplete record name; corrupt image?".into());
    }
    let mut bytes = buf.copy_to_bytes(len);
    if bytes.ends_with(b";1") {
        bytes.truncate(bytes.len() - 2);
    }
    if bytes.ends_with(b".") {
        bytes.truncate(bytes.len() - 1);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Extractor entry point for the dispatch table.
pub(super) fn extract(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    create_destination(destination)?;

    let file = File::open(source).map_err(|err| {
        anyhow::Error::new(FileAccess(format!(
            "unable to open file at {}: {}",
            source.display(),
            err
        )))
    })?;

    let invalid = |msg: String| {
        anyhow::Error::new(InvalidFile(format!(
            "unable to extract archive {} to {}: {}",
            source.display(),
            destination.display(),
            msg
        )))
    };

    let mut iso = IsoFs::from_file(file).map_err(&invalid)?;
    let records = iso.walk().map_err(&invalid)?;
    let sink = EntrySink::new(destination);

    for (path, record) in records {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match record {
            IsoRecord::Directory(_) => {
                sink.write_dir(&path).map_err(|err| {
                    anyhow::Error::new(FileAccess(format!(
                        "unable to write extracted member under {}: {}",
                        destination.display(),
                        err
                    )))
                })?;
            }
            IsoRecord::File(f) => {
                let mut reader = iso.read_file(&f).map_err(&invalid)?;
                sink.write_file(&path, &mut reader).map_err(|err| {
                    anyhow::Error::new(FileAccess(format!(
                        "unable to write extracted member under {}: {}",
                        destination.display(),
                        err
                    )))
                })?;
            }
        }
    }
    Ok(())
}
