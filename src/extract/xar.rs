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

//! Minimal eXtensible ARchive (XAR) parser and extractor.
//!
//! Layout per xar/include/xar.h.in: a fixed big-endian header, a
//! zlib-compressed XML table of contents, then the heap. Data offsets in
//! the ToC are relative to the first byte after the header and compressed
//! ToC. Integrity checks, ownership, and modes are not enforced.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use bytes::{Buf, Bytes};
use flate2::read::{GzDecoder, ZlibDecoder};

use super::{create_destination, EntrySink};
use crate::errors::{FileAccess, InvalidFile};

const XAR_MAGIC: &[u8] = b"xar!";
const XAR_HEADER_SZ: usize = 28;

#[derive(Debug)]
struct XarHeader {
    size: u16,
    #[allow(dead_code)]
    version: u16,
    toc_length_compressed: u64,
    #[allow(dead_code)]
    toc_length_uncompressed: u64,
    #[allow(dead_code)]
    cksum_alg: u32,
}

/// One file entry from the table of contents.
#[derive(Debug, PartialEq, Eq)]
pub struct XarEntry {
    /// Path of the member relative to the archive root.
    pub path: PathBuf,
    /// Length of the (possibly encoded) data in the heap.
    pub length: u64,
    /// Offset of the data, relative to the end of the compressed ToC.
    pub offset: u64,
    /// Extracted size of the member.
    pub size: u64,
    /// The `encoding/@style` of the data, if present.
    pub encoding: Option<String>,
}

/// An opened XAR archive.
pub struct Xar {
    source: PathBuf,
    header: XarHeader,
    toc: String,
}

impl Xar {
    pub fn new(source: &Path) -> Result<Self> {
        let mut file = File::open(source).map_err(|err| {
            anyhow::Error::new(FileAccess(format!(
                "unable to read archive {}: {}",
                source.display(),
                err
            )))
        })?;

        let invalid = |msg: String| {
            anyhow::Error::new(InvalidFile(format!(
                "unable to read archive {}: {}",
                source.display(),
                msg
            )))
        };

        let mut raw = vec![0u8; XAR_HEADER_SZ];
        file.read_exact(&mut raw)
            .map_err(|err| invalid(format!("reading header: {}", err)))?;
        let buf = &mut Bytes::from(raw);

        if buf.copy_to_bytes(4) != XAR_MAGIC {
            return Err(invalid("file does not appear to be a XAR".into()));
        }
        let header = XarHeader {
            size: buf.get_u16(),
            version: buf.get_u16(),
            toc_length_compressed: buf.get_u64(),
            toc_length_uncompressed: buf.get_u64(),
            cksum_alg: buf.get_u32(),
        };

        // The table of contents sits right after the header, zlib-deflated.
        file.seek(SeekFrom::Start(header.size as u64))
            .map_err(|err| invalid(format!("seeking to table-of-contents: {}", err)))?;
        let mut toc = String::new();
        ZlibDecoder::new((&mut file).take(header.toc_length_compressed))
            .read_to_string(&mut toc)
            .map_err(|err| invalid(format!("unable to read table-of-contents: {}", err)))?;

        Ok(Self {
            source: source.to_path_buf(),
            header,
            toc,
        })
    }

    /// Returns the file entries listed in the table of contents.
    pub fn entries(&self) -> Result<Vec<XarEntry>> {
        let invalid = |msg: String| {
            anyhow::Error::new(InvalidFile(format!(
                "malformed table-of-contents in {}: {}",
                self.source.display(),
                msg
            )))
        };

        let document = roxmltree::Document::parse(&self.toc)
            .map_err(|err| invalid(err.to_string()))?;
        let toc = document
            .root_element()
            .children()
            .find(|node| node.has_tag_name("toc"))
            .ok_or_else(|| invalid("no toc element".into()))?;

        let mut entries = Vec::new();
        for file in toc.children().filter(|node| node.has_tag_name("file")) {
            parse_entries(&file, Path::new(""), &mut entries)
                .map_err(|msg| invalid(msg))?;
        }
        Ok(entries)
    }

    /// Extracts all file entries into `destination`.
    pub fn extract(&self, destination: &Path, cancel: &AtomicBool) -> Result<()> {
        // Offsets are relative to the first byte after the header and the
        // compressed table of contents.
        let base = self.header.size as u64 + self.header.toc_length_compressed;
        let sink = EntrySink::new(destination);

        for entry in self.entries()? {
            if cancel.load(Ordering::Relaxed) {
                break;
            }

            let mut file = File::open(&self.source).map_err(|err| {
                anyhow::Error::new(FileAccess(format!(
                    "unable to read archive {}: {}",
                    self.source.display(),
                    err
                )))
            })?;
            file.seek(SeekFrom::Start(base + entry.offset)).map_err(|err| {
                anyhow::Error::new(InvalidFile(format!(
                    "unable to extract archive {} to {}: {}",
                    self.source.display(),
                    destination.display(),
                    err
                )))
            })?;

            let mut data = BufReader::new(file.take(entry.length));
            let result = match entry.encoding.as_deref() {
                Some("application/x-gzip") => {
                    // The style is historically applied to both gzip- and
                    // zlib-framed streams; sniff the first bytes and pick
                    // the matching inflater.
                    let sniff = data.fill_buf().unwrap_or(&[]);
                    if sniff.len() >= 2 && sniff[0..2] == [0x1f, 0x8b] {
                        sink.write_file(&entry.path, &mut GzDecoder::new(data))
                    } else {
                        sink.write_file(&entry.path, &mut ZlibDecoder::new(data))
                    }
                }
                _ => sink.write_file(&entry.path, &mut data),
            };
            result.map_err(|err| {
                anyhow::Error::new(InvalidFile(format!(
                    "unable to extract archive {} to {}: {}",
                    self.source.display(),
                    destination.display(),
                    err
                )))
            })?;
        }
        Ok(())
    }
}

/// Recursively collects file entries from a `file` element, descending into
/// directories.
fn parse_entries(
    node: &roxmltree::Node,
    directory: &Path,
    entries: &mut Vec<XarEntry>,
) -> std::result::Result<(), String> {
    let child_text = |name: &str| -> Option<&str> {
        node.children()
            .find(|child| child.has_tag_name(name))
            .and_then(|child| child.text())
    };

    let kind = child_text("type").ok_or("file element without type")?;
    // Strip any slashes, only using the last path component.
    let name = child_text("name")
        .ok_or("file element without name")?
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    let path = directory.join(name);

    match kind {
        "directory" => {
            for child in node.children().filter(|child| child.has_tag_name("file")) {
                parse_entries(&child, &path, entries)?;
            }
        }
        "file" => {
            let data = node
                .children()
                .find(|child| child.has_tag_name("data"))
                .ok_or("file entry without data element")?;
            let field = |name: &str| -> std::result::Result<u64, String> {
                data.children()
                    .find(|child| child.has_tag_name(name))
                    .and_then(|child| child.text())
                    .and_then(|text| text.parse().ok())
                    .ok_or_else(|| format!("data element missing {}", name))
            };
            let encoding = data
                .children()
                .find(|child| child.has_tag_name("encoding"))
                .and_then(|child| child.attribute("style"))
                .map(str::to_string);

            entries.push(XarEntry {
                path,
                length: field("length")?,
                offset: field("offset")?,
                size: field("size")?,
                encoding,
            });
        }
        _ => (),
    }
    Ok(())
}

/// Extractor entry point for the dispatch table.
pub(super) fn extract(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    create_destination(destination)?;
    Xar::new(source)?.extract(destination, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    /// Assembles a XAR with the given ToC body entries and heap bytes.
    fn build_xar(toc_files: &str, heap: &[u8]) -> Vec<u8> {
        let toc = format!("<xar><toc>{}</toc></xar>", toc_files);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(toc.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = Vec::new();
        out.extend_from_slice(b"xar!");
        out.extend_from_slice(&28u16.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(compressed.len() as u64).to_be_bytes());
        out.extend_from_slice(&(toc.len() as u64).to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&compressed);
        out.extend_from_slice(heap);
        out
    }

    fn file_element(name: &str, length: usize, offset: usize, size: usize, encoding: Option<&str>) -> String {
        let encoding = encoding
            .map(|style| format!(r#"<encoding style="{}"/>"#, style))
            .unwrap_or_default();
        format!(
            "<file><type>file</type><name>{}</name><data>\
             <length>{}</length><offset>{}</offset><size>{}</size>{}\
             <archived-checksum style=\"md5\">0</archived-checksum>\
             </data></file>",
            name, length, offset, size, encoding
        )
    }

    #[test]
    fn test_plain_entry_is_copied_verbatim() {
        let dir = TempDir::new().unwrap();
        let body = b"plain heap bytes";
        let toc = file_element("plain.txt", body.len(), 0, body.len(), None);
        let source = dir.path().join("a.xar");
        fs::write(&source, build_xar(&toc, body)).unwrap();

        let destination = dir.path().join("out");
        extract(&source, &destination, &AtomicBool::new(false)).unwrap();
        assert_eq!(fs::read(destination.join("plain.txt")).unwrap(), body);
    }

    #[test]
    fn test_gzip_encoded_entry_is_inflated() {
        let dir = TempDir::new().unwrap();
        let plain = b"secret=hunter2 lives in a xar";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        let deflated = encoder.finish().unwrap();

        let toc = file_element(
            "cred.txt",
            deflated.len(),
            0,
            plain.len(),
            Some("application/x-gzip"),
        );
        let source = dir.path().join("a.xar");
        fs::write(&source, build_xar(&toc, &deflated)).unwrap();

        let destination = dir.path().join("out");
        extract(&source, &destination, &AtomicBool::new(false)).unwrap();
        assert_eq!(fs::read(destination.join("cred.txt")).unwrap(), plain);
    }

    #[test]
    fn test_directories_recurse_and_offsets_are_heap_relative() {
        let dir = TempDir::new().unwrap();
        let first = b"first";
        let second = b"second";
        let mut heap = Vec::new();
        heap.extend_from_slice(first);
        heap.extend_from_slice(second);

        let inner = file_element("deep.txt", second.len(), first.len(), second.len(), None);
        let toc = format!(
            "{}<file><type>directory</type><name>sub</name>{}</file>",
            file_element("top.txt", first.len(), 0, first.len(), None),
            inner
        );
        let source = dir.path().join("a.xar");
        fs::write(&source, build_xar(&toc, &heap)).unwrap();

        let destination = dir.path().join("out");
        extract(&source, &destination, &AtomicBool::new(false)).unwrap();
        assert_eq!(fs::read(destination.join("top.txt")).unwrap(), first);
        assert_eq!(fs::read(destination.join("sub/deep.txt")).unwrap(), second);
    }

    #[test]
    fn test_bad_magic_is_invalid_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("not.xar");
        fs::write(&source, b"definitely not a xar archive header").unwrap();

        let err = extract(&source, &dir.path().join("out"), &AtomicBool::new(false))
            .unwrap_err();
        assert!(err.is::<InvalidFile>());
    }

    #[test]
    fn test_entries_reports_encoding() {
        let dir = TempDir::new().unwrap();
        let toc = file_element("x", 10, 0, 20, Some("application/x-gzip"));
        let source = dir.path().join("a.xar");
        fs::write(&source, build_xar(&toc, &[0; 10])).unwrap();

        let xar = Xar::new(&source).unwrap();
        let entries = xar.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[0].length, 10);
        assert_eq!(entries[0].size, 20);
        assert_eq!(
            entries[0].encoding.as_deref(),
            Some("application/x-gzip")
        );
    }
}
