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

//! Minimal Apple Disk Image (DMG) parser and extractor.
//!
//! Structure names and geometry are via "Demystifying the DMG File Format"
//! by Jonathan Levin (http://newosxbook.com/). Metadata lives in a 512-byte
//! big-endian "koly" trailer at the end of the file, which points at an XML
//! property list describing the block tables ("mish") of the image. Each
//! block holds chunk records naming a codec, a source range, and a target
//! range; decoded chunk data is appended to one output blob per block.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use bytes::{Buf, Bytes};
use bzip2::read::BzDecoder;
use flate2::read::ZlibDecoder;
use xz2::read::XzDecoder;
use xz2::stream::Stream;

use super::create_destination;
use crate::errors::{FileAccess, InvalidFile};

const DMG_HEADER_MAGIC: &[u8] = b"koly";
const DMG_HEADER_SZ: usize = 512;

const DMG_BLOCK_TABLE_MAGIC: &[u8] = b"mish";
const DMG_BLOCK_TABLE_SZ: usize = 204;
const DMG_BLOCK_CHUNK_SZ: usize = 40;

// Chunk types we skip outright.
const CHUNK_TYPE_IGNORED: u32 = 0x0000_0002;
const CHUNK_TYPE_COMMENT: u32 = 0x7fff_fffe;
const CHUNK_TYPE_LAST: u32 = 0xffff_ffff;

// Chunk types carrying data.
const CHUNK_TYPE_ZERO_FILL: u32 = 0x0000_0000;
const CHUNK_TYPE_ZLIB: u32 = 0x8000_0005;
const CHUNK_TYPE_BZIP2: u32 = 0x8000_0006;
const CHUNK_TYPE_LZMA: u32 = 0x8000_0008;

#[derive(Debug)]
struct DmgHeader {
    xml_offset: u64,
    xml_length: u64,
}

/// One chunk record from a block table.
#[derive(Debug, Clone, Copy)]
pub struct DmgBlockChunk {
    pub kind: u32,
    pub compressed_offset: u64,
    pub compressed_length: u64,
}

/// One `blkx` block and its chunks.
#[derive(Debug)]
pub struct DmgBlock {
    pub name: String,
    pub chunks: Vec<DmgBlockChunk>,
}

/// An opened Apple Disk Image.
pub struct Dmg {
    source: PathBuf,
    plist: plist::Value,
}

impl Dmg {
    pub fn new(source: &Path) -> Result<Self> {
        let access = |err: std::io::Error| {
            anyhow::Error::new(FileAccess(format!(
                "unable to read archive {}: {}",
                source.display(),
                err
            )))
        };
        let invalid = |msg: String| {
            anyhow::Error::new(InvalidFile(format!(
                "unable to read archive {}: {}",
                source.display(),
                msg
            )))
        };

        let mut file = File::open(source).map_err(access)?;

        // DMG metadata is at the end of the file.
        file.seek(SeekFrom::End(-(DMG_HEADER_SZ as i64)))
            .map_err(|err| invalid(format!("seeking to trailer: {}", err)))?;
        let mut raw = vec![0u8; DMG_HEADER_SZ];
        file.read_exact(&mut raw)
            .map_err(|err| invalid(format!("reading trailer: {}", err)))?;

        let header = parse_header(&mut Bytes::from(raw))
            .map_err(|msg| invalid(msg))?;

        // Read the XML property list describing the block tables.
        file.seek(SeekFrom::Start(header.xml_offset))
            .map_err(|err| invalid(format!("seeking to property list: {}", err)))?;
        let mut xml = vec![0u8; header.xml_length as usize];
        file.read_exact(&mut xml)
            .map_err(|err| invalid(format!("reading property list: {}", err)))?;
        let plist = plist::Value::from_reader_xml(&xml[..])
            .map_err(|err| invalid(format!("parsing property list: {}", err)))?;

        Ok(Self {
            source: source.to_path_buf(),
            plist,
        })
    }

    /// Parses the block tables and their chunk records from the
    /// `resource-fork/blkx` entries of the property list.
    pub fn blocks(&self) -> Result<Vec<DmgBlock>> {
        let invalid = |msg: String| {
            anyhow::Error::new(InvalidFile(format!(
                "malformed block table in {}: {}",
                self.source.display(),
                msg
            )))
        };

        let mut blocks = Vec::new();
        let entries = self
            .plist
            .as_dictionary()
            .and_then(|root| root.get("resource-fork"))
            .and_then(|fork| fork.as_dictionary())
            .and_then(|fork| fork.get("blkx"))
            .and_then(|blkx| blkx.as_array());

        for entry in entries.into_iter().flatten() {
            let entry = match entry.as_dictionary() {
                Some(entry) => entry,
                None => continue,
            };
            let name = entry
                .get("Name")
                .and_then(|name| name.as_string())
                .unwrap_or_default()
                .to_string();
            let data = match entry.get("Data").and_then(|data| data.as_data()) {
                Some(data) => data,
                None => continue,
            };

            blocks.push(parse_block(name, data).map_err(|msg| invalid(msg))?);
        }
        Ok(blocks)
    }

    /// Extracts every block of the image, appending decoded chunk data to
    /// `destination/<basename>.<block_index>.blob`.
    pub fn extract(&self, destination: &Path) -> Result<()> {
        let parent = self
            .source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let invalid = |err: String| {
            anyhow::Error::new(InvalidFile(format!(
                "unable to extract archive {} to {}: {}",
                self.source.display(),
                destination.display(),
                err
            )))
        };

        let mut file = File::open(&self.source).map_err(|err| {
            anyhow::Error::new(FileAccess(format!(
                "unable to read archive {}: {}",
                self.source.display(),
                err
            )))
        })?;

        for (index, block) in self.blocks()?.iter().enumerate() {
            let output_path = destination.join(format!("{}.{}.blob", parent, index));
            let mut output = File::options()
                .create(true)
                .append(true)
                .open(&output_path)
                .map_err(|err| {
                    anyhow::Error::new(FileAccess(format!(
                        "unable to create output at {}: {}",
                        output_path.display(),
                        err
                    )))
                })?;

            for chunk in &block.chunks {
                match chunk.kind {
                    CHUNK_TYPE_IGNORED | CHUNK_TYPE_COMMENT | CHUNK_TYPE_LAST => continue,
                    CHUNK_TYPE_ZERO_FILL => {
                        // Zero-fill appends without touching the source.
                        let mut remaining = chunk.compressed_length;
                        let zeroes = [0u8; 4096];
                        while remaining > 0 {
                            let count = remaining.min(zeroes.len() as u64) as usize;
                            output
                                .write_all(&zeroes[..count])
                                .map_err(|err| invalid(err.to_string()))?;
                            remaining -= count as u64;
                        }
                    }
                    CHUNK_TYPE_ZLIB | CHUNK_TYPE_BZIP2 | CHUNK_TYPE_LZMA => {
                        file.seek(SeekFrom::Start(chunk.compressed_offset))
                            .map_err(|err| invalid(err.to_string()))?;
                        let data = (&mut file).take(chunk.compressed_length);
                        let copied = match chunk.kind {
                            CHUNK_TYPE_ZLIB => {
                                std::io::copy(&mut ZlibDecoder::new(data), &mut output)
                            }
                            CHUNK_TYPE_BZIP2 => {
                                std::io::copy(&mut BzDecoder::new(data), &mut output)
                            }
                            _ => {
                                let stream = Stream::new_lzma_decoder(u64::MAX)
                                    .map_err(|err| invalid(err.to_string()))?;
                                std::io::copy(
                                    &mut XzDecoder::new_stream(data, stream),
                                    &mut output,
                                )
                            }
                        };
                        copied.map_err(|err| invalid(err.to_string()))?;
                    }
                    // Unknown chunk types are ignored.
                    _ => continue,
                }
            }
        }
        Ok(())
    }
}

/// Parses the koly trailer. The cursor must hold the final 512 bytes of the
/// image.
fn parse_header(buf: &mut Bytes) -> std::result::Result<DmgHeader, String> {
    if buf.copy_to_bytes(4) != DMG_HEADER_MAGIC {
        return Err("file does not appear to be a DMG".into());
    }
    buf.advance(4); // version
    buf.advance(4); // header_size
    buf.advance(4); // flags
    buf.advance(8); // running_data_fork_offset
    buf.advance(8); // data_fork_offset
    buf.advance(8); // data_fork_length
    buf.advance(8); // rsrc_fork_offset
    buf.advance(8); // rsrc_fork_length
    buf.advance(4); // segment_number
    buf.advance(4); // segment_count
    buf.advance(16); // segment_id
    buf.advance(4); // data_checksum_type
    buf.advance(4); // data_checksum_size
    buf.advance(128); // data_checksum
    let xml_offset = buf.get_u64();
    let xml_length = buf.get_u64();
    // reserved_1, checksum fields, image variant, sector count and trailing
    // reserved words are not needed for extraction.
    Ok(DmgHeader {
        xml_offset,
        xml_length,
    })
}

/// Parses one base64-decoded `blkx` Data value: a mish block table followed
/// by its chunk records.
fn parse_block(name: String, data: &[u8]) -> std::result::Result<DmgBlock, String> {
    if data.len() < DMG_BLOCK_TABLE_SZ {
        return Err(format!("block table truncated at {} bytes", data.len()));
    }
    let mut buf = Bytes::copy_from_slice(data);
    if buf.copy_to_bytes(4) != DMG_BLOCK_TABLE_MAGIC {
        return Err("block table does not start with mish".into());
    }
    buf.advance(4); // version
    buf.advance(8); // sector_number
    buf.advance(8); // sector_count
    buf.advance(8); // data_offset
    buf.advance(4); // buffers_needed
    buf.advance(4); // block_descriptors
    buf.advance(4 * 6); // reserved
    buf.advance(4); // checksum_type
    buf.advance(4); // checksum_size
    buf.advance(128); // checksum
    let chunk_count = buf.get_u32() as usize;

    if buf.remaining() < chunk_count * DMG_BLOCK_CHUNK_SZ {
        return Err(format!(
            "block table lists {} chunks but holds {} bytes",
            chunk_count,
            buf.remaining()
        ));
    }

    let mut chunks = Vec::with_capacity(chunk_count);
    for _ in 0..chunk_count {
        let kind = buf.get_u32();
        buf.advance(4); // comment
        buf.advance(8); // sector_number
        buf.advance(8); // sector_count
        let compressed_offset = buf.get_u64();
        let compressed_length = buf.get_u64();
        chunks.push(DmgBlockChunk {
            kind,
            compressed_offset,
            compressed_length,
        });
    }

    Ok(DmgBlock { name, chunks })
}

/// Extractor entry point for the dispatch table.
pub(super) fn extract(source: &Path, destination: &Path) -> Result<()> {
    create_destination(destination)?;
    Dmg::new(source)?.extract(destination)
}
