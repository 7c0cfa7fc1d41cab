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

//! RPM package extractor.
//!
//! An RPM is a 96-byte lead, a signature header, a main header, and then a
//! compressed cpio payload. We skip the headers without interpreting their
//! tags, sniff the payload compression by magic, and drain the cpio stream
//! through the shared entry sink. Signatures are not verified.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use super::archive::drain_cpio;
use super::create_destination;
use crate::errors::{FileAccess, InvalidFile};
use crate::CHUNK_SIZE;

const RPM_LEAD_SZ: usize = 96;
const RPM_LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const RPM_HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];

/// Skips one header section. The signature header is padded so the next
/// section starts on an 8-byte boundary; the main header is not.
fn skip_header(file: &mut File, pad: bool) -> std::result::Result<(), String> {
    let mut intro = [0u8; 16];
    file.read_exact(&mut intro)
        .map_err(|err| format!("reading header section: {}", err))?;
    if intro[0..3] != RPM_HEADER_MAGIC {
        return Err("header section missing magic".into());
    }

    let nindex = u32::from_be_bytes([intro[8], intro[9], intro[10], intro[11]]) as u64;
    let hsize = u32::from_be_bytes([intro[12], intro[13], intro[14], intro[15]]) as u64;
    let mut skip = nindex * 16 + hsize;
    if pad {
        // The intro and index entries are already 8-byte multiples, so only
        // the store needs padding out.
        skip += (8 - (hsize % 8)) % 8;
    }

    file.seek(SeekFrom::Current(skip as i64))
        .map_err(|err| format!("seeking past header section: {}", err))?;
    Ok(())
}

pub(super) fn extract(source: &Path, destination: &Path, cancel: &AtomicBool) -> Result<()> {
    create_destination(destination)?;

    let invalid = |msg: String| {
        anyhow::Error::new(InvalidFile(format!(
            "unable to extract archive {} to {}: {}",
            source.display(),
            destination.display(),
            msg
        )))
    };

    let mut file = File::open(source).map_err(|err| {
        anyhow::Error::new(FileAccess(format!(
            "unable to open file at {}: {}",
            source.display(),
            err
        )))
    })?;

    let mut lead = [0u8; RPM_LEAD_SZ];
    file.read_exact(&mut lead)
        .map_err(|err| invalid(format!("reading lead: {}", err)))?;
    if lead[0..4] != RPM_LEAD_MAGIC {
        return Err(invalid("file does not appear to be an RPM".into()));
    }

    skip_header(&mut file, true).map_err(&invalid)?;
    skip_header(&mut file, false).map_err(&invalid)?;

    // What remains is the payload; sniff its compression format.
    let mut payload = BufReader::with_capacity(CHUNK_SIZE, file);
    let sniff = payload
        .fill_buf()
        .map_err(|err| invalid(format!("reading payload: {}", err)))?;

    let reader: Box<dyn Read> = if sniff.starts_with(&[0x1f, 0x8b]) {
        Box::new(GzDecoder::new(payload))
    } else if sniff.starts_with(b"\xfd7zXZ\x00") {
        Box::new(XzDecoder::new(payload))
    } else if sniff.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        Box::new(
            ::zstd::stream::read::Decoder::new(payload)
                .map_err(|err| invalid(format!("initialising payload decoder: {}", err)))?,
        )
    } else if sniff.starts_with(b"BZh") {
        Box::new(BzDecoder::new(payload))
    } else {
        // Uncompressed payloads are rare but legal.
        Box::new(payload)
    };

    drain_cpio(reader, source, destination, cancel)
}
