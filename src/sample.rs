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

//! Sample and location generation for findings.
//!
//! A sample is a fixed-radius window of bytes around a match, base64
//! encoded for binary files and UTF-8 decoded for text. Whether a file is
//! binary is decided from the detected format family first, then by trying
//! to read the head of the file as UTF-8.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::Result;

use crate::errors::FileAccess;
use crate::finding::{Location, Sample};
use crate::magic::Format;
use crate::{CHUNK_SIZE, WINDOW_SIZE};

/// Format families that are sampled as binary without inspection.
const BINARY_FAMILIES: [&str; 4] = ["application", "image", "audio", "video"];

/// The number of chunks read when probing a file for valid UTF-8.
const TEXT_PROBE_CHUNKS: usize = 10;

fn file_access(path: &Path, err: std::io::Error) -> anyhow::Error {
    anyhow::Error::new(FileAccess(format!(
        "unable to open file at {}: {}",
        path.display(),
        err
    )))
}

/// Decides whether a file should be treated as binary for sampling.
///
/// Files whose detected format belongs to a binary family short-circuit;
/// otherwise the head of the file is probed as UTF-8. A file holding more
/// than `TEXT_PROBE_CHUNKS` chunks of valid UTF-8 followed by binary data
/// will misclassify, which is acceptable for sample rendering.
pub fn is_binary(path: &Path, mime: Option<Format>) -> Result<bool> {
    if let Some(format) = mime {
        if BINARY_FAMILIES
            .iter()
            .any(|family| format.tag().starts_with(family))
        {
            return Ok(true);
        }
    }

    let mut file = File::open(path).map_err(|err| file_access(path, err))?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    // Bytes of an incomplete UTF-8 sequence split by a chunk boundary,
    // carried into the next round.
    let mut carry: Vec<u8> = Vec::new();

    for _ in 0..TEXT_PROBE_CHUNKS {
        let count = file.read(&mut buf).map_err(|err| file_access(path, err))?;
        if count == 0 {
            // A dangling partial sequence at EOF is not text.
            return Ok(!carry.is_empty());
        }

        let mut data = std::mem::take(&mut carry);
        data.extend_from_slice(&buf[..count]);
        match std::str::from_utf8(&data) {
            Ok(_) => (),
            Err(err) if err.error_len().is_some() => return Ok(true),
            Err(err) => {
                carry = data[err.valid_up_to()..].to_vec();
                if carry.len() >= 4 {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn encode(bytes: &[u8], binary: bool) -> String {
    if binary {
        base64::encode(bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Generates the sample window for a match of `size` bytes at `offset`.
///
/// The before window covers `[offset - WINDOW_SIZE, offset)` clamped at the
/// start of the file; the after window covers
/// `[offset + size, offset + size + WINDOW_SIZE)` clamped at the end.
pub fn generate_sample(
    path: &Path,
    mime: Option<Format>,
    offset: u64,
    size: usize,
) -> Result<Sample> {
    let binary = is_binary(path, mime)?;

    let mut file = File::open(path).map_err(|err| file_access(path, err))?;
    let length = file
        .metadata()
        .map_err(|err| file_access(path, err))?
        .len();

    let before_len = offset.min(WINDOW_SIZE as u64);
    let match_len = (length.saturating_sub(offset)).min(size as u64);
    let after_len = length
        .saturating_sub(offset + match_len)
        .min(WINDOW_SIZE as u64);

    let mut read_at = |start: u64, len: u64| -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        file.seek(SeekFrom::Start(start))
            .map_err(|err| file_access(path, err))?;
        file.read_exact(&mut buf)
            .map_err(|err| file_access(path, err))?;
        Ok(buf)
    };

    let before = read_at(offset - before_len, before_len)?;
    let content = read_at(offset, match_len)?;
    let after = read_at(offset + match_len, after_len)?;

    Ok(Sample {
        window: WINDOW_SIZE,
        before: encode(&before, binary),
        content: encode(&content, binary),
        after: encode(&after, binary),
        binary,
    })
}

/// Generates the location for a match at `offset`. Text files additionally
/// get a line annotation: the count of newlines before the match offset.
pub fn generate_location(path: &Path, mime: Option<Format>, offset: u64) -> Result<Location> {
    if is_binary(path, mime)? {
        return Ok(Location { offset, line: None });
    }

    let mut file = File::open(path).map_err(|err| file_access(path, err))?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = offset;
    let mut line = 0u64;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let count = file
            .read(&mut buf[..want])
            .map_err(|err| file_access(path, err))?;
        if count == 0 {
            break;
        }
        line += buf[..count].iter().filter(|byte| **byte == b'\n').count() as u64;
        remaining -= count as u64;
    }

    Ok(Location {
        offset,
        line: Some(line),
    })
}
