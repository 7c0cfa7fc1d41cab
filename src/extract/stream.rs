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

//! Extractors for single-stream codecs.
//!
//! None of these formats can hold more than one file, but the output is
//! still spooled into a subdirectory under the cache for consistency with
//! the multi-member extractors. The output file is named by stripping the
//! final dot-suffix from the source basename.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Result;
use bzip2::read::BzDecoder;
use flate2::read::{GzDecoder, ZlibDecoder};
use xz2::read::XzDecoder;

use super::{create_destination, stripped_name};
use crate::errors::{FileAccess, InvalidFile};

fn spool<R, F>(source: &Path, destination: &Path, wrap: F) -> Result<()>
where
    R: Read,
    F: FnOnce(File) -> io::Result<R>,
{
    create_destination(destination)?;

    let input = File::open(source).map_err(|err| {
        anyhow::Error::new(FileAccess(format!(
            "unable to open file at {}: {}",
            source.display(),
            err
        )))
    })?;

    let output_path = destination.join(stripped_name(source));
    let mut output = File::create(&output_path).map_err(|err| {
        anyhow::Error::new(FileAccess(format!(
            "unable to create output at {}: {}",
            output_path.display(),
            err
        )))
    })?;

    let invalid = |err: io::Error| {
        anyhow::Error::new(InvalidFile(format!(
            "unable to extract archive {} to {}: {}",
            source.display(),
            output_path.display(),
            err
        )))
    };
    let mut reader = wrap(input).map_err(invalid)?;
    io::copy(&mut reader, &mut output).map_err(invalid)?;
    Ok(())
}

pub(super) fn gzip(source: &Path, destination: &Path) -> Result<()> {
    spool(source, destination, |input| Ok(GzDecoder::new(input)))
}

pub(super) fn bzip2(source: &Path, destination: &Path) -> Result<()> {
    spool(source, destination, |input| Ok(BzDecoder::new(input)))
}

pub(super) fn xz(source: &Path, destination: &Path) -> Result<()> {
    spool(source, destination, |input| Ok(XzDecoder::new(input)))
}

pub(super) fn zlib(source: &Path, destination: &Path) -> Result<()> {
    spool(source, destination, |input| Ok(ZlibDecoder::new(input)))
}

pub(super) fn zstd(source: &Path, destination: &Path) -> Result<()> {
    spool(source, destination, ::zstd::stream::read::Decoder::new)
}
