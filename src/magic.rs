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

//! Content-signature classification of byte streams.
//!
//! As only a small list of container formats is supported, file magic is
//! defined directly here rather than through an external magic database.
//! This removes a system dependency and is faster than a general-purpose
//! classifier, since we only look for the formats we can expand.

use lazy_static::lazy_static;
use serde::Serialize;

/// A container format credsift knows how to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Format {
    Tar,
    Gzip,
    Bzip2,
    Zip,
    Zlib,
    Xz,
    Rpm,
    Iso9660,
    SevenZip,
    Cpio,
    Xar,
    Cab,
    UnixArchive,
    Rar,
    Zstd,
    Dmg,
}

impl Format {
    /// The MIME type reported for this format.
    pub fn tag(&self) -> &'static str {
        match self {
            Format::Tar => "application/x-tar",
            Format::Gzip => "application/gzip",
            Format::Bzip2 => "application/x-bzip2",
            Format::Zip => "application/zip",
            Format::Zlib => "application/zlib",
            Format::Xz => "application/x-xz",
            Format::Rpm => "application/x-rpm",
            Format::Iso9660 => "application/x-iso9660-image",
            Format::SevenZip => "application/x-7z-compressed",
            Format::Cpio => "application/x-cpio",
            Format::Xar => "application/x-xar",
            Format::Cab => "application/vnd.ms-cab-compressed",
            Format::UnixArchive => "application/x-archive",
            Format::Rar => "application/vnd.rar",
            Format::Zstd => "application/zstd",
            Format::Dmg => "application/x-apple-diskimage",
        }
    }
}

/// One entry in the format table: where to look, what to look for, and how
/// strongly a match should be trusted.
///
/// The weight allows "outer" container formats, whose interior may look like
/// many other formats, to win the match. DMG carries its magic in the file
/// trailer and uses weight 2 so that a DMG containing embedded archive-like
/// streams still classifies as a DMG.
pub struct Descriptor {
    pub format: Format,
    pub weight: u32,
    /// Offset of the magic. Non-negative offsets are relative to the start
    /// of the file and matched against the head chunk; negative offsets are
    /// relative to the end of the file and matched against the tail chunk.
    pub offset: i64,
    pub magics: &'static [&'static [u8]],
}

lazy_static! {
    /// All supported container formats, in declaration order. Order matters:
    /// the first descriptor at the highest weight wins a tie.
    pub static ref DESCRIPTORS: Vec<Descriptor> = vec![
        Descriptor {
            format: Format::Tar,
            weight: 1,
            offset: 257,
            magics: &[b"ustar"],
        },
        Descriptor {
            format: Format::Gzip,
            weight: 1,
            offset: 0,
            magics: &[&[0x1f, 0x8b]],
        },
        Descriptor {
            format: Format::Bzip2,
            weight: 1,
            offset: 0,
            magics: &[b"BZh"],
        },
        Descriptor {
            format: Format::Zip,
            weight: 1,
            offset: 0,
            magics: &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"],
        },
        Descriptor {
            format: Format::Zlib,
            weight: 1,
            offset: 0,
            magics: &[
                &[0x78, 0x01],
                &[0x78, 0x5e],
                &[0x78, 0x9c],
                &[0x78, 0xda],
            ],
        },
        Descriptor {
            format: Format::Xz,
            weight: 1,
            offset: 0,
            magics: &[&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]],
        },
        Descriptor {
            format: Format::Rpm,
            weight: 1,
            offset: 0,
            magics: &[&[0xed, 0xab, 0xee, 0xdb]],
        },
        Descriptor {
            format: Format::Iso9660,
            weight: 1,
            offset: 0x8001,
            magics: &[b"CD001"],
        },
        Descriptor {
            format: Format::SevenZip,
            weight: 1,
            offset: 0,
            magics: &[&[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c]],
        },
        Descriptor {
            format: Format::Cpio,
            weight: 1,
            offset: 0,
            magics: &[
                // 070707 in octal, little and big endian.
                &[0xc7, 0x71],
                &[0x71, 0xc7],
                b"070701",
                b"070702",
                b"070707",
            ],
        },
        Descriptor {
            format: Format::Xar,
            weight: 1,
            offset: 0,
            magics: &[b"xar!"],
        },
        Descriptor {
            format: Format::Cab,
            weight: 1,
            offset: 0,
            magics: &[b"MSCF"],
        },
        Descriptor {
            format: Format::UnixArchive,
            weight: 1,
            offset: 0,
            magics: &[b"!<arch>"],
        },
        Descriptor {
            format: Format::Rar,
            weight: 1,
            offset: 0,
            magics: &[&[0x52, 0x61, 0x72, 0x21, 0x1a, 0x07]],
        },
        Descriptor {
            format: Format::Zstd,
            weight: 1,
            offset: 0,
            magics: &[&[0x28, 0xb5, 0x2f, 0xfd]],
        },
        Descriptor {
            format: Format::Dmg,
            weight: 2,
            offset: -512,
            magics: &[b"koly"],
        },
    ];
}

/// Returns the highest-weight format whose magic matches the given chunk.
///
/// `from_start` gates descriptors with negative offsets: those are only
/// evaluated against a chunk read from the end of the file. A negative
/// offset applied to a head chunk would address bytes that are not where
/// the descriptor intended, which is especially problematic for formats
/// with short magic numbers such as zlib.
pub fn classify(chunk: &[u8], from_start: bool) -> Option<(u32, Format)> {
    let mut best: Option<(u32, Format)> = None;

    for descriptor in DESCRIPTORS.iter() {
        if from_start && descriptor.offset < 0 {
            continue;
        }
        if !from_start && descriptor.offset >= 0 {
            continue;
        }

        let position = if descriptor.offset < 0 {
            let back = descriptor.offset.unsigned_abs() as usize;
            match chunk.len().checked_sub(back) {
                Some(p) => p,
                None => continue,
            }
        } else {
            descriptor.offset as usize
        };

        for magic in descriptor.magics {
            if chunk.len() >= position + magic.len()
                && &chunk[position..position + magic.len()] == *magic
            {
                match best {
                    Some((weight, _)) if weight >= descriptor.weight => (),
                    _ => best = Some((descriptor.weight, descriptor.format)),
                }
                break;
            }
        }
    }

    best
}

/// Combines head- and tail-chunk classifications, preferring the heavier
/// match. This lets trailer-discovered container formats override formats
/// matched at the head of the same file.
pub fn classify_chunks(head: &[u8], tail: &[u8]) -> Option<Format> {
    let from_head = classify(head, true);
    let from_tail = classify(tail, false);

    match (from_head, from_tail) {
        (Some((hw, hf)), Some((tw, _))) if hw >= tw => Some(hf),
        (_, Some((_, tf))) => Some(tf),
        (Some((_, hf)), None) => Some(hf),
        (None, None) => None,
    }
}
