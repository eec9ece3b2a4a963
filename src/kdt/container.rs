use crate::error::{FormatErrorKind, KdtError, KdtResult};
use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

pub const KDT_MAGIC: &[u8; 4] = b"KDT1";
pub const KDT_HEADER_SIZE: usize = 0x10;

const OFF_FILESIZE: usize = 0x04;
const OFF_TICKDIV: usize = 0x08;
const OFF_TRACKS: usize = 0x0C;
const OFF_SIZETBL: usize = 0x10;

/// Location of one track's data inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEntry {
    pub size: usize,
    pub start: usize,
}

impl TrackEntry {
    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

/// A validated KDT1 file, truncated to its declared size.
#[derive(Debug, Clone)]
pub struct Container {
    path: String,
    bytes: Vec<u8>,
    tick_div: u16,
    tracks: Vec<TrackEntry>,
}

impl Container {
    /// Read and validate a KDT1 file, refusing anything larger than `max_size` before loading it.
    pub fn open<P: AsRef<Path>>(path: P, max_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let label = path.display().to_string();

        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to stat KDT file {}", label))?;
        if meta.len() > max_size as u64 {
            return Err(KdtError::format(
                &label,
                FormatErrorKind::TooLarge {
                    size: meta.len() as usize,
                    max: max_size,
                },
            )
            .into());
        }

        let bytes =
            fs::read(path).with_context(|| format!("Failed to read KDT file {}", label))?;

        Ok(Self::from_bytes(bytes, &label, max_size)?)
    }

    /// Validate the header and build the track table. `path` is only used in error messages.
    pub fn from_bytes(mut bytes: Vec<u8>, path: &str, max_size: usize) -> KdtResult<Self> {
        if bytes.len() < KDT_HEADER_SIZE {
            return Err(KdtError::format(
                path,
                FormatErrorKind::TruncatedHeader(KDT_HEADER_SIZE),
            ));
        }

        if &bytes[..4] != KDT_MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&bytes[..4]);
            return Err(KdtError::format(path, FormatErrorKind::BadMagic(magic)));
        }

        if bytes.len() > max_size {
            return Err(KdtError::format(
                path,
                FormatErrorKind::TooLarge {
                    size: bytes.len(),
                    max: max_size,
                },
            ));
        }

        let declared = u32_le(&bytes, OFF_FILESIZE) as usize;
        let tick_div = u16_le(&bytes, OFF_TICKDIV);
        let track_count = u16_le(&bytes, OFF_TRACKS) as usize;

        if declared > bytes.len() {
            return Err(KdtError::format(
                path,
                FormatErrorKind::SizeMismatch {
                    declared,
                    actual: bytes.len(),
                },
            ));
        }

        if declared < bytes.len() {
            debug!(
                "Ignoring {} trailing bytes past the declared size of {}..!",
                bytes.len() - declared,
                path
            );
        }
        bytes.truncate(declared);

        let mut tracks = Vec::with_capacity(track_count);

        if track_count > 0 {
            let table_end = OFF_SIZETBL + track_count * 2;
            if table_end > bytes.len() {
                return Err(KdtError::format(
                    path,
                    FormatErrorKind::TableOutOfBounds {
                        tracks: track_count,
                    },
                ));
            }

            let mut start = table_end;
            for track in 0..track_count {
                let size = u16_le(&bytes, OFF_SIZETBL + track * 2) as usize;
                let entry = TrackEntry { size, start };

                if entry.end() > bytes.len() {
                    return Err(KdtError::format(
                        path,
                        FormatErrorKind::TrackOutOfBounds {
                            track,
                            end: entry.end(),
                        },
                    ));
                }

                tracks.push(entry);
                start = entry.end();
            }
        }

        debug!(
            "Loaded {}: {} bytes, {} ticks per quarter note, {} tracks",
            path,
            bytes.len(),
            tick_div,
            tracks.len()
        );

        Ok(Self {
            path: path.to_owned(),
            bytes,
            tick_div,
            tracks,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The container bytes, truncated to the declared file size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn tick_div(&self) -> u16 {
        self.tick_div
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> KdtResult<TrackEntry> {
        self.tracks.get(index).copied().ok_or(KdtError::Index {
            index,
            count: self.tracks.len(),
        })
    }
}

fn u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
