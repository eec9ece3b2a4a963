//! Track muting by patching each track's first channel-volume command.
//!
//! Tracks 0 and 1 carry global data for the driver and are always left audible.

use crate::error::KdtResult;
use crate::kdt::container::Container;
use crate::kdt::cursor::TrackCursor;
use crate::kdt::opcode::OP_VOLUME;
use crate::model::config::{DecodeOptions, TempoRule};
use crate::util::{TrackList, labelled_path};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const GLOBAL_TRACKS: usize = 2;

/// Initial volume of every track that starts out audible in shipped sequences.
pub const DEMUTE_MASK: u8 = 0x6E;
/// Keeps only the running status bit, i.e. volume 0.
pub const ISOLATE_MASK: u8 = 0x80;

pub fn demute(param: u8) -> u8 {
    param | DEMUTE_MASK
}

pub fn isolate(param: u8) -> u8 {
    param & ISOLATE_MASK
}

/// Absolute offset of each track's first channel-volume parameter, if it has one.
pub fn volume_offsets(kdt: &Container, tempo: TempoRule) -> KdtResult<Vec<Option<usize>>> {
    let mut cursor = TrackCursor::new(kdt, tempo);
    let mut offsets = Vec::with_capacity(kdt.track_count());

    for track in 0..kdt.track_count() {
        cursor.set_track(track)?;
        if cursor.find_opcode(OP_VOLUME)? {
            offsets.push(Some(cursor.offset()));
        } else {
            debug!("Track {:02} has no volume command, leaving it alone..!", track);
            offsets.push(None);
        }
    }

    Ok(offsets)
}

/// A patched copy of the container where only the global tracks and `keep` are audible.
/// Requested tracks past the end are clamped to the last track.
pub fn isolate_tracks(kdt: &Container, tempo: TempoRule, keep: &[usize]) -> KdtResult<Vec<u8>> {
    let last = kdt.track_count().saturating_sub(1);
    let keep: Vec<usize> = keep
        .iter()
        .map(|&track| {
            if track > last {
                warn!(
                    "Track {:02} is out of range, clamping to track {:02}..!",
                    track, last
                );
            }
            track.min(last)
        })
        .collect();

    let offsets = volume_offsets(kdt, tempo)?;
    let mut out = kdt.bytes().to_vec();

    for (track, offset) in offsets.into_iter().enumerate() {
        let Some(offset) = offset else {
            continue;
        };

        if track < GLOBAL_TRACKS || keep.contains(&track) {
            out[offset] = demute(out[offset]);
        } else {
            out[offset] = isolate(out[offset]);
        }
    }

    Ok(out)
}

/// Write a copy of `path` with only the listed tracks audible. Returns the output path.
pub fn write_isolated(
    path: &Path,
    out_path: Option<&Path>,
    options: DecodeOptions,
    list: &TrackList,
) -> Result<PathBuf> {
    let kdt = Container::open(path, options.max_file_size)?;
    let bytes = isolate_tracks(&kdt, options.tempo, &list.tracks)?;

    let out_path = out_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| labelled_path(path, &list.label()));
    fs::write(&out_path, bytes)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    info!("Wrote '{}'..!", out_path.display());
    Ok(out_path)
}

/// Write one copy of `path` per track with only that track (and the global tracks) audible.
pub fn split_tracks(path: &Path, options: DecodeOptions) -> Result<Vec<PathBuf>> {
    let kdt = Container::open(path, options.max_file_size)?;
    let mut written = Vec::with_capacity(kdt.track_count());

    for track in 0..kdt.track_count() {
        let bytes = isolate_tracks(&kdt, options.tempo, &[track])?;
        let out_path = labelled_path(path, &format!("track {:02}", track));
        fs::write(&out_path, bytes)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        written.push(out_path);
    }

    info!(
        "Split '{}' into {} files..!",
        path.display(),
        written.len()
    );
    Ok(written)
}
