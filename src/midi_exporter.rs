use crate::error::{KdtError, KdtResult};
use crate::kdt::container::Container;
use crate::kdt::cursor::{TrackCursor, TrackState};
use crate::kdt::opcode::{self, Action};
use crate::model::config::{DecodeOptions, TempoRule};
use crate::model::event::DecodedEvent;
use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use midly::Smf;
use std::fs;
use std::path::{Path, PathBuf};

const MICROSECONDS_PER_MINUTE: u32 = 60_000_000;

/// Largest value a four byte MIDI variable-length quantity can hold.
const MAX_DELTA_TIME: u64 = 0x0FFF_FFFF;
/// Largest metrical tick division. The high bit selects SMPTE timing.
const MAX_TICK_DIV: u16 = 0x7FFF;

const META_TEXT: u8 = 0x01;
const META_TRACK_NAME: u8 = 0x03;
const META_MARKER: u8 = 0x06;
const META_END_OF_TRACK: u8 = 0x2F;
const META_TEMPO: u8 = 0x51;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const PITCH_BEND: u8 = 0xE0;

/// Read a KDT1 file and write it out as a format 1 Standard MIDI File.
///
/// The output is validated and written to a temporary sibling first, so a failed conversion
/// never leaves a file at `out_path`.
pub fn export_midi_file<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    out_path: Q,
    options: DecodeOptions,
) -> Result<()> {
    let kdt = Container::open(path.as_ref(), options.max_file_size)?;
    let bytes = encode_midi(&kdt, options.tempo)?;

    let smf = Smf::parse(&bytes).map_err(|e| anyhow!("Encoded MIDI failed validation: {:?}", e))?;
    debug!(
        "Validated MIDI output: {:?}, {} tracks, {} bytes",
        smf.header.format,
        smf.tracks.len(),
        bytes.len()
    );

    write_atomically(out_path.as_ref(), &bytes)?;
    info!(
        "Wrote {} tracks to '{}'..!",
        kdt.track_count(),
        out_path.as_ref().display()
    );

    Ok(())
}

fn write_atomically(out_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = out_path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }

    if let Err(e) = fs::rename(&tmp, out_path) {
        let _ = fs::remove_file(&tmp);
        return Err(e)
            .with_context(|| format!("Failed to move output into place at {}", out_path.display()));
    }

    Ok(())
}

/// Encode every track of `kdt` into an in-memory Standard MIDI File.
pub fn encode_midi(kdt: &Container, tempo: TempoRule) -> KdtResult<Vec<u8>> {
    let mut out = Vec::new();

    let tick_div = kdt.tick_div().min(MAX_TICK_DIV);
    if tick_div != kdt.tick_div() {
        warn!(
            "Tick division 0x{:04X} has the SMPTE bit set, clamping it to 0x{:04X}..!",
            kdt.tick_div(),
            tick_div
        );
    }

    // the track count is a u16 in the KDT header, so it always fits
    write_header(&mut out, kdt.track_count() as u16, tick_div);

    let mut cursor = TrackCursor::new(kdt, tempo);
    for track in 0..kdt.track_count() {
        cursor.set_track(track)?;
        write_track(&mut cursor, &mut out)?;
    }

    Ok(out)
}

fn write_header(out: &mut Vec<u8>, track_count: u16, tick_div: u16) {
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&track_count.to_be_bytes());
    out.extend_from_slice(&tick_div.to_be_bytes());
}

/// Append one `MTrk` chunk for the cursor's current track and back-patch its length.
fn write_track(cursor: &mut TrackCursor<'_>, out: &mut Vec<u8>) -> KdtResult<()> {
    let track = cursor.state().track;
    let chunk_start = out.len();
    out.extend_from_slice(b"MTrk\0\0\0\0");

    let label = format!("Track {:02}", track);
    write_vlq(out, 0);
    write_meta(out, META_TRACK_NAME, label.as_bytes());

    // every MIDI event needs a delta-time in front of it
    let mut need_delta = true;
    let mut ended = false;

    while let Some(timed) = cursor.decode_next()? {
        match timed.event {
            DecodedEvent::DeltaTime { ticks } if ticks > MAX_DELTA_TIME => {
                return Err(KdtError::DeltaTimeTooLarge {
                    track,
                    offset: timed.offset,
                    ticks,
                });
            }
            DecodedEvent::DeltaTime { .. } => need_delta = false,
            DecodedEvent::Command { .. } => {
                need_delta = true;
                ended = timed.event.opcode() == Some(opcode::OP_END_OF_TRACK);
            }
            DecodedEvent::Note { .. } => need_delta = true,
        }

        encode_event(cursor.state(), &timed.event, out);

        // running status elides a zero delta between grouped events
        if need_delta && cursor.state().running && !cursor.is_finished() {
            write_vlq(out, 0);
            need_delta = false;
        }
    }

    if !ended {
        debug!(
            "Track {:02} has no end-of-track command, adding one..!",
            track
        );
        if need_delta {
            write_vlq(out, 0);
        }
        write_meta(out, META_END_OF_TRACK, &[]);
    } else if !cursor.state().at_end() {
        debug!(
            "Track {:02} ends with {} unused bytes after its end-of-track command",
            track,
            cursor.state().end - cursor.offset()
        );
    }

    let len = out.len() - chunk_start - 8;
    let len_field = u32::try_from(len).map_err(|_| KdtError::ChunkTooLarge { track, len })?;
    out[chunk_start + 4..chunk_start + 8].copy_from_slice(&len_field.to_be_bytes());

    debug!("Encoded track {:02}: {} bytes", track, len);
    Ok(())
}

/// Append the MIDI bytes for a single decoded event. `state` must be the decoder state right
/// after `event` was read, so channel and tempo changes are already applied.
pub fn encode_event(state: &TrackState, event: &DecodedEvent, out: &mut Vec<u8>) {
    let channel = state.channel & 0x0F;

    match *event {
        DecodedEvent::DeltaTime { ticks } => write_vlq(out, ticks),
        DecodedEvent::Note { note, velocity } => {
            if velocity == 0 {
                out.extend_from_slice(&[NOTE_OFF | channel, note, 0]);
            } else {
                out.extend_from_slice(&[NOTE_ON | channel, note, velocity]);
            }
        }
        DecodedEvent::Command { opcode, param } => {
            let value = param.map(|p| p & 0x7F).unwrap_or(0);

            match opcode::lookup(opcode).action {
                Action::Controller(cc) => {
                    out.extend_from_slice(&[CONTROL_CHANGE | channel, cc, value]);
                }
                Action::Program => out.extend_from_slice(&[PROGRAM_CHANGE | channel, value]),
                Action::PitchBend => out.extend_from_slice(&[PITCH_BEND | channel, 0, value]),
                Action::NoteOffReset | Action::NoteOffKeep => {
                    out.extend_from_slice(&[NOTE_OFF | channel, state.last_note, 0]);
                }
                Action::TempoCoarse | Action::TempoFine | Action::TempoFineHigh => {
                    let mpqn = tempo_mpqn(state.tempo_bpm);
                    write_meta(out, META_TEMPO, &mpqn.to_be_bytes()[1..]);
                }
                Action::NrpnMsb
                    if value == opcode::LOOP_START || value == opcode::LOOP_END =>
                {
                    write_meta(out, META_MARKER, opcode::marker_text(opcode, value).as_bytes());
                }
                Action::SetChannel | Action::NrpnMsb | Action::Marker | Action::Reserved => {
                    write_meta(out, META_TEXT, opcode::marker_text(opcode, value).as_bytes());
                }
                Action::EndOfTrack => write_meta(out, META_END_OF_TRACK, &[]),
            }
        }
    }
}

/// Microseconds per quarter note for a BPM value. 0 BPM is treated as 1.
pub fn tempo_mpqn(bpm: u8) -> u32 {
    MICROSECONDS_PER_MINUTE / (bpm.max(1) as u32)
}

fn write_meta(out: &mut Vec<u8>, kind: u8, data: &[u8]) {
    out.push(0xFF);
    out.push(kind);
    write_vlq(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Append `value` as a MIDI variable-length quantity.
pub fn write_vlq(out: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut rest = value;

    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }

    for i in (0..n).rev() {
        let more = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | more);
    }
}
