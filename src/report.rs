use crate::error::KdtResult;
use crate::kdt::container::Container;
use crate::kdt::cursor::TrackCursor;
use crate::kdt::opcode::{self, OP_VOLUME};
use crate::model::config::TempoRule;
use crate::model::event::{DecodedEvent, TimedEvent, TrackSummary};
use crate::mute::GLOBAL_TRACKS;
use anyhow::Result;
use log::info;
use std::path::Path;

/// Whether a sequence layers extra parts in and out by starting some tracks muted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgmType {
    Dynamic,
    Standard,
}

/// Decode every track into a listing.
pub fn track_summaries(kdt: &Container, tempo: TempoRule) -> KdtResult<Vec<TrackSummary>> {
    let mut cursor = TrackCursor::new(kdt, tempo);
    let mut summaries = Vec::with_capacity(kdt.track_count());

    for (track, entry) in kdt.tracks().iter().enumerate() {
        cursor.set_track(track)?;
        let events = cursor.events().collect::<KdtResult<Vec<_>>>()?;

        summaries.push(TrackSummary {
            track,
            offset: entry.start,
            size: entry.size,
            events,
        });
    }

    Ok(summaries)
}

/// One dump line: offset, cumulative time, event kind and values.
pub fn describe(event: &TimedEvent) -> String {
    let body = match event.event {
        DecodedEvent::DeltaTime { ticks } => format!("DELTA-TIME   Time: {}", ticks),
        DecodedEvent::Note { note, velocity: 0 } => format!("NOTE-OFF     Key: 0x{:02X}", note),
        DecodedEvent::Note { note, velocity } => format!(
            "NOTE-ON      Key: 0x{:02X}, Velocity: 0x{:02X}",
            note, velocity
        ),
        DecodedEvent::Command { opcode, param } => {
            let spec = opcode::lookup(opcode);
            match param {
                Some(param) => format!(
                    "COMMAND      Command: 0x{:02X}/0x{:02X} ({}), Argument/Parameter: 0x{:02X}",
                    opcode,
                    opcode & 0x7F,
                    spec.name,
                    param & 0x7F
                ),
                None => format!(
                    "COMMAND      Command: 0x{:02X}/0x{:02X} ({})",
                    opcode,
                    opcode & 0x7F,
                    spec.name
                ),
            }
        }
    };

    format!("0x{:04X}   {:>8}   {}", event.offset, event.time, body)
}

pub fn print_events(kdt: &Container, tempo: TempoRule) -> KdtResult<()> {
    for summary in track_summaries(kdt, tempo)? {
        println!("TRACK {:02}", summary.track);
        println!("{}", "=".repeat(80));
        println!();
        for event in &summary.events {
            println!("{}", describe(event));
        }
        println!("{}", "\n".repeat(4));
    }

    Ok(())
}

pub fn print_events_json(kdt: &Container, tempo: TempoRule) -> Result<()> {
    let summaries = track_summaries(kdt, tempo)?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

/// The parameter of each track's first channel-volume command.
pub fn initial_volumes(kdt: &Container, tempo: TempoRule) -> KdtResult<Vec<Option<u8>>> {
    let mut cursor = TrackCursor::new(kdt, tempo);
    let mut volumes = Vec::with_capacity(kdt.track_count());

    for track in 0..kdt.track_count() {
        cursor.set_track(track)?;
        let volume = if cursor.find_opcode(OP_VOLUME)? {
            Some(kdt.bytes()[cursor.offset()] & 0x7F)
        } else {
            None
        };
        volumes.push(volume);
    }

    Ok(volumes)
}

pub fn print_initial_track_volumes(kdt: &Container, tempo: TempoRule) -> KdtResult<()> {
    let name = file_name(kdt.path());
    for (track, volume) in initial_volumes(kdt, tempo)?.into_iter().enumerate() {
        if let Some(volume) = volume {
            println!("{}: track {:02} volume = 0x{:02X}", name, track, volume);
        }
    }
    Ok(())
}

/// Dynamic if any non-global track starts at volume 0.
pub fn bgm_type(kdt: &Container, tempo: TempoRule) -> KdtResult<BgmType> {
    let dynamic = initial_volumes(kdt, tempo)?
        .into_iter()
        .skip(GLOBAL_TRACKS)
        .any(|volume| volume == Some(0));

    Ok(if dynamic {
        BgmType::Dynamic
    } else {
        BgmType::Standard
    })
}

pub fn print_bgm_type(kdt: &Container, tempo: TempoRule) -> KdtResult<()> {
    let label = match bgm_type(kdt, tempo)? {
        BgmType::Dynamic => "Dynamic",
        BgmType::Standard => "Standard",
    };
    println!("{}: {}", label, file_name(kdt.path()));
    Ok(())
}

/// Number of note events in each track.
pub fn note_counts(kdt: &Container, tempo: TempoRule) -> KdtResult<Vec<usize>> {
    let mut cursor = TrackCursor::new(kdt, tempo);
    let mut counts = Vec::with_capacity(kdt.track_count());

    for track in 0..kdt.track_count() {
        cursor.set_track(track)?;
        let mut notes = 0;
        for event in cursor.events() {
            if let DecodedEvent::Note { .. } = event?.event {
                notes += 1;
            }
        }
        counts.push(notes);
    }

    Ok(counts)
}

pub fn print_silent_tracks(kdt: &Container, tempo: TempoRule) -> KdtResult<()> {
    let counts = note_counts(kdt, tempo)?;
    let mut silent = 0;

    for (track, count) in counts.iter().enumerate().skip(GLOBAL_TRACKS) {
        info!("Track {:02}: {} note events", track, count);
        if *count == 0 {
            println!("{}: no note events in track {:02}", kdt.path(), track);
            silent += 1;
        }
    }

    if silent == 0 {
        info!("Every track of {} has note events..!", kdt.path());
    }
    Ok(())
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned())
}
