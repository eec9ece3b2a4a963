use serde::Serialize;

/// One step of a KDT1 track's byte stream.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedEvent {
    /// Ticks elapsed since the previous event group.
    DeltaTime { ticks: u64 },

    /// A command byte (high bit set) and its raw parameter byte, if the opcode takes one.
    Command { opcode: u8, param: Option<u8> },

    /// A note/velocity pair. Velocity 0 is a note-off.
    Note { note: u8, velocity: u8 },
}

impl DecodedEvent {
    /// The command's opcode with the high bit stripped.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Self::Command { opcode, .. } => Some(opcode & 0x7F),
            _ => None,
        }
    }
}

/// A decoded event along with where and when it happened.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    /// Offset relative to the start of the track.
    pub offset: usize,
    /// Accumulated ticks since the start of the track.
    pub time: u64,
    pub event: DecodedEvent,
}

/// Per-track listing used by the dump modes.
#[derive(Serialize, Debug, Clone)]
pub struct TrackSummary {
    pub track: usize,
    pub offset: usize,
    pub size: usize,
    pub events: Vec<TimedEvent>,
}
