//! Opcode table for KDT1 sequence commands.
//!
//! A command byte always has its high bit set; the low 7 bits select the entry below.
//! Every command except the two note-off variants is followed by a single parameter byte
//! whose high bit carries the running status for the next event.

use serde::Serialize;

/// What a command does, and therefore how it is written to MIDI.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Control change with this controller number.
    Controller(u8),
    /// Selects the channel used by later events.
    SetChannel,
    /// `bpm = min(base + param * 2, 255)`
    TempoCoarse,
    /// `bpm = param`
    TempoFine,
    /// `bpm = param | 0x80`
    TempoFineHigh,
    PitchBend,
    Program,
    /// Releases the last note and clears running status.
    NoteOffReset,
    /// Releases the last note and keeps running status.
    NoteOffKeep,
    /// NRPN MSB, also used for loop points.
    NrpnMsb,
    /// Not translated, written as a text marker.
    Marker,
    EndOfTrack,
    /// Anything not in the table.
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeSpec {
    /// Low 7 bits of the command byte.
    pub opcode: u8,
    pub name: &'static str,
    pub takes_param: bool,
    pub action: Action,
}

const fn op(opcode: u8, name: &'static str, action: Action) -> OpcodeSpec {
    OpcodeSpec {
        opcode,
        name,
        takes_param: true,
        action,
    }
}

const fn op_no_param(opcode: u8, name: &'static str, action: Action) -> OpcodeSpec {
    OpcodeSpec {
        opcode,
        name,
        takes_param: false,
        action,
    }
}

pub const OP_VOLUME: u8 = 0x07;
pub const OP_SET_CHANNEL: u8 = 0x46;
pub const OP_NOTE_OFF_RESET: u8 = 0x4A;
pub const OP_NOTE_OFF_KEEP: u8 = 0x4B;
pub const OP_END_OF_TRACK: u8 = 0x7F;

pub const LOOP_START: u8 = 0x14;
pub const LOOP_END: u8 = 0x1E;

pub const OPCODES: &[OpcodeSpec] = &[
    op(0x01, "Modulation", Action::Controller(1)),
    op(0x06, "Data Entry", Action::Controller(6)),
    op(OP_VOLUME, "Set Main/Channel Volume", Action::Controller(7)),
    op(0x0A, "Set Panning", Action::Controller(10)),
    op(0x0B, "Set Controller Volume", Action::Controller(11)),
    op(0x0F, "Unknown (Stereo)", Action::Marker),
    op(0x40, "Sustain Pedal", Action::Controller(64)),
    op(OP_SET_CHANNEL, "Set Channel", Action::SetChannel),
    op(0x47, "Set Tempo (Coarse)", Action::TempoCoarse),
    op(0x48, "Pitch Bend", Action::PitchBend),
    op(0x49, "Set Instrument", Action::Program),
    op_no_param(
        OP_NOTE_OFF_RESET,
        "Note-off + reset running status",
        Action::NoteOffReset,
    ),
    op_no_param(
        OP_NOTE_OFF_KEEP,
        "Note-off + keep running status",
        Action::NoteOffKeep,
    ),
    op(0x4C, "Set Tempo (0-127)", Action::TempoFine),
    op(0x4D, "Set Tempo (128-255)", Action::TempoFineHigh),
    op(0x5B, "Reverb Depth", Action::Controller(91)),
    op(0x62, "NRPN LSB", Action::Marker),
    op(0x63, "NRPN MSB", Action::NrpnMsb),
    op(0x76, "Sequence Beat", Action::Marker),
    op(OP_END_OF_TRACK, "End of track", Action::EndOfTrack),
];

static RESERVED: OpcodeSpec = op(0x00, "Unknown", Action::Reserved);

/// Look up a command byte (high bit optional). Unknown opcodes map to a reserved entry that
/// takes a parameter.
pub fn lookup(opcode: u8) -> &'static OpcodeSpec {
    let opcode = opcode & 0x7F;
    OPCODES
        .iter()
        .find(|spec| spec.opcode == opcode)
        .unwrap_or(&RESERVED)
}

/// Text used for the MIDI marker written in place of an untranslated command.
pub fn marker_text(opcode: u8, param: u8) -> String {
    let opcode = opcode & 0x7F;
    let param = param & 0x7F;
    match lookup(opcode).action {
        Action::NrpnMsb if param == LOOP_START => "Loop Start".to_owned(),
        Action::NrpnMsb if param == LOOP_END => "Loop End".to_owned(),
        Action::Reserved => format!("Reserved 0x{:02X} 0x{:02X}", opcode, param),
        _ => format!("{} 0x{:02X}", lookup(opcode).name, param),
    }
}
