use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Tempo added to the coarse tempo opcode's scaled parameter.
pub const DEFAULT_COARSE_TEMPO_BASE: u8 = 10;
/// Multiplier applied to the coarse tempo opcode's parameter.
pub const COARSE_TEMPO_STEP: u32 = 2;
/// Refuse to load anything larger than this (no real sequence comes close).
pub const DEFAULT_MAX_FILE_SIZE: usize = 8 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "kdt-tool",
    about = "Decode KDT1 music sequences, convert them to MIDI and mute/solo their tracks!"
)]
pub struct Args {
    /// Path to the target KDT1 file.
    pub kdt: PathBuf,

    /// What to do with the file.
    #[arg(short, long, value_enum, default_value_t = Mode::Convert)]
    pub mode: Mode,

    /// Output path for `convert` (defaults to the input path with a .mid extension).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Tracks to keep audible in `isolate` mode, e.g. `--tracks 2 4-6` or `--tracks 3,5`.
    #[arg(short, long, num_args = 1.., value_delimiter = ',')]
    pub tracks: Vec<String>,

    /// Base BPM added to the coarse tempo command's parameter (some drivers use 2).
    #[arg(long = "tempo-base", default_value_t = DEFAULT_COARSE_TEMPO_BASE)]
    pub tempo_base: u8,

    /// Largest input file accepted, in bytes.
    #[arg(long = "max-size", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_size: usize,

    /// Prints extra information to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Convert the sequence to a Standard MIDI File.
    #[default]
    Convert,
    /// Print every decoded event of every track.
    Dump,
    /// Print every decoded event of every track as JSON.
    Json,
    /// Print each track's initial channel volume.
    Volumes,
    /// Report whether the sequence is a dynamic (layered) or standard BGM.
    BgmType,
    /// Report tracks that contain no note events.
    NoteCounts,
    /// Write a copy with only the `--tracks` list (plus the global tracks) audible.
    Isolate,
    /// Write one isolated copy per track.
    Split,
}

/// How the coarse tempo opcode maps its parameter to BPM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoRule {
    pub coarse_base: u8,
}

impl Default for TempoRule {
    fn default() -> Self {
        Self {
            coarse_base: DEFAULT_COARSE_TEMPO_BASE,
        }
    }
}

impl TempoRule {
    /// `min(base + parameter * 2, 255)`
    pub fn coarse_bpm(&self, param: u8) -> u8 {
        let bpm = self.coarse_base as u32 + (param & 0x7F) as u32 * COARSE_TEMPO_STEP;
        bpm.min(u8::MAX as u32) as u8
    }
}

/// Options shared by everything that loads and decodes a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub tempo: TempoRule,
    pub max_file_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            tempo: TempoRule::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl From<&Args> for DecodeOptions {
    fn from(args: &Args) -> Self {
        Self {
            tempo: TempoRule {
                coarse_base: args.tempo_base,
            },
            max_file_size: args.max_size,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coarse_tempo_formula() {
        let rule = TempoRule::default();
        assert_eq!(rule.coarse_bpm(55), 120);
        assert_eq!(rule.coarse_bpm(0), 10);
        assert_eq!(rule.coarse_bpm(0x7F), 255);

        let alt = TempoRule { coarse_base: 2 };
        assert_eq!(alt.coarse_bpm(59), 120);
    }

    #[test]
    fn convert_and_dump_are_exclusive_modes() {
        let args = Args::parse_from(["kdt-tool", "BGM.KDT"]);
        assert_eq!(args.mode, Mode::Convert);

        let args = Args::parse_from(["kdt-tool", "BGM.KDT", "--mode", "dump"]);
        assert_eq!(args.mode, Mode::Dump);

        assert!(Args::try_parse_from(["kdt-tool", "BGM.KDT", "--mode", "sing"]).is_err());
        assert!(Args::try_parse_from(["kdt-tool"]).is_err());
    }

    #[test]
    fn track_list_accepts_commas_and_spaces() {
        let args = Args::parse_from(["kdt-tool", "BGM.KDT", "-m", "isolate", "-t", "2,4-6", "8"]);
        assert_eq!(args.tracks, vec!["2", "4-6", "8"]);
        assert_eq!(DecodeOptions::from(&args), DecodeOptions::default());
    }
}
