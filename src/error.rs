use thiserror::Error;

/// Errors produced while reading a KDT1 container or decoding its tracks.
#[derive(Debug, Error)]
pub enum KdtError {
    /// The container itself is unusable. Always fatal.
    #[error("Not a valid KDT1 file: {path}: {kind}")]
    Format { path: String, kind: FormatErrorKind },

    /// A track index outside the size table was requested.
    #[error("Track index {index} is out of range (container has {count} tracks)")]
    Index { index: usize, count: usize },

    /// An event in a track's byte stream could not be decoded.
    #[error("Malformed event in track {track:02} at 0x{offset:04X}: {kind}")]
    Event {
        track: usize,
        offset: usize,
        kind: EventErrorKind,
    },

    /// A delta-time longer than a MIDI variable-length quantity can hold.
    #[error("Delta-time of {ticks} ticks in track {track:02} at 0x{offset:04X} doesn't fit in a MIDI file")]
    DeltaTimeTooLarge {
        track: usize,
        offset: usize,
        ticks: u64,
    },

    /// An output chunk grew past what a 32 bit length field can describe.
    #[error("Track {track:02} chunk is too large for a MIDI length field ({len} bytes)")]
    ChunkTooLarge { track: usize, len: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatErrorKind {
    #[error("file is smaller than the {0} byte header")]
    TruncatedHeader(usize),

    #[error("bad magic {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("declared size {declared} exceeds actual size {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("file size {size} exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("track size table for {tracks} tracks runs past the end of the file")]
    TableOutOfBounds { tracks: usize },

    #[error("track {track:02} data ends at 0x{end:X}, past the end of the file")]
    TrackOutOfBounds { track: usize, end: usize },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EventErrorKind {
    #[error("event runs past the end of the track")]
    Truncated,

    #[error("delta-time doesn't fit in 64 bits")]
    DeltaTimeOverflow,
}

impl KdtError {
    pub(crate) fn format(path: &str, kind: FormatErrorKind) -> Self {
        Self::Format {
            path: path.to_owned(),
            kind,
        }
    }
}

pub type KdtResult<T> = Result<T, KdtError>;
