use crate::error::{EventErrorKind, KdtError, KdtResult};
use crate::kdt::container::Container;
use crate::kdt::opcode::{self, Action};
use crate::model::config::TempoRule;
use crate::model::event::{DecodedEvent, TimedEvent};

/// Default tempo until the track sets one.
pub const DEFAULT_BPM: u8 = 120;

/// Everything the decoder knows about the track it is walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackState {
    pub track: usize,
    pub start: usize,
    pub offset: usize,
    pub end: usize,
    /// False: expect a delta-time next. True: expect a note or a command.
    pub running: bool,
    pub channel: u8,
    pub time: u64,
    pub last_note: u8,
    pub tempo_bpm: u8,
    /// Set once the end-of-track command has been decoded.
    pub ended: bool,
}

impl TrackState {
    pub fn new(track: usize, start: usize, end: usize) -> Self {
        Self {
            track,
            start,
            offset: start,
            end,
            running: false,
            channel: 0,
            time: 0,
            last_note: 0,
            tempo_bpm: DEFAULT_BPM,
            ended: false,
        }
    }

    pub fn at_end(&self) -> bool {
        self.offset >= self.end
    }
}

/// Walks the byte stream of one track at a time.
#[derive(Debug, Clone)]
pub struct TrackCursor<'a> {
    kdt: &'a Container,
    tempo: TempoRule,
    state: TrackState,
}

impl<'a> TrackCursor<'a> {
    /// A cursor positioned at the start of track 0 (or an empty range if there are no tracks).
    pub fn new(kdt: &'a Container, tempo: TempoRule) -> Self {
        let state = match kdt.tracks().first() {
            Some(entry) => TrackState::new(0, entry.start, entry.end()),
            None => TrackState::new(0, 0, 0),
        };

        Self { kdt, tempo, state }
    }

    pub fn set_track(&mut self, track: usize) -> KdtResult<()> {
        let entry = self.kdt.track(track)?;
        self.state = TrackState::new(track, entry.start, entry.end());
        Ok(())
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> usize {
        self.state.offset
    }

    /// Offset of the next byte relative to the start of the track.
    pub fn track_offset(&self) -> usize {
        self.state.offset - self.state.start
    }

    pub fn is_finished(&self) -> bool {
        self.state.ended || self.state.at_end()
    }

    /// Decode one event, or `None` once the track is exhausted.
    pub fn decode_next(&mut self) -> KdtResult<Option<TimedEvent>> {
        if self.is_finished() {
            return Ok(None);
        }

        let offset = self.track_offset();
        let event = if !self.state.running {
            self.read_delta_time()?
        } else if self.peek()? & 0x80 != 0 {
            self.read_command()?
        } else {
            self.read_note()?
        };

        Ok(Some(TimedEvent {
            offset,
            time: self.state.time,
            event,
        }))
    }

    /// Scan forward for the first `target` command (high bit optional). On success the cursor
    /// is left on the command's parameter byte. Otherwise it is left at the end of the track.
    pub fn find_opcode(&mut self, target: u8) -> KdtResult<bool> {
        let target = target | 0x80;

        while !self.is_finished() {
            if self.state.running && self.peek()? == target {
                self.state.offset += 1;
                return Ok(true);
            }
            self.decode_next()?;
        }

        self.state.offset = self.state.end;
        Ok(false)
    }

    /// Iterate over the remaining events of the current track.
    pub fn events(&mut self) -> Events<'_, 'a> {
        Events { cursor: self }
    }

    fn error(&self, kind: EventErrorKind) -> KdtError {
        KdtError::Event {
            track: self.state.track,
            offset: self.track_offset(),
            kind,
        }
    }

    fn peek(&self) -> KdtResult<u8> {
        if self.state.at_end() {
            return Err(self.error(EventErrorKind::Truncated));
        }
        Ok(self.kdt.bytes()[self.state.offset])
    }

    fn next_byte(&mut self) -> KdtResult<u8> {
        let byte = self.peek()?;
        self.state.offset += 1;
        Ok(byte)
    }

    fn read_delta_time(&mut self) -> KdtResult<DecodedEvent> {
        let kdt = self.kdt;
        let bytes = &kdt.bytes()[self.state.offset..self.state.end];
        let (ticks, len) = read_vlq(bytes).map_err(|kind| self.error(kind))?;

        self.state.offset += len;
        self.state.time = self.state.time.saturating_add(ticks);
        self.state.running = true;
        Ok(DecodedEvent::DeltaTime { ticks })
    }

    fn read_command(&mut self) -> KdtResult<DecodedEvent> {
        let start = self.state.offset;
        let opcode = self.next_byte()?;
        let spec = opcode::lookup(opcode);

        let param = if spec.takes_param {
            match self.next_byte() {
                Ok(param) => Some(param),
                Err(_) => {
                    self.state.offset = start;
                    return Err(self.error(EventErrorKind::Truncated));
                }
            }
        } else {
            None
        };

        self.state.running = match (spec.action, param) {
            (Action::NoteOffReset, _) => false,
            (Action::NoteOffKeep, _) => true,
            (_, Some(param)) => param & 0x80 != 0,
            (_, None) => self.state.running,
        };

        if let Some(value) = param.map(|p| p & 0x7F) {
            match spec.action {
                Action::SetChannel => {
                    // channel 10 (index 9) is reserved for percussion in General MIDI
                    let channel = value & 0x0F;
                    self.state.channel = if channel == 9 { 10 } else { channel };
                }
                Action::TempoCoarse => self.state.tempo_bpm = self.tempo.coarse_bpm(value),
                Action::TempoFine => self.state.tempo_bpm = value,
                Action::TempoFineHigh => self.state.tempo_bpm = value | 0x80,
                _ => {}
            }
        }

        if spec.action == Action::EndOfTrack {
            self.state.ended = true;
        }

        Ok(DecodedEvent::Command { opcode, param })
    }

    fn read_note(&mut self) -> KdtResult<DecodedEvent> {
        let start = self.state.offset;
        let note = self.next_byte()? & 0x7F;
        let second = match self.next_byte() {
            Ok(byte) => byte,
            Err(_) => {
                self.state.offset = start;
                return Err(self.error(EventErrorKind::Truncated));
            }
        };

        let velocity = second & 0x7F;
        self.state.running = second & 0x80 != 0;
        if velocity != 0 {
            self.state.last_note = note;
        }

        Ok(DecodedEvent::Note { note, velocity })
    }
}

/// Lazy sequence of decoded events for the cursor's current track.
pub struct Events<'c, 'a> {
    cursor: &'c mut TrackCursor<'a>,
}

impl Iterator for Events<'_, '_> {
    type Item = KdtResult<TimedEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.decode_next() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                // stop after the first error
                self.cursor.state.ended = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a variable-length delta-time from the start of `bytes`, returning the tick count and
/// bytes used. Any number of bytes is accepted as long as the value fits in a `u64`.
pub(crate) fn read_vlq(bytes: &[u8]) -> Result<(u64, usize), EventErrorKind> {
    let mut ticks: u64 = 0;

    for (i, byte) in bytes.iter().enumerate() {
        if ticks > u64::MAX >> 7 {
            return Err(EventErrorKind::DeltaTimeOverflow);
        }
        ticks = (ticks << 7) | (byte & 0x7F) as u64;

        if byte & 0x80 == 0 {
            return Ok((ticks, i + 1));
        }
    }

    Err(EventErrorKind::Truncated)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kdt::build_kdt;

    fn load(tracks: &[&[u8]]) -> Container {
        Container::from_bytes(build_kdt(480, tracks), "test.kdt", usize::MAX).unwrap()
    }

    fn decode_all(kdt: &Container, track: usize) -> Vec<DecodedEvent> {
        let mut cursor = TrackCursor::new(kdt, TempoRule::default());
        cursor.set_track(track).unwrap();
        cursor.events().map(|e| e.unwrap().event).collect()
    }

    #[test]
    fn vlq_values() {
        assert_eq!(read_vlq(&[0x00]), Ok((0, 1)));
        assert_eq!(read_vlq(&[0x7F]), Ok((127, 1)));
        assert_eq!(read_vlq(&[0x81, 0x00]), Ok((128, 2)));
        assert_eq!(read_vlq(&[0x81, 0x70, 0x3C]), Ok((240, 2)));
        assert_eq!(read_vlq(&[0xFF, 0xFF, 0xFF, 0x7F]), Ok((0x0FFF_FFFF, 4)));
        assert_eq!(read_vlq(&[0x80, 0x80, 0x80, 0x80, 0x00]), Ok((0, 5)));
        assert_eq!(read_vlq(&[0x81]), Err(EventErrorKind::Truncated));
        assert_eq!(read_vlq(&[]), Err(EventErrorKind::Truncated));

        // ten groups of 7 bits is more than 64
        let mut wide = vec![0xFF; 9];
        wide.push(0x7F);
        assert_eq!(read_vlq(&wide), Err(EventErrorKind::DeltaTimeOverflow));

        // leading zero groups don't count towards the limit
        let mut padded = vec![0x80; 32];
        padded.push(0x05);
        assert_eq!(read_vlq(&padded), Ok((5, 33)));
    }

    /// `len` bytes holding `value` most significant group first, zero padded at the front.
    fn vlq_bytes(value: u64, len: usize) -> Vec<u8> {
        (0..len)
            .rev()
            .map(|i| {
                let group = ((value >> (7 * i)) & 0x7F) as u8;
                if i > 0 { group | 0x80 } else { group }
            })
            .collect()
    }

    #[test]
    fn decoder_reads_delta_times_of_any_length() {
        env_logger::try_init().unwrap_or(());

        let cases: &[(u64, usize)] = &[
            (0, 1),
            (0x7F, 1),
            (0x80, 2),
            (0x3FFF, 2),
            (0x4000, 3),
            (0x1F_FFFF, 3),
            (0x20_0000, 4),
            (0x0FFF_FFFF, 4),
            (5, 5),
            (0x0FFF_FFFF, 5),
            (0x1000_0000, 5),
            (0x7_FFFF_FFFF, 5),
        ];

        for &(value, len) in cases {
            let mut track = vlq_bytes(value, len);
            track.extend_from_slice(&[0xFF, 0xFF]);
            let kdt = load(&[&track]);
            let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

            let delta = cursor.decode_next().unwrap().unwrap();
            assert_eq!(delta.event, DecodedEvent::DeltaTime { ticks: value }, "{:02X?}", track);
            assert_eq!(delta.time, value);
            assert_eq!(cursor.track_offset(), len);
            assert!(cursor.state().running);

            let end = cursor.decode_next().unwrap().unwrap();
            assert_eq!(end.event.opcode(), Some(0x7F));
        }
    }

    #[test]
    fn delta_time_accumulates() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[0x81, 0x00, 0x3C, 0x64, 0x83, 0x00, 0x3C, 0x80, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        let first = cursor.decode_next().unwrap().unwrap();
        assert_eq!(first.event, DecodedEvent::DeltaTime { ticks: 128 });
        assert_eq!(first.offset, 0);
        assert!(cursor.state().running);

        cursor.decode_next().unwrap();
        assert!(!cursor.state().running);

        let second = cursor.decode_next().unwrap().unwrap();
        assert_eq!(second.event, DecodedEvent::DeltaTime { ticks: 384 });
        assert_eq!(second.offset, 4);
        assert_eq!(second.time, 512);
    }

    #[test]
    fn running_status_follows_high_bits() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[
            0x00, // delta
            0x3C, 0xE4, // note on, running stays 1
            0x87, 0xE4, // volume 0x64, running stays 1
            0x40, 0x00, // note off, running 0
            0x10, // delta
            0xFF, 0xFF, // end
        ]]);

        assert_eq!(
            decode_all(&kdt, 0),
            vec![
                DecodedEvent::DeltaTime { ticks: 0 },
                DecodedEvent::Note {
                    note: 0x3C,
                    velocity: 0x64
                },
                DecodedEvent::Command {
                    opcode: 0x87,
                    param: Some(0xE4)
                },
                DecodedEvent::Note {
                    note: 0x40,
                    velocity: 0
                },
                DecodedEvent::DeltaTime { ticks: 0x10 },
                DecodedEvent::Command {
                    opcode: 0xFF,
                    param: Some(0xFF)
                },
            ]
        );
    }

    #[test]
    fn note_off_commands_have_no_parameter() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[0x00, 0x3C, 0xE4, 0xCB, 0x3E, 0x64, 0x00, 0xCA, 0x05, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        cursor.decode_next().unwrap();
        cursor.decode_next().unwrap();
        assert_eq!(cursor.state().last_note, 0x3C);

        let keep = cursor.decode_next().unwrap().unwrap();
        assert_eq!(
            keep.event,
            DecodedEvent::Command {
                opcode: 0xCB,
                param: None
            }
        );
        assert!(cursor.state().running);

        let note = cursor.decode_next().unwrap().unwrap();
        assert_eq!(
            note.event,
            DecodedEvent::Note {
                note: 0x3E,
                velocity: 0x64
            }
        );
        assert!(!cursor.state().running);

        // 0x00 delta, then 0xCA clears running status without a parameter
        cursor.decode_next().unwrap();
        let reset = cursor.decode_next().unwrap().unwrap();
        assert_eq!(reset.event.opcode(), Some(0x4A));
        assert!(!cursor.state().running);

        let delta = cursor.decode_next().unwrap().unwrap();
        assert_eq!(delta.event, DecodedEvent::DeltaTime { ticks: 5 });
        assert_eq!(delta.time, 5);
    }

    #[test]
    fn channel_and_tempo_state() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[
            0x00, 0xC6, 0x89, // channel 9 -> 10
            0xC7, 0xB7, // coarse tempo 55 -> 120
            0xCC, 0xC8, // fine tempo 72
            0xCD, 0x90, // fine high tempo 0x90
            0xFF, 0xFF,
        ]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        cursor.decode_next().unwrap();
        cursor.decode_next().unwrap();
        assert_eq!(cursor.state().channel, 10);

        cursor.decode_next().unwrap();
        assert_eq!(cursor.state().tempo_bpm, 120);

        cursor.decode_next().unwrap();
        assert_eq!(cursor.state().tempo_bpm, 72);

        cursor.decode_next().unwrap();
        assert_eq!(cursor.state().tempo_bpm, 0x90);
    }

    #[test]
    fn end_of_track_stops_decoding() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[0x00, 0xFF, 0xFF, 0x00, 0x3C, 0x64]]);
        let events = decode_all(&kdt, 0);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn set_track_resets_state() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[0x05, 0xC6, 0x83, 0xFF, 0xFF], &[0x00, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());
        cursor.decode_next().unwrap();
        cursor.decode_next().unwrap();
        assert_eq!(cursor.state().channel, 3);
        assert_eq!(cursor.state().time, 5);

        cursor.set_track(1).unwrap();
        let state = cursor.state();
        assert_eq!(state.track, 1);
        assert_eq!(state.offset, kdt.tracks()[1].start);
        assert!(!state.running);
        assert_eq!(state.channel, 0);
        assert_eq!(state.time, 0);
        assert_eq!(state.tempo_bpm, DEFAULT_BPM);

        assert!(matches!(
            cursor.set_track(2),
            Err(KdtError::Index { index: 2, count: 2 })
        ));
    }

    #[test]
    fn truncated_events_are_errors() {
        env_logger::try_init().unwrap_or(());

        // note split across the end of the track
        let kdt = load(&[&[0x00, 0x3C]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());
        cursor.decode_next().unwrap();
        let err = cursor.decode_next().unwrap_err();
        assert!(matches!(
            err,
            KdtError::Event {
                track: 0,
                offset: 1,
                kind: EventErrorKind::Truncated
            }
        ));

        // unterminated delta-time
        let kdt = load(&[&[0x81, 0x82]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        let err = cursor.decode_next().unwrap_err();
        assert!(matches!(
            err,
            KdtError::Event {
                offset: 0,
                kind: EventErrorKind::Truncated,
                ..
            }
        ));

        // the iterator yields the error once and then stops
        let kdt = load(&[&[0x00, 0x3C]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());
        let results: Vec<_> = cursor.events().collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn find_opcode_stops_on_the_parameter() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[0x00, 0x89, 0x85, 0x87, 0xEE, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        assert!(cursor.find_opcode(0x07).unwrap());
        assert_eq!(cursor.track_offset(), 4);
        assert_eq!(kdt.bytes()[cursor.offset()], 0xEE);
    }

    #[test]
    fn find_opcode_missing_leaves_cursor_at_end() {
        env_logger::try_init().unwrap_or(());

        let kdt = load(&[&[0x00, 0x89, 0x85, 0x3C, 0x64, 0x00, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        assert!(!cursor.find_opcode(0x87).unwrap());
        assert_eq!(cursor.offset(), kdt.tracks()[0].end());

        // a note whose first byte happens to match is not a command
        let kdt = load(&[&[0x00, 0x07, 0x64, 0x00, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());
        assert!(!cursor.find_opcode(0x07).unwrap());
    }

    #[test]
    fn find_opcode_ignores_delta_bytes() {
        env_logger::try_init().unwrap_or(());

        // 0x87 0x00 here is a two byte delta-time, not a volume command
        let kdt = load(&[&[0x87, 0x00, 0x3C, 0x64, 0x00, 0x87, 0x22, 0xFF, 0xFF]]);
        let mut cursor = TrackCursor::new(&kdt, TempoRule::default());

        assert!(cursor.find_opcode(0x87).unwrap());
        assert_eq!(cursor.track_offset(), 6);
    }
}
